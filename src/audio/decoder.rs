//! symphonia解码后端
//!
//! 负责句柄的"初始化"与解码路径：探测容器、创建编解码器、协商输出格式、
//! 逐帧读取与定位。所有格式解析与比特流解码均委托给symphonia
//! （OGG/Vorbis 由其 `ogg` + `vorbis` 后端提供）。

use super::format::{DecoderConfig, OutputInfo, SampleFormat};
use crate::error::{self, AudioError, AudioResult};
use log::{debug, warn};
use std::io::Cursor;
use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CODEC_TYPE_NULL, CodecParameters, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::{MediaSource, MediaSourceStream};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::sample::SampleFormat as CodecSampleFormat;

/// 判断是否为流结束（symphonia以UnexpectedEof表示）
macro_rules! is_end_of_stream {
    ($err:expr) => {
        matches!($err, SymphoniaError::IoError(e) if e.kind() == std::io::ErrorKind::UnexpectedEof)
    };
}

/// 未声明位深的有损编解码器，定位时提前的帧数
///
/// 重置后的首个包不产出样本（Vorbis需要前一块做重叠相加，MP3需要比特储备），
/// 提前解码再按包时间戳丢弃，落点才是精确的。
const SEEK_PREROLL_FRAMES: u64 = 8192;

/// 解码器状态
///
/// 由 [`DecoderHandle`](crate::handle::DecoderHandle) 以堆指针形式持有。
/// 内部统一以交错f64缓存已解码样本（32位整数PCM也无损），读取时再编码为协商后的输出格式。
pub struct Decoder {
    format_reader: Box<dyn FormatReader>,
    codec: Box<dyn symphonia::core::codecs::Decoder>,
    track_id: u32,

    native: OutputInfo,
    output: OutputInfo,
    total_frames: Option<u64>,
    cursor: u64,
    seek_preroll: u64,

    // 当前包中尚未被读取的交错样本
    pending: Vec<f64>,
    pending_offset: usize,

    sample_buf: Option<SampleBuffer<f64>>,
    sample_buf_frames: usize,

    /// 定位目标帧；在解码出覆盖它的包之前，早于它的样本都被丢弃
    seek_target: Option<u64>,
    /// 部分读取成功后遇到的错误，在下一次读取时返回
    deferred_error: Option<AudioError>,
    skipped_packets: usize,
    at_end: bool,
}

impl Decoder {
    /// 打开文件
    pub fn from_file<P: AsRef<Path>>(path: P, config: &DecoderConfig) -> AudioResult<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)?;

        let mut hint = Hint::new();
        if let Some(extension) = path.extension() {
            hint.with_extension(&extension.to_string_lossy());
        }

        debug!("打开音频文件: {}", path.display());
        Self::from_source(Box::new(file), hint, config)
    }

    /// 从内存数据初始化（数据所有权转移给解码器）
    pub fn from_memory(data: Vec<u8>, config: &DecoderConfig) -> AudioResult<Self> {
        if data.is_empty() {
            return Err(AudioError::InvalidInput("音频数据为空".to_string()));
        }
        Self::from_source(Box::new(Cursor::new(data)), Hint::new(), config)
    }

    /// 从任意媒体源初始化
    pub fn from_source(
        source: Box<dyn MediaSource>,
        hint: Hint,
        config: &DecoderConfig,
    ) -> AudioResult<Self> {
        let mss = MediaSourceStream::new(source, Default::default());

        let opened = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| error::format_error("格式探测失败", e))?;

        let format_reader = opened.format;

        let (track_id, codec_params) = {
            let track = format_reader
                .tracks()
                .iter()
                .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
                .ok_or_else(|| AudioError::FormatError("未找到音频轨道".to_string()))?;
            (track.id, track.codec_params.clone())
        };

        let codec = symphonia::default::get_codecs()
            .make(&codec_params, &DecoderOptions::default())
            .map_err(|e| error::format_error("创建解码器失败", e))?;

        let native = native_output_info(&codec_params)?;
        let output = config.negotiate(&native)?;

        debug!(
            "解码器就绪: track={track_id}, 原生={}/{}ch/{}Hz, 输出={}",
            native.format.name(),
            native.channels,
            native.sample_rate,
            output.format.name()
        );

        Ok(Self {
            format_reader,
            codec,
            track_id,
            native,
            output,
            total_frames: codec_params.n_frames,
            cursor: 0,
            seek_preroll: seek_preroll_frames(&codec_params),
            pending: Vec::new(),
            pending_offset: 0,
            sample_buf: None,
            sample_buf_frames: 0,
            seek_target: None,
            deferred_error: None,
            skipped_packets: 0,
            at_end: false,
        })
    }

    /// 协商后的输出格式
    #[inline]
    pub fn output_info(&self) -> OutputInfo {
        self.output
    }

    /// 流的原生格式
    #[inline]
    pub fn native_info(&self) -> OutputInfo {
        self.native
    }

    /// 总帧数（容器未声明时为 `None`）
    pub fn length_in_pcm_frames(&self) -> Option<u64> {
        self.total_frames
    }

    /// 当前读取位置（帧）
    pub fn cursor_in_pcm_frames(&self) -> u64 {
        self.cursor
    }

    /// 因解码错误跳过的包数量
    pub fn skipped_packets(&self) -> usize {
        self.skipped_packets
    }

    /// 读取交错f32帧
    ///
    /// `out.len()` 向下取整到整帧。返回实际读取的帧数，0表示流结束。
    pub fn read_frames_f32(&mut self, out: &mut [f32]) -> AudioResult<usize> {
        let channels = self.output.channels as usize;
        let wanted = out.len() / channels;

        self.read_with(wanted, |at, samples| {
            let start = at * channels;
            for (dst, src) in out[start..start + samples.len()].iter_mut().zip(samples) {
                *dst = *src as f32;
            }
        })
    }

    /// 读取按输出格式编码的帧（本机字节序）
    ///
    /// `out.len()` 向下取整到整帧。返回实际读取的帧数，0表示流结束。
    pub fn read_pcm_frames(&mut self, out: &mut [u8]) -> AudioResult<usize> {
        let format = self.output.format;
        let frame_bytes = self.output.bytes_per_frame();
        let sample_bytes = format.bytes_per_sample();
        let frames = out.len() / frame_bytes;

        self.read_with(frames, |at, samples| {
            let start = at * frame_bytes;
            format.encode_samples(samples, &mut out[start..start + samples.len() * sample_bytes]);
        })
    }

    /// 读取并丢弃帧，返回实际丢弃的帧数
    pub fn discard_frames(&mut self, count: u64) -> AudioResult<u64> {
        let wanted = usize::try_from(count).unwrap_or(usize::MAX);
        self.read_with(wanted, |_, _| {}).map(|read| read as u64)
    }

    /// 精确定位到指定帧
    ///
    /// 时间戳按帧解释（PCM/Vorbis/MP3 的时间基均为 1/采样率）。
    /// 目标超出声明长度时返回 [`AudioError::InvalidInput`]，定位到长度处则之后读到流结束。
    pub fn seek_to_pcm_frame(&mut self, frame: u64) -> AudioResult<()> {
        if let Some(total) = self.total_frames
            && frame > total
        {
            return Err(AudioError::InvalidInput(format!(
                "定位目标超出流长度: {frame} > {total}"
            )));
        }

        let seeked = self
            .format_reader
            .seek(
                SeekMode::Accurate,
                SeekTo::TimeStamp {
                    ts: frame.saturating_sub(self.seek_preroll),
                    track_id: self.track_id,
                },
            )
            .map_err(|e| error::decoding_error("定位失败", e))?;

        self.codec.reset();
        self.pending.clear();
        self.pending_offset = 0;
        self.seek_target = Some(frame);
        self.deferred_error = None;
        self.cursor = frame;
        self.at_end = false;

        debug!(
            "定位到帧 {frame} (容器落点 {}, 预解码 {} 帧)",
            seeked.actual_ts,
            frame.saturating_sub(seeked.actual_ts)
        );
        Ok(())
    }

    /// 从 pending 缓冲逐段交给 `sink(已写帧数, 交错样本)`，必要时解码新包
    ///
    /// 已取出的帧总会被交付：若中途出错，先返回已读帧数，错误留到下一次调用。
    fn read_with<F>(&mut self, wanted: usize, mut sink: F) -> AudioResult<usize>
    where
        F: FnMut(usize, &[f64]),
    {
        if let Some(e) = self.deferred_error.take() {
            return Err(e);
        }

        let channels = self.output.channels as usize;
        let mut written = 0;

        while written < wanted {
            if self.pending_offset >= self.pending.len() {
                match self.decode_next_packet() {
                    Ok(true) => continue,
                    Ok(false) => break,
                    Err(e) if written > 0 => {
                        warn!(
                            "第 {} 帧后解码失败，先交付已读取的 {written} 帧: {e}",
                            self.cursor + written as u64
                        );
                        self.deferred_error = Some(e);
                        break;
                    }
                    Err(e) => return Err(e),
                }
            }

            let available = (self.pending.len() - self.pending_offset) / channels;
            let take = available.min(wanted - written);
            let end = self.pending_offset + take * channels;
            sink(written, &self.pending[self.pending_offset..end]);

            self.pending_offset = end;
            written += take;
        }

        self.cursor += written as u64;
        Ok(written)
    }

    /// 解码下一个包到 pending 缓冲，返回 false 表示流结束
    fn decode_next_packet(&mut self) -> AudioResult<bool> {
        if self.at_end {
            return Ok(false);
        }

        loop {
            let packet = match self.format_reader.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::ResetRequired) => {
                    self.codec.reset();
                    continue;
                }
                Err(ref e) if is_end_of_stream!(e) => {
                    self.at_end = true;
                    return Ok(false);
                }
                Err(e) => return Err(error::decoding_error("读取包失败", e)),
            };

            if packet.track_id() != self.track_id {
                continue;
            }
            let packet_ts = packet.ts();

            let decoded = match self.codec.decode(&packet) {
                Ok(decoded) => decoded,
                Err(SymphoniaError::DecodeError(msg)) => {
                    self.skipped_packets += 1;
                    warn!("跳过损坏的音频包 (ts={packet_ts}): {msg}");
                    continue;
                }
                Err(ref e) if is_end_of_stream!(e) => {
                    self.at_end = true;
                    return Ok(false);
                }
                Err(e) => return Err(error::decoding_error("解码包失败", e)),
            };

            let frames = decoded.frames();
            if frames == 0 {
                continue;
            }

            let spec = *decoded.spec();
            let channels = spec.channels.count();
            if channels != self.native.channels as usize {
                return Err(AudioError::DecodingError(format!(
                    "声道数在流中途变化: {} -> {channels}",
                    self.native.channels
                )));
            }

            // 包时间戳即其首个输出帧的位置
            let mut skip = 0;
            if let Some(target) = self.seek_target {
                if packet_ts + frames as u64 <= target {
                    continue;
                }
                if packet_ts > target {
                    warn!(
                        "定位目标 {target} 之前缺少 {} 帧，从 {packet_ts} 开始输出",
                        packet_ts - target
                    );
                    self.cursor = packet_ts;
                }
                skip = target.saturating_sub(packet_ts) as usize;
                self.seek_target = None;
            }

            let capacity = decoded.capacity();
            if self.sample_buf_frames < capacity {
                self.sample_buf = None;
                self.sample_buf_frames = capacity;
            }
            let buf = self
                .sample_buf
                .get_or_insert_with(|| SampleBuffer::<f64>::new(capacity as u64, spec));
            buf.copy_interleaved_ref(decoded);

            self.pending.clear();
            self.pending.extend_from_slice(&buf.samples()[skip * channels..]);
            self.pending_offset = 0;
            return Ok(true);
        }
    }
}

/// 定位时需要提前解码的帧数
///
/// 声明了样本格式或位深的编解码器（PCM、FLAC等）每个包独立可解，无需提前。
fn seek_preroll_frames(params: &CodecParameters) -> u64 {
    if params.sample_format.is_some() || params.bits_per_sample.is_some() {
        0
    } else {
        SEEK_PREROLL_FRAMES
    }
}

/// 从编解码参数推导原生输出格式
fn native_output_info(params: &CodecParameters) -> AudioResult<OutputInfo> {
    let sample_rate = params
        .sample_rate
        .filter(|&rate| rate > 0)
        .ok_or_else(|| AudioError::FormatError("无法获取采样率信息".to_string()))?;
    let channels = params
        .channels
        .map(|ch| ch.count() as u32)
        .filter(|&count| count > 0)
        .ok_or_else(|| AudioError::FormatError("无法获取声道数信息".to_string()))?;

    Ok(OutputInfo {
        format: detect_native_format(params),
        channels,
        sample_rate,
    })
}

/// 检测原生样本编码
///
/// 优先使用编解码器声明的样本格式，其次按位深推断；
/// 有损编解码器（Vorbis、MP3等）不声明二者，按f32输出。
fn detect_native_format(params: &CodecParameters) -> SampleFormat {
    if let Some(format) = params.sample_format {
        return match format {
            CodecSampleFormat::U8 => SampleFormat::U8,
            CodecSampleFormat::S8 | CodecSampleFormat::U16 | CodecSampleFormat::S16 => {
                SampleFormat::S16
            }
            CodecSampleFormat::U24 | CodecSampleFormat::S24 => SampleFormat::S24,
            CodecSampleFormat::U32 | CodecSampleFormat::S32 => SampleFormat::S32,
            CodecSampleFormat::F32 | CodecSampleFormat::F64 => SampleFormat::F32,
        };
    }

    match params.bits_per_sample {
        Some(1..=8) => SampleFormat::U8,
        Some(9..=16) => SampleFormat::S16,
        Some(17..=24) => SampleFormat::S24,
        Some(25..=32) => SampleFormat::S32,
        _ => SampleFormat::F32,
    }
}
