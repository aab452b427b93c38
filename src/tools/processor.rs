//! 文件探测处理模块
//!
//! 通过拥有所有权的句柄打开文件，读取已协商的输出参数，并可选地试解码。

use super::cli::AppConfig;
use crate::audio::{OutputInfo, SampleFormat};
use crate::error::{AudioError, AudioResult};
use crate::handle::{DecoderBox, DecoderHandle, get_output_info};
use log::debug;
use std::path::{Path, PathBuf};

/// 试解码每次读取的帧数
const DECODE_CHUNK_FRAMES: usize = 4096;

/// 试解码统计
#[derive(Debug, Clone, PartialEq)]
pub struct DecodeStats {
    pub frames_read: u64,
    /// 峰值（绝对值，满刻度为1.0）
    pub peak: f32,
    pub skipped_packets: usize,
}

/// 单个文件的探测结果
#[derive(Debug, Clone)]
pub struct InspectReport {
    pub path: PathBuf,
    pub output: OutputInfo,
    pub length_frames: Option<u64>,
    pub decoded: Option<DecodeStats>,
}

/// 探测单个音频文件
pub fn inspect_audio_file(path: &Path, config: &AppConfig) -> AudioResult<InspectReport> {
    let mut handle = DecoderBox::open_file(path, &config.decoder_config())?;

    let (mut format, mut channels, mut sample_rate) = (0u32, 0u32, 0u32);
    get_output_info(
        Some(&*handle),
        Some(&mut format),
        Some(&mut channels),
        Some(&mut sample_rate),
    );
    let output = OutputInfo {
        format: SampleFormat::from_raw(format).unwrap_or_default(),
        channels,
        sample_rate,
    };

    let length_frames = handle.decoder().and_then(|d| d.length_in_pcm_frames());

    let decoded = match config.frames {
        Some(frames) => Some(decode_frames(&mut handle, frames)?),
        None => None,
    };

    debug!("探测完成: {} -> {:?}", path.display(), output);

    Ok(InspectReport {
        path: path.to_path_buf(),
        output,
        length_frames,
        decoded,
    })
}

/// 从已初始化的句柄试解码最多 `frames` 帧
pub fn decode_frames(handle: &mut DecoderHandle, frames: u64) -> AudioResult<DecodeStats> {
    let decoder = handle
        .decoder_mut()
        .ok_or_else(|| AudioError::InvalidInput("句柄未初始化".to_string()))?;

    let channels = decoder.output_info().channels as usize;
    let mut buffer = vec![0.0f32; DECODE_CHUNK_FRAMES * channels];
    let mut frames_read = 0u64;
    let mut peak = 0.0f32;

    while frames_read < frames {
        let wanted = (frames - frames_read).min(DECODE_CHUNK_FRAMES as u64) as usize;
        let read = decoder.read_frames_f32(&mut buffer[..wanted * channels])?;
        if read == 0 {
            break;
        }
        peak = buffer[..read * channels]
            .iter()
            .fold(peak, |acc, s| acc.max(s.abs()));
        frames_read += read as u64;
    }

    Ok(DecodeStats {
        frames_read,
        peak,
        skipped_packets: decoder.skipped_packets(),
    })
}

/// 格式化探测结果
pub fn format_report(report: &InspectReport) -> String {
    let mut output = String::new();
    let info = &report.output;

    output.push_str(&format!("File:          {}\n", report.path.display()));
    output.push_str(&format!("Format:        {}\n", info.format.name()));
    output.push_str(&format!("Channels:      {}\n", info.channels));
    output.push_str(&format!("Sample rate:   {} Hz\n", info.sample_rate));

    match report.length_frames {
        Some(frames) => output.push_str(&format!(
            "Length:        {frames} frames ({:.2} s)\n",
            info.duration_seconds(frames)
        )),
        None => output.push_str("Length:        unknown\n"),
    }

    if let Some(stats) = &report.decoded {
        let peak_db = if stats.peak > 0.0 {
            format!("{:.2} dBFS", 20.0 * stats.peak.log10())
        } else {
            "-inf dBFS".to_string()
        };
        output.push_str(&format!("Decoded:       {} frames\n", stats.frames_read));
        output.push_str(&format!("Peak:          {:.6} ({peak_db})\n", stats.peak));
        if stats.skipped_packets > 0 {
            output.push_str(&format!("Skipped:       {} packets\n", stats.skipped_packets));
        }
    }

    output
}
