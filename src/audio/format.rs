//! 输出格式信息模块
//!
//! 定义样本编码枚举、输出格式快照以及解码配置。

use crate::error::{AudioError, AudioResult};

/// 样本编码
///
/// 数值与经典C解码库的格式枚举保持一致，可直接跨FFI边界以 `u32` 传递。
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SampleFormat {
    /// 未知/未协商（配置中表示"使用原生格式"）
    #[default]
    Unknown = 0,
    U8 = 1,
    S16 = 2,
    /// 24位打包（每样本3字节）
    S24 = 3,
    S32 = 4,
    F32 = 5,
}

impl SampleFormat {
    /// 从原始数值解析，不认识的值返回 `None`
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(Self::Unknown),
            1 => Some(Self::U8),
            2 => Some(Self::S16),
            3 => Some(Self::S24),
            4 => Some(Self::S32),
            5 => Some(Self::F32),
            _ => None,
        }
    }

    /// 原始数值
    #[inline]
    pub fn as_raw(self) -> u32 {
        self as u32
    }

    /// 每样本字节数（Unknown 为0）
    pub fn bytes_per_sample(self) -> usize {
        match self {
            Self::Unknown => 0,
            Self::U8 => 1,
            Self::S16 => 2,
            Self::S24 => 3,
            Self::S32 | Self::F32 => 4,
        }
    }

    /// 显示名称
    pub fn name(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::U8 => "u8",
            Self::S16 => "s16",
            Self::S24 => "s24",
            Self::S32 => "s32",
            Self::F32 => "f32",
        }
    }

    /// 从名称解析（CLI使用），大小写不敏感
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "u8" => Some(Self::U8),
            "s16" => Some(Self::S16),
            "s24" => Some(Self::S24),
            "s32" => Some(Self::S32),
            "f32" => Some(Self::F32),
            "native" | "unknown" => Some(Self::Unknown),
            _ => None,
        }
    }

    /// 将交错的归一化样本编码为本格式（本机字节序）
    ///
    /// `dst` 长度必须等于 `src.len() * bytes_per_sample()`。
    /// 整数格式按 2^(bits-1) 缩放，与解码端的归一化系数对称。
    /// 中间值为f64，32位整数样本也能无损往返。
    pub fn encode_samples(self, src: &[f64], dst: &mut [u8]) {
        debug_assert_eq!(dst.len(), src.len() * self.bytes_per_sample());

        match self {
            Self::Unknown => {}
            Self::U8 => {
                for (s, d) in src.iter().zip(dst.iter_mut()) {
                    *d = (s * 128.0 + 128.0).round().clamp(0.0, 255.0) as u8;
                }
            }
            Self::S16 => {
                for (s, d) in src.iter().zip(dst.chunks_exact_mut(2)) {
                    let v = (s * 32768.0).round().clamp(-32768.0, 32767.0) as i16;
                    d.copy_from_slice(&v.to_ne_bytes());
                }
            }
            Self::S24 => {
                for (s, d) in src.iter().zip(dst.chunks_exact_mut(3)) {
                    let v = (s * 8388608.0).round().clamp(-8388608.0, 8388607.0) as i32;
                    let bytes = v.to_le_bytes();
                    if cfg!(target_endian = "little") {
                        d.copy_from_slice(&bytes[..3]);
                    } else {
                        d.copy_from_slice(&[bytes[2], bytes[1], bytes[0]]);
                    }
                }
            }
            Self::S32 => {
                for (s, d) in src.iter().zip(dst.chunks_exact_mut(4)) {
                    let v = (s * 2147483648.0)
                        .round()
                        .clamp(-2147483648.0, 2147483647.0) as i32;
                    d.copy_from_slice(&v.to_ne_bytes());
                }
            }
            Self::F32 => {
                for (s, d) in src.iter().zip(dst.chunks_exact_mut(4)) {
                    d.copy_from_slice(&(*s as f32).to_ne_bytes());
                }
            }
        }
    }
}

/// 已协商的输出格式快照
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputInfo {
    pub format: SampleFormat,
    pub channels: u32,
    pub sample_rate: u32,
}

impl OutputInfo {
    /// 每帧字节数
    pub fn bytes_per_frame(&self) -> usize {
        self.format.bytes_per_sample() * self.channels as usize
    }

    /// 帧数对应的时长（秒）
    pub fn duration_seconds(&self, frames: u64) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        frames as f64 / self.sample_rate as f64
    }
}

/// 解码配置
///
/// 零值/Unknown 表示沿用流的原生参数。
/// 仅支持样本编码转换；声道数与采样率若与原生值不同会被拒绝（不做重采样和混音）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DecoderConfig {
    pub format: SampleFormat,
    pub channels: u32,
    pub sample_rate: u32,
}

impl DecoderConfig {
    pub fn new(format: SampleFormat, channels: u32, sample_rate: u32) -> Self {
        Self {
            format,
            channels,
            sample_rate,
        }
    }

    /// 从FFI原始参数构造
    pub fn from_raw(format: u32, channels: u32, sample_rate: u32) -> AudioResult<Self> {
        let format = SampleFormat::from_raw(format)
            .ok_or_else(|| AudioError::InvalidInput(format!("未知的样本格式编号: {format}")))?;
        Ok(Self::new(format, channels, sample_rate))
    }

    pub fn with_format(mut self, format: SampleFormat) -> Self {
        self.format = format;
        self
    }

    /// 以原生参数为基础协商最终输出格式
    pub fn negotiate(&self, native: &OutputInfo) -> AudioResult<OutputInfo> {
        if self.channels != 0 && self.channels != native.channels {
            return Err(AudioError::InvalidInput(format!(
                "不支持声道重映射: 请求{}声道，原生{}声道",
                self.channels, native.channels
            )));
        }
        if self.sample_rate != 0 && self.sample_rate != native.sample_rate {
            return Err(AudioError::InvalidInput(format!(
                "不支持重采样: 请求{}Hz，原生{}Hz",
                self.sample_rate, native.sample_rate
            )));
        }

        let format = match self.format {
            SampleFormat::Unknown => native.format,
            requested => requested,
        };

        Ok(OutputInfo {
            format,
            channels: native.channels,
            sample_rate: native.sample_rate,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn native() -> OutputInfo {
        OutputInfo {
            format: SampleFormat::S16,
            channels: 2,
            sample_rate: 44100,
        }
    }

    #[test]
    fn test_raw_values_match_c_enum() {
        for raw in 0..=5 {
            let format = SampleFormat::from_raw(raw).unwrap();
            assert_eq!(format.as_raw(), raw);
        }
        assert_eq!(SampleFormat::from_raw(6), None);
        assert_eq!(SampleFormat::S16.as_raw(), 2);
        assert_eq!(SampleFormat::F32.as_raw(), 5);
    }

    #[test]
    fn test_bytes_per_frame() {
        assert_eq!(native().bytes_per_frame(), 4);
        let s24_mono = OutputInfo {
            format: SampleFormat::S24,
            channels: 1,
            sample_rate: 48000,
        };
        assert_eq!(s24_mono.bytes_per_frame(), 3);
        assert_eq!(s24_mono.duration_seconds(96000), 2.0);
    }

    #[test]
    fn test_negotiate_native_and_format_override() {
        let config = DecoderConfig::default();
        assert_eq!(config.negotiate(&native()).unwrap(), native());

        let config = DecoderConfig::default().with_format(SampleFormat::F32);
        let info = config.negotiate(&native()).unwrap();
        assert_eq!(info.format, SampleFormat::F32);
        assert_eq!(info.channels, 2);
        assert_eq!(info.sample_rate, 44100);

        // 与原生值相同的显式请求也应被接受
        let config = DecoderConfig::new(SampleFormat::Unknown, 2, 44100);
        assert!(config.negotiate(&native()).is_ok());
    }

    #[test]
    fn test_negotiate_rejects_resampling_and_remapping() {
        let config = DecoderConfig::new(SampleFormat::Unknown, 1, 0);
        assert!(matches!(
            config.negotiate(&native()),
            Err(AudioError::InvalidInput(_))
        ));

        let config = DecoderConfig::new(SampleFormat::Unknown, 0, 48000);
        assert!(matches!(
            config.negotiate(&native()),
            Err(AudioError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_from_raw_rejects_unknown_format_number() {
        assert!(DecoderConfig::from_raw(42, 0, 0).is_err());
        assert_eq!(
            DecoderConfig::from_raw(2, 2, 44100).unwrap(),
            DecoderConfig::new(SampleFormat::S16, 2, 44100)
        );
    }

    #[test]
    fn test_encode_s16_is_lossless_for_16bit_values() {
        let originals: [i16; 5] = [i16::MIN, -1234, 0, 1, i16::MAX];
        let src: Vec<f64> = originals.iter().map(|&s| s as f64 / 32768.0).collect();
        let mut dst = vec![0u8; src.len() * 2];
        SampleFormat::S16.encode_samples(&src, &mut dst);

        let decoded: Vec<i16> = dst
            .chunks_exact(2)
            .map(|b| i16::from_ne_bytes([b[0], b[1]]))
            .collect();
        assert_eq!(decoded, originals);
    }

    #[test]
    fn test_encode_s32_is_lossless_for_32bit_values() {
        // f32只有24位尾数，这些值经f32中转会被舍入
        let originals: [i32; 6] = [i32::MIN, -987654321, 1, 123456789, 2147483633, i32::MAX];
        let src: Vec<f64> = originals.iter().map(|&s| s as f64 / 2147483648.0).collect();
        let mut dst = vec![0u8; src.len() * 4];
        SampleFormat::S32.encode_samples(&src, &mut dst);

        let decoded: Vec<i32> = dst
            .chunks_exact(4)
            .map(|b| i32::from_ne_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        assert_eq!(decoded, originals);
    }

    #[test]
    fn test_encode_clamps_out_of_range() {
        let src = [1.5f64, -2.0];
        let mut dst = vec![0u8; 4];
        SampleFormat::S16.encode_samples(&src, &mut dst);
        assert_eq!(i16::from_ne_bytes([dst[0], dst[1]]), i16::MAX);
        assert_eq!(i16::from_ne_bytes([dst[2], dst[3]]), i16::MIN);

        let mut dst = vec![0u8; 2];
        SampleFormat::U8.encode_samples(&src, &mut dst);
        assert_eq!(dst, vec![255, 0]);
    }

    #[test]
    fn test_encode_s24_packs_three_bytes() {
        let src = [-1.0f64, 0.5];
        let mut dst = vec![0u8; 6];
        SampleFormat::S24.encode_samples(&src, &mut dst);
        if cfg!(target_endian = "little") {
            // -8388608 = 0x800000, 4194304 = 0x400000
            assert_eq!(dst, vec![0x00, 0x00, 0x80, 0x00, 0x00, 0x40]);
        }
    }

    #[test]
    fn test_format_names_parse_for_cli() {
        for format in [
            SampleFormat::U8,
            SampleFormat::S16,
            SampleFormat::S24,
            SampleFormat::S32,
            SampleFormat::F32,
        ] {
            assert_eq!(SampleFormat::from_name(format.name()), Some(format));
        }
        assert_eq!(SampleFormat::from_name("NATIVE"), Some(SampleFormat::Unknown));
        assert_eq!(SampleFormat::from_name("s12"), None);
    }
}
