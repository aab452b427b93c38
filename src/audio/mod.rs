//! 音频解码模块
//!
//! 句柄背后的解码后端（symphonia）以及输出格式定义。

mod decoder;
mod format;

pub use decoder::Decoder;
pub use format::{DecoderConfig, OutputInfo, SampleFormat};
