//! 音频解码器句柄
//!
//! 面向FFI调用方（托管语言运行时）的解码器句柄层：
//! 分配/释放/查询句柄大小，读取句柄已协商的输出格式、声道数与采样率。
//! 解码本身（容器解析、比特流解码，包括OGG/Vorbis）完全委托给symphonia。
//!
//! ## 接口层次
//! - [`ffi`]：`extern "C"` 函数集，空指针安全
//! - [`handle`]：`#[repr(C)]` 句柄与拥有所有权的 [`DecoderBox`]
//! - [`audio`]：解码后端与输出格式协商

pub mod audio;
pub mod error;
pub mod ffi;
pub mod handle;
pub mod tools;

// 重新导出核心类型
pub use audio::{Decoder, DecoderConfig, OutputInfo, SampleFormat};
pub use error::{AudioError, AudioResult, ErrorCategory};
pub use handle::{DecoderBox, DecoderHandle, alloc_handle, free_handle, get_output_info};
