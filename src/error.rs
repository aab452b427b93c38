//! 统一错误处理框架
//!
//! 解码器句柄与解码后端共用的错误类型定义。
//! 句柄管理本身只有一种失败（内存不足），其余错误来自解码后端。

use std::fmt;
use std::io;
use thiserror::Error;

/// 音频处理相关的统一错误类型
#[derive(Debug, Error)]
pub enum AudioError {
    /// 输入验证错误（参数、配置不合法）
    #[error("输入验证失败: {0}")]
    InvalidInput(String),

    /// 文件I/O错误
    #[error("文件I/O错误: {0}")]
    IoError(#[from] io::Error),

    /// 音频格式错误（探测失败、无音频轨道、缺少格式参数）
    #[error("音频格式错误: {0}")]
    FormatError(String),

    /// 解码错误
    #[error("音频解码失败: {0}")]
    DecodingError(String),

    /// 内存不足（宿主分配器无法满足请求）
    #[error("内存不足")]
    OutOfMemory,
}

/// 音频处理操作的标准Result类型
pub type AudioResult<T> = Result<T, AudioError>;

// ==================== 错误转换Helper函数 ====================

/// 创建格式错误的helper函数
#[inline]
pub fn format_error<E: fmt::Display>(context: &str, err: E) -> AudioError {
    AudioError::FormatError(format!("{context}: {err}"))
}

/// 创建解码错误的helper函数
#[inline]
pub fn decoding_error<E: fmt::Display>(context: &str, err: E) -> AudioError {
    AudioError::DecodingError(format!("{context}: {err}"))
}

// ==================== 错误分类系统 ====================
// FFI结果码与CLI退出码都按类别映射

/// 错误类别枚举
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub enum ErrorCategory {
    /// 参数或配置错误
    Input,
    /// I/O相关错误（文件不存在、权限不足等）
    Io,
    /// 格式相关错误（不支持的格式、格式损坏等）
    Format,
    /// 解码相关错误
    Decoding,
    /// 内存不足
    Memory,
}

impl ErrorCategory {
    /// 从AudioError提取错误类别
    pub fn from_audio_error(e: &AudioError) -> Self {
        match e {
            AudioError::InvalidInput(_) => Self::Input,
            AudioError::IoError(_) => Self::Io,
            AudioError::FormatError(_) => Self::Format,
            AudioError::DecodingError(_) => Self::Decoding,
            AudioError::OutOfMemory => Self::Memory,
        }
    }

    /// 获取错误类别的显示名称
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Input => "参数错误",
            Self::Io => "I/O错误",
            Self::Format => "格式错误",
            Self::Decoding => "解码错误",
            Self::Memory => "内存错误",
        }
    }
}

impl AudioError {
    /// 错误类别（便捷方法）
    #[inline]
    pub fn category(&self) -> ErrorCategory {
        ErrorCategory::from_audio_error(self)
    }
}
