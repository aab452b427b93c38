//! decoder-info - 主程序入口
//!
//! 逐个打开输入文件，打印解码器句柄协商出的输出格式。

use audio_decoder_handle::{
    error::{AudioError, ErrorCategory},
    tools::{self, AppConfig},
};
use std::process;

/// 错误退出码定义
mod exit_codes {
    /// 通用错误
    pub const GENERAL_ERROR: i32 = 1;
    /// 格式/输入错误
    pub const FORMAT_ERROR: i32 = 2;
    /// 解码失败
    pub const DECODING_ERROR: i32 = 3;
    /// 内存错误
    pub const MEMORY_ERROR: i32 = 4;
}

/// 获取错误建议文本
fn get_error_suggestion(category: ErrorCategory) -> &'static str {
    match category {
        ErrorCategory::Input => {
            "检查命令行参数；句柄不做重采样或混音，只能转换样本格式 / Check arguments; only sample format conversion is supported"
        }
        ErrorCategory::Io => {
            "检查文件路径是否正确，文件是否存在且可读 / Check if file path is correct, file exists and is readable"
        }
        ErrorCategory::Format => {
            "确保输入文件为支持的格式 (OGG/Vorbis, WAV, FLAC, MP3) / Ensure input file is in a supported format"
        }
        ErrorCategory::Decoding => {
            "文件可能损坏或使用不支持的音频编码 / File may be corrupted or use unsupported audio encoding"
        }
        ErrorCategory::Memory => "内存不足 / Out of memory",
    }
}

fn exit_code(category: ErrorCategory) -> i32 {
    match category {
        ErrorCategory::Input | ErrorCategory::Format => exit_codes::FORMAT_ERROR,
        ErrorCategory::Decoding => exit_codes::DECODING_ERROR,
        ErrorCategory::Memory => exit_codes::MEMORY_ERROR,
        ErrorCategory::Io => exit_codes::GENERAL_ERROR,
    }
}

/// 初始化日志：RUST_LOG 优先，否则 verbose 时为 debug
fn init_logging(config: &AppConfig) {
    let default_level = if config.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();
}

/// 应用程序主逻辑，返回最后一个失败文件的错误
fn run(config: &AppConfig) -> Result<(), AudioError> {
    let mut last_error = None;

    for (index, path) in config.inputs.iter().enumerate() {
        if index > 0 {
            println!();
        }

        match tools::inspect_audio_file(path, config) {
            Ok(report) => print!("{}", tools::format_report(&report)),
            Err(e) => {
                let category = e.category();
                eprintln!(
                    "[FAIL] {} - [{}] {e}",
                    path.display(),
                    category.display_name()
                );
                if config.verbose
                    && let Some(source) = std::error::Error::source(&e)
                {
                    eprintln!("      原因 / Cause: {source}");
                }
                last_error = Some(e);
            }
        }
    }

    match last_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

fn main() {
    let config = tools::parse_args();
    init_logging(&config);

    if let Err(error) = run(&config) {
        let category = error.category();
        eprintln!("[INFO] 建议 / Suggestion: {}", get_error_suggestion(category));
        process::exit(exit_code(category));
    }
}
