//! 工具模块集合
//!
//! `decoder-info` 命令行工具使用的参数解析与文件探测。

pub mod cli;
pub mod processor;

pub use cli::{AppConfig, build_command, config_from_matches, parse_args};
pub use processor::{DecodeStats, InspectReport, decode_frames, format_report, inspect_audio_file};
