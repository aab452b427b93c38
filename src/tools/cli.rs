//! 命令行接口模块
//!
//! 负责命令行参数解析和配置管理。

use crate::audio::{DecoderConfig, SampleFormat};
use clap::{Arg, ArgMatches, Command};
use std::path::PathBuf;

/// 应用程序版本信息
const VERSION: &str = env!("CARGO_PKG_VERSION");
const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

/// 应用程序配置
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// 待探测的音频文件
    pub inputs: Vec<PathBuf>,

    /// 请求的输出样本格式（Unknown 表示原生）
    pub format: SampleFormat,

    /// 试解码的帧数（可选）
    pub frames: Option<u64>,

    /// 是否显示详细信息
    pub verbose: bool,
}

impl AppConfig {
    /// 对应的解码配置
    #[inline]
    pub fn decoder_config(&self) -> DecoderConfig {
        DecoderConfig::default().with_format(self.format)
    }
}

fn parse_format(value: &str) -> Result<SampleFormat, String> {
    SampleFormat::from_name(value)
        .ok_or_else(|| format!("未知的样本格式: {value}（可选 native/u8/s16/s24/s32/f32）"))
}

/// 构建命令行定义
pub fn build_command() -> Command {
    Command::new("decoder-info")
        .version(VERSION)
        .about(DESCRIPTION)
        .author("MacinMeter Team")
        .arg(
            Arg::new("INPUT")
                .help("音频文件路径 (支持OGG/Vorbis, WAV, FLAC, MP3)")
                .required(true)
                .num_args(1..)
                .value_parser(clap::value_parser!(PathBuf))
                .index(1),
        )
        .arg(
            Arg::new("format")
                .long("format")
                .short('f')
                .help("请求的输出样本格式")
                .value_name("FORMAT")
                .default_value("native")
                .value_parser(parse_format),
        )
        .arg(
            Arg::new("frames")
                .long("frames")
                .short('n')
                .help("试解码指定帧数并报告峰值")
                .value_name("N")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .help("显示详细处理信息（启用debug日志）")
                .action(clap::ArgAction::SetTrue),
        )
}

/// 从解析结果创建配置
pub fn config_from_matches(matches: &ArgMatches) -> AppConfig {
    AppConfig {
        inputs: matches
            .get_many::<PathBuf>("INPUT")
            .map(|paths| paths.cloned().collect())
            .unwrap_or_default(),
        format: matches
            .get_one::<SampleFormat>("format")
            .copied()
            .unwrap_or_default(),
        frames: matches.get_one::<u64>("frames").copied(),
        verbose: matches.get_flag("verbose"),
    }
}

/// 解析命令行参数并创建配置
pub fn parse_args() -> AppConfig {
    config_from_matches(&build_command().get_matches())
}
