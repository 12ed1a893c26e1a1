//! 配置模块
//!
//! bsondump 的运行配置:
//! - 日志级别
//! - 输出格式与颜色
//! - 解码器限制（嵌套层数、键名长度、字符串长度）
//!
//! 支持从 TOML 文件加载配置，命令行参数覆盖文件中的值。

use crate::dump::DumpOptions;
use crate::formatter::OutputFormat;
use crate::{CliError, CliResult};
use bsondump_codec::spec::{MAX_NAME_LENGTH, MAX_NESTING_DEPTH, MAX_STRING_LENGTH};
use bsondump_codec::DecoderOptions;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// bsondump 主配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DumpConfig {
    /// 日志级别 (默认: warn)，`RUST_LOG` 优先
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// 输出格式: text | json (默认: text)
    #[serde(default = "default_format")]
    pub format: String,

    /// 文本输出是否着色 (默认: true)
    #[serde(default = "default_color")]
    pub color: bool,

    /// 解码器限制
    #[serde(default)]
    pub decoder: DecoderConfig,
}

fn default_log_level() -> String { "warn".to_string() }
fn default_format() -> String { "text".to_string() }
fn default_color() -> bool { true }

/// 解码器限制配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecoderConfig {
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,

    #[serde(default = "default_max_name_len")]
    pub max_name_len: usize,

    #[serde(default = "default_max_string_len")]
    pub max_string_len: usize,
}

fn default_max_depth() -> usize { MAX_NESTING_DEPTH }
fn default_max_name_len() -> usize { MAX_NAME_LENGTH }
fn default_max_string_len() -> usize { MAX_STRING_LENGTH }

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            max_name_len: default_max_name_len(),
            max_string_len: default_max_string_len(),
        }
    }
}

impl Default for DumpConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            format: default_format(),
            color: default_color(),
            decoder: DecoderConfig::default(),
        }
    }
}

impl DumpConfig {
    /// # Brief
    /// 从 TOML 文件加载配置
    ///
    /// # Arguments
    /// * `path` - 配置文件路径
    ///
    /// # Returns
    /// 解析后的配置实例
    pub fn from_file(path: &Path) -> CliResult<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| CliError::Config(format!("Failed to read config: {}", e)))?;

        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> CliResult<Self> {
        toml::from_str(content)
            .map_err(|e| CliError::Config(format!("Failed to parse config: {}", e)))
    }

    pub fn to_toml(&self) -> CliResult<String> {
        toml::to_string_pretty(self)
            .map_err(|e| CliError::Config(format!("Failed to serialize config: {}", e)))
    }

    /// 校验配置并转换为驱动选项
    pub fn dump_options(&self) -> CliResult<DumpOptions> {
        let format = OutputFormat::parse(&self.format).ok_or_else(|| {
            CliError::Config(format!("Unknown output format: {}", self.format))
        })?;

        if self.decoder.max_depth == 0 {
            return Err(CliError::Config("max_depth must be at least 1".to_string()));
        }

        Ok(DumpOptions {
            decoder: DecoderOptions {
                max_depth: self.decoder.max_depth,
                max_name_len: self.decoder.max_name_len,
                max_string_len: self.decoder.max_string_len,
            },
            format,
            color: self.color,
        })
    }
}
