//! bsondump
//!
//! 从文件读取 BSON 文档并逐节点输出，或检查并修复文档头中的文档大小。

pub mod config;
pub mod dump;
pub mod formatter;
pub mod visitor;

pub use config::DumpConfig;
pub use dump::{check_docsize, dump_file, DocsizeReport, DocsizeStatus, DumpOptions, DumpReport};
pub use formatter::{Formatter, OutputFormat};
pub use visitor::{DocsizeVisitor, PrintVisitor};

use bsondump_codec::BsonError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("Invalid argument: {0}")]
    Argument(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("{op} {} failed: {source} ({})", .path.display(), .source.raw_os_error().unwrap_or(-1))]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Output error: {0}")]
    Output(#[source] io::Error),

    #[error("No data: stream ended in the middle of an element")]
    NoData,

    #[error("Decode error: {0}")]
    Decode(#[source] BsonError),
}

impl CliError {
    pub(crate) fn io(op: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        CliError::Io {
            op,
            path: path.into(),
            source,
        }
    }
}

pub type CliResult<T> = Result<T, CliError>;

/// 进程退出状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Success,
    /// 转储过程中打开、读取或解码失败
    Failure,
    /// 文档头已被修复
    Repaired,
    NoData,
    /// 参数、配置或 docsize 过程中的错误
    Error,
}

impl ExitStatus {
    pub fn code(self) -> u8 {
        match self {
            ExitStatus::Success => 0,
            ExitStatus::Failure | ExitStatus::Repaired => 1,
            ExitStatus::NoData => 3,
            ExitStatus::Error => 255,
        }
    }

    pub fn for_dump(result: &CliResult<DumpReport>) -> Self {
        match result {
            Ok(_) => ExitStatus::Success,
            Err(CliError::NoData) => ExitStatus::NoData,
            Err(CliError::Argument(_)) | Err(CliError::Config(_)) => ExitStatus::Error,
            Err(_) => ExitStatus::Failure,
        }
    }

    pub fn for_docsize(result: &CliResult<DocsizeReport>) -> Self {
        match result {
            Ok(report) if report.status == DocsizeStatus::Repaired => ExitStatus::Repaired,
            Ok(_) => ExitStatus::Success,
            Err(CliError::NoData) => ExitStatus::NoData,
            Err(_) => ExitStatus::Error,
        }
    }
}

/// 初始化日志，输出到 stderr；`RUST_LOG` 优先于传入的级别
pub fn init_logging(level: &str) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(fmt::layer()
            .with_writer(io::stderr)
            .with_target(false))
        .with(filter)
        .init();
}
