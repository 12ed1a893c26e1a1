//! 转储与文档大小检查
//!
//! - [`dump_file`]: 打开文件，逐节点输出，最后输出解码字节数与各类型计数
//! - [`check_docsize`]: 走完整个文档，比较实际解码字节数与文档头；
//!   文档头为 0 时就地写回实际大小

use crate::formatter::{Formatter, OutputFormat};
use crate::visitor::{DocsizeVisitor, PrintVisitor};
use crate::{CliError, CliResult};
use bsondump_codec::{BsonError, Decoder, DecoderOptions, DecoderState};
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{BufReader, Seek, SeekFrom, Write};
use std::path::Path;
use tracing::{error, info, warn};

/// 驱动选项
#[derive(Debug, Clone, Copy, Default)]
pub struct DumpOptions {
    pub decoder: DecoderOptions,
    pub format: OutputFormat,
    pub color: bool,
}

#[derive(Debug, Clone)]
pub struct DumpReport {
    pub state: DecoderState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocsizeStatus {
    Match,
    /// 文档头非 0 且与实际不符，只告警不修改
    Mismatch,
    Repaired,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocsizeReport {
    pub decoded_size: usize,
    pub saved_size: i32,
    pub status: DocsizeStatus,
}

impl fmt::Display for DocsizeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DECODED_SIZE:{} SAVED_SIZE:{}", self.decoded_size, self.saved_size)
    }
}

fn open_reader(path: &Path) -> CliResult<BufReader<File>> {
    let file = File::open(path).map_err(|e| {
        error!("open '{}' failed: {}", path.display(), e);
        CliError::io("open", path, e)
    })?;
    Ok(BufReader::new(file))
}

fn map_decode_error(path: &Path, err: BsonError) -> CliError {
    match err {
        BsonError::NoData => CliError::NoData,
        BsonError::Io(e) => CliError::io("read", path, e),
        other => CliError::Decode(other),
    }
}

/// # Brief
/// 完整转储一个 BSON 文件
///
/// # Arguments
/// * `path` - 输入文件
/// * `options` - 解码限制与输出格式
/// * `out` - 输出目标
///
/// # Returns
/// 成功返回最终解码状态（字节数与各类型计数）
pub fn dump_file<W: Write>(path: &Path, options: &DumpOptions, mut out: W) -> CliResult<DumpReport> {
    let reader = open_reader(path)?;
    let formatter = Formatter::new(options.format, options.color);
    formatter
        .write_preamble(&mut out, path)
        .map_err(CliError::Output)?;

    let visitor = PrintVisitor::new(out, formatter);
    let mut decoder = Decoder::with_options(reader, visitor, options.decoder)
        .map_err(|e| map_decode_error(path, e))?;

    let declared = decoder.state().total_document_size;
    info!(path = %path.display(), document_size = declared, "dump started");
    formatter
        .write_document_size(decoder.visitor_mut().out(), declared)
        .map_err(CliError::Output)?;

    if let Err(e) = decoder.run() {
        if let BsonError::Visitor(_) = e {
            if let Some(io_err) = decoder.visitor_mut().take_error() {
                return Err(CliError::Output(io_err));
            }
        }
        error!("decode of '{}' failed: {}", path.display(), e);
        return Err(map_decode_error(path, e));
    }

    let (visitor, state) = decoder.into_parts();
    if !state.sizes_match() {
        warn!(
            declared = state.total_document_size,
            decoded = state.total_decoded_size,
            "document size header does not match decoded size"
        );
    }

    let mut out = visitor.into_inner();
    formatter
        .write_summary(&mut out, &state)
        .map_err(CliError::Output)?;
    out.flush().map_err(CliError::Output)?;

    info!(decoded = state.total_decoded_size, "dump finished");
    Ok(DumpReport { state })
}

/// 不输出地走完整个文档；文档头读取成功后的解码失败会带回已走过的状态
fn walk_document(
    path: &Path,
    options: &DumpOptions,
) -> Result<DecoderState, (CliError, Option<DecoderState>)> {
    let reader = open_reader(path).map_err(|e| (e, None))?;
    let mut decoder = Decoder::with_options(reader, DocsizeVisitor, options.decoder)
        .map_err(|e| (map_decode_error(path, e), None))?;

    match decoder.run() {
        Ok(()) => Ok(decoder.into_parts().1),
        Err(e) => {
            error!("docsize walk of '{}' failed: {}", path.display(), e);
            let partial = decoder.state().clone();
            Err((map_decode_error(path, e), Some(partial)))
        }
    }
}

/// # Brief
/// 检查文档头中的文档大小，必要时修复
///
/// 仅当文档头为 0 且整个文档解码成功时才写回实际大小。
/// 解码失败不会触发修复。
///
/// # Arguments
/// * `path` - 输入文件，修复时以读写方式重新打开
/// * `options` - 解码限制
pub fn check_docsize(path: &Path, options: &DumpOptions) -> CliResult<DocsizeReport> {
    let state = match walk_document(path, options) {
        Ok(state) => state,
        Err((err, partial)) => {
            if let Some(partial) = partial {
                eprintln!(
                    "DECODED_SIZE:{} SAVED_SIZE:{}",
                    partial.total_decoded_size, partial.total_document_size
                );
            }
            return Err(err);
        }
    };

    let decoded_size = state.total_decoded_size;
    let saved_size = state.total_document_size;

    let status = if state.sizes_match() {
        DocsizeStatus::Match
    } else if saved_size == 0 {
        warn!(decoded = decoded_size, "document size header is 0, repairing");
        write_document_size(path, decoded_size)?;
        DocsizeStatus::Repaired
    } else {
        warn!(
            decoded = decoded_size,
            saved = saved_size,
            "document size mismatch, header left unchanged"
        );
        DocsizeStatus::Mismatch
    };

    Ok(DocsizeReport {
        decoded_size,
        saved_size,
        status,
    })
}

fn write_document_size(path: &Path, size: usize) -> CliResult<()> {
    let size = i32::try_from(size).map_err(|_| {
        CliError::Decode(BsonError::InvalidDocument(format!(
            "decoded size {} does not fit the header",
            size
        )))
    })?;

    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .map_err(|e| CliError::io("open", path, e))?;
    file.seek(SeekFrom::Start(0))
        .map_err(|e| CliError::io("seek", path, e))?;
    file.write_all(&size.to_le_bytes())
        .map_err(|e| CliError::io("write", path, e))?;
    file.sync_all()
        .map_err(|e| CliError::io("sync", path, e))?;

    info!(path = %path.display(), size, "document size header rewritten");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bsondump_codec::Encoder;
    use std::fs;
    use tempfile::NamedTempFile;

    /// 42 字节: int32 a, string s, double d, bool b
    fn sample_document() -> Vec<u8> {
        let mut enc = Encoder::new();
        enc.append_int32("a", 7).unwrap();
        enc.append_string("s", "hello!!").unwrap();
        enc.append_double("d", 1.5).unwrap();
        enc.append_bool("b", true).unwrap();
        let bytes = enc.finish().unwrap();
        assert_eq!(bytes.len(), 42);
        bytes
    }

    fn file_with(bytes: &[u8]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(bytes).unwrap();
        file.flush().unwrap();
        file
    }

    fn with_header(mut bytes: Vec<u8>, header: i32) -> Vec<u8> {
        bytes[..4].copy_from_slice(&header.to_le_bytes());
        bytes
    }

    fn plain() -> DumpOptions {
        DumpOptions {
            color: false,
            ..Default::default()
        }
    }

    #[test]
    fn test_docsize_repairs_zero_header() {
        let file = file_with(&with_header(sample_document(), 0));

        let report = check_docsize(file.path(), &plain()).unwrap();
        assert_eq!(report.status, DocsizeStatus::Repaired);
        assert_eq!(report.to_string(), "DECODED_SIZE:42 SAVED_SIZE:0");

        let repaired = fs::read(file.path()).unwrap();
        assert_eq!(repaired, sample_document());

        // 再次检查不再修改
        let again = check_docsize(file.path(), &plain()).unwrap();
        assert_eq!(again.status, DocsizeStatus::Match);
        assert_eq!(again.to_string(), "DECODED_SIZE:42 SAVED_SIZE:42");
        assert_eq!(fs::read(file.path()).unwrap(), repaired);
    }

    #[test]
    fn test_docsize_nonzero_mismatch_is_not_mutated() {
        let bytes = with_header(sample_document(), 10);
        let file = file_with(&bytes);

        let report = check_docsize(file.path(), &plain()).unwrap();
        assert_eq!(report.status, DocsizeStatus::Mismatch);
        assert_eq!(report.decoded_size, 42);
        assert_eq!(report.saved_size, 10);
        assert_eq!(fs::read(file.path()).unwrap(), bytes);
    }

    #[test]
    fn test_docsize_decode_failure_never_repairs() {
        let mut bytes = with_header(sample_document(), 0);
        bytes.truncate(20);
        let file = file_with(&bytes);

        assert!(matches!(
            check_docsize(file.path(), &plain()),
            Err(CliError::NoData)
        ));
        assert_eq!(fs::read(file.path()).unwrap(), bytes);
    }

    #[test]
    fn test_dump_empty_document() {
        let file = file_with(&[0x05, 0x00, 0x00, 0x00, 0x00]);
        let mut out = Vec::new();

        let report = dump_file(file.path(), &plain(), &mut out).unwrap();
        assert_eq!(report.state.total_decoded_size, 5);
        assert_eq!(report.state.counts.total(), 0);

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[0].starts_with("[bsondump] reading from "));
        assert_eq!(lines[1], "BSON document size 5");
        assert_eq!(lines[2], "BSON_EOO");
        assert_eq!(
            lines[3],
            "BSON decoded 5 bytes (double:0, string:0, bin:0, bool:0, int32:0, int64:0)"
        );
        assert_eq!(lines.len(), 4);
    }

    #[test]
    fn test_dump_counts_types() {
        let file = file_with(&sample_document());
        let mut out = Vec::new();

        let report = dump_file(file.path(), &plain(), &mut out).unwrap();
        let counts = report.state.counts;
        assert_eq!(
            (counts.int32, counts.string, counts.double, counts.boolean),
            (1, 1, 1, 1)
        );

        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("BSON_STRING: s = \"hello!!\"\n"));
        assert!(text.ends_with(
            "BSON decoded 42 bytes (double:1, string:1, bin:0, bool:1, int32:1, int64:0)\n"
        ));
    }

    #[test]
    fn test_dump_json_format() {
        let file = file_with(&sample_document());
        let mut out = Vec::new();
        let options = DumpOptions {
            format: OutputFormat::Json,
            ..plain()
        };

        dump_file(file.path(), &options, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<serde_json::Value> = text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        // 4 个字段 + 结束标记 + 汇总
        assert_eq!(lines.len(), 6);
        assert_eq!(lines[1]["value"], "hello!!");
        assert_eq!(lines[5]["decoded_size"], 42);
    }

    #[test]
    fn test_dump_truncated_file() {
        let mut bytes = sample_document();
        bytes.truncate(30);
        let file = file_with(&bytes);

        let result = dump_file(file.path(), &plain(), Vec::new());
        assert!(matches!(result, Err(CliError::NoData)));
    }

    #[test]
    fn test_dump_short_header() {
        let file = file_with(&[0x05, 0x00]);
        let result = dump_file(file.path(), &plain(), Vec::new());
        assert!(matches!(result, Err(CliError::Io { op: "read", .. })));
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.bson");

        assert!(matches!(
            dump_file(&path, &plain(), Vec::new()),
            Err(CliError::Io { op: "open", .. })
        ));
        assert!(matches!(
            check_docsize(&path, &plain()),
            Err(CliError::Io { op: "open", .. })
        ));
    }

    /// { "s": "\xFF", "n": int32(5) }，21 字节
    fn invalid_utf8_document(header: i32) -> Vec<u8> {
        let mut bytes = vec![
            0x00, 0x00, 0x00, 0x00,
            0x02, b's', 0x00, 0x02, 0x00, 0x00, 0x00, 0xFF, 0x00,
            0x10, b'n', 0x00, 0x05, 0x00, 0x00, 0x00,
            0x00,
        ];
        bytes[..4].copy_from_slice(&header.to_le_bytes());
        bytes
    }

    #[test]
    fn test_dump_continues_past_invalid_utf8() {
        let file = file_with(&invalid_utf8_document(21));
        let mut out = Vec::new();

        let report = dump_file(file.path(), &plain(), &mut out).unwrap();
        assert_eq!(report.state.total_decoded_size, 21);
        assert_eq!(report.state.counts.int32, 1);

        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("BSON_STRING: s = "));
        assert!(text.contains('\u{FFFD}'));
        assert!(text.contains("BSON_INT32:  n = 5\n"));
    }

    #[test]
    fn test_docsize_repairs_despite_invalid_utf8() {
        let file = file_with(&invalid_utf8_document(0));

        let report = check_docsize(file.path(), &plain()).unwrap();
        assert_eq!(report.status, DocsizeStatus::Repaired);
        assert_eq!(fs::read(file.path()).unwrap(), invalid_utf8_document(21));
    }

    #[test]
    fn test_repair_open_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("gone.bson");

        assert!(matches!(
            write_document_size(&missing, 42),
            Err(CliError::Io { op: "open", .. })
        ));
        assert!(!missing.exists());

        // 目录不能以写方式打开
        assert!(matches!(
            write_document_size(dir.path(), 42),
            Err(CliError::Io { op: "open", .. })
        ));
        assert!(dir.path().is_dir());
    }

    #[test]
    fn test_missing_file_writes_no_preamble() {
        let dir = tempfile::tempdir().unwrap();
        let mut out = Vec::new();

        let result = dump_file(&dir.path().join("missing.bson"), &plain(), &mut out);
        assert!(matches!(result, Err(CliError::Io { op: "open", .. })));
        assert!(out.is_empty());
    }

    #[test]
    fn test_walk_failure_keeps_partial_sizes() {
        let mut bytes = with_header(sample_document(), 0);
        bytes.truncate(20);
        let file = file_with(&bytes);

        let (err, partial) = walk_document(file.path(), &plain()).unwrap_err();
        assert!(matches!(err, CliError::NoData));
        let partial = partial.unwrap();
        assert_eq!(partial.total_document_size, 0);
        assert_eq!(partial.total_decoded_size, 20);

        let (err, partial) = walk_document(&file.path().with_extension("none"), &plain())
            .unwrap_err();
        assert!(matches!(err, CliError::Io { op: "open", .. }));
        assert!(partial.is_none());
    }
}
