//! 两种节点访问策略
//!
//! - [`PrintVisitor`]: 逐个节点输出，未知类型输出错误行后继续
//! - [`DocsizeVisitor`]: 不输出，只在顶层结束标记处停止，用于统计文档大小

use crate::formatter::Formatter;
use bsondump_codec::{Node, Visit, Visitor};
use std::io::{self, Write};
use tracing::debug;

/// 打印访问者
///
/// 写入失败时保存 IO 错误并返回 `Visit::Error`，由驱动通过 [`PrintVisitor::take_error`] 取回。
pub struct PrintVisitor<W: Write> {
    out: W,
    formatter: Formatter,
    error: Option<io::Error>,
}

impl<W: Write> PrintVisitor<W> {
    pub fn new(out: W, formatter: Formatter) -> Self {
        Self {
            out,
            formatter,
            error: None,
        }
    }

    pub fn out(&mut self) -> &mut W {
        &mut self.out
    }

    pub fn take_error(&mut self) -> Option<io::Error> {
        self.error.take()
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> Visitor for PrintVisitor<W> {
    fn visit(&mut self, node: &Node<'_>) -> Visit {
        if let Err(e) = self.formatter.write_node(&mut self.out, node) {
            let code = e.raw_os_error().unwrap_or(-1);
            self.error = Some(e);
            return Visit::Error(code);
        }

        if node.depth == 0 && node.value.is_end_of_object() {
            return Visit::Stop;
        }
        // 未知类型已输出错误行，跳过继续
        Visit::Continue
    }
}

/// 文档大小访问者
#[derive(Debug, Default, Clone, Copy)]
pub struct DocsizeVisitor;

impl Visitor for DocsizeVisitor {
    fn visit(&mut self, node: &Node<'_>) -> Visit {
        if node.depth == 0 && node.value.is_end_of_object() {
            debug!("end of parameters");
            return Visit::Stop;
        }
        Visit::Continue
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formatter::OutputFormat;
    use bsondump_codec::{Decoder, Encoder, NodeValue};

    #[test]
    fn test_print_visitor_skips_unhandled_types() {
        // { "a": int32(1), "?": <0x20>, "b": bool(true) }
        let bytes = [
            0x16, 0x00, 0x00, 0x00, // size 22
            0x10, b'a', 0x00, 0x01, 0x00, 0x00, 0x00, // int32
            0x20, b'?', 0x00, // unknown
            0x08, b'b', 0x00, 0x01, // bool
            0x00,
        ];
        let visitor = PrintVisitor::new(Vec::new(), Formatter::new(OutputFormat::Text, false));
        let mut decoder = Decoder::new(&bytes[..], visitor).unwrap();
        decoder.run().unwrap();
        let (visitor, state) = decoder.into_parts();

        assert!(state.sizes_match());
        let text = String::from_utf8(visitor.into_inner()).unwrap();
        assert_eq!(
            text,
            "BSON_INT32:  a = 1\n\
             ERROR ? unhandled bson type 32\n\
             BSON_BOOL:   b = 1\n\
             BSON_EOO\n"
        );
    }

    #[test]
    fn test_print_visitor_nested_indentation() {
        let mut enc = Encoder::new();
        enc.begin_document("sub").unwrap();
        enc.append_int64("n", 3).unwrap();
        enc.end().unwrap();
        let bytes = enc.finish().unwrap();

        let visitor = PrintVisitor::new(Vec::new(), Formatter::new(OutputFormat::Text, false));
        let mut decoder = Decoder::new(&bytes[..], visitor).unwrap();
        decoder.run().unwrap();
        let text = String::from_utf8(decoder.into_parts().0.into_inner()).unwrap();
        assert_eq!(
            text,
            "BSON_OBJECT: sub = {\n\
             BSON_INT64:    n = 3\n\
             BSON_EOO\n\
             BSON_EOO\n"
        );
    }

    struct FailingWriter;

    impl Write for FailingWriter {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::from_raw_os_error(32))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_print_visitor_write_failure() {
        let mut visitor =
            PrintVisitor::new(FailingWriter, Formatter::new(OutputFormat::Text, false));
        let node = Node {
            name: "a",
            depth: 0,
            value: NodeValue::Int32(1),
        };
        assert_eq!(visitor.visit(&node), Visit::Error(32));
        assert_eq!(visitor.take_error().and_then(|e| e.raw_os_error()), Some(32));
        assert!(visitor.take_error().is_none());
    }

    #[test]
    fn test_docsize_visitor_stops_only_at_top_level() {
        let mut visitor = DocsizeVisitor;
        let nested_end = Node {
            name: "",
            depth: 1,
            value: NodeValue::EndOfObject,
        };
        let top_end = Node {
            name: "",
            depth: 0,
            value: NodeValue::EndOfObject,
        };
        let field = Node {
            name: "x",
            depth: 0,
            value: NodeValue::Null,
        };
        assert_eq!(visitor.visit(&field), Visit::Continue);
        assert_eq!(visitor.visit(&nested_end), Visit::Continue);
        assert_eq!(visitor.visit(&top_end), Visit::Stop);
    }
}
