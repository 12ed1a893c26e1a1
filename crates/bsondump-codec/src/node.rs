//! 解码节点模块
//!
//! 定义解码器每一步产生的节点视图 [`Node`]，以及节点类型计数 [`NodeCounts`]。
//! 节点借用解码器内部缓冲区，只在一次 `next` 调用期间有效。

use crate::spec::ElementType;
use serde::Serialize;
use std::fmt;

/// 单个已解码元素的只读视图
#[derive(Debug, Clone, PartialEq)]
pub struct Node<'a> {
    /// 元素键名（结束标记没有键名，为空字符串）
    pub name: &'a str,
    /// 所在文档的嵌套深度，顶层文档为 0
    pub depth: usize,
    pub value: NodeValue<'a>,
}

/// 节点值
///
/// 覆盖 BSON 规范中的全部元素类型，外加一个 `Unrecognized` 变体承载未知类型标记。
/// `Document`、`Array` 与 `JavaScriptWithScope` 只表示嵌套结构的开始，
/// 其内容作为后续节点逐个产生，直到对应的 `EndOfObject`。
#[derive(Debug, Clone, PartialEq)]
pub enum NodeValue<'a> {
    EndOfObject,
    Double(f64),
    String(&'a str),
    Document,
    Array,
    Binary { subtype: u8, data: &'a [u8] },
    Undefined,
    ObjectId([u8; 12]),
    Boolean(bool),
    DateTime(i64),
    Null,
    Regex { pattern: &'a str, options: &'a str },
    DbPointer { namespace: &'a str, id: [u8; 12] },
    JavaScript(&'a str),
    Symbol(&'a str),
    JavaScriptWithScope { code: &'a str },
    Int32(i32),
    Timestamp(u64),
    Int64(i64),
    Decimal128([u8; 16]),
    MinKey,
    MaxKey,
    /// 未知类型标记，值部分不消费任何字节
    Unrecognized(u8),
}

impl NodeValue<'_> {
    /// 原始类型标记字节
    pub fn tag(&self) -> u8 {
        match self.element_type() {
            Some(ty) => ty as u8,
            None => match self {
                NodeValue::Unrecognized(tag) => *tag,
                _ => unreachable!("recognized values always map to an element type"),
            },
        }
    }

    pub fn element_type(&self) -> Option<ElementType> {
        let ty = match self {
            NodeValue::EndOfObject => ElementType::EndOfObject,
            NodeValue::Double(_) => ElementType::Double,
            NodeValue::String(_) => ElementType::String,
            NodeValue::Document => ElementType::Document,
            NodeValue::Array => ElementType::Array,
            NodeValue::Binary { .. } => ElementType::Binary,
            NodeValue::Undefined => ElementType::Undefined,
            NodeValue::ObjectId(_) => ElementType::ObjectId,
            NodeValue::Boolean(_) => ElementType::Boolean,
            NodeValue::DateTime(_) => ElementType::DateTime,
            NodeValue::Null => ElementType::Null,
            NodeValue::Regex { .. } => ElementType::Regex,
            NodeValue::DbPointer { .. } => ElementType::DbPointer,
            NodeValue::JavaScript(_) => ElementType::JavaScript,
            NodeValue::Symbol(_) => ElementType::Symbol,
            NodeValue::JavaScriptWithScope { .. } => ElementType::JavaScriptWithScope,
            NodeValue::Int32(_) => ElementType::Int32,
            NodeValue::Timestamp(_) => ElementType::Timestamp,
            NodeValue::Int64(_) => ElementType::Int64,
            NodeValue::Decimal128(_) => ElementType::Decimal128,
            NodeValue::MinKey => ElementType::MinKey,
            NodeValue::MaxKey => ElementType::MaxKey,
            NodeValue::Unrecognized(_) => return None,
        };
        Some(ty)
    }

    /// 类型名称，用于输出
    pub fn type_name(&self) -> &'static str {
        match self {
            NodeValue::EndOfObject => "BSON_EOO",
            NodeValue::Double(_) => "BSON_DOUBLE",
            NodeValue::String(_) => "BSON_STRING",
            NodeValue::Document => "BSON_OBJECT",
            NodeValue::Array => "BSON_ARRAY",
            NodeValue::Binary { .. } => "BSON_BINDATA",
            NodeValue::Undefined => "BSON_UNDEFINED",
            NodeValue::ObjectId(_) => "BSON_OID",
            NodeValue::Boolean(_) => "BSON_BOOL",
            NodeValue::DateTime(_) => "BSON_DATE",
            NodeValue::Null => "BSON_NULL",
            NodeValue::Regex { .. } => "BSON_REGEX",
            NodeValue::DbPointer { .. } => "BSON_DBPOINTER",
            NodeValue::JavaScript(_) => "BSON_CODE",
            NodeValue::Symbol(_) => "BSON_SYMBOL",
            NodeValue::JavaScriptWithScope { .. } => "BSON_CODEWSCOPE",
            NodeValue::Int32(_) => "BSON_INT32",
            NodeValue::Timestamp(_) => "BSON_TIMESTAMP",
            NodeValue::Int64(_) => "BSON_INT64",
            NodeValue::Decimal128(_) => "BSON_DECIMAL128",
            NodeValue::MinKey => "BSON_MINKEY",
            NodeValue::MaxKey => "BSON_MAXKEY",
            NodeValue::Unrecognized(_) => "BSON_UNKNOWN",
        }
    }

    pub fn is_end_of_object(&self) -> bool {
        matches!(self, NodeValue::EndOfObject)
    }

    /// 是否开启一个嵌套结构
    pub fn opens_scope(&self) -> bool {
        matches!(
            self,
            NodeValue::Document | NodeValue::Array | NodeValue::JavaScriptWithScope { .. }
        )
    }
}

impl fmt::Display for NodeValue<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeValue::EndOfObject => Ok(()),
            NodeValue::Double(d) => write!(f, "{:.6}", d),
            NodeValue::String(s) | NodeValue::Symbol(s) | NodeValue::JavaScript(s) => {
                write!(f, "{:?}", s)
            }
            NodeValue::Document => write!(f, "{{"),
            NodeValue::Array => write!(f, "["),
            NodeValue::Binary { subtype, data } => {
                write!(f, "<{} bytes, subtype 0x{:02x}>", data.len(), subtype)
            }
            NodeValue::Undefined => write!(f, "undefined"),
            NodeValue::ObjectId(id) => write_hex(f, id),
            NodeValue::Boolean(b) => write!(f, "{}", *b as u8),
            NodeValue::DateTime(ms) => write!(f, "{}ms", ms),
            NodeValue::Null => write!(f, "null"),
            NodeValue::Regex { pattern, options } => write!(f, "/{}/{}", pattern, options),
            NodeValue::DbPointer { namespace, id } => {
                write!(f, "{:?} ", namespace)?;
                write_hex(f, id)
            }
            NodeValue::JavaScriptWithScope { code } => write!(f, "{:?} {{", code),
            NodeValue::Int32(n) => write!(f, "{}", n),
            NodeValue::Timestamp(ts) => write!(f, "{}:{}", ts >> 32, ts & 0xFFFF_FFFF),
            NodeValue::Int64(n) => write!(f, "{}", n),
            NodeValue::Decimal128(raw) => write_hex(f, raw),
            NodeValue::MinKey => write!(f, "minkey"),
            NodeValue::MaxKey => write!(f, "maxkey"),
            NodeValue::Unrecognized(tag) => write!(f, "0x{:02x}", tag),
        }
    }
}

fn write_hex(f: &mut fmt::Formatter<'_>, bytes: &[u8]) -> fmt::Result {
    for b in bytes {
        write!(f, "{:02x}", b)?;
    }
    Ok(())
}

/// 各类型节点计数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct NodeCounts {
    pub double: u32,
    pub string: u32,
    pub binary: u32,
    pub boolean: u32,
    pub int32: u32,
    pub int64: u32,
    pub document: u32,
    pub array: u32,
    /// 其余已识别类型与未知类型
    pub other: u32,
}

impl NodeCounts {
    pub(crate) fn record(&mut self, value: &NodeValue<'_>) {
        let counter = match value {
            NodeValue::EndOfObject => return,
            NodeValue::Double(_) => &mut self.double,
            NodeValue::String(_) => &mut self.string,
            NodeValue::Binary { .. } => &mut self.binary,
            NodeValue::Boolean(_) => &mut self.boolean,
            NodeValue::Int32(_) => &mut self.int32,
            NodeValue::Int64(_) => &mut self.int64,
            NodeValue::Document => &mut self.document,
            NodeValue::Array => &mut self.array,
            _ => &mut self.other,
        };
        *counter = counter.saturating_add(1);
    }

    pub fn total(&self) -> u32 {
        self.double
            + self.string
            + self.binary
            + self.boolean
            + self.int32
            + self.int64
            + self.document
            + self.array
            + self.other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_and_type_name() {
        assert_eq!(NodeValue::Int32(1).tag(), 0x10);
        assert_eq!(NodeValue::MinKey.tag(), 0xFF);
        assert_eq!(NodeValue::Unrecognized(0x42).tag(), 0x42);
        assert_eq!(NodeValue::Unrecognized(0x42).element_type(), None);
        assert_eq!(NodeValue::Boolean(true).type_name(), "BSON_BOOL");
    }

    #[test]
    fn test_display() {
        assert_eq!(NodeValue::Double(1.5).to_string(), "1.500000");
        assert_eq!(NodeValue::Boolean(true).to_string(), "1");
        assert_eq!(NodeValue::String("hi").to_string(), "\"hi\"");
        assert_eq!(
            NodeValue::Binary { subtype: 0, data: &[1, 2, 3] }.to_string(),
            "<3 bytes, subtype 0x00>"
        );
        assert_eq!(NodeValue::Timestamp((7u64 << 32) | 3).to_string(), "7:3");
    }

    #[test]
    fn test_counts() {
        let mut counts = NodeCounts::default();
        counts.record(&NodeValue::Int32(1));
        counts.record(&NodeValue::Int32(2));
        counts.record(&NodeValue::EndOfObject);
        counts.record(&NodeValue::Null);
        assert_eq!(counts.int32, 2);
        assert_eq!(counts.other, 1);
        assert_eq!(counts.total(), 3);
    }
}
