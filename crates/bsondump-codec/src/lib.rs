//! # bsondump-codec
//!
//! 流式 BSON 解码器。解码器每次调用 [`Decoder::next`] 只解析一个元素，
//! 并把解析出的节点交给调用方提供的 [`Visitor`]，由访问者决定继续、停止或报错。
//!
//! - **拉取式解码**：不需要把整个文档读入内存
//! - **运行统计**：记录已解码字节数、文档头声明的大小以及各类型节点计数
//! - **容错**：未知类型标记作为 `Unrecognized` 节点交给访问者处理，而不是直接失败
//!
//! ## 快速开始
//!
//! ```rust,ignore
//! use bsondump_codec::{Decoder, Node, Visit};
//!
//! let bytes = [0x05, 0x00, 0x00, 0x00, 0x00];
//! let mut decoder = Decoder::new(&bytes[..], |_node: &Node<'_>| Visit::Continue)?;
//! decoder.run()?;
//! assert!(decoder.state().sizes_match());
//! ```

pub mod decoder;
pub mod encoder;
pub mod node;
pub mod spec;
pub mod visitor;

pub use decoder::{Decoder, DecoderOptions, DecoderState, Step};
pub use encoder::Encoder;
pub use node::{Node, NodeCounts, NodeValue};
pub use spec::ElementType;
pub use visitor::{Visit, Visitor};

use thiserror::Error;

/// BSON 解码/编码的错误类型
#[derive(Error, Debug)]
pub enum BsonError {
    /// IO 操作错误
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// 数据流在元素中途结束
    #[error("No data: stream ended in the middle of an element")]
    NoData,

    /// 文档格式无效
    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    /// 字符串不是有效的 UTF-8 编码
    #[error("Invalid UTF-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    /// 元素名称超出长度限制
    #[error("Element name too long: max {0} bytes")]
    NameTooLong(usize),

    /// 字符串或二进制数据超出长度限制
    #[error("Value too large: {len} > {max}")]
    StringTooLong { len: usize, max: usize },

    /// 嵌套层级过深
    #[error("Nesting too deep: max {0}")]
    NestingTooDeep(usize),

    /// 访问者返回了错误码
    #[error("Visitor failed ({0})")]
    Visitor(i32),

    /// 解码器在之前的错误后已不可用
    #[error("Decoder is poisoned by an earlier error")]
    Poisoned,
}

impl BsonError {
    /// 是否为"无数据"错误（数据流提前结束）
    pub fn is_no_data(&self) -> bool {
        matches!(self, BsonError::NoData)
    }
}

/// BSON 操作的 Result 类型别名
pub type BsonResult<T> = Result<T, BsonError>;
