//! BSON 流式解码模块
//!
//! 解码器从任意 `Read` 数据源逐个读取元素：类型标记、以 NUL 结尾的键名、值。
//! 遇到嵌套文档或数组时只压入一层嵌套帧，其内容由后续 `next` 调用逐个产生，
//! 因此内存占用只与单个元素的大小相关，与整个文档大小无关。

use crate::node::{Node, NodeCounts, NodeValue};
use crate::spec::*;
use crate::visitor::{Visit, Visitor};
use crate::{BsonError, BsonResult};
use std::io::{self, Read};
use tracing::{debug, trace, warn};

/// 解码器限制参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecoderOptions {
    /// 最大嵌套层数（顶层文档不计）
    pub max_depth: usize,
    /// 键名最大字节数
    pub max_name_len: usize,
    /// 字符串、二进制数据最大字节数
    pub max_string_len: usize,
}

impl Default for DecoderOptions {
    fn default() -> Self {
        Self {
            max_depth: MAX_NESTING_DEPTH,
            max_name_len: MAX_NAME_LENGTH,
            max_string_len: MAX_STRING_LENGTH,
        }
    }
}

/// 解码运行状态
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecoderState {
    /// 文档头声明的文档大小
    pub total_document_size: i32,
    /// 目前为止实际消费的字节数（含文档头）
    pub total_decoded_size: usize,
    pub counts: NodeCounts,
}

impl DecoderState {
    /// 实际解码字节数是否与文档头声明一致
    pub fn sizes_match(&self) -> bool {
        usize::try_from(self.total_document_size)
            .map(|declared| declared == self.total_decoded_size)
            .unwrap_or(false)
    }
}

/// 单步解码结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// 还有后续元素
    Continue,
    /// 顶层文档已结束，或访问者要求停止
    Done,
}

#[derive(Debug, Clone, Copy)]
enum FrameKind {
    Document,
    Array,
    /// 带作用域的 JavaScript 代码，记录整个值的声明长度与起始偏移
    Scope { total: i32, start: usize },
}

#[derive(Debug, Clone, Copy)]
struct Frame {
    kind: FrameKind,
    declared: i32,
    start: usize,
}

/// 值在解码器缓冲区中的位置，构造节点时再借用
enum Slot {
    Ready(NodeValue<'static>),
    String,
    JavaScript,
    Symbol,
    Binary { subtype: u8 },
    Regex { split: usize },
    DbPointer { id: [u8; OBJECT_ID_SIZE] },
    JavaScriptWithScope,
}

/// 数据源与缓冲区，负责字节级读取和字节计数
struct Source<R> {
    reader: R,
    options: DecoderOptions,
    state: DecoderState,
    frames: Vec<Frame>,
    name: Vec<u8>,
    scratch: Vec<u8>,
}

impl<R: Read> Source<R> {
    fn read_exact(&mut self, buf: &mut [u8]) -> BsonResult<()> {
        self.reader.read_exact(buf).map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => BsonError::NoData,
            _ => BsonError::Io(e),
        })?;
        self.state.total_decoded_size += buf.len();
        Ok(())
    }

    fn read_u8(&mut self) -> BsonResult<u8> {
        let mut buf = [0u8; 1];
        self.read_exact(&mut buf)?;
        Ok(buf[0])
    }

    fn read_i32(&mut self) -> BsonResult<i32> {
        let mut buf = [0u8; 4];
        self.read_exact(&mut buf)?;
        Ok(i32::from_le_bytes(buf))
    }

    /// 追加 `len` 字节到 scratch，按实际到达的数据增长，不预先分配
    fn read_into_scratch(&mut self, len: usize) -> BsonResult<()> {
        let read = (&mut self.reader)
            .take(len as u64)
            .read_to_end(&mut self.scratch)?;
        self.state.total_decoded_size += read;
        if read < len {
            return Err(BsonError::NoData);
        }
        Ok(())
    }

    fn read_name(&mut self) -> BsonResult<()> {
        loop {
            let b = self.read_u8()?;
            if b == 0 {
                replace_invalid_utf8(&mut self.name, 0);
                return Ok(());
            }
            if self.name.len() >= self.options.max_name_len {
                return Err(BsonError::NameTooLong(self.options.max_name_len));
            }
            self.name.push(b);
        }
    }

    fn read_cstring(&mut self) -> BsonResult<()> {
        let start = self.scratch.len();
        loop {
            let b = self.read_u8()?;
            if b == 0 {
                replace_invalid_utf8(&mut self.scratch, start);
                return Ok(());
            }
            if self.scratch.len() - start >= self.options.max_string_len {
                return Err(BsonError::StringTooLong {
                    len: self.scratch.len() - start + 1,
                    max: self.options.max_string_len,
                });
            }
            self.scratch.push(b);
        }
    }

    /// i32 长度（含结尾 NUL）+ 内容 + NUL
    fn read_string(&mut self) -> BsonResult<()> {
        let len = self.read_i32()?;
        if len < 1 {
            return Err(BsonError::InvalidDocument(format!(
                "Invalid string length: {}",
                len
            )));
        }
        let len = len as usize;
        if len - 1 > self.options.max_string_len {
            return Err(BsonError::StringTooLong {
                len: len - 1,
                max: self.options.max_string_len,
            });
        }
        let start = self.scratch.len();
        self.read_into_scratch(len)?;
        if self.scratch.pop() != Some(0) {
            return Err(BsonError::InvalidDocument(
                "String is not NUL-terminated".to_string(),
            ));
        }
        replace_invalid_utf8(&mut self.scratch, start);
        Ok(())
    }

    fn read_binary(&mut self) -> BsonResult<u8> {
        let len = self.read_i32()?;
        if len < 0 {
            return Err(BsonError::InvalidDocument(format!(
                "Invalid binary length: {}",
                len
            )));
        }
        let len = len as usize;
        if len > self.options.max_string_len {
            return Err(BsonError::StringTooLong {
                len,
                max: self.options.max_string_len,
            });
        }
        let subtype = self.read_u8()?;
        self.read_into_scratch(len)?;
        Ok(subtype)
    }

    /// 进入嵌套结构：读取子文档头并压入一帧
    fn open_frame(&mut self, kind: FrameKind) -> BsonResult<()> {
        if self.frames.len() >= self.options.max_depth {
            return Err(BsonError::NestingTooDeep(self.options.max_depth));
        }
        let start = self.state.total_decoded_size;
        let declared = self.read_i32()?;
        if declared < MIN_DOCUMENT_SIZE as i32 {
            debug!(declared, "nested document declares an implausible size");
        }
        self.frames.push(Frame {
            kind,
            declared,
            start,
        });
        Ok(())
    }

    /// 离开嵌套结构，核对子文档声明的大小
    fn close_frame(&mut self) {
        let Some(frame) = self.frames.pop() else {
            return;
        };
        let walked = self.state.total_decoded_size - frame.start;
        if usize::try_from(frame.declared).ok() != Some(walked) {
            warn!(
                declared = frame.declared,
                walked,
                kind = ?frame.kind,
                "nested document size mismatch"
            );
        }
        if let FrameKind::Scope { total, start } = frame.kind {
            let walked = self.state.total_decoded_size - start;
            if usize::try_from(total).ok() != Some(walked) {
                warn!(declared = total, walked, "code-with-scope size mismatch");
            }
        }
    }

    fn read_value(&mut self, ty: ElementType) -> BsonResult<Slot> {
        if let Some(width) = ty.fixed_width() {
            let mut raw = [0u8; DECIMAL128_SIZE];
            self.read_exact(&mut raw[..width])?;
            return Ok(Slot::Ready(fixed_value(ty, &raw)));
        }

        let slot = match ty {
            ElementType::String => {
                self.read_string()?;
                Slot::String
            }
            ElementType::JavaScript => {
                self.read_string()?;
                Slot::JavaScript
            }
            ElementType::Symbol => {
                self.read_string()?;
                Slot::Symbol
            }
            ElementType::Binary => {
                let subtype = self.read_binary()?;
                Slot::Binary { subtype }
            }
            ElementType::Regex => {
                self.read_cstring()?;
                let split = self.scratch.len();
                self.read_cstring()?;
                Slot::Regex { split }
            }
            ElementType::DbPointer => {
                self.read_string()?;
                let mut id = [0u8; OBJECT_ID_SIZE];
                self.read_exact(&mut id)?;
                Slot::DbPointer { id }
            }
            ElementType::Document => {
                self.open_frame(FrameKind::Document)?;
                Slot::Ready(NodeValue::Document)
            }
            ElementType::Array => {
                self.open_frame(FrameKind::Array)?;
                Slot::Ready(NodeValue::Array)
            }
            ElementType::JavaScriptWithScope => {
                let start = self.state.total_decoded_size;
                let total = self.read_i32()?;
                self.read_string()?;
                self.open_frame(FrameKind::Scope { total, start })?;
                Slot::JavaScriptWithScope
            }
            _ => unreachable!("fixed-width types are handled above"),
        };
        Ok(slot)
    }

    fn read_element(&mut self) -> BsonResult<Node<'_>> {
        self.name.clear();
        self.scratch.clear();

        let tag = self.read_u8()?;
        let depth = self.frames.len();

        let slot = if tag == ElementType::EndOfObject as u8 {
            self.close_frame();
            Slot::Ready(NodeValue::EndOfObject)
        } else {
            self.read_name()?;
            match ElementType::from_u8(tag) {
                Some(ty) => self.read_value(ty)?,
                None => Slot::Ready(NodeValue::Unrecognized(tag)),
            }
        };

        let value = match slot {
            Slot::Ready(value) => value,
            Slot::String => NodeValue::String(std::str::from_utf8(&self.scratch)?),
            Slot::JavaScript => NodeValue::JavaScript(std::str::from_utf8(&self.scratch)?),
            Slot::Symbol => NodeValue::Symbol(std::str::from_utf8(&self.scratch)?),
            Slot::Binary { subtype } => NodeValue::Binary {
                subtype,
                data: &self.scratch,
            },
            Slot::Regex { split } => NodeValue::Regex {
                pattern: std::str::from_utf8(&self.scratch[..split])?,
                options: std::str::from_utf8(&self.scratch[split..])?,
            },
            Slot::DbPointer { id } => NodeValue::DbPointer {
                namespace: std::str::from_utf8(&self.scratch)?,
                id,
            },
            Slot::JavaScriptWithScope => NodeValue::JavaScriptWithScope {
                code: std::str::from_utf8(&self.scratch)?,
            },
        };

        self.state.counts.record(&value);

        Ok(Node {
            name: std::str::from_utf8(&self.name)?,
            depth,
            value,
        })
    }
}

/// 非法 UTF-8 序列替换为 U+FFFD，字节计数不受影响
fn replace_invalid_utf8(buf: &mut Vec<u8>, start: usize) {
    if std::str::from_utf8(&buf[start..]).is_ok() {
        return;
    }
    let text = String::from_utf8_lossy(&buf[start..]).into_owned();
    warn!(offset = start, "invalid UTF-8 replaced");
    buf.truncate(start);
    buf.extend_from_slice(text.as_bytes());
}

fn fixed_value(ty: ElementType, raw: &[u8; DECIMAL128_SIZE]) -> NodeValue<'static> {
    let mut b8 = [0u8; 8];
    b8.copy_from_slice(&raw[..8]);
    match ty {
        ElementType::Double => NodeValue::Double(f64::from_le_bytes(b8)),
        ElementType::DateTime => NodeValue::DateTime(i64::from_le_bytes(b8)),
        ElementType::Timestamp => NodeValue::Timestamp(u64::from_le_bytes(b8)),
        ElementType::Int64 => NodeValue::Int64(i64::from_le_bytes(b8)),
        ElementType::Int32 => {
            NodeValue::Int32(i32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
        }
        ElementType::Boolean => NodeValue::Boolean(raw[0] != 0),
        ElementType::ObjectId => {
            let mut id = [0u8; OBJECT_ID_SIZE];
            id.copy_from_slice(&raw[..OBJECT_ID_SIZE]);
            NodeValue::ObjectId(id)
        }
        ElementType::Decimal128 => NodeValue::Decimal128(*raw),
        ElementType::Undefined => NodeValue::Undefined,
        ElementType::Null => NodeValue::Null,
        ElementType::MinKey => NodeValue::MinKey,
        ElementType::MaxKey => NodeValue::MaxKey,
        ElementType::EndOfObject => NodeValue::EndOfObject,
        _ => unreachable!("variable-width type has no fixed value"),
    }
}

/// BSON 流式解码器
///
/// 持有数据源与访问者。每次 [`Decoder::next`] 解码一个元素并调用访问者。
/// 出错后解码器不可再用，后续调用返回 [`BsonError::Poisoned`]。
pub struct Decoder<R, V> {
    source: Source<R>,
    visitor: V,
    finished: bool,
    poisoned: bool,
}

impl<R: Read, V: Visitor> Decoder<R, V> {
    /// 创建解码器
    ///
    /// # Brief
    /// 读取 4 字节文档头（小端 i32 文档大小），不消费后续内容
    ///
    /// # Arguments
    /// * `reader` - 数据源
    /// * `visitor` - 节点访问者
    ///
    /// # Returns
    /// 成功返回解码器, 文档头读取不完整返回 IO 错误
    pub fn new(reader: R, visitor: V) -> BsonResult<Self> {
        Self::with_options(reader, visitor, DecoderOptions::default())
    }

    pub fn with_options(reader: R, visitor: V, options: DecoderOptions) -> BsonResult<Self> {
        let mut source = Source {
            reader,
            options,
            state: DecoderState::default(),
            frames: Vec::new(),
            name: Vec::with_capacity(32),
            scratch: Vec::new(),
        };

        source.state.total_document_size = match source.read_i32() {
            Ok(size) => size,
            Err(BsonError::NoData) => {
                return Err(BsonError::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "short read on document size header",
                )))
            }
            Err(e) => return Err(e),
        };
        debug!(
            document_size = source.state.total_document_size,
            "decoder initialized"
        );

        Ok(Self {
            source,
            visitor,
            finished: false,
            poisoned: false,
        })
    }

    /// 解码下一个元素
    ///
    /// # Brief
    /// 读取一个元素并交给访问者。顶层结束标记被消费后，或访问者返回
    /// `Visit::Stop` 时返回 `Step::Done`；此后再次调用仍返回 `Step::Done`。
    ///
    /// # Returns
    /// 数据流在元素中途结束时返回 [`BsonError::NoData`]
    pub fn next(&mut self) -> BsonResult<Step> {
        if self.poisoned {
            return Err(BsonError::Poisoned);
        }
        if self.finished {
            return Ok(Step::Done);
        }

        match self.step() {
            Ok(step) => {
                if step == Step::Done {
                    self.finished = true;
                    debug!(
                        decoded = self.source.state.total_decoded_size,
                        declared = self.source.state.total_document_size,
                        "document done"
                    );
                }
                Ok(step)
            }
            Err(e) => {
                self.poisoned = true;
                debug!(
                    offset = self.source.state.total_decoded_size,
                    "decode failed: {}", e
                );
                Err(e)
            }
        }
    }

    fn step(&mut self) -> BsonResult<Step> {
        let node = self.source.read_element()?;
        trace!(
            kind = node.value.type_name(),
            name = node.name,
            depth = node.depth,
            "decoded element"
        );

        let top_level_end = node.depth == 0 && node.value.is_end_of_object();
        match self.visitor.visit(&node) {
            Visit::Error(code) => Err(BsonError::Visitor(code)),
            Visit::Stop => Ok(Step::Done),
            Visit::Continue if top_level_end => Ok(Step::Done),
            Visit::Continue => Ok(Step::Continue),
        }
    }

    /// 持续解码直到文档结束或访问者停止
    pub fn run(&mut self) -> BsonResult<()> {
        while self.next()? == Step::Continue {}
        Ok(())
    }

    pub fn state(&self) -> &DecoderState {
        &self.source.state
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// 当前嵌套深度
    pub fn depth(&self) -> usize {
        self.source.frames.len()
    }

    pub fn visitor(&self) -> &V {
        &self.visitor
    }

    pub fn visitor_mut(&mut self) -> &mut V {
        &mut self.visitor
    }

    /// 拆出访问者与最终状态，数据源随之释放
    pub fn into_parts(self) -> (V, DecoderState) {
        (self.visitor, self.source.state)
    }
}
