//! BSON 编码模块
//!
//! 在内存缓冲区中按顺序追加元素，嵌套文档结束时回填其大小。
//! 主要用于生成测试数据与基准数据。

use crate::spec::*;
use crate::{BsonError, BsonResult};
use bytes::{BufMut, BytesMut};

/// BSON 编码器
///
/// 顶层文档在创建时打开，`begin_document` / `begin_array` 打开嵌套结构，
/// `end` 关闭最内层嵌套结构，`finish` 关闭顶层文档并回填文档头。
pub struct Encoder {
    buf: BytesMut,
    /// 尚未关闭的文档头偏移，第一个元素是顶层文档
    open: Vec<usize>,
}

impl Default for Encoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Encoder {
    pub fn new() -> Self {
        let mut buf = BytesMut::with_capacity(256);
        buf.put_i32_le(0);
        Self { buf, open: vec![0] }
    }

    fn put_header(&mut self, ty: ElementType, name: &str) -> BsonResult<()> {
        if name.as_bytes().contains(&0) {
            return Err(BsonError::InvalidDocument(format!(
                "Element name contains NUL: {:?}",
                name
            )));
        }
        self.buf.put_u8(ty as u8);
        self.buf.put_slice(name.as_bytes());
        self.buf.put_u8(0);
        Ok(())
    }

    fn put_string(&mut self, value: &str) -> BsonResult<()> {
        let len = i32::try_from(value.len() + 1).map_err(|_| BsonError::StringTooLong {
            len: value.len(),
            max: i32::MAX as usize - 1,
        })?;
        self.buf.put_i32_le(len);
        self.buf.put_slice(value.as_bytes());
        self.buf.put_u8(0);
        Ok(())
    }

    pub fn append_double(&mut self, name: &str, value: f64) -> BsonResult<&mut Self> {
        self.put_header(ElementType::Double, name)?;
        self.buf.put_f64_le(value);
        Ok(self)
    }

    pub fn append_bool(&mut self, name: &str, value: bool) -> BsonResult<&mut Self> {
        self.put_header(ElementType::Boolean, name)?;
        self.buf.put_u8(value as u8);
        Ok(self)
    }

    pub fn append_int32(&mut self, name: &str, value: i32) -> BsonResult<&mut Self> {
        self.put_header(ElementType::Int32, name)?;
        self.buf.put_i32_le(value);
        Ok(self)
    }

    pub fn append_int64(&mut self, name: &str, value: i64) -> BsonResult<&mut Self> {
        self.put_header(ElementType::Int64, name)?;
        self.buf.put_i64_le(value);
        Ok(self)
    }

    pub fn append_datetime(&mut self, name: &str, millis: i64) -> BsonResult<&mut Self> {
        self.put_header(ElementType::DateTime, name)?;
        self.buf.put_i64_le(millis);
        Ok(self)
    }

    pub fn append_null(&mut self, name: &str) -> BsonResult<&mut Self> {
        self.put_header(ElementType::Null, name)?;
        Ok(self)
    }

    pub fn append_object_id(
        &mut self,
        name: &str,
        id: [u8; OBJECT_ID_SIZE],
    ) -> BsonResult<&mut Self> {
        self.put_header(ElementType::ObjectId, name)?;
        self.buf.put_slice(&id);
        Ok(self)
    }

    pub fn append_string(&mut self, name: &str, value: &str) -> BsonResult<&mut Self> {
        self.put_header(ElementType::String, name)?;
        self.put_string(value)?;
        Ok(self)
    }

    pub fn append_binary(&mut self, name: &str, subtype: u8, data: &[u8]) -> BsonResult<&mut Self> {
        let len = i32::try_from(data.len()).map_err(|_| BsonError::StringTooLong {
            len: data.len(),
            max: i32::MAX as usize,
        })?;
        self.put_header(ElementType::Binary, name)?;
        self.buf.put_i32_le(len);
        self.buf.put_u8(subtype);
        self.buf.put_slice(data);
        Ok(self)
    }

    fn begin(&mut self, ty: ElementType, name: &str) -> BsonResult<&mut Self> {
        if self.open.len() > MAX_NESTING_DEPTH {
            return Err(BsonError::NestingTooDeep(MAX_NESTING_DEPTH));
        }
        self.put_header(ty, name)?;
        self.open.push(self.buf.len());
        self.buf.put_i32_le(0);
        Ok(self)
    }

    pub fn begin_document(&mut self, name: &str) -> BsonResult<&mut Self> {
        self.begin(ElementType::Document, name)
    }

    /// 数组元素的键名由调用方按 "0", "1", ... 给出
    pub fn begin_array(&mut self, name: &str) -> BsonResult<&mut Self> {
        self.begin(ElementType::Array, name)
    }

    fn close(&mut self, start: usize) -> BsonResult<()> {
        self.buf.put_u8(ElementType::EndOfObject as u8);
        let size = i32::try_from(self.buf.len() - start).map_err(|_| {
            BsonError::InvalidDocument(format!(
                "Document too large: {} bytes",
                self.buf.len() - start
            ))
        })?;
        self.buf[start..start + HEADER_SIZE].copy_from_slice(&size.to_le_bytes());
        Ok(())
    }

    /// 关闭最内层的嵌套文档或数组
    pub fn end(&mut self) -> BsonResult<&mut Self> {
        if self.open.len() < 2 {
            return Err(BsonError::InvalidDocument(
                "No nested document is open".to_string(),
            ));
        }
        if let Some(start) = self.open.pop() {
            self.close(start)?;
        }
        Ok(self)
    }

    fn close_top(&mut self) -> BsonResult<()> {
        if self.open.len() != 1 {
            return Err(BsonError::InvalidDocument(format!(
                "{} nested document(s) left open",
                self.open.len() - 1
            )));
        }
        self.close(0)
    }

    /// 关闭顶层文档并回填文档头
    pub fn finish(mut self) -> BsonResult<Vec<u8>> {
        self.close_top()?;
        Ok(self.buf.to_vec())
    }

    /// 关闭顶层文档但文档头保持为 0，与写入端未正常收尾时留下的文件一致
    pub fn finish_unsized(mut self) -> BsonResult<Vec<u8>> {
        self.close_top()?;
        self.buf[..HEADER_SIZE].copy_from_slice(&[0u8; HEADER_SIZE]);
        Ok(self.buf.to_vec())
    }
}
