/// 文档头长度（小端 i32 文档大小）
pub const HEADER_SIZE: usize = 4;

/// 最小合法文档: 文档头 + 结束标记
pub const MIN_DOCUMENT_SIZE: usize = HEADER_SIZE + 1;

pub const MAX_NESTING_DEPTH: usize = 100;
pub const MAX_NAME_LENGTH: usize = 255;
pub const MAX_STRING_LENGTH: usize = 16 * 1024 * 1024;

pub const OBJECT_ID_SIZE: usize = 12;
pub const DECIMAL128_SIZE: usize = 16;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementType {
    EndOfObject = 0x00,
    Double = 0x01,
    String = 0x02,
    Document = 0x03,
    Array = 0x04,
    Binary = 0x05,
    Undefined = 0x06,
    ObjectId = 0x07,
    Boolean = 0x08,
    DateTime = 0x09,
    Null = 0x0A,
    Regex = 0x0B,
    DbPointer = 0x0C,
    JavaScript = 0x0D,
    Symbol = 0x0E,
    JavaScriptWithScope = 0x0F,
    Int32 = 0x10,
    Timestamp = 0x11,
    Int64 = 0x12,
    Decimal128 = 0x13,
    MaxKey = 0x7F,
    MinKey = 0xFF,
}

impl ElementType {
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(Self::EndOfObject),
            0x01 => Some(Self::Double),
            0x02 => Some(Self::String),
            0x03 => Some(Self::Document),
            0x04 => Some(Self::Array),
            0x05 => Some(Self::Binary),
            0x06 => Some(Self::Undefined),
            0x07 => Some(Self::ObjectId),
            0x08 => Some(Self::Boolean),
            0x09 => Some(Self::DateTime),
            0x0A => Some(Self::Null),
            0x0B => Some(Self::Regex),
            0x0C => Some(Self::DbPointer),
            0x0D => Some(Self::JavaScript),
            0x0E => Some(Self::Symbol),
            0x0F => Some(Self::JavaScriptWithScope),
            0x10 => Some(Self::Int32),
            0x11 => Some(Self::Timestamp),
            0x12 => Some(Self::Int64),
            0x13 => Some(Self::Decimal128),
            0x7F => Some(Self::MaxKey),
            0xFF => Some(Self::MinKey),
            _ => None,
        }
    }

    /// 定长类型的值字节数，变长或含嵌套结构的类型返回 None
    pub fn fixed_width(self) -> Option<usize> {
        match self {
            Self::EndOfObject
            | Self::Undefined
            | Self::Null
            | Self::MinKey
            | Self::MaxKey => Some(0),
            Self::Boolean => Some(1),
            Self::Int32 => Some(4),
            Self::Double | Self::DateTime | Self::Timestamp | Self::Int64 => Some(8),
            Self::ObjectId => Some(OBJECT_ID_SIZE),
            Self::Decimal128 => Some(DECIMAL128_SIZE),
            _ => None,
        }
    }
}
