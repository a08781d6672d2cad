//! Protobuf-style wire codec for game coordinator message bodies.
//!
//! Supports the four wire types the coordinator actually uses: varint,
//! 64-bit fixed, length-delimited and 32-bit fixed. Groups (3/4) and
//! anything else are rejected. Decoding is shallow: nested messages come
//! back as raw bytes and callers parse them on demand.

mod fields;
mod varint;

pub use fields::{Fields, MessageWriter, encode_field, parse_top_level_fields, skip_field};
pub use varint::{decode_varint, encode_varint, encode_varint_i64};

/// Largest integer a JSON number can hold exactly (2^53 - 1).
pub const MAX_SAFE_INTEGER: u64 = (1 << 53) - 1;

/// Largest legal field number (29 bits).
pub const MAX_FIELD_NUMBER: u64 = (1 << 29) - 1;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("truncated data at offset {offset}")]
    TruncatedData { offset: usize },

    #[error("varint at offset {offset} does not fit in 64 bits")]
    VarintOverflow { offset: usize },

    #[error("unsupported wire type {0}")]
    UnsupportedWireType(u8),

    #[error("invalid field number {0}")]
    InvalidFieldNumber(u64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WireType {
    Varint,
    Fixed64,
    LengthDelimited,
    Fixed32,
}

impl WireType {
    pub fn from_code(code: u8) -> Result<Self, WireError> {
        match code {
            0 => Ok(Self::Varint),
            1 => Ok(Self::Fixed64),
            2 => Ok(Self::LengthDelimited),
            5 => Ok(Self::Fixed32),
            other => Err(WireError::UnsupportedWireType(other)),
        }
    }

    pub fn code(self) -> u8 {
        match self {
            Self::Varint => 0,
            Self::Fixed64 => 1,
            Self::LengthDelimited => 2,
            Self::Fixed32 => 5,
        }
    }
}

/// A decoded field value, tagged by the wire type it arrived with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Varint(u64),
    Fixed64(u64),
    Bytes(Vec<u8>),
    Fixed32(u32),
}

impl FieldValue {
    pub fn wire_type(&self) -> WireType {
        match self {
            Self::Varint(_) => WireType::Varint,
            Self::Fixed64(_) => WireType::Fixed64,
            Self::Bytes(_) => WireType::LengthDelimited,
            Self::Fixed32(_) => WireType::Fixed32,
        }
    }

    /// Numeric view of any scalar wire type. `None` for length-delimited.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::Varint(v) | Self::Fixed64(v) => Some(*v),
            Self::Fixed32(v) => Some(u64::from(*v)),
            Self::Bytes(_) => None,
        }
    }

    /// Numeric view clamped to [`MAX_SAFE_INTEGER`].
    ///
    /// Lossy: any value above 2^53 - 1 comes back as exactly
    /// [`MAX_SAFE_INTEGER`], so distinct large inputs become
    /// indistinguishable. Use [`FieldValue::as_u64`] when the full value
    /// matters.
    pub fn as_safe_integer(&self) -> Option<u64> {
        self.as_u64().map(|v| v.min(MAX_SAFE_INTEGER))
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        self.as_bytes().and_then(|b| std::str::from_utf8(b).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_type_codes() {
        for wt in [
            WireType::Varint,
            WireType::Fixed64,
            WireType::LengthDelimited,
            WireType::Fixed32,
        ] {
            assert_eq!(WireType::from_code(wt.code()).unwrap(), wt);
        }
        assert_eq!(
            WireType::from_code(3),
            Err(WireError::UnsupportedWireType(3))
        );
        assert_eq!(
            WireType::from_code(4),
            Err(WireError::UnsupportedWireType(4))
        );
    }

    #[test]
    fn safe_integer_clamps() {
        assert_eq!(FieldValue::Varint(42).as_safe_integer(), Some(42));
        assert_eq!(
            FieldValue::Fixed64(u64::MAX).as_safe_integer(),
            Some(MAX_SAFE_INTEGER)
        );
        // Distinct oversized values collapse to the same result.
        assert_eq!(
            FieldValue::Varint(MAX_SAFE_INTEGER + 1).as_safe_integer(),
            FieldValue::Varint(MAX_SAFE_INTEGER + 1000).as_safe_integer()
        );
        assert_eq!(
            FieldValue::Varint(MAX_SAFE_INTEGER).as_safe_integer(),
            Some(MAX_SAFE_INTEGER)
        );
        assert_eq!(FieldValue::Bytes(vec![1]).as_safe_integer(), None);
    }

    #[test]
    fn string_view_requires_utf8() {
        assert_eq!(FieldValue::Bytes(b"hi".to_vec()).as_str(), Some("hi"));
        assert_eq!(FieldValue::Bytes(vec![0xff, 0xfe]).as_str(), None);
    }
}
