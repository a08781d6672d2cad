use std::collections::BTreeMap;

use super::varint::{decode_varint, write_varint};
use super::{FieldValue, MAX_FIELD_NUMBER, WireError, WireType};

fn check_field_number(field_number: u64) -> Result<u32, WireError> {
    if field_number == 0 || field_number > MAX_FIELD_NUMBER {
        return Err(WireError::InvalidFieldNumber(field_number));
    }
    Ok(field_number as u32)
}

fn bounded_end(buf: &[u8], offset: usize, len: usize) -> Result<usize, WireError> {
    offset
        .checked_add(len)
        .filter(|end| *end <= buf.len())
        .ok_or(WireError::TruncatedData { offset })
}

fn length_prefixed(buf: &[u8], offset: usize) -> Result<(usize, usize), WireError> {
    let (len, start) = decode_varint(buf, offset)?;
    let len = usize::try_from(len).map_err(|_| WireError::TruncatedData { offset: start })?;
    let end = bounded_end(buf, start, len)?;
    Ok((start, end))
}

/// Encode a single field (tag followed by value).
///
/// `wire_type` must agree with the variant of `value`; the check catches call
/// sites that build a value for one wire type and tag it as another.
pub fn encode_field(
    field_number: u32,
    wire_type: WireType,
    value: &FieldValue,
) -> Result<Vec<u8>, WireError> {
    let mut out = Vec::new();
    write_field(&mut out, field_number, wire_type, value)?;
    Ok(out)
}

fn write_field(
    out: &mut Vec<u8>,
    field_number: u32,
    wire_type: WireType,
    value: &FieldValue,
) -> Result<(), WireError> {
    check_field_number(u64::from(field_number))?;
    if value.wire_type() != wire_type {
        return Err(WireError::InvalidArgument(format!(
            "field {field_number}: value of wire type {} tagged as {}",
            value.wire_type().code(),
            wire_type.code()
        )));
    }

    write_varint(out, (u64::from(field_number) << 3) | u64::from(wire_type.code()));
    match value {
        FieldValue::Varint(v) => write_varint(out, *v),
        FieldValue::Fixed64(v) => out.extend_from_slice(&v.to_le_bytes()),
        FieldValue::Bytes(b) => {
            write_varint(out, b.len() as u64);
            out.extend_from_slice(b);
        }
        FieldValue::Fixed32(v) => out.extend_from_slice(&v.to_le_bytes()),
    }
    Ok(())
}

/// Return the offset just past a field value of the given wire type code.
///
/// Takes the raw code so callers can skip fields whose type they have not
/// validated yet.
pub fn skip_field(buf: &[u8], offset: usize, wire_type: u8) -> Result<usize, WireError> {
    match WireType::from_code(wire_type)? {
        WireType::Varint => decode_varint(buf, offset).map(|(_, next)| next),
        WireType::Fixed64 => bounded_end(buf, offset, 8),
        WireType::LengthDelimited => length_prefixed(buf, offset).map(|(_, end)| end),
        WireType::Fixed32 => bounded_end(buf, offset, 4),
    }
}

fn read_value(
    buf: &[u8],
    offset: usize,
    wire_type: WireType,
) -> Result<(FieldValue, usize), WireError> {
    match wire_type {
        WireType::Varint => {
            let (v, next) = decode_varint(buf, offset)?;
            Ok((FieldValue::Varint(v), next))
        }
        WireType::Fixed64 => {
            let end = bounded_end(buf, offset, 8)?;
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&buf[offset..end]);
            Ok((FieldValue::Fixed64(u64::from_le_bytes(raw)), end))
        }
        WireType::LengthDelimited => {
            let (start, end) = length_prefixed(buf, offset)?;
            Ok((FieldValue::Bytes(buf[start..end].to_vec()), end))
        }
        WireType::Fixed32 => {
            let end = bounded_end(buf, offset, 4)?;
            let mut raw = [0u8; 4];
            raw.copy_from_slice(&buf[offset..end]);
            Ok((FieldValue::Fixed32(u32::from_le_bytes(raw)), end))
        }
    }
}

/// Parse one level of a message into a field map.
///
/// Repeated fields keep arrival order. Length-delimited values are not
/// descended into.
pub fn parse_top_level_fields(buf: &[u8]) -> Result<Fields, WireError> {
    let mut fields = Fields::default();
    let mut pos = 0;

    while pos < buf.len() {
        let (tag, next) = decode_varint(buf, pos)?;
        let field_number = check_field_number(tag >> 3)?;
        let wire_type = WireType::from_code((tag & 0x7) as u8)?;
        let (value, end) = read_value(buf, next, wire_type)?;
        fields.push(field_number, value);
        pos = end;
    }

    Ok(fields)
}

/// Field number to values, in arrival order per field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fields {
    map: BTreeMap<u32, Vec<FieldValue>>,
}

impl Fields {
    fn push(&mut self, field_number: u32, value: FieldValue) {
        self.map.entry(field_number).or_default().push(value);
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn contains(&self, field_number: u32) -> bool {
        self.map.contains_key(&field_number)
    }

    pub fn get(&self, field_number: u32) -> &[FieldValue] {
        self.map
            .get(&field_number)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn first(&self, field_number: u32) -> Option<&FieldValue> {
        self.get(field_number).first()
    }

    pub fn first_varint(&self, field_number: u32) -> Option<u64> {
        self.first(field_number).and_then(FieldValue::as_u64)
    }

    pub fn first_bytes(&self, field_number: u32) -> Option<&[u8]> {
        self.first(field_number).and_then(FieldValue::as_bytes)
    }

    pub fn first_string(&self, field_number: u32) -> Option<&str> {
        self.first(field_number).and_then(FieldValue::as_str)
    }

    /// Every length-delimited occurrence of a repeated field.
    pub fn all_bytes(&self, field_number: u32) -> impl Iterator<Item = &[u8]> {
        self.get(field_number).iter().filter_map(FieldValue::as_bytes)
    }

    pub fn field_numbers(&self) -> impl Iterator<Item = u32> + '_ {
        self.map.keys().copied()
    }
}

/// Incremental message encoder.
#[derive(Debug, Clone, Default)]
pub struct MessageWriter {
    buf: Vec<u8>,
}

impl MessageWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn varint(&mut self, field_number: u32, value: u64) -> Result<&mut Self, WireError> {
        self.field(field_number, &FieldValue::Varint(value))
    }

    pub fn fixed64(&mut self, field_number: u32, value: u64) -> Result<&mut Self, WireError> {
        self.field(field_number, &FieldValue::Fixed64(value))
    }

    pub fn fixed32(&mut self, field_number: u32, value: u32) -> Result<&mut Self, WireError> {
        self.field(field_number, &FieldValue::Fixed32(value))
    }

    pub fn bytes(&mut self, field_number: u32, value: &[u8]) -> Result<&mut Self, WireError> {
        self.field(field_number, &FieldValue::Bytes(value.to_vec()))
    }

    pub fn string(&mut self, field_number: u32, value: &str) -> Result<&mut Self, WireError> {
        self.bytes(field_number, value.as_bytes())
    }

    /// Embed an already-encoded submessage.
    pub fn message(
        &mut self,
        field_number: u32,
        nested: &MessageWriter,
    ) -> Result<&mut Self, WireError> {
        self.bytes(field_number, &nested.buf)
    }

    fn field(&mut self, field_number: u32, value: &FieldValue) -> Result<&mut Self, WireError> {
        write_field(&mut self.buf, field_number, value.wire_type(), value)?;
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_varint_field() {
        let out = encode_field(1, WireType::Varint, &FieldValue::Varint(150)).unwrap();
        assert_eq!(out, vec![0x08, 0x96, 0x01]);
    }

    #[test]
    fn encode_string_field() {
        let out = encode_field(
            2,
            WireType::LengthDelimited,
            &FieldValue::Bytes(b"testing".to_vec()),
        )
        .unwrap();
        assert_eq!(out, b"\x12\x07testing".to_vec());
    }

    #[test]
    fn encode_fixed_fields_little_endian() {
        let out = encode_field(3, WireType::Fixed32, &FieldValue::Fixed32(1)).unwrap();
        assert_eq!(out, vec![0x1d, 0x01, 0x00, 0x00, 0x00]);
        let out = encode_field(4, WireType::Fixed64, &FieldValue::Fixed64(2)).unwrap();
        assert_eq!(out, vec![0x21, 0x02, 0, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn encode_rejects_bad_field_number() {
        assert_eq!(
            encode_field(0, WireType::Varint, &FieldValue::Varint(1)),
            Err(WireError::InvalidFieldNumber(0))
        );
        assert_eq!(
            encode_field(1 << 29, WireType::Varint, &FieldValue::Varint(1)),
            Err(WireError::InvalidFieldNumber(1 << 29))
        );
    }

    #[test]
    fn encode_rejects_mismatched_wire_type() {
        let err = encode_field(1, WireType::Fixed32, &FieldValue::Varint(1)).unwrap_err();
        assert!(matches!(err, WireError::InvalidArgument(_)));
    }

    #[test]
    fn parse_mixed_message() {
        let mut w = MessageWriter::new();
        w.varint(1, 76561197960287930)
            .unwrap()
            .string(2, "hello")
            .unwrap()
            .fixed32(3, 7)
            .unwrap()
            .fixed64(4, u64::MAX)
            .unwrap()
            .string(2, "again")
            .unwrap();
        let fields = parse_top_level_fields(&w.finish()).unwrap();

        assert_eq!(fields.first_varint(1), Some(76561197960287930));
        assert_eq!(fields.first_string(2), Some("hello"));
        assert_eq!(fields.all_bytes(2).collect::<Vec<_>>(), vec![
            b"hello".as_slice(),
            b"again".as_slice()
        ]);
        assert_eq!(fields.first(3), Some(&FieldValue::Fixed32(7)));
        assert_eq!(fields.first(4), Some(&FieldValue::Fixed64(u64::MAX)));
        assert_eq!(fields.field_numbers().collect::<Vec<_>>(), vec![1, 2, 3, 4]);
        assert!(fields.get(9).is_empty());
    }

    #[test]
    fn parse_empty_message() {
        assert!(parse_top_level_fields(&[]).unwrap().is_empty());
    }

    #[test]
    fn parse_nested_stays_opaque() {
        let mut inner = MessageWriter::new();
        inner.varint(1, 5).unwrap();
        let mut outer = MessageWriter::new();
        outer.message(2, &inner).unwrap();

        let fields = parse_top_level_fields(&outer.finish()).unwrap();
        let nested = parse_top_level_fields(fields.first_bytes(2).unwrap()).unwrap();
        assert_eq!(nested.first_varint(1), Some(5));
    }

    #[test]
    fn parse_rejects_group_wire_type() {
        // field 1, wire type 3 (start group)
        assert_eq!(
            parse_top_level_fields(&[0x0b]),
            Err(WireError::UnsupportedWireType(3))
        );
    }

    #[test]
    fn parse_rejects_field_zero() {
        assert_eq!(
            parse_top_level_fields(&[0x00, 0x01]),
            Err(WireError::InvalidFieldNumber(0))
        );
    }

    #[test]
    fn parse_truncated_length_delimited() {
        // field 2, length 5, only 2 bytes follow
        let err = parse_top_level_fields(&[0x12, 0x05, b'a', b'b']).unwrap_err();
        assert!(matches!(err, WireError::TruncatedData { .. }));
    }

    #[test]
    fn parse_truncated_fixed() {
        let err = parse_top_level_fields(&[0x0d, 0x01, 0x02]).unwrap_err();
        assert_eq!(err, WireError::TruncatedData { offset: 1 });
    }

    #[test]
    fn skip_each_wire_type() {
        let buf = [0x96, 0x01, 0xaa];
        assert_eq!(skip_field(&buf, 0, 0).unwrap(), 2);
        assert_eq!(skip_field(&[0u8; 8], 0, 1).unwrap(), 8);
        assert_eq!(skip_field(&[0x02, b'a', b'b'], 0, 2).unwrap(), 3);
        assert_eq!(skip_field(&[0u8; 4], 0, 5).unwrap(), 4);
    }

    #[test]
    fn skip_rejects_unknown_and_truncated() {
        assert_eq!(
            skip_field(&[0u8; 8], 0, 3),
            Err(WireError::UnsupportedWireType(3))
        );
        assert_eq!(
            skip_field(&[0u8; 8], 0, 7),
            Err(WireError::UnsupportedWireType(7))
        );
        assert!(matches!(
            skip_field(&[0u8; 3], 0, 5),
            Err(WireError::TruncatedData { .. })
        ));
        assert!(matches!(
            skip_field(&[0x04, b'a'], 0, 2),
            Err(WireError::TruncatedData { .. })
        ));
    }
}
