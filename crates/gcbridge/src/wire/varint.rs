use super::WireError;

/// Longest legal varint encoding of a u64.
const MAX_VARINT_LEN: usize = 10;

pub fn encode_varint(value: u64) -> Vec<u8> {
    let mut out = Vec::with_capacity(MAX_VARINT_LEN);
    write_varint(&mut out, value);
    out
}

/// Signed entry point for callers holding an `i64`. Negative values are
/// rejected rather than sign-extended to ten bytes.
pub fn encode_varint_i64(value: i64) -> Result<Vec<u8>, WireError> {
    let value = u64::try_from(value).map_err(|_| {
        WireError::InvalidArgument(format!("varint must be non-negative, got {value}"))
    })?;
    Ok(encode_varint(value))
}

pub(crate) fn write_varint(out: &mut Vec<u8>, mut value: u64) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

/// Decode a varint starting at `offset`. Returns the value and the offset of
/// the first byte after it.
pub fn decode_varint(buf: &[u8], offset: usize) -> Result<(u64, usize), WireError> {
    let mut value: u64 = 0;
    let mut pos = offset;

    for index in 0..MAX_VARINT_LEN {
        let byte = *buf.get(pos).ok_or(WireError::TruncatedData { offset: pos })?;
        pos += 1;

        let bits = u64::from(byte & 0x7f);
        // Tenth byte may only contribute the top bit of the u64.
        if index == MAX_VARINT_LEN - 1 && bits > 1 {
            return Err(WireError::VarintOverflow { offset });
        }
        value |= bits << (7 * index);

        if byte & 0x80 == 0 {
            return Ok((value, pos));
        }
    }

    Err(WireError::VarintOverflow { offset })
}
