//! Primitive MQTT wire field readers and writers.
//!
//! These operate zero-copy on decode (returning slices borrowed from the
//! input buffer) and append into a fixed-capacity `heapless::Vec` on
//! encode, matching the rest of the engine's no-allocation design.

/// A decoded UTF-8 string pair (used by `User Property`).
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct StringPair<'a> {
    /// The property key.
    pub name: &'a str,
    /// The property value.
    pub value: &'a str,
}

/// Errors a primitive reader can report.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ReadError {
    /// Fewer bytes are available than the field declares.
    NotEnough,
    /// A UTF-8 string field contained invalid UTF-8, or a declared length
    /// prefix doesn't fit the remaining buffer.
    Malformed,
}

/// Read a single big-endian `u8` (trivial, included for symmetry).
pub fn read_u8(buf: &[u8]) -> Result<(u8, usize), ReadError> {
    buf.first().copied().map(|b| (b, 1)).ok_or(ReadError::NotEnough)
}

/// Read a big-endian `u16`.
pub fn read_u16(buf: &[u8]) -> Result<(u16, usize), ReadError> {
    if buf.len() < 2 {
        return Err(ReadError::NotEnough);
    }
    Ok((u16::from_be_bytes([buf[0], buf[1]]), 2))
}

/// Read a big-endian `u32`.
pub fn read_u32(buf: &[u8]) -> Result<(u32, usize), ReadError> {
    if buf.len() < 4 {
        return Err(ReadError::NotEnough);
    }
    Ok((u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]), 4))
}

/// Read a 2-byte-length-prefixed binary blob, borrowing from `buf`.
pub fn read_binary(buf: &[u8]) -> Result<(&[u8], usize), ReadError> {
    let (len, hdr) = read_u16(buf)?;
    let len = len as usize;
    let total = hdr + len;
    if buf.len() < total {
        return Err(ReadError::NotEnough);
    }
    Ok((&buf[hdr..total], total))
}

/// Read a 2-byte-length-prefixed UTF-8 string, borrowing from `buf`.
pub fn read_utf8(buf: &[u8]) -> Result<(&str, usize), ReadError> {
    let (bytes, consumed) = read_binary(buf)?;
    let s = core::str::from_utf8(bytes).map_err(|_| ReadError::Malformed)?;
    Ok((s, consumed))
}

/// Read a UTF-8 string pair (name, then value).
pub fn read_utf8_pair(buf: &[u8]) -> Result<(StringPair<'_>, usize), ReadError> {
    let (name, n1) = read_utf8(buf)?;
    let (value, n2) = read_utf8(&buf[n1..])?;
    Ok((StringPair { name, value }, n1 + n2))
}

/// Append a `u8` to `out`.
pub fn write_u8<const N: usize>(v: u8, out: &mut heapless::Vec<u8, N>) -> Result<(), ()> {
    out.push(v).map_err(|_| ())
}

/// Append a big-endian `u16` to `out`.
pub fn write_u16<const N: usize>(v: u16, out: &mut heapless::Vec<u8, N>) -> Result<(), ()> {
    out.extend_from_slice(&v.to_be_bytes()).map_err(|_| ())
}

/// Append a big-endian `u32` to `out`.
pub fn write_u32<const N: usize>(v: u32, out: &mut heapless::Vec<u8, N>) -> Result<(), ()> {
    out.extend_from_slice(&v.to_be_bytes()).map_err(|_| ())
}

/// Append a 2-byte-length-prefixed binary blob to `out`.
pub fn write_binary<const N: usize>(data: &[u8], out: &mut heapless::Vec<u8, N>) -> Result<(), ()> {
    if data.len() > u16::MAX as usize {
        return Err(());
    }
    write_u16(data.len() as u16, out)?;
    out.extend_from_slice(data).map_err(|_| ())
}

/// Append a 2-byte-length-prefixed UTF-8 string to `out`.
pub fn write_utf8<const N: usize>(s: &str, out: &mut heapless::Vec<u8, N>) -> Result<(), ()> {
    write_binary(s.as_bytes(), out)
}

/// Append a UTF-8 string pair to `out`.
pub fn write_utf8_pair<const N: usize>(
    name: &str,
    value: &str,
    out: &mut heapless::Vec<u8, N>,
) -> Result<(), ()> {
    write_utf8(name, out)?;
    write_utf8(value, out)
}

/// Wire-encoded length in bytes of a 2-byte-length-prefixed field.
pub fn binary_encoded_len(len: usize) -> usize {
    2 + len
}
