use anyhow::bail;
use bytes::{Buf, BufMut, BytesMut};

/// Commands have fixed layouts, so their decoders check the payload length once up front and
///  then read with the infallible `Buf` getters.
pub fn ensure_remaining(buf: &[u8], required: usize) -> anyhow::Result<()> {
    if buf.len() < required {
        bail!("buffer underflow: {} bytes required, {} available", required, buf.len());
    }
    Ok(())
}

/// Writes `s` into a zero-padded field of exactly `len` bytes, truncating if necessary.
pub fn put_fixed_string(buf: &mut BytesMut, s: &str, len: usize) {
    let bytes = s.as_bytes();
    let used = bytes.len().min(len);
    buf.put_slice(&bytes[..used]);
    buf.put_bytes(0, len - used);
}

/// Reads a zero-padded string field of exactly `len` bytes. Bytes after the first NUL are
///  ignored, and invalid UTF-8 is replaced rather than rejected since device names are
///  informational.
pub fn get_fixed_string(buf: &mut impl Buf, len: usize) -> String {
    let mut raw = vec![0u8; len];
    buf.copy_to_slice(&mut raw);
    let end = raw.iter()
        .position(|&b| b == 0)
        .unwrap_or(len);
    String::from_utf8_lossy(&raw[..end]).into_owned()
}

/// Number of zero bytes needed to pad `len` to a multiple of four
pub fn padding_to_u32(len: usize) -> usize {
    (4 - len % 4) % 4
}
