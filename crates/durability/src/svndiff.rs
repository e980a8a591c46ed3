//! A small, self-contained binary delta codec used to fill the `svndiff0`
//! slot named by spec.md §4.2 and §6.
//!
//! This core treats the delta wire format as internal: spec.md requires only
//! that reconstruction reproduce the original bytes exactly (§8 "Round-trip"),
//! not interoperability with any particular historical encoding. The codec
//! below is a single-window prefix/suffix diff: it copies the longest shared
//! prefix and suffix between the base and the new content and inserts the
//! literal bytes in between. That is exactly the shape real skip-delta
//! payloads take for the common case spec.md §8 scenario 3 exercises
//! (incremental appends), while staying simple enough to implement without a
//! general-purpose diff algorithm.

use fsfs_core::{Error, Result};
use std::io::{Read, Write};

const MAGIC: &[u8; 4] = b"SVD0";

/// Encodes `content` with no base (a self-delta): the payload is the magic
/// byte plus the literal content.
pub fn encode_self_delta(content: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(content.len() + 4);
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(content);
    out
}

/// Encodes `content` against `base` as a copy-prefix / insert-middle /
/// copy-suffix window.
pub fn encode_delta(base: &[u8], content: &[u8]) -> Vec<u8> {
    let prefix = common_prefix_len(base, content);
    // The suffix match must not overlap the prefix match.
    let max_suffix = base.len().min(content.len()) - prefix;
    let suffix = common_suffix_len(&base[prefix..], &content[prefix..], max_suffix);

    let mut out = Vec::new();
    out.extend_from_slice(MAGIC);
    write_u64(&mut out, prefix as u64);
    write_u64(&mut out, suffix as u64);
    write_u64(&mut out, base.len() as u64);
    let middle = &content[prefix..content.len() - suffix];
    write_u64(&mut out, middle.len() as u64);
    out.extend_from_slice(middle);
    out
}

/// Decodes a payload produced by [`encode_self_delta`].
pub fn decode_self_delta(payload: &[u8]) -> Result<Vec<u8>> {
    let rest = payload.strip_prefix(MAGIC.as_slice()).ok_or_else(|| Error::corrupt("bad svndiff magic"))?;
    Ok(rest.to_vec())
}

/// Decodes a payload produced by [`encode_delta`] against the already
/// reconstructed `base`.
pub fn decode_delta(payload: &[u8], base: &[u8]) -> Result<Vec<u8>> {
    let mut cursor = payload.strip_prefix(MAGIC.as_slice()).ok_or_else(|| Error::corrupt("bad svndiff magic"))?;
    let prefix = read_u64(&mut cursor)? as usize;
    let suffix = read_u64(&mut cursor)? as usize;
    let base_len = read_u64(&mut cursor)? as usize;
    let middle_len = read_u64(&mut cursor)? as usize;
    if base_len != base.len() {
        return Err(Error::corrupt("delta base length does not match reconstructed base"));
    }
    if middle_len > cursor.len() {
        return Err(Error::corrupt("truncated svndiff payload"));
    }
    let middle = &cursor[..middle_len];
    if prefix + suffix > base.len() {
        return Err(Error::corrupt("svndiff prefix/suffix overrun base"));
    }
    let mut out = Vec::with_capacity(prefix + middle.len() + suffix);
    out.extend_from_slice(&base[..prefix]);
    out.extend_from_slice(middle);
    out.extend_from_slice(&base[base.len() - suffix..]);
    Ok(out)
}

fn common_prefix_len(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b.iter()).take_while(|(x, y)| x == y).count()
}

fn common_suffix_len(a: &[u8], b: &[u8], max: usize) -> usize {
    let mut n = 0;
    while n < max && a[a.len() - 1 - n] == b[b.len() - 1 - n] {
        n += 1;
    }
    n
}

fn write_u64(out: &mut Vec<u8>, v: u64) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn read_u64(cursor: &mut &[u8]) -> Result<u64> {
    if cursor.len() < 8 {
        return Err(Error::corrupt("truncated svndiff integer"));
    }
    let mut buf = [0u8; 8];
    let mut reader: &[u8] = &cursor[..8];
    reader.read_exact(&mut buf).map_err(Error::Io)?;
    *cursor = &cursor[8..];
    Ok(u64::from_le_bytes(buf))
}

/// Streams `payload` to `w`; trivial today but kept as a seam so a future
/// windowed/streaming encoder doesn't change call sites.
pub fn write_payload(w: &mut impl Write, payload: &[u8]) -> Result<()> {
    w.write_all(payload)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn self_delta_roundtrip() {
        let content = b"hello\n";
        let encoded = encode_self_delta(content);
        assert_eq!(decode_self_delta(&encoded).unwrap(), content);
    }

    #[test]
    fn delta_roundtrip_on_append() {
        let base = b"hello".to_vec();
        let content = b"helloX".to_vec();
        let encoded = encode_delta(&base, &content);
        assert_eq!(decode_delta(&encoded, &base).unwrap(), content);
        // An append-only edit should need only 1 byte of literal middle.
        assert!(encoded.len() < base.len() + content.len());
    }

    #[test]
    fn delta_roundtrip_on_middle_edit() {
        let base = b"the quick brown fox".to_vec();
        let content = b"the slow brown fox".to_vec();
        let encoded = encode_delta(&base, &content);
        assert_eq!(decode_delta(&encoded, &base).unwrap(), content);
    }
}
