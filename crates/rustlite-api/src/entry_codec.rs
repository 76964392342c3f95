//! Encodes a DN write/delete as the `after_image` of a WAL `Update`
//! record, so [`crate::StorageEngine::restore`] can replay the WAL tail
//! back into DN/data pairs without a separate page-id-to-DN index.
//!
//! Format: `[tag: u8] [dn_len: u32 LE] [dn bytes] [data bytes]`. `data`
//! runs to the end of the buffer and is absent entirely for a delete.

use rustlite_core::error::{Error, Result};

const TAG_WRITE: u8 = 1;
const TAG_DELETE: u8 = 2;

/// Decoded payload of one replayed WAL entry.
pub struct Entry {
    /// The DN this record touched.
    pub dn: String,
    /// `Some(bytes)` for a write, `None` for a delete.
    pub data: Option<Vec<u8>>,
}

/// Encode a write of `data` to `dn`.
pub fn encode_write(dn: &str, data: &[u8]) -> Vec<u8> {
    let dn_bytes = dn.as_bytes();
    let mut buf = Vec::with_capacity(1 + 4 + dn_bytes.len() + data.len());
    buf.push(TAG_WRITE);
    buf.extend_from_slice(&(dn_bytes.len() as u32).to_le_bytes());
    buf.extend_from_slice(dn_bytes);
    buf.extend_from_slice(data);
    buf
}

/// Encode a delete of `dn`.
pub fn encode_delete(dn: &str) -> Vec<u8> {
    let dn_bytes = dn.as_bytes();
    let mut buf = Vec::with_capacity(1 + 4 + dn_bytes.len());
    buf.push(TAG_DELETE);
    buf.extend_from_slice(&(dn_bytes.len() as u32).to_le_bytes());
    buf.extend_from_slice(dn_bytes);
    buf
}

/// Decode a buffer produced by [`encode_write`] or [`encode_delete`].
pub fn decode(buf: &[u8]) -> Result<Entry> {
    if buf.is_empty() {
        return Err(Error::Corruption("empty WAL entry payload".to_string()));
    }
    let tag = buf[0];
    if buf.len() < 5 {
        return Err(Error::Corruption("truncated WAL entry header".to_string()));
    }
    let dn_len = u32::from_le_bytes(buf[1..5].try_into().unwrap()) as usize;
    if buf.len() < 5 + dn_len {
        return Err(Error::Corruption("truncated WAL entry dn".to_string()));
    }
    let dn = String::from_utf8(buf[5..5 + dn_len].to_vec())
        .map_err(|e| Error::Corruption(format!("invalid dn utf8: {e}")))?;

    match tag {
        TAG_WRITE => Ok(Entry {
            dn,
            data: Some(buf[5 + dn_len..].to_vec()),
        }),
        TAG_DELETE => Ok(Entry { dn, data: None }),
        other => Err(Error::Corruption(format!("unknown WAL entry tag: {other}"))),
    }
}
