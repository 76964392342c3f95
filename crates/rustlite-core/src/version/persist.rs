//! Persistence codec for committed version entries (component E.2).
//!
//! Serializes the committed, non-deleted head of each version chain into
//! the payload the [`crate::cache_file`] codec frames with a header and
//! CRC. Uncommitted and deleted versions, and versions without data, are
//! skipped.

use crate::cache_file::{self, TYPE_ENTRY};
use crate::error::Result;
use crate::page::PageId;
use std::path::Path;

/// One decoded entry from a loaded cache file.
#[derive(Debug, Clone)]
pub struct LoadedEntry {
    /// DN the entry belongs to.
    pub dn: String,
    /// Entry payload.
    pub data: Vec<u8>,
    /// Page the payload was stored at when the file was written.
    pub page_id: PageId,
    /// Slot within that page.
    pub slot_id: u16,
}

/// A committed entry ready to be persisted.
pub struct SaveEntry<'a> {
    /// DN.
    pub dn: &'a str,
    /// Payload bytes.
    pub data: &'a [u8],
    /// Page id.
    pub page_id: PageId,
    /// Slot id.
    pub slot_id: u16,
}

fn encode(entries: &[SaveEntry<'_>]) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(&(entries.len() as u32).to_le_bytes());
    for e in entries {
        let dn_bytes = e.dn.as_bytes();
        buf.extend_from_slice(&(dn_bytes.len() as u16).to_le_bytes());
        buf.extend_from_slice(dn_bytes);
        buf.extend_from_slice(&(e.data.len() as u32).to_le_bytes());
        buf.extend_from_slice(e.data);
        buf.extend_from_slice(&e.page_id.to_le_bytes());
        buf.extend_from_slice(&e.slot_id.to_le_bytes());
    }
    buf
}

fn decode(buf: &[u8]) -> Result<Vec<LoadedEntry>> {
    use crate::error::Error;

    let mut cursor = 0usize;
    let read = |cursor: &mut usize, n: usize| -> Result<&[u8]> {
        if *cursor + n > buf.len() {
            return Err(Error::Corruption("truncated cache entry".to_string()));
        }
        let slice = &buf[*cursor..*cursor + n];
        *cursor += n;
        Ok(slice)
    };

    if buf.len() < 4 {
        return Err(Error::Corruption("truncated cache entry count".to_string()));
    }
    let entry_count = u32::from_le_bytes(read(&mut cursor, 4)?.try_into().unwrap());

    let mut entries = Vec::with_capacity(entry_count as usize);
    for _ in 0..entry_count {
        let dn_len = u16::from_le_bytes(read(&mut cursor, 2)?.try_into().unwrap()) as usize;
        let dn_bytes = read(&mut cursor, dn_len)?.to_vec();
        let dn = String::from_utf8(dn_bytes)
            .map_err(|e| Error::Corruption(format!("invalid dn utf8: {e}")))?;
        let data_len = u32::from_le_bytes(read(&mut cursor, 4)?.try_into().unwrap()) as usize;
        let data = read(&mut cursor, data_len)?.to_vec();
        let page_id = u64::from_le_bytes(read(&mut cursor, 8)?.try_into().unwrap());
        let slot_id = u16::from_le_bytes(read(&mut cursor, 2)?.try_into().unwrap());
        entries.push(LoadedEntry {
            dn,
            data,
            page_id,
            slot_id,
        });
    }
    Ok(entries)
}

/// Write `entries` to `path`. If `entries` is empty, no file is created
/// and this is a no-op success.
pub fn save_cache(path: impl AsRef<Path>, tx_id: u64, entries: &[SaveEntry<'_>]) -> Result<()> {
    if entries.is_empty() {
        return Ok(());
    }
    let payload = encode(entries);
    cache_file::write_file(path, TYPE_ENTRY, &payload, entries.len() as u64, tx_id)
}

/// Read back entries written by [`save_cache`], validating the header
/// and rejecting a cache file whose `tx_id` does not match `expected_tx_id`.
pub fn load_cache(path: impl AsRef<Path>, expected_tx_id: u64) -> Result<Vec<LoadedEntry>> {
    let (payload, _header) = cache_file::read_file(path, TYPE_ENTRY, expected_tx_id)?;
    decode(&payload)
}
