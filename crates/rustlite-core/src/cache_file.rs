//! Cache File Codec (component A).
//!
//! A small, CRC-checked, atomically-written file format used to snapshot
//! committed state to disk for fast restart. The layout is a fixed
//! 48-byte header followed by a payload:
//!
//! ```text
//! offset  size  field
//! 0       4     magic            b"OBAC"
//! 4       4     version          u32 LE
//! 8       1     type             u8
//! 9       7     reserved         zero
//! 16      8     entry_count      u64 LE
//! 24      8     last_tx_id       u64 LE
//! 32      4     data_crc32       u32 LE
//! 36      8     data_length      u64 LE
//! 44      4     header_crc32     u32 LE, covers bytes 0..43
//! ```
//!
//! `header_crc32` is IEEE CRC-32 over bytes `0..44` (with the crc field
//! itself still zero at the time it is computed). `data_crc32` is IEEE
//! CRC-32 over the payload bytes.

use std::fs;
use std::io::Write;
use std::path::Path;

use crate::error::{Error, Result};
use crate::format_version::{cache_version, magic};

/// Total header size in bytes.
pub const HEADER_SIZE: usize = 48;

/// Cache file payload kind. The codec is payload-agnostic; callers supply
/// whichever tag their layer above uses to distinguish file contents.
pub type CacheFileType = u8;

/// The `type` tag used by the version store's persistence codec
/// (component E.2) for its committed-entry snapshot.
pub const TYPE_ENTRY: CacheFileType = 1;

/// Parsed header of a cache file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheFileHeader {
    /// Format version the file was written with.
    pub version: u32,
    /// Caller-defined payload tag.
    pub file_type: CacheFileType,
    /// Number of logical entries described by the payload.
    pub entry_count: u64,
    /// The transaction id current when the file was written.
    pub last_tx_id: u64,
    /// CRC-32 of the payload.
    pub data_crc32: u32,
    /// Length of the payload in bytes.
    pub data_length: u64,
}

fn build_header_bytes(
    file_type: CacheFileType,
    entry_count: u64,
    last_tx_id: u64,
    data_crc32: u32,
    data_length: u64,
) -> [u8; HEADER_SIZE] {
    let mut buf = [0u8; HEADER_SIZE];
    buf[0..4].copy_from_slice(&magic::CACHE);
    buf[4..8].copy_from_slice(&cache_version().current.to_le_bytes());
    buf[8] = file_type;
    // bytes 9..16 stay zero (reserved)
    buf[16..24].copy_from_slice(&entry_count.to_le_bytes());
    buf[24..32].copy_from_slice(&last_tx_id.to_le_bytes());
    buf[32..36].copy_from_slice(&data_crc32.to_le_bytes());
    buf[36..44].copy_from_slice(&data_length.to_le_bytes());
    let header_crc = crc32fast::hash(&buf[0..44]);
    buf[44..48].copy_from_slice(&header_crc.to_le_bytes());
    buf
}

/// Write `payload` to `path` as a cache file, atomically (write to a
/// sibling `.tmp` file, flush, then rename over the destination).
pub fn write_file(
    path: impl AsRef<Path>,
    file_type: CacheFileType,
    payload: &[u8],
    entry_count: u64,
    last_tx_id: u64,
) -> Result<()> {
    let path = path.as_ref();
    let data_crc32 = crc32fast::hash(payload);
    let header = build_header_bytes(
        file_type,
        entry_count,
        last_tx_id,
        data_crc32,
        payload.len() as u64,
    );

    let tmp_path = path.with_extension("tmp");
    {
        let mut f = fs::File::create(&tmp_path)?;
        f.write_all(&header)?;
        f.write_all(payload)?;
        f.flush()?;
        f.sync_all()?;
    }
    fs::rename(&tmp_path, path)?;
    Ok(())
}

fn parse_header(buf: &[u8]) -> Result<CacheFileHeader> {
    if buf.len() < HEADER_SIZE {
        return Err(Error::Corruption(format!(
            "cache file too short: {} bytes, need at least {HEADER_SIZE}",
            buf.len()
        )));
    }
    if buf[0..4] != magic::CACHE {
        return Err(Error::Corruption("bad magic number".to_string()));
    }
    let version = u32::from_le_bytes(buf[4..8].try_into().unwrap());
    if !cache_version().can_read(version) {
        return Err(Error::Corruption(format!(
            "unsupported cache file version {version}"
        )));
    }
    let file_type = buf[8];
    let entry_count = u64::from_le_bytes(buf[16..24].try_into().unwrap());
    let last_tx_id = u64::from_le_bytes(buf[24..32].try_into().unwrap());
    let data_crc32 = u32::from_le_bytes(buf[32..36].try_into().unwrap());
    let data_length = u64::from_le_bytes(buf[36..44].try_into().unwrap());
    let stored_header_crc = u32::from_le_bytes(buf[44..48].try_into().unwrap());

    let computed_header_crc = crc32fast::hash(&buf[0..44]);
    if computed_header_crc != stored_header_crc {
        return Err(Error::Corruption("header CRC mismatch".to_string()));
    }

    Ok(CacheFileHeader {
        version,
        file_type,
        entry_count,
        last_tx_id,
        data_crc32,
        data_length,
    })
}

/// Read and validate a cache file, returning its payload and header.
///
/// Fails distinctly for: missing file, too-short buffer, bad magic,
/// unsupported version, header CRC mismatch, data length/CRC mismatch
/// (all [`Error::Corruption`]), wrong `file_type` ([`Error::Argument`]),
/// and mismatched `tx_id` ([`Error::Staleness`]).
pub fn read_file(
    path: impl AsRef<Path>,
    expected_type: CacheFileType,
    expected_tx_id: u64,
) -> Result<(Vec<u8>, CacheFileHeader)> {
    let path = path.as_ref();
    let buf = fs::read(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::NotFound(format!("cache file {}", path.display()))
        } else {
            Error::Io(e)
        }
    })?;

    let header = parse_header(&buf)?;

    if header.file_type != expected_type {
        return Err(Error::Argument(format!(
            "cache file type {} does not match expected {}",
            header.file_type, expected_type
        )));
    }
    if header.last_tx_id != expected_tx_id {
        return Err(Error::Staleness {
            expected: expected_tx_id,
            found: header.last_tx_id,
        });
    }

    let payload = &buf[HEADER_SIZE..];
    if payload.len() as u64 != header.data_length {
        return Err(Error::Corruption(format!(
            "payload length {} does not match header data_length {}",
            payload.len(),
            header.data_length
        )));
    }
    if crc32fast::hash(payload) != header.data_crc32 {
        return Err(Error::Corruption("data CRC mismatch".to_string()));
    }

    Ok((payload.to_vec(), header))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.bin");
        write_file(&path, TYPE_ENTRY, b"hello world", 3, 42).unwrap();
        let (data, header) = read_file(&path, TYPE_ENTRY, 42).unwrap();
        assert_eq!(data, b"hello world");
        assert_eq!(header.entry_count, 3);
        assert_eq!(header.last_tx_id, 42);
    }

    #[test]
    fn detects_corrupted_payload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.bin");
        write_file(&path, TYPE_ENTRY, b"hello world", 3, 42).unwrap();
        let mut bytes = fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        fs::write(&path, &bytes).unwrap();
        let err = read_file(&path, TYPE_ENTRY, 42).unwrap_err();
        assert!(matches!(err, Error::Corruption(_)));
    }

    #[test]
    fn detects_corrupted_header() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.bin");
        write_file(&path, TYPE_ENTRY, b"hello world", 3, 42).unwrap();
        let mut bytes = fs::read(&path).unwrap();
        bytes[10] ^= 0xFF;
        fs::write(&path, &bytes).unwrap();
        let err = read_file(&path, TYPE_ENTRY, 42).unwrap_err();
        assert!(matches!(err, Error::Corruption(_)));
    }

    #[test]
    fn rejects_stale_tx_id() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.bin");
        write_file(&path, TYPE_ENTRY, b"data", 1, 100).unwrap();
        let err = read_file(&path, TYPE_ENTRY, 200).unwrap_err();
        assert!(matches!(err, Error::Staleness { .. }));
    }

    #[test]
    fn rejects_wrong_type() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.bin");
        write_file(&path, TYPE_ENTRY, b"data", 1, 100).unwrap();
        let err = read_file(&path, 99, 100).unwrap_err();
        assert!(matches!(err, Error::Argument(_)));
    }

    #[test]
    fn missing_file_is_not_found() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing.bin");
        let err = read_file(&path, TYPE_ENTRY, 0).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
