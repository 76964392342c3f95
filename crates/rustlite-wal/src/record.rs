// WAL record format and encoding/decoding
//
// Record format (binary):
// [length: u32 LE] [type: u8] [payload bytes] [crc32: u32 LE]
//
// Types:
// - BEGIN (1): transaction start marker
// - COMMIT (2): transaction commit marker
// - ABORT (3): transaction rollback marker
// - UPDATE (4): page before/after image

use crc32fast::Hasher;
use rustlite_core::{Error, Result};
use serde::{Deserialize, Serialize};

/// WAL record types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum RecordType {
    Begin = 1,
    Commit = 2,
    Abort = 3,
    Update = 4,
}

impl TryFrom<u8> for RecordType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            1 => Ok(RecordType::Begin),
            2 => Ok(RecordType::Commit),
            3 => Ok(RecordType::Abort),
            4 => Ok(RecordType::Update),
            _ => Err(Error::Argument(format!("unknown WAL record type: {value}"))),
        }
    }
}

/// WAL record payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordPayload {
    Begin {
        tx_id: u64,
    },
    Commit {
        tx_id: u64,
    },
    Abort {
        tx_id: u64,
    },
    Update {
        tx_id: u64,
        page_id: u64,
        offset: u64,
        before_image: Option<Vec<u8>>,
        after_image: Option<Vec<u8>>,
    },
}

/// A WAL record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalRecord {
    pub record_type: RecordType,
    pub payload: RecordPayload,
}

impl WalRecord {
    /// Create a BEGIN record
    pub fn begin(tx_id: u64) -> Self {
        Self {
            record_type: RecordType::Begin,
            payload: RecordPayload::Begin { tx_id },
        }
    }

    /// Create a COMMIT record
    pub fn commit(tx_id: u64) -> Self {
        Self {
            record_type: RecordType::Commit,
            payload: RecordPayload::Commit { tx_id },
        }
    }

    /// Create an ABORT record
    pub fn abort(tx_id: u64) -> Self {
        Self {
            record_type: RecordType::Abort,
            payload: RecordPayload::Abort { tx_id },
        }
    }

    /// Create an UPDATE record carrying a page's before and/or after image
    pub fn update(
        tx_id: u64,
        page_id: u64,
        offset: u64,
        before_image: Option<Vec<u8>>,
        after_image: Option<Vec<u8>>,
    ) -> Self {
        Self {
            record_type: RecordType::Update,
            payload: RecordPayload::Update {
                tx_id,
                page_id,
                offset,
                before_image,
                after_image,
            },
        }
    }

    /// Encode record to bytes with framing and CRC
    /// Format: [length: u32 LE] [type: u8] [payload bytes] [crc32: u32 LE]
    pub fn encode(&self) -> Result<Vec<u8>> {
        let payload_bytes = bincode::serialize(&self.payload)
            .map_err(|e| Error::Serialization(format!("failed to serialize payload: {e}")))?;

        let type_byte = self.record_type as u8;
        let content_len = 1 + payload_bytes.len();

        let mut hasher = Hasher::new();
        hasher.update(&[type_byte]);
        hasher.update(&payload_bytes);
        let crc = hasher.finalize();

        let mut frame = Vec::with_capacity(4 + content_len + 4);
        frame.extend_from_slice(&(content_len as u32).to_le_bytes());
        frame.push(type_byte);
        frame.extend_from_slice(&payload_bytes);
        frame.extend_from_slice(&crc.to_le_bytes());

        Ok(frame)
    }

    /// Decode record from bytes with validation
    pub fn decode(data: &[u8]) -> Result<(Self, usize)> {
        if data.len() < 9 {
            // Minimum: 4 (length) + 1 (type) + 0 (payload) + 4 (crc)
            return Err(Error::Serialization("Incomplete record frame".to_string()));
        }

        let length = u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as usize;

        let total_size = 4 + length + 4;
        if data.len() < total_size {
            return Err(Error::Serialization(format!(
                "Incomplete record: expected {total_size} bytes, got {}",
                data.len()
            )));
        }

        let type_byte = data[4];
        let record_type = RecordType::try_from(type_byte)?;

        let payload_bytes = &data[5..4 + length];

        let crc_offset = 4 + length;
        let expected_crc = u32::from_le_bytes([
            data[crc_offset],
            data[crc_offset + 1],
            data[crc_offset + 2],
            data[crc_offset + 3],
        ]);

        let mut hasher = Hasher::new();
        hasher.update(&[type_byte]);
        hasher.update(payload_bytes);
        let actual_crc = hasher.finalize();

        if actual_crc != expected_crc {
            return Err(Error::Corruption(format!(
                "CRC mismatch: expected {expected_crc}, got {actual_crc}"
            )));
        }

        let payload: RecordPayload = bincode::deserialize(payload_bytes)
            .map_err(|e| Error::Serialization(format!("failed to deserialize payload: {e}")))?;

        Ok((
            WalRecord {
                record_type,
                payload,
            },
            total_size,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_type_conversion() {
        assert_eq!(RecordType::try_from(1).unwrap(), RecordType::Begin);
        assert_eq!(RecordType::try_from(4).unwrap(), RecordType::Update);
        assert!(RecordType::try_from(99).is_err());
    }

    #[test]
    fn test_update_record_encode_decode() {
        let record = WalRecord::update(
            1,
            7,
            0,
            Some(b"before".to_vec()),
            Some(b"after".to_vec()),
        );

        let encoded = record.encode().unwrap();
        assert!(encoded.len() > 9);

        let (decoded, size) = WalRecord::decode(&encoded).unwrap();
        assert_eq!(decoded, record);
        assert_eq!(size, encoded.len());
    }

    #[test]
    fn test_tx_marker_records_encode_decode() {
        let begin = WalRecord::begin(42);
        let commit = WalRecord::commit(42);
        let abort = WalRecord::abort(7);

        for record in [begin, commit, abort] {
            let encoded = record.encode().unwrap();
            let (decoded, _) = WalRecord::decode(&encoded).unwrap();
            assert_eq!(decoded, record);
        }
    }

    #[test]
    fn test_update_with_only_before_image() {
        let record = WalRecord::update(1, 7, 0, Some(b"before".to_vec()), None);
        let encoded = record.encode().unwrap();
        let (decoded, _) = WalRecord::decode(&encoded).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn test_crc_validation() {
        let record = WalRecord::update(1, 7, 0, Some(b"before".to_vec()), None);
        let mut encoded = record.encode().unwrap();

        if encoded.len() > 10 {
            encoded[10] ^= 0xFF;
        }

        let result = WalRecord::decode(&encoded);
        assert!(result.is_err());
    }

    #[test]
    fn test_incomplete_record() {
        let record = WalRecord::begin(1);
        let encoded = record.encode().unwrap();

        let result = WalRecord::decode(&encoded[..5]);
        assert!(result.is_err());
    }
}
