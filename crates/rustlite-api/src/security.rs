/// Input validation for the `StorageEngine` facade.
///
/// This module guards the two values callers hand across the boundary:
/// a DN (the version store's key) and a write payload. Everything else
/// is already typed (`TransactionId`, `Snapshot`) and needs no runtime
/// checking.
use rustlite_core::error::{Error, Result};

/// Validates a DN (the version store's entry key).
///
/// # Security
///
/// - Prevents empty and oversized (>1KB) DNs.
/// - Prevents path-separator-like characters and `..`, since some
///   callers derive on-disk index file names from DNs.
/// - Prevents null bytes.
#[inline]
pub fn validate_dn(dn: &str) -> Result<()> {
    const MAX_DN_LENGTH: usize = 1024;

    if dn.is_empty() {
        return Err(Error::Argument("dn cannot be empty".to_string()));
    }

    if dn.len() > MAX_DN_LENGTH {
        return Err(Error::Argument(format!(
            "dn length {} exceeds maximum {MAX_DN_LENGTH}",
            dn.len()
        )));
    }

    if dn.contains('/') || dn.contains('\\') || dn.contains("..") {
        return Err(Error::Argument(
            "dn cannot contain path separators or '..'".to_string(),
        ));
    }

    if dn.contains('\0') {
        return Err(Error::Argument("dn cannot contain null bytes".to_string()));
    }

    Ok(())
}

/// Validates a write payload.
///
/// # Security
///
/// - Prevents oversized payloads (>64MB) to bound version chain memory.
#[inline]
pub fn validate_payload(data: &[u8]) -> Result<()> {
    const MAX_PAYLOAD_SIZE: usize = 64 * 1024 * 1024;

    if data.len() > MAX_PAYLOAD_SIZE {
        return Err(Error::Argument(format!(
            "payload size {} exceeds maximum {MAX_PAYLOAD_SIZE}",
            data.len()
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_dn_rejects_empty() {
        assert!(validate_dn("").is_err());
    }

    #[test]
    fn validate_dn_rejects_oversized() {
        let long = "a".repeat(1025);
        assert!(validate_dn(&long).is_err());
    }

    #[test]
    fn validate_dn_rejects_path_traversal() {
        assert!(validate_dn("../etc/passwd").is_err());
        assert!(validate_dn("cn=a/b").is_err());
    }

    #[test]
    fn validate_dn_accepts_plain_identifier() {
        assert!(validate_dn("cn=alice,ou=people").is_ok());
    }

    #[test]
    fn validate_payload_rejects_oversized() {
        let big = vec![0u8; 65 * 1024 * 1024];
        assert!(validate_payload(&big).is_err());
    }

    #[test]
    fn validate_payload_accepts_empty() {
        assert!(validate_payload(b"").is_ok());
    }
}
