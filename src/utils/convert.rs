use crate::Result;
use crate::StorageError;

/// Converts a log index to an 8-byte sled key in big-endian byte order.
///
/// Big-endian keeps sled's lexicographic key order identical to index order,
/// so range scans walk the log in sequence.
pub const fn index_to_key(index: u64) -> [u8; 8] {
    index.to_be_bytes()
}

/// Reads a log index back out of an 8-byte big-endian key.
pub fn key_to_index<K: AsRef<[u8]>>(bytes: K) -> Result<u64> {
    let bytes = bytes.as_ref();
    let array: [u8; 8] = bytes.try_into().map_err(|_| {
        StorageError::LogStorage(format!(
            "log key must be 8 bytes, got {}",
            bytes.len()
        ))
    })?;
    Ok(u64::from_be_bytes(array))
}
