//! # Index Record Format
//!
//! Binary serialization of the cache index (generation fingerprint plus the
//! original → transformed checksum mapping).
//!
//! Format: Header (5 bytes) + postcard-serialized record.
//! - 4 bytes: Magic ("LWCI")
//! - 1 byte: Version
//!
//! The record is validated (size, header) before the payload is decoded, so a
//! truncated or foreign blob in the metadata table is rejected cheaply.

use crate::{Checksum, LoaderError, primitives};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Maximum allowed size of an encoded index record.
///
/// Each mapping costs at most 10 bytes in postcard varints; 64 MB is
/// several million units.
pub const MAX_INDEX_RECORD_SIZE: usize = 64 * 1024 * 1024;

/// Header length in bytes: magic plus one version byte.
const HEADER_SIZE: usize = 5;

/// Check the header of an encoded record. `bytes` holds at least a header.
fn check_header(bytes: &[u8]) -> Result<(), LoaderError> {
    if &bytes[0..4] != primitives::MAGIC_BYTES {
        return Err(LoaderError::CacheCorrupt(
            "Invalid index magic bytes".to_string(),
        ));
    }
    if bytes[4] != primitives::FORMAT_VERSION {
        return Err(LoaderError::CacheCorrupt(format!(
            "Unsupported index version: {} (expected {})",
            bytes[4],
            primitives::FORMAT_VERSION
        )));
    }
    Ok(())
}

// =============================================================================
// RECORD
// =============================================================================

/// The persisted form of the cache index.
///
/// `BTreeMap` keeps the encoding deterministic: the same index always
/// produces the same bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexRecord {
    /// Fingerprint of the external inputs the cache was built against.
    pub generation: Checksum,
    /// Original-content checksum → transformed-content checksum.
    pub transformed: BTreeMap<Checksum, Checksum>,
}

impl IndexRecord {
    /// An empty record for the given generation.
    #[must_use]
    pub fn empty(generation: Checksum) -> Self {
        Self {
            generation,
            transformed: BTreeMap::new(),
        }
    }
}

// =============================================================================
// SERIALIZATION FUNCTIONS
// =============================================================================

/// Serialize an index record to bytes (header + payload).
pub fn index_to_bytes(record: &IndexRecord) -> Result<Vec<u8>, LoaderError> {
    let payload = postcard::to_stdvec(record)
        .map_err(|e| LoaderError::SerializationError(e.to_string()))?;

    let mut result = Vec::with_capacity(HEADER_SIZE + payload.len());
    result.extend_from_slice(primitives::MAGIC_BYTES);
    result.push(primitives::FORMAT_VERSION);
    result.extend_from_slice(&payload);
    Ok(result)
}

/// Deserialize an index record from bytes.
///
/// Size and header are checked before the payload is touched. Every failure
/// is reported as `CacheCorrupt`; callers treat that as an empty index.
pub fn index_from_bytes(bytes: &[u8]) -> Result<IndexRecord, LoaderError> {
    if bytes.len() < HEADER_SIZE {
        return Err(LoaderError::CacheCorrupt(
            "Index record too short: minimum 5 bytes required".to_string(),
        ));
    }
    if bytes.len() > MAX_INDEX_RECORD_SIZE {
        return Err(LoaderError::CacheCorrupt(format!(
            "Index record size {} bytes exceeds maximum allowed {} bytes",
            bytes.len(),
            MAX_INDEX_RECORD_SIZE
        )));
    }

    check_header(bytes)?;

    postcard::from_bytes(&bytes[HEADER_SIZE..]).map_err(|e| {
        LoaderError::CacheCorrupt(format!("Failed to decode index record: {}", e))
    })
}

// =============================================================================
// TESTS
// =============================================================================
