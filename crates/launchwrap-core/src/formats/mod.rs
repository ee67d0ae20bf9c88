//! # Formats Module
//!
//! On-disk encodings owned by the loader. File and container I/O live in
//! `storage`; this module only turns records into bytes and back.

pub mod index;

pub use index::{IndexRecord, MAX_INDEX_RECORD_SIZE, index_from_bytes, index_to_bytes};
