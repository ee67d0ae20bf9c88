//! # Storage Module
//!
//! Persistent container backends.

pub mod artifact_cache;

pub use artifact_cache::ArtifactCache;
