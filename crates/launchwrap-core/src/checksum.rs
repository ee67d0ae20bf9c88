//! # Checksum
//!
//! Adler-32 rolling checksum used to fingerprint raw units, key the
//! artifact cache, and compute the cache generation fingerprint.
//!
//! Non-cryptographic: collisions are tolerated because the cache is an
//! optimization keyed by content, not a security boundary.

use crate::primitives::CHECKSUM_HEX_WIDTH;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A 32-bit content checksum.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct Checksum(pub u32);

impl Checksum {
    /// Sentinel checksum of the empty buffer.
    pub const EMPTY: Self = Self(0);

    /// Checksum of a complete buffer.
    #[must_use]
    pub fn of(bytes: &[u8]) -> Self {
        if bytes.is_empty() {
            return Self::EMPTY;
        }
        let mut adler = Adler32::new();
        adler.update(bytes);
        adler.finish()
    }

    /// Whether this is the empty-buffer sentinel.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Get the raw checksum value.
    #[must_use]
    pub const fn value(self) -> u32 {
        self.0
    }

    /// Fixed-width lowercase hex rendering, used as the blob key.
    #[must_use]
    pub fn to_hex(self) -> String {
        format!("{:0width$x}", self.0, width = CHECKSUM_HEX_WIDTH)
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Incremental Adler-32 state.
///
/// Feeding several buffers in sequence yields the checksum of their
/// concatenation.
#[derive(Debug, Clone, Copy)]
pub struct Adler32 {
    state: adler2::Adler32,
    fed: bool,
}

impl Adler32 {
    /// Fresh state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: adler2::Adler32::new(),
            fed: false,
        }
    }

    /// Feed more bytes.
    pub fn update(&mut self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        self.fed = true;
        self.state.write_slice(bytes);
    }

    /// Current checksum. Nothing fed yields [`Checksum::EMPTY`].
    #[must_use]
    pub fn finish(&self) -> Checksum {
        if !self.fed {
            return Checksum::EMPTY;
        }
        Checksum(self.state.checksum())
    }
}

impl Default for Adler32 {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_vector() {
        assert_eq!(Checksum::of(b"Wikipedia"), Checksum(0x11E6_0398));
    }

    #[test]
    fn empty_is_sentinel() {
        assert_eq!(Checksum::of(&[]), Checksum::EMPTY);
        assert!(Checksum::of(&[]).is_empty());
        assert!(!Checksum::of(&[0]).is_empty());
    }

    #[test]
    fn hex_is_fixed_width() {
        assert_eq!(Checksum(0x1f).to_hex(), "0000001f");
        assert_eq!(Checksum(0x11E6_0398).to_hex(), "11e60398");
    }

    #[test]
    fn incremental_matches_whole() {
        let data: Vec<u8> = (0..20_000u32).map(|i| (i % 251) as u8).collect();
        let mut rolling = Adler32::new();
        for part in data.chunks(777) {
            rolling.update(part);
        }
        assert_eq!(rolling.finish(), Checksum::of(&data));
    }

    #[test]
    fn large_run_of_max_bytes_stays_in_range() {
        let data = vec![0xFFu8; 20_000];
        let checksum = Checksum::of(&data);
        assert!(checksum.value() & 0xFFFF < 65_521);
        assert!(checksum.value() >> 16 < 65_521);
    }
}
