//! Content fingerprints: SHA-256 digests used as the only change signal.

use crate::error::FingerprintError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

const DIGEST_LEN: usize = 32;

/// Fixed-width content hash. Displays and serializes as lowercase hex.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint([u8; DIGEST_LEN]);

impl Fingerprint {
    pub fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }

    /// First 12 hex characters, for logs
    pub fn short(&self) -> String {
        self.to_string()[..12].to_string()
    }
}

/// Fingerprint of raw bytes
pub fn fingerprint(bytes: &[u8]) -> Fingerprint {
    finish(Sha256::new_with_prefix(bytes))
}

/// File-level fingerprint over the ordered chunk fingerprints
pub fn file_fingerprint<'a, I>(chunks: I) -> Fingerprint
where
    I: IntoIterator<Item = &'a Fingerprint>,
{
    let mut hasher = Sha256::new();
    for chunk in chunks {
        hasher.update(chunk.as_bytes());
    }
    finish(hasher)
}

fn finish(hasher: Sha256) -> Fingerprint {
    let mut out = [0u8; DIGEST_LEN];
    out.copy_from_slice(&hasher.finalize());
    Fingerprint(out)
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.short())
    }
}

impl FromStr for Fingerprint {
    type Err = FingerprintError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != DIGEST_LEN * 2 {
            return Err(FingerprintError::InvalidLength {
                expected: DIGEST_LEN * 2,
                actual: s.len(),
            });
        }
        let mut out = [0u8; DIGEST_LEN];
        for (i, slot) in out.iter_mut().enumerate() {
            let pair = s
                .get(i * 2..i * 2 + 2)
                .ok_or_else(|| FingerprintError::InvalidHex(s.to_string()))?;
            *slot = u8::from_str_radix(pair, 16)
                .map_err(|_| FingerprintError::InvalidHex(s.to_string()))?;
        }
        Ok(Self(out))
    }
}

impl Serialize for Fingerprint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Fingerprint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
