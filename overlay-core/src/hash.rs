//! Stable keyed hash of a normalized string into an `m`-bit identifier.
//!
//! SHA-256 of the normalized bytes, truncated into the `[0, 2^m)` space
//! the overlays route over.

use sha2::{Digest, Sha256};

use std::collections::BTreeMap;

use crate::identifier::{Identifier, KeyId, Width};

/// Lowercase + trim a raw key field into the canonical form used both as
/// the `LocalIndex` key and as the input to [`HashFn::hash`].
pub fn normalize_key(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Anything that can play the role of `HashFn` for an overlay.
///
/// Overlays are generic over this trait rather than hard-wired to
/// [`HashFn`] so that scenario tests can supply a
/// fixed literal mapping (e.g. `HashFn("alpha") = 12345`) instead of a real
/// cryptographic digest — the routing invariants under test are about
/// identifier arithmetic, not about SHA-256 itself.
pub trait KeyHasher: Send + Sync {
    fn hash(&self, normalized: &str) -> KeyId;
    fn m(&self) -> Width;
}

impl KeyHasher for HashFn {
    fn hash(&self, normalized: &str) -> KeyId {
        HashFn::hash(self, normalized)
    }

    fn m(&self) -> Width {
        self.m
    }
}

/// Deterministic, uniform-enough hash from a normalized string into
/// `[0, 2^m)`.
///
/// Takes the first 20 bytes (160 bits) of the SHA-256 digest of the UTF-8
/// encoding of `normalized`, then keeps the low `m` bits of that 160-bit
/// value, read big-endian. No error conditions.
#[derive(Debug, Clone, Copy)]
pub struct HashFn {
    m: Width,
}

impl HashFn {
    pub const fn new(m: Width) -> Self {
        HashFn { m }
    }

    pub fn m(&self) -> Width {
        self.m
    }

    pub fn hash(&self, normalized: &str) -> KeyId {
        let mut hasher = Sha256::new();
        hasher.update(normalized.as_bytes());
        let digest = hasher.finalize();
        // 160-bit (20-byte) truncation of the 256-bit SHA-256 digest.
        let digest160 = &digest[..20];

        // Low `m` bits of the 160-bit value, value read big-endian.
        let mut acc: u128 = 0;
        for byte in digest160 {
            acc = (acc << 8) | (*byte as u128);
        }
        let modulus = Identifier::modulus(self.m);
        KeyId(Identifier::new((acc % modulus) as u64))
    }
}

/// A literal key -> identifier mapping, for scenario fixtures that pin
/// exact hash outputs. Keys not present in the map
/// fall back to the real [`HashFn`], so a fixture only needs to override
/// the handful of literal keys a scenario cares about.
pub struct FixedHasher {
    overrides: BTreeMap<String, u64>,
    fallback: HashFn,
}

impl FixedHasher {
    pub fn new(m: Width, overrides: impl IntoIterator<Item = (&'static str, u64)>) -> Self {
        FixedHasher {
            overrides: overrides
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
            fallback: HashFn::new(m),
        }
    }
}

impl KeyHasher for FixedHasher {
    fn hash(&self, normalized: &str) -> KeyId {
        match self.overrides.get(normalized) {
            Some(&raw) => {
                let modulus = Identifier::modulus(self.fallback.m);
                KeyId(Identifier::new((raw as u128 % modulus) as u64))
            }
            None => self.fallback.hash(normalized),
        }
    }

    fn m(&self) -> Width {
        self.fallback.m
    }
}
