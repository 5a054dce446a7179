//! Priority-system fingerprinting and the in-memory `PrioritySet`.
//!
//! Fingerprints are 32-bit FNV-1a hashes of the normalized (trimmed,
//! lowercased) system name. Only fingerprints are stored; there is no
//! reverse mapping back to the original name, and none is kept.

use dashmap::DashSet;

const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

/// `fingerprint(name) = phash32(lowercase(trim(name)))`.
pub fn fingerprint(name: &str) -> u32 {
    let normalized = name.trim().to_lowercase();
    let mut hash = FNV_OFFSET_BASIS;
    for byte in normalized.as_bytes() {
        hash ^= u32::from(*byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Set of opaque fingerprints. Never expires entries: the source's
/// priority list has no TTL and this preserves that behavior.
#[derive(Default)]
pub struct PrioritySet {
    fingerprints: DashSet<u32>,
}

impl PrioritySet {
    pub fn from_names<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        let set = Self::default();
        for name in names {
            set.add_name(name);
        }
        set
    }

    pub fn from_fingerprints(values: impl IntoIterator<Item = u32>) -> Self {
        let fingerprints = DashSet::new();
        for value in values {
            fingerprints.insert(value);
        }
        Self { fingerprints }
    }

    pub fn add_name(&self, name: &str) {
        self.fingerprints.insert(fingerprint(name));
    }

    pub fn insert_fingerprint(&self, value: u32) {
        self.fingerprints.insert(value);
    }

    pub fn is_priority(&self, name: &str) -> bool {
        self.fingerprints.contains(&fingerprint(name))
    }

    pub fn snapshot(&self) -> Vec<u32> {
        self.fingerprints.iter().map(|v| *v).collect()
    }
}
