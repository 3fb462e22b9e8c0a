//! hash — хеш ключей для размещения по слотам индекса.
//!
//! Слот ключа = hash % capacity, поэтому хеш обязан давать одно и то же
//! значение в любом процессе, который откроет .emoidx (std::DefaultHasher не годится).
//! Код алгоритма лежит в заголовке индекса (IDX_OFF_HASH_KIND); open() отказывает
//! на неизвестном коде, а не перекладывает слоты молча.

use std::fmt;
use std::hash::Hasher;
use twox_hash::XxHash64;

/// Алгоритм хеширования ключей; `to_u32()` пишется в заголовок .emoidx.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashKind {
    /// xxHash64, seed 0.
    Xx64Seed0 = 1,
}

impl HashKind {
    pub fn to_u32(self) -> u32 {
        self as u32
    }

    pub fn from_u32(code: u32) -> Option<Self> {
        match code {
            1 => Some(HashKind::Xx64Seed0),
            _ => None,
        }
    }
}

impl fmt::Display for HashKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HashKind::Xx64Seed0 => f.write_str("xx64/seed0"),
        }
    }
}

pub const HASH_KIND_DEFAULT: HashKind = HashKind::Xx64Seed0;

pub fn hash64(kind: HashKind, key: &[u8]) -> u64 {
    match kind {
        HashKind::Xx64Seed0 => {
            let mut h = XxHash64::with_seed(0);
            h.write(key);
            h.finish()
        }
    }
}

/// Hash value as written into a slot. Never 0, so a zeroed slot never
/// carries a plausible hash even if its state byte is damaged.
#[inline]
pub fn stored_hash(raw: u64) -> u64 {
    if raw == 0 { 1 } else { raw }
}

#[inline]
pub fn key_hash(kind: HashKind, key: &[u8]) -> u64 {
    stored_hash(hash64(kind, key))
}

/// Home slot for a hash in a table of `capacity` slots.
#[inline]
pub fn home_slot(hash: u64, capacity: u64) -> u64 {
    debug_assert!(capacity > 0, "capacity must be > 0");
    hash % capacity
}
