//! Lightweight global metrics for EmoKV.
//!
//! Потокобезопасные атомарные счётчики на процесс (по всем открытым хранилищам):
//! - put / delete
//! - in-place updates vs relocations
//! - index growth (rehash)
//! - corruption events (get/check)
//! - compression savings

use std::sync::atomic::{AtomicU64, Ordering};

static PUTS_TOTAL: AtomicU64 = AtomicU64::new(0);
static IN_PLACE_UPDATES: AtomicU64 = AtomicU64::new(0);
static RELOCATIONS: AtomicU64 = AtomicU64::new(0);
static DELETES_TOTAL: AtomicU64 = AtomicU64::new(0);
static INDEX_GROWTHS: AtomicU64 = AtomicU64::new(0);
static CORRUPTION_EVENTS: AtomicU64 = AtomicU64::new(0);
static COMPRESSED_VALUES: AtomicU64 = AtomicU64::new(0);
static COMPRESSION_SAVED_BYTES: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    pub puts_total: u64,
    pub in_place_updates: u64,
    pub relocations: u64,
    pub deletes_total: u64,
    pub index_growths: u64,
    pub corruption_events: u64,
    pub compressed_values: u64,
    pub compression_saved_bytes: u64,
}

impl MetricsSnapshot {
    /// Доля обновлений существующих ключей, прошедших без перевыделения.
    pub fn in_place_ratio(&self) -> f64 {
        let total = self.in_place_updates + self.relocations;
        if total == 0 {
            0.0
        } else {
            self.in_place_updates as f64 / total as f64
        }
    }
}

pub fn record_put() {
    PUTS_TOTAL.fetch_add(1, Ordering::Relaxed);
}

pub fn record_in_place_update() {
    IN_PLACE_UPDATES.fetch_add(1, Ordering::Relaxed);
}

pub fn record_relocation() {
    RELOCATIONS.fetch_add(1, Ordering::Relaxed);
}

pub fn record_delete() {
    DELETES_TOTAL.fetch_add(1, Ordering::Relaxed);
}

pub fn record_index_growth() {
    INDEX_GROWTHS.fetch_add(1, Ordering::Relaxed);
}

pub fn record_corruption() {
    CORRUPTION_EVENTS.fetch_add(1, Ordering::Relaxed);
}

pub fn record_compression(raw_len: usize, stored_len: usize) {
    COMPRESSED_VALUES.fetch_add(1, Ordering::Relaxed);
    COMPRESSION_SAVED_BYTES.fetch_add(raw_len.saturating_sub(stored_len) as u64, Ordering::Relaxed);
}

pub fn snapshot() -> MetricsSnapshot {
    MetricsSnapshot {
        puts_total: PUTS_TOTAL.load(Ordering::Relaxed),
        in_place_updates: IN_PLACE_UPDATES.load(Ordering::Relaxed),
        relocations: RELOCATIONS.load(Ordering::Relaxed),
        deletes_total: DELETES_TOTAL.load(Ordering::Relaxed),
        index_growths: INDEX_GROWTHS.load(Ordering::Relaxed),
        corruption_events: CORRUPTION_EVENTS.load(Ordering::Relaxed),
        compressed_values: COMPRESSED_VALUES.load(Ordering::Relaxed),
        compression_saved_bytes: COMPRESSION_SAVED_BYTES.load(Ordering::Relaxed),
    }
}

pub fn reset() {
    PUTS_TOTAL.store(0, Ordering::Relaxed);
    IN_PLACE_UPDATES.store(0, Ordering::Relaxed);
    RELOCATIONS.store(0, Ordering::Relaxed);
    DELETES_TOTAL.store(0, Ordering::Relaxed);
    INDEX_GROWTHS.store(0, Ordering::Relaxed);
    CORRUPTION_EVENTS.store(0, Ordering::Relaxed);
    COMPRESSED_VALUES.store(0, Ordering::Relaxed);
    COMPRESSION_SAVED_BYTES.store(0, Ordering::Relaxed);
}
