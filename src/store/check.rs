//! store/check — полная проверка хранилища под read lock.
//!
//! - учёт пространства: сумма ёмкостей занятых слотов == live bytes региона
//!   значений (то же для key heap), диапазоны не пересекаются;
//! - счётчики заголовков совпадают с индексом;
//! - каждая запись читается и декодируется (CRC проверяется всегда, сжатые
//!   записи распаковываются). Error handler не вызывается.

use log::warn;
use std::fmt;

use crate::codec::decode_indexed_record;
use crate::error::{EmoKvError, Result};
use crate::metrics;

use super::core::{EmoKv, StoreInner};
use super::kv::decode_payload;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckReport {
    pub records_checked: u64,
    /// Ключи, запись которых не читается/не декодируется.
    pub corrupt_keys: Vec<String>,
    /// Нарушения учёта пространства и счётчиков.
    pub problems: Vec<String>,
}

impl CheckReport {
    pub fn is_clean(&self) -> bool {
        self.corrupt_keys.is_empty() && self.problems.is_empty()
    }
}

impl fmt::Display for CheckReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "checked={} corrupt={} problems={}",
            self.records_checked,
            self.corrupt_keys.len(),
            self.problems.len()
        )?;
        for p in &self.problems {
            write!(f, "\n  problem: {}", p)?;
        }
        for k in &self.corrupt_keys {
            write!(f, "\n  corrupt key: {:?}", k)?;
        }
        Ok(())
    }
}

/// Проверить, что отсортированные диапазоны (off, len) не пересекаются.
fn overlaps(mut ranges: Vec<(u64, u64)>) -> Option<(u64, u64)> {
    ranges.sort_unstable();
    ranges
        .windows(2)
        .find(|w| w[0].0 + w[0].1 > w[1].0)
        .map(|w| (w[0].0, w[1].0))
}

impl StoreInner {
    fn check(&self, options: &crate::config::EmoKvOptions) -> Result<CheckReport> {
        let mut report = CheckReport::default();
        let slots = self.index.occupied()?;

        if slots.len() as u64 != self.index.live() {
            report.problems.push(format!(
                "index header live={} but {} occupied slots",
                self.index.live(),
                slots.len()
            ));
        }
        if self.values.header().live_records != self.index.live() {
            report.problems.push(format!(
                "value header live_records={} but index live={}",
                self.values.header().live_records,
                self.index.live()
            ));
        }

        let space = self.values.space();
        let value_ranges: Vec<(u64, u64)> = slots
            .iter()
            .map(|s| (s.entry.value_off, s.entry.value_cap as u64))
            .collect();
        let value_sum: u64 = value_ranges.iter().map(|r| r.1).sum();
        if value_sum != space.live_bytes() {
            report.problems.push(format!(
                "value region: slots hold {} B, free-space live={} B",
                value_sum,
                space.live_bytes()
            ));
        }
        if space.live_bytes() + space.free_bytes() != space.region_len() {
            report.problems.push(format!(
                "value region: live {} + free {} != region {}",
                space.live_bytes(),
                space.free_bytes(),
                space.region_len()
            ));
        }
        if let Some((a, b)) = overlaps(value_ranges) {
            report
                .problems
                .push(format!("value slots @{} and @{} overlap", a, b));
        }

        let keys = self.index.key_space();
        let key_ranges: Vec<(u64, u64)> = slots
            .iter()
            .map(|s| (s.entry.key_off, keys.aligned(s.entry.key_len)))
            .collect();
        let key_sum: u64 = key_ranges.iter().map(|r| r.1).sum();
        if key_sum != keys.live_bytes() {
            report.problems.push(format!(
                "key heap: keys hold {} B, free-space live={} B",
                key_sum,
                keys.live_bytes()
            ));
        }
        if let Some((a, b)) = overlaps(key_ranges) {
            report.problems.push(format!("keys @{} and @{} overlap", a, b));
        }

        for s in &slots {
            report.records_checked += 1;
            let key = match self.index.key_bytes(&s.entry) {
                Ok(k) => String::from_utf8_lossy(k).into_owned(),
                Err(e) => {
                    report
                        .problems
                        .push(format!("slot {}: key unreadable: {}", s.slot, e));
                    continue;
                }
            };
            let decoded = self
                .values
                .read_record(s.entry.value_off, s.entry.value_len)
                .and_then(|bytes| {
                    let rec = decode_indexed_record(bytes, s.entry.flags, true)?;
                    decode_payload(&rec, options).map(|_| ())
                });
            if let Err(e) = decoded {
                warn!("check: key {:?} corrupt: {}", key, e);
                metrics::record_corruption();
                report.corrupt_keys.push(key);
            }
        }
        Ok(report)
    }
}

impl EmoKv {
    pub fn check(&self) -> Result<CheckReport> {
        let guard = self.inner.read();
        let inner = guard.as_ref().ok_or(EmoKvError::Closed)?;
        inner.check(&self.options)
    }
}
