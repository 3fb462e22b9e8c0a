//! store/core — EmoKv и его внутреннее состояние.
//!
//! Конкурентность: parking_lot::RwLock<Option<StoreInner>>.
//! - get/contains_key/len/stats/check — read lock;
//! - put/delete/flush/close — write lock (рост индекса и переиспользование слотов
//!   значений никогда не наблюдаются читателем посреди перехода).
//! None внутри lock — хранилище закрыто (EmoKvError::Closed).

use log::warn;
use parking_lot::RwLock;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::config::EmoKvOptions;
use crate::consts::{INDEX_FILE_EXT, VALUE_FILE_EXT};
use crate::error::{EmoKvError, Result};
use crate::hash::HashKind;
use crate::index::IndexTable;
use crate::lock::StoreLock;
use crate::value::ValueStore;

pub(crate) struct StoreInner {
    pub(crate) index: IndexTable,
    pub(crate) values: ValueStore,
    pub(crate) hash_kind: HashKind,
    /// Заголовочные флаги без DIRTY (crc/compression текущих опций).
    pub(crate) base_flags: u32,
    // держим до закрытия: снимается в Drop
    pub(crate) _lock: StoreLock,
}

pub struct EmoKv {
    pub(crate) root: PathBuf,
    pub(crate) name: String,
    pub(crate) options: EmoKvOptions,
    pub(crate) inner: RwLock<Option<StoreInner>>,
}

/// Снимок состояния обоих регионов.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreStats {
    pub capacity: u64,
    pub live: u64,
    pub tombstones: u64,
    pub load_factor: f64,
    pub index_file_len: u64,
    pub key_heap_len: u64,
    pub key_heap_free: u64,
    pub value_file_len: u64,
    /// value region length = live + free.
    pub value_region_len: u64,
    pub value_live_bytes: u64,
    pub value_free_bytes: u64,
    pub value_free_ranges: usize,
}

impl fmt::Display for StoreStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "keys={} tombstones={} capacity={} load={:.3} idx_file={}B values: region={}B live={}B free={}B ({} ranges) file={}B",
            self.live,
            self.tombstones,
            self.capacity,
            self.load_factor,
            self.index_file_len,
            self.value_region_len,
            self.value_live_bytes,
            self.value_free_bytes,
            self.value_free_ranges,
            self.value_file_len
        )
    }
}

pub(crate) fn index_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{}.{}", name, INDEX_FILE_EXT))
}

pub(crate) fn value_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{}.{}", name, VALUE_FILE_EXT))
}

impl StoreInner {
    pub(crate) fn flush(&self) -> Result<()> {
        self.index.flush()?;
        self.values.flush()?;
        Ok(())
    }

    pub(crate) fn stats(&self) -> StoreStats {
        let keys = self.index.key_space();
        let space = self.values.space();
        StoreStats {
            capacity: self.index.capacity(),
            live: self.index.live(),
            tombstones: self.index.tombstones(),
            load_factor: self.index.load_factor(),
            index_file_len: self.index.file_len(),
            key_heap_len: keys.region_len(),
            key_heap_free: keys.free_bytes(),
            value_file_len: self.values.file_len(),
            value_region_len: space.region_len(),
            value_live_bytes: space.live_bytes(),
            value_free_bytes: space.free_bytes(),
            value_free_ranges: space.free_ranges(),
        }
    }
}

impl EmoKv {
    pub fn builder() -> crate::config::EmoKvBuilder {
        crate::config::EmoKvBuilder::new()
    }

    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn options(&self) -> &EmoKvOptions {
        &self.options
    }

    pub fn is_closed(&self) -> bool {
        self.inner.read().is_none()
    }

    pub fn index_path(&self) -> PathBuf {
        index_path(&self.root, &self.name)
    }

    pub fn value_path(&self) -> PathBuf {
        value_path(&self.root, &self.name)
    }

    pub fn stats(&self) -> Result<StoreStats> {
        let guard = self.inner.read();
        let inner = guard.as_ref().ok_or(EmoKvError::Closed)?;
        Ok(inner.stats())
    }

    /// Ошибка, направляемая через error handler: true — мягкий промах.
    pub(crate) fn route_error<T>(&self, key: &str, err: EmoKvError) -> Result<Option<T>> {
        if (self.options.error_handler)(key, &err) {
            Ok(None)
        } else {
            Err(err)
        }
    }
}

impl fmt::Debug for EmoKv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmoKv")
            .field("root", &self.root)
            .field("name", &self.name)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Drop for EmoKv {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("emokv {}: close on drop failed: {}", self.name, e);
        }
    }
}
