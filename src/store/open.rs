//! store/open — открытие/создание хранилища и закрытие.
//!
//! Файлы: <dir>/<name>.emoidx, <dir>/<name>.emoval, <dir>/<name>.lock.
//! Порядок открытия:
//! 1) validate опций, create_dir_all, эксклюзивный lock (занят — OpenError::Locked);
//! 2) удалить забытый <name>.emoidx.tmp (прерванный rehash);
//! 3) нет обоих файлов — создать; есть оба — открыть; есть один — OpenError::Inconsistent;
//! 4) free-лист значений восстанавливается по занятым слотам индекса;
//! 5) выставить DIRTY (уже стоял — предупреждение о некорректном завершении).

use log::{info, warn};
use parking_lot::RwLock;
use std::path::Path;

use crate::config::EmoKvOptions;
use crate::consts::{HDR_FLAG_COMPRESSION, HDR_FLAG_CRC, HDR_FLAG_DIRTY};
use crate::error::{EmoKvError, OpenError, Result};
use crate::hash::HASH_KIND_DEFAULT;
use crate::index::{tmp_path_for, IndexTable};
use crate::lock::try_lock_store;
use crate::value::ValueStore;

use super::core::{index_path, value_path, EmoKv, StoreInner};

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(|c: char| c == '/' || c == '\\' || c == '\0')
    {
        return Err(OpenError::InvalidOptions(format!("invalid store name {:?}", name)).into());
    }
    Ok(())
}

fn header_flags(options: &EmoKvOptions) -> u32 {
    let mut flags = 0;
    if options.crc_enabled {
        flags |= HDR_FLAG_CRC;
    }
    if options.compression_enabled {
        flags |= HDR_FLAG_COMPRESSION;
    }
    flags
}

impl EmoKv {
    pub fn open(dir: &Path, name: &str, options: EmoKvOptions) -> Result<Self> {
        options.validate()?;
        validate_name(name)?;
        std::fs::create_dir_all(dir).map_err(|e| OpenError::Io {
            path: dir.to_path_buf(),
            source: e,
        })?;

        let lock = try_lock_store(dir, name)?;

        let idx_path = index_path(dir, name);
        let val_path = value_path(dir, name);

        let tmp = tmp_path_for(&idx_path);
        if tmp.exists() {
            warn!("emokv {}: removing stale {}", name, tmp.display());
            std::fs::remove_file(&tmp).map_err(|e| OpenError::Io {
                path: tmp.clone(),
                source: e,
            })?;
        }

        let base_flags = header_flags(&options);
        let max_file = options.max_file_size;

        let (mut index, mut values) = match (idx_path.exists(), val_path.exists()) {
            (false, false) => {
                let index = IndexTable::create(
                    &idx_path,
                    options.index_initial_space,
                    base_flags,
                    HASH_KIND_DEFAULT,
                    options.max_load_factor,
                    max_file,
                )?;
                let values = match ValueStore::create(
                    &val_path,
                    options.value_initial_space,
                    base_flags,
                    max_file,
                ) {
                    Ok(v) => v,
                    Err(e) => {
                        drop(index);
                        let _ = std::fs::remove_file(&idx_path);
                        return Err(e.into());
                    }
                };
                info!("emokv {}: created in {}", name, dir.display());
                (index, values)
            }
            (true, true) => {
                let index = IndexTable::open(&idx_path, options.max_load_factor, max_file)?;
                let live = index
                    .occupied()
                    .map_err(|e| OpenError::Inconsistent(format!("index scan: {}", e)))?;
                let values = ValueStore::open(
                    &val_path,
                    max_file,
                    live.iter()
                        .map(|s| (s.entry.value_off, s.entry.value_cap as u64)),
                )?;
                if index.header().flags & HDR_FLAG_DIRTY != 0 {
                    warn!(
                        "emokv {}: store was not closed cleanly; free space rebuilt from index",
                        name
                    );
                }
                info!(
                    "emokv {}: opened, keys={} capacity={}",
                    name,
                    index.live(),
                    index.capacity()
                );
                (index, values)
            }
            (idx_exists, _) => {
                let (present, missing) = if idx_exists {
                    (&idx_path, &val_path)
                } else {
                    (&val_path, &idx_path)
                };
                return Err(OpenError::Inconsistent(format!(
                    "{} exists but {} is missing",
                    present.display(),
                    missing.display()
                ))
                .into());
            }
        };

        index.set_flags(base_flags | HDR_FLAG_DIRTY)?;
        values.set_flags(base_flags | HDR_FLAG_DIRTY)?;
        index.flush()?;
        values.flush()?;

        Ok(Self {
            root: dir.to_path_buf(),
            name: name.to_string(),
            options,
            inner: RwLock::new(Some(StoreInner {
                hash_kind: index.header().hash_kind,
                index,
                values,
                base_flags,
                _lock: lock,
            })),
        })
    }

    /// msync обоих отображений.
    pub fn flush(&self) -> Result<()> {
        let guard = self.inner.write();
        let inner = guard.as_ref().ok_or(EmoKvError::Closed)?;
        inner.flush()
    }

    /// Сбросить DIRTY, flush, освободить отображения и lock.
    /// Повторный close — no-op; прочие операции после close — EmoKvError::Closed.
    pub fn close(&self) -> Result<()> {
        let mut guard = self.inner.write();
        let mut inner = match guard.take() {
            Some(i) => i,
            None => return Ok(()),
        };
        let flags = inner.base_flags;
        inner.index.set_flags(flags)?;
        inner.values.set_flags(flags)?;
        inner.flush()?;
        info!("emokv {}: closed, keys={}", self.name, inner.index.live());
        Ok(())
    }
}
