//! region — один файл + MmapMut (memmap2) с проверкой границ.
//!
//! Все "указатели" в формате — целые смещения в файле; доступ только через
//! bytes()/bytes_mut()/write_at(), которые проверяют границы текущего отображения.
//! Рост: set_len + повторный map (старое отображение освобождается).
//!
//! Регион не синхронизирован сам по себе — владелец держит write lock хранилища.

use log::debug;
use memmap2::{MmapMut, MmapOptions};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use crate::consts::FILE_GROW_ALIGN;
use crate::error::{AllocationError, CorruptionError, OpenError};

pub struct MappedRegion {
    path: PathBuf,
    file: File,
    map: MmapMut,
    max_len: Option<u64>,
}

#[inline]
fn round_up(v: u64, align: u64) -> u64 {
    (v + align - 1) / align * align
}

fn open_err(path: &Path, source: std::io::Error) -> OpenError {
    OpenError::Io {
        path: path.to_path_buf(),
        source,
    }
}

impl MappedRegion {
    /// Создать (или перезаписать) файл длиной `len` и отобразить его.
    /// Выравнивание вверх не выходит за `max_len`.
    pub fn create(path: &Path, len: u64, max_len: Option<u64>) -> Result<Self, OpenError> {
        let mut aligned = round_up(len.max(FILE_GROW_ALIGN), FILE_GROW_ALIGN);
        if let Some(max) = max_len {
            if len > max {
                return Err(OpenError::InvalidOptions(format!(
                    "{}: initial size {} exceeds file size limit {}",
                    path.display(),
                    len,
                    max
                )));
            }
            aligned = aligned.min(max);
        }
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(true)
            .open(path)
            .map_err(|e| open_err(path, e))?;
        file.set_len(aligned).map_err(|e| open_err(path, e))?;
        let map = unsafe { MmapOptions::new().map_mut(&file) }.map_err(|e| open_err(path, e))?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
            map,
            max_len,
        })
    }

    /// Открыть существующий файл целиком.
    pub fn open(path: &Path, max_len: Option<u64>) -> Result<Self, OpenError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| open_err(path, e))?;
        let len = file.metadata().map_err(|e| open_err(path, e))?.len();
        if len == 0 {
            return Err(OpenError::CorruptHeader {
                path: path.to_path_buf(),
                reason: "empty file".to_string(),
            });
        }
        let map = unsafe { MmapOptions::new().map_mut(&file) }.map_err(|e| open_err(path, e))?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
            map,
            max_len,
        })
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Текущая длина отображения (= длине файла).
    #[inline]
    pub fn len(&self) -> u64 {
        self.map.len() as u64
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    fn check(&self, offset: u64, len: u64) -> Result<std::ops::Range<usize>, CorruptionError> {
        let mapped = self.len();
        match offset.checked_add(len) {
            Some(end) if end <= mapped => Ok(offset as usize..end as usize),
            _ => Err(CorruptionError::OutOfBounds {
                offset,
                len,
                mapped,
            }),
        }
    }

    pub fn bytes(&self, offset: u64, len: u64) -> Result<&[u8], CorruptionError> {
        let r = self.check(offset, len)?;
        Ok(&self.map[r])
    }

    pub fn bytes_mut(&mut self, offset: u64, len: u64) -> Result<&mut [u8], CorruptionError> {
        let r = self.check(offset, len)?;
        Ok(&mut self.map[r])
    }

    pub fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<(), CorruptionError> {
        self.bytes_mut(offset, data.len() as u64)?.copy_from_slice(data);
        Ok(())
    }

    /// Гарантировать длину файла >= required. Растём удвоением (с выравниванием),
    /// но не дальше max_len. Отказ ОС (ENOSPC и т.п.) — OutOfSpace.
    pub fn ensure_len(&mut self, required: u64) -> Result<(), AllocationError> {
        let cur = self.len();
        if required <= cur {
            return Ok(());
        }
        let mut new_len = round_up(required.max(cur.saturating_mul(2)), FILE_GROW_ALIGN);
        if let Some(max) = self.max_len {
            if required > max {
                return Err(AllocationError::OutOfSpace {
                    path: self.path.clone(),
                    requested: required,
                    reason: format!("file size limit {} bytes", max),
                });
            }
            new_len = new_len.min(max);
        }

        self.file
            .set_len(new_len)
            .map_err(|e| AllocationError::OutOfSpace {
                path: self.path.clone(),
                requested: new_len,
                reason: e.to_string(),
            })?;
        let map = match unsafe { MmapOptions::new().map_mut(&self.file) } {
            Ok(m) => m,
            Err(e) => {
                // вернуть прежнюю длину, текущее отображение остаётся валидным
                let _ = self.file.set_len(cur);
                return Err(AllocationError::OutOfSpace {
                    path: self.path.clone(),
                    requested: new_len,
                    reason: format!("remap failed: {}", e),
                });
            }
        };
        self.map = map;
        debug!("region {}: grown {} -> {} bytes", self.path.display(), cur, new_len);
        Ok(())
    }

    pub fn flush(&self) -> std::io::Result<()> {
        self.map.flush()
    }

    /// Переименовать файл под отображением (используется при rehash индекса).
    pub fn rename_to(&mut self, target: &Path) -> std::io::Result<()> {
        std::fs::rename(&self.path, target)?;
        self.path = target.to_path_buf();
        Ok(())
    }
}
