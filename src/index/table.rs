//! Таблица слотов (open addressing, linear probing) и key heap в одном mmap-файле.
//!
//! Раскладка файла:
//!   [header 64 B][capacity × SLOT_SIZE слотов][key heap ...]
//!
//! Правила пробинга:
//! - старт со слота hash % capacity, шаг +1 по модулю capacity;
//! - Empty — окончательный промах (и кандидат на вставку);
//! - Tombstone — НЕ останавливает поиск, первый встреченный запоминается для вставки;
//! - Occupied — совпадение по hash, длине и байтам ключа.
//!
//! Удаление всегда ставит Tombstone. Tombstone'ы выбрасываются при rehash.
//!
//! Rehash пишет новую таблицу во временный файл (<index>.tmp), сжимает key heap,
//! делает flush и rename поверх старого файла, затем подменяет отображение.
//! Всё это выполняется под write lock хранилища, поэтому читатели не видят
//! промежуточного состояния.

use log::{debug, info, warn};
use std::path::{Path, PathBuf};

use crate::codec::{decode_index_entry, encode_index_entry, IndexEntry, SlotState};
use crate::consts::{ALLOC_ALIGN, INDEX_HDR_SIZE, MIN_CAPACITY, SLOT_SIZE, TMP_SUFFIX};
use crate::error::{AllocationError, CorruptionError, EmoKvError, OpenError};
use crate::free::FreeSpace;
use crate::hash::{home_slot, HashKind};
use crate::metrics::record_index_growth;
use crate::region::MappedRegion;

use super::header::{index_header_read, index_header_write, IndexHeader};

/// Средний размер ключа, закладываемый при расчёте начальной ёмкости.
const AVG_KEY_BYTES: u64 = 24;

/// Начальная ёмкость таблицы под заданный объём индексного файла.
pub fn capacity_for_space(space: u64) -> u64 {
    let per_slot = SLOT_SIZE as u64 + AVG_KEY_BYTES;
    let raw = space.saturating_sub(INDEX_HDR_SIZE as u64) / per_slot;
    let pow = if raw == 0 { 0 } else { 1u64 << (63 - raw.leading_zeros()) };
    pow.max(MIN_CAPACITY)
}

#[inline]
fn slot_offset(slot: u64) -> u64 {
    INDEX_HDR_SIZE as u64 + slot * SLOT_SIZE as u64
}

#[inline]
fn heap_base_for(capacity: u64) -> u64 {
    slot_offset(capacity)
}

pub fn tmp_path_for(path: &Path) -> PathBuf {
    let mut s = path.as_os_str().to_owned();
    s.push(".");
    s.push(TMP_SUFFIX);
    PathBuf::from(s)
}

/// Где лежит значение ключа в Value Store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValueLoc {
    pub offset: u64,
    /// Полная длина закодированной записи.
    pub len: u32,
    pub cap: u32,
    pub flags: u8,
}

/// Найденный слот и его содержимое.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotRef {
    pub slot: u64,
    pub entry: IndexEntry,
}

#[derive(Clone, Copy)]
enum Probe {
    Found(SlotRef),
    Vacant { slot: u64, tombstone: bool },
}

pub struct IndexTable {
    region: MappedRegion,
    header: IndexHeader,
    keys: FreeSpace,
    max_load: f64,
    max_file_len: Option<u64>,
}

impl IndexTable {
    pub fn create(
        path: &Path,
        initial_space: u64,
        flags: u32,
        hash_kind: HashKind,
        max_load: f64,
        max_file_len: Option<u64>,
    ) -> Result<Self, OpenError> {
        let capacity = capacity_for_space(initial_space);
        let len = initial_space.max(heap_base_for(capacity));
        let mut region = MappedRegion::create(path, len, max_file_len)?;
        let header = IndexHeader::new(capacity, flags, hash_kind);
        {
            let buf = region
                .bytes_mut(0, INDEX_HDR_SIZE as u64)
                .map_err(|e| OpenError::Inconsistent(e.to_string()))?;
            index_header_write(buf, &header);
        }
        region.flush().map_err(|e| OpenError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        info!(
            "index {}: created, capacity={} slots, file={} B",
            path.display(),
            capacity,
            region.len()
        );
        Ok(Self {
            region,
            header,
            keys: FreeSpace::new(0, 0, ALLOC_ALIGN),
            max_load,
            max_file_len,
        })
    }

    /// Открыть существующий индекс: проверка заголовка, сверка счётчиков со слотами,
    /// восстановление free-листа key heap.
    pub fn open(path: &Path, max_load: f64, max_file_len: Option<u64>) -> Result<Self, OpenError> {
        let region = MappedRegion::open(path, max_file_len)?;
        let hdr_bytes = region
            .bytes(0, INDEX_HDR_SIZE as u64)
            .map_err(|_| OpenError::CorruptHeader {
                path: path.to_path_buf(),
                reason: format!("index file shorter than header ({} B)", region.len()),
            })?;
        let mut header = index_header_read(hdr_bytes, path)?;

        let need = heap_base_for(header.capacity)
            .checked_add(header.key_heap_end)
            .ok_or_else(|| OpenError::Inconsistent("index geometry overflows".to_string()))?;
        if need > region.len() {
            return Err(OpenError::Inconsistent(format!(
                "index {} needs {} B but file has {} B",
                path.display(),
                need,
                region.len()
            )));
        }

        let mut table = Self {
            region,
            header,
            keys: FreeSpace::new(0, 0, ALLOC_ALIGN),
            max_load,
            max_file_len,
        };

        let mut live = 0u64;
        let mut tombstones = 0u64;
        let mut key_ranges = Vec::new();
        for slot in 0..header.capacity {
            let e = table
                .read_entry(slot)
                .map_err(|e| OpenError::Inconsistent(format!("slot {}: {}", slot, e)))?;
            match e.state {
                SlotState::Occupied => {
                    live += 1;
                    key_ranges.push((e.key_off, table.keys.aligned(e.key_len)));
                }
                SlotState::Tombstone => tombstones += 1,
                SlotState::Empty => {}
            }
        }
        table.keys = FreeSpace::rebuild(0, header.key_heap_end, ALLOC_ALIGN, key_ranges)
            .map_err(|e| OpenError::Inconsistent(format!("key heap: {}", e)))?;

        if live != header.live || tombstones != header.tombstones {
            warn!(
                "index {}: header counts live={} tombstones={} differ from slots live={} tombstones={}, repairing",
                path.display(),
                header.live,
                header.tombstones,
                live,
                tombstones
            );
            header.live = live;
            header.tombstones = tombstones;
        }
        header.key_heap_end = table.keys.end();
        table.header = header;
        table
            .persist_header()
            .map_err(|e| OpenError::Inconsistent(e.to_string()))?;
        Ok(table)
    }

    // -------- геометрия / доступ к слотам --------

    #[inline]
    fn heap_base(&self) -> u64 {
        heap_base_for(self.header.capacity)
    }

    pub fn read_entry(&self, slot: u64) -> Result<IndexEntry, CorruptionError> {
        let buf = self.region.bytes(slot_offset(slot), SLOT_SIZE as u64)?;
        decode_index_entry(buf)
    }

    fn write_entry(&mut self, slot: u64, e: &IndexEntry) -> Result<(), CorruptionError> {
        let buf = self.region.bytes_mut(slot_offset(slot), SLOT_SIZE as u64)?;
        encode_index_entry(e, buf)
    }

    pub fn key_bytes(&self, e: &IndexEntry) -> Result<&[u8], CorruptionError> {
        self.region
            .bytes(self.heap_base() + e.key_off, e.key_len as u64)
    }

    fn persist_header(&mut self) -> Result<(), CorruptionError> {
        self.header.key_heap_end = self.keys.end();
        let buf = self.region.bytes_mut(0, INDEX_HDR_SIZE as u64)?;
        index_header_write(buf, &self.header);
        Ok(())
    }

    fn probe(&self, key: &[u8], hash: u64) -> Result<Probe, CorruptionError> {
        let cap = self.header.capacity;
        let mut slot = home_slot(hash, cap);
        let mut first_tomb: Option<u64> = None;

        for _ in 0..cap {
            let e = self.read_entry(slot)?;
            match e.state {
                SlotState::Empty => {
                    return Ok(match first_tomb {
                        Some(t) => Probe::Vacant { slot: t, tombstone: true },
                        None => Probe::Vacant { slot, tombstone: false },
                    });
                }
                SlotState::Tombstone => {
                    if first_tomb.is_none() {
                        first_tomb = Some(slot);
                    }
                }
                SlotState::Occupied => {
                    if e.hash == hash && e.key_len as usize == key.len() && self.key_bytes(&e)? == key {
                        return Ok(Probe::Found(SlotRef { slot, entry: e }));
                    }
                }
            }
            slot += 1;
            if slot == cap {
                slot = 0;
            }
        }
        // полный обход без Empty: остаётся только tombstone
        match first_tomb {
            Some(t) => Ok(Probe::Vacant { slot: t, tombstone: true }),
            None => Ok(Probe::Vacant { slot: cap, tombstone: false }),
        }
    }

    // -------- операции --------

    pub fn lookup(&self, key: &[u8], hash: u64) -> Result<Option<SlotRef>, CorruptionError> {
        match self.probe(key, hash)? {
            Probe::Found(s) => Ok(Some(s)),
            Probe::Vacant { .. } => Ok(None),
        }
    }

    /// Вставить или обновить ключ. Возвращает прежнюю запись, если ключ уже был.
    /// При ошибке таблица остаётся без изменений.
    pub fn insert(&mut self, key: &[u8], hash: u64, loc: ValueLoc) -> Result<Option<IndexEntry>, EmoKvError> {
        if key.len() > u32::MAX as usize {
            return Err(EmoKvError::InvalidArgument("key longer than u32::MAX".to_string()));
        }

        let mut probe = self.probe(key, hash)?;
        if let Probe::Found(s) = probe {
            self.update_value(s.slot, loc)?;
            return Ok(Some(s.entry));
        }

        if let Probe::Vacant { tombstone, .. } = probe {
            let used_after = self.header.live + self.header.tombstones + if tombstone { 0 } else { 1 };
            if used_after as f64 > self.header.capacity as f64 * self.max_load {
                let new_cap = self.next_capacity();
                self.rehash(new_cap)?;
                probe = self.probe(key, hash)?;
            }
        }

        let (slot, tombstone) = match probe {
            Probe::Vacant { slot, tombstone } if slot < self.header.capacity => (slot, tombstone),
            _ => {
                return Err(EmoKvError::InvalidArgument(format!(
                    "index table full (capacity {})",
                    self.header.capacity
                )))
            }
        };

        // ключ — в key heap
        let alloc = self.keys.allocate(key.len() as u32);
        let heap_end_abs = self.heap_base() + self.keys.end();
        if let Err(e) = self.region.ensure_len(heap_end_abs) {
            self.keys.free(alloc.offset, alloc.len as u64);
            return Err(e.into());
        }
        let key_abs = self.heap_base() + alloc.offset;
        self.region.write_at(key_abs, key)?;

        let entry = IndexEntry {
            hash,
            state: SlotState::Occupied,
            flags: loc.flags,
            key_len: key.len() as u32,
            key_off: alloc.offset,
            value_off: loc.offset,
            value_len: loc.len,
            value_cap: loc.cap,
        };
        self.write_entry(slot, &entry)?;
        self.header.live += 1;
        if tombstone {
            self.header.tombstones -= 1;
        }
        self.persist_header()?;
        Ok(None)
    }

    /// Обновить ссылку на значение в уже занятом слоте (ключ не меняется).
    pub fn update_value(&mut self, slot: u64, loc: ValueLoc) -> Result<(), CorruptionError> {
        let mut e = self.read_entry(slot)?;
        debug_assert!(e.is_occupied(), "update_value on a non-occupied slot");
        e.flags = loc.flags;
        e.value_off = loc.offset;
        e.value_len = loc.len;
        e.value_cap = loc.cap;
        self.write_entry(slot, &e)
    }

    /// Удалить ключ: слот становится Tombstone, байты ключа возвращаются в key heap.
    pub fn remove(&mut self, key: &[u8], hash: u64) -> Result<Option<IndexEntry>, CorruptionError> {
        let s = match self.probe(key, hash)? {
            Probe::Found(s) => s,
            Probe::Vacant { .. } => return Ok(None),
        };
        self.write_entry(s.slot, &IndexEntry::TOMBSTONE)?;
        let klen = self.keys.aligned(s.entry.key_len);
        self.keys.free(s.entry.key_off, klen);
        self.header.live -= 1;
        self.header.tombstones += 1;
        self.persist_header()?;
        Ok(Some(s.entry))
    }

    fn next_capacity(&self) -> u64 {
        let cap = self.header.capacity;
        // в основном tombstone'ы — перестраиваем на той же ёмкости
        if ((self.header.live + 1) as f64) <= cap as f64 * self.max_load / 2.0 {
            cap
        } else {
            cap.saturating_mul(2)
        }
    }

    /// Перестроить таблицу на `new_cap` слотов: только Occupied, key heap уплотняется.
    pub fn rehash(&mut self, new_cap: u64) -> Result<(), EmoKvError> {
        if new_cap < self.header.live.max(1) {
            return Err(EmoKvError::InvalidArgument(format!(
                "rehash: capacity {} < live entries {}",
                new_cap, self.header.live
            )));
        }
        let path = self.region.path().to_path_buf();
        let tmp = tmp_path_for(&path);
        match self.rehash_into(&tmp, new_cap) {
            Ok(()) => Ok(()),
            Err(e) => {
                let _ = std::fs::remove_file(&tmp);
                Err(e)
            }
        }
    }

    fn rehash_into(&mut self, tmp: &Path, new_cap: u64) -> Result<(), EmoKvError> {
        let old_cap = self.header.capacity;

        let mut live_entries = Vec::with_capacity(self.header.live as usize);
        for slot in 0..old_cap {
            let e = self.read_entry(slot)?;
            if e.is_occupied() {
                live_entries.push(e);
            }
        }
        let key_bytes: u64 = live_entries.iter().map(|e| self.keys.aligned(e.key_len)).sum();
        let new_len = heap_base_for(new_cap) + key_bytes;
        if let Some(max) = self.max_file_len {
            if new_len > max {
                return Err(AllocationError::OutOfSpace {
                    path: tmp.to_path_buf(),
                    requested: new_len,
                    reason: format!("file size limit {} bytes", max),
                }
                .into());
            }
        }

        let mut next = MappedRegion::create(tmp, new_len, self.max_file_len).map_err(|e| {
            AllocationError::OutOfSpace {
                path: tmp.to_path_buf(),
                requested: new_len,
                reason: e.to_string(),
            }
        })?;

        let new_base = heap_base_for(new_cap);
        let mut new_keys = FreeSpace::new(0, 0, ALLOC_ALIGN);
        for e in &live_entries {
            let key = self.key_bytes(e)?;
            let alloc = new_keys.allocate(e.key_len);
            next.write_at(new_base + alloc.offset, key)?;

            let mut slot = home_slot(e.hash, new_cap);
            loop {
                let probe = decode_index_entry(next.bytes(slot_offset(slot), SLOT_SIZE as u64)?)?;
                if probe.state == SlotState::Empty {
                    break;
                }
                slot += 1;
                if slot == new_cap {
                    slot = 0;
                }
            }
            let moved = IndexEntry {
                key_off: alloc.offset,
                ..*e
            };
            encode_index_entry(&moved, next.bytes_mut(slot_offset(slot), SLOT_SIZE as u64)?)?;
        }

        let header = IndexHeader {
            capacity: new_cap,
            live: live_entries.len() as u64,
            tombstones: 0,
            key_heap_end: new_keys.end(),
            ..self.header
        };
        index_header_write(next.bytes_mut(0, INDEX_HDR_SIZE as u64)?, &header);
        next.flush()?;

        let path = self.region.path().to_path_buf();
        next.rename_to(&path)?;

        debug!(
            "index {}: rehash {} -> {} slots, {} live, dropped {} tombstones",
            path.display(),
            old_cap,
            new_cap,
            header.live,
            self.header.tombstones
        );
        record_index_growth();

        self.region = next;
        self.header = header;
        self.keys = new_keys;
        Ok(())
    }

    /// Все занятые слоты (slot, entry) в порядке слотов.
    pub fn occupied(&self) -> Result<Vec<SlotRef>, CorruptionError> {
        let mut out = Vec::with_capacity(self.header.live as usize);
        for slot in 0..self.header.capacity {
            let entry = self.read_entry(slot)?;
            if entry.is_occupied() {
                out.push(SlotRef { slot, entry });
            }
        }
        Ok(out)
    }

    // -------- флаги / обслуживание --------

    pub fn set_flags(&mut self, flags: u32) -> Result<(), CorruptionError> {
        self.header.flags = flags;
        self.persist_header()
    }

    pub fn flush(&self) -> std::io::Result<()> {
        self.region.flush()
    }

    #[inline]
    pub fn header(&self) -> &IndexHeader {
        &self.header
    }

    #[inline]
    pub fn capacity(&self) -> u64 {
        self.header.capacity
    }

    #[inline]
    pub fn live(&self) -> u64 {
        self.header.live
    }

    #[inline]
    pub fn tombstones(&self) -> u64 {
        self.header.tombstones
    }

    #[inline]
    pub fn load_factor(&self) -> f64 {
        (self.header.live + self.header.tombstones) as f64 / self.header.capacity as f64
    }

    #[inline]
    pub fn key_space(&self) -> &FreeSpace {
        &self.keys
    }

    #[inline]
    pub fn file_len(&self) -> u64 {
        self.region.len()
    }

    #[inline]
    pub fn path(&self) -> &Path {
        self.region.path()
    }
}
