//! value — Value Store: регион закодированных Value Record'ов.
//!
//! Файл: [header 64 B][records ...]
//! Header (LE): [magic8="EMOKVVAL"][ver u32][flags u32][data_end u64][live_records u64]
//!              [reserved 28][crc32 u32]
//!
//! data_end — high-water mark (абсолютное смещение). Всё ниже него либо занято
//! записью, на которую ссылается индекс, либо свободно (free-лист в памяти).
//! Выделение — через FreeSpace (best-fit, выравнивание 8 байт).

use byteorder::{ByteOrder, LittleEndian};
use log::info;
use std::path::Path;

use crate::codec::{header_crc_check, seal_header};
use crate::consts::{
    ALLOC_ALIGN, VALUE_HDR_SIZE, VALUE_MAGIC, VALUE_VERSION, VAL_OFF_DATA_END, VAL_OFF_FLAGS,
    VAL_OFF_LIVE, VAL_OFF_VERSION,
};
use crate::error::{CorruptionError, EmoKvError, OpenError};
use crate::free::FreeSpace;
use crate::region::MappedRegion;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValueHeader {
    pub version: u32,
    pub flags: u32,
    pub data_end: u64,
    pub live_records: u64,
}

pub fn value_header_read(buf: &[u8], path: &Path) -> Result<ValueHeader, OpenError> {
    if buf.len() < VALUE_HDR_SIZE {
        return Err(OpenError::CorruptHeader {
            path: path.to_path_buf(),
            reason: format!("value file shorter than header ({} B)", buf.len()),
        });
    }
    let hdr = &buf[..VALUE_HDR_SIZE];
    if &hdr[..8] != VALUE_MAGIC {
        return Err(OpenError::BadMagic {
            path: path.to_path_buf(),
        });
    }
    let version = LittleEndian::read_u32(&hdr[VAL_OFF_VERSION..VAL_OFF_VERSION + 4]);
    if version != VALUE_VERSION {
        return Err(OpenError::UnsupportedVersion {
            path: path.to_path_buf(),
            found: version,
            expected: VALUE_VERSION,
        });
    }
    if let Err((stored, computed)) = header_crc_check(hdr) {
        return Err(OpenError::CorruptHeader {
            path: path.to_path_buf(),
            reason: format!("header crc stored={:#010x} computed={:#010x}", stored, computed),
        });
    }
    let data_end = LittleEndian::read_u64(&hdr[VAL_OFF_DATA_END..VAL_OFF_DATA_END + 8]);
    if data_end < VALUE_HDR_SIZE as u64 {
        return Err(OpenError::CorruptHeader {
            path: path.to_path_buf(),
            reason: format!("data_end {} below header", data_end),
        });
    }
    Ok(ValueHeader {
        version,
        flags: LittleEndian::read_u32(&hdr[VAL_OFF_FLAGS..VAL_OFF_FLAGS + 4]),
        data_end,
        live_records: LittleEndian::read_u64(&hdr[VAL_OFF_LIVE..VAL_OFF_LIVE + 8]),
    })
}

pub fn value_header_write(buf: &mut [u8], h: &ValueHeader) {
    let hdr = &mut buf[..VALUE_HDR_SIZE];
    hdr.fill(0);
    hdr[..8].copy_from_slice(VALUE_MAGIC);
    LittleEndian::write_u32(&mut hdr[VAL_OFF_VERSION..VAL_OFF_VERSION + 4], h.version);
    LittleEndian::write_u32(&mut hdr[VAL_OFF_FLAGS..VAL_OFF_FLAGS + 4], h.flags);
    LittleEndian::write_u64(&mut hdr[VAL_OFF_DATA_END..VAL_OFF_DATA_END + 8], h.data_end);
    LittleEndian::write_u64(&mut hdr[VAL_OFF_LIVE..VAL_OFF_LIVE + 8], h.live_records);
    seal_header(hdr);
}

/// Слот, в который записана запись.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValueSlot {
    pub offset: u64,
    pub len: u32,
    pub capacity: u32,
}

pub struct ValueStore {
    region: MappedRegion,
    header: ValueHeader,
    space: FreeSpace,
}

impl ValueStore {
    pub fn create(path: &Path, initial_space: u64, flags: u32, max_file_len: Option<u64>) -> Result<Self, OpenError> {
        let mut region = MappedRegion::create(path, initial_space.max(VALUE_HDR_SIZE as u64), max_file_len)?;
        let header = ValueHeader {
            version: VALUE_VERSION,
            flags,
            data_end: VALUE_HDR_SIZE as u64,
            live_records: 0,
        };
        {
            let buf = region
                .bytes_mut(0, VALUE_HDR_SIZE as u64)
                .map_err(|e| OpenError::Inconsistent(e.to_string()))?;
            value_header_write(buf, &header);
        }
        region.flush().map_err(|e| OpenError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        info!("values {}: created, file={} B", path.display(), region.len());
        Ok(Self {
            region,
            header,
            space: FreeSpace::new(VALUE_HDR_SIZE as u64, VALUE_HDR_SIZE as u64, ALLOC_ALIGN),
        })
    }

    /// Открыть существующий файл. `live` — (offset, capacity) всех записей,
    /// на которые ссылается индекс; по ним восстанавливается free-лист.
    pub fn open<I>(path: &Path, max_file_len: Option<u64>, live: I) -> Result<Self, OpenError>
    where
        I: IntoIterator<Item = (u64, u64)>,
    {
        let region = MappedRegion::open(path, max_file_len)?;
        let hdr_bytes = region
            .bytes(0, VALUE_HDR_SIZE as u64)
            .map_err(|_| OpenError::CorruptHeader {
                path: path.to_path_buf(),
                reason: format!("value file shorter than header ({} B)", region.len()),
            })?;
        let mut header = value_header_read(hdr_bytes, path)?;
        if header.data_end > region.len() {
            return Err(OpenError::Inconsistent(format!(
                "values {}: data_end {} past file length {}",
                path.display(),
                header.data_end,
                region.len()
            )));
        }

        let live: Vec<(u64, u64)> = live.into_iter().collect();
        let live_records = live.len() as u64;
        let space = FreeSpace::rebuild(VALUE_HDR_SIZE as u64, header.data_end, ALLOC_ALIGN, live)
            .map_err(|e| OpenError::Inconsistent(format!("values {}: {}", path.display(), e)))?;

        header.data_end = space.end();
        header.live_records = live_records;
        let mut store = Self { region, header, space };
        store
            .persist_header()
            .map_err(|e| OpenError::Inconsistent(e.to_string()))?;
        Ok(store)
    }

    fn persist_header(&mut self) -> Result<(), CorruptionError> {
        self.header.data_end = self.space.end();
        let buf = self.region.bytes_mut(0, VALUE_HDR_SIZE as u64)?;
        value_header_write(buf, &self.header);
        Ok(())
    }

    /// Выделить слот под запись и записать её. При невозможности расширить
    /// файл выделение откатывается и возвращается OutOfSpace.
    pub fn write_record(&mut self, bytes: &[u8]) -> Result<ValueSlot, EmoKvError> {
        if bytes.len() > u32::MAX as usize - ALLOC_ALIGN as usize {
            return Err(EmoKvError::InvalidArgument(format!(
                "encoded value of {} bytes is too large",
                bytes.len()
            )));
        }
        let alloc = self.space.allocate(bytes.len() as u32);
        if let Err(e) = self.region.ensure_len(self.space.end()) {
            self.space.free(alloc.offset, alloc.len as u64);
            return Err(e.into());
        }
        if let Err(e) = self.region.write_at(alloc.offset, bytes) {
            self.space.free(alloc.offset, alloc.len as u64);
            return Err(e.into());
        }
        self.header.live_records += 1;
        self.persist_header()?;
        Ok(ValueSlot {
            offset: alloc.offset,
            len: bytes.len() as u32,
            capacity: alloc.len,
        })
    }

    /// Перезаписать запись на месте (ёмкость слота уже проверена вызывающим).
    pub fn overwrite_record(&mut self, offset: u64, capacity: u32, bytes: &[u8]) -> Result<(), EmoKvError> {
        if bytes.len() > capacity as usize {
            return Err(EmoKvError::InvalidArgument(format!(
                "record of {} bytes does not fit slot capacity {}",
                bytes.len(),
                capacity
            )));
        }
        self.region.write_at(offset, bytes)?;
        Ok(())
    }

    /// Прямое чтение из отображения; выход за границы — OutOfBounds (рассинхрон индекса и значений).
    pub fn read_record(&self, offset: u64, len: u32) -> Result<&[u8], CorruptionError> {
        if offset < VALUE_HDR_SIZE as u64 || offset.saturating_add(len as u64) > self.space.end() {
            return Err(CorruptionError::OutOfBounds {
                offset,
                len: len as u64,
                mapped: self.space.end(),
            });
        }
        self.region.bytes(offset, len as u64)
    }

    pub fn release_record(&mut self, offset: u64, capacity: u32) -> Result<(), CorruptionError> {
        self.space.free(offset, capacity as u64);
        self.header.live_records = self.header.live_records.saturating_sub(1);
        self.persist_header()
    }

    pub fn set_flags(&mut self, flags: u32) -> Result<(), CorruptionError> {
        self.header.flags = flags;
        self.persist_header()
    }

    pub fn flush(&self) -> std::io::Result<()> {
        self.region.flush()
    }

    #[inline]
    pub fn space(&self) -> &FreeSpace {
        &self.space
    }

    #[inline]
    pub fn header(&self) -> &ValueHeader {
        &self.header
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
