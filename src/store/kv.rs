//! store/kv — одиночные операции put/get/delete.
//!
//! put:
//! - сжатие (если включено) оставляется, только когда результат меньше исходного;
//! - запись кодируется целиком (Value Record), затем:
//!   * ключ есть и can_reuse(cap, len) — перезапись на месте, индекс обновляется;
//!   * иначе — новый слот, индекс, освобождение прежнего слота.
//!   Ошибка индекса после write_record возвращает новый слот в free-лист.
//!
//! get: CorruptionError (индекс или запись) уходит в error handler после
//! снятия lock; handler=true — ключ считается отсутствующим.

use log::warn;
use std::borrow::Cow;

use crate::codec::{
    builtin_codec, decode_indexed_record, encode_value_record, RecordFlags, ValueRecord,
};
use crate::config::EmoKvOptions;
use crate::error::{CorruptionError, EmoKvError, Result};
use crate::free::FreeSpace;
use crate::hash::key_hash;
use crate::index::ValueLoc;
use crate::metrics;

use super::core::{EmoKv, StoreInner};

/// Payload для записи: (байты, codec id если сжато).
fn prepare_payload<'a>(value: &'a [u8], options: &EmoKvOptions) -> (Cow<'a, [u8]>, Option<u8>) {
    if !options.compression_enabled || value.is_empty() {
        return (Cow::Borrowed(value), None);
    }
    match options.codec.compress(value) {
        Ok(packed) if packed.len() < value.len() => {
            metrics::record_compression(value.len(), packed.len());
            (Cow::Owned(packed), Some(options.codec.id()))
        }
        Ok(_) => (Cow::Borrowed(value), None),
        Err(e) => {
            warn!("emokv: {} compression failed, storing raw: {}", options.codec.name(), e);
            (Cow::Borrowed(value), None)
        }
    }
}

/// Раскодировать payload записи (распаковать при необходимости).
pub(crate) fn decode_payload(rec: &ValueRecord<'_>, options: &EmoKvOptions) -> std::result::Result<Vec<u8>, CorruptionError> {
    let id = match rec.flags.codec {
        None => return Ok(rec.payload.to_vec()),
        Some(id) => id,
    };
    let codec = if id == options.codec.id() {
        options.codec.clone()
    } else {
        builtin_codec(id).ok_or_else(|| CorruptionError::Decompress(format!("unknown codec id {}", id)))?
    };
    codec
        .decompress(rec.payload)
        .map_err(|e| CorruptionError::Decompress(format!("{}: {}", codec.name(), e)))
}

impl StoreInner {
    pub(crate) fn put_bytes(&mut self, key: &[u8], value: &[u8], options: &EmoKvOptions) -> Result<()> {
        let hash = key_hash(self.hash_kind, key);
        let (payload, codec) = prepare_payload(value, options);
        let flags = RecordFlags {
            crc: options.crc_enabled,
            codec,
        };
        let record = encode_value_record(&payload, flags);
        if record.len() > u32::MAX as usize {
            return Err(EmoKvError::InvalidArgument(format!(
                "value of {} bytes is too large",
                value.len()
            )));
        }
        let len = record.len() as u32;

        let existing = self.index.lookup(key, hash)?;
        if let Some(s) = existing {
            if FreeSpace::can_reuse(s.entry.value_cap, len) {
                self.values
                    .overwrite_record(s.entry.value_off, s.entry.value_cap, &record)?;
                self.index.update_value(
                    s.slot,
                    ValueLoc {
                        offset: s.entry.value_off,
                        len,
                        cap: s.entry.value_cap,
                        flags: flags.to_byte(),
                    },
                )?;
                metrics::record_in_place_update();
                metrics::record_put();
                return Ok(());
            }
        }

        let slot = self.values.write_record(&record)?;
        let loc = ValueLoc {
            offset: slot.offset,
            len: slot.len,
            cap: slot.capacity,
            flags: flags.to_byte(),
        };
        let indexed = match existing {
            Some(s) => self
                .index
                .update_value(s.slot, loc)
                .map(|()| Some(s.entry))
                .map_err(EmoKvError::from),
            None => self.index.insert(key, hash, loc),
        };
        let previous = match indexed {
            Ok(p) => p,
            Err(e) => {
                if let Err(re) = self.values.release_record(slot.offset, slot.capacity) {
                    warn!("emokv: rollback of value slot @{} failed: {}", slot.offset, re);
                }
                return Err(e);
            }
        };
        if let Some(old) = previous {
            self.values.release_record(old.value_off, old.value_cap)?;
            metrics::record_relocation();
        }
        metrics::record_put();
        Ok(())
    }

    pub(crate) fn get_bytes(&self, key: &[u8], options: &EmoKvOptions) -> Result<Option<Vec<u8>>> {
        let hash = key_hash(self.hash_kind, key);
        let s = match self.index.lookup(key, hash)? {
            Some(s) => s,
            None => return Ok(None),
        };
        let bytes = self.values.read_record(s.entry.value_off, s.entry.value_len)?;
        let rec = decode_indexed_record(bytes, s.entry.flags, options.crc_enabled)?;
        Ok(Some(decode_payload(&rec, options)?))
    }

    pub(crate) fn delete_bytes(&mut self, key: &[u8]) -> Result<bool> {
        let hash = key_hash(self.hash_kind, key);
        match self.index.remove(key, hash)? {
            Some(old) => {
                self.values.release_record(old.value_off, old.value_cap)?;
                metrics::record_delete();
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

impl EmoKv {
    pub fn put<V: AsRef<[u8]>>(&self, key: &str, value: V) -> Result<()> {
        let mut guard = self.inner.write();
        let inner = guard.as_mut().ok_or(EmoKvError::Closed)?;
        inner.put_bytes(key.as_bytes(), value.as_ref(), &self.options)?;
        if self.options.sync_on_write {
            inner.flush()?;
        }
        Ok(())
    }

    /// Значение ключа; None — промах или повреждение, признанное handler'ом мягким.
    pub fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let res = {
            let guard = self.inner.read();
            let inner = guard.as_ref().ok_or(EmoKvError::Closed)?;
            inner.get_bytes(key.as_bytes(), &self.options)
        };
        match res {
            Err(e) if e.is_corruption() => {
                metrics::record_corruption();
                self.route_error(key, e)
            }
            other => other,
        }
    }

    pub fn get_string(&self, key: &str) -> Result<Option<String>> {
        match self.get(key)? {
            Some(bytes) => String::from_utf8(bytes)
                .map(Some)
                .map_err(|_| EmoKvError::NotUtf8 { key: key.to_string() }),
            None => Ok(None),
        }
    }

    /// Удалить ключ. true — ключ был.
    pub fn delete(&self, key: &str) -> Result<bool> {
        let mut guard = self.inner.write();
        let inner = guard.as_mut().ok_or(EmoKvError::Closed)?;
        let existed = inner.delete_bytes(key.as_bytes())?;
        if existed && self.options.sync_on_write {
            inner.flush()?;
        }
        Ok(existed)
    }

    pub fn contains_key(&self, key: &str) -> Result<bool> {
        let guard = self.inner.read();
        let inner = guard.as_ref().ok_or(EmoKvError::Closed)?;
        let hash = key_hash(inner.hash_kind, key.as_bytes());
        Ok(inner.index.lookup(key.as_bytes(), hash)?.is_some())
    }

    pub fn len(&self) -> Result<u64> {
        let guard = self.inner.read();
        let inner = guard.as_ref().ok_or(EmoKvError::Closed)?;
        Ok(inner.index.live())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}
