//! free — менеджер свободного пространства внутри растущего региона.
//!
//! Используется дважды: для key heap индексного файла и для региона значений.
//!
//! Модель:
//! - Регион [base, end): всё, что ниже high-water mark `end`, либо занято, либо
//!   лежит в free-листе. Хвост за `end` (до длины файла) ещё не выделялся.
//! - Free-лист хранится дважды: по смещению (BTreeMap, для слияния соседей за O(log n))
//!   и по (len, off) (BTreeSet, для best-fit за O(log n)).
//! - Освобождение диапазона, касающегося `end`, опускает high-water mark.
//!
//! Инвариант: live_bytes + free_bytes == end - base.
//!
//! Free-лист не персистится: при открытии он восстанавливается по живым записям
//! индекса (FreeSpace::rebuild). Вызовы выполняются под внешней синхронизацией
//! (write lock хранилища).

use log::error;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Allocation {
    pub offset: u64,
    /// Выделенная длина (выровнена по align), т.е. ёмкость слота.
    pub len: u32,
    /// true — диапазон взят из хвоста (high-water mark вырос).
    pub extended: bool,
}

#[derive(Debug, Clone)]
pub struct FreeSpace {
    base: u64,
    end: u64,
    align: u64,
    by_offset: BTreeMap<u64, u64>,
    by_size: BTreeSet<(u64, u64)>,
    free_bytes: u64,
}

impl FreeSpace {
    pub fn new(base: u64, end: u64, align: u64) -> Self {
        debug_assert!(align.is_power_of_two(), "align must be a power of two");
        Self {
            base,
            end: end.max(base),
            align,
            by_offset: BTreeMap::new(),
            by_size: BTreeSet::new(),
            free_bytes: 0,
        }
    }

    /// Восстановить free-лист по живым диапазонам (offset, len).
    /// Промежутки между живыми диапазонами ниже `end` становятся свободными.
    /// Ошибка — если диапазоны пересекаются или выходят за [base, end).
    pub fn rebuild<I>(base: u64, end: u64, align: u64, live: I) -> Result<Self, String>
    where
        I: IntoIterator<Item = (u64, u64)>,
    {
        let mut ranges: Vec<(u64, u64)> = live.into_iter().collect();
        ranges.sort_unstable();

        let mut fs = Self::new(base, end, align);
        let mut cursor = base;
        for (off, len) in ranges {
            if off < cursor {
                return Err(format!(
                    "live range {}+{} overlaps previous range ending at {}",
                    off, len, cursor
                ));
            }
            let range_end = off
                .checked_add(len)
                .ok_or_else(|| format!("live range {}+{} overflows", off, len))?;
            if range_end > fs.end {
                return Err(format!(
                    "live range {}+{} is past high-water mark {}",
                    off, len, fs.end
                ));
            }
            if off > cursor {
                fs.insert_free(cursor, off - cursor);
            }
            cursor = range_end;
        }
        if cursor < fs.end {
            // хвостовой промежуток — просто опускаем high-water mark
            fs.end = cursor;
        }
        Ok(fs)
    }

    #[inline]
    pub fn aligned(&self, size: u32) -> u64 {
        let s = (size as u64).max(1);
        (s + self.align - 1) & !(self.align - 1)
    }

    /// Политика обновления на месте: текущей ёмкости слота хватает под новую запись.
    #[inline]
    pub fn can_reuse(existing_capacity: u32, needed_size: u32) -> bool {
        needed_size <= existing_capacity
    }

    /// Best-fit: наименьший свободный диапазон >= size; иначе — из хвоста.
    /// Расширение backing-файла под новый `end` — забота вызывающего кода
    /// (при неудаче он возвращает диапазон через free()).
    pub fn allocate(&mut self, size: u32) -> Allocation {
        let need = self.aligned(size);
        let len = need as u32;

        let fit = self.by_size.range((need, 0)..).next().copied();
        if let Some((flen, foff)) = fit {
            self.by_size.remove(&(flen, foff));
            self.by_offset.remove(&foff);
            self.free_bytes -= flen;
            if flen > need {
                self.insert_free(foff + need, flen - need);
            }
            return Allocation {
                offset: foff,
                len,
                extended: false,
            };
        }

        let offset = self.end;
        self.end += need;
        Allocation {
            offset,
            len,
            extended: true,
        }
    }

    /// Вернуть диапазон в free-лист, слив его с соседями.
    pub fn free(&mut self, offset: u64, len: u64) {
        if len == 0 {
            return;
        }
        if offset < self.base || offset + len > self.end {
            error!(
                "free: range {}+{} outside region [{}, {}), ignored",
                offset, len, self.base, self.end
            );
            debug_assert!(false, "free outside region");
            return;
        }

        let mut start = offset;
        let mut size = len;

        if let Some((&p_off, &p_len)) = self.by_offset.range(..offset).next_back() {
            if p_off + p_len > offset {
                error!("free: range {}+{} overlaps free range {}+{}, ignored", offset, len, p_off, p_len);
                debug_assert!(false, "double free");
                return;
            }
            if p_off + p_len == offset {
                self.remove_free(p_off, p_len);
                start = p_off;
                size += p_len;
            }
        }
        if let Some((&n_off, &n_len)) = self.by_offset.range(offset..).next() {
            if n_off < offset + len {
                error!("free: range {}+{} overlaps free range {}+{}, ignored", offset, len, n_off, n_len);
                debug_assert!(false, "double free");
                // вернуть поглощённого соседа слева, если успели снять
                if start != offset {
                    self.insert_free(start, size - len);
                }
                return;
            }
            if n_off == offset + len {
                self.remove_free(n_off, n_len);
                size += n_len;
            }
        }

        if start + size == self.end {
            self.end = start;
        } else {
            self.insert_free(start, size);
        }
    }

    fn insert_free(&mut self, off: u64, len: u64) {
        self.by_offset.insert(off, len);
        self.by_size.insert((len, off));
        self.free_bytes += len;
    }

    fn remove_free(&mut self, off: u64, len: u64) {
        self.by_offset.remove(&off);
        self.by_size.remove(&(len, off));
        self.free_bytes -= len;
    }

    // -------- accounting --------

    #[inline]
    pub fn base(&self) -> u64 {
        self.base
    }

    /// High-water mark (абсолютное смещение).
    #[inline]
    pub fn end(&self) -> u64 {
        self.end
    }

    #[inline]
    pub fn region_len(&self) -> u64 {
        self.end - self.base
    }

    #[inline]
    pub fn free_bytes(&self) -> u64 {
        self.free_bytes
    }

    #[inline]
    pub fn live_bytes(&self) -> u64 {
        self.region_len() - self.free_bytes
    }

    #[inline]
    pub fn free_ranges(&self) -> usize {
        self.by_offset.len()
    }

    /// Свободные диапазоны по возрастанию смещения.
    pub fn ranges(&self) -> Vec<(u64, u64)> {
        self.by_offset.iter().map(|(&o, &l)| (o, l)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tail_allocation_grows_high_water() {
        let mut fs = FreeSpace::new(64, 64, 8);
        let a = fs.allocate(5);
        assert_eq!(a, Allocation { offset: 64, len: 8, extended: true });
        let b = fs.allocate(16);
        assert_eq!(b.offset, 72);
        assert_eq!(fs.end(), 88);
        assert_eq!(fs.live_bytes(), 24);
        assert_eq!(fs.free_bytes(), 0);
    }

    #[test]
    fn best_fit_picks_smallest_sufficient_range() {
        let mut fs = FreeSpace::new(0, 0, 8);
        let a = fs.allocate(64);
        let _g1 = fs.allocate(8);
        let b = fs.allocate(24);
        let _g2 = fs.allocate(8);
        fs.free(a.offset, a.len as u64);
        fs.free(b.offset, b.len as u64);
        assert_eq!(fs.free_ranges(), 2);

        let c = fs.allocate(20);
        assert_eq!(c.offset, b.offset, "24-byte hole is the best fit");
        assert!(!c.extended);

        // 64-байтовая дыра делится: 16 уходит, 48 остаётся свободным
        let d = fs.allocate(16);
        assert_eq!(d.offset, a.offset);
        assert_eq!(fs.ranges(), vec![(a.offset + 16, 48)]);
        assert_eq!(fs.live_bytes() + fs.free_bytes(), fs.region_len());
    }

    #[test]
    fn neighbours_coalesce() {
        let mut fs = FreeSpace::new(0, 0, 8);
        let a = fs.allocate(8);
        let b = fs.allocate(8);
        let c = fs.allocate(8);
        let _tail = fs.allocate(8);
        fs.free(a.offset, 8);
        fs.free(c.offset, 8);
        assert_eq!(fs.free_ranges(), 2);
        fs.free(b.offset, 8);
        assert_eq!(fs.ranges(), vec![(0, 24)]);
        assert_eq!(fs.free_bytes(), 24);
    }

    #[test]
    fn freeing_tail_retracts_high_water() {
        let mut fs = FreeSpace::new(64, 64, 8);
        let a = fs.allocate(8);
        let b = fs.allocate(8);
        fs.free(a.offset, 8);
        assert_eq!(fs.end(), 80);
        fs.free(b.offset, 8);
        // b касается хвоста и сливается с a — регион пуст
        assert_eq!(fs.end(), 64);
        assert_eq!(fs.free_bytes(), 0);
        assert_eq!(fs.free_ranges(), 0);
    }

    #[test]
    fn reuse_policy() {
        assert!(FreeSpace::can_reuse(16, 16));
        assert!(FreeSpace::can_reuse(16, 9));
        assert!(!FreeSpace::can_reuse(16, 17));
    }

    #[test]
    fn rebuild_from_live_ranges() {
        let fs = FreeSpace::rebuild(64, 200, 8, vec![(96, 16), (64, 8), (160, 8)]).expect("rebuild");
        assert_eq!(fs.ranges(), vec![(72, 24), (112, 48)]);
        // хвост [168, 200) не отслеживается — high-water опущен
        assert_eq!(fs.end(), 168);
        assert_eq!(fs.live_bytes(), 32);
    }

    #[test]
    fn rebuild_rejects_overlap_and_out_of_range() {
        assert!(FreeSpace::rebuild(0, 100, 8, vec![(0, 16), (8, 8)]).is_err());
        assert!(FreeSpace::rebuild(0, 100, 8, vec![(96, 16)]).is_err());
    }

    #[test]
    fn accounting_holds_under_churn() {
        let mut rng = oorandom::Rand64::new(0x5EED_F00D);
        let mut fs = FreeSpace::new(64, 64, 8);
        let mut live: Vec<Allocation> = Vec::new();
        for _ in 0..5_000 {
            if live.is_empty() || rng.rand_u64() % 3 != 0 {
                let size = (rng.rand_u64() % 200) as u32 + 1;
                live.push(fs.allocate(size));
            } else {
                let i = (rng.rand_u64() % live.len() as u64) as usize;
                let a = live.swap_remove(i);
                fs.free(a.offset, a.len as u64);
            }
            let live_sum: u64 = live.iter().map(|a| a.len as u64).sum();
            assert_eq!(live_sum, fs.live_bytes());
            assert_eq!(live_sum + fs.free_bytes(), fs.region_len());
        }
        // живые диапазоны не пересекаются
        live.sort_by_key(|a| a.offset);
        for w in live.windows(2) {
            assert!(w[0].offset + w[0].len as u64 <= w[1].offset);
        }
    }
}
