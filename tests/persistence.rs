use anyhow::Result;
use std::fs;
use std::path::{Path, PathBuf};

use emokv::{EmoKv, EmoKvOptions};

fn unique_root(prefix: &str) -> PathBuf {
    let pid = std::process::id();
    let t = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    std::env::temp_dir().join(format!("emokv-{}-{}-{}", prefix, pid, t))
}

fn value_for(i: usize) -> Vec<u8> {
    format!("value-{}-{}", i, "z".repeat(i % 97)).into_bytes()
}

/// Выставить DIRTY (bit2) в заголовке индекса и пересчитать CRC заголовка.
fn mark_dirty(index_file: &Path) -> Result<()> {
    let mut bytes = fs::read(index_file)?;
    let flags = u32::from_le_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]) | 0x4;
    bytes[12..16].copy_from_slice(&flags.to_le_bytes());
    let crc = crc32fast::hash(&bytes[..60]);
    bytes[60..64].copy_from_slice(&crc.to_le_bytes());
    fs::write(index_file, &bytes)?;
    Ok(())
}

#[test]
fn keys_survive_close_and_reopen() -> Result<()> {
    let root = unique_root("persist");
    let m = 2_000usize;

    {
        let kv = EmoKv::open(&root, "p", EmoKvOptions::default())?;
        for i in 0..m {
            kv.put(&format!("key-{}", i), value_for(i))?;
        }
        kv.close()?;
    }

    {
        let kv = EmoKv::open(&root, "p", EmoKvOptions::default())?;
        assert_eq!(kv.len()?, m as u64);
        for i in 0..m {
            assert_eq!(kv.get(&format!("key-{}", i))?, Some(value_for(i)), "key-{}", i);
        }
        // перезаписи и удаления после переоткрытия
        for i in (0..m).step_by(3) {
            kv.delete(&format!("key-{}", i))?;
        }
        kv.put("key-1", b"rewritten".to_vec())?;
        // без явного close: Drop закрывает хранилище
    }

    let kv = EmoKv::open(&root, "p", EmoKvOptions::default())?;
    for i in 0..m {
        let got = kv.get(&format!("key-{}", i))?;
        if i == 1 {
            assert_eq!(got.as_deref(), Some(&b"rewritten"[..]));
        } else if i % 3 == 0 {
            assert!(got.is_none());
        } else {
            assert_eq!(got, Some(value_for(i)));
        }
    }
    let report = kv.check()?;
    assert!(report.is_clean(), "{}", report);
    kv.close()?;

    let _ = fs::remove_dir_all(&root);
    Ok(())
}

#[test]
fn free_space_is_rebuilt_on_open() -> Result<()> {
    let root = unique_root("persist-free");
    {
        let kv = EmoKv::open(&root, "p", EmoKvOptions::default())?;
        kv.put("a", vec![1u8; 300])?;
        kv.put("b", vec![2u8; 300])?;
        kv.put("c", vec![3u8; 300])?;
        kv.delete("b")?;
        kv.close()?;
    }
    let kv = EmoKv::open(&root, "p", EmoKvOptions::default())?;
    let s = kv.stats()?;
    assert_eq!(s.live, 2);
    assert_eq!(s.value_free_ranges, 1);
    assert_eq!(s.value_live_bytes + s.value_free_bytes, s.value_region_len);

    // промежуток от "b" переиспользуется
    let region = s.value_region_len;
    kv.put("d", vec![4u8; 250])?;
    assert_eq!(kv.stats()?.value_region_len, region);
    kv.close()?;

    let _ = fs::remove_dir_all(&root);
    Ok(())
}

#[test]
fn unclean_shutdown_and_stale_tmp_are_tolerated() -> Result<()> {
    let root = unique_root("persist-dirty");
    {
        let kv = EmoKv::open(&root, "p", EmoKvOptions::default())?;
        kv.put("survivor", "yes")?;
        kv.close()?;
    }
    let idx = root.join("p.emoidx");
    mark_dirty(&idx)?;
    let tmp = root.join("p.emoidx.tmp");
    fs::write(&tmp, b"half-written rehash")?;

    let kv = EmoKv::open(&root, "p", EmoKvOptions::default())?;
    assert!(!tmp.exists(), "stale tmp must be removed on open");
    assert_eq!(kv.get_string("survivor")?.as_deref(), Some("yes"));
    kv.close()?;

    // после чистого закрытия флаг снят
    let bytes = fs::read(&idx)?;
    let flags = u32::from_le_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]);
    assert_eq!(flags & 0x4, 0);

    let _ = fs::remove_dir_all(&root);
    Ok(())
}
