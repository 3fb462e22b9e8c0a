use anyhow::Result;
use std::fs;
use std::path::PathBuf;

use emokv::{EmoKv, EmoKvOptions};

fn unique_root(prefix: &str) -> PathBuf {
    let pid = std::process::id();
    let t = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    std::env::temp_dir().join(format!("emokv-{}-{}-{}", prefix, pid, t))
}

#[test]
fn hundred_thousand_keys_from_small_table() -> Result<()> {
    let root = unique_root("growth");
    let opts = EmoKvOptions::default().with_index_initial_space(66 * 1024);
    let kv = EmoKv::open(&root, "g", opts)?;

    let initial = kv.stats()?.capacity;
    assert_eq!(initial, 1024);

    let n = 100_000usize;
    for i in 0..n {
        kv.put(&format!("key-{:06}", i), format!("val-{}", i))?;
        // выборочная проверка уже вставленных ключей по ходу роста
        if i % 10_000 == 9_999 {
            for j in (0..=i).step_by(997) {
                assert_eq!(
                    kv.get_string(&format!("key-{:06}", j))?,
                    Some(format!("val-{}", j)),
                    "key-{:06} lost after growth",
                    j
                );
            }
        }
    }

    let s = kv.stats()?;
    assert_eq!(s.live, n as u64);
    assert!(s.capacity >= initial * 4, "at least two growth events, capacity {}", s.capacity);
    assert!(s.load_factor <= 0.7 + f64::EPSILON);

    for i in 0..n {
        assert_eq!(kv.get_string(&format!("key-{:06}", i))?, Some(format!("val-{}", i)));
    }
    kv.close()?;

    // после переоткрытия — та же ёмкость и все ключи
    let kv = EmoKv::open(&root, "g", EmoKvOptions::default())?;
    assert_eq!(kv.stats()?.capacity, s.capacity);
    for i in (0..n).step_by(101) {
        assert_eq!(kv.get_string(&format!("key-{:06}", i))?, Some(format!("val-{}", i)));
    }
    assert!(kv.check()?.is_clean());
    kv.close()?;

    let _ = fs::remove_dir_all(&root);
    Ok(())
}
