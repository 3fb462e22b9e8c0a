use anyhow::Result;
use oorandom::Rand64;
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

fn random_bytes(rng: &mut Rand64, len: usize) -> Vec<u8> {
    let mut v = Vec::with_capacity(len + 8);
    while v.len() < len {
        v.extend_from_slice(&rng.rand_u64().to_le_bytes());
    }
    v.truncate(len);
    v
}

#[test]
fn roundtrip_empty_large_binary() -> Result<()> {
    let root = unique_root("roundtrip");
    let kv = EmoKv::open(&root, "rt", EmoKvOptions::default())?;
    let mut rng = Rand64::new(0x5EED_0001);

    kv.put("empty", b"")?;
    assert_eq!(kv.get("empty")?, Some(Vec::new()));
    assert_eq!(kv.get_string("empty")?.as_deref(), Some(""));

    // больше начального value-региона (256 KiB) — файл растёт
    let large = random_bytes(&mut rng, 3 * 1024 * 1024 + 17);
    kv.put("large", &large)?;
    assert_eq!(kv.get("large")?.as_deref(), Some(large.as_slice()));

    let mut binary: Vec<u8> = (0..=255u8).collect();
    binary.extend_from_slice(&[0, 0, 0, 0xFF, 0xFE, 0]);
    kv.put("binary", &binary)?;
    assert_eq!(kv.get("binary")?.as_deref(), Some(binary.as_slice()));

    // не-UTF-8 значение через get_string — ошибка, не промах
    assert!(matches!(
        kv.get_string("binary"),
        Err(emokv::EmoKvError::NotUtf8 { .. })
    ));

    // пустой ключ и unicode-ключи — обычные ключи
    kv.put("", "empty-key")?;
    kv.put("ключ-🦀", "значение")?;
    assert_eq!(kv.get_string("")?.as_deref(), Some("empty-key"));
    assert_eq!(kv.get_string("ключ-🦀")?.as_deref(), Some("значение"));

    let stats = kv.stats()?;
    assert_eq!(stats.live, 5);
    assert!(stats.value_file_len > 3 * 1024 * 1024);

    kv.close()?;
    let _ = fs::remove_dir_all(&root);
    Ok(())
}

#[test]
fn roundtrip_random_sizes_without_crc() -> Result<()> {
    let root = unique_root("roundtrip-nocrc");
    let opts = EmoKvOptions::default().with_crc(false);
    let kv = EmoKv::open(&root, "rt", opts)?;
    let mut rng = Rand64::new(0x5EED_0002);

    let mut expected = Vec::new();
    for i in 0..500usize {
        let len = (rng.rand_u64() % 2048) as usize;
        let v = random_bytes(&mut rng, len);
        let k = format!("key-{:04}", i);
        kv.put(&k, &v)?;
        expected.push((k, v));
    }
    for (k, v) in &expected {
        assert_eq!(kv.get(k)?.as_deref(), Some(v.as_slice()), "key {}", k);
    }
    assert!(kv.check()?.is_clean());
    kv.close()?;
    let _ = fs::remove_dir_all(&root);
    Ok(())
}
