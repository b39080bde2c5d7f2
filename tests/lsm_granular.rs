mod common;

use common::{logical_write_size, random_key};
use lsmlite::{GranularLsm, GranularLsmOptions, Lsm};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;
use tempfile::TempDir;

fn open(options: GranularLsmOptions) -> (GranularLsm, TempDir) {
    let _ = env_logger::try_init();
    let dir = TempDir::new().expect("unable to create temporary working directory");
    let lsm = GranularLsm::open(dir.path(), options).unwrap();
    (lsm, dir)
}

/// Options small enough to exercise flushing, compaction and filters.
fn compacting_options() -> GranularLsmOptions {
    GranularLsmOptions {
        memtable_bytes: 1024,
        max_sstable_size: 4096,
        l0_capacity: 2,
        level_size_multiplier: 2,
        bloom_filter_size: 1024,
        ..GranularLsmOptions::default()
    }
}

#[test]
fn test_put_get() {
    let (mut lsm, _dir) = open(GranularLsmOptions::default());

    assert_eq!(lsm.get(b"a").unwrap(), None);
    lsm.put(b"a", &[1]).unwrap();
    assert_eq!(lsm.get(b"a").unwrap(), Some(vec![1]));
}

#[test]
fn test_delete() {
    let (mut lsm, _dir) = open(GranularLsmOptions::default());

    lsm.put(b"a", &[1]).unwrap();
    assert_eq!(lsm.get(b"a").unwrap(), Some(vec![1]));

    lsm.delete(b"a").unwrap();
    assert_eq!(lsm.get(b"a").unwrap(), None);

    lsm.put(b"a", &[1]).unwrap();
    assert_eq!(lsm.get(b"a").unwrap(), Some(vec![1]));
}

#[test]
fn test_multiple_flushes_latest_wins() {
    let options = GranularLsmOptions {
        memtable_bytes: 1000,
        max_sstable_size: 4096,
        bloom_filter_size: 1024,
        ..GranularLsmOptions::default()
    };
    let (mut lsm, _dir) = open(options);

    let mut rng = StdRng::seed_from_u64(42);
    let keys: Vec<Vec<u8>> = (0..1000).map(|_| random_key(&mut rng, 7, 11)).collect();
    let values: Vec<Vec<u8>> = (0..1000).map(|_| random_key(&mut rng, 7, 11)).collect();

    let mut expected_state: BTreeMap<Vec<u8>, Vec<u8>> = BTreeMap::new();

    for _ in 0..5000 {
        let operation = rng.gen_range(0..10);
        let key = keys[rng.gen_range(0..keys.len())].clone();
        if operation <= 7 {
            let value = values[rng.gen_range(0..values.len())].clone();
            lsm.put(&key, &value).unwrap();
            expected_state.insert(key, value);
        } else if operation == 8 {
            lsm.delete(&key).unwrap();
            expected_state.remove(&key);
        } else {
            assert_eq!(lsm.get(&key).unwrap(), expected_state.get(&key).cloned());
        }
    }
}

#[test]
fn test_works_without_bloom_filters() {
    let options = GranularLsmOptions {
        memtable_bytes: 512,
        max_sstable_size: 2048,
        bloom_filter_size: 0,
        ..GranularLsmOptions::default()
    };
    let (mut lsm, _dir) = open(options);

    let mut rng = StdRng::seed_from_u64(7);
    let mut expected_state: BTreeMap<Vec<u8>, Vec<u8>> = BTreeMap::new();
    for _ in 0..2000 {
        let key = random_key(&mut rng, 4, 6);
        let value = random_key(&mut rng, 8, 12);
        lsm.put(&key, &value).unwrap();
        expected_state.insert(key, value);
    }
    for (key, value) in &expected_state {
        assert_eq!(lsm.get(key).unwrap().as_ref(), Some(value));
    }
}

#[test]
fn test_write_amplification_bounded() {
    let options = compacting_options();
    let (mut lsm, _dir) = open(options);

    let mut rng = StdRng::seed_from_u64(42);
    let keys: Vec<Vec<u8>> = (0..2000).map(|_| random_key(&mut rng, 5, 7)).collect();
    let values: Vec<Vec<u8>> = (0..2000).map(|_| random_key(&mut rng, 10, 20)).collect();

    let operations = 6000u32;
    let mut bytes_written_logically = 0u64;
    for _ in 0..operations {
        let key = &keys[rng.gen_range(0..keys.len())];
        let value = &values[rng.gen_range(0..values.len())];
        lsm.put(key, value).unwrap();
        bytes_written_logically += logical_write_size(key, value);
    }

    let bytes_written_to_storage = lsm.levels().total_bytes_inserted();
    let write_amplification = bytes_written_to_storage as f64 / bytes_written_logically as f64;
    assert!(
        write_amplification < 8.0 * (operations as f64).log2(),
        "write amplification = {}",
        write_amplification
    );

    assert!(lsm.levels().total_bytes_read() < bytes_written_to_storage);
}

#[test]
fn test_search_complexity_by_key_age() {
    // Filters disabled so that table visits reflect how deep a key has sunk;
    // at most one table per level is consulted either way.
    let options = GranularLsmOptions {
        memtable_bytes: 128,
        max_sstable_size: 512,
        bloom_filter_size: 0,
        ..GranularLsmOptions::default()
    };
    let (mut lsm, _dir) = open(options);

    let mut rng = StdRng::seed_from_u64(42);
    let keys: Vec<Vec<u8>> = (0..2000).map(|_| random_key(&mut rng, 5, 7)).collect();

    for key in &keys {
        let value = random_key(&mut rng, 10, 20);
        lsm.put(key, &value).unwrap();
    }

    // (key, visits lower bound, visits upper bound)
    let cases = [
        (keys[keys.len() - 1].clone(), 0, 1),
        (keys[keys.len() - 256].clone(), 1, 6),
        (keys[0].clone(), 2, 10),
    ];

    for (key, min_visits, max_visits) in cases {
        lsm.levels().reset_table_visits();
        assert!(lsm.get(&key).unwrap().is_some());
        let visits = lsm.levels().table_visits();
        assert!(
            min_visits <= visits && visits <= max_visits,
            "key age visits = {}",
            visits
        );
    }
}

#[test]
fn test_bloom_filters_skip_non_containing_levels() {
    let options = GranularLsmOptions {
        memtable_bytes: 128,
        max_sstable_size: 512,
        bloom_filter_size: 128,
        ..GranularLsmOptions::default()
    };
    let (mut lsm, _dir) = open(options);

    let mut rng = StdRng::seed_from_u64(42);
    let keys: Vec<Vec<u8>> = (0..2000).map(|_| random_key(&mut rng, 5, 7)).collect();
    for key in &keys {
        let value = random_key(&mut rng, 10, 20);
        lsm.put(key, &value).unwrap();
    }

    // The oldest keys live in the deepest level, but the filters of the
    // levels above exclude them without a single table read; barring the odd
    // false positive only the containing table is visited.
    for key in &keys[..20] {
        lsm.levels().reset_table_visits();
        assert!(lsm.get(key).unwrap().is_some());
        assert!(
            lsm.levels().table_visits() <= 3,
            "visits = {}",
            lsm.levels().table_visits()
        );
    }
}

#[test]
fn test_get_with_sequence_number() {
    let options = GranularLsmOptions {
        memtable_bytes: 100,
        ..GranularLsmOptions::default()
    };
    let (mut lsm, _dir) = open(options);

    let k = &[1, 2, 3];
    assert_eq!(lsm.current_sequence_number(), 0);

    lsm.put(k, &[10]).unwrap();
    assert_eq!(lsm.current_sequence_number(), 1);
    lsm.put(k, &[20]).unwrap();
    assert_eq!(lsm.current_sequence_number(), 2);
    lsm.delete(k).unwrap();
    assert_eq!(lsm.current_sequence_number(), 3);
    lsm.put(k, &[30]).unwrap();
    assert_eq!(lsm.current_sequence_number(), 4);

    assert_eq!(lsm.get_at(k, 0).unwrap(), None);
    assert_eq!(lsm.get_at(k, 1).unwrap(), Some(vec![10]));
    assert_eq!(lsm.get_at(k, 2).unwrap(), Some(vec![20]));
    assert_eq!(lsm.get_at(k, 3).unwrap(), None);
    assert_eq!(lsm.get_at(k, 4).unwrap(), Some(vec![30]));
    assert_eq!(lsm.get(k).unwrap(), Some(vec![30]));
}

#[test]
fn test_scan_multiple_keys() {
    let (mut lsm, _dir) = open(GranularLsmOptions::default());

    lsm.put(&[3], &[30]).unwrap();
    lsm.put(&[1], &[10]).unwrap();
    lsm.put(&[2], &[20]).unwrap();

    let result: Vec<(Vec<u8>, Vec<u8>)> = lsm.scan(None, None).unwrap().collect();
    assert_eq!(
        result,
        vec![
            (vec![1], vec![10]),
            (vec![2], vec![20]),
            (vec![3], vec![30]),
        ]
    );
}

#[test]
fn test_scan_with_range() {
    let (mut lsm, _dir) = open(GranularLsmOptions::default());

    for i in 0..10u8 {
        lsm.put(&[i], &[i * 10]).unwrap();
    }

    let result: Vec<(Vec<u8>, Vec<u8>)> = lsm.scan(Some(&[3]), Some(&[7])).unwrap().collect();
    assert_eq!(
        result,
        vec![
            (vec![3], vec![30]),
            (vec![4], vec![40]),
            (vec![5], vec![50]),
            (vec![6], vec![60]),
        ]
    );
}

#[test]
fn test_scan_skips_tombstones() {
    let (mut lsm, _dir) = open(GranularLsmOptions::default());

    lsm.put(&[1], &[10]).unwrap();
    lsm.put(&[2], &[20]).unwrap();
    lsm.put(&[3], &[30]).unwrap();
    lsm.delete(&[2]).unwrap();

    let result: Vec<(Vec<u8>, Vec<u8>)> = lsm.scan(None, None).unwrap().collect();
    assert_eq!(result, vec![(vec![1], vec![10]), (vec![3], vec![30])]);
}

#[test]
fn test_scan_deduplicates_versions() {
    let (mut lsm, _dir) = open(GranularLsmOptions::default());

    lsm.put(&[1], &[10]).unwrap();
    lsm.put(&[1], &[20]).unwrap();
    lsm.put(&[1], &[30]).unwrap();

    let result: Vec<(Vec<u8>, Vec<u8>)> = lsm.scan(None, None).unwrap().collect();
    assert_eq!(result, vec![(vec![1], vec![30])]);
}

#[test]
fn test_scan_across_levels() {
    let options = GranularLsmOptions {
        memtable_bytes: 128,
        max_sstable_size: 512,
        bloom_filter_size: 128,
        ..GranularLsmOptions::default()
    };
    let (mut lsm, _dir) = open(options);

    let mut rng = StdRng::seed_from_u64(42);
    let keys: Vec<Vec<u8>> = (0..500).map(|_| random_key(&mut rng, 5, 7)).collect();
    let values: Vec<Vec<u8>> = (0..500).map(|_| random_key(&mut rng, 10, 20)).collect();

    let mut expected_state: BTreeMap<Vec<u8>, Vec<u8>> = BTreeMap::new();
    for _ in 0..1500 {
        let key = keys[rng.gen_range(0..keys.len())].clone();
        let value = values[rng.gen_range(0..values.len())].clone();
        lsm.put(&key, &value).unwrap();
        expected_state.insert(key, value);
    }

    let result: Vec<(Vec<u8>, Vec<u8>)> = lsm.scan(None, None).unwrap().collect();
    let expected: Vec<(Vec<u8>, Vec<u8>)> = expected_state.into_iter().collect();
    assert_eq!(result, expected);
}

#[test]
fn test_scan_with_sequence_number() {
    let options = GranularLsmOptions {
        memtable_bytes: 128,
        max_sstable_size: 512,
        bloom_filter_size: 128,
        ..GranularLsmOptions::default()
    };
    let (mut lsm, _dir) = open(options);

    let mut rng = StdRng::seed_from_u64(42);
    let keys: Vec<Vec<u8>> = (0..500).map(|_| random_key(&mut rng, 5, 7)).collect();
    let values: Vec<Vec<u8>> = (0..500).map(|_| random_key(&mut rng, 10, 20)).collect();

    let mut expected_state: BTreeMap<Vec<u8>, Vec<u8>> = BTreeMap::new();
    for _ in 0..1000 {
        let key = keys[rng.gen_range(0..keys.len())].clone();
        let value = values[rng.gen_range(0..values.len())].clone();
        lsm.put(&key, &value).unwrap();
        expected_state.insert(key, value);
    }

    let snapshot = lsm.current_sequence_number();
    for _ in 0..500 {
        let key = keys[rng.gen_range(0..keys.len())].clone();
        let value = values[rng.gen_range(0..values.len())].clone();
        lsm.put(&key, &value).unwrap();
    }

    let result: Vec<(Vec<u8>, Vec<u8>)> = lsm.scan_at(None, None, snapshot).unwrap().collect();
    let expected: Vec<(Vec<u8>, Vec<u8>)> = expected_state.into_iter().collect();
    assert_eq!(result, expected);
}

#[test]
fn test_levels_structure() {
    let options = compacting_options();
    let (mut lsm, _dir) = open(options.clone());

    let mut rng = StdRng::seed_from_u64(42);
    let keys: Vec<Vec<u8>> = (0..3000).map(|_| random_key(&mut rng, 5, 7)).collect();
    let values: Vec<Vec<u8>> = (0..3000).map(|_| random_key(&mut rng, 10, 20)).collect();

    for _ in 0..6000 {
        let key = &keys[rng.gen_range(0..keys.len())];
        let value = &values[rng.gen_range(0..values.len())];
        lsm.put(key, value).unwrap();
    }

    let levels = lsm.levels();
    assert!(levels.num_levels() >= 5, "levels = {}", levels.num_levels());

    for level in 0..levels.num_levels() {
        // Every level below the last is filled to one short of its capacity.
        if level + 1 != levels.num_levels() {
            assert_eq!(
                levels.num_tables(level),
                (1 << (level + 1)) - 1,
                "level = {}",
                level
            );
        }

        let metadata: Vec<_> = (0..levels.num_tables(level))
            .map(|ind| {
                levels
                    .table_metadata(level, ind)
                    .unwrap_or_else(|| panic!("missing metadata at level {} table {}", level, ind))
            })
            .collect();

        for (ind, meta) in metadata.iter().enumerate() {
            assert!(
                meta.file_size <= 2 * options.max_sstable_size,
                "level = {}, table = {}",
                level,
                ind
            );
        }
        for ind in 0..metadata.len().saturating_sub(1) {
            assert!(
                metadata[ind].max_key <= metadata[ind + 1].min_key,
                "level = {}, table = {}",
                level,
                ind
            );
        }
    }
}

#[test]
fn test_compaction_is_granular() {
    let options = compacting_options();
    let (mut lsm, _dir) = open(options.clone());

    let mut rng = StdRng::seed_from_u64(42);
    let keys: Vec<Vec<u8>> = (0..3000).map(|_| random_key(&mut rng, 5, 7)).collect();
    let values: Vec<Vec<u8>> = (0..3000).map(|_| random_key(&mut rng, 10, 20)).collect();

    for i in 0..6000 {
        let key = &keys[rng.gen_range(0..keys.len())];
        let value = &values[rng.gen_range(0..values.len())];
        lsm.put(key, value).unwrap();

        // No single write may rewrite more than a bounded slice of each
        // level; a whole-level rewrite would exceed this.
        let bytes_inserted = lsm.levels().total_bytes_inserted();
        assert!(
            bytes_inserted <= options.max_sstable_size * lsm.levels().num_levels() as u64 * 20,
            "levels = {}, i = {}",
            lsm.levels().num_levels(),
            i
        );
        lsm.levels().reset_bytes_inserted();
    }
}

#[test]
fn test_working_directory_is_removed_on_drop() {
    let dir = TempDir::new().unwrap();
    let store_dir = dir.path().join("granular_lsm");
    {
        let mut lsm = GranularLsm::open(dir.path(), compacting_options()).unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..2000 {
            let key = random_key(&mut rng, 5, 7);
            lsm.put(&key, b"value").unwrap();
        }
        assert!(store_dir.exists());
    }
    assert!(!store_dir.exists());
}
