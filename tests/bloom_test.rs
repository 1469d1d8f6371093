// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

use googletest::assert_that;
use googletest::prelude::le;
use googletest::prelude::near;
use probkit::bloom::BloomFilter;
use probkit::bloom::BloomFilterOnDisk;

#[test]
fn test_basic_membership() {
    let mut filter = BloomFilter::new(10, 0.05).unwrap();
    filter.add("google.com");
    assert!(filter.check("google.com"));
    assert!(!filter.check("facebook.com"));
}

#[test]
fn test_no_false_negatives() {
    let mut filter = BloomFilter::new(1000, 0.05).unwrap();
    for idx in 0..1000 {
        filter.add(format!("seen-{idx}"));
    }
    for idx in 0..1000 {
        assert!(filter.check(format!("seen-{idx}")), "lost seen-{idx}");
    }
}

#[test]
fn test_empirical_false_positive_rate() {
    let target = 0.05f64;
    let mut filter = BloomFilter::new(1000, target as f32).unwrap();
    for idx in 0..1000 {
        filter.add(format!("seen-{idx}"));
    }
    let trials = 10_000;
    let false_positives = (0..trials)
        .filter(|idx| filter.check(format!("unseen-{idx}")))
        .count();
    let observed = false_positives as f64 / f64::from(trials);
    assert_that!(observed, le(1.5 * target));
}

#[test]
fn test_estimate_elements_accuracy() {
    let mut filter = BloomFilter::new(1000, 0.05).unwrap();
    for idx in 0..800 {
        filter.add(format!("seen-{idx}"));
    }
    assert_that!(filter.estimate_elements() as f64, near(800.0, 80.0));
}

#[test]
fn test_jaccard_index() {
    let mut filter = BloomFilter::new(100, 0.01).unwrap();
    let empty = BloomFilter::new(100, 0.01).unwrap();
    for idx in 0..50 {
        filter.add(format!("seen-{idx}"));
    }
    assert_eq!(filter.jaccard_index(&filter.clone()).unwrap(), 1.0);
    assert_eq!(filter.jaccard_index(&empty).unwrap(), 0.0);
    assert_eq!(empty.jaccard_index(&empty.clone()).unwrap(), 1.0);
}

#[test]
fn test_file_round_trip() {
    let words: Vec<String> = (0..1000).map(|idx| format!("word{idx}")).collect();
    let mut filter = BloomFilter::new(1000, 0.05).unwrap();
    for word in &words {
        filter.add(word);
    }

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("corpus.blm");
    filter.export(&path).unwrap();

    // File length is exactly ceil(m/8) + 20.
    let on_disk_len = std::fs::read(&path).unwrap().len() as u64;
    assert_eq!(on_disk_len, filter.number_bits().div_ceil(8) + 20);

    let reloaded = BloomFilter::from_path(&path).unwrap();
    assert_eq!(reloaded, filter);
    assert_eq!(reloaded.elements_added(), filter.elements_added());
    for idx in 0..1000 {
        let probe = format!("probe-{idx}");
        assert_eq!(reloaded.check(&probe), filter.check(&probe));
    }
}

#[test]
fn test_bytes_equals_path() {
    let mut filter = BloomFilter::new(100, 0.01).unwrap();
    filter.add("apple");

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("filter.blm");
    filter.export(&path).unwrap();

    let from_path = BloomFilter::from_path(&path).unwrap();
    let from_bytes = BloomFilter::from_bytes(&std::fs::read(&path).unwrap()).unwrap();
    assert_eq!(from_path, from_bytes);
}

#[test]
fn test_hex_round_trip() {
    let mut filter = BloomFilter::new(100, 0.01).unwrap();
    filter.add("apple");
    let hex = filter.export_hex();
    assert!(hex.chars().all(|c| c.is_ascii_hexdigit()));
    assert!(!hex.chars().any(|c| c.is_ascii_lowercase()));
    let restored = BloomFilter::from_hex(&hex).unwrap();
    assert_eq!(restored, filter);
}

#[test]
fn test_c_header_export() {
    let mut filter = BloomFilter::new(10, 0.05).unwrap();
    filter.add("apple");

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bloom.h");
    filter.export_c_header(&path).unwrap();

    let header = std::fs::read_to_string(&path).unwrap();
    assert!(header.contains("#define EST_ELEMENTS 10"));
    assert!(header.contains("#define FPR 0.05f"));
    assert!(header.contains("#define ELEMENTS_ADDED 1"));
    assert!(header.contains("const unsigned char bloom[] = {"));
}

#[test]
fn test_union_and_intersection_produce_new_filters() {
    let mut left = BloomFilter::new(100, 0.01).unwrap();
    let mut right = BloomFilter::new(100, 0.01).unwrap();
    left.add("left");
    right.add("right");

    let merged = left.union(&right).unwrap();
    assert!(merged.check("left"));
    assert!(merged.check("right"));
    // Operands are untouched.
    assert!(!left.check("right"));
    assert!(!right.check("left"));

    let common = left.intersection(&right).unwrap();
    assert!(!common.check("left"));
    assert!(!common.check("right"));
}

#[test]
fn test_on_disk_and_memory_agree() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("disk.blm");

    let mut on_disk = BloomFilterOnDisk::create(&path, 200, 0.02).unwrap();
    let mut in_memory = BloomFilter::new(200, 0.02).unwrap();
    for idx in 0..150 {
        let key = format!("key-{idx}");
        on_disk.add(&key);
        in_memory.add(&key);
    }
    on_disk.flush().unwrap();

    // The mmap-backed file is byte-identical to the in-memory export.
    assert_eq!(std::fs::read(&path).unwrap(), in_memory.to_bytes());
    assert_eq!(on_disk.estimate_elements(), in_memory.estimate_elements());

    // And the in-memory importer reads it back.
    let reloaded = BloomFilter::from_path(&path).unwrap();
    assert_eq!(reloaded, in_memory);
}
