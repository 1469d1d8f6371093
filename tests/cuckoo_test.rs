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

use probkit::cuckoo::CountingCuckooFilter;
use probkit::cuckoo::CuckooFilter;
use probkit::cuckoo::CuckooFilterBuilder;
use probkit::error::ErrorKind;

#[test]
fn test_double_add_then_remove() {
    let mut filter = CuckooFilter::new(100).unwrap();
    filter.add("monkey").unwrap();
    filter.add("monkey").unwrap();
    assert!(filter.check("monkey"));
    assert_eq!(filter.elements_added(), 1);

    assert!(filter.remove("monkey"));
    assert!(!filter.check("monkey"));
}

#[test]
fn test_fullness_error_and_consistent_count() {
    let mut filter = CuckooFilterBuilder::with_capacity(16)
        .bucket_size(2)
        .max_swaps(5)
        .auto_expand(false)
        .seed(97)
        .build()
        .unwrap();

    let mut accepted = Vec::new();
    let mut full_error = None;
    for idx in 0..64 {
        let key = format!("animal-{idx}");
        match filter.add(&key) {
            Ok(()) => accepted.push(key),
            Err(err) => {
                full_error = Some(err);
                break;
            }
        }
    }

    let err = full_error.expect("filter never reported full");
    assert_eq!(err.kind(), ErrorKind::CuckooFilterFull);
    // Only accepted inserts are counted, and they all still answer true.
    assert_eq!(filter.elements_added() as usize, accepted.len());
    for key in &accepted {
        assert!(filter.check(key));
    }
}

#[test]
fn test_expand_preserves_membership() {
    let mut filter = CuckooFilterBuilder::with_capacity(128)
        .seed(41)
        .build()
        .unwrap();
    for idx in 0..100 {
        filter.add(format!("key-{idx}")).unwrap();
    }
    filter.expand().unwrap();
    for idx in 0..100 {
        assert!(filter.check(format!("key-{idx}")), "lost key-{idx}");
    }
    assert_eq!(filter.elements_added(), 100);
}

#[test]
fn test_auto_expansion_absorbs_overflow() {
    let mut filter = CuckooFilterBuilder::with_capacity(16)
        .bucket_size(2)
        .max_swaps(20)
        .seed(59)
        .build()
        .unwrap();
    for idx in 0..200 {
        filter.add(format!("key-{idx}")).unwrap();
    }
    assert_eq!(filter.elements_added(), 200);
    for idx in 0..200 {
        assert!(filter.check(format!("key-{idx}")));
    }
}

#[test]
fn test_file_round_trip() {
    let mut filter = CuckooFilterBuilder::with_capacity(100)
        .fingerprint_size(3)
        .seed(71)
        .build()
        .unwrap();
    for idx in 0..60 {
        filter.add(format!("key-{idx}")).unwrap();
    }

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("filter.cko");
    filter.export(&path).unwrap();

    // Header (7 u32 fields) plus one 3-byte fingerprint per slot.
    let file_len = std::fs::read(&path).unwrap().len() as u32;
    assert_eq!(
        file_len,
        28 + filter.num_buckets() * filter.bucket_size() * 3
    );

    let reloaded = CuckooFilter::from_path(&path).unwrap();
    assert_eq!(reloaded.elements_added(), 60);
    assert_eq!(reloaded.fingerprint_size(), 3);
    for idx in 0..60 {
        assert!(reloaded.check(format!("key-{idx}")));
    }

    let from_bytes = CuckooFilter::from_bytes(&std::fs::read(&path).unwrap()).unwrap();
    assert_eq!(from_bytes.to_bytes(), reloaded.to_bytes());
}

#[test]
fn test_counting_tracks_occurrences() {
    let mut filter = CountingCuckooFilter::new(100).unwrap();
    for _ in 0..5 {
        filter.add("monkey").unwrap();
    }
    filter.add("gorilla").unwrap();
    assert_eq!(filter.check("monkey"), 5);
    assert_eq!(filter.check("gorilla"), 1);
    assert_eq!(filter.check("giraffe"), 0);
    assert_eq!(filter.unique_elements(), 2);
    assert_eq!(filter.elements_added(), 6);

    filter.remove("monkey");
    assert_eq!(filter.check("monkey"), 4);
    assert_eq!(filter.unique_elements(), 2);
}

#[test]
fn test_counting_file_round_trip() {
    let mut filter = CuckooFilterBuilder::with_capacity(100)
        .seed(83)
        .build_counting()
        .unwrap();
    for idx in 0..40 {
        let key = format!("key-{idx}");
        filter.add(&key).unwrap();
        if idx % 4 == 0 {
            filter.add(&key).unwrap();
        }
    }

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("filter.cck");
    filter.export(&path).unwrap();

    let reloaded = CountingCuckooFilter::from_path(&path).unwrap();
    assert_eq!(reloaded.elements_added(), filter.elements_added());
    assert_eq!(reloaded.unique_elements(), filter.unique_elements());
    assert_eq!(reloaded.check("key-0"), 2);
    assert_eq!(reloaded.check("key-1"), 1);

    let from_bytes = CountingCuckooFilter::from_bytes(&std::fs::read(&path).unwrap()).unwrap();
    assert_eq!(from_bytes.to_bytes(), reloaded.to_bytes());
}
