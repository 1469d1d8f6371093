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

use probkit::countmin::CountMinSketch;
use probkit::countmin::HeavyHitters;
use probkit::countmin::QueryPolicy;
use probkit::countmin::StreamThreshold;

#[test]
fn test_basic_estimates() {
    let mut sketch = CountMinSketch::new(1000, 5).unwrap();
    assert_eq!(sketch.add_with_weight("x", 1), 1);
    assert_eq!(sketch.add_with_weight("x", 24), 25);
    assert_eq!(sketch.check("x"), 25);
}

#[test]
fn test_min_policy_monotone_overestimate() {
    let mut sketch = CountMinSketch::new(128, 5).unwrap();
    let mut truth = std::collections::HashMap::new();
    for idx in 0..5000u32 {
        let key = format!("key-{}", idx % 300);
        sketch.add(&key);
        *truth.entry(key).or_insert(0i32) += 1;
    }
    for (key, count) in &truth {
        assert!(sketch.check(key) >= *count, "undercounted {key}");
    }
}

#[test]
fn test_query_nondecreasing_under_add() {
    let mut sketch = CountMinSketch::new(64, 3).unwrap();
    let mut last = 0;
    for idx in 0..500u32 {
        sketch.add(format!("noise-{}", idx % 40));
        let estimate = sketch.add("watched");
        assert!(estimate >= last);
        last = estimate;
    }
}

#[test]
fn test_policies_agree_without_collisions() {
    for policy in [QueryPolicy::Min, QueryPolicy::Mean, QueryPolicy::MeanMin] {
        let mut sketch = CountMinSketch::with_policy(10_000, 5, policy).unwrap();
        sketch.add_with_weight("lonely", 42);
        assert_eq!(sketch.check("lonely"), 42, "policy {policy:?}");
    }
}

#[test]
fn test_join_accumulates() {
    let mut morning = CountMinSketch::new(1000, 5).unwrap();
    let mut evening = CountMinSketch::new(1000, 5).unwrap();
    for _ in 0..10 {
        morning.add("page");
    }
    for _ in 0..7 {
        evening.add("page");
    }
    let day = morning.join(&evening).unwrap();
    assert_eq!(day.check("page"), 17);
    assert_eq!(day.elements_added(), 17);
}

#[test]
fn test_file_round_trip() {
    let mut sketch = CountMinSketch::new(500, 4).unwrap();
    for idx in 0..2000u32 {
        sketch.add(format!("key-{}", idx % 100));
    }

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sketch.cms");
    sketch.export(&path).unwrap();

    // Header-first format: width, depth, inserts, then the matrix.
    let file_len = std::fs::read(&path).unwrap().len();
    assert_eq!(file_len, 16 + 500 * 4 * 4);

    let reloaded = CountMinSketch::from_path(&path).unwrap();
    assert_eq!(reloaded.width(), 500);
    assert_eq!(reloaded.depth(), 4);
    assert_eq!(reloaded.elements_added(), 2000);
    for idx in 0..100 {
        let key = format!("key-{idx}");
        assert_eq!(reloaded.check(&key), sketch.check(&key));
    }

    let from_bytes = CountMinSketch::from_bytes(&std::fs::read(&path).unwrap()).unwrap();
    assert_eq!(from_bytes.to_bytes(), reloaded.to_bytes());
}

#[test]
fn test_heavy_hitters_eviction_scenario() {
    let mut hitters = HeavyHitters::new(2, 1000, 5).unwrap();
    for _ in 0..10 {
        hitters.add("A");
    }
    for _ in 0..20 {
        hitters.add("B");
    }
    for _ in 0..15 {
        hitters.add("C");
    }
    // C overtook A's 10 on the way to 15, evicting it.
    let heavy = hitters.heavy_hitters();
    assert_eq!(heavy.len(), 2);
    assert_eq!(heavy.get(b"B".as_slice()), Some(&20));
    assert_eq!(heavy.get(b"C".as_slice()), Some(&15));
    assert!(!heavy.contains_key(b"A".as_slice()));
}

#[test]
fn test_heavy_hitters_bounded_and_finds_dominant_key() {
    let mut hitters = HeavyHitters::new(5, 1000, 5).unwrap();
    for round in 0..200 {
        hitters.add("dominant");
        hitters.add(format!("minor-{}", round % 50));
        assert!(hitters.heavy_hitters().len() <= 5);
    }
    assert!(hitters.heavy_hitters().contains_key(b"dominant".as_slice()));
}

#[test]
fn test_stream_threshold_add_remove() {
    let mut stream = StreamThreshold::new(10, 1000, 5).unwrap();
    for idx in 0..9 {
        stream.add("hot");
        stream.add(format!("cold-{idx}"));
    }
    assert!(stream.tracked().is_empty());

    stream.add("hot");
    assert_eq!(stream.tracked().get(b"hot".as_slice()), Some(&10));

    stream.remove("hot");
    assert!(stream.tracked().is_empty());
    assert_eq!(stream.check("hot"), 9);
}

#[test]
fn test_views_round_trip_through_sketch_format() {
    let mut hitters = HeavyHitters::new(3, 500, 4).unwrap();
    for _ in 0..25 {
        hitters.add("popular");
    }

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("hitters.cms");
    hitters.export(&path).unwrap();

    // The stored sketch is a plain count-min file; any view can adopt it.
    let as_sketch = CountMinSketch::from_path(&path).unwrap();
    assert_eq!(as_sketch.check("popular"), 25);

    let as_stream = StreamThreshold::from_path(&path, 20).unwrap();
    assert_eq!(as_stream.check("popular"), 25);

    let as_hitters = HeavyHitters::from_path(&path, 3).unwrap();
    assert_eq!(as_hitters.check("popular"), 25);
    assert!(as_hitters.heavy_hitters().is_empty());
}
