// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::borrow::Borrow;
use std::collections::HashMap;

crate::define_id! {
    /// Test ID type for macro verification.
    pub struct TestId;
}

#[test]
fn define_id_display_and_as_str() {
    let id = TestId::new("hello");
    assert_eq!(id.as_str(), "hello");
    assert_eq!(id.to_string(), "hello");
}

#[test]
fn define_id_compares_against_str() {
    let id: TestId = "abc".into();
    assert_eq!(id, "abc");
    assert_eq!(id, *"abc");
}

#[test]
fn define_id_borrow_allows_str_lookup() {
    let mut map = HashMap::new();
    map.insert(TestId::new("k"), 42);
    assert_eq!(map.get("k"), Some(&42));
    let key = TestId::new("k");
    let borrowed: &str = key.borrow();
    assert_eq!(borrowed, "k");
}

#[test]
fn define_id_serializes_as_plain_string() {
    let id = TestId::new("wf-1");
    let json = serde_json::to_string(&id).unwrap();
    assert_eq!(json, "\"wf-1\"");
    let back: TestId = serde_json::from_str(&json).unwrap();
    assert_eq!(back, id);
}

#[test]
fn uuid_gen_creates_unique_ids() {
    let id_gen = UuidIdGen;
    let a = id_gen.next();
    let b = id_gen.next();
    assert_ne!(a, b);
    assert_eq!(a.len(), 36);
}

#[test]
fn sequential_gen_prefixes_and_shares_counter() {
    let id_gen = SequentialIdGen::new();
    let shared = id_gen.clone();
    assert_eq!(id_gen.next_prefixed("wf"), "wf-1");
    assert_eq!(shared.next_prefixed("job"), "job-2");
    assert_eq!(id_gen.next(), "3");
}
