//! Round-trip tests for the optional serde support.
#![cfg(feature = "serde")]

use keepsake::persistent::{PersistentHashMap, PersistentStack, PersistentVector};
use rstest::rstest;

#[rstest]
fn test_vector_round_trip() {
    let vector: PersistentVector<i32> = (0..100).collect();
    let json = serde_json::to_string(&vector).unwrap();
    let back: PersistentVector<i32> = serde_json::from_str(&json).unwrap();
    assert_eq!(vector, back);
}

#[rstest]
fn test_vector_serializes_as_sequence() {
    let vector: PersistentVector<i32> = (1..=3).collect();
    assert_eq!(serde_json::to_string(&vector).unwrap(), "[1,2,3]");
}

#[rstest]
fn test_stack_round_trip() {
    let stack: PersistentStack<String> = ["a", "b", "c"]
        .into_iter()
        .map(str::to_string)
        .collect();
    let json = serde_json::to_string(&stack).unwrap();
    let back: PersistentStack<String> = serde_json::from_str(&json).unwrap();
    assert_eq!(stack, back);
    assert_eq!(back.peek().map(String::as_str), Some("a"));
}

#[rstest]
fn test_hashmap_round_trip() {
    let map: PersistentHashMap<String, i32> = (0..100_i32)
        .map(|index| (index.to_string(), index))
        .collect();
    let json = serde_json::to_string(&map).unwrap();
    let back: PersistentHashMap<String, i32> = serde_json::from_str(&json).unwrap();
    assert_eq!(map, back);
}
