//! Unit tests for `PersistentVector`.
//!
//! Covers the vector contract end to end: bulk appends across every tree
//! depth, updates, slicing, queue-style removal from the front, and the
//! equality laws.

use keepsake::persistent::PersistentVector;
use rstest::rstest;

// =============================================================================
// Bulk append and random access
// =============================================================================

#[rstest]
fn test_bulk_append_and_index() {
    let mut vector = PersistentVector::new();
    for index in 0..12345_i32 {
        vector = vector.push_back(index);
    }

    assert_eq!(vector.len(), 12345);
    for index in 0..12345_i32 {
        assert_eq!(vector.get(index as usize), Some(&index), "index {index}");
    }
}

#[rstest]
fn test_bulk_append_iterator_order() {
    let vector: PersistentVector<i32> = (0..12345).collect();
    let collected: Vec<i32> = vector.iter().copied().collect();
    let expected: Vec<i32> = (0..12345).collect();
    assert_eq!(collected, expected);
}

#[rstest]
fn test_append_leaves_original_unchanged() {
    let original: PersistentVector<i32> = (0..1000).collect();
    let extended = original.push_back(1000);

    assert_eq!(original.len(), 1000);
    assert_eq!(original.get(1000), None);
    assert_eq!(extended.len(), 1001);
    assert_eq!(extended.get(1000), Some(&1000));
    for index in 0..1000 {
        assert_eq!(original.get(index), extended.get(index));
    }
}

// =============================================================================
// Update
// =============================================================================

#[rstest]
fn test_reverse_set() {
    // Build a vector of placeholders, then fill it back to front.
    let mut vector: PersistentVector<Option<i32>> = (0..12345).map(|_| None).collect();
    for index in 0..12345_i32 {
        vector = vector
            .update((12344 - index) as usize, Some(index))
            .expect("index in range");
    }

    assert_eq!(vector.len(), 12345);
    for index in 0..12345_i32 {
        assert_eq!(vector.get(index as usize), Some(&Some(12344 - index)));
    }
}

#[rstest]
fn test_update_does_not_disturb_neighbours() {
    let vector: PersistentVector<i32> = (0..100).collect();
    let updated = vector.update(40, -1).unwrap();
    for index in 0..100 {
        let expected = if index == 40 { -1 } else { index as i32 };
        assert_eq!(updated.get(index), Some(&expected));
    }
}

#[rstest]
fn test_update_alias_for_append_at_len() {
    let vector: PersistentVector<i32> = (0..33).collect();
    let appended = vector.update(33, 33).unwrap();
    assert_eq!(appended.len(), 34);
    assert_eq!(appended.get(33), Some(&33));
    assert!(vector.update(34, 0).is_none());
}

// =============================================================================
// Slicing matrix
// =============================================================================

#[rstest]
fn test_slicing_matrix() {
    for size in 0..1229_usize {
        let vector: PersistentVector<usize> = (0..size).collect();

        for count in 0..=size {
            let prefix = vector.take(count).unwrap();
            assert_eq!(prefix.len(), count, "take({count}) of {size}");
            for index in 0..count {
                assert_eq!(prefix.get(index), Some(&index), "take({count}) of {size}");
            }

            let suffix = vector.take_last(count).unwrap();
            assert_eq!(suffix.len(), count, "take_last({count}) of {size}");
            for index in 0..count {
                assert_eq!(
                    suffix.get(index),
                    Some(&(size - count + index)),
                    "take_last({count}) of {size}"
                );
            }
        }
    }
}

#[rstest]
fn test_slice_composition() {
    let vector: PersistentVector<usize> = (0..500).collect();

    // Full-length prefix is the same structure.
    assert!(vector.take(500).unwrap().ptr_eq(&vector));

    // Zero-length slices are the empty vector.
    assert_eq!(vector.take(0).unwrap(), PersistentVector::new());
    assert_eq!(vector.take_last(0).unwrap(), PersistentVector::new());
    assert!(vector.take(0).unwrap().is_empty());

    // Slices of slices agree with direct slices.
    let middle = vector.take_last(400).unwrap().take(300).unwrap();
    assert_eq!(middle.len(), 300);
    for index in 0..300 {
        assert_eq!(middle.get(index), Some(&(100 + index)));
    }
}

#[rstest]
fn test_out_of_range_slices() {
    let vector: PersistentVector<i32> = (0..10).collect();
    assert!(vector.take(11).is_none());
    assert!(vector.take_last(11).is_none());
    assert!(vector.skip(11).is_none());
}

// =============================================================================
// Queue usage
// =============================================================================

#[rstest]
fn test_fifo_round_trip() {
    // Feed elements in at the back, drain from the front.
    let mut queue: PersistentVector<i32> = PersistentVector::new();
    for element in 0..200 {
        queue = queue.push_back(element);
    }

    let mut drained = Vec::new();
    while let Some((rest, element)) = queue.pop_front() {
        drained.push(element);
        queue = rest;
    }
    let expected: Vec<i32> = (0..200).collect();
    assert_eq!(drained, expected);
}

#[rstest]
fn test_interleaved_push_and_pop() {
    let mut queue: PersistentVector<i32> = PersistentVector::new();
    let mut expected_front = 0;
    for round in 0..100 {
        for element in (round * 3)..(round * 3 + 3) {
            queue = queue.push_back(element);
        }
        let (rest, element) = queue.pop_front().unwrap();
        assert_eq!(element, expected_front);
        expected_front += 1;
        queue = rest;
    }
    assert_eq!(queue.len(), 200);
    assert_eq!(queue.get(0), Some(&100));
}

// =============================================================================
// Persistence and equality
// =============================================================================

#[rstest]
fn test_all_versions_remain_valid() {
    let mut versions = vec![PersistentVector::new()];
    for index in 0..100_i32 {
        let next = versions.last().unwrap().push_back(index);
        versions.push(next);
    }

    for (length, version) in versions.iter().enumerate() {
        assert_eq!(version.len(), length);
        for index in 0..length {
            assert_eq!(version.get(index), Some(&(index as i32)));
        }
    }
}

#[rstest]
fn test_equality_and_hash_across_construction_paths() {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    let built: PersistentVector<i32> = (50..150).collect();
    let sliced = (0..200)
        .collect::<PersistentVector<i32>>()
        .take_last(150)
        .unwrap()
        .take(100)
        .unwrap();

    assert_eq!(built, sliced);

    let mut built_hasher = DefaultHasher::new();
    built.hash(&mut built_hasher);
    let mut sliced_hasher = DefaultHasher::new();
    sliced.hash(&mut sliced_hasher);
    assert_eq!(built_hasher.finish(), sliced_hasher.finish());
}

#[rstest]
fn test_nullable_elements_and_search() {
    let vector: PersistentVector<Option<i32>> = PersistentVector::new()
        .push_back(Some(1))
        .push_back(None)
        .push_back(Some(2))
        .push_back(None);

    assert_eq!(vector.index_of(&None), Some(1));
    assert_eq!(vector.last_index_of(&None), Some(3));
    assert!(vector.contains(&Some(2)));
    assert!(!vector.contains(&Some(3)));
}

#[rstest]
fn test_append_concatenates() {
    let left: PersistentVector<i32> = (0..40).collect();
    let right: PersistentVector<i32> = (40..100).collect();
    let combined = left.append(&right);
    assert_eq!(combined, (0..100).collect::<PersistentVector<i32>>());
}
