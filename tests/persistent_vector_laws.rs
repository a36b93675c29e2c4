//! Property-based tests for `PersistentVector` laws.
//!
//! Verifies the algebraic laws and invariants of the vector with proptest.

use keepsake::persistent::PersistentVector;
use proptest::prelude::*;

proptest! {
    /// Persistence: a mutator leaves the receiver observably unchanged.
    #[test]
    fn prop_push_back_preserves_original(
        elements in prop::collection::vec(any::<i32>(), 0..100),
        new_element: i32
    ) {
        let vector: PersistentVector<i32> = elements.iter().copied().collect();
        let _ = vector.push_back(new_element);

        prop_assert_eq!(vector.len(), elements.len());
        for (index, element) in elements.iter().enumerate() {
            prop_assert_eq!(vector.get(index), Some(element));
        }
    }

    /// After an append, the new element is at the old length.
    #[test]
    fn prop_push_back_appends(
        elements in prop::collection::vec(any::<i32>(), 0..100),
        new_element: i32
    ) {
        let vector: PersistentVector<i32> = elements.iter().copied().collect();
        let extended = vector.push_back(new_element);

        prop_assert_eq!(extended.len(), vector.len() + 1);
        prop_assert_eq!(extended.get(vector.len()), Some(&new_element));
    }

    /// Update law: the updated slot reads back, all others are untouched.
    #[test]
    fn prop_update_get_laws(
        elements in prop::collection::vec(any::<i32>(), 1..100),
        position_seed: usize,
        new_element: i32
    ) {
        let vector: PersistentVector<i32> = elements.iter().copied().collect();
        let index = position_seed % vector.len();
        let updated = vector.update(index, new_element).unwrap();

        prop_assert_eq!(updated.get(index), Some(&new_element));
        for other in (0..vector.len()).filter(|&other| other != index) {
            prop_assert_eq!(updated.get(other), vector.get(other));
        }
    }

    /// Fold of appends reads back in order.
    #[test]
    fn prop_round_trip(elements in prop::collection::vec(any::<i32>(), 0..200)) {
        let vector: PersistentVector<i32> = elements.iter().copied().collect();
        let collected: Vec<i32> = vector.iter().copied().collect();
        prop_assert_eq!(collected, elements);
    }

    /// Prefix law: `take(count)` agrees elementwise with the source.
    #[test]
    fn prop_take_prefix(
        elements in prop::collection::vec(any::<i32>(), 0..150),
        count_seed: usize
    ) {
        let vector: PersistentVector<i32> = elements.iter().copied().collect();
        let count = count_seed % (vector.len() + 1);
        let prefix = vector.take(count).unwrap();

        prop_assert_eq!(prefix.len(), count);
        for index in 0..count {
            prop_assert_eq!(prefix.get(index), vector.get(index));
        }
    }

    /// Suffix law: `take_last(count)` agrees elementwise with the source.
    #[test]
    fn prop_take_last_suffix(
        elements in prop::collection::vec(any::<i32>(), 0..150),
        count_seed: usize
    ) {
        let vector: PersistentVector<i32> = elements.iter().copied().collect();
        let count = count_seed % (vector.len() + 1);
        let suffix = vector.take_last(count).unwrap();

        prop_assert_eq!(suffix.len(), count);
        let skipped = vector.len() - count;
        for index in 0..count {
            prop_assert_eq!(suffix.get(index), vector.get(skipped + index));
        }
    }

    /// Slices of slices behave like direct slices.
    #[test]
    fn prop_slices_compose(
        elements in prop::collection::vec(any::<i32>(), 0..120),
        first_seed: usize,
        second_seed: usize
    ) {
        let vector: PersistentVector<i32> = elements.iter().copied().collect();
        let outer = first_seed % (vector.len() + 1);
        let suffix = vector.take_last(outer).unwrap();
        let inner = second_seed % (suffix.len() + 1);
        let middle = suffix.take(inner).unwrap();

        prop_assert_eq!(middle.len(), inner);
        let skipped = vector.len() - outer;
        for index in 0..inner {
            prop_assert_eq!(middle.get(index), vector.get(skipped + index));
        }
    }

    /// Popping from the front behaves like a queue.
    #[test]
    fn prop_pop_front_is_head(elements in prop::collection::vec(any::<i32>(), 1..100)) {
        let vector: PersistentVector<i32> = elements.iter().copied().collect();
        let (rest, element) = vector.pop_front().unwrap();

        prop_assert_eq!(element, elements[0]);
        prop_assert_eq!(rest.len(), elements.len() - 1);
        for (index, expected) in elements[1..].iter().enumerate() {
            prop_assert_eq!(rest.get(index), Some(expected));
        }
    }

    /// Equality is structural and implies equal hashes.
    #[test]
    fn prop_eq_implies_hash_eq(elements in prop::collection::vec(any::<i32>(), 0..100)) {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let left: PersistentVector<i32> = elements.iter().copied().collect();
        let right: PersistentVector<i32> = elements.iter().copied().collect();
        prop_assert_eq!(&left, &right);

        let mut left_hasher = DefaultHasher::new();
        left.hash(&mut left_hasher);
        let mut right_hasher = DefaultHasher::new();
        right.hash(&mut right_hasher);
        prop_assert_eq!(left_hasher.finish(), right_hasher.finish());
    }

    /// `iter` and `into_iter` agree.
    #[test]
    fn prop_owning_iteration_agrees(elements in prop::collection::vec(any::<i32>(), 0..100)) {
        let vector: PersistentVector<i32> = elements.iter().copied().collect();
        let borrowed: Vec<i32> = vector.iter().copied().collect();
        let owned: Vec<i32> = vector.into_iter().collect();
        prop_assert_eq!(borrowed, owned);
    }
}
