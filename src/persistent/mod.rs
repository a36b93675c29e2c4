//! Persistent (immutable) data structures.
//!
//! This module provides efficient immutable data structures that use
//! structural sharing to minimize copying:
//!
//! - [`PersistentVector`]: Persistent vector (32-ary radix tree with a tail
//!   buffer and a pruned-head offset)
//! - [`PersistentHashMap`]: Persistent hash map (HAMT)
//! - [`PersistentStack`]: Persistent singly-linked stack
//!
//! # Structural Sharing
//!
//! All data structures in this module use structural sharing: operations like
//! appending, updating, or slicing create new versions that share untouched
//! interior nodes with the source. Only the spine along the modification path
//! is copied, so every prior version stays valid and cheap to keep around.
//!
//! # Examples
//!
//! ## `PersistentVector`
//!
//! ```rust
//! use keepsake::persistent::PersistentVector;
//!
//! let vector: PersistentVector<i32> = (0..100).collect();
//! assert_eq!(vector.get(50), Some(&50));
//!
//! // Structural sharing: the original vector is preserved
//! let updated = vector.update(50, 999).unwrap();
//! assert_eq!(vector.get(50), Some(&50));     // Original unchanged
//! assert_eq!(updated.get(50), Some(&999));   // New version
//!
//! // Slicing prunes the tree instead of copying elements
//! let prefix = vector.take(10).unwrap();
//! let suffix = vector.take_last(10).unwrap();
//! assert_eq!(prefix.len(), 10);
//! assert_eq!(suffix.get(0), Some(&90));
//! ```
//!
//! ## `PersistentHashMap`
//!
//! ```rust
//! use keepsake::persistent::PersistentHashMap;
//!
//! let map = PersistentHashMap::new()
//!     .insert("one".to_string(), 1)
//!     .insert("two".to_string(), 2);
//! assert_eq!(map.get("one"), Some(&1));
//!
//! // Structural sharing: the original map is preserved
//! let updated = map.insert("one".to_string(), 100);
//! assert_eq!(map.get("one"), Some(&1));       // Original unchanged
//! assert_eq!(updated.get("one"), Some(&100)); // New version
//! ```
//!
//! ## `PersistentStack`
//!
//! ```rust
//! use keepsake::persistent::PersistentStack;
//!
//! let stack = PersistentStack::new().push(3).push(2).push(1);
//! assert_eq!(stack.peek(), Some(&1));
//!
//! // Structural sharing: the original stack is preserved
//! let popped = stack.pop().unwrap();
//! assert_eq!(stack.len(), 3);  // Original unchanged
//! assert_eq!(popped.len(), 2); // New stack
//! ```

// =============================================================================
// Reference Counter Type Alias
// =============================================================================

/// Reference-counted smart pointer type.
///
/// When the `arc` feature is enabled, this is `std::sync::Arc`,
/// which is thread-safe but has slightly higher overhead.
///
/// When the `arc` feature is disabled (default), this is `std::rc::Rc`,
/// which is faster but not thread-safe.
#[cfg(feature = "arc")]
pub(crate) type ReferenceCounter<T> = std::sync::Arc<T>;

#[cfg(not(feature = "arc"))]
pub(crate) type ReferenceCounter<T> = std::rc::Rc<T>;

mod hashmap;
mod stack;
mod vector;

pub use hashmap::PersistentHashMap;
pub use hashmap::PersistentHashMapIntoIterator;
pub use hashmap::PersistentHashMapIterator;
pub use stack::PersistentStack;
pub use stack::PersistentStackIntoIterator;
pub use stack::PersistentStackIterator;
pub use vector::CapacityError;
pub use vector::PersistentVector;
pub use vector::PersistentVectorIntoIterator;
pub use vector::PersistentVectorIterator;

// =============================================================================
// Tests
// =============================================================================
