//! # keepsake
//!
//! Persistent (immutable) collections with structural sharing.
//!
//! ## Overview
//!
//! Every "mutator" in this crate returns a new logical collection that shares
//! structure with the prior version instead of modifying it in place. All
//! earlier versions remain valid and observable:
//!
//! - [`PersistentVector`](persistent::PersistentVector): an indexed sequence
//!   backed by a 32-ary radix tree with a tail buffer, supporting effectively
//!   O(1) append, random access, update, and prefix/suffix slicing.
//! - [`PersistentHashMap`](persistent::PersistentHashMap): a keyed container
//!   backed by a Hash Array Mapped Trie, supporting effectively O(1) insert,
//!   lookup, and removal.
//! - [`PersistentStack`](persistent::PersistentStack): a singly-linked list
//!   with O(1) push, pop, and peek at the head.
//!
//! ## Feature Flags
//!
//! - `arc`: use `Arc` instead of `Rc` internally, making the collections
//!   shareable across threads for element types that allow it
//! - `serde`: `Serialize`/`Deserialize` implementations for all collections
//!
//! ## Example
//!
//! ```rust
//! use keepsake::persistent::PersistentVector;
//!
//! let vector: PersistentVector<i32> = (0..100).collect();
//! let updated = vector.update(50, 999).unwrap();
//!
//! assert_eq!(vector.get(50), Some(&50));   // Original unchanged
//! assert_eq!(updated.get(50), Some(&999)); // New version
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod persistent;

/// Prelude module for convenient imports.
///
/// Re-exports commonly used types.
///
/// # Usage
///
/// ```rust
/// use keepsake::prelude::*;
/// ```
pub mod prelude {
    pub use crate::persistent::*;
}
