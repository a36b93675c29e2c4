//! Persistent (immutable) hash map based on a HAMT.
//!
//! This module provides [`PersistentHashMap`], an immutable hash map
//! that uses structural sharing for efficient operations.
//!
//! # Overview
//!
//! `PersistentHashMap` is a Hash Array Mapped Trie: a 32-way branching trie
//! keyed by successive 5-bit slices of a 32-bit key hash, taken from the
//! least significant end. With 32 slots per node the trie is at most 7
//! levels deep, yielding effectively-constant access time; modifications
//! copy only the nodes on the path from the root to the slot of interest.
//!
//! - O(log32 N) get (effectively O(1) for practical sizes)
//! - O(log32 N) insert
//! - O(log32 N) remove
//! - O(1) len and `is_empty`
//!
//! All operations return new maps without modifying the original,
//! and structural sharing ensures memory efficiency.
//!
//! # Internal Structure
//!
//! Nodes come in three shapes:
//!
//! - **Sparse**: a 32-bit bitmap plus a packed array holding only the
//!   occupied slots; the physical position of a slot is the number of
//!   lower-order bits set in the bitmap.
//! - **Full**: once a node holds more than 16 slots the bitmap bookkeeping
//!   stops paying for itself and the node is stored as a flat 32-slot
//!   array, directly indexed by the hash slice. A node that shrinks back
//!   to 8 slots deflates to sparse again.
//! - **Collision**: a leaf holding two or more entries whose keys share a
//!   full 32-bit hash; lookups scan it linearly.
//!
//! # Examples
//!
//! ```rust
//! use keepsake::persistent::PersistentHashMap;
//!
//! let map = PersistentHashMap::new()
//!     .insert("one".to_string(), 1)
//!     .insert("two".to_string(), 2)
//!     .insert("three".to_string(), 3);
//!
//! assert_eq!(map.get("one"), Some(&1));
//! assert_eq!(map.get("two"), Some(&2));
//!
//! // Structural sharing: the original map is preserved
//! let updated = map.insert("one".to_string(), 100);
//! assert_eq!(map.get("one"), Some(&1));       // Original unchanged
//! assert_eq!(updated.get("one"), Some(&100)); // New version
//! ```

use std::borrow::Borrow;
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::iter::FromIterator;

use super::ReferenceCounter;

// =============================================================================
// Constants
// =============================================================================

/// Branching factor (2^5 = 32)
const BRANCHING_FACTOR: usize = 32;

/// Bits per level in the trie
const BITS_PER_LEVEL: usize = 5;

/// Bit mask for extracting an index within a node
const MASK: u32 = (BRANCHING_FACTOR - 1) as u32;

/// A sparse node holding this many slots inflates to a full node on the
/// next insert.
const SPARSE_CAPACITY: usize = 16;

/// A full node holding this many slots (or fewer) deflates back to a
/// sparse node on the next remove.
const DEFLATE_THRESHOLD: usize = 8;

// =============================================================================
// Hash computation
// =============================================================================

/// Computes the 32-bit trie key for `key` using `DefaultHasher`.
#[allow(clippy::cast_possible_truncation)]
fn compute_hash<K: Hash + ?Sized>(key: &K) -> u32 {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    // The trie keys on the low 32 bits of the hash.
    hasher.finish() as u32
}

/// Slices out the 5 bits of `hash` addressing a slot at the given level.
/// `level` is a bit position: 0 for the root, 5 one level down, and so on.
const fn hash_index(hash: u32, level: usize) -> usize {
    ((hash >> level) & MASK) as usize
}

/// Physical position of `bit` within a packed array indexed by `bitmap`.
const fn packed_index(bitmap: u32, bit: u32) -> usize {
    (bitmap & (bit - 1)).count_ones() as usize
}

// =============================================================================
// Node Definition
// =============================================================================

/// An occupied slot in a Sparse or Full node: either a bare entry or a
/// child node one level down.
#[derive(Clone)]
enum Slot<K, V> {
    /// A key-value entry
    Entry(K, V),
    /// A sub-node
    Child(ReferenceCounter<Node<K, V>>),
}

/// Internal node structure for the HAMT.
#[derive(Clone)]
enum Node<K, V> {
    /// Bitmap-indexed node with a packed slot array (1 to 16 slots)
    Sparse {
        /// Bitmap indicating which virtual slots are occupied
        bitmap: u32,
        /// Occupied slots, packed in virtual-index order
        slots: ReferenceCounter<[Slot<K, V>]>,
    },
    /// Flat 32-slot node used once occupancy makes the bitmap pointless
    Full {
        /// All 32 virtual slots, directly indexed
        slots: ReferenceCounter<[Option<Slot<K, V>>]>,
        /// Number of occupied slots
        count: usize,
    },
    /// Leaf holding entries whose keys share a full 32-bit hash
    Collision {
        /// The hash shared by every key in this node
        hash: u32,
        /// The colliding entries; always two or more, keys pairwise unequal
        entries: ReferenceCounter<[(K, V)]>,
    },
}

/// Outcome of removing a key from a node.
enum Removal<K, V> {
    /// The key was not present; the node is unchanged.
    Unchanged,
    /// The node's last entry was removed and the node disappears.
    Gone,
    /// A copy of the node with the entry removed.
    Replaced(Node<K, V>),
    /// A collision node shrank to one entry, which the parent absorbs as a
    /// bare slot.
    Collapsed(K, V),
}

/// Builds the smallest node distinguishing two entries, starting at the
/// given level. Equal hashes produce a collision leaf; otherwise a chain of
/// single-slot sparse nodes descends to the first level where the hash
/// slices diverge.
fn join_entries<K: Hash, V>(
    level: usize,
    existing_key: K,
    existing_value: V,
    hash: u32,
    key: K,
    value: V,
) -> Node<K, V> {
    let existing_hash = compute_hash(&existing_key);

    if existing_hash == hash {
        return Node::Collision {
            hash,
            entries: ReferenceCounter::from(vec![(existing_key, existing_value), (key, value)]),
        };
    }

    let existing_index = hash_index(existing_hash, level);
    let new_index = hash_index(hash, level);

    if existing_index == new_index {
        // Same slice at this level; distinguish one level down.
        let child = join_entries(
            level + BITS_PER_LEVEL,
            existing_key,
            existing_value,
            hash,
            key,
            value,
        );
        return Node::Sparse {
            bitmap: 1 << existing_index,
            slots: ReferenceCounter::from(vec![Slot::Child(ReferenceCounter::new(child))]),
        };
    }

    let bitmap = (1 << existing_index) | (1 << new_index);
    let slots = if existing_index < new_index {
        vec![
            Slot::Entry(existing_key, existing_value),
            Slot::Entry(key, value),
        ]
    } else {
        vec![
            Slot::Entry(key, value),
            Slot::Entry(existing_key, existing_value),
        ]
    };
    Node::Sparse {
        bitmap,
        slots: ReferenceCounter::from(slots),
    }
}

impl<K, V> Node<K, V> {
    /// Gets the slot at the given virtual index.
    ///
    /// Collision nodes are not slot-addressed and always answer `None`; the
    /// dispatching operations match them out beforehand.
    fn slot(&self, index: usize) -> Option<&Slot<K, V>> {
        match self {
            Self::Sparse { bitmap, slots } => {
                let bit = 1u32 << index;
                if bitmap & bit == 0 {
                    None
                } else {
                    slots.get(packed_index(*bitmap, bit))
                }
            }
            Self::Full { slots, .. } => slots.get(index)?.as_ref(),
            Self::Collision { .. } => None,
        }
    }

    /// Looks up the value for `key`, whose hash is `hash`, descending from
    /// this node at the given level.
    fn lookup<'a, Q>(&'a self, hash: u32, level: usize, key: &Q) -> Option<&'a V>
    where
        K: Borrow<Q>,
        Q: Eq + ?Sized,
    {
        if let Self::Collision {
            hash: collision_hash,
            entries,
        } = self
        {
            if hash != *collision_hash {
                return None;
            }
            return entries
                .iter()
                .find(|(entry_key, _)| entry_key.borrow() == key)
                .map(|(_, value)| value);
        }

        match self.slot(hash_index(hash, level)) {
            None => None,
            Some(Slot::Entry(entry_key, value)) => {
                if entry_key.borrow() == key {
                    Some(value)
                } else {
                    None
                }
            }
            Some(Slot::Child(child)) => child.lookup(hash, level + BITS_PER_LEVEL, key),
        }
    }
}

impl<K: Clone, V: Clone> Node<K, V> {
    /// Returns a copy of this node with the slot at the given virtual index
    /// overwritten.
    fn with_slot(&self, index: usize, slot: Slot<K, V>) -> Self {
        match self {
            Self::Sparse { bitmap, slots } => {
                let bit = 1u32 << index;
                let mut new_slots = slots.to_vec();
                new_slots[packed_index(*bitmap, bit)] = slot;
                Self::Sparse {
                    bitmap: *bitmap,
                    slots: ReferenceCounter::from(new_slots),
                }
            }
            Self::Full { slots, count } => {
                let mut new_slots = slots.to_vec();
                new_slots[index] = Some(slot);
                Self::Full {
                    slots: ReferenceCounter::from(new_slots),
                    count: *count,
                }
            }
            // Not reachable: collision nodes are not slot-addressed.
            Self::Collision { .. } => self.clone(),
        }
    }

    /// Returns a copy of this node with a new entry inserted at the given
    /// (vacant) virtual index, inflating from sparse to full when the
    /// packed array is at capacity.
    fn insert_slot(&self, hash: u32, level: usize, index: usize, key: K, value: V) -> Self {
        match self {
            Self::Sparse { bitmap, slots } => {
                if slots.len() >= SPARSE_CAPACITY {
                    return inflate(*bitmap, slots, hash, level, key, value);
                }

                let bit = 1u32 << index;
                let position = packed_index(*bitmap, bit);
                let mut new_slots = slots.to_vec();
                new_slots.insert(position, Slot::Entry(key, value));
                Self::Sparse {
                    bitmap: bitmap | bit,
                    slots: ReferenceCounter::from(new_slots),
                }
            }
            Self::Full { slots, count } => {
                let mut new_slots = slots.to_vec();
                new_slots[index] = Some(Slot::Entry(key, value));
                Self::Full {
                    slots: ReferenceCounter::from(new_slots),
                    count: count + 1,
                }
            }
            // Not reachable: collision nodes are not slot-addressed.
            Self::Collision { .. } => self.clone(),
        }
    }

    /// Returns a copy of this node with the slot at the given virtual index
    /// removed. Answers `None` when that was the last slot; a full node at
    /// the deflate threshold shrinks back to sparse.
    fn without_slot(&self, index: usize) -> Option<Self> {
        match self {
            Self::Sparse { bitmap, slots } => {
                if slots.len() == 1 {
                    return None;
                }
                let bit = 1u32 << index;
                let position = packed_index(*bitmap, bit);
                let mut new_slots = slots.to_vec();
                new_slots.remove(position);
                Some(Self::Sparse {
                    bitmap: bitmap & !bit,
                    slots: ReferenceCounter::from(new_slots),
                })
            }
            Self::Full { slots, count } => {
                if *count <= DEFLATE_THRESHOLD {
                    return Some(deflate(slots, index));
                }
                let mut new_slots = slots.to_vec();
                new_slots[index] = None;
                Some(Self::Full {
                    slots: ReferenceCounter::from(new_slots),
                    count: count - 1,
                })
            }
            // Not reachable: collision nodes are not slot-addressed.
            Self::Collision { .. } => Some(self.clone()),
        }
    }

    /// Removes `key` (with hash `hash`) from the subtree rooted here.
    fn removed<Q>(&self, hash: u32, level: usize, key: &Q) -> Removal<K, V>
    where
        K: Borrow<Q>,
        Q: Eq + ?Sized,
    {
        if let Self::Collision {
            hash: collision_hash,
            entries,
        } = self
        {
            if hash != *collision_hash {
                return Removal::Unchanged;
            }
            let Some(position) = entries
                .iter()
                .position(|(entry_key, _)| entry_key.borrow() == key)
            else {
                return Removal::Unchanged;
            };
            return match entries.len() {
                // A collision node always holds two or more entries.
                0 | 1 => Removal::Gone,
                2 => {
                    let (survivor_key, survivor_value) = entries[1 - position].clone();
                    Removal::Collapsed(survivor_key, survivor_value)
                }
                _ => {
                    let mut new_entries = entries.to_vec();
                    new_entries.remove(position);
                    Removal::Replaced(Self::Collision {
                        hash: *collision_hash,
                        entries: ReferenceCounter::from(new_entries),
                    })
                }
            };
        }

        let index = hash_index(hash, level);
        match self.slot(index) {
            None => Removal::Unchanged,
            Some(Slot::Entry(entry_key, _)) => {
                if entry_key.borrow() == key {
                    match self.without_slot(index) {
                        None => Removal::Gone,
                        Some(node) => Removal::Replaced(node),
                    }
                } else {
                    Removal::Unchanged
                }
            }
            Some(Slot::Child(child)) => match child.removed(hash, level + BITS_PER_LEVEL, key) {
                Removal::Unchanged => Removal::Unchanged,
                Removal::Gone => match self.without_slot(index) {
                    None => Removal::Gone,
                    Some(node) => Removal::Replaced(node),
                },
                Removal::Replaced(new_child) => Removal::Replaced(
                    self.with_slot(index, Slot::Child(ReferenceCounter::new(new_child))),
                ),
                Removal::Collapsed(survivor_key, survivor_value) => Removal::Replaced(
                    self.with_slot(index, Slot::Entry(survivor_key, survivor_value)),
                ),
            },
        }
    }
}

impl<K: Hash + Eq + Clone, V: Clone + PartialEq> Node<K, V> {
    /// Inserts `key`/`value` (with hash `hash`) into the subtree rooted
    /// here.
    ///
    /// Answers `None` when the map already holds a structurally identical
    /// entry, so callers can share the existing structure. Otherwise the
    /// boolean reports whether the key is new.
    fn inserted(&self, hash: u32, level: usize, key: K, value: V) -> Option<(Self, bool)> {
        if let Self::Collision {
            hash: collision_hash,
            entries,
        } = self
        {
            return self.collision_inserted(*collision_hash, entries, hash, level, key, value);
        }

        let index = hash_index(hash, level);
        match self.slot(index) {
            None => Some((self.insert_slot(hash, level, index, key, value), true)),
            Some(Slot::Entry(existing_key, existing_value)) => {
                if *existing_key == key {
                    if *existing_value == value {
                        // The new entry is fully equivalent, don't bother.
                        None
                    } else {
                        Some((self.with_slot(index, Slot::Entry(key, value)), false))
                    }
                } else {
                    // Two distinct keys share this slice; grow a deeper node
                    // that tells them apart.
                    let joined = join_entries(
                        level + BITS_PER_LEVEL,
                        existing_key.clone(),
                        existing_value.clone(),
                        hash,
                        key,
                        value,
                    );
                    Some((
                        self.with_slot(index, Slot::Child(ReferenceCounter::new(joined))),
                        true,
                    ))
                }
            }
            Some(Slot::Child(child)) => {
                let (new_child, added) = child.inserted(hash, level + BITS_PER_LEVEL, key, value)?;
                Some((
                    self.with_slot(index, Slot::Child(ReferenceCounter::new(new_child))),
                    added,
                ))
            }
        }
    }

    /// Insert dispatch for collision nodes.
    fn collision_inserted(
        &self,
        collision_hash: u32,
        entries: &ReferenceCounter<[(K, V)]>,
        hash: u32,
        level: usize,
        key: K,
        value: V,
    ) -> Option<(Self, bool)> {
        if hash != collision_hash {
            // The new key does not collide: re-seat this node under a
            // sparse wrapper and dispatch the insert against that.
            let index = hash_index(collision_hash, level);
            let wrapper = Self::Sparse {
                bitmap: 1 << index,
                slots: ReferenceCounter::from(vec![Slot::Child(ReferenceCounter::new(
                    self.clone(),
                ))]),
            };
            return wrapper.inserted(hash, level, key, value);
        }

        for (position, (entry_key, entry_value)) in entries.iter().enumerate() {
            if *entry_key == key {
                if *entry_value == value {
                    return None;
                }
                let mut new_entries = entries.to_vec();
                new_entries[position] = (key, value);
                return Some((
                    Self::Collision {
                        hash: collision_hash,
                        entries: ReferenceCounter::from(new_entries),
                    },
                    false,
                ));
            }
        }

        let mut new_entries = entries.to_vec();
        new_entries.push((key, value));
        Some((
            Self::Collision {
                hash: collision_hash,
                entries: ReferenceCounter::from(new_entries),
            },
            true,
        ))
    }
}

/// Inflates a sparse node into a full node, inserting the new entry at its
/// virtual index while scattering the packed slots into theirs.
fn inflate<K: Clone, V: Clone>(
    bitmap: u32,
    slots: &[Slot<K, V>],
    hash: u32,
    level: usize,
    key: K,
    value: V,
) -> Node<K, V> {
    let mut scattered: Vec<Option<Slot<K, V>>> = vec![None; BRANCHING_FACTOR];
    scattered[hash_index(hash, level)] = Some(Slot::Entry(key, value));

    let mut packed = slots.iter();
    for (index, scattered_slot) in scattered.iter_mut().enumerate() {
        if bitmap & (1 << index) != 0 {
            if let Some(slot) = packed.next() {
                *scattered_slot = Some(slot.clone());
            }
        }
    }

    Node::Full {
        slots: ReferenceCounter::from(scattered),
        count: slots.len() + 1,
    }
}

/// Deflates a full node back into a sparse node, dropping the slot at
/// `removed` and recomputing the bitmap over the remaining slots.
fn deflate<K: Clone, V: Clone>(slots: &[Option<Slot<K, V>>], removed: usize) -> Node<K, V> {
    let mut bitmap = 0u32;
    let mut packed = Vec::new();

    for (index, slot) in slots.iter().enumerate() {
        if index == removed {
            continue;
        }
        if let Some(slot) = slot {
            bitmap |= 1 << index;
            packed.push(slot.clone());
        }
    }

    Node::Sparse {
        bitmap,
        slots: ReferenceCounter::from(packed),
    }
}

// =============================================================================
// PersistentHashMap Definition
// =============================================================================

/// A persistent (immutable) hash map based on a Hash Array Mapped Trie.
///
/// `PersistentHashMap` is an immutable data structure that uses structural
/// sharing to efficiently support functional programming patterns.
///
/// Iteration order depends on the current trie shape and is not a stable
/// contract across versions of a map.
///
/// # Time Complexity
///
/// | Operation      | Complexity        |
/// |----------------|-------------------|
/// | `new`          | O(1)              |
/// | `get`          | O(log32 N)        |
/// | `insert`       | O(log32 N)        |
/// | `remove`       | O(log32 N)        |
/// | `contains_key` | O(log32 N)        |
/// | `len`          | O(1)              |
/// | `is_empty`     | O(1)              |
///
/// # Examples
///
/// ```rust
/// use keepsake::persistent::PersistentHashMap;
///
/// let map = PersistentHashMap::singleton("key".to_string(), 42);
/// assert_eq!(map.get("key"), Some(&42));
/// ```
#[derive(Clone)]
pub struct PersistentHashMap<K, V> {
    /// Root node of the trie, absent for the empty map.
    root: Option<ReferenceCounter<Node<K, V>>>,
    /// Number of entries.
    length: usize,
}

impl<K, V> PersistentHashMap<K, V> {
    /// Creates a new empty map.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use keepsake::persistent::PersistentHashMap;
    ///
    /// let map: PersistentHashMap<String, i32> = PersistentHashMap::new();
    /// assert!(map.is_empty());
    /// ```
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            root: None,
            length: 0,
        }
    }

    /// Returns the number of entries in the map.
    ///
    /// # Complexity
    ///
    /// O(1)
    ///
    /// # Examples
    ///
    /// ```rust
    /// use keepsake::persistent::PersistentHashMap;
    ///
    /// let map = PersistentHashMap::new()
    ///     .insert("a".to_string(), 1)
    ///     .insert("b".to_string(), 2);
    /// assert_eq!(map.len(), 2);
    /// ```
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.length
    }

    /// Returns `true` if the map contains no entries.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use keepsake::persistent::PersistentHashMap;
    ///
    /// let empty: PersistentHashMap<String, i32> = PersistentHashMap::new();
    /// assert!(empty.is_empty());
    /// ```
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Returns an iterator over key-value pairs, in trie order.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use keepsake::persistent::PersistentHashMap;
    ///
    /// let map = PersistentHashMap::new()
    ///     .insert("a".to_string(), 1)
    ///     .insert("b".to_string(), 2);
    ///
    /// let mut total = 0;
    /// for (_, value) in map.iter() {
    ///     total += value;
    /// }
    /// assert_eq!(total, 3);
    /// ```
    #[must_use]
    pub fn iter(&self) -> PersistentHashMapIterator<'_, K, V> {
        let stack = match self.root.as_deref() {
            Some(root) => vec![(root, 0)],
            None => Vec::new(),
        };
        PersistentHashMapIterator {
            stack,
            remaining: self.length,
        }
    }

    /// Returns an iterator over the keys of the map.
    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.iter().map(|(key, _)| key)
    }

    /// Returns an iterator over the values of the map.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use keepsake::persistent::PersistentHashMap;
    ///
    /// let map = PersistentHashMap::new()
    ///     .insert("a".to_string(), 1)
    ///     .insert("b".to_string(), 2);
    ///
    /// let sum: i32 = map.values().sum();
    /// assert_eq!(sum, 3);
    /// ```
    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.iter().map(|(_, value)| value)
    }

    /// Returns `true` if `self` and `other` share their backing structure,
    /// which implies they are equal.
    ///
    /// Re-inserting an entry that is already present and removing an absent
    /// key both return maps that share the original root, so this check
    /// observes those shortcuts.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        self.length == other.length
            && match (&self.root, &other.root) {
                (None, None) => true,
                (Some(left), Some(right)) => ReferenceCounter::ptr_eq(left, right),
                _ => false,
            }
    }
}

impl<K: Hash + Eq, V> PersistentHashMap<K, V> {
    /// Returns a reference to the value corresponding to the key.
    ///
    /// The key may be any borrowed form of the map's key type, but `Hash`
    /// and `Eq` on the borrowed form must match those for the key type.
    ///
    /// # Complexity
    ///
    /// O(log32 N)
    ///
    /// # Examples
    ///
    /// ```rust
    /// use keepsake::persistent::PersistentHashMap;
    ///
    /// let map = PersistentHashMap::new().insert("hello".to_string(), 42);
    ///
    /// // Can use &str to look up String keys
    /// assert_eq!(map.get("hello"), Some(&42));
    /// assert_eq!(map.get("world"), None);
    /// ```
    #[must_use]
    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let root = self.root.as_deref()?;
        root.lookup(compute_hash(key), 0, key)
    }

    /// Returns `true` if the map contains a value for the specified key.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use keepsake::persistent::PersistentHashMap;
    ///
    /// let map = PersistentHashMap::new().insert("key".to_string(), 42);
    ///
    /// assert!(map.contains_key("key"));
    /// assert!(!map.contains_key("other"));
    /// ```
    #[must_use]
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.get(key).is_some()
    }
}

impl<K: Hash + Eq + Clone, V: Clone> PersistentHashMap<K, V> {
    /// Removes a key from the map, returning a new map without it.
    ///
    /// If the key is not present, the returned map shares the original's
    /// entire structure (see [`ptr_eq`](Self::ptr_eq)).
    ///
    /// # Complexity
    ///
    /// O(log32 N)
    ///
    /// # Examples
    ///
    /// ```rust
    /// use keepsake::persistent::PersistentHashMap;
    ///
    /// let map = PersistentHashMap::new()
    ///     .insert("a".to_string(), 1)
    ///     .insert("b".to_string(), 2);
    /// let removed = map.remove("a");
    ///
    /// assert_eq!(map.len(), 2);     // Original unchanged
    /// assert_eq!(removed.len(), 1); // New version
    /// assert_eq!(removed.get("a"), None);
    /// ```
    #[must_use]
    pub fn remove<Q>(&self, key: &Q) -> Self
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let Some(root) = &self.root else {
            return self.clone();
        };

        match root.removed(compute_hash(key), 0, key) {
            Removal::Unchanged => self.clone(),
            Removal::Gone => Self {
                root: None,
                length: self.length.saturating_sub(1),
            },
            Removal::Replaced(node) => Self {
                root: Some(ReferenceCounter::new(node)),
                length: self.length.saturating_sub(1),
            },
            Removal::Collapsed(survivor_key, survivor_value) => {
                // A collision node never sits at the root, but re-seat the
                // survivor under a fresh sparse node all the same.
                let survivor_hash = compute_hash(&survivor_key);
                let node = Node::Sparse {
                    bitmap: 1 << hash_index(survivor_hash, 0),
                    slots: ReferenceCounter::from(vec![Slot::Entry(survivor_key, survivor_value)]),
                };
                Self {
                    root: Some(ReferenceCounter::new(node)),
                    length: self.length.saturating_sub(1),
                }
            }
        }
    }
}

impl<K: Hash + Eq + Clone, V: Clone + PartialEq> PersistentHashMap<K, V> {
    /// Creates a map containing a single key-value pair.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use keepsake::persistent::PersistentHashMap;
    ///
    /// let map = PersistentHashMap::singleton("key".to_string(), 42);
    /// assert_eq!(map.len(), 1);
    /// ```
    #[inline]
    #[must_use]
    pub fn singleton(key: K, value: V) -> Self {
        Self::new().insert(key, value)
    }

    /// Inserts a key-value pair into the map, returning a new map.
    ///
    /// If the map already contains the key, the value is replaced. If the
    /// stored entry is structurally identical (equal key and equal value),
    /// the returned map shares the original's entire structure (see
    /// [`ptr_eq`](Self::ptr_eq)).
    ///
    /// # Complexity
    ///
    /// O(log32 N)
    ///
    /// # Examples
    ///
    /// ```rust
    /// use keepsake::persistent::PersistentHashMap;
    ///
    /// let map1 = PersistentHashMap::new().insert("key".to_string(), 1);
    /// let map2 = map1.insert("key".to_string(), 2);
    ///
    /// assert_eq!(map1.get("key"), Some(&1)); // Original unchanged
    /// assert_eq!(map2.get("key"), Some(&2)); // New version
    /// ```
    #[must_use]
    pub fn insert(&self, key: K, value: V) -> Self {
        let hash = compute_hash(&key);

        let result = match self.root.as_deref() {
            Some(root) => root.inserted(hash, 0, key, value),
            None => {
                let empty = Node::Sparse {
                    bitmap: 0,
                    slots: ReferenceCounter::from(Vec::new()),
                };
                empty.inserted(hash, 0, key, value)
            }
        };

        match result {
            // Structurally unchanged: share everything.
            None => self.clone(),
            Some((new_root, added)) => Self {
                root: Some(ReferenceCounter::new(new_root)),
                length: self.length + usize::from(added),
            },
        }
    }

    /// Merges two maps, with entries from `other` taking precedence on key
    /// conflicts.
    ///
    /// # Complexity
    ///
    /// O(M log32 N) where M is the size of `other`
    ///
    /// # Examples
    ///
    /// ```rust
    /// use keepsake::persistent::PersistentHashMap;
    ///
    /// let left = PersistentHashMap::new()
    ///     .insert("a".to_string(), 1)
    ///     .insert("b".to_string(), 2);
    /// let right = PersistentHashMap::new()
    ///     .insert("b".to_string(), 20)
    ///     .insert("c".to_string(), 3);
    ///
    /// let merged = left.merge(&right);
    ///
    /// assert_eq!(merged.get("a"), Some(&1));
    /// assert_eq!(merged.get("b"), Some(&20)); // From right
    /// assert_eq!(merged.get("c"), Some(&3));
    /// ```
    #[must_use]
    pub fn merge(&self, other: &Self) -> Self {
        let mut result = self.clone();
        for (key, value) in other.iter() {
            result = result.insert(key.clone(), value.clone());
        }
        result
    }
}

// =============================================================================
// Iterator Implementation
// =============================================================================

/// What the cursor loop decided to do with the top of the stack.
enum Step<'a, K, V> {
    Yield(&'a K, &'a V),
    Descend(&'a Node<K, V>),
    Ascend,
}

/// An iterator over key-value pairs of a [`PersistentHashMap`].
///
/// Walks the trie depth-first with an explicit cursor stack; child nodes
/// are visited in place of the slot they occupy.
pub struct PersistentHashMapIterator<'a, K, V> {
    /// Nodes on the path from the root, each with the next slot to visit.
    stack: Vec<(&'a Node<K, V>, usize)>,
    remaining: usize,
}

impl<'a, K, V> Iterator for PersistentHashMapIterator<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let step = {
                let (node, position) = self.stack.last_mut()?;
                let node: &'a Node<K, V> = *node;
                match node {
                    Node::Sparse { slots, .. } => {
                        if *position < slots.len() {
                            let current = &slots[*position];
                            *position += 1;
                            match current {
                                Slot::Entry(key, value) => Step::Yield(key, value),
                                Slot::Child(child) => Step::Descend(child),
                            }
                        } else {
                            Step::Ascend
                        }
                    }
                    Node::Full { slots, .. } => {
                        let mut step = Step::Ascend;
                        while *position < slots.len() {
                            let current = *position;
                            *position += 1;
                            if let Some(slot) = &slots[current] {
                                step = match slot {
                                    Slot::Entry(key, value) => Step::Yield(key, value),
                                    Slot::Child(child) => Step::Descend(child),
                                };
                                break;
                            }
                        }
                        step
                    }
                    Node::Collision { entries, .. } => {
                        if *position < entries.len() {
                            let (key, value) = &entries[*position];
                            *position += 1;
                            Step::Yield(key, value)
                        } else {
                            Step::Ascend
                        }
                    }
                }
            };

            match step {
                Step::Yield(key, value) => {
                    self.remaining = self.remaining.saturating_sub(1);
                    return Some((key, value));
                }
                Step::Descend(child) => self.stack.push((child, 0)),
                Step::Ascend => {
                    self.stack.pop();
                }
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K, V> ExactSizeIterator for PersistentHashMapIterator<'_, K, V> {
    fn len(&self) -> usize {
        self.remaining
    }
}

/// An owning iterator over key-value pairs of a [`PersistentHashMap`].
pub struct PersistentHashMapIntoIterator<K, V> {
    entries: Vec<(K, V)>,
    current_index: usize,
}

impl<K: Clone, V: Clone> Iterator for PersistentHashMapIntoIterator<K, V> {
    type Item = (K, V);

    fn next(&mut self) -> Option<Self::Item> {
        if self.current_index >= self.entries.len() {
            None
        } else {
            let entry = self.entries[self.current_index].clone();
            self.current_index += 1;
            Some(entry)
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.entries.len().saturating_sub(self.current_index);
        (remaining, Some(remaining))
    }
}

impl<K: Clone, V: Clone> ExactSizeIterator for PersistentHashMapIntoIterator<K, V> {
    fn len(&self) -> usize {
        self.entries.len().saturating_sub(self.current_index)
    }
}

// =============================================================================
// Standard Trait Implementations
// =============================================================================

impl<K, V> Default for PersistentHashMap<K, V> {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Hash + Eq + Clone, V: Clone + PartialEq> FromIterator<(K, V)> for PersistentHashMap<K, V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (key, value) in iter {
            map = map.insert(key, value);
        }
        map
    }
}

impl<K: Clone, V: Clone> IntoIterator for PersistentHashMap<K, V> {
    type Item = (K, V);
    type IntoIter = PersistentHashMapIntoIterator<K, V>;

    fn into_iter(self) -> Self::IntoIter {
        let entries: Vec<(K, V)> = self
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        PersistentHashMapIntoIterator {
            entries,
            current_index: 0,
        }
    }
}

impl<'a, K, V> IntoIterator for &'a PersistentHashMap<K, V> {
    type Item = (&'a K, &'a V);
    type IntoIter = PersistentHashMapIterator<'a, K, V>;

    #[inline]
    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<K: Hash + Eq, V: PartialEq> PartialEq for PersistentHashMap<K, V> {
    fn eq(&self, other: &Self) -> bool {
        if self.length != other.length {
            return false;
        }
        self.iter()
            .all(|(key, value)| other.get(key) == Some(value))
    }
}

impl<K: Hash + Eq, V: Eq> Eq for PersistentHashMap<K, V> {}

impl<K: Hash, V: Hash> Hash for PersistentHashMap<K, V> {
    /// Order-independent hash: equal maps may differ in trie shape and so
    /// in iteration order, so each entry is digested separately and the
    /// digests are summed.
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_usize(self.length);
        let mut digest: u64 = 0;
        for (key, value) in self.iter() {
            let mut key_hasher = DefaultHasher::new();
            key.hash(&mut key_hasher);
            let mut value_hasher = DefaultHasher::new();
            value.hash(&mut value_hasher);
            digest = digest.wrapping_add(key_hasher.finish() ^ value_hasher.finish());
        }
        state.write_u64(digest);
    }
}

impl<K: fmt::Debug, V: fmt::Debug> fmt::Debug for PersistentHashMap<K, V> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.debug_map().entries(self.iter()).finish()
    }
}

impl<K: fmt::Display, V: fmt::Display> fmt::Display for PersistentHashMap<K, V> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{{")?;
        let mut first = true;
        for (key, value) in self.iter() {
            if first {
                first = false;
            } else {
                write!(formatter, ", ")?;
            }
            write!(formatter, "{key}={value}")?;
        }
        write!(formatter, "}}")
    }
}

// =============================================================================
// Serde Support
// =============================================================================

#[cfg(feature = "serde")]
impl<K, V> serde::Serialize for PersistentHashMap<K, V>
where
    K: serde::Serialize,
    V: serde::Serialize,
{
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (key, value) in self.iter() {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

#[cfg(feature = "serde")]
struct PersistentHashMapVisitor<K, V> {
    key_marker: std::marker::PhantomData<K>,
    value_marker: std::marker::PhantomData<V>,
}

#[cfg(feature = "serde")]
impl<'de, K, V> serde::de::Visitor<'de> for PersistentHashMapVisitor<K, V>
where
    K: serde::Deserialize<'de> + Hash + Eq + Clone,
    V: serde::Deserialize<'de> + Clone + PartialEq,
{
    type Value = PersistentHashMap<K, V>;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a map")
    }

    fn visit_map<A>(self, mut access: A) -> Result<Self::Value, A::Error>
    where
        A: serde::de::MapAccess<'de>,
    {
        let mut map = PersistentHashMap::new();
        while let Some((key, value)) = access.next_entry()? {
            map = map.insert(key, value);
        }
        Ok(map)
    }
}

#[cfg(feature = "serde")]
impl<'de, K, V> serde::Deserialize<'de> for PersistentHashMap<K, V>
where
    K: serde::Deserialize<'de> + Hash + Eq + Clone,
    V: serde::Deserialize<'de> + Clone + PartialEq,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        deserializer.deserialize_map(PersistentHashMapVisitor {
            key_marker: std::marker::PhantomData,
            value_marker: std::marker::PhantomData,
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
