//! Persistent (immutable) vector based on a 32-ary radix tree.
//!
//! This module provides [`PersistentVector`], an immutable indexed sequence
//! that uses structural sharing for efficient operations.
//!
//! # Overview
//!
//! `PersistentVector` is a 32-way branching radix tree in the style of
//! Clojure's `PersistentVector`. Elements are stored in order in 32-slot leaf
//! arrays; a small tail buffer outside the tree absorbs appends and is
//! flushed into the tree once full. In addition to the classic layout, the
//! vector carries an *offset*: a count of logical positions pruned from the
//! head, which makes suffix slicing (and therefore removal from the front)
//! effectively O(1) as well.
//!
//! - O(log32 N) random access (effectively O(1) for practical sizes)
//! - O(log32 N) append (amortized O(1) with the tail buffer)
//! - O(log32 N) update
//! - O(log32 N) prefix and suffix slicing via tree pruning
//! - O(1) len and `is_empty`
//!
//! All operations return new vectors without modifying the original,
//! and structural sharing ensures memory efficiency.
//!
//! # Internal Structure
//!
//! The vector consists of:
//! - An optional root node (32-way branching tree of fixed depth)
//! - A tail buffer (1 to 32 elements) holding the elements after the tree
//! - An offset counting pruned-head slots, which exist in the backing
//!   arrays as vacant placeholders but are unreachable through the API
//!
//! # Examples
//!
//! ```rust
//! use keepsake::persistent::PersistentVector;
//!
//! let vector = PersistentVector::new()
//!     .push_back(1)
//!     .push_back(2)
//!     .push_back(3);
//!
//! assert_eq!(vector.get(0), Some(&1));
//! assert_eq!(vector.get(1), Some(&2));
//! assert_eq!(vector.get(2), Some(&3));
//!
//! // Structural sharing: the original vector is preserved
//! let extended = vector.push_back(4);
//! assert_eq!(vector.len(), 3);     // Original unchanged
//! assert_eq!(extended.len(), 4);   // New vector
//! ```

use std::fmt;
use std::hash::{Hash, Hasher};
use std::iter::FromIterator;

use thiserror::Error;

use super::ReferenceCounter;

// =============================================================================
// Constants
// =============================================================================

/// Branching factor (2^5 = 32)
const BRANCHING_FACTOR: usize = 32;

/// Bits per level in the tree
const BITS_PER_LEVEL: usize = 5;

/// Bit mask for extracting an index within a node
const MASK: usize = BRANCHING_FACTOR - 1;

/// Maximum number of backing slots a vector may occupy.
const MAX_SIZE: usize = i32::MAX as usize;

// =============================================================================
// Errors
// =============================================================================

/// The error returned by [`PersistentVector::try_push_back`] when the vector
/// has reached its maximum representable size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("persistent vector capacity exhausted ({MAX_SIZE} slots)")]
pub struct CapacityError;

// =============================================================================
// Node Definition
// =============================================================================

/// Internal node structure for the radix tree.
///
/// Interior nodes hold between 1 and 32 children; slicing truncates them on
/// the right and vacates slots on the left. Leaf arrays always hold exactly
/// 32 slots, where `None` marks a pruned-head placeholder.
#[derive(Clone)]
enum Node<T> {
    /// Branch node containing child nodes
    Branch(Vec<Option<ReferenceCounter<Node<T>>>>),
    /// Leaf node containing element slots
    Leaf(ReferenceCounter<[Option<T>]>),
}

/// Number of elements stored in the tree portion of a vector with the given
/// total size. The tree stores elements in blocks of 32 and the tail always
/// holds the remainder, so this rounds down past the last full block.
const fn tree_size(total_size: usize) -> usize {
    if total_size <= BRANCHING_FACTOR {
        0
    } else {
        (total_size - 1) & !MASK
    }
}

/// The index within a node of the path to the element with the given index.
/// At depth 0 this is the low 5 bits of the index; at depth 5 it is bits
/// 5 to 9, and so forth.
const fn node_index(index: usize, depth: usize) -> usize {
    (index >> depth) & MASK
}

/// Creates a path of single-child branch nodes of the given depth,
/// terminating in the given node.
fn new_path<T>(depth: usize, node: Node<T>) -> Node<T> {
    if depth == 0 {
        node
    } else {
        Node::Branch(vec![Some(ReferenceCounter::new(new_path(
            depth - BITS_PER_LEVEL,
            node,
        )))])
    }
}

/// Appends a leaf into the tree rooted at `root`, which is assumed to have
/// room; the caller grows the tree beforehand when it is full. `index` is
/// the index of the last element in the leaf.
fn push_leaf<T>(root: &Node<T>, depth: usize, leaf: Node<T>, index: usize) -> Node<T> {
    match root {
        Node::Branch(children) => {
            let slot = node_index(index, depth);

            // The path to the new leaf lives either in the last slot or one
            // past the end of this node.
            let inserted = if depth == BITS_PER_LEVEL {
                ReferenceCounter::new(leaf)
            } else {
                match children.get(slot) {
                    Some(Some(child)) => {
                        ReferenceCounter::new(push_leaf(child, depth - BITS_PER_LEVEL, leaf, index))
                    }
                    // Off the right edge: graft a fresh path in.
                    _ => ReferenceCounter::new(new_path(depth - BITS_PER_LEVEL, leaf)),
                }
            };

            let mut new_children = children.clone();
            if slot == new_children.len() {
                new_children.push(Some(inserted));
            } else {
                new_children[slot] = Some(inserted);
            }
            Node::Branch(new_children)
        }
        // Not reachable in a well-formed tree.
        Node::Leaf(_) => leaf,
    }
}

/// Replaces the element at `index` along a copied root-to-leaf path.
fn update_node<T: Clone>(node: &Node<T>, depth: usize, index: usize, element: T) -> Node<T> {
    match node {
        Node::Leaf(elements) => {
            let mut new_elements = elements.to_vec();
            new_elements[index & MASK] = Some(element);
            Node::Leaf(ReferenceCounter::from(new_elements))
        }
        Node::Branch(children) => {
            let slot = node_index(index, depth);
            let mut new_children = children.clone();
            if depth > 0 {
                if let Some(Some(child)) = children.get(slot) {
                    new_children[slot] = Some(ReferenceCounter::new(update_node(
                        child,
                        depth - BITS_PER_LEVEL,
                        index,
                        element,
                    )));
                }
            }
            Node::Branch(new_children)
        }
    }
}

/// The result of pruning a tree from the right: a reduced tree plus the
/// partially-filled leaf that becomes the new tail.
struct PrunedRight<T> {
    root: Option<ReferenceCounter<Node<T>>>,
    depth: usize,
    tail: ReferenceCounter<[Option<T>]>,
}

/// Recursively prunes elements after `index` from the right side of the
/// tree. `left_edge` is true while the descent has only passed through slot
/// zero, in which case enclosing nodes are redundant and collapse out.
fn prune_right<T: Clone>(
    node: &Node<T>,
    depth: usize,
    index: usize,
    left_edge: bool,
) -> PrunedRight<T> {
    match node {
        Node::Leaf(elements) => {
            // The leaf containing the cut is chopped down and becomes the
            // new tail.
            PrunedRight {
                root: None,
                depth: 0,
                tail: ReferenceCounter::from(elements[..=(index & MASK)].to_vec()),
            }
        }
        Node::Branch(children) => {
            let slot = node_index(index, depth);
            let child_on_left_edge = left_edge && slot == 0;

            let Some(Some(child)) = children.get(slot) else {
                // Not reachable in a well-formed tree.
                return PrunedRight {
                    root: None,
                    depth: 0,
                    tail: ReferenceCounter::from(Vec::new()),
                };
            };

            let result = prune_right(child, depth - BITS_PER_LEVEL, index, child_on_left_edge);

            if child_on_left_edge {
                // This node is redundant and collapses out, reducing the
                // depth of the resulting tree.
                return result;
            }

            match result.root {
                None if slot == 0 => PrunedRight {
                    root: None,
                    depth: result.depth + BITS_PER_LEVEL,
                    tail: result.tail,
                },
                None => PrunedRight {
                    root: Some(ReferenceCounter::new(Node::Branch(
                        children[..slot].to_vec(),
                    ))),
                    depth: result.depth + BITS_PER_LEVEL,
                    tail: result.tail,
                },
                Some(pruned_child) => {
                    let mut new_children = children[..=slot].to_vec();
                    new_children[slot] = Some(pruned_child);
                    PrunedRight {
                        root: Some(ReferenceCounter::new(Node::Branch(new_children))),
                        depth: result.depth + BITS_PER_LEVEL,
                        tail: result.tail,
                    }
                }
            }
        }
    }
}

/// The result of pruning a tree from the left: a reduced tree plus the
/// offset of the first surviving element within it.
struct PrunedLeft<T> {
    root: ReferenceCounter<Node<T>>,
    depth: usize,
    offset: usize,
}

/// Recursively prunes elements before `index` from the left side of the
/// tree. `right_edge` is true while the descent has only passed through the
/// last slot of each node; on that edge slots may be shifted left without
/// disturbing anything, elsewhere they are vacated in place and accounted
/// for in the offset.
fn prune_left<T: Clone>(
    node: &ReferenceCounter<Node<T>>,
    depth: usize,
    index: usize,
    right_edge: bool,
) -> PrunedLeft<T> {
    match node.as_ref() {
        Node::Leaf(elements) => {
            let slot = index & MASK;
            if slot == 0 {
                // Pruned on a block boundary; reuse the leaf unchanged.
                PrunedLeft {
                    root: node.clone(),
                    depth: 0,
                    offset: 0,
                }
            } else {
                // The leaf cannot be shifted without disturbing the tail, so
                // vacate the pruned slots and record the offset.
                let mut cleared = elements.to_vec();
                for element in &mut cleared[..slot] {
                    *element = None;
                }
                PrunedLeft {
                    root: ReferenceCounter::new(Node::Leaf(ReferenceCounter::from(cleared))),
                    depth: 0,
                    offset: slot,
                }
            }
        }
        Node::Branch(children) => {
            let slot = node_index(index, depth);
            let child_on_right_edge = right_edge && slot + 1 == children.len();

            let Some(Some(child)) = children.get(slot) else {
                // Not reachable in a well-formed tree.
                return PrunedLeft {
                    root: node.clone(),
                    depth,
                    offset: 0,
                };
            };

            let result = prune_left(child, depth - BITS_PER_LEVEL, index, child_on_right_edge);

            if child_on_right_edge {
                // This node is redundant and collapses out.
                return result;
            }

            if slot == 0 && ReferenceCounter::ptr_eq(&result.root, child) {
                // Pruned on a boundary; reuse this node unchanged.
                return PrunedLeft {
                    root: node.clone(),
                    depth: result.depth + BITS_PER_LEVEL,
                    offset: result.offset,
                };
            }

            if right_edge {
                // On the right edge there are no untouched subtrees to the
                // right, so surviving slots can shift left.
                let mut new_children = children[slot..].to_vec();
                new_children[0] = Some(result.root);
                return PrunedLeft {
                    root: ReferenceCounter::new(Node::Branch(new_children)),
                    depth: result.depth + BITS_PER_LEVEL,
                    offset: result.offset,
                };
            }

            // Cannot shift without disturbing the right subtrees: vacate the
            // pruned slots and add their span to the offset.
            let mut new_children = children.clone();
            for child_slot in &mut new_children[..slot] {
                *child_slot = None;
            }
            new_children[slot] = Some(result.root);
            PrunedLeft {
                root: ReferenceCounter::new(Node::Branch(new_children)),
                depth: result.depth + BITS_PER_LEVEL,
                offset: result.offset + (slot << depth),
            }
        }
    }
}

// =============================================================================
// PersistentVector Definition
// =============================================================================

/// A persistent (immutable) vector based on a 32-ary radix tree.
///
/// `PersistentVector` is an immutable data structure that uses structural
/// sharing to efficiently support functional programming patterns. Besides
/// appends, updates, and random access, it supports prefix and suffix
/// slicing by pruning the tree, which makes it usable as a queue.
///
/// # Time Complexity
///
/// | Operation    | Complexity                      |
/// |--------------|---------------------------------|
/// | `new`        | O(1)                            |
/// | `get`        | O(log32 N)                      |
/// | `push_back`  | O(log32 N), amortized O(1)      |
/// | `update`     | O(log32 N)                      |
/// | `take`       | O(log32 N)                      |
/// | `take_last`  | O(log32 N)                      |
/// | `pop_front`  | O(log32 N)                      |
/// | `len`        | O(1)                            |
/// | `is_empty`   | O(1)                            |
/// | `iter`       | O(1) to create, O(N) to iterate |
///
/// # Examples
///
/// ```rust
/// use keepsake::persistent::PersistentVector;
///
/// let vector: PersistentVector<i32> = (0..100).collect();
/// assert_eq!(vector.len(), 100);
/// assert_eq!(vector.get(50), Some(&50));
/// ```
#[derive(Clone)]
pub struct PersistentVector<T> {
    /// Count of pruned-head slots; the user-visible size is
    /// `total_size - offset`.
    offset: usize,
    /// Size of the backing structure, including pruned-head slots.
    total_size: usize,
    /// Root node of the tree, absent while everything fits in the tail.
    root: Option<ReferenceCounter<Node<T>>>,
    /// Depth of the tree in index bits; a multiple of `BITS_PER_LEVEL`,
    /// zero when the root is a leaf.
    shift: usize,
    /// Tail buffer holding the elements after the tree.
    tail: ReferenceCounter<[Option<T>]>,
}

impl<T> PersistentVector<T> {
    /// Creates a new empty vector.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use keepsake::persistent::PersistentVector;
    ///
    /// let vector: PersistentVector<i32> = PersistentVector::new();
    /// assert!(vector.is_empty());
    /// ```
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            offset: 0,
            total_size: 0,
            root: None,
            shift: 0,
            tail: ReferenceCounter::from(Vec::new()),
        }
    }

    /// Creates a vector containing a single element.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use keepsake::persistent::PersistentVector;
    ///
    /// let vector = PersistentVector::singleton(42);
    /// assert_eq!(vector.len(), 1);
    /// assert_eq!(vector.get(0), Some(&42));
    /// ```
    #[inline]
    #[must_use]
    pub fn singleton(element: T) -> Self {
        Self {
            offset: 0,
            total_size: 1,
            root: None,
            shift: 0,
            tail: ReferenceCounter::from(vec![Some(element)]),
        }
    }

    /// Returns the number of elements in the vector.
    ///
    /// # Complexity
    ///
    /// O(1)
    ///
    /// # Examples
    ///
    /// ```rust
    /// use keepsake::persistent::PersistentVector;
    ///
    /// let vector: PersistentVector<i32> = (1..=5).collect();
    /// assert_eq!(vector.len(), 5);
    /// ```
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.total_size - self.offset
    }

    /// Returns `true` if the vector contains no elements.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use keepsake::persistent::PersistentVector;
    ///
    /// let empty: PersistentVector<i32> = PersistentVector::new();
    /// assert!(empty.is_empty());
    ///
    /// let non_empty = empty.push_back(1);
    /// assert!(!non_empty.is_empty());
    /// ```
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.total_size == self.offset
    }

    /// Returns a reference to the element at the given index.
    ///
    /// Returns `None` if the index is out of bounds.
    ///
    /// # Complexity
    ///
    /// O(log32 N)
    ///
    /// # Examples
    ///
    /// ```rust
    /// use keepsake::persistent::PersistentVector;
    ///
    /// let vector: PersistentVector<i32> = (1..=5).collect();
    /// assert_eq!(vector.get(0), Some(&1));
    /// assert_eq!(vector.get(4), Some(&5));
    /// assert_eq!(vector.get(10), None);
    /// ```
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&T> {
        if index >= self.len() {
            return None;
        }
        let real_index = index + self.offset;
        self.block(real_index)?.get(real_index & MASK)?.as_ref()
    }

    /// Returns a reference to the first element, or `None` if the vector is
    /// empty.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use keepsake::persistent::PersistentVector;
    ///
    /// let vector: PersistentVector<i32> = (1..=5).collect();
    /// assert_eq!(vector.first(), Some(&1));
    /// ```
    #[inline]
    #[must_use]
    pub fn first(&self) -> Option<&T> {
        self.get(0)
    }

    /// Returns a reference to the last element, or `None` if the vector is
    /// empty.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use keepsake::persistent::PersistentVector;
    ///
    /// let vector: PersistentVector<i32> = (1..=5).collect();
    /// assert_eq!(vector.last(), Some(&5));
    /// ```
    #[inline]
    #[must_use]
    pub fn last(&self) -> Option<&T> {
        if self.is_empty() {
            None
        } else {
            self.get(self.len() - 1)
        }
    }

    /// Returns an iterator over references to the elements.
    ///
    /// The iterator yields elements from front to back, reading a whole
    /// 32-slot block (tree leaf or tail) at a time.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use keepsake::persistent::PersistentVector;
    ///
    /// let vector: PersistentVector<i32> = (1..=5).collect();
    /// let collected: Vec<&i32> = vector.iter().collect();
    /// assert_eq!(collected, vec![&1, &2, &3, &4, &5]);
    /// ```
    #[must_use]
    pub fn iter(&self) -> PersistentVectorIterator<'_, T> {
        // Pre-warm the block when iteration does not start on a 32-slot
        // boundary.
        let block: &[Option<T>] = if self.offset & MASK == 0 {
            &[]
        } else {
            self.block(self.offset).unwrap_or(&[])
        };
        PersistentVectorIterator {
            vector: self,
            index: self.offset,
            block,
        }
    }

    /// Returns `true` if `self` and `other` share their backing structure,
    /// which implies they are equal.
    ///
    /// This is a cheap identity check, not a full equality check: two
    /// structurally equal vectors built separately compare unequal here.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        let roots_shared = match (&self.root, &other.root) {
            (None, None) => true,
            (Some(left), Some(right)) => ReferenceCounter::ptr_eq(left, right),
            _ => false,
        };
        self.offset == other.offset
            && self.total_size == other.total_size
            && roots_shared
            && ReferenceCounter::ptr_eq(&self.tail, &other.tail)
    }

    /// Gets the 32-slot array (tree leaf or tail) holding the given real
    /// index.
    fn block(&self, index: usize) -> Option<&[Option<T>]> {
        if index >= tree_size(self.total_size) {
            return Some(&self.tail);
        }

        let mut node = self.root.as_deref()?;
        let mut depth = self.shift;
        while depth > 0 {
            match node {
                Node::Branch(children) => {
                    node = children.get(node_index(index, depth))?.as_deref()?;
                    depth -= BITS_PER_LEVEL;
                }
                Node::Leaf(_) => break,
            }
        }

        match node {
            Node::Leaf(elements) => Some(elements),
            Node::Branch(_) => None,
        }
    }

    /// Returns whether the tree portion is full, in which case appending
    /// another leaf requires growing the tree by a level.
    const fn is_tree_full(&self) -> bool {
        (self.total_size >> BITS_PER_LEVEL) > (1 << self.shift)
    }
}

impl<T: Clone> PersistentVector<T> {
    /// Appends an element to the back of the vector.
    ///
    /// Returns a new vector with the element at the end.
    ///
    /// # Panics
    ///
    /// Panics if the vector is at its maximum capacity; see
    /// [`try_push_back`](Self::try_push_back) for the checked variant.
    ///
    /// # Complexity
    ///
    /// O(log32 N), amortized O(1) due to the tail buffer
    ///
    /// # Examples
    ///
    /// ```rust
    /// use keepsake::persistent::PersistentVector;
    ///
    /// let vector = PersistentVector::new()
    ///     .push_back(1)
    ///     .push_back(2)
    ///     .push_back(3);
    ///
    /// assert_eq!(vector.len(), 3);
    /// assert_eq!(vector.get(2), Some(&3));
    /// ```
    #[must_use]
    pub fn push_back(&self, element: T) -> Self {
        match self.try_push_back(element) {
            Ok(vector) => vector,
            Err(error) => panic!("{error}"),
        }
    }

    /// Appends an element to the back of the vector, failing if the vector
    /// has reached its maximum representable size.
    ///
    /// # Errors
    ///
    /// Returns [`CapacityError`] when the backing structure already occupies
    /// `i32::MAX` slots.
    pub fn try_push_back(&self, element: T) -> Result<Self, CapacityError> {
        if self.total_size >= MAX_SIZE {
            return Err(CapacityError);
        }

        if self.tail.len() < BRANCHING_FACTOR {
            // There is room in the tail.
            let mut new_tail = self.tail.to_vec();
            new_tail.push(Some(element));
            return Ok(Self {
                offset: self.offset,
                total_size: self.total_size + 1,
                root: self.root.clone(),
                shift: self.shift,
                tail: ReferenceCounter::from(new_tail),
            });
        }

        // The tail is full: flush it into the tree and start a new tail
        // with the single element being appended.
        Ok(self.flush_tail_and_push(element))
    }

    /// Pushes the full tail into the tree and starts a new tail holding
    /// `element`.
    fn flush_tail_and_push(&self, element: T) -> Self {
        let tail_leaf = Node::Leaf(self.tail.clone());

        let (new_root, new_shift) = match self.root.as_deref() {
            // First flush: the tail becomes the root leaf.
            None => (ReferenceCounter::new(tail_leaf), self.shift),
            Some(_) if self.is_tree_full() => {
                // The tree is full: push the root up a level, with the old
                // root on the left and a path to the tail on the right.
                let lifted = vec![
                    self.root.clone(),
                    Some(ReferenceCounter::new(new_path(self.shift, tail_leaf))),
                ];
                (
                    ReferenceCounter::new(Node::Branch(lifted)),
                    self.shift + BITS_PER_LEVEL,
                )
            }
            Some(root) => (
                ReferenceCounter::new(push_leaf(root, self.shift, tail_leaf, self.total_size - 1)),
                self.shift,
            ),
        };

        Self {
            offset: self.offset,
            total_size: self.total_size + 1,
            root: Some(new_root),
            shift: new_shift,
            tail: ReferenceCounter::from(vec![Some(element)]),
        }
    }

    /// Replaces the element at the given index, returning a new vector.
    ///
    /// `update(len, element)` is an alias for appending; any larger index
    /// returns `None`.
    ///
    /// # Complexity
    ///
    /// O(log32 N)
    ///
    /// # Examples
    ///
    /// ```rust
    /// use keepsake::persistent::PersistentVector;
    ///
    /// let vector: PersistentVector<i32> = (0..10).collect();
    /// let updated = vector.update(5, 100).unwrap();
    ///
    /// assert_eq!(updated.get(5), Some(&100));
    /// assert_eq!(vector.get(5), Some(&5)); // Original unchanged
    /// ```
    #[must_use]
    pub fn update(&self, index: usize, element: T) -> Option<Self> {
        if index > self.len() {
            return None;
        }
        if index == self.len() {
            return Some(self.push_back(element));
        }

        let real_index = index + self.offset;

        if real_index >= tree_size(self.total_size) {
            // The slot is in the tail.
            let mut new_tail = self.tail.to_vec();
            new_tail[real_index & MASK] = Some(element);
            return Some(Self {
                offset: self.offset,
                total_size: self.total_size,
                root: self.root.clone(),
                shift: self.shift,
                tail: ReferenceCounter::from(new_tail),
            });
        }

        let root = self.root.as_deref()?;
        Some(Self {
            offset: self.offset,
            total_size: self.total_size,
            root: Some(ReferenceCounter::new(update_node(
                root,
                self.shift,
                real_index,
                element,
            ))),
            shift: self.shift,
            tail: self.tail.clone(),
        })
    }

    /// Returns the prefix holding the first `count` elements, or `None` if
    /// `count` exceeds the length.
    ///
    /// The cut prunes the right side of the tree; everything to the left is
    /// shared with the original.
    ///
    /// # Complexity
    ///
    /// O(log32 N)
    ///
    /// # Examples
    ///
    /// ```rust
    /// use keepsake::persistent::PersistentVector;
    ///
    /// let vector: PersistentVector<i32> = (0..100).collect();
    /// let prefix = vector.take(10).unwrap();
    ///
    /// assert_eq!(prefix.len(), 10);
    /// assert_eq!(prefix.get(9), Some(&9));
    /// assert_eq!(prefix.get(10), None);
    /// ```
    #[must_use]
    pub fn take(&self, count: usize) -> Option<Self> {
        if count > self.len() {
            return None;
        }
        if count == 0 {
            return Some(Self::new());
        }
        if count == self.len() {
            return Some(self.clone());
        }

        // The offset is carried over, so compute the real size of the new
        // backing structure.
        let new_size = count + self.offset;

        if new_size > tree_size(self.total_size) {
            // The cut lies in the tail: just squish it.
            return Some(Self {
                offset: self.offset,
                total_size: new_size,
                root: self.root.clone(),
                shift: self.shift,
                tail: ReferenceCounter::from(self.tail[..new_size & MASK].to_vec()),
            });
        }

        let root = self.root.as_deref()?;
        let pruned = prune_right(root, self.shift, new_size - 1, true);
        Some(Self {
            offset: self.offset,
            total_size: new_size,
            root: pruned.root,
            shift: pruned.depth,
            tail: pruned.tail,
        })
    }

    /// Returns the suffix holding the last `count` elements, or `None` if
    /// `count` exceeds the length.
    ///
    /// The cut prunes the left side of the tree; the original tail and the
    /// subtrees to the right of the cut are shared with the original.
    ///
    /// # Complexity
    ///
    /// O(log32 N)
    ///
    /// # Examples
    ///
    /// ```rust
    /// use keepsake::persistent::PersistentVector;
    ///
    /// let vector: PersistentVector<i32> = (0..100).collect();
    /// let suffix = vector.take_last(10).unwrap();
    ///
    /// assert_eq!(suffix.len(), 10);
    /// assert_eq!(suffix.get(0), Some(&90));
    /// ```
    #[must_use]
    pub fn take_last(&self, count: usize) -> Option<Self> {
        if count > self.len() {
            return None;
        }
        if count == 0 {
            return Some(Self::new());
        }
        if count == self.len() {
            return Some(self.clone());
        }

        let new_offset = self.offset + (self.len() - count);

        if new_offset >= tree_size(self.total_size) {
            // The cut lies in (or past) the tail: the survivors are a
            // suffix of the tail and the tree is dropped entirely.
            let new_tail = if count == self.tail.len() {
                self.tail.clone()
            } else {
                ReferenceCounter::from(self.tail[self.tail.len() - count..].to_vec())
            };
            return Some(Self {
                offset: 0,
                total_size: count,
                root: None,
                shift: 0,
                tail: new_tail,
            });
        }

        let root = self.root.as_ref()?;
        let pruned = prune_left(root, self.shift, new_offset, true);
        Some(Self {
            offset: pruned.offset,
            total_size: pruned.offset + count,
            root: Some(pruned.root),
            shift: pruned.depth,
            tail: self.tail.clone(),
        })
    }

    /// Returns the vector without its first `count` elements, or `None` if
    /// `count` exceeds the length.
    ///
    /// Equivalent to `take_last(len - count)`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use keepsake::persistent::PersistentVector;
    ///
    /// let vector: PersistentVector<i32> = (0..10).collect();
    /// let rest = vector.skip(4).unwrap();
    ///
    /// assert_eq!(rest.len(), 6);
    /// assert_eq!(rest.get(0), Some(&4));
    /// ```
    #[must_use]
    pub fn skip(&self, count: usize) -> Option<Self> {
        if count > self.len() {
            return None;
        }
        self.take_last(self.len() - count)
    }

    /// Removes the first element, returning the remaining vector and the
    /// element, or `None` if the vector is empty.
    ///
    /// Unlike a naive rebuild, this prunes the head in O(log32 N).
    ///
    /// # Examples
    ///
    /// ```rust
    /// use keepsake::persistent::PersistentVector;
    ///
    /// let vector: PersistentVector<i32> = (1..=5).collect();
    /// let (remaining, element) = vector.pop_front().unwrap();
    ///
    /// assert_eq!(element, 1);
    /// assert_eq!(remaining.len(), 4);
    /// assert_eq!(remaining.get(0), Some(&2));
    /// ```
    #[must_use]
    pub fn pop_front(&self) -> Option<(Self, T)> {
        let element = self.get(0)?.clone();
        let remaining = self.take_last(self.len() - 1)?;
        Some((remaining, element))
    }

    /// Removes the last element, returning the remaining vector and the
    /// element, or `None` if the vector is empty.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use keepsake::persistent::PersistentVector;
    ///
    /// let vector: PersistentVector<i32> = (1..=5).collect();
    /// let (remaining, element) = vector.pop_back().unwrap();
    ///
    /// assert_eq!(element, 5);
    /// assert_eq!(remaining.len(), 4);
    /// ```
    #[must_use]
    pub fn pop_back(&self) -> Option<(Self, T)> {
        let element = self.last()?.clone();
        let remaining = self.take(self.len() - 1)?;
        Some((remaining, element))
    }

    /// Appends all elements of another vector to this vector.
    ///
    /// # Complexity
    ///
    /// O(M log32 N) where M is the length of `other`
    ///
    /// # Examples
    ///
    /// ```rust
    /// use keepsake::persistent::PersistentVector;
    ///
    /// let left: PersistentVector<i32> = (1..=3).collect();
    /// let right: PersistentVector<i32> = (4..=6).collect();
    /// let combined = left.append(&right);
    ///
    /// assert_eq!(combined.len(), 6);
    /// assert_eq!(combined.get(5), Some(&6));
    /// ```
    #[must_use]
    pub fn append(&self, other: &Self) -> Self {
        if self.is_empty() {
            return other.clone();
        }
        if other.is_empty() {
            return self.clone();
        }

        let mut result = self.clone();
        for element in other.iter() {
            result = result.push_back(element.clone());
        }
        result
    }
}

impl<T: PartialEq> PersistentVector<T> {
    /// Returns the index of the first element equal to `element`, or `None`
    /// if no element matches.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use keepsake::persistent::PersistentVector;
    ///
    /// let vector: PersistentVector<i32> = (0..10).map(|i| i % 3).collect();
    /// assert_eq!(vector.index_of(&2), Some(2));
    /// assert_eq!(vector.index_of(&9), None);
    /// ```
    #[must_use]
    pub fn index_of(&self, element: &T) -> Option<usize> {
        self.iter().position(|candidate| candidate == element)
    }

    /// Returns the index of the last element equal to `element`, or `None`
    /// if no element matches.
    #[must_use]
    pub fn last_index_of(&self, element: &T) -> Option<usize> {
        (0..self.len())
            .rev()
            .find(|&index| self.get(index) == Some(element))
    }

    /// Returns `true` if some element equals `element`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use keepsake::persistent::PersistentVector;
    ///
    /// let vector: PersistentVector<i32> = (0..10).collect();
    /// assert!(vector.contains(&7));
    /// assert!(!vector.contains(&10));
    /// ```
    #[must_use]
    pub fn contains(&self, element: &T) -> bool {
        self.index_of(element).is_some()
    }

    /// Returns `true` if every element yielded by `elements` is contained
    /// in the vector.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use keepsake::persistent::PersistentVector;
    ///
    /// let vector: PersistentVector<i32> = (0..10).collect();
    /// assert!(vector.contains_all(&[2, 4, 6]));
    /// assert!(!vector.contains_all(&[2, 40]));
    /// ```
    pub fn contains_all<'a, I>(&self, elements: I) -> bool
    where
        T: 'a,
        I: IntoIterator<Item = &'a T>,
    {
        elements.into_iter().all(|element| self.contains(element))
    }
}

// =============================================================================
// Iterator Implementation
// =============================================================================

/// An iterator over references to elements of a [`PersistentVector`].
pub struct PersistentVectorIterator<'a, T> {
    vector: &'a PersistentVector<T>,
    /// Next real index to yield.
    index: usize,
    /// The 32-slot block holding the current index.
    block: &'a [Option<T>],
}

impl<'a, T> Iterator for PersistentVectorIterator<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        if self.index >= self.vector.total_size {
            return None;
        }

        // Roll over to the next block.
        if self.index & MASK == 0 {
            self.block = self.vector.block(self.index).unwrap_or(&[]);
        }

        let block = self.block;
        let element = block.get(self.index & MASK)?.as_ref();
        self.index += 1;
        element
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.vector.total_size.saturating_sub(self.index);
        (remaining, Some(remaining))
    }
}

impl<T> ExactSizeIterator for PersistentVectorIterator<'_, T> {
    fn len(&self) -> usize {
        self.vector.total_size.saturating_sub(self.index)
    }
}

/// An owning iterator over elements of a [`PersistentVector`].
pub struct PersistentVectorIntoIterator<T> {
    vector: PersistentVector<T>,
    current_index: usize,
}

impl<T: Clone> Iterator for PersistentVectorIntoIterator<T> {
    type Item = T;

    fn next(&mut self) -> Option<Self::Item> {
        let element = self.vector.get(self.current_index).cloned();
        self.current_index += 1;
        element
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.vector.len().saturating_sub(self.current_index);
        (remaining, Some(remaining))
    }
}

impl<T: Clone> ExactSizeIterator for PersistentVectorIntoIterator<T> {
    fn len(&self) -> usize {
        self.vector.len().saturating_sub(self.current_index)
    }
}

// =============================================================================
// Standard Trait Implementations
// =============================================================================

impl<T> Default for PersistentVector<T> {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> FromIterator<T> for PersistentVector<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut vector = Self::new();
        for element in iter {
            vector = vector.push_back(element);
        }
        vector
    }
}

impl<T: Clone> IntoIterator for PersistentVector<T> {
    type Item = T;
    type IntoIter = PersistentVectorIntoIterator<T>;

    #[inline]
    fn into_iter(self) -> Self::IntoIter {
        PersistentVectorIntoIterator {
            vector: self,
            current_index: 0,
        }
    }
}

impl<'a, T> IntoIterator for &'a PersistentVector<T> {
    type Item = &'a T;
    type IntoIter = PersistentVectorIterator<'a, T>;

    #[inline]
    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<T: PartialEq> PartialEq for PersistentVector<T> {
    fn eq(&self, other: &Self) -> bool {
        if self.len() != other.len() {
            return false;
        }
        self.iter().zip(other.iter()).all(|(a, b)| a == b)
    }
}

impl<T: Eq> Eq for PersistentVector<T> {}

impl<T: Hash> Hash for PersistentVector<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_usize(self.len());
        for element in self {
            element.hash(state);
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for PersistentVector<T> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.debug_list().entries(self.iter()).finish()
    }
}

impl<T: fmt::Display> fmt::Display for PersistentVector<T> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "[")?;
        let mut first = true;
        for element in self {
            if first {
                first = false;
            } else {
                write!(formatter, ", ")?;
            }
            write!(formatter, "{element}")?;
        }
        write!(formatter, "]")
    }
}

// =============================================================================
// Serde Support
// =============================================================================

#[cfg(feature = "serde")]
impl<T> serde::Serialize for PersistentVector<T>
where
    T: serde::Serialize + Clone,
{
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeSeq;
        let mut sequence = serializer.serialize_seq(Some(self.len()))?;
        for element in self {
            sequence.serialize_element(element)?;
        }
        sequence.end()
    }
}

#[cfg(feature = "serde")]
struct PersistentVectorVisitor<T> {
    marker: std::marker::PhantomData<T>,
}

#[cfg(feature = "serde")]
impl<'de, T> serde::de::Visitor<'de> for PersistentVectorVisitor<T>
where
    T: serde::Deserialize<'de> + Clone,
{
    type Value = PersistentVector<T>;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a sequence")
    }

    fn visit_seq<A>(self, mut access: A) -> Result<Self::Value, A::Error>
    where
        A: serde::de::SeqAccess<'de>,
    {
        let mut vector = PersistentVector::new();
        while let Some(element) = access.next_element()? {
            vector = vector.push_back(element);
        }
        Ok(vector)
    }
}

#[cfg(feature = "serde")]
impl<'de, T> serde::Deserialize<'de> for PersistentVector<T>
where
    T: serde::Deserialize<'de> + Clone,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        deserializer.deserialize_seq(PersistentVectorVisitor {
            marker: std::marker::PhantomData,
        })
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn test_new_creates_empty() {
        let vector: PersistentVector<i32> = PersistentVector::new();
        assert!(vector.is_empty());
        assert_eq!(vector.len(), 0);
        assert_eq!(vector.get(0), None);
    }

    #[rstest]
    fn test_singleton() {
        let vector = PersistentVector::singleton(42);
        assert_eq!(vector.len(), 1);
        assert_eq!(vector.get(0), Some(&42));
    }

    #[rstest]
    fn test_push_back_and_get() {
        let vector = PersistentVector::new()
            .push_back(1)
            .push_back(2)
            .push_back(3);
        assert_eq!(vector.len(), 3);
        assert_eq!(vector.get(0), Some(&1));
        assert_eq!(vector.get(1), Some(&2));
        assert_eq!(vector.get(2), Some(&3));
    }

    #[rstest]
    #[case::tail_only(20)]
    #[case::one_leaf_flushed(40)]
    #[case::full_root_leaf(64)]
    #[case::two_levels(1100)]
    #[case::three_levels(33000)]
    fn test_push_back_across_tree_shapes(#[case] size: usize) {
        let vector: PersistentVector<usize> = (0..size).collect();
        assert_eq!(vector.len(), size);
        for index in 0..size {
            assert_eq!(vector.get(index), Some(&index), "index {index}");
        }
    }

    #[rstest]
    fn test_push_back_does_not_modify_original() {
        let original: PersistentVector<i32> = (0..33).collect();
        let extended = original.push_back(33);

        assert_eq!(original.len(), 33);
        assert_eq!(original.get(33), None);
        assert_eq!(extended.len(), 34);
        assert_eq!(extended.get(33), Some(&33));
    }

    #[rstest]
    fn test_update_in_tail_and_tree() {
        let vector: PersistentVector<i32> = (0..100).collect();

        let updated_tail = vector.update(98, -1).unwrap();
        assert_eq!(updated_tail.get(98), Some(&-1));
        assert_eq!(vector.get(98), Some(&98));

        let updated_tree = vector.update(10, -2).unwrap();
        assert_eq!(updated_tree.get(10), Some(&-2));
        assert_eq!(vector.get(10), Some(&10));
    }

    #[rstest]
    fn test_update_at_len_appends() {
        let vector: PersistentVector<i32> = (0..5).collect();
        let appended = vector.update(5, 5).unwrap();
        assert_eq!(appended.len(), 6);
        assert_eq!(appended.get(5), Some(&5));
    }

    #[rstest]
    fn test_update_out_of_bounds() {
        let vector: PersistentVector<i32> = (0..5).collect();
        assert!(vector.update(6, 0).is_none());
    }

    #[rstest]
    fn test_take_prefix() {
        let vector: PersistentVector<usize> = (0..200).collect();
        for count in [0, 1, 31, 32, 33, 64, 100, 199, 200] {
            let prefix = vector.take(count).unwrap();
            assert_eq!(prefix.len(), count);
            for index in 0..count {
                assert_eq!(prefix.get(index), Some(&index));
            }
        }
        assert!(vector.take(201).is_none());
    }

    #[rstest]
    fn test_take_full_length_shares_structure() {
        let vector: PersistentVector<usize> = (0..100).collect();
        let same = vector.take(100).unwrap();
        assert!(same.ptr_eq(&vector));
    }

    #[rstest]
    fn test_take_last_suffix() {
        let vector: PersistentVector<usize> = (0..200).collect();
        for count in [0, 1, 31, 32, 33, 64, 100, 199, 200] {
            let suffix = vector.take_last(count).unwrap();
            assert_eq!(suffix.len(), count);
            for index in 0..count {
                assert_eq!(suffix.get(index), Some(&(200 - count + index)));
            }
        }
        assert!(vector.take_last(201).is_none());
    }

    #[rstest]
    fn test_take_last_preserves_tail() {
        // The suffix keeps the original tail verbatim.
        let vector: PersistentVector<usize> = (0..100).collect();
        let suffix = vector.take_last(50).unwrap();
        assert_eq!(suffix.get(49), Some(&99));
        let extended = suffix.push_back(100);
        assert_eq!(extended.get(50), Some(&100));
    }

    #[rstest]
    fn test_slicing_composes_with_append() {
        // Push into a left-pruned vector: appends must land after the
        // surviving elements.
        let vector: PersistentVector<usize> = (0..70).collect();
        let mut suffix = vector.take_last(20).unwrap();
        for element in 70..110 {
            suffix = suffix.push_back(element);
        }
        assert_eq!(suffix.len(), 60);
        for index in 0..60 {
            assert_eq!(suffix.get(index), Some(&(50 + index)));
        }
    }

    #[rstest]
    fn test_skip() {
        let vector: PersistentVector<usize> = (0..50).collect();
        let rest = vector.skip(20).unwrap();
        assert_eq!(rest.len(), 30);
        assert_eq!(rest.get(0), Some(&20));
        assert!(vector.skip(51).is_none());
    }

    #[rstest]
    fn test_pop_front_repeatedly() {
        let mut vector: PersistentVector<usize> = (0..100).collect();
        for expected in 0..100 {
            let (remaining, element) = vector.pop_front().unwrap();
            assert_eq!(element, expected);
            vector = remaining;
        }
        assert!(vector.is_empty());
        assert!(vector.pop_front().is_none());
    }

    #[rstest]
    fn test_pop_back() {
        let vector: PersistentVector<i32> = (1..=5).collect();
        let (remaining, element) = vector.pop_back().unwrap();
        assert_eq!(element, 5);
        assert_eq!(remaining.len(), 4);
    }

    #[rstest]
    fn test_iter_matches_indexing() {
        let vector: PersistentVector<usize> = (0..1000).collect();
        let collected: Vec<usize> = vector.iter().copied().collect();
        let expected: Vec<usize> = (0..1000).collect();
        assert_eq!(collected, expected);
    }

    #[rstest]
    fn test_iter_after_left_prune() {
        // Iteration must pre-warm correctly when the offset is not a
        // multiple of 32.
        let vector: PersistentVector<usize> = (0..100).collect();
        let suffix = vector.take_last(55).unwrap();
        let collected: Vec<usize> = suffix.iter().copied().collect();
        let expected: Vec<usize> = (45..100).collect();
        assert_eq!(collected, expected);
    }

    #[rstest]
    fn test_index_queries() {
        let vector: PersistentVector<i32> = (0..6).map(|i| i % 3).collect();
        assert_eq!(vector.index_of(&2), Some(2));
        assert_eq!(vector.last_index_of(&2), Some(5));
        assert!(vector.contains(&1));
        assert!(!vector.contains(&3));
    }

    #[rstest]
    fn test_eq_ignores_internal_shape() {
        let built: PersistentVector<usize> = (10..50).collect();
        let sliced = (0..60)
            .collect::<PersistentVector<usize>>()
            .take_last(50)
            .unwrap()
            .take(40)
            .unwrap();
        assert_eq!(built, sliced);
    }

    #[rstest]
    fn test_display_and_debug() {
        let vector: PersistentVector<i32> = (1..=3).collect();
        assert_eq!(format!("{vector}"), "[1, 2, 3]");
        assert_eq!(format!("{vector:?}"), "[1, 2, 3]");
        let empty: PersistentVector<i32> = PersistentVector::new();
        assert_eq!(format!("{empty}"), "[]");
    }

    #[rstest]
    fn test_capacity_error_message() {
        let message = format!("{CapacityError}");
        assert!(message.contains("capacity exhausted"));
    }

    #[rstest]
    fn test_nullable_elements() {
        let vector: PersistentVector<Option<i32>> = PersistentVector::new()
            .push_back(None)
            .push_back(Some(1))
            .push_back(None);
        assert_eq!(vector.get(0), Some(&None));
        assert_eq!(vector.index_of(&None), Some(0));
        assert_eq!(vector.last_index_of(&None), Some(2));
    }
}
