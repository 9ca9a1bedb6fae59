//! An intrusive scapegoat tree.
//#![no_std]

// A scapegoat tree stores no balance metadata in its nodes. The tree tracks its own length `n`
// and a high-water mark `m`, and restores balance by rebuilding whole subtrees:
//
// - `h(n)` is `⌊log_{1/α}(n)⌋`, the greatest depth a node may have in a balanced tree of `n`
//   nodes.
// - An insertion that lands deeper than `h(n)` climbs back towards the root until it finds the
//   nearest ancestor `s` whose own subtree is too tall for its size, i.e. the climb height from
//   the inserted node exceeds `h(size(s))`. `s` is the scapegoat, and its subtree is rebuilt into
//   a perfectly balanced one. `m` is reset to `n`.
// - A removal that leaves `n ≤ α·m` rebuilds the whole tree and resets `m` to `n`.
//
// Neither trigger condition is an invariant; the tree is allowed to drift between rebuilds. The
// structural invariants are:
// 1. An in-order walk yields keys in non-decreasing order.
// 2. A child's parent link always points at the node holding it.
// 3. `m ≥ n`.

extern crate alloc;

use alloc::vec::Vec;
use core::{
    borrow::Borrow, cell::UnsafeCell, cmp::Ordering, fmt, marker::PhantomPinned, mem, ops::Not,
    pin::Pin, ptr::NonNull,
};

use cordyceps::Linked;
use tracing::{debug, trace};

mod alpha;
mod debug;
pub mod map;
mod rebuild;

#[cfg(any(test, feature = "model"))]
pub mod model;


pub use alpha::{Alpha, AlphaError};
pub use map::ScapegoatMap;

pub trait TreeNode<L>: Linked<L> {
    type Key: Ord;

    fn key(&self) -> &Self::Key;
}

/// An intrusive scapegoat tree.
///
/// Implementation based on [Scapegoat Trees] by Galperin and Rivest. Balance is restored by
/// rebuilding subtrees rather than by rotations, so nodes carry only their parent and child links.
///
/// The tree is not thread-safe; callers sharing one must serialize all access to it.
///
/// [Scapegoat Trees]: https://people.csail.mit.edu/rivest/pubs/GR93.pdf
pub struct ScapegoatTree<T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    root: Link<T>,
    len: usize,
    max_len: usize,
    alpha: Alpha,
}

pub struct Links<T: ?Sized> {
    inner: UnsafeCell<LinksInner<T>>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Dir {
    Left = 0,
    Right = 1,
}

impl Dir {
    // Equal keys descend to the right.
    #[inline]
    fn toward<K: Ord + ?Sized>(key: &K, node_key: &K) -> Dir {
        if key < node_key {
            Dir::Left
        } else {
            Dir::Right
        }
    }
}

impl Not for Dir {
    type Output = Dir;

    fn not(self) -> Self::Output {
        match self {
            Dir::Left => Dir::Right,
            Dir::Right => Dir::Left,
        }
    }
}

#[repr(C)]
struct LinksInner<T: ?Sized> {
    parent: Link<T>,
    children: [Link<T>; 2],
    _unpin: PhantomPinned,
}

type Link<T> = Option<NonNull<T>>;

impl<T> ScapegoatTree<T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    /// Returns a new empty tree balanced according to `alpha`.
    pub const fn new(alpha: Alpha) -> ScapegoatTree<T> {
        ScapegoatTree {
            root: None,
            len: 0,
            max_len: 0,
            alpha,
        }
    }

    /// Returns a new empty tree, validating `alpha` first.
    pub fn try_new(alpha: f64) -> Result<ScapegoatTree<T>, AlphaError> {
        Alpha::new(alpha).map(ScapegoatTree::new)
    }

    /// Returns `true` if the tree contains no elements.
    pub const fn is_empty(&self) -> bool {
        let empty = self.len() == 0;

        if cfg!(debug_assertions) {
            // Can't use assert_eq!() in const fn.
            assert!(empty == self.root.is_none());
        }

        empty
    }

    /// Returns the number of elements in the tree.
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns the greatest length the tree has reached since it was last rebuilt.
    pub const fn max_len(&self) -> usize {
        self.max_len
    }

    /// Returns the balance parameter of the tree.
    pub const fn alpha(&self) -> Alpha {
        self.alpha
    }

    /// Sets the balance parameter of the tree.
    ///
    /// The new value takes effect on the next insertion or removal; the tree is not rebalanced
    /// immediately. If `alpha` is invalid, the tree is left unchanged.
    pub fn set_alpha(&mut self, alpha: f64) -> Result<(), AlphaError> {
        self.alpha = Alpha::new(alpha)?;
        Ok(())
    }

    /// Returns the root element of the tree.
    pub fn root(&self) -> Option<Pin<&T>> {
        self.root
            .map(|root| unsafe { Pin::new_unchecked(root.as_ref()) })
    }

    /// Returns the height of the tree, or `None` if the tree is empty.
    ///
    /// A tree with a single element has height 0.
    pub fn height(&self) -> Option<usize> {
        let mut stack = Vec::new();
        stack.push((self.root?, 0));

        let mut height = 0;
        while let Some((node, depth)) = stack.pop() {
            height = height.max(depth);

            unsafe {
                let links = T::links(node).as_ref();
                stack.extend(links.left().map(|left| (left, depth + 1)));
                stack.extend(links.right().map(|right| (right, depth + 1)));
            }
        }

        Some(height)
    }

    #[doc(hidden)]
    pub fn assert_invariants(&self) {
        if let Some(root) = self.root {
            let parent = unsafe { T::links(root).as_ref().parent() };
            assert_eq!(parent, None, "root must not have a parent");
        }

        let nodes = self.in_order();
        assert_eq!(nodes.len(), self.len, "len must match the reachable node count");
        assert!(
            self.max_len >= self.len,
            "max_len ({}) must be at least len ({})",
            self.max_len,
            self.len
        );

        unsafe {
            for pair in nodes.windows(2) {
                assert!(
                    pair[0].as_ref().key() <= pair[1].as_ref().key(),
                    "in-order keys must be non-decreasing"
                );
            }

            for &node in &nodes {
                for dir in [Dir::Left, Dir::Right] {
                    if let Some(child) = T::links(node).as_ref().child(dir) {
                        // Ensure child's parent link points to this node.
                        let parent = T::links(child)
                            .as_ref()
                            .parent()
                            .expect("child parent pointer not set");
                        assert_eq!(node, parent);
                    }
                }
            }
        }
    }

    /// Returns `true` if the tree contains an element with the given key.
    #[inline]
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        T::Key: Borrow<Q> + Ord,
        Q: Ord + ?Sized,
    {
        self.get_raw(key).is_some()
    }

    /// Returns a reference to the node corresponding to `key`.
    ///
    /// If several nodes share the key, the one closest to the root is returned.
    pub fn get<Q>(&self, key: &Q) -> Option<Pin<&T>>
    where
        T::Key: Borrow<Q> + Ord,
        Q: Ord + ?Sized,
    {
        let ptr = self.get_raw(key)?;
        unsafe { Some(Pin::new_unchecked(ptr.as_ref())) }
    }

    /// Returns a pinned mutable reference to the node corresponding to `key`.
    ///
    /// The key of the returned node must not be modified in a way that changes its ordering.
    pub fn get_mut<Q>(&mut self, key: &Q) -> Option<Pin<&mut T>>
    where
        T::Key: Borrow<Q> + Ord,
        Q: Ord + ?Sized,
    {
        let mut ptr = self.get_raw(key)?;
        unsafe { Some(Pin::new_unchecked(ptr.as_mut())) }
    }

    fn get_raw<Q>(&self, key: &Q) -> Link<T>
    where
        T::Key: Borrow<Q> + Ord,
        Q: Ord + ?Sized,
    {
        let mut opt_cur = self.root;

        loop {
            let cur = opt_cur?;

            unsafe {
                match key.cmp(cur.as_ref().key().borrow()) {
                    Ordering::Less => opt_cur = T::links(cur).as_ref().left(),
                    Ordering::Equal => return Some(cur),
                    Ordering::Greater => opt_cur = T::links(cur).as_ref().right(),
                }
            }
        }
    }

    unsafe fn maybe_set_parent(&mut self, opt_node: Link<T>, parent: Link<T>) {
        let Some(node) = opt_node else {
            return;
        };

        unsafe { T::links(node).as_mut().set_parent(parent) };
    }

    #[inline]
    unsafe fn replace_child_or_set_root(
        &mut self,
        parent: Link<T>,
        old_child: NonNull<T>,
        new_child: Link<T>,
    ) {
        match parent {
            Some(parent) => unsafe { self.replace_child(parent, old_child, new_child) },
            None => self.root = new_child,
        }
    }

    // Replaces the child pointer of `parent` pointing at `old_child` with `new_child`.
    //
    // `new_child`'s parent pointer is not updated.
    //
    // # Safety
    //
    // The caller must ensure that the following conditions hold:
    // - `old_child` is a child node of `parent`.
    // - `new_child` is not a child node of `parent`.
    #[inline]
    unsafe fn replace_child(
        &mut self,
        parent: NonNull<T>,
        old_child: NonNull<T>,
        new_child: Option<NonNull<T>>,
    ) {
        unsafe {
            let dir = self.which_child(parent, old_child);

            if let Some(new_child) = new_child {
                debug_assert_ne!(
                    T::links(parent).as_ref().child(!dir),
                    Some(new_child),
                    "`new_child` must not be a child of `parent`"
                );
            }

            T::links(parent).as_mut().set_child(dir, new_child);
        }
    }

    // Moves `new` (and its subtree) into the position held by `old`.
    //
    // `old`'s own links are left untouched.
    unsafe fn transplant(&mut self, old: NonNull<T>, new: Link<T>) {
        unsafe {
            let parent = T::links(old).as_ref().parent();
            self.replace_child_or_set_root(parent, old, new);
            self.maybe_set_parent(new, parent);
        }
    }

    fn sibling(&self, node: NonNull<T>) -> Link<T> {
        unsafe {
            let parent = T::links(node).as_ref().parent()?;

            if T::links(parent).as_ref().left() == Some(node) {
                T::links(parent).as_ref().right()
            } else {
                T::links(parent).as_ref().left()
            }
        }
    }

    /// Inserts an item into the tree, returning a reference to it.
    ///
    /// Items whose key compares equal to an existing item are kept alongside it.
    ///
    /// This operation completes in amortized _O(log(n))_ time.
    pub fn insert(&mut self, item: T::Handle) -> Pin<&mut T> {
        let mut ptr = T::into_ptr(item);

        let depth = unsafe { self.insert_leaf(ptr) };
        self.max_len = self.max_len.max(self.len);

        if depth > self.alpha.height_bound(self.len) {
            // The tree is now too deep, so some ancestor of `ptr` is too tall for its size.
            match unsafe { self.find_scapegoat(ptr) } {
                Some((scapegoat, size)) => {
                    debug!(depth, len = self.len, size, "rebuilding at scapegoat");

                    unsafe { self.rebuild_subtree(scapegoat, size) };
                    self.max_len = self.len;
                }

                None => trace!(depth, len = self.len, "no scapegoat found"),
            }
        }

        unsafe { Pin::new_unchecked(ptr.as_mut()) }
    }

    // Links `ptr` into the tree as a leaf without rebalancing, returning its depth.
    unsafe fn insert_leaf(&mut self, ptr: NonNull<T>) -> usize {
        unsafe { T::links(ptr).as_mut().clear() };
        self.len += 1;

        let Some(mut parent) = self.root else {
            // Tree is empty. Set `item` as the root and return.
            self.root = Some(ptr);
            return 0;
        };

        let mut depth = 1;

        // Descend the tree, looking for a free slot.
        loop {
            unsafe {
                let dir = Dir::toward(ptr.as_ref().key(), parent.as_ref().key());
                let parent_links = T::links(parent).as_mut();

                match parent_links.child(dir) {
                    // Descend.
                    Some(child) => {
                        parent = child;
                        depth += 1;
                    }

                    // Set `item` as child.
                    None => {
                        parent_links.set_child(dir, Some(ptr));
                        T::links(ptr).as_mut().set_parent(Some(parent));
                        return depth;
                    }
                }
            }
        }
    }

    // Returns the minimum node in the subtree.
    #[inline]
    unsafe fn min_in_subtree(&self, root: NonNull<T>) -> NonNull<T> {
        let mut cur = root;

        while let Some(left) = unsafe { T::links(cur).as_ref().left() } {
            cur = left;
        }

        cur
    }

    /// Removes the node corresponding to `key` from the tree, returning it.
    ///
    /// If several nodes share the key, the one closest to the root is removed.
    ///
    /// The returned handle is the removed node itself, not the node that took over its position,
    /// so that ownership passes back to the caller. Returns `None` if no node matches `key`.
    pub fn remove<Q>(&mut self, key: &Q) -> Option<T::Handle>
    where
        T::Key: Borrow<Q> + Ord,
        Q: Ord + ?Sized,
    {
        let node = self.get_raw(key)?;

        // SAFETY: `node` was found in `self`.
        unsafe { Some(self.remove_at(node)) }
    }

    /// Removes an arbitrary node from the tree.
    ///
    /// If the tree has shrunk to `α` times its high-water mark or below, the whole tree is rebuilt.
    ///
    /// # Safety
    ///
    /// It is the caller's responsibility to ensure that `node` is an element of `self`, and not any
    /// other tree.
    pub unsafe fn remove_at(&mut self, node: NonNull<T>) -> T::Handle {
        // There are three possible cases:
        //
        // 1. `node` has no left child. Its right subtree (possibly empty) takes its place.
        // 2. `node` has no right child. Its left subtree takes its place.
        // 3. `node` has two children. Its successor[^1] takes its place, adopting both subtrees.
        //    The successor has no left child, so if it lies deeper than `node`'s right child it is
        //    first detached by elevating its right child.
        //
        // [^1]: The successor of a node `a` is the least node in `a`'s right subtree.

        unsafe {
            let left = T::links(node).as_ref().left();
            let right = T::links(node).as_ref().right();

            match (left, right) {
                (None, _) => self.transplant(node, right),

                (Some(_), None) => self.transplant(node, left),

                (Some(left), Some(right)) => {
                    let successor = self.min_in_subtree(right);

                    if successor != right {
                        let successor_right = T::links(successor).as_ref().right();
                        self.transplant(successor, successor_right);

                        T::links(successor).as_mut().set_right(Some(right));
                        T::links(right).as_mut().set_parent(Some(successor));
                    }

                    self.transplant(node, Some(successor));

                    T::links(successor).as_mut().set_left(Some(left));
                    T::links(left).as_mut().set_parent(Some(successor));
                }
            }

            T::links(node).as_mut().clear();
            self.len -= 1;

            if self.alpha.is_shrunk(self.len, self.max_len) {
                debug!(
                    len = self.len,
                    max_len = self.max_len,
                    "tree shrank below threshold, rebuilding"
                );

                if let Some(root) = self.root {
                    self.rebuild_subtree(root, self.len);
                }

                self.max_len = self.len;
            }

            T::from_ptr(node)
        }
    }

    /// Clears the tree, removing all elements.
    pub fn clear(&mut self) {
        let mut opt_cur = self.root;

        while let Some(cur) = opt_cur {
            unsafe {
                // Descend to the minimum node.
                let cur = self.min_in_subtree(cur);
                let parent = T::links(cur).as_ref().parent();

                let right = T::links(cur).as_ref().right();

                // Elevate the node's right child (which may be None).
                self.replace_child_or_set_root(parent, cur, right);
                self.maybe_set_parent(right, parent);

                // Drop the node.
                T::links(cur).as_mut().clear();
                drop(T::from_ptr(cur));
                self.len -= 1;

                // If the node had no right child, climb to the parent. If the node had no parent,
                // the tree is empty.
                opt_cur = right.or(parent);
            }
        }

        self.max_len = 0;

        debug_assert!(self.root.is_none());
        debug_assert_eq!(self.len(), 0);
    }

    unsafe fn which_child(&self, parent: NonNull<T>, child: NonNull<T>) -> Dir {
        if unsafe { T::links(parent).as_ref().left() } == Some(child) {
            Dir::Left
        } else {
            debug_assert_eq!(
                unsafe { T::links(parent).as_ref().right() },
                Some(child),
                "`child` must be a child of `parent`"
            );
            Dir::Right
        }
    }
}

impl<T> Drop for ScapegoatTree<T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    fn drop(&mut self) {
        self.clear();
    }
}

impl<T> fmt::Debug for ScapegoatTree<T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScapegoatTree")
            .field("root", &self.root)
            .field("len", &self.len)
            .field("max_len", &self.max_len)
            .field("alpha", &self.alpha)
            .finish()
    }
}

impl<T: ?Sized> Links<T> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            inner: UnsafeCell::new(LinksInner {
                parent: None,
                children: [None; 2],
                _unpin: PhantomPinned,
            }),
        }
    }

    #[inline]
    fn parent(&self) -> Link<T> {
        unsafe { (*self.inner.get()).parent }
    }

    #[inline]
    fn child(&self, dir: Dir) -> Link<T> {
        unsafe { (*self.inner.get()).children[dir as usize] }
    }

    #[inline]
    fn left(&self) -> Link<T> {
        self.child(Dir::Left)
    }

    #[inline]
    fn right(&self) -> Link<T> {
        self.child(Dir::Right)
    }

    #[inline]
    fn set_parent(&mut self, parent: Link<T>) -> Link<T> {
        mem::replace(&mut self.inner.get_mut().parent, parent)
    }

    #[inline]
    fn set_child(&mut self, dir: Dir, child: Link<T>) -> Link<T> {
        mem::replace(&mut self.inner.get_mut().children[dir as usize], child)
    }

    #[inline]
    fn set_left(&mut self, left: Link<T>) -> Link<T> {
        self.set_child(Dir::Left, left)
    }

    #[inline]
    fn set_right(&mut self, right: Link<T>) -> Link<T> {
        self.set_child(Dir::Right, right)
    }

    #[inline]
    fn clear(&mut self) {
        let inner = self.inner.get_mut();
        inner.parent = None;
        inner.children = [None; 2];
    }
}

impl<T: ?Sized> Default for Links<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized> fmt::Debug for Links<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Links")
            .field("parent", &self.parent())
            .field("left", &self.left())
            .field("right", &self.right())
            .finish()
    }
}

#[cfg(test)]
mod unit_tests {
    extern crate std;
    use std::prelude::v1::*;

    use crate::model::TestNode;

    use super::*;

    fn node(key: u32) -> Box<TestNode> {
        TestNode::new(key)
    }

    fn tree(alpha: f64) -> ScapegoatTree<TestNode> {
        ScapegoatTree::try_new(alpha).unwrap()
    }

    #[test]
    fn try_new_rejects_invalid_alpha() {
        assert_eq!(
            ScapegoatTree::<TestNode>::try_new(0.0).unwrap_err(),
            AlphaError::OutOfRange(0.0)
        );
        assert_eq!(
            ScapegoatTree::<TestNode>::try_new(f64::NAN).unwrap_err(),
            AlphaError::NaN
        );
    }

    #[test]
    fn set_alpha_keeps_old_value_on_error() {
        let mut tree = tree(0.5);

        assert!(tree.set_alpha(2.0).is_err());
        assert_eq!(tree.alpha().get(), 0.5);

        tree.set_alpha(0.75).unwrap();
        assert_eq!(tree.alpha().get(), 0.75);
    }

    #[test]
    fn empty_tree() {
        let mut tree = tree(0.5);

        assert!(tree.is_empty());
        assert!(tree.root().is_none());
        assert_eq!(tree.height(), None);
        assert!(tree.get(&0).is_none());
        assert!(tree.remove(&0).is_none());
        assert_eq!(tree.len(), 0);
        tree.assert_invariants();
    }

    #[test]
    fn single_node_never_rebuilds() {
        let mut tree = tree(0.5);

        let inserted = tree.insert(node(7));
        assert_eq!(inserted.key, 7);

        assert_eq!(tree.len(), 1);
        assert_eq!(tree.max_len(), 1);
        assert_eq!(tree.height(), Some(0));
        assert_eq!(tree.root().map(|r| r.key), Some(7));
        tree.assert_invariants();
    }

    #[test]
    fn insert_descends_ties_right() {
        // With α = 1 insertion never rebuilds, so placement is plain BST placement.
        let mut tree = tree(1.0);

        tree.insert(node(5));
        tree.insert(node(5));
        tree.insert(node(3));

        unsafe {
            let root = tree.root.unwrap();
            let left = TestNode::links(root).as_ref().left().unwrap();
            let right = TestNode::links(root).as_ref().right().unwrap();

            assert_eq!(left.as_ref().key, 3);
            assert_eq!(right.as_ref().key, 5);
            assert_eq!(TestNode::links(right).as_ref().parent(), Some(root));
        }

        tree.assert_invariants();
    }

    #[test]
    fn remove_returns_node_and_unlinks_it() {
        let mut tree = tree(0.75);

        for key in [4, 2, 6, 1, 3, 5, 7] {
            tree.insert(node(key));
        }

        let removed = tree.remove(&4).expect("key 4 was inserted");
        assert_eq!(removed.key, 4);

        // The successor took over the removed root's position.
        assert_eq!(tree.root().map(|r| r.key), Some(5));

        let links = &removed.links;
        assert_eq!(links.parent(), None);
        assert_eq!(links.left(), None);
        assert_eq!(links.right(), None);

        assert!(!tree.contains_key(&4));
        assert_eq!(tree.len(), 6);
        tree.assert_invariants();
    }

    #[test]
    fn remove_missing_key_is_noop() {
        let mut tree = tree(0.75);

        for key in [4, 2, 6] {
            tree.insert(node(key));
        }

        assert!(tree.remove(&5).is_none());
        assert_eq!(tree.len(), 3);
        assert_eq!(tree.max_len(), 3);
        tree.assert_invariants();
    }

    #[test]
    fn get_mut_finds_node() {
        let mut tree = tree(0.5);

        for key in 0..10 {
            tree.insert(node(key));
        }

        let found = tree.get_mut(&6).expect("key 6 was inserted");
        assert_eq!(found.key, 6);
        assert!(tree.get_mut(&10).is_none());
    }

    #[test]
    fn clear_resets_bookkeeping() {
        let mut tree = tree(0.5);

        for key in 0..32 {
            tree.insert(node(key));
        }

        tree.clear();

        assert!(tree.is_empty());
        assert_eq!(tree.max_len(), 0);
        tree.assert_invariants();

        tree.insert(node(1));
        assert_eq!(tree.len(), 1);
        tree.assert_invariants();
    }

    #[test]
    fn debug_formats_bookkeeping() {
        let mut tree = tree(0.5);
        tree.insert(node(1));

        let formatted = format!("{tree:?}");
        assert!(formatted.contains("len: 1"));
        assert!(formatted.contains("max_len: 1"));
    }
}
