extern crate alloc;

use alloc::vec::Vec;
use core::ptr::NonNull;

use tracing::trace;

use crate::{Link, Links, ScapegoatTree, TreeNode};

impl<T> ScapegoatTree<T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    // Climbs from the freshly inserted `node` towards the root, returning the first ancestor whose
    // subtree is too tall for its size, along with that subtree's size.
    //
    // `height` is the distance climbed so far, which is a lower bound on the height of the
    // ancestor's subtree. Returns `None` if no ancestor qualifies, in which case the caller does
    // not rebuild.
    pub(crate) unsafe fn find_scapegoat(&self, node: NonNull<T>) -> Option<(NonNull<T>, usize)> {
        let mut cur = node;
        let mut size = 1;
        let mut height = 0;

        while let Some(parent) = unsafe { T::links(cur).as_ref().parent() } {
            height += 1;

            // Size of the subtree rooted at `parent`.
            let total = 1 + size + Self::subtree_size(self.sibling(cur));

            if height > self.alpha.height_bound(total) {
                return Some((parent, total));
            }

            cur = parent;
            size = total;
        }

        None
    }

    /// Returns the number of nodes in the subtree rooted at `root`.
    pub(crate) fn subtree_size(root: Link<T>) -> usize {
        let mut stack: Vec<NonNull<T>> = root.into_iter().collect();
        let mut count = 0;

        while let Some(node) = stack.pop() {
            count += 1;

            unsafe {
                let links = T::links(node).as_ref();
                stack.extend(links.left());
                stack.extend(links.right());
            }
        }

        count
    }

    // Collects the `len` nodes of the subtree rooted at `root` in order.
    unsafe fn flatten(root: NonNull<T>, len: usize) -> Vec<NonNull<T>> {
        let mut nodes = Vec::with_capacity(len);
        let mut stack = Vec::new();
        let mut opt_cur = Some(root);

        loop {
            // Descend to the minimum of the current subtree, remembering the path.
            while let Some(cur) = opt_cur {
                stack.push(cur);
                opt_cur = unsafe { T::links(cur).as_ref().left() };
            }

            let Some(cur) = stack.pop() else {
                break;
            };

            nodes.push(cur);
            opt_cur = unsafe { T::links(cur).as_ref().right() };
        }

        nodes
    }

    // Returns every node of the tree in order.
    pub(crate) fn in_order(&self) -> Vec<NonNull<T>> {
        match self.root {
            Some(root) => unsafe { Self::flatten(root, self.len) },
            None => Vec::new(),
        }
    }

    // Links `nodes` into a perfectly balanced subtree hanging from `parent`, returning its root.
    //
    // The root of each range is its upper median, so every left subtree holds as many nodes as its
    // right sibling or one more.
    unsafe fn build_balanced(nodes: &[NonNull<T>], parent: Link<T>) -> Link<T> {
        if nodes.is_empty() {
            return None;
        }

        let mid = nodes.len() / 2;
        let root = nodes[mid];

        unsafe {
            let left = Self::build_balanced(&nodes[..mid], Some(root));
            let right = Self::build_balanced(&nodes[mid + 1..], Some(root));

            let links = T::links(root).as_mut();
            links.set_parent(parent);
            links.set_left(left);
            links.set_right(right);
        }

        Some(root)
    }

    // Replaces the subtree rooted at `scapegoat`, which holds `len` nodes, with a perfectly
    // balanced subtree made of the same nodes, in the same position.
    pub(crate) unsafe fn rebuild_subtree(&mut self, scapegoat: NonNull<T>, len: usize) {
        trace!(len, "rebuilding subtree");

        unsafe {
            let parent = T::links(scapegoat).as_ref().parent();
            let dir = parent.map(|parent| self.which_child(parent, scapegoat));

            let nodes = Self::flatten(scapegoat, len);
            debug_assert_eq!(nodes.len(), len, "subtree size mismatch");

            let new_root = Self::build_balanced(&nodes, parent);

            match (parent, dir) {
                (Some(parent), Some(dir)) => {
                    T::links(parent).as_mut().set_child(dir, new_root);
                }
                _ => self.root = new_root,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    extern crate std;
    use std::prelude::v1::*;

    use cordyceps::Linked;

    use crate::model::TestNode;

    use super::*;

    type Tree = ScapegoatTree<TestNode>;

    #[test]
    fn subtree_size_of_manual_tree() {
        //   4
        //    \
        //     6
        //    / \
        //   5   7
        let root = TestNode::into_ptr(TestNode::new(4));
        let right = TestNode::into_ptr(TestNode::new(6));
        let right_left = TestNode::into_ptr(TestNode::new(5));
        let right_right = TestNode::into_ptr(TestNode::new(7));

        unsafe {
            TestNode::links(root).as_mut().set_right(Some(right));
            TestNode::links(right).as_mut().set_parent(Some(root));
            TestNode::links(right).as_mut().set_left(Some(right_left));
            TestNode::links(right).as_mut().set_right(Some(right_right));
            TestNode::links(right_left).as_mut().set_parent(Some(right));
            TestNode::links(right_right).as_mut().set_parent(Some(right));

            assert_eq!(Tree::subtree_size(Some(root)), 4);
            assert_eq!(Tree::subtree_size(Some(right)), 3);
            assert_eq!(Tree::subtree_size(Some(right_left)), 1);
            assert_eq!(Tree::subtree_size(None), 0);

            let keys: Vec<u32> = Tree::flatten(root, 4)
                .into_iter()
                .map(|node| node.as_ref().key)
                .collect();
            assert_eq!(keys, [4, 5, 6, 7]);

            for ptr in [root, right, right_left, right_right] {
                drop(TestNode::from_ptr(ptr));
            }
        }
    }

    #[test]
    fn build_balanced_picks_upper_median() {
        let nodes: Vec<NonNull<TestNode>> = (0..4)
            .map(|key| TestNode::into_ptr(TestNode::new(key)))
            .collect();

        unsafe {
            let root = Tree::build_balanced(&nodes, None).unwrap();
            assert_eq!(root, nodes[2]);

            let links = TestNode::links(root).as_ref();
            assert_eq!(links.parent(), None);
            assert_eq!(links.left(), Some(nodes[1]));
            assert_eq!(links.right(), Some(nodes[3]));

            let left = TestNode::links(nodes[1]).as_ref();
            assert_eq!(left.left(), Some(nodes[0]));
            assert_eq!(left.right(), None);
            assert_eq!(left.parent(), Some(root));

            for ptr in nodes {
                drop(TestNode::from_ptr(ptr));
            }
        }
    }

    #[test]
    fn rebuild_whole_degenerate_tree() {
        // α = 1 never rebuilds on insert, so ascending keys form a right spine.
        let mut tree = Tree::try_new(1.0).unwrap();

        for key in 0..15 {
            tree.insert(TestNode::new(key));
        }
        assert_eq!(tree.height(), Some(14));

        let root = tree.root.unwrap();
        unsafe { tree.rebuild_subtree(root, 15) };

        assert_eq!(tree.height(), Some(3));
        assert_eq!(tree.root().map(|r| r.key), Some(7));
        tree.assert_invariants();
    }

    #[test]
    fn rebuild_inner_subtree_keeps_position() {
        let mut tree = Tree::try_new(1.0).unwrap();

        // 10 on the left of 20, then a right spine 21..=26 under 20.
        for key in [20, 10, 21, 22, 23, 24, 25, 26] {
            tree.insert(TestNode::new(key));
        }
        assert_eq!(tree.height(), Some(6));

        let spine = tree.get_raw(&21).unwrap();
        let size = Tree::subtree_size(Some(spine));
        assert_eq!(size, 6);

        unsafe { tree.rebuild_subtree(spine, size) };

        let root = tree.root.unwrap();
        let new_right = unsafe { TestNode::links(root).as_ref().right().unwrap() };
        assert_eq!(unsafe { new_right.as_ref().key }, 24);
        assert_eq!(tree.root().map(|r| r.key), Some(20));
        assert_eq!(tree.height(), Some(3));
        tree.assert_invariants();
    }

    #[test]
    fn scapegoat_is_nearest_unbalanced_ancestor() {
        let mut tree = Tree::try_new(1.0).unwrap();

        for key in 0..4 {
            tree.insert(TestNode::new(key));
        }

        // Inspect the spine 0 -> 1 -> 2 -> 3 as if it were checked with α = 0.5.
        tree.set_alpha(0.5).unwrap();
        let deepest = tree.get_raw(&3).unwrap();

        // Climbing from 3: node 2 has size 2 and height 1 (bound 1); node 1 has size 3 and
        // height 2 (bound 1), so it is the scapegoat.
        let (scapegoat, size) = unsafe { tree.find_scapegoat(deepest) }.unwrap();
        assert_eq!(unsafe { scapegoat.as_ref().key }, 1);
        assert_eq!(size, 3);
    }

    #[test]
    fn no_scapegoat_in_balanced_tree() {
        let mut tree = Tree::try_new(0.5).unwrap();

        for key in [1, 0, 2] {
            tree.insert(TestNode::new(key));
        }

        let leaf = tree.get_raw(&2).unwrap();
        assert!(unsafe { tree.find_scapegoat(leaf) }.is_none());
    }
}
