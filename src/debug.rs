extern crate std;

use core::ptr::NonNull;
use std::{collections::VecDeque, fmt, prelude::v1::*};

use crate::{Links, ScapegoatTree, TreeNode};

impl<T> ScapegoatTree<T>
where
    T: TreeNode<Links<T>>,
{
    /// Writes the tree to `w` as a Graphviz digraph named `name`, one rank per tree level.
    ///
    /// Missing children are drawn as points so that left and right children stay distinguishable.
    pub fn dotgraph<W>(&self, name: &str, mut w: W) -> fmt::Result
    where
        W: fmt::Write,
        T::Key: fmt::Display,
    {
        let root = match self.root {
            Some(r) => r,
            None => return write!(w, "digraph \"graph-{name}\" {{}}"),
        };

        enum Item<T: ?Sized> {
            Node(NonNull<T>),
            Missing(u32),
        }

        let mut queue = VecDeque::new();
        queue.push_back(Item::Node(root));

        write!(
            w,
            "digraph \"graph-{name}\" {{\n subgraph \"subgraph-{name}\" {{"
        )?;

        let mut missing = 0;
        let mut links = String::new();

        while !queue.is_empty() {
            use fmt::Write;

            write!(w, "{{rank=same; ")?;

            for _ in 0..queue.len() {
                let Some(item) = queue.pop_front() else {
                    break;
                };

                let node = match item {
                    Item::Node(node) => node,
                    Item::Missing(id) => {
                        write!(w, "\"graph{name}-missing{id}\" [shape=point]; ")?;
                        continue;
                    }
                };

                let key = unsafe { node.as_ref().key() };
                write!(w, "\"graph{name}-{key}\" [label=\"{key}\"]; ")?;

                let node_links = unsafe { T::links(node).as_ref() };
                for child in [node_links.left(), node_links.right()] {
                    match child {
                        Some(child) => {
                            let child_key = unsafe { child.as_ref().key() };

                            queue.push_back(Item::Node(child));
                            writeln!(
                                links,
                                "\"graph{name}-{key}\" -> \"graph{name}-{child_key}\";"
                            )?;
                        }

                        None => {
                            queue.push_back(Item::Missing(missing));
                            writeln!(
                                links,
                                "\"graph{name}-{key}\" -> \"graph{name}-missing{missing}\";"
                            )?;
                            missing += 1;
                        }
                    }
                }
            }

            writeln!(w, "}}")?;
        }

        w.write_str(&links)?;

        w.write_str(" }\n}")
    }
}

#[cfg(test)]
mod tests {
    use crate::model::TestNode;

    use super::*;

    #[test]
    fn empty_graph() {
        let tree: ScapegoatTree<TestNode> = ScapegoatTree::try_new(0.5).unwrap();

        let mut out = String::new();
        tree.dotgraph("empty", &mut out).unwrap();

        assert_eq!(out, "digraph \"graph-empty\" {}");
    }

    #[test]
    fn three_node_graph() {
        let mut tree: ScapegoatTree<TestNode> = ScapegoatTree::try_new(0.5).unwrap();
        for key in [2, 1, 3] {
            tree.insert(TestNode::new(key));
        }

        let mut out = String::new();
        tree.dotgraph("t", &mut out).unwrap();

        assert!(out.starts_with("digraph \"graph-t\" {"));
        assert!(out.contains("{rank=same; \"grapht-2\" [label=\"2\"]; }"));
        assert!(out.contains("\"grapht-2\" -> \"grapht-1\";"));
        assert!(out.contains("\"grapht-2\" -> \"grapht-3\";"));
        assert!(out.contains("\"grapht-1\" -> \"grapht-missing0\";"));
        assert!(out.contains("\"grapht-3\" -> \"grapht-missing3\";"));
        assert!(out.ends_with(" }\n}"));
    }
}
