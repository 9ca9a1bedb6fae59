use std::ptr::NonNull;

use cordyceps::Linked;
use cordyceps_scapegoat::{Alpha, Links, ScapegoatTree, TreeNode};
use tracing_subscriber::EnvFilter;

#[derive(Debug)]
#[repr(C)]
struct TestNode {
    links: Links<TestNode>,
    key: u32,
}

impl TestNode {
    fn new(key: u32) -> Box<TestNode> {
        Box::new(TestNode {
            links: Links::new(),
            key,
        })
    }
}

unsafe impl Linked<Links<TestNode>> for TestNode {
    type Handle = Box<TestNode>;

    fn into_ptr(r: Self::Handle) -> NonNull<Self> {
        NonNull::new(Box::into_raw(r)).unwrap()
    }

    unsafe fn from_ptr(ptr: NonNull<Self>) -> Self::Handle {
        unsafe { Box::from_raw(ptr.as_ptr()) }
    }

    unsafe fn links(ptr: NonNull<Self>) -> NonNull<Links<TestNode>> {
        // SAFETY: Self is #[repr(C)] and `links` is first field
        ptr.cast()
    }
}

impl TreeNode<Links<TestNode>> for TestNode {
    type Key = u32;

    fn key(&self) -> &Self::Key {
        &self.key
    }
}

fn print_tree(tree: &ScapegoatTree<TestNode>, name: &str) {
    let mut graph = String::new();
    tree.dotgraph(name, &mut graph).unwrap();

    println!(
        "// len={} max_len={} height={:?}",
        tree.len(),
        tree.max_len(),
        tree.height()
    );
    println!("{graph}");
}

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let alpha = Alpha::new(0.57).unwrap();
    let mut tree: ScapegoatTree<TestNode> = ScapegoatTree::new(alpha);

    for key in (1..=18).rev() {
        tree.insert(TestNode::new(key));
        tree.assert_invariants();
    }
    print_tree(&tree, "inserted");

    for key in [18, 17, 15, 14, 12, 10, 8] {
        let removed = tree.remove(&key).unwrap();
        assert_eq!(removed.key, key);
        tree.assert_invariants();
    }
    print_tree(&tree, "removed");

    assert_eq!(tree.root().map(|root| root.key), Some(13));

    drop(tree);
}
