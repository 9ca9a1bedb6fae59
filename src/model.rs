extern crate std;

use std::{collections::BTreeMap, prelude::v1::*, ptr::NonNull};

use arbitrary::{Arbitrary, Unstructured};
use cordyceps::Linked;
use proptest::strategy::Strategy;

use crate::{Alpha, Links, ScapegoatTree, TreeNode};

#[derive(Debug)]
#[repr(C)]
pub struct TestNode {
    pub links: Links<TestNode>,
    pub key: u32,
}

impl TestNode {
    pub fn new(key: u32) -> Box<TestNode> {
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

#[derive(Copy, Clone, Debug, Arbitrary)]
pub enum ItemValue {
    Index(usize),
    Random(u32),
}

proptest::prop_compose! {
    fn index_strategy()(
        index in 0usize..1000,
    ) -> ItemValue {
        ItemValue::Index(index)
    }
}

proptest::prop_compose! {
    fn random_strategy()(
        random in 0u32..1000,
    ) -> ItemValue {
        ItemValue::Random(random)
    }
}

fn value_strategy() -> impl Strategy<Value = ItemValue> {
    proptest::prop_oneof![index_strategy(), random_strategy()]
}

#[derive(Copy, Clone, Debug, Arbitrary)]
pub enum Op {
    Insert(ItemValue),
    Get(ItemValue),
    Remove(ItemValue),
}

impl Op {
    // `Index` values pick an existing key so that lookups and removals hit the tree.
    fn finalize(self, model: &Multiset) -> FinalOp {
        fn get_value(m: &Multiset, i: ItemValue) -> u32 {
            match i {
                ItemValue::Index(idx) => {
                    if m.is_empty() {
                        idx as u32
                    } else {
                        let nth = idx % m.len();
                        m.keys().nth(nth).copied().unwrap_or(idx as u32)
                    }
                }
                ItemValue::Random(v) => v,
            }
        }

        match self {
            Op::Insert(item) => FinalOp::Insert(get_value(model, item)),
            Op::Get(item) => FinalOp::Get(get_value(model, item)),
            Op::Remove(item) => FinalOp::Remove(get_value(model, item)),
        }
    }
}

#[derive(Copy, Clone, Debug)]
enum FinalOp {
    Insert(u32),
    Get(u32),
    Remove(u32),
}

pub fn op_strategy() -> impl Strategy<Value = Op> {
    proptest::prop_oneof![
        value_strategy().prop_map(Op::Insert),
        value_strategy().prop_map(Op::Get),
        value_strategy().prop_map(Op::Remove),
    ]
}

/// Balance parameters from `0.5` (strictest) to `1.0` (unbounded).
pub fn alpha_strategy() -> impl Strategy<Value = Alpha> {
    (50u32..=100).prop_map(alpha_from_percent)
}

fn alpha_from_percent(percent: u32) -> Alpha {
    Alpha::new(f64::from(percent) / 100.0).expect("percentages up to 100 are valid")
}

#[derive(Clone, Debug)]
pub struct EquivalenceInput {
    pub alpha: Alpha,
    pub ops: Vec<Op>,
}

impl<'a> Arbitrary<'a> for EquivalenceInput {
    fn arbitrary(u: &mut Unstructured<'a>) -> arbitrary::Result<Self> {
        let percent = u.int_in_range(50..=100)?;
        let ops = Vec::<Op>::arbitrary(u)?;

        Ok(EquivalenceInput {
            alpha: alpha_from_percent(percent),
            ops,
        })
    }
}

// Key -> number of copies.
type Multiset = BTreeMap<u32, usize>;

pub fn run_btree_equivalence(alpha: Alpha, ops: Vec<Op>) {
    let mut model = Multiset::new();
    let mut tree: ScapegoatTree<TestNode> = ScapegoatTree::new(alpha);

    // Greatest length reached since the whole tree was last rebuilt. Neither removals nor
    // rebuilding insertions deepen the tree, so its height is bounded by `h(peak_len)`.
    let mut peak_len = 0;

    #[inline]
    #[allow(clippy::boxed_local)]
    fn node_key(node: Box<TestNode>) -> u32 {
        node.key
    }

    for (op_id, op) in ops.into_iter().enumerate() {
        let final_op = op.finalize(&model);

        match final_op {
            FinalOp::Insert(value) => {
                *model.entry(value).or_default() += 1;

                let inserted = tree.insert(TestNode::new(value)).key;
                peak_len = peak_len.max(tree.len());

                assert_eq!(inserted, value, "FinalOp #{op_id}: {op:?}");
            }

            FinalOp::Get(value) => {
                let from_model = model.get_key_value(&value).map(|(key, _)| *key);
                let from_tree = tree.get(&value).map(|node| node.key);

                assert_eq!(from_model, from_tree, "FinalOp #{op_id}: {op:?}");
            }

            FinalOp::Remove(value) => {
                let from_model = model.get(&value).copied().map(|count| {
                    if count > 1 {
                        model.insert(value, count - 1);
                    } else {
                        model.remove(&value);
                    }
                    value
                });
                let from_tree = tree.remove(&value).map(node_key);

                // A removal only resets the high-water mark when it rebuilt the whole tree.
                if from_tree.is_some() && tree.max_len() == tree.len() {
                    peak_len = tree.len();
                }

                assert_eq!(from_model, from_tree, "FinalOp #{op_id}: {op:?}");
            }
        }

        tree.assert_invariants();

        let height = tree.height().unwrap_or(0);
        let bound = tree.alpha().height_bound(peak_len);
        assert!(
            height <= bound,
            "FinalOp #{op_id}: {op:?}: height {height} exceeds {bound} (peak len {peak_len})"
        );

        let model_len: usize = model.values().sum();
        assert_eq!(model_len, tree.len(), "FinalOp #{op_id}: {op:?}");

        let model_keys = model
            .iter()
            .flat_map(|(&key, &count)| core::iter::repeat(key).take(count));
        let tree_keys = tree.in_order().into_iter().map(|node| unsafe { node.as_ref().key });
        assert!(model_keys.eq(tree_keys), "FinalOp #{op_id}: {op:?}");
    }
}
