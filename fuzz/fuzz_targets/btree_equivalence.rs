#![no_main]
use libfuzzer_sys::fuzz_target;

use cordyceps_scapegoat::model::{run_btree_equivalence, EquivalenceInput};

fuzz_target!(|input: EquivalenceInput| {
    run_btree_equivalence(input.alpha, input.ops)
});
