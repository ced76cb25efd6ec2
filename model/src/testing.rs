//! Proptest strategies shared by the workspace's tests.

use crate::query::execution_state::{ExecutionState, StateTransitionType};
use proptest::prelude::{RngExt, prop};
use proptest::strategy::{Just, Strategy};

/// Wire names of every scalar type the engine reports.
pub const SCALAR_TYPE_NAMES: &[&str] = &[
    "bigint",
    "boolean",
    "date",
    "double",
    "varbinary",
    "HyperLogLog",
    "varchar",
    "integer",
    "decimal",
    "time",
    "time with time zone",
    "timestamp",
    "timestamp with time zone",
];

pub fn arb_scalar_type_name() -> impl Strategy<Value = &'static str> {
    prop::sample::select(SCALAR_TYPE_NAMES)
}

/// Type names the engine might invent that are not part of the vocabulary.
pub fn arb_unknown_type_name() -> impl Strategy<Value = String> {
    "[a-z]{3,12}".prop_filter("must not be a known type", |name| {
        !SCALAR_TYPE_NAMES.contains(&name.as_str()) && name != "array" && name != "map"
    })
}

/// Strategy to produce a sequence of execution states
pub fn arb_state_sequence(
    transition: StateTransitionType,
) -> impl Strategy<Value = Vec<ExecutionState>> {
    Just(vec![ExecutionState::Unstarted]).prop_perturb(move |mut states, mut rng| {
        loop {
            let current = *states.last().unwrap();
            let valid_nexts = current.transitions();

            match transition {
                StateTransitionType::Invalid => {
                    if valid_nexts.is_empty() || rng.random_bool(0.2) {
                        let invalid_nexts = current.invalid_transitions();
                        let idx = rng.random_range(0..invalid_nexts.len());
                        states.push(invalid_nexts[idx]);
                        return states;
                    }
                }
                StateTransitionType::Valid => {
                    if valid_nexts.is_empty() {
                        return states;
                    }
                }
            }

            let idx = rng.random_range(0..valid_nexts.len());
            states.push(valid_nexts[idx]);
        }
    })
}
