//! Strategies for generating integration variables.
use crate::variable::{IntegrationVariable, TensorRank};
use ::proptest::collection::vec;
use ::proptest::prelude::*;

pub fn tensor_rank() -> impl Strategy<Value = TensorRank> {
    prop_oneof![
        Just(TensorRank::Scalar),
        Just(TensorRank::Vector),
        Just(TensorRank::SymmetricTensor)
    ]
}

pub fn space_dimension() -> impl Strategy<Value = usize> {
    1..=3usize
}

impl Arbitrary for TensorRank {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_args: Self::Parameters) -> Self::Strategy {
        tensor_rank().boxed()
    }
}

/// Variables with distinct names `v0`, `v1`, ..., arbitrary ranks and array sizes up to
/// `max_array_size`.
pub fn integration_variables(
    max_variables: usize,
    max_array_size: u16,
) -> impl Strategy<Value = Vec<IntegrationVariable>> {
    vec((tensor_rank(), 1..=max_array_size), 0..=max_variables).prop_map(|specs| {
        specs
            .into_iter()
            .enumerate()
            .map(|(i, (rank, array_size))| IntegrationVariable::new(format!("v{}", i), rank, array_size))
            .collect()
    })
}
