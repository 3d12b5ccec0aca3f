//! Operator capability contract and the minimal builtin set.
//!
//! The numeric operator library proper lives outside this crate; the core only
//! requires shape inference, optional compile-time evaluation, and runtime
//! compute. The builtins carried here are the ones the branch-free select
//! synthesis and the tests need.

mod elementwise;
mod movement;
mod registry;

use std::fmt;

use crate::error::Result;
use crate::ir::{TensorSpec, TensorValue, ValueType};

pub use elementwise::{Arith, ArithKind, Convert, Less};
pub use movement::{Broadcast, Concat, Gather, Reshape};
pub use registry::{default_registry, AttrValue, OpAttrs, OpRegistry};

/// External operator capability.
///
/// `eval` is used only for compile-time folding; returning `None` marks the
/// operator as not foldable and is never an error. `compute` runs the operator
/// against materialized host values.
pub trait Operator: fmt::Debug + Send + Sync {
    fn name(&self) -> &str;

    /// Infers the result type from operand specs, rejecting invalid operand
    /// combinations before an instruction enters a module.
    fn output_spec(&self, inputs: &[TensorSpec]) -> Result<ValueType>;

    fn eval(&self, _inputs: &[TensorValue]) -> Option<Result<TensorValue>> {
        None
    }

    fn compute(&self, inputs: &[TensorValue]) -> Result<TensorValue>;
}
