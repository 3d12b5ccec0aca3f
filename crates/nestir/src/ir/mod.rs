//! Nested-graph intermediate representation.
//!
//! A [`Program`] owns a tree of [`Module`]s (the main graph plus branch and
//! loop bodies) and a single arena of [`Instruction`]s addressed by stable
//! [`InsId`] handles. Submodules have their own parameter/literal namespaces;
//! values cross module boundaries only as explicit control-flow operands, or
//! as direct references into an enclosing scope that the inliner later remaps.

mod instruction;
mod module;
mod shape;
mod value;

pub use instruction::{InsId, Instruction, ModuleId, Op, ValueType};
pub use module::{Module, Program};
pub use shape::{DType, TensorSpec};
pub use value::{TensorValue, ValueData};
