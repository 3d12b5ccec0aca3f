pub mod error;
pub mod exec;
pub mod ingest;
pub mod ir;
pub mod ops;
pub mod passes;

pub use error::{GraphError, Result};
pub use ir::{
    DType, InsId, Instruction, Module, ModuleId, Op, Program, TensorSpec, TensorValue, ValueType,
};
pub use ops::Operator;
