use std::fmt;
use std::sync::Arc;

use crate::error::{GraphError, Result};
use crate::ops::Operator;

use super::shape::TensorSpec;
use super::value::TensorValue;

/// Stable handle to an instruction in the program's arena.
///
/// Handles stay valid until the instruction is explicitly removed; replacing
/// an instruction rewires every recorded consumer to the replacement rather
/// than invalidating the handle underneath them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InsId(pub u32);

/// Handle to a module in the program's module arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleId(pub u32);

/// Instruction kind.
///
/// Structural kinds (`Parameter`, `Literal`, `Outline`, `Return`) and
/// control-flow kinds (`If`, `Loop`, `TupleGet`) are owned by this core;
/// everything numeric dispatches through the external [`Operator`] capability.
#[derive(Debug, Clone)]
pub enum Op {
    /// Named input placeholder, shape-only.
    Parameter(String),
    /// Immutable embedded constant tensor.
    Literal(TensorValue),
    /// Shape-only placeholder with no data, used to unify branch output shapes.
    Outline,
    /// Terminal instruction listing a module's final outputs.
    Return,
    /// Conditional: one single-element condition operand, two submodules.
    If,
    /// Bounded loop: operands `[trip_count, cond, carried.., scan storage..]`,
    /// one body submodule.
    Loop,
    /// Reads element `index` out of a multi-output node's logical result.
    TupleGet(usize),
    /// External numeric operator.
    Compute(Arc<dyn Operator>),
}

impl Op {
    pub fn name(&self) -> &str {
        match self {
            Op::Parameter(_) => "@param",
            Op::Literal(_) => "@literal",
            Op::Outline => "@outline",
            Op::Return => "@return",
            Op::If => "if",
            Op::Loop => "loop",
            Op::TupleGet(_) => "tuple_get",
            Op::Compute(op) => op.name(),
        }
    }

    /// Placeholders occupy the leading prefix of a module body.
    pub fn is_placeholder(&self) -> bool {
        matches!(self, Op::Parameter(_) | Op::Literal(_) | Op::Outline)
    }
}

/// Logical result type of an instruction. Control-flow nodes produce tuples,
/// consumed exclusively through [`Op::TupleGet`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueType {
    Tensor(TensorSpec),
    Tuple(Vec<TensorSpec>),
}

impl ValueType {
    pub fn tensor(&self) -> Result<&TensorSpec> {
        match self {
            ValueType::Tensor(spec) => Ok(spec),
            ValueType::Tuple(_) => Err(GraphError::invariant(
                "expected a tensor result, found a tuple; use tuple_get",
            )),
        }
    }

    pub fn tuple_element(&self, index: usize) -> Result<&TensorSpec> {
        match self {
            ValueType::Tuple(specs) => specs.get(index).ok_or_else(|| {
                GraphError::invariant(format!(
                    "tuple index {index} out of range for {} elements",
                    specs.len()
                ))
            }),
            ValueType::Tensor(_) => Err(GraphError::invariant(
                "tuple_get applied to a single-output instruction",
            )),
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::Tensor(spec) => write!(f, "{spec}"),
            ValueType::Tuple(specs) => {
                let inner = specs
                    .iter()
                    .map(|s| s.to_string())
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "tuple<{inner}>")
            }
        }
    }
}

/// One operation node: kind, ordered data dependencies, referenced submodules,
/// and the computed result type.
#[derive(Debug, Clone)]
pub struct Instruction {
    pub(crate) id: InsId,
    pub(crate) op: Op,
    pub(crate) inputs: Vec<InsId>,
    pub(crate) submodules: Vec<ModuleId>,
    pub(crate) out: ValueType,
}

impl Instruction {
    pub fn id(&self) -> InsId {
        self.id
    }

    pub fn op(&self) -> &Op {
        &self.op
    }

    pub fn inputs(&self) -> &[InsId] {
        &self.inputs
    }

    pub fn submodules(&self) -> &[ModuleId] {
        &self.submodules
    }

    pub fn out(&self) -> &ValueType {
        &self.out
    }
}
