use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::GraphError;

/// Scalar element types supported by the control-flow core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DType {
    I1,
    Si32,
    Si64,
    F32,
}

impl DType {
    pub fn is_integer(self) -> bool {
        matches!(self, DType::Si32 | DType::Si64)
    }

    pub fn is_float(self) -> bool {
        matches!(self, DType::F32)
    }

    /// Storage size of one element at the execution boundary.
    pub fn size_in_bytes(self) -> usize {
        match self {
            DType::I1 => 1,
            DType::Si32 | DType::F32 => 4,
            DType::Si64 => 8,
        }
    }
}

impl FromStr for DType {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "i1" => Ok(DType::I1),
            "si32" => Ok(DType::Si32),
            "si64" => Ok(DType::Si64),
            "f32" => Ok(DType::F32),
            other => Err(GraphError::parse(format!("unknown dtype `{other}`"))),
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DType::I1 => "i1",
            DType::Si32 => "si32",
            DType::Si64 => "si64",
            DType::F32 => "f32",
        };
        f.write_str(name)
    }
}

/// Tensor metadata coupling dtype and a fully static shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TensorSpec {
    pub dtype: DType,
    pub dims: Vec<usize>,
}

impl TensorSpec {
    pub fn new(dtype: DType, dims: impl Into<Vec<usize>>) -> Self {
        Self {
            dtype,
            dims: dims.into(),
        }
    }

    /// Single-element spec, used for loop counters and branch conditions.
    pub fn scalar(dtype: DType) -> Self {
        Self::new(dtype, [1])
    }

    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    pub fn elements(&self) -> usize {
        self.dims.iter().product()
    }

    pub fn byte_len(&self) -> usize {
        self.elements() * self.dtype.size_in_bytes()
    }
}

impl fmt::Display for TensorSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dims = self
            .dims
            .iter()
            .map(|d| d.to_string())
            .collect::<Vec<_>>()
            .join("x");
        if dims.is_empty() {
            write!(f, "tensor<{} x []>", self.dtype)
        } else {
            write!(f, "tensor<{} x {dims}>", self.dtype)
        }
    }
}
