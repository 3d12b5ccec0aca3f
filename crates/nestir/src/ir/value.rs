use serde::{Deserialize, Serialize};

use crate::error::{GraphError, Result};

use super::shape::{DType, TensorSpec};

/// Typed dense storage backing a [`TensorValue`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ValueData {
    I1(Vec<bool>),
    Si32(Vec<i32>),
    Si64(Vec<i64>),
    F32(Vec<f32>),
}

impl ValueData {
    pub fn dtype(&self) -> DType {
        match self {
            ValueData::I1(_) => DType::I1,
            ValueData::Si32(_) => DType::Si32,
            ValueData::Si64(_) => DType::Si64,
            ValueData::F32(_) => DType::F32,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ValueData::I1(v) => v.len(),
            ValueData::Si32(v) => v.len(),
            ValueData::Si64(v) => v.len(),
            ValueData::F32(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Host constant tensor: an immutable value embedded in the graph or crossing
/// the execution boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TensorValue {
    spec: TensorSpec,
    data: ValueData,
}

impl TensorValue {
    pub fn new(spec: TensorSpec, data: ValueData) -> Result<Self> {
        if data.dtype() != spec.dtype {
            return Err(GraphError::shape(format!(
                "literal dtype {} does not match spec dtype {}",
                data.dtype(),
                spec.dtype
            )));
        }
        if data.len() != spec.elements() {
            return Err(GraphError::shape(format!(
                "literal holds {} elements but spec {} expects {}",
                data.len(),
                spec,
                spec.elements()
            )));
        }
        Ok(Self { spec, data })
    }

    pub fn from_f32(dims: impl Into<Vec<usize>>, values: Vec<f32>) -> Result<Self> {
        Self::new(TensorSpec::new(DType::F32, dims), ValueData::F32(values))
    }

    pub fn from_i32(dims: impl Into<Vec<usize>>, values: Vec<i32>) -> Result<Self> {
        Self::new(TensorSpec::new(DType::Si32, dims), ValueData::Si32(values))
    }

    pub fn from_i64(dims: impl Into<Vec<usize>>, values: Vec<i64>) -> Result<Self> {
        Self::new(TensorSpec::new(DType::Si64, dims), ValueData::Si64(values))
    }

    pub fn from_bool(dims: impl Into<Vec<usize>>, values: Vec<bool>) -> Result<Self> {
        Self::new(TensorSpec::new(DType::I1, dims), ValueData::I1(values))
    }

    pub fn scalar_bool(value: bool) -> Self {
        Self {
            spec: TensorSpec::scalar(DType::I1),
            data: ValueData::I1(vec![value]),
        }
    }

    pub fn scalar_i64(value: i64) -> Self {
        Self {
            spec: TensorSpec::scalar(DType::Si64),
            data: ValueData::Si64(vec![value]),
        }
    }

    pub fn spec(&self) -> &TensorSpec {
        &self.spec
    }

    pub fn dtype(&self) -> DType {
        self.spec.dtype
    }

    pub fn dims(&self) -> &[usize] {
        &self.spec.dims
    }

    pub fn elements(&self) -> usize {
        self.spec.elements()
    }

    pub fn data(&self) -> &ValueData {
        &self.data
    }

    /// Reads a single-element boolean value.
    pub fn as_bool_scalar(&self) -> Result<bool> {
        match (&self.data, self.elements()) {
            (ValueData::I1(v), 1) => Ok(v[0]),
            _ => Err(GraphError::exec(format!(
                "expected a single-element boolean, got {}",
                self.spec
            ))),
        }
    }

    /// Reads a single-element integer value.
    pub fn as_i64_scalar(&self) -> Result<i64> {
        if self.elements() != 1 {
            return Err(GraphError::exec(format!(
                "expected a single-element integer, got {}",
                self.spec
            )));
        }
        match &self.data {
            ValueData::Si32(v) => Ok(i64::from(v[0])),
            ValueData::Si64(v) => Ok(v[0]),
            _ => Err(GraphError::exec(format!(
                "expected an integer scalar, got {}",
                self.spec
            ))),
        }
    }

    /// Integer view of the elements, used for gather indices.
    pub fn index_elements(&self) -> Result<Vec<i64>> {
        match &self.data {
            ValueData::Si32(v) => Ok(v.iter().map(|&x| i64::from(x)).collect()),
            ValueData::Si64(v) => Ok(v.clone()),
            _ => Err(GraphError::exec(format!(
                "indices must be si32 or si64, got {}",
                self.dtype()
            ))),
        }
    }

    /// Little-endian encoding at the execution boundary (`I1` as one byte).
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.spec.byte_len());
        match &self.data {
            ValueData::I1(v) => out.extend(v.iter().map(|&b| u8::from(b))),
            ValueData::Si32(v) => {
                for x in v {
                    out.extend_from_slice(&x.to_le_bytes());
                }
            }
            ValueData::Si64(v) => {
                for x in v {
                    out.extend_from_slice(&x.to_le_bytes());
                }
            }
            ValueData::F32(v) => {
                for x in v {
                    out.extend_from_slice(&x.to_le_bytes());
                }
            }
        }
        out
    }

    /// Decodes a value previously encoded with [`TensorValue::to_bytes`].
    pub fn from_bytes(spec: TensorSpec, bytes: &[u8]) -> Result<Self> {
        if bytes.len() != spec.byte_len() {
            return Err(GraphError::exec(format!(
                "buffer holds {} bytes but {} expects {}",
                bytes.len(),
                spec,
                spec.byte_len()
            )));
        }
        let n = spec.elements();
        let data = match spec.dtype {
            DType::I1 => ValueData::I1(bytes.iter().map(|&b| b != 0).collect()),
            DType::Si32 => ValueData::Si32(
                (0..n)
                    .map(|i| i32::from_le_bytes(bytes[i * 4..i * 4 + 4].try_into().unwrap()))
                    .collect(),
            ),
            DType::Si64 => ValueData::Si64(
                (0..n)
                    .map(|i| i64::from_le_bytes(bytes[i * 8..i * 8 + 8].try_into().unwrap()))
                    .collect(),
            ),
            DType::F32 => ValueData::F32(
                (0..n)
                    .map(|i| f32::from_le_bytes(bytes[i * 4..i * 4 + 4].try_into().unwrap()))
                    .collect(),
            ),
        };
        Ok(Self { spec, data })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_roundtrip_preserves_values() {
        let v = TensorValue::from_f32([2, 2], vec![1.0, -2.5, 3.25, 0.0]).unwrap();
        let back = TensorValue::from_bytes(v.spec().clone(), &v.to_bytes()).unwrap();
        assert_eq!(v, back);

        let b = TensorValue::from_bool([3], vec![true, false, true]).unwrap();
        let back = TensorValue::from_bytes(b.spec().clone(), &b.to_bytes()).unwrap();
        assert_eq!(b, back);
    }

    #[test]
    fn scalar_accessors_reject_wider_tensors() {
        let v = TensorValue::from_bool([2], vec![true, false]).unwrap();
        assert!(v.as_bool_scalar().is_err());
        assert!(TensorValue::scalar_i64(7).as_i64_scalar().unwrap() == 7);
    }

    #[test]
    fn mismatched_literal_shape_is_rejected() {
        let spec = TensorSpec::new(DType::F32, [4]);
        assert!(TensorValue::new(spec, ValueData::F32(vec![0.0; 3])).is_err());
    }
}
