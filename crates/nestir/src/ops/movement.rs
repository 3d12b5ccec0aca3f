use crate::error::{GraphError, Result};
use crate::ir::{TensorSpec, TensorValue, ValueData, ValueType};

use super::Operator;

/// Concatenation along a fixed axis.
#[derive(Debug, Clone, Copy)]
pub struct Concat {
    pub axis: usize,
}

fn concat_elems<T: Copy>(parts: &[&[T]], dims: &[&[usize]], axis: usize) -> Vec<T> {
    let outer: usize = dims[0][..axis].iter().product();
    let inner: usize = dims[0][axis + 1..].iter().product();
    let mut out = Vec::new();
    for o in 0..outer {
        for (part, part_dims) in parts.iter().zip(dims) {
            let span = part_dims[axis] * inner;
            out.extend_from_slice(&part[o * span..(o + 1) * span]);
        }
    }
    out
}

macro_rules! typed_parts {
    ($inputs:expr, $variant:ident, $name:expr) => {{
        let mut parts = Vec::with_capacity($inputs.len());
        for value in $inputs {
            match value.data() {
                ValueData::$variant(d) => parts.push(d.as_slice()),
                _ => {
                    return Err(GraphError::exec(format!(
                        "{} operands must share one dtype",
                        $name
                    )))
                }
            }
        }
        parts
    }};
}

impl Operator for Concat {
    fn name(&self) -> &str {
        "concat"
    }

    fn output_spec(&self, inputs: &[TensorSpec]) -> Result<ValueType> {
        let first = inputs
            .first()
            .ok_or_else(|| GraphError::shape("concat requires at least one operand"))?;
        if self.axis >= first.rank() {
            return Err(GraphError::shape(format!(
                "concat axis {} out of range for rank {}",
                self.axis,
                first.rank()
            )));
        }
        let mut dims = first.dims.clone();
        for other in &inputs[1..] {
            if other.dtype != first.dtype || other.rank() != first.rank() {
                return Err(GraphError::shape(
                    "concat operands must share dtype and rank",
                ));
            }
            for (axis, (a, b)) in first.dims.iter().zip(&other.dims).enumerate() {
                if axis != self.axis && a != b {
                    return Err(GraphError::shape(format!(
                        "concat dimension mismatch at axis {axis}: {a} vs {b}"
                    )));
                }
            }
            dims[self.axis] += other.dims[self.axis];
        }
        Ok(ValueType::Tensor(TensorSpec::new(first.dtype, dims)))
    }

    fn eval(&self, inputs: &[TensorValue]) -> Option<Result<TensorValue>> {
        Some(self.compute(inputs))
    }

    fn compute(&self, inputs: &[TensorValue]) -> Result<TensorValue> {
        let specs: Vec<TensorSpec> = inputs.iter().map(|v| v.spec().clone()).collect();
        let out = self.output_spec(&specs)?.tensor()?.clone();
        let dims: Vec<&[usize]> = inputs.iter().map(|v| v.dims()).collect();
        let data = match inputs[0].data() {
            ValueData::I1(_) => {
                ValueData::I1(concat_elems(&typed_parts!(inputs, I1, "concat"), &dims, self.axis))
            }
            ValueData::Si32(_) => ValueData::Si32(concat_elems(
                &typed_parts!(inputs, Si32, "concat"),
                &dims,
                self.axis,
            )),
            ValueData::Si64(_) => ValueData::Si64(concat_elems(
                &typed_parts!(inputs, Si64, "concat"),
                &dims,
                self.axis,
            )),
            ValueData::F32(_) => ValueData::F32(concat_elems(
                &typed_parts!(inputs, F32, "concat"),
                &dims,
                self.axis,
            )),
        };
        TensorValue::new(out, data)
    }
}

/// Reinterprets a tensor under new dimensions with the same element count.
#[derive(Debug, Clone)]
pub struct Reshape {
    pub dims: Vec<usize>,
}

impl Operator for Reshape {
    fn name(&self) -> &str {
        "reshape"
    }

    fn output_spec(&self, inputs: &[TensorSpec]) -> Result<ValueType> {
        let [input] = inputs else {
            return Err(GraphError::shape("reshape takes exactly one operand"));
        };
        let target: usize = self.dims.iter().product();
        if target != input.elements() {
            return Err(GraphError::shape(format!(
                "reshape requires an equal element count: {} vs {}",
                input.elements(),
                target
            )));
        }
        Ok(ValueType::Tensor(TensorSpec::new(
            input.dtype,
            self.dims.clone(),
        )))
    }

    fn eval(&self, inputs: &[TensorValue]) -> Option<Result<TensorValue>> {
        Some(self.compute(inputs))
    }

    fn compute(&self, inputs: &[TensorValue]) -> Result<TensorValue> {
        let [input] = inputs else {
            return Err(GraphError::exec("reshape takes exactly one operand"));
        };
        TensorValue::new(
            TensorSpec::new(input.dtype(), self.dims.clone()),
            input.data().clone(),
        )
    }
}

/// Broadcast to a target shape, trailing-aligned, expanding size-1 axes.
#[derive(Debug, Clone)]
pub struct Broadcast {
    pub out_dims: Vec<usize>,
}

fn broadcast_elems<T: Copy>(src: &[T], in_dims: &[usize], out_dims: &[usize]) -> Vec<T> {
    let rank_diff = out_dims.len() - in_dims.len();
    let mut src_strides = vec![0usize; out_dims.len()];
    let mut stride = 1usize;
    for axis in (0..in_dims.len()).rev() {
        src_strides[axis + rank_diff] = if in_dims[axis] == 1 { 0 } else { stride };
        stride *= in_dims[axis];
    }
    let total: usize = out_dims.iter().product();
    let mut out = Vec::with_capacity(total);
    for flat in 0..total {
        let mut rem = flat;
        let mut src_idx = 0;
        for axis in (0..out_dims.len()).rev() {
            let coord = rem % out_dims[axis];
            rem /= out_dims[axis];
            src_idx += coord * src_strides[axis];
        }
        out.push(src[src_idx]);
    }
    out
}

impl Operator for Broadcast {
    fn name(&self) -> &str {
        "multibroadcast"
    }

    fn output_spec(&self, inputs: &[TensorSpec]) -> Result<ValueType> {
        let [input] = inputs else {
            return Err(GraphError::shape("multibroadcast takes exactly one operand"));
        };
        if input.rank() > self.out_dims.len() {
            return Err(GraphError::shape(
                "multibroadcast target rank must be >= operand rank",
            ));
        }
        let rank_diff = self.out_dims.len() - input.rank();
        for (axis, &dim) in input.dims.iter().enumerate() {
            let target = self.out_dims[rank_diff + axis];
            if dim != 1 && dim != target {
                return Err(GraphError::shape(format!(
                    "multibroadcast dimension mismatch at axis {axis}: {dim} vs {target}"
                )));
            }
        }
        Ok(ValueType::Tensor(TensorSpec::new(
            input.dtype,
            self.out_dims.clone(),
        )))
    }

    fn eval(&self, inputs: &[TensorValue]) -> Option<Result<TensorValue>> {
        Some(self.compute(inputs))
    }

    fn compute(&self, inputs: &[TensorValue]) -> Result<TensorValue> {
        let [input] = inputs else {
            return Err(GraphError::exec("multibroadcast takes exactly one operand"));
        };
        self.output_spec(&[input.spec().clone()])?;
        let data = match input.data() {
            ValueData::I1(v) => {
                ValueData::I1(broadcast_elems(v, input.dims(), &self.out_dims))
            }
            ValueData::Si32(v) => {
                ValueData::Si32(broadcast_elems(v, input.dims(), &self.out_dims))
            }
            ValueData::Si64(v) => {
                ValueData::Si64(broadcast_elems(v, input.dims(), &self.out_dims))
            }
            ValueData::F32(v) => {
                ValueData::F32(broadcast_elems(v, input.dims(), &self.out_dims))
            }
        };
        TensorValue::new(
            TensorSpec::new(input.dtype(), self.out_dims.clone()),
            data,
        )
    }
}

/// Index lookup over a rank-1 operand; the result takes the indices' shape.
#[derive(Debug, Clone, Copy)]
pub struct Gather {
    pub axis: usize,
}

fn pick<T: Copy>(data: &[T], indices: &[i64]) -> Result<Vec<T>> {
    indices
        .iter()
        .map(|&i| {
            usize::try_from(i)
                .ok()
                .and_then(|i| data.get(i).copied())
                .ok_or_else(|| {
                    GraphError::exec(format!(
                        "gather index {i} out of bounds for {} elements",
                        data.len()
                    ))
                })
        })
        .collect()
}

impl Operator for Gather {
    fn name(&self) -> &str {
        "gather"
    }

    fn output_spec(&self, inputs: &[TensorSpec]) -> Result<ValueType> {
        let [data, indices] = inputs else {
            return Err(GraphError::shape("gather takes data and indices operands"));
        };
        if self.axis != 0 || data.rank() != 1 {
            return Err(GraphError::shape(
                "gather supports axis 0 over a rank-1 operand",
            ));
        }
        if !indices.dtype.is_integer() {
            return Err(GraphError::shape(format!(
                "gather indices must be integer, got {}",
                indices.dtype
            )));
        }
        Ok(ValueType::Tensor(TensorSpec::new(
            data.dtype,
            indices.dims.clone(),
        )))
    }

    fn eval(&self, inputs: &[TensorValue]) -> Option<Result<TensorValue>> {
        Some(self.compute(inputs))
    }

    fn compute(&self, inputs: &[TensorValue]) -> Result<TensorValue> {
        let [data, indices] = inputs else {
            return Err(GraphError::exec("gather takes data and indices operands"));
        };
        let idx = indices.index_elements()?;
        let out_spec = TensorSpec::new(data.dtype(), indices.dims().to_vec());
        let out = match data.data() {
            ValueData::I1(v) => ValueData::I1(pick(v, &idx)?),
            ValueData::Si32(v) => ValueData::Si32(pick(v, &idx)?),
            ValueData::Si64(v) => ValueData::Si64(pick(v, &idx)?),
            ValueData::F32(v) => ValueData::F32(pick(v, &idx)?),
        };
        TensorValue::new(out_spec, out)
    }
}
