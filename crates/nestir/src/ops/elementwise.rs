use crate::error::{GraphError, Result};
use crate::ir::{DType, TensorSpec, TensorValue, ValueData, ValueType};

use super::Operator;

/// Arithmetic flavors sharing one elementwise kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithKind {
    Add,
    Sub,
    Mul,
}

/// Elementwise binary arithmetic. Operands must agree on dtype and shape;
/// broadcasting is explicit through the `multibroadcast` operator.
#[derive(Debug, Clone, Copy)]
pub struct Arith {
    pub kind: ArithKind,
}

impl Arith {
    pub fn add() -> Self {
        Arith {
            kind: ArithKind::Add,
        }
    }

    pub fn sub() -> Self {
        Arith {
            kind: ArithKind::Sub,
        }
    }

    pub fn mul() -> Self {
        Arith {
            kind: ArithKind::Mul,
        }
    }
}

fn check_binary(name: &str, inputs: &[TensorSpec]) -> Result<TensorSpec> {
    let [lhs, rhs] = inputs else {
        return Err(GraphError::shape(format!("{name} takes exactly two operands")));
    };
    if lhs != rhs {
        return Err(GraphError::shape(format!(
            "{name} operands must agree on dtype and shape: {lhs} vs {rhs}"
        )));
    }
    Ok(lhs.clone())
}

impl Operator for Arith {
    fn name(&self) -> &str {
        match self.kind {
            ArithKind::Add => "add",
            ArithKind::Sub => "sub",
            ArithKind::Mul => "mul",
        }
    }

    fn output_spec(&self, inputs: &[TensorSpec]) -> Result<ValueType> {
        let spec = check_binary(self.name(), inputs)?;
        if spec.dtype == DType::I1 {
            return Err(GraphError::shape(format!(
                "{} is not defined for boolean operands",
                self.name()
            )));
        }
        Ok(ValueType::Tensor(spec))
    }

    fn eval(&self, inputs: &[TensorValue]) -> Option<Result<TensorValue>> {
        Some(self.compute(inputs))
    }

    fn compute(&self, inputs: &[TensorValue]) -> Result<TensorValue> {
        let [lhs, rhs] = inputs else {
            return Err(GraphError::exec(format!(
                "{} takes exactly two operands",
                self.name()
            )));
        };
        let kind = self.kind;
        let data = match (lhs.data(), rhs.data()) {
            (ValueData::F32(a), ValueData::F32(b)) => ValueData::F32(
                a.iter()
                    .zip(b)
                    .map(|(&x, &y)| match kind {
                        ArithKind::Add => x + y,
                        ArithKind::Sub => x - y,
                        ArithKind::Mul => x * y,
                    })
                    .collect(),
            ),
            (ValueData::Si32(a), ValueData::Si32(b)) => ValueData::Si32(
                a.iter()
                    .zip(b)
                    .map(|(&x, &y)| match kind {
                        ArithKind::Add => x.wrapping_add(y),
                        ArithKind::Sub => x.wrapping_sub(y),
                        ArithKind::Mul => x.wrapping_mul(y),
                    })
                    .collect(),
            ),
            (ValueData::Si64(a), ValueData::Si64(b)) => ValueData::Si64(
                a.iter()
                    .zip(b)
                    .map(|(&x, &y)| match kind {
                        ArithKind::Add => x.wrapping_add(y),
                        ArithKind::Sub => x.wrapping_sub(y),
                        ArithKind::Mul => x.wrapping_mul(y),
                    })
                    .collect(),
            ),
            _ => {
                return Err(GraphError::exec(format!(
                    "{} operand dtypes {} and {} are unsupported",
                    self.name(),
                    lhs.dtype(),
                    rhs.dtype()
                )))
            }
        };
        TensorValue::new(lhs.spec().clone(), data)
    }
}

/// Elementwise `<` comparison producing a boolean tensor.
#[derive(Debug, Clone, Copy, Default)]
pub struct Less;

impl Operator for Less {
    fn name(&self) -> &str {
        "less"
    }

    fn output_spec(&self, inputs: &[TensorSpec]) -> Result<ValueType> {
        let spec = check_binary("less", inputs)?;
        Ok(ValueType::Tensor(TensorSpec::new(DType::I1, spec.dims)))
    }

    fn eval(&self, inputs: &[TensorValue]) -> Option<Result<TensorValue>> {
        Some(self.compute(inputs))
    }

    fn compute(&self, inputs: &[TensorValue]) -> Result<TensorValue> {
        let [lhs, rhs] = inputs else {
            return Err(GraphError::exec("less takes exactly two operands"));
        };
        let flags = match (lhs.data(), rhs.data()) {
            (ValueData::F32(a), ValueData::F32(b)) => {
                a.iter().zip(b).map(|(x, y)| x < y).collect()
            }
            (ValueData::Si32(a), ValueData::Si32(b)) => {
                a.iter().zip(b).map(|(x, y)| x < y).collect()
            }
            (ValueData::Si64(a), ValueData::Si64(b)) => {
                a.iter().zip(b).map(|(x, y)| x < y).collect()
            }
            _ => {
                return Err(GraphError::exec(format!(
                    "less operand dtypes {} and {} are unsupported",
                    lhs.dtype(),
                    rhs.dtype()
                )))
            }
        };
        TensorValue::new(
            TensorSpec::new(DType::I1, lhs.dims().to_vec()),
            ValueData::I1(flags),
        )
    }
}

/// Elementwise dtype conversion. Float-to-integer truncates toward zero.
#[derive(Debug, Clone, Copy)]
pub struct Convert {
    pub target: DType,
}

impl Operator for Convert {
    fn name(&self) -> &str {
        "convert"
    }

    fn output_spec(&self, inputs: &[TensorSpec]) -> Result<ValueType> {
        let [input] = inputs else {
            return Err(GraphError::shape("convert takes exactly one operand"));
        };
        Ok(ValueType::Tensor(TensorSpec::new(
            self.target,
            input.dims.clone(),
        )))
    }

    fn eval(&self, inputs: &[TensorValue]) -> Option<Result<TensorValue>> {
        Some(self.compute(inputs))
    }

    fn compute(&self, inputs: &[TensorValue]) -> Result<TensorValue> {
        let [input] = inputs else {
            return Err(GraphError::exec("convert takes exactly one operand"));
        };
        let wide: Vec<f64> = match input.data() {
            ValueData::I1(v) => v.iter().map(|&b| f64::from(u8::from(b))).collect(),
            ValueData::Si32(v) => v.iter().map(|&x| f64::from(x)).collect(),
            ValueData::Si64(v) => v.iter().map(|&x| x as f64).collect(),
            ValueData::F32(v) => v.iter().map(|&x| f64::from(x)).collect(),
        };
        let data = match self.target {
            DType::I1 => ValueData::I1(wide.iter().map(|&x| x != 0.0).collect()),
            DType::Si32 => ValueData::Si32(wide.iter().map(|&x| x.trunc() as i32).collect()),
            DType::Si64 => ValueData::Si64(wide.iter().map(|&x| x.trunc() as i64).collect()),
            DType::F32 => ValueData::F32(wide.iter().map(|&x| x as f32).collect()),
        };
        TensorValue::new(
            TensorSpec::new(self.target, input.dims().to_vec()),
            data,
        )
    }
}
