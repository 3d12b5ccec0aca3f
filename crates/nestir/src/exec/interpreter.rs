//! Reference interpreter closing the run-callback contract.
//!
//! Executes a module in program order over an environment keyed by global
//! instruction handles, so cross-module references into enclosing scopes
//! resolve naturally. Remaining conditionals branch at runtime; loop
//! instructions delegate to the loop driver with this interpreter as the run
//! capability.

use std::collections::HashMap;

use crate::error::{GraphError, Result};
use crate::ir::{InsId, ModuleId, Op, Program, TensorValue};

use super::buffer::ArgBuf;
use super::loop_driver::run_loop;

#[derive(Clone)]
enum RtValue {
    Tensor(ArgBuf),
    Tuple(Vec<ArgBuf>),
}

/// Runs a module end-to-end with name-to-buffer bindings for its parameters.
/// Outputs bound to `#output_<k>` parameter views are materialized in place;
/// the ordered output list is returned either way.
pub fn run_module(
    prog: &Program,
    m: ModuleId,
    bindings: &HashMap<String, ArgBuf>,
) -> Result<Vec<ArgBuf>> {
    let mut env = HashMap::new();
    exec_module(prog, m, bindings, &mut env)
}

/// Convenience entry point over host values: binds the main module's
/// parameters, runs it, and reads the outputs back.
pub fn run_program(
    prog: &Program,
    bindings: &HashMap<String, TensorValue>,
) -> Result<Vec<TensorValue>> {
    let buffers = bindings
        .iter()
        .map(|(name, value)| (name.clone(), ArgBuf::from_value(value)))
        .collect();
    run_module(prog, prog.main(), &buffers)?
        .iter()
        .map(ArgBuf::read)
        .collect()
}

fn exec_module(
    prog: &Program,
    m: ModuleId,
    bindings: &HashMap<String, ArgBuf>,
    env: &mut HashMap<InsId, RtValue>,
) -> Result<Vec<ArgBuf>> {
    for id in prog.body(m) {
        let ins = prog.ins(*id);
        let value = match ins.op() {
            Op::Parameter(name) => RtValue::Tensor(
                bindings
                    .get(name)
                    .ok_or_else(|| {
                        GraphError::exec(format!("missing binding for parameter `{name}`"))
                    })?
                    .clone(),
            ),
            Op::Literal(value) => RtValue::Tensor(ArgBuf::from_value(value)),
            Op::Outline => {
                return Err(GraphError::invariant(
                    "outline placeholder reached at execution time",
                ))
            }
            Op::Return => continue,
            Op::TupleGet(index) => {
                let producer = first_input(ins.inputs(), "tuple_get")?;
                let tuple = tuple_value(env, producer)?;
                RtValue::Tensor(
                    tuple
                        .get(*index)
                        .ok_or_else(|| {
                            GraphError::invariant(format!(
                                "tuple index {index} out of range for {} results",
                                tuple.len()
                            ))
                        })?
                        .clone(),
                )
            }
            Op::Compute(op) => {
                let mut inputs = Vec::with_capacity(ins.inputs().len());
                for input in ins.inputs() {
                    inputs.push(tensor_value(env, *input)?.read()?);
                }
                RtValue::Tensor(ArgBuf::from_value(&op.compute(&inputs)?))
            }
            Op::If => {
                let cond_id = first_input(ins.inputs(), "if")?;
                let cond = tensor_value(env, cond_id)?.read()?;
                let take_then = cond.as_bool_scalar()?;
                let branch = *ins
                    .submodules()
                    .get(usize::from(!take_then))
                    .ok_or_else(|| {
                        GraphError::invariant("conditional is missing a branch submodule")
                    })?;
                RtValue::Tuple(exec_module(prog, branch, &HashMap::new(), env)?)
            }
            Op::Loop => {
                // Operands materialize into private buffers: the loop mutates
                // carried state and scan storage in place.
                let mut args = Vec::with_capacity(ins.inputs().len());
                for input in ins.inputs() {
                    args.push(ArgBuf::from_value(&tensor_value(env, *input)?.read()?));
                }
                let body = *ins.submodules().first().ok_or_else(|| {
                    GraphError::invariant("loop is missing its body submodule")
                })?;
                let mut run = |module: ModuleId, params: &HashMap<String, ArgBuf>| {
                    run_module(prog, module, params)
                };
                RtValue::Tuple(run_loop(prog, body, &args, &mut run)?)
            }
        };
        env.insert(*id, value);
    }

    let mut outputs = Vec::new();
    for id in prog.outputs(m) {
        outputs.push(tensor_value(env, id)?.clone());
    }
    for (index, out) in outputs.iter_mut().enumerate() {
        if let Some(view) = bindings.get(&format!("#output_{index}")) {
            view.write(&out.read()?)?;
            *out = view.clone();
        }
    }
    Ok(outputs)
}

fn first_input(inputs: &[InsId], what: &str) -> Result<InsId> {
    inputs
        .first()
        .copied()
        .ok_or_else(|| GraphError::invariant(format!("{what} is missing its operand")))
}

fn tensor_value<'e>(env: &'e HashMap<InsId, RtValue>, id: InsId) -> Result<&'e ArgBuf> {
    match env.get(&id) {
        Some(RtValue::Tensor(buf)) => Ok(buf),
        Some(RtValue::Tuple(_)) => Err(GraphError::invariant(
            "tuple result consumed without tuple_get",
        )),
        None => Err(GraphError::exec(format!("value @{} was not computed", id.0))),
    }
}

fn tuple_value<'e>(env: &'e HashMap<InsId, RtValue>, id: InsId) -> Result<&'e [ArgBuf]> {
    match env.get(&id) {
        Some(RtValue::Tuple(elems)) => Ok(elems),
        Some(RtValue::Tensor(_)) => Err(GraphError::invariant(
            "tuple_get applied to a single-output instruction",
        )),
        None => Err(GraphError::exec(format!("value @{} was not computed", id.0))),
    }
}
