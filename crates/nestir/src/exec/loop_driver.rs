//! Host-driven loop execution.
//!
//! The loop instruction's flat operand list decodes into a host trip count, a
//! host initial condition, `D` carried-dependency buffers, and `S` scan
//! storage buffers pre-sized by the caller to `trip_count` per-iteration
//! slices. Each iteration is a blocking request/response against the run
//! capability: the host must observe the updated condition before deciding
//! whether to continue, so iterations never pipeline.

use std::collections::HashMap;

use tracing::{debug, trace};

use crate::error::{GraphError, Result};
use crate::ir::{DType, ModuleId, Op, Program, TensorSpec, TensorValue};

use super::buffer::ArgBuf;

/// Externally supplied "run a module with name-to-value bindings" capability.
/// Implementations must materialize each module output into any bound
/// output-named parameter view before returning the ordered output list.
pub type RunFn<'a> = dyn FnMut(ModuleId, &HashMap<String, ArgBuf>) -> Result<Vec<ArgBuf>> + 'a;

#[derive(Debug, Clone, Copy)]
enum Slot {
    Input(usize),
    Output(usize),
}

/// Role table for a loop body, decoded once per invocation from the body's
/// parameter names: `#<body>_in_<k>` for inputs (0 = iteration counter, 1 =
/// condition, `2+j` = carried dependency `j`) and `#output_<k>` for outputs
/// (0 = condition, `1..=D` = carried, beyond that scan slots).
struct ParamTable {
    slots: Vec<(String, Slot, TensorSpec)>,
    input_count: usize,
    output_count: usize,
}

fn build_param_table(prog: &Program, body: ModuleId) -> Result<ParamTable> {
    let in_prefix = format!("#{}_in_", prog.module(body).name());
    const OUT_PREFIX: &str = "#output_";

    let mut slots = Vec::new();
    let mut input_count = 0usize;
    let mut output_count = 0usize;
    for id in prog.body(body) {
        let ins = prog.ins(*id);
        let Op::Parameter(name) = ins.op() else {
            continue;
        };
        let slot = if let Some(rest) = name.strip_prefix(&in_prefix) {
            let index = decode_index(name, rest)?;
            input_count = input_count.max(index + 1);
            Slot::Input(index)
        } else if let Some(rest) = name.strip_prefix(OUT_PREFIX) {
            let index = decode_index(name, rest)?;
            output_count = output_count.max(index + 1);
            Slot::Output(index)
        } else {
            return Err(GraphError::invariant(format!(
                "loop body parameter `{name}` does not follow the role naming convention"
            )));
        };
        slots.push((name.clone(), slot, ins.out().tensor()?.clone()));
    }

    if input_count < 2 {
        return Err(GraphError::invariant(
            "loop body must declare iteration-counter and condition inputs",
        ));
    }
    if output_count == 0 {
        return Err(GraphError::invariant(
            "loop body must declare the condition output",
        ));
    }
    Ok(ParamTable {
        slots,
        input_count,
        output_count,
    })
}

fn decode_index(name: &str, digits: &str) -> Result<usize> {
    digits.parse().map_err(|_| {
        GraphError::invariant(format!(
            "loop body parameter `{name}` carries a malformed role index"
        ))
    })
}

/// Drives a loop body across host-controlled iterations.
///
/// `args` is the decoded flat operand list `[trip_count, initial condition,
/// carried.., scan storage..]`. The engine owns only the two small transfer
/// buffers feeding the body's iteration and condition inputs; every other
/// buffer belongs to the caller and is read and written in place. Terminates
/// at `trip_count` iterations or the first false condition, whichever comes
/// first, and returns every buffer except the condition slot in final state.
pub fn run_loop(
    prog: &Program,
    body: ModuleId,
    args: &[ArgBuf],
    run: &mut RunFn<'_>,
) -> Result<Vec<ArgBuf>> {
    let table = build_param_table(prog, body)?;
    let dep_count = table.input_count - 2;
    let scan_count = table
        .output_count
        .checked_sub(1 + dep_count)
        .ok_or_else(|| {
            GraphError::invariant(
                "loop body declares fewer outputs than carried dependencies",
            )
        })?;
    if args.len() != 2 + dep_count + scan_count {
        return Err(GraphError::invariant(format!(
            "loop expects {} operands, got {}",
            2 + dep_count + scan_count,
            args.len()
        )));
    }

    let trip_count = args[0].read_scalar_i64()?;
    let mut cond = args[1].read_scalar_bool()?;
    let carried = &args[2..2 + dep_count];
    let scans = &args[2 + dep_count..];

    let iter_buf = ArgBuf::alloc(TensorSpec::scalar(DType::Si64));
    let cond_buf = ArgBuf::alloc(TensorSpec::scalar(DType::I1));
    let cond_out = ArgBuf::alloc(TensorSpec::scalar(DType::I1));

    debug!(trip_count, dep_count, scan_count, "loop start");
    let mut executed = 0i64;
    for iteration in 0..trip_count {
        if !cond {
            break;
        }
        iter_buf.write(&TensorValue::scalar_i64(iteration))?;
        cond_buf.write(&TensorValue::scalar_bool(cond))?;

        let mut params = HashMap::with_capacity(table.slots.len());
        for (name, slot, spec) in &table.slots {
            let arg = match *slot {
                Slot::Input(0) => iter_buf.clone(),
                Slot::Input(1) => cond_buf.clone(),
                Slot::Input(index) => carried
                    .get(index - 2)
                    .ok_or_else(|| {
                        GraphError::invariant(format!(
                            "loop input index {index} has no carried buffer"
                        ))
                    })?
                    .clone(),
                Slot::Output(0) => cond_out.clone(),
                Slot::Output(index) if index <= dep_count => carried[index - 1].clone(),
                Slot::Output(index) => {
                    let scan = scans.get(index - dep_count - 1).ok_or_else(|| {
                        GraphError::invariant(format!(
                            "loop output index {index} has no scan buffer"
                        ))
                    })?;
                    scan.view(spec.clone(), iteration as usize * spec.byte_len())?
                }
            };
            params.insert(name.clone(), arg);
        }

        let outputs = run(body, &params)?;
        if outputs.len() != table.output_count {
            return Err(GraphError::invariant(format!(
                "loop body returned {} outputs, expected {}",
                outputs.len(),
                table.output_count
            )));
        }

        // Blocking host rendezvous: the updated condition decides continuation.
        cond = outputs[0].read_scalar_bool()?;
        for (j, slot_buf) in carried.iter().enumerate() {
            slot_buf.write(&outputs[1 + j].read()?)?;
        }
        executed += 1;
        trace!(iteration, cond, "loop iteration complete");
    }

    debug!(iterations = executed, "loop finished");
    Ok(args[2..].to_vec())
}
