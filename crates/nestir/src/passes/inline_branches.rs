//! Compile-time branch resolution.
//!
//! Conditionals with a constant condition are inlined; conditionals whose
//! condition stays unknown but whose branches are both fully evaluable are
//! replaced by a branch-free gather over the concatenated branch values.
//! Everything else is left in place for runtime handling.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::debug;

use crate::error::{GraphError, Result};
use crate::ir::{DType, InsId, ModuleId, Op, Program, TensorValue};
use crate::ops::{Arith, Broadcast, Concat, Convert, Gather, Reshape};

enum Outcome {
    Transformed,
    Skipped,
}

/// Resolves conditionals across the whole module tree until no further
/// conditional changes. Inlining may splice nested conditionals into the
/// module being walked, so the driver rescans after every changing pass.
/// Returns whether anything changed; dead-code elimination is expected to run
/// afterwards to drop disconnected branches and stale tuple extracts.
pub fn resolve_branches(prog: &mut Program) -> Result<bool> {
    let mut changed_any = false;
    let mut handled: HashSet<InsId> = HashSet::new();
    loop {
        let mut changed = false;
        for m in prog.module_ids() {
            for id in prog.body(m).to_vec() {
                if handled.contains(&id) {
                    continue;
                }
                let Some(ins) = prog.get_ins(id) else {
                    continue;
                };
                if !matches!(ins.op(), Op::If) {
                    continue;
                }
                if let Outcome::Transformed = try_resolve(prog, m, id)? {
                    handled.insert(id);
                    changed = true;
                }
            }
        }
        if !changed {
            break;
        }
        changed_any = true;
    }
    Ok(changed_any)
}

fn try_resolve(prog: &mut Program, m: ModuleId, if_id: InsId) -> Result<Outcome> {
    let ins = prog.ins(if_id);
    let cond_id = *ins
        .inputs()
        .first()
        .ok_or_else(|| GraphError::invariant("conditional without a condition operand"))?;
    match prog.try_eval(cond_id) {
        Some(cond) if cond.dtype() == DType::I1 && cond.elements() == 1 => {
            let take_then = cond.as_bool_scalar()?;
            inline_chosen_branch(prog, m, if_id, take_then)?;
            debug!(
                module = prog.module(m).name(),
                ins = if_id.0,
                take_then,
                "conditional inlined"
            );
            Ok(Outcome::Transformed)
        }
        // Non-boolean single-element conditions are unsupported; leave the
        // node for runtime handling rather than guessing a coercion rule.
        Some(_) => Ok(Outcome::Skipped),
        None => fold_constant_branches(prog, m, if_id, cond_id),
    }
}

/// Copies the chosen submodule's instructions into `m` immediately before the
/// conditional, remapping operands through a fresh old-to-new map. Operands
/// not in the map are external values and pass through unchanged. Copying
/// stops at the submodule's return; its operand list becomes the result set.
fn inline_chosen_branch(
    prog: &mut Program,
    m: ModuleId,
    if_id: InsId,
    take_then: bool,
) -> Result<()> {
    let branch = usize::from(!take_then);
    let smod = *prog
        .ins(if_id)
        .submodules()
        .get(branch)
        .ok_or_else(|| GraphError::invariant("conditional is missing a branch submodule"))?;

    let mut map: HashMap<InsId, InsId> = HashMap::new();
    let mut results: Vec<InsId> = Vec::new();
    for sid in prog.body(smod).to_vec() {
        let sins = prog.ins(sid).clone();
        let copy = match sins.op() {
            Op::Literal(value) => prog.add_literal(m, value.clone()),
            Op::Parameter(name) => {
                let spec = sins.out().tensor()?.clone();
                prog.add_parameter(m, name.clone(), spec)?
            }
            Op::Outline => {
                let spec = sins.out().tensor()?.clone();
                prog.add_outline(m, spec)
            }
            Op::Return => {
                results = remap(sins.inputs(), &map);
                break;
            }
            _ => prog.insert_instruction(
                m,
                if_id,
                sins.op().clone(),
                remap(sins.inputs(), &map),
                sins.submodules().to_vec(),
            )?,
        };
        map.insert(sid, copy);
        results = vec![copy];
    }

    redirect_extracts(prog, if_id, &results)
}

fn remap(inputs: &[InsId], map: &HashMap<InsId, InsId>) -> Vec<InsId> {
    inputs
        .iter()
        .map(|id| map.get(id).copied().unwrap_or(*id))
        .collect()
}

/// The condition stays unknown, but both branches may still be compile-time
/// evaluable; if so, every aligned output pair collapses into a gather that
/// selects between the two constant values without any runtime branch.
fn fold_constant_branches(
    prog: &mut Program,
    m: ModuleId,
    if_id: InsId,
    cond_id: InsId,
) -> Result<Outcome> {
    let &[then_mod, else_mod] = prog.ins(if_id).submodules() else {
        return Err(GraphError::invariant(
            "conditional must reference exactly two submodules",
        ));
    };
    let Some(then_vals) = eval_module_outputs(prog, then_mod) else {
        return Ok(Outcome::Skipped);
    };
    let Some(else_vals) = eval_module_outputs(prog, else_mod) else {
        return Ok(Outcome::Skipped);
    };
    if then_vals.len() != else_vals.len() {
        return Err(GraphError::invariant(
            "conditional branches disagree on output arity",
        ));
    }

    let mut selected = Vec::with_capacity(then_vals.len());
    for (v0, v1) in then_vals.iter().zip(&else_vals) {
        selected.push(synthesize_select(prog, m, if_id, cond_id, v0, v1)?);
    }
    debug!(
        module = prog.module(m).name(),
        ins = if_id.0,
        outputs = selected.len(),
        "conditional folded to branch-free select"
    );
    redirect_extracts(prog, if_id, &selected)?;
    Ok(Outcome::Transformed)
}

fn eval_module_outputs(prog: &Program, m: ModuleId) -> Option<Vec<TensorValue>> {
    let outputs = prog.outputs(m);
    if outputs.is_empty() {
        return None;
    }
    outputs.iter().map(|id| prog.try_eval(*id)).collect()
}

/// Builds `gather(concat(v0, v1).reshape([2n]), (n + e) - cond * n)` in front
/// of the conditional: index `e` when the condition is true, `n + e` offset
/// into the else half otherwise.
fn synthesize_select(
    prog: &mut Program,
    m: ModuleId,
    if_id: InsId,
    cond_id: InsId,
    v0: &TensorValue,
    v1: &TensorValue,
) -> Result<InsId> {
    let lens = v0.dims().to_vec();
    let n = v0.elements();

    let icond = prog.insert_instruction(
        m,
        if_id,
        Op::Compute(Arc::new(Convert {
            target: DType::F32,
        })),
        vec![cond_id],
        Vec::new(),
    )?;
    let mcond = prog.insert_instruction(
        m,
        if_id,
        Op::Compute(Arc::new(Broadcast {
            out_dims: lens.clone(),
        })),
        vec![icond],
        Vec::new(),
    )?;
    let offsets = prog.add_literal(m, TensorValue::from_f32(lens.clone(), vec![n as f32; n])?);
    let base = prog.add_literal(
        m,
        TensorValue::from_f32(lens.clone(), (n..2 * n).map(|e| e as f32).collect())?,
    );
    let scaled = prog.insert_instruction(
        m,
        if_id,
        Op::Compute(Arc::new(Arith::mul())),
        vec![mcond, offsets],
        Vec::new(),
    )?;
    let f_index = prog.insert_instruction(
        m,
        if_id,
        Op::Compute(Arc::new(Arith::sub())),
        vec![base, scaled],
        Vec::new(),
    )?;
    let index = prog.insert_instruction(
        m,
        if_id,
        Op::Compute(Arc::new(Convert {
            target: DType::Si32,
        })),
        vec![f_index],
        Vec::new(),
    )?;

    let l0 = prog.add_literal(m, v0.clone());
    let l1 = prog.add_literal(m, v1.clone());
    let joined = prog.insert_instruction(
        m,
        if_id,
        Op::Compute(Arc::new(Concat { axis: 0 })),
        vec![l0, l1],
        Vec::new(),
    )?;
    let flat = prog.insert_instruction(
        m,
        if_id,
        Op::Compute(Arc::new(Reshape { dims: vec![2 * n] })),
        vec![joined],
        Vec::new(),
    )?;
    prog.insert_instruction(
        m,
        if_id,
        Op::Compute(Arc::new(Gather { axis: 0 })),
        vec![flat, index],
        Vec::new(),
    )
}

/// Redirects every tuple-extract consumer of the conditional to the resolved
/// result selected by its index attribute. The conditional itself and its
/// branches stay behind for dead-code elimination.
fn redirect_extracts(prog: &mut Program, if_id: InsId, results: &[InsId]) -> Result<()> {
    for consumer in prog.consumers_of(if_id) {
        let &Op::TupleGet(index) = prog.ins(consumer).op() else {
            return Err(GraphError::invariant(
                "conditional results must be consumed through tuple_get",
            ));
        };
        let target = *results.get(index).ok_or_else(|| {
            GraphError::invariant(format!(
                "tuple index {index} has no matching branch output"
            ))
        })?;
        prog.replace_instruction(consumer, target);
    }
    Ok(())
}
