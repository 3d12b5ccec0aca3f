//! Dead-code elimination over the module tree.
//!
//! Liveness propagates from each reachable module's declared outputs through
//! operand edges; an instruction referencing submodules keeps those modules'
//! outputs alive. Instructions that stay dead are removed, and modules no
//! longer reachable from the main module are dropped with them.

use std::collections::HashSet;

use tracing::debug;

use crate::error::Result;
use crate::ir::{InsId, ModuleId, Op, Program};

/// Removes instructions unreachable from their module's declared outputs and
/// prunes unreachable modules. Parameters survive even when dead: they are
/// the module's caller-visible signature. Returns the number of instructions
/// removed.
pub fn eliminate(prog: &mut Program) -> Result<usize> {
    let mut live: HashSet<InsId> = HashSet::new();
    let mut seeded: HashSet<ModuleId> = HashSet::new();
    let mut work: Vec<InsId> = Vec::new();
    seed(prog, prog.main(), &mut seeded, &mut work);

    while let Some(id) = work.pop() {
        if !live.insert(id) {
            continue;
        }
        let ins = prog.ins(id);
        work.extend(ins.inputs().iter().copied());
        for &sub in ins.submodules() {
            if !seeded.contains(&sub) {
                seed(prog, sub, &mut seeded, &mut work);
            }
        }
    }

    let mut removed = 0usize;
    for m in prog.module_ids() {
        for id in prog.body(m).to_vec() {
            if !live.contains(&id) && !matches!(prog.ins(id).op(), Op::Parameter(_)) {
                prog.remove_instruction(m, id)?;
                removed += 1;
            }
        }
    }

    let reachable = reachable_modules(prog);
    for m in prog.module_ids() {
        if !reachable.contains(&m) {
            prog.remove_module(m);
        }
    }

    debug!(removed, "dead-code elimination complete");
    Ok(removed)
}

fn seed(prog: &Program, m: ModuleId, seeded: &mut HashSet<ModuleId>, work: &mut Vec<InsId>) {
    seeded.insert(m);
    work.extend(prog.outputs(m));
    if let Some(ret) = prog.return_id(m) {
        work.push(ret);
    }
}

fn reachable_modules(prog: &Program) -> HashSet<ModuleId> {
    let mut reachable = HashSet::from([prog.main()]);
    let mut stack = vec![prog.main()];
    while let Some(m) = stack.pop() {
        for id in prog.body(m) {
            for &sub in prog.ins(*id).submodules() {
                if reachable.insert(sub) {
                    stack.push(sub);
                }
            }
        }
    }
    reachable
}
