use std::collections::HashMap;
use std::fmt;

use crate::error::{GraphError, Result};

use super::instruction::{InsId, Instruction, ModuleId, Op, ValueType};
use super::shape::TensorSpec;
use super::value::TensorValue;

/// One subgraph: a named instruction sequence with an optional parent scope.
///
/// The parent link establishes scoping for nested regions only; it never
/// implies value capture. The body is kept in a valid topological order at all
/// times, with parameters, literals, and outlines occupying a leading prefix.
#[derive(Debug, Clone)]
pub struct Module {
    name: String,
    parent: Option<ModuleId>,
    body: Vec<InsId>,
}

impl Module {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<ModuleId> {
        self.parent
    }

    pub fn body(&self) -> &[InsId] {
        &self.body
    }

    fn placeholder_prefix(&self, prog: &Program) -> usize {
        self.body
            .iter()
            .take_while(|id| prog.ins(**id).op.is_placeholder())
            .count()
    }
}

/// Owns the module tree and the instruction arena.
///
/// All instruction references are program-global, so a submodule instruction
/// may legally consume a value produced in an enclosing module; the branch
/// inliner relies on this when it passes unmapped operands through unchanged.
/// Modules and instructions are created during ingestion and optimization
/// only, never at execution time.
#[derive(Debug, Clone)]
pub struct Program {
    modules: HashMap<ModuleId, Module>,
    instrs: HashMap<InsId, Instruction>,
    main: ModuleId,
    next_module: u32,
    next_ins: u32,
}

impl Program {
    pub fn new(main_name: impl Into<String>) -> Self {
        let mut prog = Program {
            modules: HashMap::new(),
            instrs: HashMap::new(),
            main: ModuleId(0),
            next_module: 0,
            next_ins: 0,
        };
        prog.main = prog.create_module(main_name, None);
        prog
    }

    pub fn main(&self) -> ModuleId {
        self.main
    }

    pub fn create_module(&mut self, name: impl Into<String>, parent: Option<ModuleId>) -> ModuleId {
        let id = ModuleId(self.next_module);
        self.next_module += 1;
        self.modules.insert(
            id,
            Module {
                name: name.into(),
                parent,
                body: Vec::new(),
            },
        );
        id
    }

    pub fn module(&self, m: ModuleId) -> &Module {
        self.modules.get(&m).expect("dangling module handle")
    }

    /// Module handles in creation order.
    pub fn module_ids(&self) -> Vec<ModuleId> {
        let mut ids: Vec<_> = self.modules.keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn body(&self, m: ModuleId) -> &[InsId] {
        &self.module(m).body
    }

    pub fn ins(&self, id: InsId) -> &Instruction {
        self.instrs.get(&id).expect("dangling instruction handle")
    }

    pub fn get_ins(&self, id: InsId) -> Option<&Instruction> {
        self.instrs.get(&id)
    }

    /// Declares a named input placeholder. Names are unique per module.
    pub fn add_parameter(
        &mut self,
        m: ModuleId,
        name: impl Into<String>,
        spec: TensorSpec,
    ) -> Result<InsId> {
        let name = name.into();
        for id in &self.module(m).body {
            if let Op::Parameter(existing) = &self.ins(*id).op {
                if *existing == name {
                    return Err(GraphError::invariant(format!(
                        "parameter `{name}` already declared in module `{}`",
                        self.module(m).name
                    )));
                }
            }
        }
        Ok(self.push_placeholder(m, Op::Parameter(name.clone()), ValueType::Tensor(spec)))
    }

    /// Embeds an immutable constant tensor.
    pub fn add_literal(&mut self, m: ModuleId, value: TensorValue) -> InsId {
        let out = ValueType::Tensor(value.spec().clone());
        self.push_placeholder(m, Op::Literal(value), out)
    }

    /// Shape-only placeholder used to force shape agreement across branches.
    pub fn add_outline(&mut self, m: ModuleId, spec: TensorSpec) -> InsId {
        self.push_placeholder(m, Op::Outline, ValueType::Tensor(spec))
    }

    fn push_placeholder(&mut self, m: ModuleId, op: Op, out: ValueType) -> InsId {
        let id = self.allocate(op, Vec::new(), Vec::new(), out);
        let at = self.module(m).placeholder_prefix(self);
        self.module_mut(m).body.insert(at, id);
        id
    }

    /// Appends an operation node, inferring its result type.
    pub fn add_instruction(
        &mut self,
        m: ModuleId,
        op: Op,
        inputs: Vec<InsId>,
        submodules: Vec<ModuleId>,
    ) -> Result<InsId> {
        if self.return_id(m).is_some() {
            return Err(GraphError::invariant(format!(
                "cannot append after the return of module `{}`",
                self.module(m).name
            )));
        }
        let at = self.module(m).body.len();
        self.insert_at(m, at, op, inputs, submodules)
    }

    /// Inserts an operation node immediately before `before`, preserving the
    /// topological-order invariant. This is the splice point the branch
    /// inliner uses.
    pub fn insert_instruction(
        &mut self,
        m: ModuleId,
        before: InsId,
        op: Op,
        inputs: Vec<InsId>,
        submodules: Vec<ModuleId>,
    ) -> Result<InsId> {
        let at = self
            .module(m)
            .body
            .iter()
            .position(|id| *id == before)
            .ok_or_else(|| {
                GraphError::invariant(format!(
                    "insertion point {before:?} is not in module `{}`",
                    self.module(m).name
                ))
            })?;
        self.insert_at(m, at, op, inputs, submodules)
    }

    fn insert_at(
        &mut self,
        m: ModuleId,
        at: usize,
        op: Op,
        inputs: Vec<InsId>,
        submodules: Vec<ModuleId>,
    ) -> Result<InsId> {
        for input in &inputs {
            if !self.instrs.contains_key(input) {
                return Err(GraphError::invariant(format!(
                    "operand {input:?} is not a live instruction"
                )));
            }
        }
        for sub in &submodules {
            if !self.modules.contains_key(sub) {
                return Err(GraphError::invariant(format!(
                    "submodule {sub:?} is not a live module"
                )));
            }
        }
        let out = self.infer_type(&op, &inputs, &submodules)?;
        let id = self.allocate(op, inputs, submodules, out);
        self.module_mut(m).body.insert(at, id);
        Ok(id)
    }

    /// Declares the module's terminal return. At most one per module.
    pub fn add_return(&mut self, m: ModuleId, operands: Vec<InsId>) -> Result<InsId> {
        if self.return_id(m).is_some() {
            return Err(GraphError::invariant(format!(
                "module `{}` already has a return",
                self.module(m).name
            )));
        }
        self.add_instruction(m, Op::Return, operands, Vec::new())
    }

    /// Captures and removes the trailing return, yielding its operand list.
    /// Used when a parsed subgraph is spliced directly into its parent and the
    /// return is only a structural terminator.
    pub fn take_return(&mut self, m: ModuleId) -> Result<Vec<InsId>> {
        let last = self.module(m).body.last().copied().ok_or_else(|| {
            GraphError::invariant(format!("module `{}` is empty", self.module(m).name))
        })?;
        if !matches!(self.ins(last).op, Op::Return) {
            return Err(GraphError::invariant(format!(
                "module `{}` does not end with a return",
                self.module(m).name
            )));
        }
        let operands = self.ins(last).inputs.clone();
        self.module_mut(m).body.pop();
        self.instrs.remove(&last);
        Ok(operands)
    }

    /// Rewires every consumer of `old` to `new`, covering operand lists and
    /// return operands in every module. `old` itself stays in place for
    /// dead-code elimination to collect.
    pub fn replace_instruction(&mut self, old: InsId, new: InsId) {
        for ins in self.instrs.values_mut() {
            if ins.id == old {
                continue;
            }
            for input in &mut ins.inputs {
                if *input == old {
                    *input = new;
                }
            }
        }
    }

    pub fn remove_instruction(&mut self, m: ModuleId, id: InsId) -> Result<()> {
        let at = self
            .module(m)
            .body
            .iter()
            .position(|i| *i == id)
            .ok_or_else(|| {
                GraphError::invariant(format!(
                    "{id:?} is not in module `{}`",
                    self.module(m).name
                ))
            })?;
        self.module_mut(m).body.remove(at);
        self.instrs.remove(&id);
        Ok(())
    }

    /// Drops a module and every instruction it still holds.
    pub fn remove_module(&mut self, m: ModuleId) {
        if let Some(module) = self.modules.remove(&m) {
            for id in module.body {
                self.instrs.remove(&id);
            }
        }
    }

    /// Instructions that list `id` as an operand, in program order across the
    /// whole module tree.
    pub fn consumers_of(&self, id: InsId) -> Vec<InsId> {
        let mut out = Vec::new();
        for m in self.module_ids() {
            for ins_id in &self.module(m).body {
                if self.ins(*ins_id).inputs.contains(&id) {
                    out.push(*ins_id);
                }
            }
        }
        out
    }

    pub fn return_id(&self, m: ModuleId) -> Option<InsId> {
        let last = *self.module(m).body.last()?;
        matches!(self.ins(last).op, Op::Return).then_some(last)
    }

    /// Logical outputs: the return's operands, else the single last instruction.
    pub fn outputs(&self, m: ModuleId) -> Vec<InsId> {
        match self.return_id(m) {
            Some(ret) => self.ins(ret).inputs.clone(),
            None => self.module(m).body.last().copied().into_iter().collect(),
        }
    }

    pub fn output_specs(&self, m: ModuleId) -> Result<Vec<TensorSpec>> {
        self.outputs(m)
            .iter()
            .map(|id| self.ins(*id).out.tensor().cloned())
            .collect()
    }

    /// Compile-time constant propagation: literals evaluate to themselves and
    /// foldable operators evaluate when every operand does. Parameters,
    /// outlines, and control-flow nodes never evaluate; a genuine runtime
    /// dependency reads as `None`, not as an error.
    pub fn try_eval(&self, id: InsId) -> Option<TensorValue> {
        let mut memo = HashMap::new();
        self.eval_rec(id, &mut memo)
    }

    fn eval_rec(
        &self,
        id: InsId,
        memo: &mut HashMap<InsId, Option<TensorValue>>,
    ) -> Option<TensorValue> {
        if let Some(cached) = memo.get(&id) {
            return cached.clone();
        }
        let ins = self.get_ins(id)?;
        let result = match &ins.op {
            Op::Literal(value) => Some(value.clone()),
            Op::Compute(op) => {
                let mut values = Vec::with_capacity(ins.inputs.len());
                let mut all_known = true;
                for input in &ins.inputs {
                    match self.eval_rec(*input, memo) {
                        Some(v) => values.push(v),
                        None => {
                            all_known = false;
                            break;
                        }
                    }
                }
                if all_known {
                    op.eval(&values).and_then(|r| r.ok())
                } else {
                    None
                }
            }
            _ => None,
        };
        memo.insert(id, result.clone());
        result
    }

    fn allocate(
        &mut self,
        op: Op,
        inputs: Vec<InsId>,
        submodules: Vec<ModuleId>,
        out: ValueType,
    ) -> InsId {
        let id = InsId(self.next_ins);
        self.next_ins += 1;
        self.instrs.insert(
            id,
            Instruction {
                id,
                op,
                inputs,
                submodules,
                out,
            },
        );
        id
    }

    fn module_mut(&mut self, m: ModuleId) -> &mut Module {
        self.modules.get_mut(&m).expect("dangling module handle")
    }

    fn input_specs(&self, inputs: &[InsId]) -> Result<Vec<TensorSpec>> {
        inputs
            .iter()
            .map(|id| self.ins(*id).out.tensor().cloned())
            .collect()
    }

    fn infer_type(&self, op: &Op, inputs: &[InsId], submodules: &[ModuleId]) -> Result<ValueType> {
        match op {
            Op::Parameter(_) | Op::Literal(_) | Op::Outline => Err(GraphError::invariant(
                "placeholders are created through their dedicated constructors",
            )),
            Op::Return => Ok(ValueType::Tuple(Vec::new())),
            Op::TupleGet(index) => {
                let [producer] = inputs else {
                    return Err(GraphError::shape("tuple_get takes exactly one operand"));
                };
                Ok(ValueType::Tensor(
                    self.ins(*producer).out.tuple_element(*index)?.clone(),
                ))
            }
            Op::If => {
                let [then_mod, else_mod] = submodules else {
                    return Err(GraphError::shape("if requires exactly two submodules"));
                };
                let cond = inputs
                    .first()
                    .ok_or_else(|| GraphError::shape("if requires a condition operand"))?;
                let cond_spec = self.ins(*cond).out.tensor()?;
                if cond_spec.elements() != 1 {
                    return Err(GraphError::shape(format!(
                        "if condition must have exactly one element, got {cond_spec}"
                    )));
                }
                let then_specs = self.output_specs(*then_mod)?;
                let else_specs = self.output_specs(*else_mod)?;
                if then_specs != else_specs {
                    return Err(GraphError::shape(format!(
                        "if branches disagree on output shapes: `{}` vs `{}`",
                        self.module(*then_mod).name,
                        self.module(*else_mod).name
                    )));
                }
                Ok(ValueType::Tuple(then_specs))
            }
            Op::Loop => {
                if submodules.len() != 1 {
                    return Err(GraphError::shape("loop requires exactly one body submodule"));
                }
                if inputs.len() < 2 {
                    return Err(GraphError::shape(
                        "loop requires trip count and initial condition operands",
                    ));
                }
                let specs = self.input_specs(inputs)?;
                Ok(ValueType::Tuple(specs[2..].to_vec()))
            }
            Op::Compute(operator) => {
                let specs = self.input_specs(inputs)?;
                operator.output_spec(&specs)
            }
        }
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for m in self.module_ids() {
            let module = self.module(m);
            match module.parent {
                Some(parent) => writeln!(
                    f,
                    "module {} (parent: {}) {{",
                    module.name,
                    self.module(parent).name
                )?,
                None => writeln!(f, "module {} {{", module.name)?,
            }
            for id in &module.body {
                let ins = self.ins(*id);
                writeln!(f, "  @{} = {} -> {}", id.0, self.format_ins(ins), ins.out)?;
            }
            writeln!(f, "}}")?;
        }
        Ok(())
    }
}

impl Program {
    fn format_ins(&self, ins: &Instruction) -> String {
        let operands = ins
            .inputs
            .iter()
            .map(|id| format!("@{}", id.0))
            .collect::<Vec<_>>()
            .join(", ");
        let mut text = match &ins.op {
            Op::Parameter(name) => format!("@param \"{name}\""),
            Op::Literal(_) => "@literal".to_string(),
            Op::Outline => "@outline".to_string(),
            Op::Return => format!("@return({operands})"),
            Op::TupleGet(index) => format!("tuple_get[{index}]({operands})"),
            Op::If => format!("if({operands})"),
            Op::Loop => format!("loop({operands})"),
            Op::Compute(op) => format!("{}({operands})", op.name()),
        };
        if !ins.submodules.is_empty() {
            let names = ins
                .submodules
                .iter()
                .map(|m| self.module(*m).name.clone())
                .collect::<Vec<_>>()
                .join(", ");
            text.push_str(&format!(" [{names}]"));
        }
        text
    }
}
