use std::collections::{BTreeMap, HashMap};

use tracing::debug;

use crate::error::{GraphError, Result};
use crate::ir::{DType, InsId, ModuleId, Op, Program, TensorSpec};
use crate::ops::{default_registry, AttrValue, OpAttrs, OpRegistry};

use super::doc::{AttrDoc, GraphDoc, NodeDoc};

/// Builds the nested module structure from a serialized graph description.
///
/// A single name-to-instruction environment flows through nested subgraph
/// parses, so an inner graph may reference values produced in an enclosing
/// scope.
pub struct GraphLoader<'r> {
    registry: &'r OpRegistry,
}

impl Default for GraphLoader<'static> {
    fn default() -> Self {
        Self::new(default_registry())
    }
}

impl<'r> GraphLoader<'r> {
    pub fn new(registry: &'r OpRegistry) -> Self {
        Self { registry }
    }

    pub fn load(&self, doc: &GraphDoc) -> Result<Program> {
        let name = if doc.name.is_empty() {
            "main"
        } else {
            doc.name.as_str()
        };
        let mut prog = Program::new(name);
        let mut env = HashMap::new();
        let main = prog.main();
        self.parse_graph(&mut prog, main, doc, &mut env)?;
        Ok(prog)
    }

    pub fn load_json(&self, src: &str) -> Result<Program> {
        self.load(&GraphDoc::from_json_str(src)?)
    }

    fn parse_graph(
        &self,
        prog: &mut Program,
        m: ModuleId,
        doc: &GraphDoc,
        env: &mut HashMap<String, InsId>,
    ) -> Result<()> {
        for input in &doc.inputs {
            let spec = TensorSpec::new(input.dtype, input.dims.clone());
            let id = prog.add_parameter(m, input.name.clone(), spec)?;
            env.insert(input.name.clone(), id);
        }
        for init in &doc.initializers {
            let id = prog.add_literal(m, init.value.clone());
            env.insert(init.name.clone(), id);
        }
        for node in &doc.nodes {
            if node.op == "If" {
                self.parse_if(prog, m, node, env)?;
            } else {
                self.parse_node(prog, m, node, env)?;
            }
        }
        if !doc.outputs.is_empty() {
            let outputs = self.resolve_names(&doc.outputs, env)?;
            prog.add_return(m, outputs)?;
        }
        Ok(())
    }

    fn parse_node(
        &self,
        prog: &mut Program,
        m: ModuleId,
        node: &NodeDoc,
        env: &mut HashMap<String, InsId>,
    ) -> Result<()> {
        let [output] = node.outputs.as_slice() else {
            return Err(GraphError::parse(format!(
                "node `{}` must declare exactly one output; multi-output results \
                 come only from control-flow nodes",
                node.name
            )));
        };
        let operator = self.registry.build(&node.op, &scalar_attrs(node))?;
        let inputs = self.resolve_names(&node.inputs, env)?;
        let id = prog.add_instruction(m, Op::Compute(operator), inputs, Vec::new())?;
        env.insert(output.clone(), id);
        Ok(())
    }

    /// Conditional ingestion. A parse-time-constant single-element condition
    /// fixes the choice: only the selected subgraph is parsed, spliced
    /// directly into the current module, and its return operands become the
    /// node's results. Otherwise both branches become child modules behind an
    /// `if` instruction.
    fn parse_if(
        &self,
        prog: &mut Program,
        m: ModuleId,
        node: &NodeDoc,
        env: &mut HashMap<String, InsId>,
    ) -> Result<()> {
        let then_doc = graph_attr(node, "then_branch")?;
        let else_doc = graph_attr(node, "else_branch")?;
        if then_doc.outputs.is_empty() || else_doc.outputs.is_empty() {
            return Err(GraphError::parse(format!(
                "conditional `{}` branches must declare outputs",
                node.name
            )));
        }
        let inputs = self.resolve_names(&node.inputs, env)?;
        let &cond = inputs
            .first()
            .ok_or_else(|| GraphError::parse(format!("conditional `{}` has no condition", node.name)))?;

        match prog.try_eval(cond) {
            Some(value) => {
                if value.elements() != 1 {
                    return Err(GraphError::parse(format!(
                        "conditional `{}` condition must have exactly one element, got {}",
                        node.name,
                        value.elements()
                    )));
                }
                if value.dtype() != DType::I1 {
                    return Err(GraphError::parse(format!(
                        "conditional `{}` condition must be boolean, got {}",
                        node.name,
                        value.dtype()
                    )));
                }
                let take_then = value.as_bool_scalar()?;
                let chosen = if take_then { then_doc } else { else_doc };
                self.parse_graph(prog, m, chosen, env)?;
                let results = prog.take_return(m)?;
                if node.outputs.len() > results.len() {
                    return Err(GraphError::parse(format!(
                        "conditional `{}` declares {} outputs but the selected branch \
                         produces {}",
                        node.name,
                        node.outputs.len(),
                        results.len()
                    )));
                }
                for (name, id) in node.outputs.iter().zip(results) {
                    env.insert(name.clone(), id);
                }
                debug!(node = %node.name, take_then, "conditional folded at parse time");
            }
            None => {
                let stem = if node.name.is_empty() {
                    "if"
                } else {
                    node.name.as_str()
                };
                let then_m = prog.create_module(format!("{stem}_then"), Some(m));
                self.parse_graph(prog, then_m, then_doc, env)?;
                let else_m = prog.create_module(format!("{stem}_else"), Some(m));
                self.parse_graph(prog, else_m, else_doc, env)?;

                let then_specs = prog.output_specs(then_m)?;
                let else_specs = prog.output_specs(else_m)?;
                if then_specs != else_specs {
                    return Err(GraphError::parse(format!(
                        "conditional `{}` branches must have identical output shapes",
                        node.name
                    )));
                }

                let if_id = prog.add_instruction(m, Op::If, inputs, vec![then_m, else_m])?;
                for (index, name) in node.outputs.iter().enumerate() {
                    let extract =
                        prog.add_instruction(m, Op::TupleGet(index), vec![if_id], Vec::new())?;
                    env.insert(name.clone(), extract);
                }
                debug!(node = %node.name, "conditional deferred to runtime");
            }
        }
        Ok(())
    }

    fn resolve_names(&self, names: &[String], env: &HashMap<String, InsId>) -> Result<Vec<InsId>> {
        names
            .iter()
            .map(|name| {
                env.get(name)
                    .copied()
                    .ok_or_else(|| GraphError::parse(format!("unknown value `{name}`")))
            })
            .collect()
    }
}

fn graph_attr<'a>(node: &'a NodeDoc, key: &str) -> Result<&'a GraphDoc> {
    match node.attrs.get(key) {
        Some(AttrDoc::Graph(doc)) => Ok(doc),
        _ => Err(GraphError::parse(format!(
            "conditional `{}` is missing subgraph attribute `{key}`",
            node.name
        ))),
    }
}

fn scalar_attrs(node: &NodeDoc) -> OpAttrs {
    let mut map = BTreeMap::new();
    for (key, value) in &node.attrs {
        let value = match value {
            AttrDoc::Int(x) => AttrValue::Int(*x),
            AttrDoc::Ints(x) => AttrValue::Ints(x.clone()),
            AttrDoc::Float(x) => AttrValue::Float(*x),
            AttrDoc::Str(x) => AttrValue::Str(x.clone()),
            AttrDoc::Tensor(_) | AttrDoc::Graph(_) => continue,
        };
        map.insert(key.clone(), value);
    }
    OpAttrs::new(map)
}
