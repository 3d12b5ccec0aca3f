use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::ir::{DType, TensorValue};

/// Wire form of one model subgraph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphDoc {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub inputs: Vec<IoDoc>,
    #[serde(default)]
    pub initializers: Vec<InitDoc>,
    #[serde(default)]
    pub nodes: Vec<NodeDoc>,
    #[serde(default)]
    pub outputs: Vec<String>,
}

impl GraphDoc {
    pub fn from_json_str(src: &str) -> Result<Self> {
        Ok(serde_json::from_str(src)?)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Declared graph input: a named placeholder with dtype and shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IoDoc {
    pub name: String,
    pub dtype: DType,
    pub dims: Vec<usize>,
}

/// Embedded constant bound to a name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitDoc {
    pub name: String,
    pub value: TensorValue,
}

/// One operation node with named operand wiring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDoc {
    #[serde(default)]
    pub name: String,
    pub op: String,
    #[serde(default)]
    pub inputs: Vec<String>,
    #[serde(default)]
    pub outputs: Vec<String>,
    #[serde(default)]
    pub attrs: BTreeMap<String, AttrDoc>,
}

/// Node attribute payload. Control-flow nodes carry whole subgraphs here.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value")]
pub enum AttrDoc {
    Int(i64),
    Ints(Vec<i64>),
    Float(f64),
    Str(String),
    Tensor(TensorValue),
    Graph(GraphDoc),
}
