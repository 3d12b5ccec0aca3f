//! Serialized-graph ingestion with parse-time branch folding.
//!
//! A [`GraphDoc`] is the wire form of a model graph: named inputs,
//! initializers, operation nodes, and declared outputs. Control-flow nodes
//! carry nested subgraph attributes. Conditionals whose condition is already
//! a single-element constant are folded during parsing itself, and only the
//! selected subgraph is ever parsed.

mod doc;
mod parser;

pub use doc::{AttrDoc, GraphDoc, InitDoc, IoDoc, NodeDoc};
pub use parser::GraphLoader;
