use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use once_cell::sync::Lazy;

use crate::error::{GraphError, Result};
use crate::ir::DType;

use super::elementwise::{Arith, Convert, Less};
use super::movement::{Broadcast, Concat, Gather, Reshape};
use super::Operator;

/// Scalar attribute carried by a serialized node.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    Int(i64),
    Ints(Vec<i64>),
    Float(f64),
    Str(String),
}

/// Attribute bag handed to operator factories during ingestion.
#[derive(Debug, Clone, Default)]
pub struct OpAttrs(BTreeMap<String, AttrValue>);

impl OpAttrs {
    pub fn new(attrs: BTreeMap<String, AttrValue>) -> Self {
        Self(attrs)
    }

    pub fn get_int(&self, key: &str) -> Result<i64> {
        match self.0.get(key) {
            Some(AttrValue::Int(v)) => Ok(*v),
            _ => Err(GraphError::parse(format!(
                "missing or non-integer attribute `{key}`"
            ))),
        }
    }

    pub fn get_ints(&self, key: &str) -> Result<&[i64]> {
        match self.0.get(key) {
            Some(AttrValue::Ints(v)) => Ok(v),
            _ => Err(GraphError::parse(format!(
                "missing or non-array attribute `{key}`"
            ))),
        }
    }

    pub fn get_str(&self, key: &str) -> Result<&str> {
        match self.0.get(key) {
            Some(AttrValue::Str(v)) => Ok(v),
            _ => Err(GraphError::parse(format!(
                "missing or non-string attribute `{key}`"
            ))),
        }
    }
}

fn dims_from_ints(values: &[i64], key: &str) -> Result<Vec<usize>> {
    values
        .iter()
        .map(|&v| {
            usize::try_from(v)
                .map_err(|_| GraphError::parse(format!("attribute `{key}` holds a negative dim")))
        })
        .collect()
}

fn axis_from_attrs(attrs: &OpAttrs) -> Result<usize> {
    let axis = attrs.get_int("axis")?;
    usize::try_from(axis).map_err(|_| GraphError::parse("attribute `axis` must be non-negative"))
}

type Factory = fn(&OpAttrs) -> Result<Arc<dyn Operator>>;

/// Maps serialized operator names (plus attributes) to capability instances.
pub struct OpRegistry {
    factories: HashMap<String, Factory>,
}

impl OpRegistry {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    pub fn register(&mut self, name: impl Into<String>, factory: Factory) {
        self.factories.insert(name.into(), factory);
    }

    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("add", |_| Ok(Arc::new(Arith::add())));
        registry.register("sub", |_| Ok(Arc::new(Arith::sub())));
        registry.register("mul", |_| Ok(Arc::new(Arith::mul())));
        registry.register("less", |_| Ok(Arc::new(Less)));
        registry.register("convert", |attrs| {
            let target: DType = attrs.get_str("target_type")?.parse()?;
            Ok(Arc::new(Convert { target }))
        });
        registry.register("concat", |attrs| {
            Ok(Arc::new(Concat {
                axis: axis_from_attrs(attrs)?,
            }))
        });
        registry.register("reshape", |attrs| {
            Ok(Arc::new(Reshape {
                dims: dims_from_ints(attrs.get_ints("dims")?, "dims")?,
            }))
        });
        registry.register("multibroadcast", |attrs| {
            Ok(Arc::new(Broadcast {
                out_dims: dims_from_ints(attrs.get_ints("out_lens")?, "out_lens")?,
            }))
        });
        registry.register("gather", |attrs| {
            Ok(Arc::new(Gather {
                axis: axis_from_attrs(attrs)?,
            }))
        });
        registry
    }

    pub fn build(&self, name: &str, attrs: &OpAttrs) -> Result<Arc<dyn Operator>> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| GraphError::parse(format!("unknown operator `{name}`")))?;
        factory(attrs)
    }
}

impl Default for OpRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

static DEFAULT_REGISTRY: Lazy<OpRegistry> = Lazy::new(OpRegistry::with_builtins);

/// Shared registry carrying the builtin operator set.
pub fn default_registry() -> &'static OpRegistry {
    &DEFAULT_REGISTRY
}
