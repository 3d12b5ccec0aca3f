use thiserror::Error;

/// Failure surfaced by graph construction, optimization, ingestion, or execution.
///
/// `Parse` rejects malformed or unsupported input models. `Invariant` signals a
/// defect in a collaborating pass rather than bad input and is never recovered.
/// A conditional that is neither statically resolvable nor jointly foldable is
/// not an error anywhere in this crate; the resolver simply leaves it in place.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("parse error: {0}")]
    Parse(String),
    #[error("invariant violation: {0}")]
    Invariant(String),
    #[error("shape error: {0}")]
    Shape(String),
    #[error("execution error: {0}")]
    Exec(String),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl GraphError {
    pub fn parse(msg: impl Into<String>) -> Self {
        GraphError::Parse(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        GraphError::Invariant(msg.into())
    }

    pub fn shape(msg: impl Into<String>) -> Self {
        GraphError::Shape(msg.into())
    }

    pub fn exec(msg: impl Into<String>) -> Self {
        GraphError::Exec(msg.into())
    }
}

/// Convenience alias for results returned throughout the crate.
pub type Result<T> = std::result::Result<T, GraphError>;
