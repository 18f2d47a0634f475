//! Error types for query resolution and schema declaration.

use thiserror::Error;

/// Failures while applying a resolved query to a builder. Malformed client
/// input never ends up here; it is dropped before reaching the builder.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("unknown scope `{0}`")]
    UnknownScope(String),

    #[error("unknown relation `{0}`")]
    UnknownRelation(String),

    #[error("relation `{relation}` cannot be used for {usage}")]
    UnsupportedRelation { relation: String, usage: &'static str },

    #[error("scope `{scope}` failed: {message}")]
    Scope { scope: String, message: String },
}

impl QueryError {
    pub fn scope(scope: impl Into<String>, message: impl Into<String>) -> Self {
        QueryError::Scope {
            scope: scope.into(),
            message: message.into(),
        }
    }
}

/// Defects in a schema declaration, reported when the schema is built.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("schema `{schema}`: aggregate `{aggregate}` references unknown scope `{scope}`")]
    UnknownScope {
        schema: String,
        aggregate: String,
        scope: String,
    },

    #[error("schema `{schema}`: `{name}` is declared twice as {kind}")]
    Duplicate {
        schema: String,
        name: String,
        kind: &'static str,
    },

    #[error("schema `{schema}`: relation `{relation}` is declared twice")]
    DuplicateRelation { schema: String, relation: String },
}
