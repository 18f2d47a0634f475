//! Resolution of client-supplied record type identifiers.

use std::collections::BTreeMap;
use std::sync::Arc;

use thiserror::Error;

use crate::schema::Schema;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("no record type given")]
    Missing,

    #[error("unknown record type `{0}`")]
    Unknown(String),

    #[error("record type `{0}` is not exposed")]
    Forbidden(String),
}

impl ResolveError {
    /// HTTP status the error maps to.
    pub fn status_code(&self) -> u16 {
        match self {
            ResolveError::Missing | ResolveError::Unknown(_) => 400,
            ResolveError::Forbidden(_) => 403,
        }
    }
}

/// Schemas by identifier, with the subset clients may address.
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    schemas: BTreeMap<String, Arc<Schema>>,
    exposed: Vec<String>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a schema under its own name without exposing it.
    pub fn register(&mut self, schema: Arc<Schema>) -> &mut Self {
        self.schemas.insert(schema.name().to_string(), schema);
        self
    }

    /// Register a schema and expose it to clients.
    pub fn expose(&mut self, schema: Arc<Schema>) -> &mut Self {
        let name = schema.name().to_string();
        if !self.exposed.contains(&name) {
            self.exposed.push(name);
        }
        self.register(schema)
    }

    pub fn exposed(&self) -> &[String] {
        &self.exposed
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Schema>> {
        self.schemas.get(name)
    }

    pub fn resolve(&self, name: Option<&str>) -> Result<Arc<Schema>, ResolveError> {
        let name = name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .ok_or(ResolveError::Missing)?;
        let schema = self
            .schemas
            .get(name)
            .ok_or_else(|| ResolveError::Unknown(name.to_string()))?;
        if !self.exposed.iter().any(|e| e == name) {
            return Err(ResolveError::Forbidden(name.to_string()));
        }
        Ok(Arc::clone(schema))
    }
}
