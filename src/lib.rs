//! Client-driven field selection, filtering, sorting and grouping over a
//! relational query builder, bounded by per-record-type whitelists.

pub mod ast;
pub mod builder;
pub mod config;
pub mod dependency;
pub mod error;
pub mod filter;
pub mod group;
pub mod lexer;
pub mod paginate;
pub mod planner;
pub mod query;
pub mod record;
pub mod registry;
pub mod relations;
pub mod request;
pub mod schema;
pub mod sort;
pub mod sql_compiler;
pub mod token;
pub mod visibility;
pub mod whitelist;

pub use builder::{DirectiveLog, QueryBuilder};
pub use config::{ConfigError, QueryConfig, SchemaConfig};
pub use error::{QueryError, SchemaError};
pub use query::{DynamicQuery, QueryOptions, ResolvedQuery};
pub use registry::{ModelRegistry, ResolveError};
pub use request::{JsonRequest, Request};
pub use schema::{Aggregate, Schema, SchemaBuilder};
pub use sql_compiler::SqlCompiler;
pub use visibility::Record;
