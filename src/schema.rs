//! Per record type capability declarations.
//!
//! A [`Schema`] lists everything a client may ask for on one record type:
//! columns, relations, appends, aggregates, filters, sorts and groups. It is
//! built once, validated, and then shared read-only.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value as JsonValue};

use crate::ast::{AggregateFn, Direction, FilterClause, SortClause};
use crate::builder::QueryBuilder;
use crate::dependency::DependencyMap;
use crate::error::{QueryError, SchemaError};
use crate::relations::{self, RelationDef};

/// A named scope: mutates the builder with the given arguments.
pub type ScopeFn =
    Arc<dyn Fn(&mut dyn QueryBuilder, &[JsonValue]) -> Result<(), QueryError> + Send + Sync>;

/// Custom handling for a filter key. Receives the parsed clause and decides
/// itself what the value and operator mean.
pub type FilterHandler =
    Arc<dyn Fn(&mut dyn QueryBuilder, &FilterClause) -> Result<(), QueryError> + Send + Sync>;

pub type AggregateCallback =
    Arc<dyn Fn(&mut dyn QueryBuilder) -> Result<(), QueryError> + Send + Sync>;

/// Computes an append from the record's attributes.
pub type Accessor = Arc<dyn Fn(&Map<String, JsonValue>) -> JsonValue + Send + Sync>;

/// How a filter key is handled.
#[derive(Clone)]
pub enum FilterRule {
    /// A column, with the operators the client may choose from. An empty
    /// list accepts any operator.
    Column { operators: Vec<String> },
    Custom(FilterHandler),
}

impl fmt::Debug for FilterRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterRule::Column { operators } => {
                f.debug_struct("Column").field("operators", operators).finish()
            }
            FilterRule::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// How a requested aggregate is produced. Always invoked after the column
/// selection is fixed.
#[derive(Clone)]
pub enum Aggregate {
    /// Call the named scope without arguments.
    Scope(String),
    /// Call the named scope with the aggregate's own name.
    TargetedScope(String),
    Callback(AggregateCallback),
}

impl Aggregate {
    pub fn callback<F>(f: F) -> Self
    where
        F: Fn(&mut dyn QueryBuilder) -> Result<(), QueryError> + Send + Sync + 'static,
    {
        Aggregate::Callback(Arc::new(f))
    }

    pub fn relation(function: AggregateFn, relation: &str, column: Option<&str>) -> Self {
        let relation = relation.to_string();
        let column = column.map(str::to_string);
        Aggregate::callback(move |builder| {
            builder.with_aggregate(&relation, function, column.as_deref())
        })
    }

    pub fn count(relation: &str) -> Self {
        Self::relation(AggregateFn::Count, relation, None)
    }

    pub fn sum(relation: &str, column: &str) -> Self {
        Self::relation(AggregateFn::Sum, relation, Some(column))
    }

    pub fn avg(relation: &str, column: &str) -> Self {
        Self::relation(AggregateFn::Avg, relation, Some(column))
    }

    pub fn min(relation: &str, column: &str) -> Self {
        Self::relation(AggregateFn::Min, relation, Some(column))
    }

    pub fn max(relation: &str, column: &str) -> Self {
        Self::relation(AggregateFn::Max, relation, Some(column))
    }
}

impl fmt::Debug for Aggregate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Aggregate::Scope(name) => f.debug_tuple("Scope").field(name).finish(),
            Aggregate::TargetedScope(name) => f.debug_tuple("TargetedScope").field(name).finish(),
            Aggregate::Callback(_) => f.write_str("Callback(..)"),
        }
    }
}

pub struct Schema {
    name: String,
    table: String,
    columns: Vec<String>,
    storage_columns: Vec<String>,
    always_select: Vec<String>,
    relations: DependencyMap,
    relation_names: Vec<String>,
    relation_defs: Vec<RelationDef>,
    appends: DependencyMap,
    append_names: Vec<String>,
    accessors: BTreeMap<String, Accessor>,
    dependencies: DependencyMap,
    aggregates: Vec<(String, Aggregate)>,
    aggregate_names: Vec<String>,
    filters: Vec<(String, FilterRule)>,
    filter_keys: Vec<String>,
    sorts: Vec<String>,
    default_sort: Vec<SortClause>,
    groups: Vec<String>,
    default_group: Vec<String>,
    scopes: BTreeMap<String, ScopeFn>,
}

impl Schema {
    pub fn builder(name: impl Into<String>, table: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder::new(name, table)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Explicit column allow-list. Empty when not declared.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Columns of the underlying table, when known.
    pub fn storage_columns(&self) -> &[String] {
        &self.storage_columns
    }

    pub fn always_select(&self) -> &[String] {
        &self.always_select
    }

    pub fn relations(&self) -> &DependencyMap {
        &self.relations
    }

    pub fn relation_names(&self) -> &[String] {
        &self.relation_names
    }

    pub fn relation_def(&self, name: &str) -> Option<&RelationDef> {
        self.relation_defs.iter().find(|def| def.name == name)
    }

    pub fn relation_defs(&self) -> &[RelationDef] {
        &self.relation_defs
    }

    pub fn appends(&self) -> &DependencyMap {
        &self.appends
    }

    pub fn append_names(&self) -> &[String] {
        &self.append_names
    }

    pub fn accessor(&self, append: &str) -> Option<&Accessor> {
        self.accessors.get(append)
    }

    /// Appends and relations merged into one map, for closure computation.
    pub fn dependencies(&self) -> &DependencyMap {
        &self.dependencies
    }

    pub fn aggregate_names(&self) -> &[String] {
        &self.aggregate_names
    }

    pub fn aggregate(&self, name: &str) -> Option<&Aggregate> {
        self.aggregates
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, aggregate)| aggregate)
    }

    pub fn filter_keys(&self) -> &[String] {
        &self.filter_keys
    }

    pub fn filter_rule(&self, key: &str) -> Option<&FilterRule> {
        self.filters
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, rule)| rule)
    }

    pub fn sorts(&self) -> &[String] {
        &self.sorts
    }

    pub fn default_sort(&self) -> &[SortClause] {
        &self.default_sort
    }

    pub fn groups(&self) -> &[String] {
        &self.groups
    }

    pub fn default_group(&self) -> &[String] {
        &self.default_group
    }

    pub fn scope(&self, name: &str) -> Option<&ScopeFn> {
        self.scopes.get(name)
    }

    /// Invoke a registered scope.
    pub fn call_scope(
        &self,
        name: &str,
        builder: &mut dyn QueryBuilder,
        args: &[JsonValue],
    ) -> Result<(), QueryError> {
        let scope = self
            .scope(name)
            .ok_or_else(|| QueryError::UnknownScope(name.to_string()))?;
        scope(builder, args)
    }

    /// Run the aggregate registered under `name`.
    pub fn apply_aggregate(&self, name: &str, builder: &mut dyn QueryBuilder) -> Result<(), QueryError> {
        match self.aggregate(name) {
            Some(Aggregate::Scope(scope)) => self.call_scope(scope, builder, &[]),
            Some(Aggregate::TargetedScope(scope)) => {
                self.call_scope(scope, builder, &[JsonValue::String(name.to_string())])
            }
            Some(Aggregate::Callback(callback)) => callback(builder),
            None => Err(QueryError::UnknownScope(name.to_string())),
        }
    }
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema")
            .field("name", &self.name)
            .field("table", &self.table)
            .field("columns", &self.columns)
            .field("relations", &self.relation_names)
            .field("appends", &self.append_names)
            .field("aggregates", &self.aggregate_names)
            .field("filters", &self.filter_keys)
            .field("sorts", &self.sorts)
            .field("groups", &self.groups)
            .finish_non_exhaustive()
    }
}

pub struct SchemaBuilder {
    name: String,
    table: String,
    columns: Vec<String>,
    storage_columns: Vec<String>,
    always_select: Vec<String>,
    relations: DependencyMap,
    relation_defs: Vec<RelationDef>,
    appends: DependencyMap,
    accessors: BTreeMap<String, Accessor>,
    aggregates: Vec<(String, Aggregate)>,
    filters: Vec<(String, FilterRule)>,
    sorts: Vec<String>,
    default_sort: Vec<SortClause>,
    groups: Vec<String>,
    default_group: Vec<String>,
    scopes: BTreeMap<String, ScopeFn>,
}

fn to_strings<I, S>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    items.into_iter().map(Into::into).collect()
}

impl SchemaBuilder {
    pub fn new(name: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            columns: Vec::new(),
            storage_columns: Vec::new(),
            always_select: Vec::new(),
            relations: DependencyMap::new(),
            relation_defs: Vec::new(),
            appends: DependencyMap::new(),
            accessors: BTreeMap::new(),
            aggregates: Vec::new(),
            filters: Vec::new(),
            sorts: Vec::new(),
            default_sort: Vec::new(),
            groups: Vec::new(),
            default_group: Vec::new(),
            scopes: BTreeMap::new(),
        }
    }

    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns.extend(to_strings(columns));
        self
    }

    pub fn storage_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.storage_columns.extend(to_strings(columns));
        self
    }

    /// Columns added to every restricted selection, e.g. the primary key.
    pub fn always_select<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.always_select.extend(to_strings(columns));
        self
    }

    /// Explicit relation dependency. Once any is declared, discovery from
    /// the relation table is skipped.
    pub fn relation<I, S>(mut self, name: &str, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.relations.insert(name, to_strings(deps));
        self
    }

    pub fn relation_def(mut self, def: RelationDef) -> Self {
        self.relation_defs.push(def);
        self
    }

    pub fn append<I, S>(mut self, name: &str, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.appends.insert(name, to_strings(deps));
        self
    }

    /// An append with the accessor that computes it.
    pub fn append_with<I, S, F>(mut self, name: &str, deps: I, accessor: F) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: Fn(&Map<String, JsonValue>) -> JsonValue + Send + Sync + 'static,
    {
        self.accessors.insert(name.to_string(), Arc::new(accessor));
        self.append(name, deps)
    }

    pub fn aggregate(mut self, name: &str, aggregate: Aggregate) -> Self {
        self.aggregates.push((name.to_string(), aggregate));
        self
    }

    /// A filterable column with its permitted operators.
    pub fn filter<I, S>(mut self, key: &str, operators: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.filters.push((
            key.to_string(),
            FilterRule::Column {
                operators: to_strings(operators),
            },
        ));
        self
    }

    pub fn filter_custom<F>(mut self, key: &str, handler: F) -> Self
    where
        F: Fn(&mut dyn QueryBuilder, &FilterClause) -> Result<(), QueryError> + Send + Sync + 'static,
    {
        self.filters
            .push((key.to_string(), FilterRule::Custom(Arc::new(handler))));
        self
    }

    pub fn sorts<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sorts.extend(to_strings(columns));
        self
    }

    pub fn default_sort(mut self, column: &str, direction: Direction) -> Self {
        self.default_sort.push(SortClause {
            column: column.to_string(),
            direction,
        });
        self
    }

    pub fn groups<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.groups.extend(to_strings(columns));
        self
    }

    pub fn default_group<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.default_group.extend(to_strings(columns));
        self
    }

    pub fn scope<F>(mut self, name: &str, scope: F) -> Self
    where
        F: Fn(&mut dyn QueryBuilder, &[JsonValue]) -> Result<(), QueryError> + Send + Sync + 'static,
    {
        self.scopes.insert(name.to_string(), Arc::new(scope));
        self
    }

    pub fn build(self) -> Result<Arc<Schema>, SchemaError> {
        let mut seen = HashSet::new();
        for def in &self.relation_defs {
            if !seen.insert(def.name.as_str()) {
                return Err(SchemaError::DuplicateRelation {
                    schema: self.name.clone(),
                    relation: def.name.clone(),
                });
            }
        }
        check_unique(&self.name, self.filters.iter().map(|(k, _)| k), "filter")?;
        check_unique(&self.name, self.aggregates.iter().map(|(k, _)| k), "aggregate")?;

        for (name, aggregate) in &self.aggregates {
            if let Aggregate::Scope(scope) | Aggregate::TargetedScope(scope) = aggregate {
                if !self.scopes.contains_key(scope) {
                    return Err(SchemaError::UnknownScope {
                        schema: self.name.clone(),
                        aggregate: name.clone(),
                        scope: scope.clone(),
                    });
                }
            }
        }

        let relations = if self.relations.is_empty() {
            relations::discover_cached(&self.name, &self.relation_defs).as_ref().clone()
        } else {
            self.relations
        };

        let relation_names = relations.names().map(str::to_string).collect();
        let append_names = self.appends.names().map(str::to_string).collect();
        let aggregate_names = self.aggregates.iter().map(|(n, _)| n.clone()).collect();
        let filter_keys = self.filters.iter().map(|(k, _)| k.clone()).collect();
        let dependencies = self.appends.merged(&relations);

        Ok(Arc::new(Schema {
            name: self.name,
            table: self.table,
            columns: self.columns,
            storage_columns: self.storage_columns,
            always_select: self.always_select,
            relations,
            relation_names,
            relation_defs: self.relation_defs,
            appends: self.appends,
            append_names,
            accessors: self.accessors,
            dependencies,
            aggregates: self.aggregates,
            aggregate_names,
            filters: self.filters,
            filter_keys,
            sorts: self.sorts,
            default_sort: self.default_sort,
            groups: self.groups,
            default_group: self.default_group,
            scopes: self.scopes,
        }))
    }
}

fn check_unique<'a>(
    schema: &str,
    names: impl Iterator<Item = &'a String>,
    kind: &'static str,
) -> Result<(), SchemaError> {
    let mut seen = HashSet::new();
    for name in names {
        if !seen.insert(name) {
            return Err(SchemaError::Duplicate {
                schema: schema.to_string(),
                name: name.clone(),
                kind,
            });
        }
    }
    Ok(())
}
