//! Turns a parsed `_fields` list into a selection plan and applies it.

use crate::ast::EagerLoad;
use crate::builder::QueryBuilder;
use crate::error::QueryError;
use crate::schema::Schema;
use crate::token::ParsedFields;
use crate::whitelist;

/// Selects every column when present in the requested set.
pub const WILDCARD: &str = "*";

/// What to select, load and expose for one request. Every name in it has
/// been whitelisted against the schema.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SelectionPlan {
    /// Base columns, `None` for all of them.
    pub columns: Option<Vec<String>>,
    pub relations: Vec<EagerLoad>,
    pub appends: Vec<String>,
    pub aggregates: Vec<String>,
    /// The dependency closure of the request, minus ignored names.
    pub fields: Vec<String>,
}

impl SelectionPlan {
    /// No restriction: all columns, nothing loaded or appended.
    pub fn unrestricted() -> Self {
        Self::default()
    }

    pub fn is_unrestricted(&self) -> bool {
        self == &Self::default()
    }

    pub fn is_wildcard(&self) -> bool {
        self.fields.iter().any(|f| f == WILDCARD)
    }
}

pub fn plan_selection(schema: &Schema, fields: &ParsedFields, ignore: &[String]) -> SelectionPlan {
    if fields.is_empty() {
        return SelectionPlan::unrestricted();
    }

    let closure = schema.dependencies().closure(&fields.names);

    let relations = whitelist::intersect(&closure, schema.relation_names(), ignore)
        .into_iter()
        .map(|relation| EagerLoad {
            nested: fields.nested_for(&relation).cloned(),
            relation,
        })
        .collect();
    let appends = whitelist::intersect(&closure, schema.append_names(), ignore);
    let aggregates = whitelist::intersect_declared(&closure, schema.aggregate_names(), ignore);

    let columns = if closure.iter().any(|name| name == WILDCARD) {
        None
    } else {
        restricted_columns(schema, fields, &closure, ignore)
    };

    let plan = SelectionPlan {
        columns,
        relations,
        appends,
        aggregates,
        fields: closure
            .into_iter()
            .filter(|name| !ignore.contains(name))
            .collect(),
    };
    tracing::trace!(schema = schema.name(), ?plan, "planned selection");
    plan
}

/// Columns to select, or `None` when nothing would be restricted.
fn restricted_columns(
    schema: &Schema,
    fields: &ParsedFields,
    closure: &[String],
    ignore: &[String],
) -> Option<Vec<String>> {
    let chosen = if !schema.columns().is_empty() {
        whitelist::intersect(closure, schema.columns(), ignore)
    } else if !schema.storage_columns().is_empty() {
        whitelist::intersect(closure, schema.storage_columns(), ignore)
    } else {
        // Whatever is not a known derived name is taken to be a column.
        closure
            .iter()
            .filter(|name| {
                !schema.relation_names().contains(name)
                    && !schema.aggregate_names().contains(name)
                    && !schema.append_names().contains(name)
                    && fields.nested_for(name).is_none()
                    && !ignore.contains(name)
            })
            .cloned()
            .collect()
    };

    if chosen.is_empty() {
        return None;
    }

    let mut columns: Vec<String> = schema.always_select().to_vec();
    for column in chosen {
        if !columns.contains(&column) {
            columns.push(column);
        }
    }
    Some(columns)
}

/// Issue the plan: `select`, one `with` per relation, then aggregates.
pub fn apply_selection(
    schema: &Schema,
    plan: &SelectionPlan,
    builder: &mut dyn QueryBuilder,
) -> Result<(), QueryError> {
    if let Some(columns) = &plan.columns {
        builder.select(columns);
    }
    for load in &plan.relations {
        builder.with(&load.relation, load.nested.as_ref());
    }
    // aggregates need the select to be fixed first
    for name in &plan.aggregates {
        schema.apply_aggregate(name, builder)?;
    }
    Ok(())
}
