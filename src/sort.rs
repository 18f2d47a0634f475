//! Sort engine: `_sort=-price,name` to ordered directives.

use crate::ast::{Direction, SortClause};
use crate::builder::QueryBuilder;
use crate::config::ParamNames;
use crate::lexer::parse_list;
use crate::request::Request;
use crate::schema::Schema;
use crate::token::RawList;
use crate::whitelist;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SortOptions {
    /// Replaces the schema's sortable columns.
    pub allowed: Option<Vec<String>>,
    /// Replaces the schema's default ordering.
    pub default: Option<Vec<SortClause>>,
    pub ignore: Vec<String>,
}

/// Split `[-]column` tokens into (column, direction) pairs. A repeated
/// column keeps its first position and takes the last direction.
pub fn parse_sort_tokens(tokens: &[String]) -> Vec<SortClause> {
    let mut sorts: Vec<SortClause> = Vec::new();
    for token in tokens {
        let token = token.trim();
        let (column, direction) = match token.strip_prefix('-') {
            Some(column) => (column.trim(), Direction::Desc),
            None => (token, Direction::Asc),
        };
        if column.is_empty() {
            continue;
        }
        match sorts.iter_mut().find(|s| s.column == column) {
            Some(existing) => existing.direction = direction,
            None => sorts.push(SortClause {
                column: column.to_string(),
                direction,
            }),
        }
    }
    sorts
}

/// Orderings to apply, in request order. Without a `_sort` parameter the
/// default ordering is returned as declared.
pub fn parse_sorts(
    schema: &Schema,
    request: &dyn Request,
    params: &ParamNames,
    options: &SortOptions,
) -> Vec<SortClause> {
    let tokens = parse_list(&RawList::from_json(request.input(&params.sort)));
    if tokens.is_empty() {
        return options
            .default
            .clone()
            .unwrap_or_else(|| schema.default_sort().to_vec());
    }

    let declared = options.allowed.as_deref().unwrap_or(schema.sorts());
    let requested = parse_sort_tokens(&tokens);
    let columns: Vec<&str> = requested.iter().map(|s| s.column.as_str()).collect();
    let allowed = whitelist::intersect(&columns, declared, &options.ignore);

    let sorts: Vec<SortClause> = requested
        .into_iter()
        .filter(|s| allowed.contains(&s.column))
        .collect();
    if sorts.len() < tokens.len() {
        tracing::debug!(?tokens, kept = sorts.len(), "dropped sort tokens");
    }
    sorts
}

pub fn apply_sorts(sorts: &[SortClause], builder: &mut dyn QueryBuilder) {
    for sort in sorts {
        builder.order_by(&sort.column, sort.direction);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{Directive, DirectiveLog};
    use crate::request::JsonRequest;
    use serde_json::json;
    use std::sync::Arc;

    fn schema() -> Arc<Schema> {
        Schema::builder("sort-test-product", "products")
            .sorts(["name", "price"])
            .default_sort("created_at", Direction::Desc)
            .build()
            .unwrap()
    }

    fn sorts(request: serde_json::Value) -> Vec<SortClause> {
        parse_sorts(
            &schema(),
            &JsonRequest::from_value(request),
            &ParamNames::default(),
            &SortOptions::default(),
        )
    }

    fn clause(column: &str, direction: Direction) -> SortClause {
        SortClause {
            column: column.to_string(),
            direction,
        }
    }

    #[test]
    fn test_request_order_is_kept() {
        let sorts = sorts(json!({"_sort": "-price,name"}));
        assert_eq!(
            sorts,
            vec![clause("price", Direction::Desc), clause("name", Direction::Asc)]
        );

        let mut log = DirectiveLog::new();
        apply_sorts(&sorts, &mut log);
        assert_eq!(
            log.directives,
            vec![
                Directive::OrderBy("price".to_string(), Direction::Desc),
                Directive::OrderBy("name".to_string(), Direction::Asc),
            ]
        );
    }

    #[test]
    fn test_array_input_and_unknown_columns() {
        let sorts = sorts(json!({"_sort": ["name", "-password", "-price"]}));
        assert_eq!(
            sorts,
            vec![clause("name", Direction::Asc), clause("price", Direction::Desc)]
        );
    }

    #[test]
    fn test_repeated_column_takes_last_direction() {
        let sorts = sorts(json!({"_sort": "price,name,-price"}));
        assert_eq!(
            sorts,
            vec![clause("price", Direction::Desc), clause("name", Direction::Asc)]
        );
    }

    #[test]
    fn test_default_only_without_tokens() {
        assert_eq!(sorts(json!({})), vec![clause("created_at", Direction::Desc)]);
        assert_eq!(sorts(json!({"_sort": ""})), vec![clause("created_at", Direction::Desc)]);
        // tokens that are all rejected do not bring the default back
        assert!(sorts(json!({"_sort": "password"})).is_empty());
    }

    #[test]
    fn test_options_override_schema() {
        let options = SortOptions {
            allowed: Some(vec!["id".to_string(), "name".to_string()]),
            default: None,
            ignore: vec!["name".to_string()],
        };
        let sorts = parse_sorts(
            &schema(),
            &JsonRequest::from_value(json!({"_sort": "name,-id,price"})),
            &ParamNames::default(),
            &options,
        );
        assert_eq!(sorts, vec![clause("id", Direction::Desc)]);
    }

    #[test]
    fn test_empty_allow_list_allows_nothing() {
        let schema = Schema::builder("sort-test-empty", "products").build().unwrap();
        let sorts = parse_sorts(
            &schema,
            &JsonRequest::from_value(json!({"_sort": "name"})),
            &ParamNames::default(),
            &SortOptions::default(),
        );
        assert!(sorts.is_empty());
    }

    #[test]
    fn test_tokens_are_trimmed() {
        let tokens = vec![" name ".to_string(), " - price".to_string(), "  ".to_string()];
        assert_eq!(
            parse_sort_tokens(&tokens),
            vec![clause("name", Direction::Asc), clause("price", Direction::Desc)]
        );
    }
}
