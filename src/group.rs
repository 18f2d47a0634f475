//! Group engine: `_group=b,a` to a single group-by directive.

use crate::builder::QueryBuilder;
use crate::config::ParamNames;
use crate::lexer::parse_list;
use crate::request::Request;
use crate::schema::Schema;
use crate::token::RawList;
use crate::whitelist;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupOptions {
    /// Replaces the schema's groupable columns.
    pub allowed: Option<Vec<String>>,
    /// Replaces the schema's default grouping.
    pub default: Option<Vec<String>>,
    pub ignore: Vec<String>,
}

/// Columns to group by, in allow-list order. Without a `_group` parameter
/// the default grouping is returned as declared.
pub fn parse_groups(
    schema: &Schema,
    request: &dyn Request,
    params: &ParamNames,
    options: &GroupOptions,
) -> Vec<String> {
    let tokens = parse_list(&RawList::from_json(request.input(&params.group)));
    if tokens.is_empty() {
        return options
            .default
            .clone()
            .unwrap_or_else(|| schema.default_group().to_vec());
    }

    let declared = options.allowed.as_deref().unwrap_or(schema.groups());
    let groups = whitelist::intersect_declared(&tokens, declared, &options.ignore);
    if groups.len() < tokens.len() {
        tracing::debug!(?tokens, kept = groups.len(), "dropped group tokens");
    }
    groups
}

/// One group-by over all columns; nothing when there are none.
pub fn apply_groups(groups: &[String], builder: &mut dyn QueryBuilder) {
    if !groups.is_empty() {
        builder.group_by(groups);
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
        Schema::builder("group-test-sale", "sales")
            .groups(["a", "b"])
            .default_group(["region"])
            .build()
            .unwrap()
    }

    fn groups(request: serde_json::Value) -> Vec<String> {
        parse_groups(
            &schema(),
            &JsonRequest::from_value(request),
            &ParamNames::default(),
            &GroupOptions::default(),
        )
    }

    #[test]
    fn test_allow_list_order() {
        let groups = groups(json!({"_group": "b,a"}));
        assert_eq!(groups, ["a", "b"]);

        let mut log = DirectiveLog::new();
        apply_groups(&groups, &mut log);
        assert_eq!(
            log.directives,
            vec![Directive::GroupBy(vec!["a".to_string(), "b".to_string()])]
        );
    }

    #[test]
    fn test_unknown_columns_dropped() {
        assert_eq!(groups(json!({"_group": ["c", "b", "b"]})), ["b"]);
    }

    #[test]
    fn test_nothing_emitted_for_empty_intersection() {
        let groups = groups(json!({"_group": "password"}));
        assert!(groups.is_empty());

        let mut log = DirectiveLog::new();
        apply_groups(&groups, &mut log);
        assert!(log.directives.is_empty());
    }

    #[test]
    fn test_default_only_without_tokens() {
        assert_eq!(groups(json!({})), ["region"]);

        let options = GroupOptions {
            default: Some(Vec::new()),
            ..GroupOptions::default()
        };
        let groups = parse_groups(
            &schema(),
            &JsonRequest::from_value(json!({})),
            &ParamNames::default(),
            &options,
        );
        assert!(groups.is_empty());
    }
}
