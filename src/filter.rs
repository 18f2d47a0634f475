//! Filter engine: request parameters to typed predicates.
//!
//! Parsing produces one [`FilterClause`] per declared key present in the
//! request. Applying maps each clause onto a builder call, or hands it to
//! the key's custom handler.

use std::collections::BTreeMap;

use serde_json::Value as JsonValue;

use crate::ast::{Clause, CountOp, DirectOp, FilterClause, Logic, Operator, Predicate, PseudoOp};
use crate::builder::QueryBuilder;
use crate::config::ParamNames;
use crate::error::QueryError;
use crate::request::Request;
use crate::schema::{FilterRule, Schema};
use crate::whitelist;

/// Per-call overrides of the filter behavior.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterOptions {
    /// Operators chosen by the server. When non-empty, `_operators` from the
    /// request is not read.
    pub operators: BTreeMap<String, String>,
    /// Restrict filtering to these declared keys.
    pub allowed: Option<Vec<String>>,
    pub ignore: Vec<String>,
}

pub fn parse_filters(
    schema: &Schema,
    request: &dyn Request,
    params: &ParamNames,
    options: &FilterOptions,
) -> Vec<FilterClause> {
    let logic = request
        .input_str(&params.logic)
        .map(|s| Logic::parse(&s))
        .unwrap_or_default();
    let default_clause = request
        .input_str(&params.clause)
        .map(|s| Clause::parse(&s))
        .unwrap_or_default();

    let keys = match &options.allowed {
        Some(allowed) => whitelist::intersect_declared(allowed, schema.filter_keys(), &options.ignore),
        None => whitelist::allowed(schema.filter_keys(), &options.ignore)
            .into_iter()
            .map(str::to_string)
            .collect(),
    };

    let mut clauses = Vec::new();
    for key in keys {
        let Some(value) = request.input(&key) else {
            continue;
        };

        let clause = request
            .input_entry(&params.clauses, &key)
            .and_then(JsonValue::as_str)
            .map(Clause::parse)
            .unwrap_or(default_clause);

        let requested = if options.operators.is_empty() {
            request
                .input_entry(&params.operators, &key)
                .and_then(JsonValue::as_str)
                .map(str::to_string)
        } else {
            options.operators.get(&key).cloned()
        };
        let declared = match schema.filter_rule(&key) {
            Some(FilterRule::Column { operators }) => operators.as_slice(),
            _ => &[],
        };
        let chosen = choose_operator(requested.as_deref(), declared);

        let negate = chosen.starts_with('!');
        let (operator, value) = strip_markers(&chosen.replace('!', ""), value.clone());

        clauses.push(FilterClause {
            key,
            operator,
            value,
            logic,
            negate,
            clause,
        });
    }
    clauses
}

/// The requested operator if the declared list permits it, otherwise the
/// first declared one. An empty list permits anything and defaults to `=`.
/// A requested `!op` is permitted by a declared `op`; declared entries match
/// literally, so declaring only `!in` does not permit `in`.
fn choose_operator(requested: Option<&str>, declared: &[String]) -> String {
    match requested {
        Some(op)
            if declared.is_empty()
                || declared
                    .iter()
                    .any(|d| d == op || d == op.trim_start_matches('!')) =>
        {
            op.to_string()
        }
        _ => declared.first().cloned().unwrap_or_else(|| "=".to_string()),
    }
}

/// `%like` and `like%` move the wildcard into the value.
fn strip_markers(operator: &str, value: JsonValue) -> (String, JsonValue) {
    if !operator.contains('%') {
        return (operator.to_string(), value);
    }
    let wrap = |prefix: &str, suffix: &str| match &value {
        JsonValue::String(s) => JsonValue::String(format!("{prefix}{s}{suffix}")),
        JsonValue::Number(n) => JsonValue::String(format!("{prefix}{n}{suffix}")),
        other => other.clone(),
    };
    let value = match operator {
        "%like" => wrap("%", ""),
        "like%" => wrap("", "%"),
        _ => value.clone(),
    };
    (operator.replace('%', ""), value)
}

pub fn apply_filters(
    schema: &Schema,
    clauses: &[FilterClause],
    builder: &mut dyn QueryBuilder,
) -> Result<(), QueryError> {
    for clause in clauses {
        match schema.filter_rule(&clause.key) {
            Some(FilterRule::Custom(handler)) => handler(builder, clause)?,
            Some(FilterRule::Column { .. }) => {
                if let Some((target, predicate)) = to_predicate(schema, clause) {
                    builder.filter(target, clause.logic, predicate)?;
                }
            }
            None => {}
        }
    }
    Ok(())
}

/// Map a clause onto a predicate and the clause it lands in. `None` drops
/// the filter.
pub fn to_predicate(schema: &Schema, clause: &FilterClause) -> Option<(Clause, Predicate)> {
    let operator = Operator::parse(&clause.operator).unwrap_or_else(|| {
        tracing::debug!(key = %clause.key, operator = %clause.operator, "unknown operator, using `=`");
        Operator::Direct(DirectOp::Eq)
    });
    let column = clause.key.clone();
    let value = clause.value.clone();
    let negate = clause.negate;

    let predicate = match operator {
        Operator::Direct(op) => Predicate::Compare {
            column,
            op,
            value,
            negate,
        },
        Operator::Pseudo(PseudoOp::In) => Predicate::In {
            column,
            values: as_list(&value),
            negate,
        },
        Operator::Pseudo(PseudoOp::Between) => {
            let Some((low, high)) = as_bounds(&value) else {
                tracing::debug!(key = %clause.key, "`between` needs two bounds, filter dropped");
                return None;
            };
            Predicate::Between {
                column,
                low,
                high,
                negate,
            }
        }
        Operator::Pseudo(PseudoOp::Null) => Predicate::Null { column, negate },
        Operator::Pseudo(PseudoOp::FullText) => Predicate::FullText {
            column,
            value,
            negate,
        },
        Operator::Pseudo(PseudoOp::JsonContains) => Predicate::JsonContains {
            column,
            value,
            negate,
        },
        Operator::Pseudo(PseudoOp::JsonContainsKey) => {
            let Some(key) = value.as_str().filter(|k| !k.is_empty()) else {
                tracing::debug!(key = %clause.key, "`json_contains_key` needs a key, filter dropped");
                return None;
            };
            Predicate::JsonContainsKey {
                column,
                key: key.to_string(),
                negate,
            }
        }
        Operator::Pseudo(PseudoOp::JsonOverlaps) => Predicate::JsonOverlaps {
            column,
            value,
            negate,
        },
        Operator::Pseudo(PseudoOp::JsonLength) => Predicate::JsonLength {
            column,
            value,
            negate,
        },
        Operator::Pseudo(PseudoOp::Has) => {
            if !schema.relation_names().contains(&column) || schema.relation_def(&column).is_none() {
                tracing::debug!(key = %clause.key, "`has` on an undeclared relation, filter dropped");
                return None;
            }
            Predicate::Has {
                relation: column,
                op: if negate { CountOp::Lt } else { CountOp::Gte },
                count: 1,
            }
        }
    };

    let target = match clause.clause {
        Clause::Having if !predicate.supports_having() => Clause::Where,
        other => other,
    };
    Some((target, predicate))
}

/// An array as is, a delimited string split on commas, any other scalar as
/// a single value.
fn as_list(value: &JsonValue) -> Vec<JsonValue> {
    match value {
        JsonValue::Array(items) => items.clone(),
        JsonValue::String(s) => s
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| JsonValue::String(s.to_string()))
            .collect(),
        JsonValue::Null => Vec::new(),
        other => vec![other.clone()],
    }
}

fn as_bounds(value: &JsonValue) -> Option<(JsonValue, JsonValue)> {
    match as_list(value).as_slice() {
        [low, high] => Some((low.clone(), high.clone())),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{Directive, DirectiveLog};
    use crate::relations::RelationDef;
    use crate::request::JsonRequest;
    use crate::sql_compiler::SqlCompiler;
    use serde_json::json;
    use std::sync::Arc;

    fn schema() -> Arc<Schema> {
        Schema::builder("filter-test-order", "orders")
            .relation("items", ["id"])
            .relation_def(RelationDef::has_many("items", "order_items", "order_id"))
            .filter("status", ["=", "in"])
            .filter("total", Vec::<String>::new())
            .filter("name", ["like", "%like", "like%"])
            .filter("items", ["has"])
            .filter("coupon", ["has"])
            .filter_custom("search", |builder, clause| {
                builder.filter(
                    Clause::Where,
                    clause.logic,
                    Predicate::FullText {
                        column: "body".to_string(),
                        value: clause.value.clone(),
                        negate: clause.negate,
                    },
                )
            })
            .build()
            .unwrap()
    }

    fn parse(request: serde_json::Value) -> Vec<FilterClause> {
        parse_filters(
            &schema(),
            &JsonRequest::from_value(request),
            &ParamNames::default(),
            &FilterOptions::default(),
        )
    }

    fn apply(clauses: &[FilterClause]) -> DirectiveLog {
        let mut log = DirectiveLog::new();
        apply_filters(&schema(), clauses, &mut log).unwrap();
        log
    }

    #[test]
    fn test_negated_in() {
        let clauses = parse(json!({
            "status": ["x", "y"],
            "_operators": {"status": "!in"},
        }));
        assert_eq!(clauses.len(), 1);
        assert_eq!(clauses[0].operator, "in");
        assert!(clauses[0].negate);

        let log = apply(&clauses);
        assert_eq!(
            log.predicates(),
            vec![&Predicate::In {
                column: "status".to_string(),
                values: vec![json!("x"), json!("y")],
                negate: true,
            }]
        );
    }

    #[test]
    fn test_operator_outside_declared_list_falls_back_to_first() {
        let clauses = parse(json!({
            "status": "open",
            "_operators": {"status": ">"},
        }));
        assert_eq!(clauses[0].operator, "=");

        let clauses = parse(json!({"status": "open"}));
        assert_eq!(clauses[0].operator, "=");
    }

    #[test]
    fn test_empty_operator_list_accepts_anything() {
        let clauses = parse(json!({
            "total": 100,
            "_operators": {"total": "!>="},
        }));
        assert_eq!(clauses[0].operator, ">=");
        assert!(clauses[0].negate);

        let clauses = parse(json!({"total": 100}));
        assert_eq!(clauses[0].operator, "=");
    }

    #[test]
    fn test_like_wildcards_move_into_value() {
        let clauses = parse(json!({
            "name": "shoe",
            "_operators": {"name": "%like"},
        }));
        assert_eq!(clauses[0].operator, "like");
        assert_eq!(clauses[0].value, json!("%shoe"));

        let clauses = parse(json!({
            "name": "shoe",
            "_operators": {"name": "like%"},
        }));
        assert_eq!(clauses[0].value, json!("shoe%"));
    }

    #[test]
    fn test_request_level_logic_and_clauses() {
        let clauses = parse(json!({
            "status": "open",
            "total": 5,
            "_logic": "or",
            "_clause": "having",
            "_clauses": {"status": "where"},
        }));
        assert_eq!(clauses.len(), 2);
        assert!(clauses.iter().all(|c| c.logic == Logic::Or));
        assert_eq!(clauses[0].clause, Clause::Where);
        assert_eq!(clauses[1].clause, Clause::Having);
    }

    #[test]
    fn test_undeclared_keys_are_ignored() {
        let clauses = parse(json!({"password": "x", "status": "open"}));
        assert_eq!(clauses.len(), 1);
        assert_eq!(clauses[0].key, "status");
    }

    #[test]
    fn test_has_maps_to_existence_count() {
        let clauses = parse(json!({
            "items": "1",
            "_operators": {"items": "!has"},
        }));
        let log = apply(&clauses);
        assert_eq!(
            log.predicates(),
            vec![&Predicate::Has {
                relation: "items".to_string(),
                op: CountOp::Lt,
                count: 1,
            }]
        );
    }

    #[test]
    fn test_has_on_undeclared_relation_is_dropped() {
        let clauses = parse(json!({"coupon": "1"}));
        assert_eq!(clauses.len(), 1);
        assert!(apply(&clauses).directives.is_empty());
    }

    #[test]
    fn test_has_without_relation_definition_is_dropped() {
        let schema = Schema::builder("filter-test-undefined-has", "orders")
            .columns(["id", "status"])
            .relation("items", ["id"])
            .filter("items", ["has"])
            .filter("status", ["="])
            .build()
            .unwrap();
        let clauses = parse_filters(
            &schema,
            &JsonRequest::from_value(json!({"items": "1", "status": "open"})),
            &ParamNames::default(),
            &FilterOptions::default(),
        );
        assert_eq!(clauses.len(), 2);

        let mut compiler = SqlCompiler::new(&schema);
        apply_filters(&schema, &clauses, &mut compiler).unwrap();
        let sql = compiler.compile(false).sql;
        assert!(!sql.contains("EXISTS"));
        assert!(sql.contains(r#""orders"."status" = 'open'"#));
    }

    #[test]
    fn test_negated_only_declaration_does_not_permit_positive() {
        let schema = Schema::builder("filter-test-negated-only", "orders")
            .filter("status", ["!in"])
            .filter("id", ["!="])
            .build()
            .unwrap();
        let clauses = parse_filters(
            &schema,
            &JsonRequest::from_value(json!({
                "status": ["a", "b"],
                "id": 7,
                "_operators": {"status": "in", "id": "="},
            })),
            &ParamNames::default(),
            &FilterOptions::default(),
        );
        assert_eq!(clauses.len(), 2);
        for clause in &clauses {
            assert!(clause.negate, "{} lost its negation", clause.key);
        }
        assert_eq!(clauses[0].key, "status");
        assert_eq!(clauses[0].operator, "in");
        assert_eq!(clauses[1].key, "id");
        assert_eq!(clauses[1].operator, "=");

        let clauses = parse_filters(
            &schema,
            &JsonRequest::from_value(json!({"id": 7, "_operators": {"id": "!="}})),
            &ParamNames::default(),
            &FilterOptions::default(),
        );
        assert_eq!(clauses[0].operator, "=");
        assert!(clauses[0].negate);
    }

    #[test]
    fn test_between_needs_two_bounds() {
        let schema = Schema::builder("filter-test-between", "orders")
            .filter("total", ["between"])
            .build()
            .unwrap();
        let clause = |value: serde_json::Value| FilterClause {
            key: "total".to_string(),
            operator: "between".to_string(),
            value,
            logic: Logic::And,
            negate: false,
            clause: Clause::Where,
        };
        assert_eq!(
            to_predicate(&schema, &clause(json!("10,20"))).map(|(_, p)| p),
            Some(Predicate::Between {
                column: "total".to_string(),
                low: json!("10"),
                high: json!("20"),
                negate: false,
            })
        );
        assert_eq!(to_predicate(&schema, &clause(json!([1]))), None);
    }

    #[test]
    fn test_having_keeps_negation_and_moves_unsupported_to_where() {
        let schema = schema();
        let mut clause = FilterClause {
            key: "total".to_string(),
            operator: ">".to_string(),
            value: json!(5),
            logic: Logic::And,
            negate: true,
            clause: Clause::Having,
        };
        assert_eq!(
            to_predicate(&schema, &clause),
            Some((
                Clause::Having,
                Predicate::Compare {
                    column: "total".to_string(),
                    op: DirectOp::Gt,
                    value: json!(5),
                    negate: true,
                }
            ))
        );

        clause.operator = "json_length".to_string();
        assert_eq!(to_predicate(&schema, &clause).map(|(c, _)| c), Some(Clause::Where));
    }

    #[test]
    fn test_unknown_operator_becomes_equality() {
        let clauses = parse(json!({
            "total": 5,
            "_operators": {"total": "drop"},
        }));
        let log = apply(&clauses);
        assert_eq!(
            log.predicates(),
            vec![&Predicate::Compare {
                column: "total".to_string(),
                op: DirectOp::Eq,
                value: json!(5),
                negate: false,
            }]
        );
    }

    #[test]
    fn test_custom_handler_receives_clause() {
        let clauses = parse(json!({
            "search": "red shoes",
            "_operators": {"search": "!"},
        }));
        assert!(clauses[0].negate);
        let log = apply(&clauses);
        assert_eq!(
            log.directives,
            vec![Directive::Filter {
                clause: Clause::Where,
                logic: Logic::And,
                predicate: Predicate::FullText {
                    column: "body".to_string(),
                    value: json!("red shoes"),
                    negate: true,
                },
            }]
        );
    }

    #[test]
    fn test_server_operators_override_request() {
        let schema = schema();
        let options = FilterOptions {
            operators: BTreeMap::from([("status".to_string(), "in".to_string())]),
            allowed: Some(vec!["status".to_string(), "password".to_string()]),
            ignore: Vec::new(),
        };
        let clauses = parse_filters(
            &schema,
            &JsonRequest::from_value(json!({
                "status": "a,b",
                "total": 1,
                "_operators": {"status": "="},
            })),
            &ParamNames::default(),
            &options,
        );
        assert_eq!(clauses.len(), 1);
        assert_eq!(clauses[0].operator, "in");
    }
}
