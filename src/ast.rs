//! Directive vocabulary shared by the engines and the query builders.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::token::NestedSpec;

/// How a predicate joins the ones before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Logic {
    #[default]
    And,
    Or,
}

impl Logic {
    /// Anything other than `or` is `and`.
    pub fn parse(s: &str) -> Self {
        if s.trim().eq_ignore_ascii_case("or") {
            Logic::Or
        } else {
            Logic::And
        }
    }
}

/// Which clause a predicate lands in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Clause {
    #[default]
    Where,
    Having,
}

impl Clause {
    /// Anything other than `having` is `where`.
    pub fn parse(s: &str) -> Self {
        if s.trim().eq_ignore_ascii_case("having") {
            Clause::Having
        } else {
            Clause::Where
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl Direction {
    /// `desc` (any case) is descending, everything else ascending.
    pub fn parse(s: &str) -> Self {
        if s.trim().eq_ignore_ascii_case("desc") {
            Direction::Desc
        } else {
            Direction::Asc
        }
    }
}

/// Operators the query builder understands verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectOp {
    Eq,         // =
    Lt,         // <
    Gt,         // >
    Lte,        // <=
    Gte,        // >=
    NotEq,      // <>
    NullSafeEq, // <=>
    BitAnd,     // &
    BitOr,      // |
    BitXor,     // ^
    ShiftLeft,  // <<
    ShiftRight, // >>
    BitAndNot,  // &~
    Is,
    IsNot,
    Like,
    LikeBinary,
    NotLike,
    ILike,
    Regexp,    // rlike, regexp
    NotRegexp, // not rlike, not regexp
}

/// Operators that need translation into a dedicated builder call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PseudoOp {
    In,
    Between,
    Null,
    FullText,
    JsonContains,
    JsonContainsKey,
    JsonOverlaps,
    JsonLength,
    Has,
}

/// A filter operator with `!` and `%` markers already stripped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Direct(DirectOp),
    Pseudo(PseudoOp),
}

impl Operator {
    pub fn parse(s: &str) -> Option<Self> {
        let normalized = s.trim().to_ascii_lowercase();
        let op = match normalized.as_str() {
            "=" => Operator::Direct(DirectOp::Eq),
            "<" => Operator::Direct(DirectOp::Lt),
            ">" => Operator::Direct(DirectOp::Gt),
            "<=" => Operator::Direct(DirectOp::Lte),
            ">=" => Operator::Direct(DirectOp::Gte),
            "<>" => Operator::Direct(DirectOp::NotEq),
            "<=>" => Operator::Direct(DirectOp::NullSafeEq),
            "&" => Operator::Direct(DirectOp::BitAnd),
            "|" => Operator::Direct(DirectOp::BitOr),
            "^" => Operator::Direct(DirectOp::BitXor),
            "<<" => Operator::Direct(DirectOp::ShiftLeft),
            ">>" => Operator::Direct(DirectOp::ShiftRight),
            "&~" => Operator::Direct(DirectOp::BitAndNot),
            "is" => Operator::Direct(DirectOp::Is),
            "is not" => Operator::Direct(DirectOp::IsNot),
            "like" => Operator::Direct(DirectOp::Like),
            "like binary" => Operator::Direct(DirectOp::LikeBinary),
            "not like" => Operator::Direct(DirectOp::NotLike),
            "ilike" => Operator::Direct(DirectOp::ILike),
            "rlike" | "regexp" => Operator::Direct(DirectOp::Regexp),
            "not rlike" | "not regexp" => Operator::Direct(DirectOp::NotRegexp),
            "in" => Operator::Pseudo(PseudoOp::In),
            "between" => Operator::Pseudo(PseudoOp::Between),
            "null" => Operator::Pseudo(PseudoOp::Null),
            "full_text" => Operator::Pseudo(PseudoOp::FullText),
            "json_contains" => Operator::Pseudo(PseudoOp::JsonContains),
            "json_contains_key" => Operator::Pseudo(PseudoOp::JsonContainsKey),
            "json_overlaps" => Operator::Pseudo(PseudoOp::JsonOverlaps),
            "json_length" => Operator::Pseudo(PseudoOp::JsonLength),
            "has" => Operator::Pseudo(PseudoOp::Has),
            _ => return None,
        };
        Some(op)
    }
}

/// Comparison used by relation-existence tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountOp {
    Gte,
    Lt,
}

/// One predicate, typed per builder call.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Compare {
        column: String,
        op: DirectOp,
        value: JsonValue,
        negate: bool,
    },
    In {
        column: String,
        values: Vec<JsonValue>,
        negate: bool,
    },
    Between {
        column: String,
        low: JsonValue,
        high: JsonValue,
        negate: bool,
    },
    Null {
        column: String,
        negate: bool,
    },
    FullText {
        column: String,
        value: JsonValue,
        negate: bool,
    },
    JsonContains {
        column: String,
        value: JsonValue,
        negate: bool,
    },
    JsonContainsKey {
        column: String,
        key: String,
        negate: bool,
    },
    JsonOverlaps {
        column: String,
        value: JsonValue,
        negate: bool,
    },
    JsonLength {
        column: String,
        value: JsonValue,
        negate: bool,
    },
    Has {
        relation: String,
        op: CountOp,
        count: u64,
    },
}

impl Predicate {
    /// Only direct comparisons and `in`/`between`/`null` can be placed in
    /// a HAVING clause.
    pub fn supports_having(&self) -> bool {
        matches!(
            self,
            Predicate::Compare { .. }
                | Predicate::In { .. }
                | Predicate::Between { .. }
                | Predicate::Null { .. }
        )
    }
}

/// A parsed, validated filter request for one key.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterClause {
    pub key: String,
    /// Operator name without `!` and `%` markers.
    pub operator: String,
    pub value: JsonValue,
    pub logic: Logic,
    pub negate: bool,
    pub clause: Clause,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortClause {
    pub column: String,
    pub direction: Direction,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupClause {
    pub column: String,
}

/// Relation to eager-load, with the sub-selection to apply once loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EagerLoad {
    pub relation: String,
    pub nested: Option<NestedSpec>,
}

/// Aggregate functions available for relation aggregates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregateFn {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggregateFn {
    pub fn as_str(&self) -> &'static str {
        match self {
            AggregateFn::Count => "count",
            AggregateFn::Sum => "sum",
            AggregateFn::Avg => "avg",
            AggregateFn::Min => "min",
            AggregateFn::Max => "max",
        }
    }

    /// Column alias for a relation aggregate: `posts_count`,
    /// `employees_sum_salary`.
    pub fn alias(&self, relation: &str, column: Option<&str>) -> String {
        match column {
            Some(column) => format!("{}_{}_{}", relation, self.as_str(), column),
            None => format!("{}_{}", relation, self.as_str()),
        }
    }
}

impl fmt::Display for AggregateFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
