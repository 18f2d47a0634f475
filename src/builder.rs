//! The seam between the engines and a concrete query builder.

use crate::ast::{AggregateFn, Clause, Direction, Logic, Predicate};
use crate::error::QueryError;
use crate::token::NestedSpec;

/// Operations the engines issue against a relational query builder.
///
/// Every identifier passed in has already been whitelisted.
pub trait QueryBuilder {
    fn select(&mut self, columns: &[String]);

    fn filter(&mut self, clause: Clause, logic: Logic, predicate: Predicate) -> Result<(), QueryError>;

    fn order_by(&mut self, column: &str, direction: Direction);

    fn group_by(&mut self, columns: &[String]);

    /// Eager-load `relation`. The nested spec is carried along so the
    /// caller can apply it to the related records once fetched.
    fn with(&mut self, relation: &str, nested: Option<&NestedSpec>);

    /// Add a relation aggregate column (`withCount`, `withSum`, ...).
    fn with_aggregate(
        &mut self,
        relation: &str,
        function: AggregateFn,
        column: Option<&str>,
    ) -> Result<(), QueryError>;

    fn limit(&mut self, limit: u64);

    fn offset(&mut self, offset: u64);
}

/// A builder call, as recorded by [`DirectiveLog`].
#[derive(Debug, Clone, PartialEq)]
pub enum Directive {
    Select(Vec<String>),
    Filter {
        clause: Clause,
        logic: Logic,
        predicate: Predicate,
    },
    OrderBy(String, Direction),
    GroupBy(Vec<String>),
    With(String, Option<NestedSpec>),
    WithAggregate {
        relation: String,
        function: AggregateFn,
        column: Option<String>,
    },
    Limit(u64),
    Offset(u64),
}

/// Records directives in call order instead of building a query.
#[derive(Debug, Clone, Default)]
pub struct DirectiveLog {
    pub directives: Vec<Directive>,
}

impl DirectiveLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn selected(&self) -> Option<&[String]> {
        self.directives.iter().find_map(|d| match d {
            Directive::Select(columns) => Some(columns.as_slice()),
            _ => None,
        })
    }

    pub fn relations(&self) -> Vec<&str> {
        self.directives
            .iter()
            .filter_map(|d| match d {
                Directive::With(relation, _) => Some(relation.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn predicates(&self) -> Vec<&Predicate> {
        self.directives
            .iter()
            .filter_map(|d| match d {
                Directive::Filter { predicate, .. } => Some(predicate),
                _ => None,
            })
            .collect()
    }
}

impl QueryBuilder for DirectiveLog {
    fn select(&mut self, columns: &[String]) {
        self.directives.push(Directive::Select(columns.to_vec()));
    }

    fn filter(&mut self, clause: Clause, logic: Logic, predicate: Predicate) -> Result<(), QueryError> {
        self.directives.push(Directive::Filter {
            clause,
            logic,
            predicate,
        });
        Ok(())
    }

    fn order_by(&mut self, column: &str, direction: Direction) {
        self.directives
            .push(Directive::OrderBy(column.to_string(), direction));
    }

    fn group_by(&mut self, columns: &[String]) {
        self.directives.push(Directive::GroupBy(columns.to_vec()));
    }

    fn with(&mut self, relation: &str, nested: Option<&NestedSpec>) {
        self.directives
            .push(Directive::With(relation.to_string(), nested.cloned()));
    }

    fn with_aggregate(
        &mut self,
        relation: &str,
        function: AggregateFn,
        column: Option<&str>,
    ) -> Result<(), QueryError> {
        self.directives.push(Directive::WithAggregate {
            relation: relation.to_string(),
            function,
            column: column.map(str::to_string),
        });
        Ok(())
    }

    fn limit(&mut self, limit: u64) {
        self.directives.push(Directive::Limit(limit));
    }

    fn offset(&mut self, offset: u64) {
        self.directives.push(Directive::Offset(offset));
    }
}
