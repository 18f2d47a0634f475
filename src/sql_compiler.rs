//! SQL compiler that turns builder directives into a PostgreSQL query using
//! sea-query.

use sea_query::{
    Asterisk, BinOper, Expr, Func, Iden, Order, PostgresQueryBuilder, Query, SelectStatement,
    SimpleExpr, SubQueryStatement, Value, Values,
};
use serde_json::Value as JsonValue;

use crate::ast::{AggregateFn, Clause, CountOp, DirectOp, Direction, EagerLoad, Logic, Predicate};
use crate::builder::QueryBuilder;
use crate::error::QueryError;
use crate::relations::{RelationDef, RelationKind};
use crate::schema::Schema;
use crate::token::NestedSpec;

/// Table identifier for sea-query
#[derive(Debug, Clone)]
pub struct TableName(pub String);

impl Iden for TableName {
    fn unquoted(&self, s: &mut dyn std::fmt::Write) {
        let _ = s.write_str(&self.0);
    }
}

/// Column identifier wrapper
#[derive(Debug, Clone)]
pub struct ColumnName(pub String);

impl Iden for ColumnName {
    fn unquoted(&self, s: &mut dyn std::fmt::Write) {
        let _ = s.write_str(&self.0);
    }
}

/// Result of compilation
#[derive(Debug, Clone, PartialEq)]
pub struct CompileResult {
    pub sql: String,
    /// Total-row query for length-aware pagination.
    pub count_sql: Option<String>,
    /// Relations to load after the main query, with their sub-selections.
    pub eager_loads: Vec<EagerLoad>,
}

/// A [`QueryBuilder`] that accumulates directives for one table and renders
/// them as a single `SELECT`.
#[derive(Debug, Clone)]
pub struct SqlCompiler {
    table: String,
    relations: Vec<RelationDef>,
    columns: Vec<String>,
    aggregates: Vec<(SimpleExpr, String)>,
    wheres: Vec<(Logic, SimpleExpr)>,
    havings: Vec<(Logic, SimpleExpr)>,
    orders: Vec<(String, Direction)>,
    groups: Vec<String>,
    eager_loads: Vec<EagerLoad>,
    limit: Option<u64>,
    offset: Option<u64>,
}

impl SqlCompiler {
    pub fn new(schema: &Schema) -> Self {
        Self::for_table(schema.table(), schema.relation_defs().to_vec())
    }

    pub fn for_table(table: impl Into<String>, relations: Vec<RelationDef>) -> Self {
        Self {
            table: table.into(),
            relations,
            columns: Vec::new(),
            aggregates: Vec::new(),
            wheres: Vec::new(),
            havings: Vec::new(),
            orders: Vec::new(),
            groups: Vec::new(),
            eager_loads: Vec::new(),
            limit: None,
            offset: None,
        }
    }

    pub fn eager_loads(&self) -> &[EagerLoad] {
        &self.eager_loads
    }

    /// The full statement, ordering and paging included.
    pub fn statement(&self) -> SelectStatement {
        let mut select = self.unordered_statement();

        for (column, direction) in &self.orders {
            let order = match direction {
                Direction::Asc => Order::Asc,
                Direction::Desc => Order::Desc,
            };
            select.order_by(ColumnName(column.clone()), order);
        }
        if let Some(limit) = self.limit {
            select.limit(limit);
        }
        if let Some(offset) = self.offset {
            select.offset(offset);
        }

        select
    }

    /// `SELECT COUNT(*)` over the statement without ordering or paging.
    pub fn count_statement(&self) -> SelectStatement {
        Query::select()
            .expr_as(Func::count(Expr::col(Asterisk)), ColumnName("aggregate".to_string()))
            .from_subquery(self.unordered_statement(), TableName("aggregate_table".to_string()))
            .to_owned()
    }

    pub fn compile(&self, with_total: bool) -> CompileResult {
        let sql = self.statement().to_string(PostgresQueryBuilder);
        let count_sql = with_total.then(|| self.count_statement().to_string(PostgresQueryBuilder));

        tracing::trace!(%sql, "compiled query");

        CompileResult {
            sql,
            count_sql,
            eager_loads: self.eager_loads.clone(),
        }
    }

    /// Parameterized form of [`SqlCompiler::statement`].
    pub fn build(&self) -> (String, Values) {
        self.statement().build(PostgresQueryBuilder)
    }

    fn unordered_statement(&self) -> SelectStatement {
        let mut select = Query::select();
        select.from(self.table_name());

        if self.columns.is_empty() {
            select.column((self.table_name(), Asterisk));
        } else {
            for column in &self.columns {
                select.column(self.qualified(column));
            }
        }
        for (expr, alias) in &self.aggregates {
            select.expr_as(expr.clone(), ColumnName(alias.clone()));
        }

        if let Some(condition) = fold(&self.wheres) {
            select.and_where(condition);
        }
        if !self.groups.is_empty() {
            select.group_by_columns(self.groups.iter().map(|g| ColumnName(g.clone())));
        }
        if let Some(condition) = fold(&self.havings) {
            select.and_having(condition);
        }

        select
    }

    fn table_name(&self) -> TableName {
        TableName(self.table.clone())
    }

    fn qualified(&self, column: &str) -> (TableName, ColumnName) {
        (self.table_name(), ColumnName(column.to_string()))
    }

    fn column_expr(&self, clause: Clause, column: &str) -> Expr {
        match clause {
            Clause::Where => Expr::col(self.qualified(column)),
            Clause::Having => Expr::col(ColumnName(column.to_string())),
        }
    }

    fn relation(&self, name: &str) -> Result<&RelationDef, QueryError> {
        self.relations
            .iter()
            .find(|def| def.name == name)
            .ok_or_else(|| QueryError::UnknownRelation(name.to_string()))
    }

    /// Correlated sub-query over the related table, joined back to this one.
    fn relation_subquery(&self, def: &RelationDef, usage: &'static str) -> Result<SelectStatement, QueryError> {
        let parent = |column: &str| (self.table_name(), ColumnName(column.to_string()));
        let related = |column: &str| (TableName(def.related.clone()), ColumnName(column.to_string()));

        let mut sub = Query::select();
        sub.from(TableName(def.related.clone()));

        match &def.kind {
            RelationKind::BelongsTo {
                foreign_key,
                owner_key,
            } => {
                sub.and_where(Expr::col(related(owner_key)).equals(parent(foreign_key)));
            }
            RelationKind::HasOne {
                foreign_key,
                local_key,
            }
            | RelationKind::HasMany {
                foreign_key,
                local_key,
            } => {
                sub.and_where(Expr::col(related(foreign_key)).equals(parent(local_key)));
            }
            RelationKind::BelongsToMany {
                pivot,
                foreign_pivot_key,
                related_pivot_key,
                parent_key,
                related_key,
            } => {
                let pivot_col = |column: &str| (TableName(pivot.clone()), ColumnName(column.to_string()));
                sub.inner_join(
                    TableName(pivot.clone()),
                    Expr::col(pivot_col(related_pivot_key)).equals(related(related_key)),
                );
                sub.and_where(Expr::col(pivot_col(foreign_pivot_key)).equals(parent(parent_key)));
            }
            RelationKind::MorphOne {
                type_column,
                id_column,
                local_key,
                morph_class,
            }
            | RelationKind::MorphMany {
                type_column,
                id_column,
                local_key,
                morph_class,
            } => {
                sub.and_where(Expr::col(related(id_column)).equals(parent(local_key)));
                sub.and_where(Expr::col(related(type_column)).eq(morph_class.as_str()));
            }
            RelationKind::HasOneThrough {
                through,
                first_key,
                second_key,
                local_key,
                second_local_key,
            }
            | RelationKind::HasManyThrough {
                through,
                first_key,
                second_key,
                local_key,
                second_local_key,
            } => {
                let through_col = |column: &str| (TableName(through.clone()), ColumnName(column.to_string()));
                sub.inner_join(
                    TableName(through.clone()),
                    Expr::col(through_col(second_local_key)).equals(related(second_key)),
                );
                sub.and_where(Expr::col(through_col(first_key)).equals(parent(local_key)));
            }
            RelationKind::MorphTo { .. } => {
                return Err(QueryError::UnsupportedRelation {
                    relation: def.name.clone(),
                    usage,
                });
            }
        }

        Ok(sub)
    }

    fn compile_predicate(&self, clause: Clause, predicate: Predicate) -> Result<SimpleExpr, QueryError> {
        let expr = match predicate {
            Predicate::Compare {
                column,
                op,
                value,
                negate,
            } => negated(self.compile_comparison(clause, &column, op, &value), negate),
            Predicate::In {
                column,
                values,
                negate,
            } => {
                let values = values.iter().map(json_to_value);
                let col = self.column_expr(clause, &column);
                if negate {
                    col.is_not_in(values)
                } else {
                    col.is_in(values)
                }
            }
            Predicate::Between {
                column,
                low,
                high,
                negate,
            } => {
                let col = self.column_expr(clause, &column);
                if negate {
                    col.not_between(json_to_value(&low), json_to_value(&high))
                } else {
                    col.between(json_to_value(&low), json_to_value(&high))
                }
            }
            Predicate::Null { column, negate } => {
                let col = self.column_expr(clause, &column);
                if negate {
                    col.is_not_null()
                } else {
                    col.is_null()
                }
            }
            Predicate::FullText {
                column,
                value,
                negate,
            } => negated(
                Expr::cust_with_exprs(
                    "to_tsvector(?) @@ plainto_tsquery(?)",
                    [self.column_expr(clause, &column).into(), Expr::val(json_to_value(&value)).into()],
                ),
                negate,
            ),
            Predicate::JsonContains {
                column,
                value,
                negate,
            } => negated(
                Expr::cust_with_exprs(
                    "? @> ?::jsonb",
                    [self.column_expr(clause, &column).into(), Expr::val(json_text(&value)).into()],
                ),
                negate,
            ),
            Predicate::JsonContainsKey { column, key, negate } => negated(
                Expr::cust_with_exprs(
                    "jsonb_exists(?, ?)",
                    [self.column_expr(clause, &column).into(), Expr::val(key).into()],
                ),
                negate,
            ),
            Predicate::JsonOverlaps {
                column,
                value,
                negate,
            } => negated(
                Expr::cust_with_exprs(
                    "? @> ANY (ARRAY(SELECT jsonb_array_elements(?::jsonb)))",
                    [self.column_expr(clause, &column).into(), Expr::val(json_text(&value)).into()],
                ),
                negate,
            ),
            Predicate::JsonLength {
                column,
                value,
                negate,
            } => negated(
                Expr::cust_with_exprs(
                    "jsonb_array_length(?) = ?",
                    [self.column_expr(clause, &column).into(), Expr::val(json_to_value(&value)).into()],
                ),
                negate,
            ),
            Predicate::Has { relation, op, count } => {
                let def = self.relation(&relation)?;
                let mut sub = self.relation_subquery(def, "has")?;
                if count == 1 {
                    sub.expr(Expr::val(1));
                    match op {
                        CountOp::Gte => Expr::exists(sub),
                        CountOp::Lt => Expr::exists(sub).not(),
                    }
                } else {
                    sub.expr(Func::count(Expr::col(Asterisk)));
                    let counted = Expr::expr(subquery(sub));
                    match op {
                        CountOp::Gte => counted.gte(count),
                        CountOp::Lt => counted.lt(count),
                    }
                }
            }
        };
        Ok(expr)
    }

    fn compile_comparison(&self, clause: Clause, column: &str, op: DirectOp, value: &JsonValue) -> SimpleExpr {
        let col = self.column_expr(clause, column);
        let val = json_to_value(value);

        match op {
            DirectOp::Eq => col.eq(val),
            DirectOp::Lt => col.lt(val),
            DirectOp::Gt => col.gt(val),
            DirectOp::Lte => col.lte(val),
            DirectOp::Gte => col.gte(val),
            DirectOp::NotEq => col.ne(val),
            DirectOp::NullSafeEq => col.binary(BinOper::Custom("IS NOT DISTINCT FROM"), val),
            DirectOp::BitAnd => Expr::expr(col.binary(BinOper::BitAnd, val)).ne(0),
            DirectOp::BitOr => Expr::expr(col.binary(BinOper::BitOr, val)).ne(0),
            DirectOp::BitXor => Expr::expr(col.binary(BinOper::Custom("#"), val)).ne(0),
            DirectOp::ShiftLeft => Expr::expr(col.binary(BinOper::LShift, val)).ne(0),
            DirectOp::ShiftRight => Expr::expr(col.binary(BinOper::RShift, val)).ne(0),
            DirectOp::BitAndNot => Expr::cust_with_exprs("(? & ~?) <> 0", [col.into(), Expr::val(val).into()]),
            DirectOp::Is if value.is_null() => col.is_null(),
            DirectOp::IsNot if value.is_null() => col.is_not_null(),
            DirectOp::Is => col.binary(BinOper::Is, val),
            DirectOp::IsNot => col.binary(BinOper::IsNot, val),
            DirectOp::Like | DirectOp::LikeBinary => col.binary(BinOper::Like, val),
            DirectOp::NotLike => col.binary(BinOper::NotLike, val),
            DirectOp::ILike => col.binary(BinOper::Custom("ILIKE"), val),
            DirectOp::Regexp => col.binary(BinOper::Custom("~"), val),
            DirectOp::NotRegexp => col.binary(BinOper::Custom("!~"), val),
        }
    }
}

impl QueryBuilder for SqlCompiler {
    fn select(&mut self, columns: &[String]) {
        self.columns = columns.to_vec();
    }

    fn filter(&mut self, clause: Clause, logic: Logic, predicate: Predicate) -> Result<(), QueryError> {
        let expr = self.compile_predicate(clause, predicate)?;
        match clause {
            Clause::Where => self.wheres.push((logic, expr)),
            Clause::Having => self.havings.push((logic, expr)),
        }
        Ok(())
    }

    fn order_by(&mut self, column: &str, direction: Direction) {
        self.orders.push((column.to_string(), direction));
    }

    fn group_by(&mut self, columns: &[String]) {
        self.groups.extend(columns.iter().cloned());
    }

    fn with(&mut self, relation: &str, nested: Option<&NestedSpec>) {
        self.eager_loads.push(EagerLoad {
            relation: relation.to_string(),
            nested: nested.cloned(),
        });
    }

    fn with_aggregate(
        &mut self,
        relation: &str,
        function: AggregateFn,
        column: Option<&str>,
    ) -> Result<(), QueryError> {
        let def = self.relation(relation)?;
        let mut sub = self.relation_subquery(def, "aggregates")?;

        let target = match column {
            Some(column) => Expr::col((TableName(def.related.clone()), ColumnName(column.to_string()))),
            None => Expr::col(Asterisk),
        };
        let call = match function {
            AggregateFn::Count => Func::count(target),
            AggregateFn::Sum => Func::sum(target),
            AggregateFn::Avg => Func::avg(target),
            AggregateFn::Min => Func::min(target),
            AggregateFn::Max => Func::max(target),
        };
        sub.expr(call);

        let alias = function.alias(relation, column);
        self.aggregates.push((subquery(sub), alias));
        Ok(())
    }

    fn limit(&mut self, limit: u64) {
        self.limit = Some(limit);
    }

    fn offset(&mut self, offset: u64) {
        self.offset = Some(offset);
    }
}

/// Join the conditions left to right, each with its own connective.
fn fold(conditions: &[(Logic, SimpleExpr)]) -> Option<SimpleExpr> {
    let mut iter = conditions.iter();
    let (_, first) = iter.next()?;
    Some(iter.fold(first.clone(), |acc, (logic, expr)| match logic {
        Logic::And => acc.and(expr.clone()),
        Logic::Or => acc.or(expr.clone()),
    }))
}

fn negated(expr: SimpleExpr, negate: bool) -> SimpleExpr {
    if negate {
        expr.not()
    } else {
        expr
    }
}

fn subquery(select: SelectStatement) -> SimpleExpr {
    SimpleExpr::SubQuery(None, Box::new(SubQueryStatement::SelectStatement(select)))
}

/// Convert a request value to a sea-query value
fn json_to_value(value: &JsonValue) -> Value {
    match value {
        JsonValue::Null => Value::String(None),
        JsonValue::Bool(b) => Value::Bool(Some(*b)),
        JsonValue::Number(n) => match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => Value::BigInt(Some(i)),
            (None, Some(f)) => Value::Double(Some(f)),
            (None, None) => Value::String(Some(Box::new(n.to_string()))),
        },
        JsonValue::String(s) => Value::String(Some(Box::new(s.clone()))),
        other => Value::String(Some(Box::new(other.to_string()))),
    }
}

/// JSON document text for a `::jsonb` cast. Strings that already hold JSON
/// pass through; anything else is serialized.
fn json_text(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) if serde_json::from_str::<JsonValue>(s).is_ok() => s.clone(),
        other => other.to_string(),
    }
}
