//! Typed condition algebra.
//!
//! A [`Condition`] is an immutable value holding a rendered SQL fragment
//! plus the set of column names it references, closed under `AND`/`OR`/
//! `NOT` composition. Conditions are never executed directly: they are
//! validated against a target table's column set and spliced into a
//! query's `WHERE` clause as text.
//!
//! Every typed comparison first runs [`Column::check_type`], so a
//! mismatched operator fails before any SQL exists.

use std::collections::BTreeSet;

use spinoza_types::{DataType, Value};

use crate::catalog::{Column, Table, ID_COLUMN};
use crate::error::{DbError, DbResult};
use crate::query::Match;

/// Reserved row id no row can ever have. `ONE_OF` over an empty selection
/// degenerates to `ID = NEVER_MATCH_ID` instead of an SQL syntax error.
pub const NEVER_MATCH_ID: i64 = -123;

/// Double-quote an identifier for SQL text.
pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{name}\"")
}

/// A composable predicate: referenced columns plus rendered SQL.
#[derive(Debug, Clone)]
pub struct Condition {
    columns: BTreeSet<String>,
    sql: String,
}

impl Condition {
    fn single(column: &Column, sql: String) -> Self {
        let mut columns = BTreeSet::new();
        columns.insert(column.name().to_ascii_uppercase());
        Condition { columns, sql }
    }

    /// A condition that can never match any row.
    pub fn never() -> Self {
        let mut columns = BTreeSet::new();
        columns.insert(ID_COLUMN.to_string());
        Condition {
            columns,
            sql: format!("{} = {NEVER_MATCH_ID}", quote_ident(ID_COLUMN)),
        }
    }

    /// Conjunction; the result references the union of both column sets.
    pub fn and(self, other: Condition) -> Condition {
        self.compose("AND", other)
    }

    /// Disjunction; the result references the union of both column sets.
    pub fn or(self, other: Condition) -> Condition {
        self.compose("OR", other)
    }

    /// Negation, wrapping the fragment in `NOT(...)`.
    pub fn not(self) -> Condition {
        Condition {
            columns: self.columns,
            sql: format!("NOT({})", self.sql),
        }
    }

    fn compose(self, op: &str, other: Condition) -> Condition {
        let mut columns = self.columns;
        columns.extend(other.columns);
        Condition {
            columns,
            sql: format!("({}) {op} ({})", self.sql, other.sql),
        }
    }

    pub(crate) fn sql(&self) -> &str {
        &self.sql
    }

    /// Every referenced column must exist in `table`.
    pub(crate) fn validate_against(&self, table: &Table) -> DbResult<()> {
        for name in &self.columns {
            if !table.contains(name) {
                return Err(DbError::Schema(format!(
                    "condition references column '{name}' which is not in table '{}'",
                    table.name()
                )));
            }
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────
// Typed comparison builders
// ─────────────────────────────────────────────

impl Column {
    /// `column = value`.
    pub fn equals(&self, value: &Value) -> DbResult<Condition> {
        self.check_type(value.data_type())?;
        Ok(Condition::single(
            self,
            format!("{} = {}", quote_ident(self.name()), value.render_literal()),
        ))
    }

    /// `column <> value`.
    pub fn not_equals(&self, value: &Value) -> DbResult<Condition> {
        self.check_type(value.data_type())?;
        Ok(Condition::single(
            self,
            format!("{} <> {}", quote_ident(self.name()), value.render_literal()),
        ))
    }

    /// `column < value`.
    pub fn lower(&self, value: &Value) -> DbResult<Condition> {
        self.ordered_comparison("<", value)
    }

    /// `column <= value`.
    pub fn lower_equals(&self, value: &Value) -> DbResult<Condition> {
        self.ordered_comparison("<=", value)
    }

    /// `column > value`.
    pub fn upper(&self, value: &Value) -> DbResult<Condition> {
        self.ordered_comparison(">", value)
    }

    /// `column >= value`.
    pub fn upper_equals(&self, value: &Value) -> DbResult<Condition> {
        self.ordered_comparison(">=", value)
    }

    /// `column LIKE pattern` — string columns only.
    pub fn like(&self, pattern: &str) -> DbResult<Condition> {
        self.check_type(DataType::Str)?;
        Ok(Condition::single(
            self,
            format!(
                "{} LIKE {}",
                quote_ident(self.name()),
                Value::Str(pattern.to_string()).render_literal()
            ),
        ))
    }

    /// Membership in a literal selection.
    ///
    /// Empty selection → [`Condition::never`]; singleton → plain equality.
    pub fn one_of(&self, values: &[Value]) -> DbResult<Condition> {
        for value in values {
            self.check_type(value.data_type())?;
        }
        match values {
            [] => Ok(Condition::never()),
            [single] => self.equals(single),
            _ => {
                let rendered: Vec<String> =
                    values.iter().map(Value::render_literal).collect();
                Ok(Condition::single(
                    self,
                    format!("{} IN ({})", quote_ident(self.name()), rendered.join(", ")),
                ))
            }
        }
    }

    /// Membership in a set of row ids — ID columns and integer foreign
    /// columns only.
    pub fn one_of_id(&self, ids: &[i64]) -> DbResult<Condition> {
        let id_like = self.data_type() == DataType::Id
            || (self.data_type().is_integer_kind() && self.is_foreign());
        if !id_like {
            return Err(DbError::TypeMismatch {
                column: self.name().to_string(),
                declared: self.data_type(),
                used: DataType::Id,
            });
        }
        match ids {
            [] => Ok(Condition::never()),
            [single] => Ok(Condition::single(
                self,
                format!("{} = {single}", quote_ident(self.name())),
            )),
            _ => {
                let rendered: Vec<String> = ids.iter().map(i64::to_string).collect();
                Ok(Condition::single(
                    self,
                    format!("{} IN ({})", quote_ident(self.name()), rendered.join(", ")),
                ))
            }
        }
    }

    /// Membership in a nested select (`column IN (SELECT ...)`). The
    /// nested projection was validated when the [`Match`] was built.
    pub fn in_select(&self, subquery: &Match) -> DbResult<Condition> {
        subquery.check_outer(self)?;
        Ok(Condition::single(
            self,
            format!("{} IN ({})", quote_ident(self.name()), subquery.sql()),
        ))
    }

    fn ordered_comparison(&self, op: &str, value: &Value) -> DbResult<Condition> {
        self.check_type(value.data_type())?;
        if !self.data_type().is_ordered_kind() {
            return Err(DbError::InvalidArgument(format!(
                "column '{}' of type {:?} has no ordering",
                self.name(),
                self.data_type()
            )));
        }
        Ok(Condition::single(
            self,
            format!(
                "{} {op} {}",
                quote_ident(self.name()),
                value.render_literal()
            ),
        ))
    }
}
