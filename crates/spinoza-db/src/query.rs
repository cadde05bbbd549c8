//! Query builders: `Select`, `Insert`, `InsertList`, `Update`, `Delete`,
//! `Match` and the string-keyed `Where` sugar.
//!
//! Builders are single-use objects scoped to one table. They validate
//! columns and value kinds at build time — schema and type violations
//! surface before any SQL text reaches the engine — and accumulate clauses
//! that the database renders and executes.

use spinoza_types::{DataType, DbEnum, Value};

use crate::catalog::{Column, Table};
use crate::condition::{quote_ident, Condition};
use crate::error::{DbError, DbResult};

/// Sort direction for [`Select::order_by`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Ascending,
    Descending,
}

impl Order {
    fn as_sql(self) -> &'static str {
        match self {
            Order::Ascending => "ASC",
            Order::Descending => "DESC",
        }
    }
}

// ─────────────────────────────────────────────
// Select
// ─────────────────────────────────────────────

/// Accumulates a projection, an optional condition and an optional sort,
/// and renders to `SELECT c1,...,cn FROM t [WHERE ...] [ORDER BY ...]`.
#[derive(Debug)]
pub struct Select {
    table: Table,
    projected: Vec<Column>,
    condition: Option<Condition>,
    order: Option<(Column, Order)>,
}

impl Select {
    /// Start a select over `table`. With no projected columns the select
    /// defaults to all table columns in declaration order.
    pub fn from(table: &Table) -> Select {
        Select {
            table: table.clone(),
            projected: Vec::new(),
            condition: None,
            order: None,
        }
    }

    /// Project a column. Rejects unknown and duplicate columns.
    pub fn column(&mut self, name: &str) -> DbResult<&mut Self> {
        let column = self.table.column(name)?;
        if self.projected.iter().any(|c| c.matches(name)) {
            return Err(DbError::InvalidArgument(format!(
                "column '{name}' projected twice"
            )));
        }
        self.projected.push(column);
        Ok(self)
    }

    /// Attach the `WHERE` condition; every referenced column must belong
    /// to the select's table.
    pub fn filter(&mut self, condition: Condition) -> DbResult<&mut Self> {
        condition.validate_against(&self.table)?;
        if self.condition.is_some() {
            return Err(DbError::State("condition already set".into()));
        }
        self.condition = Some(condition);
        Ok(self)
    }

    /// Sort by a single column.
    pub fn order_by(&mut self, name: &str, order: Order) -> DbResult<&mut Self> {
        let column = self.table.column(name)?;
        self.order = Some((column, order));
        Ok(self)
    }

    pub(crate) fn table(&self) -> &Table {
        &self.table
    }

    /// The effective projection: explicit columns, or all table columns.
    pub(crate) fn projection(&self) -> Vec<Column> {
        if self.projected.is_empty() {
            self.table.columns()
        } else {
            self.projected.clone()
        }
    }

    pub(crate) fn render(&self) -> String {
        let cols: Vec<String> = self
            .projection()
            .iter()
            .map(|c| quote_ident(c.name()))
            .collect();
        let mut sql = format!(
            "SELECT {} FROM {}",
            cols.join(", "),
            quote_ident(&self.table.name())
        );
        if let Some(cond) = &self.condition {
            sql.push_str(" WHERE ");
            sql.push_str(cond.sql());
        }
        if let Some((column, order)) = &self.order {
            sql.push_str(&format!(
                " ORDER BY {} {}",
                quote_ident(column.name()),
                order.as_sql()
            ));
        }
        sql
    }
}

// ─────────────────────────────────────────────
// Match — nested select for IN conditions
// ─────────────────────────────────────────────

/// A nested select usable inside an `IN` condition. The nested select must
/// project exactly one column; its type must be compatible with the outer
/// column's type.
#[derive(Debug)]
pub struct Match {
    projected_type: DataType,
    sql: String,
}

impl Match {
    pub fn new(select: Select) -> DbResult<Match> {
        let projection = select.projection();
        let [projected] = projection.as_slice() else {
            return Err(DbError::InvalidArgument(format!(
                "IN subquery must project exactly one column, got {}",
                projection.len()
            )));
        };
        Ok(Match {
            projected_type: projected.data_type(),
            sql: select.render(),
        })
    }

    pub(crate) fn check_outer(&self, outer: &Column) -> DbResult<()> {
        if outer.data_type().compatible_with(self.projected_type) {
            Ok(())
        } else {
            Err(DbError::InvalidArgument(format!(
                "IN subquery projects {:?}, incompatible with column '{}' of type {:?}",
                self.projected_type,
                outer.name(),
                outer.data_type()
            )))
        }
    }

    pub(crate) fn sql(&self) -> &str {
        &self.sql
    }
}

// ─────────────────────────────────────────────
// Value-map accumulation shared by Insert/Update
// ─────────────────────────────────────────────

#[derive(Debug, Default)]
pub(crate) struct ValueMap {
    entries: Vec<(Column, String)>,
}

impl ValueMap {
    fn set(&mut self, table: &Table, name: &str, value: Value) -> DbResult<()> {
        let column = table.column(name)?;
        if column.data_type() == DataType::Id {
            return Err(DbError::Schema(
                "the ID column is allocated by the database and cannot be set".into(),
            ));
        }
        column.check_type(value.data_type())?;
        if self.entries.iter().any(|(c, _)| c.matches(name)) {
            return Err(DbError::InvalidArgument(format!(
                "value for column '{name}' set twice"
            )));
        }
        self.entries.push((column, value.render_literal()));
        Ok(())
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn literal_for(&self, column: &Column) -> Option<&str> {
        self.entries
            .iter()
            .find(|(c, _)| c.matches(column.name()))
            .map(|(_, lit)| lit.as_str())
    }

    pub(crate) fn render_assignments(&self) -> String {
        let parts: Vec<String> = self
            .entries
            .iter()
            .map(|(c, lit)| format!("{} = {lit}", quote_ident(c.name())))
            .collect();
        parts.join(", ")
    }
}

// ─────────────────────────────────────────────
// Insert
// ─────────────────────────────────────────────

/// Accumulates column→value pairs for one new row. Columns with no
/// supplied value fall back to their default literal; a column with
/// neither fails with [`DbError::NoDefaultValue`] at execution time.
#[derive(Debug)]
pub struct Insert {
    table: Table,
    values: ValueMap,
    upsert: Option<Condition>,
}

impl Insert {
    /// Start an insert into `table`. Read-only tables are rejected here,
    /// before any value is accumulated.
    pub fn into(table: &Table) -> DbResult<Insert> {
        table.ensure_writable()?;
        Ok(Insert {
            table: table.clone(),
            values: ValueMap::default(),
            upsert: None,
        })
    }

    /// Supply a value for a column, type-checked against its declaration.
    pub fn set(&mut self, column: &str, value: Value) -> DbResult<&mut Self> {
        self.values.set(&self.table, column, value)?;
        Ok(self)
    }

    /// Supply an enum value via its [`DbEnum`] codec.
    pub fn set_enum<E: DbEnum>(&mut self, column: &str, value: &E) -> DbResult<&mut Self> {
        self.set(column, Value::from_enum(value))
    }

    /// Upsert mode: when `condition` matches exactly one existing row, the
    /// insert becomes an update of that row.
    pub fn update_if_exactly_one_row_match(
        &mut self,
        condition: Condition,
    ) -> DbResult<&mut Self> {
        condition.validate_against(&self.table)?;
        if self.upsert.is_some() {
            return Err(DbError::State("upsert condition already set".into()));
        }
        self.upsert = Some(condition);
        Ok(self)
    }

    pub(crate) fn table(&self) -> &Table {
        &self.table
    }

    pub(crate) fn values(&self) -> &ValueMap {
        &self.values
    }

    pub(crate) fn upsert_condition(&self) -> Option<&Condition> {
        self.upsert.as_ref()
    }
}

// ─────────────────────────────────────────────
// InsertList
// ─────────────────────────────────────────────

/// Several inserts into the same table, executed as one batch.
#[derive(Debug)]
pub struct InsertList {
    table: Table,
    inserts: Vec<Insert>,
}

impl InsertList {
    pub fn new(table: &Table) -> DbResult<InsertList> {
        table.ensure_writable()?;
        Ok(InsertList {
            table: table.clone(),
            inserts: Vec::new(),
        })
    }

    /// Add one insert. It must target the same table and must not be in
    /// upsert mode.
    pub fn add(&mut self, insert: Insert) -> DbResult<&mut Self> {
        if !insert.table().name().eq_ignore_ascii_case(&self.table.name()) {
            return Err(DbError::InvalidArgument(format!(
                "insert targets table '{}', list targets '{}'",
                insert.table().name(),
                self.table.name()
            )));
        }
        if insert.upsert_condition().is_some() {
            return Err(DbError::InvalidArgument(
                "upsert inserts cannot be batched".into(),
            ));
        }
        self.inserts.push(insert);
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.inserts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inserts.is_empty()
    }

    pub(crate) fn into_inserts(self) -> Vec<Insert> {
        self.inserts
    }
}

// ─────────────────────────────────────────────
// Update
// ─────────────────────────────────────────────

/// Accumulates column→value assignments plus an optional condition.
/// Requires at least one assignment at execution time.
#[derive(Debug)]
pub struct Update {
    table: Table,
    values: ValueMap,
    condition: Option<Condition>,
}

impl Update {
    pub fn table(table: &Table) -> DbResult<Update> {
        table.ensure_writable()?;
        Ok(Update {
            table: table.clone(),
            values: ValueMap::default(),
            condition: None,
        })
    }

    pub fn set(&mut self, column: &str, value: Value) -> DbResult<&mut Self> {
        self.values.set(&self.table, column, value)?;
        Ok(self)
    }

    pub fn set_enum<E: DbEnum>(&mut self, column: &str, value: &E) -> DbResult<&mut Self> {
        self.set(column, Value::from_enum(value))
    }

    pub fn filter(&mut self, condition: Condition) -> DbResult<&mut Self> {
        condition.validate_against(&self.table)?;
        if self.condition.is_some() {
            return Err(DbError::State("condition already set".into()));
        }
        self.condition = Some(condition);
        Ok(self)
    }

    pub(crate) fn target(&self) -> &Table {
        &self.table
    }

    pub(crate) fn render(&self) -> DbResult<String> {
        if self.values.is_empty() {
            return Err(DbError::State("update with no column values set".into()));
        }
        let mut sql = format!(
            "UPDATE {} SET {}",
            quote_ident(&self.table.name()),
            self.values.render_assignments()
        );
        if let Some(cond) = &self.condition {
            sql.push_str(" WHERE ");
            sql.push_str(cond.sql());
        }
        Ok(sql)
    }
}

// ─────────────────────────────────────────────
// Delete
// ─────────────────────────────────────────────

/// Deletes rows matching the condition. Omitting the condition deletes
/// **every** row — intentional; use [`Condition::never`] for a guaranteed
/// no-op.
#[derive(Debug)]
pub struct Delete {
    table: Table,
    condition: Option<Condition>,
}

impl Delete {
    pub fn from(table: &Table) -> DbResult<Delete> {
        table.ensure_writable()?;
        Ok(Delete {
            table: table.clone(),
            condition: None,
        })
    }

    pub fn filter(&mut self, condition: Condition) -> DbResult<&mut Self> {
        condition.validate_against(&self.table)?;
        if self.condition.is_some() {
            return Err(DbError::State("condition already set".into()));
        }
        self.condition = Some(condition);
        Ok(self)
    }

    pub(crate) fn table(&self) -> &Table {
        &self.table
    }

    pub(crate) fn render(&self) -> String {
        let mut sql = format!("DELETE FROM {}", quote_ident(&self.table.name()));
        if let Some(cond) = &self.condition {
            sql.push_str(" WHERE ");
            sql.push_str(cond.sql());
        }
        sql
    }
}

// ─────────────────────────────────────────────
// Where — string-keyed sugar
// ─────────────────────────────────────────────

/// String-keyed sugar over the condition builders, scoped to one table.
#[derive(Debug)]
pub struct Where<'t> {
    table: &'t Table,
}

impl<'t> Where<'t> {
    pub fn new(table: &'t Table) -> Where<'t> {
        Where { table }
    }

    pub fn equals(&self, column: &str, value: Value) -> DbResult<Condition> {
        self.table.column(column)?.equals(&value)
    }

    pub fn not_equals(&self, column: &str, value: Value) -> DbResult<Condition> {
        self.table.column(column)?.not_equals(&value)
    }

    pub fn lower(&self, column: &str, value: Value) -> DbResult<Condition> {
        self.table.column(column)?.lower(&value)
    }

    pub fn lower_equals(&self, column: &str, value: Value) -> DbResult<Condition> {
        self.table.column(column)?.lower_equals(&value)
    }

    pub fn upper(&self, column: &str, value: Value) -> DbResult<Condition> {
        self.table.column(column)?.upper(&value)
    }

    pub fn upper_equals(&self, column: &str, value: Value) -> DbResult<Condition> {
        self.table.column(column)?.upper_equals(&value)
    }

    pub fn like(&self, column: &str, pattern: &str) -> DbResult<Condition> {
        self.table.column(column)?.like(pattern)
    }

    pub fn one_of(&self, column: &str, values: &[Value]) -> DbResult<Condition> {
        self.table.column(column)?.one_of(values)
    }

    pub fn one_of_id(&self, column: &str, ids: &[i64]) -> DbResult<Condition> {
        self.table.column(column)?.one_of_id(ids)
    }

    /// Equality on a foreign column by the referenced row's primary-key id.
    pub fn references(&self, column: &str, row_id: i64) -> DbResult<Condition> {
        let col = self.table.column(column)?;
        if !col.is_foreign() {
            return Err(DbError::Schema(format!(
                "column '{column}' is not a foreign key"
            )));
        }
        col.one_of_id(&[row_id])
    }
}
