//! In-memory table/column catalog.
//!
//! A [`Table`] is a shared handle owned by exactly one [`crate::Database`];
//! structural mutations go through the database facade so the engine schema
//! and the metadata mirror never diverge from the in-memory catalog.
//! Column identity is case-insensitive on the name; the first column of
//! every table is the implicit `ID` primary-key column.

use std::cmp::Ordering;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use spinoza_types::{DataType, Value};

use crate::error::{DbError, DbResult};

/// Name of the implicit primary-key column.
pub const ID_COLUMN: &str = "ID";

// ─────────────────────────────────────────────
// Column
// ─────────────────────────────────────────────

/// One column of a table: name, logical type, optional foreign link and
/// optional default literal. Immutable once constructed except for the
/// foreign-key fields, set at most once during table construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Column {
    name: String,
    data_type: DataType,
    foreign_table: String,
    foreign_column: String,
    default_literal: Option<String>,
}

impl Column {
    pub(crate) fn new(name: &str, data_type: DataType) -> Self {
        Column {
            name: name.to_string(),
            data_type,
            foreign_table: String::new(),
            foreign_column: String::new(),
            default_literal: data_type.default_literal().map(str::to_string),
        }
    }

    pub(crate) fn with_raw_default(
        name: &str,
        data_type: DataType,
        default: Option<String>,
    ) -> Self {
        let mut col = Column::new(name, data_type);
        col.default_literal = default;
        col
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    /// Case-insensitive name match.
    pub fn matches(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }

    /// Fail with [`DbError::TypeMismatch`] unless this column's declared
    /// type equals `used`. Every DSL setter and getter goes through here.
    pub fn check_type(&self, used: DataType) -> DbResult<()> {
        if self.data_type == used {
            Ok(())
        } else {
            Err(DbError::TypeMismatch {
                column: self.name.clone(),
                declared: self.data_type,
                used,
            })
        }
    }

    pub fn is_foreign(&self) -> bool {
        !self.foreign_table.is_empty()
    }

    /// The referenced table, `None` when this column is not a foreign key.
    pub fn foreign_table(&self) -> Option<&str> {
        if self.foreign_table.is_empty() {
            None
        } else {
            Some(&self.foreign_table)
        }
    }

    /// The referenced column, `None` when this column is not a foreign key.
    pub fn foreign_column(&self) -> Option<&str> {
        if self.foreign_column.is_empty() {
            None
        } else {
            Some(&self.foreign_column)
        }
    }

    pub(crate) fn set_foreign(&mut self, table: &str, column: &str) {
        self.foreign_table = table.to_string();
        self.foreign_column = column.to_string();
    }

    pub(crate) fn default_literal(&self) -> Option<&str> {
        self.default_literal.as_deref()
    }

    pub(crate) fn foreign_table_raw(&self) -> &str {
        &self.foreign_table
    }

    pub(crate) fn foreign_column_raw(&self) -> &str {
        &self.foreign_column
    }
}

impl PartialEq for Column {
    fn eq(&self, other: &Self) -> bool {
        self.name.eq_ignore_ascii_case(&other.name) && self.data_type == other.data_type
    }
}

impl Eq for Column {}

impl Hash for Column {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.to_ascii_uppercase().hash(state);
        self.data_type.hash(state);
    }
}

impl PartialOrd for Column {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Column {
    fn cmp(&self, other: &Self) -> Ordering {
        self.name
            .to_ascii_uppercase()
            .cmp(&other.name.to_ascii_uppercase())
    }
}

// ─────────────────────────────────────────────
// Table
// ─────────────────────────────────────────────

#[derive(Debug)]
pub(crate) struct TableData {
    pub(crate) name: String,
    pub(crate) read_only: bool,
    pub(crate) columns: Vec<Column>,
}

/// Shared handle to one table's catalog entry. Cloning the handle does not
/// copy the catalog: structural changes made through the owning database
/// are visible through every clone.
#[derive(Debug, Clone)]
pub struct Table {
    inner: Arc<RwLock<TableData>>,
}

impl Table {
    pub(crate) fn from_columns(name: &str, read_only: bool, columns: Vec<Column>) -> Self {
        Table {
            inner: Arc::new(RwLock::new(TableData {
                name: name.to_string(),
                read_only,
                columns,
            })),
        }
    }

    pub fn name(&self) -> String {
        self.inner.read().name.clone()
    }

    /// Read-only tables (the two metadata tables) reject all column and row
    /// mutation operations.
    pub fn is_read_only(&self) -> bool {
        self.inner.read().read_only
    }

    pub fn len(&self) -> usize {
        self.inner.read().columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Column at `index` in declaration order.
    pub fn get(&self, index: usize) -> DbResult<Column> {
        self.inner
            .read()
            .columns
            .get(index)
            .cloned()
            .ok_or_else(|| {
                DbError::InvalidArgument(format!("column index {index} out of range"))
            })
    }

    /// Column lookup by (case-insensitive) name, erroring when absent.
    pub fn column(&self, name: &str) -> DbResult<Column> {
        self.find_column(name).ok_or_else(|| {
            DbError::Schema(format!("table '{}' has no column '{name}'", self.name()))
        })
    }

    /// Column lookup by name, `None` when absent.
    pub fn find_column(&self, name: &str) -> Option<Column> {
        self.inner
            .read()
            .columns
            .iter()
            .find(|c| c.matches(name))
            .cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.read().columns.iter().any(|c| c.matches(name))
    }

    /// Snapshot of all columns in declaration order.
    pub fn columns(&self) -> Vec<Column> {
        self.inner.read().columns.clone()
    }

    /// The implicit primary-key column (always index 0).
    pub fn id_column(&self) -> Column {
        self.inner.read().columns[0].clone()
    }

    pub(crate) fn with_data_mut<R>(&self, f: impl FnOnce(&mut TableData) -> R) -> R {
        f(&mut self.inner.write())
    }

    pub(crate) fn ensure_writable(&self) -> DbResult<()> {
        let data = self.inner.read();
        if data.read_only {
            Err(DbError::ReadOnly(data.name.clone()))
        } else {
            Ok(())
        }
    }
}

// ─────────────────────────────────────────────
// TableSpec — table-definition builder
// ─────────────────────────────────────────────

#[derive(Debug, Clone)]
pub(crate) struct ColumnSpec {
    pub(crate) name: String,
    pub(crate) data_type: DataType,
    pub(crate) default: Option<String>,
    /// Target table for implicit foreign columns (`foreign`).
    pub(crate) foreign_target: Option<String>,
}

/// Builder passed to the `create_table` closure. Accumulates column and
/// foreign-key declarations; the database validates foreign targets and
/// renders the DDL once the closure returns.
#[derive(Debug, Default)]
pub struct TableSpec {
    pub(crate) columns: Vec<ColumnSpec>,
    pub(crate) id_foreign: Option<(String, String)>,
}

impl TableSpec {
    /// Append a column of the given type, using the type's default value.
    ///
    /// Rejects the `Id` type (the ID column is implicit) and the `Enum`
    /// type (enums require [`TableSpec::column_with_default`]).
    pub fn column(&mut self, name: &str, data_type: DataType) -> DbResult<&mut Self> {
        if data_type == DataType::Enum {
            return Err(DbError::Schema(format!(
                "enum column '{name}' requires an explicit default value"
            )));
        }
        self.push_column(name, data_type, None)
    }

    /// Append a column with an explicit default value (mandatory for Enum).
    pub fn column_with_default(
        &mut self,
        name: &str,
        data_type: DataType,
        default: Value,
    ) -> DbResult<&mut Self> {
        if default.data_type() != data_type {
            return Err(DbError::TypeMismatch {
                column: name.to_string(),
                declared: data_type,
                used: default.data_type(),
            });
        }
        let literal = default.render_literal();
        self.push_column(name, data_type, Some(literal))
    }

    /// Declare an implicit integer foreign-key column pointing at another
    /// table's ID column.
    pub fn foreign(&mut self, name: &str, other_table: &str) -> DbResult<&mut Self> {
        validate_identifier(name)?;
        self.reject_duplicate(name)?;
        self.columns.push(ColumnSpec {
            name: name.to_string(),
            data_type: DataType::Long,
            default: DataType::Long.default_literal().map(str::to_string),
            foreign_target: Some(other_table.to_string()),
        });
        Ok(self)
    }

    /// Declare this table's own ID column as a foreign key to
    /// `parent_table.parent_column`, tying the table's row lifecycle to the
    /// parent's.
    pub fn id_foreign(&mut self, parent_table: &str, parent_column: &str) -> &mut Self {
        self.id_foreign = Some((parent_table.to_string(), parent_column.to_string()));
        self
    }

    fn push_column(
        &mut self,
        name: &str,
        data_type: DataType,
        default: Option<String>,
    ) -> DbResult<&mut Self> {
        if data_type == DataType::Id {
            return Err(DbError::Schema(format!(
                "column '{name}': the ID column is implicit and cannot be declared"
            )));
        }
        validate_identifier(name)?;
        self.reject_duplicate(name)?;
        let default = default.or_else(|| data_type.default_literal().map(str::to_string));
        self.columns.push(ColumnSpec {
            name: name.to_string(),
            data_type,
            default,
            foreign_target: None,
        });
        Ok(self)
    }

    fn reject_duplicate(&self, name: &str) -> DbResult<()> {
        if name.eq_ignore_ascii_case(ID_COLUMN)
            || self.columns.iter().any(|c| c.name.eq_ignore_ascii_case(name))
        {
            Err(DbError::Schema(format!("duplicate column name '{name}'")))
        } else {
            Ok(())
        }
    }
}

/// Identifier charset check: ASCII letters, digits and underscore, not
/// starting with a digit.
pub(crate) fn validate_identifier(name: &str) -> DbResult<()> {
    let valid = !name.is_empty()
        && name.len() <= 64
        && !name.starts_with(|c: char| c.is_ascii_digit())
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(DbError::Schema(format!("invalid identifier '{name}'")))
    }
}
