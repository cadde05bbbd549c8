//! The database facade.
//!
//! `Database` wraps one engine connection and keeps three things
//! consistent:
//! - the engine's own schema (DDL executed against the connection),
//! - the in-memory catalog of loaded [`Table`] handles,
//! - the persistent metadata mirror (`TABLE_OF_TABLES` /
//!   `TABLE_OF_TABLES_COLUMNS`), from which tables are reconstructed
//!   across restarts.
//!
//! ## Error policy
//!
//! Validation errors (type, schema, state, read-only, credentials) are
//! `Err` values raised before any SQL reaches the engine. Engine failures
//! during row mutations are logged and reported as
//! [`MutationOutcome::EngineFailure`] once the database has finished
//! initializing; during bootstrap they propagate, since a database that
//! cannot create its catalog is unusable.
//!
//! ## Foreign-key sweep
//!
//! Referential integrity on ID-foreign links is *eventually consistent*:
//! mutations never fail on a dangling parent reference. Instead, every
//! update/delete that touches a row (and every dropped table) schedules a
//! coalesced background pass that deletes child rows whose parent id no
//! longer exists. Two atomic flags implement the single-flight pattern:
//! only one sweep worker is ever in flight, and concurrent requesters
//! merely raise the `pending` flag.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use regex::Regex;
use rusqlite::{Connection, OptionalExtension};
use spinoza_types::{quote_str, DataType, Value};
use tracing::{debug, error, instrument, warn};

use crate::catalog::{validate_identifier, Column, Table, TableSpec, ID_COLUMN};
use crate::condition::{quote_ident, Condition};
use crate::encryption;
use crate::error::{DbError, DbResult};
use crate::query::{Delete, Insert, InsertList, Select, Update};
use crate::row::DataRowResult;

/// Metadata table recording one row per user table.
pub const TABLE_OF_TABLES: &str = "TABLE_OF_TABLES";
/// Metadata table recording one row per user column.
pub const TABLE_OF_TABLES_COLUMNS: &str = "TABLE_OF_TABLES_COLUMNS";

// ─────────────────────────────────────────────
// Result kinds
// ─────────────────────────────────────────────

/// Outcome of a row mutation. Engine-level failures after initialization
/// are reported here, not as `Err` — callers must check the outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationOutcome {
    /// The statement executed; `0` affected rows is a valid outcome.
    Applied(u64),
    /// The engine rejected the statement; details were logged.
    EngineFailure,
}

impl MutationOutcome {
    pub fn affected(self) -> Option<u64> {
        match self {
            MutationOutcome::Applied(n) => Some(n),
            MutationOutcome::EngineFailure => None,
        }
    }

    pub fn is_failure(self) -> bool {
        matches!(self, MutationOutcome::EngineFailure)
    }
}

/// Outcome of a row-identity lookup. Zero and multiple matches are
/// expected, common outcomes, so they are values rather than errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowLookup {
    /// No row satisfies the condition.
    Missing,
    /// Two or more rows satisfy the condition.
    NotUnique,
    /// Exactly one row satisfies the condition.
    Found(i64),
}

impl RowLookup {
    pub fn found(self) -> Option<i64> {
        match self {
            RowLookup::Found(id) => Some(id),
            _ => None,
        }
    }
}

// ─────────────────────────────────────────────
// Shared state
// ─────────────────────────────────────────────

#[derive(Default)]
struct SweepFlags {
    /// A sweep is needed.
    pending: AtomicBool,
    /// A sweep worker is in flight.
    running: AtomicBool,
}

struct Shared {
    path: Option<PathBuf>,
    /// `None` once the database is closed and the engine handle released.
    conn: Mutex<Option<Connection>>,
    tables: RwLock<Vec<Table>>,
    credential_digest: Option<[u8; 32]>,
    initialized: AtomicBool,
    closed: AtomicBool,
    sweep: SweepFlags,
}

/// Handle to one open database. Cheap to clone; all clones share the same
/// connection, catalog and sweep state.
#[derive(Clone)]
pub struct Database {
    shared: Arc<Shared>,
}

impl Database {
    // ── Construction ───────────────────────────────────

    /// Open (or create) an encrypted database file.
    ///
    /// Derives the key-file cipher from `login` + `password`, loads or
    /// creates the key file (wrong credentials fail with
    /// [`DbError::Credentials`] before the engine is touched), hands the
    /// master key to the engine and bootstraps the metadata mirror.
    #[instrument(skip_all, fields(path = %path.display()))]
    pub fn open(login: &str, password: &str, path: &Path) -> DbResult<Database> {
        let key = encryption::load_or_create(path, login, password)?;
        let conn = Connection::open(path)?;
        // Honored by cipher-enabled engine builds, ignored by plain ones;
        // credential enforcement itself lives in the key-file check above.
        conn.pragma_update(None, "key", key.master_key_hex())?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Database::from_connection(conn, Some(path.to_path_buf()), Some(key.credential_digest()))
    }

    /// Open an in-memory database (useful for testing). No key file is
    /// involved and credential verification is unavailable.
    pub fn open_in_memory() -> DbResult<Database> {
        let conn = Connection::open_in_memory()?;
        Database::from_connection(conn, None, None)
    }

    fn from_connection(
        conn: Connection,
        path: Option<PathBuf>,
        credential_digest: Option<[u8; 32]>,
    ) -> DbResult<Database> {
        let db = Database {
            shared: Arc::new(Shared {
                path,
                conn: Mutex::new(Some(conn)),
                tables: RwLock::new(Vec::new()),
                credential_digest,
                initialized: AtomicBool::new(false),
                closed: AtomicBool::new(false),
                sweep: SweepFlags::default(),
            }),
        };
        db.bootstrap_metadata()?;
        db.load_mirrored_tables()?;
        db.shared.initialized.store(true, Ordering::SeqCst);
        Ok(db)
    }

    /// The database file path, `None` for in-memory instances.
    pub fn path(&self) -> Option<&Path> {
        self.shared.path.as_deref()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    /// Check login/password against this open instance's key material.
    pub fn verify_credentials(&self, login: &str, password: &str) -> DbResult<()> {
        let Some(expected) = self.shared.credential_digest else {
            return Err(DbError::State(
                "in-memory database has no credentials".into(),
            ));
        };
        if encryption::credential_digest(login, password) == expected {
            Ok(())
        } else {
            Err(DbError::Credentials)
        }
    }

    /// Run the pending foreign-key sweep synchronously, commit and shut
    /// the engine down. Idempotent.
    pub fn close(&self) -> DbResult<()> {
        if self.shared.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        // New sweeps can no longer be scheduled; drain what is pending.
        self.flush_sweeps();
        // Taking the connection out drops it, releasing the engine-side
        // file handles (and checkpointing the WAL on file databases).
        if let Some(conn) = self.shared.conn.lock().take() {
            let _ = conn.execute_batch("PRAGMA optimize;");
        }
        Ok(())
    }

    fn ensure_open(&self) -> DbResult<()> {
        if self.is_closed() {
            Err(closed_error())
        } else {
            Ok(())
        }
    }

    // ── Catalog access ─────────────────────────────────

    /// A loaded table by (case-insensitive) name.
    pub fn table(&self, name: &str) -> DbResult<Table> {
        self.ensure_open()?;
        self.find_table(name)
            .ok_or_else(|| DbError::Schema(format!("no loaded table named '{name}'")))
    }

    fn find_table(&self, name: &str) -> Option<Table> {
        self.shared
            .tables
            .read()
            .iter()
            .find(|t| t.name().eq_ignore_ascii_case(name))
            .cloned()
    }

    /// Names of all loaded tables, metadata tables included.
    pub fn table_names(&self) -> Vec<String> {
        self.shared.tables.read().iter().map(Table::name).collect()
    }

    // ── Structural operations ──────────────────────────

    /// Create a table. The spec closure declares columns and foreign keys;
    /// the implicit leading `ID` column is added here. The engine schema,
    /// the metadata mirror and the in-memory catalog are updated in the
    /// same logical operation.
    #[instrument(skip_all, fields(table = %name))]
    pub fn create_table(
        &self,
        name: &str,
        build: impl FnOnce(&mut TableSpec) -> DbResult<()>,
    ) -> DbResult<Table> {
        self.ensure_open()?;
        validate_identifier(name)?;
        if self.find_table(name).is_some() {
            return Err(DbError::Schema(format!("table '{name}' already exists")));
        }

        let mut spec = TableSpec::default();
        build(&mut spec)?;

        let mut columns = vec![Column::new(ID_COLUMN, DataType::Id)];
        if let Some((parent, parent_col)) = spec.id_foreign.clone() {
            let (parent, parent_col) = self.resolve_foreign_target(&parent, &parent_col)?;
            columns[0].set_foreign(&parent, &parent_col);
        }
        for col_spec in &spec.columns {
            let mut column =
                Column::with_raw_default(&col_spec.name, col_spec.data_type, col_spec.default.clone());
            if let Some(target) = &col_spec.foreign_target {
                let target = self.table(target)?;
                column.set_foreign(&target.name(), ID_COLUMN);
            }
            columns.push(column);
        }

        self.exec(&render_create_table(name, &columns))?;
        let table_id = self.mirror_insert_table(name)?;
        self.mirror_write_columns(table_id, &columns)?;

        let table = Table::from_columns(name, false, columns);
        self.shared.tables.write().push(table.clone());
        Ok(table)
    }

    /// Drop a table: engine schema, mirror rows and the in-memory handle.
    /// Schedules a sweep, since children of the dropped table may now hold
    /// dangling references.
    #[instrument(skip_all, fields(table = %name))]
    pub fn drop_table(&self, name: &str) -> DbResult<()> {
        self.ensure_open()?;
        let table = self.table(name)?;
        table.ensure_writable()?;
        let canonical = table.name();

        self.exec(&format!("DROP TABLE {}", quote_ident(&canonical)))?;
        if let Some(table_id) = self.mirror_table_id(&canonical)? {
            self.exec(&format!(
                "DELETE FROM {} WHERE {} = {table_id}",
                quote_ident(TABLE_OF_TABLES_COLUMNS),
                quote_ident("TABLE_ID"),
            ))?;
            self.exec(&format!(
                "DELETE FROM {} WHERE {} = {table_id}",
                quote_ident(TABLE_OF_TABLES),
                quote_ident("ID"),
            ))?;
        }
        self.shared
            .tables
            .write()
            .retain(|t| !t.name().eq_ignore_ascii_case(&canonical));
        self.schedule_sweep();
        Ok(())
    }

    /// Append a column using its type's default value. Rejects duplicate
    /// names, the `Id` type, and `Enum` (which requires
    /// [`Database::append_column_with_default`]).
    pub fn append_column(&self, table: &Table, name: &str, data_type: DataType) -> DbResult<()> {
        if data_type == DataType::Enum {
            return Err(DbError::Schema(format!(
                "enum column '{name}' requires an explicit default value"
            )));
        }
        self.append_column_inner(table, name, data_type, None)
    }

    /// Append a column with an explicit default value (the only way to add
    /// an enum column).
    pub fn append_column_with_default(
        &self,
        table: &Table,
        name: &str,
        data_type: DataType,
        default: Value,
    ) -> DbResult<()> {
        if default.data_type() != data_type {
            return Err(DbError::TypeMismatch {
                column: name.to_string(),
                declared: data_type,
                used: default.data_type(),
            });
        }
        self.append_column_inner(table, name, data_type, Some(default.render_literal()))
    }

    fn append_column_inner(
        &self,
        table: &Table,
        name: &str,
        data_type: DataType,
        default: Option<String>,
    ) -> DbResult<()> {
        self.ensure_open()?;
        table.ensure_writable()?;
        self.validate_new_column(table, name, data_type)?;

        // No explicit default means the type's own default literal.
        let column = match default {
            Some(default) => Column::with_raw_default(name, data_type, Some(default)),
            None => Column::new(name, data_type),
        };
        let literal = column
            .default_literal()
            .ok_or_else(|| DbError::NoDefaultValue(name.to_string()))?
            .to_string();
        self.exec(&format!(
            "ALTER TABLE {} ADD COLUMN {} {} DEFAULT {literal}",
            quote_ident(&table.name()),
            quote_ident(name),
            data_type.engine_type(),
        ))?;
        table.with_data_mut(|data| data.columns.push(column));
        self.refresh_mirror_columns(table)
    }

    /// Insert a column before an existing one. The engine has no
    /// positional ADD COLUMN, so the table is rebuilt
    /// (create-copy-drop-rename) to keep physical order equal to catalog
    /// order.
    #[instrument(skip_all, fields(table = %table.name(), column = %name))]
    pub fn insert_column_before(
        &self,
        table: &Table,
        name: &str,
        data_type: DataType,
        before: &str,
    ) -> DbResult<()> {
        self.ensure_open()?;
        table.ensure_writable()?;
        if data_type == DataType::Enum {
            return Err(DbError::Schema(format!(
                "enum column '{name}' requires an explicit default value"
            )));
        }
        self.validate_new_column(table, name, data_type)?;
        let before_col = table.column(before)?;
        if before_col.data_type() == DataType::Id {
            return Err(DbError::Schema(
                "cannot insert a column before the ID column".into(),
            ));
        }

        let column = Column::new(name, data_type);
        let literal = column
            .default_literal()
            .ok_or_else(|| DbError::NoDefaultValue(name.to_string()))?
            .to_string();

        let old_columns = table.columns();
        let position = old_columns
            .iter()
            .position(|c| c.matches(before))
            .ok_or_else(|| DbError::Schema(format!("no column '{before}'")))?;
        let mut new_columns = old_columns;
        new_columns.insert(position, column.clone());

        let table_name = table.name();
        let rebuild = format!("{table_name}__rebuild");
        self.exec(&render_create_table(&rebuild, &new_columns))?;

        let target_list: Vec<String> = new_columns
            .iter()
            .map(|c| quote_ident(c.name()))
            .collect();
        let source_list: Vec<String> = new_columns
            .iter()
            .map(|c| {
                if c.matches(name) {
                    literal.clone()
                } else {
                    quote_ident(c.name())
                }
            })
            .collect();
        self.exec(&format!(
            "INSERT INTO {} ({}) SELECT {} FROM {}",
            quote_ident(&rebuild),
            target_list.join(", "),
            source_list.join(", "),
            quote_ident(&table_name),
        ))?;
        self.exec(&format!("DROP TABLE {}", quote_ident(&table_name)))?;
        self.exec(&format!(
            "ALTER TABLE {} RENAME TO {}",
            quote_ident(&rebuild),
            quote_ident(&table_name),
        ))?;

        table.with_data_mut(|data| data.columns.insert(position, column));
        self.refresh_mirror_columns(table)
    }

    /// Remove a column. The ID column can never be removed.
    pub fn remove_column(&self, table: &Table, name: &str) -> DbResult<()> {
        self.ensure_open()?;
        table.ensure_writable()?;
        let column = table.column(name)?;
        if column.data_type() == DataType::Id {
            return Err(DbError::Schema("the ID column cannot be removed".into()));
        }
        self.exec(&format!(
            "ALTER TABLE {} DROP COLUMN {}",
            quote_ident(&table.name()),
            quote_ident(column.name()),
        ))?;
        table.with_data_mut(|data| data.columns.retain(|c| !c.matches(name)));
        self.refresh_mirror_columns(table)
    }

    /// Declare `table`'s ID column as a foreign key to
    /// `parent.parent_column`, tying its row lifecycle to the parent's.
    /// The link can be declared at most once.
    pub fn id_foreign(&self, table: &Table, parent: &str, parent_column: &str) -> DbResult<()> {
        self.ensure_open()?;
        table.ensure_writable()?;
        if table.id_column().is_foreign() {
            return Err(DbError::State(format!(
                "table '{}' already declares an ID foreign key",
                table.name()
            )));
        }
        let (parent, parent_column) = self.resolve_foreign_target(parent, parent_column)?;
        table.with_data_mut(|data| data.columns[0].set_foreign(&parent, &parent_column));
        self.refresh_mirror_columns(table)
    }

    fn resolve_foreign_target(&self, parent: &str, column: &str) -> DbResult<(String, String)> {
        let parent_table = self.table(parent)?;
        let parent_col = parent_table.column(column)?;
        if !parent_col.data_type().is_integer_kind() {
            return Err(DbError::Schema(format!(
                "foreign target '{parent}.{column}' must be of integer kind, is {:?}",
                parent_col.data_type()
            )));
        }
        Ok((parent_table.name(), parent_col.name().to_string()))
    }

    fn validate_new_column(&self, table: &Table, name: &str, data_type: DataType) -> DbResult<()> {
        validate_identifier(name)?;
        if data_type == DataType::Id {
            return Err(DbError::Schema(format!(
                "column '{name}': the ID type is reserved for the implicit ID column"
            )));
        }
        if table.contains(name) {
            return Err(DbError::Schema(format!(
                "table '{}' already has a column '{name}'",
                table.name()
            )));
        }
        Ok(())
    }

    // ── Metadata mirror ────────────────────────────────

    fn bootstrap_metadata(&self) -> DbResult<()> {
        self.exec(&format!(
            "CREATE TABLE IF NOT EXISTS {} ({} INTEGER PRIMARY KEY, {} TEXT)",
            quote_ident(TABLE_OF_TABLES),
            quote_ident(ID_COLUMN),
            quote_ident("NAME"),
        ))?;
        self.exec(&format!(
            "CREATE TABLE IF NOT EXISTS {} ({} INTEGER PRIMARY KEY, {} TEXT, {} TEXT, \
             {} TEXT, {} TEXT, {} TEXT, {} INTEGER, {} INTEGER)",
            quote_ident(TABLE_OF_TABLES_COLUMNS),
            quote_ident(ID_COLUMN),
            quote_ident("NAME"),
            quote_ident("TYPE"),
            quote_ident("FOREIGN_TABLE"),
            quote_ident("FOREIGN_COLUMN"),
            quote_ident("DEFAULT_VALUE"),
            quote_ident("POSITION"),
            quote_ident("TABLE_ID"),
        ))?;

        let tables_meta = Table::from_columns(
            TABLE_OF_TABLES,
            true,
            vec![
                Column::new(ID_COLUMN, DataType::Id),
                Column::new("NAME", DataType::Str),
            ],
        );
        let mut table_id_col = Column::new("TABLE_ID", DataType::Long);
        table_id_col.set_foreign(TABLE_OF_TABLES, ID_COLUMN);
        let columns_meta = Table::from_columns(
            TABLE_OF_TABLES_COLUMNS,
            true,
            vec![
                Column::new(ID_COLUMN, DataType::Id),
                Column::new("NAME", DataType::Str),
                Column::new("TYPE", DataType::Str),
                Column::new("FOREIGN_TABLE", DataType::Str),
                Column::new("FOREIGN_COLUMN", DataType::Str),
                Column::new("DEFAULT_VALUE", DataType::Str),
                Column::new("POSITION", DataType::Long),
                table_id_col,
            ],
        );
        let mut tables = self.shared.tables.write();
        tables.push(tables_meta);
        tables.push(columns_meta);
        Ok(())
    }

    fn load_mirrored_tables(&self) -> DbResult<()> {
        let names: Vec<String> = {
            let guard = self.shared.conn.lock();
            let conn = guard.as_ref().ok_or_else(closed_error)?;
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM {} ORDER BY {}",
                quote_ident("NAME"),
                quote_ident(TABLE_OF_TABLES),
                quote_ident(ID_COLUMN),
            ))?;
            let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
            rows.collect::<Result<_, _>>()?
        };
        for name in names {
            self.obtain_table_or_read_it(&name)?;
        }
        Ok(())
    }

    /// A loaded table, or one reconstructed from its mirror rows. This is
    /// how user tables come back after a restart.
    pub fn obtain_table_or_read_it(&self, name: &str) -> DbResult<Table> {
        self.ensure_open()?;
        if let Some(table) = self.find_table(name) {
            return Ok(table);
        }
        let table_id = self
            .mirror_table_id(name)?
            .ok_or_else(|| DbError::Schema(format!("no table named '{name}'")))?;

        let stored_name: String = {
            let guard = self.shared.conn.lock();
            let conn = guard.as_ref().ok_or_else(closed_error)?;
            conn.query_row(
                &format!(
                    "SELECT {} FROM {} WHERE {} = {table_id}",
                    quote_ident("NAME"),
                    quote_ident(TABLE_OF_TABLES),
                    quote_ident(ID_COLUMN),
                ),
                [],
                |row| row.get(0),
            )?
        };

        let rows: Vec<(String, String, String, String, String)> = {
            let guard = self.shared.conn.lock();
            let conn = guard.as_ref().ok_or_else(closed_error)?;
            let mut stmt = conn.prepare(&format!(
                "SELECT {}, {}, {}, {}, {} FROM {} WHERE {} = {table_id} ORDER BY {}",
                quote_ident("NAME"),
                quote_ident("TYPE"),
                quote_ident("FOREIGN_TABLE"),
                quote_ident("FOREIGN_COLUMN"),
                quote_ident("DEFAULT_VALUE"),
                quote_ident(TABLE_OF_TABLES_COLUMNS),
                quote_ident("TABLE_ID"),
                quote_ident("POSITION"),
            ))?;
            let mapped = stmt.query_map([], |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                ))
            })?;
            mapped.collect::<Result<_, _>>()?
        };

        let mut columns = Vec::with_capacity(rows.len());
        for (col_name, type_keyword, foreign_table, foreign_column, default) in rows {
            let data_type = DataType::from_keyword(&type_keyword).ok_or_else(|| {
                DbError::Schema(format!(
                    "mirror row for '{stored_name}.{col_name}' has unknown type '{type_keyword}'"
                ))
            })?;
            let default = if default.is_empty() { None } else { Some(default) };
            let mut column = Column::with_raw_default(&col_name, data_type, default);
            if !foreign_table.is_empty() {
                column.set_foreign(&foreign_table, &foreign_column);
            }
            columns.push(column);
        }
        if columns.first().map(|c| c.data_type()) != Some(DataType::Id) {
            return Err(DbError::Schema(format!(
                "mirror rows for '{stored_name}' lack the leading ID column"
            )));
        }

        let table = Table::from_columns(&stored_name, false, columns);
        self.shared.tables.write().push(table.clone());
        Ok(table)
    }

    fn mirror_table_id(&self, name: &str) -> DbResult<Option<i64>> {
        let guard = self.shared.conn.lock();
        let conn = guard.as_ref().ok_or_else(closed_error)?;
        let id = conn
            .query_row(
                &format!(
                    "SELECT {} FROM {} WHERE UPPER({}) = UPPER({})",
                    quote_ident(ID_COLUMN),
                    quote_ident(TABLE_OF_TABLES),
                    quote_ident("NAME"),
                    quote_str(name),
                ),
                [],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    fn mirror_insert_table(&self, name: &str) -> DbResult<i64> {
        let id = self.raw_biggest_id(TABLE_OF_TABLES)? + 1;
        self.exec(&format!(
            "INSERT INTO {} ({}, {}) VALUES ({id}, {})",
            quote_ident(TABLE_OF_TABLES),
            quote_ident(ID_COLUMN),
            quote_ident("NAME"),
            quote_str(name),
        ))?;
        Ok(id)
    }

    /// Rewrite the mirror's column rows for one table. Called after every
    /// structural change so row order (by POSITION) always matches the
    /// catalog's declaration order.
    fn refresh_mirror_columns(&self, table: &Table) -> DbResult<()> {
        let table_id = self
            .mirror_table_id(&table.name())?
            .ok_or_else(|| DbError::Schema(format!("table '{}' is not mirrored", table.name())))?;
        self.mirror_write_columns(table_id, &table.columns())
    }

    fn mirror_write_columns(&self, table_id: i64, columns: &[Column]) -> DbResult<()> {
        self.exec(&format!(
            "DELETE FROM {} WHERE {} = {table_id}",
            quote_ident(TABLE_OF_TABLES_COLUMNS),
            quote_ident("TABLE_ID"),
        ))?;
        let mut next_id = self.raw_biggest_id(TABLE_OF_TABLES_COLUMNS)? + 1;
        for (position, column) in columns.iter().enumerate() {
            self.exec(&format!(
                "INSERT INTO {} ({}, {}, {}, {}, {}, {}, {}, {}) \
                 VALUES ({next_id}, {}, {}, {}, {}, {}, {position}, {table_id})",
                quote_ident(TABLE_OF_TABLES_COLUMNS),
                quote_ident(ID_COLUMN),
                quote_ident("NAME"),
                quote_ident("TYPE"),
                quote_ident("FOREIGN_TABLE"),
                quote_ident("FOREIGN_COLUMN"),
                quote_ident("DEFAULT_VALUE"),
                quote_ident("POSITION"),
                quote_ident("TABLE_ID"),
                quote_str(column.name()),
                quote_str(column.data_type().as_keyword()),
                quote_str(column.foreign_table_raw()),
                quote_str(column.foreign_column_raw()),
                quote_str(column.default_literal().unwrap_or("")),
            ))?;
            next_id += 1;
        }
        Ok(())
    }

    // ── Row operations ─────────────────────────────────

    /// Execute an insert.
    ///
    /// In upsert mode, a condition matching exactly one existing row turns
    /// the operation into an UPDATE of that row; zero or several matches
    /// fall back to a plain insert. A plain insert allocates
    /// `biggest_id + 1` (the first row of a table gets id 0).
    #[instrument(skip_all, fields(table = %insert.table().name()))]
    pub fn insert(&self, insert: Insert) -> DbResult<MutationOutcome> {
        self.ensure_open()?;
        let table = insert.table().clone();

        if let Some(condition) = insert.upsert_condition() {
            let lookup = match self.row_id(&table, condition) {
                Ok(lookup) => lookup,
                Err(e) => return self.mutation_error(e),
            };
            if let RowLookup::Found(id) = lookup {
                if insert.values().is_empty() {
                    return Err(DbError::State("upsert with no column values set".into()));
                }
                let sql = format!(
                    "UPDATE {} SET {} WHERE {} = {id}",
                    quote_ident(&table.name()),
                    insert.values().render_assignments(),
                    quote_ident(ID_COLUMN),
                );
                let outcome = self.execute_mutation(&sql)?;
                if matches!(outcome, MutationOutcome::Applied(n) if n > 0) {
                    self.schedule_sweep();
                }
                return Ok(outcome);
            }
        }

        let id = match self.biggest_id(&table) {
            Ok(id) => id + 1,
            Err(e) => return self.mutation_error(e),
        };
        let columns = table.columns();
        let mut names = Vec::with_capacity(columns.len());
        let mut literals = Vec::with_capacity(columns.len());
        for column in &columns {
            names.push(quote_ident(column.name()));
            if column.data_type() == DataType::Id {
                literals.push(id.to_string());
            } else if let Some(lit) = insert.values().literal_for(column) {
                literals.push(lit.to_string());
            } else if let Some(default) = column.default_literal() {
                literals.push(default.to_string());
            } else {
                return Err(DbError::NoDefaultValue(column.name().to_string()));
            }
        }
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_ident(&table.name()),
            names.join(", "),
            literals.join(", "),
        );
        self.execute_mutation(&sql)
    }

    /// Execute every insert in the list, stopping at the first engine
    /// failure.
    pub fn insert_list(&self, list: InsertList) -> DbResult<MutationOutcome> {
        self.ensure_open()?;
        let mut total = 0u64;
        for insert in list.into_inserts() {
            match self.insert(insert)? {
                MutationOutcome::Applied(n) => total += n,
                MutationOutcome::EngineFailure => return Ok(MutationOutcome::EngineFailure),
            }
        }
        Ok(MutationOutcome::Applied(total))
    }

    /// Execute an update; schedules a sweep when at least one row changed.
    #[instrument(skip_all, fields(table = %update.target().name()))]
    pub fn update(&self, update: Update) -> DbResult<MutationOutcome> {
        self.ensure_open()?;
        let sql = update.render()?;
        let outcome = self.execute_mutation(&sql)?;
        if matches!(outcome, MutationOutcome::Applied(n) if n > 0) {
            self.schedule_sweep();
        }
        Ok(outcome)
    }

    /// Execute a delete; schedules a sweep when at least one row vanished.
    #[instrument(skip_all, fields(table = %delete.table().name()))]
    pub fn delete(&self, delete: Delete) -> DbResult<MutationOutcome> {
        self.ensure_open()?;
        let sql = delete.render();
        let outcome = self.execute_mutation(&sql)?;
        if matches!(outcome, MutationOutcome::Applied(n) if n > 0) {
            self.schedule_sweep();
        }
        Ok(outcome)
    }

    /// Execute a select, handing `f` a forward-only cursor scoped to this
    /// call. The cursor holds the connection for the duration of `f`, so
    /// the callback must not issue further statements on the same
    /// database.
    pub fn select<R>(
        &self,
        select: Select,
        f: impl FnOnce(&mut DataRowResult<'_>) -> DbResult<R>,
    ) -> DbResult<R> {
        self.ensure_open()?;
        let sql = select.render();
        debug!(%sql, "select");
        let guard = self.shared.conn.lock();
        let conn = guard.as_ref().ok_or_else(closed_error)?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query([])?;
        let mut cursor = DataRowResult::new(rows, select.projection())?;
        let out = f(&mut cursor);
        cursor.close();
        out
    }

    /// Resolve the single row id matching `condition`.
    pub fn row_id(&self, table: &Table, condition: &Condition) -> DbResult<RowLookup> {
        self.ensure_open()?;
        condition.validate_against(table)?;
        let sql = format!(
            "SELECT {} FROM {} WHERE {} LIMIT 2",
            quote_ident(ID_COLUMN),
            quote_ident(&table.name()),
            condition.sql(),
        );
        debug!(%sql, "row_id");
        let guard = self.shared.conn.lock();
        let conn = guard.as_ref().ok_or_else(closed_error)?;
        let mut stmt = conn.prepare(&sql)?;
        let ids: Vec<i64> = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<_, _>>()?;
        Ok(match ids.as_slice() {
            [] => RowLookup::Missing,
            [id] => RowLookup::Found(*id),
            _ => RowLookup::NotUnique,
        })
    }

    /// Largest allocated row id, `-1` when the table is empty.
    pub fn biggest_id(&self, table: &Table) -> DbResult<i64> {
        self.ensure_open()?;
        self.raw_biggest_id(&table.name())
    }

    /// Eager two-pass REGEX condition. The engine dialect has no regex
    /// predicate, so the column is pulled and matched in-process, and the
    /// result rewritten into an id-membership condition.
    pub fn matching_regex(
        &self,
        table: &Table,
        column: &str,
        pattern: &str,
    ) -> DbResult<Condition> {
        self.ensure_open()?;
        let col = table.column(column)?;
        col.check_type(DataType::Str)?;
        let re = Regex::new(pattern)?;

        let mut select = Select::from(table);
        select.column(ID_COLUMN)?;
        select.column(col.name())?;
        let col_name = col.name().to_string();
        let ids = self.select(select, |cursor| {
            let mut ids = Vec::new();
            while cursor.has_row() {
                cursor.next(|row| {
                    if re.is_match(&row.get_string(&col_name)?) {
                        ids.push(row.get_id(ID_COLUMN)?);
                    }
                    Ok(())
                })?;
            }
            Ok(ids)
        })?;
        table.id_column().one_of_id(&ids)
    }

    // ── Foreign-key sweep ──────────────────────────────

    /// Raise the "sweep needed" flag and launch a worker unless one is
    /// already in flight.
    pub(crate) fn schedule_sweep(&self) {
        if self.is_closed() {
            return;
        }
        let sweep = &self.shared.sweep;
        sweep.pending.store(true, Ordering::SeqCst);
        if sweep
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            let shared = Arc::clone(&self.shared);
            thread::spawn(move || run_sweep_worker(shared));
        }
    }

    /// Block until no sweep is pending or in flight. Runs pending passes
    /// inline when the worker slot is free.
    pub fn flush_sweeps(&self) {
        let sweep = &self.shared.sweep;
        loop {
            if sweep
                .running
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                while sweep.pending.swap(false, Ordering::SeqCst) {
                    sweep_pass(&self.shared);
                }
                sweep.running.store(false, Ordering::SeqCst);
                if !sweep.pending.load(Ordering::SeqCst) {
                    return;
                }
            } else {
                if !sweep.pending.load(Ordering::SeqCst) && !sweep.running.load(Ordering::SeqCst) {
                    return;
                }
                thread::sleep(Duration::from_millis(1));
            }
        }
    }

    // ── Statement execution ────────────────────────────

    fn exec(&self, sql: &str) -> DbResult<usize> {
        debug!(%sql, "execute");
        let guard = self.shared.conn.lock();
        let conn = guard.as_ref().ok_or_else(closed_error)?;
        Ok(conn.execute(sql, [])?)
    }

    /// Mutation execution with the two-tier policy: after initialization,
    /// engine failures are logged and reported as an outcome; during
    /// bootstrap they propagate.
    fn execute_mutation(&self, sql: &str) -> DbResult<MutationOutcome> {
        match self.exec(sql) {
            Ok(n) => Ok(MutationOutcome::Applied(n as u64)),
            Err(e) => self.mutation_error(e),
        }
    }

    /// The same policy for engine errors raised by a mutation's internal
    /// queries (id allocation, upsert row lookup). Validation errors stay
    /// `Err` — only engine-level failures become the outcome sentinel.
    fn mutation_error(&self, e: DbError) -> DbResult<MutationOutcome> {
        match e {
            DbError::Engine(engine)
                if self.shared.initialized.load(Ordering::SeqCst) =>
            {
                error!(error = %engine, "mutation failed at the engine");
                Ok(MutationOutcome::EngineFailure)
            }
            other => Err(other),
        }
    }

    fn raw_biggest_id(&self, table: &str) -> DbResult<i64> {
        let guard = self.shared.conn.lock();
        let conn = guard.as_ref().ok_or_else(closed_error)?;
        let id: Option<i64> = conn
            .query_row(
                &format!(
                    "SELECT {} FROM {} ORDER BY {} DESC LIMIT 1",
                    quote_ident(ID_COLUMN),
                    quote_ident(table),
                    quote_ident(ID_COLUMN),
                ),
                [],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id.unwrap_or(-1))
    }
}

// ─────────────────────────────────────────────
// Sweep worker
// ─────────────────────────────────────────────

fn run_sweep_worker(shared: Arc<Shared>) {
    loop {
        while shared.sweep.pending.swap(false, Ordering::SeqCst) {
            sweep_pass(&shared);
        }
        shared.sweep.running.store(false, Ordering::SeqCst);
        // A request may have slipped in between the last swap and the
        // store; re-acquire the worker slot instead of losing it.
        if shared.sweep.pending.load(Ordering::SeqCst)
            && shared
                .sweep
                .running
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
        {
            continue;
        }
        return;
    }
}

/// One sweep pass: for every loaded table whose ID column declares a
/// foreign link, delete the rows whose id is absent from the parent
/// column. Each table is individually guarded so one engine error cannot
/// abort integrity restoration for the rest.
fn sweep_pass(shared: &Shared) {
    let tables: Vec<Table> = shared.tables.read().clone();
    for table in tables {
        let id_column = table.id_column();
        let (Some(parent), Some(parent_col)) =
            (id_column.foreign_table(), id_column.foreign_column())
        else {
            continue;
        };
        let sql = format!(
            "DELETE FROM {} WHERE NOT ({} IN (SELECT {} FROM {}))",
            quote_ident(&table.name()),
            quote_ident(ID_COLUMN),
            quote_ident(parent_col),
            quote_ident(parent),
        );
        let result = {
            let guard = shared.conn.lock();
            match guard.as_ref() {
                Some(conn) => conn.execute(&sql, []),
                // Closed underneath the worker; nothing left to sweep.
                None => return,
            }
        };
        match result {
            Ok(n) if n > 0 => {
                debug!(table = %table.name(), deleted = n, "sweep removed orphaned rows");
                // Deleted rows may orphan grandchildren; request another pass.
                shared.sweep.pending.store(true, Ordering::SeqCst);
            }
            Ok(_) => {}
            Err(e) => {
                warn!(table = %table.name(), error = %e, "sweep pass failed for table");
            }
        }
    }
}

fn closed_error() -> DbError {
    DbError::State("database is closed".into())
}

fn render_create_table(name: &str, columns: &[Column]) -> String {
    let defs: Vec<String> = columns
        .iter()
        .map(|c| {
            if c.data_type() == DataType::Id {
                format!("{} INTEGER PRIMARY KEY", quote_ident(c.name()))
            } else {
                match c.default_literal() {
                    Some(lit) => format!(
                        "{} {} DEFAULT {lit}",
                        quote_ident(c.name()),
                        c.data_type().engine_type()
                    ),
                    None => format!("{} {}", quote_ident(c.name()), c.data_type().engine_type()),
                }
            }
        })
        .collect();
    format!("CREATE TABLE {} ({})", quote_ident(name), defs.join(", "))
}
