//! SpinozaDB — a typed query layer and metadata catalog over an embedded
//! relational engine.
//!
//! The crate exposes a small DSL (`Select` / `Insert` / `Update` /
//! `Delete` plus a composable [`Condition`] algebra) that validates every
//! column reference and value type against an in-memory catalog before a
//! single byte of SQL reaches the engine. The catalog itself is mirrored
//! into two metadata tables inside the database file, so a reopened
//! database reconstructs its typed tables without external schema files.
//!
//! Referential integrity is eventually consistent: mutations never fail on
//! dangling foreign references; a coalesced background sweep deletes
//! orphaned child rows shortly after their parent disappears (see
//! [`Database`]).
//!
//! ```no_run
//! use spinoza_db::{Database, DataType, Insert, Select, Where};
//!
//! # fn main() -> spinoza_db::DbResult<()> {
//! let db = Database::open_in_memory()?;
//! let users = db.create_table("users", |t| {
//!     t.column("name", DataType::Str)?;
//!     t.column("age", DataType::Int)?;
//!     Ok(())
//! })?;
//!
//! let mut insert = Insert::into(&users)?;
//! insert.set("name", "Alice".into())?.set("age", 30.into())?;
//! db.insert(insert)?;
//!
//! let mut select = Select::from(&users);
//! select.filter(Where::new(&users).equals("name", "Alice".into())?)?;
//! db.select(select, |rows| {
//!     rows.next(|row| {
//!         assert_eq!(row.get_int("age")?, 30);
//!         Ok(())
//!     })
//! })?;
//! db.close()
//! # }
//! ```

pub mod catalog;
pub mod condition;
pub mod db;
pub mod encryption;
pub mod error;
pub mod query;
pub mod registry;
pub mod row;

pub use catalog::{Column, Table, TableSpec, ID_COLUMN};
pub use condition::{Condition, NEVER_MATCH_ID};
pub use db::{
    Database, MutationOutcome, RowLookup, TABLE_OF_TABLES, TABLE_OF_TABLES_COLUMNS,
};
pub use error::{DbError, DbResult};
pub use query::{Delete, Insert, InsertList, Match, Order, Select, Update, Where};
pub use registry::DatabaseRegistry;
pub use row::{DataRow, DataRowResult};

pub use spinoza_types::{DataType, DbEnum, Value};

#[cfg(test)]
mod tests;
