use spinoza_types::DataType;
use thiserror::Error;

/// Errors surfaced by the query DSL and the database facade.
///
/// The taxonomy is two-tier by design: type, schema, state, read-only and
/// credential violations are raised as `Err` before any SQL reaches the
/// engine, while engine failures during row mutations (after the database
/// has finished initializing) are logged and reported through
/// [`crate::MutationOutcome::EngineFailure`] instead of an error.
#[derive(Debug, Error)]
pub enum DbError {
    /// A column's declared type does not match the operator or getter used.
    #[error("type mismatch on column '{column}': declared {declared:?}, used as {used:?}")]
    TypeMismatch {
        column: String,
        declared: DataType,
        used: DataType,
    },

    /// Invalid identifiers, duplicate names, removing the ID column, and
    /// other schema-validity violations caught at DSL-build time.
    #[error("invalid schema: {0}")]
    Schema(String),

    /// A malformed DSL argument (e.g. a `Match` projecting more than one
    /// column, or a getter for a column outside the projection).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Operating on a closed database, updating with zero set values, and
    /// similar lifecycle violations.
    #[error("invalid state: {0}")]
    State(String),

    /// A mutation was attempted on one of the read-only metadata tables.
    #[error("table '{0}' is read-only")]
    ReadOnly(String),

    /// Login/password do not match the database's key file, or do not match
    /// an already-open instance for the same path.
    #[error("login/password do not match the database key material")]
    Credentials,

    /// An insert left a column with neither a supplied value nor a default.
    #[error("no value supplied for column '{0}' and its type has no default")]
    NoDefaultValue(String),

    /// A typed getter asked for a column the originating select did not
    /// project.
    #[error("column '{0}' is not part of the select projection")]
    NotProjected(String),

    /// `next` was called on a cursor that already self-closed.
    #[error("row cursor is exhausted")]
    CursorExhausted,

    /// A stored cell could not be decoded back into its declared type.
    #[error("cannot decode stored cell: {0}")]
    Decode(String),

    /// The key file is unreadable or structurally invalid.
    #[error("key file error: {0}")]
    KeyFile(String),

    /// An invalid pattern passed to a REGEX condition.
    #[error("invalid regex: {0}")]
    Regex(#[from] regex::Error),

    /// An error originating from the underlying engine.
    #[error("engine error: {0}")]
    Engine(#[from] rusqlite::Error),
}

pub type DbResult<T> = Result<T, DbError>;
