//! # spinoza-types
//!
//! Leaf crate for SpinozaDB: the closed set of logical column kinds
//! ([`DataType`]), the [`Value`] sum type with SQL-literal rendering, the
//! [`DbEnum`] codec trait for enum columns, and the base64 helpers used to
//! serialize byte/int arrays into SQL text.
//!
//! The engine underneath SpinozaDB is untyped at the API boundary (it only
//! sees SQL text), so everything type-safe about the query DSL starts here:
//! a value knows which [`DataType`] it inhabits, and every literal that
//! reaches the engine is rendered by [`Value::render_literal`].

pub mod base64;
pub mod data_type;
pub mod enum_codec;
pub mod value;

pub use data_type::DataType;
pub use enum_codec::DbEnum;
pub use value::{quote_str, Value};
