//! Core types for the mysqlc driver.
//!
//! This crate provides the driver-independent foundations:
//!
//! - [`Error`] — the error taxonomy (interface vs. database errors)
//! - [`Value`] — dynamically-typed SQL values
//! - [`Row`] — result rows with shared column metadata

pub mod error;
pub mod row;
pub mod value;

pub use error::{DatabaseError, DatabaseErrorKind, Error, InterfaceError, Result};
pub use row::{ColumnInfo, Row};
pub use value::Value;
