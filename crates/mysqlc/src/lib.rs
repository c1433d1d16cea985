//! A MySQL client/server protocol driver.
//!
//! This crate implements the MySQL wire protocol from scratch over blocking
//! sockets:
//!
//! - Packet framing with sequence numbers and 16MB splitting
//! - Handshake v10 authentication (`mysql_native_password`,
//!   `caching_sha2_password`, `sha256_password`), with mid-handshake TLS
//!   upgrade behind the `tls` feature
//! - Text-protocol queries with buffered (`store_result`) or streaming
//!   (`use_result`) result sets
//! - A per-type converter table with flag-masked overrides for turning
//!   column bytes into typed values
//! - A structured error taxonomy mapped from server error numbers
//!
//! One connection is one synchronous request/response session; for
//! concurrency, open one connection per thread.
//!
//! # Example
//!
//! ```rust,ignore
//! use mysqlc::{Library, MySqlConfig, ResultSet, RowMode};
//!
//! let lib = Library::init()?;
//! let mut conn = lib.connect(
//!     MySqlConfig::new()
//!         .host("localhost")
//!         .user("app")
//!         .password("secret")
//!         .database("test"),
//! )?;
//!
//! conn.query("SELECT id, name FROM users")?;
//! let mut result = conn.store_result()?;
//! for row in result.fetch_rows(0, RowMode::Dict)? {
//!     println!("{:?}", row.get("name"));
//! }
//! ```

pub mod auth;
pub mod bootstrap;
pub mod config;
pub mod connection;
pub mod convert;
pub mod errmap;
pub mod escape;
pub mod field;
pub mod protocol;
pub mod result;
mod stream;
pub mod tls;

pub use bootstrap::Library;
pub use config::{MySqlConfig, SslMode, TlsConfig};
pub use connection::{Connection, ConnectionState, ServerHandshake, ServerOption};
pub use convert::{ConvertFn, ConverterTable};
pub use errmap::client_errors;
pub use escape::{escape_string, quote_value, string_literal};
pub use field::{Field, FieldType};
pub use result::{BufferedResult, ResultSet, RowMode, StreamingResult};

pub use mysqlc_core::{
    ColumnInfo, DatabaseError, DatabaseErrorKind, Error, InterfaceError, Result, Row, Value,
};
