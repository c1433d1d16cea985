//! Error types for the MySQL driver.
//!
//! The taxonomy follows the classic two-level split used by database APIs:
//!
//! - [`InterfaceError`] — client-side failures: wire-protocol violations,
//!   malformed packets, use of an uninitialized library. These are fatal for
//!   the connection that produced them.
//! - [`DatabaseError`] — failures tied to a database operation, subdivided by
//!   [`DatabaseErrorKind`] (`Data`, `Operational`, `Integrity`, `Internal`,
//!   `Programming`, `NotSupported`). Server-reported errors always carry the
//!   numeric error code and message as a structured pair, plus the SQLSTATE
//!   when the server sent one. Client-generated errors of these kinds (for
//!   example closing a closed connection) use code 0.

use std::fmt;

/// The primary error type for all driver operations.
#[derive(Debug)]
pub enum Error {
    /// Client/driver-level error (protocol violation, library misuse).
    Interface(InterfaceError),
    /// Database operation error, classified by kind.
    Database(DatabaseError),
}

/// A client-side failure that never reached (or could not understand) the
/// server.
#[derive(Debug)]
pub struct InterfaceError {
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

/// A failure attached to a database operation.
#[derive(Debug)]
pub struct DatabaseError {
    pub kind: DatabaseErrorKind,
    /// Server error number, or 0 for client-generated errors.
    pub code: u16,
    /// Five-character SQLSTATE, when the server provided one.
    pub sqlstate: Option<String>,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

/// Classification of a [`DatabaseError`], ordered roughly by specificity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseErrorKind {
    /// Problems with the data itself (truncation, out of range, bad null).
    Data,
    /// Connection loss, resource limits, access denied, server unavailable.
    Operational,
    /// Constraint violations (duplicate key, foreign key).
    Integrity,
    /// Server-internal inconsistency.
    Internal,
    /// Driver misuse or bad SQL (syntax error, commands out of sync,
    /// closing a closed connection).
    Programming,
    /// Feature unavailable (for example SSL without TLS support compiled in).
    NotSupported,
}

impl Error {
    /// Build a client-side interface error.
    pub fn interface(message: impl Into<String>) -> Self {
        Error::Interface(InterfaceError {
            message: message.into(),
            source: None,
        })
    }

    /// Build an interface error wrapping an underlying cause.
    pub fn interface_with(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Error::Interface(InterfaceError {
            message: message.into(),
            source: Some(Box::new(source)),
        })
    }

    /// Build a server-reported database error.
    pub fn server(
        kind: DatabaseErrorKind,
        code: u16,
        sqlstate: Option<String>,
        message: impl Into<String>,
    ) -> Self {
        Error::Database(DatabaseError {
            kind,
            code,
            sqlstate,
            message: message.into(),
            source: None,
        })
    }

    /// Build a client-generated programming error (code 0).
    pub fn programming(message: impl Into<String>) -> Self {
        Self::client(DatabaseErrorKind::Programming, message)
    }

    /// Build a client-generated not-supported error (code 0).
    pub fn not_supported(message: impl Into<String>) -> Self {
        Self::client(DatabaseErrorKind::NotSupported, message)
    }

    /// Build an operational error with a client-range error code.
    pub fn operational(code: u16, message: impl Into<String>) -> Self {
        Error::Database(DatabaseError {
            kind: DatabaseErrorKind::Operational,
            code,
            sqlstate: None,
            message: message.into(),
            source: None,
        })
    }

    /// Build an operational error wrapping an I/O failure.
    pub fn operational_io(code: u16, message: impl Into<String>, source: std::io::Error) -> Self {
        Error::Database(DatabaseError {
            kind: DatabaseErrorKind::Operational,
            code,
            sqlstate: None,
            message: message.into(),
            source: Some(Box::new(source)),
        })
    }

    fn client(kind: DatabaseErrorKind, message: impl Into<String>) -> Self {
        Error::Database(DatabaseError {
            kind,
            code: 0,
            sqlstate: None,
            message: message.into(),
            source: None,
        })
    }

    /// The database error kind, if this is a database error.
    pub fn kind(&self) -> Option<DatabaseErrorKind> {
        match self {
            Error::Database(e) => Some(e.kind),
            Error::Interface(_) => None,
        }
    }

    /// The numeric error code, if this is a database error.
    pub fn code(&self) -> Option<u16> {
        match self {
            Error::Database(e) => Some(e.code),
            Error::Interface(_) => None,
        }
    }

    /// The SQLSTATE, if the server provided one.
    pub fn sqlstate(&self) -> Option<&str> {
        match self {
            Error::Database(e) => e.sqlstate.as_deref(),
            Error::Interface(_) => None,
        }
    }

    /// Is this a client-side interface error?
    pub fn is_interface(&self) -> bool {
        matches!(self, Error::Interface(_))
    }

    /// Is this a programming (misuse) error?
    pub fn is_programming(&self) -> bool {
        self.kind() == Some(DatabaseErrorKind::Programming)
    }

    /// Is this an operational error (connection loss, server unavailable)?
    pub fn is_operational(&self) -> bool {
        self.kind() == Some(DatabaseErrorKind::Operational)
    }

    /// Is this an integrity (constraint) violation?
    pub fn is_integrity(&self) -> bool {
        self.kind() == Some(DatabaseErrorKind::Integrity)
    }

    /// Errors after which the connection must be considered unusable:
    /// protocol violations and lost connections.
    pub fn is_fatal(&self) -> bool {
        match self {
            Error::Interface(_) => true,
            Error::Database(e) => {
                e.kind == DatabaseErrorKind::Operational
                    && e.source.as_ref().is_some_and(|s| s.is::<std::io::Error>())
            }
        }
    }
}

impl DatabaseErrorKind {
    /// Human-readable name used in error display.
    pub const fn name(self) -> &'static str {
        match self {
            DatabaseErrorKind::Data => "data error",
            DatabaseErrorKind::Operational => "operational error",
            DatabaseErrorKind::Integrity => "integrity error",
            DatabaseErrorKind::Internal => "internal error",
            DatabaseErrorKind::Programming => "programming error",
            DatabaseErrorKind::NotSupported => "not supported",
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Interface(e) => write!(f, "interface error: {}", e.message),
            Error::Database(e) => write!(f, "{e}"),
        }
    }
}

impl fmt::Display for InterfaceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for DatabaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.code == 0 {
            write!(f, "{}: {}", self.kind.name(), self.message)
        } else if let Some(state) = &self.sqlstate {
            write!(
                f,
                "{} {} ({state}): {}",
                self.kind.name(),
                self.code,
                self.message
            )
        } else {
            write!(f, "{} {}: {}", self.kind.name(), self.code, self.message)
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Interface(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Database(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
        }
    }
}

impl From<InterfaceError> for Error {
    fn from(err: InterfaceError) -> Self {
        Error::Interface(err)
    }
}

impl From<DatabaseError> for Error {
    fn from(err: DatabaseError) -> Self {
        Error::Database(err)
    }
}

/// Result type alias for driver operations.
pub type Result<T> = std::result::Result<T, Error>;
