//! Mapping of server error numbers onto the error taxonomy.
//!
//! A static table assigns a [`DatabaseErrorKind`] to each known server error
//! number. Unmapped codes fall back by range: below 1000 (the server's
//! internal range) to `Internal`, from 1000 through the client-error ceiling
//! to `Operational`. Code 0 on a failed round-trip and codes beyond the
//! ceiling are client-level interface errors.

use mysqlc_core::{DatabaseErrorKind, Error};

use crate::protocol::ErrPacket;

/// Client-side error numbers (the CR_* range of the C client library),
/// used when the failure originates in this driver rather than the server.
pub mod client_errors {
    /// Can't connect to local server through socket
    pub const CR_CONNECTION_ERROR: u16 = 2002;
    /// Can't connect to server on host
    pub const CR_CONN_HOST_ERROR: u16 = 2003;
    /// Unknown host
    pub const CR_UNKNOWN_HOST: u16 = 2005;
    /// Server has gone away
    pub const CR_SERVER_GONE_ERROR: u16 = 2006;
    /// Lost connection during query
    pub const CR_SERVER_LOST: u16 = 2013;
    /// Commands out of sync
    pub const CR_COMMANDS_OUT_OF_SYNC: u16 = 2014;

    /// Highest error number this driver considers meaningful.
    pub const CR_MAX_ERROR: u16 = 2999;
}

/// Kind assigned to a known server error number, if any.
fn mapped_kind(code: u16) -> Option<DatabaseErrorKind> {
    use DatabaseErrorKind::{Data, Integrity, NotSupported, Operational, Programming};

    let kind = match code {
        // Misuse of the interface or invalid SQL
        1007 // database exists
        | 1064 // parse error
        | 1102 // wrong db name
        | 1103 // wrong table name
        | 1110 // field specified twice
        | 1111 // invalid group function use
        | 1112 // unsupported extension
        | 1113 // a table must have at least one column
        | 1146 // no such table
        | 1149 // syntax error
        | 1179 // not allowed in a transaction
        => Programming,

        // Problems with the data itself
        1171 // primary key column cannot be null
        | 1230 // no default
        | 1263 // null forced to not-null
        | 1264 // value out of range
        | 1265 // data truncated
        | 1406 // data too long
        | 1441 // datetime function overflow
        => Data,

        // Constraint violations
        1048 // column cannot be null
        | 1062 // duplicate entry
        | 1215 // cannot add foreign key
        | 1216 // no referenced row
        | 1217 // row is referenced
        | 1451 // row is referenced (InnoDB)
        | 1452 // no referenced row (InnoDB)
        => Integrity,

        // Feature unavailable
        1196 // rollback incomplete
        | 1235 // not supported yet
        | 1286 // unknown storage engine
        | 1289 // feature disabled
        => NotSupported,

        // Access and resource problems
        1040 // too many connections
        | 1044 // db access denied
        | 1045 // access denied
        | 1142 // table access denied
        | 1143 // column access denied
        => Operational,

        _ => return None,
    };
    Some(kind)
}

/// Convert a server ERR packet into a driver error.
pub fn map_server_error(err: &ErrPacket) -> Error {
    let code = err.error_code;

    if code == 0 {
        return Error::interface(err.error_message.clone());
    }
    if code > client_errors::CR_MAX_ERROR {
        return Error::interface("error totally whack");
    }

    let kind = mapped_kind(code).unwrap_or(if code < 1000 {
        DatabaseErrorKind::Internal
    } else {
        DatabaseErrorKind::Operational
    });

    Error::server(kind, code, err.sql_state.clone(), err.error_message.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packet(code: u16, state: Option<&str>, message: &str) -> ErrPacket {
        ErrPacket {
            error_code: code,
            sql_state: state.map(str::to_string),
            error_message: message.to_string(),
        }
    }

    #[test]
    fn known_codes_map_to_their_kind() {
        let dup = map_server_error(&packet(1062, Some("23000"), "Duplicate entry"));
        assert_eq!(dup.kind(), Some(DatabaseErrorKind::Integrity));
        assert_eq!(dup.code(), Some(1062));
        assert_eq!(dup.sqlstate(), Some("23000"));

        let parse = map_server_error(&packet(1064, Some("42000"), "You have an error"));
        assert!(parse.is_programming());

        let truncated = map_server_error(&packet(1265, Some("01000"), "Data truncated"));
        assert_eq!(truncated.kind(), Some(DatabaseErrorKind::Data));

        let denied = map_server_error(&packet(1045, Some("28000"), "Access denied"));
        assert!(denied.is_operational());

        let nyi = map_server_error(&packet(1235, Some("42000"), "not supported"));
        assert_eq!(nyi.kind(), Some(DatabaseErrorKind::NotSupported));
    }

    #[test]
    fn unmapped_low_codes_are_internal() {
        let err = map_server_error(&packet(999, None, "odd"));
        assert_eq!(err.kind(), Some(DatabaseErrorKind::Internal));
    }

    #[test]
    fn unmapped_high_codes_are_operational() {
        let err = map_server_error(&packet(1205, Some("HY000"), "Lock wait timeout"));
        assert!(err.is_operational());
        assert_eq!(err.code(), Some(1205));
    }

    #[test]
    fn code_zero_is_an_interface_error() {
        let err = map_server_error(&packet(0, None, "no error number"));
        assert!(err.is_interface());
    }

    #[test]
    fn codes_beyond_the_ceiling_are_whack() {
        let err = map_server_error(&packet(3000, None, "whatever"));
        assert!(err.is_interface());
        assert_eq!(err.to_string(), "interface error: error totally whack");
    }
}
