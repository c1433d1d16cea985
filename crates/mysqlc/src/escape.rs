//! SQL literal escaping and quoting.
//!
//! Byte-level escaping with the same character set the C client library
//! uses: `NUL`, newline, carriage return, backslash, single quote, double
//! quote and Ctrl-Z. Operates on bytes, not chars, so arbitrary binary
//! strings survive the round trip through a quoted literal.

use mysqlc_core::Value;

/// Escape special characters in `input` for embedding in a SQL string.
///
/// The output is not quoted; see [`string_literal`] for the quoted form.
pub fn escape_string(input: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(input.len() * 2);
    for &b in input {
        match b {
            0x00 => out.extend_from_slice(b"\\0"),
            b'\n' => out.extend_from_slice(b"\\n"),
            b'\r' => out.extend_from_slice(b"\\r"),
            b'\\' => out.extend_from_slice(b"\\\\"),
            b'\'' => out.extend_from_slice(b"\\'"),
            b'"' => out.extend_from_slice(b"\\\""),
            0x1A => out.extend_from_slice(b"\\Z"),
            _ => out.push(b),
        }
    }
    out
}

/// Escape `input` and wrap it in single quotes, producing a complete SQL
/// string literal.
pub fn string_literal(input: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(input.len() * 2 + 2);
    out.push(b'\'');
    out.extend_from_slice(&escape_string(input));
    out.push(b'\'');
    out
}

/// Render a dynamic value as a SQL literal.
///
/// Numbers render bare, text goes through [`string_literal`], binary data
/// becomes a hex literal, NULL becomes the `NULL` keyword. Non-finite
/// floats have no SQL literal form and render as NULL.
pub fn quote_value(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::TinyInt(v) => v.to_string(),
        Value::SmallInt(v) => v.to_string(),
        Value::Int(v) => v.to_string(),
        Value::BigInt(v) => v.to_string(),
        Value::UTinyInt(v) => v.to_string(),
        Value::USmallInt(v) => v.to_string(),
        Value::UInt(v) => v.to_string(),
        Value::UBigInt(v) => v.to_string(),
        Value::Float(v) => float_literal(f64::from(*v)),
        Value::Double(v) => float_literal(*v),
        Value::Decimal(s) => s.clone(),
        Value::Text(s) => String::from_utf8_lossy(&string_literal(s.as_bytes())).into_owned(),
        Value::Bytes(b) => hex_literal(b),
        Value::Json(j) => {
            String::from_utf8_lossy(&string_literal(j.to_string().as_bytes())).into_owned()
        }
    }
}

fn float_literal(v: f64) -> String {
    if v.is_finite() {
        v.to_string()
    } else {
        "NULL".to_string()
    }
}

fn hex_literal(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len() * 2 + 3);
    out.push_str("X'");
    for b in data {
        out.push_str(&format!("{b:02X}"));
    }
    out.push('\'');
    out
}
