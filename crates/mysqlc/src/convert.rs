//! Conversion of wire column bytes into typed values.
//!
//! A [`ConverterTable`] maps a column type code to a conversion function,
//! optionally specialized by an ordered list of `(flag mask, function)`
//! overrides: the first override whose mask intersects the column's flags
//! wins, otherwise the type's default converter runs, otherwise the bytes
//! pass through unchanged. NULL cells never reach a converter.

use std::collections::HashMap;

use mysqlc_core::Value;

use crate::field::{Field, FieldType, flags};

/// A conversion function from raw column bytes to a typed value.
pub type ConvertFn = fn(&[u8], &Field) -> Value;

/// Converters registered for one column type.
#[derive(Debug, Clone)]
struct TypeEntry {
    default: ConvertFn,
    overrides: Vec<(u16, ConvertFn)>,
}

/// Per-type conversion table with flag-masked overrides.
#[derive(Debug, Clone)]
pub struct ConverterTable {
    entries: HashMap<FieldType, TypeEntry>,
}

impl ConverterTable {
    /// A table with no registered converters: every non-NULL cell passes
    /// through as raw bytes.
    pub fn empty() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Register (or replace) the default converter for a type.
    pub fn set(&mut self, field_type: FieldType, convert: ConvertFn) -> &mut Self {
        self.entries
            .entry(field_type)
            .and_modify(|e| e.default = convert)
            .or_insert(TypeEntry {
                default: convert,
                overrides: Vec::new(),
            });
        self
    }

    /// Append a flag-masked override for a type. Overrides are evaluated in
    /// registration order ahead of the type's default converter; the type
    /// must already have a default registered.
    pub fn add_override(&mut self, field_type: FieldType, mask: u16, convert: ConvertFn) -> &mut Self {
        self.entries
            .entry(field_type)
            .or_insert(TypeEntry {
                default: passthrough,
                overrides: Vec::new(),
            })
            .overrides
            .push((mask, convert));
        self
    }

    /// Resolve the conversion function for a column.
    pub fn resolve(&self, field: &Field) -> ConvertFn {
        match self.entries.get(&field.field_type) {
            Some(entry) => entry
                .overrides
                .iter()
                .find(|(mask, _)| mask & field.flags != 0)
                .map_or(entry.default, |(_, f)| *f),
            None => passthrough,
        }
    }
}

impl Default for ConverterTable {
    /// The standard table: integers, floats, decimals, JSON and text are
    /// decoded; string and blob types carry a BINARY-flag override that
    /// keeps binary columns as raw bytes.
    fn default() -> Self {
        let mut table = Self::empty();

        table.set(FieldType::Tiny, decode_tiny);
        table.set(FieldType::Short, decode_small);
        table.set(FieldType::Year, decode_small);
        table.set(FieldType::Long, decode_int);
        table.set(FieldType::Int24, decode_int);
        table.set(FieldType::LongLong, decode_bigint);
        table.set(FieldType::Float, decode_float);
        table.set(FieldType::Double, decode_double);
        table.set(FieldType::Decimal, decode_decimal);
        table.set(FieldType::NewDecimal, decode_decimal);
        table.set(FieldType::Json, decode_json);
        table.set(FieldType::Null, |_, _| Value::Null);
        table.set(FieldType::Bit, passthrough);
        table.set(FieldType::Geometry, passthrough);

        for ty in [
            FieldType::VarChar,
            FieldType::VarString,
            FieldType::String,
            FieldType::Enum,
            FieldType::Set,
            FieldType::TinyBlob,
            FieldType::MediumBlob,
            FieldType::LongBlob,
            FieldType::Blob,
        ] {
            table.set(ty, decode_text);
            table.add_override(ty, flags::BINARY, passthrough);
        }

        for ty in [
            FieldType::Date,
            FieldType::NewDate,
            FieldType::Time,
            FieldType::DateTime,
            FieldType::Timestamp,
        ] {
            table.set(ty, decode_text);
        }

        table
    }
}

/// Identity conversion: keep the raw bytes.
pub fn passthrough(data: &[u8], _field: &Field) -> Value {
    Value::Bytes(data.to_vec())
}

/// Decode text-protocol bytes as a UTF-8 string.
pub fn decode_text(data: &[u8], _field: &Field) -> Value {
    match std::str::from_utf8(data) {
        Ok(s) => Value::Text(s.to_string()),
        Err(_) => Value::Bytes(data.to_vec()),
    }
}

fn parse_ascii<T: std::str::FromStr>(data: &[u8]) -> Option<T> {
    std::str::from_utf8(data).ok()?.trim().parse().ok()
}

fn decode_tiny(data: &[u8], field: &Field) -> Value {
    if field.is_unsigned() {
        parse_ascii::<u8>(data).map_or_else(|| passthrough(data, field), Value::UTinyInt)
    } else {
        parse_ascii::<i8>(data).map_or_else(|| passthrough(data, field), Value::TinyInt)
    }
}

fn decode_small(data: &[u8], field: &Field) -> Value {
    if field.is_unsigned() {
        parse_ascii::<u16>(data).map_or_else(|| passthrough(data, field), Value::USmallInt)
    } else {
        parse_ascii::<i16>(data).map_or_else(|| passthrough(data, field), Value::SmallInt)
    }
}

fn decode_int(data: &[u8], field: &Field) -> Value {
    if field.is_unsigned() {
        parse_ascii::<u32>(data).map_or_else(|| passthrough(data, field), Value::UInt)
    } else {
        parse_ascii::<i32>(data).map_or_else(|| passthrough(data, field), Value::Int)
    }
}

fn decode_bigint(data: &[u8], field: &Field) -> Value {
    if field.is_unsigned() {
        parse_ascii::<u64>(data).map_or_else(|| passthrough(data, field), Value::UBigInt)
    } else {
        parse_ascii::<i64>(data).map_or_else(|| passthrough(data, field), Value::BigInt)
    }
}

fn decode_float(data: &[u8], field: &Field) -> Value {
    parse_ascii::<f32>(data).map_or_else(|| passthrough(data, field), Value::Float)
}

fn decode_double(data: &[u8], field: &Field) -> Value {
    parse_ascii::<f64>(data).map_or_else(|| passthrough(data, field), Value::Double)
}

fn decode_decimal(data: &[u8], field: &Field) -> Value {
    match std::str::from_utf8(data) {
        Ok(s) => Value::Decimal(s.to_string()),
        Err(_) => passthrough(data, field),
    }
}

fn decode_json(data: &[u8], field: &Field) -> Value {
    serde_json::from_slice(data).map_or_else(|_| decode_text(data, field), Value::Json)
}
