//! Buffered and streaming result sets.
//!
//! A query that returns rows produces one of two result variants:
//!
//! - [`BufferedResult`] (`store_result`) owns every row, knows its row count
//!   up front and supports seeking.
//! - [`StreamingResult`] (`use_result`) reads one row per fetch directly off
//!   the wire. It borrows the connection exclusively; the row count is
//!   unknown until the stream is exhausted and seeking is unsupported.
//!   Dropping it drains the remaining rows so the connection is usable
//!   again.
//!
//! Both implement [`ResultSet`]. Rows are shaped at fetch time: tuples, or
//! dictionaries keyed by column name with a `table.column` tie-break for
//! duplicated names.

use std::sync::Arc;

use mysqlc_core::{ColumnInfo, Error, Result, Row, Value};

use crate::connection::Connection;
use crate::convert::ConvertFn;
use crate::field::Field;
use crate::protocol::PacketReader;
use crate::protocol::reader::NULL_MARKER;

/// A raw text-protocol row: one optional byte string per column.
pub(crate) type RawRow = Vec<Option<Vec<u8>>>;

/// Row shape selector for `fetch_rows`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RowMode {
    /// Positional access; keys are the bare column names.
    #[default]
    Tuple,
    /// Keyed by column name. The first column with a given name keeps the
    /// bare name; later duplicates get `table.column` keys.
    Dict,
    /// Every column keyed `table.column` (bare name when the table name is
    /// empty, e.g. for computed expressions).
    DictQualified,
}

impl RowMode {
    const COUNT: usize = 3;

    const fn index(self) -> usize {
        match self {
            RowMode::Tuple => 0,
            RowMode::Dict => 1,
            RowMode::DictQualified => 2,
        }
    }
}

/// Compute the row keys for a shape.
fn shape_keys(fields: &[Field], mode: RowMode) -> Vec<String> {
    match mode {
        RowMode::Tuple => fields.iter().map(|f| f.name.clone()).collect(),
        RowMode::Dict => {
            let mut seen = std::collections::HashSet::new();
            fields
                .iter()
                .map(|f| {
                    if seen.insert(f.name.clone()) {
                        f.name.clone()
                    } else {
                        format!("{}.{}", f.table, f.name)
                    }
                })
                .collect()
        }
        RowMode::DictQualified => fields
            .iter()
            .map(|f| {
                if f.table.is_empty() {
                    f.name.clone()
                } else {
                    format!("{}.{}", f.table, f.name)
                }
            })
            .collect(),
    }
}

/// Lazily-built, shared key sets, one slot per shape.
#[derive(Debug, Default)]
struct ShapeCache {
    slots: [Option<Arc<ColumnInfo>>; RowMode::COUNT],
}

impl ShapeCache {
    fn get(&mut self, fields: &[Field], mode: RowMode) -> Arc<ColumnInfo> {
        self.slots[mode.index()]
            .get_or_insert_with(|| Arc::new(ColumnInfo::new(shape_keys(fields, mode))))
            .clone()
    }
}

/// Parse a text-protocol row packet into raw cells.
///
/// Each cell is a length-encoded byte string, or the 0xFB marker for NULL.
pub(crate) fn parse_text_row(payload: &[u8], nfields: usize) -> Option<RawRow> {
    let mut r = PacketReader::new(payload);
    let mut cells = Vec::with_capacity(nfields);
    for _ in 0..nfields {
        if r.peek() == Some(NULL_MARKER) {
            r.skip(1);
            cells.push(None);
        } else {
            cells.push(Some(r.read_lenenc_bytes()?.to_vec()));
        }
    }
    Some(cells)
}

/// Convert one raw row through the bound converters.
fn convert_row(
    fields: &[Field],
    converters: &[ConvertFn],
    raw: &RawRow,
    columns: Arc<ColumnInfo>,
) -> Row {
    let values: Vec<Value> = raw
        .iter()
        .zip(fields.iter().zip(converters.iter()))
        .map(|(cell, (field, convert))| match cell {
            None => Value::Null,
            Some(bytes) => convert(bytes, field),
        })
        .collect();
    Row::with_columns(columns, values)
}

/// Operations common to both result variants.
pub trait ResultSet {
    /// The field descriptors, in column order.
    fn fields(&self) -> &[Field];

    /// Number of columns.
    fn num_fields(&self) -> usize {
        self.fields().len()
    }

    /// Total row count. `None` while a streaming result is not yet
    /// exhausted.
    fn num_rows(&self) -> Option<u64>;

    /// Fetch up to `maxrows` rows in the given shape; 0 means all remaining.
    fn fetch_rows(&mut self, maxrows: usize, mode: RowMode) -> Result<Vec<Row>>;

    /// Seek to an absolute row index. Buffered results only.
    fn data_seek(&mut self, index: u64) -> Result<()>;

    /// Seek relative to the current position, returning the previous
    /// position. Buffered results only.
    fn row_seek(&mut self, offset: i64) -> Result<u64>;

    /// The index of the next row `fetch_rows` would return. Buffered
    /// results only.
    fn row_tell(&self) -> Result<u64>;

    /// Discard all remaining rows.
    fn drain(&mut self) -> Result<()>;
}

fn seek_unsupported() -> Error {
    Error::not_supported("seeking cannot be used with a streaming result")
}

/// A fully materialized result set.
#[derive(Debug)]
pub struct BufferedResult {
    fields: Vec<Field>,
    converters: Vec<ConvertFn>,
    rows: Vec<RawRow>,
    cursor: usize,
    shapes: ShapeCache,
}

impl BufferedResult {
    pub(crate) fn new(fields: Vec<Field>, converters: Vec<ConvertFn>, rows: Vec<RawRow>) -> Self {
        Self {
            fields,
            converters,
            rows,
            cursor: 0,
            shapes: ShapeCache::default(),
        }
    }
}

impl ResultSet for BufferedResult {
    fn fields(&self) -> &[Field] {
        &self.fields
    }

    fn num_rows(&self) -> Option<u64> {
        Some(self.rows.len() as u64)
    }

    fn fetch_rows(&mut self, maxrows: usize, mode: RowMode) -> Result<Vec<Row>> {
        let end = if maxrows == 0 {
            self.rows.len()
        } else {
            self.rows.len().min(self.cursor + maxrows)
        };
        let columns = self.shapes.get(&self.fields, mode);
        let out = self.rows[self.cursor..end]
            .iter()
            .map(|raw| convert_row(&self.fields, &self.converters, raw, columns.clone()))
            .collect();
        self.cursor = end;
        Ok(out)
    }

    fn data_seek(&mut self, index: u64) -> Result<()> {
        if index > self.rows.len() as u64 {
            return Err(Error::programming(format!(
                "data_seek({index}) is past the end of a {}-row result",
                self.rows.len()
            )));
        }
        // The bound check above keeps the cast in range.
        #[allow(clippy::cast_possible_truncation)]
        {
            self.cursor = index as usize;
        }
        Ok(())
    }

    fn row_seek(&mut self, offset: i64) -> Result<u64> {
        let previous = self.cursor as u64;
        #[allow(clippy::cast_possible_truncation)]
        let target = self.cursor as i64 + offset;
        if target < 0 || target > self.rows.len() as i64 {
            return Err(Error::programming(format!(
                "row_seek({offset}) from row {previous} leaves the result bounds"
            )));
        }
        #[allow(clippy::cast_possible_truncation)]
        {
            self.cursor = target as usize;
        }
        Ok(previous)
    }

    fn row_tell(&self) -> Result<u64> {
        Ok(self.cursor as u64)
    }

    fn drain(&mut self) -> Result<()> {
        self.cursor = self.rows.len();
        Ok(())
    }
}

/// A result set whose rows are read from the server on demand.
///
/// Holds the connection exclusively until dropped; the drop drains any
/// unfetched rows off the wire.
#[derive(Debug)]
pub struct StreamingResult<'a> {
    conn: &'a mut Connection,
    fields: Vec<Field>,
    converters: Vec<ConvertFn>,
    rows_seen: u64,
    exhausted: bool,
    shapes: ShapeCache,
}

impl<'a> StreamingResult<'a> {
    pub(crate) fn new(
        conn: &'a mut Connection,
        fields: Vec<Field>,
        converters: Vec<ConvertFn>,
    ) -> Self {
        Self {
            conn,
            fields,
            converters,
            rows_seen: 0,
            exhausted: false,
            shapes: ShapeCache::default(),
        }
    }

    fn next_raw(&mut self) -> Result<Option<RawRow>> {
        if self.exhausted {
            return Ok(None);
        }
        match self.conn.stream_fetch_raw(self.fields.len()) {
            Ok(Some(raw)) => {
                self.rows_seen += 1;
                Ok(Some(raw))
            }
            Ok(None) => {
                self.exhausted = true;
                Ok(None)
            }
            Err(e) => {
                self.exhausted = true;
                Err(e)
            }
        }
    }
}

impl ResultSet for StreamingResult<'_> {
    fn fields(&self) -> &[Field] {
        &self.fields
    }

    fn num_rows(&self) -> Option<u64> {
        self.exhausted.then_some(self.rows_seen)
    }

    fn fetch_rows(&mut self, maxrows: usize, mode: RowMode) -> Result<Vec<Row>> {
        let columns = self.shapes.get(&self.fields, mode);
        let mut out = Vec::new();
        while maxrows == 0 || out.len() < maxrows {
            match self.next_raw()? {
                Some(raw) => {
                    out.push(convert_row(&self.fields, &self.converters, &raw, columns.clone()));
                }
                None => break,
            }
        }
        Ok(out)
    }

    fn data_seek(&mut self, _index: u64) -> Result<()> {
        Err(seek_unsupported())
    }

    fn row_seek(&mut self, _offset: i64) -> Result<u64> {
        Err(seek_unsupported())
    }

    fn row_tell(&self) -> Result<u64> {
        Err(seek_unsupported())
    }

    fn drain(&mut self) -> Result<()> {
        while self.next_raw()?.is_some() {}
        Ok(())
    }
}

impl Drop for StreamingResult<'_> {
    fn drop(&mut self) {
        // The server requires the stream to be drained before the
        // connection can issue another command.
        while let Ok(Some(_)) = self.next_raw() {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::ConverterTable;
    use crate::field::{Field, FieldType, flags};
    use crate::protocol::PacketWriter;

    fn field(table: &str, name: &str, field_type: FieldType, field_flags: u16) -> Field {
        Field {
            catalog: "def".to_string(),
            schema: "test".to_string(),
            table: table.to_string(),
            org_table: table.to_string(),
            name: name.to_string(),
            org_name: name.to_string(),
            charset: 45,
            length: 11,
            max_length: 0,
            field_type,
            flags: field_flags,
            decimals: 0,
        }
    }

    fn buffered(fields: Vec<Field>, rows: Vec<RawRow>) -> BufferedResult {
        let table = ConverterTable::default();
        let converters = fields.iter().map(|f| table.resolve(f)).collect();
        BufferedResult::new(fields, converters, rows)
    }

    fn int_rows(values: &[i32]) -> Vec<RawRow> {
        values
            .iter()
            .map(|v| vec![Some(v.to_string().into_bytes())])
            .collect()
    }

    #[test]
    fn fetch_all_preserves_order() {
        let mut result = buffered(
            vec![field("t", "n", FieldType::Long, 0)],
            int_rows(&[10, 20, 30]),
        );
        assert_eq!(result.num_rows(), Some(3));
        assert_eq!(result.num_fields(), 1);

        let rows = result.fetch_rows(0, RowMode::Tuple).unwrap();
        let values: Vec<_> = rows.iter().map(|r| r[0].clone()).collect();
        assert_eq!(values, vec![Value::Int(10), Value::Int(20), Value::Int(30)]);

        // Exhausted now.
        assert!(result.fetch_rows(0, RowMode::Tuple).unwrap().is_empty());
    }

    #[test]
    fn fetch_in_batches() {
        let mut result = buffered(
            vec![field("t", "n", FieldType::Long, 0)],
            int_rows(&[1, 2, 3, 4, 5]),
        );
        assert_eq!(result.fetch_rows(2, RowMode::Tuple).unwrap().len(), 2);
        assert_eq!(result.row_tell().unwrap(), 2);
        assert_eq!(result.fetch_rows(10, RowMode::Tuple).unwrap().len(), 3);
        assert_eq!(result.row_tell().unwrap(), 5);
    }

    #[test]
    fn data_seek_matches_direct_iteration() {
        let values = [7, 14, 21, 28];
        let mut result = buffered(
            vec![field("t", "n", FieldType::Long, 0)],
            int_rows(&values),
        );
        let all = result.fetch_rows(0, RowMode::Tuple).unwrap();

        for (k, expected) in all.iter().enumerate() {
            result.data_seek(k as u64).unwrap();
            let got = result.fetch_rows(1, RowMode::Tuple).unwrap();
            assert_eq!(got[0].values(), expected.values(), "row {k}");
        }
    }

    #[test]
    fn data_seek_past_end_fails() {
        let mut result = buffered(vec![field("t", "n", FieldType::Long, 0)], int_rows(&[1]));
        assert!(result.data_seek(2).unwrap_err().is_programming());
        // Seeking to the end itself is allowed.
        result.data_seek(1).unwrap();
        assert!(result.fetch_rows(0, RowMode::Tuple).unwrap().is_empty());
    }

    #[test]
    fn row_seek_is_relative_and_returns_previous() {
        let mut result = buffered(
            vec![field("t", "n", FieldType::Long, 0)],
            int_rows(&[1, 2, 3]),
        );
        result.fetch_rows(2, RowMode::Tuple).unwrap();
        assert_eq!(result.row_seek(-2).unwrap(), 2);
        assert_eq!(result.row_tell().unwrap(), 0);
        assert!(result.row_seek(-1).is_err());
        assert!(result.row_seek(4).is_err());
    }

    #[test]
    fn dict_shape_disambiguates_duplicate_names() {
        let fields = vec![
            field("a", "id", FieldType::Long, 0),
            field("b", "id", FieldType::Long, 0),
        ];
        let rows = vec![vec![
            Some(b"1".to_vec()),
            Some(b"2".to_vec()),
        ]];
        let mut result = buffered(fields, rows);

        let dict = &result.fetch_rows(1, RowMode::Dict).unwrap()[0];
        assert_eq!(dict.get("id"), Some(&Value::Int(1)));
        assert_eq!(dict.get("b.id"), Some(&Value::Int(2)));
        assert_eq!(dict.get("a.id"), None);

        result.data_seek(0).unwrap();
        let qualified = &result.fetch_rows(1, RowMode::DictQualified).unwrap()[0];
        assert_eq!(qualified.get("a.id"), Some(&Value::Int(1)));
        assert_eq!(qualified.get("b.id"), Some(&Value::Int(2)));
        assert_eq!(qualified.get("id"), None);
    }

    #[test]
    fn qualified_shape_uses_bare_name_for_expressions() {
        // SELECT 1 produces a column with an empty table name.
        let fields = vec![field("", "1", FieldType::LongLong, flags::NOT_NULL)];
        let rows = vec![vec![Some(b"1".to_vec())]];
        let mut result = buffered(fields, rows);
        let row = &result.fetch_rows(1, RowMode::DictQualified).unwrap()[0];
        assert_eq!(row.get("1"), Some(&Value::BigInt(1)));
    }

    #[test]
    fn null_cells_skip_converters() {
        let fields = vec![field("t", "n", FieldType::Long, 0)];
        let rows = vec![vec![None]];
        let mut result = buffered(fields, rows);
        let row = &result.fetch_rows(1, RowMode::Tuple).unwrap()[0];
        assert_eq!(row[0], Value::Null);
    }

    #[test]
    fn text_row_parsing() {
        let mut w = PacketWriter::new();
        w.write_lenenc_bytes(b"42");
        w.write_u8(0xFB); // NULL
        w.write_lenenc_bytes(b"x");
        let cells = parse_text_row(w.as_bytes(), 3).unwrap();
        assert_eq!(
            cells,
            vec![Some(b"42".to_vec()), None, Some(b"x".to_vec())]
        );

        // Truncated row fails.
        assert!(parse_text_row(&[0x05, b'a'], 1).is_none());
    }
}
