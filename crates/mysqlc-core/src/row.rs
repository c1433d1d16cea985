//! Database row representation.

use crate::value::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Column key metadata shared across all rows in a result set.
///
/// Wrapped in `Arc` so every row fetched from the same result (with the same
/// row shape) shares one copy of the key vector and lookup map.
#[derive(Debug, Clone)]
pub struct ColumnInfo {
    /// Column keys in order. Depending on the row shape these are bare
    /// column names or `table.column` qualified keys.
    keys: Vec<String>,
    /// Key -> index mapping for O(1) lookup. For duplicate keys the first
    /// column wins.
    key_to_index: HashMap<String, usize>,
}

impl ColumnInfo {
    /// Create new column info from a list of keys.
    pub fn new(keys: Vec<String>) -> Self {
        let mut key_to_index = HashMap::with_capacity(keys.len());
        for (i, key) in keys.iter().enumerate() {
            key_to_index.entry(key.clone()).or_insert(i);
        }
        Self { keys, key_to_index }
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Check if there are no columns.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Index of a column by key.
    pub fn index_of(&self, key: &str) -> Option<usize> {
        self.key_to_index.get(key).copied()
    }

    /// Key of a column by index.
    pub fn key_at(&self, index: usize) -> Option<&str> {
        self.keys.get(index).map(String::as_str)
    }

    /// Check if a column key exists.
    pub fn contains(&self, key: &str) -> bool {
        self.key_to_index.contains_key(key)
    }

    /// All column keys.
    pub fn keys(&self) -> &[String] {
        &self.keys
    }
}

/// A single row returned from a query.
///
/// Rows provide both index-based and key-based access to column values.
#[derive(Debug, Clone)]
pub struct Row {
    /// Column values in order
    values: Vec<Value>,
    /// Shared column metadata
    columns: Arc<ColumnInfo>,
}

impl Row {
    /// Create a new row with the given column keys and values.
    ///
    /// For multiple rows from the same result set, prefer `with_columns` to
    /// share the column metadata.
    pub fn new(keys: Vec<String>, values: Vec<Value>) -> Self {
        Self {
            values,
            columns: Arc::new(ColumnInfo::new(keys)),
        }
    }

    /// Create a new row with shared column metadata.
    pub fn with_columns(columns: Arc<ColumnInfo>, values: Vec<Value>) -> Self {
        Self { values, columns }
    }

    /// The shared column metadata.
    pub fn column_info(&self) -> Arc<ColumnInfo> {
        Arc::clone(&self.columns)
    }

    /// Number of columns in this row.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if the row has no columns.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value at a column index.
    pub fn get_index(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Value for a column key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.columns.index_of(key).and_then(|i| self.values.get(i))
    }

    /// All values, in column order.
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Consume the row and return its values.
    pub fn into_values(self) -> Vec<Value> {
        self.values
    }
}

impl std::ops::Index<usize> for Row {
    type Output = Value;

    fn index(&self, index: usize) -> &Value {
        &self.values[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_row() -> Row {
        Row::new(
            vec!["id".to_string(), "name".to_string()],
            vec![Value::Int(7), Value::Text("alice".to_string())],
        )
    }

    #[test]
    fn access_by_index_and_key() {
        let row = sample_row();
        assert_eq!(row.len(), 2);
        assert_eq!(row.get_index(0), Some(&Value::Int(7)));
        assert_eq!(row.get("name"), Some(&Value::Text("alice".to_string())));
        assert_eq!(row.get("missing"), None);
        assert_eq!(row[1], Value::Text("alice".to_string()));
    }

    #[test]
    fn duplicate_keys_first_wins() {
        let info = ColumnInfo::new(vec!["id".to_string(), "id".to_string()]);
        assert_eq!(info.index_of("id"), Some(0));
        assert_eq!(info.len(), 2);
    }

    #[test]
    fn shared_column_info() {
        let row = sample_row();
        let info = row.column_info();
        let other = Row::with_columns(
            Arc::clone(&info),
            vec![Value::Int(8), Value::Text("bob".to_string())],
        );
        assert_eq!(other.get("id"), Some(&Value::Int(8)));
        assert_eq!(info.keys(), &["id".to_string(), "name".to_string()]);
    }
}
