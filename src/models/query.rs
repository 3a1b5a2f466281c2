use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One result row, keyed by column name in select-list order.
pub type Record = Map<String, Value>;

/// Tabular result of a vetted query
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Record>,
}

impl QueryResult {
    pub fn new(columns: Vec<String>, rows: Vec<Record>) -> Self {
        Self { columns, rows }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// At most `n` leading rows.
    pub fn preview(&self, n: usize) -> &[Record] {
        &self.rows[..self.rows.len().min(n)]
    }
}

/// Make column names unique so records keep every column: repeats get a
/// `_2`, `_3`, ... suffix.
pub fn unique_column_names<I, S>(names: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut out: Vec<String> = Vec::new();
    for name in names {
        let name = name.into();
        let mut candidate = name.clone();
        let mut n = 1;
        while out.contains(&candidate) {
            n += 1;
            candidate = format!("{}_{}", name, n);
        }
        out.push(candidate);
    }
    out
}

/// What the executor hands back: the rows plus their CSV export.
#[derive(Debug, Clone)]
pub struct QueryOutput {
    pub result: QueryResult,
    pub csv_bytes: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unique_column_names() {
        assert_eq!(
            unique_column_names(["id", "name", "id", "id"]),
            vec!["id", "name", "id_2", "id_3"]
        );
    }

    #[test]
    fn test_preview_is_bounded() {
        let rows: Vec<Record> = (0..5)
            .map(|i| [("n".to_string(), json!(i))].into_iter().collect())
            .collect();
        let result = QueryResult::new(vec!["n".to_string()], rows);
        assert_eq!(result.preview(3).len(), 3);
        assert_eq!(result.preview(100).len(), 5);
        assert_eq!(result.row_count(), 5);
    }
}
