use polars::prelude::*;
use serde_json::Value;

use crate::error::{AppError, Result};
use crate::models::query::QueryResult;

/// Serialize a result to CSV with a header row. Cells are written as text;
/// SQL NULL becomes an empty field.
pub fn to_csv_bytes(result: &QueryResult) -> Result<Vec<u8>> {
    let series: Vec<Series> = result
        .columns
        .iter()
        .map(|name| {
            let values: Vec<Option<String>> = result
                .rows
                .iter()
                .map(|row| cell_text(row.get(name)))
                .collect();
            Series::new(name, values)
        })
        .collect();

    let mut df = DataFrame::new(series)
        .map_err(|e| AppError::ExportFailed(format!("Failed to build result frame: {}", e)))?;

    let mut buf = Vec::new();
    CsvWriter::new(&mut buf)
        .has_header(true)
        .finish(&mut df)
        .map_err(|e| AppError::ExportFailed(format!("Failed to write CSV: {}", e)))?;

    Ok(buf)
}

fn cell_text(value: Option<&Value>) -> Option<String> {
    match value {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(other) => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::query::Record;
    use serde_json::json;

    fn record(pairs: &[(&str, Value)]) -> Record {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn test_csv_has_header_and_rows_in_column_order() {
        let result = QueryResult::new(
            vec!["name".to_string(), "id".to_string()],
            vec![
                record(&[("name", json!("alice")), ("id", json!(1))]),
                record(&[("name", json!("bob")), ("id", json!(2))]),
            ],
        );
        let csv = String::from_utf8(to_csv_bytes(&result).unwrap()).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines, vec!["name,id", "alice,1", "bob,2"]);
    }

    #[test]
    fn test_nulls_become_empty_fields() {
        let result = QueryResult::new(
            vec!["a".to_string(), "b".to_string()],
            vec![record(&[("a", Value::Null), ("b", json!(true))])],
        );
        let csv = String::from_utf8(to_csv_bytes(&result).unwrap()).unwrap();
        assert_eq!(csv.lines().nth(1), Some(",true"));
    }

    #[test]
    fn test_empty_result_keeps_header() {
        let result = QueryResult::new(vec!["id".to_string()], vec![]);
        let csv = String::from_utf8(to_csv_bytes(&result).unwrap()).unwrap();
        assert_eq!(csv.trim_end(), "id");
    }
}
