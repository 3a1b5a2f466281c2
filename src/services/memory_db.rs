use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::error::{AppError, Result};
use crate::models::query::{QueryOutput, QueryResult};
use crate::services::export::to_csv_bytes;
use crate::services::schema::{format_table_line, ColumnInfo};

#[derive(Debug, Clone)]
pub struct MemoryTable {
    pub schema: String,
    pub name: String,
    pub columns: Vec<ColumnInfo>,
    pub approx_rows: Option<i64>,
}

/// In-process stand-in for the database: a fixed table catalog plus canned
/// results looked up by SQL text (whitespace-insensitive).
#[derive(Clone, Debug, Default)]
pub struct MemoryDatabaseService {
    tables: Arc<Mutex<Vec<MemoryTable>>>,
    results: Arc<Mutex<HashMap<String, QueryResult>>>,
    executed: Arc<Mutex<Vec<String>>>,
}

impl MemoryDatabaseService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_table(&self, table: MemoryTable) -> Result<()> {
        let mut tables = self.tables.lock().map_err(|_| lock_error("tables"))?;
        tables.push(table);
        Ok(())
    }

    /// Register the rows returned when `sql` is executed.
    pub fn add_result(&self, sql: &str, result: QueryResult) -> Result<()> {
        let mut results = self.results.lock().map_err(|_| lock_error("results"))?;
        results.insert(normalize(sql), result);
        Ok(())
    }

    /// Every statement passed to [`run_select`](Self::run_select), in order.
    pub fn executed_queries(&self) -> Result<Vec<String>> {
        let executed = self.executed.lock().map_err(|_| lock_error("executed queries"))?;
        Ok(executed.clone())
    }

    pub fn summarize_schema(
        &self,
        max_columns_per_table: u32,
        include_row_counts: bool,
    ) -> Result<String> {
        let tables = self.tables.lock().map_err(|_| lock_error("tables"))?;
        let mut sorted: Vec<&MemoryTable> = tables.iter().collect();
        sorted.sort_by(|a, b| (&a.schema, &a.name).cmp(&(&b.schema, &b.name)));

        let lines: Vec<String> = sorted
            .into_iter()
            .map(|t| {
                let cols: Vec<ColumnInfo> = t
                    .columns
                    .iter()
                    .take(max_columns_per_table as usize)
                    .cloned()
                    .collect();
                let rows = if include_row_counts { t.approx_rows } else { None };
                format_table_line(&t.schema, &t.name, &cols, rows)
            })
            .collect();

        Ok(lines.join("\n"))
    }

    pub fn run_select(&self, sql: &str) -> Result<QueryOutput> {
        self.executed
            .lock()
            .map_err(|_| lock_error("executed queries"))?
            .push(sql.to_string());

        let results = self.results.lock().map_err(|_| lock_error("results"))?;
        let result = results
            .get(&normalize(sql))
            .cloned()
            .ok_or_else(|| {
                AppError::QueryExecutionFailed("query does not match any known result".to_string())
            })?;

        let csv_bytes = to_csv_bytes(&result)
            .map_err(|e| AppError::QueryExecutionFailed(e.to_string()))?;
        Ok(QueryOutput { result, csv_bytes })
    }
}

fn normalize(sql: &str) -> String {
    sql.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn lock_error(what: &str) -> AppError {
    AppError::QueryExecutionFailed(format!("Failed to lock {}", what))
}
