use log::info;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::Result;
use crate::services::SchemaSummarizer;

/// Column name and data type as reported by introspection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
}

impl ColumnInfo {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
        }
    }
}

/// Render one table line of the schema summary:
/// `schema.table [~N rows]: col:type, col:type`.
pub fn format_table_line(
    schema: &str,
    table: &str,
    columns: &[ColumnInfo],
    approx_rows: Option<i64>,
) -> String {
    let cols = if columns.is_empty() {
        "(no columns?)".to_string()
    } else {
        columns
            .iter()
            .map(|c| format!("{}:{}", c.name, c.data_type))
            .collect::<Vec<_>>()
            .join(", ")
    };

    match approx_rows {
        Some(n) => format!("{}.{} [~{} rows]: {}", schema, table, n, cols),
        None => format!("{}.{}: {}", schema, table, cols),
    }
}

/// Holds the schema summary once loaded so each analysis does not
/// re-introspect the database. `refresh` drops and reloads it.
#[derive(Clone)]
pub struct SchemaCache {
    summarizer: Arc<dyn SchemaSummarizer>,
    max_columns_per_table: u32,
    include_row_counts: bool,
    text: Arc<RwLock<Option<String>>>,
}

impl SchemaCache {
    pub fn new(
        summarizer: Arc<dyn SchemaSummarizer>,
        max_columns_per_table: u32,
        include_row_counts: bool,
    ) -> Self {
        Self {
            summarizer,
            max_columns_per_table,
            include_row_counts,
            text: Arc::new(RwLock::new(None)),
        }
    }

    pub async fn get(&self) -> Result<String> {
        if let Some(text) = self.text.read().await.as_ref() {
            return Ok(text.clone());
        }
        self.load().await
    }

    pub async fn refresh(&self) -> Result<String> {
        info!("🔄 Refreshing schema summary");
        self.text.write().await.take();
        self.load().await
    }

    async fn load(&self) -> Result<String> {
        let text = self
            .summarizer
            .summarize(self.max_columns_per_table, self.include_row_counts)
            .await?;
        info!("📚 Loaded schema summary ({} tables)", text.lines().count());
        *self.text.write().await = Some(text.clone());
        Ok(text)
    }
}
