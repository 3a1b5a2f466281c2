pub mod analyzer;
pub mod conversation;
#[cfg(feature = "postgres")]
pub mod database;
pub mod export;
pub mod guardrail;
pub mod llm;
pub mod memory_db;
pub mod schema;

use crate::error::Result;
use crate::models::query::QueryOutput;
use crate::services::llm::ChatMessage;

// Seams between the conversation logic and its collaborators
#[async_trait::async_trait]
pub trait ChatModel: Send + Sync {
    /// Send one non-streaming completion request and return the raw text.
    async fn chat(&self, messages: &[ChatMessage]) -> Result<String>;
}

#[async_trait::async_trait]
pub trait SchemaSummarizer: Send + Sync {
    /// Plain-text listing of tables and columns, one line per table.
    async fn summarize(
        &self,
        max_columns_per_table: u32,
        include_row_counts: bool,
    ) -> Result<String>;
}

#[async_trait::async_trait]
pub trait QueryExecutor: Send + Sync {
    /// Run vetted SQL. Failures surface as database-layer errors only.
    async fn execute(&self, sql: &str) -> Result<QueryOutput>;
}

#[async_trait::async_trait]
impl ChatModel for llm::ModelClient {
    async fn chat(&self, messages: &[ChatMessage]) -> Result<String> {
        self.chat(messages).await
    }
}

#[cfg(feature = "postgres")]
#[async_trait::async_trait]
impl SchemaSummarizer for database::PostgresService {
    async fn summarize(
        &self,
        max_columns_per_table: u32,
        include_row_counts: bool,
    ) -> Result<String> {
        self.summarize_schema(max_columns_per_table, include_row_counts).await
    }
}

#[cfg(feature = "postgres")]
#[async_trait::async_trait]
impl QueryExecutor for database::PostgresService {
    async fn execute(&self, sql: &str) -> Result<QueryOutput> {
        self.run_select(sql).await
    }
}

#[async_trait::async_trait]
impl SchemaSummarizer for memory_db::MemoryDatabaseService {
    async fn summarize(
        &self,
        max_columns_per_table: u32,
        include_row_counts: bool,
    ) -> Result<String> {
        self.summarize_schema(max_columns_per_table, include_row_counts)
    }
}

#[async_trait::async_trait]
impl QueryExecutor for memory_db::MemoryDatabaseService {
    async fn execute(&self, sql: &str) -> Result<QueryOutput> {
        self.run_select(sql)
    }
}

#[cfg(feature = "postgres")]
pub use database::PostgresService;
pub use llm::ModelClient;
pub use memory_db::MemoryDatabaseService;
