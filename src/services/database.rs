use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use log::{info, warn};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use sqlx::postgres::{PgConnectOptions, PgConnection, PgRow};
use sqlx::{Column, Connection, Executor, Row, TypeInfo};
use std::time::Instant;
use uuid::Uuid;

use crate::config::DatabaseConfig;
use crate::error::{AppError, Result};
use crate::models::query::{unique_column_names, QueryOutput, QueryResult, Record};
use crate::services::export::to_csv_bytes;
use crate::services::schema::{format_table_line, ColumnInfo};

const TABLES_SQL: &str = "SELECT table_schema::text, table_name::text \
     FROM information_schema.tables \
     WHERE table_type = 'BASE TABLE' AND table_schema NOT IN ('pg_catalog', 'information_schema') \
     ORDER BY table_schema, table_name";

const COLUMNS_SQL: &str = "SELECT column_name::text, data_type::text \
     FROM information_schema.columns \
     WHERE table_schema = $1 AND table_name = $2 \
     ORDER BY ordinal_position \
     LIMIT $3";

const ROW_ESTIMATE_SQL: &str =
    "SELECT reltuples::bigint FROM pg_class WHERE oid = $1::text::regclass";

/// PostgreSQL access. A connection is opened per call and closed before
/// returning; nothing is pooled.
#[derive(Clone, Debug)]
pub struct PostgresService {
    options: PgConnectOptions,
}

impl PostgresService {
    pub fn new(config: &DatabaseConfig) -> Self {
        let mut options = PgConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .database(&config.name)
            .username(&config.user);
        if let Some(password) = &config.password {
            options = options.password(password);
        }
        Self { options }
    }

    async fn connect(&self) -> Result<PgConnection> {
        PgConnection::connect_with(&self.options)
            .await
            .map_err(|e| AppError::Connectivity(format!("Failed to connect to database: {}", e)))
    }

    /// Execute one vetted SELECT and collect every row.
    pub async fn run_select(&self, sql: &str) -> Result<QueryOutput> {
        let mut conn = self.connect().await?;
        let started = Instant::now();

        let fetched = sqlx::query(sql).fetch_all(&mut conn).await;

        // an empty result has no row to read column names from
        let described = match &fetched {
            Ok(rows) if rows.is_empty() => (&mut conn)
                .describe(sql)
                .await
                .map(|d| d.columns().iter().map(|c| c.name().to_string()).collect::<Vec<_>>())
                .ok(),
            _ => None,
        };

        close(conn).await;

        let rows = fetched.map_err(|e| AppError::QueryExecutionFailed(e.to_string()))?;
        let result = match described {
            Some(columns) => QueryResult::new(unique_column_names(columns), Vec::new()),
            None => rows_to_result(&rows),
        };
        info!(
            "📊 Query returned {} rows in {:.2?}",
            result.row_count(),
            started.elapsed()
        );

        let csv_bytes = to_csv_bytes(&result)?;
        Ok(QueryOutput { result, csv_bytes })
    }

    pub async fn summarize_schema(
        &self,
        max_columns_per_table: u32,
        include_row_counts: bool,
    ) -> Result<String> {
        let mut conn = self.connect().await?;
        let summary = summarize_on(&mut conn, max_columns_per_table, include_row_counts).await;
        close(conn).await;
        summary
    }
}

async fn summarize_on(
    conn: &mut PgConnection,
    max_columns_per_table: u32,
    include_row_counts: bool,
) -> Result<String> {
    let introspection = |e: sqlx::Error| {
        AppError::QueryExecutionFailed(format!("Schema introspection failed: {}", e))
    };

    let tables: Vec<(String, String)> = sqlx::query_as::<_, (String, String)>(TABLES_SQL)
        .fetch_all(&mut *conn)
        .await
        .map_err(introspection)?;

    let mut lines = Vec::with_capacity(tables.len());
    for (schema, table) in tables {
        let columns: Vec<(String, String)> = sqlx::query_as::<_, (String, String)>(COLUMNS_SQL)
            .bind(&schema)
            .bind(&table)
            .bind(i64::from(max_columns_per_table))
            .fetch_all(&mut *conn)
            .await
            .map_err(introspection)?;
        let columns: Vec<ColumnInfo> = columns
            .into_iter()
            .map(|(name, data_type)| ColumnInfo::new(name, data_type))
            .collect();

        let approx_rows = if include_row_counts {
            let qualified = format!("{}.{}", quote_ident(&schema), quote_ident(&table));
            match sqlx::query_scalar::<_, i64>(ROW_ESTIMATE_SQL)
                .bind(&qualified)
                .fetch_one(&mut *conn)
                .await
            {
                Ok(n) => Some(n),
                Err(e) => {
                    warn!("⚠️ No row estimate for {}: {}", qualified, e);
                    None
                }
            }
        } else {
            None
        };

        lines.push(format_table_line(&schema, &table, &columns, approx_rows));
    }

    Ok(lines.join("\n"))
}

async fn close(conn: PgConnection) {
    if let Err(e) = conn.close().await {
        warn!("⚠️ Failed to close database connection cleanly: {}", e);
    }
}

fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

fn rows_to_result(rows: &[PgRow]) -> QueryResult {
    let Some(first) = rows.first() else {
        return QueryResult::default();
    };
    let columns = unique_column_names(first.columns().iter().map(|c| c.name()));

    let records = rows
        .iter()
        .map(|row| {
            columns
                .iter()
                .enumerate()
                .map(|(idx, name)| (name.clone(), decode_cell(row, idx)))
                .collect::<Record>()
        })
        .collect();

    QueryResult::new(columns, records)
}

fn decode_cell(row: &PgRow, idx: usize) -> Value {
    let type_name = row.columns()[idx].type_info().name().to_string();
    let decoded: std::result::Result<Value, sqlx::Error> = match type_name.as_str() {
        "BOOL" => row.try_get::<Option<bool>, _>(idx).map(|v| json!(v)),
        "INT2" => row.try_get::<Option<i16>, _>(idx).map(|v| json!(v)),
        "INT4" => row.try_get::<Option<i32>, _>(idx).map(|v| json!(v)),
        "INT8" => row.try_get::<Option<i64>, _>(idx).map(|v| json!(v)),
        "FLOAT4" => row.try_get::<Option<f32>, _>(idx).map(|v| json!(v)),
        "FLOAT8" => row.try_get::<Option<f64>, _>(idx).map(|v| json!(v)),
        "NUMERIC" => row.try_get::<Option<Decimal>, _>(idx).map(text),
        "UUID" => row.try_get::<Option<Uuid>, _>(idx).map(text),
        "DATE" => row.try_get::<Option<NaiveDate>, _>(idx).map(text),
        "TIME" => row.try_get::<Option<NaiveTime>, _>(idx).map(text),
        "TIMESTAMP" => row.try_get::<Option<NaiveDateTime>, _>(idx).map(text),
        "TIMESTAMPTZ" => row
            .try_get::<Option<DateTime<Utc>>, _>(idx)
            .map(|v| v.map(|t| Value::String(t.to_rfc3339())).unwrap_or(Value::Null)),
        "JSON" | "JSONB" => row.try_get::<Option<Value>, _>(idx).map(|v| v.unwrap_or(Value::Null)),
        _ => row.try_get::<Option<String>, _>(idx).map(|v| json!(v)),
    };

    decoded.unwrap_or_else(|e| {
        warn!("⚠️ Column {} of type {} could not be decoded: {}", idx, type_name, e);
        Value::Null
    })
}

fn text<T: ToString>(value: Option<T>) -> Value {
    value.map(|v| Value::String(v.to_string())).unwrap_or(Value::Null)
}
