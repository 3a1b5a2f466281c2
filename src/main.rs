mod config;
mod error;
mod handlers;
mod models;
mod services;

use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use anyhow::Context;
use std::sync::Arc;

use config::Config;
use services::analyzer::RequestAnalyzer;
use services::conversation::ConversationController;
use services::guardrail::SqlGuardrail;
use services::schema::SchemaCache;
use services::{ModelClient, QueryExecutor, SchemaSummarizer};

#[cfg(feature = "postgres")]
fn backing_database(config: &Config) -> (Arc<dyn SchemaSummarizer>, Arc<dyn QueryExecutor>) {
    log::info!(
        "🐘 Using PostgreSQL at {}:{}/{}",
        config.database.host,
        config.database.port,
        config.database.name
    );
    let db = Arc::new(services::PostgresService::new(&config.database));
    (db.clone(), db)
}

#[cfg(not(feature = "postgres"))]
fn backing_database(_config: &Config) -> (Arc<dyn SchemaSummarizer>, Arc<dyn QueryExecutor>) {
    log::warn!("💾 Built without the postgres feature, using an empty in-memory database");
    let db = Arc::new(services::MemoryDatabaseService::new());
    (db.clone(), db)
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("🚀 Starting SQL Copilot API");

    let config = Config::from_env().context("invalid configuration")?;

    let model = ModelClient::connect(&config.model)
        .await
        .context("model server is not usable")?;
    log::info!("🤖 Connected to model server, using model {}", model.model());

    let (summarizer, executor) = backing_database(&config);
    let schema = SchemaCache::new(
        summarizer,
        config.schema_max_columns,
        config.schema_include_row_counts,
    );
    let guardrail = SqlGuardrail::new().context("failed to build SQL guardrail")?;
    let analyzer = RequestAnalyzer::new(Arc::new(model));
    let controller = ConversationController::new(
        analyzer,
        schema,
        guardrail,
        executor,
        config.default_row_limit,
    );

    let bind_addr = format!("{}:{}", config.server_host, config.server_port);
    log::info!("🌐 Starting server at http://{}", bind_addr);

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header();
        App::new()
            .wrap(Logger::default())
            .wrap(cors)
            .app_data(web::Data::new(controller.clone()))
            .configure(handlers::configure)
    })
    .bind(&bind_addr)
    .map_err(|e| {
        log::error!("❌ Failed to bind to {}: {}", bind_addr, e);
        e
    })?
    .run()
    .await?;

    Ok(())
}
