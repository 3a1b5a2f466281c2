use actix_web::{web, Error, HttpResponse};
use serde_json::json;

use crate::handlers::error_response;
use crate::models::response::SchemaResponse;
use crate::services::conversation::ConversationController;

/// The schema summary exactly as the model sees it
pub async fn get_schema(
    controller: web::Data<ConversationController>,
) -> Result<HttpResponse, Error> {
    match controller.schema_text().await {
        Ok(schema) => Ok(HttpResponse::Ok().json(SchemaResponse { schema })),
        Err(e) => Ok(error_response(&e)),
    }
}

pub async fn refresh_schema(
    controller: web::Data<ConversationController>,
) -> Result<HttpResponse, Error> {
    match controller.refresh_schema().await {
        Ok(schema) => Ok(HttpResponse::Ok().json(SchemaResponse { schema })),
        Err(e) => Ok(error_response(&e)),
    }
}

pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(json!({"status": "ok"}))
}
