use actix_web::{web, Error, HttpResponse};
use log::info;
use uuid::Uuid;

use crate::handlers::error_response;
use crate::models::request::{AnalyzeRequest, ClarificationRequest, ExecuteRequest, ViewQuery};
use crate::models::response::{ExecuteResponse, SessionCreated};
use crate::services::conversation::ConversationController;

const PREVIEW_ROWS: usize = 100;

/// Start a new, empty session
pub async fn create_conversation(
    controller: web::Data<ConversationController>,
) -> Result<HttpResponse, Error> {
    match controller.create_session() {
        Ok(conversation_id) => Ok(HttpResponse::Created().json(SessionCreated { conversation_id })),
        Err(e) => Ok(error_response(&e)),
    }
}

/// Current question or proposal, with the guardrail verdict and history
pub async fn get_conversation(
    id: web::Path<Uuid>,
    query: web::Query<ViewQuery>,
    controller: web::Data<ConversationController>,
) -> Result<HttpResponse, Error> {
    match controller.view(id.into_inner(), query.limit) {
        Ok(view) => Ok(HttpResponse::Ok().json(view)),
        Err(e) => Ok(error_response(&e)),
    }
}

pub async fn submit_request(
    id: web::Path<Uuid>,
    body: web::Json<AnalyzeRequest>,
    controller: web::Data<ConversationController>,
) -> Result<HttpResponse, Error> {
    let id = id.into_inner();
    info!("📨 [Conversation-{}] Received request", id);

    let result = match controller.submit_request(id, &body.request).await {
        Ok(_) => controller.view(id, None),
        Err(e) => Err(e),
    };
    match result {
        Ok(view) => Ok(HttpResponse::Ok().json(view)),
        Err(e) => Ok(error_response(&e)),
    }
}

pub async fn submit_clarification(
    id: web::Path<Uuid>,
    body: web::Json<ClarificationRequest>,
    controller: web::Data<ConversationController>,
) -> Result<HttpResponse, Error> {
    let id = id.into_inner();
    info!("📨 [Conversation-{}] Received clarification", id);

    let result = match controller.submit_clarification(id, &body.answer).await {
        Ok(_) => controller.view(id, None),
        Err(e) => Err(e),
    };
    match result {
        Ok(view) => Ok(HttpResponse::Ok().json(view)),
        Err(e) => Ok(error_response(&e)),
    }
}

pub async fn reset_conversation(
    id: web::Path<Uuid>,
    controller: web::Data<ConversationController>,
) -> Result<HttpResponse, Error> {
    let id = id.into_inner();
    match controller.reset(id).and_then(|_| controller.view(id, None)) {
        Ok(view) => Ok(HttpResponse::Ok().json(view)),
        Err(e) => Ok(error_response(&e)),
    }
}

/// Run the active proposal and return a preview of the rows
pub async fn execute_query(
    id: web::Path<Uuid>,
    body: Option<web::Json<ExecuteRequest>>,
    controller: web::Data<ConversationController>,
) -> Result<HttpResponse, Error> {
    let id = id.into_inner();
    let limit = body.and_then(|b| b.limit);

    match controller.execute(id, limit).await {
        Ok(outcome) => Ok(HttpResponse::Ok().json(ExecuteResponse {
            conversation_id: id,
            sql: outcome.query.sql,
            limit_enforced: outcome.query.limit_added,
            row_count: outcome.result.row_count(),
            elapsed_ms: outcome.elapsed.as_millis() as u64,
            rows: outcome.result.preview(PREVIEW_ROWS).to_vec(),
            columns: outcome.result.columns,
        })),
        Err(e) => Ok(error_response(&e)),
    }
}

/// Full result of the active proposal as a CSV download. Reuses the last
/// execute when it ran the same SQL.
pub async fn export_csv(
    id: web::Path<Uuid>,
    body: Option<web::Json<ExecuteRequest>>,
    controller: web::Data<ConversationController>,
) -> Result<HttpResponse, Error> {
    let id = id.into_inner();
    let limit = body.and_then(|b| b.limit);

    match controller.export(id, limit).await {
        Ok(csv_bytes) => Ok(HttpResponse::Ok()
            .content_type("text/csv")
            .insert_header(("Content-Disposition", "attachment; filename=\"result.csv\""))
            .body(csv_bytes)),
        Err(e) => Ok(error_response(&e)),
    }
}
