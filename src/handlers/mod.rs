pub mod conversation;
pub mod schema;

use actix_web::http::StatusCode;
use actix_web::{web, HttpResponse};
use log::error;

use crate::error::AppError;
use crate::models::response::ErrorResponse;

pub use conversation::{
    create_conversation, execute_query, export_csv, get_conversation, reset_conversation,
    submit_clarification, submit_request,
};
pub use schema::{get_schema, health, refresh_schema};

/// Route table shared by the server and the handler tests
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/health").route(web::get().to(health)))
        .service(web::resource("/schema").route(web::get().to(get_schema)))
        .service(web::resource("/schema/refresh").route(web::post().to(refresh_schema)))
        .service(web::resource("/conversations").route(web::post().to(create_conversation)))
        .service(web::resource("/conversations/{id}").route(web::get().to(get_conversation)))
        .service(
            web::resource("/conversations/{id}/requests").route(web::post().to(submit_request)),
        )
        .service(
            web::resource("/conversations/{id}/clarifications")
                .route(web::post().to(submit_clarification)),
        )
        .service(
            web::resource("/conversations/{id}/reset").route(web::post().to(reset_conversation)),
        )
        .service(web::resource("/conversations/{id}/execute").route(web::post().to(execute_query)))
        .service(web::resource("/conversations/{id}/export").route(web::post().to(export_csv)));
}

fn status_for(err: &AppError) -> StatusCode {
    match err {
        AppError::Connectivity(_) | AppError::VersionIncompatible { .. } => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        AppError::RequestFailed(_)
        | AppError::MalformedResponse(_)
        | AppError::ResponseUnparseable { .. } => StatusCode::BAD_GATEWAY,
        AppError::GuardrailRejected(_) | AppError::QueryExecutionFailed(_) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        AppError::InvalidState(_) => StatusCode::CONFLICT,
        AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        AppError::NotFound(_) => StatusCode::NOT_FOUND,
        AppError::ConfigurationInvalid(_)
        | AppError::RequestRejected(_)
        | AppError::ExportFailed(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// Render an error the way every endpoint reports failures
pub fn error_response(err: &AppError) -> HttpResponse {
    let status = status_for(err);
    if status.is_server_error() {
        error!("❌ {}", err);
    }
    let raw_response = match err {
        AppError::ResponseUnparseable { raw } => Some(raw.clone()),
        _ => None,
    };
    HttpResponse::build(status).json(ErrorResponse {
        error: err.to_string(),
        status_code: status.as_u16(),
        raw_response,
    })
}
