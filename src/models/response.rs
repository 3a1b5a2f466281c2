use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::conversation::{HistoryEntry, Phase};
use crate::models::query::Record;

/// Response for the session creation endpoint
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionCreated {
    pub conversation_id: Uuid,
}

/// The active proposal together with the guardrail's judgement of it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposalView {
    pub sql: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    pub assumptions: Vec<String>,
    pub accepted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocked_reason: Option<String>,
    /// SQL that will run, after limit enforcement
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_sql: Option<String>,
    pub limit_enforced: bool,
}

/// Everything a client needs to render a session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionView {
    pub conversation_id: Uuid,
    pub phase: Phase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clarifying_question: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proposal: Option<ProposalView>,
    pub history: Vec<HistoryEntry>,
}

/// Response for the execute endpoint
#[derive(Debug, Serialize, Deserialize)]
pub struct ExecuteResponse {
    pub conversation_id: Uuid,
    pub sql: String,
    pub limit_enforced: bool,
    pub row_count: usize,
    pub elapsed_ms: u64,
    pub columns: Vec<String>,
    /// Leading rows only; the CSV export carries the full result
    pub rows: Vec<Record>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SchemaResponse {
    pub schema: String,
}

/// Error response for API
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub status_code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<String>,
}
