use serde::{Deserialize, Serialize};

/// A fresh natural-language data request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzeRequest {
    pub request: String,
}

/// Answer to the outstanding clarifying question
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClarificationRequest {
    pub answer: String,
}

/// Run the active proposal. `limit` overrides the configured default row limit.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecuteRequest {
    #[serde(default)]
    pub limit: Option<u32>,
}

/// Query string of the session view; `limit` previews the final SQL with that row limit
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ViewQuery {
    #[serde(default)]
    pub limit: Option<u32>,
}
