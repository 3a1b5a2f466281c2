use log::{info, warn};
use serde_json::Value;
use std::sync::Arc;

use crate::error::{AppError, Result};
use crate::models::analysis::AnalysisResult;
use crate::services::llm::ChatMessage;
use crate::services::ChatModel;

const SYSTEM_INSTRUCTIONS: &str = r#"You are a careful SQL assistant for PostgreSQL.
Rules:
- Only reference tables and columns listed in the provided schema.
- Prefer explicit column lists over SELECT *.
- Add WHERE clauses when the request implies a filter.
- Use ISO-8601 dates and literal values, never placeholders.
- Reply with JSON only. No prose, no code fences.

Reply with exactly one of these shapes.

When the request is ambiguous:
{
  "needs_clarification": true,
  "question": "one short clarifying question",
  "reason": "what is ambiguous"
}

When the request can be answered:
{
  "needs_clarification": false,
  "sql": "SELECT ...",
  "explanation": "one short sentence",
  "assumptions": ["any assumptions you made"]
}
"#;

/// Turns a user request plus schema text into an [`AnalysisResult`].
/// It trusts nothing it parses; SQL safety is checked elsewhere.
#[derive(Clone)]
pub struct RequestAnalyzer {
    model: Arc<dyn ChatModel>,
}

impl RequestAnalyzer {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }

    pub async fn analyze(&self, user_request: &str, schema_text: &str) -> Result<AnalysisResult> {
        let messages = build_messages(user_request, schema_text);
        let raw = self.model.chat(&messages).await?;
        let result = parse_completion(&raw)?;
        info!(
            "🧠 Analysis complete: {}",
            if result.needs_clarification() { "clarification needed" } else { "SQL proposed" }
        );
        Ok(result)
    }
}

pub fn build_messages(user_request: &str, schema_text: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(SYSTEM_INSTRUCTIONS),
        ChatMessage::user(build_user_prompt(user_request, schema_text)),
    ]
}

fn build_user_prompt(user_request: &str, schema_text: &str) -> String {
    format!(
        "User request:\n{}\n\n\
         Schema (PostgreSQL):\n{}\n\n\
         Instructions:\n\
         - If the request is unclear, ask exactly one clarifying question.\n\
         - Otherwise write a single safe SELECT statement valid for PostgreSQL.\n\
         - Never reference tables or columns outside the schema.\n\
         - Do not wrap the answer in code fences.\n\
         - Respond with valid JSON only.",
        user_request, schema_text
    )
}

/// Parse the whole completion as JSON, falling back to the span between the
/// first `{` and the last `}`.
pub fn parse_completion(raw: &str) -> Result<AnalysisResult> {
    let value = match serde_json::from_str::<Value>(raw.trim()) {
        Ok(v) => v,
        Err(_) => extract_json_object(raw).ok_or_else(|| {
            warn!("⚠️ Model completion is not JSON ({} chars)", raw.len());
            AppError::ResponseUnparseable { raw: raw.to_string() }
        })?,
    };

    AnalysisResult::from_value(&value).map_err(|why| {
        warn!("⚠️ Model completion has an unexpected shape: {}", why);
        AppError::ResponseUnparseable { raw: raw.to_string() }
    })
}

fn extract_json_object(raw: &str) -> Option<Value> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&raw[start..=end]).ok()
}
