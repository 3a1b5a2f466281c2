use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Decision produced by the request analyzer for one model invocation.
///
/// Exactly one of a clarifying question or a candidate SQL statement is
/// present; the constructor in [`AnalysisResult::from_value`] rejects
/// anything else.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnalysisResult {
    NeedsClarification {
        question: String,
        reason: Option<String>,
    },
    ProposedQuery {
        sql: String,
        explanation: Option<String>,
        assumptions: Vec<String>,
    },
}

impl AnalysisResult {
    /// Build a result from the loosely-typed JSON object a model returned.
    /// The error message describes why the shape was not accepted.
    pub fn from_value(value: &Value) -> Result<Self, String> {
        let obj = value
            .as_object()
            .ok_or_else(|| "expected a JSON object".to_string())?;

        let question = non_blank(obj.get("question"));
        let sql = non_blank(obj.get("sql"));

        let flag = match obj.get("needs_clarification") {
            None | Some(Value::Null) => None,
            Some(Value::Bool(b)) => Some(*b),
            Some(other) => {
                return Err(format!("needs_clarification must be a boolean, got {}", other))
            }
        };

        match (question, sql) {
            (Some(_), Some(_)) => Err("response carries both a question and sql".to_string()),
            (None, None) => Err("response carries neither a question nor sql".to_string()),
            (Some(question), None) => {
                if flag == Some(false) {
                    return Err(
                        "needs_clarification is false but only a question was given".to_string()
                    );
                }
                Ok(Self::NeedsClarification {
                    question,
                    reason: non_blank(obj.get("reason")),
                })
            }
            (None, Some(sql)) => {
                if flag == Some(true) {
                    return Err("needs_clarification is true but no question was given".to_string());
                }
                Ok(Self::ProposedQuery {
                    sql,
                    explanation: non_blank(obj.get("explanation")),
                    assumptions: string_list(obj.get("assumptions")),
                })
            }
        }
    }

    pub fn needs_clarification(&self) -> bool {
        matches!(self, Self::NeedsClarification { .. })
    }

    pub fn question(&self) -> Option<&str> {
        match self {
            Self::NeedsClarification { question, .. } => Some(question),
            Self::ProposedQuery { .. } => None,
        }
    }

    pub fn sql(&self) -> Option<&str> {
        match self {
            Self::ProposedQuery { sql, .. } => Some(sql),
            Self::NeedsClarification { .. } => None,
        }
    }
}

fn non_blank(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s.trim().to_string()],
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_clarification_shape() {
        let v = json!({
            "needs_clarification": true,
            "question": "Which date range do you mean by last month?",
            "reason": "ambiguous period"
        });
        let result = AnalysisResult::from_value(&v).unwrap();
        assert!(result.needs_clarification());
        assert_eq!(result.question(), Some("Which date range do you mean by last month?"));
        assert_eq!(result.sql(), None);
    }

    #[test]
    fn test_proposal_shape() {
        let v = json!({
            "needs_clarification": false,
            "sql": "SELECT id FROM customers",
            "explanation": "lists customers",
            "assumptions": ["customers table holds all customers"]
        });
        match AnalysisResult::from_value(&v).unwrap() {
            AnalysisResult::ProposedQuery { sql, explanation, assumptions } => {
                assert_eq!(sql, "SELECT id FROM customers");
                assert_eq!(explanation.as_deref(), Some("lists customers"));
                assert_eq!(assumptions.len(), 1);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_both_and_neither_are_rejected() {
        let both = json!({"question": "Which year?", "sql": "SELECT 1"});
        assert!(AnalysisResult::from_value(&both).is_err());

        let neither = json!({"needs_clarification": false, "explanation": "nothing"});
        assert!(AnalysisResult::from_value(&neither).is_err());

        let blank = json!({"needs_clarification": true, "question": "   "});
        assert!(AnalysisResult::from_value(&blank).is_err());
    }

    #[test]
    fn test_flag_must_agree_with_fields() {
        let v = json!({"needs_clarification": true, "sql": "SELECT 1"});
        assert!(AnalysisResult::from_value(&v).is_err());
        let v = json!({"needs_clarification": false, "question": "Which table?"});
        assert!(AnalysisResult::from_value(&v).is_err());
        let v = json!({"needs_clarification": "no", "sql": "SELECT 1"});
        assert!(AnalysisResult::from_value(&v).is_err());
    }

    #[test]
    fn test_missing_flag_is_inferred() {
        let v = json!({"sql": "SELECT 1"});
        assert_eq!(AnalysisResult::from_value(&v).unwrap().sql(), Some("SELECT 1"));
    }

    #[test]
    fn test_loose_assumptions() {
        let v = json!({"sql": "SELECT 1", "assumptions": "one table"});
        match AnalysisResult::from_value(&v).unwrap() {
            AnalysisResult::ProposedQuery { assumptions, .. } => {
                assert_eq!(assumptions, vec!["one table"])
            }
            other => panic!("unexpected result: {:?}", other),
        }
        let v = json!({"sql": "SELECT 1", "assumptions": null});
        match AnalysisResult::from_value(&v).unwrap() {
            AnalysisResult::ProposedQuery { assumptions, .. } => assert!(assumptions.is_empty()),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_non_object_is_rejected() {
        assert!(AnalysisResult::from_value(&json!(["SELECT 1"])).is_err());
    }
}
