use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::analysis::AnalysisResult;

/// Where a session stands in the clarification loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Idle,
    AwaitingClarification,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Assistant,
    User,
}

/// What a history record carries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnPayload {
    Question {
        question: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    Proposal {
        sql: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        explanation: Option<String>,
        assumptions: Vec<String>,
    },
    Answer {
        answer: String,
    },
}

/// One entry in the append-only conversation log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: Role,
    pub payload: TurnPayload,
    pub timestamp: DateTime<Utc>,
}

impl HistoryEntry {
    fn assistant(result: AnalysisResult) -> Self {
        let payload = match result {
            AnalysisResult::NeedsClarification { question, reason } => {
                TurnPayload::Question { question, reason }
            }
            AnalysisResult::ProposedQuery { sql, explanation, assumptions } => {
                TurnPayload::Proposal { sql, explanation, assumptions }
            }
        };
        Self {
            role: Role::Assistant,
            payload,
            timestamp: Utc::now(),
        }
    }

    fn user_answer(answer: String) -> Self {
        Self {
            role: Role::User,
            payload: TurnPayload::Answer { answer },
            timestamp: Utc::now(),
        }
    }
}

/// Borrowed view of the proposal currently treated as active
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ActiveProposal<'a> {
    pub sql: &'a str,
    pub explanation: Option<&'a str>,
    pub assumptions: &'a [String],
}

/// Inputs that move a conversation from one state to the next.
/// Analyzer calls happen before the event is built; a failed call produces
/// no event and the state stays as it was.
#[derive(Debug, Clone)]
pub enum ConversationEvent {
    /// A fresh request was analyzed.
    RequestAnalyzed {
        request: String,
        result: AnalysisResult,
    },
    /// An answer to the outstanding question was analyzed together with the
    /// original request.
    ClarificationAnalyzed {
        answer: String,
        result: AnalysisResult,
    },
    Reset,
}

/// State of a single session's clarification loop
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    phase: Phase,
    pending_request: String,
    clarifying_question: String,
    history: Vec<HistoryEntry>,
}

impl ConversationState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn pending_request(&self) -> &str {
        &self.pending_request
    }

    /// The outstanding question, only while awaiting clarification.
    pub fn clarifying_question(&self) -> Option<&str> {
        match self.phase {
            Phase::AwaitingClarification => Some(&self.clarifying_question),
            Phase::Idle => None,
        }
    }

    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    /// The original request annotated with a clarification answer. The model
    /// keeps no memory between calls, so the whole text is resubmitted.
    pub fn merged_request(&self, answer: &str) -> String {
        format!("{}\n\nUser clarification: {}", self.pending_request, answer.trim())
    }

    /// The newest assistant proposal in the history.
    pub fn active_proposal(&self) -> Option<ActiveProposal<'_>> {
        self.history.iter().rev().find_map(|entry| match &entry.payload {
            TurnPayload::Proposal { sql, explanation, assumptions }
                if entry.role == Role::Assistant =>
            {
                Some(ActiveProposal {
                    sql,
                    explanation: explanation.as_deref(),
                    assumptions,
                })
            }
            _ => None,
        })
    }

    /// Pure transition: consume the state and an event, return the next state.
    /// A clarification answer is rejected while no question is outstanding.
    pub fn apply(self, event: ConversationEvent) -> Result<Self, Self> {
        match event {
            ConversationEvent::Reset => Ok(Self::default()),
            ConversationEvent::RequestAnalyzed { request, result } => {
                let mut next = self;
                next.pending_request = request.trim().to_string();
                next.record(result);
                Ok(next)
            }
            ConversationEvent::ClarificationAnalyzed { answer, result } => {
                if self.phase != Phase::AwaitingClarification {
                    return Err(self);
                }
                let mut next = self;
                next.history.push(HistoryEntry::user_answer(answer.trim().to_string()));
                next.record(result);
                Ok(next)
            }
        }
    }

    fn record(&mut self, result: AnalysisResult) {
        match &result {
            AnalysisResult::NeedsClarification { question, .. } => {
                self.phase = Phase::AwaitingClarification;
                self.clarifying_question = question.clone();
            }
            AnalysisResult::ProposedQuery { .. } => {
                self.phase = Phase::Idle;
                self.clarifying_question.clear();
            }
        }
        self.history.push(HistoryEntry::assistant(result));
    }
}
