use log::{error, info, warn};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::config::check_row_limit;
use crate::error::{AppError, Result};
use crate::models::conversation::{ConversationEvent, ConversationState, Phase};
use crate::models::query::QueryResult;
use crate::models::response::{ProposalView, SessionView};
use crate::services::analyzer::RequestAnalyzer;
use crate::services::guardrail::{SafeQuery, SqlGuardrail};
use crate::services::schema::SchemaCache;
use crate::services::QueryExecutor;

/// Result of running the active proposal
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    pub query: SafeQuery,
    pub result: QueryResult,
    pub csv_bytes: Vec<u8>,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, Default)]
struct SessionEntry {
    state: ConversationState,
    /// Bumped on every write so slow actions can detect they were overtaken
    generation: u64,
    last_run: Option<ExecutionOutcome>,
}

/// In-memory store for conversation states, one per session id
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    sessions: Arc<Mutex<HashMap<Uuid, SessionEntry>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self) -> Result<Uuid> {
        let id = Uuid::new_v4();
        self.store(id, ConversationState::new())?;
        Ok(id)
    }

    /// Replace the state unconditionally and return the new generation.
    pub fn store(&self, id: Uuid, state: ConversationState) -> Result<u64> {
        let mut sessions = self.sessions.lock().map_err(|_| lock_error())?;
        let entry = sessions.entry(id).or_default();
        entry.state = state;
        entry.generation += 1;
        entry.last_run = None;
        Ok(entry.generation)
    }

    /// Replace the state only if nothing was written since `generation` was
    /// read. Returns false when the write was refused.
    pub fn store_if_current(
        &self,
        id: Uuid,
        generation: u64,
        state: ConversationState,
    ) -> Result<bool> {
        let mut sessions = self.sessions.lock().map_err(|_| lock_error())?;
        match sessions.get_mut(&id) {
            Some(entry) if entry.generation == generation => {
                entry.state = state;
                entry.generation += 1;
                entry.last_run = None;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    pub fn get(&self, id: Uuid) -> Result<Option<(ConversationState, u64)>> {
        let sessions = self.sessions.lock().map_err(|_| lock_error())?;
        Ok(sessions.get(&id).map(|e| (e.state.clone(), e.generation)))
    }

    /// Keep the outcome of a run unless the state moved on meanwhile.
    pub fn record_run(&self, id: Uuid, generation: u64, outcome: ExecutionOutcome) -> Result<()> {
        let mut sessions = self.sessions.lock().map_err(|_| lock_error())?;
        if let Some(entry) = sessions.get_mut(&id) {
            if entry.generation == generation {
                entry.last_run = Some(outcome);
            }
        }
        Ok(())
    }

    pub fn last_run(&self, id: Uuid) -> Result<Option<ExecutionOutcome>> {
        let sessions = self.sessions.lock().map_err(|_| lock_error())?;
        Ok(sessions.get(&id).and_then(|e| e.last_run.clone()))
    }
}

fn lock_error() -> AppError {
    AppError::InvalidState("Failed to acquire lock on conversations".to_string())
}

fn overtaken(id: Uuid) -> AppError {
    warn!("⏭️ [Conversation-{}] State changed during analysis, result discarded", id);
    AppError::InvalidState("conversation changed while the request was being analyzed".to_string())
}

/// Drives the clarification loop for each session and hands vetted SQL to
/// the executor. Each action is one sequential chain; nothing is retried.
#[derive(Clone)]
pub struct ConversationController {
    store: InMemoryStore,
    analyzer: RequestAnalyzer,
    schema: SchemaCache,
    guardrail: SqlGuardrail,
    executor: Arc<dyn QueryExecutor>,
    default_row_limit: u32,
}

impl ConversationController {
    pub fn new(
        analyzer: RequestAnalyzer,
        schema: SchemaCache,
        guardrail: SqlGuardrail,
        executor: Arc<dyn QueryExecutor>,
        default_row_limit: u32,
    ) -> Self {
        Self {
            store: InMemoryStore::new(),
            analyzer,
            schema,
            guardrail,
            executor,
            default_row_limit,
        }
    }

    pub fn create_session(&self) -> Result<Uuid> {
        let id = self.store.create()?;
        info!("🆕 [Conversation-{}] Created", id);
        Ok(id)
    }

    pub fn state(&self, id: Uuid) -> Result<ConversationState> {
        self.snapshot(id).map(|(state, _)| state)
    }

    fn snapshot(&self, id: Uuid) -> Result<(ConversationState, u64)> {
        self.store
            .get(id)?
            .ok_or_else(|| AppError::NotFound(format!("Conversation {} not found", id)))
    }

    /// Analyze a fresh request. Supersedes any outstanding question.
    pub async fn submit_request(&self, id: Uuid, request: &str) -> Result<ConversationState> {
        let request = request.trim();
        if request.is_empty() {
            return Err(AppError::InvalidInput("request must not be empty".to_string()));
        }
        let (state, generation) = self.snapshot(id)?;
        if state.phase() == Phase::AwaitingClarification {
            warn!("🔁 [Conversation-{}] New request replaces the pending clarification", id);
        }

        let schema_text = self.schema.get().await?;
        info!("🧠 [Conversation-{}] Analyzing request", id);
        let result = self.analyzer.analyze(request, &schema_text).await.map_err(|e| {
            error!("❌ [Conversation-{}] Analysis failed: {}", id, e);
            e
        })?;

        let next = state
            .apply(ConversationEvent::RequestAnalyzed {
                request: request.to_string(),
                result,
            })
            .map_err(|_| AppError::InvalidState("request could not be recorded".to_string()))?;
        if !self.store.store_if_current(id, generation, next.clone())? {
            return Err(overtaken(id));
        }
        Ok(next)
    }

    /// Resubmit the original request merged with the user's answer.
    pub async fn submit_clarification(&self, id: Uuid, answer: &str) -> Result<ConversationState> {
        let answer = answer.trim();
        if answer.is_empty() {
            return Err(AppError::InvalidInput("answer must not be empty".to_string()));
        }
        let (state, generation) = self.snapshot(id)?;
        if state.phase() != Phase::AwaitingClarification {
            return Err(AppError::InvalidState("no clarifying question is outstanding".to_string()));
        }

        let schema_text = self.schema.get().await?;
        let merged = state.merged_request(answer);
        info!("🧠 [Conversation-{}] Analyzing clarified request", id);
        let result = self.analyzer.analyze(&merged, &schema_text).await.map_err(|e| {
            error!("❌ [Conversation-{}] Analysis failed: {}", id, e);
            e
        })?;

        let next = state
            .apply(ConversationEvent::ClarificationAnalyzed {
                answer: answer.to_string(),
                result,
            })
            .map_err(|_| {
                AppError::InvalidState("no clarifying question is outstanding".to_string())
            })?;
        if !self.store.store_if_current(id, generation, next.clone())? {
            return Err(overtaken(id));
        }
        Ok(next)
    }

    pub fn reset(&self, id: Uuid) -> Result<ConversationState> {
        let state = self.state(id)?;
        let next = state
            .apply(ConversationEvent::Reset)
            .map_err(|_| AppError::InvalidState("reset failed".to_string()))?;
        self.store.store(id, next.clone())?;
        info!("🧹 [Conversation-{}] Reset", id);
        Ok(next)
    }

    /// Session snapshot including how the guardrail judges the active proposal.
    pub fn view(&self, id: Uuid, limit: Option<u32>) -> Result<SessionView> {
        let state = self.state(id)?;
        let limit = check_row_limit(limit.unwrap_or(self.default_row_limit))?;
        Ok(self.describe(id, &state, limit))
    }

    pub fn describe(&self, id: Uuid, state: &ConversationState, limit: u32) -> SessionView {
        let proposal = state.active_proposal().map(|p| {
            let verdict = self.guardrail.validate(p.sql);
            let (final_sql, limit_enforced) = if verdict.accepted {
                let vetted = self.guardrail.enforce_limit(p.sql, limit);
                let enforced = vetted.trim() != p.sql.trim();
                (Some(vetted), enforced)
            } else {
                (None, false)
            };
            ProposalView {
                sql: p.sql.to_string(),
                explanation: p.explanation.map(str::to_string),
                assumptions: p.assumptions.to_vec(),
                accepted: verdict.accepted,
                blocked_reason: (!verdict.accepted).then(|| verdict.reason.clone()),
                final_sql,
                limit_enforced,
            }
        });

        SessionView {
            conversation_id: id,
            phase: state.phase(),
            clarifying_question: state.clarifying_question().map(str::to_string),
            proposal,
            history: state.history().to_vec(),
        }
    }

    /// Vet and run the active proposal.
    pub async fn execute(&self, id: Uuid, limit: Option<u32>) -> Result<ExecutionOutcome> {
        let (state, generation) = self.snapshot(id)?;
        let query = self.vet_active(&state, limit)?;

        info!("🚀 [Conversation-{}] Running vetted query", id);
        let started = Instant::now();
        let output = self.executor.execute(&query.sql).await.map_err(|e| {
            error!("❌ [Conversation-{}] Query failed after {:.2?}: {}", id, started.elapsed(), e);
            e
        })?;
        let elapsed = started.elapsed();
        info!(
            "✅ [Conversation-{}] Query returned {} rows in {:.2?}",
            id,
            output.result.row_count(),
            elapsed
        );

        let outcome = ExecutionOutcome {
            query,
            result: output.result,
            csv_bytes: output.csv_bytes,
            elapsed,
        };
        self.store.record_run(id, generation, outcome.clone())?;
        Ok(outcome)
    }

    /// CSV of the last run when it executed the same SQL, otherwise a fresh run.
    pub async fn export(&self, id: Uuid, limit: Option<u32>) -> Result<Vec<u8>> {
        let state = self.state(id)?;
        let query = self.vet_active(&state, limit)?;
        if let Some(run) = self.store.last_run(id)? {
            if run.query == query {
                info!("♻️ [Conversation-{}] Exporting the previous run", id);
                return Ok(run.csv_bytes);
            }
        }
        Ok(self.execute(id, limit).await?.csv_bytes)
    }

    fn vet_active(&self, state: &ConversationState, limit: Option<u32>) -> Result<SafeQuery> {
        let limit = check_row_limit(limit.unwrap_or(self.default_row_limit))?;
        let proposal = state
            .active_proposal()
            .ok_or_else(|| AppError::InvalidState("no proposed SQL to execute".to_string()))?;
        self.guardrail.vet(proposal.sql, limit)
    }

    pub async fn schema_text(&self) -> Result<String> {
        self.schema.get().await
    }

    pub async fn refresh_schema(&self) -> Result<String> {
        self.schema.refresh().await
    }
}
