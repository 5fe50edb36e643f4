//! Main orchestrator - the per-turn state machine
//!
//! AwaitingInput → Interpreting → ContextResolving → Planning →
//! (ClarifyingExit | Executing) → Responding → AwaitingInput
//!
//! Also owns the session lifecycle: start, submit turn, reset, inspect.

use crate::audit::TurnLog;
use crate::context::ContextTracker;
use crate::execution::StepExecutor;
use crate::interpreter::Interpreter;
use crate::models::{
    ContextDelta, ExecutionPlan, ExecutionTrace, Interpretation, ResolvedInterpretation,
    SessionContext, TurnDisposition, TurnOutcome,
};
use crate::planner::{Planner, PlannerDecision};
use crate::response::ResponseAssembler;
use crate::state::SessionStore;
use crate::error::OrchestrationError;
use crate::Result;
use chrono::Utc;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, error, info};
use uuid::Uuid;

/// Per-turn pipeline states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    AwaitingInput,
    Interpreting,
    ContextResolving,
    Planning,
    ClarifyingExit,
    Executing,
    Responding,
}

impl fmt::Display for TurnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TurnState::AwaitingInput => "awaiting_input",
            TurnState::Interpreting => "interpreting",
            TurnState::ContextResolving => "context_resolving",
            TurnState::Planning => "planning",
            TurnState::ClarifyingExit => "clarifying_exit",
            TurnState::Executing => "executing",
            TurnState::Responding => "responding",
        };
        write!(f, "{}", s)
    }
}

/// Cooperative cancellation for an in-flight turn. In-flight steps are
/// allowed to finish; their results are discarded and the session context
/// is left untouched.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Top-level orchestrator; every collaborator is injected at construction.
pub struct Orchestrator {
    interpreter: Interpreter,
    tracker: ContextTracker,
    planner: Planner,
    executor: StepExecutor,
    assembler: ResponseAssembler,
    sessions: Arc<dyn SessionStore>,
    turn_log: TurnLog,
    /// Serializes turns per session: single writer, sessions independent
    turn_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl Orchestrator {
    pub fn new(
        interpreter: Interpreter,
        tracker: ContextTracker,
        planner: Planner,
        executor: StepExecutor,
        assembler: ResponseAssembler,
        sessions: Arc<dyn SessionStore>,
    ) -> Self {
        Self {
            interpreter,
            tracker,
            planner,
            executor,
            assembler,
            sessions,
            turn_log: TurnLog::new(),
            turn_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Create a session, honoring a caller-provided identifier when given.
    pub async fn start_session(&self, session_id: Option<String>) -> Result<String> {
        let session_id = session_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        if self.sessions.load(&session_id).await?.is_none() {
            self.sessions
                .save(SessionContext::new(session_id.clone()))
                .await?;
            info!(%session_id, "Session started");
        }

        Ok(session_id)
    }

    /// Drive one full turn for a session.
    pub async fn submit(&self, session_id: &str, raw_text: &str) -> Result<TurnOutcome> {
        self.submit_with_cancel(session_id, raw_text, &CancelToken::default())
            .await
    }

    /// Drive one full turn, checking the token between pipeline stages.
    pub async fn submit_with_cancel(
        &self,
        session_id: &str,
        raw_text: &str,
        cancel: &CancelToken,
    ) -> Result<TurnOutcome> {
        let turn_lock = self.turn_lock(session_id).await;
        let _guard = turn_lock.lock().await;

        let started = Instant::now();
        let mut state = TurnState::AwaitingInput;

        let context = self
            .sessions
            .load(session_id)
            .await?
            .ok_or_else(|| OrchestrationError::SessionNotFound(session_id.to_string()))?;

        info!(%session_id, turn = context.turn_count + 1, "Processing turn");

        transition(session_id, &mut state, TurnState::Interpreting);
        let interpretation = self.interpreter.interpret(raw_text);

        transition(session_id, &mut state, TurnState::ContextResolving);
        let resolved = self.tracker.resolve(&interpretation, &context);

        transition(session_id, &mut state, TurnState::Planning);
        let decision = match self.planner.plan(&resolved) {
            Ok(decision) => decision,
            Err(e) => {
                // Turn-fatal invariant violation; no partial execution
                error!(%session_id, error = %e, "Plan construction failed");
                return self
                    .finish_turn(
                        context,
                        session_id,
                        interpretation,
                        resolved,
                        None,
                        ExecutionTrace::empty(),
                        self.assembler.system_error(),
                        ContextDelta::default(),
                        TurnDisposition::Failed,
                        started,
                        &mut state,
                    )
                    .await;
            }
        };

        let (plan, trace, response_text, delta, disposition) = match decision {
            PlannerDecision::Clarify(request) => {
                transition(session_id, &mut state, TurnState::ClarifyingExit);
                (
                    None,
                    ExecutionTrace::empty(),
                    self.assembler.clarification(&request),
                    ContextDelta::default(),
                    TurnDisposition::Clarification,
                )
            }
            PlannerDecision::Execute(plan) => {
                if cancel.is_cancelled() {
                    transition(session_id, &mut state, TurnState::Responding);
                    let outcome = build_outcome(
                        session_id,
                        interpretation,
                        resolved,
                        Some(plan),
                        ExecutionTrace::empty(),
                        self.assembler.cancelled(),
                        ContextDelta::default(),
                        TurnDisposition::Cancelled,
                        started,
                    );
                    info!(%session_id, "Turn cancelled before execution");
                    self.turn_log.record(outcome.clone()).await;
                    return Ok(outcome);
                }

                transition(session_id, &mut state, TurnState::Executing);
                let trace = match self.executor.execute(&plan).await {
                    Ok(trace) => trace,
                    Err(e) => {
                        error!(%session_id, error = %e, "Execution aborted");
                        return self
                            .finish_turn(
                                context,
                                session_id,
                                interpretation,
                                resolved,
                                Some(plan),
                                ExecutionTrace::empty(),
                                self.assembler.system_error(),
                                ContextDelta::default(),
                                TurnDisposition::Failed,
                                started,
                                &mut state,
                            )
                            .await;
                    }
                };

                if cancel.is_cancelled() {
                    // Results are discarded; the context stays untouched
                    transition(session_id, &mut state, TurnState::Responding);
                    let outcome = build_outcome(
                        session_id,
                        interpretation,
                        resolved,
                        Some(plan),
                        ExecutionTrace::empty(),
                        self.assembler.cancelled(),
                        ContextDelta::default(),
                        TurnDisposition::Cancelled,
                        started,
                    );
                    info!(%session_id, "Turn cancelled by caller");
                    self.turn_log.record(outcome.clone()).await;
                    return Ok(outcome);
                }

                let (text, delta) = self.assembler.assemble(&resolved, &plan, &trace);
                let disposition = if trace.all_ok() {
                    TurnDisposition::Completed
                } else if trace.any_ok() {
                    TurnDisposition::PartiallyCompleted
                } else {
                    TurnDisposition::Failed
                };
                (Some(plan), trace, text, delta, disposition)
            }
        };

        self.finish_turn(
            context,
            session_id,
            interpretation,
            resolved,
            plan,
            trace,
            response_text,
            delta,
            disposition,
            started,
            &mut state,
        )
        .await
    }

    /// Replace the context with a fresh one, keeping the identifier.
    pub async fn reset_session(&self, session_id: &str) -> Result<()> {
        let turn_lock = self.turn_lock(session_id).await;
        let _guard = turn_lock.lock().await;

        if self.sessions.load(session_id).await?.is_none() {
            return Err(OrchestrationError::SessionNotFound(session_id.to_string()));
        }

        self.sessions
            .save(SessionContext::new(session_id))
            .await?;
        info!(%session_id, "Session reset");
        Ok(())
    }

    /// Read-only context snapshot for diagnostics.
    pub async fn get_context(&self, session_id: &str) -> Result<SessionContext> {
        self.sessions
            .load(session_id)
            .await?
            .ok_or_else(|| OrchestrationError::SessionNotFound(session_id.to_string()))
    }

    pub fn turn_log(&self) -> &TurnLog {
        &self.turn_log
    }

    pub fn assembler(&self) -> &ResponseAssembler {
        &self.assembler
    }

    #[allow(clippy::too_many_arguments)]
    async fn finish_turn(
        &self,
        context: SessionContext,
        session_id: &str,
        interpretation: Interpretation,
        resolved: ResolvedInterpretation,
        plan: Option<ExecutionPlan>,
        trace: ExecutionTrace,
        response_text: String,
        delta: ContextDelta,
        disposition: TurnDisposition,
        started: Instant,
        state: &mut TurnState,
    ) -> Result<TurnOutcome> {
        transition(session_id, state, TurnState::Responding);

        let outcome = build_outcome(
            session_id,
            interpretation,
            resolved,
            plan,
            trace,
            response_text,
            delta,
            disposition,
            started,
        );

        // Context storage failures are turn-fatal
        let updated = self.tracker.update(context, &outcome);
        self.sessions.save(updated).await?;

        self.turn_log.record(outcome.clone()).await;

        transition(session_id, state, TurnState::AwaitingInput);
        info!(
            %session_id,
            turn_id = %outcome.turn_id,
            disposition = %outcome.disposition,
            execution_time_ms = outcome.execution_time_ms,
            "Turn complete"
        );

        Ok(outcome)
    }

    async fn turn_lock(&self, session_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.turn_locks.lock().await;
        locks
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

fn transition(session_id: &str, state: &mut TurnState, to: TurnState) {
    debug!(%session_id, from = %state, to = %to, "State transition");
    *state = to;
}

#[allow(clippy::too_many_arguments)]
fn build_outcome(
    session_id: &str,
    interpretation: Interpretation,
    resolved: ResolvedInterpretation,
    plan: Option<ExecutionPlan>,
    trace: ExecutionTrace,
    response_text: String,
    context_delta: ContextDelta,
    disposition: TurnDisposition,
    started: Instant,
) -> TurnOutcome {
    TurnOutcome {
        turn_id: Uuid::new_v4(),
        session_id: session_id.to_string(),
        interpretation,
        resolved,
        plan,
        trace,
        response_text,
        context_delta,
        disposition,
        execution_time_ms: started.elapsed().as_millis() as u64,
        created_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::RetryPolicy;
    use crate::models::AnalysisCategory;
    use crate::providers::{InMemoryAnalysisToolset, InMemoryDataProvider};
    use crate::state::InMemorySessionStore;
    use std::time::Duration;

    fn orchestrator() -> Orchestrator {
        let interpreter = Interpreter::new();
        let symbol_hints: Vec<String> = interpreter
            .resolver()
            .known_symbols()
            .map(String::from)
            .collect();
        let executor = StepExecutor::new(
            Arc::new(InMemoryDataProvider::new()),
            Arc::new(InMemoryAnalysisToolset::new()),
        )
        .with_retry_policy(RetryPolicy {
            max_attempts: 2,
            initial_backoff: Duration::from_millis(1),
            backoff_multiplier: 2,
        });

        Orchestrator::new(
            interpreter,
            ContextTracker::new(),
            Planner::new(),
            executor,
            ResponseAssembler::with_symbol_hints(symbol_hints),
            Arc::new(InMemorySessionStore::new()),
        )
    }

    #[tokio::test]
    async fn test_scenario_analyze_single_ticker() {
        let orchestrator = orchestrator();
        let session = orchestrator.start_session(None).await.unwrap();

        let outcome = orchestrator.submit(&session, "Analyze AAPL").await.unwrap();

        assert_eq!(outcome.interpretation.entities, vec!["AAPL".to_string()]);
        assert_eq!(outcome.plan.as_ref().map(ExecutionPlan::len), Some(3));
        assert_eq!(outcome.disposition, TurnDisposition::Completed);
        assert!(outcome.response_text.contains("Apple"));
        assert_eq!(outcome.context_delta.category, Some(AnalysisCategory::Profile));

        let context = orchestrator.get_context(&session).await.unwrap();
        assert_eq!(context.focus_entities, vec!["AAPL".to_string()]);
        assert_eq!(context.turn_count, 1);
    }

    #[tokio::test]
    async fn test_scenario_compare_it_to_microsoft() {
        let orchestrator = orchestrator();
        let session = orchestrator.start_session(None).await.unwrap();

        orchestrator.submit(&session, "Analyze AAPL").await.unwrap();
        let outcome = orchestrator
            .submit(&session, "Compare it to Microsoft")
            .await
            .unwrap();

        assert_eq!(
            outcome.resolved.entities,
            vec!["AAPL".to_string(), "MSFT".to_string()]
        );
        assert_eq!(outcome.resolved.category, AnalysisCategory::Comparison);
        assert_eq!(outcome.plan.as_ref().map(ExecutionPlan::len), Some(5));
        assert_eq!(outcome.disposition, TurnDisposition::Completed);
        assert!(outcome.response_text.contains("Comparing"));
    }

    #[tokio::test]
    async fn test_scenario_unknown_ticker_reported() {
        let orchestrator = orchestrator();
        let session = orchestrator.start_session(None).await.unwrap();

        let outcome = orchestrator
            .submit(&session, "Tell me about XYZ123NOTATICKER")
            .await
            .unwrap();

        assert_eq!(outcome.disposition, TurnDisposition::Failed);
        assert!(outcome.response_text.contains("XYZ123NOTATICKER"));
        assert!(outcome.response_text.contains("couldn't find"));

        // junk never enters the focus list
        let context = orchestrator.get_context(&session).await.unwrap();
        assert!(context.focus_entities.is_empty());
    }

    #[tokio::test]
    async fn test_scenario_greeting_asks_for_clarification() {
        let orchestrator = orchestrator();
        let session = orchestrator.start_session(None).await.unwrap();

        let outcome = orchestrator.submit(&session, "hello").await.unwrap();

        assert_eq!(outcome.disposition, TurnDisposition::Clarification);
        assert!(outcome.plan.is_none());
        assert!(outcome.response_text.contains("which company"));

        let context = orchestrator.get_context(&session).await.unwrap();
        assert_eq!(context.turn_count, 1);
        assert!(context.focus_entities.is_empty());
        assert!(context.last_analysis_category.is_none());
    }

    #[tokio::test]
    async fn test_scenario_category_recalled_across_turns() {
        let orchestrator = orchestrator();
        let session = orchestrator.start_session(None).await.unwrap();

        orchestrator
            .submit(&session, "AAPL income statement")
            .await
            .unwrap();
        let outcome = orchestrator.submit(&session, "MSFT").await.unwrap();

        assert_eq!(outcome.resolved.entities, vec!["MSFT".to_string()]);
        assert_eq!(outcome.resolved.category, AnalysisCategory::IncomeStatement);
        assert!(outcome.response_text.contains("revenue"));
    }

    #[tokio::test]
    async fn test_identical_turns_yield_identical_responses() {
        let orchestrator = orchestrator();
        let session = orchestrator.start_session(None).await.unwrap();

        let first = orchestrator.submit(&session, "Analyze AAPL").await.unwrap();
        let second = orchestrator.submit(&session, "Analyze AAPL").await.unwrap();

        assert_eq!(first.response_text, second.response_text);
    }

    #[tokio::test]
    async fn test_reset_keeps_identifier_clears_state() {
        let orchestrator = orchestrator();
        let session = orchestrator.start_session(None).await.unwrap();

        orchestrator.submit(&session, "Analyze AAPL").await.unwrap();
        orchestrator.reset_session(&session).await.unwrap();

        let context = orchestrator.get_context(&session).await.unwrap();
        assert_eq!(context.session_id, session);
        assert_eq!(context.turn_count, 0);
        assert!(context.focus_entities.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_session_is_reported() {
        let orchestrator = orchestrator();
        let err = orchestrator.submit("missing", "Analyze AAPL").await.unwrap_err();
        assert!(matches!(err, OrchestrationError::SessionNotFound(_)));
    }

    #[tokio::test]
    async fn test_cancelled_turn_leaves_context_untouched() {
        let orchestrator = orchestrator();
        let session = orchestrator.start_session(None).await.unwrap();

        let cancel = CancelToken::new();
        cancel.cancel();
        let outcome = orchestrator
            .submit_with_cancel(&session, "Analyze AAPL", &cancel)
            .await
            .unwrap();

        assert_eq!(outcome.disposition, TurnDisposition::Cancelled);
        assert!(!outcome.response_text.is_empty());

        let context = orchestrator.get_context(&session).await.unwrap();
        assert_eq!(context.turn_count, 0);
        assert!(context.focus_entities.is_empty());
    }

    #[tokio::test]
    async fn test_start_session_honors_given_identifier() {
        let orchestrator = orchestrator();
        let session = orchestrator
            .start_session(Some("my-session".to_string()))
            .await
            .unwrap();
        assert_eq!(session, "my-session");

        // Restarting an existing session keeps its context
        orchestrator.submit(&session, "Analyze AAPL").await.unwrap();
        orchestrator
            .start_session(Some("my-session".to_string()))
            .await
            .unwrap();
        let context = orchestrator.get_context(&session).await.unwrap();
        assert_eq!(context.turn_count, 1);
    }

    #[tokio::test]
    async fn test_turn_log_records_session_turns() {
        let orchestrator = orchestrator();
        let session = orchestrator.start_session(None).await.unwrap();

        orchestrator.submit(&session, "Analyze AAPL").await.unwrap();
        orchestrator.submit(&session, "key metrics").await.unwrap();

        let turns = orchestrator.turn_log().list_for_session(&session).await;
        assert_eq!(turns.len(), 2);
    }
}
