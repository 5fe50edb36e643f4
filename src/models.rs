//! Core data models for the conversational analysis orchestrator

use crate::error::OrchestrationError;
use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use uuid::Uuid;

/// Maximum entities kept in focus for pronoun resolution
pub const MAX_FOCUS_ENTITIES: usize = 6;

/// Maximum turns retained in session history (oldest evicted first)
pub const MAX_HISTORY_TURNS: usize = 20;

//
// ================= Enums =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisCategory {
    Profile,
    Metrics,
    Comparison,
    IncomeStatement,
    BalanceSheet,
    CashFlow,
    Recommendations,
    Unknown,
}

impl AnalysisCategory {
    pub fn is_known(self) -> bool {
        self != AnalysisCategory::Unknown
    }

    /// Statement-level categories carry a confidence bonus and map to the
    /// statements section of a dataset.
    pub fn is_statement(self) -> bool {
        matches!(
            self,
            AnalysisCategory::IncomeStatement
                | AnalysisCategory::BalanceSheet
                | AnalysisCategory::CashFlow
        )
    }

    pub fn label(self) -> &'static str {
        match self {
            AnalysisCategory::Profile => "Company Profile",
            AnalysisCategory::Metrics => "Key Financial Metrics",
            AnalysisCategory::Comparison => "Peer Comparison",
            AnalysisCategory::IncomeStatement => "Income Statement",
            AnalysisCategory::BalanceSheet => "Balance Sheet",
            AnalysisCategory::CashFlow => "Cash Flow Statement",
            AnalysisCategory::Recommendations => "Analyst Recommendations",
            AnalysisCategory::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for AnalysisCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Where the resolved entities came from
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EntityOrigin {
    Utterance,
    Focus,
    Unresolved,
}

/// Where the resolved category came from
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CategoryOrigin {
    Utterance,
    ContextRecall,
    Unknown,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TurnDisposition {
    Completed,
    PartiallyCompleted,
    Failed,
    Clarification,
    Cancelled,
}

impl fmt::Display for TurnDisposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TurnDisposition::Completed => "completed",
            TurnDisposition::PartiallyCompleted => "partially_completed",
            TurnDisposition::Failed => "failed",
            TurnDisposition::Clarification => "clarification",
            TurnDisposition::Cancelled => "cancelled",
        };
        write!(f, "{}", s)
    }
}

//
// ================= Interpretation =================
//

/// Structured, immutable reading of one user utterance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interpretation {
    pub raw_text: String,
    /// Canonical ticker symbols, duplicates removed, first-mention order
    pub entities: Vec<String>,
    pub category: AnalysisCategory,
    /// Deterministic signal-strength score in [0, 1]
    pub confidence: f32,
}

/// Interpretation after context fallback has been applied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedInterpretation {
    pub interpretation: Interpretation,
    pub entities: Vec<String>,
    pub category: AnalysisCategory,
    pub entity_origin: EntityOrigin,
    pub category_origin: CategoryOrigin,
}

impl ResolvedInterpretation {
    /// Neither the utterance nor the session context yielded anything to
    /// work with; the planner must ask for clarification, never guess.
    pub fn is_insufficient(&self) -> bool {
        self.entity_origin == EntityOrigin::Unresolved && !self.category.is_known()
    }
}

//
// ================= Session Context =================
//

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub interpretation: Interpretation,
    pub disposition: TurnDisposition,
    pub recorded_at: DateTime<Utc>,
}

/// Per-session conversation state. Owned by the orchestrator through the
/// session store; mutated only by `ContextTracker::update`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionContext {
    pub session_id: String,
    /// Most-recently-introduced entities first, no duplicates
    pub focus_entities: Vec<String>,
    pub last_analysis_category: Option<AnalysisCategory>,
    pub turn_count: u32,
    /// Bounded record of prior turns, oldest evicted first
    pub history: VecDeque<HistoryEntry>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SessionContext {
    pub fn new(session_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.into(),
            focus_entities: Vec::new(),
            last_analysis_category: None,
            turn_count: 0,
            history: VecDeque::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

//
// ================= Plan =================
//

/// The closed set of operations a plan step can perform. Each variant
/// carries its own targets, so adding a category of work is a
/// compile-time-checked change.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum StepOperation {
    ValidateEntity {
        entity: String,
    },
    FetchData {
        entity: String,
    },
    RunAnalysis {
        entity: String,
        category: AnalysisCategory,
    },
    RunComparison {
        entities: Vec<String>,
        category: AnalysisCategory,
    },
}

impl StepOperation {
    pub fn kind(&self) -> &'static str {
        match self {
            StepOperation::ValidateEntity { .. } => "validate_entity",
            StepOperation::FetchData { .. } => "fetch_data",
            StepOperation::RunAnalysis { .. } => "run_analysis",
            StepOperation::RunComparison { .. } => "run_comparison",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlanStep {
    pub operation: StepOperation,
    /// Indices of prior steps this step waits on (strictly backward)
    pub depends_on: Vec<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ExecutionPlan {
    pub steps: Vec<PlanStep>,
}

impl ExecutionPlan {
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Reject forward and self dependencies before the plan reaches the
    /// executor. A violation here is a programmer error, fatal for the turn.
    pub fn validate(&self) -> Result<()> {
        for (idx, step) in self.steps.iter().enumerate() {
            for dep in &step.depends_on {
                if *dep >= idx {
                    return Err(OrchestrationError::PlanConstruction(format!(
                        "step {} depends on step {} (dependencies must reference earlier steps)",
                        idx, dep
                    )));
                }
            }
        }
        Ok(())
    }
}

//
// ================= Execution Trace =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Ok,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub step_index: usize,
    pub status: StepStatus,
    /// Opaque result of the step when it succeeded
    pub payload: Option<serde_json::Value>,
    pub error: Option<String>,
    pub attempts: u32,
    pub duration_ms: u64,
}

impl StepResult {
    pub fn ok(step_index: usize, payload: serde_json::Value, attempts: u32, duration_ms: u64) -> Self {
        Self {
            step_index,
            status: StepStatus::Ok,
            payload: Some(payload),
            error: None,
            attempts,
            duration_ms,
        }
    }

    pub fn failed(step_index: usize, error: String, attempts: u32, duration_ms: u64) -> Self {
        Self {
            step_index,
            status: StepStatus::Failed,
            payload: None,
            error: Some(error),
            attempts,
            duration_ms,
        }
    }

    pub fn skipped(step_index: usize, reason: String) -> Self {
        Self {
            step_index,
            status: StepStatus::Skipped,
            payload: None,
            error: Some(reason),
            attempts: 0,
            duration_ms: 0,
        }
    }
}

/// Ordered record of every step's terminal status for one turn.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ExecutionTrace {
    pub results: Vec<StepResult>,
}

impl ExecutionTrace {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_complete(&self, plan_len: usize) -> bool {
        self.results.len() == plan_len
    }

    pub fn all_ok(&self) -> bool {
        !self.results.is_empty() && self.results.iter().all(|r| r.status == StepStatus::Ok)
    }

    pub fn any_ok(&self) -> bool {
        self.results.iter().any(|r| r.status == StepStatus::Ok)
    }

    pub fn ok_count(&self) -> usize {
        self.results
            .iter()
            .filter(|r| r.status == StepStatus::Ok)
            .count()
    }
}

//
// ================= Clarification =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ClarificationNeed {
    CompanyAndAnalysis,
    Company,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClarificationRequest {
    pub need: ClarificationNeed,
    pub prompt: String,
}

impl ClarificationRequest {
    pub fn new(need: ClarificationNeed) -> Self {
        let prompt = match need {
            ClarificationNeed::CompanyAndAnalysis => {
                "Could you tell me which company you're interested in, and what kind of \
                 analysis you'd like? You can use ticker symbols (like AAPL, MSFT) or \
                 company names (like Apple, Microsoft)."
            }
            ClarificationNeed::Company => {
                "Which company should I run that analysis on? You can use a ticker \
                 symbol (like AAPL) or a company name (like Apple)."
            }
        };
        Self {
            need,
            prompt: prompt.to_string(),
        }
    }
}

//
// ================= Turn Outcome =================
//

/// What a completed turn folds back into the session context.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ContextDelta {
    /// Entities confirmed this turn, first-mention order
    pub entities: Vec<String>,
    pub category: Option<AnalysisCategory>,
}

/// The unit returned to the caller for one turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnOutcome {
    pub turn_id: Uuid,
    pub session_id: String,
    pub interpretation: Interpretation,
    pub resolved: ResolvedInterpretation,
    pub plan: Option<ExecutionPlan>,
    pub trace: ExecutionTrace,
    pub response_text: String,
    pub context_delta: ContextDelta,
    pub disposition: TurnDisposition,
    pub execution_time_ms: u64,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_rejects_forward_dependency() {
        let plan = ExecutionPlan {
            steps: vec![
                PlanStep {
                    operation: StepOperation::ValidateEntity {
                        entity: "AAPL".to_string(),
                    },
                    depends_on: vec![1],
                },
                PlanStep {
                    operation: StepOperation::FetchData {
                        entity: "AAPL".to_string(),
                    },
                    depends_on: vec![0],
                },
            ],
        };

        assert!(plan.validate().is_err());
    }

    #[test]
    fn test_plan_rejects_self_dependency() {
        let plan = ExecutionPlan {
            steps: vec![PlanStep {
                operation: StepOperation::ValidateEntity {
                    entity: "AAPL".to_string(),
                },
                depends_on: vec![0],
            }],
        };

        assert!(plan.validate().is_err());
    }

    #[test]
    fn test_trace_completeness() {
        let trace = ExecutionTrace {
            results: vec![StepResult::ok(0, serde_json::json!({}), 1, 3)],
        };
        assert!(trace.is_complete(1));
        assert!(!trace.is_complete(2));
        assert!(trace.all_ok());
    }

    #[test]
    fn test_insufficient_marker() {
        let interpretation = Interpretation {
            raw_text: "hello".to_string(),
            entities: vec![],
            category: AnalysisCategory::Unknown,
            confidence: 0.0,
        };
        let resolved = ResolvedInterpretation {
            interpretation: interpretation.clone(),
            entities: vec![],
            category: AnalysisCategory::Unknown,
            entity_origin: EntityOrigin::Unresolved,
            category_origin: CategoryOrigin::Unknown,
        };
        assert!(resolved.is_insufficient());

        let resolved_with_category = ResolvedInterpretation {
            category: AnalysisCategory::Metrics,
            category_origin: CategoryOrigin::Utterance,
            ..resolved
        };
        assert!(!resolved_with_category.is_insufficient());
    }
}
