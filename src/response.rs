//! Response assembly: execution trace → reply text + context delta
//!
//! Template selection: clarification shortcut, all-ok success content,
//! partial results with an explicit degraded-service note, or a single
//! actionable failure message. Never returns an empty string.

use crate::models::{
    AnalysisCategory, ClarificationRequest, ContextDelta, ExecutionPlan, ExecutionTrace,
    ResolvedInterpretation, StepOperation, StepStatus,
};
use crate::providers::{AnalysisResult, ComparisonResult};
use tracing::warn;

const WELCOME_TEMPLATE: &str = "Hello! I'm your financial analysis assistant. I can help you \
analyze companies, compare stocks, and dig into financial statements. Just tell me which \
company you'd like to look at.";

const NO_RESULTS_TEMPLATE: &str = "I wasn't able to generate analysis results for your \
request. Please try again with a specific company or request.";

const CANCELLED_TEMPLATE: &str = "That request was cancelled before a result was ready, so \
nothing has changed.";

const SYSTEM_ERROR_TEMPLATE: &str = "Something went wrong on my side while preparing that \
analysis. Please try again in a moment.";

pub struct ResponseAssembler {
    /// Known symbols used for "did you mean" hints on failed lookups
    symbol_hints: Vec<String>,
}

impl ResponseAssembler {
    pub fn new() -> Self {
        Self {
            symbol_hints: Vec::new(),
        }
    }

    pub fn with_symbol_hints<I, S>(symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            symbol_hints: symbols.into_iter().map(Into::into).collect(),
        }
    }

    pub fn welcome(&self) -> String {
        WELCOME_TEMPLATE.to_string()
    }

    pub fn clarification(&self, request: &ClarificationRequest) -> String {
        format!(
            "I'd be happy to help with financial analysis! {}",
            request.prompt
        )
    }

    pub fn cancelled(&self) -> String {
        CANCELLED_TEMPLATE.to_string()
    }

    pub fn system_error(&self) -> String {
        SYSTEM_ERROR_TEMPLATE.to_string()
    }

    /// Build the reply and the context delta for an executed plan.
    pub fn assemble(
        &self,
        resolved: &ResolvedInterpretation,
        plan: &ExecutionPlan,
        trace: &ExecutionTrace,
    ) -> (String, ContextDelta) {
        let mut sections: Vec<String> = Vec::new();
        let mut failures: Vec<String> = Vec::new();
        let mut validated: Vec<String> = Vec::new();
        let mut unknown_entities: Vec<String> = Vec::new();

        for (step, result) in plan.steps.iter().zip(trace.results.iter()) {
            match result.status {
                StepStatus::Ok => match &step.operation {
                    StepOperation::ValidateEntity { entity } => {
                        if !validated.contains(entity) {
                            validated.push(entity.clone());
                        }
                    }
                    StepOperation::RunAnalysis { .. } => {
                        match result
                            .payload
                            .clone()
                            .map(serde_json::from_value::<AnalysisResult>)
                        {
                            Some(Ok(analysis)) => sections.push(analysis.summary),
                            _ => warn!(
                                step_index = result.step_index,
                                "Analysis payload missing or malformed"
                            ),
                        }
                    }
                    StepOperation::RunComparison { .. } => {
                        match result
                            .payload
                            .clone()
                            .map(serde_json::from_value::<ComparisonResult>)
                        {
                            Some(Ok(comparison)) => sections.push(comparison.summary),
                            _ => warn!(
                                step_index = result.step_index,
                                "Comparison payload missing or malformed"
                            ),
                        }
                    }
                    StepOperation::FetchData { .. } => {}
                },
                StepStatus::Failed => {
                    if let StepOperation::ValidateEntity { entity } = &step.operation {
                        unknown_entities.push(entity.clone());
                    }
                    failures.push(describe_failure(&step.operation, result.error.as_deref()));
                }
                StepStatus::Skipped => {}
            }
        }

        let delta = ContextDelta {
            entities: validated,
            category: executed_category(plan),
        };

        let text = if sections.is_empty() && failures.is_empty() {
            NO_RESULTS_TEMPLATE.to_string()
        } else if failures.is_empty() {
            let mut text = sections.join("\n\n");
            if !resolved.entities.is_empty() {
                text.push_str(&format!(
                    "\n\nCurrent context: {}",
                    resolved.entities.join(", ")
                ));
            }
            text
        } else if sections.is_empty() {
            self.all_failed_text(&unknown_entities, &failures)
        } else {
            format!(
                "{}\n\nNote: I couldn't complete everything you asked for — {}",
                sections.join("\n\n"),
                failures.join("; ")
            )
        };

        (text, delta)
    }

    fn all_failed_text(&self, unknown_entities: &[String], failures: &[String]) -> String {
        if let Some(entity) = unknown_entities.first() {
            let mut text = format!("I couldn't find a listing for {}.", entity);
            if let Some(suggestion) = self.suggest(entity) {
                text.push_str(&format!(" Did you mean {}?", suggestion));
            }
            text.push_str(" Double-check the ticker symbol, or try the company name instead.");
            text
        } else {
            format!(
                "I couldn't complete that request: {}. Please try again in a moment.",
                failures.join("; ")
            )
        }
    }

    fn suggest(&self, unknown: &str) -> Option<String> {
        let unknown = unknown.to_uppercase();
        let mut best: Option<(usize, &String)> = None;

        for symbol in &self.symbol_hints {
            let shared = symbol
                .chars()
                .zip(unknown.chars())
                .take_while(|(a, b)| a == b)
                .count();
            if shared >= 2 && best.map_or(true, |(len, _)| shared > len) {
                best = Some((shared, symbol));
            }
        }

        best.map(|(_, symbol)| symbol.clone())
    }
}

impl Default for ResponseAssembler {
    fn default() -> Self {
        Self::new()
    }
}

/// The analysis category this plan actually carried out, for the context
/// delta; comparison plans report Comparison.
fn executed_category(plan: &ExecutionPlan) -> Option<AnalysisCategory> {
    plan.steps.iter().find_map(|step| match &step.operation {
        StepOperation::RunAnalysis { category, .. } => Some(*category),
        StepOperation::RunComparison { .. } => Some(AnalysisCategory::Comparison),
        _ => None,
    })
}

fn describe_failure(operation: &StepOperation, error: Option<&str>) -> String {
    let detail = error.unwrap_or("no further detail");
    match operation {
        StepOperation::ValidateEntity { entity } => {
            format!("{} was not recognized ({})", entity, detail)
        }
        StepOperation::FetchData { entity } => {
            format!("data for {} was unavailable ({})", entity, detail)
        }
        StepOperation::RunAnalysis { entity, category } => {
            format!("the {} for {} failed ({})", category, entity, detail)
        }
        StepOperation::RunComparison { entities, .. } => {
            format!("the comparison of {} failed ({})", entities.join(", "), detail)
        }
    }
}
