//! Conversation context tracking
//!
//! Resolves elliptical references ("it", "compare them") against the
//! session's focus entities, recalls the last analysis category, and is
//! the single mutation point for `SessionContext`.

use crate::models::{
    CategoryOrigin, EntityOrigin, HistoryEntry, Interpretation, ResolvedInterpretation,
    SessionContext, TurnOutcome, MAX_FOCUS_ENTITIES, MAX_HISTORY_TURNS,
};
use chrono::Utc;
use tracing::debug;

/// Singular pronouns recall only the most recent focus entity
const SINGULAR_PRONOUNS: &[&str] = &["it", "this", "that"];

/// Plural pronouns recall the whole focus list
const PLURAL_PRONOUNS: &[&str] = &["them", "they", "these", "those"];

pub struct ContextTracker {
    max_focus_entities: usize,
    max_history_turns: usize,
}

impl ContextTracker {
    pub fn new() -> Self {
        Self {
            max_focus_entities: MAX_FOCUS_ENTITIES,
            max_history_turns: MAX_HISTORY_TURNS,
        }
    }

    pub fn with_limits(max_focus_entities: usize, max_history_turns: usize) -> Self {
        Self {
            max_focus_entities,
            max_history_turns,
        }
    }

    /// Fill the gaps in an interpretation from session context.
    ///
    /// Entities: an empty mention list falls back to the focus list; a
    /// non-empty mention list is merged with recalled focus entities when
    /// the utterance contains a referential pronoun ("compare it to
    /// Microsoft" → prior focus + MSFT). When both the utterance and the
    /// focus list are empty the result is explicitly unresolved — context
    /// never invents an entity.
    pub fn resolve(
        &self,
        interpretation: &Interpretation,
        context: &SessionContext,
    ) -> ResolvedInterpretation {
        let recalled = self.recalled_entities(&interpretation.raw_text, context);

        let (entities, entity_origin) = if interpretation.entities.is_empty() {
            if !recalled.is_empty() {
                (recalled, EntityOrigin::Focus)
            } else if context.focus_entities.is_empty() {
                (Vec::new(), EntityOrigin::Unresolved)
            } else {
                (context.focus_entities.clone(), EntityOrigin::Focus)
            }
        } else if recalled.is_empty() {
            (interpretation.entities.clone(), EntityOrigin::Utterance)
        } else {
            // Recalled entities come first: the pronoun was mentioned
            // before the named companies it is compared against.
            let mut merged = recalled;
            for entity in &interpretation.entities {
                if !merged.contains(entity) {
                    merged.push(entity.clone());
                }
            }
            (merged, EntityOrigin::Utterance)
        };

        let (category, category_origin) = if interpretation.category.is_known() {
            (interpretation.category, CategoryOrigin::Utterance)
        } else if let Some(last) = context.last_analysis_category {
            (last, CategoryOrigin::ContextRecall)
        } else {
            (interpretation.category, CategoryOrigin::Unknown)
        };

        debug!(
            session_id = %context.session_id,
            ?entities,
            %category,
            ?entity_origin,
            "Resolved interpretation against context"
        );

        ResolvedInterpretation {
            interpretation: interpretation.clone(),
            entities,
            category,
            entity_origin,
            category_origin,
        }
    }

    /// Fold a finished turn back into the context. Confirmed entities are
    /// prepended to the focus list (deduplicated, truncated), the category
    /// is overwritten when the turn produced one, and the turn is appended
    /// to the bounded history.
    pub fn update(&self, mut context: SessionContext, outcome: &TurnOutcome) -> SessionContext {
        let delta = &outcome.context_delta;

        if !delta.entities.is_empty() {
            let mut focus = delta.entities.clone();
            for entity in context.focus_entities.drain(..) {
                if !focus.contains(&entity) {
                    focus.push(entity);
                }
            }
            focus.truncate(self.max_focus_entities);
            context.focus_entities = focus;
        }

        if let Some(category) = delta.category {
            context.last_analysis_category = Some(category);
        }

        context.history.push_back(HistoryEntry {
            interpretation: outcome.interpretation.clone(),
            disposition: outcome.disposition,
            recorded_at: Utc::now(),
        });
        while context.history.len() > self.max_history_turns {
            context.history.pop_front();
        }

        context.turn_count += 1;
        context.updated_at = Utc::now();

        debug!(
            session_id = %context.session_id,
            focus = ?context.focus_entities,
            turn_count = context.turn_count,
            "Session context updated"
        );

        context
    }

    /// Focus entities referenced by a pronoun in the utterance, if any
    fn recalled_entities(&self, raw_text: &str, context: &SessionContext) -> Vec<String> {
        if context.focus_entities.is_empty() {
            return Vec::new();
        }

        let lower = raw_text.to_lowercase();
        let mut singular = false;
        let mut plural = false;
        for token in lower.split(|c: char| !c.is_alphanumeric()) {
            if SINGULAR_PRONOUNS.contains(&token) {
                singular = true;
            }
            if PLURAL_PRONOUNS.contains(&token) {
                plural = true;
            }
        }

        if plural {
            context.focus_entities.clone()
        } else if singular {
            context.focus_entities.iter().take(1).cloned().collect()
        } else {
            Vec::new()
        }
    }
}

impl Default for ContextTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        AnalysisCategory, ContextDelta, ExecutionTrace, TurnDisposition, TurnOutcome,
    };
    use uuid::Uuid;

    fn interpretation(text: &str, entities: Vec<&str>, category: AnalysisCategory) -> Interpretation {
        Interpretation {
            raw_text: text.to_string(),
            entities: entities.into_iter().map(String::from).collect(),
            category,
            confidence: 0.5,
        }
    }

    fn outcome_with_delta(interpretation: Interpretation, delta: ContextDelta) -> TurnOutcome {
        TurnOutcome {
            turn_id: Uuid::new_v4(),
            session_id: "s1".to_string(),
            resolved: ResolvedInterpretation {
                interpretation: interpretation.clone(),
                entities: interpretation.entities.clone(),
                category: interpretation.category,
                entity_origin: EntityOrigin::Utterance,
                category_origin: CategoryOrigin::Utterance,
            },
            interpretation,
            plan: None,
            trace: ExecutionTrace::empty(),
            response_text: "ok".to_string(),
            context_delta: delta,
            disposition: TurnDisposition::Completed,
            execution_time_ms: 1,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_empty_entities_fall_back_to_focus() {
        let tracker = ContextTracker::new();
        let mut context = SessionContext::new("s1");
        context.focus_entities = vec!["AAPL".to_string()];

        let resolved = tracker.resolve(
            &interpretation("and the cash flow?", vec![], AnalysisCategory::CashFlow),
            &context,
        );

        assert_eq!(resolved.entities, vec!["AAPL".to_string()]);
        assert_eq!(resolved.entity_origin, EntityOrigin::Focus);
    }

    #[test]
    fn test_pronoun_merges_focus_ahead_of_mentions() {
        let tracker = ContextTracker::new();
        let mut context = SessionContext::new("s1");
        context.focus_entities = vec!["AAPL".to_string()];

        let resolved = tracker.resolve(
            &interpretation(
                "Compare it to Microsoft",
                vec!["MSFT"],
                AnalysisCategory::Comparison,
            ),
            &context,
        );

        assert_eq!(resolved.entities, vec!["AAPL".to_string(), "MSFT".to_string()]);
    }

    #[test]
    fn test_singular_pronoun_recalls_only_most_recent() {
        let tracker = ContextTracker::new();
        let mut context = SessionContext::new("s1");
        context.focus_entities = vec!["GOOGL".to_string(), "AAPL".to_string()];

        let resolved = tracker.resolve(
            &interpretation("compare it with TSLA", vec!["TSLA"], AnalysisCategory::Comparison),
            &context,
        );

        assert_eq!(resolved.entities, vec!["GOOGL".to_string(), "TSLA".to_string()]);
    }

    #[test]
    fn test_both_empty_is_unresolved_never_invented() {
        let tracker = ContextTracker::new();
        let context = SessionContext::new("s1");

        let resolved = tracker.resolve(
            &interpretation("hello", vec![], AnalysisCategory::Unknown),
            &context,
        );

        assert!(resolved.entities.is_empty());
        assert_eq!(resolved.entity_origin, EntityOrigin::Unresolved);
        assert!(resolved.is_insufficient());
    }

    #[test]
    fn test_category_recalled_from_context() {
        let tracker = ContextTracker::new();
        let mut context = SessionContext::new("s1");
        context.last_analysis_category = Some(AnalysisCategory::IncomeStatement);

        let resolved = tracker.resolve(
            &interpretation("MSFT", vec!["MSFT"], AnalysisCategory::Unknown),
            &context,
        );

        assert_eq!(resolved.category, AnalysisCategory::IncomeStatement);
        assert_eq!(resolved.category_origin, CategoryOrigin::ContextRecall);
    }

    #[test]
    fn test_update_prepends_dedups_and_truncates_focus() {
        let tracker = ContextTracker::with_limits(3, 10);
        let mut context = SessionContext::new("s1");
        context.focus_entities = vec!["AAPL".to_string(), "MSFT".to_string(), "TSLA".to_string()];

        let outcome = outcome_with_delta(
            interpretation("GOOGL and MSFT", vec!["GOOGL", "MSFT"], AnalysisCategory::Metrics),
            ContextDelta {
                entities: vec!["GOOGL".to_string(), "MSFT".to_string()],
                category: Some(AnalysisCategory::Metrics),
            },
        );

        let updated = tracker.update(context, &outcome);
        assert_eq!(
            updated.focus_entities,
            vec!["GOOGL".to_string(), "MSFT".to_string(), "AAPL".to_string()]
        );
        assert_eq!(updated.last_analysis_category, Some(AnalysisCategory::Metrics));
        assert_eq!(updated.turn_count, 1);
    }

    #[test]
    fn test_update_keeps_category_when_delta_has_none() {
        let tracker = ContextTracker::new();
        let mut context = SessionContext::new("s1");
        context.last_analysis_category = Some(AnalysisCategory::Profile);

        let outcome = outcome_with_delta(
            interpretation("hello", vec![], AnalysisCategory::Unknown),
            ContextDelta::default(),
        );

        let updated = tracker.update(context, &outcome);
        assert_eq!(updated.last_analysis_category, Some(AnalysisCategory::Profile));
        assert_eq!(updated.turn_count, 1);
        assert!(updated.focus_entities.is_empty());
    }

    #[test]
    fn test_history_capped_oldest_evicted() {
        let tracker = ContextTracker::with_limits(6, 2);
        let mut context = SessionContext::new("s1");

        for i in 0..4 {
            let outcome = outcome_with_delta(
                interpretation(&format!("turn {}", i), vec![], AnalysisCategory::Unknown),
                ContextDelta::default(),
            );
            context = tracker.update(context, &outcome);
        }

        assert_eq!(context.history.len(), 2);
        assert_eq!(context.turn_count, 4);
        assert_eq!(context.history.front().map(|h| h.interpretation.raw_text.as_str()), Some("turn 2"));
    }
}
