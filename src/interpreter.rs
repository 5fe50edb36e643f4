//! Request interpretation
//!
//! Composes entity resolution and intent classification into one
//! structured `Interpretation`. Total and deterministic: a pure function
//! of the input text, which makes golden-input testing trivial.

use crate::classifier::IntentClassifier;
use crate::entities::EntityResolver;
use crate::models::{AnalysisCategory, Interpretation};
use tracing::debug;

pub struct Interpreter {
    resolver: EntityResolver,
}

impl Interpreter {
    pub fn new() -> Self {
        Self {
            resolver: EntityResolver::new(),
        }
    }

    pub fn with_resolver(resolver: EntityResolver) -> Self {
        Self { resolver }
    }

    pub fn resolver(&self) -> &EntityResolver {
        &self.resolver
    }

    /// Parse one utterance. Never fails; weak signals lower the confidence
    /// score instead.
    pub fn interpret(&self, raw_text: &str) -> Interpretation {
        let entities = self.resolver.resolve(raw_text);
        let category = IntentClassifier::classify(raw_text);
        let confidence = confidence_for(&entities, category);

        debug!(
            ?entities,
            %category,
            confidence,
            "Interpreted utterance"
        );

        Interpretation {
            raw_text: raw_text.to_string(),
            entities,
            category,
            confidence,
        }
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

/// Signal-strength score: entities found +0.5, category known +0.3,
/// statement-specific category +0.2, clamped to [0, 1].
fn confidence_for(entities: &[String], category: AnalysisCategory) -> f32 {
    let mut confidence: f32 = 0.0;

    if !entities.is_empty() {
        confidence += 0.5;
    }
    if category.is_known() {
        confidence += 0.3;
    }
    if category.is_statement() {
        confidence += 0.2;
    }

    confidence.min(1.0)
}
