//! Planner/router: resolved interpretation → execution plan
//!
//! An ordered decision table, first match wins:
//! 1. nothing resolvable → clarification (company and analysis)
//! 2. category but no company → clarification (company)
//! 3. one entity → validate → fetch → analyze chain
//! 4. several entities, comparison (or no stated category) → fan-out
//!    validates and fetches feeding one comparison step
//! 5. several entities, specific category → independent per-entity chains,
//!    never a forced comparison

use crate::models::{
    AnalysisCategory, ClarificationNeed, ClarificationRequest, ExecutionPlan, PlanStep,
    ResolvedInterpretation, StepOperation,
};
use crate::Result;
use tracing::debug;

/// What the planner decided for this turn
#[derive(Debug, Clone)]
pub enum PlannerDecision {
    Execute(ExecutionPlan),
    Clarify(ClarificationRequest),
}

pub struct Planner;

impl Planner {
    pub fn new() -> Self {
        Self
    }

    pub fn plan(&self, resolved: &ResolvedInterpretation) -> Result<PlannerDecision> {
        if resolved.entities.is_empty() {
            let need = if resolved.is_insufficient() {
                ClarificationNeed::CompanyAndAnalysis
            } else {
                ClarificationNeed::Company
            };
            debug!(?need, "Planner requesting clarification");
            return Ok(PlannerDecision::Clarify(ClarificationRequest::new(need)));
        }

        let plan = if resolved.entities.len() == 1 {
            single_entity_plan(&resolved.entities[0], effective_category(resolved.category))
        } else if resolved.category == AnalysisCategory::Comparison
            || !resolved.category.is_known()
        {
            // Several companies with no stated category implies comparison
            comparison_plan(&resolved.entities)
        } else {
            batch_plan(&resolved.entities, resolved.category)
        };

        plan.validate()?;

        debug!(
            step_count = plan.len(),
            entities = ?resolved.entities,
            category = %resolved.category,
            "Plan constructed"
        );

        Ok(PlannerDecision::Execute(plan))
    }
}

impl Default for Planner {
    fn default() -> Self {
        Self::new()
    }
}

/// A single company with no stated analysis gets a profile, the same
/// default the interactive menu used for "tell me about X".
fn effective_category(category: AnalysisCategory) -> AnalysisCategory {
    if category.is_known() {
        category
    } else {
        AnalysisCategory::Profile
    }
}

fn single_entity_plan(entity: &str, category: AnalysisCategory) -> ExecutionPlan {
    ExecutionPlan {
        steps: vec![
            PlanStep {
                operation: StepOperation::ValidateEntity {
                    entity: entity.to_string(),
                },
                depends_on: vec![],
            },
            PlanStep {
                operation: StepOperation::FetchData {
                    entity: entity.to_string(),
                },
                depends_on: vec![0],
            },
            PlanStep {
                operation: StepOperation::RunAnalysis {
                    entity: entity.to_string(),
                    category,
                },
                depends_on: vec![1],
            },
        ],
    }
}

/// N validates (independent) + N fetches (each on its own validate) + one
/// comparison depending on every fetch.
fn comparison_plan(entities: &[String]) -> ExecutionPlan {
    let n = entities.len();
    let mut steps = Vec::with_capacity(2 * n + 1);

    for entity in entities {
        steps.push(PlanStep {
            operation: StepOperation::ValidateEntity {
                entity: entity.clone(),
            },
            depends_on: vec![],
        });
    }
    for (i, entity) in entities.iter().enumerate() {
        steps.push(PlanStep {
            operation: StepOperation::FetchData {
                entity: entity.clone(),
            },
            depends_on: vec![i],
        });
    }
    steps.push(PlanStep {
        operation: StepOperation::RunComparison {
            entities: entities.to_vec(),
            category: AnalysisCategory::Comparison,
        },
        depends_on: (n..2 * n).collect(),
    });

    ExecutionPlan { steps }
}

/// Independent per-entity chains; "show AAPL and MSFT income statements"
/// yields two statement analyses, not a comparison.
fn batch_plan(entities: &[String], category: AnalysisCategory) -> ExecutionPlan {
    let mut steps = Vec::with_capacity(3 * entities.len());

    for entity in entities {
        let base = steps.len();
        steps.push(PlanStep {
            operation: StepOperation::ValidateEntity {
                entity: entity.clone(),
            },
            depends_on: vec![],
        });
        steps.push(PlanStep {
            operation: StepOperation::FetchData {
                entity: entity.clone(),
            },
            depends_on: vec![base],
        });
        steps.push(PlanStep {
            operation: StepOperation::RunAnalysis {
                entity: entity.clone(),
                category,
            },
            depends_on: vec![base + 1],
        });
    }

    ExecutionPlan { steps }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CategoryOrigin, EntityOrigin, Interpretation};

    fn resolved(entities: Vec<&str>, category: AnalysisCategory) -> ResolvedInterpretation {
        let entities: Vec<String> = entities.into_iter().map(String::from).collect();
        ResolvedInterpretation {
            interpretation: Interpretation {
                raw_text: String::new(),
                entities: entities.clone(),
                category,
                confidence: 0.5,
            },
            entity_origin: if entities.is_empty() {
                EntityOrigin::Unresolved
            } else {
                EntityOrigin::Utterance
            },
            category_origin: if category.is_known() {
                CategoryOrigin::Utterance
            } else {
                CategoryOrigin::Unknown
            },
            entities,
            category,
        }
    }

    #[test]
    fn test_rule1_nothing_resolvable_clarifies_both() {
        let planner = Planner::new();
        match planner.plan(&resolved(vec![], AnalysisCategory::Unknown)).unwrap() {
            PlannerDecision::Clarify(req) => {
                assert_eq!(req.need, ClarificationNeed::CompanyAndAnalysis)
            }
            PlannerDecision::Execute(_) => panic!("expected clarification"),
        }
    }

    #[test]
    fn test_rule2_category_only_clarifies_company() {
        let planner = Planner::new();
        match planner.plan(&resolved(vec![], AnalysisCategory::Metrics)).unwrap() {
            PlannerDecision::Clarify(req) => assert_eq!(req.need, ClarificationNeed::Company),
            PlannerDecision::Execute(_) => panic!("expected clarification"),
        }
    }

    #[test]
    fn test_rule3_single_entity_chain() {
        let planner = Planner::new();
        let decision = planner
            .plan(&resolved(vec!["AAPL"], AnalysisCategory::Profile))
            .unwrap();

        let PlannerDecision::Execute(plan) = decision else {
            panic!("expected a plan");
        };
        assert_eq!(plan.len(), 3);
        assert_eq!(plan.steps[0].depends_on, Vec::<usize>::new());
        assert_eq!(plan.steps[1].depends_on, vec![0]);
        assert_eq!(plan.steps[2].depends_on, vec![1]);
    }

    #[test]
    fn test_rule3_unknown_category_defaults_to_profile() {
        let planner = Planner::new();
        let decision = planner
            .plan(&resolved(vec!["AAPL"], AnalysisCategory::Unknown))
            .unwrap();

        let PlannerDecision::Execute(plan) = decision else {
            panic!("expected a plan");
        };
        assert_eq!(
            plan.steps[2].operation,
            StepOperation::RunAnalysis {
                entity: "AAPL".to_string(),
                category: AnalysisCategory::Profile,
            }
        );
    }

    #[test]
    fn test_rule4_comparison_fan_out() {
        let planner = Planner::new();
        let decision = planner
            .plan(&resolved(vec!["AAPL", "MSFT"], AnalysisCategory::Comparison))
            .unwrap();

        let PlannerDecision::Execute(plan) = decision else {
            panic!("expected a plan");
        };
        assert_eq!(plan.len(), 5);
        // validates are independent of each other
        assert!(plan.steps[0].depends_on.is_empty());
        assert!(plan.steps[1].depends_on.is_empty());
        // each fetch waits only on its own validate
        assert_eq!(plan.steps[2].depends_on, vec![0]);
        assert_eq!(plan.steps[3].depends_on, vec![1]);
        // the comparison waits on all fetches
        assert_eq!(plan.steps[4].depends_on, vec![2, 3]);
    }

    #[test]
    fn test_rule4_multiple_entities_without_category_imply_comparison() {
        let planner = Planner::new();
        let decision = planner
            .plan(&resolved(vec!["AAPL", "MSFT", "GOOGL"], AnalysisCategory::Unknown))
            .unwrap();

        let PlannerDecision::Execute(plan) = decision else {
            panic!("expected a plan");
        };
        assert_eq!(plan.len(), 7);
        assert!(matches!(
            plan.steps[6].operation,
            StepOperation::RunComparison { .. }
        ));
    }

    #[test]
    fn test_rule5_specific_category_stays_per_entity() {
        let planner = Planner::new();
        let decision = planner
            .plan(&resolved(
                vec!["AAPL", "MSFT"],
                AnalysisCategory::IncomeStatement,
            ))
            .unwrap();

        let PlannerDecision::Execute(plan) = decision else {
            panic!("expected a plan");
        };
        assert_eq!(plan.len(), 6);
        assert!(plan
            .steps
            .iter()
            .all(|s| !matches!(s.operation, StepOperation::RunComparison { .. })));
        // second chain is self-contained
        assert_eq!(plan.steps[4].depends_on, vec![3]);
        assert_eq!(plan.steps[5].depends_on, vec![4]);
    }

    #[test]
    fn test_plans_only_reference_earlier_steps() {
        let planner = Planner::new();
        let shapes = vec![
            resolved(vec!["AAPL"], AnalysisCategory::CashFlow),
            resolved(vec!["AAPL", "MSFT"], AnalysisCategory::Comparison),
            resolved(vec!["AAPL", "MSFT", "TSLA"], AnalysisCategory::Metrics),
        ];

        for shape in shapes {
            let PlannerDecision::Execute(plan) = planner.plan(&shape).unwrap() else {
                panic!("expected a plan");
            };
            for (idx, step) in plan.steps.iter().enumerate() {
                assert!(step.depends_on.iter().all(|d| *d < idx));
            }
        }
    }
}
