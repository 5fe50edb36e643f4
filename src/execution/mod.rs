//! Step executor: deterministic plan execution
//!
//! Runs plan steps honoring the dependency partial order. Steps whose
//! dependencies are all satisfied run concurrently, bounded by an
//! in-flight semaphore; a step whose dependency failed is recorded as
//! skipped without invocation. Transient failures (timeouts, network)
//! are retried per the policy; validation rejections never are. The
//! executor always returns a complete trace — it only errors on
//! programmer-level conditions such as a malformed plan.

pub mod retry;

pub use retry::RetryPolicy;

use crate::error::OrchestrationError;
use crate::models::{
    ExecutionPlan, ExecutionTrace, StepOperation, StepResult, StepStatus,
};
use crate::providers::{AnalysisToolset, CompanyDataset, DataProvider};
use crate::Result;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

const DEFAULT_STEP_TIMEOUT: Duration = Duration::from_secs(30);

/// Cap on same-tier concurrency, protecting provider rate limits
const DEFAULT_MAX_IN_FLIGHT: usize = 4;

pub struct StepExecutor {
    provider: Arc<dyn DataProvider>,
    toolset: Arc<dyn AnalysisToolset>,
    retry: RetryPolicy,
    step_timeout: Duration,
    in_flight: Arc<Semaphore>,
}

impl StepExecutor {
    pub fn new(provider: Arc<dyn DataProvider>, toolset: Arc<dyn AnalysisToolset>) -> Self {
        Self {
            provider,
            toolset,
            retry: RetryPolicy::default(),
            step_timeout: DEFAULT_STEP_TIMEOUT,
            in_flight: Arc::new(Semaphore::new(DEFAULT_MAX_IN_FLIGHT)),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_step_timeout(mut self, timeout: Duration) -> Self {
        self.step_timeout = timeout;
        self
    }

    pub fn with_max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.in_flight = Arc::new(Semaphore::new(max_in_flight.max(1)));
        self
    }

    /// Execute every plan step to a terminal status and return the trace.
    pub async fn execute(&self, plan: &ExecutionPlan) -> Result<ExecutionTrace> {
        plan.validate()?;

        let mut results: Vec<Option<StepResult>> = vec![None; plan.len()];
        let mut datasets: HashMap<usize, CompanyDataset> = HashMap::new();

        debug!(step_count = plan.len(), "Starting plan execution");

        while results.iter().any(Option::is_none) {
            let mut runnable: Vec<(usize, StepInput)> = Vec::new();
            let mut progressed = false;

            for (idx, step) in plan.steps.iter().enumerate() {
                if results[idx].is_some() {
                    continue;
                }
                if !step.depends_on.iter().all(|d| results[*d].is_some()) {
                    continue;
                }

                let failed_deps: Vec<usize> = step
                    .depends_on
                    .iter()
                    .filter(|d| {
                        results[**d]
                            .as_ref()
                            .map(|r| r.status != StepStatus::Ok)
                            .unwrap_or(true)
                    })
                    .copied()
                    .collect();

                if !failed_deps.is_empty() {
                    warn!(
                        step_index = idx,
                        ?failed_deps,
                        "Skipping step due to failed dependencies"
                    );
                    results[idx] = Some(StepResult::skipped(
                        idx,
                        format!("dependencies not satisfied: {:?}", failed_deps),
                    ));
                    progressed = true;
                    continue;
                }

                match gather_input(idx, step.depends_on.as_slice(), &step.operation, &datasets) {
                    Ok(input) => {
                        runnable.push((idx, input));
                        progressed = true;
                    }
                    Err(e) => {
                        // Internal inconsistency, surfaced on the step itself
                        results[idx] = Some(StepResult::failed(idx, e.to_string(), 0, 0));
                        progressed = true;
                    }
                }
            }

            if runnable.is_empty() {
                if progressed {
                    continue;
                }
                // validate() makes this unreachable, but don't loop forever
                return Err(OrchestrationError::PlanConstruction(
                    "plan has unresolvable dependencies".to_string(),
                ));
            }

            let mut join_set = JoinSet::new();
            for (idx, input) in runnable {
                let provider = Arc::clone(&self.provider);
                let toolset = Arc::clone(&self.toolset);
                let retry = self.retry.clone();
                let step_timeout = self.step_timeout;
                let semaphore = Arc::clone(&self.in_flight);

                join_set.spawn(async move {
                    let _permit = match semaphore.acquire_owned().await {
                        Ok(permit) => permit,
                        Err(_) => {
                            return (
                                idx,
                                StepResult::failed(idx, "executor shut down".to_string(), 0, 0),
                                None,
                            );
                        }
                    };
                    run_step(idx, input, provider, toolset, retry, step_timeout).await
                });
            }

            while let Some(joined) = join_set.join_next().await {
                let (idx, result, dataset) = joined.map_err(|e| {
                    OrchestrationError::Execution(format!("step task failed: {}", e))
                })?;
                if let Some(dataset) = dataset {
                    datasets.insert(idx, dataset);
                }
                results[idx] = Some(result);
            }
        }

        let trace = ExecutionTrace {
            results: results.into_iter().flatten().collect(),
        };

        debug!(
            ok = trace.ok_count(),
            total = trace.results.len(),
            "Plan execution completed"
        );

        Ok(trace)
    }
}

/// A step's operation together with the upstream data it consumes
enum StepInput {
    Validate {
        entity: String,
    },
    Fetch {
        entity: String,
    },
    Analyze {
        category: crate::models::AnalysisCategory,
        dataset: CompanyDataset,
    },
    Compare {
        category: crate::models::AnalysisCategory,
        datasets: Vec<CompanyDataset>,
    },
}

fn gather_input(
    idx: usize,
    depends_on: &[usize],
    operation: &StepOperation,
    datasets: &HashMap<usize, CompanyDataset>,
) -> Result<StepInput> {
    match operation {
        StepOperation::ValidateEntity { entity } => Ok(StepInput::Validate {
            entity: entity.clone(),
        }),
        StepOperation::FetchData { entity } => Ok(StepInput::Fetch {
            entity: entity.clone(),
        }),
        StepOperation::RunAnalysis { entity, category } => {
            let dataset = depends_on
                .iter()
                .find_map(|d| datasets.get(d))
                .cloned()
                .ok_or_else(|| {
                    OrchestrationError::Execution(format!(
                        "step {} has no fetched dataset for {}",
                        idx, entity
                    ))
                })?;
            Ok(StepInput::Analyze {
                category: *category,
                dataset,
            })
        }
        StepOperation::RunComparison { entities, category } => {
            let mut gathered = Vec::with_capacity(depends_on.len());
            for dep in depends_on {
                let dataset = datasets.get(dep).cloned().ok_or_else(|| {
                    OrchestrationError::Execution(format!(
                        "step {} missing dataset from step {}",
                        idx, dep
                    ))
                })?;
                gathered.push(dataset);
            }
            if gathered.len() < entities.len() {
                return Err(OrchestrationError::Execution(format!(
                    "step {} expected {} datasets, found {}",
                    idx,
                    entities.len(),
                    gathered.len()
                )));
            }
            Ok(StepInput::Compare {
                category: *category,
                datasets: gathered,
            })
        }
    }
}

struct StepSuccess {
    payload: serde_json::Value,
    dataset: Option<CompanyDataset>,
}

async fn run_step(
    idx: usize,
    input: StepInput,
    provider: Arc<dyn DataProvider>,
    toolset: Arc<dyn AnalysisToolset>,
    retry: RetryPolicy,
    step_timeout: Duration,
) -> (usize, StepResult, Option<CompanyDataset>) {
    let started = Instant::now();
    let mut attempts = 0u32;

    loop {
        attempts += 1;

        let invoked = tokio::time::timeout(
            step_timeout,
            invoke(&input, provider.as_ref(), toolset.as_ref()),
        )
        .await;

        let outcome = match invoked {
            Ok(outcome) => outcome,
            Err(_) => Err(OrchestrationError::Transient(format!(
                "step timed out after {:?}",
                step_timeout
            ))),
        };

        match outcome {
            Ok(success) => {
                let duration_ms = started.elapsed().as_millis() as u64;
                return (
                    idx,
                    StepResult::ok(idx, success.payload, attempts, duration_ms),
                    success.dataset,
                );
            }
            Err(e) if retry.should_retry(&e, attempts) => {
                warn!(
                    step_index = idx,
                    attempts,
                    error = %e,
                    "Transient step failure, retrying"
                );
                tokio::time::sleep(retry.backoff_for(attempts)).await;
            }
            Err(e) => {
                let duration_ms = started.elapsed().as_millis() as u64;
                warn!(step_index = idx, attempts, error = %e, "Step failed");
                return (
                    idx,
                    StepResult::failed(idx, e.to_string(), attempts, duration_ms),
                    None,
                );
            }
        }
    }
}

async fn invoke(
    input: &StepInput,
    provider: &dyn DataProvider,
    toolset: &dyn AnalysisToolset,
) -> Result<StepSuccess> {
    match input {
        StepInput::Validate { entity } => {
            let validation = provider.validate(entity).await?;
            if !validation.valid {
                let reason = validation
                    .reason
                    .unwrap_or_else(|| "not recognized".to_string());
                // Terminal: a bad ticker never improves on retry
                return Err(OrchestrationError::EntityNotFound(format!(
                    "{}: {}",
                    entity, reason
                )));
            }
            Ok(StepSuccess {
                payload: serde_json::to_value(&validation)?,
                dataset: None,
            })
        }
        StepInput::Fetch { entity } => {
            let dataset = provider.fetch(entity).await?;
            Ok(StepSuccess {
                payload: serde_json::to_value(&dataset)?,
                dataset: Some(dataset),
            })
        }
        StepInput::Analyze { category, dataset } => {
            let result = toolset.run(*category, dataset).await?;
            Ok(StepSuccess {
                payload: serde_json::to_value(&result)?,
                dataset: None,
            })
        }
        StepInput::Compare { category, datasets } => {
            let result = toolset.compare(*category, datasets).await?;
            Ok(StepSuccess {
                payload: serde_json::to_value(&result)?,
                dataset: None,
            })
        }
    }
}
