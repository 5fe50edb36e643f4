//! External capability contracts
//!
//! The orchestrator consumes two collaborators through these traits: the
//! data provider (ticker validation + dataset fetch, idempotent and safe
//! to retry) and the analysis toolset (per-company analysis and
//! multi-company comparison). The in-memory adapters here back the CLI
//! and the test suite; `http` holds the remote provider adapter.

pub mod http;

use crate::error::OrchestrationError;
use crate::models::AnalysisCategory;
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;

pub use http::HttpDataProvider;

//
// ================= Contracts =================
//

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityValidation {
    pub entity: String,
    pub valid: bool,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompanyDataset {
    pub entity: String,
    pub company_name: String,
    pub sector: String,
    pub profile: Value,
    pub metrics: Value,
    pub statements: Value,
    pub recommendations: Value,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub entity: String,
    pub category: AnalysisCategory,
    pub summary: String,
    pub details: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonResult {
    pub entities: Vec<String>,
    pub summary: String,
    pub table: Value,
}

#[async_trait]
pub trait DataProvider: Send + Sync {
    async fn validate(&self, entity: &str) -> Result<EntityValidation>;
    async fn fetch(&self, entity: &str) -> Result<CompanyDataset>;
}

#[async_trait]
pub trait AnalysisToolset: Send + Sync {
    async fn run(
        &self,
        category: AnalysisCategory,
        dataset: &CompanyDataset,
    ) -> Result<AnalysisResult>;

    async fn compare(
        &self,
        category: AnalysisCategory,
        datasets: &[CompanyDataset],
    ) -> Result<ComparisonResult>;
}

//
// ================= In-Memory Data Provider =================
//

struct CompanyRecord {
    name: &'static str,
    sector: &'static str,
    market_cap: f64,
    trailing_pe: f64,
    price_to_sales: f64,
    price_to_book: f64,
    profit_margin: f64,
    return_on_equity: f64,
    revenue: f64,
    net_income: f64,
    total_assets: f64,
    total_liabilities: f64,
    operating_cash_flow: f64,
    free_cash_flow: f64,
    analyst_rating: &'static str,
}

const B: f64 = 1_000_000_000.0;

fn seed_companies() -> HashMap<&'static str, CompanyRecord> {
    let mut m = HashMap::new();
    m.insert("AAPL", CompanyRecord {
        name: "Apple Inc.",
        sector: "Technology",
        market_cap: 2900.0 * B,
        trailing_pe: 29.5,
        price_to_sales: 7.5,
        price_to_book: 45.0,
        profit_margin: 0.25,
        return_on_equity: 1.47,
        revenue: 383.0 * B,
        net_income: 97.0 * B,
        total_assets: 352.0 * B,
        total_liabilities: 290.0 * B,
        operating_cash_flow: 110.5 * B,
        free_cash_flow: 99.6 * B,
        analyst_rating: "Buy",
    });
    m.insert("MSFT", CompanyRecord {
        name: "Microsoft Corporation",
        sector: "Technology",
        market_cap: 3100.0 * B,
        trailing_pe: 35.2,
        price_to_sales: 12.8,
        price_to_book: 12.9,
        profit_margin: 0.36,
        return_on_equity: 0.39,
        revenue: 227.0 * B,
        net_income: 82.5 * B,
        total_assets: 470.6 * B,
        total_liabilities: 232.3 * B,
        operating_cash_flow: 102.0 * B,
        free_cash_flow: 70.6 * B,
        analyst_rating: "Strong Buy",
    });
    m.insert("GOOGL", CompanyRecord {
        name: "Alphabet Inc.",
        sector: "Communication Services",
        market_cap: 2100.0 * B,
        trailing_pe: 25.7,
        price_to_sales: 6.3,
        price_to_book: 6.8,
        profit_margin: 0.26,
        return_on_equity: 0.29,
        revenue: 328.0 * B,
        net_income: 85.0 * B,
        total_assets: 430.0 * B,
        total_liabilities: 123.0 * B,
        operating_cash_flow: 110.9 * B,
        free_cash_flow: 69.5 * B,
        analyst_rating: "Buy",
    });
    m.insert("AMZN", CompanyRecord {
        name: "Amazon.com, Inc.",
        sector: "Consumer Cyclical",
        market_cap: 1900.0 * B,
        trailing_pe: 52.3,
        price_to_sales: 3.2,
        price_to_book: 9.1,
        profit_margin: 0.07,
        return_on_equity: 0.20,
        revenue: 590.0 * B,
        net_income: 37.7 * B,
        total_assets: 555.0 * B,
        total_liabilities: 328.0 * B,
        operating_cash_flow: 99.1 * B,
        free_cash_flow: 44.5 * B,
        analyst_rating: "Buy",
    });
    m.insert("TSLA", CompanyRecord {
        name: "Tesla, Inc.",
        sector: "Consumer Cyclical",
        market_cap: 780.0 * B,
        trailing_pe: 68.9,
        price_to_sales: 8.1,
        price_to_book: 12.3,
        profit_margin: 0.13,
        return_on_equity: 0.22,
        revenue: 96.8 * B,
        net_income: 12.6 * B,
        total_assets: 106.6 * B,
        total_liabilities: 43.0 * B,
        operating_cash_flow: 13.3 * B,
        free_cash_flow: 4.4 * B,
        analyst_rating: "Hold",
    });
    m.insert("META", CompanyRecord {
        name: "Meta Platforms, Inc.",
        sector: "Communication Services",
        market_cap: 1250.0 * B,
        trailing_pe: 27.8,
        price_to_sales: 9.3,
        price_to_book: 8.2,
        profit_margin: 0.29,
        return_on_equity: 0.33,
        revenue: 134.9 * B,
        net_income: 39.1 * B,
        total_assets: 229.6 * B,
        total_liabilities: 76.5 * B,
        operating_cash_flow: 71.1 * B,
        free_cash_flow: 43.8 * B,
        analyst_rating: "Buy",
    });
    m.insert("NVDA", CompanyRecord {
        name: "NVIDIA Corporation",
        sector: "Technology",
        market_cap: 2200.0 * B,
        trailing_pe: 65.4,
        price_to_sales: 36.9,
        price_to_book: 50.1,
        profit_margin: 0.49,
        return_on_equity: 0.91,
        revenue: 60.9 * B,
        net_income: 29.8 * B,
        total_assets: 65.7 * B,
        total_liabilities: 22.7 * B,
        operating_cash_flow: 28.1 * B,
        free_cash_flow: 27.0 * B,
        analyst_rating: "Strong Buy",
    });
    m.insert("JPM", CompanyRecord {
        name: "JPMorgan Chase & Co.",
        sector: "Financial Services",
        market_cap: 560.0 * B,
        trailing_pe: 11.8,
        price_to_sales: 3.5,
        price_to_book: 1.9,
        profit_margin: 0.32,
        return_on_equity: 0.17,
        revenue: 158.1 * B,
        net_income: 49.6 * B,
        total_assets: 3875.0 * B,
        total_liabilities: 3547.0 * B,
        operating_cash_flow: 15.2 * B,
        free_cash_flow: 12.9 * B,
        analyst_rating: "Buy",
    });
    m
}

/// Canned-dataset provider for development and tests
pub struct InMemoryDataProvider {
    companies: HashMap<&'static str, CompanyRecord>,
}

impl InMemoryDataProvider {
    pub fn new() -> Self {
        Self {
            companies: seed_companies(),
        }
    }
}

impl Default for InMemoryDataProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DataProvider for InMemoryDataProvider {
    async fn validate(&self, entity: &str) -> Result<EntityValidation> {
        if self.companies.contains_key(entity) {
            Ok(EntityValidation {
                entity: entity.to_string(),
                valid: true,
                reason: None,
            })
        } else {
            Ok(EntityValidation {
                entity: entity.to_string(),
                valid: false,
                reason: Some("not a recognized ticker symbol".to_string()),
            })
        }
    }

    async fn fetch(&self, entity: &str) -> Result<CompanyDataset> {
        let record = self
            .companies
            .get(entity)
            .ok_or_else(|| OrchestrationError::EntityNotFound(entity.to_string()))?;

        Ok(CompanyDataset {
            entity: entity.to_string(),
            company_name: record.name.to_string(),
            sector: record.sector.to_string(),
            profile: json!({
                "name": record.name,
                "sector": record.sector,
            }),
            metrics: json!({
                "marketCap": record.market_cap,
                "trailingPE": record.trailing_pe,
                "priceToSalesTrailing12Months": record.price_to_sales,
                "priceToBook": record.price_to_book,
                "profitMargins": record.profit_margin,
                "returnOnEquity": record.return_on_equity,
            }),
            statements: json!({
                "income": {
                    "totalRevenue": record.revenue,
                    "netIncome": record.net_income,
                },
                "balance": {
                    "totalAssets": record.total_assets,
                    "totalLiabilities": record.total_liabilities,
                    "totalEquity": record.total_assets - record.total_liabilities,
                },
                "cash_flow": {
                    "operatingCashFlow": record.operating_cash_flow,
                    "freeCashFlow": record.free_cash_flow,
                },
            }),
            recommendations: json!({
                "consensus": record.analyst_rating,
            }),
            fetched_at: Utc::now(),
        })
    }
}

//
// ================= In-Memory Analysis Toolset =================
//

/// Human-readable labels for comparison metrics
const COMPARISON_METRICS: &[(&str, &str)] = &[
    ("marketCap", "Market Cap"),
    ("trailingPE", "P/E Ratio"),
    ("priceToSalesTrailing12Months", "P/S Ratio"),
    ("priceToBook", "P/B Ratio"),
    ("profitMargins", "Profit Margin (%)"),
    ("returnOnEquity", "ROE (%)"),
];

/// Deterministic local analysis over fetched datasets
pub struct InMemoryAnalysisToolset;

impl InMemoryAnalysisToolset {
    pub fn new() -> Self {
        Self
    }
}

impl Default for InMemoryAnalysisToolset {
    fn default() -> Self {
        Self::new()
    }
}

fn metric(dataset: &CompanyDataset, key: &str) -> Option<f64> {
    dataset.metrics.get(key).and_then(Value::as_f64)
}

fn statement(dataset: &CompanyDataset, section: &str, key: &str) -> Option<f64> {
    dataset
        .statements
        .get(section)
        .and_then(|s| s.get(key))
        .and_then(Value::as_f64)
}

fn billions(value: f64) -> String {
    format!("${:.1}B", value / B)
}

#[async_trait]
impl AnalysisToolset for InMemoryAnalysisToolset {
    async fn run(
        &self,
        category: AnalysisCategory,
        dataset: &CompanyDataset,
    ) -> Result<AnalysisResult> {
        let entity = &dataset.entity;
        let name = &dataset.company_name;

        let (summary, details) = match category {
            AnalysisCategory::Profile => (
                format!(
                    "{} ({}) operates in the {} sector with a market capitalization of about {}.",
                    name,
                    entity,
                    dataset.sector,
                    metric(dataset, "marketCap").map(billions).unwrap_or_else(|| "n/a".to_string()),
                ),
                dataset.profile.clone(),
            ),
            AnalysisCategory::Metrics => (
                format!(
                    "Key metrics for {}: P/E {:.1}, P/S {:.1}, P/B {:.1}, profit margin {:.1}%, ROE {:.1}%.",
                    entity,
                    metric(dataset, "trailingPE").unwrap_or(f64::NAN),
                    metric(dataset, "priceToSalesTrailing12Months").unwrap_or(f64::NAN),
                    metric(dataset, "priceToBook").unwrap_or(f64::NAN),
                    metric(dataset, "profitMargins").unwrap_or(f64::NAN) * 100.0,
                    metric(dataset, "returnOnEquity").unwrap_or(f64::NAN) * 100.0,
                ),
                dataset.metrics.clone(),
            ),
            AnalysisCategory::IncomeStatement => (
                format!(
                    "{} reported revenue of {} and net income of {} in the latest fiscal year.",
                    entity,
                    statement(dataset, "income", "totalRevenue").map(billions).unwrap_or_else(|| "n/a".to_string()),
                    statement(dataset, "income", "netIncome").map(billions).unwrap_or_else(|| "n/a".to_string()),
                ),
                dataset.statements.get("income").cloned().unwrap_or(Value::Null),
            ),
            AnalysisCategory::BalanceSheet => (
                format!(
                    "{} holds {} in total assets against {} in liabilities, leaving {} of equity.",
                    entity,
                    statement(dataset, "balance", "totalAssets").map(billions).unwrap_or_else(|| "n/a".to_string()),
                    statement(dataset, "balance", "totalLiabilities").map(billions).unwrap_or_else(|| "n/a".to_string()),
                    statement(dataset, "balance", "totalEquity").map(billions).unwrap_or_else(|| "n/a".to_string()),
                ),
                dataset.statements.get("balance").cloned().unwrap_or(Value::Null),
            ),
            AnalysisCategory::CashFlow => (
                format!(
                    "{} generated {} in operating cash flow and {} in free cash flow.",
                    entity,
                    statement(dataset, "cash_flow", "operatingCashFlow").map(billions).unwrap_or_else(|| "n/a".to_string()),
                    statement(dataset, "cash_flow", "freeCashFlow").map(billions).unwrap_or_else(|| "n/a".to_string()),
                ),
                dataset.statements.get("cash_flow").cloned().unwrap_or(Value::Null),
            ),
            AnalysisCategory::Recommendations => (
                format!(
                    "The analyst consensus on {} is currently \"{}\".",
                    entity,
                    dataset
                        .recommendations
                        .get("consensus")
                        .and_then(Value::as_str)
                        .unwrap_or("not rated"),
                ),
                dataset.recommendations.clone(),
            ),
            AnalysisCategory::Comparison | AnalysisCategory::Unknown => {
                return Err(OrchestrationError::Analysis(format!(
                    "no single-company analysis for category {:?}",
                    category
                )));
            }
        };

        Ok(AnalysisResult {
            entity: entity.clone(),
            category,
            summary,
            details,
        })
    }

    async fn compare(
        &self,
        _category: AnalysisCategory,
        datasets: &[CompanyDataset],
    ) -> Result<ComparisonResult> {
        if datasets.len() < 2 {
            return Err(OrchestrationError::Analysis(
                "comparison requires at least two datasets".to_string(),
            ));
        }

        let mut table = serde_json::Map::new();
        for dataset in datasets {
            let mut row = serde_json::Map::new();
            for (key, label) in COMPARISON_METRICS {
                if let Some(value) = metric(dataset, key) {
                    row.insert((*label).to_string(), json!(value));
                }
            }
            table.insert(dataset.entity.clone(), Value::Object(row));
        }

        // Largest market cap and cheapest earnings multiple anchor the summary
        let largest = datasets
            .iter()
            .max_by(|a, b| {
                let a = metric(a, "marketCap").unwrap_or(0.0);
                let b = metric(b, "marketCap").unwrap_or(0.0);
                a.total_cmp(&b)
            })
            .map(|d| d.entity.clone())
            .unwrap_or_default();

        let cheapest = datasets
            .iter()
            .filter(|d| metric(d, "trailingPE").is_some())
            .min_by(|a, b| {
                let a = metric(a, "trailingPE").unwrap_or(f64::MAX);
                let b = metric(b, "trailingPE").unwrap_or(f64::MAX);
                a.total_cmp(&b)
            })
            .map(|d| d.entity.clone());

        let entities: Vec<String> = datasets.iter().map(|d| d.entity.clone()).collect();
        let mut summary = format!(
            "Comparing {}: {} has the largest market capitalization",
            entities.join(", "),
            largest
        );
        if let Some(cheapest) = cheapest {
            summary.push_str(&format!(
                ", while {} trades at the lowest P/E multiple",
                cheapest
            ));
        }
        summary.push('.');

        Ok(ComparisonResult {
            entities,
            summary,
            table: Value::Object(table),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_validate_known_and_unknown() {
        let provider = InMemoryDataProvider::new();

        let ok = provider.validate("AAPL").await.unwrap();
        assert!(ok.valid);

        let bad = provider.validate("XYZ123NOTATICKER").await.unwrap();
        assert!(!bad.valid);
        assert!(bad.reason.is_some());
    }

    #[tokio::test]
    async fn test_fetch_unknown_is_not_found() {
        let provider = InMemoryDataProvider::new();
        let err = provider.fetch("NOPE").await.unwrap_err();
        assert!(matches!(err, OrchestrationError::EntityNotFound(_)));
    }

    #[tokio::test]
    async fn test_run_covers_every_concrete_category() {
        let provider = InMemoryDataProvider::new();
        let toolset = InMemoryAnalysisToolset::new();
        let dataset = provider.fetch("AAPL").await.unwrap();

        for category in [
            AnalysisCategory::Profile,
            AnalysisCategory::Metrics,
            AnalysisCategory::IncomeStatement,
            AnalysisCategory::BalanceSheet,
            AnalysisCategory::CashFlow,
            AnalysisCategory::Recommendations,
        ] {
            let result = toolset.run(category, &dataset).await.unwrap();
            assert!(!result.summary.is_empty(), "empty summary for {:?}", category);
            assert_eq!(result.entity, "AAPL");
        }
    }

    #[tokio::test]
    async fn test_compare_ranks_by_market_cap() {
        let provider = InMemoryDataProvider::new();
        let toolset = InMemoryAnalysisToolset::new();
        let datasets = vec![
            provider.fetch("AAPL").await.unwrap(),
            provider.fetch("MSFT").await.unwrap(),
        ];

        let result = toolset
            .compare(AnalysisCategory::Comparison, &datasets)
            .await
            .unwrap();

        assert_eq!(result.entities, vec!["AAPL".to_string(), "MSFT".to_string()]);
        assert!(result.summary.contains("MSFT"));
        assert!(result.table.get("AAPL").is_some());
    }

    #[tokio::test]
    async fn test_compare_requires_two_datasets() {
        let provider = InMemoryDataProvider::new();
        let toolset = InMemoryAnalysisToolset::new();
        let datasets = vec![provider.fetch("AAPL").await.unwrap()];

        assert!(toolset
            .compare(AnalysisCategory::Comparison, &datasets)
            .await
            .is_err());
    }
}
