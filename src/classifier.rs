//! Intent classification: free text → analysis category
//!
//! Keyword-set membership, case-insensitive and punctuation-tolerant.
//! When several categories match, the most specific wins:
//! comparison > statements > metrics > recommendations > profile.

use crate::models::AnalysisCategory;

/// Static keyword lists — zero allocation
const COMPARISON_KEYWORDS: &[&str] = &[
    "compare", "comparison", "vs", "versus", "against", "peer", "competitors",
];

const INCOME_STATEMENT_KEYWORDS: &[&str] = &[
    "income statement", "income", "revenue", "earnings", "profit",
];

const BALANCE_SHEET_KEYWORDS: &[&str] = &[
    "balance sheet", "balance", "assets", "liabilities", "equity",
];

const CASH_FLOW_KEYWORDS: &[&str] = &["cash flow", "cashflow", "cash"];

const METRICS_KEYWORDS: &[&str] = &[
    "metrics", "ratios", "financial", "performance", "valuation", "key metrics",
];

const RECOMMENDATION_KEYWORDS: &[&str] = &[
    "recommendations", "recommendation", "analyst", "rating", "price target",
];

const PROFILE_KEYWORDS: &[&str] = &[
    "profile", "company", "info", "information", "about", "overview", "summary",
];

/// Priority order: first matching category wins
const CATEGORY_TABLE: &[(AnalysisCategory, &[&str])] = &[
    (AnalysisCategory::Comparison, COMPARISON_KEYWORDS),
    (AnalysisCategory::IncomeStatement, INCOME_STATEMENT_KEYWORDS),
    (AnalysisCategory::BalanceSheet, BALANCE_SHEET_KEYWORDS),
    (AnalysisCategory::CashFlow, CASH_FLOW_KEYWORDS),
    (AnalysisCategory::Metrics, METRICS_KEYWORDS),
    (AnalysisCategory::Recommendations, RECOMMENDATION_KEYWORDS),
    (AnalysisCategory::Profile, PROFILE_KEYWORDS),
];

/// Intent classifier
pub struct IntentClassifier;

impl IntentClassifier {
    /// Classify free text into an analysis category; `Unknown` when no
    /// keyword set matches.
    pub fn classify(text: &str) -> AnalysisCategory {
        let normalized = normalize(text);

        for (category, keywords) in CATEGORY_TABLE {
            if keywords.iter().any(|kw| normalized.contains(kw)) {
                return *category;
            }
        }

        AnalysisCategory::Unknown
    }
}

/// Lowercase, punctuation mapped to spaces, whitespace collapsed, so
/// multi-word keywords match regardless of punctuation.
fn normalize(text: &str) -> String {
    let cleaned: String = text
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();

    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}
