//! Dashboard module
//!
//! Turns a user's transactions into the figures shown on the dashboard:
//! income, expenses and balance, spending per category, the most recent
//! transactions and progress against the monthly budget.

mod aggregation;
mod summary;

pub use aggregation::{
    CategoryTotal, balance, budget_progress, category_percent, category_totals, recent,
    total_expense, total_income,
};
pub use summary::Summary;

use crate::{
    category::{CategoryCatalog, CategoryDefinition},
    config::DashboardConfig,
    transaction::TransactionRecord,
};

/// One row of the spending breakdown.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryBreakdown {
    /// The category name as recorded on the transactions.
    pub name: String,
    /// How to display the category. Unknown categories use the "Other" definition.
    pub definition: CategoryDefinition,
    /// The amount spent in the category.
    pub total: f64,
    /// The share of all category spending, from 0 to 100.
    pub percent: f64,
}

/// Spending compared to the monthly budget.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BudgetProgress {
    /// The monthly budget.
    pub budget: f64,
    /// The total expenses.
    pub spent: f64,
    /// The budget left, negative when overspent.
    pub remaining: f64,
    /// `spent / budget`, 0 when the budget is 0.
    pub progress: f64,
}

impl BudgetProgress {
    /// Compare `spent` against `budget`.
    pub fn new(spent: f64, budget: f64) -> Self {
        Self {
            budget,
            spent,
            remaining: budget - spent,
            progress: budget_progress(spent, budget),
        }
    }

    /// Whether more was spent than budgeted.
    pub fn is_over_budget(&self) -> bool {
        self.spent > self.budget
    }
}

/// Everything the dashboard displays.
#[derive(Debug, Clone, PartialEq)]
pub struct Dashboard {
    /// Income, expenses and balance.
    pub summary: Summary,
    /// Spending per category with display details.
    pub breakdown: Vec<CategoryBreakdown>,
    /// The most recent transactions, newest first.
    pub recent: Vec<TransactionRecord>,
    /// Spending against the monthly budget.
    pub budget: BudgetProgress,
}

impl Dashboard {
    /// Build the dashboard for `records`.
    pub fn build(
        records: &[TransactionRecord],
        catalog: &CategoryCatalog,
        config: &DashboardConfig,
    ) -> Self {
        Self::from_summary(Summary::compute(records, catalog), records, catalog, config)
    }

    /// Build the dashboard from an already computed summary of `records`.
    pub fn from_summary(
        summary: Summary,
        records: &[TransactionRecord],
        catalog: &CategoryCatalog,
        config: &DashboardConfig,
    ) -> Self {
        let breakdown = summary
            .category_totals
            .iter()
            .map(|total| CategoryBreakdown {
                name: total.name.clone(),
                definition: catalog.display_definition(&total.name).clone(),
                total: total.total,
                percent: summary.category_percent(&total.name),
            })
            .collect();

        Self {
            budget: BudgetProgress::new(summary.total_expense, config.monthly_budget),
            breakdown,
            recent: recent(records, config.recent_limit),
            summary,
        }
    }
}
