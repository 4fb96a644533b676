//! The headline figures shown at the top of the dashboard.

use crate::{
    category::CategoryCatalog,
    dashboard::aggregation::{
        CategoryTotal, balance, category_percent, category_totals, total_expense, total_income,
    },
    transaction::TransactionRecord,
};

/// Totals derived from a user's transactions.
#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    /// The sum of all income.
    pub total_income: f64,
    /// The sum of all allowed expenses.
    pub total_expense: f64,
    /// Income minus expenses.
    pub balance: f64,
    /// The expenses of each category, catalog categories first.
    pub category_totals: Vec<CategoryTotal>,
    /// How many transactions the summary covers.
    pub transaction_count: usize,
}

impl Summary {
    /// Compute the summary of `records`.
    pub fn compute(records: &[TransactionRecord], catalog: &CategoryCatalog) -> Self {
        Self {
            total_income: total_income(records),
            total_expense: total_expense(records, catalog),
            balance: balance(records, catalog),
            category_totals: category_totals(records, catalog),
            transaction_count: records.len(),
        }
    }

    /// The summary of no transactions: all figures zero, every catalog category listed.
    pub fn empty(catalog: &CategoryCatalog) -> Self {
        Self::compute(&[], catalog)
    }

    /// The expense total of `category`, 0 if the category is not listed.
    pub fn category_total(&self, category: &str) -> f64 {
        self.category_totals
            .iter()
            .find(|total| total.name == category)
            .map_or(0.0, |total| total.total)
    }

    /// The percentage of all category spending that went to `category`.
    pub fn category_percent(&self, category: &str) -> f64 {
        category_percent(&self.category_totals, category)
    }
}
