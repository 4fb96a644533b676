//! Derived figures over a set of transactions.
//!
//! Every function here is pure: the result depends only on the records and
//! the category catalog passed in.

use std::collections::BTreeMap;

use crate::{
    category::CategoryCatalog,
    document_store::compare_newest_first,
    transaction::{TransactionRecord, TransactionType},
};

/// The amount spent in one category.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryTotal {
    /// The category name as recorded on the transactions.
    pub name: String,
    /// The sum of the expenses in the category, never negative.
    pub total: f64,
}

/// The sum of all income.
pub fn total_income(records: &[TransactionRecord]) -> f64 {
    records
        .iter()
        .filter(|record| record.type_ == TransactionType::Income)
        .map(|record| record.amount)
        .sum()
}

/// The sum of all expenses, leaving out expenses tagged with a category that
/// may not be used for expenses (e.g. a mis-tagged "Salary").
pub fn total_expense(records: &[TransactionRecord], catalog: &CategoryCatalog) -> f64 {
    records
        .iter()
        .filter(|record| {
            record.type_ == TransactionType::Expense
                && !catalog.forbidden_as_expense().contains(&record.category)
        })
        .map(|record| record.amount)
        .sum()
}

/// Income minus expenses.
pub fn balance(records: &[TransactionRecord], catalog: &CategoryCatalog) -> f64 {
    total_income(records) - total_expense(records, catalog)
}

/// The expense total of each category.
///
/// Every catalog category is listed, in catalog order, even when nothing was
/// spent in it. Categories that are not in the catalog but appear on any
/// record follow, sorted by name.
pub fn category_totals(
    records: &[TransactionRecord],
    catalog: &CategoryCatalog,
) -> Vec<CategoryTotal> {
    let mut totals: Vec<CategoryTotal> = catalog
        .definitions()
        .iter()
        .map(|definition| CategoryTotal {
            name: definition.name.to_string(),
            total: 0.0,
        })
        .collect();
    let mut unknown: BTreeMap<&str, f64> = BTreeMap::new();

    for record in records {
        let amount = match record.type_ {
            TransactionType::Expense => record.amount,
            TransactionType::Income => 0.0,
        };

        match totals.iter_mut().find(|total| total.name == record.category) {
            Some(total) => total.total += amount,
            None => *unknown.entry(record.category.as_str()).or_insert(0.0) += amount,
        }
    }

    totals.extend(unknown.into_iter().map(|(name, total)| CategoryTotal {
        name: name.to_owned(),
        total,
    }));

    totals
}

/// The share of `category` in the total spent across all categories, as a
/// percentage from 0 to 100.
///
/// Returns 0 if nothing was spent or the category is not listed.
pub fn category_percent(totals: &[CategoryTotal], category: &str) -> f64 {
    let spent: f64 = totals.iter().map(|total| total.total).sum();

    if spent == 0.0 {
        return 0.0;
    }

    totals
        .iter()
        .find(|total| total.name == category)
        .map_or(0.0, |total| total.total / spent * 100.0)
}

/// The `count` most recent transactions, newest first.
///
/// Transactions with the same creation time, or without one, are ordered by
/// ID, highest first. Transactions without a creation time come last.
pub fn recent(records: &[TransactionRecord], count: usize) -> Vec<TransactionRecord> {
    let mut sorted: Vec<&TransactionRecord> = records.iter().collect();
    sorted.sort_by(|a, b| compare_newest_first(a.created_at, &a.id, b.created_at, &b.id));

    sorted.into_iter().take(count).cloned().collect()
}

/// How much of the budget has been spent, where 1.0 means all of it.
///
/// Returns 0 if the budget is 0. The result is not capped, so overspending
/// gives a value above 1.0.
pub fn budget_progress(spent: f64, budget: f64) -> f64 {
    if budget == 0.0 { 0.0 } else { spent / budget }
}
