//! Defines the core data models for transactions.

use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{category::CategoryName, document_store::DocumentId};

/// The store-assigned ID of a transaction.
pub type TransactionId = DocumentId;

/// Whether money was earned or spent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    /// Money earned, e.g. a salary payment.
    Income,
    /// Money spent.
    Expense,
}

impl Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionType::Income => write!(f, "income"),
            TransactionType::Expense => write!(f, "expense"),
        }
    }
}

impl FromStr for TransactionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "income" => Ok(TransactionType::Income),
            "expense" => Ok(TransactionType::Expense),
            other => Err(format!("\"{other}\" is not a transaction type, use income or expense")),
        }
    }
}

/// An expense or income, i.e. an event where money was either spent or earned.
///
/// Records are read from the store. To create one, validate a
/// [TransactionCandidate](crate::transaction::TransactionCandidate) and add it
/// through a [TransactionStore](crate::transaction::TransactionStore).
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionRecord {
    /// The ID of the transaction, assigned by the store.
    pub id: TransactionId,
    /// The amount of money spent or earned. Always positive; `type_` says which.
    pub amount: f64,
    /// The name of the category the transaction belongs to.
    ///
    /// Usually a category from the catalog, but records written by older
    /// clients may use any string.
    pub category: String,
    /// A text description of what the transaction was for. Empty if not given.
    pub description: String,
    /// Whether the transaction is income or an expense.
    pub type_: TransactionType,
    /// When the store created the transaction.
    pub created_at: Option<OffsetDateTime>,
}

/// A transaction that passed validation and is ready to be stored.
///
/// Create one with [validate](crate::transaction::validate).
#[derive(Debug, Clone, PartialEq)]
pub struct NewTransaction {
    pub(crate) amount: f64,
    pub(crate) category: CategoryName,
    pub(crate) description: String,
    pub(crate) type_: TransactionType,
}

impl NewTransaction {
    /// The amount of money, greater than zero.
    pub fn amount(&self) -> f64 {
        self.amount
    }

    /// The category the transaction is tagged with.
    pub fn category(&self) -> &CategoryName {
        &self.category
    }

    /// The description, possibly empty.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Whether the transaction is income or an expense.
    pub fn type_(&self) -> TransactionType {
        self.type_
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use crate::transaction::TransactionType;

    #[test]
    fn parses_transaction_type() {
        assert_eq!(
            TransactionType::from_str(" Income"),
            Ok(TransactionType::Income)
        );
        assert_eq!(
            TransactionType::from_str("expense"),
            Ok(TransactionType::Expense)
        );
        assert!(TransactionType::from_str("transfer").is_err());
    }

    #[test]
    fn serializes_as_lowercase() {
        let json = serde_json::to_string(&TransactionType::Expense).unwrap();

        assert_eq!(json, "\"expense\"");
    }
}
