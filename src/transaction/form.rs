//! Transaction input and the validation rules it must pass before reaching the store.

use serde::{Deserialize, Serialize};

use crate::{
    category::{CategoryCatalog, CategoryName},
    transaction::core::{NewTransaction, TransactionRecord, TransactionType},
};

/// Why a transaction was rejected.
///
/// The messages are written to be shown to the user as they are.
#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum ValidationError {
    /// The amount was missing, not a number, or not greater than zero.
    #[error("Please enter a valid amount.")]
    InvalidAmount,

    /// No category was given.
    #[error("Please select a category.")]
    MissingCategory,

    /// The category may not be used for this type of transaction, e.g. "Salary" as an expense.
    #[error("You cannot save or update {category} as an {type_}.")]
    ForbiddenCategoryForType {
        /// The rejected category.
        category: String,
        /// The transaction type the category was used with.
        type_: TransactionType,
    },
}

/// The raw fields of the add/edit transaction form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionForm {
    /// The amount as typed by the user.
    pub amount: String,
    /// The selected category.
    pub category: String,
    /// An optional description.
    #[serde(default)]
    pub description: String,
    /// Income or expense.
    #[serde(rename = "type")]
    pub type_: TransactionType,
}

/// A transaction that has not been validated yet.
///
/// `None` marks a field that is missing or could not be parsed.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionCandidate {
    /// The amount of money.
    pub amount: Option<f64>,
    /// The category name.
    pub category: Option<String>,
    /// A text description, may be empty.
    pub description: String,
    /// Income or expense.
    pub type_: TransactionType,
}

impl TransactionCandidate {
    /// Create a candidate from typed values.
    pub fn new(amount: f64, category: &str, type_: TransactionType) -> Self {
        Self {
            amount: Some(amount),
            category: Some(category.to_owned()),
            description: String::new(),
            type_,
        }
    }

    /// Set the description.
    pub fn description(mut self, description: &str) -> Self {
        self.description = description.to_owned();
        self
    }

    /// The candidate a [TransactionPatch] would produce when applied to `record`.
    pub fn from_patch(record: &TransactionRecord, patch: &TransactionPatch) -> Self {
        Self {
            amount: Some(patch.amount.unwrap_or(record.amount)),
            category: Some(
                patch
                    .category
                    .clone()
                    .unwrap_or_else(|| record.category.clone()),
            ),
            description: patch
                .description
                .clone()
                .unwrap_or_else(|| record.description.clone()),
            type_: patch.type_.unwrap_or(record.type_),
        }
    }
}

impl From<&TransactionForm> for TransactionCandidate {
    fn from(form: &TransactionForm) -> Self {
        Self {
            amount: parse_amount(&form.amount),
            category: Some(form.category.clone()),
            description: form.description.trim().to_owned(),
            type_: form.type_,
        }
    }
}

/// Parse an amount typed by the user, e.g. "12.50".
///
/// Returns `None` if the text is not a finite decimal number.
pub fn parse_amount(text: &str) -> Option<f64> {
    text.trim()
        .parse::<f64>()
        .ok()
        .filter(|amount| amount.is_finite())
}

/// Check a candidate against the transaction rules.
///
/// The checks run in order and the first failure is returned:
/// 1. the amount must be a finite number greater than zero,
/// 2. the category must not be empty,
/// 3. the catalog must allow the category for the transaction type.
///
/// # Errors
/// Returns the [ValidationError] of the first failed check.
pub fn validate(
    candidate: &TransactionCandidate,
    catalog: &CategoryCatalog,
) -> Result<NewTransaction, ValidationError> {
    let amount = match candidate.amount {
        Some(amount) if amount.is_finite() && amount > 0.0 => amount,
        _ => return Err(ValidationError::InvalidAmount),
    };

    let category = candidate
        .category
        .as_deref()
        .and_then(|category| CategoryName::new(category).ok())
        .ok_or(ValidationError::MissingCategory)?;

    if !catalog.is_allowed(candidate.type_, category.as_ref()) {
        return Err(ValidationError::ForbiddenCategoryForType {
            category: category.to_string(),
            type_: candidate.type_,
        });
    }

    Ok(NewTransaction {
        amount,
        category,
        description: candidate.description.clone(),
        type_: candidate.type_,
    })
}

/// A partial update to a transaction. Only the fields that are `Some` are written.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TransactionPatch {
    /// The new amount.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
    /// The new category.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// The new description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// The new transaction type.
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_: Option<TransactionType>,
}

impl TransactionPatch {
    /// Set the amount.
    pub fn amount(mut self, amount: f64) -> Self {
        self.amount = Some(amount);
        self
    }

    /// Set the category.
    pub fn category(mut self, category: &str) -> Self {
        self.category = Some(category.to_owned());
        self
    }

    /// Set the description.
    pub fn description(mut self, description: &str) -> Self {
        self.description = Some(description.to_owned());
        self
    }

    /// Set the transaction type.
    pub fn type_(mut self, type_: TransactionType) -> Self {
        self.type_ = Some(type_);
        self
    }

    /// Whether the patch changes nothing.
    pub fn is_empty(&self) -> bool {
        self.amount.is_none()
            && self.category.is_none()
            && self.description.is_none()
            && self.type_.is_none()
    }

    /// Replace the category with its trimmed form, as validation stores it.
    pub(crate) fn normalised(&self, validated: &NewTransaction) -> Self {
        Self {
            category: self
                .category
                .as_ref()
                .map(|_| validated.category.to_string()),
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        category::CategoryCatalog,
        transaction::{
            TransactionCandidate, TransactionForm, TransactionId, TransactionPatch,
            TransactionRecord, TransactionType, ValidationError, parse_amount, validate,
        },
    };

    fn catalog() -> CategoryCatalog {
        CategoryCatalog::reference()
    }

    #[test]
    fn accepts_positive_amount_with_known_category() {
        let candidate = TransactionCandidate::new(12.5, "Food", TransactionType::Expense)
            .description("Lunch");

        let got = validate(&candidate, &catalog()).unwrap();

        assert_eq!(got.amount(), 12.5);
        assert_eq!(got.category().as_ref(), "Food");
        assert_eq!(got.description(), "Lunch");
        assert_eq!(got.type_(), TransactionType::Expense);
    }

    #[test]
    fn rejects_zero_negative_and_non_finite_amounts() {
        for amount in [0.0, -0.01, -100.0, f64::NAN, f64::INFINITY] {
            let candidate = TransactionCandidate::new(amount, "Food", TransactionType::Expense);

            assert_eq!(
                validate(&candidate, &catalog()),
                Err(ValidationError::InvalidAmount),
                "want amount {amount} to be rejected"
            );
        }
    }

    #[test]
    fn rejects_missing_amount() {
        let candidate = TransactionCandidate {
            amount: None,
            ..TransactionCandidate::new(1.0, "Food", TransactionType::Expense)
        };

        assert_eq!(
            validate(&candidate, &catalog()),
            Err(ValidationError::InvalidAmount)
        );
    }

    #[test]
    fn rejects_missing_or_blank_category() {
        let blank = TransactionCandidate::new(1.0, "  ", TransactionType::Expense);
        let missing = TransactionCandidate {
            category: None,
            ..blank.clone()
        };

        assert_eq!(
            validate(&blank, &catalog()),
            Err(ValidationError::MissingCategory)
        );
        assert_eq!(
            validate(&missing, &catalog()),
            Err(ValidationError::MissingCategory)
        );
    }

    #[test]
    fn amount_is_checked_before_category() {
        let candidate = TransactionCandidate::new(-1.0, "", TransactionType::Expense);

        assert_eq!(
            validate(&candidate, &catalog()),
            Err(ValidationError::InvalidAmount)
        );
    }

    #[test]
    fn category_is_checked_before_pairing() {
        let candidate = TransactionCandidate::new(1.0, "", TransactionType::Income);

        assert_eq!(
            validate(&candidate, &catalog()),
            Err(ValidationError::MissingCategory)
        );
    }

    #[test]
    fn rejects_every_forbidden_pair() {
        let forbidden = [
            ("Salary", TransactionType::Expense),
            ("Food", TransactionType::Income),
            ("Transport", TransactionType::Income),
            ("Shopping", TransactionType::Income),
        ];

        for (category, type_) in forbidden {
            let candidate = TransactionCandidate::new(50.0, category, type_);

            assert_eq!(
                validate(&candidate, &catalog()),
                Err(ValidationError::ForbiddenCategoryForType {
                    category: category.to_owned(),
                    type_,
                })
            );
        }
    }

    #[test]
    fn accepts_every_other_pair() {
        let allowed = [
            ("Food", TransactionType::Expense),
            ("Transport", TransactionType::Expense),
            ("Shopping", TransactionType::Expense),
            ("Other", TransactionType::Expense),
            ("Salary", TransactionType::Income),
            ("Other", TransactionType::Income),
        ];

        for (category, type_) in allowed {
            let candidate = TransactionCandidate::new(50.0, category, type_);

            assert!(
                validate(&candidate, &catalog()).is_ok(),
                "want {category} as {type_} to be accepted"
            );
        }
    }

    #[test]
    fn forbidden_message_reads_naturally() {
        let error = ValidationError::ForbiddenCategoryForType {
            category: "Salary".to_owned(),
            type_: TransactionType::Expense,
        };

        assert_eq!(
            error.to_string(),
            "You cannot save or update Salary as an expense."
        );
    }

    #[test]
    fn parse_amount_handles_form_text() {
        assert_eq!(parse_amount(" 12.50 "), Some(12.5));
        assert_eq!(parse_amount("abc"), None);
        assert_eq!(parse_amount(""), None);
        assert_eq!(parse_amount("inf"), None);
    }

    #[test]
    fn form_with_bad_amount_is_rejected() {
        let form = TransactionForm {
            amount: "twelve".to_owned(),
            category: "Food".to_owned(),
            description: String::new(),
            type_: TransactionType::Expense,
        };

        let got = validate(&TransactionCandidate::from(&form), &catalog());

        assert_eq!(got, Err(ValidationError::InvalidAmount));
    }

    #[test]
    fn patch_applies_over_record() {
        let record = TransactionRecord {
            id: TransactionId::new("1"),
            amount: 10.0,
            category: "Food".to_owned(),
            description: "Lunch".to_owned(),
            type_: TransactionType::Expense,
            created_at: None,
        };
        let patch = TransactionPatch::default().amount(12.0);

        let got = TransactionCandidate::from_patch(&record, &patch);

        assert_eq!(
            got,
            TransactionCandidate::new(12.0, "Food", TransactionType::Expense).description("Lunch")
        );
    }

    #[test]
    fn patch_serializes_only_given_fields() {
        let patch = TransactionPatch::default()
            .category("Salary")
            .type_(TransactionType::Income);

        let json = serde_json::to_value(&patch).unwrap();

        assert_eq!(
            json,
            serde_json::json!({ "category": "Salary", "type": "income" })
        );
    }
}
