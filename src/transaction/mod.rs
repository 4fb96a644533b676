//! Transactions and the rules they must follow.
//!
//! This module contains everything related to transactions:
//! - The `TransactionRecord` model and the validated `NewTransaction`
//! - Validation of user input against the category catalog
//! - The `TransactionStore` that reads and writes a user's transactions

mod core;
mod document;
mod form;
mod store;

pub use self::core::{NewTransaction, TransactionId, TransactionRecord, TransactionType};
pub use form::{
    TransactionCandidate, TransactionForm, TransactionPatch, ValidationError, parse_amount,
    validate,
};
pub use store::{TransactionStore, transactions_path};
