//! Daily Spend keeps track of a person's income and expenses.
//!
//! This library provides the core of the app: validating transactions against
//! a category catalog, storing them per user in a document store, summarising
//! them for the dashboard, and binding all of that to whoever is signed in.
//!
//! The usual entry point is a [SessionBinder] built from a [TransactionStore]
//! and an [IdentityProvider]:
//!
//! ```
//! use std::sync::Arc;
//!
//! use daily_spend::{
//!     CategoryCatalog, Identity, MemoryDocumentStore, MemoryIdentityProvider, SessionBinder,
//!     TransactionCandidate, TransactionStore, TransactionType, UserScope,
//! };
//!
//! let identity = MemoryIdentityProvider::new();
//! let binder = SessionBinder::new(
//!     TransactionStore::new(MemoryDocumentStore::new(), Arc::new(CategoryCatalog::reference())),
//!     Arc::new(identity.clone()),
//! );
//! let _listener = binder.start();
//!
//! identity.sign_in(Identity::new(UserScope::new("alice").unwrap())).unwrap();
//! binder
//!     .add(&TransactionCandidate::new(12.5, "Food", TransactionType::Expense))
//!     .unwrap();
//!
//! assert_eq!(binder.view().unwrap().summary.total_expense, 12.5);
//! ```

#![warn(missing_docs)]

mod category;
mod config;
mod dashboard;
mod document_store;
mod format;
mod identity;
mod profile;
mod session;
mod timezone;
mod transaction;

pub use category::{CategoryCatalog, CategoryDefinition, CategoryName, OTHER_CATEGORY};
pub use config::{DashboardConfig, TIMEZONE_ENV_VAR, load_catalog};
pub use dashboard::{
    BudgetProgress, CategoryBreakdown, CategoryTotal, Dashboard, Summary, balance,
    budget_progress, category_percent, category_totals, recent, total_expense, total_income,
};
pub use document_store::{
    ChangeCallback, CollectionPath, Document, DocumentId, DocumentSnapshot, DocumentStore,
    ErrorCallback, ListenerRegistration, MemoryDocumentStore, SqliteDocumentStore, StoreError,
    create_document_table,
};
pub use format::{format_currency, format_percentage, format_timestamp};
pub use identity::{
    Identity, IdentityHandler, IdentityListener, IdentityProvider, MemoryIdentityProvider,
    UserScope,
};
pub use profile::{Profile, get_profile, profiles_path, save_profile};
pub use session::{SessionBinder, SessionObserver, SessionState, SessionView};
pub use timezone::{get_local_offset, to_local_time};
pub use transaction::{
    NewTransaction, TransactionCandidate, TransactionForm, TransactionId, TransactionPatch,
    TransactionRecord, TransactionStore, TransactionType, ValidationError, parse_amount,
    transactions_path, validate,
};

/// The errors that may occur in the application.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum Error {
    /// A transaction broke one of the transaction rules and was not stored.
    ///
    /// The message is meant to be shown to the user as is.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The document store failed.
    #[error("the document store failed: {0}")]
    Store(#[from] StoreError),

    /// A transaction was added, updated or deleted while nobody was signed in.
    #[error("no user is signed in")]
    UnboundSession,

    /// Tried to update a transaction that does not exist
    #[error("tried to update a transaction that is not in the database")]
    UpdateMissingTransaction,

    /// An empty string was used to create a category name.
    #[error("Category name cannot be empty")]
    EmptyCategoryName,

    /// The catalog already has a category with this name.
    #[error("the category \"{0}\" already exists")]
    DuplicateCategoryName(String),

    /// The identity provider gave a user ID that cannot be used to scope data.
    #[error("\"{0}\" is not a valid user ID")]
    InvalidUserScope(String),

    /// An error occurred while getting the local timezone from a canonical timezone string.
    #[error("invalid timezone {0}")]
    InvalidTimezone(String),

    /// A timestamp could not be turned into text.
    #[error("could not format timestamp: {0}")]
    TimestampFormat(String),

    /// The category catalog file could not be read or parsed.
    #[error("invalid category catalog: {0}")]
    InvalidCatalog(String),

    /// The identity provider failed.
    #[error("the identity provider failed: {0}")]
    IdentityProvider(String),
}

impl From<time::error::Format> for Error {
    fn from(value: time::error::Format) -> Self {
        tracing::error!("could not format a timestamp: {value}");
        Error::TimestampFormat(value.to_string())
    }
}
