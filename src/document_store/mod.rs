//! The boundary to the document store that holds each user's transactions.
//!
//! A document store keeps JSON-like documents in slash separated collections,
//! e.g. `users/{uid}/transactions`. Every document carries a [DocumentId],
//! usually assigned by the store, and a creation time. Besides create/read/update/delete, stores
//! support live queries: a listener receives the full, newest-first contents of
//! a collection when it registers and again after every write to it.

mod listeners;
mod memory;
mod sqlite;

pub use listeners::ListenerRegistration;
pub use memory::MemoryDocumentStore;
pub use sqlite::{SqliteDocumentStore, create_document_table};

use std::{cmp::Ordering, fmt::Display};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;

/// The fields of a document.
pub type Document = Map<String, Value>;

/// Called with the full contents of a collection, newest first.
pub type ChangeCallback = Box<dyn FnMut(Vec<DocumentSnapshot>) + Send>;

/// Called once when a live query fails. The listener is detached afterwards.
pub type ErrorCallback = Box<dyn FnMut(StoreError) + Send>;

/// An opaque identifier assigned by the store when a document is created.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DocumentId(String);

impl DocumentId {
    /// Wrap an identifier issued by a store.
    pub fn new(id: &str) -> Self {
        Self(id.to_owned())
    }

    /// The identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for DocumentId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The path of a collection, e.g. `users/abc123/transactions`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CollectionPath(String);

impl CollectionPath {
    /// Create a collection path from its segments.
    pub fn new(segments: &[&str]) -> Self {
        Self(segments.join("/"))
    }

    /// The path as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for CollectionPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A document as read from the store.
#[derive(Clone, Debug, PartialEq)]
pub struct DocumentSnapshot {
    /// The store-assigned ID of the document.
    pub id: DocumentId,
    /// When the store created the document.
    ///
    /// Documents written before the store stamped creation times have none.
    pub created_at: Option<OffsetDateTime>,
    /// The document's fields.
    pub fields: Document,
}

/// Orders documents newest first.
///
/// Documents with a creation time come before documents without one. Equal or
/// missing creation times fall back to comparing IDs, largest first, so the
/// order is deterministic.
pub(crate) fn compare_newest_first(
    a_created_at: Option<OffsetDateTime>,
    a_id: &DocumentId,
    b_created_at: Option<OffsetDateTime>,
    b_id: &DocumentId,
) -> Ordering {
    // `Option` orders `None` before `Some`, so comparing b to a puts `None` last.
    b_created_at
        .cmp(&a_created_at)
        .then_with(|| b_id.cmp(a_id))
}

/// Errors reported by a document store.
#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum StoreError {
    /// The store could not be reached or refused the request.
    #[error("the document store is unavailable: {0}")]
    Unavailable(String),

    /// The document to update does not exist.
    #[error("the document {0} does not exist")]
    NotFound(DocumentId),

    /// An unhandled/unexpected SQL error.
    ///
    /// The underlying error is kept as a string so that the error can be
    /// cloned and handed to every listener of a failed live query.
    #[error("an unexpected SQL error occurred: {0}")]
    SqlError(String),

    /// A document could not be converted to or from its stored form.
    #[error("could not encode or decode a document: {0}")]
    Serialization(String),

    /// Could not acquire a lock guarding the store's state.
    #[error("could not acquire the store lock")]
    LockError,

    /// A live query stopped delivering changes.
    #[error("the live query on {0} was closed: {1}")]
    ChannelClosed(String, String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        tracing::error!("an unhandled SQL error occurred: {}", value);
        StoreError::SqlError(value.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(value: serde_json::Error) -> Self {
        StoreError::Serialization(value.to_string())
    }
}

/// Scoped collections of documents with live queries.
///
/// Listener callbacks are never invoked while the store holds one of its own
/// locks, so a callback may call back into the store. Writes made from inside a
/// callback are delivered after the current delivery finishes.
pub trait DocumentStore: Send + Sync {
    /// Create a document in `collection`.
    ///
    /// The store assigns the document's ID and creation time.
    fn create(&self, collection: &CollectionPath, fields: Document)
    -> Result<DocumentId, StoreError>;

    /// Retrieve a single document, or `None` if it does not exist.
    fn get(
        &self,
        collection: &CollectionPath,
        id: &DocumentId,
    ) -> Result<Option<DocumentSnapshot>, StoreError>;

    /// Overwrite the given fields of an existing document, leaving other fields untouched.
    ///
    /// # Errors
    /// Returns [StoreError::NotFound] if the document does not exist.
    fn update(
        &self,
        collection: &CollectionPath,
        id: &DocumentId,
        fields: Document,
    ) -> Result<(), StoreError>;

    /// Write the given fields to the document with ID `id`, creating the
    /// document if it does not exist and leaving its other fields untouched if it does.
    ///
    /// Used for documents with a well known ID, e.g. a user's profile.
    fn merge(
        &self,
        collection: &CollectionPath,
        id: &DocumentId,
        fields: Document,
    ) -> Result<(), StoreError>;

    /// Delete a document. Deleting a document that does not exist succeeds.
    fn delete(&self, collection: &CollectionPath, id: &DocumentId) -> Result<(), StoreError>;

    /// Open a live query over `collection`, ordered newest first.
    ///
    /// `on_change` receives the current contents immediately and again after
    /// every write to the collection. `on_error` is called if the query fails,
    /// after which no further callbacks are made. Dropping or cancelling the
    /// returned registration stops delivery.
    fn subscribe(
        &self,
        collection: &CollectionPath,
        on_change: ChangeCallback,
        on_error: ErrorCallback,
    ) -> Result<ListenerRegistration, StoreError>;
}

/// Wrap a serialized value as a document, rejecting anything but an object.
pub(crate) fn into_document(value: Value) -> Result<Document, StoreError> {
    match value {
        Value::Object(fields) => Ok(fields),
        other => Err(StoreError::Serialization(format!(
            "expected a JSON object, got {other}"
        ))),
    }
}
