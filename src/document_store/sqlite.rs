//! Implements a SQLite backed document store.
//!
//! Every document lives in a single `document` table keyed by its collection
//! path and ID, with its fields stored as a JSON object. Live queries are served
//! in-process: listeners are notified after each write made through this store,
//! but not about writes made by other connections to the same database file.

use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::{Connection, OptionalExtension, Row};
use time::OffsetDateTime;

use crate::document_store::{
    ChangeCallback, CollectionPath, Document, DocumentId, DocumentSnapshot, DocumentStore,
    ErrorCallback, ListenerRegistration, StoreError, listeners::ListenerHub,
};

const NANOSECONDS_PER_MILLISECOND: i128 = 1_000_000;

/// Stores documents in a SQLite database.
#[derive(Debug, Clone)]
pub struct SqliteDocumentStore {
    connection: Arc<Mutex<Connection>>,
    hub: Arc<ListenerHub>,
}

impl SqliteDocumentStore {
    /// Create a new store for the SQLite `connection`.
    ///
    /// This function will create the document table if it does not exist.
    ///
    /// # Errors
    /// Returns a [StoreError::SqlError] if the table could not be created.
    pub fn new(connection: Connection) -> Result<Self, StoreError> {
        create_document_table(&connection)?;

        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
            hub: ListenerHub::new(),
        })
    }

    fn connection(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.connection.lock().map_err(|_| StoreError::LockError)
    }

    fn load(&self, collection: &CollectionPath) -> Result<Vec<DocumentSnapshot>, StoreError> {
        let connection = self.connection()?;
        let mut statement = connection.prepare(
            "SELECT id, created_at, body FROM document
             WHERE collection = ?1
             ORDER BY created_at DESC NULLS LAST, id DESC",
        )?;

        let rows = statement
            .query_map((collection.as_str(),), map_document_row)?
            .collect::<Result<Vec<_>, rusqlite::Error>>()?;

        rows.into_iter().map(RawDocument::into_snapshot).collect()
    }

    fn written(&self, collection: &CollectionPath) -> Result<(), StoreError> {
        self.hub.changed(collection)?;
        self.hub.dispatch(|collection| self.load(collection))
    }
}

impl DocumentStore for SqliteDocumentStore {
    fn create(
        &self,
        collection: &CollectionPath,
        fields: Document,
    ) -> Result<DocumentId, StoreError> {
        let body = serde_json::to_string(&fields)?;
        let created_at = to_unix_millis(OffsetDateTime::now_utc());

        let id: String = self.connection()?.query_row(
            "INSERT INTO document (id, collection, created_at, body)
             VALUES (lower(hex(randomblob(10))), ?1, ?2, ?3)
             RETURNING id",
            (collection.as_str(), created_at, body),
            |row| row.get(0),
        )?;

        self.written(collection)?;

        Ok(DocumentId::new(&id))
    }

    fn get(
        &self,
        collection: &CollectionPath,
        id: &DocumentId,
    ) -> Result<Option<DocumentSnapshot>, StoreError> {
        let raw = self
            .connection()?
            .prepare("SELECT id, created_at, body FROM document WHERE collection = ?1 AND id = ?2")?
            .query_row((collection.as_str(), id.as_str()), map_document_row)
            .optional()?;

        raw.map(RawDocument::into_snapshot).transpose()
    }

    fn update(
        &self,
        collection: &CollectionPath,
        id: &DocumentId,
        fields: Document,
    ) -> Result<(), StoreError> {
        {
            let connection = self.connection()?;
            let tx = connection.unchecked_transaction()?;

            let body: Option<String> = tx
                .query_row(
                    "SELECT body FROM document WHERE collection = ?1 AND id = ?2",
                    (collection.as_str(), id.as_str()),
                    |row| row.get(0),
                )
                .optional()?;
            let Some(body) = body else {
                return Err(StoreError::NotFound(id.clone()));
            };

            let mut document: Document = serde_json::from_str(&body)?;
            document.extend(fields);

            tx.execute(
                "UPDATE document SET body = ?3 WHERE collection = ?1 AND id = ?2",
                (
                    collection.as_str(),
                    id.as_str(),
                    serde_json::to_string(&document)?,
                ),
            )?;
            tx.commit()?;
        }

        self.written(collection)
    }

    fn merge(
        &self,
        collection: &CollectionPath,
        id: &DocumentId,
        fields: Document,
    ) -> Result<(), StoreError> {
        {
            let connection = self.connection()?;
            let tx = connection.unchecked_transaction()?;

            let body: Option<String> = tx
                .query_row(
                    "SELECT body FROM document WHERE collection = ?1 AND id = ?2",
                    (collection.as_str(), id.as_str()),
                    |row| row.get(0),
                )
                .optional()?;

            match body {
                Some(body) => {
                    let mut document: Document = serde_json::from_str(&body)?;
                    document.extend(fields);

                    tx.execute(
                        "UPDATE document SET body = ?3 WHERE collection = ?1 AND id = ?2",
                        (
                            collection.as_str(),
                            id.as_str(),
                            serde_json::to_string(&document)?,
                        ),
                    )?;
                }
                None => {
                    tx.execute(
                        "INSERT INTO document (id, collection, created_at, body)
                         VALUES (?1, ?2, ?3, ?4)",
                        (
                            id.as_str(),
                            collection.as_str(),
                            to_unix_millis(OffsetDateTime::now_utc()),
                            serde_json::to_string(&fields)?,
                        ),
                    )?;
                }
            }

            tx.commit()?;
        }

        self.written(collection)
    }

    fn delete(&self, collection: &CollectionPath, id: &DocumentId) -> Result<(), StoreError> {
        let rows_affected = self.connection()?.execute(
            "DELETE FROM document WHERE collection = ?1 AND id = ?2",
            (collection.as_str(), id.as_str()),
        )?;

        if rows_affected == 0 {
            tracing::debug!("deleted {id} from {collection}, but it did not exist");
        }

        self.written(collection)
    }

    fn subscribe(
        &self,
        collection: &CollectionPath,
        on_change: ChangeCallback,
        on_error: ErrorCallback,
    ) -> Result<ListenerRegistration, StoreError> {
        let registration = self.hub.register(collection, on_change, on_error)?;
        self.hub.dispatch(|collection| self.load(collection))?;

        Ok(registration)
    }
}

/// Create the document table in the database.
///
/// # Errors
/// Returns an error if the table cannot be created or if there is an SQL error.
pub fn create_document_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS document (
                id TEXT NOT NULL,
                collection TEXT NOT NULL,
                created_at INTEGER,
                body TEXT NOT NULL,
                PRIMARY KEY (collection, id)
                )",
        (),
    )?;

    // Live queries read a whole collection in creation order.
    connection.execute(
        "CREATE INDEX IF NOT EXISTS idx_document_collection_created
         ON document(collection, created_at);",
        (),
    )?;

    Ok(())
}

struct RawDocument {
    id: String,
    created_at: Option<i64>,
    body: String,
}

impl RawDocument {
    fn into_snapshot(self) -> Result<DocumentSnapshot, StoreError> {
        let created_at = self.created_at.map(from_unix_millis).transpose()?;

        Ok(DocumentSnapshot {
            id: DocumentId::new(&self.id),
            created_at,
            fields: serde_json::from_str(&self.body)?,
        })
    }
}

fn map_document_row(row: &Row) -> Result<RawDocument, rusqlite::Error> {
    let id = row.get(0)?;
    let created_at = row.get(1)?;
    let body = row.get(2)?;

    Ok(RawDocument {
        id,
        created_at,
        body,
    })
}

fn to_unix_millis(timestamp: OffsetDateTime) -> i64 {
    (timestamp.unix_timestamp_nanos() / NANOSECONDS_PER_MILLISECOND) as i64
}

fn from_unix_millis(millis: i64) -> Result<OffsetDateTime, StoreError> {
    OffsetDateTime::from_unix_timestamp_nanos(millis as i128 * NANOSECONDS_PER_MILLISECOND)
        .map_err(|error| StoreError::Serialization(format!("invalid created_at {millis}: {error}")))
}
