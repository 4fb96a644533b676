//! An in-process document store.
//!
//! Useful for tests and for running the core without a backend. IDs are issued
//! from a counter and zero padded, so they sort in creation order.

use std::{
    collections::{BTreeMap, HashMap},
    sync::{
        Arc, Mutex, MutexGuard,
        atomic::{AtomicU64, AtomicUsize, Ordering},
    },
};

use time::OffsetDateTime;

use crate::document_store::{
    ChangeCallback, CollectionPath, Document, DocumentId, DocumentSnapshot, DocumentStore,
    ErrorCallback, ListenerRegistration, StoreError, compare_newest_first, listeners::ListenerHub,
};

type Clock = Arc<dyn Fn() -> OffsetDateTime + Send + Sync>;

type Collections = HashMap<CollectionPath, BTreeMap<DocumentId, DocumentSnapshot>>;

struct MemoryState {
    collections: Mutex<Collections>,
    next_id: AtomicU64,
    writes: AtomicUsize,
    next_write_error: Mutex<Option<StoreError>>,
    clock: Clock,
    hub: Arc<ListenerHub>,
}

/// Keeps documents in memory. Cloning the store shares its contents.
#[derive(Clone)]
pub struct MemoryDocumentStore {
    state: Arc<MemoryState>,
}

impl std::fmt::Debug for MemoryDocumentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryDocumentStore")
            .field("writes", &self.write_count())
            .finish_non_exhaustive()
    }
}

impl Default for MemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDocumentStore {
    /// Create an empty store that stamps documents with the current UTC time.
    pub fn new() -> Self {
        Self::with_clock(OffsetDateTime::now_utc)
    }

    /// Create an empty store that stamps documents using `clock`.
    pub fn with_clock(clock: impl Fn() -> OffsetDateTime + Send + Sync + 'static) -> Self {
        Self {
            state: Arc::new(MemoryState {
                collections: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(0),
                writes: AtomicUsize::new(0),
                next_write_error: Mutex::new(None),
                clock: Arc::new(clock),
                hub: ListenerHub::new(),
            }),
        }
    }

    /// The number of successful creates, updates and deletes so far.
    pub fn write_count(&self) -> usize {
        self.state.writes.load(Ordering::SeqCst)
    }

    /// Make the next create, update or delete fail with `error`.
    pub fn fail_next_write(&self, error: StoreError) -> Result<(), StoreError> {
        *self
            .state
            .next_write_error
            .lock()
            .map_err(|_| StoreError::LockError)? = Some(error);
        Ok(())
    }

    /// Break every live query on `collection`, as a dropped connection would.
    ///
    /// Each listener receives `error` once and is then detached.
    pub fn fail_channel(
        &self,
        collection: &CollectionPath,
        error: StoreError,
    ) -> Result<(), StoreError> {
        self.state.hub.failed(collection, error)?;
        self.dispatch()
    }

    /// Insert a document exactly as given, bypassing ID and time assignment.
    ///
    /// Stands in for data written by older clients, e.g. documents without a
    /// creation time. Listeners are notified as for any other write.
    pub fn insert_raw(
        &self,
        collection: &CollectionPath,
        snapshot: DocumentSnapshot,
    ) -> Result<(), StoreError> {
        self.collections()?
            .entry(collection.clone())
            .or_default()
            .insert(snapshot.id.clone(), snapshot);

        self.state.hub.changed(collection)?;
        self.dispatch()
    }

    fn collections(&self) -> Result<MutexGuard<'_, Collections>, StoreError> {
        self.state
            .collections
            .lock()
            .map_err(|_| StoreError::LockError)
    }

    fn take_write_error(&self) -> Result<(), StoreError> {
        let mut next_error = self
            .state
            .next_write_error
            .lock()
            .map_err(|_| StoreError::LockError)?;

        match next_error.take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn load(&self, collection: &CollectionPath) -> Result<Vec<DocumentSnapshot>, StoreError> {
        let mut documents: Vec<DocumentSnapshot> = self
            .collections()?
            .get(collection)
            .map(|documents| documents.values().cloned().collect())
            .unwrap_or_default();

        documents.sort_by(|a, b| compare_newest_first(a.created_at, &a.id, b.created_at, &b.id));

        Ok(documents)
    }

    fn written(&self, collection: &CollectionPath) -> Result<(), StoreError> {
        self.state.writes.fetch_add(1, Ordering::SeqCst);
        self.state.hub.changed(collection)?;
        self.dispatch()
    }

    fn dispatch(&self) -> Result<(), StoreError> {
        self.state.hub.dispatch(|collection| self.load(collection))
    }
}

impl DocumentStore for MemoryDocumentStore {
    fn create(
        &self,
        collection: &CollectionPath,
        fields: Document,
    ) -> Result<DocumentId, StoreError> {
        self.take_write_error()?;

        let number = self.state.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let id = DocumentId::new(&format!("{number:020}"));
        let snapshot = DocumentSnapshot {
            id: id.clone(),
            created_at: Some((self.state.clock)()),
            fields,
        };

        self.collections()?
            .entry(collection.clone())
            .or_default()
            .insert(id.clone(), snapshot);

        self.written(collection)?;

        Ok(id)
    }

    fn get(
        &self,
        collection: &CollectionPath,
        id: &DocumentId,
    ) -> Result<Option<DocumentSnapshot>, StoreError> {
        Ok(self
            .collections()?
            .get(collection)
            .and_then(|documents| documents.get(id))
            .cloned())
    }

    fn update(
        &self,
        collection: &CollectionPath,
        id: &DocumentId,
        fields: Document,
    ) -> Result<(), StoreError> {
        self.take_write_error()?;

        {
            let mut collections = self.collections()?;
            let document = collections
                .get_mut(collection)
                .and_then(|documents| documents.get_mut(id))
                .ok_or_else(|| StoreError::NotFound(id.clone()))?;

            document.fields.extend(fields);
        }

        self.written(collection)
    }

    fn merge(
        &self,
        collection: &CollectionPath,
        id: &DocumentId,
        fields: Document,
    ) -> Result<(), StoreError> {
        self.take_write_error()?;

        self.collections()?
            .entry(collection.clone())
            .or_default()
            .entry(id.clone())
            .or_insert_with(|| DocumentSnapshot {
                id: id.clone(),
                created_at: Some((self.state.clock)()),
                fields: Document::new(),
            })
            .fields
            .extend(fields);

        self.written(collection)
    }

    fn delete(&self, collection: &CollectionPath, id: &DocumentId) -> Result<(), StoreError> {
        self.take_write_error()?;

        let removed = self
            .collections()?
            .get_mut(collection)
            .and_then(|documents| documents.remove(id));

        if removed.is_none() {
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
        let registration = self.state.hub.register(collection, on_change, on_error)?;
        self.dispatch()?;

        Ok(registration)
    }
}
