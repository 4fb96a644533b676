//! Live query bookkeeping shared by the store implementations.
//!
//! Stores enqueue a notice after each write and then ask the hub to dispatch.
//! Only one dispatch loop runs at a time: a write made from inside a callback
//! enqueues its notice and returns, and the running loop delivers it once the
//! current callback has finished. Each delivery reloads the collection, so
//! listeners always see the full contents at the time of delivery.

use std::{
    collections::VecDeque,
    fmt,
    sync::{
        Arc, Mutex, MutexGuard, Weak,
        atomic::{AtomicBool, Ordering},
    },
};

use crate::document_store::{
    ChangeCallback, CollectionPath, DocumentSnapshot, ErrorCallback, StoreError,
};

type ListenerId = u64;

struct Callbacks {
    on_change: ChangeCallback,
    on_error: ErrorCallback,
}

struct Listener {
    id: ListenerId,
    collection: CollectionPath,
    active: AtomicBool,
    callbacks: Mutex<Callbacks>,
}

impl Listener {
    /// Returns false if the listener's callback panicked during an earlier delivery.
    fn deliver_change(&self, documents: Vec<DocumentSnapshot>) -> bool {
        if !self.active.load(Ordering::SeqCst) {
            return true;
        }

        let Ok(mut callbacks) = self.callbacks.lock() else {
            tracing::warn!("listener {} panicked earlier, skipping delivery", self.id);
            return false;
        };

        // Cancellation may have happened while waiting for the lock.
        if self.active.load(Ordering::SeqCst) {
            (callbacks.on_change)(documents);
        }

        true
    }

    fn deliver_error(&self, error: StoreError) {
        if !self.active.swap(false, Ordering::SeqCst) {
            return;
        }

        if let Ok(mut callbacks) = self.callbacks.lock() {
            (callbacks.on_error)(error);
        }
    }
}

enum Notice {
    /// The collection was written to; every listener on it gets a snapshot.
    Changed(CollectionPath),
    /// A listener just registered and needs its first snapshot.
    Registered(ListenerId),
    /// The live query on a collection broke.
    Failed(CollectionPath, StoreError),
}

#[derive(Default)]
struct HubState {
    next_id: ListenerId,
    listeners: Vec<Arc<Listener>>,
    queue: VecDeque<Notice>,
    dispatching: bool,
}

/// What the dispatch loop should do for one notice.
enum Delivery {
    Nothing,
    Snapshot(CollectionPath, Vec<Arc<Listener>>),
    Failure(Vec<Arc<Listener>>, StoreError),
}

impl HubState {
    fn listeners_on(&self, collection: &CollectionPath) -> Vec<Arc<Listener>> {
        self.listeners
            .iter()
            .filter(|listener| &listener.collection == collection)
            .cloned()
            .collect()
    }

    fn plan(&mut self, notice: Notice) -> Delivery {
        match notice {
            Notice::Changed(collection) => {
                let targets = self.listeners_on(&collection);
                Delivery::Snapshot(collection, targets)
            }
            Notice::Registered(id) => {
                match self.listeners.iter().find(|listener| listener.id == id) {
                    Some(listener) => Delivery::Snapshot(
                        listener.collection.clone(),
                        vec![Arc::clone(listener)],
                    ),
                    // Cancelled before its first snapshot went out.
                    None => Delivery::Nothing,
                }
            }
            Notice::Failed(collection, error) => {
                let targets = self.listeners_on(&collection);
                self.listeners
                    .retain(|listener| listener.collection != collection);
                Delivery::Failure(targets, error)
            }
        }
    }
}

/// Clears the dispatching flag if a callback unwinds out of the dispatch loop,
/// so that later writes are still delivered.
struct DispatchGuard<'a> {
    hub: &'a ListenerHub,
}

impl Drop for DispatchGuard<'_> {
    fn drop(&mut self) {
        if !std::thread::panicking() {
            return;
        }

        tracing::error!("a listener panicked during dispatch");
        match self.hub.state.lock() {
            Ok(mut state) => state.dispatching = false,
            Err(poisoned) => poisoned.into_inner().dispatching = false,
        }
    }
}

/// Registry of live queries and the queue of pending deliveries.
#[derive(Default)]
pub(crate) struct ListenerHub {
    state: Mutex<HubState>,
}

impl fmt::Debug for ListenerHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerHub").finish_non_exhaustive()
    }
}

impl ListenerHub {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> Result<MutexGuard<'_, HubState>, StoreError> {
        self.state.lock().map_err(|_| StoreError::LockError)
    }

    /// Add a listener and queue its first snapshot.
    ///
    /// The caller must call [ListenerHub::dispatch] afterwards.
    pub(crate) fn register(
        self: &Arc<Self>,
        collection: &CollectionPath,
        on_change: ChangeCallback,
        on_error: ErrorCallback,
    ) -> Result<ListenerRegistration, StoreError> {
        let mut state = self.lock()?;
        state.next_id += 1;
        let id = state.next_id;

        state.listeners.push(Arc::new(Listener {
            id,
            collection: collection.clone(),
            active: AtomicBool::new(true),
            callbacks: Mutex::new(Callbacks {
                on_change,
                on_error,
            }),
        }));
        state.queue.push_back(Notice::Registered(id));

        tracing::debug!("listener {id} registered on {collection}");

        Ok(ListenerRegistration {
            id,
            hub: Arc::downgrade(self),
        })
    }

    /// Queue a snapshot for every listener on `collection`.
    pub(crate) fn changed(&self, collection: &CollectionPath) -> Result<(), StoreError> {
        self.lock()?
            .queue
            .push_back(Notice::Changed(collection.clone()));
        Ok(())
    }

    /// Queue an error for every listener on `collection`, detaching them.
    pub(crate) fn failed(
        &self,
        collection: &CollectionPath,
        error: StoreError,
    ) -> Result<(), StoreError> {
        self.lock()?
            .queue
            .push_back(Notice::Failed(collection.clone(), error));
        Ok(())
    }

    /// Deliver queued notices until the queue is empty.
    ///
    /// Returns immediately if another dispatch loop is already running; that
    /// loop will pick up anything queued in the meantime. `load` reads the
    /// current contents of a collection, newest first.
    pub(crate) fn dispatch<F>(&self, load: F) -> Result<(), StoreError>
    where
        F: Fn(&CollectionPath) -> Result<Vec<DocumentSnapshot>, StoreError>,
    {
        {
            let mut state = self.lock()?;
            if state.dispatching {
                return Ok(());
            }
            state.dispatching = true;
        }

        let _guard = DispatchGuard { hub: self };

        loop {
            let delivery = {
                let mut state = self.lock()?;
                match state.queue.pop_front() {
                    Some(notice) => state.plan(notice),
                    None => {
                        state.dispatching = false;
                        return Ok(());
                    }
                }
            };

            match delivery {
                Delivery::Nothing => {}
                Delivery::Snapshot(_, targets) if targets.is_empty() => {}
                Delivery::Snapshot(collection, targets) => match load(&collection) {
                    Ok(documents) => {
                        for listener in &targets {
                            if !listener.deliver_change(documents.clone()) {
                                self.detach(listener.id);
                            }
                        }
                    }
                    Err(error) => {
                        tracing::error!("live query on {collection} failed: {error}");
                        for listener in &targets {
                            listener.deliver_error(error.clone());
                            self.detach(listener.id);
                        }
                    }
                },
                Delivery::Failure(targets, error) => {
                    for listener in &targets {
                        listener.deliver_error(error.clone());
                    }
                }
            }
        }
    }

    fn detach(&self, id: ListenerId) {
        let Ok(mut state) = self.state.lock() else {
            tracing::warn!("could not acquire the listener lock to detach listener {id}");
            return;
        };

        if let Some(position) = state.listeners.iter().position(|l| l.id == id) {
            let listener = state.listeners.remove(position);
            listener.active.store(false, Ordering::SeqCst);
            tracing::debug!("listener {id} detached from {}", listener.collection);
        }
    }
}

/// A handle to a live query.
///
/// Cancelling the registration, or dropping it, guarantees that no further
/// callbacks start for the query. A callback that is already running when the
/// registration is cancelled may still finish.
#[must_use = "dropping the registration cancels the live query"]
#[derive(Debug)]
pub struct ListenerRegistration {
    id: ListenerId,
    hub: Weak<ListenerHub>,
}

impl ListenerRegistration {
    /// Stop the live query.
    pub fn cancel(mut self) {
        self.detach();
    }

    fn detach(&mut self) {
        if let Some(hub) = self.hub.upgrade() {
            hub.detach(self.id);
        }

        self.hub = Weak::new();
    }
}

impl Drop for ListenerRegistration {
    fn drop(&mut self) {
        self.detach();
    }
}

#[cfg(test)]
mod tests {
    use std::{
        panic::{AssertUnwindSafe, catch_unwind},
        sync::{Arc, Mutex},
    };

    use serde_json::Map;

    use crate::document_store::{
        CollectionPath, DocumentId, DocumentSnapshot, StoreError, listeners::ListenerHub,
    };

    fn snapshot(id: &str) -> DocumentSnapshot {
        DocumentSnapshot {
            id: DocumentId::new(id),
            created_at: None,
            fields: Map::new(),
        }
    }

    fn recorder() -> (Arc<Mutex<Vec<usize>>>, Box<dyn FnMut(Vec<DocumentSnapshot>) + Send>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        (
            seen,
            Box::new(move |documents: Vec<DocumentSnapshot>| {
                sink.lock().unwrap().push(documents.len())
            }),
        )
    }

    #[test]
    fn registration_delivers_initial_snapshot() {
        let hub = ListenerHub::new();
        let collection = CollectionPath::new(&["users", "a", "transactions"]);
        let (seen, on_change) = recorder();

        let _registration = hub
            .register(&collection, on_change, Box::new(|_| {}))
            .unwrap();
        hub.dispatch(|_| Ok(vec![snapshot("1")])).unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![1]);
    }

    #[test]
    fn changes_only_reach_listeners_on_the_same_collection() {
        let hub = ListenerHub::new();
        let mine = CollectionPath::new(&["users", "a", "transactions"]);
        let theirs = CollectionPath::new(&["users", "b", "transactions"]);
        let (seen, on_change) = recorder();
        let _registration = hub.register(&mine, on_change, Box::new(|_| {})).unwrap();
        hub.dispatch(|_| Ok(vec![])).unwrap();

        hub.changed(&theirs).unwrap();
        hub.dispatch(|_| Ok(vec![snapshot("1")])).unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![0]);
    }

    #[test]
    fn cancelled_listener_receives_nothing() {
        let hub = ListenerHub::new();
        let collection = CollectionPath::new(&["users", "a", "transactions"]);
        let (seen, on_change) = recorder();
        let registration = hub
            .register(&collection, on_change, Box::new(|_| {}))
            .unwrap();

        registration.cancel();
        hub.changed(&collection).unwrap();
        hub.dispatch(|_| Ok(vec![snapshot("1")])).unwrap();

        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn failed_load_reports_error_once_and_detaches() {
        let hub = ListenerHub::new();
        let collection = CollectionPath::new(&["users", "a", "transactions"]);
        let errors = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&errors);
        let (seen, on_change) = recorder();
        let _registration = hub
            .register(
                &collection,
                on_change,
                Box::new(move |error| sink.lock().unwrap().push(error)),
            )
            .unwrap();

        hub.dispatch(|_| Err(StoreError::Unavailable("offline".to_owned())))
            .unwrap();
        hub.changed(&collection).unwrap();
        hub.dispatch(|_| Ok(vec![snapshot("1")])).unwrap();

        assert!(seen.lock().unwrap().is_empty());
        assert_eq!(
            *errors.lock().unwrap(),
            vec![StoreError::Unavailable("offline".to_owned())]
        );
    }

    #[test]
    fn panicking_listener_does_not_stall_other_listeners() {
        let hub = ListenerHub::new();
        let broken = CollectionPath::new(&["users", "a", "transactions"]);
        let healthy = CollectionPath::new(&["users", "b", "transactions"]);
        let _broken_registration = hub
            .register(
                &broken,
                Box::new(|documents: Vec<DocumentSnapshot>| {
                    if documents.is_empty() {
                        panic!("cannot show an empty collection");
                    }
                }),
                Box::new(|_| {}),
            )
            .unwrap();

        let dispatched = catch_unwind(AssertUnwindSafe(|| hub.dispatch(|_| Ok(vec![]))));
        assert!(dispatched.is_err());

        let (seen, on_change) = recorder();
        let _healthy_registration = hub
            .register(&healthy, on_change, Box::new(|_| {}))
            .unwrap();
        hub.dispatch(|_| Ok(vec![snapshot("1")])).unwrap();
        hub.changed(&broken).unwrap();
        hub.changed(&healthy).unwrap();
        hub.dispatch(|_| Ok(vec![snapshot("1"), snapshot("2")]))
            .unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
    }
}
