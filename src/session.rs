//! Binds the signed in user to their transactions.
//!
//! The [SessionBinder] listens to the identity provider. When a user signs in
//! it opens a live query on that user's transactions and keeps the latest set
//! and its summary. When the user changes or signs out, the old live query is
//! cancelled before anything else happens, so one user's data never shows up
//! in another user's session.

use std::sync::{Arc, Mutex, MutexGuard, Weak};

use crate::{
    Error,
    config::DashboardConfig,
    dashboard::{Dashboard, Summary},
    document_store::{DocumentStore, ListenerRegistration, StoreError},
    identity::{Identity, IdentityListener, IdentityProvider, UserScope},
    profile::{Profile, get_profile, save_profile},
    transaction::{
        TransactionCandidate, TransactionId, TransactionPatch, TransactionRecord, TransactionStore,
    },
};

/// Whether the session has a user to act for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// Nobody is signed in. Mutations fail with [Error::UnboundSession].
    Unbound,
    /// The session reads and writes the transactions of this user.
    Bound(UserScope),
}

/// A copy of everything the session currently holds.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionView {
    /// Whether a user is bound.
    pub state: SessionState,
    /// The user's transactions, newest first. Empty when unbound.
    pub transactions: Vec<TransactionRecord>,
    /// The summary of `transactions`.
    pub summary: Summary,
    /// The error that broke the live query, if it broke.
    pub last_error: Option<StoreError>,
    /// Whether the bound user has verified their email address.
    pub email_verified: bool,
}

/// A function called with the new view whenever the session changes.
pub type SessionObserver = Box<dyn FnMut(&SessionView) + Send>;

type SharedObserver = Arc<Mutex<SessionObserver>>;

struct BinderState {
    /// Incremented on every (re)binding so that callbacks from an older live
    /// query can tell they are stale.
    generation: u64,
    identity: Option<Identity>,
    registration: Option<ListenerRegistration>,
    transactions: Vec<TransactionRecord>,
    summary: Summary,
    last_error: Option<StoreError>,
}

impl BinderState {
    fn view(&self) -> SessionView {
        SessionView {
            state: match &self.identity {
                Some(identity) => SessionState::Bound(identity.uid.clone()),
                None => SessionState::Unbound,
            },
            transactions: self.transactions.clone(),
            summary: self.summary.clone(),
            last_error: self.last_error.clone(),
            email_verified: self
                .identity
                .as_ref()
                .is_some_and(|identity| identity.email_verified),
        }
    }
}

struct BinderShared<S> {
    transactions: TransactionStore<S>,
    identity_provider: Arc<dyn IdentityProvider>,
    state: Mutex<BinderState>,
    observers: Mutex<Vec<SharedObserver>>,
}

/// Keeps the transactions and summary of the signed in user up to date.
///
/// Cloning a binder gives another handle to the same session.
pub struct SessionBinder<S> {
    shared: Arc<BinderShared<S>>,
}

impl<S> Clone for SessionBinder<S> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<S> std::fmt::Debug for SessionBinder<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionBinder").finish_non_exhaustive()
    }
}

impl<S: DocumentStore + 'static> SessionBinder<S> {
    /// Create an unbound session.
    ///
    /// Call [SessionBinder::start] to follow the identity provider.
    pub fn new(
        transactions: TransactionStore<S>,
        identity_provider: Arc<dyn IdentityProvider>,
    ) -> Self {
        let summary = Summary::empty(transactions.catalog());

        Self {
            shared: Arc::new(BinderShared {
                transactions,
                identity_provider,
                state: Mutex::new(BinderState {
                    generation: 0,
                    identity: None,
                    registration: None,
                    transactions: Vec::new(),
                    summary,
                    last_error: None,
                }),
                observers: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Follow the identity provider, binding to whoever is signed in now and
    /// rebinding on every change.
    ///
    /// Identity changes stop reaching the session once the returned listener
    /// is cancelled or dropped.
    pub fn start(&self) -> IdentityListener {
        let shared = Arc::downgrade(&self.shared);

        self.shared
            .identity_provider
            .on_identity_change(Box::new(move |identity| {
                if let Some(shared) = shared.upgrade() {
                    BinderShared::handle_identity_change(&shared, identity);
                }
            }))
    }

    /// Bind to `identity`, or unbind if it is `None`.
    ///
    /// [SessionBinder::start] calls this for every identity change. Passing
    /// the bound identity again keeps a working live query, but reopens one
    /// that failed.
    pub fn handle_identity_change(&self, identity: Option<Identity>) {
        BinderShared::handle_identity_change(&self.shared, identity);
    }

    /// Whether a user is bound.
    pub fn state(&self) -> SessionState {
        match self.shared.lock() {
            Ok(state) => state.view().state,
            Err(error) => {
                tracing::error!("{error}, reporting the session as unbound");
                SessionState::Unbound
            }
        }
    }

    /// A copy of what the session currently holds.
    ///
    /// # Errors
    /// Returns a [StoreError::LockError] wrapped in [Error::Store] if the session lock is poisoned.
    pub fn view(&self) -> Result<SessionView, Error> {
        Ok(self.shared.lock()?.view())
    }

    /// Whether the bound user has verified their email address.
    pub fn is_email_verified(&self) -> bool {
        self.view().is_ok_and(|view| view.email_verified)
    }

    /// Call `observer` with the new view after every change to the session.
    pub fn on_update(&self, observer: impl FnMut(&SessionView) + Send + 'static) {
        let observer: SessionObserver = Box::new(observer);

        match self.shared.observers.lock() {
            Ok(mut observers) => observers.push(Arc::new(Mutex::new(observer))),
            Err(_) => tracing::error!("could not acquire the observer lock"),
        }
    }

    /// The dashboard for the bound user's current transactions.
    ///
    /// # Errors
    /// Returns a [StoreError::LockError] wrapped in [Error::Store] if the session lock is poisoned.
    pub fn dashboard(&self, config: &DashboardConfig) -> Result<Dashboard, Error> {
        let state = self.shared.lock()?;

        Ok(Dashboard::from_summary(
            state.summary.clone(),
            &state.transactions,
            self.shared.transactions.catalog(),
            config,
        ))
    }

    /// Add a transaction for the bound user.
    ///
    /// The new transaction reaches the view through the live query.
    ///
    /// # Errors
    /// Returns [Error::UnboundSession] if nobody is bound, or the errors of
    /// [TransactionStore::add].
    pub fn add(&self, candidate: &TransactionCandidate) -> Result<TransactionId, Error> {
        let scope = self.bound_scope()?;
        self.shared.transactions.add(&scope, candidate)
    }

    /// Update a transaction of the bound user.
    ///
    /// # Errors
    /// Returns [Error::UnboundSession] if nobody is bound, or the errors of
    /// [TransactionStore::update].
    pub fn update(&self, id: &TransactionId, patch: &TransactionPatch) -> Result<(), Error> {
        let scope = self.bound_scope()?;
        self.shared.transactions.update(&scope, id, patch)
    }

    /// Delete a transaction of the bound user.
    ///
    /// # Errors
    /// Returns [Error::UnboundSession] if nobody is bound, or the errors of
    /// [TransactionStore::delete].
    pub fn delete(&self, id: &TransactionId) -> Result<(), Error> {
        let scope = self.bound_scope()?;
        self.shared.transactions.delete(&scope, id)
    }

    /// The bound user's profile.
    ///
    /// # Errors
    /// Returns [Error::UnboundSession] if nobody is bound, or an [Error::Store]
    /// if the profile could not be read.
    pub fn profile(&self) -> Result<Profile, Error> {
        let identity = self.bound_identity()?;
        get_profile(self.shared.transactions.documents(), &identity)
    }

    /// Save the bound user's profile and make its name and photo their
    /// display name and photo with the identity provider.
    ///
    /// Returns the profile as stored.
    ///
    /// # Errors
    /// Returns [Error::UnboundSession] if nobody is bound, an [Error::Store]
    /// if the profile could not be saved, or the identity provider's error.
    pub fn save_profile(&self, profile: &Profile) -> Result<Profile, Error> {
        let identity = self.bound_identity()?;
        let documents = self.shared.transactions.documents();

        save_profile(documents, &identity.uid, profile)?;
        self.shared
            .identity_provider
            .update_profile(&profile.name, profile.photo_url.as_deref())?;

        get_profile(documents, &identity)
    }

    /// Sign the user out through the identity provider.
    ///
    /// The session unbinds when the provider reports the change.
    ///
    /// # Errors
    /// Returns the identity provider's error if signing out failed.
    pub fn sign_out(&self) -> Result<(), Error> {
        self.shared.identity_provider.sign_out()
    }

    fn bound_scope(&self) -> Result<UserScope, Error> {
        Ok(self.bound_identity()?.uid)
    }

    fn bound_identity(&self) -> Result<Identity, Error> {
        self.shared
            .lock()?
            .identity
            .clone()
            .ok_or(Error::UnboundSession)
    }
}

impl<S: DocumentStore + 'static> BinderShared<S> {
    fn lock(&self) -> Result<MutexGuard<'_, BinderState>, Error> {
        self.state
            .lock()
            .map_err(|_| Error::Store(StoreError::LockError))
    }

    fn handle_identity_change(shared: &Arc<Self>, identity: Option<Identity>) {
        let Ok(mut state) = shared.lock() else {
            tracing::error!("could not acquire the session lock, ignoring identity change");
            return;
        };

        let same_user = match (&state.identity, &identity) {
            (Some(current), Some(new)) => current.uid == new.uid,
            _ => false,
        };

        if same_user && state.last_error.is_none() {
            // The profile changed, e.g. the email was verified. Keep the live query.
            state.identity = identity;
            let view = state.view();
            drop(state);
            shared.notify(&view);
            return;
        }

        state.generation += 1;
        let generation = state.generation;
        let previous = state.registration.take();
        state.identity = identity.clone();
        state.transactions.clear();
        state.summary = Summary::empty(shared.transactions.catalog());
        state.last_error = None;
        let view = state.view();
        drop(state);

        if let Some(previous) = previous {
            previous.cancel();
            tracing::debug!("cancelled the previous live query");
        }

        let Some(identity) = identity else {
            tracing::info!("session unbound");
            shared.notify(&view);
            return;
        };

        tracing::info!("binding session to {}", identity.uid);
        shared.notify(&view);
        Self::subscribe(shared, &identity.uid, generation);
    }

    fn subscribe(shared: &Arc<Self>, scope: &UserScope, generation: u64) {
        let on_change = {
            let shared: Weak<Self> = Arc::downgrade(shared);
            move |records: Vec<TransactionRecord>| {
                if let Some(shared) = shared.upgrade() {
                    shared.receive_transactions(generation, records);
                }
            }
        };
        let on_error = {
            let shared: Weak<Self> = Arc::downgrade(shared);
            move |error: StoreError| {
                if let Some(shared) = shared.upgrade() {
                    shared.receive_error(generation, error);
                }
            }
        };

        let registration = shared.transactions.subscribe(scope, on_change, on_error);

        let Ok(mut state) = shared.lock() else {
            tracing::error!("could not acquire the session lock to store the live query");
            return;
        };

        if state.generation != generation {
            // Rebound while subscribing. The registration is dropped, and so
            // cancelled, once the lock is released.
            drop(state);
            tracing::debug!("discarding live query for {scope}, the session has moved on");
            return;
        }

        match registration {
            Ok(registration) => state.registration = Some(registration),
            Err(error) => {
                tracing::error!("could not watch the transactions of {scope}: {error}");
                state.last_error = match error {
                    Error::Store(error) => Some(error),
                    error => Some(StoreError::Unavailable(error.to_string())),
                };
                let view = state.view();
                drop(state);
                shared.notify(&view);
            }
        }
    }

    fn receive_transactions(&self, generation: u64, records: Vec<TransactionRecord>) {
        let Ok(mut state) = self.lock() else {
            tracing::error!("could not acquire the session lock, dropping transactions");
            return;
        };

        if state.generation != generation {
            tracing::debug!("ignoring transactions from a previous session");
            return;
        }

        state.summary = Summary::compute(&records, self.transactions.catalog());
        state.transactions = records;
        state.last_error = None;
        let view = state.view();
        drop(state);

        self.notify(&view);
    }

    fn receive_error(&self, generation: u64, error: StoreError) {
        let Ok(mut state) = self.lock() else {
            tracing::error!("could not acquire the session lock, dropping error {error}");
            return;
        };

        if state.generation != generation {
            return;
        }

        tracing::error!("the live query on the session's transactions failed: {error}");
        state.registration = None;
        state.last_error = Some(error);
        let view = state.view();
        drop(state);

        self.notify(&view);
    }

    fn notify(&self, view: &SessionView) {
        notify_observers(&observers_of(self), view);
    }
}

fn observers_of<S>(shared: &BinderShared<S>) -> Vec<SharedObserver> {
    match shared.observers.lock() {
        Ok(observers) => observers.iter().map(Arc::clone).collect(),
        Err(_) => {
            tracing::error!("could not acquire the observer lock");
            Vec::new()
        }
    }
}

/// Observers run without any session lock so that they may call back into the session.
fn notify_observers(observers: &[SharedObserver], view: &SessionView) {
    for observer in observers {
        match observer.lock() {
            Ok(mut observer) => observer(view),
            Err(_) => tracing::warn!("skipping a session observer that panicked earlier"),
        }
    }
}
