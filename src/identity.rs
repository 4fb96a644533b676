//! The identity provider boundary and an in-process implementation of it.

use std::{
    fmt::Display,
    sync::{Arc, Mutex, MutexGuard, Weak},
};

use serde::{Deserialize, Serialize};

use crate::Error;

/// The stable key of a signed in user, used to partition all of their data.
///
/// A scope is used as a path segment in the document store, so it may not be
/// empty or contain a `/`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UserScope(String);

impl UserScope {
    /// Create a user scope from a user ID issued by the identity provider.
    ///
    /// # Errors
    ///
    /// Returns an [Error::InvalidUserScope] if `uid` is empty or contains a `/`.
    pub fn new(uid: &str) -> Result<Self, Error> {
        if uid.is_empty() || uid.contains('/') {
            Err(Error::InvalidUserScope(uid.to_owned()))
        } else {
            Ok(Self(uid.to_owned()))
        }
    }

    /// The scope as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for UserScope {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Display for UserScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A signed in user as reported by the identity provider.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    /// The user's stable, unique ID.
    pub uid: UserScope,
    /// The email address the user signed in with, if any.
    pub email: Option<String>,
    /// The name shown on the user's profile.
    pub display_name: Option<String>,
    /// Where the user's profile picture is, if they chose one.
    pub photo_url: Option<String>,
    /// Whether the user has confirmed their email address.
    pub email_verified: bool,
}

impl Identity {
    /// Create an identity with no email or display name.
    pub fn new(uid: UserScope) -> Self {
        Self {
            uid,
            email: None,
            display_name: None,
            photo_url: None,
            email_verified: false,
        }
    }

    /// Set the email address.
    pub fn email(mut self, email: &str, verified: bool) -> Self {
        self.email = Some(email.to_owned());
        self.email_verified = verified;
        self
    }

    /// Set the display name.
    pub fn display_name(mut self, display_name: &str) -> Self {
        self.display_name = Some(display_name.to_owned());
        self
    }
}

/// Called with the new identity whenever a user signs in or out.
pub type IdentityHandler = Box<dyn FnMut(Option<Identity>) + Send>;

/// Authenticates users and reports who is signed in.
pub trait IdentityProvider: Send + Sync {
    /// The currently signed in user, if any.
    fn current_identity(&self) -> Option<Identity>;

    /// Register `handler` to be called on every sign in and sign out.
    ///
    /// The handler is called once straight away with the current identity.
    fn on_identity_change(&self, handler: IdentityHandler) -> IdentityListener;

    /// Change the display name of the current user, and their photo URL if
    /// `photo_url` is given.
    ///
    /// Handlers are called with the updated identity.
    ///
    /// # Errors
    /// Returns [Error::UnboundSession] if nobody is signed in.
    fn update_profile(&self, display_name: &str, photo_url: Option<&str>) -> Result<(), Error>;

    /// Sign the current user out.
    fn sign_out(&self) -> Result<(), Error>;
}

/// A handle to an identity change handler. Dropping it removes the handler.
#[must_use = "dropping the listener removes the identity change handler"]
pub struct IdentityListener {
    remove: Option<Box<dyn FnOnce() + Send>>,
}

impl IdentityListener {
    /// Create a listener that runs `remove` when cancelled or dropped.
    pub fn new(remove: impl FnOnce() + Send + 'static) -> Self {
        Self {
            remove: Some(Box::new(remove)),
        }
    }

    /// Remove the handler.
    pub fn cancel(mut self) {
        self.run_remove();
    }

    fn run_remove(&mut self) {
        if let Some(remove) = self.remove.take() {
            remove();
        }
    }
}

impl Drop for IdentityListener {
    fn drop(&mut self) {
        self.run_remove();
    }
}

impl std::fmt::Debug for IdentityListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityListener")
            .field("active", &self.remove.is_some())
            .finish()
    }
}

type SharedHandler = Arc<Mutex<IdentityHandler>>;

#[derive(Default)]
struct ProviderState {
    current: Option<Identity>,
    next_handler_id: u64,
    handlers: Vec<(u64, SharedHandler)>,
}

/// An identity provider that keeps its state in memory.
///
/// Signing in is a matter of calling [MemoryIdentityProvider::sign_in] with
/// the identity to use, which makes it a stand-in for a real authentication
/// service in tests and tools.
#[derive(Clone, Default)]
pub struct MemoryIdentityProvider {
    state: Arc<Mutex<ProviderState>>,
}

impl MemoryIdentityProvider {
    /// Create a provider with nobody signed in.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sign `identity` in, replacing any current user.
    pub fn sign_in(&self, identity: Identity) -> Result<(), Error> {
        tracing::debug!("signing in {}", identity.uid);
        self.set_current(Some(identity))
    }

    /// Mark the current user's email address as verified.
    ///
    /// # Errors
    /// Returns [Error::UnboundSession] if nobody is signed in.
    pub fn verify_email(&self) -> Result<(), Error> {
        let identity = self.signed_in()?;

        self.set_current(Some(Identity {
            email_verified: true,
            ..identity
        }))
    }

    fn signed_in(&self) -> Result<Identity, Error> {
        self.lock()?.current.clone().ok_or(Error::UnboundSession)
    }

    fn lock(&self) -> Result<MutexGuard<'_, ProviderState>, Error> {
        self.state
            .lock()
            .map_err(|_| Error::IdentityProvider("could not acquire the identity lock".to_owned()))
    }

    fn set_current(&self, identity: Option<Identity>) -> Result<(), Error> {
        let handlers = {
            let mut state = self.lock()?;
            state.current = identity.clone();
            state
                .handlers
                .iter()
                .map(|(_, handler)| Arc::clone(handler))
                .collect::<Vec<_>>()
        };

        // Handlers run without the state lock so that they may query the provider.
        for handler in handlers {
            call_handler(&handler, identity.clone());
        }

        Ok(())
    }
}

fn call_handler(handler: &SharedHandler, identity: Option<Identity>) {
    match handler.lock() {
        Ok(mut handler) => handler(identity),
        Err(_) => tracing::warn!("skipping an identity handler that panicked earlier"),
    }
}

impl IdentityProvider for MemoryIdentityProvider {
    fn current_identity(&self) -> Option<Identity> {
        self.lock().ok().and_then(|state| state.current.clone())
    }

    fn on_identity_change(&self, handler: IdentityHandler) -> IdentityListener {
        let handler = Arc::new(Mutex::new(handler));

        let registered = self.lock().map(|mut state| {
            state.next_handler_id += 1;
            let id = state.next_handler_id;
            state.handlers.push((id, Arc::clone(&handler)));
            (id, state.current.clone())
        });

        let (id, current) = match registered {
            Ok(registered) => registered,
            Err(error) => {
                tracing::error!("could not register identity handler: {error}");
                return IdentityListener::new(|| {});
            }
        };

        call_handler(&handler, current);

        let state: Weak<Mutex<ProviderState>> = Arc::downgrade(&self.state);
        IdentityListener::new(move || {
            let Some(state) = state.upgrade() else {
                return;
            };

            if let Ok(mut state) = state.lock() {
                state.handlers.retain(|(handler_id, _)| *handler_id != id);
            };
        })
    }

    fn update_profile(&self, display_name: &str, photo_url: Option<&str>) -> Result<(), Error> {
        let identity = self.signed_in()?;
        tracing::debug!("updating the profile of {}", identity.uid);

        self.set_current(Some(Identity {
            display_name: Some(display_name.to_owned()),
            photo_url: photo_url.map(str::to_owned).or(identity.photo_url.clone()),
            ..identity
        }))
    }

    fn sign_out(&self) -> Result<(), Error> {
        tracing::debug!("signing out");
        self.set_current(None)
    }
}
