//! Adds, edits, removes and watches a user's transactions in the document store.

use std::sync::Arc;

use crate::{
    Error,
    category::CategoryCatalog,
    document_store::{CollectionPath, DocumentStore, ListenerRegistration, StoreError},
    identity::UserScope,
    transaction::{
        TransactionCandidate, TransactionPatch,
        core::{TransactionId, TransactionRecord},
        document::{decode, decode_all, encode, encode_patch},
        form::validate,
    },
};

/// The collection holding the transactions of `scope`: `users/{scope}/transactions`.
pub fn transactions_path(scope: &UserScope) -> CollectionPath {
    CollectionPath::new(&["users", scope.as_str(), "transactions"])
}

/// Translates transaction operations into document store calls.
///
/// Every write is validated against the category catalog first, so invalid
/// transactions never reach the store. Writes do not touch any local state:
/// subscribers see the result through their live query.
#[derive(Debug, Clone)]
pub struct TransactionStore<S> {
    documents: S,
    catalog: Arc<CategoryCatalog>,
}

impl<S: DocumentStore> TransactionStore<S> {
    /// Create a transaction store on top of `documents`.
    pub fn new(documents: S, catalog: Arc<CategoryCatalog>) -> Self {
        Self { documents, catalog }
    }

    /// The catalog that transactions are validated against.
    pub fn catalog(&self) -> &CategoryCatalog {
        &self.catalog
    }

    /// The document store that transactions are kept in.
    pub(crate) fn documents(&self) -> &S {
        &self.documents
    }

    /// A shared handle to the catalog.
    pub fn shared_catalog(&self) -> Arc<CategoryCatalog> {
        Arc::clone(&self.catalog)
    }

    /// Validate `candidate` and add it to the transactions of `scope`.
    ///
    /// The store assigns the ID and creation time.
    ///
    /// # Errors
    /// This function will return a:
    /// - [Error::Validation] if the candidate breaks a transaction rule, in which case the store is not called,
    /// - or [Error::Store] if the store failed.
    pub fn add(
        &self,
        scope: &UserScope,
        candidate: &TransactionCandidate,
    ) -> Result<TransactionId, Error> {
        let transaction = validate(candidate, &self.catalog)?;

        let id = self
            .documents
            .create(&transactions_path(scope), encode(&transaction)?)?;

        tracing::debug!("added transaction {id} for {scope}");

        Ok(id)
    }

    /// Retrieve a single transaction.
    ///
    /// # Errors
    /// Returns an [Error::Store] if the store failed or the document is not a transaction.
    pub fn get(
        &self,
        scope: &UserScope,
        id: &TransactionId,
    ) -> Result<Option<TransactionRecord>, Error> {
        let snapshot = self.documents.get(&transactions_path(scope), id)?;

        Ok(snapshot.map(decode).transpose()?)
    }

    /// Change the fields given in `patch`, leaving the ID and creation time untouched.
    ///
    /// The patch is applied to the stored transaction and the result is
    /// validated before anything is written.
    ///
    /// # Errors
    /// This function will return a:
    /// - [Error::UpdateMissingTransaction] if `id` is not one of the user's transactions,
    /// - [Error::Validation] if the updated transaction would break a transaction rule,
    /// - or [Error::Store] if the store failed.
    pub fn update(
        &self,
        scope: &UserScope,
        id: &TransactionId,
        patch: &TransactionPatch,
    ) -> Result<(), Error> {
        let current = self
            .get(scope, id)?
            .ok_or(Error::UpdateMissingTransaction)?;

        let updated = validate(&TransactionCandidate::from_patch(&current, patch), &self.catalog)?;

        if patch.is_empty() {
            tracing::debug!("empty update for transaction {id}, nothing to write");
            return Ok(());
        }

        let fields = encode_patch(&patch.normalised(&updated))?;

        self.documents
            .update(&transactions_path(scope), id, fields)
            .map_err(|error| match error {
                StoreError::NotFound(_) => Error::UpdateMissingTransaction,
                error => error.into(),
            })?;

        tracing::debug!("updated transaction {id} for {scope}");

        Ok(())
    }

    /// Delete a transaction. Deleting a transaction that does not exist succeeds.
    ///
    /// # Errors
    /// Returns an [Error::Store] if the store failed.
    pub fn delete(&self, scope: &UserScope, id: &TransactionId) -> Result<(), Error> {
        self.documents.delete(&transactions_path(scope), id)?;

        tracing::debug!("deleted transaction {id} for {scope}");

        Ok(())
    }

    /// Watch the transactions of `scope`.
    ///
    /// `on_change` receives every transaction, newest first, straight away and
    /// after every change. `on_error` is called if the live query breaks, after
    /// which the caller must subscribe again to get further changes.
    ///
    /// # Errors
    /// Returns an [Error::Store] if the live query could not be opened.
    pub fn subscribe<C, E>(
        &self,
        scope: &UserScope,
        mut on_change: C,
        on_error: E,
    ) -> Result<ListenerRegistration, Error>
    where
        C: FnMut(Vec<TransactionRecord>) + Send + 'static,
        E: FnMut(StoreError) + Send + 'static,
    {
        let registration = self.documents.subscribe(
            &transactions_path(scope),
            Box::new(move |snapshots| on_change(decode_all(snapshots))),
            Box::new(on_error),
        )?;

        tracing::debug!("subscribed to transactions for {scope}");

        Ok(registration)
    }
}
