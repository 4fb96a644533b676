//! Conversion between transactions and their stored documents.
//!
//! A transaction document has the fields `amount`, `category`, `description`
//! and `type`. The ID and creation time are document metadata.

use serde::{Deserialize, Serialize};

use crate::{
    document_store::{Document, DocumentSnapshot, StoreError, into_document},
    transaction::{
        TransactionPatch,
        core::{NewTransaction, TransactionRecord, TransactionType},
    },
};

#[derive(Serialize, Deserialize)]
struct TransactionFields {
    amount: f64,
    category: String,
    #[serde(default)]
    description: String,
    #[serde(rename = "type")]
    type_: TransactionType,
}

pub(super) fn encode(transaction: &NewTransaction) -> Result<Document, StoreError> {
    let fields = TransactionFields {
        amount: transaction.amount,
        category: transaction.category.to_string(),
        description: transaction.description.clone(),
        type_: transaction.type_,
    };

    into_document(serde_json::to_value(fields)?)
}

pub(super) fn encode_patch(patch: &TransactionPatch) -> Result<Document, StoreError> {
    into_document(serde_json::to_value(patch)?)
}

pub(super) fn decode(snapshot: DocumentSnapshot) -> Result<TransactionRecord, StoreError> {
    let fields: TransactionFields =
        serde_json::from_value(serde_json::Value::Object(snapshot.fields))?;

    Ok(TransactionRecord {
        id: snapshot.id,
        amount: fields.amount,
        category: fields.category,
        description: fields.description,
        type_: fields.type_,
        created_at: snapshot.created_at,
    })
}

/// Decode every snapshot that holds a transaction, keeping the store's order.
///
/// Documents that are not valid transactions are logged and skipped so that
/// one bad document does not hide the rest.
pub(super) fn decode_all(snapshots: Vec<DocumentSnapshot>) -> Vec<TransactionRecord> {
    snapshots
        .into_iter()
        .filter_map(|snapshot| {
            let id = snapshot.id.clone();
            decode(snapshot)
                .inspect_err(|error| tracing::warn!("skipping transaction {id}: {error}"))
                .ok()
        })
        .collect()
}
