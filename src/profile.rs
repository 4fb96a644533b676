//! A user's profile: the name, phone number and picture shown on their profile page.
//!
//! Profiles live in the `users` collection under the user's scope, next to the
//! user's `transactions` collection. A user who never saved their profile gets
//! one filled in from their identity.

use serde::{Deserialize, Serialize};

use crate::{
    Error,
    document_store::{CollectionPath, DocumentId, DocumentStore, StoreError, into_document},
    identity::{Identity, UserScope},
};

/// The collection holding every user's profile document.
pub fn profiles_path() -> CollectionPath {
    CollectionPath::new(&["users"])
}

/// The details a user can edit on their profile page.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Profile {
    /// The user's name. Also used as their display name.
    pub name: String,
    /// The user's phone number, as typed.
    pub phone: String,
    /// Where the user's profile picture is, if they chose one.
    pub photo_url: Option<String>,
}

impl Profile {
    /// The profile of a user who never saved one.
    pub fn from_identity(identity: &Identity) -> Self {
        Self {
            name: identity.display_name.clone().unwrap_or_default(),
            phone: String::new(),
            photo_url: identity.photo_url.clone(),
        }
    }
}

/// The stored form of a profile. Older documents may lack any of the fields.
#[derive(Serialize, Deserialize)]
struct ProfileFields {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    phone: Option<String>,
    #[serde(default, rename = "photoURL")]
    photo_url: Option<String>,
}

impl From<ProfileFields> for Profile {
    fn from(fields: ProfileFields) -> Self {
        Self {
            name: fields.name.unwrap_or_default(),
            phone: fields.phone.unwrap_or_default(),
            photo_url: fields.photo_url,
        }
    }
}

/// Read the profile of `identity`, falling back to the identity's own details.
///
/// # Errors
/// Returns an [Error::Store] if the store failed or the profile document is malformed.
pub fn get_profile<S: DocumentStore>(documents: &S, identity: &Identity) -> Result<Profile, Error> {
    let snapshot = documents.get(&profiles_path(), &profile_id(&identity.uid))?;

    let Some(snapshot) = snapshot else {
        return Ok(Profile::from_identity(identity));
    };

    let fields: ProfileFields = serde_json::from_value(serde_json::Value::Object(snapshot.fields))
        .map_err(StoreError::from)?;

    Ok(fields.into())
}

/// Save `profile` as the profile of `scope`.
///
/// Every profile field is written. Other fields of the document are kept.
///
/// # Errors
/// Returns an [Error::Store] if the store failed.
pub fn save_profile<S: DocumentStore>(
    documents: &S,
    scope: &UserScope,
    profile: &Profile,
) -> Result<(), Error> {
    let fields = ProfileFields {
        name: Some(profile.name.clone()),
        phone: Some(profile.phone.clone()),
        photo_url: profile.photo_url.clone(),
    };
    let document = into_document(serde_json::to_value(fields).map_err(StoreError::from)?)?;

    documents.merge(&profiles_path(), &profile_id(scope), document)?;
    tracing::debug!("saved the profile of {scope}");

    Ok(())
}

fn profile_id(scope: &UserScope) -> DocumentId {
    DocumentId::new(scope.as_str())
}

#[cfg(test)]
mod tests {
    use serde_json::{Map, json};

    use crate::{
        document_store::{DocumentId, DocumentStore, MemoryDocumentStore},
        identity::{Identity, UserScope},
        profile::{Profile, get_profile, profiles_path, save_profile},
    };

    fn alice() -> Identity {
        Identity::new(UserScope::new("alice").unwrap()).display_name("Alice")
    }

    #[test]
    fn missing_profile_comes_from_identity() {
        let store = MemoryDocumentStore::new();

        let got = get_profile(&store, &alice()).unwrap();

        assert_eq!(
            got,
            Profile {
                name: "Alice".to_owned(),
                phone: String::new(),
                photo_url: None,
            }
        );
    }

    #[test]
    fn saved_profile_is_read_back() {
        let store = MemoryDocumentStore::new();
        let profile = Profile {
            name: "Alice Smith".to_owned(),
            phone: "021 555 0100".to_owned(),
            photo_url: Some("https://example.com/alice.png".to_owned()),
        };

        save_profile(&store, &alice().uid, &profile).unwrap();

        assert_eq!(get_profile(&store, &alice()).unwrap(), profile);
        let stored = store
            .get(&profiles_path(), &DocumentId::new("alice"))
            .unwrap()
            .unwrap();
        assert_eq!(
            stored.fields.get("photoURL"),
            Some(&json!("https://example.com/alice.png"))
        );
    }

    #[test]
    fn saving_keeps_other_fields() {
        let store = MemoryDocumentStore::new();
        let mut extra = Map::new();
        extra.insert("currency".to_owned(), json!("NZD"));
        store
            .merge(&profiles_path(), &DocumentId::new("alice"), extra)
            .unwrap();

        save_profile(&store, &alice().uid, &Profile::default()).unwrap();

        let stored = store
            .get(&profiles_path(), &DocumentId::new("alice"))
            .unwrap()
            .unwrap();
        assert_eq!(stored.fields.get("currency"), Some(&json!("NZD")));
        assert_eq!(stored.fields.get("name"), Some(&json!("")));
    }

    #[test]
    fn partial_documents_default_to_empty() {
        let store = MemoryDocumentStore::new();
        let mut fields = Map::new();
        fields.insert("phone".to_owned(), json!("021 555 0100"));
        fields.insert("name".to_owned(), json!(null));
        store
            .merge(&profiles_path(), &DocumentId::new("alice"), fields)
            .unwrap();

        let got = get_profile(&store, &alice()).unwrap();

        assert_eq!(got.name, "");
        assert_eq!(got.phone, "021 555 0100");
        assert_eq!(got.photo_url, None);
    }
}
