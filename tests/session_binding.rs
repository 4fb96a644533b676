use std::sync::{Arc, Mutex};

use rusqlite::Connection;

use daily_spend::{
    CategoryCatalog, DashboardConfig, Error, Identity, MemoryDocumentStore,
    MemoryIdentityProvider, Profile, SessionBinder, SessionState, SqliteDocumentStore,
    TransactionCandidate, TransactionPatch, TransactionStore, TransactionType, UserScope,
    ValidationError,
};

fn user(uid: &str) -> Identity {
    Identity::new(UserScope::new(uid).unwrap())
}

fn memory_session() -> (
    MemoryDocumentStore,
    MemoryIdentityProvider,
    SessionBinder<MemoryDocumentStore>,
) {
    let documents = MemoryDocumentStore::new();
    let identity = MemoryIdentityProvider::new();
    let binder = SessionBinder::new(
        TransactionStore::new(documents.clone(), Arc::new(CategoryCatalog::reference())),
        Arc::new(identity.clone()),
    );

    (documents, identity, binder)
}

#[test]
fn dashboard_for_reference_month() {
    let (_, identity, binder) = memory_session();
    let _listener = binder.start();
    identity.sign_in(user("alice")).unwrap();

    binder
        .add(&TransactionCandidate::new(100.0, "Salary", TransactionType::Income))
        .unwrap();
    binder
        .add(&TransactionCandidate::new(40.0, "Food", TransactionType::Expense))
        .unwrap();
    binder
        .add(&TransactionCandidate::new(20.0, "Transport", TransactionType::Expense))
        .unwrap();

    let dashboard = binder.dashboard(&DashboardConfig::default()).unwrap();

    assert_eq!(dashboard.summary.total_income, 100.0);
    assert_eq!(dashboard.summary.total_expense, 60.0);
    assert_eq!(dashboard.summary.balance, 40.0);
    assert!((dashboard.summary.category_percent("Food") - 66.67).abs() < 0.01);
    assert!((dashboard.summary.category_percent("Transport") - 33.33).abs() < 0.01);
    assert_eq!(dashboard.recent.len(), 3);
    assert_eq!(dashboard.budget.progress, 0.03);
}

#[test]
fn salary_expense_is_rejected_before_the_store() {
    let (documents, identity, binder) = memory_session();
    let _listener = binder.start();
    identity.sign_in(user("alice")).unwrap();

    let got = binder.add(&TransactionCandidate::new(50.0, "Salary", TransactionType::Expense));

    assert_eq!(
        got,
        Err(Error::Validation(ValidationError::ForbiddenCategoryForType {
            category: "Salary".to_owned(),
            type_: TransactionType::Expense,
        }))
    );
    assert_eq!(documents.write_count(), 0);
    assert!(binder.view().unwrap().transactions.is_empty());
}

#[test]
fn switching_users_cancels_the_previous_live_query() {
    let (documents, identity, binder) = memory_session();
    let _listener = binder.start();
    let states = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&states);
    binder.on_update(move |view| {
        sink.lock()
            .unwrap()
            .push((view.state.clone(), view.transactions.len()))
    });

    identity.sign_in(user("user-a")).unwrap();
    binder
        .add(&TransactionCandidate::new(10.0, "Food", TransactionType::Expense))
        .unwrap();
    identity.sign_in(user("user-b")).unwrap();
    let updates_after_switch = states.lock().unwrap().len();

    // Another device writes to user A's transactions.
    TransactionStore::new(documents, Arc::new(CategoryCatalog::reference()))
        .add(
            &UserScope::new("user-a").unwrap(),
            &TransactionCandidate::new(99.0, "Food", TransactionType::Expense),
        )
        .unwrap();

    let states = states.lock().unwrap();
    assert_eq!(states.len(), updates_after_switch);
    assert_eq!(
        states.last(),
        Some(&(SessionState::Bound(UserScope::new("user-b").unwrap()), 0))
    );
    assert_eq!(binder.view().unwrap().summary.total_expense, 0.0);
}

#[test]
fn edits_and_deletes_flow_back_through_the_live_query() {
    let (_, identity, binder) = memory_session();
    let _listener = binder.start();
    identity.sign_in(user("alice")).unwrap();
    let id = binder
        .add(&TransactionCandidate::new(10.0, "Food", TransactionType::Expense).description("Lunch"))
        .unwrap();

    binder
        .update(&id, &TransactionPatch::default().category("Shopping").amount(25.0))
        .unwrap();

    let view = binder.view().unwrap();
    assert_eq!(view.transactions[0].category, "Shopping");
    assert_eq!(view.transactions[0].description, "Lunch");
    assert_eq!(view.summary.category_total("Shopping"), 25.0);
    assert_eq!(view.summary.category_total("Food"), 0.0);

    binder.delete(&id).unwrap();
    binder.delete(&id).unwrap();

    assert!(binder.view().unwrap().transactions.is_empty());
}

#[test]
fn signing_out_unbinds_and_blocks_writes() {
    let (documents, identity, binder) = memory_session();
    let _listener = binder.start();
    identity.sign_in(user("alice")).unwrap();
    binder
        .add(&TransactionCandidate::new(10.0, "Food", TransactionType::Expense))
        .unwrap();

    binder.sign_out().unwrap();

    assert_eq!(binder.state(), SessionState::Unbound);
    assert!(binder.view().unwrap().transactions.is_empty());
    assert_eq!(
        binder.add(&TransactionCandidate::new(1.0, "Food", TransactionType::Expense)),
        Err(Error::UnboundSession)
    );
    assert_eq!(documents.write_count(), 1);

    // Signing back in shows the data again.
    identity.sign_in(user("alice")).unwrap();
    assert_eq!(binder.view().unwrap().transactions.len(), 1);
}

#[test]
fn sqlite_backed_session() {
    let documents = SqliteDocumentStore::new(Connection::open_in_memory().unwrap()).unwrap();
    let identity = MemoryIdentityProvider::new();
    let binder = SessionBinder::new(
        TransactionStore::new(documents, Arc::new(CategoryCatalog::reference())),
        Arc::new(identity.clone()),
    );
    let _listener = binder.start();
    identity.sign_in(user("alice")).unwrap();

    let salary = binder
        .add(&TransactionCandidate::new(3000.0, "Salary", TransactionType::Income))
        .unwrap();
    binder
        .add(&TransactionCandidate::new(12.5, "Food", TransactionType::Expense))
        .unwrap();
    binder
        .update(&salary, &TransactionPatch::default().amount(3100.0))
        .unwrap();

    let view = binder.view().unwrap();
    assert_eq!(view.transactions.len(), 2);
    assert_eq!(view.summary.total_income, 3100.0);
    assert_eq!(view.summary.balance, 3087.5);
}

#[test]
fn profile_is_kept_per_user() {
    let documents = SqliteDocumentStore::new(Connection::open_in_memory().unwrap()).unwrap();
    let identity = MemoryIdentityProvider::new();
    let binder = SessionBinder::new(
        TransactionStore::new(documents, Arc::new(CategoryCatalog::reference())),
        Arc::new(identity.clone()),
    );
    let _listener = binder.start();
    identity.sign_in(user("alice")).unwrap();

    binder
        .save_profile(&Profile {
            name: "Alice".to_owned(),
            phone: "021 555 0100".to_owned(),
            photo_url: Some("https://example.com/alice.png".to_owned()),
        })
        .unwrap();
    identity.sign_in(user("bob")).unwrap();
    let bob = binder.profile().unwrap();
    identity.sign_in(user("alice")).unwrap();
    let alice = binder.profile().unwrap();

    assert_eq!(bob, Profile::default());
    assert_eq!(alice.name, "Alice");
    assert_eq!(alice.photo_url.as_deref(), Some("https://example.com/alice.png"));
}
