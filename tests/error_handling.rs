//! Error handling and edge case tests.

use lpg_tracker::{
    CustomerPatch, DocumentId, DocumentStore, NewCustomer, StoreConfig, Tracker, TrackerConfig,
    TrackerError, ValidationError,
};
use rust_decimal::Decimal;
use std::fs::OpenOptions;
use std::io::Write;
use tempfile::TempDir;

fn config(dir: &TempDir) -> TrackerConfig {
    TrackerConfig {
        store: StoreConfig {
            path: dir.path().join("store"),
            ..Default::default()
        },
        ..Default::default()
    }
}

fn named(name: &str) -> NewCustomer {
    NewCustomer {
        name: name.into(),
        phone: "555".into(),
        address: "X".into(),
    }
}

// --- Validation Errors ---

#[test]
fn test_invalid_names_write_nothing() {
    let dir = TempDir::new().unwrap();
    let tracker = Tracker::open(config(&dir)).unwrap();

    let long = "a".repeat(51);
    let cases = [
        ("", ValidationError::NameRequired),
        ("   ", ValidationError::NameRequired),
        ("A", ValidationError::NameTooShort),
        (long.as_str(), ValidationError::NameTooLong),
        ("John123", ValidationError::NameInvalidCharacters),
        ("O'Brien", ValidationError::NameInvalidCharacters),
    ];
    for (name, expected) in cases {
        match tracker.customers().create(&named(name)) {
            Err(TrackerError::Validation(e)) => assert_eq!(e, expected, "name {:?}", name),
            other => panic!("name {:?}: expected validation error, got {:?}", name, other),
        }
    }
    assert_eq!(tracker.customers().count(), 0);

    tracker.customers().create(&named("John Doe")).unwrap();
    tracker.customers().create(&named(&"b".repeat(50))).unwrap();
    assert_eq!(tracker.customers().count(), 2);
}

#[test]
fn test_validation_messages() {
    let dir = TempDir::new().unwrap();
    let tracker = Tracker::open(config(&dir)).unwrap();

    let err = tracker.customers().create(&named("A")).unwrap_err();
    assert!(err.to_string().contains("Name must be at least 2 characters long"));
    assert!(!err.is_retryable());
}

#[test]
fn test_update_with_invalid_name_keeps_record() {
    let dir = TempDir::new().unwrap();
    let tracker = Tracker::open(config(&dir)).unwrap();
    let id = tracker.customers().create(&named("Jane Roe")).unwrap();
    let before = tracker.customers().get_by_id(&id).unwrap().unwrap();

    let result = tracker.customers().update(
        &id,
        &CustomerPatch {
            name: Some("J4ne".into()),
            ..Default::default()
        },
    );
    assert!(matches!(result, Err(TrackerError::Validation(_))));
    assert_eq!(tracker.customers().get_by_id(&id).unwrap().unwrap(), before);
}

// --- Missing Records ---

#[test]
fn test_missing_customer_operations() {
    let dir = TempDir::new().unwrap();
    let tracker = Tracker::open(config(&dir)).unwrap();
    let ghost = DocumentId::new("ghost");

    assert!(tracker.customers().get_by_id(&ghost).unwrap().is_none());
    assert!(!tracker.customers().delete(&ghost).unwrap());

    let update = tracker.customers().update(&ghost, &CustomerPatch::default());
    assert!(matches!(update, Err(TrackerError::NotFound { .. })));

    let adjust = tracker.reconciler().adjust(&ghost, 1, Decimal::ONE);
    assert!(matches!(adjust, Err(TrackerError::NotFound { .. })));
}

#[test]
fn test_negative_cylinders_rejected() {
    let dir = TempDir::new().unwrap();
    let tracker = Tracker::open(config(&dir)).unwrap();
    let id = tracker.customers().create(&named("Jane Roe")).unwrap();

    let err = tracker
        .reconciler()
        .adjust(&id, -1, Decimal::ZERO)
        .unwrap_err();
    assert!(matches!(err, TrackerError::InvalidOperation(_)));
    assert!(!err.is_retryable());

    let customer = tracker.customers().get_by_id(&id).unwrap().unwrap();
    assert_eq!(customer.cylinders_held, 0);
}

// --- Auth ---

#[test]
fn test_bad_login() {
    let dir = TempDir::new().unwrap();
    let tracker = Tracker::open(config(&dir)).unwrap();

    let err = tracker.auth().login("admin", "wrong").unwrap_err();
    assert!(matches!(err, TrackerError::InvalidCredentials));
    assert_eq!(err.to_string(), "Invalid username or password");
}

// --- Store Errors ---

#[test]
fn test_second_tracker_on_same_store_is_locked() {
    let dir = TempDir::new().unwrap();
    let _first = Tracker::open(config(&dir)).unwrap();

    let second = Tracker::open(config(&dir));
    match second {
        Err(e) => {
            assert!(matches!(e, TrackerError::Locked));
            assert!(e.is_retryable());
        }
        Ok(_) => panic!("second open should fail"),
    }
}

#[test]
fn test_missing_store_without_create() {
    let dir = TempDir::new().unwrap();
    let mut cfg = config(&dir);
    cfg.store.create_if_missing = false;

    assert!(matches!(Tracker::open(cfg), Err(TrackerError::NotInitialized)));
}

#[test]
fn test_torn_log_tail_is_dropped() {
    let dir = TempDir::new().unwrap();
    let id = {
        let tracker = Tracker::open(config(&dir)).unwrap();
        tracker.customers().create(&named("Jane Roe")).unwrap()
    };

    // Simulate a crash mid-append.
    let log_path = dir.path().join("store").join("documents.log");
    let mut log = OpenOptions::new().append(true).open(&log_path).unwrap();
    log.write_all(&[0x40, 0x00, 0x00, 0x00, 0xde, 0xad]).unwrap();
    drop(log);

    let tracker = Tracker::open(config(&dir)).unwrap();
    assert_eq!(tracker.customers().get_by_id(&id).unwrap().unwrap().name, "Jane Roe");

    // New writes land after the truncated tail and survive another reopen.
    let second = tracker.customers().create(&named("John Doe")).unwrap();
    drop(tracker);

    let store = DocumentStore::open(config(&dir).store).unwrap();
    assert!(store.get("customers", &second).unwrap().is_some());
}

#[test]
fn test_invalid_config_rejected() {
    let dir = TempDir::new().unwrap();
    let cfg = TrackerConfig {
        users: Vec::new(),
        ..config(&dir)
    };
    assert!(matches!(Tracker::open(cfg), Err(TrackerError::Config(_))));
}
