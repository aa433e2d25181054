//! Racing identify calls from separate connections against one database file.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use contactgraph::db::Database;
use contactgraph::errors::ContactGraphError;
use contactgraph::resolution::IdentityResolver;
use contactgraph::types::{ConsolidatedContact, NewContact};
use tempfile::TempDir;

const WORKERS: usize = 8;

fn setup() -> (PathBuf, TempDir) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("contacts.db");
    Database::initialize(&path).unwrap().close().unwrap();
    (path, dir)
}

/// Runs `identify(email, phone)` on `WORKERS` threads released together,
/// each thread using its own connection.
fn race(path: &Path, email: Option<&str>, phone: Option<&str>) -> Vec<ConsolidatedContact> {
    let barrier = Arc::new(Barrier::new(WORKERS));
    let handles: Vec<_> = (0..WORKERS)
        .map(|_| {
            let barrier = Arc::clone(&barrier);
            let path = path.to_path_buf();
            let email = email.map(str::to_string);
            let phone = phone.map(str::to_string);
            thread::spawn(move || {
                let db = Database::open(&path).unwrap();
                barrier.wait();
                IdentityResolver::new(&db)
                    .identify(email.as_deref(), phone.as_deref())
                    .unwrap()
            })
        })
        .collect();

    handles.into_iter().map(|h| h.join().unwrap()).collect()
}

#[test]
fn test_concurrent_first_sightings_create_one_primary() {
    let (path, _dir) = setup();

    let views = race(&path, Some("race@x.com"), Some("555"));

    let first = &views[0];
    assert!(views.iter().all(|v| v == first));
    let stats = Database::open(&path).unwrap().get_stats().unwrap();
    assert_eq!(stats.contact_count, 1);
    assert_eq!(stats.primary_count, 1);
}

#[test]
fn test_concurrent_bridging_merges_once() {
    let (path, _dir) = setup();
    let (p1, p2) = {
        let db = Database::open(&path).unwrap();
        let resolver = IdentityResolver::new(&db);
        let p1 = resolver.identify(Some("a@x.com"), None).unwrap().primary_contact_id;
        let p2 = resolver.identify(None, Some("222")).unwrap().primary_contact_id;
        (p1, p2)
    };

    let views = race(&path, Some("a@x.com"), Some("222"));

    for view in &views {
        assert_eq!(view.primary_contact_id, p1);
        assert_eq!(view.secondary_contact_ids, vec![p2]);
    }
    let stats = Database::open(&path).unwrap().get_stats().unwrap();
    assert_eq!(stats.contact_count, 2);
    assert_eq!(stats.primary_count, 1);
}

#[test]
fn test_concurrent_extensions_add_one_secondary() {
    let (path, _dir) = setup();
    {
        let db = Database::open(&path).unwrap();
        IdentityResolver::new(&db)
            .identify(Some("a@x.com"), Some("111"))
            .unwrap();
    }

    let views = race(&path, Some("a@x.com"), Some("222"));

    assert!(views.iter().all(|v| v.secondary_contact_ids.len() == 1));
    let stats = Database::open(&path).unwrap().get_stats().unwrap();
    assert_eq!(stats.contact_count, 2);
    assert_eq!(stats.secondary_count, 1);
}

#[test]
fn test_delete_waits_for_concurrent_link() {
    let (path, _dir) = setup();
    let writer = Database::open(&path).unwrap();
    let primary = writer
        .insert_contact(&NewContact::primary(Some("a@x.com"), None))
        .unwrap();

    // Hold the write lock while another connection tries to delete the
    // primary, then link a secondary to it before releasing.
    let tx = writer.begin_immediate().unwrap();
    let deleter = {
        let path = path.clone();
        let primary_id = primary.id;
        thread::spawn(move || {
            let db = Database::open(&path).unwrap();
            db.soft_delete_contact(primary_id)
        })
    };
    thread::sleep(Duration::from_millis(100));
    let secondary = writer
        .insert_contact(&NewContact::secondary(None, Some("111"), primary.id))
        .unwrap();
    tx.commit().unwrap();

    let err = deleter.join().unwrap().unwrap_err();
    assert!(matches!(err, ContactGraphError::Validation { .. }), "{err}");

    let view = IdentityResolver::new(&writer)
        .identify(Some("a@x.com"), None)
        .unwrap();
    assert_eq!(view.primary_contact_id, primary.id);
    assert_eq!(view.secondary_contact_ids, vec![secondary.id]);
}
