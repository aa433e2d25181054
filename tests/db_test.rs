use contactgraph::db::Database;
use contactgraph::errors::ContactGraphError;
use contactgraph::types::*;
use tempfile::TempDir;

fn setup_db() -> (Database, TempDir) {
    let dir = TempDir::new().expect("failed to create temp dir");
    let db_path = dir.path().join("contacts.db");
    let db = Database::initialize(&db_path).expect("failed to initialize database");
    (db, dir)
}

#[test]
fn test_initialize_creates_database() {
    let dir = TempDir::new().expect("failed to create temp dir");
    let db_path = dir.path().join("subdir").join("contacts.db");
    let _db = Database::initialize(&db_path).expect("failed to initialize database");
    assert!(db_path.exists(), "database file should exist after initialize");
}

#[test]
fn test_initialize_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("contacts.db");
    let db = Database::initialize(&db_path).unwrap();
    db.insert_contact(&NewContact::primary(Some("a@x.com"), None))
        .unwrap();
    db.close().unwrap();

    let db = Database::initialize(&db_path).unwrap();
    assert_eq!(db.get_all_contacts().unwrap().len(), 1);
}

#[test]
fn test_insert_and_get_contact() {
    let (db, _dir) = setup_db();

    let created = db
        .insert_contact(&NewContact::primary(Some("doc@hillvalley.edu"), Some("123456")))
        .expect("failed to insert contact");

    let fetched = db
        .get_contact_by_id(created.id)
        .expect("failed to get contact")
        .expect("contact should exist");

    assert_eq!(fetched, created);
    assert_eq!(fetched.email.as_deref(), Some("doc@hillvalley.edu"));
    assert_eq!(fetched.phone_number.as_deref(), Some("123456"));
    assert_eq!(fetched.link_precedence, LinkPrecedence::Primary);
    assert_eq!(fetched.linked_id, None);
    assert!(fetched.created_at > 0);
    assert_eq!(fetched.deleted_at, None);
}

#[test]
fn test_ids_and_timestamps_are_monotonic() {
    let (db, _dir) = setup_db();
    let first = db.insert_contact(&NewContact::primary(Some("a@x.com"), None)).unwrap();
    let second = db.insert_contact(&NewContact::primary(Some("b@x.com"), None)).unwrap();

    assert!(second.id > first.id);
    assert!(second.created_at >= first.created_at);
}

#[test]
fn test_created_at_never_goes_backwards() {
    let (db, _dir) = setup_db();
    let far_future = i64::MAX / 2;
    db.conn()
        .execute(
            "INSERT INTO contacts (email, link_precedence, created_at, updated_at)
             VALUES ('future@x.com', 'primary', ?1, ?1)",
            [far_future],
        )
        .unwrap();

    let next = db.insert_contact(&NewContact::primary(Some("now@x.com"), None)).unwrap();
    assert_eq!(next.created_at, far_future);
}

#[test]
fn test_contact_needs_an_identifier() {
    let (db, _dir) = setup_db();
    let err = db.insert_contact(&NewContact::primary(None, None)).unwrap_err();
    assert!(matches!(err, ContactGraphError::Database { ref operation, .. } if operation == "insert_contact"));
}

#[test]
fn test_secondary_requires_link() {
    let (db, _dir) = setup_db();
    let broken = NewContact {
        email: Some("a@x.com".to_string()),
        phone_number: None,
        linked_id: None,
        link_precedence: LinkPrecedence::Secondary,
    };
    assert!(db.insert_contact(&broken).is_err());
}

#[test]
fn test_find_matching_contacts() {
    let (db, _dir) = setup_db();
    let a = db.insert_contact(&NewContact::primary(Some("a@x.com"), Some("111"))).unwrap();
    let b = db.insert_contact(&NewContact::primary(Some("b@x.com"), Some("222"))).unwrap();
    let c = db
        .insert_contact(&NewContact::secondary(Some("c@x.com"), Some("111"), a.id))
        .unwrap();

    let by_email = db.find_matching_contacts(Some("b@x.com"), None).unwrap();
    assert_eq!(by_email.iter().map(|c| c.id).collect::<Vec<_>>(), vec![b.id]);

    let by_phone = db.find_matching_contacts(None, Some("111")).unwrap();
    assert_eq!(by_phone.iter().map(|c| c.id).collect::<Vec<_>>(), vec![a.id, c.id]);

    let either = db.find_matching_contacts(Some("b@x.com"), Some("111")).unwrap();
    assert_eq!(either.iter().map(|c| c.id).collect::<Vec<_>>(), vec![a.id, b.id, c.id]);

    assert!(db.find_matching_contacts(None, None).unwrap().is_empty());
    assert!(db.find_matching_contacts(Some("z@x.com"), None).unwrap().is_empty());
}

#[test]
fn test_find_cluster() {
    let (db, _dir) = setup_db();
    let p1 = db.insert_contact(&NewContact::primary(Some("a@x.com"), None)).unwrap();
    let p2 = db.insert_contact(&NewContact::primary(Some("b@x.com"), None)).unwrap();
    let s1 = db
        .insert_contact(&NewContact::secondary(Some("a@x.com"), Some("111"), p1.id))
        .unwrap();
    let s2 = db
        .insert_contact(&NewContact::secondary(Some("b@x.com"), Some("222"), p2.id))
        .unwrap();

    let cluster = db.find_cluster(&[p1.id]).unwrap();
    assert_eq!(cluster.iter().map(|c| c.id).collect::<Vec<_>>(), vec![p1.id, s1.id]);

    let both = db.find_cluster(&[p2.id, p1.id]).unwrap();
    assert_eq!(
        both.iter().map(|c| c.id).collect::<Vec<_>>(),
        vec![p1.id, p2.id, s1.id, s2.id]
    );

    assert!(db.find_cluster(&[]).unwrap().is_empty());
}

#[test]
fn test_demote_and_relink() {
    let (db, _dir) = setup_db();
    let p1 = db.insert_contact(&NewContact::primary(Some("a@x.com"), None)).unwrap();
    let p2 = db.insert_contact(&NewContact::primary(Some("b@x.com"), None)).unwrap();
    let s = db
        .insert_contact(&NewContact::secondary(None, Some("222"), p2.id))
        .unwrap();

    assert_eq!(db.demote_contact(p2.id, p1.id).unwrap(), 1);
    assert_eq!(db.relink_contacts(p2.id, p1.id).unwrap(), 1);

    let p2_after = db.get_contact_by_id(p2.id).unwrap().unwrap();
    assert_eq!(p2_after.link_precedence, LinkPrecedence::Secondary);
    assert_eq!(p2_after.linked_id, Some(p1.id));
    assert_eq!(p2_after.email, p2.email, "identifiers never change");

    let s_after = db.get_contact_by_id(s.id).unwrap().unwrap();
    assert_eq!(s_after.linked_id, Some(p1.id));
    assert!(s_after.updated_at >= s.updated_at);

    assert_eq!(db.demote_contact(9_999, p1.id).unwrap(), 0);
}

#[test]
fn test_soft_delete() {
    let (db, _dir) = setup_db();
    let p = db.insert_contact(&NewContact::primary(Some("a@x.com"), None)).unwrap();
    let s = db
        .insert_contact(&NewContact::secondary(None, Some("111"), p.id))
        .unwrap();

    let err = db.soft_delete_contact(p.id).unwrap_err();
    assert!(matches!(err, ContactGraphError::Validation { .. }));

    db.soft_delete_contact(s.id).unwrap();
    assert!(db.get_contact_by_id(s.id).unwrap().is_none());
    assert!(db.find_matching_contacts(None, Some("111")).unwrap().is_empty());

    db.soft_delete_contact(p.id).unwrap();
    assert!(db.get_all_contacts().unwrap().is_empty());

    let err = db.soft_delete_contact(p.id).unwrap_err();
    assert!(matches!(err, ContactGraphError::NotFound { .. }));
}

#[test]
fn test_stats() {
    let (db, _dir) = setup_db();
    let p = db.insert_contact(&NewContact::primary(Some("a@x.com"), None)).unwrap();
    db.insert_contact(&NewContact::secondary(None, Some("111"), p.id))
        .unwrap();
    let gone = db.insert_contact(&NewContact::primary(Some("z@x.com"), None)).unwrap();
    db.soft_delete_contact(gone.id).unwrap();

    let stats = db.get_stats().unwrap();
    assert_eq!(stats.contact_count, 2);
    assert_eq!(stats.primary_count, 1);
    assert_eq!(stats.secondary_count, 1);
    assert_eq!(stats.deleted_count, 1);
    assert!(stats.db_size_bytes > 0);
}

#[test]
fn test_dropped_transaction_rolls_back() {
    let (db, _dir) = setup_db();
    {
        let _tx = db.begin_immediate().unwrap();
        db.insert_contact(&NewContact::primary(Some("a@x.com"), None))
            .unwrap();
    }
    assert!(db.get_all_contacts().unwrap().is_empty());

    let tx = db.begin_immediate().unwrap();
    db.insert_contact(&NewContact::primary(Some("a@x.com"), None))
        .unwrap();
    tx.commit().unwrap();
    assert_eq!(db.get_all_contacts().unwrap().len(), 1);
}

#[test]
fn test_in_memory_database() {
    let db = Database::open_in_memory().unwrap();
    db.insert_contact(&NewContact::primary(None, Some("111"))).unwrap();
    assert_eq!(db.get_stats().unwrap().contact_count, 1);
}

#[test]
fn test_unknown_link_precedence_is_an_error() {
    let (db, _dir) = setup_db();
    db.conn()
        .execute_batch(
            "PRAGMA ignore_check_constraints = ON;
             INSERT INTO contacts (email, link_precedence, created_at, updated_at)
             VALUES ('odd@x.com', 'tertiary', 1, 1);
             PRAGMA ignore_check_constraints = OFF;",
        )
        .unwrap();

    let err = db.find_matching_contacts(Some("odd@x.com"), None).unwrap_err();
    assert!(
        matches!(err, ContactGraphError::Database { ref operation, .. } if operation == "find_matching_contacts")
    );
    assert!(err.to_string().contains("tertiary"), "{err}");
}
