//! Shared tests for ApiKeyRepo implementations

use super::harness::seed_org;
use crate::{
    db::{DbError, DbPool},
    models::{NewApiKey, Plan, generate_api_key, hash_api_key},
};

fn new_key(org_id: uuid::Uuid, name: &str) -> (String, NewApiKey) {
    let generated = generate_api_key();
    let input = NewApiKey {
        organization_id: org_id,
        name: name.to_string(),
        key_hash: generated.hash,
        key_prefix: generated.prefix,
        key_suffix: generated.suffix,
    };
    (generated.raw, input)
}

async fn test_lookup_by_hash(db: &DbPool) {
    let org = seed_org(db, Plan::Free).await;
    let (raw, input) = new_key(org.id, "ci");
    let created = db.api_keys().create(input).await.expect("create key");

    assert!(created.is_active);
    assert!(created.last_used_at.is_none());

    let found = db
        .api_keys()
        .get_by_hash(&hash_api_key(&raw))
        .await
        .expect("Query failed")
        .expect("Key should resolve by hash");
    assert_eq!(found.id, created.id);
    assert_eq!(found.organization_id, org.id);

    let missing = db
        .api_keys()
        .get_by_hash(&hash_api_key("sk_live_unknown"))
        .await
        .expect("Query failed");
    assert!(missing.is_none());
}

async fn test_duplicate_hash_conflicts(db: &DbPool) {
    let org = seed_org(db, Plan::Free).await;
    let (_, input) = new_key(org.id, "a");
    db.api_keys().create(input.clone()).await.expect("first");
    let err = db.api_keys().create(input).await.unwrap_err();
    assert!(matches!(err, DbError::Conflict(_)));
}

async fn test_list_by_org_is_scoped(db: &DbPool) {
    let org = seed_org(db, Plan::Free).await;
    let other = seed_org(db, Plan::Free).await;
    for name in ["one", "two"] {
        let (_, input) = new_key(org.id, name);
        db.api_keys().create(input).await.expect("create key");
    }
    let (_, input) = new_key(other.id, "elsewhere");
    db.api_keys().create(input).await.expect("create key");

    let keys = db.api_keys().list_by_org(org.id).await.expect("list");
    assert_eq!(keys.len(), 2);
    assert!(keys.iter().all(|k| k.organization_id == org.id));
}

async fn test_deactivate(db: &DbPool) {
    let org = seed_org(db, Plan::Free).await;
    let (_, input) = new_key(org.id, "temp");
    let key = db.api_keys().create(input).await.expect("create key");

    assert!(db.api_keys().deactivate(key.id).await.expect("deactivate"));
    let fetched = db
        .api_keys()
        .get_by_id(key.id)
        .await
        .expect("Query failed")
        .expect("exists");
    assert!(!fetched.is_active);

    assert!(
        !db.api_keys()
            .deactivate(uuid::Uuid::new_v4())
            .await
            .expect("deactivate missing")
    );
}

async fn test_update_last_used(db: &DbPool) {
    let org = seed_org(db, Plan::Free).await;
    let (_, input) = new_key(org.id, "touch");
    let key = db.api_keys().create(input).await.expect("create key");

    db.api_keys()
        .update_last_used(key.id)
        .await
        .expect("update_last_used");
    let fetched = db
        .api_keys()
        .get_by_id(key.id)
        .await
        .expect("Query failed")
        .expect("exists");
    assert!(fetched.last_used_at.is_some());
}

backend_tests!(
    test_lookup_by_hash,
    test_duplicate_hash_conflicts,
    test_list_by_org_is_scoped,
    test_deactivate,
    test_update_last_used,
);
