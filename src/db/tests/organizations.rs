//! Shared tests for OrganizationRepo and UserRepo implementations

use super::harness::seed_org;
use crate::{
    db::{DbError, DbPool, ListParams},
    models::{CreateOrganization, CreateUser, Plan, UserRole},
};

async fn test_create_and_get_organization(db: &DbPool) {
    let repo = db.organizations();
    let created = repo
        .create(CreateOrganization {
            name: "Acme".into(),
            email: "ops@acme.test".into(),
            plan: Plan::Starter,
            rate_limit_per_minute: Some(120),
        })
        .await
        .expect("Failed to create organization");

    assert_eq!(created.name, "Acme");
    assert_eq!(created.plan, Plan::Starter);
    assert_eq!(created.rate_limit_per_minute, Some(120));

    let fetched = repo
        .get_by_id(created.id)
        .await
        .expect("Query failed")
        .expect("Organization should exist");
    assert_eq!(fetched.id, created.id);
    assert_eq!(fetched.email, "ops@acme.test");
    assert_eq!(fetched.rate_limit_per_minute, Some(120));
}

async fn test_get_organization_not_found(db: &DbPool) {
    let result = db
        .organizations()
        .get_by_id(uuid::Uuid::new_v4())
        .await
        .expect("Query failed");
    assert!(result.is_none());
}

async fn test_list_pages_until_empty(db: &DbPool) {
    for _ in 0..5 {
        seed_org(db, Plan::Free).await;
    }
    let repo = db.organizations();

    let mut seen = Vec::new();
    let mut offset = 0;
    loop {
        let page = repo
            .list(ListParams::page(2, offset))
            .await
            .expect("Failed to list organizations");
        if page.is_empty() {
            break;
        }
        offset += page.len() as i64;
        seen.extend(page.into_iter().map(|o| o.id));
    }

    assert_eq!(seen.len(), 5);
    seen.sort();
    seen.dedup();
    assert_eq!(seen.len(), 5, "pages must not overlap");
}

async fn test_update_plan(db: &DbPool) {
    let org = seed_org(db, Plan::Free).await;
    let updated = db
        .organizations()
        .update_plan(org.id, Plan::Pro)
        .await
        .expect("Failed to update plan");
    assert_eq!(updated.plan, Plan::Pro);
    assert!(updated.updated_at >= org.updated_at);
}

async fn test_update_plan_not_found(db: &DbPool) {
    let err = db
        .organizations()
        .update_plan(uuid::Uuid::new_v4(), Plan::Pro)
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::NotFound));
}

async fn test_create_and_get_user(db: &DbPool) {
    let org = seed_org(db, Plan::Free).await;
    let user = db
        .users()
        .create(CreateUser {
            organization_id: org.id,
            email: "owner@acme.test".into(),
            name: "Owner".into(),
            role: UserRole::Owner,
        })
        .await
        .expect("Failed to create user");

    let fetched = db
        .users()
        .get_by_id(user.id)
        .await
        .expect("Query failed")
        .expect("User should exist");
    assert_eq!(fetched.organization_id, org.id);
    assert_eq!(fetched.role, UserRole::Owner);
}

async fn test_duplicate_user_email_conflicts(db: &DbPool) {
    let org = seed_org(db, Plan::Free).await;
    let input = CreateUser {
        organization_id: org.id,
        email: "dup@acme.test".into(),
        name: "Dup".into(),
        role: UserRole::Member,
    };
    db.users().create(input.clone()).await.expect("first insert");
    let err = db.users().create(input).await.unwrap_err();
    assert!(matches!(err, DbError::Conflict(_)));
}

backend_tests!(
    test_create_and_get_organization,
    test_get_organization_not_found,
    test_list_pages_until_empty,
    test_update_plan,
    test_update_plan_not_found,
    test_create_and_get_user,
    test_duplicate_user_email_conflicts,
);
