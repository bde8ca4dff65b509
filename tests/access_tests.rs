use photo_gallery::{
    InMemoryRepository,
    access::{AccessGrant, authorize_group_read},
    auth::AuthUser,
    error::AppError,
};
use uuid::Uuid;

fn member() -> AuthUser {
    AuthUser {
        id: Uuid::from_u128(7),
        email: "member@example.com".to_string(),
    }
}

#[tokio::test]
async fn test_identity_passes_without_policy_read() {
    let repo = InMemoryRepository::new();
    let group_id = Uuid::new_v4();
    repo.insert_group_with_policy(group_id, Uuid::new_v4(), "private");

    let grant = authorize_group_read(&repo, Some(&member()), group_id)
        .await
        .unwrap();

    assert_eq!(grant, AccessGrant::Authenticated(member().id));
    assert_eq!(repo.visibility_reads(), 0);
}

#[tokio::test]
async fn test_identity_passes_even_when_store_is_down() {
    let repo = InMemoryRepository::new();
    repo.set_failing(true);

    let grant = authorize_group_read(&repo, Some(&member()), Uuid::new_v4()).await;

    assert!(matches!(grant, Ok(AccessGrant::Authenticated(_))));
}

#[tokio::test]
async fn test_anonymous_read_of_public_group() {
    let repo = InMemoryRepository::new();
    let group_id = Uuid::new_v4();
    repo.insert_group_with_policy(group_id, Uuid::new_v4(), "public");

    let grant = authorize_group_read(&repo, None, group_id).await.unwrap();

    assert_eq!(grant, AccessGrant::PublicGroup);
    assert_eq!(repo.visibility_reads(), 1);
}

#[tokio::test]
async fn test_policy_match_ignores_case() {
    let repo = InMemoryRepository::new();
    let group_id = Uuid::new_v4();
    repo.insert_group_with_policy(group_id, Uuid::new_v4(), "PUBLIC");

    let grant = authorize_group_read(&repo, None, group_id).await;

    assert!(matches!(grant, Ok(AccessGrant::PublicGroup)));
}

#[tokio::test]
async fn test_padded_policy_is_not_public() {
    let repo = InMemoryRepository::new();
    let group_id = Uuid::new_v4();
    repo.insert_group_with_policy(group_id, Uuid::new_v4(), "  PUBLIC ");

    let result = authorize_group_read(&repo, None, group_id).await;

    assert!(matches!(result, Err(AppError::Forbidden)));
}

#[tokio::test]
async fn test_anonymous_read_of_private_group_is_forbidden() {
    let repo = InMemoryRepository::new();
    let group_id = Uuid::new_v4();
    repo.insert_group_with_policy(group_id, Uuid::new_v4(), "private");

    let result = authorize_group_read(&repo, None, group_id).await;

    assert!(matches!(result, Err(AppError::Forbidden)));
}

#[tokio::test]
async fn test_unrecognised_policy_is_treated_as_private() {
    let repo = InMemoryRepository::new();
    let group_id = Uuid::new_v4();
    repo.insert_group_with_policy(group_id, Uuid::new_v4(), "friends-only");

    let result = authorize_group_read(&repo, None, group_id).await;

    assert!(matches!(result, Err(AppError::Forbidden)));
}

#[tokio::test]
async fn test_anonymous_read_of_missing_group_is_not_found() {
    let repo = InMemoryRepository::new();

    let result = authorize_group_read(&repo, None, Uuid::new_v4()).await;

    assert!(matches!(result, Err(AppError::NotFound("group"))));
}

#[tokio::test]
async fn test_store_failure_surfaces_as_internal_error() {
    let repo = InMemoryRepository::new();
    let group_id = Uuid::new_v4();
    repo.insert_group_with_policy(group_id, Uuid::new_v4(), "public");
    repo.set_failing(true);

    let result = authorize_group_read(&repo, None, group_id).await;

    assert!(matches!(result, Err(AppError::Internal(_))));
}

#[tokio::test]
async fn test_policy_is_read_on_every_request() {
    let repo = InMemoryRepository::new();
    let group_id = Uuid::new_v4();
    let owner = Uuid::new_v4();
    repo.insert_group_with_policy(group_id, owner, "public");

    assert!(authorize_group_read(&repo, None, group_id).await.is_ok());

    // A policy change is visible to the very next read.
    repo.insert_group_with_policy(group_id, owner, "private");
    let result = authorize_group_read(&repo, None, group_id).await;

    assert!(matches!(result, Err(AppError::Forbidden)));
    assert_eq!(repo.visibility_reads(), 2);
}
