use axum::{
    extract::FromRequestParts,
    http::{Method, Request, StatusCode, Uri, header, request::Parts},
};
use jsonwebtoken::{EncodingKey, Header, encode};
use photo_gallery::{
    AppConfig, AppState, InMemoryRepository, MockStorageService,
    auth::{AuthUser, Claims, MaybeUser},
    config::Env,
    models::User,
};
use std::{sync::Arc, time::SystemTime};
use uuid::Uuid;

// --- Helper Functions ---

const TEST_JWT_SECRET: &str = "test-secret-value-1234567890";
const TEST_USER_ID: Uuid = Uuid::from_u128(1);

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

fn create_token(user_id: Uuid, issued_at: u64, expires_at: u64, secret: &str) -> String {
    let claims = Claims {
        sub: user_id,
        iat: issued_at as usize,
        exp: expires_at as usize,
    };
    let key = EncodingKey::from_secret(secret.as_bytes());
    encode(&Header::default(), &claims, &key).unwrap()
}

fn valid_token(user_id: Uuid) -> String {
    let now = now_secs();
    create_token(user_id, now, now + 3600, TEST_JWT_SECRET)
}

fn repo_with_user(id: Uuid) -> Arc<InMemoryRepository> {
    let repo = Arc::new(InMemoryRepository::new());
    repo.insert_user(User {
        id,
        email: "member@example.com".to_string(),
    });
    repo
}

fn create_app_state(env: Env, repo: Arc<InMemoryRepository>) -> AppState {
    let config = AppConfig {
        env,
        jwt_secret: TEST_JWT_SECRET.to_string(),
        ..AppConfig::default()
    };

    AppState {
        repo,
        storage: Arc::new(MockStorageService::new()),
        config,
    }
}

fn get_request_parts(method: Method, uri: Uri) -> Parts {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .body(axum::body::Body::empty())
        .unwrap();
    let (parts, _) = request.into_parts();
    parts
}

fn with_bearer(parts: &mut Parts, token: &str) {
    parts.headers.insert(
        header::AUTHORIZATION,
        header::HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
    );
}

fn with_bypass(parts: &mut Parts, user_id: Uuid) {
    parts.headers.insert(
        header::HeaderName::from_static("x-user-id"),
        header::HeaderValue::from_str(&user_id.to_string()).unwrap(),
    );
}

// --- Tests ---

#[tokio::test]
async fn test_auth_success_with_valid_jwt() {
    let app_state = create_app_state(Env::Production, repo_with_user(TEST_USER_ID));

    let mut parts = get_request_parts(Method::GET, "/me/groups".parse().unwrap());
    with_bearer(&mut parts, &valid_token(TEST_USER_ID));

    let user = AuthUser::from_request_parts(&mut parts, &app_state)
        .await
        .expect("valid token should authenticate");

    assert_eq!(user.id, TEST_USER_ID);
    assert_eq!(user.email, "member@example.com");
}

#[tokio::test]
async fn test_auth_failure_with_missing_header() {
    let app_state = create_app_state(Env::Production, repo_with_user(TEST_USER_ID));
    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());

    let result = AuthUser::from_request_parts(&mut parts, &app_state).await;

    assert_eq!(result.unwrap_err(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_auth_failure_with_expired_jwt() {
    let app_state = create_app_state(Env::Production, repo_with_user(TEST_USER_ID));
    let now = now_secs();
    // Well past the default validation leeway.
    let token = create_token(TEST_USER_ID, now - 7200, now - 3600, TEST_JWT_SECRET);

    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());
    with_bearer(&mut parts, &token);

    let result = AuthUser::from_request_parts(&mut parts, &app_state).await;

    assert_eq!(result.unwrap_err(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_auth_failure_with_foreign_signature() {
    let app_state = create_app_state(Env::Production, repo_with_user(TEST_USER_ID));
    let now = now_secs();
    let token = create_token(TEST_USER_ID, now, now + 3600, "some-other-secret");

    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());
    with_bearer(&mut parts, &token);

    let result = AuthUser::from_request_parts(&mut parts, &app_state).await;

    assert_eq!(result.unwrap_err(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_auth_failure_for_deleted_account() {
    let app_state = create_app_state(Env::Production, Arc::new(InMemoryRepository::new()));

    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());
    with_bearer(&mut parts, &valid_token(TEST_USER_ID));

    let result = AuthUser::from_request_parts(&mut parts, &app_state).await;

    assert_eq!(result.unwrap_err(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_auth_failure_when_store_unavailable() {
    let repo = repo_with_user(TEST_USER_ID);
    repo.set_failing(true);
    let app_state = create_app_state(Env::Production, repo);

    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());
    with_bearer(&mut parts, &valid_token(TEST_USER_ID));

    let result = AuthUser::from_request_parts(&mut parts, &app_state).await;

    assert_eq!(result.unwrap_err(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_local_bypass_success() {
    let user_id = Uuid::new_v4();
    let app_state = create_app_state(Env::Local, repo_with_user(user_id));

    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());
    with_bypass(&mut parts, user_id);

    let user = AuthUser::from_request_parts(&mut parts, &app_state)
        .await
        .expect("bypass should authenticate locally");

    assert_eq!(user.id, user_id);
}

#[tokio::test]
async fn test_local_bypass_disabled_in_prod() {
    let user_id = Uuid::new_v4();
    let app_state = create_app_state(Env::Production, repo_with_user(user_id));

    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());
    with_bypass(&mut parts, user_id);

    let result = AuthUser::from_request_parts(&mut parts, &app_state).await;

    assert_eq!(result.unwrap_err(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_local_bypass_for_unknown_user_falls_back_to_jwt() {
    let app_state = create_app_state(Env::Local, repo_with_user(TEST_USER_ID));

    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());
    with_bypass(&mut parts, Uuid::new_v4());

    let result = AuthUser::from_request_parts(&mut parts, &app_state).await;
    assert_eq!(result.unwrap_err(), StatusCode::UNAUTHORIZED);

    with_bearer(&mut parts, &valid_token(TEST_USER_ID));
    let user = AuthUser::from_request_parts(&mut parts, &app_state)
        .await
        .expect("token should still authenticate");
    assert_eq!(user.id, TEST_USER_ID);
}

#[tokio::test]
async fn test_maybe_user_is_none_for_anonymous_callers() {
    let app_state = create_app_state(Env::Production, repo_with_user(TEST_USER_ID));

    let mut parts = get_request_parts(Method::GET, "/images".parse().unwrap());
    let MaybeUser(anonymous) = MaybeUser::from_request_parts(&mut parts, &app_state)
        .await
        .unwrap();
    assert!(anonymous.is_none());

    // An invalid credential degrades to anonymous instead of rejecting.
    with_bearer(&mut parts, "not-a-jwt");
    let MaybeUser(invalid) = MaybeUser::from_request_parts(&mut parts, &app_state)
        .await
        .unwrap();
    assert!(invalid.is_none());
}

#[tokio::test]
async fn test_maybe_user_resolves_valid_session() {
    let app_state = create_app_state(Env::Production, repo_with_user(TEST_USER_ID));

    let mut parts = get_request_parts(Method::GET, "/images".parse().unwrap());
    with_bearer(&mut parts, &valid_token(TEST_USER_ID));

    let MaybeUser(caller) = MaybeUser::from_request_parts(&mut parts, &app_state)
        .await
        .unwrap();
    assert_eq!(caller.map(|user| user.id), Some(TEST_USER_ID));
}
