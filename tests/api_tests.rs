use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use photo_gallery::{
    AppConfig, AppState, InMemoryRepository, MockStorageService, create_router,
    models::{Group, ImageResponse, Page, PresignedUrlResponse, User},
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::util::ServiceExt;
use uuid::Uuid;

fn test_state(repo: Arc<InMemoryRepository>) -> AppState {
    AppState {
        repo,
        storage: Arc::new(MockStorageService::new()),
        config: AppConfig::default(),
    }
}

fn seeded_repo() -> (Arc<InMemoryRepository>, Uuid) {
    let repo = Arc::new(InMemoryRepository::new());
    let user_id = Uuid::new_v4();
    repo.insert_user(User {
        id: user_id,
        email: "owner@example.com".to_string(),
    });
    (repo, user_id)
}

// --- Router (in-process) ---

#[tokio::test]
async fn test_health_check() {
    let (repo, _) = seeded_repo();
    let app = create_router(test_state(repo));

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    // Request correlation header is echoed back.
    assert!(response.headers().contains_key("x-request-id"));
}

#[tokio::test]
async fn test_openapi_document_is_served() {
    let (repo, _) = seeded_repo();
    let app = create_router(test_state(repo));

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api-docs/openapi.json")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let doc: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert!(doc["paths"]["/images"].is_object());
    assert!(doc["paths"]["/people/images"].is_object());
}

#[tokio::test]
async fn test_authenticated_routes_reject_anonymous_callers() {
    let (repo, _) = seeded_repo();
    let app = create_router(test_state(repo));

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/groups")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"name":"Family"}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_anonymous_listing_of_private_group_is_forbidden() {
    let (repo, owner) = seeded_repo();
    let group_id = Uuid::new_v4();
    repo.insert_group_with_policy(group_id, owner, "private");
    let app = create_router(test_state(repo));

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/images?group_id={group_id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["error"], "access to this group is forbidden");
}

#[tokio::test]
async fn test_listing_without_group_id_is_bad_request() {
    let (repo, _) = seeded_repo();
    let app = create_router(test_state(repo.clone()));

    let response = app
        .oneshot(Request::builder().uri("/images").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(repo.visibility_reads(), 0);
}

#[tokio::test]
async fn test_store_outage_is_internal_error() {
    let (repo, owner) = seeded_repo();
    let group_id = Uuid::new_v4();
    repo.insert_group_with_policy(group_id, owner, "public");
    repo.set_failing(true);
    let app = create_router(test_state(repo));

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/images?group_id={group_id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

// --- Spawned Server ---

pub struct TestApp {
    pub address: String,
    pub repo: Arc<InMemoryRepository>,
    pub user_id: Uuid,
}

async fn spawn_app() -> TestApp {
    let (repo, user_id) = seeded_repo();
    let router = create_router(test_state(repo.clone()));

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind port");
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    TestApp {
        address,
        repo,
        user_id,
    }
}

#[tokio::test]
async fn test_group_upload_and_sharing_lifecycle() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();
    let user = app.user_id.to_string();

    // Create a (private) group.
    let response = client
        .post(format!("{}/groups", app.address))
        .header("x-user-id", &user)
        .json(&serde_json::json!({ "name": "Family" }))
        .send()
        .await
        .expect("create group failed");
    assert_eq!(response.status(), 201);
    let group: Group = response.json().await.unwrap();

    // Upload flow: presign, then register.
    let response = client
        .post(format!("{}/uploads/presigned", app.address))
        .header("x-user-id", &user)
        .json(&serde_json::json!({
            "group_id": group.id, "filename": "beach.jpg", "file_type": "image/jpeg"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let presigned: PresignedUrlResponse = response.json().await.unwrap();

    let response = client
        .post(format!("{}/uploads", app.address))
        .header("x-user-id", &user)
        .json(&serde_json::json!({
            "group_id": group.id,
            "storage_key": presigned.resource_key,
            "filename": "beach.jpg",
            "size_bytes": 1024
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 201);

    // Anonymous readers are refused while the group is private.
    let listing = format!("{}/images?group_id={}", app.address, group.id);
    let response = client.get(&listing).send().await.unwrap();
    assert_eq!(response.status(), 403);

    // Members see the image with a signed URL.
    let response = client
        .get(&listing)
        .header("x-user-id", &user)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let page: Page<ImageResponse> = response.json().await.unwrap();
    assert_eq!(page.items.len(), 1);
    assert!(page.items[0].url.is_some());

    // Owner opens the group.
    let response = client
        .patch(format!("{}/groups/{}/access", app.address, group.id))
        .header("x-user-id", &user)
        .json(&serde_json::json!({ "access": "public" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let response = client.get(&listing).send().await.unwrap();
    assert_eq!(response.status(), 200);
    let page: Page<ImageResponse> = response.json().await.unwrap();
    // The URL cached by the member read is reused.
    assert_eq!(app.repo.url_writes(), 1);
    assert!(page.items[0].url.is_some());
    assert!(!page.has_more);
}

#[tokio::test]
async fn test_sort_parameter_is_honoured_over_http() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();
    let group_id = Uuid::new_v4();
    app.repo
        .insert_group_with_policy(group_id, app.user_id, "public");

    for name in ["b.jpg", "a.jpg"] {
        let response = client
            .post(format!("{}/uploads", app.address))
            .header("x-user-id", app.user_id.to_string())
            .json(&serde_json::json!({
                "group_id": group_id,
                "storage_key": format!("groups/{group_id}/{name}"),
                "filename": name,
                "size_bytes": 10
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 201);
    }

    let page: Page<ImageResponse> = client
        .get(format!(
            "{}/images?group_id={}&sort=filename",
            app.address, group_id
        ))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let names: Vec<_> = page.items.iter().map(|item| item.filename.as_str()).collect();
    assert_eq!(names, vec!["a.jpg", "b.jpg"]);
}
