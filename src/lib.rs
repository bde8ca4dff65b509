use axum::{
    Router,
    extract::{FromRef, Request},
    http::HeaderName,
    middleware::{self, Next},
    response::Response,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

pub mod access;
pub mod auth;
pub mod config;
pub mod error;
pub mod gallery;
pub mod handlers;
pub mod models;
pub mod refresh;
pub mod repository;
pub mod storage;

// Public and authenticated routers, merged below.
pub mod routes;
use auth::AuthUser;
use routes::{authenticated, public};

// --- Public Re-exports ---

pub use config::AppConfig;
pub use refresh::UrlRefresher;
pub use repository::{InMemoryRepository, PostgresRepository, RepositoryState};
pub use storage::{MockStorageService, S3StorageClient, StorageState};

/// ApiDoc
///
/// OpenAPI document of the gallery API, served at `/api-docs/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::list_group_images, handlers::list_person_images, handlers::list_album_images,
        handlers::get_group, handlers::get_image, handlers::get_image_thumbnail,
        handlers::get_person_thumbnail, handlers::list_people, handlers::list_albums,
        handlers::create_group, handlers::get_my_groups, handlers::update_group_access,
        handlers::create_album, handlers::add_album_image, handlers::get_presigned_url,
        handlers::register_image, handlers::upload_thumbnail
    ),
    components(
        schemas(
            models::Group, models::Visibility, models::ImageResponse, models::PersonResponse,
            models::Album, models::CreateGroupRequest, models::UpdateAccessRequest,
            models::CreateAlbumRequest, models::AddAlbumImageRequest,
            models::PresignedUrlRequest, models::PresignedUrlResponse,
            models::RegisterImageRequest, error::ErrorResponse,
        )
    ),
    tags(
        (name = "photo-gallery", description = "Group Photo Gallery API")
    )
)]
struct ApiDoc;

/// AppState
///
/// Shared services of every request.
#[derive(Clone)]
pub struct AppState {
    /// Postgres in production, in-memory in tests.
    pub repo: RepositoryState,
    /// S3/MinIO object store.
    pub storage: StorageState,
    pub config: AppConfig,
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for StorageState {
    fn from_ref(app_state: &AppState) -> StorageState {
        app_state.storage.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// auth_middleware
///
/// Rejects the request with `401` unless `AuthUser` can be extracted.
async fn auth_middleware(_auth_user: AuthUser, request: Request, next: Next) -> Response {
    next.run(request).await
}

/// create_router
///
/// Assembles public and authenticated routes, the API docs and the
/// observability layers around them.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let x_request_id = HeaderName::from_static("x-request-id");

    let base_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        // Anonymous callers allowed; group visibility is checked per handler.
        .merge(public::public_routes())
        .merge(
            authenticated::authenticated_routes().route_layer(middleware::from_fn_with_state(
                state.clone(),
                auth_middleware,
            )),
        )
        .with_state(state);

    base_router
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        .layer(cors)
}

/// Request span carrying the `x-request-id` so every log line of a request
/// can be correlated.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
