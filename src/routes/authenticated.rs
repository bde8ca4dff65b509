use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, patch, post, put},
};

/// Authenticated Router Module
///
/// Every handler here receives a validated `AuthUser`. Ownership checks happen
/// in the repository queries (e.g. `set_group_visibility` is scoped to the owner).
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // --- Groups ---
        .route("/groups", post(handlers::create_group))
        .route("/me/groups", get(handlers::get_my_groups))
        // PATCH /groups/{id}/access
        // Owner only. Anyone else gets a 404.
        .route("/groups/{id}/access", patch(handlers::update_group_access))
        // --- Albums ---
        .route("/groups/{id}/albums", post(handlers::create_album))
        // POST /albums/{id}/images
        // Idempotent: adding an image twice is a no-op.
        .route("/albums/{id}/images", post(handlers::add_album_image))
        // --- Uploads ---
        // POST /uploads/presigned
        // 10 minute URL for a direct upload to the object store.
        .route("/uploads/presigned", post(handlers::get_presigned_url))
        // POST /uploads
        // Registers an uploaded original.
        .route("/uploads", post(handlers::register_image))
        .route("/uploads/{id}/thumbnail", put(handlers::upload_thumbnail))
}
