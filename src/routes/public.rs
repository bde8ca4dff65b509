use crate::{AppState, handlers};
use axum::{Router, routing::get};

/// Public Router Module
///
/// Read-only gallery routes. An identity is optional here: handlers take
/// `MaybeUser` and pass it through the group access gate, which refuses
/// anonymous reads of private groups.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Liveness probe for the load balancer.
        .route("/health", get(|| async { "ok" }))
        // GET /groups/{id}
        .route("/groups/{id}", get(handlers::get_group))
        // GET /images?group_id=...&sort=...&page=...
        // Pages of 50, URLs valid for a day.
        .route("/images", get(handlers::list_group_images))
        // GET /images/{id}?group_id=...
        // Single image with a 15 minute URL.
        .route("/images/{id}", get(handlers::get_image))
        .route("/images/{id}/thumbnail", get(handlers::get_image_thumbnail))
        // GET /people?group_id=...&page=...
        .route("/people", get(handlers::list_people))
        // GET /people/images?group_id=...&person_id=...
        // Pages of 100, URLs valid for 8 hours.
        .route("/people/images", get(handlers::list_person_images))
        .route("/people/{id}/thumbnail", get(handlers::get_person_thumbnail))
        // GET /albums?group_id=...&page=...
        .route("/albums", get(handlers::list_albums))
        // GET /albums/images?group_id=...&album_id=...
        .route("/albums/images", get(handlers::list_album_images))
}
