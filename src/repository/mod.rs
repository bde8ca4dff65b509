use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    Album, CreateAlbumRequest, CreateGroupRequest, Group, Image, ImageQuery, Person,
    RegisterImageRequest, User, Visibility,
};

mod memory;
mod postgres;

pub use memory::InMemoryRepository;
pub use postgres::PostgresRepository;

/// RepositoryError
///
/// Failure of a persistence operation. Surfaces to clients as an internal error.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database query failed: {0}")]
    Query(#[from] sqlx::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

pub type RepoResult<T> = Result<T, RepositoryError>;

/// Repository Trait
///
/// Persistence contract used by the handlers, the access gate and the URL
/// refresher. `Send + Sync` so the trait object can be shared across tasks.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Users ---
    async fn get_user(&self, id: Uuid) -> RepoResult<Option<User>>;

    // --- Groups ---
    async fn create_group(&self, req: CreateGroupRequest, owner_id: Uuid) -> RepoResult<Group>;
    async fn get_group(&self, id: Uuid) -> RepoResult<Option<Group>>;
    /// Reads only the group's access policy. `None` when the group does not exist.
    async fn get_group_visibility(&self, id: Uuid) -> RepoResult<Option<Visibility>>;
    /// Owner-only: returns `None` if the group is missing or owned by someone else.
    async fn set_group_visibility(
        &self,
        id: Uuid,
        owner_id: Uuid,
        visibility: Visibility,
    ) -> RepoResult<Option<Group>>;
    async fn get_owned_groups(&self, owner_id: Uuid) -> RepoResult<Vec<Group>>;

    // --- Images ---
    async fn create_image(&self, req: RegisterImageRequest) -> RepoResult<Image>;
    async fn get_image(&self, group_id: Uuid, image_id: Uuid) -> RepoResult<Option<Image>>;
    /// Bounded range query, ordered by the sort key and then by id.
    async fn list_images(&self, query: &ImageQuery) -> RepoResult<Vec<Image>>;
    /// Persists a regenerated signed URL. Last write wins.
    async fn set_image_url(
        &self,
        image_id: Uuid,
        url: &str,
        expires_at: DateTime<Utc>,
    ) -> RepoResult<()>;
    /// Returns false when the image does not exist in the group.
    async fn set_image_thumbnail(
        &self,
        group_id: Uuid,
        image_id: Uuid,
        thumbnail_key: &str,
    ) -> RepoResult<bool>;

    // --- Persons ---
    async fn get_person(&self, group_id: Uuid, person_id: Uuid) -> RepoResult<Option<Person>>;
    async fn list_persons(&self, group_id: Uuid, limit: i64, offset: i64)
    -> RepoResult<Vec<Person>>;

    // --- Albums ---
    async fn create_album(
        &self,
        group_id: Uuid,
        req: CreateAlbumRequest,
        user_id: Uuid,
    ) -> RepoResult<Album>;
    async fn get_album(&self, album_id: Uuid) -> RepoResult<Option<Album>>;
    async fn list_albums(&self, group_id: Uuid, limit: i64, offset: i64) -> RepoResult<Vec<Album>>;
    /// Idempotent. Returns false when the album or image is missing or the two
    /// belong to different groups.
    async fn add_image_to_album(&self, album_id: Uuid, image_id: Uuid) -> RepoResult<bool>;
}

/// RepositoryState
///
/// Shared handle to the persistence layer held in the application state.
pub type RepositoryState = Arc<dyn Repository>;
