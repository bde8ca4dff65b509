use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Postgres, query_builder::QueryBuilder};
use uuid::Uuid;

use super::{RepoResult, Repository, RepositoryError};
use crate::models::{
    Album, CachedUrl, CreateAlbumRequest, CreateGroupRequest, Group, Image, ImageFilter,
    ImageQuery, Person, RegisterImageRequest, SortKey, User, Visibility,
};

const IMAGE_COLUMNS: &str = "i.id, i.group_id, i.filename, i.storage_key, i.signed_url, \
     i.signed_url_expires_at, i.thumbnail_key, i.size_bytes, i.taken_at, i.uploaded_at";

const GROUP_COLUMNS: &str = "id, name, access, owner_id, created_at";

/// Raw `groups` row. The free-text `access` column is parsed into a `Visibility`
/// before it leaves this module.
#[derive(FromRow)]
struct GroupRow {
    id: Uuid,
    name: String,
    access: String,
    owner_id: Uuid,
    created_at: DateTime<Utc>,
}

impl From<GroupRow> for Group {
    fn from(row: GroupRow) -> Self {
        Group {
            id: row.id,
            name: row.name,
            visibility: Visibility::from_policy(&row.access),
            owner_id: row.owner_id,
            created_at: row.created_at,
        }
    }
}

/// Raw `images` row. The two signed-URL columns collapse into one `CachedUrl`.
#[derive(FromRow)]
struct ImageRow {
    id: Uuid,
    group_id: Uuid,
    filename: String,
    storage_key: String,
    signed_url: Option<String>,
    signed_url_expires_at: Option<DateTime<Utc>>,
    thumbnail_key: Option<String>,
    size_bytes: i64,
    taken_at: Option<DateTime<Utc>>,
    uploaded_at: DateTime<Utc>,
}

impl From<ImageRow> for Image {
    fn from(row: ImageRow) -> Self {
        Image {
            id: row.id,
            group_id: row.group_id,
            filename: row.filename,
            storage_key: row.storage_key,
            cached_url: CachedUrl::from_columns(row.signed_url, row.signed_url_expires_at),
            thumbnail_key: row.thumbnail_key,
            size_bytes: row.size_bytes,
            taken_at: row.taken_at,
            uploaded_at: row.uploaded_at,
        }
    }
}

fn order_clause(sort: SortKey) -> &'static str {
    match sort {
        SortKey::UploadedDesc => "i.uploaded_at DESC",
        SortKey::TakenDesc => "i.taken_at DESC NULLS LAST",
        SortKey::FilenameAsc => "i.filename ASC",
    }
}

/// Logs a failed statement and converts it into a `RepositoryError`.
fn logged(operation: &'static str) -> impl FnOnce(sqlx::Error) -> RepositoryError {
    move |e| {
        tracing::error!(operation, error = ?e, "query failed");
        RepositoryError::Query(e)
    }
}

/// PostgresRepository
///
/// `Repository` backed by PostgreSQL. The pool is created once at startup and
/// injected here; every statement checks a connection out and returns it on
/// completion or error.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    async fn get_user(&self, id: Uuid) -> RepoResult<Option<User>> {
        sqlx::query_as::<_, User>("SELECT id, email FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(logged("get_user"))
    }

    async fn create_group(&self, req: CreateGroupRequest, owner_id: Uuid) -> RepoResult<Group> {
        let query = format!(
            "INSERT INTO groups (id, name, access, owner_id, created_at) \
             VALUES ($1, $2, $3, $4, NOW()) RETURNING {GROUP_COLUMNS}"
        );
        let row = sqlx::query_as::<_, GroupRow>(&query)
            .bind(Uuid::new_v4())
            .bind(req.name)
            .bind(req.access.as_str())
            .bind(owner_id)
            .fetch_one(&self.pool)
            .await
            .map_err(logged("create_group"))?;
        Ok(row.into())
    }

    async fn get_group(&self, id: Uuid) -> RepoResult<Option<Group>> {
        let query = format!("SELECT {GROUP_COLUMNS} FROM groups WHERE id = $1");
        let row = sqlx::query_as::<_, GroupRow>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(logged("get_group"))?;
        Ok(row.map(Group::from))
    }

    /// get_group_visibility
    ///
    /// Single-column policy read used by the access gate on anonymous requests.
    async fn get_group_visibility(&self, id: Uuid) -> RepoResult<Option<Visibility>> {
        let access = sqlx::query_scalar::<_, String>("SELECT access FROM groups WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(logged("get_group_visibility"))?;
        Ok(access.as_deref().map(Visibility::from_policy))
    }

    async fn set_group_visibility(
        &self,
        id: Uuid,
        owner_id: Uuid,
        visibility: Visibility,
    ) -> RepoResult<Option<Group>> {
        let query = format!(
            "UPDATE groups SET access = $3 WHERE id = $1 AND owner_id = $2 \
             RETURNING {GROUP_COLUMNS}"
        );
        let row = sqlx::query_as::<_, GroupRow>(&query)
            .bind(id)
            .bind(owner_id)
            .bind(visibility.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(logged("set_group_visibility"))?;
        Ok(row.map(Group::from))
    }

    async fn get_owned_groups(&self, owner_id: Uuid) -> RepoResult<Vec<Group>> {
        let query = format!(
            "SELECT {GROUP_COLUMNS} FROM groups WHERE owner_id = $1 ORDER BY created_at DESC, id"
        );
        let rows = sqlx::query_as::<_, GroupRow>(&query)
            .bind(owner_id)
            .fetch_all(&self.pool)
            .await
            .map_err(logged("get_owned_groups"))?;
        Ok(rows.into_iter().map(Group::from).collect())
    }

    /// create_image
    ///
    /// New images carry their storage key only; the signed URL is produced on
    /// first read.
    async fn create_image(&self, req: RegisterImageRequest) -> RepoResult<Image> {
        let query = format!(
            "WITH i AS ( \
                INSERT INTO images \
                    (id, group_id, filename, storage_key, size_bytes, taken_at, uploaded_at) \
                VALUES ($1, $2, $3, $4, $5, $6, NOW()) RETURNING * \
             ) SELECT {IMAGE_COLUMNS} FROM i"
        );
        let row = sqlx::query_as::<_, ImageRow>(&query)
            .bind(Uuid::new_v4())
            .bind(req.group_id)
            .bind(req.filename)
            .bind(req.storage_key)
            .bind(req.size_bytes)
            .bind(req.taken_at)
            .fetch_one(&self.pool)
            .await
            .map_err(logged("create_image"))?;
        Ok(row.into())
    }

    async fn get_image(&self, group_id: Uuid, image_id: Uuid) -> RepoResult<Option<Image>> {
        let query =
            format!("SELECT {IMAGE_COLUMNS} FROM images i WHERE i.id = $1 AND i.group_id = $2");
        let row = sqlx::query_as::<_, ImageRow>(&query)
            .bind(image_id)
            .bind(group_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(logged("get_image"))?;
        Ok(row.map(Image::from))
    }

    /// list_images
    ///
    /// Builds the filtered range query with `QueryBuilder` so every value is a bound
    /// parameter. The ORDER BY fragment comes from a fixed set of clauses.
    async fn list_images(&self, query: &ImageQuery) -> RepoResult<Vec<Image>> {
        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {IMAGE_COLUMNS} FROM images i "));

        match query.filter {
            ImageFilter::All => {}
            ImageFilter::Person(person_id) => {
                builder.push("JOIN image_persons ip ON ip.image_id = i.id AND ip.person_id = ");
                builder.push_bind(person_id);
            }
            ImageFilter::Album(album_id) => {
                builder.push("JOIN album_images ai ON ai.image_id = i.id AND ai.album_id = ");
                builder.push_bind(album_id);
            }
        }

        builder.push(" WHERE i.group_id = ");
        builder.push_bind(query.group_id);
        builder.push(" ORDER BY ");
        builder.push(order_clause(query.sort));
        builder.push(", i.id ASC LIMIT ");
        builder.push_bind(query.limit);
        builder.push(" OFFSET ");
        builder.push_bind(query.offset);

        let rows = builder
            .build_query_as::<ImageRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(logged("list_images"))?;
        Ok(rows.into_iter().map(Image::from).collect())
    }

    async fn set_image_url(
        &self,
        image_id: Uuid,
        url: &str,
        expires_at: DateTime<Utc>,
    ) -> RepoResult<()> {
        sqlx::query("UPDATE images SET signed_url = $2, signed_url_expires_at = $3 WHERE id = $1")
            .bind(image_id)
            .bind(url)
            .bind(expires_at)
            .execute(&self.pool)
            .await
            .map_err(logged("set_image_url"))?;
        Ok(())
    }

    async fn set_image_thumbnail(
        &self,
        group_id: Uuid,
        image_id: Uuid,
        thumbnail_key: &str,
    ) -> RepoResult<bool> {
        let result =
            sqlx::query("UPDATE images SET thumbnail_key = $3 WHERE id = $1 AND group_id = $2")
                .bind(image_id)
                .bind(group_id)
                .bind(thumbnail_key)
                .execute(&self.pool)
                .await
                .map_err(logged("set_image_thumbnail"))?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_person(&self, group_id: Uuid, person_id: Uuid) -> RepoResult<Option<Person>> {
        sqlx::query_as::<_, Person>(
            r#"
            SELECT p.id, p.group_id, p.name, p.thumbnail_key, COUNT(ip.image_id) AS image_count
            FROM persons p
            LEFT JOIN image_persons ip ON ip.person_id = p.id
            WHERE p.id = $1 AND p.group_id = $2
            GROUP BY p.id
            "#,
        )
        .bind(person_id)
        .bind(group_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(logged("get_person"))
    }

    /// list_persons
    ///
    /// Persons ordered by how many images they appear in.
    async fn list_persons(
        &self,
        group_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> RepoResult<Vec<Person>> {
        sqlx::query_as::<_, Person>(
            r#"
            SELECT p.id, p.group_id, p.name, p.thumbnail_key, COUNT(ip.image_id) AS image_count
            FROM persons p
            LEFT JOIN image_persons ip ON ip.person_id = p.id
            WHERE p.group_id = $1
            GROUP BY p.id
            ORDER BY image_count DESC, p.id ASC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(group_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(logged("list_persons"))
    }

    async fn create_album(
        &self,
        group_id: Uuid,
        req: CreateAlbumRequest,
        user_id: Uuid,
    ) -> RepoResult<Album> {
        sqlx::query_as::<_, Album>(
            r#"
            INSERT INTO albums (id, group_id, name, created_by, created_at)
            VALUES ($1, $2, $3, $4, NOW())
            RETURNING id, group_id, name, created_by, created_at, 0::BIGINT AS image_count
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(group_id)
        .bind(req.name)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(logged("create_album"))
    }

    async fn get_album(&self, album_id: Uuid) -> RepoResult<Option<Album>> {
        sqlx::query_as::<_, Album>(
            r#"
            SELECT a.id, a.group_id, a.name, a.created_by, a.created_at,
                   COUNT(ai.image_id) AS image_count
            FROM albums a
            LEFT JOIN album_images ai ON ai.album_id = a.id
            WHERE a.id = $1
            GROUP BY a.id
            "#,
        )
        .bind(album_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(logged("get_album"))
    }

    async fn list_albums(&self, group_id: Uuid, limit: i64, offset: i64) -> RepoResult<Vec<Album>> {
        sqlx::query_as::<_, Album>(
            r#"
            SELECT a.id, a.group_id, a.name, a.created_by, a.created_at,
                   COUNT(ai.image_id) AS image_count
            FROM albums a
            LEFT JOIN album_images ai ON ai.album_id = a.id
            WHERE a.group_id = $1
            GROUP BY a.id
            ORDER BY a.created_at DESC, a.id ASC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(group_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(logged("list_albums"))
    }

    /// add_image_to_album
    ///
    /// Inserts the link only when album and image share a group. `ON CONFLICT DO
    /// NOTHING` keeps repeated calls idempotent; the result reports whether the
    /// pair is valid, not whether a row was written.
    async fn add_image_to_album(&self, album_id: Uuid, image_id: Uuid) -> RepoResult<bool> {
        sqlx::query_scalar::<_, bool>(
            r#"
            WITH target AS (
                SELECT a.id AS album_id, i.id AS image_id
                FROM albums a
                JOIN images i ON i.group_id = a.group_id
                WHERE a.id = $1 AND i.id = $2
            ),
            inserted AS (
                INSERT INTO album_images (album_id, image_id)
                SELECT album_id, image_id FROM target
                ON CONFLICT DO NOTHING
            )
            SELECT EXISTS (SELECT 1 FROM target)
            "#,
        )
        .bind(album_id)
        .bind(image_id)
        .fetch_one(&self.pool)
        .await
        .map_err(logged("add_image_to_album"))
    }
}
