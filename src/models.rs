use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

// --- Identity ---

/// User
///
/// A registered account, as resolved by the authentication extractor.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct User {
    pub id: Uuid,
    pub email: String,
}

// --- Groups ---

/// Visibility
///
/// Read policy of a group. Only `Public` groups may be read without an identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum Visibility {
    Public,
    #[default]
    Private,
}

impl Visibility {
    /// Parses the stored policy column. Anything other than a case-insensitive
    /// `public` is private.
    pub fn from_policy(policy: &str) -> Self {
        if policy.eq_ignore_ascii_case("public") {
            Visibility::Public
        } else {
            Visibility::Private
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Private => "private",
        }
    }
}

/// Group
///
/// An access-scoped collection of images.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct Group {
    pub id: Uuid,
    pub name: String,
    pub visibility: Visibility,
    pub owner_id: Uuid,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

// --- Images ---

/// CachedUrl
///
/// A signed retrieval URL together with the instant after which it must be
/// regenerated. The expiry sits a safety margin before the URL's real expiry.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CachedUrl {
    pub url: String,
    pub expires_at: DateTime<Utc>,
}

impl CachedUrl {
    /// Builds the cached pointer from its two nullable columns. A URL without an
    /// expiry (or the reverse) counts as no pointer at all.
    pub fn from_columns(url: Option<String>, expires_at: Option<DateTime<Utc>>) -> Option<Self> {
        match (url, expires_at) {
            (Some(url), Some(expires_at)) if !url.is_empty() => Some(Self { url, expires_at }),
            _ => None,
        }
    }
}

/// Image
///
/// Internal, typed view of an image row.
#[derive(Debug, Clone, Default)]
pub struct Image {
    pub id: Uuid,
    pub group_id: Uuid,
    pub filename: String,
    // Durable object-store key of the original.
    pub storage_key: String,
    pub cached_url: Option<CachedUrl>,
    pub thumbnail_key: Option<String>,
    pub size_bytes: i64,
    pub taken_at: Option<DateTime<Utc>>,
    pub uploaded_at: DateTime<Utc>,
}

/// ImageResponse
///
/// The projection of an image returned to clients.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct ImageResponse {
    pub id: Uuid,
    pub filename: String,
    #[ts(type = "string | null")]
    pub taken_at: Option<DateTime<Utc>>,
    #[ts(type = "string")]
    pub uploaded_at: DateTime<Utc>,
    pub size_bytes: i64,
    /// Route serving the stored thumbnail, when one exists.
    pub thumbnail_url: Option<String>,
    /// Time-limited signed URL of the original. `None` when it could not be produced.
    pub url: Option<String>,
}

impl ImageResponse {
    pub fn from_image(image: &Image, url: Option<String>) -> Self {
        Self {
            id: image.id,
            filename: image.filename.clone(),
            taken_at: image.taken_at,
            uploaded_at: image.uploaded_at,
            size_bytes: image.size_bytes,
            thumbnail_url: image.thumbnail_key.as_ref().map(|_| {
                format!("/images/{}/thumbnail?group_id={}", image.id, image.group_id)
            }),
            url,
        }
    }
}

// --- Persons & Albums ---

/// Person
///
/// A face cluster detected in a group. Rows are written by the face pipeline.
#[derive(Debug, Clone, FromRow, Default)]
pub struct Person {
    pub id: Uuid,
    pub group_id: Uuid,
    pub name: Option<String>,
    pub thumbnail_key: Option<String>,
    pub image_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct PersonResponse {
    pub id: Uuid,
    pub name: Option<String>,
    pub image_count: i64,
    pub thumbnail_url: Option<String>,
}

impl From<Person> for PersonResponse {
    fn from(person: Person) -> Self {
        let thumbnail_url = person
            .thumbnail_key
            .as_ref()
            .map(|_| format!("/people/{}/thumbnail?group_id={}", person.id, person.group_id));
        Self {
            id: person.id,
            name: person.name,
            image_count: person.image_count,
            thumbnail_url,
        }
    }
}

/// Album
///
/// A user-curated subset of a group's images.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Album {
    pub id: Uuid,
    pub group_id: Uuid,
    pub name: String,
    pub created_by: Uuid,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    pub image_count: i64,
}

// --- Pagination ---

/// SortKey
///
/// Ordering of an image listing. Unknown values fall back to newest uploads first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortKey {
    #[default]
    UploadedDesc,
    TakenDesc,
    FilenameAsc,
}

impl SortKey {
    pub fn from_param(param: Option<&str>) -> Self {
        match param.map(str::trim) {
            Some("taken") | Some("date_taken") => SortKey::TakenDesc,
            Some("filename") | Some("name") => SortKey::FilenameAsc,
            _ => SortKey::UploadedDesc,
        }
    }
}

/// ImageFilter
///
/// Secondary dimension narrowing a group's images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImageFilter {
    #[default]
    All,
    Person(Uuid),
    Album(Uuid),
}

/// PageRequest
///
/// One page of a filtered image listing. `page` is zero-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub group_id: Uuid,
    pub filter: ImageFilter,
    pub sort: SortKey,
    pub page: u32,
    pub page_size: u32,
}

impl PageRequest {
    /// The store query for this page: one row more than the page holds, so the
    /// presence of a next page can be detected.
    pub fn to_query(&self) -> ImageQuery {
        ImageQuery {
            group_id: self.group_id,
            filter: self.filter,
            sort: self.sort,
            limit: i64::from(self.page_size) + 1,
            offset: i64::from(self.page) * i64::from(self.page_size),
        }
    }
}

/// ImageQuery
///
/// Bounded range query handed to the repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageQuery {
    pub group_id: Uuid,
    pub filter: ImageFilter,
    pub sort: SortKey,
    pub limit: i64,
    pub offset: i64,
}

/// Page
///
/// A page of results and whether another page follows.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub has_more: bool,
}

// --- Request Payloads ---

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CreateGroupRequest {
    pub name: String,
    /// Defaults to private.
    #[serde(default)]
    pub access: Visibility,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UpdateAccessRequest {
    pub access: Visibility,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CreateAlbumRequest {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct AddAlbumImageRequest {
    pub image_id: Uuid,
}

/// PresignedUrlRequest
///
/// Asks for a short-lived URL the client uploads an original to.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct PresignedUrlRequest {
    pub group_id: Uuid,
    #[schema(example = "IMG_0042.jpg")]
    pub filename: String,
    #[schema(example = "image/jpeg")]
    pub file_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct PresignedUrlResponse {
    pub upload_url: String,
    /// Object key to pass back when registering the image.
    pub resource_key: String,
}

/// RegisterImageRequest
///
/// Records an original the client finished uploading.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct RegisterImageRequest {
    pub group_id: Uuid,
    pub storage_key: String,
    pub filename: String,
    pub size_bytes: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[ts(type = "string | null")]
    pub taken_at: Option<DateTime<Utc>>,
}
