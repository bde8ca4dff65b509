use crate::{
    AppState, access,
    auth::{AuthUser, MaybeUser},
    error::{AppError, ErrorResponse},
    gallery::{
        self, ALBUM_IMAGE_PAGE_SIZE, DIRECTORY_PAGE_SIZE, GROUP_IMAGE_PAGE_SIZE,
        PERSON_IMAGE_PAGE_SIZE,
    },
    models::{
        AddAlbumImageRequest, Album, CreateAlbumRequest, CreateGroupRequest, Group, ImageFilter,
        ImageResponse, Page, PageRequest, PersonResponse, PresignedUrlRequest,
        PresignedUrlResponse, RegisterImageRequest, SortKey, UpdateAccessRequest,
    },
    refresh::{UrlRefresher, UrlWindow},
    storage::StorageError,
};
use axum::{
    Json,
    body::Bytes,
    extract::{FromRef, Path, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde::Deserialize;
use utoipa::IntoParams;
use uuid::Uuid;

// --- Query Parameters ---

/// Query of `GET /images`.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct GroupImagesQuery {
    /// Required.
    pub group_id: Option<String>,
    /// `uploaded` (default), `taken` or `filename`.
    pub sort: Option<String>,
    /// Zero-based page index.
    pub page: Option<i64>,
}

/// Query of `GET /people/images`.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PersonImagesQuery {
    pub group_id: Option<String>,
    pub person_id: Option<String>,
    pub sort: Option<String>,
    pub page: Option<i64>,
}

/// Query of `GET /albums/images`.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AlbumImagesQuery {
    pub group_id: Option<String>,
    pub album_id: Option<String>,
    pub sort: Option<String>,
    pub page: Option<i64>,
}

/// Query of the person and album directories.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct DirectoryQuery {
    pub group_id: Option<String>,
    pub page: Option<i64>,
}

/// Group scope of single-resource routes.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct GroupScope {
    pub group_id: Option<String>,
}

// --- Validation ---

/// Parses a required id parameter. Runs before any I/O.
fn required_id(value: Option<&str>, name: &str) -> Result<Uuid, AppError> {
    let raw = value
        .map(str::trim)
        .filter(|raw| !raw.is_empty())
        .ok_or_else(|| AppError::BadRequest(format!("{name} is required")))?;
    Uuid::parse_str(raw).map_err(|_| AppError::BadRequest(format!("{name} must be a valid id")))
}

/// Zero-based page index; defaults to the first page.
fn page_index(page: Option<i64>) -> Result<u32, AppError> {
    let page = page.unwrap_or(0);
    if page < 0 {
        return Err(AppError::BadRequest("page must be non-negative".to_string()));
    }
    u32::try_from(page).map_err(|_| AppError::BadRequest("page is out of range".to_string()))
}

/// Loads a group the caller owns. A missing group and a foreign group both
/// surface as `NotFound`.
async fn owned_group(state: &AppState, group_id: Uuid, user_id: Uuid) -> Result<Group, AppError> {
    match state.repo.get_group(group_id).await? {
        Some(group) if group.owner_id == user_id => Ok(group),
        _ => Err(AppError::NotFound("group")),
    }
}

// --- Image Listings ---

#[allow(clippy::too_many_arguments)]
async fn image_page(
    state: &AppState,
    caller: Option<AuthUser>,
    group_id: Uuid,
    filter: ImageFilter,
    sort: Option<&str>,
    page: u32,
    page_size: u32,
    window: UrlWindow,
) -> Result<Json<Page<ImageResponse>>, AppError> {
    access::authorize_group_read(state.repo.as_ref(), caller.as_ref(), group_id).await?;

    let request = PageRequest {
        group_id,
        filter,
        sort: SortKey::from_param(sort),
        page,
        page_size,
    };
    let refresher = UrlRefresher::from_ref(state);
    let page = gallery::list_images(state.repo.as_ref(), &refresher, &request, window).await?;
    Ok(Json(page))
}

/// list_group_images
///
/// [Public Route] One page of a group's images. Anonymous callers only see public groups.
#[utoipa::path(
    get,
    path = "/images",
    params(GroupImagesQuery),
    responses(
        (status = 200, description = "Image page", body = Page<ImageResponse>),
        (status = 400, description = "Missing or invalid parameter", body = ErrorResponse),
        (status = 403, description = "Group is not public", body = ErrorResponse),
        (status = 404, description = "Group not found", body = ErrorResponse)
    )
)]
pub async fn list_group_images(
    MaybeUser(caller): MaybeUser,
    State(state): State<AppState>,
    Query(params): Query<GroupImagesQuery>,
) -> Result<Json<Page<ImageResponse>>, AppError> {
    let group_id = required_id(params.group_id.as_deref(), "group_id")?;
    let page = page_index(params.page)?;
    image_page(
        &state,
        caller,
        group_id,
        ImageFilter::All,
        params.sort.as_deref(),
        page,
        GROUP_IMAGE_PAGE_SIZE,
        UrlWindow::DAY,
    )
    .await
}

/// list_person_images
///
/// [Public Route] One page of the images a detected person appears in.
#[utoipa::path(
    get,
    path = "/people/images",
    params(PersonImagesQuery),
    responses(
        (status = 200, description = "Image page", body = Page<ImageResponse>),
        (status = 400, description = "Missing or invalid parameter", body = ErrorResponse),
        (status = 403, description = "Group is not public", body = ErrorResponse)
    )
)]
pub async fn list_person_images(
    MaybeUser(caller): MaybeUser,
    State(state): State<AppState>,
    Query(params): Query<PersonImagesQuery>,
) -> Result<Json<Page<ImageResponse>>, AppError> {
    let group_id = required_id(params.group_id.as_deref(), "group_id")?;
    let person_id = required_id(params.person_id.as_deref(), "person_id")?;
    let page = page_index(params.page)?;
    image_page(
        &state,
        caller,
        group_id,
        ImageFilter::Person(person_id),
        params.sort.as_deref(),
        page,
        PERSON_IMAGE_PAGE_SIZE,
        UrlWindow::SESSION,
    )
    .await
}

/// list_album_images
///
/// [Public Route] One page of an album's images.
#[utoipa::path(
    get,
    path = "/albums/images",
    params(AlbumImagesQuery),
    responses(
        (status = 200, description = "Image page", body = Page<ImageResponse>),
        (status = 400, description = "Missing or invalid parameter", body = ErrorResponse),
        (status = 403, description = "Group is not public", body = ErrorResponse)
    )
)]
pub async fn list_album_images(
    MaybeUser(caller): MaybeUser,
    State(state): State<AppState>,
    Query(params): Query<AlbumImagesQuery>,
) -> Result<Json<Page<ImageResponse>>, AppError> {
    let group_id = required_id(params.group_id.as_deref(), "group_id")?;
    let album_id = required_id(params.album_id.as_deref(), "album_id")?;
    let page = page_index(params.page)?;
    image_page(
        &state,
        caller,
        group_id,
        ImageFilter::Album(album_id),
        params.sort.as_deref(),
        page,
        ALBUM_IMAGE_PAGE_SIZE,
        UrlWindow::DAY,
    )
    .await
}

// --- Single Resources ---

/// get_group
///
/// [Public Route] Group details.
#[utoipa::path(
    get,
    path = "/groups/{id}",
    params(("id" = Uuid, Path, description = "Group ID")),
    responses(
        (status = 200, description = "Group", body = Group),
        (status = 403, description = "Group is not public", body = ErrorResponse),
        (status = 404, description = "Not Found", body = ErrorResponse)
    )
)]
pub async fn get_group(
    MaybeUser(caller): MaybeUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Group>, AppError> {
    access::authorize_group_read(state.repo.as_ref(), caller.as_ref(), id).await?;
    state
        .repo
        .get_group(id)
        .await?
        .map(Json)
        .ok_or(AppError::NotFound("group"))
}

/// get_image
///
/// [Public Route] A single image with a short-lived (15 minute) URL.
#[utoipa::path(
    get,
    path = "/images/{id}",
    params(("id" = Uuid, Path, description = "Image ID"), GroupScope),
    responses(
        (status = 200, description = "Image", body = ImageResponse),
        (status = 400, description = "Missing group_id", body = ErrorResponse),
        (status = 403, description = "Group is not public", body = ErrorResponse),
        (status = 404, description = "Not Found", body = ErrorResponse)
    )
)]
pub async fn get_image(
    MaybeUser(caller): MaybeUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(scope): Query<GroupScope>,
) -> Result<Json<ImageResponse>, AppError> {
    let group_id = required_id(scope.group_id.as_deref(), "group_id")?;
    access::authorize_group_read(state.repo.as_ref(), caller.as_ref(), group_id).await?;

    let image = state
        .repo
        .get_image(group_id, id)
        .await?
        .ok_or(AppError::NotFound("image"))?;
    let refresher = UrlRefresher::from_ref(&state);
    let url = refresher.resolve(&image, UrlWindow::DETAIL, Utc::now()).await;
    Ok(Json(ImageResponse::from_image(&image, url)))
}

/// Streams a stored thumbnail back to the client.
async fn thumbnail_response(state: &AppState, key: &str) -> Result<Response, AppError> {
    match state.storage.get_object(key).await {
        Ok(bytes) => Ok(([(header::CONTENT_TYPE, "image/jpeg")], bytes).into_response()),
        Err(StorageError::NotFound(_)) => Err(AppError::NotFound("thumbnail")),
        Err(err) => Err(err.into()),
    }
}

/// get_image_thumbnail
///
/// [Public Route] JPEG thumbnail of an image.
#[utoipa::path(
    get,
    path = "/images/{id}/thumbnail",
    params(("id" = Uuid, Path, description = "Image ID"), GroupScope),
    responses(
        (status = 200, description = "JPEG thumbnail bytes"),
        (status = 403, description = "Group is not public", body = ErrorResponse),
        (status = 404, description = "Not Found", body = ErrorResponse)
    )
)]
pub async fn get_image_thumbnail(
    MaybeUser(caller): MaybeUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(scope): Query<GroupScope>,
) -> Result<Response, AppError> {
    let group_id = required_id(scope.group_id.as_deref(), "group_id")?;
    access::authorize_group_read(state.repo.as_ref(), caller.as_ref(), group_id).await?;

    let key = state
        .repo
        .get_image(group_id, id)
        .await?
        .and_then(|image| image.thumbnail_key)
        .ok_or(AppError::NotFound("thumbnail"))?;
    thumbnail_response(&state, &key).await
}

/// get_person_thumbnail
///
/// [Public Route] JPEG face crop of a detected person.
#[utoipa::path(
    get,
    path = "/people/{id}/thumbnail",
    params(("id" = Uuid, Path, description = "Person ID"), GroupScope),
    responses(
        (status = 200, description = "JPEG thumbnail bytes"),
        (status = 403, description = "Group is not public", body = ErrorResponse),
        (status = 404, description = "Not Found", body = ErrorResponse)
    )
)]
pub async fn get_person_thumbnail(
    MaybeUser(caller): MaybeUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(scope): Query<GroupScope>,
) -> Result<Response, AppError> {
    let group_id = required_id(scope.group_id.as_deref(), "group_id")?;
    access::authorize_group_read(state.repo.as_ref(), caller.as_ref(), group_id).await?;

    let key = state
        .repo
        .get_person(group_id, id)
        .await?
        .and_then(|person| person.thumbnail_key)
        .ok_or(AppError::NotFound("thumbnail"))?;
    thumbnail_response(&state, &key).await
}

// --- Directories ---

/// list_people
///
/// [Public Route] Persons detected in a group, most photographed first.
#[utoipa::path(
    get,
    path = "/people",
    params(DirectoryQuery),
    responses(
        (status = 200, description = "Person page", body = Page<PersonResponse>),
        (status = 400, description = "Missing or invalid parameter", body = ErrorResponse),
        (status = 403, description = "Group is not public", body = ErrorResponse)
    )
)]
pub async fn list_people(
    MaybeUser(caller): MaybeUser,
    State(state): State<AppState>,
    Query(params): Query<DirectoryQuery>,
) -> Result<Json<Page<PersonResponse>>, AppError> {
    let group_id = required_id(params.group_id.as_deref(), "group_id")?;
    let page = page_index(params.page)?;
    access::authorize_group_read(state.repo.as_ref(), caller.as_ref(), group_id).await?;

    let (limit, offset) = directory_window(page);
    let rows = state.repo.list_persons(group_id, limit, offset).await?;
    let (persons, has_more) = gallery::trim_page(rows, DIRECTORY_PAGE_SIZE);
    Ok(Json(Page {
        items: persons.into_iter().map(PersonResponse::from).collect(),
        has_more,
    }))
}

/// list_albums
///
/// [Public Route] Albums of a group, newest first.
#[utoipa::path(
    get,
    path = "/albums",
    params(DirectoryQuery),
    responses(
        (status = 200, description = "Album page", body = Page<Album>),
        (status = 400, description = "Missing or invalid parameter", body = ErrorResponse),
        (status = 403, description = "Group is not public", body = ErrorResponse)
    )
)]
pub async fn list_albums(
    MaybeUser(caller): MaybeUser,
    State(state): State<AppState>,
    Query(params): Query<DirectoryQuery>,
) -> Result<Json<Page<Album>>, AppError> {
    let group_id = required_id(params.group_id.as_deref(), "group_id")?;
    let page = page_index(params.page)?;
    access::authorize_group_read(state.repo.as_ref(), caller.as_ref(), group_id).await?;

    let (limit, offset) = directory_window(page);
    let rows = state.repo.list_albums(group_id, limit, offset).await?;
    let (items, has_more) = gallery::trim_page(rows, DIRECTORY_PAGE_SIZE);
    Ok(Json(Page { items, has_more }))
}

fn directory_window(page: u32) -> (i64, i64) {
    let size = i64::from(DIRECTORY_PAGE_SIZE);
    (size + 1, i64::from(page) * size)
}

// --- Authenticated: Groups ---

/// create_group
///
/// [Authenticated Route] Creates a group owned by the caller. Private unless stated.
#[utoipa::path(
    post,
    path = "/groups",
    request_body = CreateGroupRequest,
    responses(
        (status = 201, description = "Created", body = Group),
        (status = 400, description = "Empty name", body = ErrorResponse)
    )
)]
pub async fn create_group(
    AuthUser { id, .. }: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<CreateGroupRequest>,
) -> Result<(StatusCode, Json<Group>), AppError> {
    if payload.name.trim().is_empty() {
        return Err(AppError::BadRequest("name is required".to_string()));
    }
    let group = state.repo.create_group(payload, id).await?;
    tracing::info!(group_id = %group.id, owner_id = %id, "group created");
    Ok((StatusCode::CREATED, Json(group)))
}

/// get_my_groups
///
/// [Authenticated Route] Groups owned by the caller.
#[utoipa::path(
    get,
    path = "/me/groups",
    responses((status = 200, description = "My Groups", body = [Group]))
)]
pub async fn get_my_groups(
    AuthUser { id, .. }: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<Group>>, AppError> {
    Ok(Json(state.repo.get_owned_groups(id).await?))
}

/// update_group_access
///
/// [Authenticated Route] Owner-only change of a group's visibility.
#[utoipa::path(
    patch,
    path = "/groups/{id}/access",
    params(("id" = Uuid, Path, description = "Group ID")),
    request_body = UpdateAccessRequest,
    responses(
        (status = 200, description = "Updated", body = Group),
        (status = 404, description = "Not Found or Not Owner", body = ErrorResponse)
    )
)]
pub async fn update_group_access(
    AuthUser { id: user_id, .. }: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateAccessRequest>,
) -> Result<Json<Group>, AppError> {
    state
        .repo
        .set_group_visibility(id, user_id, payload.access)
        .await?
        .map(Json)
        // Missing group and foreign group look the same to the caller.
        .ok_or(AppError::NotFound("group"))
}

// --- Authenticated: Albums ---

/// create_album
///
/// [Authenticated Route] Creates an album inside a group.
#[utoipa::path(
    post,
    path = "/groups/{id}/albums",
    params(("id" = Uuid, Path, description = "Group ID")),
    request_body = CreateAlbumRequest,
    responses(
        (status = 201, description = "Created", body = Album),
        (status = 404, description = "Group Not Found", body = ErrorResponse)
    )
)]
pub async fn create_album(
    AuthUser { id: user_id, .. }: AuthUser,
    State(state): State<AppState>,
    Path(group_id): Path<Uuid>,
    Json(payload): Json<CreateAlbumRequest>,
) -> Result<(StatusCode, Json<Album>), AppError> {
    if payload.name.trim().is_empty() {
        return Err(AppError::BadRequest("name is required".to_string()));
    }
    owned_group(&state, group_id, user_id).await?;
    let album = state.repo.create_album(group_id, payload, user_id).await?;
    Ok((StatusCode::CREATED, Json(album)))
}

/// add_album_image
///
/// [Authenticated Route] Adds an image of the album's group to the album. Repeating
/// the call is harmless.
#[utoipa::path(
    post,
    path = "/albums/{id}/images",
    params(("id" = Uuid, Path, description = "Album ID")),
    request_body = AddAlbumImageRequest,
    responses(
        (status = 204, description = "Added"),
        (status = 404, description = "Album or image not found", body = ErrorResponse)
    )
)]
pub async fn add_album_image(
    AuthUser { id: user_id, .. }: AuthUser,
    State(state): State<AppState>,
    Path(album_id): Path<Uuid>,
    Json(payload): Json<AddAlbumImageRequest>,
) -> Result<StatusCode, AppError> {
    let album = state
        .repo
        .get_album(album_id)
        .await?
        .ok_or(AppError::NotFound("album"))?;
    owned_group(&state, album.group_id, user_id)
        .await
        .map_err(|err| match err {
            AppError::NotFound(_) => AppError::NotFound("album"),
            other => other,
        })?;

    if state
        .repo
        .add_image_to_album(album_id, payload.image_id)
        .await?
    {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound("album image"))
    }
}

// --- Authenticated: Uploads ---

/// get_presigned_url
///
/// [Authenticated Route] Short-lived (10 minute) URL the client uploads an original
/// to, under `groups/{group_id}/`. The object key is server-generated.
#[utoipa::path(
    post,
    path = "/uploads/presigned",
    request_body = PresignedUrlRequest,
    responses(
        (status = 200, description = "URL", body = PresignedUrlResponse),
        (status = 500, description = "Storage failure", body = ErrorResponse)
    )
)]
pub async fn get_presigned_url(
    AuthUser { id: user_id, .. }: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<PresignedUrlRequest>,
) -> Result<Json<PresignedUrlResponse>, AppError> {
    owned_group(&state, payload.group_id, user_id).await?;
    let extension = std::path::Path::new(&payload.filename)
        .extension()
        .and_then(std::ffi::OsStr::to_str)
        .unwrap_or("bin");
    let object_key = format!("groups/{}/{}.{}", payload.group_id, Uuid::new_v4(), extension);

    let upload_url = state
        .storage
        .get_presigned_upload_url(&object_key, &payload.file_type)
        .await?;

    Ok(Json(PresignedUrlResponse {
        upload_url,
        resource_key: object_key,
    }))
}

/// register_image
///
/// [Authenticated Route] Records an uploaded original. The image starts without a
/// signed URL; the first read produces one.
#[utoipa::path(
    post,
    path = "/uploads",
    request_body = RegisterImageRequest,
    responses(
        (status = 201, description = "Registered", body = ImageResponse),
        (status = 400, description = "Invalid payload", body = ErrorResponse),
        (status = 404, description = "Group Not Found", body = ErrorResponse)
    )
)]
pub async fn register_image(
    AuthUser { id: user_id, .. }: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<RegisterImageRequest>,
) -> Result<(StatusCode, Json<ImageResponse>), AppError> {
    if payload.filename.trim().is_empty() {
        return Err(AppError::BadRequest("filename is required".to_string()));
    }
    if payload.size_bytes < 0 {
        return Err(AppError::BadRequest("size_bytes must be non-negative".to_string()));
    }
    let prefix = format!("groups/{}/", payload.group_id);
    if !payload.storage_key.starts_with(&prefix) || payload.storage_key.contains("..") {
        return Err(AppError::BadRequest(
            "storage_key does not belong to this group".to_string(),
        ));
    }
    owned_group(&state, payload.group_id, user_id).await?;

    let image = state.repo.create_image(payload).await?;
    tracing::info!(image_id = %image.id, group_id = %image.group_id, %user_id, "image registered");
    Ok((StatusCode::CREATED, Json(ImageResponse::from_image(&image, None))))
}

/// upload_thumbnail
///
/// [Authenticated Route] Stores the JPEG thumbnail of an image.
#[utoipa::path(
    put,
    path = "/uploads/{id}/thumbnail",
    params(("id" = Uuid, Path, description = "Image ID"), GroupScope),
    request_body(content = Vec<u8>, content_type = "image/jpeg"),
    responses(
        (status = 204, description = "Stored"),
        (status = 400, description = "Missing group_id or empty body", body = ErrorResponse),
        (status = 404, description = "Image Not Found", body = ErrorResponse)
    )
)]
pub async fn upload_thumbnail(
    AuthUser { id: user_id, .. }: AuthUser,
    State(state): State<AppState>,
    Path(image_id): Path<Uuid>,
    Query(scope): Query<GroupScope>,
    body: Bytes,
) -> Result<StatusCode, AppError> {
    let group_id = required_id(scope.group_id.as_deref(), "group_id")?;
    if body.is_empty() {
        return Err(AppError::BadRequest("thumbnail body is empty".to_string()));
    }
    owned_group(&state, group_id, user_id).await?;
    if state.repo.get_image(group_id, image_id).await?.is_none() {
        return Err(AppError::NotFound("image"));
    }

    let key = format!("thumbnails/{group_id}/{image_id}.jpg");
    state
        .storage
        .put_object(&key, body.to_vec(), "image/jpeg")
        .await?;

    if state.repo.set_image_thumbnail(group_id, image_id, &key).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound("image"))
    }
}
