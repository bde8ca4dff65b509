use chrono::Utc;

use crate::{
    error::AppError,
    models::{ImageResponse, Page, PageRequest},
    refresh::{UrlRefresher, UrlWindow},
    repository::Repository,
};

/// Page size of `GET /images` (a whole group).
pub const GROUP_IMAGE_PAGE_SIZE: u32 = 50;
/// Page size of `GET /albums/images`.
pub const ALBUM_IMAGE_PAGE_SIZE: u32 = 50;
/// Page size of `GET /people/images`.
pub const PERSON_IMAGE_PAGE_SIZE: u32 = 100;
/// Page size of the person and album directories.
pub const DIRECTORY_PAGE_SIZE: u32 = 10;

/// trim_page
///
/// Splits a `page_size + 1` result into the page itself and the continuation flag.
pub fn trim_page<T>(mut rows: Vec<T>, page_size: u32) -> (Vec<T>, bool) {
    let page_size = page_size as usize;
    let has_more = rows.len() > page_size;
    rows.truncate(page_size);
    (rows, has_more)
}

/// list_images
///
/// Returns one page of a group's images. Each item carries a signed URL resolved
/// through `refresher`: missing or expired URLs are regenerated before the page is
/// returned, URLs close to expiry are handed out as-is and replaced in the
/// background.
pub async fn list_images(
    repo: &dyn Repository,
    refresher: &UrlRefresher,
    request: &PageRequest,
    window: UrlWindow,
) -> Result<Page<ImageResponse>, AppError> {
    let rows = repo.list_images(&request.to_query()).await?;
    let (images, has_more) = trim_page(rows, request.page_size);

    let now = Utc::now();
    let mut items = Vec::with_capacity(images.len());
    for image in &images {
        let url = refresher.resolve(image, window, now).await;
        items.push(ImageResponse::from_image(image, url));
    }

    tracing::debug!(
        group_id = %request.group_id,
        page = request.page,
        items = items.len(),
        has_more,
        "image page listed"
    );
    Ok(Page { items, has_more })
}
