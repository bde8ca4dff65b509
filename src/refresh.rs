//! Signed-URL lifecycle for stored images.
//!
//! A cached URL is stored with an expiry set `margin` before the URL really
//! expires. Reads classify the cached URL and either reuse it, reuse it while a
//! detached task replaces it, or regenerate it before answering.

use axum::extract::FromRef;
use chrono::{DateTime, TimeDelta, Utc};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::Instrument;
use uuid::Uuid;

use crate::{
    AppState,
    models::{CachedUrl, Image},
    repository::RepositoryState,
    storage::StorageState,
};

/// Head start between the stored expiry and the URL's real expiry.
pub const REFRESH_MARGIN: Duration = Duration::from_secs(10 * 60);

/// UrlWindow
///
/// Validity policy of signed URLs for one call site. The windows differ per
/// endpoint on purpose and are not unified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UrlWindow {
    pub validity: Duration,
    pub margin: Duration,
}

impl UrlWindow {
    /// Single-image detail view.
    pub const DETAIL: Self = Self::new(Duration::from_secs(15 * 60));
    /// Person listings.
    pub const SESSION: Self = Self::new(Duration::from_secs(8 * 60 * 60));
    /// Group and album listings.
    pub const DAY: Self = Self::new(Duration::from_secs(24 * 60 * 60));

    pub const fn new(validity: Duration) -> Self {
        Self {
            validity,
            margin: REFRESH_MARGIN,
        }
    }

    /// Stored expiry for a URL issued at `issued_at`. Never earlier than issuance.
    pub fn expires_at(&self, issued_at: DateTime<Utc>) -> DateTime<Utc> {
        let usable = self.validity.saturating_sub(self.margin);
        issued_at + to_delta(usable)
    }

    /// How long before the stored expiry a read starts a background refresh.
    pub fn refresh_ahead(&self) -> TimeDelta {
        to_delta(self.validity / 4)
    }
}

fn to_delta(duration: Duration) -> TimeDelta {
    TimeDelta::from_std(duration).unwrap_or(TimeDelta::MAX)
}

/// UrlState
///
/// Classification of an image's cached URL at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrlState {
    Absent,
    Expired,
    NearExpiry,
    Fresh,
}

impl UrlState {
    pub fn of(cached: Option<&CachedUrl>, window: UrlWindow, now: DateTime<Utc>) -> Self {
        match cached {
            None => UrlState::Absent,
            Some(cached) if now >= cached.expires_at => UrlState::Expired,
            Some(cached) if now >= cached.expires_at - window.refresh_ahead() => {
                UrlState::NearExpiry
            }
            Some(_) => UrlState::Fresh,
        }
    }
}

/// UrlRefresher
///
/// Produces signed retrieval URLs through the object store and records them on
/// the image row. Cheap to clone; holds only shared handles.
#[derive(Clone)]
pub struct UrlRefresher {
    repo: RepositoryState,
    storage: StorageState,
}

impl FromRef<AppState> for UrlRefresher {
    fn from_ref(state: &AppState) -> Self {
        Self::new(state.repo.clone(), state.storage.clone())
    }
}

impl UrlRefresher {
    pub fn new(repo: RepositoryState, storage: StorageState) -> Self {
        Self { repo, storage }
    }

    /// resolve
    ///
    /// Returns the URL to hand out for `image`:
    /// - fresh: the cached URL,
    /// - near expiry: the cached URL, with a detached refresh started,
    /// - absent or expired: a newly signed URL, awaited; on failure the stale URL
    ///   if there is one.
    pub async fn resolve(
        &self,
        image: &Image,
        window: UrlWindow,
        now: DateTime<Utc>,
    ) -> Option<String> {
        let cached = image.cached_url.as_ref();
        match UrlState::of(cached, window, now) {
            UrlState::Fresh => cached.map(|c| c.url.clone()),
            UrlState::NearExpiry => {
                // Dropping the handle detaches the task from this request.
                drop(self.spawn_refresh(image.id, image.storage_key.clone(), window));
                cached.map(|c| c.url.clone())
            }
            UrlState::Absent | UrlState::Expired => {
                match self.refresh(image.id, &image.storage_key, window).await {
                    Some(url) => Some(url),
                    None => cached.map(|c| c.url.clone()),
                }
            }
        }
    }

    /// refresh
    ///
    /// Signs a new URL and persists it with its stored expiry. Storage failures are
    /// logged and yield `None`. A failed write is logged and the signed URL is
    /// still returned.
    pub async fn refresh(
        &self,
        image_id: Uuid,
        storage_key: &str,
        window: UrlWindow,
    ) -> Option<String> {
        let issued_at = Utc::now();
        let url = match self
            .storage
            .get_presigned_download_url(storage_key, window.validity)
            .await
        {
            Ok(url) => url,
            Err(e) => {
                tracing::error!(%image_id, error = %e, "failed to sign image url");
                return None;
            }
        };

        let expires_at = window.expires_at(issued_at);
        if let Err(e) = self.repo.set_image_url(image_id, &url, expires_at).await {
            tracing::warn!(%image_id, error = %e, "failed to persist signed url");
        } else {
            tracing::debug!(%image_id, %expires_at, "signed url refreshed");
        }
        Some(url)
    }

    /// spawn_refresh
    ///
    /// Runs `refresh` on the runtime, detached from the caller. Errors end up in
    /// the log only.
    pub fn spawn_refresh(
        &self,
        image_id: Uuid,
        storage_key: String,
        window: UrlWindow,
    ) -> JoinHandle<()> {
        let refresher = self.clone();
        let span = tracing::info_span!("background_url_refresh", %image_id);
        tokio::spawn(
            async move {
                refresher.refresh(image_id, &storage_key, window).await;
            }
            .instrument(span),
        )
    }
}
