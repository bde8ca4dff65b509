use uuid::Uuid;

use crate::{auth::AuthUser, error::AppError, models::Visibility, repository::Repository};

/// AccessGrant
///
/// Why a read of a group's content was allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessGrant {
    /// Some authenticated identity is present. Membership is checked by the
    /// owner-scoped endpoints, not here.
    Authenticated(Uuid),
    /// Anonymous caller, group is public.
    PublicGroup,
}

/// authorize_group_read
///
/// The gate in front of every group-content read. Authenticated callers pass
/// without touching the store. Anonymous callers cost exactly one policy read
/// (uncached) and pass only when the group is public.
pub async fn authorize_group_read(
    repo: &dyn Repository,
    caller: Option<&AuthUser>,
    group_id: Uuid,
) -> Result<AccessGrant, AppError> {
    if let Some(user) = caller {
        return Ok(AccessGrant::Authenticated(user.id));
    }

    match repo.get_group_visibility(group_id).await? {
        None => Err(AppError::NotFound("group")),
        Some(Visibility::Public) => Ok(AccessGrant::PublicGroup),
        Some(Visibility::Private) => {
            tracing::debug!(%group_id, "anonymous read of private group refused");
            Err(AppError::Forbidden)
        }
    }
}
