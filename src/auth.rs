use axum::{
    extract::{FromRef, FromRequestParts},
    http::{StatusCode, header, request::Parts},
};
use jsonwebtoken::{DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use uuid::Uuid;

use crate::{
    config::{AppConfig, Env},
    repository::RepositoryState,
};

/// Claims
///
/// Payload of the session JWTs issued by the identity provider.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the user's id in the `users` table.
    pub sub: Uuid,
    pub exp: usize,
    pub iat: usize,
}

/// AuthUser
///
/// The resolved identity of an authenticated request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: String,
}

/// AuthUser Extractor
///
/// Resolves the caller from, in order:
/// 1. the `x-user-id` header, in `Env::Local` only, when it names an existing user;
/// 2. a `Bearer` JWT signed with the configured secret, whose subject still exists.
///
/// Rejects with `401 Unauthorized` on any failure.
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let repo = RepositoryState::from_ref(state);
        let config = AppConfig::from_ref(state);

        // Development bypass, guarded by the environment check.
        if config.env == Env::Local {
            let bypass_id = parts
                .headers
                .get("x-user-id")
                .and_then(|value| value.to_str().ok())
                .and_then(|value| Uuid::parse_str(value).ok());
            if let Some(user_id) = bypass_id {
                if let Ok(Some(user)) = repo.get_user(user_id).await {
                    return Ok(AuthUser {
                        id: user.id,
                        email: user.email,
                    });
                }
            }
        }

        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or(StatusCode::UNAUTHORIZED)?;

        let decoding_key = DecodingKey::from_secret(config.jwt_secret.as_bytes());
        let mut validation = Validation::default();
        validation.validate_exp = true;

        let token_data = decode::<Claims>(token, &decoding_key, &validation).map_err(|e| {
            tracing::debug!(error = ?e.kind(), "rejected session token");
            StatusCode::UNAUTHORIZED
        })?;

        // The account may have been removed after the token was issued.
        let user = match repo.get_user(token_data.claims.sub).await {
            Ok(Some(user)) => user,
            Ok(None) => return Err(StatusCode::UNAUTHORIZED),
            Err(e) => {
                tracing::error!(error = %e, "user lookup failed during authentication");
                return Err(StatusCode::UNAUTHORIZED);
            }
        };

        Ok(AuthUser {
            id: user.id,
            email: user.email,
        })
    }
}

/// MaybeUser
///
/// Optional identity for routes anonymous callers may use. Never rejects: a
/// missing or invalid credential resolves to `None`.
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<AuthUser>);

impl<S> FromRequestParts<S> for MaybeUser
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        Ok(MaybeUser(AuthUser::from_request_parts(parts, state).await.ok()))
    }
}
