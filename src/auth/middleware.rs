//! Authentication and role gating.
//!
//! [`authenticate`] resolves the bearer token to a stored user and attaches it
//! to the request as [`CurrentUser`]. [`require_role`] is layered inside it on
//! routes that additionally need a role.

use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;
use crate::users::repo_types::{Role, User};

pub const ADMIN_ONLY: &[Role] = &[Role::Admin];

/// The authenticated user of the current request.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let token = value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))?
        .trim();
    (!token.is_empty()).then_some(token)
}

/// Token → claims → stored user.
pub async fn identify(state: &AppState, headers: &HeaderMap) -> Result<User, ApiError> {
    let token = bearer_token(headers).ok_or(ApiError::Unauthenticated)?;
    let claims = state.keys.verify(token)?;
    state
        .users
        .find_by_id(claims.sub)
        .await?
        .ok_or_else(|| {
            warn!(user_id = %claims.sub, "token subject no longer exists");
            ApiError::UserGone
        })
}

pub async fn authenticate(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let (mut parts, body) = req.into_parts();
    let user = identify(&state, &parts.headers).await?;
    debug!(user_id = %user.id, role = ?user.role, "authenticated");
    parts.extensions.insert(CurrentUser(user));
    Ok(next.run(Request::from_parts(parts, body)).await)
}

pub async fn require_role(
    State(roles): State<&'static [Role]>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let CurrentUser(user) = req
        .extensions()
        .get::<CurrentUser>()
        .ok_or(ApiError::Unauthenticated)?;
    authorize(user, roles)?;
    Ok(next.run(req).await)
}

pub fn authorize(user: &User, roles: &[Role]) -> Result<(), ApiError> {
    if roles.contains(&user.role) {
        Ok(())
    } else {
        warn!(user_id = %user.id, role = ?user.role, required = ?roles, "role check failed");
        Err(ApiError::Forbidden)
    }
}

/// Account owners may act on their own record; admins on any.
pub fn ensure_owner_or_admin(user: &User, target: Uuid) -> Result<(), ApiError> {
    if user.id == target {
        return Ok(());
    }
    authorize(user, ADMIN_ONLY)
}

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentUser>()
            .cloned()
            .ok_or(ApiError::Unauthenticated)
    }
}
