use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::config::Environment;
use crate::users::repo_types::{StoreError, UniqueField};

/// One failed check of the request validator.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FieldViolation {
    pub path: String,
    pub message: String,
}

impl FieldViolation {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Validation error")]
    Validation(Vec<FieldViolation>),
    #[error("{0}")]
    BadRequest(String),
    #[error("You are not logged in! Please log in to get access.")]
    Unauthenticated,
    #[error("Invalid or expired token")]
    InvalidToken,
    #[error("The user belonging to this token no longer exists.")]
    UserGone,
    #[error("{0}")]
    Unauthorized(String),
    #[error("You do not have permission to perform this action")]
    Forbidden,
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthenticated
            | ApiError::InvalidToken
            | ApiError::UserGone
            | ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::Validation(_) => "validation_error",
            ApiError::BadRequest(_) => "bad_request",
            ApiError::Unauthenticated => "unauthenticated",
            ApiError::InvalidToken => "invalid_token",
            ApiError::UserGone => "user_gone",
            ApiError::Unauthorized(_) => "unauthorized",
            ApiError::Forbidden => "forbidden",
            ApiError::NotFound(_) => "not_found",
            ApiError::Conflict(_) => "conflict",
            ApiError::Internal(_) => "internal",
        }
    }

    /// Operational errors are expected outcomes of bad input or missing rights.
    pub fn is_operational(&self) -> bool {
        !matches!(self, ApiError::Internal(_))
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::NotFound(message.into())
    }

    fn envelope(&self, expose: bool) -> ErrorEnvelope {
        let (message, stack) = match self {
            ApiError::Internal(e) if expose => (e.to_string(), Some(format!("{e:?}"))),
            ApiError::Internal(_) => ("Internal Server Error".to_string(), None),
            other => (other.to_string(), None),
        };
        let details = match self {
            ApiError::Validation(violations) => Some(violations.clone()),
            _ => None,
        };
        ErrorEnvelope {
            code: self.status().as_u16(),
            message,
            stack,
            details,
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict(UniqueField::Email) => {
                ApiError::Conflict("Email already in use".into())
            }
            StoreError::Conflict(UniqueField::Username) => {
                ApiError::Conflict("Username already in use".into())
            }
            StoreError::Database(e) => ApiError::Internal(anyhow::Error::new(e).context("user store")),
        }
    }
}

/// Body of every error response.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorEnvelope {
    pub code: u16,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<FieldViolation>>,
}

/// Unredacted envelope attached to error responses for [`expose_error_details`].
#[derive(Debug, Clone)]
struct ErrorReport(ErrorEnvelope);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            ApiError::Internal(e) => error!(error = ?e, "request failed"),
            ApiError::Unauthenticated
            | ApiError::InvalidToken
            | ApiError::UserGone
            | ApiError::Forbidden => warn!(kind = self.kind(), %status, "request rejected"),
            other => debug!(kind = other.kind(), %status, message = %other, "request rejected"),
        }

        let mut res = (status, Json(self.envelope(false))).into_response();
        res.extensions_mut().insert(ErrorReport(self.envelope(true)));
        res
    }
}

/// Outermost layer of the router: in development, error responses are
/// re-rendered with the internal message and cause chain.
pub async fn expose_error_details(
    State(env): State<Environment>,
    req: Request,
    next: Next,
) -> Response {
    let mut res = next.run(req).await;
    let report = res.extensions_mut().remove::<ErrorReport>();
    match report {
        Some(ErrorReport(full)) if env.is_development() => {
            (res.status(), Json(full)).into_response()
        }
        Some(_) => res,
        None if res.status().is_client_error() || res.status().is_server_error() => {
            envelope_framework_error(res)
        }
        None => res,
    }
}

/// Rejections produced by axum itself (e.g. 405) carry no envelope; give them one.
fn envelope_framework_error(res: Response) -> Response {
    let (mut parts, _) = res.into_parts();
    let status = parts.status;
    debug!(%status, "framework rejection");
    parts.headers.remove(header::CONTENT_TYPE);
    parts.headers.remove(header::CONTENT_LENGTH);
    let envelope = ErrorEnvelope {
        code: status.as_u16(),
        message: status.canonical_reason().unwrap_or("Error").to_string(),
        stack: None,
        details: None,
    };
    (parts, Json(envelope)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(res: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
            .await
            .expect("read body");
        serde_json::from_slice(&bytes).expect("json body")
    }

    #[test]
    fn statuses_follow_taxonomy() {
        assert_eq!(ApiError::Validation(vec![]).status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::Unauthenticated.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::InvalidToken.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::UserGone.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::Forbidden.status(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::not_found("x").status(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::Conflict("x".into()).status(), StatusCode::CONFLICT);
        assert_eq!(
            ApiError::Internal(anyhow::anyhow!("boom")).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn only_internal_errors_are_non_operational() {
        assert!(ApiError::Forbidden.is_operational());
        assert!(!ApiError::Internal(anyhow::anyhow!("boom")).is_operational());
    }

    #[test]
    fn store_conflicts_become_409() {
        let err = ApiError::from(StoreError::Conflict(UniqueField::Email));
        assert_eq!(err.status(), StatusCode::CONFLICT);
        assert_eq!(err.to_string(), "Email already in use");
    }

    #[tokio::test]
    async fn validation_envelope_carries_details() {
        let err = ApiError::Validation(vec![FieldViolation::new("body.email", "Invalid email")]);
        let res = err.into_response();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let body = body_json(res).await;
        assert_eq!(body["code"], 400);
        assert_eq!(body["message"], "Validation error");
        assert_eq!(body["details"][0]["path"], "body.email");
        assert!(body.get("stack").is_none());
    }

    #[tokio::test]
    async fn internal_errors_are_redacted_by_default() {
        let err = ApiError::Internal(anyhow::anyhow!("connection refused").context("user store"));
        let body = body_json(err.into_response()).await;
        assert_eq!(body["code"], 500);
        assert_eq!(body["message"], "Internal Server Error");
        assert!(body.get("stack").is_none());
        assert!(body.get("details").is_none());
    }

    async fn render_in(env: Environment) -> serde_json::Value {
        use axum::{body::Body, middleware, routing::get, Router};
        use tower::ServiceExt;

        let app = Router::new()
            .route(
                "/boom",
                get(|| async {
                    ApiError::Internal(anyhow::anyhow!("disk full").context("write failed"))
                }),
            )
            .layer(middleware::from_fn_with_state(env, expose_error_details));
        let res = app
            .oneshot(
                axum::http::Request::builder()
                    .uri("/boom")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
        body_json(res).await
    }

    #[tokio::test]
    async fn development_exposes_internal_details() {
        let body = render_in(Environment::Development).await;
        assert_eq!(body["message"], "write failed");
        assert!(body["stack"].as_str().unwrap().contains("disk full"));
    }

    #[tokio::test]
    async fn production_keeps_internal_details_private() {
        let body = render_in(Environment::Production).await;
        assert_eq!(body["message"], "Internal Server Error");
        assert!(body.get("stack").is_none());
    }

    #[tokio::test]
    async fn framework_rejections_get_an_envelope() {
        use axum::{body::Body, middleware, routing::get, Router};
        use tower::ServiceExt;

        let app = Router::new()
            .route("/only-get", get(|| async { "ok" }))
            .layer(middleware::from_fn_with_state(
                Environment::Production,
                expose_error_details,
            ));
        let res = app
            .oneshot(
                axum::http::Request::builder()
                    .method("DELETE")
                    .uri("/only-get")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert!(res.headers().contains_key(header::ALLOW));
        assert_eq!(
            res.headers()[header::CONTENT_TYPE],
            "application/json"
        );
        let body = body_json(res).await;
        assert_eq!(body["code"], 405);
        assert_eq!(body["message"], "Method Not Allowed");
    }

    #[test]
    fn full_envelope_keeps_cause_chain() {
        let err = ApiError::Internal(anyhow::anyhow!("connection refused").context("user store"));
        let full = err.envelope(true);
        assert_eq!(full.message, "user store");
        let stack = full.stack.expect("stack");
        assert!(stack.contains("connection refused"));
    }
}
