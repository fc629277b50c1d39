use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;

/// Success envelope: `{success, token?, data}`.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            token: None,
            data,
        }
    }

    pub fn with_token(data: T, token: String) -> Self {
        Self {
            success: true,
            token: Some(token),
            data,
        }
    }

    pub fn created(self) -> impl IntoResponse {
        (StatusCode::CREATED, Json(self))
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> axum::response::Response {
        Json(self).into_response()
    }
}

/// Empty object used as the `data` of delete responses.
#[derive(Debug, Default, Serialize)]
pub struct Empty {}
