use axum::{
    extract::State,
    middleware,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use tracing::{info, instrument};

use crate::{
    auth::{
        dto::{LoginInput, RegisterInput},
        middleware::{authenticate, CurrentUser},
        services,
    },
    error::ApiError,
    response::ApiResponse,
    state::AppState,
    users::repo_types::PublicUser,
    validation::{validate, Valid},
};

pub fn auth_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route(
            "/auth/register",
            post(register).layer(middleware::from_fn(validate::<RegisterInput>)),
        )
        .route(
            "/auth/login",
            post(login).layer(middleware::from_fn(validate::<LoginInput>)),
        )
        .route(
            "/auth/me",
            get(get_me).layer(middleware::from_fn_with_state(state.clone(), authenticate)),
        )
}

#[instrument(skip_all)]
pub async fn register(
    State(state): State<AppState>,
    Valid(input): Valid<RegisterInput>,
) -> Result<impl IntoResponse, ApiError> {
    let (user, token) = services::register(&state, input.body).await?;
    info!(user_id = %user.id, email = %user.email, "user registered");
    Ok(ApiResponse::with_token(PublicUser::from(user), token).created())
}

#[instrument(skip_all)]
pub async fn login(
    State(state): State<AppState>,
    Valid(input): Valid<LoginInput>,
) -> Result<ApiResponse<PublicUser>, ApiError> {
    let (user, token) = services::login(&state, &input.body.email, &input.body.password).await?;
    info!(user_id = %user.id, email = %user.email, "user logged in");
    Ok(ApiResponse::with_token(PublicUser::from(user), token))
}

#[instrument(skip_all)]
pub async fn get_me(CurrentUser(user): CurrentUser) -> ApiResponse<PublicUser> {
    ApiResponse::ok(PublicUser::from(user))
}
