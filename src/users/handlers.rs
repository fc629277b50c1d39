use axum::{
    extract::State,
    http::HeaderMap,
    middleware,
    response::IntoResponse,
    routing::{delete, get, post, put},
    Router,
};
use tracing::{info, instrument};

use crate::{
    auth::middleware::{
        authenticate, authorize, ensure_owner_or_admin, identify, require_role, CurrentUser,
        ADMIN_ONLY,
    },
    error::ApiError,
    response::{ApiResponse, Empty},
    state::AppState,
    users::{
        dto::{CreateUserInput, UpdateUserInput, UserIdInput},
        repo_types::{PublicUser, Role},
        services::{self, NewAccount, ProfileUpdate},
    },
    validation::{validate, Valid},
};

// Layers run outermost first: validation, then authentication, then roles.
pub fn user_routes(state: &AppState) -> Router<AppState> {
    let authn = || middleware::from_fn_with_state(state.clone(), authenticate);

    Router::new()
        .route(
            "/users",
            post(create_user).layer(middleware::from_fn(validate::<CreateUserInput>)),
        )
        .route(
            "/users",
            get(list_users)
                .layer(middleware::from_fn_with_state(ADMIN_ONLY, require_role))
                .layer(authn()),
        )
        .route(
            "/users/:id",
            get(get_user)
                .layer(authn())
                .layer(middleware::from_fn(validate::<UserIdInput>)),
        )
        .route(
            "/users/:id",
            put(update_user)
                .layer(authn())
                .layer(middleware::from_fn(validate::<UpdateUserInput>)),
        )
        .route(
            "/users/:id",
            delete(delete_user)
                .layer(authn())
                .layer(middleware::from_fn(validate::<UserIdInput>)),
        )
}

/// Open endpoint; only an admin caller may hand out the admin role.
#[instrument(skip_all)]
pub async fn create_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Valid(input): Valid<CreateUserInput>,
) -> Result<impl IntoResponse, ApiError> {
    let body = input.body;
    let role = body.role.unwrap_or_default();
    if role == Role::Admin {
        let caller = identify(&state, &headers).await?;
        authorize(&caller, ADMIN_ONLY)?;
    }

    let user = services::create_user(
        state.users.as_ref(),
        NewAccount {
            username: body.username,
            email: body.email,
            password: body.password,
            role,
        },
    )
    .await?;
    info!(user_id = %user.id, role = ?user.role, "user created");
    Ok(ApiResponse::ok(PublicUser::from(user)).created())
}

#[instrument(skip_all)]
pub async fn list_users(
    State(state): State<AppState>,
) -> Result<ApiResponse<Vec<PublicUser>>, ApiError> {
    let users = services::list_users(state.users.as_ref()).await?;
    Ok(ApiResponse::ok(
        users.into_iter().map(PublicUser::from).collect(),
    ))
}

#[instrument(skip_all)]
pub async fn get_user(
    State(state): State<AppState>,
    Valid(input): Valid<UserIdInput>,
) -> Result<ApiResponse<PublicUser>, ApiError> {
    let user = services::get_user(state.users.as_ref(), input.params.id).await?;
    Ok(ApiResponse::ok(PublicUser::from(user)))
}

#[instrument(skip_all)]
pub async fn update_user(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    Valid(input): Valid<UpdateUserInput>,
) -> Result<ApiResponse<PublicUser>, ApiError> {
    let id = input.params.id;
    ensure_owner_or_admin(&caller, id)?;

    let update = ProfileUpdate {
        username: input.body.username,
        email: input.body.email,
        password: None,
    };
    let user = services::update_user(state.users.as_ref(), id, update).await?;
    info!(user_id = %user.id, by = %caller.id, "user updated");
    Ok(ApiResponse::ok(PublicUser::from(user)))
}

#[instrument(skip_all)]
pub async fn delete_user(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    Valid(input): Valid<UserIdInput>,
) -> Result<ApiResponse<Empty>, ApiError> {
    let id = input.params.id;
    ensure_owner_or_admin(&caller, id)?;

    services::delete_user(state.users.as_ref(), id).await?;
    info!(user_id = %id, by = %caller.id, "user deleted");
    Ok(ApiResponse::ok(Empty::default()))
}
