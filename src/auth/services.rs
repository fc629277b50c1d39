use tracing::warn;

use crate::auth::{dto::RegisterRequest, password};
use crate::error::ApiError;
use crate::state::AppState;
use crate::users::repo_types::{Role, User};
use crate::users::services::{create_user, NewAccount};

const INVALID_CREDENTIALS: &str = "Incorrect email or password";

/// Creates a `user`-role account and issues its first token.
pub async fn register(state: &AppState, req: RegisterRequest) -> Result<(User, String), ApiError> {
    let user = create_user(
        state.users.as_ref(),
        NewAccount {
            username: req.username,
            email: req.email,
            password: req.password,
            role: Role::User,
        },
    )
    .await?;
    let token = state.keys.sign(user.id)?;
    Ok((user, token))
}

/// Unknown email and wrong password fail identically.
pub async fn login(state: &AppState, email: &str, password: &str) -> Result<(User, String), ApiError> {
    if email.is_empty() || password.is_empty() {
        return Err(ApiError::BadRequest("Please provide email and password".into()));
    }
    let email = email.trim().to_lowercase();

    let Some(user) = state.users.find_by_email(&email).await? else {
        // Same Argon2 work as a real mismatch.
        password::verify(password.to_owned(), password::UNMATCHABLE_HASH.to_owned()).await?;
        warn!(email = %email, "login unknown email");
        return Err(ApiError::Unauthorized(INVALID_CREDENTIALS.into()));
    };

    if !password::verify(password.to_owned(), user.password_hash.clone()).await? {
        warn!(user_id = %user.id, "login invalid password");
        return Err(ApiError::Unauthorized(INVALID_CREDENTIALS.into()));
    }

    let token = state.keys.sign(user.id)?;
    Ok((user, token))
}
