use anyhow::Context;
use tracing::info;
use uuid::Uuid;

use crate::auth::password;
use crate::config::AdminSeed;
use crate::error::ApiError;
use crate::users::repo::UserStore;
use crate::users::repo_types::{NewUser, Role, User, UserChanges};
use crate::validation::is_valid_email;

const NOT_FOUND: &str = "User not found";

/// Account to create; `password` is plaintext.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub username: String,
    pub email: String,
    pub password: String,
    pub role: Role,
}

/// Profile edit; `password` is plaintext and hashed only when present.
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

impl ProfileUpdate {
    pub fn is_empty(&self) -> bool {
        self.username.is_none() && self.email.is_none() && self.password.is_none()
    }
}

pub async fn create_user(store: &dyn UserStore, account: NewAccount) -> Result<User, ApiError> {
    if store.find_by_email(&account.email).await?.is_some() {
        return Err(ApiError::Conflict("Email already in use".into()));
    }
    let password_hash = password::hash(account.password).await?;
    // The store's unique constraint still decides races past the check above.
    let user = store
        .insert(NewUser {
            username: account.username,
            email: account.email,
            password_hash,
            role: account.role,
        })
        .await?;
    Ok(user)
}

pub async fn get_user(store: &dyn UserStore, id: Uuid) -> Result<User, ApiError> {
    store
        .find_by_id(id)
        .await?
        .ok_or_else(|| ApiError::not_found(NOT_FOUND))
}

pub async fn list_users(store: &dyn UserStore) -> Result<Vec<User>, ApiError> {
    Ok(store.list().await?)
}

pub async fn update_user(
    store: &dyn UserStore,
    id: Uuid,
    update: ProfileUpdate,
) -> Result<User, ApiError> {
    if update.is_empty() {
        return get_user(store, id).await;
    }
    let password_hash = match update.password {
        Some(plain) => Some(password::hash(plain).await?),
        None => None,
    };
    store
        .update(
            id,
            UserChanges {
                username: update.username,
                email: update.email,
                password_hash,
            },
        )
        .await?
        .ok_or_else(|| ApiError::not_found(NOT_FOUND))
}

pub async fn delete_user(store: &dyn UserStore, id: Uuid) -> Result<(), ApiError> {
    if store.delete(id).await? {
        Ok(())
    } else {
        Err(ApiError::not_found(NOT_FOUND))
    }
}

/// Creates the configured admin account unless its email is already taken.
pub async fn ensure_admin(store: &dyn UserStore, seed: &AdminSeed) -> anyhow::Result<()> {
    let email = seed.email.trim().to_lowercase();
    anyhow::ensure!(is_valid_email(&email), "ADMIN_EMAIL is not a valid email");
    if store.find_by_email(&email).await?.is_some() {
        return Ok(());
    }
    let admin = create_user(
        store,
        NewAccount {
            username: seed.username.trim().to_string(),
            email,
            password: seed.password.clone(),
            role: Role::Admin,
        },
    )
    .await
    .context("create admin account")?;
    info!(user_id = %admin.id, "admin account created");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::password::verify_password;
    use crate::users::memory::MemoryUserStore;

    fn account(username: &str, email: &str) -> NewAccount {
        NewAccount {
            username: username.into(),
            email: email.into(),
            password: "initial-password".into(),
            role: Role::User,
        }
    }

    #[tokio::test]
    async fn create_stores_a_hash_not_the_password() {
        let store = MemoryUserStore::new();
        let user = create_user(&store, account("gina", "gina@example.com")).await.unwrap();
        assert_ne!(user.password_hash, "initial-password");
        assert!(verify_password("initial-password", &user.password_hash).unwrap());
    }

    #[tokio::test]
    async fn rehashes_only_when_password_changes() {
        let store = MemoryUserStore::new();
        let user = create_user(&store, account("hank", "hank@example.com")).await.unwrap();

        let renamed = update_user(
            &store,
            user.id,
            ProfileUpdate {
                username: Some("henry".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(renamed.password_hash, user.password_hash);
        assert_eq!(renamed.email, "hank@example.com");

        let repassworded = update_user(
            &store,
            user.id,
            ProfileUpdate {
                password: Some("brand-new-password".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_ne!(repassworded.password_hash, user.password_hash);
        assert!(verify_password("brand-new-password", &repassworded.password_hash).unwrap());
        assert_eq!(repassworded.username, "henry");
    }

    #[tokio::test]
    async fn empty_update_is_a_no_op() {
        let store = MemoryUserStore::new();
        let user = create_user(&store, account("ivan", "ivan@example.com")).await.unwrap();
        let same = update_user(&store, user.id, ProfileUpdate::default()).await.unwrap();
        assert_eq!(same.username, user.username);
        assert_eq!(same.updated_at, user.updated_at);
    }

    #[tokio::test]
    async fn missing_users_are_not_found() {
        let store = MemoryUserStore::new();
        let id = Uuid::new_v4();
        assert!(matches!(get_user(&store, id).await, Err(ApiError::NotFound(_))));
        assert!(matches!(delete_user(&store, id).await, Err(ApiError::NotFound(_))));
        let update = ProfileUpdate {
            username: Some("nobody".into()),
            ..Default::default()
        };
        assert!(matches!(
            update_user(&store, id, update).await,
            Err(ApiError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn ensure_admin_is_idempotent() {
        let store = MemoryUserStore::new();
        let seed = AdminSeed {
            username: "root".into(),
            email: "Root@Example.com".into(),
            password: "very-secret-pass".into(),
        };
        ensure_admin(&store, &seed).await.unwrap();
        ensure_admin(&store, &seed).await.unwrap();
        let users = list_users(&store).await.unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].role, Role::Admin);
        assert_eq!(users[0].email, "root@example.com");
    }
}
