use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::users::repo::UserStore;
use crate::users::repo_types::{NewUser, StoreError, UniqueField, User, UserChanges};

/// In-process [`UserStore`]. The uniqueness check and the write happen under
/// one lock, so concurrent inserts cannot both claim the same email.
#[derive(Default)]
pub struct MemoryUserStore {
    users: RwLock<Vec<User>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn taken(users: &[User], skip: Option<Uuid>, username: Option<&str>, email: Option<&str>) -> Option<UniqueField> {
    let others = users.iter().filter(|u| Some(u.id) != skip);
    for u in others {
        if email == Some(u.email.as_str()) {
            return Some(UniqueField::Email);
        }
        if username == Some(u.username.as_str()) {
            return Some(UniqueField::Username);
        }
    }
    None
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn insert(&self, user: NewUser) -> Result<User, StoreError> {
        let mut users = self.users.write().await;
        if let Some(field) = taken(&users, None, Some(&user.username), Some(&user.email)) {
            return Err(StoreError::Conflict(field));
        }
        let now = OffsetDateTime::now_utc();
        let user = User {
            id: Uuid::new_v4(),
            username: user.username,
            email: user.email,
            password_hash: user.password_hash,
            role: user.role,
            created_at: now,
            updated_at: now,
        };
        users.push(user.clone());
        Ok(user)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.users.read().await.iter().find(|u| u.id == id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(self
            .users
            .read()
            .await
            .iter()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn list(&self) -> Result<Vec<User>, StoreError> {
        Ok(self.users.read().await.iter().rev().cloned().collect())
    }

    async fn update(&self, id: Uuid, changes: UserChanges) -> Result<Option<User>, StoreError> {
        let mut users = self.users.write().await;
        let Some(idx) = users.iter().position(|u| u.id == id) else {
            return Ok(None);
        };
        if let Some(field) = taken(
            &users,
            Some(id),
            changes.username.as_deref(),
            changes.email.as_deref(),
        ) {
            return Err(StoreError::Conflict(field));
        }
        let user = &mut users[idx];
        if let Some(username) = changes.username {
            user.username = username;
        }
        if let Some(email) = changes.email {
            user.email = email;
        }
        if let Some(hash) = changes.password_hash {
            user.password_hash = hash;
        }
        user.updated_at = OffsetDateTime::now_utc();
        Ok(Some(user.clone()))
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut users = self.users.write().await;
        let before = users.len();
        users.retain(|u| u.id != id);
        Ok(users.len() < before)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::users::repo_types::Role;

    fn new_user(username: &str, email: &str) -> NewUser {
        NewUser {
            username: username.into(),
            email: email.into(),
            password_hash: "hash".into(),
            role: Role::User,
        }
    }

    #[tokio::test]
    async fn insert_and_find() {
        let store = MemoryUserStore::new();
        let user = store.insert(new_user("alice", "alice@example.com")).await.unwrap();
        assert_eq!(store.find_by_id(user.id).await.unwrap().unwrap().email, "alice@example.com");
        assert_eq!(
            store.find_by_email("alice@example.com").await.unwrap().unwrap().id,
            user.id
        );
        assert!(store.find_by_email("bob@example.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn rejects_duplicate_email_and_username() {
        let store = MemoryUserStore::new();
        store.insert(new_user("alice", "alice@example.com")).await.unwrap();

        let err = store.insert(new_user("alice2", "alice@example.com")).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(UniqueField::Email)));
        let err = store.insert(new_user("alice", "other@example.com")).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(UniqueField::Username)));
        assert_eq!(store.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn concurrent_inserts_with_same_email_admit_one() {
        let store = Arc::new(MemoryUserStore::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move {
                    store
                        .insert(new_user(&format!("user{i}"), "same@example.com"))
                        .await
                })
            })
            .collect();

        let mut ok = 0;
        let mut conflicts = 0;
        for h in handles {
            match h.await.unwrap() {
                Ok(_) => ok += 1,
                Err(StoreError::Conflict(UniqueField::Email)) => conflicts += 1,
                Err(e) => panic!("unexpected error {e}"),
            }
        }
        assert_eq!(ok, 1);
        assert_eq!(conflicts, 7);
    }

    #[tokio::test]
    async fn update_of_missing_user_is_none_even_when_values_are_taken() {
        let store = MemoryUserStore::new();
        store.insert(new_user("alice", "alice@example.com")).await.unwrap();
        let res = store
            .update(
                Uuid::new_v4(),
                UserChanges {
                    email: Some("alice@example.com".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(res.is_none());
    }

    #[tokio::test]
    async fn update_applies_only_given_fields() {
        let store = MemoryUserStore::new();
        let user = store.insert(new_user("alice", "alice@example.com")).await.unwrap();
        let updated = store
            .update(
                user.id,
                UserChanges {
                    username: Some("alicia".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.username, "alicia");
        assert_eq!(updated.email, "alice@example.com");
        assert_eq!(updated.password_hash, "hash");
    }

    #[tokio::test]
    async fn update_keeps_uniqueness_and_allows_own_values() {
        let store = MemoryUserStore::new();
        let alice = store.insert(new_user("alice", "alice@example.com")).await.unwrap();
        store.insert(new_user("bob", "bob@example.com")).await.unwrap();

        let err = store
            .update(
                alice.id,
                UserChanges {
                    email: Some("bob@example.com".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(UniqueField::Email)));

        let same = store
            .update(
                alice.id,
                UserChanges {
                    email: Some("alice@example.com".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(same.is_some());
    }

    #[tokio::test]
    async fn update_and_delete_missing_user() {
        let store = MemoryUserStore::new();
        let missing = Uuid::new_v4();
        assert!(store.update(missing, UserChanges::default()).await.unwrap().is_none());
        assert!(!store.delete(missing).await.unwrap());
    }

    #[tokio::test]
    async fn list_is_newest_first() {
        let store = MemoryUserStore::new();
        store.insert(new_user("first", "first@example.com")).await.unwrap();
        store.insert(new_user("second", "second@example.com")).await.unwrap();
        let names: Vec<_> = store
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|u| u.username)
            .collect();
        assert_eq!(names, ["second", "first"]);
    }
}
