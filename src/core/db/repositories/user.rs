//! User repository for database operations
//!
//! PostgreSQL credential store. Email uniqueness comes from the
//! `users_email_key` constraint, not from a read-then-insert check.

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::core::db::models::{NewUser, User, UserChanges};
use crate::core::db::password::{DEFAULT_BCRYPT_COST, hash_password};
use crate::core::db::store::{CredentialStore, StoreError};

const USER_COLUMNS: &str =
    "id, name, email, password_hash, profile_image_url, created_at, updated_at";

/// User repository for database operations
#[derive(Clone)]
pub struct UserRepository {
    pool: PgPool,
    bcrypt_cost: u32,
}

impl UserRepository {
    /// Create a new user repository
    pub fn new(pool: PgPool) -> Self {
        Self::with_cost(pool, DEFAULT_BCRYPT_COST)
    }

    pub fn with_cost(pool: PgPool, bcrypt_cost: u32) -> Self {
        Self { pool, bcrypt_cost }
    }
}

#[async_trait]
impl CredentialStore for UserRepository {
    async fn create(&self, new_user: NewUser) -> Result<User, StoreError> {
        let password_hash = hash_password(&new_user.password, self.bcrypt_cost)?;

        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (name, email, password_hash, profile_image_url)
            VALUES ($1, $2, $3, $4)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(&new_user.name)
        .bind(&new_user.email)
        .bind(&password_hash)
        .bind(&new_user.profile_image_url)
        .fetch_one(&self.pool)
        .await?;

        Ok(user)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn update(&self, id: Uuid, changes: UserChanges) -> Result<User, StoreError> {
        let password_hash = match &changes.password {
            Some(password) => Some(hash_password(password, self.bcrypt_cost)?),
            None => None,
        };

        let (set_image, image) = match changes.profile_image_url {
            Some(url) => (true, url),
            None => (false, None),
        };

        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
            SET
                name = COALESCE($2, name),
                email = COALESCE($3, email),
                password_hash = COALESCE($4, password_hash),
                profile_image_url = CASE WHEN $5 THEN $6 ELSE profile_image_url END,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(&changes.name)
        .bind(&changes.email)
        .bind(&password_hash)
        .bind(set_image)
        .bind(&image)
        .fetch_optional(&self.pool)
        .await?;

        user.ok_or(StoreError::NotFound)
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    fn bcrypt_cost(&self) -> u32 {
        self.bcrypt_cost
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ========================================================================
    // Integration Tests (require database)
    // ========================================================================

    fn new_user(email: &str) -> NewUser {
        NewUser {
            name: "A".to_string(),
            email: email.to_string(),
            password: "p1".to_string(),
            profile_image_url: None,
        }
    }

    fn unique_email(prefix: &str) -> String {
        format!("{}_{}@example.com", prefix, &Uuid::new_v4().to_string()[..8])
    }

    async fn create_test_repo() -> UserRepository {
        use crate::core::db::pool::{DbConfig, create_pool_with_migrations};

        let config = DbConfig::from_env().expect("DATABASE_URL must be set for tests");
        let pool = create_pool_with_migrations(&config)
            .await
            .expect("Failed to create test pool");
        UserRepository::with_cost(pool, 4)
    }

    #[tokio::test]
    #[ignore = "requires running PostgreSQL database"]
    async fn test_create_user() {
        let repo = create_test_repo().await;
        let email = unique_email("create");

        let user = repo.create(new_user(&email)).await.unwrap();

        assert_eq!(user.email, email);
        assert_ne!(user.password_hash, "p1");
        assert!(user.password_hash.starts_with("$2"));

        repo.delete(user.id).await.unwrap();
    }

    #[tokio::test]
    #[ignore = "requires running PostgreSQL database"]
    async fn test_create_user_duplicate_email() {
        let repo = create_test_repo().await;
        let email = unique_email("dup");

        let user = repo.create(new_user(&email)).await.unwrap();
        let result = repo.create(new_user(&email)).await;

        assert!(matches!(result, Err(StoreError::DuplicateEmail)));

        repo.delete(user.id).await.unwrap();
    }

    #[tokio::test]
    #[ignore = "requires running PostgreSQL database"]
    async fn test_concurrent_create_same_email() {
        let repo = create_test_repo().await;
        let email = unique_email("race");

        let (a, b) = tokio::join!(repo.create(new_user(&email)), repo.create(new_user(&email)));

        let created: Vec<User> = [a, b].into_iter().filter_map(Result::ok).collect();
        assert_eq!(created.len(), 1);

        repo.delete(created[0].id).await.unwrap();
    }

    #[tokio::test]
    #[ignore = "requires running PostgreSQL database"]
    async fn test_authenticate() {
        let repo = create_test_repo().await;
        let email = unique_email("auth");
        let created = repo.create(new_user(&email)).await.unwrap();

        let ok = repo.authenticate(&email, "p1").await.unwrap();
        assert_eq!(ok.unwrap().id, created.id);
        assert!(repo.authenticate(&email, "wrong").await.unwrap().is_none());

        repo.delete(created.id).await.unwrap();
    }

    #[tokio::test]
    #[ignore = "requires running PostgreSQL database"]
    async fn test_update_name_only_and_clear_image() {
        let repo = create_test_repo().await;
        let email = unique_email("update");
        let created = repo
            .create(NewUser {
                profile_image_url: Some("/uploads/a.png".to_string()),
                ..new_user(&email)
            })
            .await
            .unwrap();

        let renamed = repo
            .update(
                created.id,
                UserChanges {
                    name: Some("X".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(renamed.name, "X");
        assert_eq!(renamed.email, created.email);
        assert_eq!(renamed.password_hash, created.password_hash);
        assert_eq!(renamed.profile_image_url, created.profile_image_url);

        let cleared = repo
            .update(
                created.id,
                UserChanges {
                    profile_image_url: Some(None),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(cleared.profile_image_url.is_none());

        repo.delete(created.id).await.unwrap();
    }

    #[tokio::test]
    #[ignore = "requires running PostgreSQL database"]
    async fn test_update_missing_user() {
        let repo = create_test_repo().await;

        let result = repo.update(Uuid::new_v4(), UserChanges::default()).await;
        assert!(matches!(result, Err(StoreError::NotFound)));
    }
}
