use sqlx::SqlitePool;
use tokio::task;
use tracing::info;

use crate::AppResult;

use super::AuthError;

/// bcrypt work factor used for new password hashes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashCost(pub u32);

impl Default for HashCost {
    fn default() -> Self {
        Self(bcrypt::DEFAULT_COST)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Login {
    Created,
    Existing,
}

pub async fn migrate(db_pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query("CREATE TABLE IF NOT EXISTS users (name TEXT PRIMARY KEY, hash TEXT NOT NULL)")
        .execute(db_pool)
        .await?;
    Ok(())
}

/// Creates the user on first sight, otherwise checks the password.
pub async fn login_or_register(db_pool: &SqlitePool, cost: HashCost, name: &str, password: &str) -> AppResult<Login> {
    let hash = match stored_hash(db_pool, name).await? {
        Some(hash) => hash,
        None => {
            let hash = hash_password(password, cost).await?;
            let created = sqlx::query("INSERT OR IGNORE INTO users (name,hash) VALUES (?,?)")
                .bind(name)
                .bind(&hash)
                .execute(db_pool)
                .await?
                .rows_affected()
                > 0;
            if created {
                info!(user = name, "registered new user");
                return Ok(Login::Created);
            }

            // a concurrent login registered the name first
            let (hash,): (String,) = sqlx::query_as("SELECT hash FROM users WHERE name=?")
                .bind(name)
                .fetch_one(db_pool)
                .await?;
            hash
        }
    };

    if !verify_password(password, hash).await? {
        return Err(AuthError::InvalidPassword.into());
    }
    Ok(Login::Existing)
}

async fn stored_hash(db_pool: &SqlitePool, name: &str) -> Result<Option<String>, sqlx::Error> {
    let row: Option<(String,)> = sqlx::query_as("SELECT hash FROM users WHERE name=?")
        .bind(name)
        .fetch_optional(db_pool)
        .await?;
    Ok(row.map(|(hash,)| hash))
}

// hashing blocks for a while, run it on the blocking pool
async fn hash_password(password: &str, HashCost(cost): HashCost) -> anyhow::Result<String> {
    let password = password.to_owned();
    Ok(task::spawn_blocking(move || bcrypt::hash(password, cost)).await??)
}

async fn verify_password(password: &str, hash: String) -> anyhow::Result<bool> {
    let password = password.to_owned();
    Ok(task::spawn_blocking(move || bcrypt::verify(password, &hash)).await??)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AppError;
    use sqlx::sqlite::SqlitePoolOptions;

    const CHEAP: HashCost = HashCost(4);

    async fn pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        migrate(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn first_login_registers() {
        let pool = pool().await;
        assert_eq!(login_or_register(&pool, CHEAP, "alice", "pw").await.unwrap(), Login::Created);
        assert_eq!(login_or_register(&pool, CHEAP, "alice", "pw").await.unwrap(), Login::Existing);
    }

    #[tokio::test]
    async fn wrong_password_is_refused() {
        let pool = pool().await;
        login_or_register(&pool, CHEAP, "alice", "pw").await.unwrap();
        let err = login_or_register(&pool, CHEAP, "alice", "nope").await.unwrap_err();
        assert!(matches!(err, AppError::Auth(AuthError::InvalidPassword)));
    }

    #[tokio::test]
    async fn hashes_are_salted_bcrypt() {
        let pool = pool().await;
        login_or_register(&pool, CHEAP, "alice", "same").await.unwrap();
        login_or_register(&pool, CHEAP, "bob", "same").await.unwrap();
        let hashes: Vec<(String,)> = sqlx::query_as("SELECT hash FROM users")
            .fetch_all(&pool)
            .await
            .unwrap();
        assert_eq!(hashes.len(), 2);
        assert_ne!(hashes[0], hashes[1]);
        assert!(hashes.iter().all(|(hash,)| hash.starts_with("$2") && !hash.contains("same")));
    }

    #[tokio::test]
    async fn verify_checks_the_password() {
        let hash = hash_password("pw", CHEAP).await.unwrap();
        assert!(verify_password("pw", hash.clone()).await.unwrap());
        assert!(!verify_password("px", hash).await.unwrap());
    }

    #[tokio::test]
    async fn corrupt_stored_hash_is_an_internal_error() {
        let pool = pool().await;
        sqlx::query("INSERT INTO users (name,hash) VALUES ('alice','not-a-hash')")
            .execute(&pool)
            .await
            .unwrap();
        let err = login_or_register(&pool, CHEAP, "alice", "pw").await.unwrap_err();
        assert!(matches!(err, AppError::Internal(_)));
    }
}
