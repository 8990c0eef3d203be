use argon2::{
    Argon2, PasswordVerifier,
    password_hash::{PasswordHash, PasswordHasher, SaltString, rand_core::OsRng},
};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use utoipa::ToSchema;

use crate::{
    error::{Error, Result},
    utils::now_utc,
};

#[derive(Debug, Serialize, Deserialize, FromRow, ToSchema)]
pub struct UserInfo {
    pub id: i64,
    pub name: String,
    pub email: String,
}

pub async fn create_user(
    database: &SqlitePool,
    name: String,
    email: String,
    password: String,
) -> Result<i64> {
    if name.trim().is_empty() || !email.contains('@') || password.len() < 8 {
        return Err(Error::Validation(
            "name, a valid email and a password of at least 8 characters are required".to_string(),
        ));
    }
    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))?
        .to_string();
    let user = sqlx::query(
        "insert into user (name, email, password, created_at) values (?, ?, ?, ?)",
    )
    .bind(name)
    .bind(email)
    .bind(password_hash)
    .bind(now_utc())
    .execute(database)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            Error::Validation("email already registered".to_string())
        }
        e => Error::Persistence(e),
    })?;
    Ok(user.last_insert_rowid())
}

/// Check the credentials and return the user id. Unknown email and wrong password look the same.
pub async fn login(database: &SqlitePool, email: String, password: String) -> Result<i64> {
    let user: Option<(i64, String)> =
        sqlx::query_as("select id, password from user where email = ?")
            .bind(email)
            .fetch_optional(database)
            .await?;
    let Some((id, hash)) = user else {
        return Err(Error::Unauthorized);
    };
    let parsed_hash = PasswordHash::new(&hash)
        .map_err(|e| anyhow::anyhow!("Failed to parse password hash: {}", e))?;
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .map_err(|_| Error::Unauthorized)?;
    Ok(id)
}

pub async fn get_user_info(database: &SqlitePool, id: i64) -> Result<UserInfo> {
    sqlx::query_as::<_, UserInfo>("select id, name, email from user where id = ?")
        .bind(id)
        .fetch_optional(database)
        .await?
        .ok_or(Error::NotFound("user"))
}
