use std::str::FromStr;

use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous},
};

/// Open the database and bring the schema up to date.
pub async fn connect(url: &str) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(url)?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal);
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;
    sqlx::migrate!().run(&pool).await?;
    Ok(pool)
}

#[cfg(test)]
pub(crate) mod testing {
    use sqlx::SqlitePool;
    use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

    use crate::utils::now_utc;

    /// A private in-memory database; one connection so every query sees the same data.
    pub async fn memory_pool() -> SqlitePool {
        let options = SqliteConnectOptions::new()
            .in_memory(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .unwrap();
        sqlx::migrate!().run(&pool).await.unwrap();
        pool
    }

    /// Insert a user without paying for a password hash.
    pub async fn seed_user(db: &SqlitePool, name: &str) -> i64 {
        sqlx::query(
            "insert into user (name, email, password, created_at) values (?, ?, 'x', ?)",
        )
        .bind(name)
        .bind(format!("{name}@example.com"))
        .bind(now_utc())
        .execute(db)
        .await
        .unwrap()
        .last_insert_rowid()
    }
}
