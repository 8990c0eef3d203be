use sqlx::SqlitePool;

use super::Category;
use crate::error::{Error, Result};

/// All categories, by name.
pub async fn list_categories(database: &SqlitePool) -> Result<Vec<Category>> {
    let categories = sqlx::query_as::<_, Category>("select * from category order by name")
        .fetch_all(database)
        .await?;
    Ok(categories)
}

pub async fn get_category(database: &SqlitePool, category_id: i64) -> Result<Category> {
    sqlx::query_as::<_, Category>("select * from category where id = ?")
        .bind(category_id)
        .fetch_optional(database)
        .await?
        .ok_or(Error::NotFound("category"))
}
