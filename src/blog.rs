use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool, types::Json};
use time::OffsetDateTime;
use tracing::info;
use utoipa::ToSchema;

use crate::{
    error::{Error, Result},
    utils::{is_filled, now_utc},
};

#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Blog {
    pub id: i64,
    pub owner_id: i64,
    pub title: String,
    pub content: String,
    pub image_url: Option<String>,
    #[sqlx(json)]
    pub tags: Vec<String>,
    pub is_published: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BlogPatch {
    pub title: Option<String>,
    pub content: Option<String>,
    pub image_url: Option<String>,
    pub tags: Option<Vec<String>>,
}

pub async fn get_blog(database: &SqlitePool, owner_id: i64, blog_id: i64) -> Result<Blog> {
    sqlx::query_as::<_, Blog>("select * from blog where id = ? and owner_id = ?")
        .bind(blog_id)
        .bind(owner_id)
        .fetch_optional(database)
        .await?
        .ok_or(Error::NotFound("blog"))
}

/// A published post, readable by anyone.
pub async fn get_published_blog(database: &SqlitePool, blog_id: i64) -> Result<Blog> {
    sqlx::query_as::<_, Blog>("select * from blog where id = ? and is_published = 1")
        .bind(blog_id)
        .fetch_optional(database)
        .await?
        .ok_or(Error::NotFound("blog"))
}

pub async fn create_blog(database: &SqlitePool, owner_id: i64, title: String) -> Result<Blog> {
    if title.trim().is_empty() {
        return Err(Error::Validation("title is required".to_string()));
    }
    let now = now_utc();
    let blog = sqlx::query_as::<_, Blog>(
        "insert into blog (owner_id, title, created_at, updated_at) values (?, ?, ?, ?) returning *",
    )
    .bind(owner_id)
    .bind(title)
    .bind(now)
    .bind(now)
    .fetch_one(database)
    .await?;
    info!("blog {} created by user {}", blog.id, owner_id);
    Ok(blog)
}

pub async fn update_blog(
    database: &SqlitePool,
    owner_id: i64,
    blog_id: i64,
    patch: BlogPatch,
) -> Result<Blog> {
    if patch.title.as_deref().is_some_and(|t| t.trim().is_empty()) {
        return Err(Error::Validation("title cannot be empty".to_string()));
    }
    let tags = patch.tags.map(|tags| {
        Json(
            tags.into_iter()
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect::<Vec<_>>(),
        )
    });
    sqlx::query_as::<_, Blog>(
        r#"
        update blog set
            title = coalesce(?, title),
            content = coalesce(?, content),
            image_url = coalesce(?, image_url),
            tags = coalesce(?, tags),
            updated_at = ?
        where id = ? and owner_id = ?
        returning *
        "#,
    )
    .bind(patch.title)
    .bind(patch.content)
    .bind(patch.image_url)
    .bind(tags)
    .bind(now_utc())
    .bind(blog_id)
    .bind(owner_id)
    .fetch_optional(database)
    .await?
    .ok_or(Error::NotFound("blog"))
}

pub async fn delete_blog(database: &SqlitePool, owner_id: i64, blog_id: i64) -> Result<Blog> {
    let blog = get_blog(database, owner_id, blog_id).await?;
    sqlx::query("delete from blog where id = ?")
        .bind(blog_id)
        .execute(database)
        .await?;
    Ok(blog)
}

pub async fn publish_blog(database: &SqlitePool, owner_id: i64, blog_id: i64) -> Result<Blog> {
    let blog = get_blog(database, owner_id, blog_id).await?;
    if !is_filled(Some(blog.title.as_str()))
        || !is_filled(Some(blog.content.as_str()))
        || !is_filled(blog.image_url.as_deref())
    {
        return Err(Error::Validation("Missing required fields".to_string()));
    }
    set_published(database, blog_id, true).await
}

pub async fn unpublish_blog(database: &SqlitePool, owner_id: i64, blog_id: i64) -> Result<Blog> {
    get_blog(database, owner_id, blog_id).await?;
    set_published(database, blog_id, false).await
}

async fn set_published(database: &SqlitePool, blog_id: i64, published: bool) -> Result<Blog> {
    let blog = sqlx::query_as::<_, Blog>(
        "update blog set is_published = ?, updated_at = ? where id = ? returning *",
    )
    .bind(published)
    .bind(now_utc())
    .bind(blog_id)
    .fetch_one(database)
    .await?;
    Ok(blog)
}

/// Published posts, newest first, optionally filtered by title.
pub async fn list_published_blogs(database: &SqlitePool, title: Option<&str>) -> Result<Vec<Blog>> {
    let blogs = sqlx::query_as::<_, Blog>(
        r#"
        select * from blog
        where is_published = 1 and (?1 is null or title like '%' || ?1 || '%')
        order by created_at desc, id desc
        "#,
    )
    .bind(title.filter(|t| !t.trim().is_empty()))
    .fetch_all(database)
    .await?;
    Ok(blogs)
}
