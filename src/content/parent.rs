use serde::{Deserialize, Serialize};
use sqlx::{Sqlite, SqlitePool, Transaction};
use tracing::info;
use utoipa::ToSchema;

use super::{Category, Parent, ParentKind, category::{get_category, list_categories}};
use crate::{
    access,
    error::{Error, Result},
    utils::{is_filled, now_utc},
};

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ParentPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub price: Option<f64>,
    pub category_id: Option<i64>,
}

/// Catalog search: title substring and category.
#[derive(Debug, Default, Clone, Copy)]
pub struct CatalogFilter<'a> {
    pub title: Option<&'a str>,
    pub category_id: Option<i64>,
}

/// A published parent as shown in the catalog.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    #[serde(flatten)]
    pub parent: Parent,
    pub category: Option<Category>,
    pub published_units: i64,
    /// Completion percentage, only present when the viewer owns a purchase
    pub progress: Option<f64>,
}

/// Fetch a parent the caller owns. Parents of another owner are reported as not found.
pub async fn owned_parent(
    database: &SqlitePool,
    owner_id: i64,
    kind: ParentKind,
    parent_id: i64,
) -> Result<Parent> {
    sqlx::query_as::<_, Parent>("select * from parent where id = ? and kind = ? and owner_id = ?")
        .bind(parent_id)
        .bind(kind)
        .bind(owner_id)
        .fetch_optional(database)
        .await?
        .ok_or(Error::NotFound(kind.as_str()))
}

pub async fn create_parent(
    database: &SqlitePool,
    owner_id: i64,
    kind: ParentKind,
    title: String,
) -> Result<Parent> {
    if title.trim().is_empty() {
        return Err(Error::Validation("title is required".to_string()));
    }
    let now = now_utc();
    let parent = sqlx::query_as::<_, Parent>(
        "insert into parent (kind, owner_id, title, is_published, created_at, updated_at) values (?, ?, ?, 0, ?, ?) returning *",
    )
    .bind(kind)
    .bind(owner_id)
    .bind(title)
    .bind(now)
    .bind(now)
    .fetch_one(database)
    .await?;
    info!("{} {} created by user {}", kind.as_str(), parent.id, owner_id);
    Ok(parent)
}

pub async fn update_parent(
    database: &SqlitePool,
    owner_id: i64,
    kind: ParentKind,
    parent_id: i64,
    patch: ParentPatch,
) -> Result<Parent> {
    if patch.title.as_deref().is_some_and(|t| t.trim().is_empty()) {
        return Err(Error::Validation("title cannot be empty".to_string()));
    }
    if patch.price.is_some_and(|p| p < 0.0 || !p.is_finite()) {
        return Err(Error::Validation("price must be a non-negative number".to_string()));
    }
    if let Some(category_id) = patch.category_id {
        get_category(database, category_id)
            .await
            .map_err(|e| match e {
                Error::NotFound(_) => Error::Validation(format!("unknown category {category_id}")),
                e => e,
            })?;
    }
    sqlx::query_as::<_, Parent>(
        r#"
        update parent set
            title = coalesce(?, title),
            description = coalesce(?, description),
            image_url = coalesce(?, image_url),
            price = coalesce(?, price),
            category_id = coalesce(?, category_id),
            updated_at = ?
        where id = ? and kind = ? and owner_id = ?
        returning *
        "#,
    )
    .bind(patch.title)
    .bind(patch.description)
    .bind(patch.image_url)
    .bind(patch.price)
    .bind(patch.category_id)
    .bind(now_utc())
    .bind(parent_id)
    .bind(kind)
    .bind(owner_id)
    .fetch_optional(database)
    .await?
    .ok_or(Error::NotFound(kind.as_str()))
}

/// Delete a parent together with its units, purchases and progress.
pub async fn delete_parent(
    database: &SqlitePool,
    owner_id: i64,
    kind: ParentKind,
    parent_id: i64,
) -> Result<Parent> {
    let parent = owned_parent(database, owner_id, kind, parent_id).await?;
    sqlx::query("delete from parent where id = ?")
        .bind(parent_id)
        .execute(database)
        .await?;
    info!("{} {} deleted by user {}", kind.as_str(), parent_id, owner_id);
    Ok(parent)
}

pub async fn publish_parent(
    database: &SqlitePool,
    owner_id: i64,
    kind: ParentKind,
    parent_id: i64,
) -> Result<Parent> {
    let parent = owned_parent(database, owner_id, kind, parent_id).await?;
    let published_units = count_published_units(database, parent_id).await?;
    if !is_filled(Some(parent.title.as_str()))
        || !is_filled(parent.description.as_deref())
        || !is_filled(parent.image_url.as_deref())
        || parent.price.is_none()
        || published_units == 0
    {
        return Err(Error::Validation("Missing required fields".to_string()));
    }
    set_published(database, parent_id, true).await
}

pub async fn unpublish_parent(
    database: &SqlitePool,
    owner_id: i64,
    kind: ParentKind,
    parent_id: i64,
) -> Result<Parent> {
    owned_parent(database, owner_id, kind, parent_id).await?;
    set_published(database, parent_id, false).await
}

async fn set_published(database: &SqlitePool, parent_id: i64, published: bool) -> Result<Parent> {
    let parent = sqlx::query_as::<_, Parent>(
        "update parent set is_published = ?, updated_at = ? where id = ? returning *",
    )
    .bind(published)
    .bind(now_utc())
    .bind(parent_id)
    .fetch_one(database)
    .await?;
    Ok(parent)
}

pub async fn count_published_units(database: &SqlitePool, parent_id: i64) -> Result<i64> {
    let count = sqlx::query_scalar::<_, i64>(
        "select count(*) from unit where parent_id = ? and is_published = 1",
    )
    .bind(parent_id)
    .fetch_one(database)
    .await?;
    Ok(count)
}

/// Unpublish the parent when none of its units is published any more.
pub(crate) async fn unpublish_if_empty(
    tx: &mut Transaction<'_, Sqlite>,
    parent_id: i64,
) -> Result<bool> {
    let remaining = sqlx::query_scalar::<_, i64>(
        "select count(*) from unit where parent_id = ? and is_published = 1",
    )
    .bind(parent_id)
    .fetch_one(&mut **tx)
    .await?;
    if remaining > 0 {
        return Ok(false);
    }
    let changed = sqlx::query(
        "update parent set is_published = 0, updated_at = ? where id = ? and is_published = 1",
    )
    .bind(now_utc())
    .bind(parent_id)
    .execute(&mut **tx)
    .await?
    .rows_affected();
    if changed > 0 {
        info!("parent {parent_id} has no published chapters left, unpublished");
    }
    Ok(changed > 0)
}

/// Published parents of one kind, newest first, filtered by title and category.
/// Progress is filled in only for parents the viewer purchased.
pub async fn list_published(
    database: &SqlitePool,
    kind: ParentKind,
    filter: CatalogFilter<'_>,
    viewer: Option<i64>,
) -> Result<Vec<CatalogEntry>> {
    let parents = sqlx::query_as::<_, Parent>(
        r#"
        select * from parent
        where kind = ?1 and is_published = 1
            and (?2 is null or title like '%' || ?2 || '%')
            and (?3 is null or category_id = ?3)
        order by created_at desc, id desc
        "#,
    )
    .bind(kind)
    .bind(filter.title.filter(|t| !t.trim().is_empty()))
    .bind(filter.category_id)
    .fetch_all(database)
    .await?;
    let categories = list_categories(database).await?;
    let mut entries = Vec::with_capacity(parents.len());
    for parent in parents {
        let category = categories
            .iter()
            .find(|c| Some(c.id) == parent.category_id)
            .cloned();
        let published_units = count_published_units(database, parent.id).await?;
        let mut progress = None;
        if let Some(user_id) = viewer {
            if access::has_purchase(database, user_id, parent.id).await? {
                progress =
                    Some(access::compute_progress_percentage(database, user_id, parent.id).await);
            }
        }
        entries.push(CatalogEntry {
            parent,
            category,
            published_units,
            progress,
        });
    }
    Ok(entries)
}
