use serde::Deserialize;
use serde_json::Value;
use sqlx::SqlitePool;
use tracing::info;
use utoipa::ToSchema;

use super::{
    ParentKind, Unit,
    parent::{owned_parent, unpublish_if_empty},
    quiz::{Quiz, QuizQuestion},
};
use crate::{
    error::{Error, Result},
    utils::{is_filled, now_utc},
};

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UnitPatch {
    pub title: Option<String>,
    pub body: Option<String>,
    pub video_url: Option<String>,
    pub is_free_preview: Option<bool>,
    /// Quiz questions, book chapters only. `null` or `[]` removes the quiz.
    #[serde(default, deserialize_with = "present")]
    #[schema(value_type = Option<Vec<QuizQuestion>>)]
    pub quiz: Option<Value>,
}

/// Keep an explicit `null` distinguishable from an absent field.
fn present<'de, D: serde::Deserializer<'de>>(de: D) -> Result<Option<Value>, D::Error> {
    Value::deserialize(de).map(Some)
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UnitPosition {
    pub id: i64,
    pub position: i64,
}

async fn unit_in_parent(database: &SqlitePool, parent_id: i64, unit_id: i64) -> Result<Unit> {
    sqlx::query_as::<_, Unit>("select * from unit where id = ? and parent_id = ?")
        .bind(unit_id)
        .bind(parent_id)
        .fetch_optional(database)
        .await?
        .ok_or(Error::NotFound("chapter"))
}

/// Append a chapter after the current last position.
pub async fn create_unit(
    database: &SqlitePool,
    owner_id: i64,
    kind: ParentKind,
    parent_id: i64,
    title: String,
) -> Result<Unit> {
    owned_parent(database, owner_id, kind, parent_id).await?;
    if title.trim().is_empty() {
        return Err(Error::Validation("title is required".to_string()));
    }
    let mut tx = database.begin().await?;
    let last = sqlx::query_scalar::<_, Option<i64>>(
        "select max(position) from unit where parent_id = ?",
    )
    .bind(parent_id)
    .fetch_one(&mut *tx)
    .await?;
    let position = last.map_or(1, |p| p + 1);
    let now = now_utc();
    let unit = sqlx::query_as::<_, Unit>(
        r#"
        insert into unit (parent_id, title, body, position, is_published, is_free_preview, created_at, updated_at)
        values (?, ?, '', ?, 0, 0, ?, ?)
        returning *
        "#,
    )
    .bind(parent_id)
    .bind(title)
    .bind(position)
    .bind(now)
    .bind(now)
    .fetch_one(&mut *tx)
    .await?;
    tx.commit().await?;
    info!("chapter {} created in {} {}", unit.id, kind.as_str(), parent_id);
    Ok(unit)
}

pub async fn update_unit(
    database: &SqlitePool,
    owner_id: i64,
    kind: ParentKind,
    parent_id: i64,
    unit_id: i64,
    patch: UnitPatch,
) -> Result<Unit> {
    owned_parent(database, owner_id, kind, parent_id).await?;
    unit_in_parent(database, parent_id, unit_id).await?;
    if patch.title.as_deref().is_some_and(|t| t.trim().is_empty()) {
        return Err(Error::Validation("title cannot be empty".to_string()));
    }
    let quiz = match patch.quiz {
        Some(_) if kind != ParentKind::Book => {
            return Err(Error::Validation(
                "quizzes are only supported on book chapters".to_string(),
            ));
        }
        Some(value) => Some(Quiz::from_value(value)?.to_stored()?),
        None => None,
    };
    let unit = sqlx::query_as::<_, Unit>(
        r#"
        update unit set
            title = coalesce(?, title),
            body = coalesce(?, body),
            video_url = coalesce(?, video_url),
            is_free_preview = coalesce(?, is_free_preview),
            quiz = case when ? then ? else quiz end,
            updated_at = ?
        where id = ? and parent_id = ?
        returning *
        "#,
    )
    .bind(patch.title)
    .bind(patch.body)
    .bind(patch.video_url)
    .bind(patch.is_free_preview)
    .bind(quiz.is_some())
    .bind(quiz.flatten())
    .bind(now_utc())
    .bind(unit_id)
    .bind(parent_id)
    .fetch_one(database)
    .await?;
    Ok(unit)
}

/// Delete a chapter. The parent is unpublished when it has no published chapter left.
pub async fn delete_unit(
    database: &SqlitePool,
    owner_id: i64,
    kind: ParentKind,
    parent_id: i64,
    unit_id: i64,
) -> Result<Unit> {
    owned_parent(database, owner_id, kind, parent_id).await?;
    let unit = unit_in_parent(database, parent_id, unit_id).await?;
    let mut tx = database.begin().await?;
    sqlx::query("delete from unit where id = ?")
        .bind(unit_id)
        .execute(&mut *tx)
        .await?;
    unpublish_if_empty(&mut tx, parent_id).await?;
    tx.commit().await?;
    info!("chapter {} deleted from {} {}", unit_id, kind.as_str(), parent_id);
    Ok(unit)
}

pub async fn publish_unit(
    database: &SqlitePool,
    owner_id: i64,
    kind: ParentKind,
    parent_id: i64,
    unit_id: i64,
) -> Result<Unit> {
    owned_parent(database, owner_id, kind, parent_id).await?;
    let unit = unit_in_parent(database, parent_id, unit_id).await?;
    let video_ok = kind != ParentKind::Course || is_filled(unit.video_url.as_deref());
    if !is_filled(Some(unit.title.as_str())) || !is_filled(Some(unit.body.as_str())) || !video_ok {
        return Err(Error::Validation("Missing required fields".to_string()));
    }
    let unit = sqlx::query_as::<_, Unit>(
        "update unit set is_published = 1, updated_at = ? where id = ? returning *",
    )
    .bind(now_utc())
    .bind(unit_id)
    .fetch_one(database)
    .await?;
    Ok(unit)
}

/// Unpublish a chapter. The parent is unpublished when it has no published chapter left.
pub async fn unpublish_unit(
    database: &SqlitePool,
    owner_id: i64,
    kind: ParentKind,
    parent_id: i64,
    unit_id: i64,
) -> Result<Unit> {
    owned_parent(database, owner_id, kind, parent_id).await?;
    unit_in_parent(database, parent_id, unit_id).await?;
    let mut tx = database.begin().await?;
    let unit = sqlx::query_as::<_, Unit>(
        "update unit set is_published = 0, updated_at = ? where id = ? returning *",
    )
    .bind(now_utc())
    .bind(unit_id)
    .fetch_one(&mut *tx)
    .await?;
    unpublish_if_empty(&mut tx, parent_id).await?;
    tx.commit().await?;
    Ok(unit)
}

/// Move chapters to new positions in one transaction.
pub async fn reorder_units(
    database: &SqlitePool,
    owner_id: i64,
    kind: ParentKind,
    parent_id: i64,
    list: Vec<UnitPosition>,
) -> Result<()> {
    owned_parent(database, owner_id, kind, parent_id).await?;
    if list.iter().any(|u| u.position < 1) {
        return Err(Error::Validation("positions start at 1".to_string()));
    }
    let mut tx = database.begin().await?;
    // park the moved chapters on negative positions first, (parent_id, position) is unique
    for item in &list {
        let parked = sqlx::query("update unit set position = ? where id = ? and parent_id = ?")
            .bind(-item.id)
            .bind(item.id)
            .bind(parent_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if parked == 0 {
            return Err(Error::NotFound("chapter"));
        }
    }
    let now = now_utc();
    for item in &list {
        sqlx::query("update unit set position = ?, updated_at = ? where id = ?")
            .bind(item.position)
            .bind(now)
            .bind(item.id)
            .execute(&mut *tx)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(db) if db.is_unique_violation() => {
                    Error::Validation(format!("position {} is already taken", item.position))
                }
                e => Error::Persistence(e),
            })?;
    }
    tx.commit().await?;
    Ok(())
}

/// Published chapters of a parent in reading order.
pub async fn list_published_units(database: &SqlitePool, parent_id: i64) -> Result<Vec<Unit>> {
    let units = sqlx::query_as::<_, Unit>(
        "select * from unit where parent_id = ? and is_published = 1 order by position asc",
    )
    .bind(parent_id)
    .fetch_all(database)
    .await?;
    Ok(units)
}
