use sqlx::SqlitePool;
use tracing::info;

use super::{Attachment, ParentKind, parent::owned_parent};
use crate::{
    error::{Error, Result},
    utils::now_utc,
};

/// File name shown for an attachment: the last path segment of its url.
fn name_from_url(url: &str) -> &str {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|name| !name.is_empty())
        .unwrap_or(url)
}

/// Attach a resource to a course the caller owns. Books take no attachments.
pub async fn create_attachment(
    database: &SqlitePool,
    owner_id: i64,
    kind: ParentKind,
    parent_id: i64,
    url: String,
) -> Result<Attachment> {
    owned_parent(database, owner_id, kind, parent_id).await?;
    if kind != ParentKind::Course {
        return Err(Error::Validation(
            "attachments are only supported on courses".to_string(),
        ));
    }
    let url = url.trim();
    if url.is_empty() {
        return Err(Error::Validation("url is required".to_string()));
    }
    let now = now_utc();
    let attachment = sqlx::query_as::<_, Attachment>(
        "insert into attachment (parent_id, name, url, created_at, updated_at) values (?, ?, ?, ?, ?) returning *",
    )
    .bind(parent_id)
    .bind(name_from_url(url))
    .bind(url)
    .bind(now)
    .bind(now)
    .fetch_one(database)
    .await?;
    info!("attachment {} added to course {}", attachment.id, parent_id);
    Ok(attachment)
}

pub async fn delete_attachment(
    database: &SqlitePool,
    owner_id: i64,
    kind: ParentKind,
    parent_id: i64,
    attachment_id: i64,
) -> Result<Attachment> {
    owned_parent(database, owner_id, kind, parent_id).await?;
    sqlx::query_as::<_, Attachment>(
        "delete from attachment where id = ? and parent_id = ? returning *",
    )
    .bind(attachment_id)
    .bind(parent_id)
    .fetch_optional(database)
    .await?
    .ok_or(Error::NotFound("attachment"))
}

pub async fn list_attachments(database: &SqlitePool, parent_id: i64) -> Result<Vec<Attachment>> {
    let attachments = sqlx::query_as::<_, Attachment>(
        "select * from attachment where parent_id = ? order by created_at desc, id desc",
    )
    .bind(parent_id)
    .fetch_all(database)
    .await?;
    Ok(attachments)
}
