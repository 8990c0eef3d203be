pub mod attachment;
pub mod category;
pub mod parent;
pub mod quiz;
pub mod unit;

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Row, sqlite::SqliteRow};
use time::OffsetDateTime;
use utoipa::ToSchema;

use quiz::Quiz;

/// Courses and books share one structure; the kind only changes publish rules and quiz support.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema,
)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum ParentKind {
    #[serde(alias = "courses")]
    Course,
    #[serde(alias = "books")]
    Book,
}

impl ParentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParentKind::Course => "course",
            ParentKind::Book => "book",
        }
    }
}

#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Parent {
    pub id: i64,
    pub kind: ParentKind,
    pub owner_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub price: Option<f64>,
    pub category_id: Option<i64>,
    pub is_published: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// A course or book chapter.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Unit {
    pub id: i64,
    pub parent_id: i64,
    pub title: String,
    pub body: String,
    pub video_url: Option<String>,
    pub position: i64,
    pub is_published: bool,
    pub is_free_preview: bool,
    pub quiz: Quiz,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl FromRow<'_, SqliteRow> for Unit {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        let quiz: Option<String> = row.try_get("quiz")?;
        let id: i64 = row.try_get("id")?;
        Ok(Self {
            id,
            parent_id: row.try_get("parent_id")?,
            title: row.try_get("title")?,
            body: row.try_get("body")?,
            video_url: row.try_get("video_url")?,
            position: row.try_get("position")?,
            is_published: row.try_get("is_published")?,
            is_free_preview: row.try_get("is_free_preview")?,
            quiz: Quiz::parse_stored(id, quiz.as_deref()),
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow, ToSchema)]
pub struct Category {
    pub id: i64,
    pub name: String,
}

/// A downloadable resource of a course, visible to purchasers only.
#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub id: i64,
    pub parent_id: i64,
    pub name: String,
    pub url: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Purchase {
    pub id: i64,
    pub user_id: i64,
    pub parent_id: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    pub id: i64,
    pub user_id: i64,
    pub unit_id: i64,
    pub is_completed: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}
