//! Access and progress state of a learner: lock state, completion, next chapter.
//!
//! Read paths here never fail. Any lookup error is logged and turned into the safe
//! default: locked, zero progress, empty lists.

use serde::Serialize;
use sqlx::SqlitePool;
use tracing::{error, info, warn};
use utoipa::ToSchema;

use crate::{
    content::{
        Attachment, Parent, ParentKind, Progress, Purchase, Unit, attachment::list_attachments,
        unit::list_published_units,
    },
    error::{Error, Result},
    utils::now_utc,
};

/// Everything needed to render one chapter for one learner.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UnitAccess {
    pub unit: Option<Unit>,
    pub parent: Option<Parent>,
    pub purchase: Option<Purchase>,
    pub progress: Option<Progress>,
    pub is_locked: bool,
    pub next_unit: Option<Unit>,
    /// Course resources, empty unless purchased
    pub attachments: Vec<Attachment>,
}

impl UnitAccess {
    /// The fail-closed result: nothing visible, locked.
    pub fn denied() -> Self {
        Self {
            unit: None,
            parent: None,
            purchase: None,
            progress: None,
            is_locked: true,
            next_unit: None,
            attachments: vec![],
        }
    }

    pub fn is_found(&self) -> bool {
        self.unit.is_some() && self.parent.is_some()
    }
}

/// Navigation entry of a parent outline.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OutlineEntry {
    pub id: i64,
    pub title: String,
    pub position: i64,
    pub is_free_preview: bool,
    pub is_locked: bool,
    pub is_completed: bool,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ParentOutline {
    pub parent: Option<Parent>,
    pub units: Vec<OutlineEntry>,
    pub progress: f64,
    pub is_purchased: bool,
}

/// Resolve lock state, progress and next chapter of `unit_id` for `user_id`.
pub async fn resolve_unit_access(
    database: &SqlitePool,
    user_id: i64,
    kind: ParentKind,
    parent_id: i64,
    unit_id: i64,
) -> UnitAccess {
    if user_id <= 0 || parent_id <= 0 || unit_id <= 0 {
        return UnitAccess::denied();
    }
    match try_resolve_unit_access(database, user_id, kind, parent_id, unit_id).await {
        Ok(access) => access,
        Err(Error::NotFound(what)) => {
            info!("unit access: {what} not found (parent {parent_id}, unit {unit_id})");
            UnitAccess::denied()
        }
        Err(e) => {
            error!("unit access failed for user {user_id}, unit {unit_id}: {e}");
            UnitAccess::denied()
        }
    }
}

async fn try_resolve_unit_access(
    database: &SqlitePool,
    user_id: i64,
    kind: ParentKind,
    parent_id: i64,
    unit_id: i64,
) -> Result<UnitAccess> {
    let purchase = find_purchase(database, user_id, parent_id).await?;
    let parent = sqlx::query_as::<_, Parent>("select * from parent where id = ? and kind = ?")
        .bind(parent_id)
        .bind(kind)
        .fetch_optional(database)
        .await?;
    let unit = sqlx::query_as::<_, Unit>(
        "select * from unit where id = ? and parent_id = ? and is_published = 1",
    )
    .bind(unit_id)
    .bind(parent_id)
    .fetch_optional(database)
    .await?;
    let progress = find_progress(database, user_id, unit_id).await?;

    let (Some(parent), Some(unit)) = (parent, unit) else {
        return Err(Error::NotFound("chapter"));
    };
    let next_unit = find_next_unit(database, parent_id, unit.position).await?;
    let is_locked = !unit.is_free_preview && purchase.is_none();
    let attachments = match purchase {
        Some(_) => list_attachments(database, parent_id).await?,
        None => vec![],
    };
    Ok(UnitAccess {
        unit: Some(unit),
        parent: Some(parent),
        purchase,
        progress,
        is_locked,
        next_unit,
        attachments,
    })
}

/// The published chapter with the smallest position after `position`.
pub async fn find_next_unit(
    database: &SqlitePool,
    parent_id: i64,
    position: i64,
) -> Result<Option<Unit>> {
    let next = sqlx::query_as::<_, Unit>(
        r#"
        select * from unit
        where parent_id = ? and is_published = 1 and position > ?
        order by position asc
        limit 1
        "#,
    )
    .bind(parent_id)
    .bind(position)
    .fetch_optional(database)
    .await?;
    Ok(next)
}

pub async fn find_purchase(
    database: &SqlitePool,
    user_id: i64,
    parent_id: i64,
) -> Result<Option<Purchase>> {
    let purchase = sqlx::query_as::<_, Purchase>(
        "select * from purchase where user_id = ? and parent_id = ?",
    )
    .bind(user_id)
    .bind(parent_id)
    .fetch_optional(database)
    .await?;
    Ok(purchase)
}

pub async fn has_purchase(database: &SqlitePool, user_id: i64, parent_id: i64) -> Result<bool> {
    Ok(find_purchase(database, user_id, parent_id).await?.is_some())
}

pub async fn find_progress(
    database: &SqlitePool,
    user_id: i64,
    unit_id: i64,
) -> Result<Option<Progress>> {
    let progress = sqlx::query_as::<_, Progress>(
        "select * from progress where user_id = ? and unit_id = ?",
    )
    .bind(user_id)
    .bind(unit_id)
    .fetch_optional(database)
    .await?;
    Ok(progress)
}

/// Percentage of published chapters the user completed, 0 when nothing is published.
/// Not rounded; rounding is for display.
pub async fn compute_progress_percentage(
    database: &SqlitePool,
    user_id: i64,
    parent_id: i64,
) -> f64 {
    match try_progress_percentage(database, user_id, parent_id).await {
        Ok(percentage) => percentage,
        Err(e) => {
            error!("progress of user {user_id} in parent {parent_id} failed: {e}");
            0.0
        }
    }
}

async fn try_progress_percentage(
    database: &SqlitePool,
    user_id: i64,
    parent_id: i64,
) -> Result<f64> {
    let published = sqlx::query_scalar::<_, i64>(
        "select count(*) from unit where parent_id = ? and is_published = 1",
    )
    .bind(parent_id)
    .fetch_one(database)
    .await?;
    if published == 0 {
        return Ok(0.0);
    }
    let completed = sqlx::query_scalar::<_, i64>(
        r#"
        select count(*) from progress
        where user_id = ? and is_completed = 1
            and unit_id in (select id from unit where parent_id = ? and is_published = 1)
        "#,
    )
    .bind(user_id)
    .bind(parent_id)
    .fetch_one(database)
    .await?;
    Ok(completed as f64 / published as f64 * 100.0)
}

/// Create or overwrite the completion flag of `(user_id, unit_id)`. Last write wins.
pub async fn set_progress(
    database: &SqlitePool,
    user_id: i64,
    unit_id: i64,
    is_completed: bool,
) -> Result<Progress> {
    let now = now_utc();
    let progress = sqlx::query_as::<_, Progress>(
        r#"
        insert into progress (user_id, unit_id, is_completed, created_at, updated_at)
        values (?, ?, ?, ?, ?)
        on conflict (user_id, unit_id) do update set
            is_completed = excluded.is_completed,
            updated_at = excluded.updated_at
        returning *
        "#,
    )
    .bind(user_id)
    .bind(unit_id)
    .bind(is_completed)
    .bind(now)
    .bind(now)
    .fetch_one(database)
    .await?;
    Ok(progress)
}

/// Grant access to a parent. Only the payment webhook calls this; a repeated
/// delivery of the same event leaves the existing purchase in place.
pub async fn record_purchase(
    database: &SqlitePool,
    user_id: i64,
    kind: ParentKind,
    parent_id: i64,
) -> Result<Purchase> {
    let exists = sqlx::query_scalar::<_, i64>("select count(*) from parent where id = ? and kind = ?")
        .bind(parent_id)
        .bind(kind)
        .fetch_one(database)
        .await?;
    if exists == 0 {
        return Err(Error::NotFound(kind.as_str()));
    }
    sqlx::query(
        "insert into purchase (user_id, parent_id, created_at) values (?, ?, ?) on conflict (user_id, parent_id) do nothing",
    )
    .bind(user_id)
    .bind(parent_id)
    .bind(now_utc())
    .execute(database)
    .await?;
    find_purchase(database, user_id, parent_id)
        .await?
        .ok_or(Error::NotFound("purchase"))
}

/// Sidebar of a parent: published chapters with lock and completion flags.
pub async fn parent_outline(
    database: &SqlitePool,
    user_id: i64,
    kind: ParentKind,
    parent_id: i64,
) -> ParentOutline {
    match try_parent_outline(database, user_id, kind, parent_id).await {
        Ok(outline) => outline,
        Err(e) => {
            warn!("outline of parent {parent_id} for user {user_id} failed: {e}");
            ParentOutline {
                parent: None,
                units: vec![],
                progress: 0.0,
                is_purchased: false,
            }
        }
    }
}

async fn try_parent_outline(
    database: &SqlitePool,
    user_id: i64,
    kind: ParentKind,
    parent_id: i64,
) -> Result<ParentOutline> {
    let parent = sqlx::query_as::<_, Parent>(
        "select * from parent where id = ? and kind = ? and (is_published = 1 or owner_id = ?)",
    )
    .bind(parent_id)
    .bind(kind)
    .bind(user_id)
    .fetch_optional(database)
    .await?
    .ok_or(Error::NotFound(kind.as_str()))?;
    let is_purchased = has_purchase(database, user_id, parent_id).await?;
    let completed: Vec<i64> = sqlx::query_scalar(
        r#"
        select unit_id from progress
        where user_id = ? and is_completed = 1
            and unit_id in (select id from unit where parent_id = ?)
        "#,
    )
    .bind(user_id)
    .bind(parent_id)
    .fetch_all(database)
    .await?;
    let units = list_published_units(database, parent_id)
        .await?
        .into_iter()
        .map(|u| OutlineEntry {
            is_locked: !u.is_free_preview && !is_purchased,
            is_completed: completed.contains(&u.id),
            id: u.id,
            title: u.title,
            position: u.position,
            is_free_preview: u.is_free_preview,
        })
        .collect();
    let progress = compute_progress_percentage(database, user_id, parent_id).await;
    Ok(ParentOutline {
        parent: Some(parent),
        units,
        progress,
        is_purchased,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        content::attachment::create_attachment,
        db::testing::{memory_pool, seed_user},
    };

    /// A parent with chapters at the given positions; `(position, published, free)`.
    async fn seed_parent(
        db: &SqlitePool,
        owner: i64,
        kind: ParentKind,
        units: &[(i64, bool, bool)],
    ) -> (i64, Vec<i64>) {
        let now = now_utc();
        let parent_id = sqlx::query(
            "insert into parent (kind, owner_id, title, is_published, created_at, updated_at) values (?, ?, 'P', 1, ?, ?)",
        )
        .bind(kind)
        .bind(owner)
        .bind(now)
        .bind(now)
        .execute(db)
        .await
        .unwrap()
        .last_insert_rowid();
        let mut ids = vec![];
        for &(position, published, free) in units {
            let id = sqlx::query(
                "insert into unit (parent_id, title, body, position, is_published, is_free_preview, created_at, updated_at) values (?, 'U', 'body', ?, ?, ?, ?, ?)",
            )
            .bind(parent_id)
            .bind(position)
            .bind(published)
            .bind(free)
            .bind(now)
            .bind(now)
            .execute(db)
            .await
            .unwrap()
            .last_insert_rowid();
            ids.push(id);
        }
        (parent_id, ids)
    }

    #[tokio::test]
    async fn free_preview_is_never_locked() {
        let db = memory_pool().await;
        let owner = seed_user(&db, "owner").await;
        let learner = seed_user(&db, "learner").await;
        let (book, units) =
            seed_parent(&db, owner, ParentKind::Book, &[(1, true, true), (2, true, false)]).await;

        let free = resolve_unit_access(&db, learner, ParentKind::Book, book, units[0]).await;
        assert!(free.is_found());
        assert!(!free.is_locked);
        assert!(free.purchase.is_none());

        let paid = resolve_unit_access(&db, learner, ParentKind::Book, book, units[1]).await;
        assert!(paid.is_found());
        assert!(paid.is_locked);

        record_purchase(&db, learner, ParentKind::Book, book).await.unwrap();
        let paid = resolve_unit_access(&db, learner, ParentKind::Book, book, units[1]).await;
        assert!(!paid.is_locked);
        assert!(paid.purchase.is_some());
        let free = resolve_unit_access(&db, learner, ParentKind::Book, book, units[0]).await;
        assert!(!free.is_locked);
    }

    #[tokio::test]
    async fn next_unit_skips_unpublished() {
        let db = memory_pool().await;
        let owner = seed_user(&db, "owner").await;
        let (course, units) = seed_parent(
            &db,
            owner,
            ParentKind::Course,
            &[(1, true, true), (2, false, true), (3, true, true), (5, true, true)],
        )
        .await;
        let first = resolve_unit_access(&db, owner, ParentKind::Course, course, units[0]).await;
        assert_eq!(first.next_unit.map(|u| u.id), Some(units[2]));
        let third = resolve_unit_access(&db, owner, ParentKind::Course, course, units[2]).await;
        assert_eq!(third.next_unit.map(|u| u.id), Some(units[3]));
        let last = resolve_unit_access(&db, owner, ParentKind::Course, course, units[3]).await;
        assert!(last.is_found());
        assert!(last.next_unit.is_none());
    }

    #[tokio::test]
    async fn hidden_or_foreign_units_are_denied() {
        let db = memory_pool().await;
        let owner = seed_user(&db, "owner").await;
        let (book, units) =
            seed_parent(&db, owner, ParentKind::Book, &[(1, true, true), (2, false, true)]).await;
        let (other, _) = seed_parent(&db, owner, ParentKind::Book, &[(1, true, true)]).await;

        let unpublished = resolve_unit_access(&db, owner, ParentKind::Book, book, units[1]).await;
        assert!(!unpublished.is_found());
        assert!(unpublished.is_locked);

        let mismatch = resolve_unit_access(&db, owner, ParentKind::Book, other, units[0]).await;
        assert!(mismatch.unit.is_none() && mismatch.parent.is_none());
        assert!(mismatch.is_locked);

        let wrong_kind = resolve_unit_access(&db, owner, ParentKind::Course, book, units[0]).await;
        assert!(!wrong_kind.is_found());

        let missing = resolve_unit_access(&db, owner, ParentKind::Book, book, 9999).await;
        assert!(missing.is_locked && missing.next_unit.is_none());
        assert!(!resolve_unit_access(&db, 0, ParentKind::Book, book, units[0]).await.is_found());
    }

    #[tokio::test]
    async fn database_failure_fails_closed() {
        let db = memory_pool().await;
        let owner = seed_user(&db, "owner").await;
        let (book, units) = seed_parent(&db, owner, ParentKind::Book, &[(1, true, true)]).await;
        db.close().await;
        let access = resolve_unit_access(&db, owner, ParentKind::Book, book, units[0]).await;
        assert!(access.is_locked);
        assert!(access.unit.is_none());
        assert_eq!(compute_progress_percentage(&db, owner, book).await, 0.0);
        assert!(parent_outline(&db, owner, ParentKind::Book, book).await.units.is_empty());
    }

    #[tokio::test]
    async fn progress_counts_only_published_units() {
        let db = memory_pool().await;
        let owner = seed_user(&db, "owner").await;
        let learner = seed_user(&db, "learner").await;
        let (empty, _) = seed_parent(&db, owner, ParentKind::Book, &[(1, false, false)]).await;
        assert_eq!(compute_progress_percentage(&db, learner, empty).await, 0.0);

        let (book, units) = seed_parent(
            &db,
            owner,
            ParentKind::Book,
            &[(1, true, false), (2, true, false), (3, true, false), (4, true, false), (5, false, false)],
        )
        .await;
        set_progress(&db, learner, units[0], true).await.unwrap();
        set_progress(&db, learner, units[1], true).await.unwrap();
        set_progress(&db, learner, units[2], false).await.unwrap();
        // completed but unpublished, does not count
        set_progress(&db, learner, units[4], true).await.unwrap();
        assert_eq!(compute_progress_percentage(&db, learner, book).await, 50.0);
        assert_eq!(compute_progress_percentage(&db, owner, book).await, 0.0);
    }

    #[tokio::test]
    async fn set_progress_upserts_idempotently() {
        let db = memory_pool().await;
        let owner = seed_user(&db, "owner").await;
        let (_, units) = seed_parent(&db, owner, ParentKind::Book, &[(1, true, true)]).await;

        let first = set_progress(&db, owner, units[0], true).await.unwrap();
        let second = set_progress(&db, owner, units[0], true).await.unwrap();
        assert_eq!(first.id, second.id);
        assert!(second.is_completed);
        let rows = sqlx::query_scalar::<_, i64>("select count(*) from progress")
            .fetch_one(&db)
            .await
            .unwrap();
        assert_eq!(rows, 1);

        let undone = set_progress(&db, owner, units[0], false).await.unwrap();
        assert_eq!(undone.id, first.id);
        assert!(!undone.is_completed);
    }

    #[tokio::test]
    async fn attachments_only_for_purchasers() {
        let db = memory_pool().await;
        let owner = seed_user(&db, "owner").await;
        let learner = seed_user(&db, "learner").await;
        let (course, units) = seed_parent(&db, owner, ParentKind::Course, &[(1, true, true)]).await;
        create_attachment(
            &db,
            owner,
            ParentKind::Course,
            course,
            "https://files.example/slides.pdf".into(),
        )
        .await
        .unwrap();

        let free = resolve_unit_access(&db, learner, ParentKind::Course, course, units[0]).await;
        assert!(!free.is_locked);
        assert!(free.attachments.is_empty());

        record_purchase(&db, learner, ParentKind::Course, course).await.unwrap();
        let bought = resolve_unit_access(&db, learner, ParentKind::Course, course, units[0]).await;
        assert_eq!(bought.attachments.len(), 1);
        assert_eq!(bought.attachments[0].name, "slides.pdf");
    }

    #[tokio::test]
    async fn duplicate_purchase_is_a_no_op() {
        let db = memory_pool().await;
        let owner = seed_user(&db, "owner").await;
        let learner = seed_user(&db, "learner").await;
        let (course, _) = seed_parent(&db, owner, ParentKind::Course, &[]).await;
        let a = record_purchase(&db, learner, ParentKind::Course, course).await.unwrap();
        let b = record_purchase(&db, learner, ParentKind::Course, course).await.unwrap();
        assert_eq!(a.id, b.id);
        assert!(matches!(
            record_purchase(&db, learner, ParentKind::Book, course).await,
            Err(Error::NotFound("book"))
        ));
    }

    #[tokio::test]
    async fn outline_marks_locked_and_completed() {
        let db = memory_pool().await;
        let owner = seed_user(&db, "owner").await;
        let learner = seed_user(&db, "learner").await;
        let (book, units) = seed_parent(
            &db,
            owner,
            ParentKind::Book,
            &[(1, true, true), (2, true, false), (3, false, false)],
        )
        .await;
        set_progress(&db, learner, units[0], true).await.unwrap();
        let outline = parent_outline(&db, learner, ParentKind::Book, book).await;
        assert_eq!(outline.units.len(), 2);
        assert!(outline.units[0].is_completed && !outline.units[0].is_locked);
        assert!(outline.units[1].is_locked && !outline.units[1].is_completed);
        assert_eq!(outline.progress, 50.0);
        assert!(!outline.is_purchased);
    }
}
