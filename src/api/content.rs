//! Authoring of courses, books and their chapters. Every route is owner-only;
//! a parent of another owner is reported as not found.

use axum::{
    Json,
    extract::{Path, State},
};
use serde::Deserialize;
use utoipa::ToSchema;

use super::{AppState, CurrentUser};
use crate::{
    content::{
        Attachment, Parent, ParentKind, Unit, attachment,
        parent::{self, ParentPatch},
        unit::{self, UnitPatch, UnitPosition},
    },
    error::Result,
};

#[derive(Deserialize, ToSchema)]
pub struct TitleRequest {
    pub title: String,
}

#[derive(Deserialize, ToSchema)]
pub struct AttachmentRequest {
    pub url: String,
}

#[derive(Deserialize, ToSchema)]
pub struct ReorderRequest {
    pub list: Vec<UnitPosition>,
}

#[utoipa::path(
    context_path = "/api",
    path = "/{kind}",
    method(post),
    params(("kind" = String, Path, description = "courses or books")),
    request_body = TitleRequest,
    responses(
        (status = 200, description = "Created, unpublished", body = Parent),
        (status = 400, description = "Empty title"),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn create_parent(
    CurrentUser(user_id): CurrentUser,
    State(state): State<AppState>,
    Path(kind): Path<ParentKind>,
    Json(req): Json<TitleRequest>,
) -> Result<Json<Parent>> {
    Ok(Json(
        parent::create_parent(&state.database, user_id, kind, req.title).await?,
    ))
}

#[utoipa::path(
    context_path = "/api",
    path = "/{kind}/{parent_id}",
    method(patch),
    params(
        ("kind" = String, Path, description = "courses or books"),
        ("parent_id" = i64, Path)
    ),
    request_body = ParentPatch,
    responses(
        (status = 200, description = "Updated", body = Parent),
        (status = 404, description = "Not found or not owned")
    )
)]
pub async fn update_parent(
    CurrentUser(user_id): CurrentUser,
    State(state): State<AppState>,
    Path((kind, parent_id)): Path<(ParentKind, i64)>,
    Json(patch): Json<ParentPatch>,
) -> Result<Json<Parent>> {
    Ok(Json(
        parent::update_parent(&state.database, user_id, kind, parent_id, patch).await?,
    ))
}

#[utoipa::path(
    context_path = "/api",
    path = "/{kind}/{parent_id}",
    method(delete),
    params(
        ("kind" = String, Path, description = "courses or books"),
        ("parent_id" = i64, Path)
    ),
    responses(
        (status = 200, description = "Deleted with its chapters", body = Parent),
        (status = 404, description = "Not found or not owned")
    )
)]
pub async fn delete_parent(
    CurrentUser(user_id): CurrentUser,
    State(state): State<AppState>,
    Path((kind, parent_id)): Path<(ParentKind, i64)>,
) -> Result<Json<Parent>> {
    Ok(Json(
        parent::delete_parent(&state.database, user_id, kind, parent_id).await?,
    ))
}

#[utoipa::path(
    context_path = "/api",
    path = "/{kind}/{parent_id}/publish",
    method(patch),
    params(
        ("kind" = String, Path, description = "courses or books"),
        ("parent_id" = i64, Path)
    ),
    responses(
        (status = 200, description = "Published", body = Parent),
        (status = 400, description = "Missing required fields or no published chapter"),
        (status = 404, description = "Not found or not owned")
    )
)]
pub async fn publish_parent(
    CurrentUser(user_id): CurrentUser,
    State(state): State<AppState>,
    Path((kind, parent_id)): Path<(ParentKind, i64)>,
) -> Result<Json<Parent>> {
    Ok(Json(
        parent::publish_parent(&state.database, user_id, kind, parent_id).await?,
    ))
}

#[utoipa::path(
    context_path = "/api",
    path = "/{kind}/{parent_id}/unpublish",
    method(patch),
    params(
        ("kind" = String, Path, description = "courses or books"),
        ("parent_id" = i64, Path)
    ),
    responses(
        (status = 200, description = "Unpublished", body = Parent),
        (status = 404, description = "Not found or not owned")
    )
)]
pub async fn unpublish_parent(
    CurrentUser(user_id): CurrentUser,
    State(state): State<AppState>,
    Path((kind, parent_id)): Path<(ParentKind, i64)>,
) -> Result<Json<Parent>> {
    Ok(Json(
        parent::unpublish_parent(&state.database, user_id, kind, parent_id).await?,
    ))
}

#[utoipa::path(
    context_path = "/api",
    path = "/{kind}/{parent_id}/chapters",
    method(post),
    params(
        ("kind" = String, Path, description = "courses or books"),
        ("parent_id" = i64, Path)
    ),
    request_body = TitleRequest,
    responses(
        (status = 200, description = "Chapter appended, unpublished", body = Unit),
        (status = 404, description = "Not found or not owned")
    )
)]
pub async fn create_unit(
    CurrentUser(user_id): CurrentUser,
    State(state): State<AppState>,
    Path((kind, parent_id)): Path<(ParentKind, i64)>,
    Json(req): Json<TitleRequest>,
) -> Result<Json<Unit>> {
    Ok(Json(
        unit::create_unit(&state.database, user_id, kind, parent_id, req.title).await?,
    ))
}

#[utoipa::path(
    context_path = "/api",
    path = "/{kind}/{parent_id}/chapters/reorder",
    method(put),
    params(
        ("kind" = String, Path, description = "courses or books"),
        ("parent_id" = i64, Path)
    ),
    request_body = ReorderRequest,
    responses(
        (status = 200, description = "Reordered"),
        (status = 400, description = "Invalid or clashing positions"),
        (status = 404, description = "Not found or not owned")
    )
)]
pub async fn reorder_units(
    CurrentUser(user_id): CurrentUser,
    State(state): State<AppState>,
    Path((kind, parent_id)): Path<(ParentKind, i64)>,
    Json(req): Json<ReorderRequest>,
) -> Result<Json<&'static str>> {
    unit::reorder_units(&state.database, user_id, kind, parent_id, req.list).await?;
    Ok(Json("Success"))
}

#[utoipa::path(
    context_path = "/api",
    path = "/{kind}/{parent_id}/chapters/{unit_id}",
    method(patch),
    params(
        ("kind" = String, Path, description = "courses or books"),
        ("parent_id" = i64, Path),
        ("unit_id" = i64, Path)
    ),
    request_body = UnitPatch,
    responses(
        (status = 200, description = "Updated", body = Unit),
        (status = 400, description = "Invalid quiz, or a quiz on a course chapter"),
        (status = 404, description = "Not found or not owned")
    )
)]
pub async fn update_unit(
    CurrentUser(user_id): CurrentUser,
    State(state): State<AppState>,
    Path((kind, parent_id, unit_id)): Path<(ParentKind, i64, i64)>,
    Json(patch): Json<UnitPatch>,
) -> Result<Json<Unit>> {
    Ok(Json(
        unit::update_unit(&state.database, user_id, kind, parent_id, unit_id, patch).await?,
    ))
}

#[utoipa::path(
    context_path = "/api",
    path = "/{kind}/{parent_id}/chapters/{unit_id}",
    method(delete),
    params(
        ("kind" = String, Path, description = "courses or books"),
        ("parent_id" = i64, Path),
        ("unit_id" = i64, Path)
    ),
    responses(
        (status = 200, description = "Deleted", body = Unit),
        (status = 404, description = "Not found or not owned")
    )
)]
pub async fn delete_unit(
    CurrentUser(user_id): CurrentUser,
    State(state): State<AppState>,
    Path((kind, parent_id, unit_id)): Path<(ParentKind, i64, i64)>,
) -> Result<Json<Unit>> {
    Ok(Json(
        unit::delete_unit(&state.database, user_id, kind, parent_id, unit_id).await?,
    ))
}

#[utoipa::path(
    context_path = "/api",
    path = "/{kind}/{parent_id}/chapters/{unit_id}/publish",
    method(patch),
    params(
        ("kind" = String, Path, description = "courses or books"),
        ("parent_id" = i64, Path),
        ("unit_id" = i64, Path)
    ),
    responses(
        (status = 200, description = "Published", body = Unit),
        (status = 400, description = "Missing required fields"),
        (status = 404, description = "Not found or not owned")
    )
)]
pub async fn publish_unit(
    CurrentUser(user_id): CurrentUser,
    State(state): State<AppState>,
    Path((kind, parent_id, unit_id)): Path<(ParentKind, i64, i64)>,
) -> Result<Json<Unit>> {
    Ok(Json(
        unit::publish_unit(&state.database, user_id, kind, parent_id, unit_id).await?,
    ))
}

#[utoipa::path(
    context_path = "/api",
    path = "/{kind}/{parent_id}/chapters/{unit_id}/unpublish",
    method(patch),
    params(
        ("kind" = String, Path, description = "courses or books"),
        ("parent_id" = i64, Path),
        ("unit_id" = i64, Path)
    ),
    responses(
        (status = 200, description = "Unpublished", body = Unit),
        (status = 404, description = "Not found or not owned")
    )
)]
pub async fn unpublish_unit(
    CurrentUser(user_id): CurrentUser,
    State(state): State<AppState>,
    Path((kind, parent_id, unit_id)): Path<(ParentKind, i64, i64)>,
) -> Result<Json<Unit>> {
    Ok(Json(
        unit::unpublish_unit(&state.database, user_id, kind, parent_id, unit_id).await?,
    ))
}

#[utoipa::path(
    context_path = "/api",
    path = "/{kind}/{parent_id}/attachments",
    method(post),
    params(
        ("kind" = String, Path, description = "courses only"),
        ("parent_id" = i64, Path)
    ),
    request_body = AttachmentRequest,
    responses(
        (status = 200, description = "Attached, named after the last url segment", body = Attachment),
        (status = 400, description = "Empty url, or the parent is a book"),
        (status = 404, description = "Not found or not owned")
    )
)]
pub async fn create_attachment(
    CurrentUser(user_id): CurrentUser,
    State(state): State<AppState>,
    Path((kind, parent_id)): Path<(ParentKind, i64)>,
    Json(req): Json<AttachmentRequest>,
) -> Result<Json<Attachment>> {
    Ok(Json(
        attachment::create_attachment(&state.database, user_id, kind, parent_id, req.url).await?,
    ))
}

#[utoipa::path(
    context_path = "/api",
    path = "/{kind}/{parent_id}/attachments/{attachment_id}",
    method(delete),
    params(
        ("kind" = String, Path, description = "courses only"),
        ("parent_id" = i64, Path),
        ("attachment_id" = i64, Path)
    ),
    responses(
        (status = 200, description = "Deleted", body = Attachment),
        (status = 404, description = "Not found or not owned")
    )
)]
pub async fn delete_attachment(
    CurrentUser(user_id): CurrentUser,
    State(state): State<AppState>,
    Path((kind, parent_id, attachment_id)): Path<(ParentKind, i64, i64)>,
) -> Result<Json<Attachment>> {
    Ok(Json(
        attachment::delete_attachment(&state.database, user_id, kind, parent_id, attachment_id)
            .await?,
    ))
}
