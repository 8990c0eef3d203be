pub mod blog;
pub mod content;
pub mod generate;
pub mod learn;
pub mod public;
pub mod user;
pub mod webhook;

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::FromRequestParts,
    http::request::Parts,
    routing::{delete, get, patch, post, put},
};
use sqlx::SqlitePool;
use tower_sessions::Session;
use utoipa::OpenApi;

use crate::{
    error::Error,
    generation::{Pipeline, backend::ChatBackend, search::TavilySearch},
};

pub type ContentPipeline = Pipeline<TavilySearch, ChatBackend>;

/// Session key holding the id of the logged in user.
pub const USER_KEY: &str = "user_id";

#[derive(Clone)]
pub struct AppState {
    pub database: SqlitePool,
    pub pipeline: Arc<ContentPipeline>,
    pub webhook_secret: Arc<str>,
}

/// The logged in user. Rejects with 401 when the session has no user.
#[derive(Debug, Clone, Copy)]
pub struct CurrentUser(pub i64);

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let session = Session::from_request_parts(parts, state)
            .await
            .map_err(|_| Error::Unauthorized)?;
        match session.get::<i64>(USER_KEY).await {
            Ok(Some(id)) => Ok(CurrentUser(id)),
            _ => Err(Error::Unauthorized),
        }
    }
}

#[derive(OpenApi)]
#[openapi(paths(
    user::create_user,
    user::login,
    user::logout,
    user::user_info,
    public::catalog,
    public::categories,
    public::blogs,
    public::read_blog,
    learn::my_catalog,
    learn::outline,
    learn::parent_progress,
    learn::view_unit,
    learn::set_unit_progress,
    learn::answer_quiz,
    learn::reset_quiz,
    content::create_parent,
    content::update_parent,
    content::delete_parent,
    content::publish_parent,
    content::unpublish_parent,
    content::create_unit,
    content::reorder_units,
    content::update_unit,
    content::delete_unit,
    content::publish_unit,
    content::unpublish_unit,
    content::create_attachment,
    content::delete_attachment,
    blog::create_blog,
    blog::get_blog,
    blog::update_blog,
    blog::delete_blog,
    blog::publish_blog,
    blog::unpublish_blog,
    generate::generate,
    webhook::payment_webhook,
))]
pub struct ApiDoc;

pub fn openapi_json() -> anyhow::Result<String> {
    Ok(ApiDoc::openapi().to_pretty_json()?)
}

async fn openapi() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// Courses and books, for learners and authors. `{kind}` is `courses` or `books`.
fn parent_routes() -> Router<AppState> {
    Router::new()
        .route("/{kind}", get(learn::my_catalog).post(content::create_parent))
        .route(
            "/{kind}/{parent_id}",
            get(learn::outline)
                .patch(content::update_parent)
                .delete(content::delete_parent),
        )
        .route("/{kind}/{parent_id}/publish", patch(content::publish_parent))
        .route("/{kind}/{parent_id}/unpublish", patch(content::unpublish_parent))
        .route("/{kind}/{parent_id}/progress", get(learn::parent_progress))
        .route("/{kind}/{parent_id}/attachments", post(content::create_attachment))
        .route(
            "/{kind}/{parent_id}/attachments/{attachment_id}",
            delete(content::delete_attachment),
        )
        .route("/{kind}/{parent_id}/chapters", post(content::create_unit))
        .route("/{kind}/{parent_id}/chapters/reorder", put(content::reorder_units))
        .route(
            "/{kind}/{parent_id}/chapters/{unit_id}",
            get(learn::view_unit)
                .patch(content::update_unit)
                .delete(content::delete_unit),
        )
        .route(
            "/{kind}/{parent_id}/chapters/{unit_id}/publish",
            patch(content::publish_unit),
        )
        .route(
            "/{kind}/{parent_id}/chapters/{unit_id}/unpublish",
            patch(content::unpublish_unit),
        )
        .route(
            "/{kind}/{parent_id}/chapters/{unit_id}/progress",
            put(learn::set_unit_progress),
        )
        .route(
            "/{kind}/{parent_id}/chapters/{unit_id}/quiz/answer",
            post(learn::answer_quiz),
        )
        .route(
            "/{kind}/{parent_id}/chapters/{unit_id}/quiz/reset",
            post(learn::reset_quiz),
        )
}

/// All routes, without the session layer.
pub fn router(state: AppState) -> Router {
    Router::new()
        .nest(
            "/api",
            Router::new()
                .nest("/user", user::routes())
                .nest("/public", public::routes())
                .nest("/blogs", blog::routes())
                .nest("/ai", generate::routes())
                .nest("/webhook", webhook::routes())
                .merge(parent_routes()),
        )
        .route("/api-docs/openapi.json", get(openapi))
        .with_state(state)
}
