use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, patch, post},
};

use super::{AppState, CurrentUser, content::TitleRequest};
use crate::{
    blog::{self, Blog, BlogPatch},
    error::Result,
};

#[utoipa::path(
    context_path = "/api/blogs",
    path = "/",
    method(post),
    request_body = TitleRequest,
    responses(
        (status = 200, description = "Draft created", body = Blog),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn create_blog(
    CurrentUser(user_id): CurrentUser,
    State(state): State<AppState>,
    Json(req): Json<TitleRequest>,
) -> Result<Json<Blog>> {
    Ok(Json(blog::create_blog(&state.database, user_id, req.title).await?))
}

#[utoipa::path(
    context_path = "/api/blogs",
    path = "/{blog_id}",
    method(get),
    params(("blog_id" = i64, Path)),
    responses(
        (status = 200, description = "One of the caller's posts", body = Blog),
        (status = 404, description = "Not found or not owned")
    )
)]
pub async fn get_blog(
    CurrentUser(user_id): CurrentUser,
    State(state): State<AppState>,
    Path(blog_id): Path<i64>,
) -> Result<Json<Blog>> {
    Ok(Json(blog::get_blog(&state.database, user_id, blog_id).await?))
}

#[utoipa::path(
    context_path = "/api/blogs",
    path = "/{blog_id}",
    method(patch),
    params(("blog_id" = i64, Path)),
    request_body = BlogPatch,
    responses(
        (status = 200, description = "Updated", body = Blog),
        (status = 404, description = "Not found or not owned")
    )
)]
pub async fn update_blog(
    CurrentUser(user_id): CurrentUser,
    State(state): State<AppState>,
    Path(blog_id): Path<i64>,
    Json(patch): Json<BlogPatch>,
) -> Result<Json<Blog>> {
    Ok(Json(
        blog::update_blog(&state.database, user_id, blog_id, patch).await?,
    ))
}

#[utoipa::path(
    context_path = "/api/blogs",
    path = "/{blog_id}",
    method(delete),
    params(("blog_id" = i64, Path)),
    responses(
        (status = 200, description = "Deleted", body = Blog),
        (status = 404, description = "Not found or not owned")
    )
)]
pub async fn delete_blog(
    CurrentUser(user_id): CurrentUser,
    State(state): State<AppState>,
    Path(blog_id): Path<i64>,
) -> Result<Json<Blog>> {
    Ok(Json(blog::delete_blog(&state.database, user_id, blog_id).await?))
}

#[utoipa::path(
    context_path = "/api/blogs",
    path = "/{blog_id}/publish",
    method(patch),
    params(("blog_id" = i64, Path)),
    responses(
        (status = 200, description = "Published", body = Blog),
        (status = 400, description = "Missing required fields"),
        (status = 404, description = "Not found or not owned")
    )
)]
pub async fn publish_blog(
    CurrentUser(user_id): CurrentUser,
    State(state): State<AppState>,
    Path(blog_id): Path<i64>,
) -> Result<Json<Blog>> {
    Ok(Json(blog::publish_blog(&state.database, user_id, blog_id).await?))
}

#[utoipa::path(
    context_path = "/api/blogs",
    path = "/{blog_id}/unpublish",
    method(patch),
    params(("blog_id" = i64, Path)),
    responses(
        (status = 200, description = "Unpublished", body = Blog),
        (status = 404, description = "Not found or not owned")
    )
)]
pub async fn unpublish_blog(
    CurrentUser(user_id): CurrentUser,
    State(state): State<AppState>,
    Path(blog_id): Path<i64>,
) -> Result<Json<Blog>> {
    Ok(Json(
        blog::unpublish_blog(&state.database, user_id, blog_id).await?,
    ))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_blog))
        .route(
            "/{blog_id}",
            get(get_blog).patch(update_blog).delete(delete_blog),
        )
        .route("/{blog_id}/publish", patch(publish_blog))
        .route("/{blog_id}/unpublish", patch(unpublish_blog))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::json;

    use crate::api::testing::{call, sign_in, test_app};

    #[tokio::test]
    async fn draft_to_published_post() {
        let (app, _db) = test_app().await;
        let (_, cookie) = sign_in(&app, "writer").await;
        let cookie = Some(cookie.as_str());
        let (status, blog, _) =
            call(&app, "POST", "/api/blogs", cookie, Some(json!({ "title": "Async Rust" }))).await;
        assert_eq!(status, StatusCode::OK);
        let uri = format!("/api/blogs/{}", blog["id"]);

        let (status, _, _) = call(&app, "PATCH", &format!("{uri}/publish"), cookie, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, blog, _) = call(
            &app,
            "PATCH",
            &uri,
            cookie,
            Some(json!({
                "content": "<h1>Async Rust</h1>",
                "imageUrl": "https://img.example/async.png",
                "tags": ["tokio", "futures"]
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(blog["tags"], json!(["tokio", "futures"]));
        let (status, _, _) = call(&app, "PATCH", &format!("{uri}/publish"), cookie, None).await;
        assert_eq!(status, StatusCode::OK);

        let (_, public, _) = call(&app, "GET", "/api/public/blogs?title=Async", None, None).await;
        assert_eq!(public.as_array().unwrap().len(), 1);

        let (_, other) = sign_in(&app, "other").await;
        let (status, _, _) = call(&app, "GET", &uri, Some(&other), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
