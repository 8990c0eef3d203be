use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::get,
};
use serde::Deserialize;
use utoipa::IntoParams;

use super::AppState;
use crate::{
    blog::{self, Blog},
    content::{
        Category, ParentKind, category,
        parent::{self, CatalogEntry, CatalogFilter},
    },
    error::Result,
};

#[derive(Debug, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
pub struct CatalogQuery {
    /// course or book
    pub kind: ParentKind,
    /// Substring of the title
    pub title: Option<String>,
    pub category_id: Option<i64>,
}

#[utoipa::path(
    context_path = "/api/public",
    path = "/catalog",
    method(get),
    params(CatalogQuery),
    responses(
        (status = 200, description = "Published courses or books", body = Vec<CatalogEntry>)
    )
)]
pub async fn catalog(
    State(state): State<AppState>,
    Query(query): Query<CatalogQuery>,
) -> Result<Json<Vec<CatalogEntry>>> {
    let filter = CatalogFilter {
        title: query.title.as_deref(),
        category_id: query.category_id,
    };
    let entries = parent::list_published(&state.database, query.kind, filter, None).await?;
    Ok(Json(entries))
}

#[utoipa::path(
    context_path = "/api/public",
    path = "/categories",
    method(get),
    responses(
        (status = 200, description = "Catalog categories", body = Vec<Category>)
    )
)]
pub async fn categories(State(state): State<AppState>) -> Result<Json<Vec<Category>>> {
    Ok(Json(category::list_categories(&state.database).await?))
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct BlogQuery {
    pub title: Option<String>,
}

#[utoipa::path(
    context_path = "/api/public",
    path = "/blogs",
    method(get),
    params(BlogQuery),
    responses(
        (status = 200, description = "Published blog posts", body = Vec<Blog>)
    )
)]
pub async fn blogs(
    State(state): State<AppState>,
    Query(query): Query<BlogQuery>,
) -> Result<Json<Vec<Blog>>> {
    Ok(Json(
        blog::list_published_blogs(&state.database, query.title.as_deref()).await?,
    ))
}

#[utoipa::path(
    context_path = "/api/public",
    path = "/blogs/{blog_id}",
    method(get),
    params(("blog_id" = i64, Path)),
    responses(
        (status = 200, description = "A published blog post", body = Blog),
        (status = 404, description = "Missing or not published")
    )
)]
pub async fn read_blog(
    State(state): State<AppState>,
    Path(blog_id): Path<i64>,
) -> Result<Json<Blog>> {
    Ok(Json(blog::get_published_blog(&state.database, blog_id).await?))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/catalog", get(catalog))
        .route("/categories", get(categories))
        .route("/blogs", get(blogs))
        .route("/blogs/{blog_id}", get(read_blog))
}
