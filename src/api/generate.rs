use axum::{Json, Router, extract::State, routing::post};

use super::{AppState, CurrentUser};
use crate::{
    error::Result,
    generation::{GenerationOutput, GenerationRequest},
};

#[utoipa::path(
    context_path = "/api/ai",
    path = "/generate",
    method(post),
    request_body = GenerationRequest,
    responses(
        (status = 200, description = "Generated text, or a JSON array encoded as text for tags and quizzes", body = GenerationOutput),
        (status = 400, description = "Invalid generation type"),
        (status = 401, description = "Unauthorized"),
        (status = 500, description = "Every generation backend failed")
    )
)]
pub async fn generate(
    CurrentUser(user_id): CurrentUser,
    State(state): State<AppState>,
    Json(req): Json<GenerationRequest>,
) -> Result<Json<GenerationOutput>> {
    tracing::info!("user {user_id} requested {}", req.kind);
    let output = state.pipeline.generate(&req).await?;
    Ok(Json(GenerationOutput { output }))
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/generate", post(generate))
}
