use axum::{
    Json, Router,
    extract::State,
    routing::{get, post},
};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::info;
use utoipa::ToSchema;

use super::{AppState, CurrentUser, USER_KEY};
use crate::{
    error::Result,
    user::{self, UserInfo},
};

#[derive(Deserialize, ToSchema)]
pub struct CreateUserRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[utoipa::path(
    context_path = "/api/user",
    path = "/create_user",
    method(post),
    request_body = CreateUserRequest,
    responses(
        (status = 200, description = "User created", body = UserInfo),
        (status = 400, description = "Invalid or duplicate account data")
    )
)]
pub async fn create_user(
    State(state): State<AppState>,
    Json(req): Json<CreateUserRequest>,
) -> Result<Json<UserInfo>> {
    let CreateUserRequest {
        name,
        email,
        password,
    } = req;
    let id = user::create_user(&state.database, name, email, password).await?;
    info!("user {id} registered");
    Ok(Json(user::get_user_info(&state.database, id).await?))
}

#[derive(Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[utoipa::path(
    context_path = "/api/user",
    path = "/login",
    method(post),
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = UserInfo),
        (status = 401, description = "Invalid credentials")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    session: Session,
    Json(req): Json<LoginRequest>,
) -> Result<Json<UserInfo>> {
    let LoginRequest { email, password } = req;
    let id = user::login(&state.database, email, password).await?;
    session.cycle_id().await.map_err(anyhow::Error::from)?;
    session
        .insert(USER_KEY, id)
        .await
        .map_err(anyhow::Error::from)?;
    Ok(Json(user::get_user_info(&state.database, id).await?))
}

#[utoipa::path(
    context_path = "/api/user",
    path = "/logout",
    method(post),
    responses(
        (status = 200, description = "Logout successful")
    )
)]
pub async fn logout(session: Session) -> Result<Json<&'static str>> {
    session.flush().await.map_err(anyhow::Error::from)?;
    Ok(Json("Logout successful"))
}

#[utoipa::path(
    context_path = "/api/user",
    path = "/user_info",
    method(get),
    responses(
        (status = 200, description = "The logged in user", body = UserInfo),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn user_info(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
) -> Result<Json<UserInfo>> {
    Ok(Json(user::get_user_info(&state.database, user_id).await?))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/create_user", post(create_user))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/user_info", get(user_info))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::json;

    use crate::api::testing::{call, sign_in, test_app};

    #[tokio::test]
    async fn session_round_trip() {
        let (app, _db) = test_app().await;
        let (id, cookie) = sign_in(&app, "ada").await;
        let (status, info, _) = call(&app, "GET", "/api/user/user_info", Some(&cookie), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(info["id"], id);
        assert_eq!(info["email"], "ada@example.com");
        assert!(info.get("password").is_none());

        let (status, _, _) = call(&app, "POST", "/api/user/logout", Some(&cookie), None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _, _) = call(&app, "GET", "/api/user/user_info", Some(&cookie), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn bad_credentials_are_unauthorized() {
        let (app, _db) = test_app().await;
        sign_in(&app, "ada").await;
        let (status, _, cookie) = call(
            &app,
            "POST",
            "/api/user/login",
            None,
            Some(json!({ "email": "ada@example.com", "password": "nope-nope" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(cookie.is_none());
    }
}
