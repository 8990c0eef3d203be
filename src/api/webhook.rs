use std::collections::HashMap;

use axum::{
    Json, Router,
    extract::State,
    http::HeaderMap,
    routing::post,
};
use serde::Deserialize;
use serde_json::Value;
use subtle::ConstantTimeEq;
use tracing::{info, warn};
use utoipa::ToSchema;

use super::AppState;
use crate::{
    access,
    content::ParentKind,
    error::{Error, Result},
};

pub const SECRET_HEADER: &str = "x-webhook-secret";
const CHECKOUT_COMPLETED: &str = "checkout.session.completed";

#[derive(Debug, Deserialize, ToSchema)]
pub struct PaymentEvent {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub data: Value,
}

impl PaymentEvent {
    fn metadata(&self) -> HashMap<String, String> {
        self.data
            .pointer("/object/metadata")
            .and_then(|m| serde_json::from_value(m.clone()).ok())
            .unwrap_or_default()
    }
}

/// Compare without leaking how much of the secret matched.
fn secret_matches(given: &[u8], expected: &str) -> bool {
    !expected.is_empty() && bool::from(given.ct_eq(expected.as_bytes()))
}

/// Purchase granted by a completed checkout.
#[derive(Debug, PartialEq)]
struct Grant {
    user_id: i64,
    parent_id: i64,
    kind: ParentKind,
}

fn parse_grant(metadata: &HashMap<String, String>) -> Result<Grant> {
    let field = |name: &str| {
        metadata
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| Error::InvalidRequest(format!("Missing metadata: {name}")))
    };
    let id = |name: &str| {
        field(name)?
            .parse::<i64>()
            .map_err(|_| Error::InvalidRequest(format!("Invalid metadata: {name}")))
    };
    let kind = match field("parentKind")? {
        "course" | "courses" => ParentKind::Course,
        "book" | "books" => ParentKind::Book,
        other => {
            return Err(Error::InvalidRequest(format!(
                "Invalid metadata: parentKind {other}"
            )));
        }
    };
    Ok(Grant {
        user_id: id("userId")?,
        parent_id: id("parentId")?,
        kind,
    })
}

#[utoipa::path(
    context_path = "/api",
    path = "/webhook",
    method(post),
    request_body = PaymentEvent,
    params(("x-webhook-secret" = String, Header, description = "Shared webhook secret")),
    responses(
        (status = 200, description = "Event handled or ignored"),
        (status = 400, description = "Missing or invalid metadata"),
        (status = 401, description = "Wrong secret"),
        (status = 404, description = "Purchased parent does not exist")
    )
)]
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(event): Json<PaymentEvent>,
) -> Result<Json<&'static str>> {
    let secret = headers.get(SECRET_HEADER).map(|v| v.as_bytes());
    if !secret.is_some_and(|s| secret_matches(s, &state.webhook_secret)) {
        warn!("webhook call with a wrong secret");
        return Err(Error::Unauthorized);
    }
    if event.kind != CHECKOUT_COMPLETED {
        info!("ignoring webhook event {}", event.kind);
        return Ok(Json("Ignored"));
    }
    let grant = parse_grant(&event.metadata())?;
    let purchase =
        access::record_purchase(&state.database, grant.user_id, grant.kind, grant.parent_id)
            .await?;
    info!(
        "purchase {} recorded: user {} owns {} {}",
        purchase.id,
        grant.user_id,
        grant.kind.as_str(),
        grant.parent_id
    );
    Ok(Json("Success"))
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/", post(payment_webhook))
}
