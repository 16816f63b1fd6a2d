//! Endpoints about the authenticated principal

use axum::Json;
use serde_json::json;

use crate::server::CurrentUser;

pub(super) async fn me(CurrentUser(user): CurrentUser) -> Json<serde_json::Value> {
    let name = user.display_name.as_deref().unwrap_or("user");
    Json(json!({ "message": format!("Hello {name}!") }))
}
