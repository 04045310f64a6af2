//! Health endpoint.

use std::collections::BTreeMap;

use axum::Json;
use axum::extract::State;
use serde::{Deserialize, Serialize};

use crate::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct Response {
    pub status: String,
    pub version: String,
    pub components: BTreeMap<String, String>,
}

/// Handler probing each subcomponent.
pub async fn health(State(state): State<AppState>) -> Json<Response> {
    let mut components = BTreeMap::new();

    let database = sqlx::query("SELECT 1")
        .execute(&state.db.postgres)
        .await
        .is_ok();
    components.insert(
        "database".to_owned(),
        if database { "ok" } else { "error" }.to_owned(),
    );

    let cache = state.cache.ping().await.is_ok();
    components.insert(
        "cache".to_owned(),
        if cache { "ok" } else { "error" }.to_owned(),
    );

    components.insert(
        "llm".to_owned(),
        if state.llm.is_configured() {
            "configured"
        } else {
            "unconfigured"
        }
        .to_owned(),
    );

    let healthy = database && cache;
    Json(Response {
        status: if healthy { "ok" } else { "degraded" }.to_owned(),
        version: env!("CARGO_PKG_VERSION").to_owned(),
        components,
    })
}
