use axum::{extract::State, routing::post, Json, Router};
use serde::Serialize;
use uuid::Uuid;

use crate::{middleware::auth::CART_SESSION_HEADER, state::AppState};

#[derive(Debug, Serialize)]
struct SessionResponse {
    session_key: String,
    header: &'static str,
    expires_in: u64,
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/session", post(open_session))
}

/// Anonymous cart key. The cart itself is created on first use.
async fn open_session(State(state): State<AppState>) -> Json<SessionResponse> {
    Json(SessionResponse {
        session_key: Uuid::new_v4().simple().to_string(),
        header: CART_SESSION_HEADER,
        expires_in: state.auth.expiration,
    })
}
