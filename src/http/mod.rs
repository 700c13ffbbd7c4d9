//! HTTP surface (C11 monitoring reads, C18 admin routes, login, widget).
//!
//! Mirrors the teacher's `OrchestratorApi::router` shape: a `Router` built
//! from one `AppState`, handlers pulling the bearer token out of the request
//! header themselves since role requirements differ per route rather than
//! applying uniformly via a single `route_layer`.

mod admin;
mod auth_routes;
mod monitoring_routes;
mod state;
mod widget;
pub mod webhook;

pub use state::AppState;

use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Pull the raw `Authorization` header value (e.g. `"Bearer abc"`) out of an
/// axum request, for handing to `AuthGuard::require_*`.
pub(crate) fn auth_header(headers: &HeaderMap) -> Option<&str> {
    headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok())
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/monitoring/cases", get(monitoring_routes::list_cases))
        .route("/monitoring/cases/{case_id}", get(monitoring_routes::get_case_detail))
        .route("/auth/login", post(auth_routes::login))
        .route("/admin/users", get(admin::list_users).post(admin::create_user))
        .route("/admin/users/{user_id}/block", post(admin::block_user))
        .route("/admin/users/{user_id}/reactivate", post(admin::reactivate_user))
        .route("/admin/users/{user_id}/remove", post(admin::remove_user))
        .route("/widget/room2/bootstrap", post(widget::bootstrap))
        .route("/widget/room2/submit", post(widget::submit))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
