//! Route definitions for the `/enrollments` resource.

use axum::routing::post;
use axum::Router;

use crate::handlers::enrollment;
use crate::state::AppState;

/// Routes mounted at `/enrollments`.
///
/// ```text
/// POST   /        -> submit
/// POST   /quote   -> quote
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(enrollment::submit))
        .route("/quote", post(enrollment::quote))
}
