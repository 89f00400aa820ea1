pub mod enrollment;
pub mod health;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// ```text
/// /enrollments          POST submit
/// /enrollments/quote    POST quote
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new().nest("/enrollments", enrollment::router())
}
