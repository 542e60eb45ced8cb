pub mod actor;
pub mod error;
pub mod handlers;
pub mod models;
pub mod state;

pub use state::ApiState;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, put},
};

/// Multipart framing and the scalar fields ride on top of the image itself.
const FORM_OVERHEAD_BYTES: usize = 64 * 1024;

pub fn build_api_router(max_image_bytes: usize) -> Router<ApiState> {
    Router::new()
        .route(
            "/api/v1/monsters",
            get(handlers::list_monsters).post(handlers::create_monster),
        )
        .route(
            "/api/v1/monsters/{id}",
            get(handlers::get_monster)
                .patch(handlers::update_monster)
                .delete(handlers::delete_monster),
        )
        .route(
            "/api/v1/monsters/{id}/captured",
            put(handlers::mark_captured),
        )
        .route("/api/v1/categories", get(handlers::list_categories))
        .route("/api/v1/types", get(handlers::list_types))
        .layer(DefaultBodyLimit::max(
            max_image_bytes.saturating_add(FORM_OVERHEAD_BYTES),
        ))
}
