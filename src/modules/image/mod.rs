use crate::state::AppState;
use axum::Router;
use axum::routing::{get, post};

pub mod dto;
pub mod events;
pub mod handler;
pub mod service;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/upload-image", post(handler::upload_image))
        .route("/retrieve-image/{type}/{file}", get(handler::retrieve_image))
}
