use crate::state::AppState;
use axum::Router;

pub mod codec;
mod dto;
pub mod editor;
pub mod handlers;
pub mod render;
pub mod repo;
pub mod repo_types;
pub mod slug;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(handlers::editor_routes())
        .merge(handlers::public_routes())
}
