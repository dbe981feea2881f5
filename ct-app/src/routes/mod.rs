pub mod chat;
pub mod health;
pub mod sessions;

use axum::Router;

pub fn router() -> Router {
    Router::new()
        .merge(chat::router())
        .merge(health::router())
        .merge(sessions::router())
}
