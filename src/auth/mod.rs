use crate::state::AppState;
use axum::Router;

mod claims;
pub mod dto;
pub mod handlers;
pub mod jwt;
pub mod middleware;
pub mod password;
pub mod services;

pub use claims::Claims;

pub fn router(state: &AppState) -> Router<AppState> {
    Router::new().merge(handlers::auth_routes(state))
}
