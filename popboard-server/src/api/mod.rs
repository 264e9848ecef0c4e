//! HTTP and WebSocket handlers

pub mod health;
pub mod leaderboard;
pub mod ws;

pub use health::health_routes;
pub use leaderboard::get_leaderboard;
pub use ws::ws_handler;
