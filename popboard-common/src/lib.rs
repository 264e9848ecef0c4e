//! # Popboard Common Library
//!
//! Shared code for the popboard score service:
//! - Score store contract and its backends (SQLite, JSON file, in-memory)
//! - Ranking computation (full ranking, top-N, per-identity standing)
//! - Wire event types exchanged with clients
//! - Identity validation
//! - Configuration loading

pub mod config;
pub mod error;
pub mod events;
pub mod identity;
pub mod ranking;
pub mod store;

pub use error::{Error, Result};
pub use identity::Identity;
pub use ranking::{RankingSnapshot, Standing};
pub use store::{ScoreRecord, ScoreStore, SharedStore};
