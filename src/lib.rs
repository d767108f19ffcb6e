//! Cheereading - book recommendation core
//!
//! Turns catalog books into embedding vectors, keeps an exact similarity
//! index over them, and recommends unread books to a reader from their
//! rating-weighted reading history, with "not interested" feedback and a
//! children's-category gatekeeper.

pub mod cli;
pub mod config;
pub mod embedding;
pub mod error;
pub mod models;
pub mod recommend;
pub mod storage;

pub use error::{CheerError, Result};
