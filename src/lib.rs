// src/lib.rs
pub mod bandit;
pub mod catalog;
pub mod error;
pub mod generation;
pub mod models;
pub mod ranking;
pub mod refresh;
pub mod serving;
pub mod utils;

pub use error::{EmbeddingError, PromoError, PromoResult};
