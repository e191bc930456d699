// src/utils/mod.rs
pub mod candle;
pub mod engine_config;
pub mod env;
pub mod retry;
