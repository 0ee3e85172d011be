//! matchpool: football match pool refresher and API proxy backend.
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod auth;
pub mod config;
pub mod data;
pub mod engine;
pub mod error;
pub mod gateway;
pub mod llm;
pub mod purchases;
pub mod server;
pub mod storage;
pub mod types;
