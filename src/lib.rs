//! Persistence core for a content plugin: a JSON settings store, idempotent
//! schema migrations, and a generation-tagged render cache over Postgres.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
