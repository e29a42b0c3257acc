//! Domain value types for settings and rendered-output caching.

pub mod error;
pub mod json;
pub mod render;
pub mod settings;
