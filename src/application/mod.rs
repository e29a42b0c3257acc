//! Application services: schema lifecycle and the settings store.

pub mod error;
pub mod migration;
pub mod repos;
pub mod settings;

#[cfg(test)]
pub(crate) mod testing;
