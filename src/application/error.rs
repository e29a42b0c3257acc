use thiserror::Error;

use crate::{
    application::{migration::MigrationError, settings::SettingsError},
    cache::RenderCacheError,
    domain::error::DomainError,
    infra::error::InfraError,
};

/// Top-level error surfaced by the `vellum` binary.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error(transparent)]
    Migration(#[from] MigrationError),
    #[error(transparent)]
    Settings(#[from] SettingsError),
    #[error(transparent)]
    RenderCache(#[from] RenderCacheError),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }

    /// Error message followed by its source chain, outermost first.
    pub fn chain(&self) -> Vec<String> {
        let mut messages = vec![self.to_string()];
        let mut current = std::error::Error::source(self);
        while let Some(inner) = current {
            messages.push(inner.to_string());
            current = inner.source();
        }
        messages
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::repos::RepoError;

    #[test]
    fn chain_walks_sources() {
        let error = AppError::from(MigrationError::Failed {
            target: 3,
            source: RepoError::from_persistence("disk full"),
        });

        let chain = error.chain();
        assert_eq!(
            chain,
            vec![
                "schema migration to version 3 failed".to_string(),
                "persistence error: disk full".to_string(),
            ]
        );
    }
}
