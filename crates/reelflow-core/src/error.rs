// SPDX-FileCopyrightText: 2026 Reelflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Reelflow generation pipeline.

use thiserror::Error;

use crate::types::Capability;

/// Errors raised while extracting a JSON value from free-form model output.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// The text contained no `{` or `[` to anchor extraction on.
    #[error("no JSON object or array found in model output")]
    NoJsonFound,

    /// A candidate was located but failed to decode.
    #[error("JSON decode failed: {0}")]
    Syntax(#[from] serde_json::Error),
}

/// The primary error type used across all Reelflow adapters and pipeline stages.
#[derive(Debug, Error)]
pub enum ReelflowError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// No active provider row exists for the requested capability.
    ///
    /// Terminal and non-retryable until an operator adds a configuration.
    #[error("no active {capability} provider configured")]
    NotConfigured { capability: Capability },

    /// The provider rejected our credentials (HTTP 401/403).
    #[error("authentication rejected by {provider}: {message}")]
    Auth { provider: String, message: String },

    /// Provider errors (API failure, malformed response body, unsupported model).
    #[error("provider error: {message}")]
    Provider {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The poll budget was exhausted before the provider reported a terminal status.
    ///
    /// Kept distinct from [`ReelflowError::Provider`] so retry policy can differ.
    #[error("generation timed out after {attempts} poll attempts ({waited:?})")]
    Timeout {
        attempts: u32,
        waited: std::time::Duration,
    },

    /// Structured output could not be extracted from model text.
    #[error(transparent)]
    Extract(#[from] ExtractError),

    /// Storage backend errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// No clip in a merge request could be resolved to playable media.
    #[error("no segment could be resolved to playable media")]
    NoValidSegments,

    /// Media localization or reference resolution failed.
    #[error("media error: {0}")]
    Media(String),

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ReelflowError {
    /// A provider error with no underlying source.
    pub fn provider(message: impl Into<String>) -> Self {
        ReelflowError::Provider {
            message: message.into(),
            source: None,
        }
    }

    /// Classify a non-success HTTP status: 401/403 become [`ReelflowError::Auth`]
    /// so callers can treat the configuration itself as broken, everything else
    /// is a generic provider error.
    pub fn from_response_status(status: u16, provider: &str, message: String) -> Self {
        if status == 401 || status == 403 {
            ReelflowError::Auth {
                provider: provider.to_string(),
                message,
            }
        } else {
            ReelflowError::Provider {
                message,
                source: None,
            }
        }
    }

    /// True for errors that no amount of retrying will fix.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ReelflowError::NotConfigured { .. } | ReelflowError::Auth { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_statuses_are_classified() {
        let err = ReelflowError::from_response_status(401, "openai", "bad key".into());
        assert!(matches!(err, ReelflowError::Auth { .. }));
        assert!(err.is_fatal());

        let err = ReelflowError::from_response_status(403, "volces", "forbidden".into());
        assert!(matches!(err, ReelflowError::Auth { .. }));

        let err = ReelflowError::from_response_status(500, "openai", "boom".into());
        assert!(matches!(err, ReelflowError::Provider { .. }));
        assert!(!err.is_fatal());
    }

    #[test]
    fn not_configured_names_the_capability() {
        let err = ReelflowError::NotConfigured {
            capability: Capability::Video,
        };
        assert_eq!(err.to_string(), "no active video provider configured");
        assert!(err.is_fatal());
    }

    #[test]
    fn timeout_is_distinct_from_provider_failure() {
        let timeout = ReelflowError::Timeout {
            attempts: 300,
            waited: std::time::Duration::from_secs(3000),
        };
        assert!(matches!(timeout, ReelflowError::Timeout { .. }));
        assert!(!matches!(timeout, ReelflowError::Provider { .. }));
    }
}
