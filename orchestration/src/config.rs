//! Environment-driven configuration for the orchestration core.
//!
//! Missing backend credentials fail fast with a distinct error. Test mode
//! swaps in a canned backend instead, so non-production flows stay usable
//! without credentials.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::gateway::{BackendError, GenerationBackend, HttpBackend, StaticBackend};

/// Error type for configuration problems.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("backend api key missing (set COLLOQUY_API_KEY or enable test mode)")]
    MissingApiKey,

    #[error("backend client: {0}")]
    Backend(#[from] BackendError),
}

/// Fixed reply served by the test-mode backend.
const TEST_MODE_REPLY: &str = "That's an interesting point, tell me more about \
how you see it.";

/// Top-level configuration.
#[derive(Debug, Clone)]
pub struct StudyConfig {
    /// Chat-completions endpoint of the generation backend.
    pub backend_url: String,
    /// API key for the backend. Optional only in test mode.
    pub api_key: Option<String>,
    /// Model identifier sent with every generation request.
    pub model: String,
    /// Bounded wait applied to each generation call.
    pub gateway_timeout: Duration,
    /// Minimum spacing between cycle-initiating requests per session.
    pub cycle_spacing: Duration,
    /// Response length cap per generation call.
    pub max_tokens: u32,
    /// SQLite database location.
    pub database_path: PathBuf,
    /// When set, generation is served by a canned backend and missing
    /// credentials are not an error.
    pub test_mode: bool,
}

impl Default for StudyConfig {
    fn default() -> Self {
        Self {
            backend_url: std::env::var("COLLOQUY_BACKEND_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1/chat/completions".into()),
            api_key: std::env::var("COLLOQUY_API_KEY").ok(),
            model: std::env::var("COLLOQUY_MODEL").unwrap_or_else(|_| "gpt-4o-mini".into()),
            gateway_timeout: Duration::from_secs(
                env_u64("COLLOQUY_GATEWAY_TIMEOUT_SECS").unwrap_or(12),
            ),
            cycle_spacing: Duration::from_secs(env_u64("COLLOQUY_CYCLE_SPACING_SECS").unwrap_or(3)),
            max_tokens: env_u64("COLLOQUY_MAX_TOKENS").unwrap_or(400) as u32,
            database_path: std::env::var("COLLOQUY_DB")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("colloquy.db")),
            test_mode: std::env::var("COLLOQUY_TEST_MODE").is_ok(),
        }
    }
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok()?.parse().ok()
}

impl StudyConfig {
    /// Fail fast on configuration the core cannot run without.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.test_mode && self.api_key.is_none() {
            return Err(ConfigError::MissingApiKey);
        }
        Ok(())
    }

    /// Build the generation backend this configuration describes.
    pub fn build_backend(&self) -> Result<Arc<dyn GenerationBackend>, ConfigError> {
        if self.test_mode {
            return Ok(Arc::new(StaticBackend::new(TEST_MODE_REPLY)));
        }
        let api_key = self.api_key.clone().ok_or(ConfigError::MissingApiKey)?;
        Ok(Arc::new(HttpBackend::new(self.backend_url.clone(), api_key)?))
    }
}
