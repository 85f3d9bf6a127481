// crates/quarry-server/src/config/mod.rs
// Configuration: environment first, then ~/.quarry/config.toml overrides

pub mod env;
pub mod file;

pub use env::{ConfigValidation, EnvConfig};
pub use file::{LlmSection, QuarryConfig, ResilienceSection};

use std::path::PathBuf;

/// `~/.quarry`, or `./.quarry` when no home directory is known
pub fn quarry_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".quarry")
}

/// Load `.env` files: `~/.quarry/.env` first, then `./.env`.
/// Variables already set in the process win over both.
pub fn load_dotenv() {
    let _ = dotenvy::from_path(quarry_dir().join(".env"));
    let _ = dotenvy::dotenv();
}

/// Resolved runtime configuration
#[derive(Debug)]
pub struct Config {
    pub env: EnvConfig,
    pub file: QuarryConfig,
}

impl Config {
    pub fn load() -> Self {
        Self {
            env: EnvConfig::load(),
            file: QuarryConfig::load(),
        }
    }

    pub fn reasoning_model(&self) -> &str {
        self.file
            .llm
            .reasoning_model
            .as_deref()
            .unwrap_or(&self.env.reasoning_model)
    }

    pub fn fast_model(&self) -> &str {
        self.file
            .llm
            .fast_model
            .as_deref()
            .unwrap_or(&self.env.fast_model)
    }

    pub fn resilience(&self) -> &ResilienceSection {
        &self.file.resilience
    }
}
