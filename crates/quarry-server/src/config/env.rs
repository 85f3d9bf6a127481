// crates/quarry-server/src/config/env.rs
// Environment-based configuration - single source of truth for all env vars

use tracing::{debug, info, warn};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_REASONING_MODEL: &str = "gpt-4o";
pub const DEFAULT_FAST_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_PORT: u16 = 8000;

/// Environment configuration - all env vars in one place
#[derive(Debug, Clone)]
pub struct EnvConfig {
    /// LLM API key (OPENAI_API_KEY)
    pub api_key: Option<String>,
    /// OpenAI-compatible endpoint (OPENAI_BASE_URL)
    pub base_url: String,
    /// Model for answers and planning (OPENAI_MODEL_REASONING)
    pub reasoning_model: String,
    /// Model for rephrase, search queries and related questions (OPENAI_MODEL_FAST)
    pub fast_model: String,
    /// SearXNG host (SEARXNG_BASE_URL)
    pub searxng_url: Option<String>,
    /// Enable planned execution (QUARRY_PRO_MODE)
    pub pro_mode: bool,
    /// HTTP port (QUARRY_PORT)
    pub port: u16,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            reasoning_model: DEFAULT_REASONING_MODEL.to_string(),
            fast_model: DEFAULT_FAST_MODEL.to_string(),
            searxng_url: None,
            pro_mode: true,
            port: DEFAULT_PORT,
        }
    }
}

impl EnvConfig {
    /// Load all environment configuration (call once at startup)
    pub fn load() -> Self {
        info!("Loading environment configuration");
        let config = Self::from_lookup(|name| std::env::var(name).ok());
        config.log_status();
        config
    }

    /// Build from an arbitrary variable lookup, so tests never touch the
    /// process environment
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let port = match read("QUARRY_PORT") {
            Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
                warn!(value = %raw, "Invalid QUARRY_PORT, using default");
                DEFAULT_PORT
            }),
            None => DEFAULT_PORT,
        };

        Self {
            api_key: read("OPENAI_API_KEY"),
            base_url: read("OPENAI_BASE_URL")
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or(defaults.base_url),
            reasoning_model: read("OPENAI_MODEL_REASONING").unwrap_or(defaults.reasoning_model),
            fast_model: read("OPENAI_MODEL_FAST").unwrap_or(defaults.fast_model),
            searxng_url: read("SEARXNG_BASE_URL").map(|u| u.trim_end_matches('/').to_string()),
            pro_mode: read("QUARRY_PRO_MODE")
                .and_then(|v| parse_bool(&v))
                .unwrap_or(true),
            port,
        }
    }

    /// Whether the endpoint supports `response_format: json_schema`
    pub fn uses_native_schema(&self) -> bool {
        url::Url::parse(&self.base_url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h == "api.openai.com"))
            .unwrap_or(false)
    }

    fn log_status(&self) {
        if self.api_key.is_none() {
            warn!("OPENAI_API_KEY not set - LLM calls will be rejected by the provider");
        }
        debug!(
            base_url = %self.base_url,
            reasoning_model = %self.reasoning_model,
            fast_model = %self.fast_model,
            pro_mode = self.pro_mode,
            "LLM configuration"
        );
    }

    /// Validate the configuration
    pub fn validate(&self) -> ConfigValidation {
        let mut validation = ConfigValidation::new();

        if self.api_key.is_none() {
            validation.add_warning("No LLM API key configured. Set OPENAI_API_KEY.");
        }

        match &self.searxng_url {
            None => validation.add_error("No search provider configured. Set SEARXNG_BASE_URL."),
            Some(u) if url::Url::parse(u).is_err() => {
                validation.add_error(format!("SEARXNG_BASE_URL is not a valid URL: {}", u))
            }
            Some(_) => {}
        }

        if url::Url::parse(&self.base_url).is_err() {
            validation.add_error(format!("OPENAI_BASE_URL is not a valid URL: {}", self.base_url));
        }

        validation
    }
}

/// Configuration validation result
#[derive(Debug, Default)]
pub struct ConfigValidation {
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl ConfigValidation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_warning(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    pub fn add_error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    /// Format as a human-readable report
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        if !self.errors.is_empty() {
            lines.push("Errors:".to_string());
            lines.extend(self.errors.iter().map(|e| format!("  - {}", e)));
        }
        if !self.warnings.is_empty() {
            lines.push("Warnings:".to_string());
            lines.extend(self.warnings.iter().map(|w| format!("  - {}", w)));
        }

        if lines.is_empty() {
            "Configuration OK".to_string()
        } else {
            lines.join("\n")
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
