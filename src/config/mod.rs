//! Configuration for issue-harvest

mod api;
mod logging;
mod pipeline;

pub use api::{ApiConfig, CollectionConfig, DEFAULT_FIELDS, DEFAULT_USER_AGENT};
pub use logging::{LogFormat, LogLevel, LoggingConfig};
pub use pipeline::{PipelineConfig, RetryConfig, StorageConfig};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::util::file_stem_for;

/// Environment variable overriding `api.base_url`
pub const ENV_BASE_URL: &str = "HARVEST_BASE_URL";
/// Environment variable overriding `api.email`
pub const ENV_EMAIL: &str = "HARVEST_EMAIL";
/// Environment variable overriding `api.api_token`
pub const ENV_API_TOKEN: &str = "HARVEST_API_TOKEN";

/// Upper bound on requested page size; trackers cap `maxResults` well below this
const MAX_PAGE_SIZE: u64 = 1000;

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Remote API settings
    #[serde(default)]
    pub api: ApiConfig,
    /// Collections to harvest, processed in the listed order
    #[serde(default)]
    pub collections: Vec<CollectionConfig>,
    /// Pagination and concurrency settings
    #[serde(default)]
    pub pipeline: PipelineConfig,
    /// Retry settings
    #[serde(default)]
    pub retry: RetryConfig,
    /// Checkpoint and output locations
    #[serde(default)]
    pub storage: StorageConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file, apply environment overrides and validate.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file '{}'", path.display()))?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Overlay values from `HARVEST_*` environment variables
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(base_url) = lookup(ENV_BASE_URL).filter(|v| !v.is_empty()) {
            self.api.base_url = base_url;
        }
        if let Some(email) = lookup(ENV_EMAIL).filter(|v| !v.is_empty()) {
            self.api.email = Some(email);
        }
        if let Some(token) = lookup(ENV_API_TOKEN).filter(|v| !v.is_empty()) {
            self.api.api_token = Some(token);
        }
    }

    /// Validate all configuration fields.
    ///
    /// Collects every violation and reports them together.
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        match url::Url::parse(&self.api.base_url) {
            Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {}
            Ok(url) => errors.push(format!(
                "api.base_url must use http or https, got '{}'",
                url.scheme()
            )),
            Err(e) => errors.push(format!("api.base_url is not a valid URL: {}", e)),
        }
        if self.api.fields.is_empty() {
            errors.push("api.fields must list at least one field".to_string());
        }

        let mut seen = std::collections::HashSet::new();
        let mut stems: std::collections::HashMap<String, &str> = std::collections::HashMap::new();
        for collection in &self.collections {
            if collection.id.trim().is_empty() {
                errors.push("collection id must not be empty".to_string());
            } else if !seen.insert(collection.id.as_str()) {
                errors.push(format!("duplicate collection id '{}'", collection.id));
            } else if let Some(other) = stems.insert(file_stem_for(&collection.id), &collection.id) {
                errors.push(format!(
                    "collection ids '{}' and '{}' map to the same checkpoint and output files",
                    other, collection.id
                ));
            }
        }

        if self.pipeline.max_concurrent_transforms == 0 {
            errors.push("max_concurrent_transforms must be positive".to_string());
        }
        if self.pipeline.page_size == 0 {
            errors.push("page_size must be positive".to_string());
        }
        if self.pipeline.page_size > MAX_PAGE_SIZE {
            errors.push(format!("page_size must be <= {}", MAX_PAGE_SIZE));
        }
        if self.pipeline.request_timeout_secs == 0 {
            errors.push("request_timeout_secs must be positive".to_string());
        }

        if self.retry.max_attempts == 0 {
            errors.push("max_attempts must be at least 1".to_string());
        }
        if self.retry.max_attempts > 16 {
            errors.push("max_attempts must be <= 16".to_string());
        }

        if self.storage.checkpoint_dir.as_os_str().is_empty() {
            errors.push("checkpoint_dir must not be empty".to_string());
        }
        if self.storage.output_dir.as_os_str().is_empty() {
            errors.push("output_dir must not be empty".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            anyhow::bail!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            );
        }
    }

    /// Restrict the configured collections to `ids`, keeping configuration order.
    ///
    /// Unknown ids are an error so a typo never silently harvests nothing.
    pub fn select_collections(&self, ids: &[String]) -> Result<Vec<CollectionConfig>> {
        if ids.is_empty() {
            return Ok(self.collections.clone());
        }
        if let Some(unknown) = ids
            .iter()
            .find(|id| !self.collections.iter().any(|c| &c.id == *id))
        {
            anyhow::bail!("Unknown collection '{}'", unknown);
        }
        Ok(self
            .collections
            .iter()
            .filter(|c| ids.contains(&c.id))
            .cloned()
            .collect())
    }
}
