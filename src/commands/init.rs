use anyhow::{Context, Result};
use issue_harvest::config::Config;
use std::path::Path;

/// Commented default configuration
pub fn default_config_toml() -> String {
    let config = Config::default();
    let fields = config
        .api
        .fields
        .iter()
        .map(|f| format!("\"{}\"", f))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        r#"# issue-harvest configuration

[api]
base_url = "{}"
search_path = "{}"
fields = [{}]
# Credentials are best supplied via HARVEST_EMAIL / HARVEST_API_TOKEN
# email = "you@example.org"
# api_token = "..."

[pipeline]
max_concurrent_transforms = {}
page_size = {}
request_timeout_secs = {}
pacing_delay_ms = {}

[retry]
max_attempts = {}
base_delay_ms = {}

[storage]
checkpoint_dir = "{}"
output_dir = "{}"

[logging]
format = "text"
level = "info"

# One entry per collection, harvested in this order.
# The default query is: project = "<id>" ORDER BY created ASC, key ASC
[[collections]]
id = "KAFKA"

# [[collections]]
# id = "SPARK"
# jql = "project = SPARK AND created >= 2023-01-01 ORDER BY created ASC, key ASC"
"#,
        config.api.base_url,
        config.api.search_path,
        fields,
        config.pipeline.max_concurrent_transforms,
        config.pipeline.page_size,
        config.pipeline.request_timeout_secs,
        config.pipeline.pacing_delay_ms,
        config.retry.max_attempts,
        config.retry.base_delay_ms,
        config.storage.checkpoint_dir.display(),
        config.storage.output_dir.display(),
    )
}

pub fn init_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists; pass --force to overwrite",
            path.display()
        );
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    std::fs::write(path, default_config_toml())
        .with_context(|| format!("Failed to write {}", path.display()))?;
    println!("Created configuration file: {}", path.display());

    Ok(())
}
