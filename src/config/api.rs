//! Remote API and collection configuration

use serde::{Deserialize, Serialize};

/// Default user agent for requests against the tracker API
pub const DEFAULT_USER_AGENT: &str = concat!("issue-harvest/", env!("CARGO_PKG_VERSION"));

/// Fields requested from the search endpoint unless overridden
pub const DEFAULT_FIELDS: &[&str] = &[
    "summary",
    "description",
    "status",
    "priority",
    "issuetype",
    "labels",
    "components",
    "reporter",
    "assignee",
    "created",
    "updated",
    "resolution",
    "comment",
];

/// Connection settings for the issue tracker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Tracker base URL (e.g. "https://issues.apache.org/jira")
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Path of the paginated search endpoint, relative to `base_url`
    #[serde(default = "default_search_path")]
    pub search_path: String,
    /// Account email for basic auth
    #[serde(default)]
    pub email: Option<String>,
    /// API token for basic auth. Prefer `HARVEST_API_TOKEN` over the file.
    #[serde(default)]
    pub api_token: Option<String>,
    /// Field-selection list sent with every page request
    #[serde(default = "default_fields")]
    pub fields: Vec<String>,
    /// User agent string
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_base_url() -> String {
    "https://issues.apache.org/jira".to_string()
}

fn default_search_path() -> String {
    "rest/api/2/search".to_string()
}

fn default_fields() -> Vec<String> {
    DEFAULT_FIELDS.iter().map(|f| f.to_string()).collect()
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            search_path: default_search_path(),
            email: None,
            api_token: None,
            fields: default_fields(),
            user_agent: default_user_agent(),
        }
    }
}

impl ApiConfig {
    /// Basic-auth credentials, if both halves are present
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (&self.email, &self.api_token) {
            (Some(email), Some(token)) if !email.is_empty() && !token.is_empty() => {
                Some((email.as_str(), token.as_str()))
            }
            _ => None,
        }
    }
}

/// One named partition of work, usually a single project
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionConfig {
    /// Collection identifier (project key)
    pub id: String,
    /// Query override. Defaults to every issue of the project in creation order.
    #[serde(default)]
    pub jql: Option<String>,
}

impl CollectionConfig {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            jql: None,
        }
    }

    pub fn with_jql(mut self, jql: impl Into<String>) -> Self {
        self.jql = Some(jql.into());
        self
    }

    /// Query sent to the search endpoint.
    ///
    /// The ordering must be total and stable, otherwise offsets drift between
    /// pages and between runs.
    pub fn query(&self) -> String {
        match &self.jql {
            Some(jql) => jql.clone(),
            None => format!(
                "project = \"{}\" ORDER BY created ASC, key ASC",
                self.id.replace('"', "\\\"")
            ),
        }
    }
}
