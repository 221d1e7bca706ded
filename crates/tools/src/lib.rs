//! Capstan built-in tools.
//!
//! Handlers for the tools every server ships with, plus the startup phase that
//! registers them:
//!
//! - `file_search`: glob a directory.
//! - `code_analysis`: line metrics for a file, or a size/type census of a directory.
//! - `web_request`: make an HTTP request and return status, headers and body.
//! - `github_list_repos`: list a user's public GitHub repositories.

mod code_analysis;
mod error;
mod file_search;
mod github;
mod web_request;

use std::time::Duration;

use runtime::{ToolDescriptor, ToolRegistry};

pub use error::{Error, Result};

/// Default timeout for outbound HTTP requests.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Base URL of the public GitHub REST API.
pub const GITHUB_API_URL: &str = "https://api.github.com";

const USER_AGENT: &str = concat!("capstan/", env!("CARGO_PKG_VERSION"));

/// Settings shared by the built-in tools.
#[derive(Debug, Clone)]
pub struct ToolsConfig {
    /// Default user for `github_list_repos`.
    pub github_username: Option<String>,
    pub github_api_url: String,
    pub http_timeout: Duration,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            github_username: None,
            github_api_url: GITHUB_API_URL.to_string(),
            http_timeout: DEFAULT_HTTP_TIMEOUT,
        }
    }
}

impl ToolsConfig {
    /// Fill unset values from the environment (`GITHUB_USERNAME`).
    pub fn with_env_defaults(mut self) -> Self {
        if self.github_username.is_none() {
            self.github_username = std::env::var("GITHUB_USERNAME")
                .ok()
                .filter(|name| !name.is_empty());
        }
        self
    }
}

/// Descriptors for every built-in tool, in registration order.
pub fn builtin_tools(config: &ToolsConfig) -> Result<Vec<ToolDescriptor>> {
    let client = reqwest::Client::builder()
        .timeout(config.http_timeout)
        .user_agent(USER_AGENT)
        .build()?;

    Ok(vec![
        file_search::descriptor(),
        code_analysis::descriptor(),
        web_request::descriptor(client.clone()),
        github::descriptor(client, config),
    ])
}

/// Register every built-in tool. Any failure, including a duplicate name,
/// should abort startup.
pub async fn register_builtin(registry: &ToolRegistry, config: &ToolsConfig) -> Result<()> {
    for descriptor in builtin_tools(config)? {
        registry.register(descriptor).await?;
    }
    tracing::info!(count = registry.len().await, "registered built-in tools");
    Ok(())
}
