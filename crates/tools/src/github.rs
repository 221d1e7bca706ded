//! `github_list_repos`: a user's public repositories via the GitHub REST API.

use std::sync::Arc;

use async_trait::async_trait;
use protocol::{ParamSpec, ParamType, ParameterSchema};
use reqwest::header::ACCEPT;
use reqwest::{Client, StatusCode, Url};
use runtime::{HandlerError, Params, ToolDescriptor, ToolHandler};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::{Error, Result, ToolsConfig};

const DEFAULT_PER_PAGE: i64 = 30;
const DEFAULT_PAGE: i64 = 1;

pub fn descriptor(client: Client, config: &ToolsConfig) -> ToolDescriptor {
    ToolDescriptor::new(
        "github_list_repos",
        "List repositories for a GitHub user",
        ParameterSchema::new()
            .field(
                "username",
                ParamSpec::new(ParamType::String)
                    .with_description("GitHub username (optional, uses default if not provided)"),
            )
            .field(
                "per_page",
                ParamSpec::new(ParamType::Integer)
                    .with_description("Number of repositories per page (default: 30)"),
            )
            .field(
                "page",
                ParamSpec::new(ParamType::Integer).with_description("Page number (default: 1)"),
            ),
        Arc::new(ListRepos {
            client,
            api_url: config.github_api_url.clone(),
            default_username: config.github_username.clone(),
        }),
    )
}

struct ListRepos {
    client: Client,
    api_url: String,
    default_username: Option<String>,
}

/// The subset of a GitHub repository we report.
#[derive(Debug, Serialize, Deserialize)]
struct Repository {
    name: Option<String>,
    full_name: Option<String>,
    description: Option<String>,
    html_url: Option<String>,
    language: Option<String>,
    #[serde(rename(deserialize = "stargazers_count"))]
    stars: Option<u64>,
    #[serde(rename(deserialize = "forks_count"))]
    forks: Option<u64>,
    updated_at: Option<String>,
    private: Option<bool>,
}

#[async_trait]
impl ToolHandler for ListRepos {
    async fn call(&self, params: Params) -> std::result::Result<Value, HandlerError> {
        let username = match params.str("username").filter(|name| !name.is_empty()) {
            Some(name) => name.to_string(),
            None => {
                let name = self.default_username.clone().ok_or(Error::MissingUsername)?;
                tracing::debug!(username = %name, "using default GitHub username");
                name
            }
        };
        let per_page = params.i64("per_page").unwrap_or(DEFAULT_PER_PAGE);
        let page = params.i64("page").unwrap_or(DEFAULT_PAGE);

        let repositories = self.fetch(&username, per_page, page).await?;
        tracing::debug!(username = %username, count = repositories.len(), "fetched repositories");
        Ok(json!({
            "count": repositories.len(),
            "repositories": repositories,
            "page": page,
            "per_page": per_page,
        }))
    }
}

impl ListRepos {
    async fn fetch(&self, username: &str, per_page: i64, page: i64) -> Result<Vec<Repository>> {
        let mut url = Url::parse(&self.api_url)
            .map_err(|e| Error::InvalidUrl(format!("{}: {e}", self.api_url)))?;
        url.path_segments_mut()
            .map_err(|()| Error::InvalidUrl(self.api_url.clone()))?
            .pop_if_empty()
            .extend(["users", username, "repos"]);
        url.query_pairs_mut()
            .append_pair("per_page", &per_page.to_string())
            .append_pair("page", &page.to_string())
            .append_pair("sort", "updated");

        let response = self
            .client
            .get(url)
            .header(ACCEPT, "application/vnd.github.v3+json")
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            let message = response
                .json::<Value>()
                .await
                .ok()
                .and_then(|body| body.get("message").and_then(Value::as_str).map(str::to_string))
                .unwrap_or_else(|| "Unknown error".to_string());
            tracing::warn!(username = %username, status = status.as_u16(), "GitHub API error: {message}");
            return Err(Error::GitHub {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Json;
    use axum::Router;
    use axum::extract::{Path, Query};
    use axum::http::StatusCode as HttpStatus;
    use axum::response::IntoResponse;
    use axum::routing::get;
    use std::collections::HashMap;

    async fn repos(
        Path(user): Path<String>,
        Query(query): Query<HashMap<String, String>>,
    ) -> axum::response::Response {
        if user == "ghost" {
            return (HttpStatus::NOT_FOUND, Json(json!({"message": "Not Found"}))).into_response();
        }
        Json(json!([{
            "name": "hello-world",
            "full_name": format!("{user}/hello-world"),
            "description": format!("page {} of {}", query["page"], query["per_page"]),
            "html_url": "https://github.com/octocat/hello-world",
            "language": "Rust",
            "stargazers_count": 42,
            "forks_count": 7,
            "updated_at": "2024-01-01T00:00:00Z",
            "private": false,
            "owner": {"login": user},
        }]))
        .into_response()
    }

    async fn tool(default_username: Option<&str>) -> ToolDescriptor {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let router = Router::new().route("/users/{user}/repos", get(repos));
        tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });

        let config = ToolsConfig {
            github_username: default_username.map(str::to_string),
            github_api_url: format!("http://{addr}"),
            ..ToolsConfig::default()
        };
        descriptor(Client::builder().no_proxy().build().unwrap(), &config)
    }

    fn params(value: Value) -> Params {
        Params::new(value.as_object().cloned().unwrap_or_default())
    }

    #[tokio::test]
    async fn lists_repositories_with_paging() {
        let tool = tool(None).await;
        let result = tool
            .handler
            .call(params(json!({"username": "octocat", "per_page": 5, "page": 2})))
            .await
            .unwrap();

        assert_eq!(result["count"], 1);
        assert_eq!(result["page"], 2);
        assert_eq!(result["per_page"], 5);
        let repo = &result["repositories"][0];
        assert_eq!(repo["full_name"], "octocat/hello-world");
        assert_eq!(repo["description"], "page 2 of 5");
        assert_eq!(repo["stars"], 42);
        assert_eq!(repo["forks"], 7);
        assert!(repo.get("owner").is_none());
    }

    #[tokio::test]
    async fn falls_back_to_default_username() {
        let tool = tool(Some("defaulted")).await;
        let result = tool.handler.call(params(json!({}))).await.unwrap();
        assert_eq!(result["repositories"][0]["full_name"], "defaulted/hello-world");
        assert_eq!(result["per_page"], 30);
        assert_eq!(result["page"], 1);
    }

    #[tokio::test]
    async fn missing_username_is_an_error() {
        let tool = tool(None).await;
        let err = tool.handler.call(params(json!({}))).await.unwrap_err();
        assert_eq!(
            err.message(),
            "no username provided and no default username configured"
        );
    }

    #[tokio::test]
    async fn api_error_carries_message() {
        let tool = tool(None).await;
        let err = tool
            .handler
            .call(params(json!({"username": "ghost"})))
            .await
            .unwrap_err();
        assert_eq!(
            err.message(),
            "GitHub API returned status code 404: Not Found"
        );
    }
}
