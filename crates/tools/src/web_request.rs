//! `web_request`: outbound HTTP calls.

use std::sync::Arc;

use async_trait::async_trait;
use protocol::{ParamSpec, ParamType, ParameterSchema};
use reqwest::{Client, Method, Url};
use runtime::{HandlerError, Params, ToolDescriptor, ToolHandler};
use serde_json::{Map, Value, json};

use crate::Error;

pub fn descriptor(client: Client) -> ToolDescriptor {
    ToolDescriptor::new(
        "web_request",
        "Make HTTP requests to external APIs",
        ParameterSchema::new()
            .field(
                "url",
                ParamSpec::new(ParamType::String)
                    .required()
                    .with_description("URL to send the request to"),
            )
            .field(
                "method",
                ParamSpec::new(ParamType::String)
                    .with_description("HTTP method (GET, POST, PUT, DELETE)"),
            )
            .field(
                "headers",
                ParamSpec::new(ParamType::Object).with_description("HTTP headers to include"),
            )
            .field(
                "data",
                ParamSpec::new(ParamType::Object)
                    .with_description("Data to send in the request body"),
            ),
        Arc::new(WebRequest { client }),
    )
}

struct WebRequest {
    client: Client,
}

#[async_trait]
impl ToolHandler for WebRequest {
    async fn call(&self, params: Params) -> Result<Value, HandlerError> {
        let url = params.str("url").unwrap_or_default();
        let method = parse_method(params.str("method").unwrap_or("GET"))?;
        let url = Url::parse(url).map_err(|e| Error::InvalidUrl(format!("{url}: {e}")))?;

        tracing::debug!(%method, %url, "web request");
        let mut request = self.client.request(method.clone(), url);
        if let Some(headers) = params.object("headers") {
            for (name, value) in headers {
                let value = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                request = request.header(name.as_str(), value);
            }
        }
        if matches!(method, Method::POST | Method::PUT) {
            if let Some(data) = params.object("data") {
                request = request.json(data);
            }
        }

        let response = request.send().await.map_err(Error::from)?;
        let status = response.status().as_u16();
        let headers: Map<String, Value> = response
            .headers()
            .iter()
            .map(|(name, value)| {
                let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
                (name.as_str().to_string(), Value::String(value))
            })
            .collect();
        let body = response.text().await.map_err(Error::from)?;

        let mut result = json!({ "status_code": status, "headers": headers });
        match serde_json::from_str::<Value>(&body) {
            Ok(parsed) => result["json"] = parsed,
            Err(_) => result["text"] = Value::String(body),
        }
        Ok(result)
    }
}

fn parse_method(method: &str) -> Result<Method, Error> {
    match method.to_ascii_uppercase().as_str() {
        "GET" => Ok(Method::GET),
        "POST" => Ok(Method::POST),
        "PUT" => Ok(Method::PUT),
        "DELETE" => Ok(Method::DELETE),
        other => Err(Error::UnsupportedMethod(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Json;
    use axum::Router;
    use axum::http::HeaderMap;
    use axum::routing::get;

    async fn spawn(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });
        format!("http://{addr}")
    }

    async fn mock() -> String {
        let router = Router::new()
            .route("/json", get(|| async { Json(json!({"ok": true})) }))
            .route("/text", get(|| async { "plain body" }))
            .route(
                "/echo",
                get(|| async { "no body" }).post(
                    |headers: HeaderMap, Json(body): Json<Value>| async move {
                        let token = headers
                            .get("x-token")
                            .and_then(|v| v.to_str().ok())
                            .map(str::to_string);
                        Json(json!({ "received": body, "token": token }))
                    },
                ),
            );
        spawn(router).await
    }

    fn tool() -> ToolDescriptor {
        descriptor(Client::builder().no_proxy().build().unwrap())
    }

    fn params(value: Value) -> Params {
        Params::new(value.as_object().cloned().unwrap_or_default())
    }

    #[tokio::test]
    async fn json_response_is_parsed() {
        let base = mock().await;
        let result = tool()
            .handler
            .call(params(json!({ "url": format!("{base}/json") })))
            .await
            .unwrap();
        assert_eq!(result["status_code"], 200);
        assert_eq!(result["json"], json!({"ok": true}));
        assert_eq!(result["headers"]["content-type"], "application/json");
        assert!(result.get("text").is_none());
    }

    #[tokio::test]
    async fn non_json_response_is_text() {
        let base = mock().await;
        let result = tool()
            .handler
            .call(params(json!({ "url": format!("{base}/text"), "method": "get" })))
            .await
            .unwrap();
        assert_eq!(result["text"], "plain body");
        assert!(result.get("json").is_none());
    }

    #[tokio::test]
    async fn post_sends_headers_and_json_body() {
        let base = mock().await;
        let result = tool()
            .handler
            .call(params(json!({
                "url": format!("{base}/echo"),
                "method": "POST",
                "headers": {"x-token": "secret"},
                "data": {"name": "capstan"},
            })))
            .await
            .unwrap();
        assert_eq!(
            result["json"],
            json!({ "received": {"name": "capstan"}, "token": "secret" })
        );
    }

    #[tokio::test]
    async fn unsupported_method_and_bad_url_fail() {
        let err = tool()
            .handler
            .call(params(json!({ "url": "http://localhost/", "method": "PATCH" })))
            .await
            .unwrap_err();
        assert_eq!(err.message(), "unsupported HTTP method: PATCH");

        let err = tool()
            .handler
            .call(params(json!({ "url": "not a url" })))
            .await
            .unwrap_err();
        assert!(err.message().starts_with("invalid URL"));
    }

    #[tokio::test]
    async fn unreachable_host_is_handler_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = tool()
            .handler
            .call(params(json!({ "url": format!("http://{addr}/") })))
            .await
            .unwrap_err();
        assert!(err.message().starts_with("request failed"));
    }
}
