//! Minimal JSON-over-HTTP gateway.
//!
//! - `HttpGateway` is the async trait the orchestrators depend on.
//! - `ReqwestGateway` implements it with a shared `reqwest::Client` that
//!   carries the configured timeout and user agent.

use std::time::Duration;

use async_trait::async_trait;
use cityboard_core::config::GatewayConfig;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::Value;

use crate::error::GatewayError;

/// Send a request, get parsed JSON back or an error.
///
/// Implementations own timeouts, TLS and connection reuse. Callers that no
/// longer want a result simply ignore it.
#[async_trait]
pub trait HttpGateway: Send + Sync {
    /// `GET url` and parse the body as JSON.
    async fn get(&self, url: &str) -> Result<Value, GatewayError>;

    /// `POST url` with extra headers and a JSON body; parse the reply as JSON.
    async fn post(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        body: &Value,
    ) -> Result<Value, GatewayError>;
}

/// `reqwest`-backed gateway.
#[derive(Debug, Clone)]
pub struct ReqwestGateway {
    client: Client,
}

impl ReqwestGateway {
    /// Wrap an existing client.
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Build a client from the `[gateway]` config section.
    pub fn from_config(config: &GatewayConfig) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| GatewayError::Request(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    async fn into_json(response: Response) -> Result<Value, GatewayError> {
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            tracing::debug!(status = status.as_u16(), "Gateway received error status");
            return Err(GatewayError::Status {
                status: status.as_u16(),
                message: status_message(status, &body),
            });
        }

        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl HttpGateway for ReqwestGateway {
    async fn get(&self, url: &str) -> Result<Value, GatewayError> {
        tracing::debug!(url = %url, "GET");
        let response = self.client.get(url).send().await?;
        Self::into_json(response).await
    }

    async fn post(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        body: &Value,
    ) -> Result<Value, GatewayError> {
        tracing::debug!(url = %url, "POST");
        let mut request = self.client.post(url).json(body);
        for (name, value) in headers {
            request = request.header(*name, *value);
        }
        let response = request.send().await?;
        Self::into_json(response).await
    }
}

#[derive(Deserialize)]
struct ErrorWrapper {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
    status: Option<String>,
}

/// Message for a non-2xx reply; a blank body falls back to the status line.
pub(crate) fn status_message(status: StatusCode, body: &str) -> String {
    if body.trim().is_empty() {
        return status
            .canonical_reason()
            .map(str::to_string)
            .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
    }
    error_message_from_body(body)
}

/// Pull the service's own error message out of a failure body.
///
/// Understands the `{"error": {"status": ..., "message": ...}}` envelope used by
/// Google APIs; anything else is passed through as raw text.
pub(crate) fn error_message_from_body(body: &str) -> String {
    serde_json::from_str::<ErrorWrapper>(body)
        .map(|wrapper| {
            let status_text = wrapper.error.status.unwrap_or_default();
            let msg = wrapper.error.message.unwrap_or_else(|| body.to_string());
            if status_text.is_empty() {
                msg
            } else {
                format!("{status_text}: {msg}")
            }
        })
        .unwrap_or_else(|_| body.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve exactly one canned HTTP response on a local port.
    async fn serve_once(status_line: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 1024];
            while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
            }
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status_line,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
        });
        format!("http://{}", addr)
    }

    #[test]
    fn test_error_message_from_google_envelope() {
        let body = r#"{"error":{"code":400,"message":"API key not valid.","status":"INVALID_ARGUMENT"}}"#;
        assert_eq!(
            error_message_from_body(body),
            "INVALID_ARGUMENT: API key not valid."
        );
    }

    #[test]
    fn test_error_message_without_status() {
        let body = r#"{"error":{"message":"quota exceeded"}}"#;
        assert_eq!(error_message_from_body(body), "quota exceeded");
    }

    #[test]
    fn test_error_message_from_plain_text() {
        assert_eq!(error_message_from_body("Bad Gateway"), "Bad Gateway");
    }

    #[test]
    fn test_blank_error_body_uses_status_line() {
        assert_eq!(status_message(StatusCode::BAD_GATEWAY, ""), "Bad Gateway");
        assert_eq!(status_message(StatusCode::SERVICE_UNAVAILABLE, " \n"), "Service Unavailable");
        let unnamed = StatusCode::from_u16(599).unwrap();
        assert_eq!(status_message(unnamed, ""), "HTTP 599");
        assert_eq!(status_message(StatusCode::NOT_FOUND, "gone"), "gone");
    }

    #[tokio::test]
    async fn test_get_maps_empty_error_body() {
        let base = serve_once("502 Bad Gateway", "").await;
        let gateway = ReqwestGateway::from_config(&GatewayConfig::default()).unwrap();
        let err = gateway.get(&base).await.unwrap_err();
        assert_eq!(
            err,
            GatewayError::Status {
                status: 502,
                message: "Bad Gateway".to_string()
            }
        );
        assert_eq!(err.message(), "Bad Gateway");
    }

    #[test]
    fn test_from_config_builds_client() {
        let gateway = ReqwestGateway::from_config(&GatewayConfig::default());
        assert!(gateway.is_ok());
    }

    #[tokio::test]
    async fn test_get_parses_json_body() {
        let base = serve_once("200 OK", r#"{"data":{"taipei":[]}}"#).await;
        let gateway = ReqwestGateway::from_config(&GatewayConfig::default()).unwrap();
        let value = gateway
            .get(&format!("{}/api/v1/dashboard?city=taipei", base))
            .await
            .unwrap();
        assert_eq!(value["data"]["taipei"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_get_maps_error_status() {
        let base = serve_once(
            "404 Not Found",
            r#"{"error":{"message":"component not found"}}"#,
        )
        .await;
        let gateway = ReqwestGateway::from_config(&GatewayConfig::default()).unwrap();
        let err = gateway
            .get(&format!("{}/api/v1/component/1/chart", base))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            GatewayError::Status {
                status: 404,
                message: "component not found".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_get_rejects_non_json_body() {
        let base = serve_once("200 OK", "<html>oops</html>").await;
        let gateway = ReqwestGateway::from_config(&GatewayConfig::default()).unwrap();
        let err = gateway.get(&base).await.unwrap_err();
        assert!(matches!(err, GatewayError::Decode(_)));
    }

    #[tokio::test]
    async fn test_connection_refused_is_request_error() {
        // Bind then drop to get a port nothing listens on.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let gateway = ReqwestGateway::from_config(&GatewayConfig::default()).unwrap();
        let err = gateway.get(&format!("http://{}", addr)).await.unwrap_err();
        assert!(matches!(err, GatewayError::Request(_)));
    }
}
