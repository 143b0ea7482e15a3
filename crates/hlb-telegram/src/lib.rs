//! Telegram adapter.
//!
//! This crate implements the `hlb-core` PlatformApi port over the Telegram
//! Bot API, plus the update dispatcher, chat handlers and the polling loop.

use std::{fs, sync::Arc, time::Duration};

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::Value;

pub mod dispatcher;
pub mod handlers;
pub mod router;

#[cfg(test)]
mod testing;

use hlb_core::{
    config::Config,
    errors::Error,
    platform::PlatformApi,
    secrets::{SecretBlob, SecretStore},
    Result,
};

/// Response envelope shared by every Bot API method.
#[derive(Debug, Deserialize)]
struct ApiEnvelope {
    ok: bool,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    error_code: Option<i64>,
}

/// Stateless Bot API client. The token stays sealed; it is opened per call
/// only to build the request URL.
#[derive(Clone)]
pub struct TelegramClient {
    http: reqwest::Client,
    api_base: String,
    token: SecretBlob,
    secrets: Arc<SecretStore>,
}

impl TelegramClient {
    pub fn new(cfg: &Config) -> Result<Self> {
        let http = build_http_client(cfg.request_timeout, cfg.ca_bundle_path.as_deref())?;
        Ok(Self::with_http(
            http,
            cfg.api_base.clone(),
            cfg.bot_token.clone(),
            cfg.secrets.clone(),
        ))
    }

    pub fn with_http(
        http: reqwest::Client,
        api_base: impl Into<String>,
        token: SecretBlob,
        secrets: Arc<SecretStore>,
    ) -> Self {
        Self {
            http,
            api_base: api_base.into(),
            token,
            secrets,
        }
    }

    /// `<api_base>/bot<token>/<method>`; contains the token, never log it.
    fn request_uri(&self, method: &str) -> Result<SecretString> {
        let token = self.secrets.open_string(&self.token)?;
        Ok(SecretString::from(format!(
            "{}/bot{}/{method}",
            self.api_base,
            token.expose_secret()
        )))
    }
}

/// HTTP client with a bounded timeout and, optionally, an extra PEM trust bundle.
pub fn build_http_client(
    timeout: Duration,
    ca_bundle: Option<&std::path::Path>,
) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .timeout(timeout)
        .user_agent("hlb/0.1");

    if let Some(path) = ca_bundle {
        let pem = fs::read(path)?;
        let cert = reqwest::Certificate::from_pem(&pem).map_err(|e| {
            Error::Config(format!("invalid CA bundle {}: {e}", path.display()))
        })?;
        builder = builder.add_root_certificate(cert);
    }

    builder
        .build()
        .map_err(|e| Error::Config(format!("http client build failed: {e}")))
}

fn transport_error(method: &str, e: reqwest::Error) -> Error {
    let what = if e.is_timeout() {
        "timed out"
    } else if e.is_connect() {
        "connection failed"
    } else {
        "request failed"
    };
    // The URL carries the bot token.
    Error::Transport(format!("{method}: {what}: {}", e.without_url()))
}

#[async_trait]
impl PlatformApi for TelegramClient {
    async fn call(&self, method: &str, params: Value) -> Result<Value> {
        let uri = self.request_uri(method)?;
        let resp = self
            .http
            .post(uri.expose_secret())
            .json(&params)
            .send()
            .await
            .map_err(|e| transport_error(method, e))?;

        let status = resp.status();
        let body = resp
            .bytes()
            .await
            .map_err(|e| transport_error(method, e))?;

        let envelope: ApiEnvelope = serde_json::from_slice(&body).map_err(|_| {
            Error::Transport(format!(
                "{method}: unexpected non-API response (HTTP {status})"
            ))
        })?;

        if !envelope.ok {
            tracing::debug!(method, status = status.as_u16(), "telegram api call failed");
            return Err(Error::api(
                method,
                envelope.error_code,
                envelope
                    .description
                    .unwrap_or_else(|| format!("HTTP {status}")),
            ));
        }

        Ok(envelope.result.unwrap_or(Value::Null))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hlb_core::{
        domain::ChatId,
        platform::chat_params,
        secrets::SymmetricKey,
    };
    use serde_json::json;
    use wiremock::{
        matchers::{body_json, method, path},
        Mock, MockServer, ResponseTemplate,
    };

    const TOKEN: &str = "123:secret";

    fn client(base: &str) -> TelegramClient {
        let secrets = Arc::new(SecretStore::new(SymmetricKey::generate()));
        let token = secrets.seal_str(TOKEN).unwrap();
        let http = build_http_client(Duration::from_secs(2), None).unwrap();
        TelegramClient::with_http(http, base, token, secrets)
    }

    #[tokio::test]
    async fn posts_json_to_token_path_and_returns_result() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("/bot{TOKEN}/sendMessage")))
            .and(body_json(json!({
                "chat_id": 5,
                "text": "hello",
                "parse_mode": "Markdown"
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "ok": true, "result": { "message_id": 9 } })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let api = client(&server.uri());
        let result = api
            .send_message("hello", chat_params(ChatId(5)))
            .await
            .unwrap();
        assert_eq!(result["message_id"], 9);
    }

    #[tokio::test]
    async fn ok_false_is_an_api_error_regardless_of_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("/bot{TOKEN}/getChatAdministrators")))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "ok": false,
                "error_code": 400,
                "description": "Bad Request: chat not found"
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(format!("/bot{TOKEN}/getMe")))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "ok": false, "description": "nope" })),
            )
            .mount(&server)
            .await;

        let api = client(&server.uri());
        match api.get_chat_administrators(ChatId(1)).await {
            Err(Error::Api {
                method,
                code,
                description,
            }) => {
                assert_eq!(method, "getChatAdministrators");
                assert_eq!(code, Some(400));
                assert!(description.contains("chat not found"));
            }
            other => panic!("expected api error, got {other:?}"),
        }
        assert!(matches!(
            api.call("getMe", json!({})).await,
            Err(Error::Api { code: None, .. })
        ));
    }

    #[tokio::test]
    async fn non_api_body_is_a_transport_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502).set_body_string("<html>bad gateway</html>"))
            .mount(&server)
            .await;

        let api = client(&server.uri());
        assert!(matches!(
            api.call("getMe", json!({})).await,
            Err(Error::Transport(_))
        ));
    }

    #[tokio::test]
    async fn unreachable_host_is_a_transport_error_without_the_token() {
        // Port 9 (discard) on localhost is not expected to accept connections.
        let api = client("http://127.0.0.1:9");
        match api.call("getMe", json!({})).await {
            Err(Error::Transport(msg)) => assert!(!msg.contains("secret")),
            other => panic!("expected transport error, got {other:?}"),
        }
    }
}
