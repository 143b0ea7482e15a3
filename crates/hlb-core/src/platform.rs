use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::{domain::ChatId, Result};

/// Formatting mode applied to outgoing messages unless the caller picks one.
pub const DEFAULT_PARSE_MODE: &str = "Markdown";

/// Port for the messaging platform's HTTP API.
///
/// Implementations perform exactly one round trip per call: no retries,
/// retry policy belongs to the caller.
#[async_trait]
pub trait PlatformApi: Send + Sync {
    /// Invoke `method` with a JSON object of parameters; returns the `result`
    /// payload of a successful response.
    async fn call(&self, method: &str, params: Value) -> Result<Value>;

    async fn send_message(&self, text: &str, params: Map<String, Value>) -> Result<Value> {
        self.call("sendMessage", Value::Object(message_params(text, params)))
            .await
    }

    async fn set_webhook(&self, url: &str) -> Result<Value> {
        self.call("setWebhook", json!({ "url": url })).await
    }

    /// Fetch pending updates. `offset` confirms every update below it.
    async fn get_updates(&self, offset: Option<i64>) -> Result<Vec<Value>> {
        let params = match offset {
            Some(offset) => json!({ "offset": offset }),
            None => json!({}),
        };
        let result = self.call("getUpdates", params).await?;
        Ok(match result {
            Value::Array(items) => items,
            _ => Vec::new(),
        })
    }

    async fn get_chat_administrators(&self, chat_id: ChatId) -> Result<Value> {
        self.call("getChatAdministrators", json!({ "chat_id": chat_id.0 }))
            .await
    }
}

/// Build `sendMessage` parameters: the text, the caller's parameters, and
/// the default parse mode when none (or an empty one) was given.
pub fn message_params(text: &str, mut params: Map<String, Value>) -> Map<String, Value> {
    let has_mode = params
        .get("parse_mode")
        .and_then(Value::as_str)
        .is_some_and(|m| !m.is_empty());
    if !has_mode {
        params.insert("parse_mode".to_string(), json!(DEFAULT_PARSE_MODE));
    }
    params.insert("text".to_string(), json!(text));
    params
}

/// Parameters addressed at one chat.
pub fn chat_params(chat_id: ChatId) -> Map<String, Value> {
    let mut params = Map::new();
    params.insert("chat_id".to_string(), json!(chat_id.0));
    params
}
