use async_trait::async_trait;
use reqwest::{header::AUTHORIZATION, StatusCode};
use secrecy::SecretString;
use serde_json::Value;

use hlb_core::{
    domain::ServiceKind,
    entitlement::{bearer, EntitlementService},
    errors::Error,
    Result,
};

use crate::{snippet, transport_error};

const CHECK_USER_SUBSCRIPTION: &str = "/helix/subscriptions/user";

/// Twitch: "Check User Subscription" with the member's user token. Helix
/// answers 404 when the user is not subscribed.
#[derive(Clone, Debug)]
pub struct TwitchService {
    http: reqwest::Client,
    api_base: String,
    client_id: String,
}

impl TwitchService {
    pub fn new(
        http: reqwest::Client,
        api_base: impl Into<String>,
        client_id: impl Into<String>,
    ) -> Self {
        Self {
            http,
            api_base: api_base.into(),
            client_id: client_id.into(),
        }
    }
}

#[async_trait]
impl EntitlementService for TwitchService {
    fn kind(&self) -> ServiceKind {
        ServiceKind::Twitch
    }

    async fn check(&self, broadcaster_id: &str, user_id: &str, token: &SecretString) -> Result<bool> {
        let resp = self
            .http
            .get(format!("{}{CHECK_USER_SUBSCRIPTION}", self.api_base))
            .query(&[("broadcaster_id", broadcaster_id), ("user_id", user_id)])
            .header("Client-Id", &self.client_id)
            .header(AUTHORIZATION, bearer(token))
            .send()
            .await
            .map_err(|e| transport_error("twitch", e))?;

        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(false);
        }

        let body = resp.text().await.map_err(|e| transport_error("twitch", e))?;
        if !status.is_success() {
            return Err(Error::api(
                "twitch subscriptions/user",
                Some(i64::from(status.as_u16())),
                snippet(&body),
            ));
        }

        let doc: Value = serde_json::from_str(&body)
            .map_err(|e| Error::Malformed(format!("twitch subscription response: {e}")))?;
        Ok(doc
            .get("data")
            .and_then(Value::as_array)
            .is_some_and(|subs| !subs.is_empty()))
    }
}
