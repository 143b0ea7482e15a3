use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use secrecy::SecretString;
use serde_json::Value;

use hlb_core::{
    domain::ServiceKind,
    entitlement::{bearer, EntitlementService},
    errors::Error,
    Result,
};

use crate::{snippet, transport_error};

const IDENTITY_PATH: &str = "/api/oauth2/v2/identity";
const ACTIVE_PATRON: &str = "active_patron";

/// Patreon: a member qualifies while one of their memberships belongs to the
/// creator's campaign and is `active_patron`.
#[derive(Clone, Debug)]
pub struct PatreonService {
    http: reqwest::Client,
    api_base: String,
}

impl PatreonService {
    pub fn new(http: reqwest::Client, api_base: impl Into<String>) -> Self {
        Self {
            http,
            api_base: api_base.into(),
        }
    }
}

#[async_trait]
impl EntitlementService for PatreonService {
    fn kind(&self) -> ServiceKind {
        ServiceKind::Patreon
    }

    async fn check(&self, campaign_id: &str, member_id: &str, token: &SecretString) -> Result<bool> {
        let resp = self
            .http
            .get(format!("{}{IDENTITY_PATH}", self.api_base))
            .query(&[
                ("include", "memberships.campaign"),
                ("fields[member]", "patron_status"),
            ])
            .header(AUTHORIZATION, bearer(token))
            .send()
            .await
            .map_err(|e| transport_error("patreon", e))?;

        let status = resp.status();
        let body = resp.text().await.map_err(|e| transport_error("patreon", e))?;
        if !status.is_success() {
            return Err(Error::api(
                "patreon identity",
                Some(i64::from(status.as_u16())),
                snippet(&body),
            ));
        }

        let doc: Value = serde_json::from_str(&body)
            .map_err(|e| Error::Malformed(format!("patreon identity response: {e}")))?;

        if let Some(id) = doc.pointer("/data/id").and_then(Value::as_str) {
            if id != member_id {
                tracing::warn!(
                    linked = member_id,
                    actual = id,
                    "patreon token belongs to a different user"
                );
                return Ok(false);
            }
        }

        Ok(is_active_patron(&doc, campaign_id))
    }
}

/// Scan the JSON:API `included` members for an active pledge to `campaign_id`.
fn is_active_patron(doc: &Value, campaign_id: &str) -> bool {
    let Some(included) = doc.get("included").and_then(Value::as_array) else {
        return false;
    };

    included.iter().any(|item| {
        item.get("type").and_then(Value::as_str) == Some("member")
            && item.pointer("/attributes/patron_status").and_then(Value::as_str)
                == Some(ACTIVE_PATRON)
            && item
                .pointer("/relationships/campaign/data/id")
                .and_then(Value::as_str)
                == Some(campaign_id)
    })
}
