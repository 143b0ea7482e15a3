//! Entitlement checks against third-party account-linking services.
//!
//! A member is entitled in a channel if ANY configured service reports an
//! active subscription/pledge for the channel's linked creator account. A
//! failing service counts as "no" so that one degraded dependency does not
//! lock out members entitled through the other.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tokio::{sync::Mutex, time::Instant};

use crate::{
    directory::{AccountDirectory, ExternalAccount},
    domain::{ChatId, ServiceKind, UserId},
    errors::Error,
    platform::PlatformApi,
    secrets::SecretStore,
    Result,
};

/// A third-party service answering "is this member entitled right now".
#[async_trait]
pub trait EntitlementService: Send + Sync {
    fn kind(&self) -> ServiceKind;

    /// `creator_id` is the channel's identity on the service, `member_id` and
    /// `token` the member's linked identity and access token.
    async fn check(&self, creator_id: &str, member_id: &str, token: &SecretString)
        -> Result<bool>;
}

#[derive(Clone, Debug)]
struct AdminCacheEntry {
    ids: HashSet<i64>,
    fetched_at: Instant,
}

pub struct EntitlementBroker {
    directory: Arc<dyn AccountDirectory>,
    secrets: Arc<SecretStore>,
    services: Vec<Arc<dyn EntitlementService>>,
    api: Arc<dyn PlatformApi>,
    admin_ttl: Duration,
    admin_cache: Mutex<HashMap<i64, AdminCacheEntry>>,
}

impl EntitlementBroker {
    pub fn new(
        directory: Arc<dyn AccountDirectory>,
        secrets: Arc<SecretStore>,
        services: Vec<Arc<dyn EntitlementService>>,
        api: Arc<dyn PlatformApi>,
        admin_ttl: Duration,
    ) -> Self {
        Self {
            directory,
            secrets,
            services,
            api,
            admin_ttl,
            admin_cache: Mutex::new(HashMap::new()),
        }
    }

    /// The creator account a channel is linked to; `None` means the channel
    /// is not gated.
    pub fn channel_link(&self, channel_id: ChatId) -> Result<Option<ExternalAccount>> {
        Ok(self
            .directory
            .channel(channel_id)?
            .and_then(|c| c.linked_external_account))
    }

    /// Whether `account` currently holds an entitlement linked to `channel_id`.
    ///
    /// Never cached. Service failures degrade to `false`; failing to decrypt
    /// a linked token is returned as an error.
    pub async fn is_entitled(&self, channel_id: ChatId, account: UserId) -> Result<bool> {
        let Some(link) = self.channel_link(channel_id)? else {
            return Ok(false);
        };
        let Some(linked) = self.directory.linked_account(account)? else {
            return Ok(false);
        };

        for service in &self.services {
            let kind = service.kind();
            let (Some(creator_id), Some(identity)) = (link.id_for(kind), linked.identity_for(kind))
            else {
                continue;
            };

            let token = self.secrets.open_string(&identity.access_token)?;
            match service.check(creator_id, &identity.external_id, &token).await {
                Ok(true) => {
                    tracing::debug!(
                        chat_id = channel_id.0,
                        user_id = account.0,
                        service = kind.as_str(),
                        "entitlement granted"
                    );
                    return Ok(true);
                }
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(
                        chat_id = channel_id.0,
                        user_id = account.0,
                        service = kind.as_str(),
                        "entitlement service failed, treating as not entitled: {e}"
                    );
                }
            }
        }

        Ok(false)
    }

    /// Administrator ids of a chat, served from a cache that may be up to
    /// `admin_ttl` stale.
    pub async fn get_administrators(&self, channel_id: ChatId) -> Result<HashSet<i64>> {
        {
            let cache = self.admin_cache.lock().await;
            if let Some(entry) = cache.get(&channel_id.0) {
                if entry.fetched_at.elapsed() < self.admin_ttl {
                    return Ok(entry.ids.clone());
                }
            }
        }

        let result = self.api.get_chat_administrators(channel_id).await?;
        let ids = parse_administrator_ids(&result)?;

        let mut cache = self.admin_cache.lock().await;
        cache.retain(|_, entry| entry.fetched_at.elapsed() < self.admin_ttl);
        cache.insert(
            channel_id.0,
            AdminCacheEntry {
                ids: ids.clone(),
                fetched_at: Instant::now(),
            },
        );
        Ok(ids)
    }

    pub async fn is_administrator(&self, channel_id: ChatId, user: UserId) -> Result<bool> {
        Ok(self.get_administrators(channel_id).await?.contains(&user.0))
    }
}

fn parse_administrator_ids(result: &Value) -> Result<HashSet<i64>> {
    let members = result.as_array().ok_or_else(|| {
        Error::Malformed("getChatAdministrators result is not an array".to_string())
    })?;
    Ok(members
        .iter()
        .filter_map(|m| m.get("user")?.get("id")?.as_i64())
        .collect())
}

/// Expose a token for an outgoing `Authorization` header.
pub fn bearer(token: &SecretString) -> String {
    format!("Bearer {}", token.expose_secret())
}
