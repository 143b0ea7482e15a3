//! Shared fakes for the adapter's unit tests.

use std::{
    collections::{HashMap, HashSet, VecDeque},
    path::Path,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine as _};
use secrecy::SecretString;
use serde_json::{json, Value};

use hlb_core::{
    config::Config,
    directory::{AccountDirectory, Channel, ExternalAccount, LinkedAccount, LinkedIdentity},
    domain::{ChatId, ServiceKind, UserId},
    entitlement::{EntitlementBroker, EntitlementService},
    errors::Error,
    platform::PlatformApi,
    Result,
};

use crate::dispatcher::HandlerContext;

pub const BOT_ID: i64 = 99;

pub fn config(state_dir: &Path, debug: bool) -> Arc<Config> {
    let vars: HashMap<&str, String> = HashMap::from([
        ("ENCRYPTION_KEY", BASE64_STANDARD.encode([7u8; 32])),
        ("TELEGRAM_BOT_TOKEN", "1:test-token".to_string()),
        ("TELEGRAM_BOT_USER_ID", BOT_ID.to_string()),
        ("TELEGRAM_BOT_USERNAME", "lounge_bot".to_string()),
        ("BASE_URL", "https://lounge.example".to_string()),
        ("STATE_DIR", state_dir.display().to_string()),
        ("BOT_DEBUG", debug.to_string()),
        ("HANDLER_TIMEOUT_SECS", "2".to_string()),
    ]);
    Arc::new(Config::from_lookup(|k| vars.get(k).cloned()).unwrap())
}

/// Records every call; answers from a script.
#[derive(Default)]
pub struct FakeApi {
    pub calls: Mutex<Vec<(String, Value)>>,
    pub admins: Mutex<Vec<i64>>,
    pub batches: Mutex<VecDeque<Result<Vec<Value>>>>,
    pub failing: Mutex<HashSet<String>>,
}

impl FakeApi {
    pub fn methods(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(m, _)| m.clone())
            .collect()
    }

    pub fn params_of(&self, method: &str) -> Vec<Value> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(m, _)| m == method)
            .map(|(_, p)| p.clone())
            .collect()
    }

    pub fn fail(&self, method: &str) {
        self.failing.lock().unwrap().insert(method.to_string());
    }
}

#[async_trait]
impl PlatformApi for FakeApi {
    async fn call(&self, method: &str, params: Value) -> Result<Value> {
        self.calls
            .lock()
            .unwrap()
            .push((method.to_string(), params));

        if self.failing.lock().unwrap().contains(method) {
            return Err(Error::api(method, Some(400), "Bad Request: scripted failure"));
        }

        match method {
            "getUpdates" => {
                let next = self.batches.lock().unwrap().pop_front();
                match next {
                    Some(Ok(batch)) => Ok(Value::Array(batch)),
                    Some(Err(e)) => Err(e),
                    None => Ok(json!([])),
                }
            }
            "getChatAdministrators" => {
                let admins = self.admins.lock().unwrap().clone();
                Ok(Value::Array(
                    admins
                        .into_iter()
                        .map(|id| json!({ "status": "administrator", "user": { "id": id } }))
                        .collect(),
                ))
            }
            "getMe" => Ok(json!({ "id": BOT_ID, "username": "lounge_bot" })),
            "sendMessage" => Ok(json!({ "message_id": 1 })),
            _ => Ok(json!(true)),
        }
    }
}

#[derive(Default)]
pub struct MemoryDirectory {
    pub channels: Vec<Channel>,
    pub accounts: Vec<LinkedAccount>,
}

impl MemoryDirectory {
    /// `chat_id` gated on a Patreon campaign, with `members` linked to it.
    pub fn gated(cfg: &Config, chat_id: ChatId, members: &[i64]) -> Self {
        let accounts = members
            .iter()
            .map(|&id| LinkedAccount {
                user_id: UserId(id),
                patreon: Some(LinkedIdentity {
                    external_id: format!("patron-{id}"),
                    access_token: cfg.secrets.seal_str(&format!("token-{id}")).unwrap(),
                }),
                twitch: None,
            })
            .collect();
        Self {
            channels: vec![Channel {
                chat_id,
                linked_external_account: Some(ExternalAccount {
                    patreon_campaign_id: Some("campaign-1".to_string()),
                    twitch_broadcaster_id: None,
                }),
            }],
            accounts,
        }
    }
}

impl AccountDirectory for MemoryDirectory {
    fn channel(&self, chat_id: ChatId) -> Result<Option<Channel>> {
        Ok(self.channels.iter().find(|c| c.chat_id == chat_id).cloned())
    }

    fn linked_account(&self, user_id: UserId) -> Result<Option<LinkedAccount>> {
        Ok(self.accounts.iter().find(|a| a.user_id == user_id).cloned())
    }
}

/// Entitles exactly the listed member ids.
pub struct AllowList(pub Vec<String>);

#[async_trait]
impl EntitlementService for AllowList {
    fn kind(&self) -> ServiceKind {
        ServiceKind::Patreon
    }

    async fn check(&self, _creator: &str, member_id: &str, _token: &SecretString) -> Result<bool> {
        Ok(self.0.iter().any(|m| m == member_id))
    }
}

pub fn context(
    cfg: Arc<Config>,
    api: Arc<FakeApi>,
    directory: MemoryDirectory,
    entitled: &[&str],
) -> HandlerContext {
    let services: Vec<Arc<dyn EntitlementService>> = vec![Arc::new(AllowList(
        entitled.iter().map(|s| s.to_string()).collect(),
    ))];
    let broker = Arc::new(EntitlementBroker::new(
        Arc::new(directory),
        cfg.secrets.clone(),
        services,
        api.clone(),
        cfg.admin_cache_ttl,
    ));
    HandlerContext {
        cfg,
        api,
        broker,
    }
}
