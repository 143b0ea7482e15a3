//! Channel and linked-account records.
//!
//! The account-linking web shell owns these records; the bot only reads them.

use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::{
    domain::{ChatId, ServiceKind, UserId},
    secrets::SecretBlob,
    Result,
};

/// Creator-side identities a channel is linked to.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalAccount {
    #[serde(default)]
    pub patreon_campaign_id: Option<String>,
    #[serde(default)]
    pub twitch_broadcaster_id: Option<String>,
}

impl ExternalAccount {
    pub fn id_for(&self, kind: ServiceKind) -> Option<&str> {
        match kind {
            ServiceKind::Patreon => self.patreon_campaign_id.as_deref(),
            ServiceKind::Twitch => self.twitch_broadcaster_id.as_deref(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub chat_id: ChatId,
    #[serde(default)]
    pub linked_external_account: Option<ExternalAccount>,
}

/// A member's identity on one third-party service.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkedIdentity {
    pub external_id: String,
    pub access_token: SecretBlob,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkedAccount {
    pub user_id: UserId,
    #[serde(default)]
    pub patreon: Option<LinkedIdentity>,
    #[serde(default)]
    pub twitch: Option<LinkedIdentity>,
}

impl LinkedAccount {
    pub fn identity_for(&self, kind: ServiceKind) -> Option<&LinkedIdentity> {
        match kind {
            ServiceKind::Patreon => self.patreon.as_ref(),
            ServiceKind::Twitch => self.twitch.as_ref(),
        }
    }
}

/// Read-only lookup of channels and linked accounts.
pub trait AccountDirectory: Send + Sync {
    fn channel(&self, chat_id: ChatId) -> Result<Option<Channel>>;
    fn linked_account(&self, user_id: UserId) -> Result<Option<LinkedAccount>>;
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DirectoryFile {
    #[serde(default)]
    pub channels: Vec<Channel>,
    #[serde(default)]
    pub accounts: Vec<LinkedAccount>,
}

/// JSON-file directory, re-read on every lookup so external edits are seen
/// without a restart. A missing file is an empty directory.
#[derive(Clone, Debug)]
pub struct JsonAccountDirectory {
    path: PathBuf,
}

impl JsonAccountDirectory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<DirectoryFile> {
        let txt = match fs::read_to_string(&self.path) {
            Ok(txt) => txt,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(DirectoryFile::default()),
            Err(e) => return Err(e.into()),
        };
        if txt.trim().is_empty() {
            return Ok(DirectoryFile::default());
        }
        Ok(serde_json::from_str(&txt)?)
    }
}

impl AccountDirectory for JsonAccountDirectory {
    fn channel(&self, chat_id: ChatId) -> Result<Option<Channel>> {
        Ok(self
            .load()?
            .channels
            .into_iter()
            .find(|c| c.chat_id == chat_id))
    }

    fn linked_account(&self, user_id: UserId) -> Result<Option<LinkedAccount>> {
        Ok(self
            .load()?
            .accounts
            .into_iter()
            .find(|a| a.user_id == user_id))
    }
}
