use serde::{Deserialize, Serialize};

/// Telegram user id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

/// Telegram chat id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatId(pub i64);

/// Kind of chat an update originated from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChatKind {
    Private,
    Group,
    Supergroup,
    /// Anything else the platform reports (`channel`, or a type we do not know yet).
    Unknown(String),
}

impl ChatKind {
    pub fn parse(s: &str) -> Self {
        match s {
            "private" => Self::Private,
            "group" => Self::Group,
            "supergroup" => Self::Supergroup,
            other => Self::Unknown(other.to_string()),
        }
    }
}

/// The closed set of handler families a message can be routed to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Route {
    Private,
    Group,
    Default,
}

impl From<&ChatKind> for Route {
    fn from(kind: &ChatKind) -> Self {
        match kind {
            ChatKind::Private => Route::Private,
            ChatKind::Group | ChatKind::Supergroup => Route::Group,
            ChatKind::Unknown(_) => Route::Default,
        }
    }
}

/// Third-party services that can grant an entitlement.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceKind {
    Patreon,
    Twitch,
}

impl ServiceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Patreon => "patreon",
            Self::Twitch => "twitch",
        }
    }
}
