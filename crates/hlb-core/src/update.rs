//! Inbound update model.
//!
//! Only the fields the pipeline needs are lifted out of the raw JSON; the
//! verbatim update is kept alongside for handlers and the diagnostic dump.

use serde_json::Value;

use crate::{
    domain::{ChatId, ChatKind, Route, UserId},
    errors::Error,
    Result,
};

/// Field carrying a regular new message (the only payload that gets routed).
pub const MESSAGE_FIELD: &str = "message";

/// Known update payload fields, in lookup order.
const PAYLOAD_FIELDS: &[&str] = &[
    MESSAGE_FIELD,
    "edited_message",
    "channel_post",
    "edited_channel_post",
    "business_message",
    "edited_business_message",
    "message_reaction",
    "inline_query",
    "chosen_inline_result",
    "callback_query",
    "shipping_query",
    "pre_checkout_query",
    "poll",
    "poll_answer",
    "my_chat_member",
    "chat_member",
    "chat_join_request",
    "chat_boost",
    "removed_chat_boost",
];

/// Top-level keys that never hold a payload.
const ENVELOPE_FIELDS: &[&str] = &["update_id", "from"];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Chat {
    pub id: ChatId,
    pub kind: ChatKind,
}

/// The content object of an update, tagged with the field it arrived in.
#[derive(Clone, Debug, PartialEq)]
pub struct Payload {
    pub field: String,
    pub body: Value,
}

/// One inbound notification from Telegram. Never mutated after parsing.
#[derive(Clone, Debug, PartialEq)]
pub struct InboundEvent {
    pub event_id: i64,
    pub origin_account_id: Option<UserId>,
    pub chat: Option<Chat>,
    pub payload: Option<Payload>,
    pub raw: Value,
}

impl InboundEvent {
    pub fn from_json(raw: Value) -> Result<Self> {
        let obj = raw
            .as_object()
            .ok_or_else(|| Error::Malformed("update is not a JSON object".to_string()))?;

        let event_id = obj
            .get("update_id")
            .and_then(Value::as_i64)
            .ok_or_else(|| Error::Malformed("update_id missing or not an integer".to_string()))?;

        // Unknown update types still get a payload so their chat is logged.
        let payload = PAYLOAD_FIELDS
            .iter()
            .find_map(|&field| obj.get_key_value(field).filter(|(_, v)| v.is_object()))
            .or_else(|| {
                obj.iter()
                    .find(|(k, v)| !ENVELOPE_FIELDS.contains(&k.as_str()) && v.is_object())
            })
            .map(|(k, v)| Payload {
                field: k.clone(),
                body: v.clone(),
            });

        let chat = match &payload {
            Some(p) => parse_chat(&p.body)?,
            None => None,
        };
        if chat.is_none() && payload.as_ref().is_some_and(|p| p.field == MESSAGE_FIELD) {
            return Err(Error::Malformed(format!("message in update {event_id} has no chat")));
        }

        let origin_account_id = payload
            .as_ref()
            .and_then(|p| sender_id(&p.body))
            .or_else(|| sender_id(&raw))
            .map(UserId);

        Ok(Self {
            event_id,
            origin_account_id,
            chat,
            payload,
            raw,
        })
    }

    /// Best-effort id extraction for updates that failed to parse.
    pub fn raw_event_id(raw: &Value) -> i64 {
        raw.get("update_id").and_then(Value::as_i64).unwrap_or(0)
    }

    pub fn is_from(&self, user: UserId) -> bool {
        self.origin_account_id == Some(user)
    }

    /// The message body, if this update carries a regular new message.
    pub fn message(&self) -> Option<&Value> {
        self.payload
            .as_ref()
            .filter(|p| p.field == MESSAGE_FIELD)
            .map(|p| &p.body)
    }

    /// Handler family for this update, or `None` when it is not a message.
    pub fn route(&self) -> Option<Route> {
        self.message()?;
        let kind = self.chat.as_ref().map(|c| &c.kind)?;
        Some(Route::from(kind))
    }

    pub fn chat_id(&self) -> Option<ChatId> {
        self.chat.as_ref().map(|c| c.id)
    }

    pub fn text(&self) -> Option<&str> {
        self.message()?.get("text").and_then(Value::as_str)
    }
}

fn parse_chat(body: &Value) -> Result<Option<Chat>> {
    let chat = body
        .get("chat")
        .or_else(|| body.get("message").and_then(|m| m.get("chat")));
    let Some(chat) = chat else {
        return Ok(None);
    };

    let id = chat
        .get("id")
        .and_then(Value::as_i64)
        .ok_or_else(|| Error::Malformed("chat.id missing or not an integer".to_string()))?;
    let kind = ChatKind::parse(chat.get("type").and_then(Value::as_str).unwrap_or(""));

    Ok(Some(Chat {
        id: ChatId(id),
        kind,
    }))
}

fn sender_id(v: &Value) -> Option<i64> {
    v.get("from")?.get("id")?.as_i64()
}
