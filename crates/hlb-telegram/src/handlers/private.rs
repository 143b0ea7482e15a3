use async_trait::async_trait;
use serde_json::json;

use hlb_core::{
    formatting::escape_html, platform::chat_params, update::InboundEvent, Result,
};

use super::parse_command;
use crate::dispatcher::{ChatHandler, HandlerContext};

/// One-to-one chats: point people at the account-linking page.
pub struct PrivateChatHandler;

#[async_trait]
impl ChatHandler for PrivateChatHandler {
    async fn handle(&self, ctx: &HandlerContext, event: &InboundEvent) -> Result<()> {
        let Some(chat_id) = event.chat_id() else {
            return Ok(());
        };

        let command = event.text().and_then(parse_command);
        let text = match command {
            Some(cmd) if cmd.name == "start" => welcome_text(&ctx.cfg.base_url),
            _ => help_text(&ctx.cfg.base_url),
        };

        let mut params = chat_params(chat_id);
        params.insert("parse_mode".to_string(), json!("HTML"));
        params.insert("disable_web_page_preview".to_string(), json!(true));
        ctx.api.send_message(&text, params).await?;
        Ok(())
    }
}

fn welcome_text(base_url: &str) -> String {
    format!(
        "<b>Welcome to the Headless Lounge!</b>\n\n\
         Link your Patreon or Twitch account at {} to get into the members-only \
         groups you support.",
        escape_html(base_url)
    )
}

fn help_text(base_url: &str) -> String {
    format!(
        "I only gate group membership. Send /start to get started, or manage \
         your linked accounts at {}.",
        escape_html(base_url)
    )
}
