//! Groups and supergroups: keep gated chats to entitled members only.

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use hlb_core::{
    directory::ExternalAccount,
    domain::{ChatId, ServiceKind, UserId},
    errors::Error,
    formatting::{display_name, escape_html},
    platform::{chat_params, PlatformApi},
    update::InboundEvent,
    Result,
};

use super::parse_command;
use crate::dispatcher::{ChatHandler, HandlerContext};

pub struct GroupChatHandler;

#[async_trait]
impl ChatHandler for GroupChatHandler {
    async fn handle(&self, ctx: &HandlerContext, event: &InboundEvent) -> Result<()> {
        let (Some(chat_id), Some(message)) = (event.chat_id(), event.message()) else {
            return Ok(());
        };

        if let Some(members) = message.get("new_chat_members").and_then(Value::as_array) {
            return screen_new_members(ctx, chat_id, members).await;
        }

        let Some(cmd) = event.text().and_then(parse_command) else {
            return Ok(());
        };
        if !cmd.is_for(ctx.cfg.bot_username.as_deref()) {
            return Ok(());
        }
        match cmd.name.as_str() {
            "lounge" => lounge_status(ctx, chat_id, event.origin_account_id).await,
            _ => Ok(()),
        }
    }
}

/// Screens every member of the batch even when one of them fails; the first
/// failure is returned once the batch is done.
async fn screen_new_members(ctx: &HandlerContext, chat_id: ChatId, members: &[Value]) -> Result<()> {
    if ctx.broker.channel_link(chat_id)?.is_none() {
        tracing::debug!(chat_id = chat_id.0, "chat is not gated; admitting new members");
        return Ok(());
    }

    let mut first_err: Option<Error> = None;
    for member in members {
        if member.get("is_bot").and_then(Value::as_bool).unwrap_or(false) {
            continue;
        }
        let Some(user) = member.get("id").and_then(Value::as_i64).map(UserId) else {
            continue;
        };

        if let Err(e) = screen_member(ctx, chat_id, user, member).await {
            tracing::warn!(chat_id = chat_id.0, user_id = user.0, "screening failed: {e}");
            first_err.get_or_insert(e);
        }
    }
    first_err.map_or(Ok(()), Err)
}

async fn screen_member(
    ctx: &HandlerContext,
    chat_id: ChatId,
    user: UserId,
    member: &Value,
) -> Result<()> {
    if ctx.broker.is_entitled(chat_id, user).await? {
        tracing::info!(chat_id = chat_id.0, user_id = user.0, "entitled member joined");
        return Ok(());
    }

    remove_member(ctx.api.as_ref(), chat_id, user).await?;
    tracing::info!(chat_id = chat_id.0, user_id = user.0, "removed member without entitlement");

    let notice = format!(
        "{} was removed: no active Patreon or Twitch membership is linked for this group. \
         Link your account at {} and ask to be re-invited.",
        escape_html(&display_name(member)),
        escape_html(&ctx.cfg.base_url)
    );
    if let Err(e) = ctx.api.send_message(&notice, html_params(chat_id)).await {
        tracing::warn!(chat_id = chat_id.0, user_id = user.0, "removal notice not sent: {e}");
    }
    Ok(())
}

fn html_params(chat_id: ChatId) -> Map<String, Value> {
    let mut params = chat_params(chat_id);
    params.insert("parse_mode".to_string(), json!("HTML"));
    params
}

/// Ban then immediately unban, so the user is out but may rejoin once linked.
async fn remove_member(api: &dyn PlatformApi, chat_id: ChatId, user: UserId) -> Result<()> {
    api.call(
        "banChatMember",
        json!({ "chat_id": chat_id.0, "user_id": user.0 }),
    )
    .await?;
    api.call(
        "unbanChatMember",
        json!({ "chat_id": chat_id.0, "user_id": user.0, "only_if_banned": true }),
    )
    .await?;
    Ok(())
}

async fn lounge_status(ctx: &HandlerContext, chat_id: ChatId, from: Option<UserId>) -> Result<()> {
    let Some(user) = from else {
        return Ok(());
    };
    if !ctx.broker.is_administrator(chat_id, user).await? {
        tracing::debug!(chat_id = chat_id.0, user_id = user.0, "/lounge from non-administrator ignored");
        return Ok(());
    }

    let text = match ctx.broker.channel_link(chat_id)? {
        Some(link) => linked_summary(&link),
        None => format!(
            "This group is not linked to a creator account yet. Link it at {}.",
            escape_html(&ctx.cfg.base_url)
        ),
    };
    let mut params = html_params(chat_id);
    params.insert("disable_web_page_preview".to_string(), json!(true));
    ctx.api.send_message(&text, params).await?;
    Ok(())
}

fn linked_summary(link: &ExternalAccount) -> String {
    let services: Vec<&str> = [ServiceKind::Patreon, ServiceKind::Twitch]
        .into_iter()
        .filter(|&k| link.id_for(k).is_some())
        .map(ServiceKind::as_str)
        .collect();
    if services.is_empty() {
        return "This group is linked, but no service is configured for it.".to_string();
    }
    format!(
        "This group is gated. New members need an active membership on: {}.",
        services.join(", ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{self, FakeApi, MemoryDirectory};
    use std::sync::Arc;

    const GROUP: ChatId = ChatId(-100200);

    struct Fixture {
        _dir: tempfile::TempDir,
        api: Arc<FakeApi>,
        ctx: HandlerContext,
    }

    fn fixture(gated: bool, linked: &[i64], entitled: &[&str]) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let cfg = testing::config(dir.path(), false);
        let api = Arc::new(FakeApi::default());
        let directory = if gated {
            MemoryDirectory::gated(&cfg, GROUP, linked)
        } else {
            MemoryDirectory::default()
        };
        let ctx = testing::context(cfg, api.clone(), directory, entitled);
        Fixture {
            _dir: dir,
            api,
            ctx,
        }
    }

    fn joined(members: Value) -> InboundEvent {
        InboundEvent::from_json(json!({
            "update_id": 10,
            "message": {
                "from": { "id": 1 },
                "chat": { "id": GROUP.0, "type": "supergroup" },
                "new_chat_members": members
            }
        }))
        .unwrap()
    }

    fn command(from: i64, text: &str) -> InboundEvent {
        InboundEvent::from_json(json!({
            "update_id": 11,
            "message": {
                "from": { "id": from },
                "chat": { "id": GROUP.0, "type": "group" },
                "text": text
            }
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn entitled_members_stay_others_are_removed() {
        let f = fixture(true, &[42, 43], &["patron-42"]);
        let event = joined(json!([
            { "id": 42, "first_name": "Ada" },
            { "id": 43, "first_name": "Bob" },
            { "id": 44, "username": "carol" },
            { "id": 45, "is_bot": true, "username": "helper_bot" }
        ]));

        GroupChatHandler.handle(&f.ctx, &event).await.unwrap();

        let banned: Vec<i64> = f
            .api
            .params_of("banChatMember")
            .iter()
            .map(|p| p["user_id"].as_i64().unwrap())
            .collect();
        assert_eq!(banned, [43, 44]);

        let unbans = f.api.params_of("unbanChatMember");
        assert_eq!(unbans.len(), 2);
        assert!(unbans.iter().all(|p| p["only_if_banned"] == true));

        let notices = f.api.params_of("sendMessage");
        assert_eq!(notices.len(), 2);
        assert!(notices[0]["text"].as_str().unwrap().starts_with("Bob was removed"));
        assert!(notices[1]["text"].as_str().unwrap().starts_with("@carol was removed"));
    }

    #[tokio::test]
    async fn ungated_chat_admits_everyone() {
        let f = fixture(false, &[], &[]);
        GroupChatHandler
            .handle(&f.ctx, &joined(json!([{ "id": 43 }])))
            .await
            .unwrap();
        assert!(f.api.methods().is_empty());
    }

    #[tokio::test]
    async fn failed_removal_is_an_error() {
        let f = fixture(true, &[], &[]);
        f.api.fail("banChatMember");
        let result = GroupChatHandler
            .handle(&f.ctx, &joined(json!([{ "id": 43 }])))
            .await;
        assert!(result.is_err());
    }

    fn banned(api: &FakeApi) -> Vec<i64> {
        api.params_of("banChatMember")
            .iter()
            .map(|p| p["user_id"].as_i64().unwrap())
            .collect()
    }

    #[tokio::test]
    async fn failed_notice_does_not_stop_screening() {
        let f = fixture(true, &[], &[]);
        f.api.fail("sendMessage");

        GroupChatHandler
            .handle(
                &f.ctx,
                &joined(json!([{ "id": 43 }, { "id": 44 }, { "id": 45 }])),
            )
            .await
            .unwrap();

        assert_eq!(banned(&f.api), [43, 44, 45]);
        assert_eq!(f.api.params_of("unbanChatMember").len(), 3);
        assert_eq!(f.api.params_of("sendMessage").len(), 3);
    }

    #[tokio::test]
    async fn failed_removal_still_screens_the_rest() {
        let f = fixture(true, &[], &[]);
        f.api.fail("banChatMember");

        let result = GroupChatHandler
            .handle(&f.ctx, &joined(json!([{ "id": 43 }, { "id": 44 }])))
            .await;

        assert!(matches!(result, Err(Error::Api { ref method, .. }) if method == "banChatMember"));
        assert_eq!(banned(&f.api), [43, 44]);
        assert!(f.api.params_of("sendMessage").is_empty());
    }

    #[tokio::test]
    async fn lounge_reports_link_status_to_administrators() {
        let f = fixture(true, &[], &[]);
        f.api.admins.lock().unwrap().push(7);

        GroupChatHandler
            .handle(&f.ctx, &command(7, "/lounge@lounge_bot"))
            .await
            .unwrap();
        let sent = f.api.params_of("sendMessage");
        assert_eq!(sent.len(), 1);
        assert!(sent[0]["text"].as_str().unwrap().contains("patreon"));

        let unlinked = fixture(false, &[], &[]);
        unlinked.api.admins.lock().unwrap().push(7);
        GroupChatHandler
            .handle(&unlinked.ctx, &command(7, "/lounge"))
            .await
            .unwrap();
        let sent = unlinked.api.params_of("sendMessage");
        assert!(sent[0]["text"].as_str().unwrap().contains("not linked"));
    }

    #[tokio::test]
    async fn unlinked_lounge_reply_escapes_the_link() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = (*testing::config(dir.path(), false)).clone();
        cfg.base_url = "https://lounge.example/?a=1&b=my_lounge".to_string();
        let api = Arc::new(FakeApi::default());
        api.admins.lock().unwrap().push(7);
        let ctx = testing::context(Arc::new(cfg), api.clone(), MemoryDirectory::default(), &[]);

        GroupChatHandler
            .handle(&ctx, &command(7, "/lounge"))
            .await
            .unwrap();

        let sent = api.params_of("sendMessage");
        assert_eq!(sent[0]["parse_mode"], "HTML");
        assert!(sent[0]["text"]
            .as_str()
            .unwrap()
            .ends_with("Link it at https://lounge.example/?a=1&amp;b=my_lounge."));
    }

    #[tokio::test]
    async fn lounge_is_ignored_for_members_and_other_bots() {
        let f = fixture(true, &[], &[]);
        f.api.admins.lock().unwrap().push(7);

        GroupChatHandler
            .handle(&f.ctx, &command(8, "/lounge"))
            .await
            .unwrap();
        GroupChatHandler
            .handle(&f.ctx, &command(7, "/lounge@other_bot"))
            .await
            .unwrap();
        GroupChatHandler
            .handle(&f.ctx, &command(7, "just chatting"))
            .await
            .unwrap();

        assert!(f.api.params_of("sendMessage").is_empty());
    }
}
