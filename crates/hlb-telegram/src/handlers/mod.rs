//! Built-in chat handlers.
//!
//! - `private`: onboarding for one-to-one chats with the bot
//! - `group`: membership gating and the `/lounge` status command

pub mod group;
pub mod private;

/// A bot command: `/name@mention args`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command<'a> {
    pub name: String,
    pub mention: Option<&'a str>,
    pub args: &'a str,
}

impl Command<'_> {
    /// Commands mentioning another bot are not ours; unmentioned ones are.
    pub fn is_for(&self, bot_username: Option<&str>) -> bool {
        match (self.mention, bot_username) {
            (None, _) => true,
            (Some(m), Some(me)) => m.eq_ignore_ascii_case(me),
            (Some(_), None) => false,
        }
    }
}

/// Parse `text` as a command; `None` if it does not start with `/`.
pub fn parse_command(text: &str) -> Option<Command<'_>> {
    let text = text.trim();
    if !text.starts_with('/') {
        return None;
    }

    let (first, args) = match text.split_once(char::is_whitespace) {
        Some((first, rest)) => (first, rest.trim()),
        None => (text, ""),
    };
    let (name, mention) = match first.trim_start_matches('/').split_once('@') {
        Some((name, mention)) => (name, Some(mention)),
        None => (first.trim_start_matches('/'), None),
    };
    if name.is_empty() {
        return None;
    }

    Some(Command {
        name: name.to_lowercase(),
        mention,
        args,
    })
}
