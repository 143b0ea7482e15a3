/// Escape text for Telegram's HTML parse mode.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Human-facing name for a Telegram user object (`first_name last_name`, or
/// `@username`, or the numeric id).
pub fn display_name(user: &serde_json::Value) -> String {
    let first = user.get("first_name").and_then(|v| v.as_str()).unwrap_or("");
    let last = user.get("last_name").and_then(|v| v.as_str()).unwrap_or("");
    let full = format!("{first} {last}").trim().to_string();
    if !full.is_empty() {
        return full;
    }
    if let Some(u) = user.get("username").and_then(|v| v.as_str()) {
        return format!("@{u}");
    }
    user.get("id")
        .and_then(|v| v.as_i64())
        .map(|id| id.to_string())
        .unwrap_or_else(|| "someone".to_string())
}
