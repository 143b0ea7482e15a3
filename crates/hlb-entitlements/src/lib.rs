//! Entitlement service adapters (Patreon pledges, Twitch subscriptions).
//!
//! Each adapter answers one question over HTTPS with the member's own access
//! token: is this member currently supporting that creator? Errors are
//! returned as-is; the broker in `hlb-core` decides how to degrade.

use std::sync::Arc;

use hlb_core::{
    config::Config, entitlement::EntitlementService, errors::Error, utils::truncate_text,
};

mod patreon;
mod twitch;

pub use patreon::PatreonService;
pub use twitch::TwitchService;

/// The services enabled by `cfg`. Twitch needs an application client id and
/// is left out without one.
pub fn from_config(cfg: &Config, http: reqwest::Client) -> Vec<Arc<dyn EntitlementService>> {
    let mut services: Vec<Arc<dyn EntitlementService>> = vec![Arc::new(PatreonService::new(
        http.clone(),
        cfg.patreon_api_base.clone(),
    ))];

    match &cfg.twitch_client_id {
        Some(client_id) => services.push(Arc::new(TwitchService::new(
            http,
            cfg.twitch_api_base.clone(),
            client_id.clone(),
        ))),
        None => tracing::info!("TWITCH_CLIENT_ID not set; Twitch entitlements disabled"),
    }

    services
}

fn transport_error(service: &str, e: reqwest::Error) -> Error {
    let what = if e.is_timeout() { "timed out" } else { "request failed" };
    Error::Transport(format!("{service}: {what}: {}", e.without_url()))
}

/// Error bodies are kept short in diagnostics.
fn snippet(body: &str) -> String {
    truncate_text(body.trim(), 200)
}
