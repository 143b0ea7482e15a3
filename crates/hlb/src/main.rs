use std::sync::Arc;

use anyhow::{bail, Context};
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;

use hlb_core::{
    config::Config,
    cursor::UpdateCursor,
    directory::JsonAccountDirectory,
    entitlement::EntitlementBroker,
    platform::PlatformApi,
};
use hlb_telegram::{
    build_http_client,
    dispatcher::{Dispatcher, HandlerContext, Handlers},
    router, TelegramClient,
};

const USAGE: &str = "usage: hlb [poll | set-webhook <url> | seal]";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    hlb_core::logging::init("hlb")?;

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        None | Some("poll") => poll().await,
        Some("set-webhook") => {
            let Some(url) = args.get(1) else {
                bail!("{USAGE}");
            };
            set_webhook(url).await
        }
        Some("seal") => seal().await,
        Some(other) => bail!("unknown command {other:?}\n{USAGE}"),
    }
}

async fn poll() -> anyhow::Result<()> {
    let cfg = Arc::new(Config::load().context("loading configuration")?);
    tracing::debug!(?cfg, "configuration loaded");

    let api: Arc<dyn PlatformApi> = Arc::new(TelegramClient::new(&cfg)?);
    let http = build_http_client(cfg.request_timeout, cfg.ca_bundle_path.as_deref())?;
    let broker = Arc::new(EntitlementBroker::new(
        Arc::new(JsonAccountDirectory::new(cfg.directory_file.clone())),
        cfg.secrets.clone(),
        hlb_entitlements::from_config(&cfg, http),
        api.clone(),
        cfg.admin_cache_ttl,
    ));

    let cursor = Arc::new(UpdateCursor::new(cfg.cursor_file()));
    let dispatcher = Arc::new(Dispatcher::new(
        HandlerContext {
            cfg: cfg.clone(),
            api,
            broker,
        },
        Handlers::builtin(),
    ));

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("interrupt received, shutting down");
            }
            shutdown.cancel();
        }
    });

    router::run_polling(dispatcher, cursor, shutdown).await
}

async fn set_webhook(url: &str) -> anyhow::Result<()> {
    let cfg = Config::load().context("loading configuration")?;
    let api = TelegramClient::new(&cfg)?;
    let result = api
        .set_webhook(url)
        .await
        .with_context(|| format!("setWebhook to {url}"))?;
    tracing::info!(url, "webhook registered");
    println!("{result}");
    Ok(())
}

/// Read a secret from stdin and print it sealed with ENCRYPTION_KEY, in the
/// form the account directory file stores tokens.
async fn seal() -> anyhow::Result<()> {
    let store = Config::load_secret_store()?;

    let mut input = String::new();
    tokio::io::stdin()
        .read_to_string(&mut input)
        .await
        .context("reading secret from stdin")?;
    let secret = input.trim_end_matches(&['\r', '\n'][..]);
    if secret.is_empty() {
        bail!("nothing to seal on stdin");
    }

    let blob = store.seal_str(secret)?;
    println!("{}", serde_json::to_string_pretty(&blob)?);
    Ok(())
}
