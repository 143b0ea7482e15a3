use std::{
    env, fmt, fs,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use crate::{
    errors::Error,
    secrets::{SecretBlob, SecretStore, SymmetricKey},
    Result,
};

/// Typed configuration, constructed once at startup and passed to each
/// component constructor.
///
/// The bot token is sealed with the encryption key as soon as it is read and
/// only ever held as a [`SecretBlob`].
#[derive(Clone)]
pub struct Config {
    // Telegram
    pub bot_user_id: i64,
    pub bot_username: Option<String>,
    pub bot_token: SecretBlob,
    pub api_base: String,

    // Secrets
    pub secrets: Arc<SecretStore>,

    // Web shell / linking
    pub base_url: String,

    // Behavior flags
    pub debug: bool,

    // Storage
    pub state_dir: PathBuf,
    pub directory_file: PathBuf,

    // Timeouts and intervals
    pub request_timeout: Duration,
    pub handler_timeout: Duration,
    pub admin_cache_ttl: Duration,
    pub poll_interval: Duration,

    // TLS
    pub ca_bundle_path: Option<PathBuf>,

    // Entitlement services
    pub patreon_api_base: String,
    pub twitch_api_base: String,
    pub twitch_client_id: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup (the environment in
    /// production, a map in tests).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).and_then(non_empty);

        // Required
        let key = get("ENCRYPTION_KEY").ok_or_else(|| {
            Error::Config("ENCRYPTION_KEY environment variable is required".to_string())
        })?;
        let secrets = Arc::new(SecretStore::new(SymmetricKey::from_base64(&key)?));

        let token = get("TELEGRAM_BOT_TOKEN").ok_or_else(|| {
            Error::Config("TELEGRAM_BOT_TOKEN environment variable is required".to_string())
        })?;
        let bot_token = secrets.seal_str(token.trim())?;
        drop(token);

        let bot_user_id = get("TELEGRAM_BOT_USER_ID")
            .ok_or_else(|| {
                Error::Config("TELEGRAM_BOT_USER_ID environment variable is required".to_string())
            })?
            .trim()
            .parse::<i64>()
            .map_err(|_| Error::Config("TELEGRAM_BOT_USER_ID must be an integer".to_string()))?;

        // Optional
        let bot_username = get("TELEGRAM_BOT_USERNAME");
        let api_base = trim_slash(
            get("TELEGRAM_API_BASE").unwrap_or("https://api.telegram.org".to_string()),
        );
        let base_url =
            trim_slash(get("BASE_URL").unwrap_or("http://localhost:8080".to_string()));
        let debug = get("BOT_DEBUG").map(|s| parse_bool(&s)).unwrap_or(false);

        let state_dir = PathBuf::from(get("STATE_DIR").unwrap_or("./local".to_string()));
        let directory_file = get("DIRECTORY_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|| state_dir.join("accounts.json"));

        let request_timeout =
            Duration::from_millis(parse_positive(&get, "HTTP_TIMEOUT_MS")?.unwrap_or(10_000));
        let handler_timeout =
            Duration::from_secs(parse_positive(&get, "HANDLER_TIMEOUT_SECS")?.unwrap_or(60));
        let admin_cache_ttl =
            Duration::from_secs(parse_u64(&get, "ADMIN_CACHE_TTL_SECS")?.unwrap_or(300));
        let poll_interval =
            Duration::from_millis(parse_u64(&get, "POLL_INTERVAL_MS")?.unwrap_or(1_000));

        let ca_bundle_path = get("CA_BUNDLE_PATH").map(PathBuf::from);

        let patreon_api_base = trim_slash(
            get("PATREON_API_BASE").unwrap_or("https://www.patreon.com".to_string()),
        );
        let twitch_api_base = trim_slash(
            get("TWITCH_API_BASE").unwrap_or("https://api.twitch.tv".to_string()),
        );
        let twitch_client_id = get("TWITCH_CLIENT_ID");

        Ok(Self {
            bot_user_id,
            bot_username,
            bot_token,
            api_base,
            secrets,
            base_url,
            debug,
            state_dir,
            directory_file,
            request_timeout,
            handler_timeout,
            admin_cache_ttl,
            poll_interval,
            ca_bundle_path,
            patreon_api_base,
            twitch_api_base,
            twitch_client_id,
        })
    }

    /// Only the encryption key, for tools that seal secrets without running
    /// the bot.
    pub fn load_secret_store() -> Result<SecretStore> {
        load_dotenv_if_present(Path::new(".env"));
        let key = env::var("ENCRYPTION_KEY")
            .ok()
            .and_then(non_empty)
            .ok_or_else(|| {
                Error::Config("ENCRYPTION_KEY environment variable is required".to_string())
            })?;
        Ok(SecretStore::new(SymmetricKey::from_base64(&key)?))
    }

    pub fn cursor_file(&self) -> PathBuf {
        self.state_dir.join("last_update_id.txt")
    }

    pub fn diagnostics_dir(&self) -> PathBuf {
        self.state_dir.join("updates")
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("bot_user_id", &self.bot_user_id)
            .field("bot_username", &self.bot_username)
            .field("bot_token", &"<sealed>")
            .field("api_base", &self.api_base)
            .field("key_id", &self.secrets.key_id())
            .field("base_url", &self.base_url)
            .field("debug", &self.debug)
            .field("state_dir", &self.state_dir)
            .field("directory_file", &self.directory_file)
            .field("request_timeout", &self.request_timeout)
            .field("handler_timeout", &self.handler_timeout)
            .field("admin_cache_ttl", &self.admin_cache_ttl)
            .field("poll_interval", &self.poll_interval)
            .field("ca_bundle_path", &self.ca_bundle_path)
            .field("patreon_api_base", &self.patreon_api_base)
            .field("twitch_api_base", &self.twitch_api_base)
            .field("twitch_client_id", &self.twitch_client_id.is_some())
            .finish()
    }
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        env::set_var(key, val);
    }
}

fn parse_bool(s: &str) -> bool {
    matches!(
        s.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn parse_u64(get: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<u64>> {
    get(key)
        .map(|s| {
            s.trim()
                .parse::<u64>()
                .map_err(|_| Error::Config(format!("{key} must be a non-negative integer")))
        })
        .transpose()
}

fn parse_positive(get: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<u64>> {
    match parse_u64(get, key)? {
        Some(0) => Err(Error::Config(format!("{key} must be greater than zero"))),
        other => Ok(other),
    }
}

fn trim_slash(s: String) -> String {
    s.trim_end_matches('/').to_string()
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
