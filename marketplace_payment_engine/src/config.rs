//! Engine configuration, read from `MPE_*` environment variables with sane defaults for everything except the
//! database URL and the gateway key.

use std::{env, time::Duration};

use chrono::Duration as ChronoDuration;
use log::*;
use mpe_common::Secret;
use rand::{distributions::Alphanumeric, thread_rng, Rng};

const DEFAULT_TOKEN_TTL: ChronoDuration = ChronoDuration::minutes(15);
const DEFAULT_LOCK_WAIT: Duration = Duration::from_secs(10);
const DEFAULT_REDRIVE_INTERVAL: Duration = Duration::from_secs(3600);

#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub database_url: String,
    /// API key for the payment gateway account.
    pub gateway_api_key: Secret<String>,
    /// HS256 signing secret for delivery confirmation tokens.
    pub token_secret: Secret<String>,
    /// How long an issued confirmation token stays valid.
    pub token_ttl: ChronoDuration,
    /// How long a caller waits on a per-order lock before giving up.
    pub lock_wait: Duration,
    /// How often the stuck-order scan runs.
    pub redrive_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_url: String::default(),
            gateway_api_key: Secret::default(),
            token_secret: Secret::default(),
            token_ttl: DEFAULT_TOKEN_TTL,
            lock_wait: DEFAULT_LOCK_WAIT,
            redrive_interval: DEFAULT_REDRIVE_INTERVAL,
        }
    }
}

impl EngineConfig {
    pub fn from_env_or_default() -> Self {
        let database_url = env::var("MPE_DATABASE_URL").ok().unwrap_or_else(|| {
            warn!("🪛️ MPE_DATABASE_URL is not set. Using an empty database URL.");
            String::default()
        });
        let gateway_api_key = env::var("MPE_GATEWAY_API_KEY").map(Secret::new).ok().unwrap_or_else(|| {
            warn!("🪛️ MPE_GATEWAY_API_KEY is not set. Gateway calls will be rejected.");
            Secret::default()
        });
        let token_secret = env::var("MPE_TOKEN_SECRET").map(Secret::new).ok().unwrap_or_else(|| {
            warn!(
                "🪛️ MPE_TOKEN_SECRET is not set. Generating a random signing secret; confirmation tokens will \
                 not survive a restart."
            );
            let secret = thread_rng().sample_iter(&Alphanumeric).take(48).map(char::from).collect::<String>();
            Secret::new(secret)
        });
        let token_ttl = env_minutes("MPE_TOKEN_TTL_MINUTES")
            .map(ChronoDuration::minutes)
            .unwrap_or(DEFAULT_TOKEN_TTL);
        let lock_wait =
            env_seconds("MPE_LOCK_WAIT_SECONDS").map(Duration::from_secs).unwrap_or(DEFAULT_LOCK_WAIT);
        let redrive_interval = env_seconds("MPE_REDRIVE_INTERVAL_SECONDS")
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_REDRIVE_INTERVAL);
        Self { database_url, gateway_api_key, token_secret, token_ttl, lock_wait, redrive_interval }
    }
}

fn env_seconds(var: &str) -> Option<u64> {
    env_number(var)
}

fn env_minutes(var: &str) -> Option<i64> {
    env_number(var)
}

fn env_number<T: std::str::FromStr>(var: &str) -> Option<T> {
    let raw = env::var(var).ok()?;
    match raw.parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            error!("🪛️ {raw} is not a valid value for {var}. Using the default instead.");
            None
        },
    }
}
