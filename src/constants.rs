// Endpoint and credential constants, overridable from the environment.

use std::env;
use std::time::Duration;

lazy_static::lazy_static! {
    pub static ref DEEPSEEK_BASE_URL: String = env::var("DEEPSEEK_BASE_URL").unwrap_or_else(|_| "https://api.deepseek.com".to_string());
    pub static ref DEEPSEEK_MODEL: String = env::var("DEEPSEEK_MODEL").unwrap_or_else(|_| "deepseek-chat".to_string());
}

/// Environment variable consulted after the secret store.
pub const API_KEY_ENV: &str = "DEEPSEEK_API_KEY";

/// Secret store location, relative to the working directory.
pub const DEFAULT_SECRETS_FILE: &str = ".joy/secrets.toml";
pub const SECRET_GROUP: &str = "deepseek";
pub const SECRET_FIELD: &str = "api_key";

pub const DEFAULT_PORT: u16 = 8501;
pub const SESSION_COOKIE: &str = "joy_session";

/// Sessions untouched for this long are dropped by the sweeper.
pub const SESSION_IDLE_TIMEOUT: Duration = Duration::from_secs(30 * 60);
pub const SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(60);
