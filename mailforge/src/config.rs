//! Configuration module for environment variable parsing.
//!
//! Reads all configuration from environment variables with sensible defaults,
//! so the server starts with nothing but `AUTH_SIGNUP_URL` and `AUTH_API_KEY`
//! pointed at a real project.

use std::env;
use std::time::Duration;

use tracing::warn;

/// Domains offered by the disposable-inbox service when none are configured.
const DEFAULT_MAILBOX_DOMAINS: &[&str] = &["tmailbox.net", "inboxlet.org", "dropmail.dev"];

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the disposable-inbox service
    pub mailbox_base_url: String,

    /// Domains to draw generated addresses from (allow-list)
    pub mailbox_domains: Vec<String>,

    /// Auth provider signup endpoint (POST target)
    pub auth_signup_url: String,

    /// API key sent in the `apikey` header on signup
    pub auth_api_key: String,

    /// Redirect target the provider embeds in the verification link
    pub auth_redirect_to: String,

    /// SQLite database URL for the account record store
    pub database_url: String,

    /// Total window to wait for the verification email
    pub poll_timeout: Duration,

    /// Interval between mailbox polls
    pub poll_interval: Duration,

    /// Attempts for the verification-link fetch
    pub verify_retries: u32,

    /// Fixed backoff between verification-fetch attempts
    pub verify_backoff: Duration,

    /// HTTP request timeout in milliseconds
    pub request_timeout_ms: u64,

    /// Delay between launching successive signup tasks
    pub launch_delay: Duration,

    /// Optional pool of user agents to rotate through
    pub user_agent_pool: Option<Vec<String>>,

    /// Port for the web server to listen on
    pub port: u16,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let auth_signup_url = env::var("AUTH_SIGNUP_URL").unwrap_or_default();
        if auth_signup_url.is_empty() {
            warn!("AUTH_SIGNUP_URL not set, signups will be rejected upstream");
        }

        let auth_api_key = env::var("AUTH_API_KEY").unwrap_or_default();
        if auth_api_key.is_empty() {
            warn!("AUTH_API_KEY not set, signups will be rejected upstream");
        }

        Config {
            mailbox_base_url: env::var("MAILBOX_API_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:3025".to_string()),

            mailbox_domains: parse_csv("MAILBOX_DOMAINS").unwrap_or_else(|| {
                DEFAULT_MAILBOX_DOMAINS
                    .iter()
                    .map(|d| d.to_string())
                    .collect()
            }),

            auth_signup_url,
            auth_api_key,

            auth_redirect_to: env::var("AUTH_REDIRECT_TO")
                .unwrap_or_else(|_| "http://localhost:3000/activate".to_string()),

            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://accounts.db".to_string()),

            poll_timeout: parse_secs("EMAIL_POLL_TIMEOUT_SECS", 90),

            poll_interval: parse_secs("EMAIL_POLL_INTERVAL_SECS", 3),

            verify_retries: env::var("VERIFY_FETCH_RETRIES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3),

            verify_backoff: parse_millis("VERIFY_FETCH_BACKOFF_MS", 2000),

            request_timeout_ms: env::var("REQUEST_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8000),

            launch_delay: parse_secs("SIGNUP_LAUNCH_DELAY_SECS", 5),

            user_agent_pool: parse_csv("USER_AGENT_POOL"),

            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8080),
        }
    }
}

/// Parse a whole-seconds duration from an environment variable.
fn parse_secs(name: &str, default: u64) -> Duration {
    let secs = match env::var(name) {
        Ok(raw) => match raw.trim().parse::<u64>() {
            Ok(v) => v,
            Err(_) => {
                warn!(env_var = name, value = %raw, "Invalid seconds value, using default");
                default
            }
        },
        Err(_) => default,
    };
    Duration::from_secs(secs)
}

/// Parse a milliseconds duration from an environment variable.
fn parse_millis(name: &str, default: u64) -> Duration {
    let millis = match env::var(name) {
        Ok(raw) => match raw.trim().parse::<u64>() {
            Ok(v) => v,
            Err(_) => {
                warn!(env_var = name, value = %raw, "Invalid milliseconds value, using default");
                default
            }
        },
        Err(_) => default,
    };
    Duration::from_millis(millis)
}

/// Parse a comma-separated list of strings.
fn parse_csv(name: &str) -> Option<Vec<String>> {
    env::var(name).ok().map(|raw| {
        raw.split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    })
}
