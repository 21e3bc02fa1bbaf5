use std::{fmt, sync::Arc, time::Duration};

use crate::logger::Logger;

/// Default API endpoint.
pub const DEFAULT_API_URL: &str = "https://api.circonus.com/v2";
/// Default value of the `X-Circonus-App-Name` header.
pub const DEFAULT_APP_NAME: &str = "circonus-api-rs";
/// Default lower bound for transport-level retry waits.
pub const DEFAULT_MIN_RETRY_DELAY: Duration = Duration::from_secs(1);
/// Default upper bound for transport-level retry waits.
pub const DEFAULT_MAX_RETRY_DELAY: Duration = Duration::from_secs(15);
/// Default transport-level retries, i.e. up to five attempts in total.
pub const DEFAULT_MAX_RETRIES: u32 = 4;

/// Options recognized by [`crate::ApiClient::new`].
///
/// Everything except `token_key` is optional; empty strings and `None` mean
/// "use the default".
#[derive(Clone, Default)]
pub struct ClientConfig {
    /// API URL. A bare host such as `api.example.com` becomes
    /// `https://api.example.com/v2`.
    pub url: String,
    pub token_key: String,
    pub token_app: String,
    pub token_account_id: String,
    /// Full TLS configuration; takes precedence over `ca_certs`.
    pub tls_config: Option<rustls::ClientConfig>,
    /// The only roots trusted for `https://` when `tls_config` is unset;
    /// the built-in roots are not consulted. Deprecated in favor of
    /// `tls_config`.
    pub ca_certs: Vec<reqwest::Certificate>,
    /// Go-style duration string, e.g. `500ms` or `1s`.
    pub min_retry_delay: String,
    /// Go-style duration string, e.g. `15s` or `1m30s`.
    pub max_retry_delay: String,
    /// Transport-level retries after the first attempt.
    pub max_retries: Option<u32>,
    /// Turns off transport retries and caps the outer loop to one attempt.
    pub disable_retries: bool,
    /// Enables diagnostic logging. Without a `logger` the output goes to
    /// `tracing`, so a subscriber must be installed to see it.
    pub debug: bool,
    pub logger: Option<Arc<dyn Logger>>,
    /// Upper bound on the total time a call may spend retrying.
    pub retry_deadline: Option<Duration>,
    /// Timeout for each individual HTTP attempt.
    pub request_timeout: Option<Duration>,
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("url", &self.url)
            .field("token_key", &"<redacted>")
            .field("token_app", &self.token_app)
            .field("token_account_id", &self.token_account_id)
            .field("tls_config", &self.tls_config.is_some())
            .field("ca_certs", &self.ca_certs.len())
            .field("min_retry_delay", &self.min_retry_delay)
            .field("max_retry_delay", &self.max_retry_delay)
            .field("max_retries", &self.max_retries)
            .field("disable_retries", &self.disable_retries)
            .field("debug", &self.debug)
            .field("logger", &self.logger.is_some())
            .field("retry_deadline", &self.retry_deadline)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl ClientConfig {
    /// Configuration with only a token set.
    pub fn new(token_key: impl Into<String>) -> Self {
        Self {
            token_key: token_key.into(),
            ..Self::default()
        }
    }

    /// Reads configuration from environment variables.
    ///
    /// Reads:
    /// - `CIRCONUS_API_TOKEN` — API token (required)
    /// - `CIRCONUS_API_APP` — app name
    /// - `CIRCONUS_API_URL` — API URL or bare host
    /// - `CIRCONUS_API_ACCOUNT_ID` — account id
    /// - `CIRCONUS_API_DEBUG` — `1`/`true` enables debug logging
    pub fn from_env() -> std::result::Result<Self, String> {
        let token = std::env::var("CIRCONUS_API_TOKEN")
            .map_err(|_| "missing CIRCONUS_API_TOKEN environment variable".to_owned())?;
        if token.trim().is_empty() {
            return Err("CIRCONUS_API_TOKEN is set but empty".to_owned());
        }
        let var = |name: &str| std::env::var(name).unwrap_or_default().trim().to_owned();
        let debug = var("CIRCONUS_API_DEBUG");
        Ok(Self {
            url: var("CIRCONUS_API_URL"),
            token_key: token.trim().to_owned(),
            token_app: var("CIRCONUS_API_APP"),
            token_account_id: var("CIRCONUS_API_ACCOUNT_ID"),
            debug: debug == "1" || debug.eq_ignore_ascii_case("true"),
            ..Self::default()
        })
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn with_app(mut self, app: impl Into<String>) -> Self {
        self.token_app = app.into();
        self
    }

    pub fn with_account_id(mut self, account_id: impl Into<String>) -> Self {
        self.token_account_id = account_id.into();
        self
    }

    pub fn with_retry_delays(mut self, min: impl Into<String>, max: impl Into<String>) -> Self {
        self.min_retry_delay = min.into();
        self.max_retry_delay = max.into();
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn with_retry_deadline(mut self, deadline: Duration) -> Self {
        self.retry_deadline = Some(deadline);
        self
    }
}

/// Parses a Go-style duration string such as `300ms`, `1.5s` or `1h2m3s`.
///
/// Units: `ns`, `us`/`µs`, `ms`, `s`, `m`, `h`. A bare `0` is accepted.
/// Negative durations are rejected.
pub fn parse_duration(input: &str) -> std::result::Result<Duration, String> {
    let text = input.trim();
    let text = text.strip_prefix('+').unwrap_or(text);
    if text.is_empty() {
        return Err(format!("invalid duration '{input}'"));
    }
    if text == "0" {
        return Ok(Duration::ZERO);
    }
    if text.starts_with('-') {
        return Err(format!("negative duration '{input}'"));
    }

    let mut total_nanos = 0f64;
    let mut rest = text;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        let (number, tail) = rest.split_at(number_len);
        if number.is_empty() || number == "." {
            return Err(format!("invalid duration '{input}'"));
        }
        let value: f64 = number
            .parse()
            .map_err(|_| format!("invalid duration '{input}'"))?;

        let unit_len = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        let (unit, tail) = tail.split_at(unit_len);
        let scale = match unit {
            "ns" => 1.0,
            "us" | "µs" | "μs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            "h" => 3_600e9,
            "" => return Err(format!("missing unit in duration '{input}'")),
            other => return Err(format!("unknown unit '{other}' in duration '{input}'")),
        };
        total_nanos += value * scale;
        rest = tail;
    }

    if !total_nanos.is_finite() || total_nanos > u64::MAX as f64 {
        return Err(format!("duration out of range '{input}'"));
    }
    Ok(Duration::from_nanos(total_nanos.round() as u64))
}
