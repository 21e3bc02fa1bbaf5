use std::{fmt, sync::Arc, time::Duration};

use bytes::Bytes;
use reqwest::{
    header::{self, HeaderMap, HeaderName, HeaderValue},
    Method,
};
use serde::{de::DeserializeOwned, Serialize};
use tokio::time::{sleep, timeout_at, Instant};
use url::Url;

use crate::{
    backoff::JitterSource,
    config::{
        parse_duration, DEFAULT_API_URL, DEFAULT_APP_NAME, DEFAULT_MAX_RETRIES,
        DEFAULT_MAX_RETRY_DELAY, DEFAULT_MIN_RETRY_DELAY,
    },
    logger::{DiscardLogger, LogLevel, Logger, TracingLogger},
    mode::ModeCell,
    search::{search_path, SearchFilter, SearchQuery},
    transport::{send_with_retry, AttemptRequest, HttpTransport, Transport, TransportPolicy},
    ApiError, ClientConfig, Result, RetryMode,
};

const AUTH_TOKEN_HEADER: &str = "x-circonus-auth-token";
const APP_NAME_HEADER: &str = "x-circonus-app-name";
const ACCOUNT_ID_HEADER: &str = "x-circonus-account-id";

/// Normalizes a configured API URL into the effective base URL.
///
/// Empty input selects the default endpoint. Input without any `/` is a bare
/// host and becomes `https://<host>/v2`; input without a scheme gets
/// `https://`. One trailing `/` is dropped.
///
/// Example: `"api.example.com"` → `"https://api.example.com/v2"`
pub fn normalize_base_url(raw: &str) -> Result<Url> {
    let raw = raw.trim();
    let mut text = if raw.is_empty() {
        DEFAULT_API_URL.to_owned()
    } else if !raw.contains('/') {
        format!("https://{raw}/v2")
    } else if !raw.contains("://") {
        format!("https://{raw}")
    } else {
        raw.to_owned()
    };
    if text.ends_with('/') {
        text.pop();
    }
    Url::parse(&text).map_err(|source| ApiError::InvalidUrl { url: text, source })
}

#[derive(Clone)]
/// Request dispatcher for the Circonus API.
///
/// Cloning is cheap; clones share the retry mode (see
/// [`ApiClient::enable_exponential_backoff`]).
pub struct ApiClient<T = HttpTransport> {
    transport: T,
    base: String,
    headers: HeaderMap,
    min_retry_delay: Duration,
    max_retry_delay: Duration,
    max_retries: u32,
    disable_retries: bool,
    debug: bool,
    retry_deadline: Option<Duration>,
    logger: Arc<dyn Logger>,
    mode: Arc<ModeCell>,
    jitter: JitterSource,
}

impl<T> fmt::Debug for ApiClient<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base)
            .field("token", &"<redacted>")
            .field("min_retry_delay", &self.min_retry_delay)
            .field("max_retry_delay", &self.max_retry_delay)
            .field("max_retries", &self.max_retries)
            .field("disable_retries", &self.disable_retries)
            .field("debug", &self.debug)
            .field("retry_mode", &self.mode.load())
            .finish()
    }
}

impl ApiClient<HttpTransport> {
    /// Creates a client that talks HTTP(S) through `reqwest`.
    ///
    /// Validation is synchronous and no network I/O happens here.
    pub fn new(config: ClientConfig) -> Result<Self> {
        require_token(&config)?;
        let base_url = normalize_base_url(&config.url)?;
        let transport = HttpTransport::new(&config, base_url.scheme())?;
        Self::assemble(config, base_url, transport)
    }

    /// Creates a client from `CIRCONUS_API_*` environment variables.
    ///
    /// See [`ClientConfig::from_env`].
    pub fn from_env() -> Result<Self> {
        let config = ClientConfig::from_env().map_err(|_| ApiError::MissingToken)?;
        Self::new(config)
    }
}

impl<T: Transport> ApiClient<T> {
    /// Creates a client on top of a caller-supplied transport.
    pub fn with_transport(config: ClientConfig, transport: T) -> Result<Self> {
        require_token(&config)?;
        let base_url = normalize_base_url(&config.url)?;
        Self::assemble(config, base_url, transport)
    }

    fn assemble(config: ClientConfig, base_url: Url, transport: T) -> Result<Self> {
        let logger: Arc<dyn Logger> = match config.logger.clone() {
            Some(logger) => logger,
            None if config.debug => Arc::new(TracingLogger),
            None => Arc::new(DiscardLogger),
        };

        let app = match config.token_app.trim() {
            "" => DEFAULT_APP_NAME,
            app => app,
        };
        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(
            HeaderName::from_static(AUTH_TOKEN_HEADER),
            header_value("token", &config.token_key)?,
        );
        headers.insert(
            HeaderName::from_static(APP_NAME_HEADER),
            header_value("app name", app)?,
        );
        if !config.token_account_id.is_empty() {
            headers.insert(
                HeaderName::from_static(ACCOUNT_ID_HEADER),
                header_value("account id", &config.token_account_id)?,
            );
        }
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));

        let max_retries = if config.disable_retries {
            0
        } else {
            config.max_retries.unwrap_or(DEFAULT_MAX_RETRIES)
        };
        let min_retry_delay = retry_delay(
            "min retry delay",
            &config.min_retry_delay,
            DEFAULT_MIN_RETRY_DELAY,
            logger.as_ref(),
        );
        let max_retry_delay = retry_delay(
            "max retry delay",
            &config.max_retry_delay,
            DEFAULT_MAX_RETRY_DELAY,
            logger.as_ref(),
        );

        // `Url` serializes an empty path as `/`; any other path is kept as given.
        let base = match (base_url.path(), base_url.as_str().strip_suffix('/')) {
            ("/", Some(root)) => root.to_owned(),
            _ => base_url.as_str().to_owned(),
        };
        Ok(Self {
            transport,
            base,
            headers,
            min_retry_delay,
            max_retry_delay,
            max_retries,
            disable_retries: config.disable_retries,
            debug: config.debug,
            retry_deadline: config.retry_deadline,
            logger,
            mode: Arc::new(ModeCell::default()),
            jitter: JitterSource::default(),
        })
    }

    /// Replaces the random source used for retry jitter.
    pub fn with_jitter(mut self, jitter: JitterSource) -> Self {
        self.jitter = jitter;
        self
    }

    /// Effective base URL that request paths are appended to.
    pub fn base_url(&self) -> &str {
        &self.base
    }

    /// Switches subsequent calls to exponential backoff.
    ///
    /// Calls already in flight keep the mode they started with.
    pub fn enable_exponential_backoff(&self) {
        self.mode.store(RetryMode::ExponentialBackoff);
    }

    /// Switches subsequent calls back to drift retry.
    pub fn disable_exponential_backoff(&self) {
        self.mode.store(RetryMode::Drift);
    }

    pub fn retry_mode(&self) -> RetryMode {
        self.mode.load()
    }

    /// Transport-level retry bounds a call started in `mode` would use.
    pub fn transport_policy(&self, mode: RetryMode) -> TransportPolicy {
        match mode {
            RetryMode::ExponentialBackoff => TransportPolicy::SINGLE_ATTEMPT,
            RetryMode::Drift => TransportPolicy {
                min_wait: self.min_retry_delay,
                max_wait: self.max_retry_delay,
                max_retries: self.max_retries,
            },
        }
    }

    /// Resolves a request path against the base URL.
    ///
    /// A leading `/v2` segment is dropped since the base URL already carries
    /// the API version; a missing leading `/` is added.
    pub fn resolve_url(&self, path: &str) -> Result<Url> {
        if path.is_empty() {
            return Err(ApiError::EmptyPath);
        }
        let mut url = self.base.clone();
        if !path.starts_with('/') {
            url.push('/');
        }
        url.push_str(strip_version_prefix(path));
        Url::parse(&url).map_err(|source| ApiError::InvalidUrl { url, source })
    }

    pub async fn get(&self, path: &str) -> Result<Bytes> {
        self.request(Method::GET, path, None).await
    }

    pub async fn delete(&self, path: &str) -> Result<Bytes> {
        self.request(Method::DELETE, path, None).await
    }

    pub async fn post(&self, path: &str, body: impl Into<Bytes>) -> Result<Bytes> {
        self.request(Method::POST, path, Some(body.into())).await
    }

    pub async fn put(&self, path: &str, body: impl Into<Bytes>) -> Result<Bytes> {
        self.request(Method::PUT, path, Some(body.into())).await
    }

    /// Fetches `path` and decodes the JSON response.
    pub async fn get_json<R: DeserializeOwned>(&self, path: &str) -> Result<R> {
        let body = self.get(path).await?;
        decode_json(&body)
    }

    /// Creates a resource from `payload` and decodes the stored result.
    pub async fn post_json<B, R>(&self, path: &str, payload: &B) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let body = self.post(path, encode_json(payload)?).await?;
        decode_json(&body)
    }

    /// Updates a resource from `payload` and decodes the stored result.
    pub async fn put_json<B, R>(&self, path: &str, payload: &B) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let body = self.put(path, encode_json(payload)?).await?;
        decode_json(&body)
    }

    /// Searches the `resource` collection by free text and/or field filters.
    pub async fn search(
        &self,
        resource: &str,
        query: Option<&SearchQuery>,
        filter: Option<&SearchFilter>,
    ) -> Result<Bytes> {
        self.get(&search_path(resource, query, filter)).await
    }

    /// Issues a request under the configured retry deadline, if any.
    pub async fn request(&self, method: Method, path: &str, body: Option<Bytes>) -> Result<Bytes> {
        self.dispatch(method, path, body, self.retry_deadline).await
    }

    /// Issues a request that gives up once `deadline` has elapsed.
    pub async fn request_with_deadline(
        &self,
        method: Method,
        path: &str,
        body: Option<Bytes>,
        deadline: Duration,
    ) -> Result<Bytes> {
        self.dispatch(method, path, body, Some(deadline)).await
    }

    async fn dispatch(
        &self,
        method: Method,
        path: &str,
        body: Option<Bytes>,
        deadline: Option<Duration>,
    ) -> Result<Bytes> {
        let url = self.resolve_url(path)?;
        let policy = self.transport_policy(self.mode.load());

        if let Some(body) = body.as_ref().filter(|body| !body.is_empty()) {
            self.logger.log(
                LogLevel::Debug,
                &format!("[DEBUG] sending json ({})", String::from_utf8_lossy(body)),
            );
        }

        let request = AttemptRequest {
            method,
            url,
            headers: self.headers.clone(),
            body,
        };
        let transport_logger: &dyn Logger = if self.debug {
            self.logger.as_ref()
        } else {
            &DiscardLogger
        };

        let started = Instant::now();
        let mut last_error: Option<ApiError> = None;
        let mut attempt = 0usize;
        loop {
            let outcome = match deadline {
                Some(limit) => {
                    let attempt_call =
                        send_with_retry(&self.transport, &request, &policy, transport_logger);
                    match timeout_at(started + limit, attempt_call).await {
                        Ok(outcome) => outcome,
                        Err(_) => {
                            return Err(ApiError::DeadlineExceeded {
                                deadline: limit,
                                last: last_error.map(Box::new),
                            })
                        }
                    }
                }
                None => send_with_retry(&self.transport, &request, &policy, transport_logger).await,
            };

            let err = match outcome {
                Ok(body) => {
                    if attempt > 0 {
                        self.logger.log(
                            LogLevel::Info,
                            &format!("API call succeeded after {attempt} retries."),
                        );
                    }
                    return Ok(body);
                }
                Err(err) => err,
            };
            if err.is_fatal() || self.disable_retries {
                return Err(err);
            }

            let wait = self.jitter.retry_wait(attempt);
            if let Some(limit) = deadline {
                if started.elapsed() + wait >= limit {
                    return Err(ApiError::DeadlineExceeded {
                        deadline: limit,
                        last: Some(Box::new(err)),
                    });
                }
            }

            self.logger.log(
                LogLevel::Warn,
                &format!(
                    "API call failed {err}, retrying in {} seconds.",
                    wait.as_secs()
                ),
            );
            sleep(wait).await;
            attempt += 1;
            last_error = Some(err);
        }
    }
}

fn require_token(config: &ClientConfig) -> Result<()> {
    if config.token_key.trim().is_empty() {
        return Err(ApiError::MissingToken);
    }
    Ok(())
}

fn header_value(what: &str, value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value.trim())
        .map_err(|_| ApiError::Build(format!("{what} contains characters not allowed in a header")))
}

fn retry_delay(name: &str, raw: &str, default: Duration, logger: &dyn Logger) -> Duration {
    if raw.trim().is_empty() {
        return default;
    }
    match parse_duration(raw) {
        Ok(delay) => delay,
        Err(err) => {
            logger.log(
                LogLevel::Error,
                &format!("[ERR] {name} ({raw}): {err}; using {default:?}"),
            );
            default
        }
    }
}

fn strip_version_prefix(path: &str) -> &str {
    match path.strip_prefix("/v2") {
        Some(rest) if rest.is_empty() || rest.starts_with('/') || rest.starts_with('?') => rest,
        _ => path,
    }
}

fn encode_json<B: Serialize + ?Sized>(payload: &B) -> Result<Vec<u8>> {
    serde_json::to_vec(payload)
        .map_err(|err| ApiError::Decode(format!("encoding request JSON: {err}")))
}

fn decode_json<R: DeserializeOwned>(body: &[u8]) -> Result<R> {
    serde_json::from_slice(body).map_err(|err| {
        ApiError::Decode(format!(
            "invalid API response JSON: {err}; body: {}",
            String::from_utf8_lossy(body)
        ))
    })
}
