use std::{future::Future, time::Duration};

use bytes::Bytes;
use reqwest::{
    header::{self, HeaderMap},
    Method,
};
use tokio::time::sleep;
use url::Url;

use crate::{
    backoff,
    logger::{LogLevel, Logger},
    tls::TlsSettings,
    ApiError, ClientConfig, Result, TransportError,
};

/// A single HTTP attempt as handed to a [`Transport`].
#[derive(Clone, Debug)]
pub struct AttemptRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

/// What a [`Transport`] received for one attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawResponse {
    /// HTTP status code; `0` means no usable status was received.
    pub status: u16,
    /// Parsed `Retry-After` header, when it carried whole seconds.
    pub retry_after: Option<Duration>,
    pub body: Bytes,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            retry_after: None,
            body: body.into(),
        }
    }
}

/// Performs exactly one network attempt.
///
/// Retrying is not the transport's job; the client drives it according to a
/// [`TransportPolicy`].
pub trait Transport: Send + Sync {
    fn execute(
        &self,
        request: &AttemptRequest,
    ) -> impl Future<Output = std::result::Result<RawResponse, TransportError>> + Send;
}

/// Bounds for the transport-level retry loop of one outer attempt.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TransportPolicy {
    pub min_wait: Duration,
    pub max_wait: Duration,
    /// Retries after the first attempt; `0` means a single attempt.
    pub max_retries: u32,
}

impl TransportPolicy {
    /// Policy used while exponential backoff is enabled.
    pub const SINGLE_ATTEMPT: Self = Self {
        min_wait: Duration::from_secs(1),
        max_wait: Duration::from_secs(60),
        max_retries: 0,
    };
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Disposition {
    Retry,
    Accept,
}

fn classify(status: u16) -> Disposition {
    if status == 0 || status >= 500 || status == 429 {
        Disposition::Retry
    } else {
        Disposition::Accept
    }
}

/// Runs one outer attempt: up to `1 + policy.max_retries` transport calls.
///
/// Connection failures and `0`/`429`/`5xx` responses are retried; anything
/// else is final. When retries run out the last failure is returned,
/// including the trimmed body of the last retryable response.
pub(crate) async fn send_with_retry<T: Transport>(
    transport: &T,
    request: &AttemptRequest,
    policy: &TransportPolicy,
    logger: &dyn Logger,
) -> Result<Bytes> {
    let mut attempt = 0u32;
    loop {
        let (failure, retry_after) = match transport.execute(request).await {
            Ok(response) => match classify(response.status) {
                Disposition::Accept => return finish(request, response, logger),
                Disposition::Retry => {
                    let retry_after = match response.status {
                        429 | 503 => response.retry_after,
                        _ => None,
                    };
                    let failure = ApiError::Status {
                        status: response.status,
                        body: String::from_utf8_lossy(&response.body).trim().to_owned(),
                    };
                    (failure, retry_after)
                }
            },
            Err(source) => {
                let failure = ApiError::Transport {
                    url: request.url.to_string(),
                    source,
                };
                (failure, None)
            }
        };

        if attempt >= policy.max_retries {
            return Err(failure);
        }

        let wait = backoff::transport_wait(policy.min_wait, policy.max_wait, attempt, retry_after);
        logger.log(
            LogLevel::Debug,
            &format!(
                "[DEBUG] {} {}: {failure}; transport retry in {wait:?} ({} left)",
                request.method,
                request.url,
                policy.max_retries - attempt
            ),
        );
        sleep(wait).await;
        attempt += 1;
    }
}

fn finish(request: &AttemptRequest, response: RawResponse, logger: &dyn Logger) -> Result<Bytes> {
    if (200..300).contains(&response.status) {
        return Ok(response.body);
    }
    let error = ApiError::Status {
        status: response.status,
        body: String::from_utf8_lossy(&response.body).into_owned(),
    };
    logger.log(
        LogLevel::Debug,
        &format!("[DEBUG] {} {}: {error}", request.method, request.url),
    );
    Err(error)
}

/// [`Transport`] backed by `reqwest`.
///
/// Idle connections are never pooled, so every attempt runs on a fresh
/// connection. No response compression is requested.
#[derive(Clone, Debug)]
pub struct HttpTransport {
    http: reqwest::Client,
}

impl HttpTransport {
    /// Builds the transport for a base URL with the given scheme.
    pub fn new(config: &ClientConfig, scheme: &str) -> Result<Self> {
        let builder = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .tcp_keepalive(Duration::from_secs(30))
            .pool_max_idle_per_host(0);
        let builder = match config.request_timeout {
            Some(timeout) => builder.timeout(timeout),
            None => builder,
        };
        let http = TlsSettings::select(scheme, config)
            .apply(builder)
            .build()
            .map_err(|err| ApiError::Build(err.to_string()))?;
        Ok(Self { http })
    }
}

impl Transport for HttpTransport {
    async fn execute(
        &self,
        request: &AttemptRequest,
    ) -> std::result::Result<RawResponse, TransportError> {
        let mut builder = self
            .http
            .request(request.method.clone(), request.url.clone())
            .headers(request.headers.clone());
        if let Some(body) = &request.body {
            builder = builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(body.clone());
        }

        let response = builder
            .send()
            .await
            .map_err(|err| TransportError::with_source(describe(&err), err))?;
        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get(header::RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        let body = response
            .bytes()
            .await
            .map_err(|err| TransportError::with_source("reading API response", err))?;

        Ok(RawResponse {
            status,
            retry_after,
            body,
        })
    }
}

fn describe(err: &reqwest::Error) -> &'static str {
    if err.is_timeout() {
        "request timed out"
    } else if err.is_connect() {
        "connecting to API"
    } else if err.is_builder() {
        "creating API request"
    } else {
        "sending API request"
    }
}
