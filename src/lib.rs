//! `circonus-api` is an async HTTP client for the Circonus REST API.
//!
//! [`ApiClient`] turns a `(method, path, body)` tuple into a reliable API call:
//! - [`ApiClient::get`], [`ApiClient::put`], [`ApiClient::post`], [`ApiClient::delete`]
//! - [`ApiClient::enable_exponential_backoff`] / [`ApiClient::disable_exponential_backoff`]
//!   to switch between the two retry policies
//! - [`ApiClient::request_with_deadline`] to bound how long a call may retry

mod backoff;
mod client;
mod config;
mod error;
mod logger;
mod mode;
mod search;
mod tls;
mod transport;

pub use backoff::{jittered_secs, nominal_interval, JitterSource, BACKOFF_INTERVALS_SECS};
pub use client::{normalize_base_url, ApiClient};
pub use config::{
    parse_duration, ClientConfig, DEFAULT_API_URL, DEFAULT_APP_NAME, DEFAULT_MAX_RETRIES,
    DEFAULT_MAX_RETRY_DELAY, DEFAULT_MIN_RETRY_DELAY,
};
pub use error::{ApiError, TransportError};
pub use logger::{DiscardLogger, LogLevel, Logger, TracingLogger};
pub use mode::RetryMode;
pub use search::{search_path, SearchFilter, SearchQuery};
pub use transport::{AttemptRequest, HttpTransport, RawResponse, Transport, TransportPolicy};

pub use bytes::Bytes;
pub use reqwest::{Certificate, Method};

pub type Result<T> = std::result::Result<T, ApiError>;
