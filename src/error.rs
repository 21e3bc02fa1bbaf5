use std::{error::Error as StdError, fmt, time::Duration};

/// Error type returned by this crate.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The configuration carried no API token.
    #[error("API token is required")]
    MissingToken,
    /// The base URL did not parse after normalization.
    #[error("parsing API URL '{url}': {source}")]
    InvalidUrl {
        /// Normalized URL text that failed to parse.
        url: String,
        source: url::ParseError,
    },
    /// A request was issued with an empty path.
    #[error("invalid API URL path (empty)")]
    EmptyPath,
    /// Connection, TLS, timeout or body read failure from the transport.
    #[error("API call - {url}: {source}")]
    Transport {
        /// Fully resolved request URL.
        url: String,
        source: TransportError,
    },
    /// Non-success HTTP status code with raw response body.
    #[error("API response code {status}: {body}")]
    Status { status: u16, body: String },
    /// HTTP client or TLS setup failed.
    #[error("building HTTP client: {0}")]
    Build(String),
    /// JSON encoding or decoding failed.
    #[error("decode error: {0}")]
    Decode(String),
    /// The caller-supplied retry deadline elapsed before the call succeeded.
    #[error("API call deadline of {deadline:?} exceeded{}", last_error_suffix(.last))]
    DeadlineExceeded {
        deadline: Duration,
        /// Failure of the last completed attempt, if any attempt finished.
        last: Option<Box<ApiError>>,
    },
}

fn last_error_suffix(last: &Option<Box<ApiError>>) -> String {
    match last {
        Some(err) => format!(" (last error: {err})"),
        None => String::new(),
    }
}

impl ApiError {
    /// HTTP status carried by this error, if it came from a response.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::DeadlineExceeded {
                last: Some(last), ..
            } => last.status(),
            _ => None,
        }
    }

    /// Returns `true` when no amount of retrying can make the call succeed.
    ///
    /// Any status below `500` is fatal except `0` (no response),
    /// `408 Request Timeout` and `429 Too Many Requests`; this covers `4xx`
    /// client errors and redirects that were not followed. Configuration,
    /// path, build and decode errors are always fatal. An elapsed deadline
    /// is terminal as well.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Status { status, .. } => is_fatal_status(*status),
            Self::Transport { .. } => false,
            Self::MissingToken
            | Self::InvalidUrl { .. }
            | Self::EmptyPath
            | Self::Build(_)
            | Self::Decode(_)
            | Self::DeadlineExceeded { .. } => true,
        }
    }

    /// Inverse of [`ApiError::is_fatal`].
    pub fn is_retryable(&self) -> bool {
        !self.is_fatal()
    }
}

pub(crate) fn is_fatal_status(status: u16) -> bool {
    (100..500).contains(&status) && status != 408 && status != 429
}

/// Failure of a single network attempt, before any HTTP status was received.
#[derive(Debug)]
pub struct TransportError {
    message: String,
    source: Option<Box<dyn StdError + Send + Sync + 'static>>,
}

impl TransportError {
    /// Creates a transport error from a plain message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a transport error wrapping an underlying cause.
    pub fn with_source<E>(message: impl Into<String>, source: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Description of the failing step, without the underlying cause.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            Some(source) => write!(f, "{}: {source}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl StdError for TransportError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_deref()
            .map(|source| source as &(dyn StdError + 'static))
    }
}
