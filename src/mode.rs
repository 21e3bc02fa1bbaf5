use std::sync::atomic::{AtomicU8, Ordering};

/// Retry policy applied by [`crate::ApiClient`] to each call.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum RetryMode {
    /// The transport retries internally within the configured bounds, then
    /// the outer loop keeps retrying anything that is not fatal.
    #[default]
    Drift,
    /// The transport makes exactly one attempt per outer iteration; all
    /// pacing comes from the outer loop.
    ExponentialBackoff,
}

impl RetryMode {
    fn as_u8(self) -> u8 {
        match self {
            Self::Drift => 0,
            Self::ExponentialBackoff => 1,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::ExponentialBackoff,
            _ => Self::Drift,
        }
    }
}

/// Mode switch shared by every in-flight call of one client.
///
/// A call reads the mode once when it starts and keeps that policy until it
/// finishes, so toggling only affects calls started afterwards.
#[derive(Debug, Default)]
pub(crate) struct ModeCell(AtomicU8);

impl ModeCell {
    pub(crate) fn load(&self) -> RetryMode {
        RetryMode::from_u8(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn store(&self, mode: RetryMode) {
        self.0.store(mode.as_u8(), Ordering::Release);
    }
}
