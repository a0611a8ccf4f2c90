use std::time::Duration;

/// Why a single download attempt did not produce a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptFailure {
    Status(u16),
    Transport(String),
    Io(String),
}

impl AttemptFailure {
    pub fn describe(&self) -> String {
        match self {
            AttemptFailure::Status(status) => format!("HTTP status {status}"),
            AttemptFailure::Transport(message) => message.clone(),
            AttemptFailure::Io(message) => format!("io: {message}"),
        }
    }
}

/// Decides whether another attempt follows a failed one.
///
/// `attempt` is the 1-based number of the attempt that just failed. Returning
/// `None` ends the loop; `Some(delay)` sleeps for `delay` and tries again.
pub trait RetryPolicy: Send + Sync {
    fn next_delay(&self, attempt: usize, failure: &AttemptFailure) -> Option<Duration>;
}

/// Retries every failure class identically with no delay, up to a fixed budget.
#[derive(Debug, Clone, Copy)]
pub struct Unconditional {
    max_attempts: usize,
}

impl Unconditional {
    pub fn new(max_attempts: usize) -> Self {
        Self { max_attempts }
    }
}

impl RetryPolicy for Unconditional {
    fn next_delay(&self, attempt: usize, _failure: &AttemptFailure) -> Option<Duration> {
        (attempt < self.max_attempts).then_some(Duration::ZERO)
    }
}

/// Linear backoff; optionally gives up immediately on 404.
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    pub max_attempts: usize,
    pub base_delay: Duration,
    pub stop_on_not_found: bool,
}

impl RetryPolicy for Backoff {
    fn next_delay(&self, attempt: usize, failure: &AttemptFailure) -> Option<Duration> {
        if attempt >= self.max_attempts {
            return None;
        }
        if self.stop_on_not_found && matches!(failure, AttemptFailure::Status(404)) {
            return None;
        }
        Some(self.base_delay * attempt as u32)
    }
}
