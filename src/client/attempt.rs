//! Per-call retry bookkeeping.

use std::fmt;

use uuid::Uuid;

/// Where a logical call currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    /// Obtaining a token, syncing the descriptor, and signing.
    Preparing,
    /// Waiting on the transport.
    Sending,
    /// Recovering from an auth failure before the next attempt.
    Retrying,
    Delivered,
    Failed,
    Cancelled,
}

impl CallState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Delivered | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for CallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Preparing => "preparing",
            Self::Sending => "sending",
            Self::Retrying => "retrying",
            Self::Delivered => "delivered",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// State owned by one logical call across its attempts.
#[derive(Debug)]
pub struct AttemptContext {
    call_id: Uuid,
    state: CallState,
    attempt: u32,
    retries_remaining: u32,
    /// Server time in seconds, from the latest response that carried one.
    last_server_time: Option<f64>,
}

impl AttemptContext {
    pub fn new(retry_budget: u32) -> Self {
        Self {
            call_id: Uuid::new_v4(),
            state: CallState::Preparing,
            attempt: 0,
            retries_remaining: retry_budget,
            last_server_time: None,
        }
    }

    pub fn call_id(&self) -> Uuid {
        self.call_id
    }

    pub fn state(&self) -> CallState {
        self.state
    }

    /// Number of physical sends started so far.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn retries_remaining(&self) -> u32 {
        self.retries_remaining
    }

    pub fn last_server_time(&self) -> Option<f64> {
        self.last_server_time
    }

    pub fn record_server_time(&mut self, seconds: f64) {
        self.last_server_time = Some(seconds);
    }

    pub fn transition(&mut self, next: CallState) {
        debug_assert!(!self.state.is_terminal(), "call already finished");
        if next == CallState::Sending {
            self.attempt += 1;
        }
        self.state = next;
    }

    /// Spend one unit of the retry budget. Returns false when exhausted.
    pub fn take_retry(&mut self) -> bool {
        if self.retries_remaining == 0 {
            return false;
        }
        self.retries_remaining -= 1;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_budget_is_consumed() {
        let mut ctx = AttemptContext::new(2);
        assert!(ctx.take_retry());
        assert!(ctx.take_retry());
        assert!(!ctx.take_retry());
        assert_eq!(ctx.retries_remaining(), 0);
    }

    #[test]
    fn test_zero_budget() {
        let mut ctx = AttemptContext::new(0);
        assert!(!ctx.take_retry());
    }

    #[test]
    fn test_attempts_counted_on_send() {
        let mut ctx = AttemptContext::new(1);
        assert_eq!(ctx.state(), CallState::Preparing);
        ctx.transition(CallState::Sending);
        ctx.transition(CallState::Retrying);
        ctx.transition(CallState::Preparing);
        ctx.transition(CallState::Sending);
        ctx.transition(CallState::Delivered);
        assert_eq!(ctx.attempt(), 2);
        assert!(ctx.state().is_terminal());
    }

    #[test]
    fn test_latest_server_time_wins() {
        let mut ctx = AttemptContext::new(1);
        assert_eq!(ctx.last_server_time(), None);
        ctx.record_server_time(1_434_440_090.0);
        ctx.record_server_time(1_434_440_091.5);
        assert_eq!(ctx.last_server_time(), Some(1_434_440_091.5));
    }

    #[test]
    fn test_call_ids_are_unique() {
        assert_ne!(AttemptContext::new(0).call_id(), AttemptContext::new(0).call_id());
    }
}
