//! Local typing-indicator debounce.
//!
//! The debounce holds one flag and at most one deadline. Each keystroke that
//! leaves non-empty input re-arms the deadline (last writer wins); the flag
//! clears when the deadline passes or when the message is sent.

use std::time::Duration;

use tokio::time::Instant;

/// Default idle period after which typing is considered stopped.
pub const DEFAULT_TYPING_IDLE: Duration = Duration::from_secs(1);

/// Transition reported by [`TypingDebounce`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypingSignal {
    /// The local user started typing.
    Started,
    /// The local user stopped typing.
    Stopped,
}

/// Typing flag plus its single outstanding deadline.
#[derive(Debug, Clone)]
pub struct TypingDebounce {
    idle: Duration,
    is_typing: bool,
    deadline: Option<Instant>,
}

impl TypingDebounce {
    /// Create a debounce that expires after `idle` without keystrokes.
    pub fn new(idle: Duration) -> Self {
        Self {
            idle,
            is_typing: false,
            deadline: None,
        }
    }

    /// Whether typing is currently being signalled.
    pub fn is_typing(&self) -> bool {
        self.is_typing
    }

    /// The pending expiry, if armed.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Register a keystroke that left `input` in the text box.
    ///
    /// Whitespace-only input is ignored. Returns [`TypingSignal::Started`] when
    /// this keystroke begins a typing run.
    pub fn on_input(&mut self, input: &str, now: Instant) -> Option<TypingSignal> {
        if input.trim().is_empty() {
            return None;
        }
        // Replace, never stack, the pending deadline. An idle period past the
        // end of the clock never expires.
        self.deadline = now.checked_add(self.idle);
        if self.is_typing {
            None
        } else {
            self.is_typing = true;
            Some(TypingSignal::Started)
        }
    }

    /// Expire the deadline if it has passed.
    pub fn poll(&mut self, now: Instant) -> Option<TypingSignal> {
        match self.deadline {
            Some(deadline) if now >= deadline => self.stop(),
            _ => None,
        }
    }

    /// Stop immediately (explicit send, leave, connection loss).
    pub fn stop(&mut self) -> Option<TypingSignal> {
        self.deadline = None;
        if self.is_typing {
            self.is_typing = false;
            Some(TypingSignal::Stopped)
        } else {
            None
        }
    }
}

impl Default for TypingDebounce {
    fn default() -> Self {
        Self::new(DEFAULT_TYPING_IDLE)
    }
}
