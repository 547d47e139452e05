//! User-facing error notification channel.
//!
//! SYSTEM CONTEXT
//! ==============
//! The gateway publishes here on every failure it could not recover from;
//! the UI layer renders the current message and clears it when dismissed.

#[cfg(test)]
#[path = "notice_test.rs"]
mod notice_test;

use tokio::sync::watch;

/// Current notification. `seq` increases on every publication so repeated
/// identical messages are still observable as separate events.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Notice {
    pub message: String,
    pub seq: u64,
}

impl Notice {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.message.is_empty()
    }
}

/// Shared handle to the error notification state.
#[derive(Clone)]
pub struct ErrorNotice {
    tx: watch::Sender<Notice>,
}

impl Default for ErrorNotice {
    fn default() -> Self {
        Self::new()
    }
}

impl ErrorNotice {
    #[must_use]
    pub fn new() -> Self {
        Self { tx: watch::Sender::new(Notice::default()) }
    }

    /// Publish a message.
    pub fn set(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::debug!(%message, "error notice published");
        self.tx.send_modify(|notice| {
            notice.message = message;
            notice.seq += 1;
        });
    }

    /// Dismiss the current message. The sequence number is kept.
    pub fn clear(&self) {
        self.tx.send_if_modified(|notice| {
            if notice.message.is_empty() {
                return false;
            }
            notice.message.clear();
            true
        });
    }

    #[must_use]
    pub fn message(&self) -> String {
        self.tx.borrow().message.clone()
    }

    #[must_use]
    pub fn current(&self) -> Notice {
        self.tx.borrow().clone()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Notice> {
        self.tx.subscribe()
    }
}
