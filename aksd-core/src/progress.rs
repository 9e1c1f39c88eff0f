//! One-way progress reporting from the deploy flow to an observer
//!
//! Reporting never waits on the observer: labels go through a bounded
//! channel and are dropped when it is full.

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info};

/// A human-readable progress label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceProgress {
    pub message: String,
}

impl ServiceProgress {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Sending half of the progress stream.
#[derive(Debug, Clone, Default)]
pub struct ProgressReporter {
    sender: Option<mpsc::Sender<ServiceProgress>>,
}

impl ProgressReporter {
    /// A reporter and the receiver the observer drains.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<ServiceProgress>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (
            Self {
                sender: Some(sender),
            },
            receiver,
        )
    }

    /// A reporter that only logs.
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn report(&self, message: impl Into<String>) {
        let progress = ServiceProgress::new(message);
        info!(progress = %progress.message);

        let Some(sender) = &self.sender else {
            return;
        };
        match sender.try_send(progress) {
            Ok(()) => {}
            Err(TrySendError::Full(dropped)) => {
                debug!(progress = %dropped.message, "progress observer lagging, label dropped");
            }
            Err(TrySendError::Closed(_)) => {}
        }
    }
}
