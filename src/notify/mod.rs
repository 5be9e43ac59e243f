//! Chat notifications
//!
//! Sending is best-effort. [`Notifier::send`] reports the outcome so callers
//! can log it, but no caller aborts a run because a message was lost.

pub mod telegram;

use async_trait::async_trait;

use crate::error::NotificationError;

pub use telegram::TelegramNotifier;

pub type NotifyResult = Result<(), NotificationError>;

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Send a Markdown-formatted text message
    ///
    /// Implementations log their own failures.
    async fn send(&self, text: &str) -> NotifyResult;

    /// Send text verbatim, without any markup interpretation
    ///
    /// Used for messages carrying arbitrary error output.
    async fn send_plain(&self, text: &str) -> NotifyResult {
        self.send(text).await
    }
}

/// Notifier used when chat credentials are absent
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledNotifier;

#[async_trait]
impl Notifier for DisabledNotifier {
    async fn send(&self, _text: &str) -> NotifyResult {
        tracing::trace!("notifications disabled, dropping message");
        Err(NotificationError::NotConfigured)
    }
}
