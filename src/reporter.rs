//! Single funnel for run failures
//!
//! Every failure caught by the orchestrator ends up here: it is always
//! logged locally and, when error forwarding is enabled, also sent to chat.

use std::sync::Arc;

use tracing::{debug, error, instrument, warn};

use crate::error::NotificationError;
use crate::notify::Notifier;

#[derive(Clone)]
pub struct ErrorReporter {
    notifier: Arc<dyn Notifier>,
    forward: bool,
}

/// What happened to a reported error besides local logging
#[derive(Debug)]
pub enum Forwarding {
    Disabled,
    Delivered,
    Failed(NotificationError),
}

impl ErrorReporter {
    pub fn new(notifier: Arc<dyn Notifier>, forward: bool) -> Self {
        Self { notifier, forward }
    }

    #[instrument(skip_all)]
    pub async fn report(&self, message: &str) -> Forwarding {
        error!("{message}");

        if !self.forward {
            return Forwarding::Disabled;
        }

        match self.notifier.send_plain(message).await {
            Ok(()) => {
                debug!("error forwarded to chat");
                Forwarding::Delivered
            }
            Err(e) => {
                warn!("could not forward error to chat ({}): {e}", e.kind());
                Forwarding::Failed(e)
            }
        }
    }
}
