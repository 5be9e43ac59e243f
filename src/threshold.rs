//! Download speed threshold guard
//!
//! ```text
//! threshold unset / <= 0          → Disabled (no alert)
//! download_mbps >= threshold      → Ok       (no alert)
//! download_mbps <  threshold      → Breached (one alert)
//! ```

use std::sync::Arc;

use tracing::{debug, instrument, warn};

use crate::notify::Notifier;
use crate::record::NormalizedRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeedEvaluation {
    Disabled,
    Ok,
    Breached,
}

impl SpeedEvaluation {
    pub fn evaluate(download_mbps: f64, threshold: Option<f64>) -> SpeedEvaluation {
        match threshold {
            Some(limit) if limit > 0.0 => {
                if download_mbps < limit {
                    SpeedEvaluation::Breached
                } else {
                    SpeedEvaluation::Ok
                }
            }
            _ => SpeedEvaluation::Disabled,
        }
    }
}

#[derive(Clone)]
pub struct ThresholdGuard {
    notifier: Arc<dyn Notifier>,
    threshold: Option<f64>,
}

impl ThresholdGuard {
    pub fn new(notifier: Arc<dyn Notifier>, threshold: Option<f64>) -> Self {
        Self {
            notifier,
            threshold,
        }
    }

    /// Alert if the recorded download speed is below the threshold
    ///
    /// Returns whether an alert was fired. A failed delivery still counts as
    /// fired and never fails the run.
    #[instrument(skip_all, fields(download = record.download_mbps, threshold = ?self.threshold))]
    pub async fn check(&self, record: &NormalizedRecord) -> bool {
        let evaluation = SpeedEvaluation::evaluate(record.download_mbps, self.threshold);
        debug!("{evaluation:?}");

        let (SpeedEvaluation::Breached, Some(limit)) = (evaluation, self.threshold) else {
            return false;
        };

        let message = format_speed_alert(record, limit);
        if let Err(e) = self.notifier.send(&message).await {
            warn!("speed alert was not delivered: {e}");
        }
        true
    }
}

pub fn format_speed_alert(record: &NormalizedRecord, threshold: f64) -> String {
    format!(
        "⚠️ *Slow connection*: download is *{:.2} Mbps*, below the threshold of *{:.2} Mbps*\n\
         Upload: {:.2} Mbps | Ping: {:.2} ms\n\
         ISP: {} ({})",
        record.download_mbps, threshold, record.upload_mbps, record.ping_ms, record.isp, record.ip
    )
}
