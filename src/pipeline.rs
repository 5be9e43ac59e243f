//! Orchestrator for a single measurement run
//!
//! ## Stage Machine
//!
//! ```text
//! Init → Measuring → Probing → Building → Persisting → Guarding → Done
//!   └──────────┴──────────┴──────────┴───────────┴─────────→ Failed(kind)
//! ```
//!
//! Stages run strictly in order and are never retried. The first failure
//! ends the run, is classified into an [`ErrorKind`] and handed to the
//! [`ErrorReporter`] exactly once. Nothing is persisted after a failure and
//! the threshold guard only runs once the store acknowledged the record.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use tracing::{debug, info, instrument};

use crate::config::{Config, DnsConfig};
use crate::dns::{DnsProbe, ResolverProbe, probe_all};
use crate::error::{ConfigError, ErrorKind, PipelineError, PipelineResult};
use crate::measurement::{CommandMeasurementClient, MeasurementSource};
use crate::notify::Notifier;
use crate::record::{NormalizedRecord, RecordBuilder};
use crate::reporter::ErrorReporter;
use crate::storage::RecordStore;
use crate::threshold::ThresholdGuard;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Init,
    Measuring,
    Probing,
    Building,
    Persisting,
    Guarding,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Init => "startup",
            Stage::Measuring => "measurement",
            Stage::Probing => "DNS probing",
            Stage::Building => "normalisation",
            Stage::Persisting => "persistence",
            Stage::Guarding => "threshold check",
            Stage::Done => "completion",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Completed {
        record: NormalizedRecord,
        /// Whether the threshold guard fired
        alerted: bool,
    },
    Failed {
        /// Stage that was active when the failure happened
        stage: Stage,
        kind: ErrorKind,
        message: String,
    },
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Completed { .. })
    }
}

pub struct Orchestrator {
    measurement: Arc<dyn MeasurementSource>,
    dns_probe: Arc<dyn DnsProbe>,
    dns: DnsConfig,
    store: Arc<dyn RecordStore>,
    guard: ThresholdGuard,
    reporter: ErrorReporter,
}

impl Orchestrator {
    pub fn new(
        measurement: Arc<dyn MeasurementSource>,
        dns_probe: Arc<dyn DnsProbe>,
        dns: DnsConfig,
        store: Arc<dyn RecordStore>,
        guard: ThresholdGuard,
        reporter: ErrorReporter,
    ) -> Self {
        Self {
            measurement,
            dns_probe,
            dns,
            store,
            guard,
            reporter,
        }
    }

    /// Wire the real measurement tool and resolver probe from configuration
    pub fn from_config(
        config: &Config,
        store: Arc<dyn RecordStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let measurement = CommandMeasurementClient::new(
            config.measurement.program.clone(),
            config.measurement.args.clone(),
            config.measurement.timeout,
        );

        Self::new(
            Arc::new(measurement),
            Arc::new(ResolverProbe::new()),
            config.dns.clone(),
            store,
            ThresholdGuard::new(notifier.clone(), config.threshold),
            ErrorReporter::new(notifier, config.reporting.error_reporting),
        )
    }

    /// Run the pipeline once to completion
    pub async fn run(&self) -> RunOutcome {
        self.run_until(std::future::pending::<()>()).await
    }

    /// Run the pipeline once, aborting with `Interrupted` if `cancel` resolves first
    #[instrument(skip_all, fields(store = self.store.name()))]
    pub async fn run_until(&self, cancel: impl Future<Output = ()>) -> RunOutcome {
        let mut stage = Stage::Init;

        let result = tokio::select! {
            result = self.execute(&mut stage) => result,
            _ = cancel => Err(PipelineError::Interrupted),
        };

        match result {
            Ok((record, alerted)) => {
                info!("run completed (alert fired: {alerted})");
                RunOutcome::Completed { record, alerted }
            }
            Err(error) => report_failure(&self.reporter, stage, error).await,
        }
    }

    async fn execute(&self, stage: &mut Stage) -> PipelineResult<(NormalizedRecord, bool)> {
        *stage = Stage::Measuring;
        debug!("entering {stage}");
        let raw = self.measurement.measure().await?;

        *stage = Stage::Probing;
        debug!("entering {stage} ({} target(s))", self.dns.targets.len());
        let dns = probe_all(
            self.dns_probe.as_ref(),
            &self.dns.domain,
            &self.dns.targets,
            self.dns.timeout,
        )
        .await;

        *stage = Stage::Building;
        debug!("entering {stage}");
        let record = RecordBuilder::build(&raw, &dns)?;
        info!(
            "download {:.2} Mbps, upload {:.2} Mbps, ping {:.2} ms ({})",
            record.download_mbps, record.upload_mbps, record.ping_ms, record.isp
        );

        *stage = Stage::Persisting;
        debug!("entering {stage}");
        let ack = self.store.persist(&record).await?;
        debug!("store acknowledged with status {}", ack.status);

        *stage = Stage::Guarding;
        debug!("entering {stage}");
        let alerted = self.guard.check(&record).await;

        *stage = Stage::Done;
        Ok((record, alerted))
    }
}

/// Classify a failure, hand it to the reporter and build the outcome
pub async fn report_failure(
    reporter: &ErrorReporter,
    stage: Stage,
    error: PipelineError,
) -> RunOutcome {
    let kind = error.kind();
    let message = match error {
        PipelineError::Interrupted => error.to_string(),
        _ => format!("Speed test failed during {stage}: {error}"),
    };

    reporter.report(&message).await;

    RunOutcome::Failed {
        stage,
        kind,
        message,
    }
}

/// Report a startup configuration error through the same funnel as run failures
pub async fn report_config_error(reporter: &ErrorReporter, error: ConfigError) -> RunOutcome {
    report_failure(reporter, Stage::Init, error.into()).await
}
