//! Runs that fail and must be reported exactly once

use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use pretty_assertions::assert_eq;
use speedwatch::{
    ErrorKind, Orchestrator, RunOutcome, Stage,
    config::Config,
    dns::ProbeOutcome,
    error::MeasurementError,
    measurement::CommandMeasurementClient,
    pipeline::report_config_error,
    reporter::ErrorReporter,
    storage::events::EventsApiStore,
    threshold::ThresholdGuard,
};
use wiremock::{Mock, MockServer, ResponseTemplate, matchers::method};

use crate::helpers::{
    FakeMeasurement, FixedDns, HarnessBuilder, RecordingNotifier, RecordingStore, dns_config,
    ookla_json,
};

#[tokio::test]
async fn test_failing_measurement_tool_is_reported_and_nothing_is_stored() {
    let mut script = tempfile::NamedTempFile::new().unwrap();
    writeln!(script, "echo 'Cannot retrieve speedtest configuration' >&2").unwrap();
    writeln!(script, "exit 1").unwrap();

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(202))
        .expect(0)
        .mount(&server)
        .await;

    let store = EventsApiStore::new(&server.uri(), "speedtest", "token").unwrap();
    let alerts = Arc::new(RecordingNotifier::default());
    let errors = Arc::new(RecordingNotifier::default());
    let orchestrator = Orchestrator::new(
        Arc::new(CommandMeasurementClient::new(
            "sh",
            vec![script.path().display().to_string()],
            Duration::from_secs(10),
        )),
        Arc::new(FixedDns(ProbeOutcome::Unavailable)),
        dns_config(&[]),
        Arc::new(store),
        ThresholdGuard::new(alerts.clone(), Some(50.0)),
        ErrorReporter::new(errors.clone(), true),
    );

    let outcome = orchestrator.run().await;

    let (stage, kind) = assert_matches!(
        outcome,
        RunOutcome::Failed { stage, kind, .. } => (stage, kind)
    );
    assert_eq!(stage, Stage::Measuring);
    assert_eq!(kind, ErrorKind::MeasurementProcessError);

    let reports = errors.messages();
    assert_eq!(reports.len(), 1);
    let report = &reports[0];
    assert!(report.contains("exit code 1"), "got: {report}");
    assert!(report.contains("Cannot retrieve speedtest configuration"));
    assert!(alerts.messages().is_empty());
}

#[tokio::test]
async fn test_timeout_is_classified() {
    let timeout = MeasurementError::Timeout(Duration::from_secs(120));
    let harness = HarnessBuilder::new(FakeMeasurement::failing(timeout)).build();

    let outcome = harness.orchestrator.run().await;

    let (stage, kind) = assert_matches!(
        outcome,
        RunOutcome::Failed { stage, kind, .. } => (stage, kind)
    );
    assert_eq!(stage, Stage::Measuring);
    assert_eq!(kind, ErrorKind::MeasurementTimeout);
    assert_eq!(harness.errors.messages().len(), 1);
    assert!(harness.store.persisted().is_empty());
}

#[tokio::test]
async fn test_rejected_persist_is_reported_and_skips_the_guard() {
    let harness = HarnessBuilder::new(FakeMeasurement::returning(ookla_json(1_250_000.0)))
        .store(RecordingStore::rejecting())
        .threshold(50.0)
        .build();

    let outcome = harness.orchestrator.run().await;

    let (stage, kind, message) = assert_matches!(
        outcome,
        RunOutcome::Failed { stage, kind, message } => (stage, kind, message)
    );
    assert_eq!(stage, Stage::Persisting);
    assert_eq!(kind, ErrorKind::PersistenceRejected);
    assert!(message.starts_with("Speed test failed during persistence"));
    assert_eq!(harness.store.persisted().len(), 1);
    assert_eq!(harness.errors.messages(), vec![message]);
    assert!(harness.alerts.messages().is_empty());
}

#[tokio::test]
async fn test_unknown_schema_is_a_conversion_error() {
    let harness = HarnessBuilder::new(FakeMeasurement::returning(serde_json::json!({
        "download": "fast",
        "upload": "also fast"
    })))
    .build();

    let outcome = harness.orchestrator.run().await;

    let (stage, kind) = assert_matches!(
        outcome,
        RunOutcome::Failed { stage, kind, .. } => (stage, kind)
    );
    assert_eq!(stage, Stage::Building);
    assert_eq!(kind, ErrorKind::UnitConversionError);
    assert!(harness.store.persisted().is_empty());
    assert_eq!(harness.errors.messages().len(), 1);
}

#[tokio::test]
async fn test_interrupt_during_measurement() {
    let harness = HarnessBuilder::new(
        FakeMeasurement::returning(ookla_json(12_500_000.0)).with_delay(Duration::from_secs(5)),
    )
    .build();

    let outcome = harness
        .orchestrator
        .run_until(tokio::time::sleep(Duration::from_millis(50)))
        .await;

    let (stage, kind, message) = assert_matches!(
        outcome,
        RunOutcome::Failed { stage, kind, message } => (stage, kind, message)
    );
    assert_eq!(stage, Stage::Measuring);
    assert_eq!(kind, ErrorKind::Interrupted);
    assert_eq!(message, "Run manually interrupted.");
    assert_eq!(harness.errors.messages(), vec![message]);
    assert!(harness.store.persisted().is_empty());
}

#[tokio::test]
async fn test_disabled_forwarding_still_fails_the_run() {
    let harness = HarnessBuilder::new(FakeMeasurement::failing(MeasurementError::EmptyOutput))
        .forward_errors(false)
        .build();

    let outcome = harness.orchestrator.run().await;

    let kind = assert_matches!(outcome, RunOutcome::Failed { kind, .. } => kind);
    assert_eq!(kind, ErrorKind::MeasurementEmptyOutput);
    assert!(harness.errors.messages().is_empty());
}

#[tokio::test]
async fn test_failing_error_forwarding_does_not_panic() {
    let errors = Arc::new(RecordingNotifier::failing());
    let reporter = ErrorReporter::new(errors.clone(), true);

    let error = Config::from_lookup(&|_: &str| None, false).unwrap_err();
    let outcome = report_config_error(&reporter, error).await;

    let kind = assert_matches!(outcome, RunOutcome::Failed { kind, .. } => kind);
    assert_eq!(kind, ErrorKind::ConfigurationError);
    assert_eq!(errors.messages().len(), 1);
}

#[tokio::test]
async fn test_invalid_threshold_is_a_reported_config_error() {
    let env: HashMap<&str, &str> = HashMap::from([
        ("STORE_TOKEN", "secret"),
        ("SPEED_THRESHOLD_MBPS", "fifty"),
    ]);
    let lookup = |key: &str| env.get(key).map(|v| v.to_string());

    let errors = Arc::new(RecordingNotifier::default());
    let reporter = ErrorReporter::new(errors.clone(), true);

    let error = Config::from_lookup(&lookup, false).unwrap_err();
    let outcome = report_config_error(&reporter, error).await;

    let (stage, kind, message) = assert_matches!(
        outcome,
        RunOutcome::Failed { stage, kind, message } => (stage, kind, message)
    );
    assert_eq!(kind, ErrorKind::ConfigurationError);
    assert_eq!(stage, Stage::Init);
    assert!(message.contains("SPEED_THRESHOLD_MBPS"), "got: {message}");
    assert_eq!(errors.messages(), vec![message]);
}
