use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use speedwatch::{
    Orchestrator, RunOutcome,
    config::{Config, ReportingConfig, STORE_BASE_URL, STORE_TOKEN},
    error::ConfigError,
    pipeline::report_config_error,
    reporter::ErrorReporter,
    storage::{RecordStore, events::EventsApiStore, memory::MemoryStore},
};
use tracing::{info, level_filters::LevelFilter, trace, warn};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
#[command(name = "speedwatch")]
#[command(about = "Measure network performance once, store it and alert on slow downloads")]
#[command(long_about = None)]
struct Args {
    /// Load environment variables from this file instead of `.env`
    #[arg(short, long, value_name = "FILE")]
    env_file: Option<PathBuf>,

    /// Keep the record in memory and print it instead of persisting it
    #[arg(long)]
    dry_run: bool,

    /// Exit with a non-zero status when the run fails
    #[arg(long)]
    strict: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::INFO,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    let filter = filter::Targets::new().with_targets(vec![
        ("speedwatch", level),
        ("trust_dns_resolver", LevelFilter::WARN),
    ]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

fn exit_code(outcome: &RunOutcome, strict: bool) -> ExitCode {
    if strict && !outcome.is_success() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();

    match &args.env_file {
        Some(path) => {
            dotenv::from_path(path)
                .with_context(|| format!("failed to load env file {}", path.display()))?;
        }
        None => {
            dotenv::dotenv().ok();
        }
    }

    init(args.verbose);
    trace!("started with args: {args:?}");

    // reporting comes first so configuration errors can be forwarded as well
    let reporting = ReportingConfig::from_env();
    let notifier = reporting.notifier();
    let reporter = ErrorReporter::new(notifier.clone(), reporting.error_reporting);

    let config = match Config::from_env(args.dry_run) {
        Ok(config) => config,
        Err(e) => {
            let outcome = report_config_error(&reporter, e).await;
            return Ok(exit_code(&outcome, args.strict));
        }
    };

    let memory = Arc::new(MemoryStore::new());
    let store: Arc<dyn RecordStore> = if args.dry_run {
        warn!("dry run: the record will not be persisted");
        memory.clone()
    } else {
        let Some(token) = config.store.token.clone() else {
            let outcome = report_config_error(&reporter, ConfigError::Missing(STORE_TOKEN)).await;
            return Ok(exit_code(&outcome, args.strict));
        };
        match EventsApiStore::new(&config.store.base_url, &config.store.datasource, token) {
            Ok(store) => Arc::new(store),
            Err(e) => {
                let error = ConfigError::invalid(STORE_BASE_URL, &config.store.base_url, e);
                let outcome = report_config_error(&reporter, error).await;
                return Ok(exit_code(&outcome, args.strict));
            }
        }
    };

    let orchestrator = Orchestrator::from_config(&config, store, notifier);

    let outcome = orchestrator
        .run_until(async {
            // without a signal handler the run simply cannot be interrupted
            if tokio::signal::ctrl_c().await.is_err() {
                std::future::pending::<()>().await;
            }
        })
        .await;

    if args.dry_run {
        for record in memory.records() {
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
    }

    if let RunOutcome::Completed { alerted, .. } = &outcome {
        info!("done (alert sent: {alerted})");
    }

    Ok(exit_code(&outcome, args.strict))
}
