//! Startup configuration
//!
//! Configuration is read once from an environment-style lookup and passed
//! into the pipeline as an explicit value. No component reads the
//! environment itself.

use std::net::IpAddr;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use regex::Regex;
use tracing::{debug, trace};

use crate::dns::{DEFAULT_PROBE_DOMAIN, DEFAULT_PROBE_TIMEOUT, DnsTarget};
use crate::error::ConfigError;
use crate::measurement::client::DEFAULT_MEASUREMENT_TIMEOUT;
use crate::notify::{DisabledNotifier, Notifier, TelegramNotifier, telegram};

pub const STORE_TOKEN: &str = "STORE_TOKEN";
pub const STORE_BASE_URL: &str = "STORE_BASE_URL";
pub const STORE_DATASOURCE: &str = "STORE_DATASOURCE";
pub const TELEGRAM_TOKEN: &str = "TELEGRAM_TOKEN";
pub const TELEGRAM_CHAT_ID: &str = "TELEGRAM_CHAT_ID";
pub const TELEGRAM_API_URL: &str = "TELEGRAM_API_URL";
pub const ERROR_REPORTING: &str = "ERROR_REPORTING";
pub const SPEED_THRESHOLD_MBPS: &str = "SPEED_THRESHOLD_MBPS";
pub const SPEEDTEST_COMMAND: &str = "SPEEDTEST_COMMAND";
pub const SPEEDTEST_TIMEOUT_SECS: &str = "SPEEDTEST_TIMEOUT_SECS";
pub const DNS_PROBES: &str = "DNS_PROBES";
pub const DNS_PROBE_DOMAIN: &str = "DNS_PROBE_DOMAIN";
pub const DNS_TIMEOUT_SECS: &str = "DNS_TIMEOUT_SECS";

const DEFAULT_STORE_BASE_URL: &str = "https://api.us-east.aws.tinybird.co";
const DEFAULT_STORE_DATASOURCE: &str = "speedtest";
const DEFAULT_SPEEDTEST_COMMAND: &str = "speedtest-cli --json";
const DEFAULT_DNS_PROBES: &str = "google=8.8.8.8,cloudflare=1.1.1.1";

static LABEL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("^[a-z0-9_]+$").expect("label pattern is valid"));

/// Chat credentials
#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub api_url: String,
    pub token: String,
    pub chat_id: String,
}

/// Settings needed to report errors, including configuration errors
#[derive(Debug, Clone, Default)]
pub struct ReportingConfig {
    /// `None` when token or chat id is missing; notifications become no-ops
    pub telegram: Option<TelegramConfig>,

    /// Forward reported errors to chat
    pub error_reporting: bool,
}

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub base_url: String,
    pub datasource: String,
    /// Only absent in dry-run mode
    pub token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct MeasurementConfig {
    pub program: String,
    pub args: Vec<String>,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct DnsConfig {
    pub domain: String,
    pub targets: Vec<DnsTarget>,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub reporting: ReportingConfig,
    pub store: StoreConfig,
    pub measurement: MeasurementConfig,
    pub dns: DnsConfig,

    /// Download threshold in Mbps; `None` disables the guard
    pub threshold: Option<f64>,
}

/// Look a key up, treating empty values as unset
fn get(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<String> {
    lookup(key)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn get_or(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: &str) -> String {
    get(lookup, key).unwrap_or_else(|| default.to_string())
}

impl ReportingConfig {
    /// Never fails: missing chat settings only disable notifications
    pub fn from_lookup(lookup: &impl Fn(&str) -> Option<String>) -> Self {
        let telegram = match (get(lookup, TELEGRAM_TOKEN), get(lookup, TELEGRAM_CHAT_ID)) {
            (Some(token), Some(chat_id)) => Some(TelegramConfig {
                api_url: get_or(lookup, TELEGRAM_API_URL, telegram::DEFAULT_API_URL),
                token,
                chat_id,
            }),
            _ => {
                debug!("chat credentials not configured, notifications disabled");
                None
            }
        };

        let error_reporting =
            get(lookup, ERROR_REPORTING).is_some_and(|value| value.eq_ignore_ascii_case("true"));

        Self {
            telegram,
            error_reporting,
        }
    }

    pub fn from_env() -> Self {
        Self::from_lookup(&env_lookup)
    }

    pub fn notifier(&self) -> Arc<dyn Notifier> {
        match &self.telegram {
            Some(TelegramConfig {
                api_url,
                token,
                chat_id,
            }) => Arc::new(TelegramNotifier::new(api_url, token, chat_id)),
            None => Arc::new(DisabledNotifier),
        }
    }
}

fn env_lookup(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

impl Config {
    pub fn from_env(dry_run: bool) -> Result<Self, ConfigError> {
        Self::from_lookup(&env_lookup, dry_run)
    }

    /// Build and validate the full configuration
    ///
    /// `dry_run` relaxes the persistence credential requirement.
    pub fn from_lookup(
        lookup: &impl Fn(&str) -> Option<String>,
        dry_run: bool,
    ) -> Result<Self, ConfigError> {
        let token = get(lookup, STORE_TOKEN);
        if token.is_none() && !dry_run {
            return Err(ConfigError::Missing(STORE_TOKEN));
        }

        let store = StoreConfig {
            base_url: get_or(lookup, STORE_BASE_URL, DEFAULT_STORE_BASE_URL),
            datasource: get_or(lookup, STORE_DATASOURCE, DEFAULT_STORE_DATASOURCE),
            token,
        };

        let command = get_or(lookup, SPEEDTEST_COMMAND, DEFAULT_SPEEDTEST_COMMAND);
        let mut words = command.split_whitespace().map(str::to_string);
        let program = words
            .next()
            .ok_or_else(|| ConfigError::invalid(SPEEDTEST_COMMAND, &command, "empty command"))?;
        let measurement = MeasurementConfig {
            program,
            args: words.collect(),
            timeout: parse_secs(lookup, SPEEDTEST_TIMEOUT_SECS, DEFAULT_MEASUREMENT_TIMEOUT)?,
        };

        // an explicitly empty list disables probing
        let targets = match lookup(DNS_PROBES) {
            Some(list) => parse_dns_targets(&list)?,
            None => parse_dns_targets(DEFAULT_DNS_PROBES)?,
        };
        let dns = DnsConfig {
            domain: get_or(lookup, DNS_PROBE_DOMAIN, DEFAULT_PROBE_DOMAIN),
            targets,
            timeout: parse_secs(lookup, DNS_TIMEOUT_SECS, DEFAULT_PROBE_TIMEOUT)?,
        };

        let threshold = get(lookup, SPEED_THRESHOLD_MBPS)
            .map(|value| match value.parse::<f64>() {
                Ok(mbps) if mbps.is_finite() => Ok(mbps),
                Ok(_) => Err(ConfigError::invalid(SPEED_THRESHOLD_MBPS, &value, "must be finite")),
                Err(e) => Err(ConfigError::invalid(SPEED_THRESHOLD_MBPS, &value, e)),
            })
            .transpose()?;

        let config = Config {
            reporting: ReportingConfig::from_lookup(lookup),
            store,
            measurement,
            dns,
            threshold,
        };
        trace!("loaded config: {config:?}");
        Ok(config)
    }
}

fn parse_secs(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: Duration,
) -> Result<Duration, ConfigError> {
    let Some(value) = get(lookup, key) else {
        return Ok(default);
    };
    match value.parse::<u64>() {
        Ok(0) => Err(ConfigError::invalid(key, &value, "must be greater than zero")),
        Ok(secs) => Ok(Duration::from_secs(secs)),
        Err(e) => Err(ConfigError::invalid(key, &value, e)),
    }
}

/// Parse `label=ip` pairs separated by commas
pub fn parse_dns_targets(list: &str) -> Result<Vec<DnsTarget>, ConfigError> {
    let mut targets: Vec<DnsTarget> = Vec::new();

    for entry in list.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let Some((label, ip)) = entry.split_once('=') else {
            return Err(ConfigError::invalid(DNS_PROBES, entry, "expected `label=ip`"));
        };
        let label = label.trim().to_ascii_lowercase();

        if !LABEL_PATTERN.is_match(&label) {
            return Err(ConfigError::invalid(
                DNS_PROBES,
                entry,
                "label may only contain a-z, 0-9 and _",
            ));
        }
        if targets.iter().any(|t| t.label == label) {
            return Err(ConfigError::invalid(DNS_PROBES, entry, "duplicate label"));
        }

        let nameserver: IpAddr = ip
            .trim()
            .parse()
            .map_err(|e| ConfigError::invalid(DNS_PROBES, entry, e))?;

        targets.push(DnsTarget::new(label, nameserver));
    }

    Ok(targets)
}
