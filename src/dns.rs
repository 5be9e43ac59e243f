//! DNS resolution latency probes
//!
//! Each probe asks exactly one nameserver for a fixed name and measures the
//! wall-clock time until an answer arrives. Probes are diagnostic: any
//! failure or timeout yields [`ProbeOutcome::Unavailable`] and never fails
//! the run.

use std::collections::BTreeMap;
use std::net::IpAddr;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::future::join_all;
use tracing::{debug, instrument, warn};
use trust_dns_resolver::TokioAsyncResolver;
use trust_dns_resolver::config::{NameServerConfigGroup, ResolverConfig, ResolverOpts};

/// Default bound for a single probe
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Default name to resolve
pub const DEFAULT_PROBE_DOMAIN: &str = "google.com";

const DNS_PORT: u16 = 53;

/// A nameserver to probe, identified by a logical label
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsTarget {
    /// Label used in the record field name (`dns_<label>_ms`)
    pub label: String,
    pub nameserver: IpAddr,
}

impl DnsTarget {
    pub fn new(label: impl Into<String>, nameserver: IpAddr) -> Self {
        Self {
            label: label.into(),
            nameserver,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProbeOutcome {
    Resolved(Duration),
    Unavailable,
}

impl ProbeOutcome {
    pub fn as_millis_f64(&self) -> Option<f64> {
        match self {
            ProbeOutcome::Resolved(elapsed) => Some(elapsed.as_secs_f64() * 1000.0),
            ProbeOutcome::Unavailable => None,
        }
    }
}

/// Probe results keyed by label
pub type DnsResults = BTreeMap<String, ProbeOutcome>;

#[async_trait]
pub trait DnsProbe: Send + Sync {
    /// Measure resolution latency of `domain` against `nameserver`
    ///
    /// Never fails; returns within roughly `timeout`.
    async fn probe(&self, domain: &str, nameserver: IpAddr, timeout: Duration) -> ProbeOutcome;
}

/// Probe all targets concurrently and merge the results by label
pub async fn probe_all(
    probe: &dyn DnsProbe,
    domain: &str,
    targets: &[DnsTarget],
    timeout: Duration,
) -> DnsResults {
    let probes = targets
        .iter()
        .map(|target| probe.probe(domain, target.nameserver, timeout));
    let outcomes = join_all(probes).await;

    targets
        .iter()
        .zip(outcomes)
        .map(|(target, outcome)| (target.label.clone(), outcome))
        .collect()
}

/// Probe backed by a dedicated single-nameserver resolver per call
#[derive(Debug, Clone, Copy, Default)]
pub struct ResolverProbe;

impl ResolverProbe {
    pub fn new() -> Self {
        Self
    }

    fn resolver(nameserver: IpAddr, timeout: Duration) -> Option<TokioAsyncResolver> {
        let group = NameServerConfigGroup::from_ips_clear(&[nameserver], DNS_PORT, true);
        let config = ResolverConfig::from_parts(None, vec![], group);

        // measure the network path, not a cache or the hosts file
        let mut opts = ResolverOpts::default();
        opts.timeout = timeout;
        opts.attempts = 1;
        opts.cache_size = 0;
        opts.use_hosts_file = false;

        match TokioAsyncResolver::tokio(config, opts) {
            Ok(resolver) => Some(resolver),
            Err(e) => {
                warn!("failed to create resolver for {nameserver}: {e}");
                None
            }
        }
    }
}

#[async_trait]
impl DnsProbe for ResolverProbe {
    #[instrument(skip(self, timeout))]
    async fn probe(&self, domain: &str, nameserver: IpAddr, timeout: Duration) -> ProbeOutcome {
        let Some(resolver) = Self::resolver(nameserver, timeout) else {
            return ProbeOutcome::Unavailable;
        };

        // fully qualified so no search domain is appended
        let name = if domain.ends_with('.') {
            domain.to_string()
        } else {
            format!("{domain}.")
        };

        let started = Instant::now();
        match tokio::time::timeout(timeout, resolver.lookup_ip(name.as_str())).await {
            Ok(Ok(_)) => {
                let elapsed = started.elapsed();
                debug!("resolved in {:.2}ms", elapsed.as_secs_f64() * 1000.0);
                ProbeOutcome::Resolved(elapsed)
            }
            Ok(Err(e)) => {
                warn!("resolution failed: {e}");
                ProbeOutcome::Unavailable
            }
            Err(_) => {
                warn!("resolution timed out after {}ms", timeout.as_millis());
                ProbeOutcome::Unavailable
            }
        }
    }
}
