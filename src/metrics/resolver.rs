use prometheus::{Encoder, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

use crate::{Result, SkoopError};

/// How a single resolution request was answered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveOutcome {
    Hit,
    Miss,
    Delegated,
    Synthesized,
    Error,
}

impl ResolveOutcome {
    pub const fn as_str(&self) -> &'static str {
        match self {
            ResolveOutcome::Hit => "hit",
            ResolveOutcome::Miss => "miss",
            ResolveOutcome::Delegated => "delegated",
            ResolveOutcome::Synthesized => "synthesized",
            ResolveOutcome::Error => "error",
        }
    }
}

#[derive(Clone)]
pub struct ResolverMetrics {
    registry: Registry,
    requests: IntCounterVec,
    cache_entries: IntGauge,
}

impl ResolverMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let requests = IntCounterVec::new(
            Opts::new(
                "skoop_resolver_requests_total",
                "Node resolution requests by outcome",
            ),
            &["outcome"],
        )
        .map_err(metrics_error)?;
        let cache_entries = IntGauge::new(
            "skoop_resolver_cache_entries",
            "Nodes currently held by the resolver cache",
        )
        .map_err(metrics_error)?;

        registry
            .register(Box::new(requests.clone()))
            .map_err(metrics_error)?;
        registry
            .register(Box::new(cache_entries.clone()))
            .map_err(metrics_error)?;

        Ok(Self {
            registry,
            requests,
            cache_entries,
        })
    }

    pub fn record(&self, outcome: ResolveOutcome) {
        self.requests.with_label_values(&[outcome.as_str()]).inc();
    }

    pub fn set_cache_entries(&self, entries: usize) {
        self.cache_entries.set(entries as i64);
    }

    pub fn requests(&self, outcome: ResolveOutcome) -> u64 {
        self.requests.with_label_values(&[outcome.as_str()]).get()
    }

    /// Prometheus text exposition of every registered metric
    pub fn gather_text(&self) -> Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(metrics_error)?;
        String::from_utf8(buffer).map_err(|e| SkoopError::MetricsError(e.to_string()))
    }
}

fn metrics_error(e: prometheus::Error) -> SkoopError {
    SkoopError::MetricsError(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_gather() {
        let metrics = ResolverMetrics::new().unwrap();
        metrics.record(ResolveOutcome::Miss);
        metrics.record(ResolveOutcome::Hit);
        metrics.record(ResolveOutcome::Hit);
        metrics.set_cache_entries(1);

        assert_eq!(metrics.requests(ResolveOutcome::Hit), 2);
        assert_eq!(metrics.requests(ResolveOutcome::Error), 0);

        let text = metrics.gather_text().unwrap();
        assert!(text.contains("# TYPE skoop_resolver_requests_total counter"));
        assert!(text.contains("skoop_resolver_requests_total{outcome=\"hit\"} 2"));
        assert!(text.contains("skoop_resolver_cache_entries 1"));
    }

    #[test]
    fn test_instances_are_independent() {
        let a = ResolverMetrics::new().unwrap();
        let b = ResolverMetrics::new().unwrap();
        a.record(ResolveOutcome::Synthesized);
        assert_eq!(b.requests(ResolveOutcome::Synthesized), 0);
    }
}
