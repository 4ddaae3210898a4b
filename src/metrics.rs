use prometheus::{Encoder, IntCounter, Opts, Registry, TextEncoder};
use std::sync::Arc;

#[derive(Clone)]
pub struct Metrics {
    pub searches: IntCounter,
    pub cache_hits: IntCounter,
    pub cache_misses: IntCounter,
    pub validation_errors: IntCounter,
    pub executor_errors: IntCounter,
    registry: Arc<Registry>,
}

impl Metrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();
        let searches = counter(&registry, "ytsearch_searches_total", "Number of search calls")?;
        let cache_hits = counter(&registry, "ytsearch_cache_hits_total", "Searches served from cache")?;
        let cache_misses = counter(
            &registry,
            "ytsearch_cache_misses_total",
            "Searches that went to the executor",
        )?;
        let validation_errors = counter(
            &registry,
            "ytsearch_validation_errors_total",
            "Searches rejected before execution",
        )?;
        let executor_errors = counter(
            &registry,
            "ytsearch_executor_errors_total",
            "Searches failed by the executor",
        )?;

        Ok(Metrics {
            searches,
            cache_hits,
            cache_misses,
            validation_errors,
            executor_errors,
            registry: Arc::new(registry),
        })
    }

    pub fn gather(&self) -> String {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        if encoder.encode(&metric_families, &mut buffer).is_err() {
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

fn counter(registry: &Registry, name: &str, help: &str) -> prometheus::Result<IntCounter> {
    let counter = IntCounter::with_opts(Opts::new(name, help))?;
    registry.register(Box::new(counter.clone()))?;
    Ok(counter)
}
