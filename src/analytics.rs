//! Search usage analytics: volume, latency, popularity and error counts
use crate::clock::Clock;
use crate::error::ErrorCategory;
use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use log::warn;
use parking_lot::Mutex;
use regex::Regex;
use serde::Serialize;
use serde_with::{serde_as, DurationMilliSecondsWithFrac, DurationSeconds};
use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;

/// Distinct patterns remembered unless configured otherwise.
pub const DEFAULT_MAX_PATTERNS: usize = 100_000;

lazy_static! {
    static ref DIGITS: Regex = Regex::new(r"\d+").unwrap();
    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
}

/// Reduces a query to its shape: `project: TEST-12` and `project: test-9`
/// count as the same pattern.
pub fn query_pattern(query: &str) -> String {
    let lowered = query.trim().to_lowercase();
    let numbered = DIGITS.replace_all(&lowered, "N");
    WHITESPACE.replace_all(&numbered, " ").into_owned()
}

/// One ranked popularity entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PopularEntry {
    pub value: String,
    pub count: u64,
}

/// Frequency map bounded to `capacity` keys.
///
/// On overflow the lowest count is evicted; among equal counts the
/// lexicographically greatest key goes first.
#[derive(Debug)]
struct TopN {
    capacity: usize,
    counts: HashMap<String, u64>,
}

impl TopN {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            counts: HashMap::new(),
        }
    }

    fn increment(&mut self, key: &str) {
        *self.counts.entry(key.to_string()).or_insert(0) += 1;
        while self.counts.len() > self.capacity {
            let victim = self
                .counts
                .iter()
                .min_by(|(ka, ca), (kb, cb)| ca.cmp(cb).then_with(|| kb.cmp(ka)))
                .map(|(key, _)| key.clone());
            match victim {
                Some(key) => {
                    self.counts.remove(&key);
                }
                None => break,
            }
        }
    }

    fn ranked(&self, limit: usize) -> Vec<PopularEntry> {
        let mut entries: Vec<PopularEntry> = self
            .counts
            .iter()
            .map(|(value, count)| PopularEntry {
                value: value.clone(),
                count: *count,
            })
            .collect();
        entries.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.value.cmp(&b.value)));
        entries.truncate(limit);
        entries
    }

    fn get(&self, key: &str) -> u64 {
        self.counts.get(key).copied().unwrap_or(0)
    }
}

#[derive(Debug)]
struct AnalyticsState {
    total_searches: u64,
    patterns: HashSet<u64>,
    patterns_saturated: bool,
    popular_queries: TopN,
    popular_fields: TopN,
    latency_sum: Duration,
    latency_count: u64,
    latency_max: Duration,
    error_counts: BTreeMap<ErrorCategory, u64>,
    cache_hits: u64,
    cache_misses: u64,
}

/// Point-in-time copy of the recorder.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalyticsSnapshot {
    pub total_searches: u64,
    pub unique_query_patterns: usize,
    #[serde_as(as = "DurationMilliSecondsWithFrac<f64>")]
    #[serde(rename = "avg_execution_time_ms")]
    pub avg_execution_time: Duration,
    #[serde_as(as = "DurationMilliSecondsWithFrac<f64>")]
    #[serde(rename = "max_execution_time_ms")]
    pub max_execution_time: Duration,
    pub popular_queries: Vec<PopularEntry>,
    pub popular_fields: Vec<PopularEntry>,
    pub error_counts: BTreeMap<ErrorCategory, u64>,
    pub cache_hits: u64,
    pub cache_misses: u64,
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(rename = "uptime_seconds")]
    pub uptime: Duration,
}

/// Thread-safe usage recorder. Memory stays bounded: latency is kept as a
/// running sum and max, popularity as two capped frequency maps, and
/// pattern hashes up to `max_patterns`. Past that cap new patterns are not
/// remembered, so `unique_query_patterns` becomes a lower bound.
pub struct AnalyticsRecorder {
    state: Mutex<AnalyticsState>,
    clock: Arc<dyn Clock>,
    started_at: DateTime<Utc>,
    top_n_reported: usize,
    max_patterns: usize,
}

impl AnalyticsRecorder {
    pub fn new(clock: Arc<dyn Clock>, top_n_popular: usize, top_n_reported: usize) -> Self {
        let started_at = clock.now();
        Self {
            state: Mutex::new(AnalyticsState {
                total_searches: 0,
                patterns: HashSet::new(),
                patterns_saturated: false,
                popular_queries: TopN::new(top_n_popular),
                popular_fields: TopN::new(top_n_popular),
                latency_sum: Duration::ZERO,
                latency_count: 0,
                latency_max: Duration::ZERO,
                error_counts: BTreeMap::new(),
                cache_hits: 0,
                cache_misses: 0,
            }),
            clock,
            started_at,
            top_n_reported,
            max_patterns: DEFAULT_MAX_PATTERNS,
        }
    }

    pub fn with_pattern_limit(mut self, max_patterns: usize) -> Self {
        self.max_patterns = max_patterns;
        self
    }

    /// Records one search attempt.
    ///
    /// Every call counts toward `total_searches`. Failed attempts only
    /// touch `error_counts`; popularity and latency describe successes.
    pub fn record_search(
        &self,
        query: &str,
        fields_used: &[String],
        execution_time: Duration,
        error: Option<ErrorCategory>,
    ) {
        let pattern = (!query.trim().is_empty()).then(|| {
            let mut hasher = DefaultHasher::new();
            query_pattern(query).hash(&mut hasher);
            hasher.finish()
        });

        let mut state = self.state.lock();
        state.total_searches += 1;
        if let Some(pattern) = pattern {
            if state.patterns.len() < self.max_patterns {
                state.patterns.insert(pattern);
            } else if !state.patterns_saturated && !state.patterns.contains(&pattern) {
                state.patterns_saturated = true;
                warn!(
                    "Tracking {} query patterns, further patterns are not counted",
                    self.max_patterns
                );
            }
        }

        if let Some(category) = error {
            *state.error_counts.entry(category).or_insert(0) += 1;
            return;
        }

        state.popular_queries.increment(query);
        for field in fields_used {
            state.popular_fields.increment(field);
        }
        state.latency_sum += execution_time;
        state.latency_count += 1;
        if execution_time > state.latency_max {
            state.latency_max = execution_time;
        }
    }

    pub fn record_cache(&self, hit: bool) {
        let mut state = self.state.lock();
        if hit {
            state.cache_hits += 1;
        } else {
            state.cache_misses += 1;
        }
    }

    pub fn snapshot(&self) -> AnalyticsSnapshot {
        let uptime = (self.clock.now() - self.started_at)
            .to_std()
            .unwrap_or_default();
        let state = self.state.lock();

        let avg_execution_time = if state.latency_count == 0 {
            Duration::ZERO
        } else {
            let nanos = state.latency_sum.as_nanos() / u128::from(state.latency_count);
            Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
        };

        AnalyticsSnapshot {
            total_searches: state.total_searches,
            unique_query_patterns: state.patterns.len(),
            avg_execution_time,
            max_execution_time: state.latency_max,
            popular_queries: state.popular_queries.ranked(self.top_n_reported),
            popular_fields: state.popular_fields.ranked(self.top_n_reported),
            error_counts: state.error_counts.clone(),
            cache_hits: state.cache_hits,
            cache_misses: state.cache_misses,
            uptime,
        }
    }

    /// Every retained query with its count, most frequent first.
    pub fn query_counts(&self) -> Vec<PopularEntry> {
        self.state.lock().popular_queries.ranked(usize::MAX)
    }

    /// How often `field` appeared in successful searches.
    pub fn field_count(&self, field: &str) -> u64 {
        self.state.lock().popular_fields.get(field)
    }
}
