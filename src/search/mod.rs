//! Search orchestration: requests, result cache, executor seam and the engine façade
pub mod cache;
pub mod engine;
pub mod executor;
pub mod fields;
pub mod request;

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSecondsWithFrac};
use std::collections::BTreeMap;
use std::time::Duration;

pub use cache::{CacheKey, CacheStats, ResultCache};
pub use engine::SearchOrchestrator;
pub use executor::{Executor, ExecutorPage, FixtureExecutor};
pub use request::{DateRange, SearchRequest, SearchScope, SortOrder};

/// Opaque issue record as returned by the backend.
pub type Issue = serde_json::Value;

/// field -> value -> count
pub type Facets = BTreeMap<String, BTreeMap<String, u64>>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub limit: usize,
    pub offset: usize,
    pub has_more: bool,
}

/// Search result with metadata
#[serde_as]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub issues: Vec<Issue>,
    pub total_count: usize,
    #[serde_as(as = "DurationMilliSecondsWithFrac<f64>")]
    #[serde(rename = "execution_time_ms")]
    pub execution_time: Duration,
    pub cache_hit: bool,
    pub query_used: String,
    pub suggested_queries: Vec<String>,
    pub facets: Facets,
    pub pagination: Pagination,
}
