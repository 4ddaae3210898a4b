//! Search orchestrator: validation, caching, execution and enrichment
use super::cache::{CacheKey, CacheStats, ResultCache};
use super::executor::Executor;
use super::request::{SearchRequest, SortOrder};
use super::{Pagination, SearchResult};
use crate::analytics::{AnalyticsRecorder, AnalyticsSnapshot};
use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::error::{ConfigError, EngineError, ErrorCategory, Result, ValidationError};
use crate::metrics::Metrics;
use crate::query::condition::validate_field;
use crate::query::{self, Condition, DateResolver};
use crate::suggest::SuggestionEngine;
use log::{debug, info, warn};
use std::fmt;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SearchPhase {
    Received,
    Validated,
    CacheChecked,
    CacheHit,
    CacheMiss,
    Executing,
    Stored,
    Enriched,
    Done,
    Failed,
}

impl fmt::Display for SearchPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SearchPhase::Received => "received",
            SearchPhase::Validated => "validated",
            SearchPhase::CacheChecked => "cache checked",
            SearchPhase::CacheHit => "cache hit",
            SearchPhase::CacheMiss => "cache miss",
            SearchPhase::Executing => "executing",
            SearchPhase::Stored => "stored",
            SearchPhase::Enriched => "enriched",
            SearchPhase::Done => "done",
            SearchPhase::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Everything a validated request resolves to before touching the cache.
#[derive(Debug)]
struct SearchPlan {
    query: String,
    canonical: String,
    fields: Vec<String>,
    sort_field: String,
    sort_order: SortOrder,
    limit: usize,
    offset: usize,
    facet_fields: Vec<String>,
}

/// Entry point for callers.
///
/// Owns the result cache, the analytics recorder and the metrics registry;
/// the executor and clock are injected so each instance is self-contained.
pub struct SearchOrchestrator {
    executor: Arc<dyn Executor>,
    config: EngineConfig,
    dates: DateResolver,
    cache: ResultCache,
    analytics: Arc<AnalyticsRecorder>,
    suggestions: SuggestionEngine,
    metrics: Metrics,
    sequence: AtomicU64,
}

impl SearchOrchestrator {
    pub fn new(
        config: EngineConfig,
        executor: Arc<dyn Executor>,
        clock: Arc<dyn Clock>,
    ) -> std::result::Result<Self, ConfigError> {
        config.validate()?;
        let max_entries = NonZeroUsize::new(config.max_entries)
            .ok_or_else(|| ConfigError::Invalid("max_entries must be at least 1".into()))?;

        let analytics = Arc::new(
            AnalyticsRecorder::new(clock.clone(), config.top_n_popular, config.top_n_reported)
                .with_pattern_limit(config.max_tracked_patterns),
        );
        Ok(Self {
            executor,
            dates: DateResolver::new(clock.clone()),
            cache: ResultCache::new(max_entries, config.ttl(), clock),
            suggestions: SuggestionEngine::new(analytics.clone()),
            analytics,
            metrics: Metrics::new()?,
            sequence: AtomicU64::new(0),
            config,
        })
    }

    /// Runs one search.
    ///
    /// Validation failures return before the cache or executor is touched.
    /// Executor failures are recorded and returned as-is; nothing is cached.
    /// Dropping the future while the executor is pending leaves the cache
    /// and analytics untouched.
    pub async fn search(&self, request: &SearchRequest) -> Result<SearchResult> {
        let started = Instant::now();
        let id = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        let trace = |phase: SearchPhase| debug!("search #{id}: {phase}");

        trace(SearchPhase::Received);
        self.metrics.searches.inc();

        let plan = match self.plan(request) {
            Ok(plan) => plan,
            Err(e) => {
                self.metrics.validation_errors.inc();
                self.record_search("", &[], started.elapsed(), Some(ErrorCategory::Validation));
                debug!("search #{id}: rejected: {e}");
                trace(SearchPhase::Failed);
                return Err(e.into());
            }
        };
        trace(SearchPhase::Validated);

        let key = CacheKey::new(
            &plan.canonical,
            &plan.sort_field,
            plan.sort_order.as_str(),
            plan.limit,
            plan.offset,
        );
        let cached = if self.config.enable_cache {
            let cached = self.cache.get(&key);
            trace(SearchPhase::CacheChecked);
            cached
        } else {
            None
        };

        if let Some(mut result) = cached {
            trace(SearchPhase::CacheHit);
            self.metrics.cache_hits.inc();

            result.cache_hit = true;
            result.query_used = plan.query.clone();
            if !covers(&result, &plan.facet_fields) {
                result.facets = self.suggestions.facets(&result.issues, &plan.facet_fields);
            }
            result.suggested_queries = self.refinements(&plan.query);
            result.execution_time = started.elapsed();
            trace(SearchPhase::Enriched);

            self.record_cache(true);
            self.record_search(&plan.canonical, &plan.fields, result.execution_time, None);
            trace(SearchPhase::Done);
            return Ok(result);
        }

        if self.config.enable_cache {
            trace(SearchPhase::CacheMiss);
            self.metrics.cache_misses.inc();
        }

        trace(SearchPhase::Executing);
        let outcome = self
            .executor
            .execute(
                &plan.query,
                &plan.sort_field,
                plan.sort_order,
                plan.limit,
                plan.offset,
            )
            .await;

        let page = match outcome {
            Ok(page) => page,
            Err(e) => {
                warn!("Search #{id} failed for '{}': {e}", plan.query);
                self.metrics.executor_errors.inc();
                self.record_cache(false);
                self.record_search(&plan.canonical, &plan.fields, started.elapsed(), Some(e.category));
                trace(SearchPhase::Failed);
                return Err(EngineError::Executor(e));
            }
        };

        let has_more = plan.offset.saturating_add(page.issues.len()) < page.total_count;
        let facets = self.suggestions.facets(&page.issues, &plan.facet_fields);
        let mut result = SearchResult {
            issues: page.issues,
            total_count: page.total_count,
            execution_time: Duration::ZERO,
            cache_hit: false,
            query_used: plan.query.clone(),
            suggested_queries: Vec::new(),
            facets,
            pagination: Pagination {
                limit: plan.limit,
                offset: plan.offset,
                has_more,
            },
        };
        if self.config.enable_cache {
            self.cache.set(key, result.clone(), self.config.ttl());
            trace(SearchPhase::Stored);
        }

        result.suggested_queries = self.refinements(&plan.query);
        result.execution_time = started.elapsed();
        trace(SearchPhase::Enriched);

        self.record_cache(false);
        self.record_search(&plan.canonical, &plan.fields, result.execution_time, None);
        trace(SearchPhase::Done);
        Ok(result)
    }

    /// Popularity and pattern counts are keyed by the canonical query, so
    /// reordered conditions count as one query.
    fn record_search(
        &self,
        canonical: &str,
        fields: &[String],
        elapsed: Duration,
        error: Option<ErrorCategory>,
    ) {
        if self.config.enable_analytics {
            self.analytics.record_search(canonical, fields, elapsed, error);
        }
    }

    fn record_cache(&self, hit: bool) {
        if self.config.enable_analytics && self.config.enable_cache {
            self.analytics.record_cache(hit);
        }
    }

    fn plan(&self, request: &SearchRequest) -> std::result::Result<SearchPlan, ValidationError> {
        let limit = match request.limit {
            Some(0) => {
                return Err(ValidationError::InvalidPagination(
                    "limit must be at least 1".to_string(),
                ))
            }
            Some(limit) if limit > self.config.max_limit => {
                debug!("Clamping limit {limit} to {}", self.config.max_limit);
                self.config.max_limit
            }
            Some(limit) => limit,
            None => self.config.default_limit.min(self.config.max_limit),
        };

        let sort_field = request
            .sort_field
            .clone()
            .unwrap_or_else(|| self.config.default_sort_field.clone());
        validate_field(&sort_field)?;

        let builder = request.to_builder(&self.dates)?;
        let text = request.text_term()?;
        let with_text = |rendered: String| match &text {
            Some(text) if builder.is_empty() => text.clone(),
            Some(text) => format!("{rendered} {text}"),
            None => rendered,
        };

        Ok(SearchPlan {
            query: with_text(builder.build()),
            canonical: with_text(builder.canonical()),
            fields: builder.fields(),
            sort_field,
            sort_order: request.sort_order,
            limit,
            offset: request.offset,
            facet_fields: request
                .facet_fields
                .clone()
                .unwrap_or_else(|| self.config.facet_fields.clone()),
        })
    }

    fn refinements(&self, query: &str) -> Vec<String> {
        self.suggestions
            .refinements(query, self.dates.today(), self.config.max_suggested_queries)
    }

    pub fn build_query(&self, conditions: &[Condition]) -> std::result::Result<String, ValidationError> {
        query::build_query(conditions)
    }

    pub fn suggestions(&self, prefix: &str, limit: usize) -> Vec<String> {
        self.suggestions.suggest(prefix, limit)
    }

    pub fn analytics(&self) -> AnalyticsSnapshot {
        self.analytics.snapshot()
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
        info!("Search cache cleared");
    }

    pub fn purge_expired(&self) -> usize {
        self.cache.purge_expired()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

/// Whether cached facets already answer the requested fields.
fn covers(result: &SearchResult, fields: &[String]) -> bool {
    !result.facets.is_empty()
        && result.facets.len() == fields.len()
        && fields.iter().all(|f| result.facets.contains_key(f))
}

impl fmt::Debug for SearchOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SearchOrchestrator")
            .field("config", &self.config)
            .field("cache", &self.cache.stats())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::ExecutorError;
    use crate::query::Operator;
    use crate::search::executor::{ExecutorPage, MockExecutor};
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 6, 13, 9, 0, 0).unwrap(),
        ))
    }

    fn orchestrator(mock: MockExecutor, clock: Arc<ManualClock>) -> SearchOrchestrator {
        SearchOrchestrator::new(EngineConfig::default(), Arc::new(mock), clock).unwrap()
    }

    fn page(ids: &[&str]) -> ExecutorPage {
        ExecutorPage {
            issues: ids
                .iter()
                .map(|id| json!({"idReadable": id, "State": "Open", "Priority": "High"}))
                .collect(),
            total_count: ids.len(),
        }
    }

    fn example_request() -> SearchRequest {
        SearchRequest::new()
            .with_condition(Condition::new("project", Operator::Equals, "TEST"))
            .with_condition(Condition::new("Priority", Operator::In, vec!["High", "Critical"]))
            .with_sort("updated", SortOrder::Desc)
            .with_pagination(100, 0)
    }

    #[tokio::test]
    async fn test_example_end_to_end() {
        let mut mock = MockExecutor::new();
        mock.expect_execute()
            .withf(|query, sort_field, sort_order, limit, offset| {
                query == "project: TEST Priority: High, Critical"
                    && sort_field == "updated"
                    && *sort_order == SortOrder::Desc
                    && *limit == 100
                    && *offset == 0
            })
            .times(1)
            .returning(|_, _, _, _, _| Ok(page(&["TEST-1", "TEST-2"])));

        let engine = orchestrator(mock, clock());
        let result = engine.search(&example_request()).await.unwrap();

        assert!(!result.cache_hit);
        assert_eq!(result.query_used, "project: TEST Priority: High, Critical");
        assert_eq!(result.total_count, 2);
        assert_eq!(result.pagination.limit, 100);
        assert!(!result.pagination.has_more);
        assert_eq!(result.facets["State"]["Open"], 2);
        assert_eq!(
            result.suggested_queries,
            vec![
                "project: TEST Priority: High, Critical State: Open",
                "project: TEST Priority: High, Critical assignee: Unassigned",
                "project: TEST Priority: High, Critical created: >=2025-06-06",
            ]
        );
    }

    #[tokio::test]
    async fn test_identical_requests_execute_once() {
        let mut mock = MockExecutor::new();
        mock.expect_execute()
            .times(1)
            .returning(|_, _, _, _, _| Ok(page(&["TEST-1"])));

        let engine = orchestrator(mock, clock());
        let first = engine.search(&example_request()).await.unwrap();
        let second = engine.search(&example_request()).await.unwrap();

        assert!(!first.cache_hit);
        assert!(second.cache_hit);
        assert_eq!(first.issues, second.issues);
        assert_eq!(second.facets, first.facets);

        let snapshot = engine.analytics();
        assert_eq!(snapshot.total_searches, 2);
        assert_eq!(snapshot.cache_hits, 1);
        assert_eq!(snapshot.cache_misses, 1);
        assert_eq!(engine.metrics().cache_hits.get(), 1);
    }

    #[tokio::test]
    async fn test_condition_order_shares_cache_entry() {
        let mut mock = MockExecutor::new();
        mock.expect_execute()
            .times(1)
            .returning(|_, _, _, _, _| Ok(page(&["TEST-1"])));

        let engine = orchestrator(mock, clock());
        let reordered = SearchRequest::new()
            .with_condition(Condition::new("Priority", Operator::In, vec!["High", "Critical"]))
            .with_condition(Condition::new("project", Operator::Equals, "TEST"))
            .with_sort("updated", SortOrder::Desc)
            .with_pagination(100, 0);

        engine.search(&example_request()).await.unwrap();
        let hit = engine.search(&reordered).await.unwrap();
        assert!(hit.cache_hit);
        assert_eq!(hit.query_used, "Priority: High, Critical project: TEST");

        let snapshot = engine.analytics();
        assert_eq!(snapshot.unique_query_patterns, 1);
        assert_eq!(snapshot.popular_queries.len(), 1);
        assert_eq!(snapshot.popular_queries[0].value, "Priority: High, Critical project: TEST");
        assert_eq!(snapshot.popular_queries[0].count, 2);
    }

    #[tokio::test]
    async fn test_query_and_sort_field_never_share_a_key() {
        let mut mock = MockExecutor::new();
        mock.expect_execute()
            .withf(|_, sort_field, _, _, _| sort_field == "y")
            .times(1)
            .returning(|_, _, _, _, _| Ok(page(&["A-1"])));
        mock.expect_execute()
            .withf(|_, sort_field, _, _, _| sort_field == "x|sort=y")
            .times(1)
            .returning(|_, _, _, _, _| Ok(page(&["B-1"])));

        let engine = orchestrator(mock, clock());
        let first = SearchRequest::new()
            .with_project("P|sort=x")
            .with_sort("y", SortOrder::Desc);
        let second = SearchRequest::new()
            .with_project("P")
            .with_sort("x|sort=y", SortOrder::Desc);

        engine.search(&first).await.unwrap();
        let result = engine.search(&second).await.unwrap();
        assert!(!result.cache_hit);
        assert_eq!(result.issues[0]["idReadable"], "B-1");
        assert_eq!(engine.cache_stats().entries, 2);
    }

    #[tokio::test]
    async fn test_relative_date_condition_is_resolved() {
        let mut mock = MockExecutor::new();
        mock.expect_execute()
            .withf(|query, _, _, _, _| query == "created: >=2025-06-06 {Fix version}: >1.2.0")
            .times(1)
            .returning(|_, _, _, _, _| Ok(page(&[])));

        let engine = orchestrator(mock, clock());
        let request = SearchRequest::new()
            .with_condition(Condition::new("created", Operator::GreaterOrEqual, "-7d"))
            .with_condition(Condition::new("Fix version", Operator::GreaterThan, "1.2.0"));
        let result = engine.search(&request).await.unwrap();
        assert_eq!(result.query_used, "created: >=2025-06-06 {Fix version}: >1.2.0");
    }

    #[tokio::test]
    async fn test_cache_switch_off() {
        let mut mock = MockExecutor::new();
        mock.expect_execute()
            .times(2)
            .returning(|_, _, _, _, _| Ok(page(&["TEST-1"])));

        let config = EngineConfig {
            enable_cache: false,
            ..EngineConfig::default()
        };
        let engine = SearchOrchestrator::new(config, Arc::new(mock), clock()).unwrap();
        assert!(!engine.search(&example_request()).await.unwrap().cache_hit);
        assert!(!engine.search(&example_request()).await.unwrap().cache_hit);

        let stats = engine.cache_stats();
        assert_eq!(stats.entries, 0);
        assert_eq!(stats.hits + stats.misses, 0);
        assert_eq!(engine.analytics().total_searches, 2);
    }

    #[tokio::test]
    async fn test_analytics_switch_off() {
        let mut mock = MockExecutor::new();
        mock.expect_execute()
            .times(1)
            .returning(|_, _, _, _, _| Ok(page(&["TEST-1"])));

        let config = EngineConfig {
            enable_analytics: false,
            ..EngineConfig::default()
        };
        let engine = SearchOrchestrator::new(config, Arc::new(mock), clock()).unwrap();
        engine.search(&example_request()).await.unwrap();
        assert!(engine.search(&example_request()).await.unwrap().cache_hit);
        engine
            .search(&SearchRequest::new().with_pagination(0, 0))
            .await
            .unwrap_err();

        let snapshot = engine.analytics();
        assert_eq!(snapshot.total_searches, 0);
        assert_eq!(snapshot.cache_hits + snapshot.cache_misses, 0);
        assert!(snapshot.error_counts.is_empty());
        assert_eq!(engine.metrics().searches.get(), 3);
    }

    /// Executor that sleeps before answering, for cancellation tests.
    struct SlowExecutor {
        delay_ms: AtomicU64,
    }

    #[async_trait]
    impl Executor for SlowExecutor {
        async fn execute(
            &self,
            _query: &str,
            _sort_field: &str,
            _sort_order: SortOrder,
            _limit: usize,
            _offset: usize,
        ) -> std::result::Result<ExecutorPage, ExecutorError> {
            let delay = self.delay_ms.load(Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(delay)).await;
            Ok(page(&["TEST-1"]))
        }
    }

    #[tokio::test]
    async fn test_dropped_search_leaves_no_trace() {
        let executor = Arc::new(SlowExecutor {
            delay_ms: AtomicU64::new(5_000),
        });
        let engine =
            SearchOrchestrator::new(EngineConfig::default(), executor.clone(), clock()).unwrap();

        let timed_out =
            tokio::time::timeout(Duration::from_millis(20), engine.search(&example_request())).await;
        assert!(timed_out.is_err());

        let snapshot = engine.analytics();
        assert_eq!(engine.cache_stats().entries, 0);
        assert_eq!(snapshot.total_searches, 0);
        assert_eq!(snapshot.cache_hits + snapshot.cache_misses, 0);
        assert!(snapshot.popular_queries.is_empty());

        executor.delay_ms.store(0, Ordering::SeqCst);
        let result = engine.search(&example_request()).await.unwrap();
        assert!(!result.cache_hit);

        let snapshot = engine.analytics();
        assert_eq!(snapshot.total_searches, 1);
        assert_eq!(snapshot.cache_misses, 1);
        assert_eq!(engine.cache_stats().entries, 1);
    }

    #[tokio::test]
    async fn test_expired_entry_is_refetched() {
        let mut mock = MockExecutor::new();
        mock.expect_execute()
            .times(2)
            .returning(|_, _, _, _, _| Ok(page(&["TEST-1"])));

        let clock = clock();
        let engine = orchestrator(mock, clock.clone());
        engine.search(&example_request()).await.unwrap();
        clock.advance(chrono::Duration::seconds(300));
        let again = engine.search(&example_request()).await.unwrap();
        assert!(!again.cache_hit);
    }

    #[tokio::test]
    async fn test_validation_bypasses_cache_and_executor() {
        let mut mock = MockExecutor::new();
        mock.expect_execute().times(0);

        let engine = orchestrator(mock, clock());
        let err = engine
            .search(&SearchRequest::new().with_pagination(0, 0))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Validation(ValidationError::InvalidPagination(_))
        ));

        let err = engine
            .search(&SearchRequest::new().with_date_range("created", Some("yesterday"), None))
            .await
            .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Validation);

        let snapshot = engine.analytics();
        assert_eq!(snapshot.total_searches, 2);
        assert_eq!(snapshot.error_counts[&ErrorCategory::Validation], 2);
        assert_eq!(engine.cache_stats().hits + engine.cache_stats().misses, 0);
    }

    #[tokio::test]
    async fn test_auth_failure_is_recorded_not_cached() {
        let mut mock = MockExecutor::new();
        mock.expect_execute()
            .times(2)
            .returning(|_, _, _, _, _| Err(ExecutorError::from_status(401, "token expired")));

        let engine = orchestrator(mock, clock());
        let err = engine.search(&example_request()).await.unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Auth);
        assert_eq!(engine.cache_stats().entries, 0);
        assert_eq!(engine.analytics().error_counts[&ErrorCategory::Auth], 1);

        engine.search(&example_request()).await.unwrap_err();
        assert_eq!(engine.analytics().error_counts[&ErrorCategory::Auth], 2);
        assert_eq!(engine.metrics().executor_errors.get(), 2);
    }

    #[tokio::test]
    async fn test_limit_defaults_and_clamps() {
        let mut mock = MockExecutor::new();
        mock.expect_execute()
            .withf(|query, sort_field, _, limit, _| query == "*" && sort_field == "updated" && *limit == 50)
            .times(1)
            .returning(|_, _, _, _, _| Ok(page(&[])));
        mock.expect_execute()
            .withf(|_, _, _, limit, _| *limit == 1000)
            .times(1)
            .returning(|_, _, _, _, _| Ok(page(&[])));

        let engine = orchestrator(mock, clock());
        engine.search(&SearchRequest::new()).await.unwrap();
        let clamped = engine
            .search(&SearchRequest::new().with_pagination(5000, 0))
            .await
            .unwrap();
        assert_eq!(clamped.pagination.limit, 1000);
    }

    #[tokio::test]
    async fn test_has_more_and_text() {
        let mut mock = MockExecutor::new();
        mock.expect_execute()
            .withf(|query, _, _, limit, offset| {
                query == "project: TEST {login fails}" && *limit == 1 && *offset == 1
            })
            .times(1)
            .returning(|_, _, _, _, _| {
                Ok(ExecutorPage {
                    issues: vec![json!({"idReadable": "TEST-2"})],
                    total_count: 3,
                })
            });

        let engine = orchestrator(mock, clock());
        let request = SearchRequest::new()
            .with_project("TEST")
            .with_text("login fails")
            .with_pagination(1, 1);
        let result = engine.search(&request).await.unwrap();
        assert!(result.pagination.has_more);
        assert_eq!(result.total_count, 3);
    }

    #[tokio::test]
    async fn test_clear_cache_forces_refetch() {
        let mut mock = MockExecutor::new();
        mock.expect_execute()
            .times(2)
            .returning(|_, _, _, _, _| Ok(page(&["TEST-1"])));

        let engine = orchestrator(mock, clock());
        engine.search(&example_request()).await.unwrap();
        engine.clear_cache();
        assert_eq!(engine.cache_stats().entries, 0);
        assert!(!engine.search(&example_request()).await.unwrap().cache_hit);
    }

    #[test]
    fn test_rejects_invalid_config() {
        let config = EngineConfig {
            max_entries: 0,
            ..EngineConfig::default()
        };
        let result = SearchOrchestrator::new(config, Arc::new(MockExecutor::new()), clock());
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }
}
