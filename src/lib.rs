pub mod analytics;
pub mod cli;
pub mod clock;
pub mod config;
pub mod error;
pub mod metrics;
pub mod output;
pub mod query;
pub mod search;
pub mod suggest;

pub use analytics::{AnalyticsRecorder, AnalyticsSnapshot, PopularEntry};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{Config, EngineConfig};
pub use error::{
    CacheError, ConfigError, EngineError, ErrorCategory, ExecutorError, Result, ValidationError,
};
pub use metrics::Metrics;
pub use query::{build_query, Condition, DateResolver, Operator, QueryBuilder, Value};
pub use search::{
    CacheKey, CacheStats, DateRange, Executor, ExecutorPage, Facets, FixtureExecutor, Issue,
    Pagination, ResultCache, SearchOrchestrator, SearchRequest, SearchResult, SearchScope, SortOrder,
};
pub use suggest::SuggestionEngine;
