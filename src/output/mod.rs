//! Rendering of results, analytics and plain value lists for the CLI
pub mod formats;

use crate::analytics::AnalyticsSnapshot;
use crate::cli::OutputFormat;
use crate::search::{CacheStats, SearchResult};

pub use formats::{JsonFormatter, TextFormatter};

/// Trait for output formatters
pub trait OutputFormatterTrait: Send + Sync {
    fn name(&self) -> &str;
    fn search_result(&self, result: &SearchResult) -> String;
    fn analytics(&self, snapshot: &AnalyticsSnapshot, cache: &CacheStats) -> String;
    /// A labelled list of strings such as suggestions or a single query.
    fn values(&self, label: &str, values: &[String]) -> String;
}

pub fn formatter(format: OutputFormat, use_color: bool) -> Box<dyn OutputFormatterTrait> {
    match format {
        OutputFormat::Text => Box::new(TextFormatter::new(use_color)),
        OutputFormat::Json => Box::new(JsonFormatter::new()),
    }
}
