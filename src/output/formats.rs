//! Individual output format implementations
use crate::analytics::{AnalyticsSnapshot, PopularEntry};
use crate::output::OutputFormatterTrait;
use crate::search::fields::{labels, lookup};
use crate::search::{CacheStats, Issue, SearchResult};
use colored::*;
use serde_json::json;
use std::fmt::Write;
use std::time::Duration;

/// Human-readable formatter (default)
pub struct TextFormatter {
    use_color: bool,
}

impl TextFormatter {
    pub fn new(use_color: bool) -> Self {
        Self { use_color }
    }

    fn paint(&self, text: &str, style: fn(&str) -> ColoredString) -> String {
        if self.use_color {
            style(text).to_string()
        } else {
            text.to_string()
        }
    }

    fn issue_line(&self, issue: &Issue) -> String {
        let first = |field: &str| {
            lookup(issue, field)
                .map(labels)
                .and_then(|labels| labels.into_iter().next())
        };
        let id = first("idReadable")
            .or_else(|| first("id"))
            .unwrap_or_else(|| "?".to_string());

        let mut line = format!("  {}", self.paint(&id, |s| s.cyan().bold()));
        for field in ["State", "Priority"] {
            if let Some(value) = first(field) {
                let _ = write!(line, " [{value}]");
            }
        }
        if let Some(summary) = first("summary") {
            let _ = write!(line, " {summary}");
        }
        line
    }

    fn popular(&self, out: &mut String, title: &str, entries: &[PopularEntry]) {
        if entries.is_empty() {
            return;
        }
        let _ = writeln!(out, "{}", self.paint(title, |s| s.bold()));
        for entry in entries {
            let _ = writeln!(out, "  {:>5}  {}", entry.count, entry.value);
        }
    }
}

fn millis(d: Duration) -> String {
    format!("{:.2} ms", d.as_secs_f64() * 1000.0)
}

impl OutputFormatterTrait for TextFormatter {
    fn name(&self) -> &str {
        "text"
    }

    fn search_result(&self, result: &SearchResult) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Query: {}", result.query_used);

        if result.issues.is_empty() {
            let _ = writeln!(out, "{}", self.paint("No issues found", |s| s.yellow()));
        } else {
            let first = result.pagination.offset + 1;
            let last = result.pagination.offset + result.issues.len();
            let _ = write!(
                out,
                "{} {} issues, showing {first}-{last} ({})",
                self.paint("Found", |s| s.green()),
                result.total_count,
                millis(result.execution_time)
            );
            if result.cache_hit {
                let _ = write!(out, " {}", self.paint("[cached]", |s| s.dimmed()));
            }
            out.push('\n');
            for issue in &result.issues {
                let _ = writeln!(out, "{}", self.issue_line(issue));
            }
        }

        let facets: Vec<_> = result.facets.iter().filter(|(_, v)| !v.is_empty()).collect();
        if !facets.is_empty() {
            let _ = writeln!(out, "{}", self.paint("Facets:", |s| s.bold()));
            for (field, counts) in facets {
                let mut counts: Vec<_> = counts.iter().collect();
                counts.sort_by(|(a, ca), (b, cb)| cb.cmp(ca).then_with(|| a.cmp(b)));
                let rendered: Vec<String> = counts
                    .iter()
                    .map(|(value, count)| format!("{value} ({count})"))
                    .collect();
                let _ = writeln!(out, "  {field}: {}", rendered.join(", "));
            }
        }

        if !result.suggested_queries.is_empty() {
            let _ = writeln!(out, "{}", self.paint("Suggested queries:", |s| s.bold()));
            for query in &result.suggested_queries {
                let _ = writeln!(out, "  {query}");
            }
        }
        out
    }

    fn analytics(&self, snapshot: &AnalyticsSnapshot, cache: &CacheStats) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{}", self.paint("Analytics:", |s| s.bold()));
        let _ = writeln!(
            out,
            "  searches: {} ({} unique patterns)",
            snapshot.total_searches, snapshot.unique_query_patterns
        );
        let _ = writeln!(
            out,
            "  latency: avg {}, max {}",
            millis(snapshot.avg_execution_time),
            millis(snapshot.max_execution_time)
        );
        let _ = writeln!(
            out,
            "  cache: {} hits, {} misses, {} entries (hit rate {:.2})",
            cache.hits, cache.misses, cache.entries, cache.hit_rate
        );
        if !snapshot.error_counts.is_empty() {
            let errors: Vec<String> = snapshot
                .error_counts
                .iter()
                .map(|(category, count)| format!("{category}={count}"))
                .collect();
            let _ = writeln!(out, "  errors: {}", self.paint(&errors.join(", "), |s| s.red()));
        }
        let _ = writeln!(out, "  uptime: {}s", snapshot.uptime.as_secs());
        self.popular(&mut out, "Popular queries:", &snapshot.popular_queries);
        self.popular(&mut out, "Popular fields:", &snapshot.popular_fields);
        out
    }

    fn values(&self, _label: &str, values: &[String]) -> String {
        let mut out = String::new();
        for value in values {
            let _ = writeln!(out, "{value}");
        }
        out
    }
}

/// JSON formatter
pub struct JsonFormatter;

impl JsonFormatter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for JsonFormatter {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputFormatterTrait for JsonFormatter {
    fn name(&self) -> &str {
        "json"
    }

    fn search_result(&self, result: &SearchResult) -> String {
        serde_json::to_string_pretty(result).unwrap_or_default()
    }

    fn analytics(&self, snapshot: &AnalyticsSnapshot, cache: &CacheStats) -> String {
        serde_json::to_string_pretty(&json!({
            "analytics": snapshot,
            "cache": cache,
        }))
        .unwrap_or_default()
    }

    fn values(&self, label: &str, values: &[String]) -> String {
        serde_json::to_string_pretty(&json!({ label: values })).unwrap_or_default()
    }
}
