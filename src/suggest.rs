//! Autocomplete suggestions, result facets and query refinements
use crate::analytics::AnalyticsRecorder;
use crate::query::condition::render_token;
use crate::query::{parse_search, MATCH_ALL};
use crate::search::fields::{labels, lookup};
use crate::search::{Facets, Issue};
use chrono::{Days, NaiveDate};
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Field tokens offered for completion.
pub const FIELD_CATALOG: &[&str] = &[
    "project",
    "assignee",
    "reporter",
    "State",
    "Priority",
    "Type",
    "created",
    "updated",
    "resolved",
    "summary",
    "description",
    "has",
];

/// Known values for fields with a closed vocabulary.
pub const VALUE_CATALOG: &[(&str, &[&str])] = &[
    ("State", &["Open", "In Progress", "Fixed", "Verified", "Closed"]),
    ("Priority", &["Critical", "High", "Normal", "Low"]),
    ("assignee", &["Unassigned", "me"]),
];

lazy_static! {
    /// `<head><field>: <partial>` at the end of a prefix.
    static ref VALUE_CONTEXT: Regex =
        Regex::new(r"^(?P<head>.*?)(?P<field>[A-Za-z][\w.]*):\s*(?P<partial>[^:,]*)$").unwrap();
}

enum Refinement {
    Clause(&'static str),
    CreatedWithinDays(u64),
}

/// Extra clause offered when its field is absent from the query.
const REFINEMENTS: &[(&str, Refinement)] = &[
    ("State", Refinement::Clause("State: Open")),
    ("assignee", Refinement::Clause("assignee: Unassigned")),
    ("created", Refinement::CreatedWithinDays(7)),
];

/// Stateless apart from reading popularity out of the analytics recorder.
#[derive(Clone)]
pub struct SuggestionEngine {
    analytics: Arc<AnalyticsRecorder>,
}

impl SuggestionEngine {
    pub fn new(analytics: Arc<AnalyticsRecorder>) -> Self {
        Self { analytics }
    }

    /// Completions for `prefix`, most frequent first, ties alphabetical.
    pub fn suggest(&self, prefix: &str, limit: usize) -> Vec<String> {
        if limit == 0 {
            return Vec::new();
        }
        let lowered = prefix.to_lowercase();
        let mut scored: HashMap<String, u64> = HashMap::new();
        let mut offer = |candidate: String, score: u64| {
            let slot = scored.entry(candidate).or_insert(0);
            *slot = (*slot).max(score);
        };

        for entry in self.analytics.query_counts() {
            if entry.value.to_lowercase().starts_with(&lowered) {
                offer(entry.value, entry.count);
            }
        }

        if let Some(caps) = VALUE_CONTEXT.captures(prefix) {
            let field = &caps["field"];
            let partial = caps["partial"].trim_start().to_lowercase();
            let catalogued = VALUE_CATALOG
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(field));
            if let Some((name, values)) = catalogued {
                for value in values.iter().filter(|v| v.to_lowercase().starts_with(&partial)) {
                    offer(
                        format!("{}{}: {}", &caps["head"], name, render_token(value)),
                        0,
                    );
                }
            }
        }

        let start = prefix
            .char_indices()
            .rev()
            .find(|(_, c)| c.is_whitespace())
            .map(|(i, c)| i + c.len_utf8())
            .unwrap_or(0);
        let (head, word) = prefix.split_at(start);
        // A word right after `field:` is an operand, not a field.
        let operand_position = head.trim_end().ends_with(':');
        if !operand_position && (!word.is_empty() || prefix.trim().is_empty()) {
            let word = word.to_lowercase();
            for field in FIELD_CATALOG {
                if field.to_lowercase().starts_with(&word) {
                    offer(format!("{head}{field}:"), self.analytics.field_count(field));
                }
            }
        }

        let mut ranked: Vec<(String, u64)> = scored.into_iter().collect();
        ranked.sort_by(|(a, ca), (b, cb)| cb.cmp(ca).then_with(|| a.cmp(b)));
        ranked.into_iter().take(limit).map(|(s, _)| s).collect()
    }

    /// Value counts per requested field over an already fetched page.
    ///
    /// Every requested field gets an entry; issues lacking the field are
    /// not counted.
    pub fn facets(&self, issues: &[Issue], facet_fields: &[String]) -> Facets {
        facet_fields
            .iter()
            .map(|field| {
                let mut counts: BTreeMap<String, u64> = BTreeMap::new();
                for value in issues.iter().filter_map(|issue| lookup(issue, field)) {
                    for label in labels(value) {
                        *counts.entry(label).or_insert(0) += 1;
                    }
                }
                (field.clone(), counts)
            })
            .collect()
    }

    /// Narrower variants of `query`, one per rule whose field it lacks.
    pub fn refinements(&self, query: &str, today: NaiveDate, max: usize) -> Vec<String> {
        let Ok(parsed) = parse_search(query) else {
            return Vec::new();
        };
        let present = |field: &str| {
            parsed
                .conditions
                .iter()
                .any(|c| c.field.eq_ignore_ascii_case(field))
        };

        REFINEMENTS
            .iter()
            .filter(|(field, _)| !present(field))
            .filter_map(|(_, rule)| match rule {
                Refinement::Clause(clause) => Some(clause.to_string()),
                Refinement::CreatedWithinDays(days) => today
                    .checked_sub_days(Days::new(*days))
                    .map(|since| format!("created: >={}", since.format("%Y-%m-%d"))),
            })
            .map(|clause| {
                if query.trim() == MATCH_ALL || query.trim().is_empty() {
                    clause
                } else {
                    format!("{} {}", query.trim(), clause)
                }
            })
            .take(max)
            .collect()
    }
}
