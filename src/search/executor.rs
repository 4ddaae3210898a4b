//! Executor seam between the orchestrator and the remote issue tracker
use super::fields::{self, as_date, candidates, is_present, lookup};
use super::{Issue, SortOrder};
use crate::error::ExecutorError;
use crate::query::{parse_search, Condition, Operator, Value};
use async_trait::async_trait;
use log::debug;
use parking_lot::Mutex;
use serde_json::Value as Json;
use std::cmp::Ordering;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

/// One page of issues plus the backend's total match count.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutorPage {
    pub issues: Vec<Issue>,
    pub total_count: usize,
}

/// Runs a rendered query against the tracker.
///
/// Implementations own transport concerns such as authentication and
/// retries; the orchestrator only sees the page or a classified error.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(
        &self,
        query: &str,
        sort_field: &str,
        sort_order: SortOrder,
        limit: usize,
        offset: usize,
    ) -> Result<ExecutorPage, ExecutorError>;
}

/// In-memory executor over a fixed set of issues.
///
/// Interprets the query grammar locally, which makes it usable from the
/// CLI against a JSON export and from tests without a backend.
pub struct FixtureExecutor {
    issues: Vec<Issue>,
    failure: Mutex<Option<ExecutorError>>,
    calls: AtomicUsize,
}

impl FixtureExecutor {
    pub fn new(issues: Vec<Issue>) -> Self {
        Self {
            issues,
            failure: Mutex::new(None),
            calls: AtomicUsize::new(0),
        }
    }

    /// Loads issues from a JSON array.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let issues: Vec<Issue> = serde_json::from_str(json)?;
        Ok(Self::new(issues))
    }

    /// Makes every following call fail with `error`, or succeed again with `None`.
    pub fn fail_with(&self, error: Option<ExecutorError>) {
        *self.failure.lock() = error;
    }

    /// Number of `execute` calls so far, failed ones included.
    pub fn calls(&self) -> usize {
        self.calls.load(AtomicOrdering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.issues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    fn run(
        &self,
        query: &str,
        sort_field: &str,
        sort_order: SortOrder,
        limit: usize,
        offset: usize,
    ) -> Result<ExecutorPage, ExecutorError> {
        let parsed = parse_search(query)
            .map_err(|e| ExecutorError::from_status(400, e.to_string()))?;
        let terms: Vec<String> = parsed.text.iter().map(|t| t.to_lowercase()).collect();

        let mut matched: Vec<&Issue> = self
            .issues
            .iter()
            .filter(|issue| parsed.conditions.iter().all(|c| matches_condition(issue, c)))
            .filter(|issue| terms.iter().all(|term| matches_text(issue, term)))
            .collect();

        matched.sort_by(|a, b| {
            let ordering = compare_fields(lookup(a, sort_field), lookup(b, sort_field));
            match sort_order {
                SortOrder::Asc => ordering,
                SortOrder::Desc => ordering.reverse(),
            }
        });

        let total_count = matched.len();
        let issues = matched
            .into_iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect();
        Ok(ExecutorPage {
            issues,
            total_count,
        })
    }
}

#[async_trait]
impl Executor for FixtureExecutor {
    async fn execute(
        &self,
        query: &str,
        sort_field: &str,
        sort_order: SortOrder,
        limit: usize,
        offset: usize,
    ) -> Result<ExecutorPage, ExecutorError> {
        self.calls.fetch_add(1, AtomicOrdering::SeqCst);
        if let Some(error) = self.failure.lock().clone() {
            return Err(error);
        }

        let page = self.run(query, sort_field, sort_order, limit, offset)?;
        debug!(
            "Fixture matched {} of {} issues for '{}'",
            page.total_count,
            self.issues.len(),
            query
        );
        Ok(page)
    }
}

fn matches_condition(issue: &Issue, condition: &Condition) -> bool {
    let field = condition.field.as_str();

    // `State: Unresolved` is a virtual state: no resolution date.
    if field.eq_ignore_ascii_case("State")
        && matches!(&condition.value, Value::Text(t) if t.eq_ignore_ascii_case("Unresolved"))
    {
        let unresolved = lookup(issue, "resolved").map_or(true, Json::is_null);
        return match condition.operator {
            Operator::NotEquals => !unresolved,
            _ => unresolved,
        };
    }

    let value = lookup(issue, field);
    let present = value.is_some_and(is_present);
    let values = value.map(candidates).unwrap_or_default();

    match condition.operator {
        Operator::Has => present,
        Operator::NotHas => !present,
        Operator::Equals | Operator::In => values.iter().any(|c| equals(c, &condition.value)),
        Operator::NotEquals | Operator::NotIn => !values.iter().any(|c| equals(c, &condition.value)),
        Operator::Contains => values.iter().any(|c| contains(c, &condition.value)),
        Operator::NotContains => !values.iter().any(|c| contains(c, &condition.value)),
        Operator::GreaterThan => any_ordering(&values, &condition.value, |o| o == Ordering::Greater),
        Operator::LessThan => any_ordering(&values, &condition.value, |o| o == Ordering::Less),
        Operator::GreaterOrEqual => any_ordering(&values, &condition.value, |o| o != Ordering::Less),
        Operator::LessOrEqual => any_ordering(&values, &condition.value, |o| o != Ordering::Greater),
    }
}

fn matches_text(issue: &Issue, term: &str) -> bool {
    ["summary", "description", "idReadable"].iter().any(|field| {
        lookup(issue, field)
            .and_then(Json::as_str)
            .is_some_and(|text| text.to_lowercase().contains(term))
    })
}

fn equals(candidate: &str, operand: &Value) -> bool {
    match operand {
        Value::Number(n) => candidate.parse::<f64>().is_ok_and(|c| c == *n),
        Value::Date(d) => as_date(candidate) == Some(*d),
        Value::Text(t) => candidate.eq_ignore_ascii_case(t),
        Value::List(items) => items.iter().any(|item| candidate.eq_ignore_ascii_case(item)),
    }
}

fn contains(candidate: &str, operand: &Value) -> bool {
    match operand {
        Value::Text(t) => candidate.to_lowercase().contains(&t.to_lowercase()),
        other => equals(candidate, other),
    }
}

fn any_ordering(values: &[String], operand: &Value, accept: impl Fn(Ordering) -> bool) -> bool {
    values
        .iter()
        .filter_map(|candidate| compare_operand(candidate, operand))
        .any(accept)
}

fn compare_operand(candidate: &str, operand: &Value) -> Option<Ordering> {
    match operand {
        Value::Number(n) => candidate.parse::<f64>().ok()?.partial_cmp(n),
        Value::Date(d) => Some(as_date(candidate)?.cmp(d)),
        Value::Text(t) => Some(candidate.to_lowercase().cmp(&t.to_lowercase())),
        Value::List(_) => None,
    }
}

/// Ascending order for sort keys. Missing and null values sort first.
fn compare_fields(a: Option<&Json>, b: Option<&Json>) -> Ordering {
    let key = |v: Option<&Json>| -> Option<Json> {
        match v? {
            Json::Null => None,
            Json::Number(n) => Some(Json::Number(n.clone())),
            other => fields::labels(other).into_iter().next().map(Json::String),
        }
    };
    match (key(a), key(b)) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(Json::Number(x)), Some(Json::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(x), Some(y)) => x.to_string().cmp(&y.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCategory;
    use serde_json::json;

    fn fixture() -> FixtureExecutor {
        FixtureExecutor::new(vec![
            json!({"idReadable": "TEST-1", "summary": "Login fails on Safari",
                   "project": {"name": "Test", "shortName": "TEST"}, "Priority": "High",
                   "State": "Open", "votes": 3, "created": "2025-06-01", "resolved": null}),
            json!({"idReadable": "TEST-2", "summary": "Crash when saving",
                   "project": {"name": "Test", "shortName": "TEST"}, "Priority": "Critical",
                   "State": "Fixed", "votes": 10, "created": "2025-06-10", "resolved": "2025-06-11",
                   "attachments": [{"name": "trace.txt"}]}),
            json!({"idReadable": "OPS-1", "summary": "Disk full",
                   "project": {"name": "Ops", "shortName": "OPS"}, "Priority": "Low",
                   "State": "Open", "votes": 1, "created": "2025-05-01", "resolved": null}),
        ])
    }

    async fn ids(executor: &FixtureExecutor, query: &str) -> Vec<String> {
        executor
            .execute(query, "votes", SortOrder::Desc, 50, 0)
            .await
            .unwrap()
            .issues
            .iter()
            .map(|i| i["idReadable"].as_str().unwrap().to_string())
            .collect()
    }

    #[tokio::test]
    async fn test_conditions_filter() {
        let executor = fixture();
        assert_eq!(ids(&executor, "project: TEST Priority: High, Critical").await, vec!["TEST-2", "TEST-1"]);
        assert_eq!(ids(&executor, "Priority: -Low, -High").await, vec!["TEST-2"]);
        assert_eq!(ids(&executor, "votes: >=3").await, vec!["TEST-2", "TEST-1"]);
        assert_eq!(ids(&executor, "created: <2025-06-01").await, vec!["OPS-1"]);
        assert_eq!(ids(&executor, "has: attachments").await, vec!["TEST-2"]);
        assert_eq!(ids(&executor, "State: Unresolved").await, vec!["TEST-1", "OPS-1"]);
        assert_eq!(ids(&executor, "summary: ~crash").await, vec!["TEST-2"]);
        assert_eq!(ids(&executor, "*").await.len(), 3);
    }

    #[tokio::test]
    async fn test_free_text_and_pagination() {
        let executor = fixture();
        assert_eq!(ids(&executor, "project: TEST {login fails}").await, vec!["TEST-1"]);

        let page = executor
            .execute("*", "votes", SortOrder::Asc, 1, 1)
            .await
            .unwrap();
        assert_eq!(page.total_count, 3);
        assert_eq!(page.issues.len(), 1);
        assert_eq!(page.issues[0]["idReadable"], "TEST-1");
    }

    #[tokio::test]
    async fn test_failure_switch_and_calls() {
        let executor = fixture();
        executor.fail_with(Some(ExecutorError::from_status(401, "bad token")));
        let err = executor
            .execute("*", "updated", SortOrder::Desc, 10, 0)
            .await
            .unwrap_err();
        assert_eq!(err.category, ErrorCategory::Auth);

        executor.fail_with(None);
        assert!(executor.execute("*", "updated", SortOrder::Desc, 10, 0).await.is_ok());
        assert_eq!(executor.calls(), 2);
    }

    #[test]
    fn test_from_json() {
        let executor = FixtureExecutor::from_json(r#"[{"idReadable": "A-1"}]"#).unwrap();
        assert_eq!(executor.len(), 1);
        assert!(FixtureExecutor::from_json("{}").is_err());
    }
}
