//! Caller-facing search request
use crate::error::ValidationError;
use crate::query::condition::render_token;
use crate::query::{is_relative_date, Condition, DateResolver, Operator, QueryBuilder, Value};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortOrder {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            other => Err(ValidationError::InvalidValue {
                field: "sort_order".to_string(),
                reason: format!("expected 'asc' or 'desc', got '{other}'"),
            }),
        }
    }
}

/// Which projects a search is restricted to.
///
/// Only `SpecificProjects` adds a clause; the other scopes leave project
/// visibility to the backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchScope {
    #[default]
    All,
    CurrentProject,
    VisibleProjects,
    SpecificProjects,
}

/// Inclusive date window on one field. Each side is `YYYY-MM-DD` or a
/// relative token such as `-7d`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DateRange {
    pub field: String,
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub to: Option<String>,
}

/// One search call.
///
/// Unset options fall back to the engine configuration: `limit` to
/// `default_limit` (then clamped to `max_limit`), `sort_field` to
/// `default_sort_field` and `facet_fields` to the configured facet list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SearchRequest {
    /// Free text, appended after all structured clauses.
    pub text: Option<String>,
    pub project: Option<String>,
    pub assignee: Option<String>,
    pub state: Option<String>,
    pub priority: Option<String>,
    pub project_scope: SearchScope,
    /// Required non-empty when `project_scope` is `specific_projects`.
    pub specific_projects: Vec<String>,
    /// Additional typed conditions, rendered after the structured filters.
    pub conditions: Vec<Condition>,
    pub date_ranges: Vec<DateRange>,
    pub sort_field: Option<String>,
    pub sort_order: SortOrder,
    pub limit: Option<usize>,
    pub offset: usize,
    /// When false, adds `State: Unresolved`.
    pub include_resolved: bool,
    /// When false, adds `project.archived: false`.
    pub include_archived: bool,
    pub facet_fields: Option<Vec<String>>,
}

impl Default for SearchRequest {
    fn default() -> Self {
        Self {
            text: None,
            project: None,
            assignee: None,
            state: None,
            priority: None,
            project_scope: SearchScope::All,
            specific_projects: Vec::new(),
            conditions: Vec::new(),
            date_ranges: Vec::new(),
            sort_field: None,
            sort_order: SortOrder::Desc,
            limit: None,
            offset: 0,
            include_resolved: true,
            include_archived: true,
            facet_fields: None,
        }
    }
}

impl SearchRequest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Plain filter search on the common structured fields.
    pub fn issue_search(project: Option<&str>, assignee: Option<&str>, state: Option<&str>) -> Self {
        Self {
            project: project.map(str::to_string),
            assignee: assignee.map(str::to_string),
            state: state.map(str::to_string),
            ..Self::default()
        }
    }

    /// Issues whose `field` falls within the last `days_back` days.
    pub fn date_range_search(field: impl Into<String>, days_back: u32) -> Self {
        let from = format!("-{days_back}d");
        Self::new().with_date_range(field, Some(&from), Some("-0d"))
    }

    /// Free-text search, or one `~` condition per field when fields are given.
    pub fn text_search(text: &str, fields: &[&str]) -> Self {
        if fields.is_empty() {
            return Self::new().with_text(text);
        }
        fields.iter().fold(Self::new(), |request, field| {
            request.with_condition(Condition::new(*field, Operator::Contains, text))
        })
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.project = Some(project.into());
        self
    }

    pub fn with_assignee(mut self, assignee: impl Into<String>) -> Self {
        self.assignee = Some(assignee.into());
        self
    }

    pub fn with_state(mut self, state: impl Into<String>) -> Self {
        self.state = Some(state.into());
        self
    }

    pub fn with_priority(mut self, priority: impl Into<String>) -> Self {
        self.priority = Some(priority.into());
        self
    }

    /// Restricts the search to the given projects.
    pub fn with_projects<I, S>(mut self, projects: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.project_scope = SearchScope::SpecificProjects;
        self.specific_projects = projects.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn with_date_range(
        mut self,
        field: impl Into<String>,
        from: Option<&str>,
        to: Option<&str>,
    ) -> Self {
        self.date_ranges.push(DateRange {
            field: field.into(),
            from: from.map(str::to_string),
            to: to.map(str::to_string),
        });
        self
    }

    pub fn with_sort(mut self, field: impl Into<String>, order: SortOrder) -> Self {
        self.sort_field = Some(field.into());
        self.sort_order = order;
        self
    }

    pub fn with_pagination(mut self, limit: usize, offset: usize) -> Self {
        self.limit = Some(limit);
        self.offset = offset;
        self
    }

    pub fn include_resolved(mut self, include: bool) -> Self {
        self.include_resolved = include;
        self
    }

    pub fn include_archived(mut self, include: bool) -> Self {
        self.include_archived = include;
        self
    }

    pub fn with_facets<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.facet_fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    /// Collects every structured clause into a validated builder.
    pub fn to_builder(&self, dates: &DateResolver) -> Result<QueryBuilder, ValidationError> {
        let mut builder = QueryBuilder::new();

        let filters = [
            ("project", &self.project),
            ("assignee", &self.assignee),
            ("State", &self.state),
            ("Priority", &self.priority),
        ];
        for (field, value) in filters {
            if let Some(value) = value {
                builder.push(Condition::new(field, Operator::Equals, value.as_str()))?;
            }
        }

        if self.project_scope == SearchScope::SpecificProjects {
            match self.specific_projects.as_slice() {
                [] => {
                    return Err(ValidationError::InvalidValue {
                        field: "specific_projects".to_string(),
                        reason: "must not be empty when project_scope is specific_projects"
                            .to_string(),
                    })
                }
                [single] => builder.push(Condition::new("project", Operator::Equals, single.as_str()))?,
                many => builder.push(Condition::new("project", Operator::In, many.to_vec()))?,
            }
        }

        for condition in &self.conditions {
            builder.push(resolve_relative(condition, dates)?)?;
        }

        for range in &self.date_ranges {
            if range.from.is_none() && range.to.is_none() {
                return Err(ValidationError::InvalidValue {
                    field: range.field.clone(),
                    reason: "date range needs at least one bound".to_string(),
                });
            }
            if let Some(from) = &range.from {
                let from = dates.resolve(from)?;
                builder.push(Condition::new(range.field.as_str(), Operator::GreaterOrEqual, from))?;
            }
            if let Some(to) = &range.to {
                let to = dates.resolve(to)?;
                builder.push(Condition::new(range.field.as_str(), Operator::LessOrEqual, to))?;
            }
        }

        if !self.include_archived {
            builder.push(Condition::new("project.archived", Operator::Equals, "false"))?;
        }
        if !self.include_resolved {
            builder.push(Condition::new("State", Operator::Equals, "Unresolved"))?;
        }

        Ok(builder)
    }

    /// Free text as it is appended to the query, if any.
    pub(crate) fn text_term(&self) -> Result<Option<String>, ValidationError> {
        let Some(text) = self.text.as_deref().map(str::trim) else {
            return Ok(None);
        };
        if text.is_empty() {
            return Ok(None);
        }
        if text.contains(['{', '}']) {
            return Err(ValidationError::InvalidValue {
                field: "text".to_string(),
                reason: "free text must not contain braces".to_string(),
            });
        }
        if text.contains(':') {
            return Ok(Some(format!("{{{text}}}")));
        }
        Ok(Some(render_token(text)))
    }
}

/// Turns `created: >= "-7d"` style comparisons into absolute dates.
fn resolve_relative(condition: &Condition, dates: &DateResolver) -> Result<Condition, ValidationError> {
    match &condition.value {
        Value::Text(token) if condition.operator.is_comparison() && is_relative_date(token) => {
            Ok(Condition::new(
                condition.field.as_str(),
                condition.operator,
                dates.resolve(token)?,
            ))
        }
        _ => Ok(condition.clone()),
    }
}
