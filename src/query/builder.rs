use super::condition::{Condition, Operator, Value};
use crate::error::ValidationError;

/// Rendered form of a builder with no conditions.
pub const MATCH_ALL: &str = "*";

/// Translates typed conditions into a query string.
///
/// Conditions are rendered in insertion order and joined with a single
/// space (implicit AND). [`QueryBuilder::canonical`] renders them sorted,
/// for use in cache keys.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryBuilder {
    conditions: Vec<Condition>,
}

impl QueryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(
        mut self,
        field: impl Into<String>,
        operator: Operator,
        value: impl Into<Value>,
    ) -> Result<Self, ValidationError> {
        self.push(Condition::new(field, operator, value))?;
        Ok(self)
    }

    pub fn push(&mut self, condition: Condition) -> Result<(), ValidationError> {
        condition.validate()?;
        self.conditions.push(condition);
        Ok(())
    }

    pub fn extend<I>(&mut self, conditions: I) -> Result<(), ValidationError>
    where
        I: IntoIterator<Item = Condition>,
    {
        conditions
            .into_iter()
            .try_for_each(|condition| self.push(condition))
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn build(&self) -> String {
        join(self.conditions.iter())
    }

    pub fn canonical(&self) -> String {
        let mut sorted: Vec<&Condition> = self.conditions.iter().collect();
        sorted.sort_by_cached_key(|c| c.sort_key());
        join(sorted.into_iter())
    }

    /// Distinct field names in first-use order.
    pub fn fields(&self) -> Vec<String> {
        let mut fields: Vec<String> = Vec::new();
        for condition in &self.conditions {
            if !fields.contains(&condition.field) {
                fields.push(condition.field.clone());
            }
        }
        fields
    }
}

fn join<'a>(conditions: impl Iterator<Item = &'a Condition>) -> String {
    let rendered: Vec<String> = conditions.map(Condition::render).collect();
    if rendered.is_empty() {
        MATCH_ALL.to_string()
    } else {
        rendered.join(" ")
    }
}

/// Validates and renders a condition list in one step.
pub fn build_query(conditions: &[Condition]) -> Result<String, ValidationError> {
    let mut builder = QueryBuilder::new();
    builder.extend(conditions.iter().cloned())?;
    Ok(builder.build())
}
