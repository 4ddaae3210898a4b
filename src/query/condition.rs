//! Typed search conditions and their canonical rendering
use crate::error::ValidationError;
use chrono::NaiveDate;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

lazy_static! {
    static ref DATE_LIKE: Regex = Regex::new(r"^\d{4}-\d{2}-\d{2}$").unwrap();
}

/// Characters that open an operand prefix when they lead a bare token.
const OPERAND_PREFIXES: &[char] = &['-', '~', '>', '<', '!', '='];

/// Keyword used for presence checks (`has: field`).
pub(crate) const HAS_KEYWORD: &str = "has";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    #[serde(rename = ":")]
    Equals,
    #[serde(rename = "!:")]
    NotEquals,
    #[serde(rename = "~")]
    Contains,
    #[serde(rename = "!~")]
    NotContains,
    #[serde(rename = ">")]
    GreaterThan,
    #[serde(rename = "<")]
    LessThan,
    #[serde(rename = ">=")]
    GreaterOrEqual,
    #[serde(rename = "<=")]
    LessOrEqual,
    #[serde(rename = "in")]
    In,
    #[serde(rename = "not in")]
    NotIn,
    #[serde(rename = "has")]
    Has,
    #[serde(rename = "!has")]
    NotHas,
}

impl Operator {
    pub const ALL: [Operator; 12] = [
        Operator::Equals,
        Operator::NotEquals,
        Operator::Contains,
        Operator::NotContains,
        Operator::GreaterThan,
        Operator::LessThan,
        Operator::GreaterOrEqual,
        Operator::LessOrEqual,
        Operator::In,
        Operator::NotIn,
        Operator::Has,
        Operator::NotHas,
    ];

    pub fn symbol(&self) -> &'static str {
        match self {
            Operator::Equals => ":",
            Operator::NotEquals => "!:",
            Operator::Contains => "~",
            Operator::NotContains => "!~",
            Operator::GreaterThan => ">",
            Operator::LessThan => "<",
            Operator::GreaterOrEqual => ">=",
            Operator::LessOrEqual => "<=",
            Operator::In => "in",
            Operator::NotIn => "not in",
            Operator::Has => "has",
            Operator::NotHas => "!has",
        }
    }

    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            Operator::GreaterThan
                | Operator::LessThan
                | Operator::GreaterOrEqual
                | Operator::LessOrEqual
        )
    }

    pub fn is_list(&self) -> bool {
        matches!(self, Operator::In | Operator::NotIn)
    }

    pub fn is_presence(&self) -> bool {
        matches!(self, Operator::Has | Operator::NotHas)
    }

    /// Prefix written in front of the operand.
    fn operand_prefix(&self) -> &'static str {
        match self {
            Operator::Equals | Operator::In | Operator::Has => "",
            Operator::NotEquals | Operator::NotIn | Operator::NotHas => "-",
            Operator::Contains => "~",
            Operator::NotContains => "-~",
            Operator::GreaterThan => ">",
            Operator::LessThan => "<",
            Operator::GreaterOrEqual => ">=",
            Operator::LessOrEqual => "<=",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl FromStr for Operator {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Operator::ALL
            .iter()
            .copied()
            .find(|op| op.symbol().eq_ignore_ascii_case(s))
            .ok_or_else(|| ValidationError::UnknownOperator(s.to_string()))
    }
}

/// Operand of a condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Number(f64),
    Date(NaiveDate),
    Text(String),
    List(Vec<String>),
}

impl Value {
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Number(_) => "number",
            Value::Date(_) => "date",
            Value::Text(_) => "text",
            Value::List(_) => "list",
        }
    }

    pub fn render(&self) -> String {
        match self {
            Value::Number(n) => format!("{n}"),
            Value::Date(d) => d.format("%Y-%m-%d").to_string(),
            Value::Text(s) => render_token(s),
            Value::List(items) => items
                .iter()
                .map(|item| render_token(item))
                .collect::<Vec<_>>()
                .join(", "),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<NaiveDate> for Value {
    fn from(d: NaiveDate) -> Self {
        Value::Date(d)
    }
}

impl From<Vec<String>> for Value {
    fn from(items: Vec<String>) -> Self {
        Value::List(items)
    }
}

impl From<Vec<&str>> for Value {
    fn from(items: Vec<&str>) -> Self {
        Value::List(items.into_iter().map(str::to_string).collect())
    }
}

/// Single `field operator value` clause.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Condition {
    pub field: String,
    pub operator: Operator,
    #[serde(default = "empty_value")]
    pub value: Value,
}

fn empty_value() -> Value {
    Value::Text(String::new())
}

impl Condition {
    pub fn new(field: impl Into<String>, operator: Operator, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            operator,
            value: value.into(),
        }
    }

    pub fn has(field: impl Into<String>) -> Self {
        Self::new(field, Operator::Has, empty_value())
    }

    pub fn has_not(field: impl Into<String>) -> Self {
        Self::new(field, Operator::NotHas, empty_value())
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_field(&self.field)?;

        let incompatible = || ValidationError::IncompatibleOperator {
            field: self.field.clone(),
            operator: self.operator.symbol().to_string(),
            value_kind: self.value.kind(),
        };

        match (&self.operator, &self.value) {
            (op, Value::Text(s)) if op.is_presence() => {
                if s.is_empty() {
                    Ok(())
                } else {
                    Err(incompatible())
                }
            }
            (op, _) if op.is_presence() => Err(incompatible()),
            (op, Value::List(items)) if op.is_list() => {
                if items.is_empty() {
                    return Err(self.invalid("list must not be empty"));
                }
                items.iter().try_for_each(|item| self.validate_text(item))
            }
            (op, _) if op.is_list() => Err(incompatible()),
            (_, Value::List(_)) => Err(incompatible()),
            (_, Value::Text(s)) => self.validate_text(s),
            (_, Value::Number(n)) if !n.is_finite() => Err(self.invalid("numbers must be finite")),
            // Only after `>`/`<` is a leading `-` unambiguous.
            (op, Value::Number(n)) if n.is_sign_negative() && !op.is_comparison() => {
                Err(self.invalid("negative numbers are only allowed in comparisons"))
            }
            (_, Value::Number(_)) => Ok(()),
            (_, Value::Date(_)) => Ok(()),
        }
    }

    fn validate_text(&self, s: &str) -> Result<(), ValidationError> {
        if s.is_empty() {
            return Err(self.invalid("value must not be empty"));
        }
        if s.contains(['{', '}']) {
            return Err(self.invalid("value must not contain braces"));
        }
        Ok(())
    }

    fn invalid(&self, reason: &str) -> ValidationError {
        ValidationError::InvalidValue {
            field: self.field.clone(),
            reason: reason.to_string(),
        }
    }

    /// Renders the clause. The condition is expected to be valid.
    pub fn render(&self) -> String {
        if self.operator.is_presence() {
            return format!(
                "{HAS_KEYWORD}: {}{}",
                self.operator.operand_prefix(),
                render_field(&self.field)
            );
        }

        let prefix = self.operator.operand_prefix();
        let operand = match (&self.operator, &self.value) {
            (Operator::NotIn, Value::List(items)) => items
                .iter()
                .map(|item| format!("-{}", render_token(item)))
                .collect::<Vec<_>>()
                .join(", "),
            (_, value) => format!("{prefix}{}", value.render()),
        };
        format!("{}: {operand}", render_field(&self.field))
    }

    /// Folds single-item list operators into their scalar equivalents.
    pub fn normalized(&self) -> Condition {
        match (&self.operator, &self.value) {
            (Operator::In, Value::List(items)) if items.len() == 1 => {
                Condition::new(self.field.clone(), Operator::Equals, items[0].clone())
            }
            (Operator::NotIn, Value::List(items)) if items.len() == 1 => {
                Condition::new(self.field.clone(), Operator::NotEquals, items[0].clone())
            }
            _ => self.clone(),
        }
    }

    pub(crate) fn sort_key(&self) -> (String, &'static str, String) {
        (self.field.clone(), self.operator.symbol(), self.value.render())
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

pub(crate) fn validate_field(field: &str) -> Result<(), ValidationError> {
    if field.trim().is_empty() {
        return Err(ValidationError::EmptyField);
    }
    if field.contains([':', '{', '}', ','])
        || field.starts_with('-')
        || field.eq_ignore_ascii_case(HAS_KEYWORD)
    {
        return Err(ValidationError::InvalidField(field.to_string()));
    }
    Ok(())
}

pub(crate) fn render_field(field: &str) -> String {
    if field.chars().any(char::is_whitespace) {
        format!("{{{field}}}")
    } else {
        field.to_string()
    }
}

/// Renders a text token, wrapping it in braces whenever the bare form
/// would read back as something else.
pub(crate) fn render_token(s: &str) -> String {
    if needs_braces(s) {
        format!("{{{s}}}")
    } else {
        s.to_string()
    }
}

fn needs_braces(s: &str) -> bool {
    s.is_empty()
        || s.chars().any(char::is_whitespace)
        || s.starts_with(OPERAND_PREFIXES)
        || s.contains(',')
        || looks_like_number(s)
        || looks_like_date(s)
}

pub(crate) fn looks_like_number(s: &str) -> bool {
    s.parse::<f64>().is_ok()
}

pub(crate) fn looks_like_date(s: &str) -> bool {
    DATE_LIKE.is_match(s)
}
