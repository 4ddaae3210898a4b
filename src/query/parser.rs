//! Reader for the canonical query grammar produced by [`super::QueryBuilder`]
use super::builder::MATCH_ALL;
use super::condition::{looks_like_date, Condition, Operator, Value, HAS_KEYWORD};
use crate::error::ValidationError;
use chrono::NaiveDate;

/// Parses a rendered query back into conditions.
///
/// Single-item lists come back as `:` / `!:` conditions; compare against
/// [`Condition::normalized`] when checking equivalence.
pub fn parse_query(query: &str) -> Result<Vec<Condition>, ValidationError> {
    let parsed = parse(query, false)?;
    Ok(parsed.conditions)
}

/// Conditions plus free-text terms of a full search query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedQuery {
    pub conditions: Vec<Condition>,
    pub text: Vec<String>,
}

/// Like [`parse_query`], but terms that are not `field: operand` clauses
/// are collected as free text instead of rejected.
pub fn parse_search(query: &str) -> Result<ParsedQuery, ValidationError> {
    parse(query, true)
}

fn parse(query: &str, allow_text: bool) -> Result<ParsedQuery, ValidationError> {
    let mut parsed = ParsedQuery::default();
    let trimmed = query.trim();
    if trimmed.is_empty() || trimmed == MATCH_ALL {
        return Ok(parsed);
    }

    let mut cursor = Cursor::new(trimmed);
    loop {
        cursor.skip_whitespace();
        if cursor.is_done() {
            break;
        }
        if allow_text && !cursor.at_condition() {
            parsed.text.push(cursor.token()?.text);
            continue;
        }
        let condition = cursor.condition()?;
        condition.validate()?;
        parsed.conditions.push(condition);
    }
    Ok(parsed)
}

struct Token {
    text: String,
    braced: bool,
}

impl Token {
    fn into_scalar(self) -> Value {
        if self.braced {
            return Value::Text(self.text);
        }
        if looks_like_date(&self.text) {
            if let Ok(date) = NaiveDate::parse_from_str(&self.text, "%Y-%m-%d") {
                return Value::Date(date);
            }
        }
        match self.text.parse::<f64>() {
            Ok(n) if n.is_finite() => Value::Number(n),
            _ => Value::Text(self.text),
        }
    }
}

struct Cursor<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn is_done(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn eat(&mut self, prefix: &str) -> bool {
        if self.rest().starts_with(prefix) {
            self.pos += prefix.len();
            true
        } else {
            false
        }
    }

    fn skip_whitespace(&mut self) {
        let rest = self.rest();
        self.pos += rest.len() - rest.trim_start().len();
    }

    fn error(&self) -> ValidationError {
        let context: String = self.rest().chars().take(24).collect();
        ValidationError::Parse(if context.is_empty() {
            "end of input".to_string()
        } else {
            context
        })
    }

    fn condition(&mut self) -> Result<Condition, ValidationError> {
        let field = self.field()?;
        if !self.eat(":") {
            return Err(self.error());
        }
        self.skip_whitespace();

        if !field.braced && field.text == HAS_KEYWORD {
            let operator = if self.eat("-") {
                Operator::NotHas
            } else {
                Operator::Has
            };
            let target = self.token()?;
            return Ok(Condition::new(target.text, operator, Value::Text(String::new())));
        }

        let (operator, negated) = if self.eat("-~") {
            (Operator::NotContains, false)
        } else if self.eat("-") {
            (Operator::NotEquals, true)
        } else if self.eat("~") {
            (Operator::Contains, false)
        } else if self.eat(">=") {
            (Operator::GreaterOrEqual, false)
        } else if self.eat("<=") {
            (Operator::LessOrEqual, false)
        } else if self.eat(">") {
            (Operator::GreaterThan, false)
        } else if self.eat("<") {
            (Operator::LessThan, false)
        } else {
            (Operator::Equals, false)
        };

        let first = self.token()?;
        if matches!(operator, Operator::Equals | Operator::NotEquals) && self.list_follows() {
            let mut items = vec![first.text];
            while self.list_follows() {
                self.skip_whitespace();
                self.eat(",");
                self.skip_whitespace();
                if negated && !self.eat("-") {
                    return Err(self.error());
                }
                items.push(self.token()?.text);
            }
            let operator = if negated {
                Operator::NotIn
            } else {
                Operator::In
            };
            return Ok(Condition::new(field.text, operator, Value::List(items)));
        }

        Ok(Condition::new(field.text, operator, first.into_scalar()))
    }

    /// Whether the next term is a `field:` clause rather than free text.
    fn at_condition(&self) -> bool {
        let rest = self.rest();
        if rest.starts_with('{') {
            return match rest.find('}') {
                Some(close) => rest[close + 1..].starts_with(':'),
                None => false,
            };
        }
        matches!(
            rest.find(|c: char| c == ':' || c.is_whitespace()),
            Some(end) if end > 0 && rest[end..].starts_with(':')
        )
    }

    fn list_follows(&self) -> bool {
        self.rest().trim_start().starts_with(',')
    }

    fn field(&mut self) -> Result<Token, ValidationError> {
        if self.peek() == Some('{') {
            return self.braced();
        }
        let rest = self.rest();
        let end = rest
            .find(|c: char| c == ':' || c.is_whitespace())
            .ok_or_else(|| self.error())?;
        if end == 0 || !rest[end..].starts_with(':') {
            return Err(self.error());
        }
        self.pos += end;
        Ok(Token {
            text: rest[..end].to_string(),
            braced: false,
        })
    }

    fn token(&mut self) -> Result<Token, ValidationError> {
        if self.peek() == Some('{') {
            return self.braced();
        }
        let rest = self.rest();
        let end = rest
            .find(|c: char| c == ',' || c.is_whitespace())
            .unwrap_or(rest.len());
        if end == 0 {
            return Err(self.error());
        }
        self.pos += end;
        Ok(Token {
            text: rest[..end].to_string(),
            braced: false,
        })
    }

    fn braced(&mut self) -> Result<Token, ValidationError> {
        let rest = self.rest();
        let close = rest.find('}').ok_or_else(|| self.error())?;
        self.pos += close + 1;
        Ok(Token {
            text: rest[1..close].to_string(),
            braced: true,
        })
    }
}
