use crate::query::condition::looks_like_date;
use crate::query::{Condition, Operator, Value};
use crate::search::SortOrder;
use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use std::fmt;
use std::path::PathBuf;

#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file; defaults to the usual lookup locations
    #[clap(long, global = true, value_parser)]
    pub config: Option<PathBuf>,

    #[clap(long, global = true, value_parser)]
    pub log: Option<PathBuf>,

    #[clap(long, global = true, value_parser, default_value_t = false)]
    pub verbose: bool,

    #[clap(long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Render conditions into a query string
    Query {
        /// `field|operator|value`, e.g. `Priority|in|High,Critical`
        #[clap(long = "cond", value_parser = parse_condition, required = true)]
        conditions: Vec<Condition>,
    },
    /// Resolve an absolute or relative date token
    ResolveDate {
        #[clap(allow_hyphen_values = true)]
        token: String,

        /// Reference date instead of the current day
        #[clap(long, value_parser)]
        today: Option<NaiveDate>,
    },
    /// Run searches against a JSON issue export
    Search {
        #[clap(long, value_parser)]
        fixture: PathBuf,

        #[clap(long, value_parser)]
        project: Option<String>,

        #[clap(long, value_parser)]
        assignee: Option<String>,

        #[clap(long, value_parser)]
        state: Option<String>,

        #[clap(long, value_parser)]
        priority: Option<String>,

        #[clap(long, value_parser)]
        text: Option<String>,

        #[clap(long = "cond", value_parser = parse_condition)]
        conditions: Vec<Condition>,

        /// Lower bound for `created`, e.g. `-7d`
        #[clap(long, value_parser, allow_hyphen_values = true)]
        created_since: Option<String>,

        /// Only issues without a resolution
        #[clap(long, value_parser, default_value_t = false)]
        unresolved: bool,

        #[clap(long, value_parser)]
        limit: Option<usize>,

        #[clap(long, value_parser, default_value_t = 0)]
        offset: usize,

        #[clap(long, value_parser)]
        sort: Option<String>,

        #[clap(long, value_parser, default_value_t = SortOrder::Desc)]
        order: SortOrder,

        /// Run the same search this many times
        #[clap(long, value_parser, default_value_t = 1)]
        repeat: usize,

        /// Print prometheus metrics after the run
        #[clap(long, value_parser, default_value_t = false)]
        metrics: bool,
    },
    /// Autocomplete a partial query
    Suggest {
        prefix: String,

        #[clap(long, value_parser, default_value_t = 10)]
        limit: usize,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

/// Parses `field|operator|value`.
///
/// List operators split the value on commas. Bare values that read as a
/// date or a number become one; everything else stays text.
pub fn parse_condition(arg: &str) -> Result<Condition, String> {
    let mut parts = arg.splitn(3, '|');
    let field = parts.next().unwrap_or_default().trim();
    let operator: Operator = parts
        .next()
        .ok_or_else(|| format!("expected field|operator|value, got '{arg}'"))?
        .parse()
        .map_err(|e| format!("{e}"))?;
    let raw = parts.next().unwrap_or_default().trim();

    let value = if operator.is_list() {
        Value::List(raw.split(',').map(|item| item.trim().to_string()).collect())
    } else if operator.is_presence() {
        Value::Text(String::new())
    } else {
        infer_value(raw)
    };

    let condition = Condition::new(field, operator, value);
    condition.validate().map_err(|e| e.to_string())?;
    Ok(condition)
}

fn infer_value(raw: &str) -> Value {
    if looks_like_date(raw) {
        if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
            return Value::Date(date);
        }
    }
    match raw.parse::<f64>() {
        Ok(n) if n.is_finite() => Value::Number(n),
        _ => Value::Text(raw.to_string()),
    }
}
