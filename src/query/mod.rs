//! Query construction: typed conditions, rendering, parsing and date tokens
pub mod builder;
pub mod condition;
pub mod date;
pub mod parser;

pub use builder::{build_query, QueryBuilder, MATCH_ALL};
pub use condition::{Condition, Operator, Value};
pub use date::{is_relative_date, resolve_date, DateResolver, ACCEPTED_DATE_FORMATS};
pub use parser::{parse_query, parse_search, ParsedQuery};
