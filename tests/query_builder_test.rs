use chrono::NaiveDate;
use proptest::prelude::*;
use ytsearch::query::{build_query, parse_query, resolve_date, Condition, Operator, QueryBuilder, Value};
use ytsearch::ValidationError;

fn field() -> impl Strategy<Value = String> {
    "[A-Za-z][A-Za-z0-9_.]{0,8}( [A-Za-z0-9]{1,5})?"
        .prop_filter("reserved keyword", |f| !f.eq_ignore_ascii_case("has"))
}

fn text() -> impl Strategy<Value = String> {
    "[A-Za-z0-9 ._~<>!=-]{1,12}"
}

fn date() -> impl Strategy<Value = NaiveDate> {
    (2000i32..2030, 1u32..=12, 1u32..=28)
        .prop_map(|(y, m, d)| NaiveDate::from_ymd_opt(y, m, d).unwrap())
}

fn number() -> impl Strategy<Value = f64> {
    prop_oneof![(0u32..100_000).prop_map(f64::from), 0.0f64..1e9]
}

fn condition() -> impl Strategy<Value = Condition> {
    let scalar_ops = prop_oneof![
        Just(Operator::Equals),
        Just(Operator::NotEquals),
        Just(Operator::Contains),
        Just(Operator::NotContains),
    ];
    let comparison_ops = prop_oneof![
        Just(Operator::GreaterThan),
        Just(Operator::LessThan),
        Just(Operator::GreaterOrEqual),
        Just(Operator::LessOrEqual),
    ];
    let list_ops = prop_oneof![Just(Operator::In), Just(Operator::NotIn)];

    prop_oneof![
        (field(), scalar_ops.clone(), text()).prop_map(|(f, op, v)| Condition::new(f, op, v)),
        (field(), scalar_ops, number()).prop_map(|(f, op, n)| Condition::new(f, op, n)),
        (field(), comparison_ops.clone(), date()).prop_map(|(f, op, d)| Condition::new(f, op, d)),
        (field(), comparison_ops.clone(), number()).prop_map(|(f, op, n)| Condition::new(f, op, n)),
        (field(), comparison_ops.clone(), -1e9f64..0.0).prop_map(|(f, op, n)| Condition::new(f, op, n)),
        (field(), comparison_ops, text()).prop_map(|(f, op, v)| Condition::new(f, op, v)),
        (field(), list_ops, prop::collection::vec(text(), 1..4))
            .prop_map(|(f, op, items)| Condition::new(f, op, Value::List(items))),
        field().prop_map(Condition::has),
        field().prop_map(Condition::has_not),
    ]
}

proptest! {
    #[test]
    fn built_queries_parse_back(conditions in prop::collection::vec(condition(), 0..6)) {
        let query = build_query(&conditions).unwrap();
        let parsed = parse_query(&query).unwrap();
        let expected: Vec<Condition> = conditions.iter().map(Condition::normalized).collect();
        prop_assert_eq!(parsed, expected, "query was {}", query);
    }

    #[test]
    fn canonical_ignores_insertion_order(conditions in prop::collection::vec(condition(), 0..6)) {
        let mut forward = QueryBuilder::new();
        forward.extend(conditions.iter().cloned()).unwrap();
        let mut backward = QueryBuilder::new();
        backward.extend(conditions.iter().rev().cloned()).unwrap();
        prop_assert_eq!(forward.canonical(), backward.canonical());
    }
}

#[test]
fn example_query_renders_exactly() {
    let conditions = vec![
        Condition::new("project", Operator::Equals, "TEST"),
        Condition::new("Priority", Operator::In, vec!["High", "Critical"]),
    ];
    assert_eq!(
        build_query(&conditions).unwrap(),
        "project: TEST Priority: High, Critical"
    );
}

#[test]
fn conditions_deserialize_from_json() {
    let conditions: Vec<Condition> = serde_json::from_str(
        r#"[
            {"field": "project", "operator": ":", "value": "TEST"},
            {"field": "Priority", "operator": "in", "value": ["High", "Critical"]},
            {"field": "votes", "operator": ">=", "value": 3},
            {"field": "created", "operator": "<", "value": "2025-06-01"},
            {"field": "attachments", "operator": "has"}
        ]"#,
    )
    .unwrap();

    assert_eq!(conditions[2].value, Value::Number(3.0));
    assert_eq!(
        conditions[3].value,
        Value::Date(NaiveDate::from_ymd_opt(2025, 6, 1).unwrap())
    );
    assert_eq!(
        build_query(&conditions).unwrap(),
        "project: TEST Priority: High, Critical votes: >=3 created: <2025-06-01 has: attachments"
    );
}

#[test]
fn invalid_conditions_are_rejected() {
    let bad = [
        Condition::new("", Operator::Equals, "x"),
        Condition::new("summary", Operator::GreaterThan, vec!["crash"]),
        Condition::new("Priority", Operator::In, Vec::<String>::new()),
        Condition::new("summary", Operator::Equals, "{x}"),
        Condition::new("votes", Operator::Equals, -1.0),
        Condition::new("votes", Operator::Contains, -0.0),
    ];
    for condition in bad {
        assert!(build_query(&[condition.clone()]).is_err(), "{condition:?}");
    }
}

#[test]
fn comparisons_take_text_and_negative_operands() {
    let conditions = vec![
        Condition::new("Fix version", Operator::GreaterThan, "1.2.0"),
        Condition::new("votes", Operator::GreaterOrEqual, -3.0),
        Condition::new("created", Operator::LessThan, "-7d"),
        Condition::new("code", Operator::LessOrEqual, "=a"),
    ];
    let query = build_query(&conditions).unwrap();
    assert_eq!(query, "{Fix version}: >1.2.0 votes: >=-3 created: <{-7d} code: <={=a}");
    assert_eq!(parse_query(&query).unwrap(), conditions);
}

#[test]
fn relative_dates_match_reference_day() {
    let now = chrono::DateTime::parse_from_rfc3339("2025-06-13T12:00:00Z")
        .unwrap()
        .with_timezone(&chrono::Utc);
    let day = |y, m, d| NaiveDate::from_ymd_opt(y, m, d).unwrap();

    assert_eq!(resolve_date("-7d", now).unwrap(), day(2025, 6, 6));
    assert_eq!(resolve_date("-1w", now).unwrap(), day(2025, 6, 6));
    assert_eq!(resolve_date("-1m", now).unwrap(), day(2025, 5, 14));
    assert_eq!(resolve_date("2024-02-29", now).unwrap(), day(2024, 2, 29));

    match resolve_date("next tuesday", now) {
        Err(ValidationError::UnrecognizedDateFormat { input, accepted }) => {
            assert_eq!(input, "next tuesday");
            assert!(accepted.contains(&"-7d"));
        }
        other => panic!("expected date error, got {other:?}"),
    }
}
