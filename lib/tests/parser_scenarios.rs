//! Whole-tree black-box coverage of the declare → parse round trip, driven entirely through the
//! public API. Scenarios already covered by `parser.rs`'s own `#[cfg(test)]` module (long flag with
//! value, short cluster, end-of-options, negated form, positional saturation, shadowing) are not
//! repeated here; this file adds the cases that module doesn't reach.

use keelson::context::Context;
use keelson::options::OptionDef;
use keelson::parser::parse;
use keelson::value::{TypeTag, Value};
use keelson::Argument;

#[tokio::test]
async fn negated_option_defaults_true_when_absent() {
    let root = Context::new_root();
    root.option(OptionDef::new("--no-banner", "").unwrap()).unwrap();

    let result = parse(&root, &[]).await.unwrap();

    assert_eq!(result.argv.get("banner"), Some(&Value::Bool(true)));
}

#[tokio::test]
async fn parent_option_still_visible_from_inside_child_context() {
    let root = Context::new_root();
    root.option(OptionDef::new("--verbose", "").unwrap()).unwrap();
    let child = root.command("sub", vec![]).unwrap();

    let tokens: Vec<String> = vec!["sub".to_string(), "--verbose".to_string()];
    let result = parse(&root, &tokens).await.unwrap();

    assert_eq!(result.argv.get("verbose"), Some(&Value::Bool(true)));
    assert!(child.lookup_long("verbose").is_some());
}

#[tokio::test]
async fn unknown_long_option_is_recorded_and_not_fatal_without_the_passthrough_flag() {
    let root = Context::new_root();
    let tokens: Vec<String> = vec!["--mystery".to_string()];
    let result = parse(&root, &tokens).await.unwrap();

    assert!(result.unknown.contains_key("mystery"));
    assert!(result.positional.is_empty());
}

#[tokio::test]
async fn required_value_option_missing_its_value_is_an_error() {
    let root = Context::new_root();
    root.option(OptionDef::new("--out <path>", "").unwrap()).unwrap();

    let err = parse(&root, &["--out".to_string()]).await.unwrap_err();
    assert!(matches!(err, keelson::Error::MissingRequiredOption { .. }));
}

#[tokio::test]
async fn equals_form_and_separate_token_form_are_equivalent() {
    let root = Context::new_root();
    root.option(OptionDef::new("--foo <v>", "").unwrap()).unwrap();

    let a = parse(&root, &["--foo=v".to_string(), "x".to_string()]).await.unwrap();
    let b = parse(&root, &["--foo".to_string(), "v".to_string(), "x".to_string()]).await.unwrap();

    assert_eq!(a.argv.get("foo"), b.argv.get("foo"));
    assert_eq!(a.positional, b.positional);
}

#[tokio::test]
async fn bare_token_matching_both_a_command_and_an_option_alias_prefers_the_command() {
    let root = Context::new_root();
    root.command("build", vec![]).unwrap();

    let result = parse(&root, &["build".to_string()]).await.unwrap();
    assert_eq!(result.terminal().name().as_deref(), Some("build"));
}

#[tokio::test]
async fn reparsing_the_same_tokens_is_deterministic() {
    let root = Context::new_root();
    root.option(OptionDef::new("-a", "").unwrap()).unwrap();
    root.argument(Argument::new("name").unwrap()).unwrap();
    let tokens: Vec<String> = vec!["-a".to_string(), "hi".to_string()];

    let first = parse(&root, &tokens).await.unwrap();
    let second = parse(&root, &tokens).await.unwrap();

    assert_eq!(first.argv.get("a"), second.argv.get("a"));
    assert_eq!(first.positional, second.positional);
}

#[tokio::test]
async fn date_and_json_type_tags_coerce_through_a_full_parse() {
    let root = Context::new_root();
    root.option(OptionDef::new("--since <d>", "").unwrap().type_tag(TypeTag::Date)).unwrap();
    root.option(OptionDef::new("--config <c>", "").unwrap().type_tag(TypeTag::Json)).unwrap();

    let tokens: Vec<String> = vec![
        "--since".to_string(),
        "2020-01-02".to_string(),
        "--config".to_string(),
        r#"{"retries":3}"#.to_string(),
    ];
    let result = parse(&root, &tokens).await.unwrap();

    assert_eq!(
        result.argv.get("since"),
        Some(&Value::Date(chrono::NaiveDate::from_ymd_opt(2020, 1, 2).unwrap()))
    );
    assert_eq!(result.argv.get("config"), Some(&Value::Json(serde_json::json!({"retries": 3}))));
}
