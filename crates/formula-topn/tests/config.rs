use formula_topn::{FailurePolicy, TopNConfig, TopNError, TopNRunner};
use pretty_assertions::assert_eq;
use std::num::NonZeroUsize;
use std::time::Duration;

#[test]
fn empty_json_uses_defaults() {
    let config: TopNConfig = serde_json::from_str("{}").unwrap();
    assert_eq!(config, TopNConfig::default());
}

#[test]
fn camel_case_fields_deserialize() {
    let config: TopNConfig = serde_json::from_str(
        r#"{
            "numValuesPerPass": 4096,
            "minTopNThreshold": 50,
            "failurePolicy": "lenient",
            "parallel": false,
            "timeoutMs": 250
        }"#,
    )
    .unwrap();

    assert_eq!(config.values_per_pass(3), Ok(NonZeroUsize::new(4096)));
    assert_eq!(config.min_top_n_threshold, 50);
    assert_eq!(config.failure_policy, FailurePolicy::Lenient);
    assert!(!config.parallel);
    assert_eq!(config.timeout(), Some(Duration::from_millis(250)));

    let json = serde_json::to_value(&config).unwrap();
    assert_eq!(json["failurePolicy"], "lenient");
    assert_eq!(json["numValuesPerPass"], 4096);
}

#[test]
fn zero_values_per_pass_is_rejected_before_any_scan() {
    let config: TopNConfig = serde_json::from_str(r#"{"numValuesPerPass": 0}"#).unwrap();
    assert_eq!(
        TopNRunner::new(config).unwrap_err(),
        TopNError::InvalidScratchBound
    );
}

#[test]
fn unknown_failure_policy_does_not_parse() {
    assert!(serde_json::from_str::<TopNConfig>(r#"{"failurePolicy": "retry"}"#).is_err());
}

#[test]
fn env_overrides_apply_on_top_of_file_config() {
    std::env::set_var("FORMULA_TOPN_NUM_VALUES_PER_PASS", "128");
    std::env::set_var("FORMULA_TOPN_MIN_THRESHOLD", "not-a-number");
    let config = TopNConfig::default().with_env_overrides();
    std::env::remove_var("FORMULA_TOPN_NUM_VALUES_PER_PASS");
    std::env::remove_var("FORMULA_TOPN_MIN_THRESHOLD");

    assert_eq!(config.num_values_per_pass, Some(128));
    assert_eq!(config.min_top_n_threshold, 1000);
}
