use super::*;

use std::{
    collections::HashMap,
    env,
    time::{SystemTime, UNIX_EPOCH},
};

fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let vars: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key| vars.get(key).cloned()
}

#[test]
fn defaults_are_valid() {
    let settings = Settings::default();
    assert_eq!(settings.page_count, 50);
    assert_eq!(settings.conflict_policy, ConflictPolicy::Overwrite);
    validate(&settings).expect("defaults validate");
}

#[test]
fn file_values_override_defaults() {
    let mut settings = Settings::default();
    apply_file(
        &mut settings,
        r#"
server_url = "https://admin.example.com/api"
page_count = 25
conflict_policy = "preserve-edits"
"#,
    )
    .expect("apply file");

    assert_eq!(settings.server_url, "https://admin.example.com/api");
    assert_eq!(settings.page_count, 25);
    assert_eq!(settings.conflict_policy, ConflictPolicy::PreserveEdits);
    assert_eq!(settings.request_timeout_secs, 30);
}

#[test]
fn file_conflict_policy_accepts_snake_case_and_rejects_unknown() {
    let mut settings = Settings::default();
    apply_file(&mut settings, "conflict_policy = \"preserve_edits\"").expect("apply file");
    assert_eq!(settings.conflict_policy, ConflictPolicy::PreserveEdits);

    assert!(apply_file(&mut settings, "conflict_policy = \"merge\"").is_err());
}

#[test]
fn unknown_file_keys_are_rejected() {
    let mut settings = Settings::default();
    assert!(apply_file(&mut settings, "bind_addr = \"0.0.0.0:1\"").is_err());
}

#[test]
fn app_prefixed_env_wins_over_plain_env() {
    let mut settings = Settings::default();
    apply_env(
        &mut settings,
        env_from(&[
            ("ADMIN_SERVER_URL", "http://plain:1"),
            ("APP__SERVER_URL", "http://prefixed:2"),
            ("APP__PAGE_COUNT", "10"),
            ("APP__CONFLICT_POLICY", "overwrite"),
        ]),
    )
    .expect("apply env");

    assert_eq!(settings.server_url, "http://prefixed:2");
    assert_eq!(settings.page_count, 10);
}

#[test]
fn malformed_env_page_count_is_an_error() {
    let mut settings = Settings::default();
    let err = apply_env(&mut settings, env_from(&[("APP__PAGE_COUNT", "many")]))
        .expect_err("must fail");
    assert!(err.to_string().contains("APP__PAGE_COUNT"));
}

#[test]
fn malformed_timeout_keeps_previous_value() {
    let mut settings = Settings::default();
    apply_env(
        &mut settings,
        env_from(&[("APP__REQUEST_TIMEOUT_SECS", "soon")]),
    )
    .expect("apply env");
    assert_eq!(settings.request_timeout_secs, 30);
}

#[test]
fn validate_rejects_bad_urls_and_zero_page_count() {
    let mut settings = Settings::default();
    settings.server_url = "ftp://example.com".into();
    assert!(validate(&settings).is_err());

    settings.server_url = "not a url".into();
    assert!(validate(&settings).is_err());

    let settings = Settings {
        page_count: 0,
        ..Settings::default()
    };
    assert!(validate(&settings).is_err());
}

#[test]
fn missing_config_file_falls_back_to_defaults() {
    let suffix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock")
        .as_nanos();
    let path = env::temp_dir().join(format!("admin_missing_{suffix}.toml"));

    let settings = load_settings(&path).expect("load settings");
    assert_eq!(settings.page_count, Settings::default().page_count);
}

#[test]
fn loads_settings_from_config_file() {
    let suffix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock")
        .as_nanos();
    let temp_root = env::temp_dir().join(format!("admin_config_test_{suffix}"));
    fs::create_dir_all(&temp_root).expect("temp root");
    let path = temp_root.join("admin.toml");
    fs::write(&path, "request_timeout_secs = 5\n").expect("write config");

    let settings = load_settings(&path).expect("load settings");
    assert_eq!(settings.request_timeout_secs, 5);

    fs::remove_dir_all(temp_root).expect("cleanup");
}
