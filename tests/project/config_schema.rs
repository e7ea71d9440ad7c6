use cleanbot::config::Config;

#[test]
fn minimal_config_deserializes_with_defaults() {
    let toml = r#"
[discord]
bot_token = "abc"
"#;

    let parsed: Config = toml::from_str(toml).expect("minimal config should deserialize");

    assert_eq!(parsed.discord.bot_token, "abc");
    assert_eq!(parsed.command_prefix, "!");
    assert_eq!(parsed.moderator_roles, vec!["Admins", "Super Friends"]);
    assert_eq!(parsed.cleaner.interval_minutes, 15);
    assert_eq!(parsed.cleaner.default_retention_hours, 24);
    assert_eq!(parsed.cleaner.page_size, 100);
    assert_eq!(parsed.cleaner.max_scan_retries, 8);
    assert!(!parsed.cleaner.startup_delay);
    assert_eq!(parsed.commands.cooldown_secs, 10);
    assert_eq!(parsed.commands.help_cooldown_secs, 30);
}

#[test]
fn cleaner_table_overrides_are_applied() {
    let toml = r#"
command_prefix = "?"
moderator_roles = ["Janitors"]

[cleaner]
interval_minutes = 5
startup_delay = true
delete_pacing_ms = 250
"#;

    let parsed: Config = toml::from_str(toml).expect("cleaner config should deserialize");

    assert_eq!(parsed.command_prefix, "?");
    assert_eq!(parsed.moderator_roles, vec!["Janitors"]);
    assert_eq!(parsed.cleaner.interval_minutes, 5);
    assert!(parsed.cleaner.startup_delay);
    assert_eq!(parsed.cleaner.delete_pacing_ms, 250);
    assert_eq!(parsed.cleaner.scan_retry_base_ms, 2000);
    assert!(parsed.validate(false).is_ok());
    assert!(parsed.validate(true).is_err());
}

#[test]
fn invalid_page_size_fails_validation() {
    let toml = r#"
[discord]
bot_token = "abc"

[cleaner]
page_size = 500
"#;

    let parsed: Config = toml::from_str(toml).expect("config should deserialize");
    assert!(parsed.validate(true).is_err());
}
