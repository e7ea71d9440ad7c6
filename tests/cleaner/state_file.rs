use std::fs;

use cleanbot::cleaner::RetentionStore;
use cleanbot::transport::ChannelId;
use tempfile::TempDir;

#[test]
fn state_file_uses_string_keys_and_time_to_keep() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("cleaner_state.json");
    let store = RetentionStore::load(path.clone(), 24);
    store.enable(ChannelId(1_234_567_890_123_456_789));
    store.set(ChannelId(1_234_567_890_123_456_789), 12).unwrap();

    let value: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(
        value,
        serde_json::json!({ "1234567890123456789": { "time_to_keep": 12 } })
    );
}

#[test]
fn existing_state_file_is_loaded() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("cleaner_state.json");
    fs::write(
        &path,
        r#"{ "111": { "time_to_keep": 24 }, "222": { "time_to_keep": 72 } }"#,
    )
    .unwrap();

    let store = RetentionStore::load(path, 24);
    assert_eq!(
        store.channels(),
        vec![(ChannelId(111), 24), (ChannelId(222), 72)]
    );
}

#[test]
fn truncated_state_file_starts_empty_and_is_rewritten() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("cleaner_state.json");
    fs::write(&path, r#"{ "111": { "time_to"#).unwrap();

    let store = RetentionStore::load(path.clone(), 24);
    assert!(store.is_empty());

    store.enable(ChannelId(5));
    let reloaded = RetentionStore::load(path, 24);
    assert_eq!(reloaded.channels(), vec![(ChannelId(5), 24)]);
}
