use stockmeta::metadata::Creativity;
use stockmeta::settings::{AppSettings, SettingsError, SettingsStore, SETTINGS_KEY};
use tempfile::tempdir;

#[test]
fn missing_file_loads_defaults() {
    let dir = tempdir().unwrap();
    let store = SettingsStore::new(dir.path());

    assert_eq!(store.load(), AppSettings::default());
}

#[test]
fn corrupt_file_loads_defaults() {
    let dir = tempdir().unwrap();
    let store = SettingsStore::new(dir.path());
    std::fs::write(store.path(), "{ not json").unwrap();

    assert_eq!(store.load(), AppSettings::default());
}

#[test]
fn credentials_keep_insertion_order_and_reject_duplicates() {
    let dir = tempdir().unwrap();
    let store = SettingsStore::new(dir.path().join("nested"));

    store.add_credential("key-one-123456", Some("primary".into())).unwrap();
    store.add_credential(" key-two-123456 ", None).unwrap();

    let err = store.add_credential("key-one-123456", None).unwrap_err();
    assert!(matches!(err, SettingsError::DuplicateKey(_)));
    assert!(!err.to_string().contains("key-one-123456"));
    assert!(matches!(
        store.add_credential("   ", None),
        Err(SettingsError::EmptyKey)
    ));

    let loaded = store.load();
    let keys: Vec<&str> = loaded.api_keys.iter().map(|c| c.key.as_str()).collect();
    assert_eq!(keys, vec!["key-one-123456", "key-two-123456"]);
    assert_eq!(loaded.api_keys[0].label.as_deref(), Some("primary"));

    store.remove_credential("key-one-123456").unwrap();
    assert_eq!(store.load().api_keys.len(), 1);
    assert!(matches!(
        store.remove_credential("key-one-123456"),
        Err(SettingsError::UnknownKey(_))
    ));
}

#[test]
fn update_persists_and_leaves_older_files_alone() {
    let dir = tempdir().unwrap();
    let old = dir.path().join("stockmeta_settings_v1.json");
    std::fs::write(&old, "{\"legacy\": true}").unwrap();
    let store = SettingsStore::new(dir.path());

    store
        .update(|s| {
            s.title_length = 10;
            s.creativity_level = Creativity::Precise;
        })
        .unwrap();

    let reloaded = SettingsStore::new(dir.path()).load();
    assert_eq!(reloaded.title_length, 10);
    assert_eq!(reloaded.generation_config().creativity, Creativity::Precise);
    assert!(store.path().ends_with(format!("{SETTINGS_KEY}.json")));
    assert_eq!(std::fs::read_to_string(old).unwrap(), "{\"legacy\": true}");
}
