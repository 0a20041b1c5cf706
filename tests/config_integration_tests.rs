//! Integration tests for PersistenceManager and EngineSettings
//!
//! These tests verify:
//! - Backing file round trips, including empty sections
//! - Self-healing loads (missing, corrupt, alternate casing)
//! - Atomic writes and the write throttle
//! - Settings files, environment overrides and templates

use camino::Utf8PathBuf;
use proptest::prelude::*;
use serde_json::json;
use shadersync::{
    ConfigModel, EngineSettings, FlushOutcome, GameMetadataEntry, PersistenceManager,
    ResourceEntry,
};
use std::fs;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;

fn create_test_dir() -> (TempDir, Utf8PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let dir = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
    (temp_dir, dir)
}

fn sample_model() -> ConfigModel {
    ConfigModel::new(
        vec![
            ResourceEntry::new("WaterRamp").with_attribute("Path", json!("Textures/water.png")),
            ResourceEntry::new("Noise").with_attribute("Size", json!(256)),
        ],
        vec![GameMetadataEntry::new("GI").with_attribute("DisplayName", json!("Genshin"))],
    )
}

#[test]
fn test_round_trip_through_fresh_manager() {
    let (_temp_dir, dir) = create_test_dir();
    let path = dir.join("nested").join("config.json");

    let writer = PersistenceManager::new(&path, Duration::from_secs(10));
    writer.flush(&sample_model(), Instant::now()).unwrap();

    let reader = PersistenceManager::new(&path, Duration::from_secs(10));
    assert_eq!(reader.load(), sample_model());
}

#[test]
fn test_round_trip_empty_model() {
    let (_temp_dir, dir) = create_test_dir();
    let path = dir.join("config.json");

    let manager = PersistenceManager::new(&path, Duration::from_secs(10));
    manager.flush(&ConfigModel::default(), Instant::now()).unwrap();

    let text = fs::read_to_string(&path).unwrap();
    assert!(text.contains("\"Resources\": []"));
    assert!(text.contains("\"GameMetadata\": []"));
    assert_eq!(
        PersistenceManager::new(&path, Duration::from_secs(10)).load(),
        ConfigModel::default()
    );
}

#[test]
fn test_missing_file_self_heals() {
    let (_temp_dir, dir) = create_test_dir();
    let path = dir.join("ShaderSync").join("config.json");

    let manager = PersistenceManager::new(&path, Duration::from_secs(10));
    let model = manager.load();

    assert!(model.is_empty());
    assert!(path.exists(), "fresh model should be persisted");
}

#[test]
fn test_corrupt_file_self_heals() {
    let (_temp_dir, dir) = create_test_dir();
    let path = dir.join("config.json");
    fs::write(&path, "{ \"Resources\": [ {").unwrap();

    let manager = PersistenceManager::new(&path, Duration::from_secs(10));
    assert!(manager.try_load().is_err());
    assert!(manager.load().is_empty());

    // The corrupt file was replaced by a readable one
    assert_eq!(manager.try_load().unwrap(), Some(ConfigModel::default()));
}

#[test]
fn test_load_accepts_lower_case_fields() {
    let (_temp_dir, dir) = create_test_dir();
    let path = dir.join("config.json");
    fs::write(
        &path,
        r#"{"resources":[
                {"key":"WaterRamp","Path":"Textures/water.png"},
                {"Key":"Noise","Size":256}
            ],
            "gameMetadata":[{"key":"GI","DisplayName":"Genshin"}]}"#,
    )
    .unwrap();

    let manager = PersistenceManager::new(&path, Duration::from_secs(10));
    assert_eq!(manager.load(), sample_model());
}

fn attribute_name() -> impl Strategy<Value = String> {
    "[a-zA-Z_][a-zA-Z0-9_]{0,8}".prop_filter("the key field is not an attribute", |name| {
        name != "Key" && name != "key"
    })
}

proptest! {
    #[test]
    fn prop_attribute_names_survive_file_round_trip(
        resource_attrs in proptest::collection::vec((attribute_name(), any::<i32>()), 0..6),
        game_attrs in proptest::collection::vec((attribute_name(), "[a-z ]{0,8}"), 0..6),
    ) {
        let (_temp_dir, dir) = create_test_dir();
        let path = dir.join("config.json");

        let resource = resource_attrs
            .iter()
            .fold(ResourceEntry::new("ramp"), |entry, (name, value)| {
                entry.with_attribute(name.as_str(), *value)
            });
        let game = game_attrs
            .iter()
            .fold(GameMetadataEntry::new("GI"), |entry, (name, value)| {
                entry.with_attribute(name.as_str(), value.as_str())
            });
        let model = ConfigModel::new(vec![resource], vec![game]);

        let writer = PersistenceManager::new(&path, Duration::from_secs(10));
        writer.flush(&model, Instant::now()).unwrap();

        let reader = PersistenceManager::new(&path, Duration::from_secs(10));
        let loaded = reader.load();
        prop_assert_eq!(&loaded, &model);

        let names: Vec<_> = loaded.resources[0].attributes.keys().cloned().collect();
        let expected: Vec<_> = model.resources[0].attributes.keys().cloned().collect();
        prop_assert_eq!(names, expected);
    }
}

#[test]
fn test_no_temp_file_left_behind() {
    let (_temp_dir, dir) = create_test_dir();
    let path = dir.join("config.json");

    let manager = PersistenceManager::new(&path, Duration::from_secs(10));
    manager.flush(&sample_model(), Instant::now()).unwrap();

    let names: Vec<String> = fs::read_dir(&dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["config.json".to_string()]);
}

#[test]
fn test_throttle_allows_one_write_per_interval() {
    let (_temp_dir, dir) = create_test_dir();
    let manager = PersistenceManager::new(dir.join("config.json"), Duration::from_secs(10));
    let model = Arc::new(sample_model());
    let t0 = Instant::now();

    // Update at t=0: first write of the session
    manager.mark_pending(false);
    assert_eq!(manager.flush_pending(t0, || Arc::clone(&model)), FlushOutcome::Written);

    // Update at t=5: throttled
    manager.mark_pending(false);
    assert_eq!(
        manager.flush_pending(t0 + Duration::from_secs(5), || Arc::clone(&model)),
        FlushOutcome::Throttled
    );
    assert!(manager.has_pending());

    // t=10: written
    assert_eq!(
        manager.flush_pending(t0 + Duration::from_secs(10), || Arc::clone(&model)),
        FlushOutcome::Written
    );
    assert!(!manager.has_pending());
    assert_eq!(
        manager.flush_pending(t0 + Duration::from_secs(11), || Arc::clone(&model)),
        FlushOutcome::Idle
    );
}

#[test]
fn test_settings_defaults_without_file() {
    let (_temp_dir, dir) = create_test_dir();

    let settings =
        EngineSettings::load_with_env(dir.join("missing.yaml"), Some(config::Map::new())).unwrap();

    assert_eq!(settings, EngineSettings::default());
    assert_eq!(settings.write_throttle(), Duration::from_secs(10));
    assert_eq!(settings.reconnect_backoff(), Duration::from_secs(5));
}

#[test]
fn test_settings_file_and_env_override() {
    let (_temp_dir, dir) = create_test_dir();
    let path = dir.join("shadersync.yaml");
    fs::write(
        &path,
        "endpoint: ws://config.example:9000/live\nwrite_throttle_secs: 30\nauto_connect: false\n",
    )
    .unwrap();

    let mut env = config::Map::new();
    env.insert("SHADERSYNC_WRITE_THROTTLE_SECS".to_string(), "20".to_string());

    let settings = EngineSettings::load_with_env(&path, Some(env)).unwrap();

    assert_eq!(settings.endpoint, "ws://config.example:9000/live");
    assert_eq!(settings.write_throttle_secs, 20);
    assert!(!settings.auto_connect);
    assert_eq!(settings.poll_interval_secs, 10);
}

#[test]
fn test_settings_template_round_trip() {
    let (_temp_dir, dir) = create_test_dir();
    let path = dir.join("conf").join("shadersync.yaml");

    let settings = EngineSettings {
        endpoint: "ws://localhost:1234/cfg".to_string(),
        reconnect_backoff_secs: 2,
        ..EngineSettings::default()
    };
    settings.write_template(&path).unwrap();

    let loaded = EngineSettings::load_with_env(&path, Some(config::Map::new())).unwrap();
    assert_eq!(loaded, settings);
}

#[test]
fn test_settings_zero_values_fall_back() {
    let (_temp_dir, dir) = create_test_dir();
    let path = dir.join("shadersync.yaml");
    fs::write(&path, "reconnect_backoff_secs: 0\nlog_queue_capacity: 0\n").unwrap();

    let settings = EngineSettings::load_with_env(&path, Some(config::Map::new())).unwrap();

    assert_eq!(settings.reconnect_backoff_secs, 5);
    assert_eq!(settings.log_queue_capacity, 1024);
}

#[test]
fn test_invalid_settings_yaml_is_an_error() {
    let (_temp_dir, dir) = create_test_dir();
    let path = dir.join("shadersync.yaml");
    fs::write(&path, "write_throttle_secs: [not, a, number]\n").unwrap();

    assert!(EngineSettings::load_with_env(&path, Some(config::Map::new())).is_err());
}
