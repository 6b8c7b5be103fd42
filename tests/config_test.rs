//! Configuration builder, JSON file source and reload

mod common;

use kodegen_tools_veracity::config::{AppConfig, ConfigHandle, ConfigLoader, SearchProvider, WireStyle};

#[test]
fn defaults_are_usable_without_a_file() {
    let config = AppConfig::default();
    assert_eq!(config.reasoning.wire_style, WireStyle::Sdk);
    assert!(config.reasoning.max_rounds >= 1);
    assert!(config.acquisition.block_images);
    assert!(config.acquisition.headless);
    assert_eq!(config.search.provider, SearchProvider::Api);
}

#[test]
fn builder_clamps_rounds_and_sets_fields() {
    let config = AppConfig::builder()
        .max_rounds(0)
        .model("local-model")
        .search_provider(SearchProvider::Disabled)
        .headless(false)
        .build();

    assert_eq!(config.reasoning.max_rounds, 1);
    assert_eq!(config.reasoning.model, "local-model");
    assert_eq!(config.search.provider, SearchProvider::Disabled);
    assert!(!config.acquisition.headless);
}

#[test]
fn partial_file_keeps_other_defaults() -> anyhow::Result<()> {
    let dir = common::create_test_dir()?;
    let path = dir.path().join("veracity.json");
    std::fs::write(
        &path,
        r#"{"reasoning": {"wire_style": "raw_http", "model": "file-model"}}"#,
    )?;

    let config = ConfigLoader::File(path).load()?;
    assert_eq!(config.reasoning.wire_style, WireStyle::RawHttp);
    assert_eq!(config.reasoning.model, "file-model");
    assert_eq!(config.reasoning.auth_header, "Authorization");
    assert_eq!(config.search.count, 8);
    Ok(())
}

#[test]
fn invalid_file_is_an_error() -> anyhow::Result<()> {
    let dir = common::create_test_dir()?;
    let path = dir.path().join("broken.json");
    std::fs::write(&path, "{ not json")?;

    let err = ConfigLoader::File(path).load().expect_err("invalid JSON");
    assert!(format!("{err:#}").contains("Invalid JSON"));
    Ok(())
}

#[test]
fn reload_picks_up_file_changes() -> anyhow::Result<()> {
    let dir = common::create_test_dir()?;
    let path = dir.path().join("veracity.json");
    std::fs::write(&path, r#"{"reasoning": {"model": "first"}}"#)?;

    let handle = ConfigHandle::new(ConfigLoader::File(path.clone()))?;
    let before = handle.get();
    assert_eq!(before.reasoning.model, "first");

    std::fs::write(&path, r#"{"reasoning": {"model": "second"}}"#)?;
    handle.reload()?;
    assert_eq!(handle.get().reasoning.model, "second");
    // Earlier snapshots are unaffected
    assert_eq!(before.reasoning.model, "first");
    Ok(())
}

#[test]
fn failed_reload_keeps_previous_snapshot() -> anyhow::Result<()> {
    let dir = common::create_test_dir()?;
    let path = dir.path().join("veracity.json");
    std::fs::write(&path, r#"{"reasoning": {"model": "good"}}"#)?;

    let handle = ConfigHandle::new(ConfigLoader::File(path.clone()))?;
    std::fs::write(&path, "garbage")?;

    assert!(handle.reload().is_err());
    assert_eq!(handle.get().reasoning.model, "good");
    Ok(())
}
