use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use mediavault::config::Config;
use std::fs;
use std::path::PathBuf;
use tempfile::tempdir;

#[test]
fn test_config_load_defaults() {
    // Figment without Env so other tests' variables do not leak in.
    let config: Config = Figment::from(Serialized::defaults(Config::default()))
        .extract()
        .unwrap();
    assert_eq!(config, Config::default());
    assert!(config.recurse);
    assert_eq!(config.sample_chunks, 10);
}

#[test]
fn test_config_load_from_env() {
    std::env::set_var("MEDIAVAULT_THREADS", "6");
    std::env::set_var("MEDIAVAULT_SAMPLE_CHUNKS", "4");
    std::env::set_var("MEDIAVAULT_RECURSE", "false");

    let config: Config = Figment::from(Serialized::defaults(Config::default()))
        .merge(Env::prefixed("MEDIAVAULT_").split("__"))
        .extract()
        .unwrap();

    assert_eq!(config.threads, Some(6));
    assert_eq!(config.sample_chunks, 4);
    assert!(!config.recurse);

    std::env::remove_var("MEDIAVAULT_THREADS");
    std::env::remove_var("MEDIAVAULT_SAMPLE_CHUNKS");
    std::env::remove_var("MEDIAVAULT_RECURSE");
}

#[test]
fn test_config_load_from_toml() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(
        &path,
        r#"
archive_root = "/srv/photos"
sync_targets = ["/mnt/usb1", "/mnt/usb2"]
temp_dir_name = ".work"
small_file_threshold = 1048576
"#,
    )
    .unwrap();

    let config = Config::try_load(Some(&path)).unwrap();

    assert_eq!(config.archive_root, Some(PathBuf::from("/srv/photos")));
    assert_eq!(
        config.sync_targets,
        vec![PathBuf::from("/mnt/usb1"), PathBuf::from("/mnt/usb2")]
    );
    assert_eq!(config.temp_dir_name, ".work");
    assert_eq!(config.small_file_threshold, 1_048_576);
    assert_eq!(config.hasher().small_file_threshold(), 1_048_576);
}

#[test]
fn test_config_save_toml() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.toml");
    let config = Config {
        archive_root: Some(PathBuf::from("/srv/photos")),
        threads: Some(2),
        ..Config::default()
    };

    let written = config.save(Some(&path)).unwrap();
    assert_eq!(written, path);

    let saved = fs::read_to_string(&path).unwrap();
    assert!(saved.contains("archive_root = \"/srv/photos\""));
    assert!(saved.contains("threads = 2"));
    assert!(saved.contains("recurse = true"));
}

#[test]
fn test_config_invalid_value_is_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, "sample_chunks = \"many\"").unwrap();

    let result: Result<Config, _> = Figment::from(Serialized::defaults(Config::default()))
        .merge(Toml::file(&path))
        .extract();
    assert!(result.is_err());
    assert!(Config::try_load(Some(&path)).is_err());
}

#[test]
fn test_config_load_falls_back_to_defaults() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, "this is not toml [").unwrap();

    let config = Config::load(Some(&path));
    assert_eq!(config.archive_root, None);
    assert_eq!(config.temp_dir_name, Config::default().temp_dir_name);
}
