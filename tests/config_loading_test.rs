/// Configuration files on disk, in each supported format
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;

use linkmirror::{Config, ConfigStore, FileConfigStore, ObservationMode};

#[test]
fn test_load_toml_file() {
	let dir = TempDir::new().unwrap();
	let path = dir.path().join("linkmirror.toml");
	fs::write(
		&path,
		r#"
enabled = true
run-once = true
cron = "0 3 * * *"
directories = """
/downloads/movies:/library/movies
/downloads/shows:/library/shows
"""
copy-mode = true
exclude-pattern = '\.(part|tmp)$'
max-size-mb = 4096
observation-mode = "fast"
"#,
	)
	.unwrap();

	let config = Config::load(&path).unwrap();
	assert!(config.enabled);
	assert!(config.run_once);
	assert_eq!(config.cron, "0 3 * * *");
	assert!(config.copy_mode);
	assert_eq!(config.observation_mode, ObservationMode::Fast);
	assert_eq!(config.max_size_bytes(), Some(4096 * 1024 * 1024));
	// Unset keys keep their defaults
	assert_eq!(config.startup_delay(), Duration::from_secs(5));

	let mappings = config.mappings();
	assert_eq!(mappings.len(), 2);
	let movies = mappings.get(&PathBuf::from("/downloads/movies")).unwrap();
	assert_eq!(movies.destination, Some(PathBuf::from("/library/movies")));
}

#[test]
fn test_load_json5_file() {
	let dir = TempDir::new().unwrap();
	let path = dir.path().join("linkmirror.json5");
	fs::write(
		&path,
		r#"{
			// comments are allowed here
			"enabled": true,
			"directories": "/in:/out",
			"media-extensions": ["mkv", "webm"],
			"poll-interval-secs": 0,
		}"#,
	)
	.unwrap();

	let config = Config::load(&path).unwrap();
	assert!(config.enabled);
	assert_eq!(config.media_extensions, vec!["mkv".to_string(), "webm".to_string()]);
	// Zero would spin; clamp to one second
	assert_eq!(config.poll_interval(), Duration::from_secs(1));
}

#[test]
fn test_invalid_file_is_config_error() {
	let dir = TempDir::new().unwrap();
	let path = dir.path().join("broken.toml");
	fs::write(&path, "enabled = \"maybe\"").unwrap();
	assert!(matches!(Config::load(&path), Err(linkmirror::MirrorError::InvalidConfig { .. })));

	let missing = dir.path().join("missing.toml");
	assert!(Config::load(&missing).is_err());
}

#[test]
fn test_file_store_round_trips_run_once() {
	let dir = TempDir::new().unwrap();
	for name in ["linkmirror.toml", "linkmirror.json"] {
		let path = dir.path().join(name);
		let config = Config {
			run_once: true,
			directories: "/a:/b".into(),
			..Default::default()
		};
		config.save(&path).unwrap();
		assert!(Config::load(&path).unwrap().run_once);

		let store = FileConfigStore::new(&path);
		store.save(&Config { run_once: false, ..config.clone() }).unwrap();
		let reloaded = Config::load(&path).unwrap();
		assert!(!reloaded.run_once);
		assert_eq!(reloaded.directories, "/a:/b");
	}
}
