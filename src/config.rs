//! Configuration for the mirror service
//!
//! The configuration is replaced wholesale on every update. Sources:
//! 1. Built-in defaults (Config::default())
//! 2. Config file (TOML, JSON or JSON5, chosen by extension)

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use crate::error::MirrorError;
use crate::mapping::{parse_mapping_text_native, MappingTable};
use crate::strategy::{
	LinkStrategy, ObservationMode, DEFAULT_MEDIA_EXTENSIONS, DEFAULT_SUBTITLE_EXTENSIONS,
};

// ============================================================================
// MAIN CONFIGURATION STRUCT
// ============================================================================

/// Effective configuration for one engine generation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Config {
	// ========================================================================
	// LIFECYCLE
	// ========================================================================
	/// Start watch sessions when the configuration is applied
	pub enabled: bool,

	/// Run one full resync shortly after applying, then clear this flag
	pub run_once: bool,

	/// Cron expression for periodic full resyncs (empty = none)
	pub cron: String,

	// ========================================================================
	// MIRRORING
	// ========================================================================
	/// Newline separated `source[:destination]` entries
	pub directories: String,

	/// Copy non-media files instead of linking them
	pub copy_mode: bool,

	/// Extensions linked even in copy mode (video containers)
	pub media_extensions: Vec<String>,

	/// Extensions linked even in copy mode (subtitles)
	pub subtitle_extensions: Vec<String>,

	// ========================================================================
	// FILTERING
	// ========================================================================
	/// Case-insensitive regex searched in the full event path
	pub exclude_pattern: String,

	/// Skip files larger than this many megabytes (0 = unlimited)
	pub max_size_mb: u64,

	// ========================================================================
	// OBSERVATION
	// ========================================================================
	/// Polling (compatibility) or native notifications (fast)
	pub observation_mode: ObservationMode,

	/// Rescan interval in compatibility mode
	pub poll_interval_secs: u64,

	/// Delay between applying the config and starting watch sessions
	pub startup_delay_secs: u64,

	/// Delay before the run-once resync fires
	pub run_once_delay_secs: u64,
}

impl Default for Config {
	fn default() -> Self {
		Config {
			enabled: false,
			run_once: false,
			cron: String::new(),

			directories: String::new(),
			copy_mode: false,
			media_extensions: DEFAULT_MEDIA_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
			subtitle_extensions: DEFAULT_SUBTITLE_EXTENSIONS
				.iter()
				.map(|s| s.to_string())
				.collect(),

			exclude_pattern: String::new(),
			max_size_mb: 0,

			observation_mode: ObservationMode::Compatibility,
			poll_interval_secs: 10,
			startup_delay_secs: 5,
			run_once_delay_secs: 3,
		}
	}
}

impl Config {
	/// Load from a file; `.json`/`.json5` are read as JSON5, anything else as TOML
	pub fn load(path: &Path) -> Result<Self, MirrorError> {
		let text = fs::read_to_string(path).map_err(|e| MirrorError::io(path, e))?;
		match extension_of(path).as_str() {
			"json" | "json5" => Self::from_json5(&text),
			_ => Self::from_toml(&text),
		}
	}

	pub fn from_toml(text: &str) -> Result<Self, MirrorError> {
		toml::from_str(text).map_err(|e| MirrorError::InvalidConfig { message: e.to_string() })
	}

	pub fn from_json5(text: &str) -> Result<Self, MirrorError> {
		json5::from_str(text).map_err(|e| MirrorError::InvalidConfig { message: e.to_string() })
	}

	/// Write back in the format implied by the extension
	pub fn save(&self, path: &Path) -> Result<(), MirrorError> {
		let text = match extension_of(path).as_str() {
			"json" | "json5" => serde_json::to_string_pretty(self)
				.map_err(|e| MirrorError::InvalidConfig { message: e.to_string() })?,
			_ => toml::to_string_pretty(self)
				.map_err(|e| MirrorError::InvalidConfig { message: e.to_string() })?,
		};
		fs::write(path, text).map_err(|e| MirrorError::io(path, e))
	}

	/// Parse the directory mapping text for this platform
	pub fn mappings(&self) -> MappingTable {
		parse_mapping_text_native(&self.directories)
	}

	pub fn link_strategy(&self) -> LinkStrategy {
		LinkStrategy::new(
			self.copy_mode,
			self.media_extensions.as_slice(),
			self.subtitle_extensions.as_slice(),
		)
	}

	/// Size threshold in bytes, None when unlimited
	pub fn max_size_bytes(&self) -> Option<u64> {
		(self.max_size_mb > 0).then(|| self.max_size_mb.saturating_mul(1024 * 1024))
	}

	pub fn poll_interval(&self) -> Duration {
		Duration::from_secs(self.poll_interval_secs.max(1))
	}

	pub fn startup_delay(&self) -> Duration {
		Duration::from_secs(self.startup_delay_secs)
	}

	pub fn run_once_delay(&self) -> Duration {
		Duration::from_secs(self.run_once_delay_secs)
	}
}

fn extension_of(path: &Path) -> String {
	path.extension().map(|e| e.to_string_lossy().to_lowercase()).unwrap_or_default()
}

// ============================================================================
// PERSISTENCE
// ============================================================================

/// Where the service writes configuration changes it makes itself
/// (clearing `run-once`)
pub trait ConfigStore: Send + Sync {
	fn save(&self, config: &Config) -> Result<(), MirrorError>;

	/// Persist `run-once = false` and nothing else
	///
	/// `applied` may carry runtime overrides that must not be written back;
	/// stores that can re-read their persisted form should start from that.
	fn clear_run_once(&self, applied: &Config) -> Result<(), MirrorError> {
		self.save(&Config { run_once: false, ..applied.clone() })
	}
}

/// Persist to the file the configuration was loaded from
#[derive(Debug, Clone)]
pub struct FileConfigStore {
	path: PathBuf,
}

impl FileConfigStore {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		FileConfigStore { path: path.into() }
	}

	pub fn path(&self) -> &Path {
		&self.path
	}
}

impl ConfigStore for FileConfigStore {
	fn save(&self, config: &Config) -> Result<(), MirrorError> {
		config.save(&self.path)
	}

	fn clear_run_once(&self, applied: &Config) -> Result<(), MirrorError> {
		let mut on_disk = match Config::load(&self.path) {
			Ok(c) => c,
			Err(e) if e.is_not_found() => applied.clone(),
			Err(e) => return Err(e),
		};
		on_disk.run_once = false;
		on_disk.save(&self.path)
	}
}

/// Keeps the last saved configuration in memory
#[derive(Debug, Default)]
pub struct MemoryConfigStore {
	saved: Mutex<Option<Config>>,
}

impl MemoryConfigStore {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn last_saved(&self) -> Option<Config> {
		self.saved.lock().unwrap_or_else(|e| e.into_inner()).clone()
	}
}

impl ConfigStore for MemoryConfigStore {
	fn save(&self, config: &Config) -> Result<(), MirrorError> {
		*self.saved.lock().unwrap_or_else(|e| e.into_inner()) = Some(config.clone());
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::TempDir;

	#[test]
	fn test_config_default() {
		let config = Config::default();
		assert!(!config.enabled);
		assert!(!config.copy_mode);
		assert_eq!(config.observation_mode, ObservationMode::Compatibility);
		assert_eq!(config.poll_interval(), Duration::from_secs(10));
		assert_eq!(config.startup_delay(), Duration::from_secs(5));
		assert!(config.media_extensions.iter().any(|e| e == "mkv"));
		assert_eq!(config.max_size_bytes(), None);
	}

	#[test]
	fn test_toml_kebab_case_keys() {
		let config = Config::from_toml(
			r#"
			enabled = true
			run-once = true
			copy-mode = true
			observation-mode = "fast"
			directories = "/downloads:/media/links"
			exclude-pattern = '\.tmp$'
			max-size-mb = 2
			cron = "0 3 * * *"
			"#,
		)
		.unwrap();
		assert!(config.enabled && config.run_once && config.copy_mode);
		assert_eq!(config.observation_mode, ObservationMode::Fast);
		assert_eq!(config.exclude_pattern, "\\.tmp$");
		assert_eq!(config.max_size_bytes(), Some(2 * 1024 * 1024));
		assert_eq!(config.mappings().len(), 1);
		// Untouched keys keep their defaults
		assert_eq!(config.poll_interval_secs, 10);
	}

	#[test]
	fn test_json5_config() {
		let config = Config::from_json5(
			r#"{
				// comments are fine in json5
				enabled: true,
				"observation-mode": "compatibility",
				"max-size-mb": 0,
			}"#,
		)
		.unwrap();
		assert!(config.enabled);
		assert_eq!(config.max_size_bytes(), None);
	}

	#[test]
	fn test_invalid_mode_rejected() {
		let err = Config::from_toml("observation-mode = \"turbo\"").unwrap_err();
		assert!(matches!(err, MirrorError::InvalidConfig { .. }));
	}

	#[test]
	fn test_save_and_reload_toml() {
		let dir = TempDir::new().unwrap();
		let path = dir.path().join("linkmirror.toml");
		let config = Config { run_once: true, directories: "/a:/b".to_string(), ..Default::default() };
		config.save(&path).unwrap();
		assert_eq!(Config::load(&path).unwrap(), config);
	}

	#[test]
	fn test_file_store_writes_json() {
		let dir = TempDir::new().unwrap();
		let store = FileConfigStore::new(dir.path().join("linkmirror.json"));
		let config = Config { enabled: true, ..Default::default() };
		store.save(&config).unwrap();
		assert_eq!(Config::load(store.path()).unwrap(), config);
	}

	#[test]
	fn test_clearing_run_once_keeps_file_settings() {
		let dir = TempDir::new().unwrap();
		let store = FileConfigStore::new(dir.path().join("linkmirror.toml"));
		let on_disk = Config { run_once: true, directories: "/a:/b".to_string(), ..Default::default() };
		store.save(&on_disk).unwrap();

		// What was applied carries a command-line override
		let applied = Config { observation_mode: ObservationMode::Fast, ..on_disk.clone() };
		store.clear_run_once(&applied).unwrap();

		let reloaded = Config::load(store.path()).unwrap();
		assert!(!reloaded.run_once);
		assert_eq!(reloaded.observation_mode, ObservationMode::Compatibility);
		assert_eq!(reloaded, Config { run_once: false, ..on_disk });
	}

	#[test]
	fn test_clearing_run_once_without_file() {
		let dir = TempDir::new().unwrap();
		let store = FileConfigStore::new(dir.path().join("linkmirror.toml"));
		store.clear_run_once(&Config { run_once: true, ..Default::default() }).unwrap();
		assert_eq!(Config::load(store.path()).unwrap(), Config::default());
	}

	#[test]
	fn test_memory_store() {
		let store = MemoryConfigStore::new();
		assert!(store.last_saved().is_none());
		store.save(&Config::default()).unwrap();
		assert_eq!(store.last_saved(), Some(Config::default()));
	}
}

// vim: ts=4
