//! Link-or-copy decision and observation mode enums
//!
//! Each enum includes FromStr/Display for CLI and config parsing.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::str::FromStr;

// ============================================================================
// LINK ACTION
// ============================================================================

/// How a single source file is represented in the destination tree
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkAction {
	/// Symbolic link pointing back at the source file
	Link,

	/// Byte copy carrying permissions and timestamps
	Copy,
}

impl std::fmt::Display for LinkAction {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::Link => write!(f, "link"),
			Self::Copy => write!(f, "copy"),
		}
	}
}

/// Chooses between linking and copying based on file type
#[derive(Debug, Clone)]
pub struct LinkStrategy {
	copy_mode: bool,
	media: HashSet<String>,
	subtitles: HashSet<String>,
}

impl LinkStrategy {
	pub fn new<S: AsRef<str>>(copy_mode: bool, media: &[S], subtitles: &[S]) -> Self {
		LinkStrategy {
			copy_mode,
			media: normalize_extensions(media),
			subtitles: normalize_extensions(subtitles),
		}
	}

	/// Link everything, regardless of type
	pub fn link_all() -> Self {
		LinkStrategy { copy_mode: false, media: HashSet::new(), subtitles: HashSet::new() }
	}

	pub fn copy_mode(&self) -> bool {
		self.copy_mode
	}

	pub fn decide(&self, file: &Path) -> LinkAction {
		decide(file, self.copy_mode, &self.media, &self.subtitles)
	}
}

/// Decide the action for `file`
///
/// Without copy mode every file is linked. With copy mode only media and
/// subtitle files are linked; everything else (nfo, artwork, scripts) is
/// copied so consumers that cannot follow links still see it.
pub fn decide(
	file: &Path,
	copy_mode: bool,
	media: &HashSet<String>,
	subtitles: &HashSet<String>,
) -> LinkAction {
	if !copy_mode {
		return LinkAction::Link;
	}

	let ext = file.extension().map(|e| e.to_string_lossy().to_lowercase()).unwrap_or_default();
	if media.contains(&ext) || subtitles.contains(&ext) {
		LinkAction::Link
	} else {
		LinkAction::Copy
	}
}

/// Lowercase and strip the leading dot so ".MKV" and "mkv" compare equal
fn normalize_extensions<S: AsRef<str>>(exts: &[S]) -> HashSet<String> {
	exts.iter()
		.map(|e| e.as_ref().trim().trim_start_matches('.').to_lowercase())
		.filter(|e| !e.is_empty())
		.collect()
}

/// Default video container extensions
pub const DEFAULT_MEDIA_EXTENSIONS: &[&str] = &[
	"mp4", "mkv", "ts", "iso", "rmvb", "avi", "mov", "mpeg", "mpg", "wmv", "3gp", "asf", "m4v",
	"flv", "m2ts", "strm", "tp", "f4v",
];

/// Default subtitle extensions
pub const DEFAULT_SUBTITLE_EXTENSIONS: &[&str] = &["srt", "ass", "ssa", "sup"];

// ============================================================================
// OBSERVATION MODE
// ============================================================================

/// How a watch session learns about filesystem changes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ObservationMode {
	/// Periodic rescans; works on SMB/NFS/cloud mounts
	#[default]
	Compatibility,

	/// Native OS notifications (inotify, FSEvents, ReadDirectoryChangesW)
	Fast,
}

impl FromStr for ObservationMode {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_lowercase().as_str() {
			"compatibility" | "poll" | "polling" => Ok(Self::Compatibility),
			"fast" | "native" => Ok(Self::Fast),
			_ => Err(format!(
				"Unknown observation mode: {}. Valid options: compatibility, fast",
				s
			)),
		}
	}
}

impl std::fmt::Display for ObservationMode {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::Compatibility => write!(f, "compatibility"),
			Self::Fast => write!(f, "fast"),
		}
	}
}
