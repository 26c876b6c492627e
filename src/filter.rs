//! Skip rules applied to every event before it can mutate anything

use regex::{Regex, RegexBuilder};
use std::fmt;
use std::fs;
use std::path::Path;

use crate::config::Config;
use crate::event::SyncEvent;
use crate::logging::*;

/// Why an event was turned away
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
	/// Path is gone (or not visible yet) and the event is not a deletion
	Missing,

	/// File is larger than the configured threshold
	TooLarge { size: u64, limit: u64 },

	/// Path matches the exclude pattern
	Excluded { pattern: String },
}

impl fmt::Display for RejectReason {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			RejectReason::Missing => write!(f, "file does not exist"),
			RejectReason::TooLarge { size, limit } => {
				write!(f, "file size {} exceeds limit {}", size, limit)
			}
			RejectReason::Excluded { pattern } => write!(f, "matches exclude pattern {}", pattern),
		}
	}
}

/// Result of running an event through the filter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
	Admit,
	Reject(RejectReason),
}

impl Admission {
	pub fn is_admitted(&self) -> bool {
		matches!(self, Admission::Admit)
	}
}

/// Compiled exclude pattern
#[derive(Debug, Clone)]
enum ExcludeMatcher {
	Regex(Regex),
	/// Fallback when the pattern is not a valid regex; lowercased
	Substring(String),
}

impl ExcludeMatcher {
	fn compile(pattern: &str) -> Self {
		match RegexBuilder::new(pattern).case_insensitive(true).build() {
			Ok(re) => ExcludeMatcher::Regex(re),
			Err(e) => {
				warn!("Exclude pattern {:?} is not a valid regex ({}), matching it literally", pattern, e);
				ExcludeMatcher::Substring(pattern.to_lowercase())
			}
		}
	}

	fn is_match(&self, path: &str) -> bool {
		match self {
			ExcludeMatcher::Regex(re) => re.is_match(path),
			ExcludeMatcher::Substring(s) => path.to_lowercase().contains(s.as_str()),
		}
	}
}

/// Transient/size/exclude filter built from one configuration
#[derive(Debug, Clone)]
pub struct EventFilter {
	max_size: Option<u64>,
	exclude: Option<(String, ExcludeMatcher)>,
}

impl EventFilter {
	pub fn new(max_size: Option<u64>, exclude_pattern: &str) -> Self {
		let exclude = (!exclude_pattern.is_empty())
			.then(|| (exclude_pattern.to_string(), ExcludeMatcher::compile(exclude_pattern)));
		EventFilter { max_size, exclude }
	}

	pub fn from_config(config: &Config) -> Self {
		Self::new(config.max_size_bytes(), &config.exclude_pattern)
	}

	/// Filter that admits anything that exists
	pub fn permissive() -> Self {
		EventFilter { max_size: None, exclude: None }
	}

	/// Run the checks in order, stopping at the first rejection
	pub fn admit(&self, event: &SyncEvent) -> Admission {
		let meta = fs::metadata(&event.source_path).ok();

		if meta.is_none() && !event.is_delete() {
			return Admission::Reject(RejectReason::Missing);
		}

		self.check_path(&event.source_path, meta.as_ref())
	}

	/// Size and exclude rules only, for files found by walking a tree
	pub fn admit_file(&self, path: &Path) -> Admission {
		let meta = fs::metadata(path).ok();
		self.check_path(path, meta.as_ref())
	}

	fn check_path(&self, path: &Path, meta: Option<&fs::Metadata>) -> Admission {
		if let (Some(limit), Some(meta)) = (self.max_size, meta) {
			if meta.len() > limit {
				return Admission::Reject(RejectReason::TooLarge { size: meta.len(), limit });
			}
		}

		if let Some((pattern, matcher)) = &self.exclude {
			if matcher.is_match(&path.to_string_lossy()) {
				return Admission::Reject(RejectReason::Excluded { pattern: pattern.clone() });
			}
		}

		Admission::Admit
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::event::SyncEventKind;
	use std::fs;
	use tempfile::TempDir;

	fn created(path: &Path, root: &Path) -> SyncEvent {
		SyncEvent::new(SyncEventKind::Created, path, root)
	}

	#[test]
	fn test_missing_file_rejected_unless_deleted() {
		let dir = TempDir::new().unwrap();
		let gone = dir.path().join("gone.mkv");
		let filter = EventFilter::permissive();

		assert_eq!(
			filter.admit(&created(&gone, dir.path())),
			Admission::Reject(RejectReason::Missing)
		);
		let deleted = SyncEvent::new(SyncEventKind::Deleted, &gone, dir.path());
		assert!(filter.admit(&deleted).is_admitted());
	}

	#[test]
	fn test_size_threshold() {
		let dir = TempDir::new().unwrap();
		let file = dir.path().join("big.mkv");
		fs::write(&file, vec![0u8; 2048]).unwrap();

		let filter = EventFilter::new(Some(1024), "");
		assert!(matches!(
			filter.admit(&created(&file, dir.path())),
			Admission::Reject(RejectReason::TooLarge { size: 2048, limit: 1024 })
		));

		// Truncated below the limit, the same file gets through
		fs::write(&file, vec![0u8; 512]).unwrap();
		assert!(filter.admit(&created(&file, dir.path())).is_admitted());
	}

	#[test]
	fn test_size_threshold_from_megabytes() {
		let config = Config { max_size_mb: 1, ..Default::default() };
		let dir = TempDir::new().unwrap();
		let file = dir.path().join("edge.bin");
		fs::write(&file, vec![0u8; 1024 * 1024]).unwrap();
		// Exactly at the limit is allowed
		assert!(EventFilter::from_config(&config).admit(&created(&file, dir.path())).is_admitted());
	}

	#[test]
	fn test_exclude_is_case_insensitive_search() {
		let dir = TempDir::new().unwrap();
		let file = dir.path().join("movie.mkv.TMP");
		fs::write(&file, b"x").unwrap();

		let filter = EventFilter::new(None, r"\.tmp$");
		assert!(matches!(
			filter.admit(&created(&file, dir.path())),
			Admission::Reject(RejectReason::Excluded { .. })
		));

		let filter = EventFilter::new(None, "sample");
		let sample = dir.path().join("Movie.SAMPLE.mkv");
		fs::write(&sample, b"x").unwrap();
		assert!(!filter.admit(&created(&sample, dir.path())).is_admitted());
	}

	#[test]
	fn test_exclude_applies_to_deletions() {
		let dir = TempDir::new().unwrap();
		let filter = EventFilter::new(None, r"\.part$");
		let event = SyncEvent::new(SyncEventKind::Deleted, dir.path().join("a.part"), dir.path());
		assert!(!filter.admit(&event).is_admitted());
	}

	#[test]
	fn test_invalid_regex_falls_back_to_substring() {
		let dir = TempDir::new().unwrap();
		let file = dir.path().join("a[b.mkv");
		fs::write(&file, b"x").unwrap();
		let filter = EventFilter::new(None, "A[B");
		assert!(!filter.admit_file(&file).is_admitted());
		assert!(filter.admit_file(&dir.path().join("ab.mkv")).is_admitted());
	}
}
