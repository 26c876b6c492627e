//! Internal event shape and normalization of raw notify events

use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind};
use std::fmt;
use std::path::{Path, PathBuf};

/// What happened to a watched path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncEventKind {
	Created,
	Moved,
	Deleted,
}

impl fmt::Display for SyncEventKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			SyncEventKind::Created => write!(f, "created"),
			SyncEventKind::Moved => write!(f, "moved"),
			SyncEventKind::Deleted => write!(f, "deleted"),
		}
	}
}

/// A normalized change under one watched root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncEvent {
	pub kind: SyncEventKind,
	/// For moves this is the new location
	pub source_path: PathBuf,
	pub watched_root: PathBuf,
}

impl SyncEvent {
	pub fn new(
		kind: SyncEventKind,
		source_path: impl Into<PathBuf>,
		watched_root: impl Into<PathBuf>,
	) -> Self {
		SyncEvent { kind, source_path: source_path.into(), watched_root: watched_root.into() }
	}

	pub fn is_delete(&self) -> bool {
		self.kind == SyncEventKind::Deleted
	}
}

impl fmt::Display for SyncEvent {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{} {}", self.source_path.display(), self.kind)
	}
}

/// Turn one notify event into zero or more sync events
///
/// Only creations, renames and removals are of interest; content and
/// metadata modifications are dropped. A rename is split by side: the old
/// name is a deletion, the new name a move. Backends that cannot tell the
/// sides apart report `RenameMode::Any`, which is resolved by checking
/// whether the path still exists.
pub fn normalize(event: &Event, watched_root: &Path) -> Vec<SyncEvent> {
	let make = |kind: SyncEventKind, path: &PathBuf| SyncEvent::new(kind, path.clone(), watched_root);

	match &event.kind {
		EventKind::Create(_) => {
			event.paths.iter().map(|p| make(SyncEventKind::Created, p)).collect()
		}
		EventKind::Remove(_) => {
			event.paths.iter().map(|p| make(SyncEventKind::Deleted, p)).collect()
		}
		EventKind::Modify(ModifyKind::Name(mode)) => match mode {
			RenameMode::From => {
				event.paths.iter().map(|p| make(SyncEventKind::Deleted, p)).collect()
			}
			RenameMode::To => event.paths.iter().map(|p| make(SyncEventKind::Moved, p)).collect(),
			// Summary of a From/To pair that was already reported side by side
			RenameMode::Both => Vec::new(),
			_ => event
				.paths
				.iter()
				.map(|p| {
					if p.exists() {
						make(SyncEventKind::Moved, p)
					} else {
						make(SyncEventKind::Deleted, p)
					}
				})
				.collect(),
		},
		_ => Vec::new(),
	}
}
