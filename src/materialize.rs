//! Creating the destination-side representation of source files

use filetime::FileTime;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::MirrorError;
use crate::logging::*;
use crate::mapping::{DirectoryMapping, MappingTable};
use crate::path::{is_inside_any_destination, relativize, resolve_target};
use crate::strategy::{LinkAction, LinkStrategy};

/// What `materialize` did for one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Materialized {
	Linked(PathBuf),
	Copied(PathBuf),
	/// Source vanished before we got to it
	Vanished,
	/// Source lives inside a destination tree
	InsideDestination,
	/// Mapping has nowhere to mirror into
	NoDestination,
}

impl Materialized {
	pub fn target(&self) -> Option<&Path> {
		match self {
			Materialized::Linked(p) | Materialized::Copied(p) => Some(p),
			_ => None,
		}
	}
}

/// Mirror one source file into the mapping's destination tree
///
/// Safe to repeat: an existing target (including a dangling link) is
/// removed and recreated. The replacement is not atomic; a crash in between
/// leaves the target missing until the next event or resync.
pub fn materialize(
	source_file: &Path,
	mapping: &DirectoryMapping,
	table: &MappingTable,
	strategy: &LinkStrategy,
) -> Result<Materialized, MirrorError> {
	if fs::metadata(source_file).is_err() {
		debug!("{} no longer exists, skipping", source_file.display());
		return Ok(Materialized::Vanished);
	}

	if is_inside_any_destination(source_file, table) {
		debug!("{} is inside a destination tree, skipping", source_file.display());
		return Ok(Materialized::InsideDestination);
	}

	let Some(destination) = &mapping.destination else {
		info!("{} has no destination configured, skipping {}", mapping.source.display(), source_file.display());
		return Ok(Materialized::NoDestination);
	};

	let relative = relativize(source_file, &mapping.source)?;
	let target = resolve_target(&relative, destination);

	if let Some(parent) = target.parent() {
		fs::create_dir_all(parent).map_err(|e| MirrorError::io(parent, e))?;
	}

	remove_existing(&target)?;

	match strategy.decide(source_file) {
		LinkAction::Link => {
			symlink_file(source_file, &target).map_err(|e| MirrorError::io(&target, e))?;
			info!("Linked {} -> {}", target.display(), source_file.display());
			Ok(Materialized::Linked(target))
		}
		LinkAction::Copy => {
			copy_with_times(source_file, &target)?;
			info!("Copied {} to {}", source_file.display(), target.display());
			Ok(Materialized::Copied(target))
		}
	}
}

/// Remove whatever file or link occupies `target`
fn remove_existing(target: &Path) -> Result<(), MirrorError> {
	match fs::symlink_metadata(target) {
		Ok(meta) if meta.is_dir() => {
			Err(MirrorError::TargetIsDirectory { path: target.to_path_buf() })
		}
		Ok(_) => match fs::remove_file(target) {
			Ok(()) => Ok(()),
			Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
			Err(e) => Err(MirrorError::io(target, e)),
		},
		Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
		Err(e) => Err(MirrorError::io(target, e)),
	}
}

#[cfg(unix)]
fn symlink_file(original: &Path, link: &Path) -> io::Result<()> {
	std::os::unix::fs::symlink(original, link)
}

#[cfg(windows)]
fn symlink_file(original: &Path, link: &Path) -> io::Result<()> {
	std::os::windows::fs::symlink_file(original, link)
}

/// Copy bytes and permission bits, then carry over access/modification times
fn copy_with_times(source: &Path, target: &Path) -> Result<(), MirrorError> {
	fs::copy(source, target).map_err(|e| MirrorError::io(target, e))?;
	let meta = fs::metadata(source).map_err(|e| MirrorError::io(source, e))?;
	filetime::set_file_times(
		target,
		FileTime::from_last_access_time(&meta),
		FileTime::from_last_modification_time(&meta),
	)
	.map_err(|e| MirrorError::io(target, e))
}

/// Recursively collect regular files below `root`
///
/// Directory symlinks are not descended into; file symlinks count as files.
/// Unreadable directories are logged and skipped.
pub fn walk_files(root: &Path, table: &MappingTable, out: &mut Vec<PathBuf>) {
	let entries = match fs::read_dir(root) {
		Ok(e) => e,
		Err(e) => {
			warn!("Cannot read directory {}: {}", root.display(), e);
			return;
		}
	};

	for entry_result in entries {
		let entry = match entry_result {
			Ok(e) => e,
			Err(e) => {
				debug!("Error reading directory entry: {}", e);
				continue;
			}
		};

		let path = entry.path();
		let meta = match fs::symlink_metadata(&path) {
			Ok(m) => m,
			Err(e) => {
				debug!("Cannot access {}: {}", path.display(), e);
				continue;
			}
		};

		if meta.is_dir() {
			// Overlapping mappings: never walk into our own output
			if !is_inside_any_destination(&path, table) {
				walk_files(&path, table, out);
			}
		} else if fs::metadata(&path).map(|m| m.is_file()).unwrap_or(false) {
			out.push(path);
		}
	}
}
