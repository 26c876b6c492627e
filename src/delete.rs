//! Propagating source deletions into every destination tree

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::MirrorError;
use crate::logging::*;
use crate::mapping::MappingTable;
use crate::path::{relativize, resolve_target};

/// Remove the counterpart of `deleted` from every configured destination
///
/// The relative path is taken against `watched_root` and applied to every
/// destination in the table, not only the one paired with that root.
/// Missing targets are skipped. A real directory target is first cleared
/// of links pointing into `deleted` (and of subdirectories that end up
/// empty), then removed only when empty, since destinations may be shared
/// between sources.
///
/// # Returns
/// The target paths that were actually removed
pub fn propagate_delete(
	deleted: &Path,
	watched_root: &Path,
	table: &MappingTable,
) -> Result<Vec<PathBuf>, MirrorError> {
	let relative = relativize(deleted, watched_root)?;
	let mut removed = Vec::new();

	for destination in table.destinations() {
		let target = resolve_target(&relative, destination);
		if remove_target(&target, deleted)? {
			info!("Deleted {}", target.display());
			removed.push(target);
		}
	}

	Ok(removed)
}

fn remove_target(target: &Path, deleted: &Path) -> Result<bool, MirrorError> {
	let meta = match fs::symlink_metadata(target) {
		Ok(m) => m,
		Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
		Err(e) => return Err(MirrorError::io(target, e)),
	};

	if meta.is_dir() {
		let pruned = prune_links_into(target, deleted);
		if pruned > 0 {
			info!("Removed {} dangling link(s) below {}", pruned, target.display());
		}
	}

	let result = if meta.is_dir() { fs::remove_dir(target) } else { fs::remove_file(target) };

	match result {
		Ok(()) => Ok(true),
		Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
		Err(e) if meta.is_dir() && is_not_empty(&e) => {
			warn!("{} is not empty, leaving it in place", target.display());
			Ok(false)
		}
		Err(e) => Err(MirrorError::io(target, e)),
	}
}

/// Remove links below `dir` that point into `deleted`, then the
/// subdirectories left empty; directory links are not followed
///
/// # Returns
/// Number of links removed
fn prune_links_into(dir: &Path, deleted: &Path) -> usize {
	let entries = match fs::read_dir(dir) {
		Ok(e) => e,
		Err(e) => {
			debug!("Cannot read {}: {}", dir.display(), e);
			return 0;
		}
	};

	let mut removed = 0;
	for entry in entries.flatten() {
		let path = entry.path();
		let meta = match fs::symlink_metadata(&path) {
			Ok(m) => m,
			Err(_) => continue,
		};

		if meta.file_type().is_symlink() {
			let points_into = fs::read_link(&path).map(|t| t.starts_with(deleted)).unwrap_or(false);
			if points_into {
				match fs::remove_file(&path) {
					Ok(()) => removed += 1,
					Err(e) => debug!("Cannot remove {}: {}", path.display(), e),
				}
			}
		} else if meta.is_dir() {
			removed += prune_links_into(&path, deleted);
			// Fails harmlessly when something else still lives there
			let _ = fs::remove_dir(&path);
		}
	}
	removed
}

fn is_not_empty(e: &io::Error) -> bool {
	#[cfg(unix)]
	{
		if e.raw_os_error() == Some(libc::ENOTEMPTY) {
			return true;
		}
	}
	e.kind() == io::ErrorKind::DirectoryNotEmpty
}
