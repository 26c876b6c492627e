//! Path translation between source and destination trees

use std::path::{Path, PathBuf};

use crate::error::PathError;
use crate::mapping::MappingTable;

/// Strip `source_root` from `path`, yielding the tree-relative part
///
/// # Returns
/// `Err(PathError)` if `path` is not below `source_root`
pub fn relativize(path: &Path, source_root: &Path) -> Result<PathBuf, PathError> {
	path.strip_prefix(source_root).map(Path::to_path_buf).map_err(|_| PathError {
		path: path.to_path_buf(),
		root: source_root.to_path_buf(),
	})
}

/// Join a tree-relative path onto a destination root
pub fn resolve_target(relative: &Path, destination_root: &Path) -> PathBuf {
	destination_root.join(relative)
}

/// Check whether `path` lies in any configured destination tree
///
/// This is a plain substring test on the path strings, not an ancestry
/// check: `/media/links2/x` matches a destination of `/media/links`.
/// Callers tolerate those false positives.
pub fn is_inside_any_destination(path: &Path, table: &MappingTable) -> bool {
	let path = path.to_string_lossy();
	table.destinations().any(|dest| {
		let dest = dest.to_string_lossy();
		!dest.is_empty() && path.contains(dest.as_ref())
	})
}
