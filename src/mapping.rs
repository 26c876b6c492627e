//! Source → destination directory mapping table

use std::path::{Path, PathBuf};

use crate::error::MirrorError;

/// One watched source tree and the tree it is mirrored into
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryMapping {
	pub source: PathBuf,
	pub destination: Option<PathBuf>,
}

impl DirectoryMapping {
	pub fn new(source: impl Into<PathBuf>, destination: Option<impl Into<PathBuf>>) -> Self {
		DirectoryMapping { source: source.into(), destination: destination.map(Into::into) }
	}

	/// Reject destinations equal to or nested inside the source
	pub fn validate(&self) -> Result<(), MirrorError> {
		match &self.destination {
			Some(dest) if dest.starts_with(&self.source) => Err(MirrorError::NestedDestination {
				source: self.source.clone(),
				destination: dest.clone(),
			}),
			_ => Ok(()),
		}
	}
}

/// Ordered mapping keyed by source path
///
/// Order is the order of first appearance in the configuration text; it only
/// affects resync iteration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MappingTable {
	entries: Vec<DirectoryMapping>,
}

impl MappingTable {
	pub fn new() -> Self {
		Self::default()
	}

	/// Insert or replace the mapping for `mapping.source`
	pub fn insert(&mut self, mapping: DirectoryMapping) {
		match self.entries.iter_mut().find(|m| m.source == mapping.source) {
			Some(existing) => existing.destination = mapping.destination,
			None => self.entries.push(mapping),
		}
	}

	pub fn get(&self, source: &Path) -> Option<&DirectoryMapping> {
		self.entries.iter().find(|m| m.source == source)
	}

	pub fn iter(&self) -> impl Iterator<Item = &DirectoryMapping> {
		self.entries.iter()
	}

	/// All configured destination roots
	pub fn destinations(&self) -> impl Iterator<Item = &PathBuf> {
		self.entries.iter().filter_map(|m| m.destination.as_ref())
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	/// Split into the valid table and the per-mapping rejections
	pub fn validated(self) -> (MappingTable, Vec<MirrorError>) {
		let mut valid = MappingTable::new();
		let mut rejected = Vec::new();
		for mapping in self.entries {
			match mapping.validate() {
				Ok(()) => valid.entries.push(mapping),
				Err(e) => rejected.push(e),
			}
		}
		(valid, rejected)
	}
}

impl FromIterator<DirectoryMapping> for MappingTable {
	fn from_iter<I: IntoIterator<Item = DirectoryMapping>>(iter: I) -> Self {
		let mut table = MappingTable::new();
		for mapping in iter {
			table.insert(mapping);
		}
		table
	}
}

/// Parse newline separated `source[:destination]` entries
///
/// With `windows` set, a line holding more than one `:` is read as
/// `X:\src:Y:\dst` so that drive letters survive the split.
pub fn parse_mapping_text(text: &str, windows: bool) -> MappingTable {
	text.lines().filter_map(|line| parse_mapping_line(line, windows)).collect()
}

/// Parse with the separator rules of the running platform
pub fn parse_mapping_text_native(text: &str) -> MappingTable {
	parse_mapping_text(text, cfg!(windows))
}

fn parse_mapping_line(line: &str, windows: bool) -> Option<DirectoryMapping> {
	let line = line.trim();
	if line.is_empty() {
		return None;
	}

	let parts: Vec<&str> = line.split(':').collect();
	let (source, destination) = if windows {
		if parts.len() > 3 {
			(format!("{}:{}", parts[0], parts[1]), Some(format!("{}:{}", parts[2], parts[3])))
		} else {
			(line.to_string(), None)
		}
	} else if parts.len() > 1 {
		(parts[0].to_string(), Some(parts[1].to_string()))
	} else {
		(line.to_string(), None)
	};

	let destination = destination.map(|d| d.trim().to_string()).filter(|d| !d.is_empty());
	Some(DirectoryMapping::new(source.trim(), destination))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_parse_unix_lines() {
		let table = parse_mapping_text("/downloads:/media/links\n\n/incoming\n", false);
		assert_eq!(table.len(), 2);
		let first = table.get(Path::new("/downloads")).unwrap();
		assert_eq!(first.destination, Some(PathBuf::from("/media/links")));
		let second = table.get(Path::new("/incoming")).unwrap();
		assert_eq!(second.destination, None);
	}

	#[test]
	fn test_parse_trims_crlf() {
		let table = parse_mapping_text("/a:/b\r\n  /c:/d  \r\n", false);
		assert_eq!(table.get(Path::new("/a")).unwrap().destination, Some(PathBuf::from("/b")));
		assert_eq!(table.get(Path::new("/c")).unwrap().destination, Some(PathBuf::from("/d")));
	}

	#[test]
	fn test_parse_windows_drive_letters() {
		let table = parse_mapping_text("C:\\Downloads:D:\\Links\nE:\\Only", true);
		let first = table.get(Path::new("C:\\Downloads")).unwrap();
		assert_eq!(first.destination, Some(PathBuf::from("D:\\Links")));
		assert_eq!(table.get(Path::new("E:\\Only")).unwrap().destination, None);
	}

	#[test]
	fn test_duplicate_source_keeps_first_position() {
		let table = parse_mapping_text("/a:/x\n/b:/y\n/a:/z", false);
		let order: Vec<_> = table.iter().map(|m| m.source.clone()).collect();
		assert_eq!(order, vec![PathBuf::from("/a"), PathBuf::from("/b")]);
		assert_eq!(table.get(Path::new("/a")).unwrap().destination, Some(PathBuf::from("/z")));
	}

	#[test]
	fn test_empty_destination_is_none() {
		let table = parse_mapping_text("/a:", false);
		assert_eq!(table.get(Path::new("/a")).unwrap().destination, None);
	}

	#[test]
	fn test_validate_nested_destination() {
		let nested = DirectoryMapping::new("/data", Some("/data/mirror"));
		assert!(matches!(nested.validate(), Err(MirrorError::NestedDestination { .. })));

		let same = DirectoryMapping::new("/data", Some("/data"));
		assert!(same.validate().is_err());

		let sibling = DirectoryMapping::new("/data", Some("/data-mirror"));
		assert!(sibling.validate().is_ok());
	}

	#[test]
	fn test_validated_splits_table() {
		let table = parse_mapping_text("/a:/a/b\n/c:/d\n/e", false);
		let (valid, rejected) = table.validated();
		assert_eq!(valid.len(), 2);
		assert_eq!(rejected.len(), 1);
		assert!(valid.get(Path::new("/a")).is_none());
		assert_eq!(valid.destinations().count(), 1);
	}
}
