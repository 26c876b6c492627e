//! Error types for linkmirror operations

use std::error::Error;
use std::fmt;
use std::io;
use std::path::PathBuf;

/// Main error type for mirror operations
#[derive(Debug)]
pub enum MirrorError {
	/// Path arithmetic failed
	Path(PathError),

	/// Destination is the source itself or lives inside it
	NestedDestination { source: PathBuf, destination: PathBuf },

	/// A real directory sits where a file target should go
	TargetIsDirectory { path: PathBuf },

	/// I/O error on a specific path
	Io { path: PathBuf, source: io::Error },

	/// Watch session error (nested)
	Watch(WatchError),

	/// Invalid configuration
	InvalidConfig { message: String },

	/// Background scheduler could not be created or used
	Scheduler { message: String },

	/// Event handling panicked
	Panicked { message: String },
}

impl MirrorError {
	pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
		MirrorError::Io { path: path.into(), source }
	}

	/// True when the error only means the path vanished under us
	pub fn is_not_found(&self) -> bool {
		matches!(self, MirrorError::Io { source, .. } if source.kind() == io::ErrorKind::NotFound)
	}
}

impl fmt::Display for MirrorError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			MirrorError::Path(e) => write!(f, "Path error: {}", e),
			MirrorError::NestedDestination { source, destination } => {
				write!(
					f,
					"{} is inside the watched directory {}, cannot mirror",
					destination.display(),
					source.display()
				)
			}
			MirrorError::TargetIsDirectory { path } => {
				write!(f, "Target {} is a directory", path.display())
			}
			MirrorError::Io { path, source } => write!(f, "{}: {}", path.display(), source),
			MirrorError::Watch(e) => write!(f, "Watch error: {}", e),
			MirrorError::InvalidConfig { message } => {
				write!(f, "Invalid configuration: {}", message)
			}
			MirrorError::Scheduler { message } => write!(f, "Scheduler error: {}", message),
			MirrorError::Panicked { message } => write!(f, "Event handler panicked: {}", message),
		}
	}
}

impl Error for MirrorError {
	fn source(&self) -> Option<&(dyn Error + 'static)> {
		match self {
			MirrorError::Io { source, .. } => Some(source),
			MirrorError::Path(e) => Some(e),
			MirrorError::Watch(e) => Some(e),
			_ => None,
		}
	}
}

impl From<PathError> for MirrorError {
	fn from(e: PathError) -> Self {
		MirrorError::Path(e)
	}
}

impl From<WatchError> for MirrorError {
	fn from(e: WatchError) -> Self {
		MirrorError::Watch(e)
	}
}

/// A path that does not live under the root it was resolved against
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathError {
	pub path: PathBuf,
	pub root: PathBuf,
}

impl fmt::Display for PathError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{} is not under {}", self.path.display(), self.root.display())
	}
}

impl Error for PathError {}

/// Watch session startup errors
#[derive(Debug)]
pub enum WatchError {
	/// Native notification instance/watch limit reached
	ResourceExhausted { root: PathBuf, source: notify::Error },

	/// Observer could not be created or attached
	Observer { root: PathBuf, source: notify::Error },

	/// Session thread could not be spawned
	Spawn { root: PathBuf, source: io::Error },
}

impl WatchError {
	/// Classify a notify error raised while starting an observer
	pub fn from_notify(root: PathBuf, source: notify::Error) -> Self {
		if is_resource_exhausted(&source) {
			WatchError::ResourceExhausted { root, source }
		} else {
			WatchError::Observer { root, source }
		}
	}

	pub fn root(&self) -> &PathBuf {
		match self {
			WatchError::ResourceExhausted { root, .. }
			| WatchError::Observer { root, .. }
			| WatchError::Spawn { root, .. } => root,
		}
	}

	/// Host-side fix for exhausted inotify limits, if applicable
	pub fn remediation(&self) -> Option<&'static str> {
		match self {
			WatchError::ResourceExhausted { .. } => Some(
				"run the following on the host (not inside a container) and restart:\n\
				 echo fs.inotify.max_user_watches=524288 | sudo tee -a /etc/sysctl.conf\n\
				 echo fs.inotify.max_user_instances=524288 | sudo tee -a /etc/sysctl.conf\n\
				 sudo sysctl -p",
			),
			_ => None,
		}
	}
}

fn is_resource_exhausted(e: &notify::Error) -> bool {
	match &e.kind {
		notify::ErrorKind::MaxFilesWatch => true,
		#[cfg(unix)]
		notify::ErrorKind::Io(io) => {
			matches!(io.raw_os_error(), Some(code) if code == libc::EMFILE || code == libc::ENOSPC)
		}
		_ => false,
	}
}

impl fmt::Display for WatchError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			WatchError::ResourceExhausted { root, source } => {
				write!(f, "Notification limit reached while watching {}: {}", root.display(), source)
			}
			WatchError::Observer { root, source } => {
				write!(f, "Failed to watch {}: {}", root.display(), source)
			}
			WatchError::Spawn { root, source } => {
				write!(f, "Failed to spawn watch thread for {}: {}", root.display(), source)
			}
		}
	}
}

impl Error for WatchError {}


// vim: ts=4
