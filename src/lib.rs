//! # linkmirror - Symlink/Copy Mirrors of Directory Trees
//!
//! linkmirror watches source directories and keeps a destination tree for
//! each of them in sync: media files appear as symbolic links pointing back
//! at the source, everything else as a symlink or (in copy mode) a real
//! copy with preserved timestamps. Deletions propagate to every
//! destination. A full resync can run once at startup, periodically on a
//! cron schedule, or on remote request.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use linkmirror::{Config, SyncEngine};
//!
//! let config = Config { directories: "/downloads:/library".into(), ..Default::default() };
//! let engine = SyncEngine::default();
//! engine.apply_config(config.mappings(), config.clone());
//! let report = engine.resync_all();
//! println!("Mirrored {} files", report.materialized);
//! ```
//!
//! ## Running as a service
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use linkmirror::{FileConfigStore, LogNotifier, MirrorService, Config};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let path = std::path::Path::new("linkmirror.toml");
//!     let service = MirrorService::new(
//!         Arc::new(FileConfigStore::new(path)),
//!         Arc::new(LogNotifier),
//!     )?;
//!     service.init(Config::load(path)?)?;
//!     tokio::signal::ctrl_c().await?;
//!     service.stop();
//!     Ok(())
//! }
//! ```

pub mod callbacks;
pub mod config;
pub mod delete;
pub mod engine;
pub mod error;
pub mod event;
pub mod filter;
pub mod logging;
pub mod mapping;
pub mod materialize;
pub mod path;
pub mod scheduler;
pub mod service;
pub mod strategy;
pub mod watch;

// Re-export commonly used types and functions
pub use callbacks::{LogNotifier, MemoryNotifier, NoNotifier, Notification, Notifier};
pub use config::{Config, ConfigStore, FileConfigStore, MemoryConfigStore};
pub use engine::{ApplyReport, ResyncReport, SyncEngine};
pub use error::{MirrorError, PathError, WatchError};
pub use event::{SyncEvent, SyncEventKind};
pub use mapping::{DirectoryMapping, MappingTable};
pub use service::{MirrorService, RemoteCommand};
pub use strategy::{LinkAction, LinkStrategy, ObservationMode};

// vim: ts=4
