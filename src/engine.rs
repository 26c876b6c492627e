//! Top-level coordinator: mapping table, watch sessions, full resyncs
//!
//! Every mutation, whether it comes from a watch session or from
//! `resync_all`, runs under one engine-wide mutex. Mutations are never
//! partitioned per directory or per file.
//!
//! The mapping table and configuration form an immutable snapshot that is
//! swapped only by `apply_config`, after all sessions have been stopped.
//!
//! Every snapshot install and every `stop` bumps a generation counter, and
//! `stop` also marks the engine halted until the next `apply_config`. Long
//! walks (resync, a directory moved in) re-check both under the mutation lock
//! before each file and bail out, so at most the file in hand is finished
//! after a stop.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Duration;

use crate::callbacks::{NoNotifier, Notification, Notifier};
use crate::config::Config;
use crate::delete::propagate_delete;
use crate::error::{MirrorError, WatchError};
use crate::event::{SyncEvent, SyncEventKind};
use crate::filter::{Admission, EventFilter};
use crate::logging::*;
use crate::mapping::{DirectoryMapping, MappingTable};
use crate::materialize::{materialize, walk_files};
use crate::strategy::LinkStrategy;
use crate::watch::{SessionState, SyncEventHandler, WatchOptions, WatchSession};

/// Outcome of `apply_config`
#[derive(Debug, Default)]
pub struct ApplyReport {
	/// Sources of the mappings that passed validation, in table order
	pub accepted: Vec<PathBuf>,
	/// One error per rejected mapping
	pub rejected: Vec<MirrorError>,
	pub sessions_started: usize,
}

/// Counters from one full resync
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ResyncReport {
	pub files_seen: usize,
	pub materialized: usize,
	pub skipped: usize,
	pub failed: usize,
}

/// Everything derived from one configuration generation
struct Snapshot {
	mappings: MappingTable,
	config: Config,
	filter: EventFilter,
	strategy: LinkStrategy,
}

impl Snapshot {
	fn new(mappings: MappingTable, config: Config) -> Self {
		let filter = EventFilter::from_config(&config);
		let strategy = config.link_strategy();
		Snapshot { mappings, config, filter, strategy }
	}
}

/// State shared with the watch session threads
struct EngineCore {
	snapshot: RwLock<Arc<Snapshot>>,
	/// `generation` and `halted` only change under the `snapshot` write lock
	generation: AtomicU64,
	halted: AtomicBool,
	mutation_lock: Mutex<()>,
	notifier: Arc<dyn Notifier>,
}

impl EngineCore {
	fn snapshot(&self) -> Arc<Snapshot> {
		self.snapshot.read().unwrap_or_else(|e| e.into_inner()).clone()
	}

	/// Snapshot together with the generation it belongs to
	fn current(&self) -> (Arc<Snapshot>, u64) {
		let guard = self.snapshot.read().unwrap_or_else(|e| e.into_inner());
		(guard.clone(), self.generation.load(Ordering::SeqCst))
	}

	fn install(&self, snapshot: Snapshot) {
		let mut guard = self.snapshot.write().unwrap_or_else(|e| e.into_inner());
		*guard = Arc::new(snapshot);
		self.generation.fetch_add(1, Ordering::SeqCst);
		self.halted.store(false, Ordering::SeqCst);
	}

	/// Make every running walk stop at its next file and refuse new work
	fn halt(&self) {
		let _guard = self.snapshot.write().unwrap_or_else(|e| e.into_inner());
		self.generation.fetch_add(1, Ordering::SeqCst);
		self.halted.store(true, Ordering::SeqCst);
	}

	fn is_halted(&self) -> bool {
		self.halted.load(Ordering::SeqCst)
	}

	fn is_current(&self, generation: u64) -> bool {
		!self.is_halted() && self.generation.load(Ordering::SeqCst) == generation
	}

	fn lock_mutations(&self) -> MutexGuard<'_, ()> {
		// The guarded value is (), so a poisoned lock carries no broken state
		self.mutation_lock.lock().unwrap_or_else(|e| e.into_inner())
	}

	fn report_failure(&self, what: &str, err: &MirrorError) {
		error!("{} failed: {}", what, err);
		self.notifier.notify(Notification::new(format!("{} failed", what)).with_text(err.to_string()));
	}

	fn process(&self, event: SyncEvent) {
		let _guard = self.lock_mutations();
		if self.is_halted() {
			debug!("Engine stopped, dropping {} event", event);
			return;
		}
		info!("{} event", event);

		let (snapshot, generation) = self.current();
		let outcome =
			panic::catch_unwind(AssertUnwindSafe(|| self.dispatch(&snapshot, generation, &event)));
		let err = match outcome {
			Ok(Ok(())) => return,
			Ok(Err(e)) if e.is_not_found() => {
				debug!("{} vanished while handling: {}", event.source_path.display(), e);
				return;
			}
			Ok(Err(e)) => e,
			Err(payload) => MirrorError::Panicked { message: panic_message(&*payload) },
		};
		self.report_failure(&format!("{} event handling", event), &err);
	}

	fn dispatch(
		&self,
		snapshot: &Snapshot,
		generation: u64,
		event: &SyncEvent,
	) -> Result<(), MirrorError> {
		if let Admission::Reject(reason) = snapshot.filter.admit(event) {
			info!("{}: {}, skipping", event.source_path.display(), reason);
			return Ok(());
		}

		match event.kind {
			SyncEventKind::Deleted => {
				propagate_delete(&event.source_path, &event.watched_root, &snapshot.mappings)?;
				Ok(())
			}
			SyncEventKind::Created | SyncEventKind::Moved => {
				let Some(mapping) = snapshot.mappings.get(&event.watched_root) else {
					warn!("No mapping for watched root {}", event.watched_root.display());
					return Ok(());
				};
				// Same rules as the resync walk: real directories are descended,
				// links to directories are left alone
				let is_dir =
					fs::symlink_metadata(&event.source_path).map(|m| m.is_dir()).unwrap_or(false);
				if is_dir {
					self.materialize_subtree(snapshot, generation, mapping, &event.source_path);
					Ok(())
				} else if event.source_path.is_dir() {
					debug!("{} links to a directory, skipping", event.source_path.display());
					Ok(())
				} else {
					materialize(&event.source_path, mapping, &snapshot.mappings, &snapshot.strategy)
						.map(|_| ())
				}
			}
		}
	}

	/// A directory appeared at once (e.g. moved in); mirror its files one by one
	///
	/// Runs with the mutation lock held by the caller.
	fn materialize_subtree(
		&self,
		snapshot: &Snapshot,
		generation: u64,
		mapping: &DirectoryMapping,
		dir: &Path,
	) {
		let mut files = Vec::new();
		walk_files(dir, &snapshot.mappings, &mut files);
		for file in files {
			if !self.is_current(generation) {
				info!("Engine stopped or reconfigured, abandoning {}", dir.display());
				return;
			}
			if let Admission::Reject(reason) = snapshot.filter.admit_file(&file) {
				info!("{}: {}, skipping", file.display(), reason);
				continue;
			}
			match materialize(&file, mapping, &snapshot.mappings, &snapshot.strategy) {
				Ok(_) => {}
				Err(e) if e.is_not_found() => {}
				Err(e) => self.report_failure(&format!("{} sync", file.display()), &e),
			}
		}
	}
}

impl SyncEventHandler for EngineCore {
	fn handle_event(&self, event: SyncEvent) {
		self.process(event);
	}

	fn session_failed(&self, error: &WatchError) {
		let mut text = error.to_string();
		match error.remediation() {
			Some(fix) => {
				warn!("{}; {}", error, fix);
				text = format!("{}\n{}", text, fix);
			}
			None => error!("{}", error),
		}
		self.notifier.notify(
			Notification::new(format!("{} failed to start mirroring", error.root().display()))
				.with_text(text),
		);
	}
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
	payload
		.downcast_ref::<&str>()
		.map(|s| s.to_string())
		.or_else(|| payload.downcast_ref::<String>().cloned())
		.unwrap_or_else(|| "unknown panic".to_string())
}

/// Directory mirror engine
pub struct SyncEngine {
	core: Arc<EngineCore>,
	sessions: Mutex<Vec<WatchSession>>,
}

impl SyncEngine {
	pub fn new(notifier: Arc<dyn Notifier>) -> Self {
		let core = EngineCore {
			snapshot: RwLock::new(Arc::new(Snapshot::new(MappingTable::new(), Config::default()))),
			generation: AtomicU64::new(0),
			halted: AtomicBool::new(false),
			mutation_lock: Mutex::new(()),
			notifier,
		};
		SyncEngine { core: Arc::new(core), sessions: Mutex::new(Vec::new()) }
	}

	/// Replace mappings and configuration, restarting all watch sessions
	///
	/// Mappings whose destination is the source or lies inside it are
	/// reported and dropped; the rest proceed. Sessions start after the
	/// configured startup delay when `config.enabled` is set.
	pub fn apply_config(&self, mappings: MappingTable, config: Config) -> ApplyReport {
		self.core.halt();
		self.stop_sessions();

		let (valid, rejected) = mappings.validated();
		for err in &rejected {
			warn!("{}", err);
			self.core
				.notifier
				.notify(Notification::new("Directory mapping rejected").with_text(err.to_string()));
		}

		let snapshot = Snapshot::new(valid, config);
		let accepted: Vec<PathBuf> = snapshot.mappings.iter().map(|m| m.source.clone()).collect();
		let enabled = snapshot.config.enabled;
		let delay = snapshot.config.startup_delay();
		info!(
			"Configuration applied: {} mapping(s), {} rejected, copy mode {}",
			accepted.len(),
			rejected.len(),
			if snapshot.strategy.copy_mode() { "on" } else { "off" }
		);
		self.core.install(snapshot);

		let mut sessions_started = 0;
		if enabled {
			for source in &accepted {
				match self.start_watch_session(source, delay) {
					Ok(()) => sessions_started += 1,
					Err(e) => {
						self.core.report_failure(&format!("Watching {}", source.display()), &e)
					}
				}
			}
		}

		ApplyReport { accepted, rejected, sessions_started }
	}

	/// Start (or restart) the session for one configured source after `after`
	pub fn start_watch_session(&self, source: &Path, after: Duration) -> Result<(), MirrorError> {
		let snapshot = self.core.snapshot();
		if snapshot.mappings.get(source).is_none() {
			return Err(MirrorError::InvalidConfig {
				message: format!("{} is not a configured source", source.display()),
			});
		}

		let options = WatchOptions {
			mode: snapshot.config.observation_mode,
			poll_interval: snapshot.config.poll_interval(),
			delay: after,
		};
		info!(
			"Starting mirroring of {} in {}s ({} mode)",
			source.display(),
			after.as_secs(),
			options.mode
		);

		let handler: Arc<dyn SyncEventHandler> = self.core.clone();
		let session = WatchSession::start(source, options, handler)?;

		let previous = {
			let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
			let previous = sessions.iter().position(|s| s.root() == source).map(|i| sessions.remove(i));
			sessions.push(session);
			previous
		};
		if let Some(mut old) = previous {
			old.stop();
		}
		Ok(())
	}

	/// Stop and join every watch session
	pub fn stop_sessions(&self) {
		let sessions: Vec<WatchSession> =
			std::mem::take(&mut *self.sessions.lock().unwrap_or_else(|e| e.into_inner()));
		for mut session in sessions {
			session.stop();
		}
	}

	/// Lifecycle exit
	///
	/// Running walks are told to stop, every session is joined, and the
	/// single-file mutation in flight (if any) completes before this returns.
	/// Until the next `apply_config`, events and resyncs are dropped.
	pub fn stop(&self) {
		self.core.halt();
		self.stop_sessions();
		drop(self.core.lock_mutations());
	}

	/// Entry point for one normalized event
	pub fn handle_event(&self, event: SyncEvent) {
		self.core.process(event);
	}

	/// Walk every source tree and materialize every regular file
	///
	/// The mutation lock is taken per file, so live events interleave with a
	/// long resync. One file's failure never stops the walk; `stop` or
	/// `apply_config` does, before the next file.
	pub fn resync_all(&self) -> ResyncReport {
		let (snapshot, generation) = self.core.current();
		let mut report = ResyncReport::default();
		if self.core.is_halted() {
			info!("Engine stopped, skipping full sync");
			return report;
		}
		info!("Full sync started ({} mapping(s))", snapshot.mappings.len());

		'mappings: for mapping in snapshot.mappings.iter() {
			if mapping.destination.is_none() {
				info!("{} has no destination, nothing to sync", mapping.source.display());
				continue;
			}
			info!("Syncing {}", mapping.source.display());

			let mut files = Vec::new();
			walk_files(&mapping.source, &snapshot.mappings, &mut files);

			for file in files {
				report.files_seen += 1;
				if let Admission::Reject(reason) = snapshot.filter.admit_file(&file) {
					info!("{}: {}, skipping", file.display(), reason);
					report.skipped += 1;
					continue;
				}

				let _guard = self.core.lock_mutations();
				if !self.core.is_current(generation) {
					info!("Engine stopped or reconfigured, abandoning full sync");
					break 'mappings;
				}
				match materialize(&file, mapping, &snapshot.mappings, &snapshot.strategy) {
					Ok(m) if m.target().is_some() => report.materialized += 1,
					Ok(_) => report.skipped += 1,
					Err(e) if e.is_not_found() => report.skipped += 1,
					Err(e) => {
						report.failed += 1;
						self.core.report_failure(&format!("{} sync", file.display()), &e);
					}
				}
			}
		}

		info!(
			"Full sync finished: {} file(s), {} mirrored, {} skipped, {} failed",
			report.files_seen, report.materialized, report.skipped, report.failed
		);
		report
	}

	/// Currently installed (validated) mapping table
	pub fn mappings(&self) -> MappingTable {
		self.core.snapshot().mappings.clone()
	}

	pub fn config(&self) -> Config {
		self.core.snapshot().config.clone()
	}

	pub fn session_states(&self) -> Vec<(PathBuf, SessionState)> {
		self.sessions
			.lock()
			.unwrap_or_else(|e| e.into_inner())
			.iter()
			.map(|s| (s.root().to_path_buf(), s.state()))
			.collect()
	}
}

impl Default for SyncEngine {
	fn default() -> Self {
		Self::new(Arc::new(NoNotifier))
	}
}

impl Drop for SyncEngine {
	fn drop(&mut self) {
		self.stop_sessions();
	}
}
