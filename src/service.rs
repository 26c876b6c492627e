//! Process lifecycle: configuration, engine, scheduled resyncs
//!
//! `init` may be called repeatedly; each call tears down whatever the
//! previous one set up before applying the new configuration.

use serde::Deserialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::callbacks::{Notification, Notifier};
use crate::config::{Config, ConfigStore};
use crate::engine::{ApplyReport, ResyncReport, SyncEngine};
use crate::error::MirrorError;
use crate::logging::*;
use crate::scheduler::Scheduler;

/// Action name that triggers a full resync
pub const REMOTE_SYNC_ACTION: &str = "mirror_sync";

const RUN_ONCE_JOB: &str = "run-once resync";
const CRON_JOB: &str = "cron resync";

/// Inbound trigger, one JSON object per command
///
/// ```json
/// {"action": "mirror_sync", "channel": "ops", "user": "alice"}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RemoteCommand {
	pub action: String,
	#[serde(default)]
	pub channel: Option<String>,
	#[serde(default)]
	pub user: Option<String>,
}

impl RemoteCommand {
	pub fn parse(line: &str) -> Result<Self, MirrorError> {
		serde_json::from_str(line).map_err(|e| MirrorError::InvalidConfig {
			message: format!("invalid remote command: {}", e),
		})
	}
}

pub struct MirrorService {
	engine: Arc<SyncEngine>,
	scheduler: Scheduler,
	store: Arc<dyn ConfigStore>,
	notifier: Arc<dyn Notifier>,
	config: Mutex<Config>,
	shutdown: Arc<AtomicBool>,
}

impl MirrorService {
	/// Must be called from within a tokio runtime
	pub fn new(store: Arc<dyn ConfigStore>, notifier: Arc<dyn Notifier>) -> Result<Self, MirrorError> {
		let scheduler = Scheduler::new()?;
		Ok(MirrorService {
			engine: Arc::new(SyncEngine::new(Arc::clone(&notifier))),
			scheduler,
			store,
			notifier,
			config: Mutex::new(Config::default()),
			shutdown: Arc::new(AtomicBool::new(false)),
		})
	}

	/// (Re)initialize from `config`
	///
	/// Bad mappings, a bad cron expression or a failed write-back are
	/// reported and skipped; they never abort initialization.
	pub fn init(&self, mut config: Config) -> Result<ApplyReport, MirrorError> {
		self.stop();
		self.shutdown.store(false, Ordering::SeqCst);

		let mappings = config.mappings();
		info!("Initializing with {} mapping(s)", mappings.len());
		let report = self.engine.apply_config(mappings, config.clone());

		if config.run_once {
			let delay = config.run_once_delay();
			let job = self.resync_job();
			self.scheduler.add_once(RUN_ONCE_JOB, delay, move || job());
			info!("Full sync scheduled in {}s", delay.as_secs());

			config.run_once = false;
			if let Err(e) = self.store.clear_run_once(&config) {
				self.report("Clearing run-once", &e);
			}
		}

		let cron = config.cron.trim();
		if config.enabled && !cron.is_empty() {
			let job = self.resync_job();
			if let Err(e) = self.scheduler.add_cron(CRON_JOB, cron, job) {
				self.report("Scheduling periodic sync", &e);
			}
		}

		*self.config.lock().unwrap_or_else(|e| e.into_inner()) = config;
		Ok(report)
	}

	fn resync_job(&self) -> impl Fn() + Send + Sync + 'static {
		let engine = Arc::clone(&self.engine);
		let shutdown = Arc::clone(&self.shutdown);
		move || {
			if shutdown.load(Ordering::SeqCst) {
				debug!("Shutting down, skipping scheduled sync");
				return;
			}
			engine.resync_all();
		}
	}

	fn report(&self, what: &str, err: &MirrorError) {
		error!("{} failed: {}", what, err);
		self.notifier.notify(Notification::new(format!("{} failed", what)).with_text(err.to_string()));
	}

	/// Handle one remote trigger; blocks for the whole resync
	///
	/// # Returns
	/// The resync report, or `None` when the action is not ours
	pub fn remote_sync(&self, command: &RemoteCommand) -> Option<ResyncReport> {
		if command.action != REMOTE_SYNC_ACTION {
			debug!("Ignoring remote action {:?}", command.action);
			return None;
		}

		info!("Remote sync requested by {}", command.user.as_deref().unwrap_or("unknown user"));
		self.notifier.notify(
			Notification::new("Mirroring all directories")
				.reply_to(command.channel.clone(), command.user.clone()),
		);

		let report = self.engine.resync_all();

		self.notifier.notify(
			Notification::new("Mirroring finished")
				.with_text(format!(
					"{} file(s) seen, {} mirrored, {} skipped, {} failed",
					report.files_seen, report.materialized, report.skipped, report.failed
				))
				.reply_to(command.channel.clone(), command.user.clone()),
		);
		Some(report)
	}

	/// Signal shutdown, drop pending jobs and stop every watch session
	pub fn stop(&self) {
		self.shutdown.store(true, Ordering::SeqCst);
		self.scheduler.remove_all_jobs();
		self.engine.stop();
	}

	pub fn engine(&self) -> &Arc<SyncEngine> {
		&self.engine
	}

	pub fn scheduler(&self) -> &Scheduler {
		&self.scheduler
	}

	/// Configuration as last applied (with `run_once` already cleared)
	pub fn config(&self) -> Config {
		self.config.lock().unwrap_or_else(|e| e.into_inner()).clone()
	}
}
