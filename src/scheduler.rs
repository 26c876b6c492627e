//! Delayed and periodic jobs on the tokio runtime
//!
//! Job bodies are synchronous (they take the engine's mutation lock and do
//! blocking filesystem work), so every run is handed to the blocking pool.
//! Removing a job aborts its timer; a run already on the blocking pool is
//! left to finish.

use chrono::Local;
use cron::Schedule;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::error::MirrorError;
use crate::logging::*;

struct Job {
	name: String,
	handle: JoinHandle<()>,
}

/// Named job registry bound to one runtime
pub struct Scheduler {
	runtime: Handle,
	jobs: Mutex<Vec<Job>>,
}

impl Scheduler {
	/// Bind to the runtime of the calling context
	///
	/// Fails when called outside a tokio runtime.
	pub fn new() -> Result<Self, MirrorError> {
		let runtime = Handle::try_current()
			.map_err(|e| MirrorError::Scheduler { message: e.to_string() })?;
		Ok(Self::with_handle(runtime))
	}

	pub fn with_handle(runtime: Handle) -> Self {
		Scheduler { runtime, jobs: Mutex::new(Vec::new()) }
	}

	/// Run `job` once after `delay`
	pub fn add_once<F>(&self, name: &str, delay: Duration, job: F)
	where
		F: FnOnce() + Send + 'static,
	{
		let label = name.to_string();
		let handle = self.runtime.spawn(async move {
			tokio::time::sleep(delay).await;
			debug!("Running job {}", label);
			if let Err(e) = tokio::task::spawn_blocking(job).await {
				error!("Job {} failed: {}", label, e);
			}
		});
		debug!("Scheduled {} in {}s", name, delay.as_secs());
		self.push(name, handle);
	}

	/// Run `job` on every tick of a cron expression, in local time
	///
	/// Runs never overlap: the next tick is computed after the previous
	/// run finished.
	pub fn add_cron<F>(&self, name: &str, expression: &str, job: F) -> Result<(), MirrorError>
	where
		F: Fn() + Send + Sync + 'static,
	{
		let schedule = parse_cron(expression)?;
		let job = Arc::new(job);
		let label = name.to_string();

		let handle = self.runtime.spawn(async move {
			loop {
				let Some(next) = schedule.upcoming(Local).next() else {
					info!("Cron job {} has no further runs", label);
					break;
				};
				let wait = (next - Local::now()).to_std().unwrap_or(Duration::ZERO);
				tokio::time::sleep(wait).await;

				debug!("Running cron job {}", label);
				let job = Arc::clone(&job);
				if let Err(e) = tokio::task::spawn_blocking(move || job()).await {
					error!("Cron job {} failed: {}", label, e);
				}
			}
		});
		info!("Scheduled {} with cron {:?}", name, expression);
		self.push(name, handle);
		Ok(())
	}

	fn push(&self, name: &str, handle: JoinHandle<()>) {
		let mut jobs = self.jobs.lock().unwrap_or_else(|e| e.into_inner());
		jobs.retain(|j| !j.handle.is_finished());
		jobs.push(Job { name: name.to_string(), handle });
	}

	/// Names of jobs that have not completed
	pub fn jobs(&self) -> Vec<String> {
		self.jobs
			.lock()
			.unwrap_or_else(|e| e.into_inner())
			.iter()
			.filter(|j| !j.handle.is_finished())
			.map(|j| j.name.clone())
			.collect()
	}

	pub fn remove_all_jobs(&self) {
		let jobs = std::mem::take(&mut *self.jobs.lock().unwrap_or_else(|e| e.into_inner()));
		for job in jobs {
			if !job.handle.is_finished() {
				debug!("Removing job {}", job.name);
			}
			job.handle.abort();
		}
	}
}

impl Drop for Scheduler {
	fn drop(&mut self) {
		self.remove_all_jobs();
	}
}

/// Parse a 5-, 6- or 7-field cron expression
///
/// Five fields are read as classic crontab (minute first) and get a zero
/// seconds field prepended.
pub fn parse_cron(expression: &str) -> Result<Schedule, MirrorError> {
	let fields = expression.split_whitespace().count();
	let normalized = match fields {
		5 => format!("0 {}", expression.trim()),
		6 | 7 => expression.trim().to_string(),
		n => {
			return Err(MirrorError::InvalidConfig {
				message: format!("cron expression {:?} has {} fields, expected 5 to 7", expression, n),
			})
		}
	};
	Schedule::from_str(&normalized).map_err(|e| MirrorError::InvalidConfig {
		message: format!("invalid cron expression {:?}: {}", expression, e),
	})
}


// vim: ts=4
