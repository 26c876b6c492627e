//! One filesystem observer bound to one source tree
//!
//! A session moves through `Stopped → Starting → Running → Stopped`. Each
//! session owns a background thread that waits out the startup delay,
//! attaches the observer, and then forwards normalized events to a
//! [`SyncEventHandler`] until stopped. `stop` joins that thread, so no event
//! is delivered after it returns.

use notify::{PollWatcher, RecommendedWatcher, RecursiveMode, Watcher};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError, TryRecvError};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::error::WatchError;
use crate::event::{normalize, SyncEvent};
use crate::logging::*;
use crate::strategy::ObservationMode;

/// How often the session thread checks for a stop request while idle
const STOP_CHECK_INTERVAL: Duration = Duration::from_millis(200);

/// Receiver of everything a session produces
pub trait SyncEventHandler: Send + Sync {
	/// Called once per normalized event, from the session thread
	fn handle_event(&self, event: SyncEvent);

	/// Called when the observer could not be started; the session ends
	fn session_failed(&self, error: &WatchError);
}

/// Lifecycle state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
	Stopped,
	Starting,
	Running,
}

impl fmt::Display for SessionState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			SessionState::Stopped => write!(f, "stopped"),
			SessionState::Starting => write!(f, "starting"),
			SessionState::Running => write!(f, "running"),
		}
	}
}

/// Parameters for starting a session
#[derive(Debug, Clone)]
pub struct WatchOptions {
	pub mode: ObservationMode,
	pub poll_interval: Duration,
	pub delay: Duration,
}

/// The notify watcher behind a session
enum Observer {
	Native(RecommendedWatcher),
	Polling(PollWatcher),
}

impl Observer {
	fn attach(
		root: &Path,
		options: &WatchOptions,
		tx: mpsc::Sender<notify::Result<notify::Event>>,
	) -> notify::Result<Self> {
		match options.mode {
			ObservationMode::Fast => {
				let mut w = RecommendedWatcher::new(tx, notify::Config::default())?;
				w.watch(root, RecursiveMode::Recursive)?;
				Ok(Observer::Native(w))
			}
			ObservationMode::Compatibility => {
				let config = notify::Config::default().with_poll_interval(options.poll_interval);
				let mut w = PollWatcher::new(tx, config)?;
				w.watch(root, RecursiveMode::Recursive)?;
				Ok(Observer::Polling(w))
			}
		}
	}

	fn detach(mut self, root: &Path) {
		let result = match &mut self {
			Observer::Native(w) => w.unwatch(root),
			Observer::Polling(w) => w.unwatch(root),
		};
		if let Err(e) = result {
			debug!("Unwatching {} failed: {}", root.display(), e);
		}
	}
}

/// Handle to a running (or starting) watch session
pub struct WatchSession {
	root: PathBuf,
	mode: ObservationMode,
	state: Arc<Mutex<SessionState>>,
	stop_tx: Option<mpsc::Sender<()>>,
	thread: Option<JoinHandle<()>>,
}

impl WatchSession {
	/// Spawn the session thread; the observer is attached after `options.delay`
	pub fn start(
		root: impl Into<PathBuf>,
		options: WatchOptions,
		handler: Arc<dyn SyncEventHandler>,
	) -> Result<Self, WatchError> {
		let root = root.into();
		let mode = options.mode;
		let state = Arc::new(Mutex::new(SessionState::Starting));
		let (stop_tx, stop_rx) = mpsc::channel();

		let spawned = {
			let root = root.clone();
			let state = Arc::clone(&state);
			thread::Builder::new()
				.name(format!("watch:{}", root.display()))
				.spawn(move || run_session(root, options, handler, state, stop_rx))
		};
		let thread = match spawned {
			Ok(t) => t,
			Err(source) => return Err(WatchError::Spawn { root, source }),
		};

		Ok(WatchSession { root, mode, state, stop_tx: Some(stop_tx), thread: Some(thread) })
	}

	pub fn root(&self) -> &Path {
		&self.root
	}

	pub fn mode(&self) -> ObservationMode {
		self.mode
	}

	pub fn state(&self) -> SessionState {
		*self.state.lock().unwrap_or_else(|e| e.into_inner())
	}

	/// Tear down the observer and wait for the session thread to finish
	pub fn stop(&mut self) {
		if let Some(tx) = self.stop_tx.take() {
			let _ = tx.send(());
		}
		if let Some(thread) = self.thread.take() {
			if thread.join().is_err() {
				error!("Watch thread for {} panicked", self.root.display());
			}
			info!("Mirroring of {} stopped", self.root.display());
		}
		set_state(&self.state, SessionState::Stopped);
	}
}

impl Drop for WatchSession {
	fn drop(&mut self) {
		self.stop();
	}
}

impl fmt::Debug for WatchSession {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("WatchSession")
			.field("root", &self.root)
			.field("mode", &self.mode)
			.field("state", &self.state())
			.finish()
	}
}

fn set_state(state: &Mutex<SessionState>, next: SessionState) {
	*state.lock().unwrap_or_else(|e| e.into_inner()) = next;
}

fn run_session(
	root: PathBuf,
	options: WatchOptions,
	handler: Arc<dyn SyncEventHandler>,
	state: Arc<Mutex<SessionState>>,
	stop_rx: mpsc::Receiver<()>,
) {
	// Startup delay doubles as the first stop check
	match stop_rx.recv_timeout(options.delay) {
		Err(RecvTimeoutError::Timeout) => {}
		_ => {
			debug!("Watch of {} cancelled before start", root.display());
			set_state(&state, SessionState::Stopped);
			return;
		}
	}

	let (tx, rx) = mpsc::channel();
	let observer = match Observer::attach(&root, &options, tx) {
		Ok(o) => o,
		Err(e) => {
			let err = WatchError::from_notify(root.clone(), e);
			handler.session_failed(&err);
			set_state(&state, SessionState::Stopped);
			return;
		}
	};

	set_state(&state, SessionState::Running);
	info!("Mirroring of {} started ({} mode)", root.display(), options.mode);

	loop {
		match stop_rx.try_recv() {
			Ok(()) | Err(TryRecvError::Disconnected) => break,
			Err(TryRecvError::Empty) => {}
		}

		match rx.recv_timeout(STOP_CHECK_INTERVAL) {
			Ok(Ok(event)) => {
				for sync_event in normalize(&event, &root) {
					handler.handle_event(sync_event);
				}
			}
			Ok(Err(e)) => warn!("Watch error on {}: {}", root.display(), e),
			Err(RecvTimeoutError::Timeout) => continue,
			Err(RecvTimeoutError::Disconnected) => {
				warn!("Watcher channel closed for {}", root.display());
				break;
			}
		}
	}

	observer.detach(&root);
	set_state(&state, SessionState::Stopped);
}
