//! Service lifecycle: run-once, cron, remote trigger, shutdown
#![cfg(unix)]

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;

use linkmirror::{
	Config, FileConfigStore, MemoryConfigStore, MemoryNotifier, MirrorService, NoNotifier,
	ObservationMode, RemoteCommand,
};

struct Setup {
	_root: TempDir,
	src: PathBuf,
	dst: PathBuf,
	store: Arc<MemoryConfigStore>,
	notifier: Arc<MemoryNotifier>,
	service: MirrorService,
}

fn setup() -> Setup {
	let root = TempDir::new().unwrap();
	let src = root.path().join("src");
	let dst = root.path().join("dst");
	fs::create_dir_all(src.join("a")).unwrap();
	fs::write(src.join("a/movie.mkv"), b"frames").unwrap();

	let store = Arc::new(MemoryConfigStore::new());
	let notifier = Arc::new(MemoryNotifier::new());
	let service = MirrorService::new(store.clone(), notifier.clone()).unwrap();
	Setup { _root: root, src, dst, store, notifier, service }
}

impl Setup {
	fn config(&self) -> Config {
		Config {
			directories: format!("{}:{}", self.src.display(), self.dst.display()),
			startup_delay_secs: 0,
			run_once_delay_secs: 0,
			..Default::default()
		}
	}
}

#[tokio::test(flavor = "multi_thread")]
async fn test_run_once_resyncs_and_clears_flag() {
	let s = setup();
	let report = s.service.init(Config { run_once: true, ..s.config() }).unwrap();
	assert_eq!(report.accepted, vec![s.src.clone()]);

	// Cleared immediately, both in memory and in the store
	assert!(!s.service.config().run_once);
	assert!(!s.store.last_saved().unwrap().run_once);

	tokio::time::sleep(Duration::from_millis(800)).await;
	assert_eq!(fs::read_link(s.dst.join("a/movie.mkv")).unwrap(), s.src.join("a/movie.mkv"));
	s.service.stop();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_cron_job_only_when_enabled() {
	let s = setup();
	s.service.init(Config { cron: "0 3 * * *".into(), ..s.config() }).unwrap();
	assert!(s.service.scheduler().jobs().is_empty());

	s.service.init(Config { cron: "0 3 * * *".into(), enabled: true, ..s.config() }).unwrap();
	assert_eq!(s.service.scheduler().jobs(), vec!["cron resync".to_string()]);
	assert_eq!(s.service.engine().session_states().len(), 1);

	s.service.stop();
	assert!(s.service.scheduler().jobs().is_empty());
	assert!(s.service.engine().session_states().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_bad_cron_is_reported_not_fatal() {
	let s = setup();
	let report = s.service.init(Config { cron: "every day".into(), enabled: true, ..s.config() });
	assert!(report.is_ok());
	assert!(s.service.scheduler().jobs().is_empty());
	assert!(s.notifier.sent().iter().any(|n| n.title.contains("Scheduling")));
	s.service.stop();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_remote_sync_posts_start_and_finish() {
	let s = setup();
	s.service.init(s.config()).unwrap();

	let command =
		RemoteCommand::parse(r#"{"action":"mirror_sync","channel":"C42","user":"U7"}"#).unwrap();
	let report = s.service.remote_sync(&command).unwrap();
	assert_eq!(report.materialized, 1);
	assert!(s.dst.join("a/movie.mkv").exists());

	let sent = s.notifier.sent();
	assert_eq!(sent.len(), 2);
	assert_eq!(sent[0].title, "Mirroring all directories");
	assert_eq!(sent[1].title, "Mirroring finished");
	for n in &sent {
		assert_eq!(n.channel.as_deref(), Some("C42"));
		assert_eq!(n.user.as_deref(), Some("U7"));
	}

	let other = RemoteCommand::parse(r#"{"action":"something_else"}"#).unwrap();
	assert!(s.service.remote_sync(&other).is_none());
	assert_eq!(s.notifier.sent().len(), 2);
	s.service.stop();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_stop_cancels_pending_run_once() {
	let s = setup();
	s.service
		.init(Config { run_once: true, run_once_delay_secs: 2, ..s.config() })
		.unwrap();
	s.service.stop();

	tokio::time::sleep(Duration::from_millis(2500)).await;
	assert!(!s.dst.exists());
}

fn count_entries(dir: &std::path::Path) -> usize {
	match fs::read_dir(dir) {
		Ok(entries) => entries.count(),
		Err(_) => 0,
	}
}

#[tokio::test(flavor = "multi_thread")]
async fn test_stop_halts_running_resync() {
	let s = setup();
	for i in 0..5000 {
		fs::write(s.src.join(format!("movie{:04}.mkv", i)), b"x").unwrap();
	}
	s.service.init(Config { run_once: true, ..s.config() }).unwrap();

	let deadline = Instant::now() + Duration::from_secs(15);
	while count_entries(&s.dst) == 0 && Instant::now() < deadline {
		tokio::time::sleep(Duration::from_millis(5)).await;
	}
	assert!(count_entries(&s.dst) > 0);

	s.service.stop();
	let after_stop = count_entries(&s.dst);
	tokio::time::sleep(Duration::from_millis(1000)).await;
	assert_eq!(count_entries(&s.dst), after_stop);

	// Stopped engine ignores resync requests until reinitialized
	assert_eq!(s.service.engine().resync_all().files_seen, 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_run_once_writeback_keeps_file_settings() {
	let root = TempDir::new().unwrap();
	let src = root.path().join("src");
	fs::create_dir_all(&src).unwrap();
	let path = root.path().join("linkmirror.toml");
	let on_disk = Config {
		run_once: true,
		directories: format!("{}:{}", src.display(), root.path().join("dst").display()),
		startup_delay_secs: 0,
		run_once_delay_secs: 0,
		..Default::default()
	};
	on_disk.save(&path).unwrap();

	let service =
		MirrorService::new(Arc::new(FileConfigStore::new(path.clone())), Arc::new(NoNotifier)).unwrap();
	// Loaded config plus a command-line observation mode
	service
		.init(Config { observation_mode: ObservationMode::Fast, ..on_disk.clone() })
		.unwrap();
	assert_eq!(service.config().observation_mode, ObservationMode::Fast);

	let saved = Config::load(&path).unwrap();
	assert!(!saved.run_once);
	assert_eq!(saved.observation_mode, ObservationMode::Compatibility);
	service.stop();
}
