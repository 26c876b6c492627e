use clap::{Arg, Command};
use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

use linkmirror::logging::*;
use linkmirror::{
	Config, FileConfigStore, LogNotifier, MirrorService, ObservationMode, RemoteCommand,
	SyncEngine,
};

const DEFAULT_CONFIG: &str = "linkmirror.toml";

///////////////////////
// Utility functions //
///////////////////////

fn load_config(path: &Path) -> Result<Config, Box<dyn Error>> {
	let config = Config::load(path)
		.map_err(|e| format!("Cannot load configuration {}: {}", path.display(), e))?;
	Ok(config)
}

fn check(config: &Config) -> Result<(), Box<dyn Error>> {
	let (valid, rejected) = config.mappings().validated();
	for mapping in valid.iter() {
		match &mapping.destination {
			Some(dst) => println!("{} -> {}", mapping.source.display(), dst.display()),
			None => println!("{} (no destination)", mapping.source.display()),
		}
	}
	for err in &rejected {
		println!("REJECTED: {}", err);
	}
	if !config.cron.trim().is_empty() {
		linkmirror::scheduler::parse_cron(&config.cron)?;
		println!("cron: {}", config.cron.trim());
	}

	if rejected.is_empty() {
		Ok(())
	} else {
		Err(format!("{} mapping(s) rejected", rejected.len()).into())
	}
}

async fn sync_once(config: Config) -> Result<(), Box<dyn Error>> {
	let engine = Arc::new(SyncEngine::new(Arc::new(LogNotifier)));
	let mappings = config.mappings();
	// One-shot: no watch sessions
	engine.apply_config(mappings, Config { enabled: false, ..config });

	let report = tokio::task::spawn_blocking(move || engine.resync_all()).await?;
	println!(
		"{} file(s) seen, {} mirrored, {} skipped, {} failed",
		report.files_seen, report.materialized, report.skipped, report.failed
	);
	if report.failed > 0 {
		return Err(format!("{} file(s) failed", report.failed).into());
	}
	Ok(())
}

async fn run(path: PathBuf, config: Config) -> Result<(), Box<dyn Error>> {
	let service =
		Arc::new(MirrorService::new(Arc::new(FileConfigStore::new(path)), Arc::new(LogNotifier))?);
	service.init(config)?;

	let mut lines = BufReader::new(tokio::io::stdin()).lines();
	let mut stdin_open = true;

	loop {
		tokio::select! {
			result = tokio::signal::ctrl_c() => {
				result?;
				info!("Interrupted, shutting down");
				break;
			}
			line = lines.next_line(), if stdin_open => {
				match line {
					Ok(Some(line)) if line.trim().is_empty() => {}
					Ok(Some(line)) => match RemoteCommand::parse(&line) {
						Ok(command) => {
							let service = Arc::clone(&service);
							tokio::task::spawn_blocking(move || service.remote_sync(&command));
						}
						Err(e) => warn!("{}", e),
					},
					Ok(None) => {
						debug!("stdin closed, remote commands disabled");
						stdin_open = false;
					}
					Err(e) => {
						warn!("Reading stdin failed: {}", e);
						stdin_open = false;
					}
				}
			}
		}
	}

	// Joins session threads
	tokio::task::spawn_blocking(move || service.stop()).await?;
	Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
	init_tracing();

	let matches = Command::new("linkmirror")
		.version(env!("CARGO_PKG_VERSION"))
		.author("Szilard Hajba <szilu@symbion.hu>")
		.about("Mirror directory trees as symlinks or copies")
		.subcommand_required(true)
		.arg(
			Arg::new("config")
				.short('c')
				.long("config")
				.value_name("FILE")
				.global(true)
				.help("Configuration file (TOML, JSON or JSON5)"),
		)
		.arg(
			Arg::new("observation-mode")
				.short('m')
				.long("observation-mode")
				.value_name("MODE")
				.global(true)
				.help("Override observation mode: compatibility or fast"),
		)
		.subcommand(
			Command::new("run")
				.about("Watch and mirror; reads remote commands as JSON lines on stdin"),
		)
		.subcommand(Command::new("sync").about("Run one full sync and exit"))
		.subcommand(Command::new("check").about("Validate the configuration"))
		.get_matches();

	let (name, sub_matches) = matches.subcommand().ok_or("subcommand required")?;
	// --config is global, so the subcommand sees it wherever it was given
	let path = PathBuf::from(
		sub_matches.get_one::<String>("config").map(|s| s.as_str()).unwrap_or(DEFAULT_CONFIG),
	);
	let mut config = load_config(&path)?;
	if let Some(mode) = sub_matches.get_one::<String>("observation-mode") {
		config.observation_mode = mode.parse::<ObservationMode>()?;
	}

	match name {
		"run" => run(path, config).await,
		"sync" => sync_once(config).await,
		"check" => check(&config),
		_ => Err(format!("unknown subcommand {}", name).into()),
	}
}

// vim: ts=4
