use std::env;
use std::ffi::OsString;
use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

const APP_DIR: &str = "chronos_heatmap";
const STATE_DIR_ENV: &str = "CHRONOS_HEATMAP_STATE_DIR";
const DATA_ENV: &str = "CHRONOS_HEATMAP_DATA";
const SETTINGS_FILE: &str = "settings.toml";
const LOG_FILE: &str = "chronos_heatmap.log";
const RECENT_FILE: &str = "recent_datasets.json";
const MAX_RECENT: usize = 50;

#[derive(Debug, Error)]
pub enum StateError {
	#[error("no dataset selected: pass --data <path>, set CHRONOS_HEATMAP_DATA, or pick one from `datasets`")]
	NoDataset,
	#[error("failed to access state file: {0}")]
	Io(#[from] io::Error),
	#[error("recent datasets file {} is corrupt: {source}", path.display())]
	Corrupt {
		path: PathBuf,
		#[source]
		source: serde_json::Error,
	},
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecentDataset {
	pub path: PathBuf,
	pub opened: NaiveDateTime,
}

/// Per-user directory with the settings file, the log and the recently opened datasets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateDir {
	root: PathBuf,
}

impl StateDir {
	pub fn at(root: impl Into<PathBuf>) -> Self {
		Self { root: root.into() }
	}

	/// `CHRONOS_HEATMAP_STATE_DIR`, then the platform state home.
	pub fn locate() -> Self {
		if let Some(path) = env::var_os(STATE_DIR_ENV).filter(|path| !path.is_empty()) {
			return Self::at(path);
		}

		#[cfg(target_os = "windows")]
		{
			if let Some(path) = env::var_os("LOCALAPPDATA") {
				return Self::at(PathBuf::from(path).join(APP_DIR));
			}
		}

		if let Some(path) = env::var_os("XDG_STATE_HOME") {
			return Self::at(PathBuf::from(path).join(APP_DIR));
		}
		if let Some(path) = env::var_os("HOME") {
			return Self::at(PathBuf::from(path).join(".local").join("state").join(APP_DIR));
		}

		Self::at(format!(".{APP_DIR}"))
	}

	pub fn root(&self) -> &Path {
		&self.root
	}

	pub fn settings_file(&self) -> PathBuf {
		self.root.join(SETTINGS_FILE)
	}

	pub fn log_file(&self) -> PathBuf {
		self.root.join(LOG_FILE)
	}

	fn recent_file(&self) -> PathBuf {
		self.root.join(RECENT_FILE)
	}

	/// `--data`, then `CHRONOS_HEATMAP_DATA`, then the most recently opened dataset.
	pub fn dataset_path(&self, cli_path: Option<PathBuf>) -> Result<PathBuf, StateError> {
		self.choose_dataset(cli_path, env::var_os(DATA_ENV))
	}

	fn choose_dataset(&self, cli_path: Option<PathBuf>, from_env: Option<OsString>) -> Result<PathBuf, StateError> {
		if let Some(path) = cli_path {
			return Ok(absolutize(path));
		}

		if let Some(path) = from_env.filter(|path| !path.is_empty()) {
			debug!(path = ?path, "dataset from environment");
			return Ok(absolutize(PathBuf::from(path)));
		}

		match self.recent_datasets(1) {
			Ok(recent) => {
				if let Some(entry) = recent.into_iter().next() {
					debug!(path = %entry.path.display(), "dataset from recent list");
					return Ok(entry.path);
				}
			}
			Err(err) => debug!(%err, "recent list unavailable"),
		}

		Err(StateError::NoDataset)
	}

	/// Newest first.
	pub fn recent_datasets(&self, limit: usize) -> Result<Vec<RecentDataset>, StateError> {
		let path = self.recent_file();
		let raw = match fs::read_to_string(&path) {
			Ok(raw) => raw,
			Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
			Err(err) => return Err(err.into()),
		};
		if raw.trim().is_empty() {
			return Ok(Vec::new());
		}

		let mut entries: Vec<RecentDataset> =
			serde_json::from_str(&raw).map_err(|source| StateError::Corrupt { path, source })?;
		entries.truncate(limit);
		Ok(entries)
	}

	/// Moves `path` to the front of the recent list, stamped with the current time.
	pub fn remember_dataset(&self, path: &Path) -> Result<(), StateError> {
		self.remember_dataset_at(path, Local::now().naive_local())
	}

	fn remember_dataset_at(&self, path: &Path, opened: NaiveDateTime) -> Result<(), StateError> {
		let path = absolutize(path.to_path_buf());
		// A corrupt list is replaced rather than blocking every later run.
		let mut entries = self.recent_datasets(MAX_RECENT).unwrap_or_default();
		entries.retain(|entry| entry.path != path);
		entries.insert(0, RecentDataset { path, opened });
		entries.truncate(MAX_RECENT);

		fs::create_dir_all(&self.root)?;
		let encoded = serde_json::to_string_pretty(&entries).map_err(io::Error::other)?;
		fs::write(self.recent_file(), encoded)?;
		Ok(())
	}
}

fn absolutize(path: PathBuf) -> PathBuf {
	let path = match (path.is_absolute(), env::current_dir()) {
		(false, Ok(cwd)) => cwd.join(path),
		_ => path,
	};
	fs::canonicalize(&path).unwrap_or(path)
}

#[cfg(test)]
mod tests {
	use std::ffi::OsString;
	use std::fs;
	use std::path::PathBuf;

	use chrono::NaiveDate;
	use pretty_assertions::assert_eq;

	use super::{StateDir, StateError};

	fn at_hour(hour: u32) -> chrono::NaiveDateTime {
		NaiveDate::from_ymd_opt(2016, 3, 1).unwrap().and_hms_opt(hour, 0, 0).unwrap()
	}

	#[test]
	fn every_state_file_lives_under_the_root() {
		let state = StateDir::at("/tmp/heatmap-state");
		assert_eq!(state.settings_file(), PathBuf::from("/tmp/heatmap-state/settings.toml"));
		assert_eq!(state.log_file(), PathBuf::from("/tmp/heatmap-state/chronos_heatmap.log"));
		assert_eq!(state.root(), PathBuf::from("/tmp/heatmap-state").as_path());
	}

	#[test]
	fn cli_path_beats_environment_and_recent_list() {
		let dir = tempfile::tempdir().expect("temp dir");
		let state = StateDir::at(dir.path());
		state.remember_dataset_at(&dir.path().join("recent.json"), at_hour(9)).unwrap();

		let from_cli = state
			.choose_dataset(Some(PathBuf::from("some/data.json")), Some(OsString::from("/env.json")))
			.unwrap();
		assert!(from_cli.is_absolute());
		assert!(from_cli.ends_with("some/data.json"));

		let from_env = state.choose_dataset(None, Some(OsString::from("/env.json"))).unwrap();
		assert_eq!(from_env, PathBuf::from("/env.json"));

		let from_recent = state.choose_dataset(None, Some(OsString::new())).unwrap();
		assert_eq!(from_recent, dir.path().join("recent.json"));
	}

	#[test]
	fn missing_everything_is_reported() {
		let dir = tempfile::tempdir().expect("temp dir");
		let state = StateDir::at(dir.path().join("never-created"));
		assert!(matches!(state.choose_dataset(None, None), Err(StateError::NoDataset)));
		assert!(state.recent_datasets(10).unwrap().is_empty());
	}

	#[test]
	fn recent_list_moves_reopened_datasets_to_the_front() {
		let dir = tempfile::tempdir().expect("temp dir");
		let state = StateDir::at(dir.path().join("state"));
		let first = dir.path().join("first.json");
		let second = dir.path().join("second.json");

		state.remember_dataset_at(&first, at_hour(9)).unwrap();
		state.remember_dataset_at(&second, at_hour(10)).unwrap();
		state.remember_dataset_at(&first, at_hour(11)).unwrap();

		let recent = state.recent_datasets(10).unwrap();
		let rows = recent
			.iter()
			.map(|entry| (entry.path.file_name().map(|name| name.to_os_string()), entry.opened))
			.collect::<Vec<_>>();
		assert_eq!(
			rows,
			vec![
				(Some(OsString::from("first.json")), at_hour(11)),
				(Some(OsString::from("second.json")), at_hour(10)),
			]
		);
		assert_eq!(state.recent_datasets(1).unwrap().len(), 1);
	}

	#[test]
	fn corrupt_recent_list_is_an_error_but_gets_replaced() {
		let dir = tempfile::tempdir().expect("temp dir");
		let state = StateDir::at(dir.path());
		fs::write(dir.path().join("recent_datasets.json"), "not json").unwrap();
		assert!(matches!(state.recent_datasets(5), Err(StateError::Corrupt { .. })));

		state.remember_dataset_at(&dir.path().join("data.json"), at_hour(8)).unwrap();
		assert_eq!(state.recent_datasets(5).unwrap().len(), 1);
	}
}
