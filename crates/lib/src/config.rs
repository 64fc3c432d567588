//! The finalized configuration of a supervision run.

use std::{
	collections::{HashMap, HashSet},
	path::PathBuf,
	time::Duration,
};

use tracing::debug;

use crate::{environment::ConfigFormat, error::CriticalError, signal::Signal};

/// Configuration for [`execute()`][crate::execute()].
///
/// Fields are public: the CLI builds this directly from its arguments. Call
/// [`validate()`](Self::validate) before use, which `execute()` also does.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub struct Config {
	/// The program and its arguments.
	pub command: Vec<String>,

	/// Run the command attached to a fresh pseudo-terminal.
	pub pty: bool,

	/// The signal sent first when stopping the command.
	pub signal: Signal,

	/// How long the command gets to exit after the graceful signal before it is killed.
	pub graceful_timeout: Duration,

	/// Exit codes which mean the command ended intentionally.
	///
	/// With `restart_on_failure`, the command is restarted when it exits with any code not in this
	/// set, and supervision ends when it exits with one of these.
	pub exit_codes: HashSet<i32>,

	/// Restart the command whenever it exits with a code not in `exit_codes`.
	pub restart_on_failure: bool,

	/// Restart the command when the config file or a tracked path changes.
	pub restart_on_config_change: bool,

	/// Where environment variables for the command are read from.
	pub config_path: Option<PathBuf>,

	/// The format of the file at `config_path`.
	pub config_format: ConfigFormat,

	/// Additional paths to watch for `restart_on_config_change`.
	pub paths_to_track: Vec<PathBuf>,

	/// Take an advisory lock on this file before starting, and hold it until the end.
	pub lock_file: Option<PathBuf>,

	/// Variables which are always set, and override those from the config.
	pub envs: HashMap<String, String>,

	/// How many triggers can wait for the supervisor at once.
	pub mailbox_size: usize,
}

impl Default for Config {
	fn default() -> Self {
		Self {
			command: Vec::new(),
			pty: false,
			signal: Signal::Terminate,
			graceful_timeout: Duration::from_secs(5),
			exit_codes: HashSet::new(),
			restart_on_failure: false,
			restart_on_config_change: false,
			config_path: None,
			config_format: ConfigFormat::None,
			paths_to_track: Vec::new(),
			lock_file: None,
			envs: HashMap::new(),
			mailbox_size: 8,
		}
	}
}

impl Config {
	/// A default configuration running `command`.
	#[must_use]
	pub fn new(command: impl IntoIterator<Item = impl Into<String>>) -> Self {
		let command = command.into_iter().map(Into::into).collect();
		debug!(?command, "Config: command");
		Self {
			command,
			..Self::default()
		}
	}

	/// Checks that the configuration can be supervised.
	pub fn validate(&self) -> Result<(), CriticalError> {
		if self.command.first().map_or(true, String::is_empty) {
			return Err(CriticalError::InvalidConfig {
				reason: "no command given",
			});
		}

		if self.config_format != ConfigFormat::None && self.config_path.is_none() {
			return Err(CriticalError::InvalidConfig {
				reason: "a config format was given without a config path",
			});
		}

		Ok(())
	}

	/// The paths watched for changes: the config path, then the tracked paths.
	///
	/// Empty paths are skipped.
	#[must_use]
	pub fn watched_paths(&self) -> Vec<PathBuf> {
		self.config_path
			.iter()
			.chain(self.paths_to_track.iter())
			.filter(|path| !path.as_os_str().is_empty())
			.cloned()
			.collect()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn defaults() {
		let config = Config::default();
		assert_eq!(config.signal, Signal::Terminate);
		assert_eq!(config.graceful_timeout, Duration::from_secs(5));
		assert!(config.exit_codes.is_empty());
		assert!(!config.restart_on_failure);
		assert!(!config.restart_on_config_change);
	}

	#[test]
	fn empty_command_is_invalid() {
		assert!(Config::default().validate().is_err());
		assert!(Config::new([""]).validate().is_err());
		assert!(Config::new(["true"]).validate().is_ok());
	}

	#[test]
	fn format_needs_a_path() {
		let mut config = Config::new(["true"]);
		config.config_format = ConfigFormat::Json;
		assert!(config.validate().is_err());
		config.config_path = Some("env.json".into());
		assert!(config.validate().is_ok());
	}

	#[test]
	fn watched_paths_skip_empty() {
		let mut config = Config::new(["true"]);
		config.config_path = Some("env".into());
		config.paths_to_track = vec!["".into(), "other".into()];
		assert_eq!(
			config.watched_paths(),
			vec![PathBuf::from("env"), PathBuf::from("other")]
		);
	}
}
