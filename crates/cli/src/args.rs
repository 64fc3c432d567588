use std::{
	collections::HashMap,
	path::PathBuf,
	str::FromStr,
	time::Duration,
};

use clap::{Parser, ValueHint};
use guidedog::{environment::ConfigFormat, signal::Signal, Config};
use tracing::debug;

pub mod logging;

const OPTSET_COMMAND: &str = "Command options";
const OPTSET_CONFIG: &str = "Config options";
const OPTSET_BEHAVIOUR: &str = "Behaviour options";
const OPTSET_DEBUGGING: &str = "Debugging options";

/// Supervise a single command.
///
/// Guide-dog starts a command, passes its exit code through, and optionally restarts it when it
/// fails or when its configuration changes. When guide-dog itself is asked to stop, the command
/// is given a graceful signal and some time before it is killed.
#[derive(Debug, Clone, Parser)]
#[command(name = "guide-dog", author, version, about, long_about = None)]
#[cfg_attr(debug_assertions, command(before_help = "⚠ DEBUG BUILD ⚠"))]
pub struct Args {
	/// Command to supervise
	///
	/// The program and its arguments. Use '--' before it so its own options are not read as
	/// guide-dog's.
	#[arg(
		help_heading = OPTSET_COMMAND,
		trailing_var_arg = true,
		num_args = 1..,
		required = true,
		value_name = "COMMAND",
		value_hint = ValueHint::CommandWithArguments,
	)]
	pub command: Vec<String>,

	/// Run the command on a pseudo-terminal
	///
	/// The command gets a fresh terminal as its controlling terminal, and guide-dog forwards its
	/// own stdin and stdout to it. When guide-dog runs in a terminal, that terminal is put in raw
	/// mode for the duration.
	#[arg(
		long,
		help_heading = OPTSET_COMMAND,
	)]
	pub pty: bool,

	/// Set an environment variable for the command
	///
	/// Use multiple times to set several. These override the variables read from the config.
	/// A bare 'NAME' sets the variable to the empty string.
	#[arg(
		short = 'e',
		long = "env",
		help_heading = OPTSET_COMMAND,
		value_name = "NAME=VALUE",
		value_parser = parse_env,
	)]
	pub env: Vec<(String, String)>,

	/// Signal sent to stop the command gracefully
	///
	/// Accepts a name like 'SIGTERM' or 'term' or a number like '15'.
	#[arg(
		short,
		long,
		help_heading = OPTSET_BEHAVIOUR,
		default_value = "SIGTERM",
		value_name = "SIGNAL",
	)]
	pub signal: Signal,

	/// Time to wait for the command to exit after the graceful signal
	///
	/// After this, the command is killed. Takes a unit-less value in seconds, or a time span value
	/// such as "2min 5s".
	#[arg(
		short = 't',
		long,
		help_heading = OPTSET_BEHAVIOUR,
		default_value = "5s",
		value_name = "TIMEOUT",
	)]
	pub graceful_timeout: TimeSpan,

	/// Restart the command when it fails
	///
	/// The command is restarted whenever it exits with a code not given with '--exit-code'.
	#[arg(
		long,
		help_heading = OPTSET_BEHAVIOUR,
	)]
	pub supervise: bool,

	/// Exit code meaning the command ended intentionally
	///
	/// Use multiple times for several codes. With '--supervise', guide-dog exits when the command
	/// exits with one of these, and restarts it otherwise.
	#[arg(
		short = 'x',
		long = "exit-code",
		help_heading = OPTSET_BEHAVIOUR,
		value_name = "CODE",
		allow_negative_numbers = true,
	)]
	pub exit_codes: Vec<i32>,

	/// Restart the command when the config or a tracked path changes
	#[arg(
		long = "restart-on-config-changes",
		help_heading = OPTSET_BEHAVIOUR,
	)]
	pub restart_on_config_changes: bool,

	/// Take an advisory lock on this file before starting the command
	///
	/// If another guide-dog holds the lock, this one waits for it. The lock is held until
	/// guide-dog exits.
	#[arg(
		short,
		long,
		help_heading = OPTSET_BEHAVIOUR,
		value_name = "PATH",
		value_hint = ValueHint::FilePath,
	)]
	pub lock_file: Option<PathBuf>,

	/// Path to the environment config
	///
	/// A file for the json, yaml and ini formats, a directory for envdir.
	#[arg(
		short = 'p',
		long,
		help_heading = OPTSET_CONFIG,
		value_name = "PATH",
		value_hint = ValueHint::AnyPath,
	)]
	pub config_path: Option<PathBuf>,

	/// Format of the environment config
	///
	/// One of 'none', 'json', 'yaml', 'ini', or 'envdir'.
	#[arg(
		short = 'f',
		long,
		help_heading = OPTSET_CONFIG,
		default_value = "none",
		value_name = "FORMAT",
	)]
	pub config_format: ConfigFormat,

	/// Watch this path for changes too
	///
	/// Use multiple times for several paths. Only used with '--restart-on-config-changes'.
	#[arg(
		short = 'w',
		long = "track",
		help_heading = OPTSET_CONFIG,
		value_name = "PATH",
		value_hint = ValueHint::AnyPath,
	)]
	pub track: Vec<PathBuf>,

	#[command(flatten)]
	pub logging: logging::LoggingArgs,
}

impl Args {
	/// The library configuration these arguments describe.
	pub fn to_config(&self) -> Config {
		let mut config = Config::new(self.command.iter().cloned());
		config.pty = self.pty;
		config.signal = self.signal;
		config.graceful_timeout = self.graceful_timeout.0;
		config.exit_codes = self.exit_codes.iter().copied().collect();
		config.restart_on_failure = self.supervise;
		config.restart_on_config_change = self.restart_on_config_changes;
		config.config_path.clone_from(&self.config_path);
		config.config_format = self.config_format;
		config.paths_to_track.clone_from(&self.track);
		config.lock_file.clone_from(&self.lock_file);
		config.envs = self.env.iter().cloned().collect::<HashMap<_, _>>();
		config
	}
}

/// A duration given either in seconds or as a humantime span.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimeSpan(pub Duration);

impl FromStr for TimeSpan {
	type Err = humantime::DurationError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		s.parse::<u64>().map_or_else(
			|_| humantime::parse_duration(s).map(Self),
			|secs| Ok(Self(Duration::from_secs(secs))),
		)
	}
}

fn parse_env(s: &str) -> Result<(String, String), String> {
	let (name, value) = s.split_once('=').unwrap_or((s, ""));
	if name.is_empty() {
		return Err(format!("missing variable name in {s:?}"));
	}

	Ok((name.to_owned(), value.to_owned()))
}

pub fn get_args() -> Args {
	let args = Args::parse();
	debug!(?args, "got arguments");
	args
}

#[cfg(test)]
mod tests {
	use super::*;

	fn parse(argv: &[&str]) -> Args {
		Args::try_parse_from(std::iter::once("guide-dog").chain(argv.iter().copied())).unwrap()
	}

	#[test]
	fn defaults() {
		let config = parse(&["--", "true"]).to_config();
		assert_eq!(config.command, vec!["true".to_owned()]);
		assert_eq!(config.signal, Signal::Terminate);
		assert_eq!(config.graceful_timeout, Duration::from_secs(5));
		assert_eq!(config.config_format, ConfigFormat::None);
		assert!(config.exit_codes.is_empty());
		assert!(!config.restart_on_failure);
		assert!(!config.restart_on_config_change);
		assert!(!config.pty);
	}

	#[test]
	fn command_keeps_its_own_options() {
		let args = parse(&["-s", "INT", "--", "sh", "-c", "exit 3"]);
		assert_eq!(args.command, vec!["sh", "-c", "exit 3"]);
		assert_eq!(args.signal, Signal::Interrupt);
	}

	#[test]
	fn repeated_flags_accumulate() {
		let config = parse(&[
			"-x", "0", "-x", "3", "-w", "a", "--track", "b", "-e", "A=1", "-e", "B", "--", "true",
		])
		.to_config();
		assert_eq!(config.exit_codes, [0, 3].into_iter().collect());
		assert_eq!(config.paths_to_track, vec![PathBuf::from("a"), PathBuf::from("b")]);
		assert_eq!(config.envs.get("A").map(String::as_str), Some("1"));
		assert_eq!(config.envs.get("B").map(String::as_str), Some(""));
	}

	#[test]
	fn env_values_may_contain_equals() {
		assert_eq!(
			parse_env("URL=a=b").unwrap(),
			("URL".to_owned(), "a=b".to_owned())
		);
		assert!(parse_env("=nothing").is_err());
	}

	#[test]
	fn timeouts() {
		assert_eq!("3".parse::<TimeSpan>().unwrap().0, Duration::from_secs(3));
		assert_eq!(
			"250ms".parse::<TimeSpan>().unwrap().0,
			Duration::from_millis(250)
		);
		assert_eq!(
			"1min 5s".parse::<TimeSpan>().unwrap().0,
			Duration::from_secs(65)
		);
		assert!("soon".parse::<TimeSpan>().is_err());
	}

	#[test]
	fn bad_values_are_rejected() {
		let parse = |argv: &[&str]| {
			Args::try_parse_from(std::iter::once("guide-dog").chain(argv.iter().copied()))
		};
		assert!(parse(&["-s", "SIGNOPE", "--", "true"]).is_err());
		assert!(parse(&["-f", "toml", "--", "true"]).is_err());
		assert!(parse(&[]).is_err());
	}

	#[test]
	fn supervision_flags() {
		let config = parse(&[
			"--supervise",
			"--restart-on-config-changes",
			"--pty",
			"-f",
			"JSON",
			"-p",
			"env.json",
			"-l",
			"run.lock",
			"--",
			"true",
		])
		.to_config();
		assert!(config.restart_on_failure);
		assert!(config.restart_on_config_change);
		assert!(config.pty);
		assert_eq!(config.config_format, ConfigFormat::Json);
		assert_eq!(config.config_path, Some(PathBuf::from("env.json")));
		assert_eq!(config.lock_file, Some(PathBuf::from("run.lock")));
	}
}
