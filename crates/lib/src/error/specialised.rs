use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

/// Errors emitted by the filesystem watcher.
#[derive(Debug, Diagnostic, Error)]
#[non_exhaustive]
pub enum FsWatcherError {
	/// Error received when creating a filesystem watcher fails.
	///
	/// Also see `TooManyWatches` and `TooManyHandles`.
	#[error("failed to instantiate")]
	Create(#[source] notify::Error),

	/// Error received when creating or updating a filesystem watcher fails because there are too many watches.
	///
	/// This is the OS error 28 on Linux.
	#[error("failed to instantiate: too many watches")]
	#[cfg_attr(
		target_os = "linux",
		diagnostic(help("you will want to increase your inotify.max_user_watches, see inotify(7)"))
	)]
	TooManyWatches(#[source] notify::Error),

	/// Error received when creating or updating a filesystem watcher fails because there are too many file handles open.
	///
	/// This is the OS error 24 on Linux. It may also occur when the limit for inotify instances is reached.
	#[error("failed to instantiate: too many handles")]
	#[cfg_attr(
		target_os = "linux",
		diagnostic(help("you will want to increase your `nofile` limit, see pam_limits(8)"))
	)]
	TooManyHandles(#[source] notify::Error),

	/// Error received when reading a filesystem event fails.
	#[error("received an event that we could not read")]
	Event(#[source] notify::Error),

	/// Error received when adding a path to the watcher fails.
	#[error("while adding {path:?}")]
	PathAdd {
		/// The path that was attempted to be added.
		path: PathBuf,

		/// The underlying error.
		#[source]
		err: notify::Error,
	},
}

/// Errors emitted by the advisory [`Lockfile`](crate::lockfile::Lockfile).
#[derive(Debug, Diagnostic, Error)]
#[non_exhaustive]
pub enum LockError {
	/// This instance already holds the lock.
	#[error("lock {path:?} is already held by this instance")]
	#[diagnostic(code(guidedog::lock::already_held))]
	AlreadyHeld {
		/// The lock file path.
		path: PathBuf,
	},

	/// This instance does not hold the lock.
	#[error("lock {path:?} is not held")]
	#[diagnostic(code(guidedog::lock::not_held))]
	NotHeld {
		/// The lock file path.
		path: PathBuf,
	},

	/// The lock file could not be opened or created.
	#[error("cannot open lock file {path:?}")]
	#[diagnostic(code(guidedog::lock::open))]
	Open {
		/// The lock file path.
		path: PathBuf,

		/// The underlying error.
		#[source]
		err: std::io::Error,
	},

	/// Someone else holds the lock, or locking failed outright.
	#[error("cannot lock {path:?}")]
	#[diagnostic(code(guidedog::lock::contended))]
	Contended {
		/// The lock file path.
		path: PathBuf,

		/// The underlying error.
		#[source]
		err: std::io::Error,
	},

	/// Unlocking failed. The handle is closed regardless.
	#[error("cannot unlock {path:?}")]
	#[diagnostic(code(guidedog::lock::release))]
	Release {
		/// The lock file path.
		path: PathBuf,

		/// The underlying error.
		#[source]
		err: std::io::Error,
	},
}

/// Errors emitted while loading environment variables from a config.
#[derive(Debug, Diagnostic, Error)]
#[non_exhaustive]
pub enum EnvironmentError {
	/// The config format name is not one we know.
	#[error("unknown config format `{0}`")]
	#[diagnostic(
		code(guidedog::environment::unknown_format),
		help("supported formats are: none, json, yaml, ini, envdir")
	)]
	UnknownFormat(String),

	/// A config format was given without a config path.
	#[error("config format `{0}` needs a config path")]
	#[diagnostic(code(guidedog::environment::missing_path))]
	MissingPath(String),

	/// The config file or directory could not be read.
	#[error("cannot read {path:?}")]
	#[diagnostic(code(guidedog::environment::read))]
	Read {
		/// The path that was read.
		path: PathBuf,

		/// The underlying error.
		#[source]
		err: std::io::Error,
	},

	/// The config is not valid JSON.
	#[error("cannot parse {path:?} as json")]
	#[diagnostic(code(guidedog::environment::json))]
	Json {
		/// The path that was parsed.
		path: PathBuf,

		/// The underlying error.
		#[source]
		err: serde_json::Error,
	},

	/// The config is not valid YAML.
	#[error("cannot parse {path:?} as yaml")]
	#[diagnostic(code(guidedog::environment::yaml))]
	Yaml {
		/// The path that was parsed.
		path: PathBuf,

		/// The underlying error.
		#[source]
		err: serde_yaml::Error,
	},

	/// A line of an INI config could not be understood.
	#[error("cannot parse {path:?} as ini")]
	#[diagnostic(code(guidedog::environment::ini))]
	Ini {
		/// The path that was parsed.
		path: PathBuf,

		/// The underlying error, with its line and column.
		#[source]
		err: ini::ParseError,
	},

	/// The top-level document is not a key-value mapping.
	#[error("{path:?} is not a mapping of names to values")]
	#[diagnostic(code(guidedog::environment::not_a_mapping))]
	NotAMapping {
		/// The path that was parsed.
		path: PathBuf,
	},

	/// A value cannot be turned into an environment variable.
	#[error("value of `{key}` in {path:?} cannot be converted to a string")]
	#[diagnostic(
		code(guidedog::environment::unsupported_value),
		help("only strings and integers are supported")
	)]
	UnsupportedValue {
		/// The path that was parsed.
		path: PathBuf,

		/// The offending key.
		key: String,
	},
}

/// Error when parsing a signal from string.
#[derive(Debug, Diagnostic, Error)]
#[error("invalid signal `{src}`: {err}")]
#[diagnostic(code(guidedog::signal::parse))]
pub struct SignalParseError {
	// The string that was parsed.
	#[source_code]
	src: String,

	// The error that occurred.
	err: String,

	// The span of the source which is in error.
	#[label = "invalid signal"]
	span: (usize, usize),
}

impl SignalParseError {
	pub(crate) fn new(src: &str, err: &str) -> Self {
		Self {
			src: src.to_owned(),
			err: err.to_owned(),
			span: (0, src.len()),
		}
	}
}
