use miette::Diagnostic;
use thiserror::Error;
use tokio::task::JoinError;

use super::{EnvironmentError, FsWatcherError};

/// Errors which are not recoverable and stop supervision.
///
/// When one of these comes out of [`execute()`](crate::execute()), no exit code was produced by
/// the child; callers are expected to exit with their own failure code.
#[derive(Debug, Diagnostic, Error)]
#[non_exhaustive]
pub enum CriticalError {
	/// The finalized configuration cannot be supervised.
	#[error("invalid configuration: {reason}")]
	#[diagnostic(code(guidedog::critical::invalid_config))]
	InvalidConfig {
		/// What is wrong with it.
		reason: &'static str,
	},

	/// The environment could not be loaded before the first start.
	#[error("cannot load environment")]
	#[diagnostic(code(guidedog::critical::environment))]
	Environment(#[from] EnvironmentError),

	/// A critical I/O error occurred.
	#[error("io({about}): {err}")]
	#[diagnostic(code(guidedog::critical::io_error))]
	IoError {
		/// What it was about.
		about: &'static str,

		/// The I/O error which occurred.
		#[source]
		err: std::io::Error,
	},

	/// The command could not be spawned at all.
	#[error("cannot start command `{program}`")]
	#[diagnostic(
		code(guidedog::critical::command_start),
		help("check that the program exists and is executable")
	)]
	CommandStart {
		/// The program which was attempted.
		program: String,

		/// The underlying error.
		#[source]
		err: std::io::Error,
	},

	/// A pseudo-terminal was requested but could not be set up.
	#[error("cannot set up a pseudo-terminal")]
	#[diagnostic(code(guidedog::critical::pty))]
	Pty(#[source] std::io::Error),

	/// Error received when the filesystem watcher can't initialise.
	#[error("fs: cannot initialise watcher")]
	#[diagnostic(code(guidedog::critical::fs_watcher_init))]
	FsWatcherInit(#[source] FsWatcherError),

	/// Every sender of the action mailbox is gone while supervision was still running.
	#[error("action mailbox closed before the command was stopped")]
	#[diagnostic(code(guidedog::critical::mailbox_closed))]
	MailboxClosed,

	/// Error received when joining a background task.
	#[error("task join: {0}")]
	#[diagnostic(code(guidedog::critical::task_join))]
	TaskJoin(#[source] JoinError),
}
