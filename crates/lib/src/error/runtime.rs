use miette::Diagnostic;
use thiserror::Error;

use super::{EnvironmentError, FsWatcherError, LockError};

/// Errors which only affect a part of the operation, and should be reported to the user, but
/// will not stop supervision.
#[derive(Debug, Diagnostic, Error)]
#[non_exhaustive]
pub enum RuntimeError {
	/// Errors from the filesystem watcher event source.
	#[error("fs watcher error: {0}")]
	#[diagnostic(code(guidedog::runtime::fs_watcher))]
	FsWatcher(#[source] FsWatcherError),

	/// The environment could not be reloaded; the previous variables stay in effect.
	#[error("environment reload: {0}")]
	#[diagnostic(code(guidedog::runtime::environment))]
	Environment(#[source] EnvironmentError),

	/// An attempt to take the lock file failed; it will be retried.
	#[error("lock attempt: {0}")]
	#[diagnostic(code(guidedog::runtime::lock))]
	Lock(#[source] LockError),
}
