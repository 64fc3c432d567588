use std::{
	future::Future,
	pin::Pin,
	task::{Context, Poll},
	time::Duration,
};

use tokio::{spawn, task::JoinHandle, time::sleep};
use tracing::{debug, info, trace, warn};

use crate::{
	action::mailbox,
	config::Config,
	environment::Environment,
	error::{CriticalError, RuntimeError},
	lockfile::Lockfile,
	sources::{fs, signal},
	supervisor::Supervisor,
};

/// How long to wait between attempts at taking the lock.
pub const LOCK_RETRY_INTERVAL: Duration = Duration::from_millis(5);

/// Supervises the configured command until it ends, and returns its final exit code.
///
/// In order:
/// - validates the config and loads the environment,
/// - takes the lock file if one is configured, retrying until it succeeds,
/// - listens for termination signals, and for changes to the config and tracked paths if enabled,
/// - starts the command, and handles triggers until supervision ends.
///
/// The lock is released and the listeners are stopped on every way out, including errors.
///
/// Fails only when supervision can't happen at all: then no exit code was produced by the
/// command.
pub async fn execute(config: Config) -> Result<i32, CriticalError> {
	debug!(?config, pid=%std::process::id(), version=%env!("CARGO_PKG_VERSION"), "initialising");
	config.validate()?;

	let mut environment = Environment::from_config(&config);
	environment.load()?;

	let _lock = match &config.lock_file {
		Some(path) => Some(acquire(Lockfile::new(path)).await),
		None => None,
	};

	let (actions, receiver) = mailbox(config.mailbox_size);

	let signals = SubTask::spawn("signal", signal::worker(actions.clone()));
	let _watcher = if config.restart_on_config_change {
		fs::watch(&config.watched_paths(), actions.clone())?
	} else {
		None
	};

	let mut supervisor = Supervisor::new(&config, actions, environment);
	supervisor.start().await?;

	let code = tokio::select! {
		res = supervisor.run(receiver) => res?,
		res = signals => {
			// the signal worker only returns early if it couldn't listen
			res?;
			return Err(CriticalError::IoError {
				about: "signal listener ended",
				err: std::io::ErrorKind::BrokenPipe.into(),
			});
		}
	};

	info!(code, "exiting");
	Ok(code)
}

/// Takes the lock, retrying forever.
async fn acquire(mut lock: Lockfile) -> LockGuard {
	let mut announced = false;
	loop {
		match lock.acquire() {
			Ok(()) => {
				info!(path=?lock.path(), "acquired lock");
				return LockGuard(lock);
			}
			Err(err) => {
				let err = RuntimeError::Lock(err);
				if announced {
					trace!(%err, "lock still unavailable");
				} else {
					info!(path=?lock.path(), %err, "waiting for lock");
					announced = true;
				}
				sleep(LOCK_RETRY_INTERVAL).await;
			}
		}
	}
}

/// Releases the lock when dropped.
#[derive(Debug)]
struct LockGuard(Lockfile);

impl Drop for LockGuard {
	fn drop(&mut self) {
		if let Err(err) = self.0.release() {
			warn!(%err, "while releasing lock");
		}
	}
}

#[derive(Debug)]
struct SubTask {
	name: &'static str,
	handle: JoinHandle<Result<(), CriticalError>>,
}

impl SubTask {
	pub fn spawn(
		name: &'static str,
		task: impl Future<Output = Result<(), CriticalError>> + Send + 'static,
	) -> Self {
		debug!(subtask=%name, "spawning subtask");
		Self {
			name,
			handle: spawn(task),
		}
	}
}

impl Drop for SubTask {
	fn drop(&mut self) {
		debug!(subtask=%self.name, "aborting subtask");
		self.handle.abort();
	}
}

impl Future for SubTask {
	type Output = Result<(), CriticalError>;

	fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
		let subtask = self.name;
		match Pin::new(&mut Pin::into_inner(self).handle).poll(cx) {
			Poll::Pending => Poll::Pending,
			Poll::Ready(join_res) => {
				debug!(%subtask, "finishing subtask");
				Poll::Ready(join_res.map_err(CriticalError::TaskJoin).and_then(|x| x))
			}
		}
	}
}
