//! A single supervised process: start, observe, stop with escalation.

use std::{collections::HashMap, fmt, time::Duration};

use tokio::{
	process::Command as TokioCommand,
	spawn,
	sync::{mpsc, watch},
	time::timeout,
};
use tracing::{debug, trace, warn};

use crate::{error::CriticalError, signal::Signal};

#[doc(inline)]
pub use process::ProcessState;

pub(crate) use process::wait_exited;

mod process;
mod pty;

#[cfg(test)]
mod tests;

/// Exit code reported while the process has not exited yet.
pub const STILL_RUNNING: i32 = -1;

/// Exit code reported when the process was terminated by a signal.
pub const INTERRUPTED: i32 = 130;

/// Exit code reported when the process status could not be obtained.
pub const INTERNAL_ERROR: i32 = 70;

/// One invocation of an external program.
///
/// A `Command` supervises exactly one OS process for its whole lifetime and is never restarted in
/// place: a restart creates a new `Command`.
///
/// The process is owned by a background completion notifier task, which is the only writer of the
/// [`ProcessState`]. Everything else observes it through a [`watch`] channel, so the state queries
/// here never block.
pub struct Command {
	program: String,
	pid: Option<u32>,
	pty: bool,
	interventions: mpsc::UnboundedSender<Signal>,
	state: watch::Receiver<ProcessState>,
}

impl fmt::Debug for Command {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Command")
			.field("program", &self.program)
			.field("pid", &self.pid)
			.field("pty", &self.pty)
			.field("state", &*self.state.borrow())
			.finish_non_exhaustive()
	}
}

impl Command {
	/// Spawns the process described by `args`.
	///
	/// The first element of `args` is the program, the rest are passed as arguments. `envs` are
	/// set on top of the inherited environment.
	///
	/// With `pty`, the process gets a fresh pseudo-terminal as its controlling terminal and its
	/// standard streams, which is bridged to our own standard streams until the process exits.
	/// Otherwise the process inherits our standard streams directly.
	///
	/// Must be called from within a Tokio runtime.
	pub fn start(
		args: &[String],
		pty: bool,
		envs: &HashMap<String, String>,
	) -> Result<Self, CriticalError> {
		let (program, rest) = args
			.split_first()
			.ok_or(CriticalError::InvalidConfig {
				reason: "the command line is empty",
			})?;

		let mut command = TokioCommand::new(program);
		command.args(rest).envs(envs);

		let attachment = if pty {
			Some(pty::attach(&mut command).map_err(CriticalError::Pty)?)
		} else {
			None
		};

		trace!(?command, "spawning command");
		let mut child = command.spawn().map_err(|err| CriticalError::CommandStart {
			program: program.clone(),
			err,
		})?;

		// the pty slave ends held by the builder must close in this process
		drop(command);

		let pid = child.id();
		let session = match attachment.map(pty::Attachment::start).transpose() {
			Ok(session) => session,
			Err(err) => {
				child.start_kill().ok();
				return Err(CriticalError::Pty(err));
			}
		};

		debug!(%program, ?pid, pty, "spawned command");

		let (int_s, int_r) = mpsc::unbounded_channel();
		let (state_s, state_r) = watch::channel(ProcessState::Running);
		spawn(process::notifier(child, int_r, state_s, session));

		Ok(Self {
			program: program.clone(),
			pid,
			pty,
			interventions: int_s,
			state: state_r,
		})
	}

	/// The OS process ID, if the process was still around right after spawning.
	#[must_use]
	pub const fn pid(&self) -> Option<u32> {
		self.pid
	}

	/// The last known state of the process.
	#[must_use]
	pub fn state(&self) -> ProcessState {
		*self.state.borrow()
	}

	/// Returns true once the process has been observed to exit.
	#[must_use]
	pub fn stopped(&self) -> bool {
		self.state().is_finished()
	}

	/// The exit code of the process.
	///
	/// Only meaningful once [`stopped()`](Self::stopped) is true; before that this returns
	/// [`STILL_RUNNING`].
	#[must_use]
	pub fn exit_code(&self) -> i32 {
		self.state().exit_code()
	}

	/// A receiver of process state changes.
	///
	/// Used by observers which must not hold on to the `Command` itself.
	#[must_use]
	pub fn subscribe(&self) -> watch::Receiver<ProcessState> {
		self.state.clone()
	}

	/// Waits for the process to exit and returns its exit code.
	pub async fn wait(&self) -> i32 {
		wait_exited(self.state.clone()).await
	}

	/// Sends a signal to the process.
	///
	/// This returns once the signal has been queued internally, not when it has been delivered.
	/// Does nothing if the process has already exited.
	pub fn signal(&self, signal: Signal) {
		trace!(%signal, pid=?self.pid, "sending signal intervention");
		// only errors when the notifier is gone, which only happens if the process is dead
		self.interventions.send(signal).ok();
	}

	/// Stops the process, gracefully if possible.
	///
	/// Sends `signal`, then waits up to `grace` for the process to exit. If it hasn't, sends
	/// [`Signal::ForceStop`] and waits for the exit without bound. Returns only once the process
	/// has terminated. Does nothing if the process has already exited.
	pub async fn stop(&self, signal: Signal, grace: Duration) {
		if self.stopped() {
			trace!(pid=?self.pid, "process already stopped");
			return;
		}

		debug!(pid=?self.pid, %signal, ?grace, "stopping process");
		self.signal(signal);

		if let Ok(code) = timeout(grace, self.wait()).await {
			debug!(pid=?self.pid, code, "process stopped gracefully");
			return;
		}

		warn!(pid=?self.pid, ?grace, "process did not stop in time, killing it");
		self.signal(Signal::ForceStop);
		let code = self.wait().await;
		debug!(pid=?self.pid, code, "process killed");
	}
}
