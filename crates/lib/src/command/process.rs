use std::process::ExitStatus;

use tokio::{
	process::Child,
	select,
	sync::{mpsc, watch},
};
use tracing::{debug, error, trace, warn};

use crate::signal::Signal;

use super::{pty::Session, INTERNAL_ERROR, INTERRUPTED, STILL_RUNNING};

/// The lifecycle of a supervised process.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ProcessState {
	/// Not spawned yet.
	#[default]
	NotStarted,

	/// Spawned and not yet reaped.
	Running,

	/// Reaped, with its exit code.
	///
	/// Processes terminated by a signal report [`INTERRUPTED`], and those whose status could not
	/// be read report [`INTERNAL_ERROR`].
	Exited(i32),
}

impl ProcessState {
	/// Whether the process has exited.
	#[must_use]
	pub const fn is_finished(self) -> bool {
		matches!(self, Self::Exited(_))
	}

	/// The exit code, or [`STILL_RUNNING`] if the process hasn't exited.
	#[must_use]
	pub const fn exit_code(self) -> i32 {
		match self {
			Self::Exited(code) => code,
			Self::NotStarted | Self::Running => STILL_RUNNING,
		}
	}
}

impl From<ExitStatus> for ProcessState {
	fn from(status: ExitStatus) -> Self {
		Self::Exited(match status.code() {
			Some(code) if code >= 0 => code,
			_ => INTERRUPTED,
		})
	}
}

/// Waits until the observed process has exited and returns its code.
pub(crate) async fn wait_exited(mut state: watch::Receiver<ProcessState>) -> i32 {
	let waited = state
		.wait_for(|s| s.is_finished())
		.await
		.map(|s| s.exit_code());

	match waited {
		Ok(code) => code,
		Err(_) => {
			// the notifier went away without reporting: nothing will ever tell us more
			let last = *state.borrow();
			if last.is_finished() {
				last.exit_code()
			} else {
				error!("process notifier vanished before reporting an exit");
				INTERNAL_ERROR
			}
		}
	}
}

/// The completion notifier: owns the child until it is reaped.
///
/// Signals arriving on `interventions` are delivered to the child. Once the child exits, the pty
/// session (if any) is torn down and only then is the exit published, so that observers never see
/// a finished process with a terminal still in raw mode.
pub(super) async fn notifier(
	mut child: Child,
	mut interventions: mpsc::UnboundedReceiver<Signal>,
	state: watch::Sender<ProcessState>,
	session: Option<Session>,
) {
	let pid = child.id();
	let exited = loop {
		select! {
			status = child.wait() => {
				break match status {
					Ok(status) => {
						debug!(?pid, ?status, "process exited");
						ProcessState::from(status)
					}
					Err(err) => {
						error!(?pid, %err, "while waiting on process");
						ProcessState::Exited(INTERNAL_ERROR)
					}
				};
			}
			Some(sig) = interventions.recv() => deliver(&mut child, sig),
		}
	};

	if let Some(session) = session {
		session.teardown().await;
	}

	trace!(?pid, ?exited, "publishing process exit");
	state.send_replace(exited);
}

#[cfg(unix)]
fn deliver(child: &mut Child, sig: Signal) {
	use nix::{errno::Errno, sys::signal::kill, unistd::Pid};

	let Some(pid) = child.id().and_then(|pid| i32::try_from(pid).ok()) else {
		trace!(%sig, "process already reaped, not signaling");
		return;
	};

	let Some(nix_sig) = sig.to_nix() else {
		warn!(%sig, "signal not supported on this platform, ignoring");
		return;
	};

	debug!(%sig, pid, "sending signal to process");
	match kill(Pid::from_raw(pid), nix_sig) {
		Ok(()) | Err(Errno::ESRCH) => {}
		Err(err) => warn!(%sig, pid, %err, "while sending signal to process"),
	}
}

#[cfg(not(unix))]
fn deliver(child: &mut Child, sig: Signal) {
	if matches!(sig, Signal::Custom(_)) {
		warn!(%sig, "signal not supported on this platform, ignoring");
		return;
	}

	debug!(%sig, pid=?child.id(), "terminating process");
	if let Err(err) = child.start_kill() {
		warn!(%err, "while terminating process");
	}
}
