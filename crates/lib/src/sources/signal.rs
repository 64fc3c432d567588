//! Trigger source for signals sent to the supervisor itself.
//!
//! Every termination signal received becomes a [`Stop`](SupervisorAction::Stop).

use tokio::select;
use tracing::{debug, trace};

use crate::{
	action::{ActionSender, SupervisorAction, Trigger, TriggerSource},
	error::CriticalError,
	signal::Signal,
};

/// Launch the signal worker.
///
/// This runs until aborted. While you _can_ run several, you **must** only have one.
pub async fn worker(actions: ActionSender) -> Result<(), CriticalError> {
	imp_worker(actions).await
}

#[cfg(unix)]
async fn imp_worker(actions: ActionSender) -> Result<(), CriticalError> {
	use tokio::signal::unix::{signal, SignalKind};

	debug!("launching unix signal worker");

	macro_rules! listen {
		($sig:ident) => {{
			trace!(kind=%stringify!($sig), "listening for unix signal");
			signal(SignalKind::$sig()).map_err(|err| CriticalError::IoError {
				about: concat!("setting ", stringify!($sig), " signal listener"),
				err,
			})?
		}};
	}

	let mut s_hangup = listen!(hangup);
	let mut s_interrupt = listen!(interrupt);
	let mut s_quit = listen!(quit);
	let mut s_terminate = listen!(terminate);

	loop {
		let sig = select!(
			_ = s_hangup.recv() => Signal::Hangup,
			_ = s_interrupt.recv() => Signal::Interrupt,
			_ = s_quit.recv() => Signal::Quit,
			_ = s_terminate.recv() => Signal::Terminate,
		);

		debug!(%sig, "received unix signal");
		send_stop(&actions);
	}
}

#[cfg(windows)]
async fn imp_worker(actions: ActionSender) -> Result<(), CriticalError> {
	use tokio::signal::windows::{ctrl_break, ctrl_c};

	debug!("launching windows signal worker");

	macro_rules! listen {
		($sig:ident) => {{
			trace!(kind=%stringify!($sig), "listening for windows process notification");
			$sig().map_err(|err| CriticalError::IoError {
				about: concat!("setting ", stringify!($sig), " signal listener"),
				err,
			})?
		}};
	}

	let mut sigint = listen!(ctrl_c);
	let mut sigbreak = listen!(ctrl_break);

	loop {
		let sig = select!(
			_ = sigint.recv() => Signal::Interrupt,
			_ = sigbreak.recv() => Signal::Terminate,
		);

		debug!(%sig, "received windows process notification");
		send_stop(&actions);
	}
}

fn send_stop(actions: &ActionSender) {
	let trigger = Trigger::new(SupervisorAction::Stop, TriggerSource::Signal);
	trace!(?trigger, "processed signal into trigger");
	actions.offer(trigger);
}
