//! Actions requested of the supervisor, and the mailbox they travel through.
//!
//! Every transition of the supervisor goes through one [`ActionReceiver`], so they are totally
//! ordered. Signal and filesystem triggers are coalesced per source: while one of them is pending,
//! another of the same kind is dropped instead of queued.

use std::sync::{
	atomic::{AtomicBool, Ordering},
	Arc,
};

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, trace, warn};

/// What the supervisor should do next.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SupervisorAction {
	/// Stop the command and end supervision with its exit code.
	Stop,

	/// Stop the command and start a new one.
	Restart,
}

/// Where a [`Trigger`] comes from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TriggerSource {
	/// An OS signal sent to the supervisor.
	Signal,

	/// A change to a watched file.
	Filesystem,

	/// The observer of the command with this generation saw it exit.
	Observer {
		/// Which start of the command this is about.
		generation: u64,
	},
}

impl TriggerSource {
	/// Index of the pending flag for sources which coalesce.
	const fn slot(self) -> Option<usize> {
		match self {
			Self::Signal => Some(0),
			Self::Filesystem => Some(1),
			Self::Observer { .. } => None,
		}
	}
}

/// An action, tagged with its source.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Trigger {
	/// The requested action.
	pub action: SupervisorAction,

	/// Where it came from.
	pub source: TriggerSource,
}

impl Trigger {
	/// Creates a new trigger.
	#[must_use]
	pub const fn new(action: SupervisorAction, source: TriggerSource) -> Self {
		Self { action, source }
	}
}

#[derive(Debug, Default)]
struct Pending([AtomicBool; 2]);

/// Creates a mailbox holding at most `capacity` triggers.
#[must_use]
pub fn mailbox(capacity: usize) -> (ActionSender, ActionReceiver) {
	let (s, r) = mpsc::channel(capacity.max(1));
	let pending = Arc::new(Pending::default());
	(
		ActionSender {
			inner: s,
			pending: pending.clone(),
		},
		ActionReceiver { inner: r, pending },
	)
}

/// The sending half of the mailbox. Cheap to clone.
#[derive(Clone, Debug)]
pub struct ActionSender {
	inner: mpsc::Sender<Trigger>,
	pending: Arc<Pending>,
}

impl ActionSender {
	/// Offers a trigger to the supervisor.
	///
	/// Returns `false` if the trigger was dropped: because one of the same kind is already
	/// pending, because the mailbox is full, or because the supervisor is gone.
	pub fn offer(&self, trigger: Trigger) -> bool {
		let flag = trigger.source.slot().map(|i| &self.pending.0[i]);
		if let Some(flag) = flag {
			if flag.swap(true, Ordering::AcqRel) {
				trace!(?trigger, "same kind of trigger already pending, dropping");
				return false;
			}
		}

		match self.inner.try_send(trigger) {
			Ok(()) => {
				debug!(?trigger, "trigger queued");
				true
			}
			Err(err) => {
				if let Some(flag) = flag {
					flag.store(false, Ordering::Release);
				}

				match err {
					TrySendError::Full(trigger) => warn!(?trigger, "action mailbox full, dropping"),
					TrySendError::Closed(trigger) => {
						trace!(?trigger, "action mailbox closed, dropping");
					}
				}
				false
			}
		}
	}
}

/// The receiving half of the mailbox, owned by the supervisor control loop.
#[derive(Debug)]
pub struct ActionReceiver {
	inner: mpsc::Receiver<Trigger>,
	pending: Arc<Pending>,
}

impl ActionReceiver {
	/// Receives the next trigger, or `None` once every sender is gone.
	///
	/// This is cancel safe.
	pub async fn recv(&mut self) -> Option<Trigger> {
		let trigger = self.inner.recv().await?;
		if let Some(i) = trigger.source.slot() {
			self.pending.0[i].store(false, Ordering::Release);
		}
		Some(trigger)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn coalesces_same_source() {
		let (s, mut r) = mailbox(8);
		let restart = Trigger::new(SupervisorAction::Restart, TriggerSource::Filesystem);
		assert!(s.offer(restart));
		assert!(!s.offer(restart));
		assert!(!s.offer(restart));

		assert_eq!(r.recv().await, Some(restart));
		assert!(s.offer(restart), "flag clears once consumed");
		assert_eq!(r.recv().await, Some(restart));
	}

	#[tokio::test]
	async fn sources_are_independent() {
		let (s, mut r) = mailbox(8);
		let restart = Trigger::new(SupervisorAction::Restart, TriggerSource::Filesystem);
		let stop = Trigger::new(SupervisorAction::Stop, TriggerSource::Signal);
		assert!(s.offer(restart));
		assert!(s.offer(stop));

		assert_eq!(r.recv().await, Some(restart));
		assert_eq!(r.recv().await, Some(stop));
	}

	#[tokio::test]
	async fn observers_are_not_coalesced() {
		let (s, mut r) = mailbox(8);
		let first = Trigger::new(
			SupervisorAction::Restart,
			TriggerSource::Observer { generation: 1 },
		);
		let second = Trigger::new(
			SupervisorAction::Restart,
			TriggerSource::Observer { generation: 2 },
		);
		assert!(s.offer(first));
		assert!(s.offer(second));
		assert_eq!(r.recv().await, Some(first));
		assert_eq!(r.recv().await, Some(second));
	}

	#[tokio::test]
	async fn full_mailbox_does_not_wedge_the_flag() {
		let (s, mut r) = mailbox(1);
		let observed = Trigger::new(
			SupervisorAction::Stop,
			TriggerSource::Observer { generation: 1 },
		);
		let stop = Trigger::new(SupervisorAction::Stop, TriggerSource::Signal);
		assert!(s.offer(observed));
		assert!(!s.offer(stop));

		assert_eq!(r.recv().await, Some(observed));
		assert!(s.offer(stop));
	}
}
