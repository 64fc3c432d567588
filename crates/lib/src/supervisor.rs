//! The restart-policy state machine around a [`Command`].

use std::{
	collections::HashSet,
	sync::{
		atomic::{AtomicU64, AtomicUsize, Ordering},
		Arc,
	},
	time::Duration,
};

use tokio::{select, spawn, sync::mpsc, task::JoinHandle};
use tracing::{debug, error, info, trace, warn};

use crate::{
	action::{ActionReceiver, ActionSender, SupervisorAction, Trigger, TriggerSource},
	command::{wait_exited, Command, INTERNAL_ERROR},
	config::Config,
	environment::Environment,
	error::CriticalError,
	signal::Signal,
};

/// Owns the supervised [`Command`] and applies the restart policy.
///
/// There is at most one `Command` at a time, and at most one observer task watching it: a
/// keepalive observer when restarting on failure, an exit-code observer otherwise. Every
/// transition is driven from [`signal()`](Self::signal), which [`run()`](Self::run) calls with each
/// trigger received from the mailbox, so transitions never overlap.
///
/// Observers never touch the `Command`. The keepalive observer offers a [`Trigger`] tagged with
/// the generation of the command it watched, and triggers for a superseded generation are dropped.
#[derive(Debug)]
pub struct Supervisor {
	command_line: Vec<String>,
	pty: bool,
	signal: Signal,
	grace: Duration,
	exit_codes: Arc<HashSet<i32>>,
	restart_on_failure: bool,
	environment: Environment,

	command: Option<Command>,
	observer: Option<JoinHandle<()>>,
	generation: u64,

	actions: ActionSender,
	exits: mpsc::Sender<(u64, i32)>,
	exit_codes_out: mpsc::Receiver<(u64, i32)>,
	gauge: Gauge,
}

impl Supervisor {
	/// Creates an idle supervisor.
	///
	/// Restart requests from the keepalive observer are offered to `actions`, which should feed
	/// the receiver later given to [`run()`](Self::run).
	#[must_use]
	pub fn new(config: &Config, actions: ActionSender, environment: Environment) -> Self {
		let (exits, exit_codes_out) = mpsc::channel(1);
		Self {
			command_line: config.command.clone(),
			pty: config.pty,
			signal: config.signal,
			grace: config.graceful_timeout,
			exit_codes: Arc::new(config.exit_codes.clone()),
			restart_on_failure: config.restart_on_failure,
			environment,
			command: None,
			observer: None,
			generation: 0,
			actions,
			exits,
			exit_codes_out,
			gauge: Gauge::default(),
		}
	}

	/// Instrumentation shared with the observers.
	#[must_use]
	pub fn gauge(&self) -> Gauge {
		self.gauge.clone()
	}

	/// The current command, if any.
	#[must_use]
	pub const fn command(&self) -> Option<&Command> {
		self.command.as_ref()
	}

	/// Stops any previous command, then starts a new one and its observer.
	///
	/// The environment is reloaded before each start.
	pub async fn start(&mut self) -> Result<(), CriticalError> {
		self.stop().await;

		self.environment.refresh();
		let command = Command::start(&self.command_line, self.pty, &self.environment.variables())?;

		self.generation += 1;
		self.gauge.0.starts.fetch_add(1, Ordering::SeqCst);
		info!(generation=%self.generation, pid=?command.pid(), "started command");

		let state = command.subscribe();
		let live = self.gauge.enter();
		let observer = if self.restart_on_failure {
			let actions = self.actions.clone();
			let exit_codes = self.exit_codes.clone();
			let generation = self.generation;
			spawn(async move {
				let _live = live;
				let code = wait_exited(state).await;
				let action = if exit_codes.contains(&code) {
					debug!(code, generation, "command exited intentionally");
					SupervisorAction::Stop
				} else {
					info!(code, generation, "command failed, restarting");
					SupervisorAction::Restart
				};

				actions.offer(Trigger::new(action, TriggerSource::Observer { generation }));
			})
		} else {
			let exits = self.exits.clone();
			let generation = self.generation;
			spawn(async move {
				let _live = live;
				let code = wait_exited(state).await;
				debug!(code, generation, "command exited");
				exits.send((generation, code)).await.ok();
			})
		};

		self.command = Some(command);
		self.observer = Some(observer);
		Ok(())
	}

	/// Stops the current command, after the observer has quiesced.
	///
	/// Once this returns, no observer is alive and the command (if any) has terminated.
	async fn stop(&mut self) {
		if let Some(observer) = self.observer.take() {
			trace!("cancelling observer");
			observer.abort();
			if let Err(err) = observer.await {
				if !err.is_cancelled() {
					error!(%err, "observer task failed");
				}
			}
		}

		if let Some(command) = &self.command {
			command.stop(self.signal, self.grace).await;
		}
	}

	/// Applies a trigger.
	///
	/// Returns the final exit code once supervision has ended.
	pub async fn signal(&mut self, trigger: Trigger) -> Result<Option<i32>, CriticalError> {
		if let TriggerSource::Observer { generation } = trigger.source {
			if generation != self.generation {
				debug!(?trigger, current=%self.generation, "dropping trigger for a superseded command");
				return Ok(None);
			}
		}

		debug!(?trigger, "applying trigger");
		match trigger.action {
			SupervisorAction::Restart => {
				self.start().await?;
				Ok(None)
			}
			SupervisorAction::Stop => {
				self.stop().await;
				let code = self
					.command
					.as_ref()
					.map_or(INTERNAL_ERROR, Command::exit_code);
				info!(code, "supervision ended");
				Ok(Some(code))
			}
		}
	}

	/// Handles triggers until supervision ends, and returns the final exit code.
	///
	/// The command should have been [started](Self::start) already.
	pub async fn run(mut self, mut actions: ActionReceiver) -> Result<i32, CriticalError> {
		loop {
			select! {
				biased;

				Some((generation, code)) = self.exit_codes_out.recv() => {
					if generation != self.generation {
						debug!(generation, code, "dropping exit of a superseded command");
						continue;
					}

					self.stop().await;
					info!(code, "supervision ended");
					return Ok(code);
				}
				trigger = actions.recv() => {
					let Some(trigger) = trigger else {
						warn!("action mailbox closed, stopping");
						self.stop().await;
						return Err(CriticalError::MailboxClosed);
					};

					if let Some(code) = self.signal(trigger).await? {
						return Ok(code);
					}
				}
			}
		}
	}
}

/// Counts observers and starts.
///
/// At most one observer is ever alive; `peak()` records the most seen at once.
#[derive(Clone, Debug, Default)]
pub struct Gauge(Arc<GaugeInner>);

#[derive(Debug, Default)]
struct GaugeInner {
	live: AtomicUsize,
	peak: AtomicUsize,
	starts: AtomicU64,
}

impl Gauge {
	fn enter(&self) -> LiveObserver {
		let now = self.0.live.fetch_add(1, Ordering::SeqCst) + 1;
		self.0.peak.fetch_max(now, Ordering::SeqCst);
		LiveObserver(self.clone())
	}

	/// Observers alive right now.
	#[must_use]
	pub fn live(&self) -> usize {
		self.0.live.load(Ordering::SeqCst)
	}

	/// The most observers ever alive at once.
	#[must_use]
	pub fn peak(&self) -> usize {
		self.0.peak.load(Ordering::SeqCst)
	}

	/// How many commands have been started.
	#[must_use]
	pub fn starts(&self) -> u64 {
		self.0.starts.load(Ordering::SeqCst)
	}
}

#[derive(Debug)]
struct LiveObserver(Gauge);

impl Drop for LiveObserver {
	fn drop(&mut self) {
		self.0 .0.live.fetch_sub(1, Ordering::SeqCst);
	}
}
