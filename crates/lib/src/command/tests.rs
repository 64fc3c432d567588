use std::{
	collections::HashMap,
	time::{Duration, Instant},
};

use tokio::sync::watch;

use super::{wait_exited, Command, ProcessState, INTERNAL_ERROR, INTERRUPTED, STILL_RUNNING};
use crate::{error::CriticalError, signal::Signal};

fn sh(script: &str) -> Vec<String> {
	vec!["sh".into(), "-c".into(), script.into()]
}

#[tokio::test]
#[cfg(unix)]
async fn natural_exit_code() {
	let command = Command::start(&sh("exit 3"), false, &HashMap::new()).unwrap();
	assert_eq!(command.wait().await, 3);
	assert!(command.stopped());
	assert_eq!(command.exit_code(), 3);
	assert_eq!(command.state(), ProcessState::Exited(3));
}

#[tokio::test]
#[cfg(unix)]
async fn still_running_sentinel() {
	let command = Command::start(&sh("sleep 10"), false, &HashMap::new()).unwrap();
	assert!(!command.stopped());
	assert_eq!(command.exit_code(), STILL_RUNNING);
	command.stop(Signal::Terminate, Duration::from_secs(5)).await;
	assert!(command.stopped());
}

#[tokio::test]
#[cfg(unix)]
async fn signaled_process_is_interrupted() {
	let command = Command::start(&sh("sleep 10"), false, &HashMap::new()).unwrap();
	command.stop(Signal::Terminate, Duration::from_secs(5)).await;
	assert_eq!(command.exit_code(), INTERRUPTED);
}

#[tokio::test]
#[cfg(unix)]
async fn graceful_signal_can_be_handled() {
	let command = Command::start(
		&sh("trap 'exit 7' TERM; while true; do sleep 0.01; done"),
		false,
		&HashMap::new(),
	)
	.unwrap();

	// let the shell install its trap
	tokio::time::sleep(Duration::from_millis(200)).await;
	command.stop(Signal::Terminate, Duration::from_secs(5)).await;
	assert_eq!(command.exit_code(), 7);
}

#[tokio::test]
#[cfg(unix)]
async fn ignored_signal_escalates_to_kill() {
	let command = Command::start(
		&sh("trap '' TERM; while true; do sleep 0.01; done"),
		false,
		&HashMap::new(),
	)
	.unwrap();
	tokio::time::sleep(Duration::from_millis(200)).await;

	let grace = Duration::from_millis(50);
	let begun = Instant::now();
	command.stop(Signal::Terminate, grace).await;
	let took = begun.elapsed();

	assert!(command.stopped());
	assert!(took >= grace, "stopped after {took:?}, before the grace period");
	assert!(took < Duration::from_secs(5), "kill took {took:?}");
	assert_eq!(command.exit_code(), INTERRUPTED);
}

#[tokio::test]
#[cfg(unix)]
async fn stop_after_exit_is_a_noop() {
	let command = Command::start(&sh("exit 4"), false, &HashMap::new()).unwrap();
	command.wait().await;
	command.stop(Signal::ForceStop, Duration::from_millis(1)).await;
	assert_eq!(command.exit_code(), 4);
}

#[tokio::test]
#[cfg(unix)]
async fn environment_is_applied() {
	let envs = HashMap::from([("GUIDEDOG_TEST_VALUE".to_string(), "12".to_string())]);
	let command =
		Command::start(&sh("exit \"$GUIDEDOG_TEST_VALUE\""), false, &envs).unwrap();
	assert_eq!(command.wait().await, 12);
}

#[tokio::test]
async fn missing_program_fails_to_start() {
	let err = Command::start(
		&["guidedog-this-program-does-not-exist".into()],
		false,
		&HashMap::new(),
	)
	.unwrap_err();
	assert!(matches!(err, CriticalError::CommandStart { .. }));
}

#[tokio::test]
async fn empty_command_is_rejected() {
	let err = Command::start(&[], false, &HashMap::new()).unwrap_err();
	assert!(matches!(err, CriticalError::InvalidConfig { .. }));
}

#[tokio::test]
#[cfg(unix)]
async fn pty_child_sees_a_terminal() {
	let command = Command::start(&sh("test -t 0 && test -t 1"), true, &HashMap::new()).unwrap();
	assert_eq!(command.wait().await, 0);
}

#[tokio::test]
async fn waiting_on_a_published_exit() {
	let (state, observed) = watch::channel(ProcessState::Running);
	let waiter = tokio::spawn(wait_exited(observed));
	state.send_replace(ProcessState::Exited(4));
	assert_eq!(waiter.await.unwrap(), 4);
}

#[tokio::test]
async fn vanished_notifier_keeps_the_last_exit() {
	let (state, observed) = watch::channel(ProcessState::Exited(6));
	drop(state);
	assert_eq!(wait_exited(observed).await, 6);
}

#[tokio::test]
async fn vanished_notifier_without_exit_is_an_internal_error() {
	let (state, observed) = watch::channel(ProcessState::Running);
	drop(state);
	assert_eq!(wait_exited(observed).await, INTERNAL_ERROR);
}
