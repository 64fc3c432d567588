//! Trigger source for changes to the config and tracked paths.
//!
//! Every relevant change becomes a [`Restart`](SupervisorAction::Restart). There is no debouncing
//! beyond the mailbox coalescing: while a restart from here is pending, further changes are
//! dropped.

use std::{
	collections::HashMap,
	io::ErrorKind,
	path::{Path, PathBuf},
};

use notify::{event::EventKind, RecommendedWatcher, RecursiveMode, Watcher as _};
use tracing::{debug, error, trace, warn};

use crate::{
	action::{ActionSender, SupervisorAction, Trigger, TriggerSource},
	error::{CriticalError, FsWatcherError, RuntimeError},
};

/// A running filesystem watcher. Watching stops when this is dropped.
#[derive(Debug)]
pub struct FsWatcher {
	_watcher: RecommendedWatcher,
	paths: Vec<PathBuf>,
}

impl FsWatcher {
	/// The paths which are actually watched, canonicalised.
	#[must_use]
	pub fn paths(&self) -> &[PathBuf] {
		&self.paths
	}
}

/// A path we want change events for.
#[derive(Clone, Debug)]
enum Tracked {
	/// Anything under this directory.
	Dir(PathBuf),

	/// This file, through a watch on its parent directory.
	File { file: PathBuf, parent: PathBuf },
}

impl Tracked {
	fn new(path: &Path) -> std::io::Result<Self> {
		let path = path.canonicalize()?;
		if path.is_dir() {
			return Ok(Self::Dir(path));
		}

		let parent = path
			.parent()
			.map(Path::to_path_buf)
			.ok_or_else(|| std::io::Error::new(ErrorKind::InvalidInput, "file has no parent"))?;
		Ok(Self::File { file: path, parent })
	}

	fn path(&self) -> &Path {
		match self {
			Self::Dir(dir) => dir,
			Self::File { file, .. } => file,
		}
	}

	/// The directory registered with the watcher, and how.
	fn watch_target(&self) -> (&Path, RecursiveMode) {
		match self {
			Self::Dir(dir) => (dir, RecursiveMode::Recursive),
			Self::File { parent, .. } => (parent, RecursiveMode::NonRecursive),
		}
	}

	fn matches(&self, changed: &Path) -> bool {
		match self {
			Self::Dir(dir) => changed.starts_with(dir),
			Self::File { file, .. } => changed == file,
		}
	}
}

/// Starts watching `paths`, offering a restart to `actions` on every change.
///
/// Directories are watched recursively. Files are watched through their parent directory, so
/// that a file replaced by a rename (as editors save) is still followed; events about its
/// siblings are ignored. Paths which can't be watched are reported and skipped. Returns
/// `Ok(None)` if no path could be watched at all, in which case there is nothing to keep alive.
pub fn watch(
	paths: &[PathBuf],
	actions: ActionSender,
) -> Result<Option<FsWatcher>, CriticalError> {
	if paths.is_empty() {
		trace!("no watched paths, no watcher needed");
		return Ok(None);
	}

	let tracked: Vec<Tracked> = paths
		.iter()
		.filter_map(|path| match Tracked::new(path) {
			Ok(tracked) => Some(tracked),
			Err(err) => {
				let err = RuntimeError::FsWatcher(FsWatcherError::PathAdd {
					path: path.clone(),
					err: notify::Error::io(err).add_path(path.clone()),
				});
				warn!(%err, ?path, "cannot watch path, skipping it");
				None
			}
		})
		.collect();

	if tracked.is_empty() {
		warn!("no path could be watched, changes will not restart the command");
		return Ok(None);
	}

	debug!(?tracked, "creating filesystem watcher");
	let filter = tracked.clone();
	let mut watcher = RecommendedWatcher::new(
		move |nev: Result<notify::Event, notify::Error>| {
			trace!(event = ?nev, "receiving possible event from watcher");
			if let Err(err) = process_event(nev, &filter, &actions) {
				error!(%err, "fs watcher error");
			}
		},
		notify::Config::default(),
	)
	.map_err(|err| CriticalError::FsWatcherInit(classify(err)))?;

	let mut registered: HashMap<PathBuf, RecursiveMode> = HashMap::new();
	let mut watched = Vec::with_capacity(tracked.len());
	for entry in &tracked {
		let (target, mode) = entry.watch_target();
		let covered = match registered.get(target) {
			Some(RecursiveMode::Recursive) => true,
			Some(RecursiveMode::NonRecursive) => mode == RecursiveMode::NonRecursive,
			None => false,
		};

		if !covered {
			trace!(?target, ?mode, "adding path to the watcher");
			if let Err(err) = watcher.watch(target, mode) {
				let err = RuntimeError::FsWatcher(FsWatcherError::PathAdd {
					path: entry.path().to_path_buf(),
					err,
				});
				warn!(%err, path=?entry.path(), "cannot watch path, skipping it");
				continue;
			}
			registered.insert(target.to_path_buf(), mode);
		}

		watched.push(entry.path().to_path_buf());
	}

	if watched.is_empty() {
		warn!("no path could be watched, changes will not restart the command");
		return Ok(None);
	}

	debug!(paths=?watched, "watching for changes");
	Ok(Some(FsWatcher {
		_watcher: watcher,
		paths: watched,
	}))
}

fn classify(err: notify::Error) -> FsWatcherError {
	if cfg!(target_os = "linux")
		&& (matches!(err.kind, notify::ErrorKind::MaxFilesWatch)
			|| matches!(err.kind, notify::ErrorKind::Io(ref ioerr) if ioerr.raw_os_error() == Some(28)))
	{
		FsWatcherError::TooManyWatches(err)
	} else if cfg!(target_os = "linux")
		&& matches!(err.kind, notify::ErrorKind::Io(ref ioerr) if ioerr.raw_os_error() == Some(24))
	{
		FsWatcherError::TooManyHandles(err)
	} else {
		FsWatcherError::Create(err)
	}
}

/// Whether an event is worth a restart: reads and unknown events are not.
const fn is_change(kind: &EventKind) -> bool {
	!matches!(kind, EventKind::Access(_) | EventKind::Other)
}

fn process_event(
	nev: Result<notify::Event, notify::Error>,
	tracked: &[Tracked],
	actions: &ActionSender,
) -> Result<(), RuntimeError> {
	let nev = nev.map_err(|err| RuntimeError::FsWatcher(FsWatcherError::Event(err)))?;

	if !is_change(&nev.kind) {
		trace!(kind=?nev.kind, "ignoring non-modifying event");
		return Ok(());
	}

	if !nev
		.paths
		.iter()
		.any(|changed| tracked.iter().any(|t| t.matches(changed)))
	{
		trace!(paths=?nev.paths, "ignoring change to an untracked path");
		return Ok(());
	}

	debug!(kind=?nev.kind, paths=?nev.paths, "watched path changed");
	actions.offer(Trigger::new(
		SupervisorAction::Restart,
		TriggerSource::Filesystem,
	));
	Ok(())
}

#[cfg(test)]
mod tests {
	use std::time::Duration;

	use notify::event::{AccessKind, CreateKind, ModifyKind};

	use super::*;
	use crate::action::ActionReceiver;

	/// Counts the triggers arriving until things have been quiet for a while.
	async fn settle(r: &mut ActionReceiver) -> usize {
		let mut count = 0;
		while tokio::time::timeout(Duration::from_millis(500), r.recv())
			.await
			.is_ok()
		{
			count += 1;
		}
		count
	}

	fn replace(file: &Path, contents: &str) {
		let tmp = file.with_extension("tmp");
		std::fs::write(&tmp, contents).unwrap();
		std::fs::rename(&tmp, file).unwrap();
	}

	#[test]
	fn only_modifying_events_count() {
		assert!(is_change(&EventKind::Modify(ModifyKind::Any)));
		assert!(is_change(&EventKind::Create(CreateKind::File)));
		assert!(is_change(&EventKind::Any));
		assert!(!is_change(&EventKind::Access(AccessKind::Any)));
		assert!(!is_change(&EventKind::Other));
	}

	#[tokio::test]
	async fn unwatchable_paths_are_skipped() {
		let dir = tempfile::tempdir().unwrap();
		let (actions, _r) = crate::action::mailbox(4);
		let watcher = watch(
			&[dir.path().join("missing"), dir.path().to_path_buf()],
			actions,
		)
		.unwrap()
		.expect("the directory is watchable");
		assert_eq!(watcher.paths(), [dir.path().canonicalize().unwrap()]);
	}

	#[tokio::test]
	async fn nothing_watchable_means_no_watcher() {
		let dir = tempfile::tempdir().unwrap();
		let (actions, _r) = crate::action::mailbox(4);
		assert!(watch(&[dir.path().join("missing")], actions)
			.unwrap()
			.is_none());
		let (actions, _r) = crate::action::mailbox(4);
		assert!(watch(&[], actions).unwrap().is_none());
	}

	#[tokio::test]
	async fn change_offers_a_restart() {
		let dir = tempfile::tempdir().unwrap();
		let file = dir.path().join("env.json");
		std::fs::write(&file, "{}").unwrap();

		let (actions, mut r) = crate::action::mailbox(4);
		let _watcher = watch(&[dir.path().to_path_buf()], actions).unwrap();
		tokio::time::sleep(std::time::Duration::from_millis(100)).await;
		std::fs::write(&file, r#"{"A": "1"}"#).unwrap();

		let trigger = tokio::time::timeout(std::time::Duration::from_secs(5), r.recv())
			.await
			.expect("a trigger within 5 seconds")
			.unwrap();
		assert_eq!(
			trigger,
			Trigger::new(SupervisorAction::Restart, TriggerSource::Filesystem)
		);
	}

	#[tokio::test]
	async fn file_replaced_by_rename_is_still_followed() {
		let dir = tempfile::tempdir().unwrap();
		let file = dir.path().join("env.json");
		std::fs::write(&file, "{}").unwrap();

		let (actions, mut r) = crate::action::mailbox(4);
		let _watcher = watch(&[file.clone()], actions).unwrap().unwrap();
		tokio::time::sleep(Duration::from_millis(100)).await;

		replace(&file, r#"{"A": "1"}"#);
		assert!(settle(&mut r).await >= 1, "first replacement");

		replace(&file, r#"{"A": "2"}"#);
		assert!(settle(&mut r).await >= 1, "second replacement");

		std::fs::write(&file, r#"{"A": "3"}"#).unwrap();
		assert!(settle(&mut r).await >= 1, "write after the replacements");
	}

	#[tokio::test]
	async fn siblings_of_a_tracked_file_are_ignored() {
		let dir = tempfile::tempdir().unwrap();
		let file = dir.path().join("env.json");
		std::fs::write(&file, "{}").unwrap();

		let (actions, mut r) = crate::action::mailbox(4);
		let _watcher = watch(&[file.clone()], actions).unwrap().unwrap();
		tokio::time::sleep(Duration::from_millis(100)).await;

		std::fs::write(dir.path().join("unrelated.txt"), "noise").unwrap();
		assert_eq!(settle(&mut r).await, 0);

		std::fs::write(&file, r#"{"A": "1"}"#).unwrap();
		assert!(settle(&mut r).await >= 1);
	}
}
