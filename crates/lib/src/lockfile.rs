//! Advisory lock over a file, to serialise supervisors across instances.

use std::{
	fs::{self, File, OpenOptions},
	io::ErrorKind,
	path::{Path, PathBuf},
};

#[cfg(unix)]
use nix::fcntl::{Flock, FlockArg};
use tracing::{debug, trace, warn};

use crate::error::LockError;

#[cfg(unix)]
type Handle = Flock<File>;

#[cfg(not(unix))]
type Handle = File;

/// An exclusive, non-blocking advisory lock on a file.
///
/// On unix this is `flock(2)`; other processes which don't take the lock are not prevented from
/// using the file. Elsewhere, the lock is the exclusive creation of the file itself.
///
/// If the file didn't exist, it is created on acquire and removed again on release. A file which
/// was already there is left alone. Its contents are never touched.
#[derive(Debug)]
pub struct Lockfile {
	path: PathBuf,
	held: Option<Handle>,
	created: bool,
}

impl Lockfile {
	/// Creates an unbound lock for the file at `path`.
	#[must_use]
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self {
			path: path.into(),
			held: None,
			created: false,
		}
	}

	/// The path to the lock file.
	#[must_use]
	pub fn path(&self) -> &Path {
		&self.path
	}

	/// Whether this instance holds the lock.
	#[must_use]
	pub const fn is_held(&self) -> bool {
		self.held.is_some()
	}

	/// Tries to take the lock, without waiting.
	///
	/// Fails if this instance already holds it, if the file cannot be opened, or if someone else
	/// holds the lock. On failure nothing is left open.
	pub fn acquire(&mut self) -> Result<(), LockError> {
		if self.held.is_some() {
			return Err(LockError::AlreadyHeld {
				path: self.path.clone(),
			});
		}

		let (file, created) = self.open()?;
		trace!(path=?self.path, created, "opened lock file");
		self.lock_opened(file, created)
	}

	fn lock_opened(&mut self, file: File, created: bool) -> Result<(), LockError> {
		let contended = |err| LockError::Contended {
			path: self.path.clone(),
			err,
		};

		// a file we just created is left for whoever beat us to it
		let handle = lock(file).map_err(|err| {
			debug!(path=?self.path, %err, "cannot acquire lock");
			contended(err)
		})?;

		// the holder may have removed the file between our open and our lock
		if !still_at(&handle, &self.path) {
			debug!(path=?self.path, "lock file was replaced while locking");
			drop(handle);
			return Err(contended(std::io::Error::new(
				ErrorKind::Other,
				"lock file was replaced while locking",
			)));
		}

		debug!(path=?self.path, "acquired lock");
		self.held = Some(handle);
		self.created = created;
		Ok(())
	}

	/// Releases the lock and closes the file, removing it if this instance created it.
	///
	/// The file is closed (and removed) even if unlocking fails.
	pub fn release(&mut self) -> Result<(), LockError> {
		let handle = self.held.take().ok_or_else(|| LockError::NotHeld {
			path: self.path.clone(),
		})?;

		// unlinked while still locked, so nobody can lock the old file after us
		if self.created {
			self.remove();
			self.created = false;
		}
		let unlocked = unlock(handle);

		debug!(path=?self.path, ok=unlocked.is_ok(), "released lock");
		unlocked.map_err(|err| LockError::Release {
			path: self.path.clone(),
			err,
		})
	}

	fn open(&self) -> Result<(File, bool), LockError> {
		let mut options = OpenOptions::new();
		options.write(true);
		#[cfg(unix)]
		{
			use std::os::unix::fs::OpenOptionsExt;
			options.mode(0o666);
		}

		match options.clone().create_new(true).open(&self.path) {
			Ok(file) => return Ok((file, true)),
			Err(err) if err.kind() == ErrorKind::AlreadyExists && cfg!(unix) => {}
			Err(err) => {
				return Err(LockError::Open {
					path: self.path.clone(),
					err,
				})
			}
		}

		options
			.open(&self.path)
			.map(|file| (file, false))
			.map_err(|err| LockError::Open {
				path: self.path.clone(),
				err,
			})
	}

	fn remove(&self) {
		if let Err(err) = fs::remove_file(&self.path) {
			warn!(path=?self.path, %err, "cannot remove lock file");
		}
	}
}

impl Drop for Lockfile {
	fn drop(&mut self) {
		if self.held.is_some() {
			self.release().ok();
		}
	}
}

#[cfg(unix)]
fn lock(file: File) -> std::io::Result<Handle> {
	Flock::lock(file, FlockArg::LockExclusiveNonblock).map_err(|(_, errno)| errno.into())
}

#[cfg(unix)]
fn unlock(handle: Handle) -> std::io::Result<()> {
	handle.unlock().map(drop).map_err(|(_, errno)| errno.into())
}

/// Whether the locked file is still the one at `path`.
#[cfg(unix)]
fn still_at(handle: &Handle, path: &Path) -> bool {
	use std::os::unix::fs::MetadataExt;

	match (handle.metadata(), fs::metadata(path)) {
		(Ok(locked), Ok(current)) => locked.dev() == current.dev() && locked.ino() == current.ino(),
		_ => false,
	}
}

#[cfg(not(unix))]
fn still_at(_handle: &Handle, path: &Path) -> bool {
	path.exists()
}

#[cfg(not(unix))]
#[allow(clippy::unnecessary_wraps)]
fn lock(file: File) -> std::io::Result<Handle> {
	Ok(file)
}

#[cfg(not(unix))]
#[allow(clippy::unnecessary_wraps)]
fn unlock(handle: Handle) -> std::io::Result<()> {
	drop(handle);
	Ok(())
}
