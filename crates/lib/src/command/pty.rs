//! Pseudo-terminal attachment for the supervised process.
//!
//! The child gets the slave side as its controlling terminal and standard streams. On our side,
//! the master is bridged to our stdin and stdout by two copy tasks, and a third task propagates
//! window size changes. Everything is torn down once, by the completion notifier, when the child
//! exits.

#[cfg(unix)]
pub(super) use imp::*;

#[cfg(not(unix))]
pub(super) use unsupported::*;

#[cfg(unix)]
mod imp {
	use std::{
		io,
		os::fd::{AsRawFd, OwnedFd},
		process::Stdio,
		time::Duration,
	};

	use nix::pty::{openpty, OpenptyResult};
	use tokio::{
		fs::File,
		io::{stdin, stdout, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
		process::Command as TokioCommand,
		signal::unix::{signal, SignalKind},
		spawn,
		task::JoinHandle,
		time::{sleep, timeout},
	};
	use tracing::{debug, trace, warn};

	/// How long output still in flight gets to reach stdout once the child has exited.
	const DRAIN: Duration = Duration::from_millis(50);

	/// Raw-mode stdin reads return empty after this long (`VTIME` is in tenths of a second).
	const READ_TIMEOUT: Duration = Duration::from_millis(100);

	nix::ioctl_read_bad!(get_winsize, libc::TIOCGWINSZ, libc::winsize);
	nix::ioctl_write_ptr_bad!(set_winsize, libc::TIOCSWINSZ, libc::winsize);

	/// A pseudo-terminal wired into a command which hasn't been spawned yet.
	#[derive(Debug)]
	pub struct Attachment {
		master: OwnedFd,
	}

	/// Opens a pseudo-terminal and wires its slave side into `command`.
	pub fn attach(command: &mut TokioCommand) -> io::Result<Attachment> {
		let OpenptyResult { master, slave } = openpty(None, None).map_err(io::Error::from)?;
		trace!(master=?master.as_raw_fd(), slave=?slave.as_raw_fd(), "opened pty");

		command
			.stdin(Stdio::from(slave.try_clone()?))
			.stdout(Stdio::from(slave.try_clone()?))
			.stderr(Stdio::from(slave));

		// SAFETY: setsid and ioctl are async-signal-safe, and nothing here allocates.
		unsafe {
			command.pre_exec(|| {
				if libc::setsid() == -1 {
					return Err(io::Error::last_os_error());
				}

				// stdin is the slave by now: make it the controlling terminal of the new session
				if libc::ioctl(libc::STDIN_FILENO, libc::TIOCSCTTY, 0) == -1 {
					return Err(io::Error::last_os_error());
				}

				Ok(())
			});
		}

		Ok(Attachment { master })
	}

	impl Attachment {
		/// Starts bridging once the child has been spawned.
		pub fn start(self) -> io::Result<Session> {
			let raw = RawModeGuard::enter();
			if raw.is_none() {
				debug!("stdin is not a terminal, leaving its mode alone");
			}

			let reader = File::from_std(std::fs::File::from(self.master.try_clone()?));
			let writer = File::from_std(std::fs::File::from(self.master.try_clone()?));
			let sizer = self.master.try_clone()?;

			let idle_reads = raw.is_some();
			Ok(Session {
				output: spawn(pump(reader, stdout(), false)),
				input: spawn(pump(stdin(), writer, idle_reads)),
				resize: spawn(propagate_resize(sizer)),
				raw,
				master: self.master,
			})
		}
	}

	/// A live pty bridge.
	#[derive(Debug)]
	pub struct Session {
		master: OwnedFd,
		raw: Option<RawModeGuard>,
		output: JoinHandle<()>,
		input: JoinHandle<()>,
		resize: JoinHandle<()>,
	}

	impl Session {
		/// Stops the bridge, restores our terminal, and closes the master.
		pub async fn teardown(self) {
			let Self {
				master,
				raw,
				mut output,
				input,
				resize,
			} = self;

			input.abort();
			resize.abort();

			if timeout(DRAIN, &mut output).await.is_err() {
				trace!("pty output still open after drain period");
				output.abort();
			}

			if raw.is_some() {
				// a stdin read already in flight must return before the terminal blocks reads again
				sleep(READ_TIMEOUT).await;
			}

			drop(raw);
			drop(master);
			debug!("pty session torn down");
		}
	}

	/// Copies bytes from one end to the other until either closes.
	///
	/// With `idle_reads`, empty reads are read timeouts from a raw-mode terminal, not end of file.
	async fn pump(
		mut from: impl AsyncRead + Unpin,
		mut to: impl AsyncWrite + Unpin,
		idle_reads: bool,
	) {
		let mut buf = vec![0_u8; 4096];
		loop {
			let n = match from.read(&mut buf).await {
				Ok(0) if idle_reads => continue,
				Ok(0) => break,
				Ok(n) => n,
				Err(err) => {
					trace!(%err, "pty stream closed");
					break;
				}
			};

			let written = async {
				to.write_all(&buf[..n]).await?;
				to.flush().await
			};

			if let Err(err) = written.await {
				trace!(%err, "pty stream closed");
				break;
			}
		}
	}

	async fn propagate_resize(master: OwnedFd) {
		resize(&master);

		let mut winch = match signal(SignalKind::window_change()) {
			Ok(s) => s,
			Err(err) => {
				warn!(%err, "cannot listen for window size changes");
				return;
			}
		};

		while winch.recv().await.is_some() {
			resize(&master);
		}
	}

	/// Copies our terminal's size to the pty.
	fn resize(master: &OwnedFd) {
		let mut size = libc::winsize {
			ws_row: 0,
			ws_col: 0,
			ws_xpixel: 0,
			ws_ypixel: 0,
		};

		// SAFETY: both ioctls only read or write a winsize we own.
		if let Err(err) = unsafe { get_winsize(libc::STDIN_FILENO, &mut size) } {
			trace!(%err, "cannot read terminal size");
			return;
		}

		trace!(rows=%size.ws_row, cols=%size.ws_col, "resizing pty");
		if let Err(err) = unsafe { set_winsize(master.as_raw_fd(), &size) } {
			debug!(%err, "cannot resize pty");
		}
	}

	/// Stored original termios to restore on drop.
	struct RawModeGuard {
		fd: i32,
		original: libc::termios,
	}

	impl std::fmt::Debug for RawModeGuard {
		fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
			f.debug_struct("RawModeGuard")
				.field("fd", &self.fd)
				.finish_non_exhaustive()
		}
	}

	impl RawModeGuard {
		/// Switch stdin to raw mode. Returns None if stdin is not a TTY.
		fn enter() -> Option<Self> {
			let fd = libc::STDIN_FILENO;
			// SAFETY: isatty, tcgetattr, cfmakeraw, and tcsetattr operate on stdin, and every
			// return value is checked before going further.
			unsafe {
				if libc::isatty(fd) == 0 {
					return None;
				}
				let mut original: libc::termios = std::mem::zeroed();
				if libc::tcgetattr(fd, &mut original) != 0 {
					return None;
				}
				let mut raw = original;
				libc::cfmakeraw(&mut raw);
				// reads return empty after READ_TIMEOUT so the copy task can be aborted
				raw.c_cc[libc::VMIN] = 0;
				raw.c_cc[libc::VTIME] = 1;
				if libc::tcsetattr(fd, libc::TCSANOW, &raw) != 0 {
					return None;
				}
				Some(Self { fd, original })
			}
		}
	}

	impl Drop for RawModeGuard {
		fn drop(&mut self) {
			// SAFETY: restoring the original termios saved in enter() on the same fd.
			unsafe {
				libc::tcsetattr(self.fd, libc::TCSANOW, &self.original);
			}
		}
	}
}

#[cfg(not(unix))]
mod unsupported {
	use std::io;

	use tokio::process::Command as TokioCommand;

	#[derive(Debug)]
	pub enum Attachment {}

	#[derive(Debug)]
	pub enum Session {}

	pub fn attach(_command: &mut TokioCommand) -> io::Result<Attachment> {
		Err(io::Error::new(
			io::ErrorKind::Unsupported,
			"pseudo-terminals are only available on unix",
		))
	}

	impl Attachment {
		pub fn start(self) -> io::Result<Session> {
			match self {}
		}
	}

	impl Session {
		pub async fn teardown(self) {
			match self {}
		}
	}
}
