//! Signals which can be sent to the supervised command.

use std::{fmt, str::FromStr};

#[cfg(unix)]
use nix::sys::signal::Signal as NixSignal;

use crate::error::SignalParseError;

/// A notification sent to the supervised command.
///
/// There are several "first-class" signals which have their own variants, and a generic
/// [`Custom`][Signal::Custom] variant which can be used to send arbitrary signals on Unix.
///
/// On Windows, every variant except `Custom` terminates the process.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Signal {
	/// `SIGHUP`: the terminal is disconnected.
	Hangup,

	/// `SIGKILL`: handled by the kernel, cannot be intercepted.
	///
	/// This is what a graceful stop escalates to once the timeout elapses.
	ForceStop,

	/// `SIGINT`.
	Interrupt,

	/// `SIGQUIT`.
	Quit,

	/// `SIGTERM`, the default graceful signal.
	#[default]
	Terminate,

	/// `SIGUSR1`.
	User1,

	/// `SIGUSR2`.
	User2,

	/// Any other signal, by number.
	///
	/// Invalid signals on the current platform are ignored when sent.
	Custom(i32),
}

impl Signal {
	/// Converts to a [`nix::Signal`][NixSignal] if possible.
	///
	/// This will return `None` if the signal is not supported on the current platform (only for
	/// [`Custom`][Signal::Custom], as the first-class ones are always supported).
	#[cfg(unix)]
	#[must_use]
	pub fn to_nix(self) -> Option<NixSignal> {
		match self {
			Self::Hangup => Some(NixSignal::SIGHUP),
			Self::ForceStop => Some(NixSignal::SIGKILL),
			Self::Interrupt => Some(NixSignal::SIGINT),
			Self::Quit => Some(NixSignal::SIGQUIT),
			Self::Terminate => Some(NixSignal::SIGTERM),
			Self::User1 => Some(NixSignal::SIGUSR1),
			Self::User2 => Some(NixSignal::SIGUSR2),
			Self::Custom(sig) => NixSignal::try_from(sig).ok(),
		}
	}

	/// Converts from a [`nix::Signal`][NixSignal].
	#[cfg(unix)]
	#[allow(clippy::missing_const_for_fn)]
	#[must_use]
	pub fn from_nix(sig: NixSignal) -> Self {
		match sig {
			NixSignal::SIGHUP => Self::Hangup,
			NixSignal::SIGKILL => Self::ForceStop,
			NixSignal::SIGINT => Self::Interrupt,
			NixSignal::SIGQUIT => Self::Quit,
			NixSignal::SIGTERM => Self::Terminate,
			NixSignal::SIGUSR1 => Self::User1,
			NixSignal::SIGUSR2 => Self::User2,
			sig => Self::Custom(sig as _),
		}
	}

	#[cfg(unix)]
	fn parse(s: &str) -> Result<Self, SignalParseError> {
		let name = s.trim();
		if let Ok(sig) = i32::from_str(name) {
			if let Ok(sig) = NixSignal::try_from(sig) {
				return Ok(Self::from_nix(sig));
			}
		}

		let upper = name.to_ascii_uppercase();
		let full = if upper.starts_with("SIG") {
			upper
		} else {
			format!("SIG{upper}")
		};

		NixSignal::from_str(&full)
			.map(Self::from_nix)
			.map_err(|_| SignalParseError::new(s, "unsupported signal"))
	}

	#[cfg(not(unix))]
	fn parse(s: &str) -> Result<Self, SignalParseError> {
		match s.trim().to_ascii_uppercase().as_str() {
			"KILL" | "SIGKILL" | "9" => Ok(Self::ForceStop),
			"HUP" | "SIGHUP" | "1" => Ok(Self::Hangup),
			"INT" | "SIGINT" | "2" => Ok(Self::Interrupt),
			"QUIT" | "SIGQUIT" | "3" => Ok(Self::Quit),
			"TERM" | "SIGTERM" | "15" => Ok(Self::Terminate),
			"USR1" | "SIGUSR1" | "10" => Ok(Self::User1),
			"USR2" | "SIGUSR2" | "12" => Ok(Self::User2),
			number => match i32::from_str(number) {
				Ok(int) => Ok(Self::Custom(int)),
				Err(_) => Err(SignalParseError::new(s, "unsupported signal")),
			},
		}
	}
}

impl FromStr for Signal {
	type Err = SignalParseError;

	/// Parses a signal name or number, case-insensitively.
	///
	/// Both the full name (`SIGTERM`) and the short name (`TERM`) are accepted.
	///
	/// ```
	/// # use guidedog::signal::Signal;
	/// assert_eq!(Signal::Hangup, "hup".parse().unwrap());
	/// assert_eq!(Signal::Interrupt, "SIGINT".parse().unwrap());
	/// assert_eq!(Signal::ForceStop, "Kill".parse().unwrap());
	/// assert_eq!(Signal::Terminate, "15".parse().unwrap());
	/// ```
	fn from_str(s: &str) -> Result<Self, Self::Err> {
		if s.trim().is_empty() {
			return Err(SignalParseError::new(s, "empty signal name"));
		}

		Self::parse(s)
	}
}

impl fmt::Display for Signal {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Hangup => f.write_str("SIGHUP"),
			Self::ForceStop => f.write_str("SIGKILL"),
			Self::Interrupt => f.write_str("SIGINT"),
			Self::Quit => f.write_str("SIGQUIT"),
			Self::Terminate => f.write_str("SIGTERM"),
			Self::User1 => f.write_str("SIGUSR1"),
			Self::User2 => f.write_str("SIGUSR2"),
			Self::Custom(n) => write!(f, "signal {n}"),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_short_and_long_names() {
		assert_eq!("term".parse::<Signal>().unwrap(), Signal::Terminate);
		assert_eq!("SIGTERM".parse::<Signal>().unwrap(), Signal::Terminate);
		assert_eq!("SigUsr1".parse::<Signal>().unwrap(), Signal::User1);
		assert_eq!("quit".parse::<Signal>().unwrap(), Signal::Quit);
	}

	#[test]
	fn parses_numbers() {
		assert_eq!("9".parse::<Signal>().unwrap(), Signal::ForceStop);
		assert_eq!("2".parse::<Signal>().unwrap(), Signal::Interrupt);
	}

	#[test]
	fn surrounding_whitespace_is_ignored() {
		assert_eq!(" 15".parse::<Signal>().unwrap(), Signal::Terminate);
		assert_eq!("9 ".parse::<Signal>().unwrap(), Signal::ForceStop);
		assert_eq!(" term ".parse::<Signal>().unwrap(), Signal::Terminate);
		assert!("  ".parse::<Signal>().is_err());
	}

	#[test]
	fn rejects_garbage() {
		assert!("".parse::<Signal>().is_err());
		assert!("SIGNOTATHING".parse::<Signal>().is_err());
	}

	#[test]
	fn default_is_terminate() {
		assert_eq!(Signal::default(), Signal::Terminate);
		assert_eq!(Signal::default().to_string(), "SIGTERM");
	}
}
