//! Guide-dog: supervise a single command.
//!
//! The command is started, optionally on a pseudo-terminal, and watched. Depending on the
//! [`Config`] it is restarted when it fails or when its configuration changes, and it is stopped
//! gracefully (with escalation to a kill) when the supervisor itself is asked to stop. An advisory
//! [lock file](lockfile::Lockfile) can serialise supervisors across instances.
//!
//! This library is powered by [Tokio](https://tokio.rs).
//!
//! The main way to use this crate is to build a [`Config`] and give it to [`execute()`], which
//! returns the exit code of the command once supervision ends:
//!
//! ```no_run
//! use guidedog::{execute, Config};
//! use miette::Result;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let mut config = Config::new(["sh", "-c", "sleep 1; exit 1"]);
//!     config.restart_on_failure = true;
//!     config.exit_codes.insert(0);
//!
//!     let code = execute(config).await?;
//!     std::process::exit(code);
//! }
//! ```
//!
//! The pieces ([`Supervisor`](supervisor::Supervisor), [`Command`](command::Command), the
//! [mailbox](action::mailbox) and the [sources]) are exposed to build something different.
//!
//! Note that the library generates a _lot_ of debug messaging with [tracing].

#![warn(clippy::unwrap_used, missing_docs)]
#![deny(rust_2018_idioms)]

pub mod action;
pub mod command;
pub mod config;
pub mod environment;
pub mod error;
pub mod lockfile;
pub mod signal;
pub mod sources;
pub mod supervisor;

mod execute;

#[doc(inline)]
pub use crate::{
	config::Config,
	execute::{execute, LOCK_RETRY_INTERVAL},
};
