//! Sources of triggers for the supervisor.

pub mod fs;
pub mod signal;
