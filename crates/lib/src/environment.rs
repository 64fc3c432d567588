//! Environment variables for the supervised command, loaded from a config file or directory.

use std::{collections::HashMap, fmt, path::PathBuf, str::FromStr};

use tracing::{debug, warn};

use crate::{
	config::Config,
	error::{EnvironmentError, RuntimeError},
};

mod parsers;

/// The format of the environment config.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ConfigFormat {
	/// No config: only the predefined variables are used.
	#[default]
	None,

	/// A JSON object of names to strings or numbers.
	Json,

	/// A YAML mapping of names to strings or integers.
	Yaml,

	/// `name = value` lines, sections are flattened.
	Ini,

	/// A directory where each file is a variable: the file name is the name and the trimmed
	/// contents are the value.
	Envdir,
}

impl FromStr for ConfigFormat {
	type Err = EnvironmentError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.trim().to_ascii_lowercase().as_str() {
			"" | "none" => Ok(Self::None),
			"json" => Ok(Self::Json),
			"yaml" => Ok(Self::Yaml),
			"ini" => Ok(Self::Ini),
			"envdir" => Ok(Self::Envdir),
			_ => Err(EnvironmentError::UnknownFormat(s.to_owned())),
		}
	}
}

impl fmt::Display for ConfigFormat {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			Self::None => "none",
			Self::Json => "json",
			Self::Yaml => "yaml",
			Self::Ini => "ini",
			Self::Envdir => "envdir",
		})
	}
}

/// The variables given to each started command.
///
/// These are applied on top of the supervisor's own environment when spawning, which itself is
/// never modified. Variables which disappear from the config on reload are therefore not passed to
/// later commands.
#[derive(Clone, Debug, Default)]
pub struct Environment {
	format: ConfigFormat,
	path: Option<PathBuf>,
	predefined: HashMap<String, String>,
	loaded: HashMap<String, String>,
}

impl Environment {
	/// Creates an environment reading `path` in the given `format`, with `predefined` variables
	/// which always win over the config.
	///
	/// Nothing is read until [`load()`](Self::load) or [`refresh()`](Self::refresh).
	#[must_use]
	pub fn new(
		format: ConfigFormat,
		path: Option<PathBuf>,
		predefined: HashMap<String, String>,
	) -> Self {
		Self {
			format,
			path,
			predefined,
			loaded: HashMap::new(),
		}
	}

	/// Creates the environment described by a [`Config`].
	#[must_use]
	pub fn from_config(config: &Config) -> Self {
		Self::new(
			config.config_format,
			config.config_path.clone(),
			config.envs.clone(),
		)
	}

	/// Reads the config, replacing the loaded variables only on success.
	pub fn load(&mut self) -> Result<(), EnvironmentError> {
		let vars = match (self.format, &self.path) {
			(ConfigFormat::None, _) => HashMap::new(),
			(format, Some(path)) => parsers::parse(format, path)?,
			(format, None) => return Err(EnvironmentError::MissingPath(format.to_string())),
		};

		debug!(format=%self.format, path=?self.path, count=vars.len(), "loaded environment");
		self.loaded = vars;
		Ok(())
	}

	/// Re-reads the config, keeping the previous variables if that fails.
	///
	/// Returns whether the reload succeeded.
	pub fn refresh(&mut self) -> bool {
		match self.load() {
			Ok(()) => true,
			Err(err) => {
				let err = RuntimeError::Environment(err);
				warn!(%err, path=?self.path, "keeping previous values");
				false
			}
		}
	}

	/// The variables to pass: the config's, overlaid by the predefined ones.
	#[must_use]
	pub fn variables(&self) -> HashMap<String, String> {
		let mut vars = self.loaded.clone();
		vars.extend(
			self.predefined
				.iter()
				.map(|(k, v)| (k.clone(), v.clone())),
		);
		vars
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn format_names() {
		assert_eq!("".parse::<ConfigFormat>().unwrap(), ConfigFormat::None);
		assert_eq!("JSON".parse::<ConfigFormat>().unwrap(), ConfigFormat::Json);
		assert_eq!("EnvDir".parse::<ConfigFormat>().unwrap(), ConfigFormat::Envdir);
		assert!("toml".parse::<ConfigFormat>().is_err());
	}

	#[test]
	fn predefined_wins() {
		let dir = tempfile::tempdir().unwrap();
		std::fs::write(dir.path().join("A"), "from config\n").unwrap();
		std::fs::write(dir.path().join("B"), "also from config").unwrap();

		let mut env = Environment::new(
			ConfigFormat::Envdir,
			Some(dir.path().into()),
			HashMap::from([("A".into(), "predefined".into())]),
		);
		env.load().unwrap();

		let vars = env.variables();
		assert_eq!(vars["A"], "predefined");
		assert_eq!(vars["B"], "also from config");
	}

	#[test]
	fn failed_refresh_keeps_previous() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("env.json");
		std::fs::write(&path, r#"{"A": "1"}"#).unwrap();

		let mut env = Environment::new(ConfigFormat::Json, Some(path.clone()), HashMap::new());
		assert!(env.refresh());
		std::fs::write(&path, "{ not json").unwrap();
		assert!(!env.refresh());
		assert_eq!(env.variables()["A"], "1");
	}
}
