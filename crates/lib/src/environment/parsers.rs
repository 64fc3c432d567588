use std::{
	collections::HashMap,
	fs,
	path::{Path, PathBuf},
};

use tracing::{trace, warn};

use super::ConfigFormat;
use crate::error::EnvironmentError;

pub(super) fn parse(
	format: ConfigFormat,
	path: &Path,
) -> Result<HashMap<String, String>, EnvironmentError> {
	match format {
		ConfigFormat::None => Ok(HashMap::new()),
		ConfigFormat::Json => json(path, &read(path)?),
		ConfigFormat::Yaml => yaml(path, &read(path)?),
		ConfigFormat::Ini => ini(path, &read(path)?),
		ConfigFormat::Envdir => envdir(path),
	}
}

fn read(path: &Path) -> Result<String, EnvironmentError> {
	fs::read_to_string(path).map_err(|err| EnvironmentError::Read {
		path: path.into(),
		err,
	})
}

fn unsupported(path: &Path, key: &str) -> EnvironmentError {
	EnvironmentError::UnsupportedValue {
		path: path.into(),
		key: key.into(),
	}
}

fn json(path: &Path, text: &str) -> Result<HashMap<String, String>, EnvironmentError> {
	use serde_json::Value;

	let doc: Value = serde_json::from_str(text).map_err(|err| EnvironmentError::Json {
		path: path.into(),
		err,
	})?;

	let Value::Object(map) = doc else {
		return Err(EnvironmentError::NotAMapping { path: path.into() });
	};

	map.into_iter()
		.map(|(key, value)| {
			let value = match value {
				Value::String(s) => s,
				Value::Number(n) => {
					if let Some(i) = n.as_i64() {
						i.to_string()
					} else if let Some(u) = n.as_u64() {
						u.to_string()
					} else {
						// floats are truncated to integers
						#[allow(clippy::cast_possible_truncation)]
						let truncated = n.as_f64().map(|f| f as i64);
						truncated.ok_or_else(|| unsupported(path, &key))?.to_string()
					}
				}
				_ => return Err(unsupported(path, &key)),
			};
			Ok((key, value))
		})
		.collect()
}

fn yaml(path: &Path, text: &str) -> Result<HashMap<String, String>, EnvironmentError> {
	use serde_yaml::Value;

	let doc: Value = serde_yaml::from_str(text).map_err(|err| EnvironmentError::Yaml {
		path: path.into(),
		err,
	})?;

	let map = match doc {
		Value::Mapping(map) => map,
		// an empty document
		Value::Null => return Ok(HashMap::new()),
		_ => return Err(EnvironmentError::NotAMapping { path: path.into() }),
	};

	map.into_iter()
		.map(|(key, value)| {
			let key = match key {
				Value::String(s) => s,
				other => return Err(unsupported(path, &format!("{other:?}"))),
			};

			let value = match value {
				Value::String(s) => s,
				Value::Number(n) if n.is_i64() || n.is_u64() => n.to_string(),
				_ => return Err(unsupported(path, &key)),
			};
			Ok((key, value))
		})
		.collect()
}

fn ini(path: &Path, text: &str) -> Result<HashMap<String, String>, EnvironmentError> {
	let doc = ini::Ini::load_from_str(text).map_err(|err| EnvironmentError::Ini {
		path: path.into(),
		err,
	})?;

	let mut vars = HashMap::new();
	for (section, props) in doc.iter() {
		trace!(?section, "flattening ini section");
		vars.extend(props.iter().map(|(k, v)| (k.to_owned(), v.to_owned())));
	}

	Ok(vars)
}

fn envdir(path: &Path) -> Result<HashMap<String, String>, EnvironmentError> {
	let read_error = |err| EnvironmentError::Read {
		path: path.into(),
		err,
	};

	let mut vars = HashMap::new();
	for entry in fs::read_dir(path).map_err(read_error)? {
		let entry = entry.map_err(read_error)?;
		let file: PathBuf = entry.path();

		if file.is_dir() {
			trace!(?file, "skipping directory in envdir");
			continue;
		}

		let content = match fs::read_to_string(&file) {
			Ok(content) => content,
			Err(err) => {
				warn!(?file, %err, "cannot read envdir file, skipping");
				continue;
			}
		};

		let name = entry.file_name().to_string_lossy().into_owned();
		vars.insert(name, content.trim().to_owned());
	}

	Ok(vars)
}
