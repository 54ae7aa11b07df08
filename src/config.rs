// Configuration: where the broker lives.
//
// The CONVEYOR_BROKER environment variable wins; otherwise the `broker` key
// under [conveyor] in a conveyor.toml found in the working directory or any
// ancestor. The URI scheme selects the transport; only `mem:` is built in.

use std::path::{Path, PathBuf};
use std::sync::Arc;

#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};
use serde::Deserialize;

use crate::{
  broker::Broker,
  error::{ConfigError, ConfigResult},
  journal::Journal,
  mem::{MemBroker, MemJournal},
};

pub const ENV_BROKER: &str = "CONVEYOR_BROKER";
pub const CONFIG_FILE: &str = "conveyor.toml";

#[derive(Debug, Clone)]
pub struct Settings {
  pub broker_uri: String,
}

#[derive(Debug, Deserialize, Default)]
struct FileConfig {
  #[serde(default)]
  conveyor: Section,
}

#[derive(Debug, Deserialize, Default)]
struct Section {
  broker: Option<String>,
}

/// Load settings from the environment and the project config file.
pub fn load() -> ConfigResult<Settings> {
  let start = std::env::current_dir().map_err(|source| ConfigError::Io {
    path: ".".to_string(),
    source,
  })?;
  load_from(std::env::var(ENV_BROKER).ok(), &start)
}

fn load_from(env_uri: Option<String>, start: &Path) -> ConfigResult<Settings> {
  let broker_uri = match env_uri.filter(|uri| !uri.is_empty()) {
    Some(uri) => uri,
    None => match find_config_file(start) {
      Some(path) => read_broker_key(&path)?.ok_or(ConfigError::MissingUri)?,
      None => return Err(ConfigError::MissingUri),
    },
  };
  validate_scheme(&broker_uri)?;
  Ok(Settings { broker_uri })
}

fn find_config_file(start: &Path) -> Option<PathBuf> {
  start
    .ancestors()
    .map(|dir| dir.join(CONFIG_FILE))
    .find(|candidate| candidate.is_file())
}

fn read_broker_key(path: &Path) -> ConfigResult<Option<String>> {
  let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
    path: path.display().to_string(),
    source,
  })?;
  let parsed: FileConfig = toml::from_str(&text).map_err(|source| ConfigError::Parse {
    path: path.display().to_string(),
    source,
  })?;
  Ok(parsed.conveyor.broker)
}

fn validate_scheme(uri: &str) -> ConfigResult<()> {
  if uri == "mem:" || uri.starts_with("mem://") {
    Ok(())
  } else {
    Err(ConfigError::UnsupportedScheme {
      uri: uri.to_string(),
    })
  }
}

/// Open the broker and journal the settings point at.
pub fn open_transport(settings: &Settings) -> ConfigResult<(Arc<dyn Broker>, Arc<dyn Journal>)> {
  validate_scheme(&settings.broker_uri)?;
  debug!("opening in-memory transport for {:?}", settings.broker_uri);
  Ok((Arc::new(MemBroker::new()), Arc::new(MemJournal::new())))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn env_uri_takes_precedence() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
      dir.path().join(CONFIG_FILE),
      "[conveyor]\nbroker = \"amqp://ignored\"\n",
    )
    .unwrap();
    let settings = load_from(Some("mem:".to_string()), dir.path()).unwrap();
    assert_eq!(settings.broker_uri, "mem:");
  }

  #[test]
  fn config_file_is_found_in_ancestors() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
      dir.path().join(CONFIG_FILE),
      "[conveyor]\nbroker = \"mem://local\"\n",
    )
    .unwrap();
    let nested = dir.path().join("a/b");
    std::fs::create_dir_all(&nested).unwrap();

    let settings = load_from(None, &nested).unwrap();
    assert_eq!(settings.broker_uri, "mem://local");
  }

  #[test]
  fn missing_and_unsupported_uris_fail() {
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(
      load_from(None, dir.path()),
      Err(ConfigError::MissingUri)
    ));
    assert!(matches!(
      load_from(Some("amqp://host".to_string()), dir.path()),
      Err(ConfigError::UnsupportedScheme { .. })
    ));
  }
}
