use std::path::{Path, PathBuf};

use discovery::file::FileArguments;
use discovery::static_config::StaticArguments;
use serde::Deserialize;
use thiserror::Error;

/// The format used to represent the configuration data.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Format {
    Json,
    #[default]
    Yaml,
}

impl Format {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Format::Json,
            _ => Format::Yaml,
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("read config {path:?} failed, {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse config {path:?} failed, {reason}")]
    Parse { path: PathBuf, reason: String },
}

/// Which backend to run, selected by `type`.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum DiscoveryConfig {
    File(FileArguments),
    Static(StaticArguments),
}

impl DiscoveryConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            DiscoveryConfig::File(_) => "file",
            DiscoveryConfig::Static(_) => "static",
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub discovery: DiscoveryConfig,
}

pub fn load(path: &Path) -> Result<Config, Error> {
    let content = std::fs::read_to_string(path).map_err(|source| Error::Read {
        path: path.to_path_buf(),
        source,
    })?;

    parse(&content, Format::from_path(path)).map_err(|reason| Error::Parse {
        path: path.to_path_buf(),
        reason,
    })
}

fn parse(content: &str, format: Format) -> Result<Config, String> {
    match format {
        Format::Yaml => serde_yaml::from_str(content).map_err(|err| err.to_string()),
        Format::Json => serde_json::from_str(content).map_err(|err| err.to_string()),
    }
}
