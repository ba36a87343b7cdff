//! Discover targets from JSON or YAML files.
//!
//! Every file holds a list of groups:
//!
//! ```yaml
//! - targets: ["10.0.0.1:9100", "10.0.0.2:9100"]
//!   labels:
//!     env: prod
//! ```
//!
//! Files are matched and re-read on every tick, so edits show up after one
//! refresh interval at most.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::arguments::{Arguments, validate_refresh_interval};
use crate::discoverer::Discoverer;
use crate::error::ConfigError;
use crate::filter::{Filter, validate_all};
use crate::target::{Labels, Target, TargetGroup};

/// Label holding the path of the file a group was read from.
pub const FILEPATH_LABEL: &str = "__meta_filepath";

pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(5 * 60);

const EXTENSIONS: [&str; 3] = ["json", "yml", "yaml"];

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid pattern {pattern}, {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },

    #[error("read {path:?} failed, {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("decode {path:?} failed, {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("decode {path:?} failed, {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct FileArguments {
    /// Glob patterns of the target files, each must end with `.json`, `.yml`
    /// or `.yaml`.
    pub files: Vec<String>,

    /// How often files are re-read, defaults to 5m.
    #[serde(
        default,
        with = "humanize::duration::serde_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub refresh_interval: Option<Duration>,

    /// Keep only targets whose labels match, applied after discovery.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<Filter>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FileRequest {
    pub files: Vec<String>,
}

#[async_trait]
impl Arguments for FileArguments {
    type Request = FileRequest;

    fn apply_defaults(&self) -> Self {
        Self {
            refresh_interval: Some(self.refresh_interval.unwrap_or(DEFAULT_REFRESH_INTERVAL)),
            ..self.clone()
        }
    }

    async fn validate(&self) -> Result<Self, ConfigError> {
        validate_all(&self.filters)?;

        if let Some(interval) = self.refresh_interval {
            validate_refresh_interval(interval)?;
        }

        if self.files.is_empty() {
            return Err(ConfigError::invalid("files", "at least one pattern is required"));
        }

        for pattern in &self.files {
            glob::Pattern::new(pattern).map_err(|err| ConfigError::invalid("files", err))?;

            if !has_known_extension(Path::new(pattern)) {
                return Err(ConfigError::invalid(
                    "files",
                    format!("{pattern} must end with .json, .yml or .yaml"),
                ));
            }
        }

        Ok(self.clone())
    }

    fn convert(&self) -> FileRequest {
        FileRequest {
            files: self.files.clone(),
        }
    }

    fn refresh_interval(&self) -> Duration {
        self.refresh_interval.unwrap_or(DEFAULT_REFRESH_INTERVAL)
    }

    fn label_filters(&self) -> Vec<Filter> {
        self.filters.clone()
    }
}

/// The factory of file discovery, usable directly with `Component::new`.
pub fn build(request: FileRequest) -> crate::Result<Arc<dyn Discoverer>> {
    Ok(Arc::new(FileDiscovery {
        patterns: request.files,
    }))
}

/// One group of a target file, targets are plain addresses there.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileGroup {
    targets: Vec<String>,

    #[serde(default)]
    labels: Labels,
}

pub struct FileDiscovery {
    patterns: Vec<String>,
}

impl FileDiscovery {
    fn paths(&self) -> Result<Vec<PathBuf>, Error> {
        let mut paths = Vec::new();

        for pattern in &self.patterns {
            let entries = glob::glob(pattern).map_err(|source| Error::Pattern {
                pattern: pattern.clone(),
                source,
            })?;

            for entry in entries {
                match entry {
                    Ok(path) => {
                        if !paths.contains(&path) {
                            paths.push(path);
                        }
                    }
                    Err(err) => {
                        // unreadable directories are skipped, like a shell would
                        debug!(message = "skip unreadable path", path = ?err.path(), err = %err.error());
                    }
                }
            }
        }

        Ok(paths)
    }
}

#[async_trait]
impl Discoverer for FileDiscovery {
    async fn targets(&self) -> crate::Result<Vec<TargetGroup>> {
        let mut groups = Vec::new();

        for path in self.paths()? {
            let Some(data) = read_optional(&path).await? else {
                continue;
            };

            groups.extend(decode(&path, &data)?);
        }

        Ok(groups)
    }
}

async fn read_optional(path: &Path) -> Result<Option<Vec<u8>>, Error> {
    match tokio::fs::read(path).await {
        Ok(data) => Ok(Some(data)),
        // removed between matching and reading
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(Error::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn has_known_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| EXTENSIONS.contains(&ext))
}

fn decode(path: &Path, data: &[u8]) -> Result<Vec<TargetGroup>, Error> {
    let groups: Vec<FileGroup> = match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => serde_json::from_slice(data).map_err(|source| Error::Json {
            path: path.to_path_buf(),
            source,
        })?,
        _ => {
            // an empty yaml document means no groups
            if data.iter().all(u8::is_ascii_whitespace) {
                return Ok(Vec::new());
            }

            serde_yaml::from_slice(data).map_err(|source| Error::Yaml {
                path: path.to_path_buf(),
                source,
            })?
        }
    };

    let filepath = path.display().to_string();
    let groups = groups
        .into_iter()
        .enumerate()
        .map(|(index, group)| {
            let mut labels = group.labels;
            labels.insert(FILEPATH_LABEL.to_string(), filepath.clone());

            TargetGroup::new(
                group.targets.into_iter().map(Target::new).collect(),
                labels,
                Some(format!("{filepath}:{index}")),
            )
        })
        .collect();

    Ok(groups)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::testing::{temp_dir, write_file};

    #[test]
    fn defaults() {
        let args: FileArguments = serde_yaml::from_str("files: [/etc/targets/*.json]").unwrap();
        let args = args.apply_defaults();

        assert_eq!(args.refresh_interval, Some(DEFAULT_REFRESH_INTERVAL));
        assert_eq!(args.apply_defaults(), args);
    }

    #[tokio::test]
    async fn validate() {
        for (files, valid) in [
            (vec!["/etc/targets/*.json"], true),
            (vec!["/etc/targets/*.yml", "/srv/*.yaml"], true),
            (vec![], false),
            (vec!["/etc/targets/*.txt"], false),
            (vec!["/etc/targets/[.json"], false),
        ] {
            let args = FileArguments {
                files: files.iter().map(ToString::to_string).collect(),
                ..Default::default()
            }
            .apply_defaults();

            assert_eq!(args.validate().await.is_ok(), valid, "{files:?}");
        }
    }

    #[tokio::test]
    async fn discover() {
        let dir = temp_dir();
        let json = write_file(
            &dir,
            "a.json",
            r#"[{"targets": ["10.0.0.1:9100", "10.0.0.1:9100", "10.0.0.2:9100"], "labels": {"env": "prod"}}]"#,
        );
        let yaml = write_file(
            &dir,
            "b.yaml",
            r#"
- targets: ["10.0.1.1:9100"]
- targets: []
  labels:
    env: dev
"#,
        );
        write_file(&dir, "empty.yml", "");
        write_file(&dir, "ignored.txt", "not matched");

        let discoverer = build(FileRequest {
            files: vec![
                format!("{}/*.json", dir.display()),
                format!("{}/*.yaml", dir.display()),
                format!("{}/*.yml", dir.display()),
            ],
        })
        .unwrap();

        let groups = discoverer.targets().await.unwrap();
        let json = json.display().to_string();
        let yaml = yaml.display().to_string();

        assert_eq!(
            groups,
            vec![
                TargetGroup {
                    targets: vec![Target::new("10.0.0.1:9100"), Target::new("10.0.0.2:9100")],
                    labels: [
                        ("env".to_string(), "prod".to_string()),
                        (FILEPATH_LABEL.to_string(), json.clone()),
                    ]
                    .into(),
                    source: Some(format!("{json}:0")),
                },
                TargetGroup {
                    targets: vec![Target::new("10.0.1.1:9100")],
                    labels: [(FILEPATH_LABEL.to_string(), yaml.clone())].into(),
                    source: Some(format!("{yaml}:0")),
                },
                TargetGroup {
                    targets: vec![],
                    labels: [
                        ("env".to_string(), "dev".to_string()),
                        (FILEPATH_LABEL.to_string(), yaml.clone()),
                    ]
                    .into(),
                    source: Some(format!("{yaml}:1")),
                },
            ]
        );
    }

    #[tokio::test]
    async fn malformed_file_fails_the_whole_poll() {
        let dir = temp_dir();
        write_file(&dir, "good.json", r#"[{"targets": ["10.0.0.1:9100"]}]"#);
        write_file(&dir, "bad.json", r#"[{"targets": "10.0.0.1:9100"}]"#);

        let discoverer = build(FileRequest {
            files: vec![format!("{}/*.json", dir.display())],
        })
        .unwrap();

        let err = discoverer.targets().await.unwrap_err();
        assert!(err.to_string().contains("bad.json"), "{err}");
    }

    #[tokio::test]
    async fn no_match_is_empty() {
        let dir = temp_dir();
        let discoverer = build(FileRequest {
            files: vec![format!("{}/*.json", dir.display())],
        })
        .unwrap();

        assert!(discoverer.targets().await.unwrap().is_empty());
    }
}
