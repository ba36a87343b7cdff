use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::ResolutionError;

const DEFAULT_PROFILE: &str = "default";

/// Settings picked up from the process environment and the shared config
/// files (`~/.aws/config` and `~/.aws/credentials`). Loaded once per
/// validation, never cached, since the environment may change between two
/// reconfigurations.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AmbientConfig {
    /// `AWS_REGION`, or `AWS_DEFAULT_REGION` when the former is unset.
    pub env_region: Option<String>,

    /// Whether `AWS_ACCESS_KEY_ID` and `AWS_SECRET_ACCESS_KEY` are both set.
    pub env_credentials: bool,

    /// The selected profile, explicit one first, then `AWS_PROFILE`.
    pub profile_name: String,

    /// Properties of the selected profile, credentials file entries win.
    pub profile: BTreeMap<String, String>,

    /// `AWS_EC2_METADATA_DISABLED=true`
    pub imds_disabled: bool,

    /// `AWS_EC2_METADATA_SERVICE_ENDPOINT`
    pub imds_endpoint: Option<String>,
}

impl AmbientConfig {
    /// Load from the real environment. A missing shared file is fine, a
    /// profile that was asked for explicitly but can't be found is not.
    pub fn load(profile: Option<&str>) -> Result<Self, ResolutionError> {
        let home = std::env::var_os("HOME").map(PathBuf::from);
        let config_path = env_var("AWS_CONFIG_FILE")
            .map(PathBuf::from)
            .or_else(|| home.as_ref().map(|home| home.join(".aws").join("config")));
        let credentials_path = env_var("AWS_SHARED_CREDENTIALS_FILE")
            .map(PathBuf::from)
            .or_else(|| home.as_ref().map(|home| home.join(".aws").join("credentials")));

        let config = read_optional(config_path.as_deref())?;
        let credentials = read_optional(credentials_path.as_deref())?;

        Self::from_sources(env_var, &config, &credentials, profile)
    }

    /// Build from explicit sources, `env` stands in for `std::env::var`.
    pub fn from_sources<E>(
        env: E,
        config: &str,
        credentials: &str,
        profile: Option<&str>,
    ) -> Result<Self, ResolutionError>
    where
        E: Fn(&str) -> Option<String>,
    {
        let explicit = profile.filter(|name| !name.is_empty());
        let profile_name = explicit
            .map(ToString::to_string)
            .or_else(|| env("AWS_PROFILE"))
            .unwrap_or_else(|| DEFAULT_PROFILE.to_string());

        let config = parse_profiles(config, true);
        let credentials = parse_profiles(credentials, false);

        let mut found = false;
        let mut properties = BTreeMap::new();
        for section in [config.get(&profile_name), credentials.get(&profile_name)]
            .into_iter()
            .flatten()
        {
            found = true;
            properties.extend(section.clone());
        }

        // a profile named in the arguments has to exist, the implicit default may not
        if explicit.is_some() && !found {
            return Err(ResolutionError::ProfileNotFound(profile_name));
        }

        let env_region = env("AWS_REGION")
            .or_else(|| env("AWS_DEFAULT_REGION"))
            .filter(|region| !region.is_empty());
        let env_credentials =
            env("AWS_ACCESS_KEY_ID").is_some() && env("AWS_SECRET_ACCESS_KEY").is_some();
        let imds_disabled = env("AWS_EC2_METADATA_DISABLED")
            .is_some_and(|value| value.eq_ignore_ascii_case("true"));

        Ok(Self {
            env_region,
            env_credentials,
            profile_name,
            profile: properties,
            imds_disabled,
            imds_endpoint: env("AWS_EC2_METADATA_SERVICE_ENDPOINT"),
        })
    }

    pub fn profile_region(&self) -> Option<&str> {
        self.profile
            .get("region")
            .map(String::as_str)
            .filter(|region| !region.is_empty())
    }

    fn profile_has_credentials(&self) -> bool {
        ["aws_access_key_id", "role_arn", "credential_process", "sso_session"]
            .iter()
            .any(|key| self.profile.contains_key(*key))
    }
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.is_empty())
}

fn read_optional(path: Option<&Path>) -> Result<String, ResolutionError> {
    let Some(path) = path else {
        return Ok(String::new());
    };

    match std::fs::read_to_string(path) {
        Ok(text) => Ok(text),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
        Err(err) => Err(ResolutionError::Io {
            path: path.display().to_string(),
            source: err,
        }),
    }
}

/// Parse the INI like shared files. In the config file every section but
/// `default` is written `[profile name]`, the credentials file uses `[name]`.
fn parse_profiles(text: &str, config_file: bool) -> BTreeMap<String, BTreeMap<String, String>> {
    let mut profiles = BTreeMap::<String, BTreeMap<String, String>>::new();
    let mut current = None;

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }

        if let Some(section) = line.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
            let section = section.trim();
            let name = if config_file {
                match section.strip_prefix("profile ") {
                    Some(name) => Some(name.trim()),
                    None if section == DEFAULT_PROFILE => Some(section),
                    // sso-session and services sections
                    None => None,
                }
            } else {
                Some(section)
            };

            current = name.map(|name| {
                profiles.entry(name.to_string()).or_default();
                name.to_string()
            });
            continue;
        }

        let (Some(name), Some((key, value))) = (current.as_ref(), line.split_once('=')) else {
            continue;
        };

        if let Some(properties) = profiles.get_mut(name) {
            properties.insert(key.trim().to_string(), value.trim().to_string());
        }
    }

    profiles
}

/// Where credentials come from, evaluated in order: explicit keys, a named
/// profile, the instance metadata service and finally the environment.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CredentialSource {
    Static,
    Profile(String),
    InstanceMetadata,
    Environment,
}

/// Credentials as resolved during one validation pass.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ResolvedCredentials {
    pub source: CredentialSource,

    /// Set when the base credentials are used to assume this role.
    pub assume_role: Option<String>,
}

impl ResolvedCredentials {
    /// Walk the credential chain, `None` when no source applies.
    pub fn resolve(
        static_keys: bool,
        profile: Option<&str>,
        role_arn: Option<&str>,
        ambient: &AmbientConfig,
    ) -> Option<Self> {
        let source = if static_keys {
            CredentialSource::Static
        } else if profile.is_some_and(|name| !name.is_empty()) || ambient.profile_has_credentials()
        {
            CredentialSource::Profile(ambient.profile_name.clone())
        } else if !ambient.imds_disabled {
            CredentialSource::InstanceMetadata
        } else if ambient.env_credentials {
            CredentialSource::Environment
        } else {
            return None;
        };

        Some(Self {
            source,
            assume_role: role_arn
                .filter(|role| !role.is_empty())
                .map(ToString::to_string),
        })
    }
}
