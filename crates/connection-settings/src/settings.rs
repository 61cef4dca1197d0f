//! Resolving [`ConnectionInfo`] from a config file, [`Overrides`] and defaults.

use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{Error, Result};

/// Host used when neither the config file nor an override names one.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Name of the config file the application writes into its home directory.
pub const CONFIG_FILE_NAME: &str = "rd-engine.json";

/// The parameters needed to connect to the application's API server.
///
/// Config file keys are matched case insensitively (`Port`, `PORT` and `port` are all the same
/// key), and a `null` document counts as an empty one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionInfo {
    pub user: String,
    pub password: String,
    pub host: String,
    pub port: u16,
}

impl ConnectionInfo {
    fn from_config_json(content: &[u8]) -> serde_json::Result<Self> {
        let Some(fields) = serde_json::from_slice::<Option<Map<String, Value>>>(content)? else {
            return Ok(Self::default());
        };

        let fields = fields
            .into_iter()
            .map(|(key, value)| (key.to_ascii_lowercase(), value))
            .collect();

        serde_json::from_value(Value::Object(fields))
    }

    fn is_complete(&self) -> bool {
        self.port != 0 && !self.user.is_empty() && !self.password.is_empty()
    }
}

/// Values that take precedence over the config file, typically from command line flags. Empty
/// strings and a zero port count as unset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    pub user: Option<String>,
    pub password: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
}

impl Overrides {
    fn apply(&self, settings: &mut ConnectionInfo) {
        fn apply_str(dst: &mut String, src: &Option<String>) {
            if let Some(src) = src.as_deref().filter(|src| !src.is_empty()) {
                dst.clear();
                dst.push_str(src);
            }
        }

        apply_str(&mut settings.user, &self.user);
        apply_str(&mut settings.password, &self.password);
        apply_str(&mut settings.host, &self.host);

        if let Some(port) = self.port.filter(|port| *port != 0) {
            settings.port = port;
        }
    }
}

/// Where to look for the config file. A missing file at the default location is tolerated,
/// one the caller asked for explicitly is not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigLocation {
    explicit: Option<PathBuf>,
    default: PathBuf,
}

impl ConfigLocation {
    pub fn new(default: impl Into<PathBuf>) -> Self {
        Self {
            explicit: None,
            default: default.into(),
        }
    }

    /// Defaults to [`CONFIG_FILE_NAME`] inside `app_home`.
    pub fn in_app_home(app_home: impl AsRef<Path>) -> Self {
        Self::new(app_home.as_ref().join(CONFIG_FILE_NAME))
    }

    pub fn with_explicit(mut self, path: impl Into<PathBuf>) -> Self {
        self.explicit = Some(path.into());
        self
    }

    pub fn default_path(&self) -> &Path {
        &self.default
    }

    /// The path that will actually be read.
    pub fn path(&self) -> &Path {
        self.explicit.as_deref().unwrap_or(&self.default)
    }

    fn is_default(&self) -> bool {
        self.path() == self.default
    }
}

/// Reads the config file at `location`, then layers `overrides` and defaults on top.
///
/// Returns `Ok(None)` only when the default config file doesn't exist, the overrides alone
/// aren't enough to connect, and `may_be_missing` is set.
pub fn resolve(
    location: &ConfigLocation,
    overrides: &Overrides,
    may_be_missing: bool,
) -> Result<Option<ConnectionInfo>> {
    let path = location.path();

    let (mut settings, missing_default) = match std::fs::read(path) {
        Ok(content) => {
            let settings = ConnectionInfo::from_config_json(&content).map_err(|source| {
                Error::Parse {
                    path: path.to_owned(),
                    source,
                }
            })?;
            (settings, None)
        }
        Err(source) if source.kind() == io::ErrorKind::NotFound && location.is_default() => {
            tracing::debug!(message = "default config file not found", path = %path.display());
            (ConnectionInfo::default(), Some(source))
        }
        Err(source) => {
            return Err(Error::Read {
                path: path.to_owned(),
                source,
            });
        }
    };

    overrides.apply(&mut settings);

    if settings.host.is_empty() {
        settings.host = DEFAULT_HOST.to_owned();
    }

    if settings.is_complete() {
        return Ok(Some(settings));
    }

    match missing_default {
        Some(_) if may_be_missing => Ok(None),
        Some(source) => Err(Error::Read {
            path: path.to_owned(),
            source,
        }),
        None => Err(Error::Insufficient),
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;

    fn write_config(dir: &Path, contents: &str) -> PathBuf {
        let path = dir.join(CONFIG_FILE_NAME);
        std::fs::write(&path, contents).unwrap();
        path
    }

    fn write_info(dir: &Path, info: &ConnectionInfo) -> PathBuf {
        write_config(dir, &serde_json::to_string(info).unwrap())
    }

    fn full_info() -> ConnectionInfo {
        ConnectionInfo {
            user: "example_user".to_owned(),
            password: "example_password".to_owned(),
            host: "192.168.1.1".to_owned(),
            port: 8080,
        }
    }

    #[test]
    fn test_valid_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_info(dir.path(), &full_info());

        let location = ConfigLocation::new(&path).with_explicit(&path);
        let result = resolve(&location, &Overrides::default(), false).unwrap();

        assert_eq!(result, Some(full_info()));
    }

    #[test]
    fn test_capitalized_keys() {
        let dir = tempfile::tempdir().unwrap();
        write_config(
            dir.path(),
            r#"{"User":"u","Password":"p","Host":"h","Port":6107}"#,
        );

        let location = ConfigLocation::in_app_home(dir.path());
        let result = resolve(&location, &Overrides::default(), false)
            .unwrap()
            .unwrap();

        assert_eq!(result.user, "u");
        assert_eq!(result.password, "p");
        assert_eq!(result.host, "h");
        assert_eq!(result.port, 6107);
    }

    #[test]
    fn test_keys_match_any_case() {
        let dir = tempfile::tempdir().unwrap();
        write_config(
            dir.path(),
            r#"{"USER":"u","PassWord":"p","host":"h","pOrT":6107}"#,
        );

        let location = ConfigLocation::in_app_home(dir.path());
        let result = resolve(&location, &Overrides::default(), false)
            .unwrap()
            .unwrap();

        assert_eq!(result.user, "u");
        assert_eq!(result.password, "p");
        assert_eq!(result.host, "h");
        assert_eq!(result.port, 6107);
    }

    #[test]
    fn test_null_config_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(dir.path(), "null");

        let overrides = Overrides {
            user: Some("u".to_owned()),
            password: Some("p".to_owned()),
            host: None,
            port: Some(6107),
        };

        let result = resolve(&ConfigLocation::new(&path), &overrides, false)
            .unwrap()
            .unwrap();
        assert_eq!(result.host, DEFAULT_HOST);

        let error = resolve(&ConfigLocation::new(path), &Overrides::default(), false).unwrap_err();
        assert!(matches!(error, Error::Insufficient), "{error}");
    }

    #[test]
    fn test_missing_default_may_be_missing() {
        let dir = tempfile::tempdir().unwrap();
        let location = ConfigLocation::new(dir.path().join("nonexistent.json"));

        let result = resolve(&location, &Overrides::default(), true).unwrap();
        assert_eq!(result, None);
    }

    #[test]
    fn test_missing_default_required() {
        let dir = tempfile::tempdir().unwrap();
        let location = ConfigLocation::new(dir.path().join("nonexistent.json"));

        let error = resolve(&location, &Overrides::default(), false).unwrap_err();
        assert!(error.is_not_found(), "{error}");
    }

    #[test]
    fn test_missing_default_satisfied_by_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let location = ConfigLocation::new(dir.path().join("nonexistent.json"));

        let overrides = Overrides {
            user: Some("override_user".to_owned()),
            password: Some("override_password".to_owned()),
            host: None,
            port: Some(1234),
        };

        let result = resolve(&location, &overrides, false).unwrap().unwrap();
        assert_eq!(result.host, DEFAULT_HOST);
        assert_eq!(result.port, 1234);
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let default = write_info(dir.path(), &full_info());
        let location =
            ConfigLocation::new(default).with_explicit(dir.path().join("nonexistent.json"));

        // even with everything overridden and may_be_missing set.
        let overrides = Overrides {
            user: Some("u".to_owned()),
            password: Some("p".to_owned()),
            host: None,
            port: Some(1),
        };

        let error = resolve(&location, &overrides, true).unwrap_err();
        assert!(error.is_not_found(), "{error}");
    }

    #[test]
    fn test_invalid_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(dir.path(), "not valid json");

        let location = ConfigLocation::new(&path);
        let error = resolve(&location, &Overrides::default(), false).unwrap_err();

        assert!(matches!(error, Error::Parse { .. }));
        assert!(
            error.to_string().starts_with("error parsing config file"),
            "{error}"
        );
    }

    #[test]
    fn test_overrides_take_precedence() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_info(
            dir.path(),
            &ConnectionInfo {
                user: "config_user".to_owned(),
                password: "config_password".to_owned(),
                host: "config_host".to_owned(),
                port: 9999,
            },
        );

        let overrides = Overrides {
            user: Some("override_user".to_owned()),
            password: Some("override_password".to_owned()),
            host: Some("override_host".to_owned()),
            port: Some(1234),
        };

        let result = resolve(&ConfigLocation::new(path), &overrides, false)
            .unwrap()
            .unwrap();

        assert_eq!(
            result,
            ConnectionInfo {
                user: "override_user".to_owned(),
                password: "override_password".to_owned(),
                host: "override_host".to_owned(),
                port: 1234,
            }
        );
    }

    #[test]
    fn test_empty_overrides_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_info(dir.path(), &full_info());

        let overrides = Overrides {
            user: Some(String::new()),
            password: Some(String::new()),
            host: Some(String::new()),
            port: Some(0),
        };

        let result = resolve(&ConfigLocation::new(path), &overrides, false).unwrap();
        assert_eq!(result, Some(full_info()));
    }

    #[test]
    fn test_default_host() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_info(
            dir.path(),
            &ConnectionInfo {
                host: String::new(),
                ..full_info()
            },
        );

        let result = resolve(&ConfigLocation::new(path), &Overrides::default(), false)
            .unwrap()
            .unwrap();

        assert_eq!(result.host, DEFAULT_HOST);
    }

    #[test]
    fn test_missing_required_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_info(
            dir.path(),
            &ConnectionInfo {
                host: "example_host".to_owned(),
                ..ConnectionInfo::default()
            },
        );

        let error = resolve(&ConfigLocation::new(path), &Overrides::default(), true).unwrap_err();

        assert!(matches!(error, Error::Insufficient));
        assert!(error.to_string().contains("insufficient connection settings"));
    }
}
