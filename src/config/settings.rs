use std::{
    borrow::Cow,
    path::{Path, PathBuf},
    time::Duration,
};

use compio::fs;
use hashlink::LinkedHashMap;
use saphyr::{LoadableYamlNode, Scalar, Yaml};
use snafu::prelude::*;
use tracing::{debug, info};

use crate::{
    ext::{AsyncTryFrom, AsyncTryInto, BestEffortPathExt},
    paths::PathSourceKind,
};

pub const SETTINGS_FILE_NAME: &str = "locksmith.yaml";

const DEFAULT_EXPANSION_DEPTH: usize = 3;
const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(60);

/// Which files a front end shows when it starts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DefaultMode {
    /// Files that can be locked.
    Lock,
    /// Files that are locked and can be released.
    #[default]
    Unlock,
}

/// User settings read from `locksmith.yaml`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub project_root: PathBuf,
    pub git_lfs_executable: Option<String>,
    pub current_user: Option<String>,
    pub admin_users: Vec<String>,
    pub tracked_file_filter: Option<String>,
    pub default_expansion_depth: usize,
    pub default_mode: DefaultMode,
    pub path_source: PathSourceKind,
    pub command_timeout: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            project_root: PathBuf::from("."),
            git_lfs_executable: None,
            current_user: None,
            admin_users: Vec::new(),
            tracked_file_filter: None,
            default_expansion_depth: DEFAULT_EXPANSION_DEPTH,
            default_mode: DefaultMode::default(),
            path_source: PathSourceKind::default(),
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }
}

impl Settings {
    /// Reads the settings file, falling back to defaults when it does not exist.
    pub async fn read(path: &Path) -> Result<Self, SettingsError> {
        if !path.exists() {
            info!(
                "No settings file at {}, using defaults",
                path.best_effort_path_display()
            );
            return Ok(Self::default());
        }
        path.async_try_into().await
    }

    fn parse_mapping(top_level: &LinkedHashMap<Yaml, Yaml>) -> Result<Self, SettingsError> {
        let defaults = Self::default();
        let fields = Fields(top_level);

        let project_root = fields
            .string("projectRoot")?
            .map(PathBuf::from)
            .unwrap_or(defaults.project_root);

        let default_mode = match fields.string("defaultMode")? {
            None => defaults.default_mode,
            Some(mode) => match mode.to_lowercase().as_str() {
                "lock" => DefaultMode::Lock,
                "unlock" => DefaultMode::Unlock,
                _ => return InvalidValueSnafu { key: "defaultMode", value: mode }.fail(),
            },
        };

        let path_source = match fields.string("pathSource")? {
            None => defaults.path_source,
            Some(source) => match source.to_lowercase().as_str() {
                "tracked" => PathSourceKind::Tracked,
                "filesystem" => PathSourceKind::Filesystem,
                _ => return InvalidValueSnafu { key: "pathSource", value: source }.fail(),
            },
        };

        let command_timeout = match fields.unsigned("commandTimeoutSecs")? {
            None => defaults.command_timeout,
            Some(0) => {
                return InvalidValueSnafu {
                    key: "commandTimeoutSecs",
                    value: "0",
                }
                .fail();
            }
            Some(secs) => Duration::from_secs(secs),
        };

        Ok(Settings {
            project_root,
            git_lfs_executable: fields.string("gitLfsExecutable")?,
            current_user: fields.string("currentUser")?,
            admin_users: fields.string_list("adminUsers")?,
            tracked_file_filter: fields.string("trackedFileFilter")?,
            default_expansion_depth: fields
                .unsigned("defaultExpansionDepth")?
                .map(|depth| depth as usize)
                .unwrap_or(defaults.default_expansion_depth),
            default_mode,
            path_source,
            command_timeout,
        })
    }
}

impl AsyncTryFrom<&Path> for Settings {
    type Error = SettingsError;

    async fn async_try_from(path: &Path) -> Result<Self, Self::Error> {
        debug!("Reading settings file: {}", path.best_effort_path_display());
        let bytes = fs::read(path).await.context(ReadSnafu {
            file_path: path.best_effort_path_display(),
        })?;
        let contents = String::from_utf8(bytes).context(EncodingSnafu {
            file_path: path.best_effort_path_display(),
        })?;
        contents.as_str().try_into()
    }
}

impl TryFrom<&str> for Settings {
    type Error = SettingsError;

    fn try_from(contents: &str) -> Result<Self, Self::Error> {
        let documents =
            Yaml::load_from_str(contents).map_err(|e| SettingsError::ParseError { source: e })?;
        let Some(document) = documents.first() else {
            return Ok(Settings::default());
        };

        if matches!(document, Yaml::Value(Scalar::Null)) {
            return Ok(Settings::default());
        }

        let top_level = document
            .as_mapping()
            .ok_or(SettingsError::TopLevelNotMap)?;

        Self::parse_mapping(top_level)
    }
}

/// Typed access to the keys of the settings mapping. Absent and null keys
/// read as `None`; keys of the wrong type are errors.
struct Fields<'a, 'input>(&'a LinkedHashMap<Yaml<'input>, Yaml<'input>>);

impl<'a, 'input> Fields<'a, 'input> {
    fn get(&self, key: &'static str) -> Option<&'a Yaml<'input>> {
        self.0
            .get(&Yaml::Value(Scalar::String(Cow::Borrowed(key))))
            .filter(|value| !matches!(value, Yaml::Value(Scalar::Null)))
    }

    fn string(&self, key: &'static str) -> Result<Option<String>, SettingsError> {
        match self.get(key) {
            None => Ok(None),
            Some(Yaml::Value(Scalar::String(value))) => {
                let value = value.trim();
                Ok((!value.is_empty()).then(|| value.to_string()))
            }
            Some(_) => WrongTypeSnafu { key, expected: "a string" }.fail(),
        }
    }

    fn unsigned(&self, key: &'static str) -> Result<Option<u64>, SettingsError> {
        match self.get(key) {
            None => Ok(None),
            Some(Yaml::Value(Scalar::Integer(value))) if *value >= 0 => Ok(Some(*value as u64)),
            Some(_) => WrongTypeSnafu { key, expected: "a non-negative integer" }.fail(),
        }
    }

    /// Accepts either a YAML sequence or a comma-separated string.
    fn string_list(&self, key: &'static str) -> Result<Vec<String>, SettingsError> {
        let items: Vec<String> = match self.get(key) {
            None => Vec::new(),
            Some(Yaml::Value(Scalar::String(value))) => {
                value.split(',').map(|item| item.trim().to_string()).collect()
            }
            Some(Yaml::Sequence(values)) => values
                .iter()
                .map(|value| match value {
                    Yaml::Value(Scalar::String(item)) => Ok(item.trim().to_string()),
                    _ => WrongTypeSnafu { key, expected: "a list of strings" }.fail(),
                })
                .collect::<Result<_, _>>()?,
            Some(_) => return WrongTypeSnafu { key, expected: "a list of strings" }.fail(),
        };

        Ok(items.into_iter().filter(|item| !item.is_empty()).collect())
    }
}

#[derive(Debug, Snafu)]
pub enum SettingsError {
    #[snafu(display("Failed to read the settings file: {}", file_path))]
    ReadError {
        file_path: String,
        source: std::io::Error,
    },
    #[snafu(display("Settings file {} is not valid UTF-8", file_path))]
    EncodingError {
        file_path: String,
        source: std::string::FromUtf8Error,
    },
    #[snafu(display("Failed to parse the settings file"))]
    ParseError { source: saphyr::ScanError },
    #[snafu(display("Top level of the settings file should be a map"))]
    TopLevelNotMap,
    #[snafu(display("Setting '{}' should be {}", key, expected))]
    WrongType {
        key: &'static str,
        expected: &'static str,
    },
    #[snafu(display("Setting '{}' has unsupported value '{}'", key, value))]
    InvalidValue { key: &'static str, value: String },
}
