use std::{
    borrow::Cow,
    fmt, io,
    path::{Path, PathBuf},
};

use rust_cli_config::Map;
use rust_cli_config::builder::{ConfigBuilder, DefaultState};
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::environment::Environment;

/// Directory containing configuration files relative to application root.
const CONFIGURATION_DIR: &str = "configuration";

/// Supported extensions for base and environment configuration files.
const CONFIG_FILE_EXTENSIONS: &[&str] = &["yaml", "yml", "json"];

/// Prefix for environment variable configuration overrides.
const ENV_PREFIX: &str = "APP";

/// Separator between environment variable prefix and key segments.
const ENV_PREFIX_SEPARATOR: &str = "_";

/// Separator for nested configuration keys in environment variables.
const ENV_SEPARATOR: &str = "__";

/// Trait implemented by configuration structures loaded through [`load_config`].
pub trait Config {
    /// Plain environment variables mapped onto configuration keys, as `(variable, key)`.
    ///
    /// Aliases are applied after every other source, so a set alias always wins.
    const ENV_ALIASES: &'static [(&'static str, &'static str)] = &[];
}

/// Identifies which configuration file is currently being loaded.
#[derive(Debug, Clone, Copy)]
enum ConfigFileKind {
    Base,
    Environment(Environment),
}

impl ConfigFileKind {
    fn stem(&self) -> Cow<'static, str> {
        match self {
            ConfigFileKind::Base => Cow::Borrowed("base"),
            ConfigFileKind::Environment(env) => Cow::Owned(env.to_string()),
        }
    }
}

impl fmt::Display for ConfigFileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigFileKind::Base => f.write_str("base configuration"),
            ConfigFileKind::Environment(env) => write!(f, "{env} environment configuration"),
        }
    }
}

/// Errors that can occur while loading configuration files and overrides.
#[derive(Debug, Error)]
pub enum LoadConfigError {
    /// Failed to determine the current working directory.
    #[error("failed to determine the current directory: {0}")]
    CurrentDir(#[source] io::Error),

    /// A configuration file existed but could not be parsed.
    #[error("failed to load {kind_description} from `{path}`: {source}")]
    ConfigurationFileLoad {
        kind_description: String,
        path: PathBuf,
        source: rust_cli_config::ConfigError,
    },

    /// An environment variable alias could not be applied.
    #[error("failed to apply environment variable `{variable}` to `{key}`: {source}")]
    EnvironmentAlias {
        variable: &'static str,
        key: &'static str,
        source: rust_cli_config::ConfigError,
    },

    /// The sources were merged but deserialization failed.
    #[error("failed to deserialize configuration: {0}")]
    Deserialization(#[source] rust_cli_config::ConfigError),

    /// Failed to determine the runtime environment (`APP_ENVIRONMENT`).
    #[error("failed to determine runtime environment: {0}")]
    Environment(#[from] io::Error),

    /// Failed to merge the configuration sources.
    #[error("failed to build configuration: {0}")]
    Builder(#[source] rust_cli_config::ConfigError),
}

/// Loads hierarchical configuration from files and the process environment.
///
/// Reads `configuration/base.(yaml|yml|json)` and `configuration/{environment}.(yaml|yml|json)`
/// relative to the current directory when they exist, then applies `APP_`-prefixed
/// environment variables (`APP_DESTINATION__PROJECT_ID`) and finally the aliases declared by
/// [`Config::ENV_ALIASES`].
pub fn load_config<T>() -> Result<T, LoadConfigError>
where
    T: Config + DeserializeOwned,
{
    let base_path = std::env::current_dir().map_err(LoadConfigError::CurrentDir)?;
    let environment = Environment::load().map_err(LoadConfigError::Environment)?;
    let variables: Map<String, String> = std::env::vars().collect();

    load_config_from(&base_path.join(CONFIGURATION_DIR), environment, variables)
}

/// Loads configuration from an explicit directory, environment and variable set.
///
/// Missing files are skipped, so a deployment may be configured through variables only.
pub fn load_config_from<T>(
    configuration_directory: &Path,
    environment: Environment,
    variables: Map<String, String>,
) -> Result<T, LoadConfigError>
where
    T: Config + DeserializeOwned,
{
    let mut builder = rust_cli_config::Config::builder();

    for kind in [ConfigFileKind::Base, ConfigFileKind::Environment(environment)] {
        if let Some(path) = find_configuration_file(configuration_directory, kind) {
            builder = builder.add_source(rust_cli_config::File::from(path.clone()));
            validate_configuration_source(&builder, kind, &path)?;
        }
    }

    let aliases = T::ENV_ALIASES
        .iter()
        .filter_map(|(variable, key)| {
            variables
                .get(*variable)
                .filter(|value| !value.is_empty())
                .map(|value| (*variable, *key, value.clone()))
        })
        .collect::<Vec<_>>();

    let environment_source = rust_cli_config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator(ENV_PREFIX_SEPARATOR)
        .separator(ENV_SEPARATOR)
        .source(Some(variables));

    builder = builder.add_source(environment_source);

    for (variable, key, value) in aliases {
        builder = builder
            .set_override(key, value)
            .map_err(|source| LoadConfigError::EnvironmentAlias {
                variable,
                key,
                source,
            })?;
    }

    let settings = builder.build().map_err(LoadConfigError::Builder)?;

    settings
        .try_deserialize::<T>()
        .map_err(LoadConfigError::Deserialization)
}

/// Finds the configuration file of `kind` with the first supported extension that exists.
fn find_configuration_file(directory: &Path, kind: ConfigFileKind) -> Option<PathBuf> {
    let stem = kind.stem();

    CONFIG_FILE_EXTENSIONS
        .iter()
        .map(|extension| directory.join(format!("{stem}.{extension}")))
        .find(|path| path.is_file())
}

fn validate_configuration_source(
    builder: &ConfigBuilder<DefaultState>,
    kind: ConfigFileKind,
    path: &Path,
) -> Result<(), LoadConfigError> {
    builder
        .clone()
        .build()
        .map_err(|source| LoadConfigError::ConfigurationFileLoad {
            kind_description: kind.to_string(),
            path: path.to_path_buf(),
            source,
        })
        .map(|_| ())
}
