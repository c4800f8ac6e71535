use std::io;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::environment::Environment;

/// Overrides the configuration directory when set.
const DIRECTORY_OVERRIDE_VAR: &str = "APP_CONFIGURATION_DIR";

/// Looked up in the working directory when no override is set.
const DEFAULT_DIRECTORY: &str = "configuration";

/// Accepted extensions, in lookup order.
const EXTENSIONS: [&str; 3] = ["yaml", "yml", "json"];

/// `APP_INDEX__PORT=9306` overrides `index.port`.
const OVERRIDE_PREFIX: &str = "APP";
const NESTING_SEPARATOR: &str = "__";

/// A configuration file merged into the final settings.
#[derive(Debug, Clone, Copy)]
enum Layer {
    Base,
    Overlay(Environment),
}

impl Layer {
    fn name(self) -> &'static str {
        match self {
            Layer::Base => "base",
            Layer::Overlay(environment) => environment.as_str(),
        }
    }

    /// Returns the first existing file for this layer, or every candidate that was tried.
    fn locate(self, directory: &Path) -> Result<PathBuf, Vec<PathBuf>> {
        let candidates: Vec<PathBuf> = EXTENSIONS
            .iter()
            .map(|extension| directory.join(format!("{}.{extension}", self.name())))
            .collect();

        match candidates.iter().find(|candidate| candidate.is_file()) {
            Some(found) => Ok(found.clone()),
            None => Err(candidates),
        }
    }
}

/// Failure to assemble the configuration.
#[derive(Debug, Error)]
pub enum LoadConfigError {
    #[error("cannot resolve the working directory: {0}")]
    WorkingDirectory(#[source] io::Error),

    #[error("invalid APP_ENVIRONMENT: {0}")]
    Environment(#[from] io::Error),

    #[error("configuration directory {} does not exist", .0.display())]
    DirectoryNotFound(PathBuf),

    #[error("no `{layer}` configuration file found, tried {}", display_paths(.tried))]
    FileNotFound { layer: &'static str, tried: Vec<PathBuf> },

    #[error("cannot parse {}: {source}", .path.display())]
    InvalidFile {
        path: PathBuf,
        #[source]
        source: config::ConfigError,
    },

    #[error("cannot apply environment overrides: {0}")]
    Overrides(#[source] config::ConfigError),

    #[error("configuration does not match the expected shape: {0}")]
    Shape(#[source] config::ConfigError),
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|path| path.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Loads the configuration for the environment named by `APP_ENVIRONMENT`.
///
/// Files are read from `$APP_CONFIGURATION_DIR`, or `./configuration` when unset.
pub fn load_config<T>() -> Result<T, LoadConfigError>
where
    T: DeserializeOwned,
{
    let directory = match std::env::var_os(DIRECTORY_OVERRIDE_VAR) {
        Some(directory) => PathBuf::from(directory),
        None => std::env::current_dir()
            .map_err(LoadConfigError::WorkingDirectory)?
            .join(DEFAULT_DIRECTORY),
    };

    load_config_from(&directory, Environment::load()?)
}

/// Merges `base`, then the `environment` overlay, then `APP_` environment variables.
///
/// Both files are required. Each one is parsed as soon as it is added so that a syntax error
/// names the offending file.
pub fn load_config_from<T>(directory: &Path, environment: Environment) -> Result<T, LoadConfigError>
where
    T: DeserializeOwned,
{
    if !directory.is_dir() {
        return Err(LoadConfigError::DirectoryNotFound(directory.to_path_buf()));
    }

    let builder = [Layer::Base, Layer::Overlay(environment)].into_iter().try_fold(
        config::Config::builder(),
        |builder, layer| {
            let path = layer
                .locate(directory)
                .map_err(|tried| LoadConfigError::FileNotFound {
                    layer: layer.name(),
                    tried,
                })?;

            let builder = builder.add_source(config::File::from(path.as_path()));
            match builder.build_cloned() {
                Ok(_) => Ok(builder),
                Err(source) => Err(LoadConfigError::InvalidFile { path, source }),
            }
        },
    )?;

    let overrides = config::Environment::with_prefix(OVERRIDE_PREFIX)
        .prefix_separator("_")
        .separator(NESTING_SEPARATOR)
        .try_parsing(true);

    builder
        .add_source(overrides)
        .build()
        .map_err(LoadConfigError::Overrides)?
        .try_deserialize()
        .map_err(LoadConfigError::Shape)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use serde::Deserialize;

    use super::*;

    #[derive(Debug, Deserialize)]
    struct Endpoint {
        host: String,
        port: u16,
    }

    struct Scratch(PathBuf);

    impl Scratch {
        fn new(label: &str) -> Self {
            let path = std::env::temp_dir()
                .join(format!("indexer-config-{label}-{}", std::process::id()));
            let _ = fs::remove_dir_all(&path);
            fs::create_dir_all(&path).unwrap();
            Self(path)
        }

        fn write(&self, file: &str, contents: &str) -> &Self {
            fs::write(self.0.join(file), contents).unwrap();
            self
        }
    }

    impl Drop for Scratch {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.0);
        }
    }

    #[test]
    fn overlay_wins_over_base() {
        let scratch = Scratch::new("overlay");
        scratch
            .write("base.yaml", "host: localhost\nport: 9306\n")
            .write("prod.yml", "port: 9312\n");

        let endpoint: Endpoint = load_config_from(&scratch.0, Environment::Prod).unwrap();

        assert_eq!(endpoint.host, "localhost");
        assert_eq!(endpoint.port, 9312);
    }

    #[test]
    fn missing_overlay_lists_every_candidate() {
        let scratch = Scratch::new("no-overlay");
        scratch.write("base.json", r#"{"host":"localhost","port":9306}"#);

        let err = load_config_from::<Endpoint>(&scratch.0, Environment::Dev).unwrap_err();

        match err {
            LoadConfigError::FileNotFound { layer, tried } => {
                assert_eq!(layer, "dev");
                assert_eq!(tried.len(), EXTENSIONS.len());
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn malformed_file_is_named() {
        let scratch = Scratch::new("malformed");
        scratch
            .write("base.yaml", "host: localhost\nport: 9306\n")
            .write("dev.yaml", "port: [unterminated\n");

        let err = load_config_from::<Endpoint>(&scratch.0, Environment::Dev).unwrap_err();

        assert!(matches!(
            err,
            LoadConfigError::InvalidFile { ref path, .. } if path.ends_with("dev.yaml")
        ));
    }

    #[test]
    fn unknown_directory_is_rejected() {
        let directory = std::env::temp_dir().join("indexer-config-absent");

        let err = load_config_from::<Endpoint>(&directory, Environment::Dev).unwrap_err();

        assert!(matches!(err, LoadConfigError::DirectoryNotFound(_)));
    }
}
