// SPDX-License-Identifier: CEPL-1.0
use serde::de::DeserializeOwned;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("parsing {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Reads a TOML file into `T`.
///
/// A missing file is not an error and yields `T::default()`.
pub fn load_toml<T>(path: &Path) -> Result<T, ConfigError>
where
    T: DeserializeOwned + Default,
{
    let text = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            tracing::debug!("no config at {}, using defaults", path.display());
            return Ok(T::default());
        }
        Err(source) => {
            return Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    toml::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Default, Deserialize, PartialEq)]
    #[serde(default)]
    struct Sample {
        width: u32,
        title: String,
    }

    fn scratch(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("prism-core-{}-{name}", std::process::id()))
    }

    #[test]
    fn missing_file_gives_defaults() {
        let cfg: Sample = load_toml(&scratch("does-not-exist.toml")).unwrap();
        assert_eq!(cfg, Sample::default());
    }

    #[test]
    fn partial_file_fills_the_rest_with_defaults() {
        let path = scratch("partial.toml");
        std::fs::write(&path, "width = 800\n").unwrap();
        let cfg: Sample = load_toml(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(cfg.width, 800);
        assert!(cfg.title.is_empty());
    }

    #[test]
    fn malformed_file_reports_path() {
        let path = scratch("broken.toml");
        std::fs::write(&path, "width = [\n").unwrap();
        let err = load_toml::<Sample>(&path).unwrap_err();
        std::fs::remove_file(&path).ok();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("broken.toml"));
    }
}
