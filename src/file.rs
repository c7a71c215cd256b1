//! Loading the initial instance from TOML.
//!
//! The file only provides the starting values; defaults, environment and
//! flags are layered on top by [`Tagfig::process`](crate::Tagfig::process).
//! Target types normally carry `#[serde(default)]` so a partial file
//! deserializes.

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;

use crate::error::TagfigError;

/// Read and parse `path`. A missing file is an error.
pub fn load<T: DeserializeOwned>(path: &Path) -> Result<T, TagfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| TagfigError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    from_str(&content, path)
}

/// Like [`load`], but a missing file yields `T::default()`.
pub fn load_or_default<T: DeserializeOwned + Default>(path: &Path) -> Result<T, TagfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => from_str(&content, path),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "no config file, starting from defaults");
            Ok(T::default())
        }
        Err(e) => Err(TagfigError::Io {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// Load the last existing file of `candidates`, which are listed lowest
/// priority first. `None` when none exists.
pub fn load_first_match<T: DeserializeOwned>(
    candidates: &[PathBuf],
) -> Result<Option<(PathBuf, T)>, TagfigError> {
    for path in candidates.iter().rev() {
        match std::fs::read_to_string(path) {
            Ok(content) => return Ok(Some((path.clone(), from_str(&content, path)?))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => {
                return Err(TagfigError::Io {
                    path: path.clone(),
                    source: e,
                });
            }
        }
    }
    Ok(None)
}

/// Parse TOML text; `origin` is only used in errors.
pub fn from_str<T: DeserializeOwned>(content: &str, origin: &Path) -> Result<T, TagfigError> {
    toml::from_str(content).map_err(|e| TagfigError::Parse {
        path: origin.to_path_buf(),
        source: e,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::test::Server;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn load_partial_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("server.toml");
        fs::write(&path, "port = 3000\n").unwrap();
        let config: Server = load(&path).unwrap();
        assert_eq!(config.port, 3000);
        assert_eq!(config.host, "");
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        let err = load::<Server>(&dir.path().join("nope.toml")).unwrap_err();
        assert!(matches!(err, TagfigError::Io { .. }));
    }

    #[test]
    fn load_or_default_tolerates_missing_file() {
        let dir = TempDir::new().unwrap();
        let config: Server = load_or_default(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(config, Server::default());
    }

    #[test]
    fn parse_error_names_file() {
        let err = from_str::<Server>("port = \"high\"", Path::new("bad.toml")).unwrap_err();
        assert!(matches!(err, TagfigError::Parse { ref path, .. } if path == Path::new("bad.toml")));
        assert!(err.to_string().contains("bad.toml"));
    }

    #[test]
    fn first_match_prefers_last_candidate() {
        let low = TempDir::new().unwrap();
        let high = TempDir::new().unwrap();
        fs::write(low.path().join("s.toml"), "port = 1\n").unwrap();
        fs::write(high.path().join("s.toml"), "port = 2\n").unwrap();

        let candidates = vec![low.path().join("s.toml"), high.path().join("s.toml")];
        let (path, config) = load_first_match::<Server>(&candidates).unwrap().unwrap();
        assert_eq!(path, candidates[1]);
        assert_eq!(config.port, 2);
    }

    #[test]
    fn first_match_skips_missing() {
        let low = TempDir::new().unwrap();
        let high = TempDir::new().unwrap();
        fs::write(low.path().join("s.toml"), "port = 1\n").unwrap();

        let candidates = vec![low.path().join("s.toml"), high.path().join("s.toml")];
        let (_, config) = load_first_match::<Server>(&candidates).unwrap().unwrap();
        assert_eq!(config.port, 1);

        let none = load_first_match::<Server>(&[high.path().join("s.toml")]).unwrap();
        assert!(none.is_none());
    }
}
