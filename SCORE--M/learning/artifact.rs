use std::{
    fs,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;

/// A fitted object whose learned state can be exported to and imported from disk.
pub trait Artifact: Serialize + DeserializeOwned {
    /// Tag stored alongside the state; loading checks it.
    const KIND: &'static str;
    /// Bumped whenever the serialized state layout changes.
    const FORMAT_VERSION: u32 = 1;
}

/// Errors raised while persisting or restoring artifacts.
#[derive(Debug, Error)]
pub enum ArtifactError {
    /// The artifact file does not exist.
    #[error("artifact not found at {0}")]
    Missing(PathBuf),
    /// Filesystem failure.
    #[error("io error on {path}: {source}")]
    Io {
        /// File involved.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },
    /// Malformed artifact contents.
    #[error("corrupt artifact {path}: {source}")]
    Corrupt {
        /// File involved.
        path: PathBuf,
        /// Underlying error.
        source: serde_json::Error,
    },
    /// The file holds a different kind of artifact.
    #[error("artifact {path} holds `{found}`, expected `{expected}`")]
    KindMismatch {
        /// File involved.
        path: PathBuf,
        /// Expected kind.
        expected: &'static str,
        /// Kind recorded in the file.
        found: String,
    },
    /// The file was written with an incompatible layout.
    #[error("artifact {path} has format version {found}, expected {expected}")]
    VersionMismatch {
        /// File involved.
        path: PathBuf,
        /// Supported version.
        expected: u32,
        /// Version recorded in the file.
        found: u32,
    },
}

#[derive(Serialize)]
struct EnvelopeRef<'a, T> {
    kind: &'a str,
    format_version: u32,
    created_at: DateTime<Utc>,
    payload: &'a T,
}

#[derive(Deserialize)]
struct EnvelopeHeader {
    kind: String,
    format_version: u32,
}

#[derive(Deserialize)]
struct Envelope<T> {
    payload: T,
}

/// Writes an artifact, replacing any previous file atomically.
pub fn save_artifact<A: Artifact>(path: impl AsRef<Path>, artifact: &A) -> Result<(), ArtifactError> {
    let path = path.as_ref();
    let io_err = |source| ArtifactError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
    }
    let envelope = EnvelopeRef {
        kind: A::KIND,
        format_version: A::FORMAT_VERSION,
        created_at: Utc::now(),
        payload: artifact,
    };
    let bytes = serde_json::to_vec(&envelope).map_err(|source| ArtifactError::Corrupt {
        path: path.to_path_buf(),
        source,
    })?;
    let staging = staging_path(path);
    fs::write(&staging, bytes).map_err(io_err)?;
    fs::rename(&staging, path).map_err(io_err)?;
    Ok(())
}

/// Reads an artifact written by [`save_artifact`], checking kind and version.
pub fn load_artifact<A: Artifact>(path: impl AsRef<Path>) -> Result<A, ArtifactError> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(ArtifactError::Missing(path.to_path_buf()));
    }
    let bytes = fs::read(path).map_err(|source| ArtifactError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let corrupt = |source| ArtifactError::Corrupt {
        path: path.to_path_buf(),
        source,
    };
    let header: EnvelopeHeader = serde_json::from_slice(&bytes).map_err(corrupt)?;
    if header.kind != A::KIND {
        return Err(ArtifactError::KindMismatch {
            path: path.to_path_buf(),
            expected: A::KIND,
            found: header.kind,
        });
    }
    if header.format_version != A::FORMAT_VERSION {
        return Err(ArtifactError::VersionMismatch {
            path: path.to_path_buf(),
            expected: A::FORMAT_VERSION,
            found: header.format_version,
        });
    }
    let envelope: Envelope<A> = serde_json::from_slice(&bytes).map_err(corrupt)?;
    Ok(envelope.payload)
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(std::ffi::OsStr::to_os_string)
        .unwrap_or_default();
    name.push(".partial");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Medians {
        values: Vec<f64>,
    }

    impl Artifact for Medians {
        const KIND: &'static str = "test.medians";
    }

    #[derive(Debug, Serialize, Deserialize)]
    struct Other;

    impl Artifact for Other {
        const KIND: &'static str = "test.other";
    }

    #[test]
    fn round_trips_exact_floats() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("artifacts/medians.pkl");
        let state = Medians {
            values: vec![0.1 + 0.2, 1.0 / 3.0, -7.25e-12, 69.0],
        };
        save_artifact(&path, &state).unwrap();
        let restored: Medians = load_artifact(&path).unwrap();
        assert_eq!(restored, state);
        assert!(!staging_path(&path).exists());
    }

    #[test]
    fn rejects_wrong_kind_and_missing_files() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("medians.pkl");
        save_artifact(&path, &Medians { values: vec![] }).unwrap();
        assert!(matches!(
            load_artifact::<Other>(&path),
            Err(ArtifactError::KindMismatch { .. })
        ));
        assert!(matches!(
            load_artifact::<Medians>(dir.path().join("absent.pkl")),
            Err(ArtifactError::Missing(_))
        ));
    }

    #[test]
    fn rejects_garbage() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("model.pkl");
        fs::write(&path, b"\x80\x04pickle").unwrap();
        assert!(matches!(
            load_artifact::<Medians>(&path),
            Err(ArtifactError::Corrupt { .. })
        ));
    }
}
