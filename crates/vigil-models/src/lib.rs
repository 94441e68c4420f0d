use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub mod onnx;

pub use onnx::{OnnxEmbeddingExtractor, OnnxError, OnnxLandmarkDetector};

/// Model file descriptor: expected filename and what the model does.
pub struct ModelFile {
    pub name: &'static str,
    pub role: &'static str,
}

pub const LANDMARK_MODEL: &str = "face_landmark.onnx";
pub const EMBEDDING_MODEL: &str = "facenet.onnx";

/// Every model the daemon loads. Sources are supplied by the operator at
/// setup time; their digests are pinned in [`LOCKFILE`].
pub const MODELS: &[ModelFile] = &[
    ModelFile {
        name: LANDMARK_MODEL,
        role: "468-point face mesh",
    },
    ModelFile {
        name: EMBEDDING_MODEL,
        role: "face embedding",
    },
];

/// sha256sum-format digest list, one `<hex>  <name>` line per model.
pub const LOCKFILE: &str = "models.sha256";

/// Determine the model directory.
///
/// When running as root (UID 0), defaults to `/var/lib/vigil/models` (system-wide).
/// Otherwise defaults to `$XDG_DATA_HOME/vigil/models` (~/.local/share/vigil/models).
pub fn default_model_dir() -> PathBuf {
    if is_root() {
        PathBuf::from("/var/lib/vigil/models")
    } else {
        let data_home = std::env::var("XDG_DATA_HOME").unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            format!("{home}/.local/share")
        });
        PathBuf::from(data_home).join("vigil/models")
    }
}

fn is_root() -> bool {
    // SAFETY: geteuid is always safe to call.
    unsafe { libc::geteuid() == 0 }
}

#[derive(Error, Debug)]
pub enum ModelIntegrityError {
    #[error("model file not found: {name} ({path})")]
    MissingModel { name: &'static str, path: PathBuf },

    #[error("checksum lockfile not found: {path} (run `vigil setup`)")]
    MissingLockfile { path: PathBuf },

    #[error("model {name} is not listed in {lockfile}")]
    Unlisted { name: &'static str, lockfile: PathBuf },

    #[error("malformed checksum lockfile {path} at line {line}")]
    MalformedLockfile { path: PathBuf, line: usize },

    #[error("failed to open model file: {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read model file: {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(
        "model checksum mismatch for {name} ({path})\n  expected: {expected}\n  got:      {got}"
    )]
    ChecksumMismatch {
        name: &'static str,
        path: PathBuf,
        expected: String,
        got: String,
    },
}

/// Compute SHA-256 hex digest of a file.
pub fn sha256_file_hex(path: &Path) -> Result<String, ModelIntegrityError> {
    let mut file = fs::File::open(path).map_err(|source| ModelIntegrityError::Open {
        path: path.to_path_buf(),
        source,
    })?;

    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];

    loop {
        let n = file
            .read(&mut buf)
            .map_err(|source| ModelIntegrityError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

pub fn verify_file_sha256(
    name: &'static str,
    path: &Path,
    expected_sha256: &str,
) -> Result<(), ModelIntegrityError> {
    if !path.exists() {
        return Err(ModelIntegrityError::MissingModel {
            name,
            path: path.to_path_buf(),
        });
    }

    let digest = sha256_file_hex(path)?;
    if digest != expected_sha256 {
        return Err(ModelIntegrityError::ChecksumMismatch {
            name,
            path: path.to_path_buf(),
            expected: expected_sha256.to_string(),
            got: digest,
        });
    }

    Ok(())
}

fn is_sha256_hex(s: &str) -> bool {
    s.len() == 64 && s.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Parse sha256sum output into `name -> digest`. Blank lines and `#` comments
/// are skipped; a leading `*` (binary mode marker) on the name is accepted.
pub fn parse_lockfile(path: &Path, contents: &str) -> Result<BTreeMap<String, String>, ModelIntegrityError> {
    let mut digests = BTreeMap::new();
    for (i, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let malformed = || ModelIntegrityError::MalformedLockfile {
            path: path.to_path_buf(),
            line: i + 1,
        };
        let (digest, name) = line.split_once(char::is_whitespace).ok_or_else(malformed)?;
        let name = name.trim_start().trim_start_matches('*');
        if !is_sha256_hex(digest) || name.is_empty() {
            return Err(malformed());
        }
        digests.insert(name.to_string(), digest.to_ascii_lowercase());
    }
    Ok(digests)
}

pub fn read_lockfile(model_dir: &Path) -> Result<BTreeMap<String, String>, ModelIntegrityError> {
    let path = model_dir.join(LOCKFILE);
    if !path.exists() {
        return Err(ModelIntegrityError::MissingLockfile { path });
    }
    let contents = fs::read_to_string(&path).map_err(|source| ModelIntegrityError::Read {
        path: path.clone(),
        source,
    })?;
    parse_lockfile(&path, &contents)
}

/// Hash every model in `model_dir` and record the digests in the lockfile.
///
/// Returns the recorded `(name, digest)` pairs in manifest order.
pub fn write_lockfile(model_dir: &Path) -> Result<Vec<(&'static str, String)>, ModelIntegrityError> {
    let mut entries = Vec::with_capacity(MODELS.len());
    for model in MODELS {
        let path = model_dir.join(model.name);
        if !path.exists() {
            return Err(ModelIntegrityError::MissingModel {
                name: model.name,
                path,
            });
        }
        entries.push((model.name, sha256_file_hex(&path)?));
    }

    let contents: String = entries
        .iter()
        .map(|(name, digest)| format!("{digest}  {name}\n"))
        .collect();
    let path = model_dir.join(LOCKFILE);
    fs::write(&path, contents).map_err(|source| ModelIntegrityError::Write { path, source })?;

    Ok(entries)
}

/// Check every manifest model exists and matches its pinned digest.
pub fn verify_models_dir(model_dir: &Path) -> Result<(), ModelIntegrityError> {
    let lockfile = read_lockfile(model_dir)?;

    for model in MODELS {
        let path = model_dir.join(model.name);
        let expected = lockfile
            .get(model.name)
            .ok_or_else(|| ModelIntegrityError::Unlisted {
                name: model.name,
                lockfile: model_dir.join(LOCKFILE),
            })?;
        verify_file_sha256(model.name, &path, expected)?;
    }

    Ok(())
}
