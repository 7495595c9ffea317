use sha2::{Digest, Sha256};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Model file descriptor: URL, expected filename, SHA-256 checksum, human-readable size.
#[derive(Debug)]
pub struct ModelFile {
    pub name: &'static str,
    pub url: &'static str,
    pub sha256: &'static str,
    pub size_display: &'static str,
}

/// ArcFace recognition model (buffalo_l pack). Checksum taken from the
/// HuggingFace Git LFS pointer (`oid sha256:` field).
pub const ARCFACE: ModelFile = ModelFile {
    name: "w600k_r50.onnx",
    url: "https://huggingface.co/public-data/insightface/resolve/main/models/buffalo_l/w600k_r50.onnx",
    sha256: "4c06341c33c2ca1f86781dab0e829f88ad5b64be9fba56e56bc9ebdefc619e43",
    size_display: "166 MB",
};

#[derive(Error, Debug)]
pub enum ModelIntegrityError {
    #[error("model file not found: {name} ({path})")]
    MissingModel { name: &'static str, path: PathBuf },

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

    #[error("failed to copy model into cache: {path}: {source}")]
    Copy {
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

/// Resolve the ArcFace model to a verified file in `cache_dir`, copying it
/// from `bundled_dir` when the cache is empty or stale.
pub fn ensure_model_cached(bundled_dir: &Path, cache_dir: &Path) -> Result<PathBuf, ModelIntegrityError> {
    ensure_cached(&ARCFACE, bundled_dir, cache_dir)
}

/// Idempotent: a cached file with the right checksum is returned untouched.
/// Otherwise the bundled copy is written to `<name>.part`, renamed into place
/// and verified.
pub fn ensure_cached(
    model: &ModelFile,
    bundled_dir: &Path,
    cache_dir: &Path,
) -> Result<PathBuf, ModelIntegrityError> {
    let cached = cache_dir.join(model.name);
    match verify_file_sha256(model.name, &cached, model.sha256) {
        Ok(()) => {
            tracing::debug!(path = %cached.display(), "model cache hit");
            return Ok(cached);
        }
        Err(ModelIntegrityError::MissingModel { .. }) => {}
        Err(e) => tracing::warn!(error = %e, "cached model invalid, replacing"),
    }

    let bundled = bundled_dir.join(model.name);
    if !bundled.exists() {
        return Err(ModelIntegrityError::MissingModel {
            name: model.name,
            path: bundled,
        });
    }

    let copy_err = |source: std::io::Error| ModelIntegrityError::Copy {
        path: cached.clone(),
        source,
    };
    fs::create_dir_all(cache_dir).map_err(copy_err)?;
    let part = cache_dir.join(format!("{}.part", model.name));
    fs::copy(&bundled, &part).map_err(copy_err)?;
    fs::rename(&part, &cached).map_err(copy_err)?;

    if let Err(e) = verify_file_sha256(model.name, &cached, model.sha256) {
        let _ = fs::remove_file(&cached);
        return Err(e);
    }

    tracing::info!(
        name = model.name,
        from = %bundled.display(),
        to = %cached.display(),
        "model copied into cache"
    );
    Ok(cached)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HELLO_SHA256: &str = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";

    const HELLO_MODEL: ModelFile = ModelFile {
        name: "hello.onnx",
        url: "",
        sha256: HELLO_SHA256,
        size_display: "5 B",
    };

    fn temp_dir(label: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "checkface-models-test-{label}-{}",
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ))
    }

    #[test]
    fn verify_file_sha256_rejects_missing() {
        let path = temp_dir("missing").join("nope.onnx");

        let err = verify_file_sha256("nope.onnx", &path, "00").unwrap_err();
        assert!(matches!(err, ModelIntegrityError::MissingModel { .. }));
    }

    #[test]
    fn verify_file_sha256_rejects_mismatch() {
        let dir = temp_dir("mismatch");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("model.onnx");
        fs::write(&path, b"hello").unwrap();

        let err = verify_file_sha256("model.onnx", &path, "00").unwrap_err();
        assert!(matches!(err, ModelIntegrityError::ChecksumMismatch { .. }));

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn sha256_matches_known_digest() {
        let dir = temp_dir("digest");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("model.onnx");
        fs::write(&path, b"hello").unwrap();

        assert_eq!(sha256_file_hex(&path).unwrap(), HELLO_SHA256);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn ensure_cached_copies_then_reuses() {
        let bundled = temp_dir("bundled");
        let cache = temp_dir("cache");
        fs::create_dir_all(&bundled).unwrap();
        fs::write(bundled.join("hello.onnx"), b"hello").unwrap();

        let path = ensure_cached(&HELLO_MODEL, &bundled, &cache).unwrap();
        assert_eq!(path, cache.join("hello.onnx"));
        assert_eq!(fs::read(&path).unwrap(), b"hello");
        assert!(!cache.join("hello.onnx.part").exists());

        // Second call hits the cache even with the bundle gone.
        fs::remove_dir_all(&bundled).unwrap();
        let again = ensure_cached(&HELLO_MODEL, &bundled, &cache).unwrap();
        assert_eq!(again, path);

        let _ = fs::remove_dir_all(&cache);
    }

    #[test]
    fn ensure_cached_replaces_corrupt_cache() {
        let bundled = temp_dir("bundled-corrupt");
        let cache = temp_dir("cache-corrupt");
        fs::create_dir_all(&bundled).unwrap();
        fs::create_dir_all(&cache).unwrap();
        fs::write(bundled.join("hello.onnx"), b"hello").unwrap();
        fs::write(cache.join("hello.onnx"), b"truncated").unwrap();

        let path = ensure_cached(&HELLO_MODEL, &bundled, &cache).unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"hello");

        let _ = fs::remove_dir_all(&bundled);
        let _ = fs::remove_dir_all(&cache);
    }

    #[test]
    fn ensure_cached_rejects_bad_bundle() {
        let bundled = temp_dir("bundled-bad");
        let cache = temp_dir("cache-bad");
        fs::create_dir_all(&bundled).unwrap();
        fs::write(bundled.join("hello.onnx"), b"not hello").unwrap();

        let err = ensure_cached(&HELLO_MODEL, &bundled, &cache).unwrap_err();
        assert!(matches!(err, ModelIntegrityError::ChecksumMismatch { .. }));
        assert!(!cache.join("hello.onnx").exists());

        let _ = fs::remove_dir_all(&bundled);
        let _ = fs::remove_dir_all(&cache);
    }

    #[test]
    fn ensure_cached_reports_missing_bundle() {
        let err = ensure_cached(&HELLO_MODEL, &temp_dir("no-bundle"), &temp_dir("no-cache"))
            .unwrap_err();
        assert!(matches!(err, ModelIntegrityError::MissingModel { .. }));
    }
}
