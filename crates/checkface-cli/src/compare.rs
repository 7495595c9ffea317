//! `checkface compare`: enroll still images, then match a probe image.

use anyhow::{bail, Context, Result};
use checkface_capture::Config;
use checkface_core::{FaceEmbedder, Gallery};
use std::path::{Path, PathBuf};

/// Parse `NAME=PATH`.
pub fn parse_enrollment(s: &str) -> Result<(String, PathBuf), String> {
    match s.split_once('=') {
        Some((name, path)) if !name.is_empty() && !path.is_empty() => {
            Ok((name.to_string(), PathBuf::from(path)))
        }
        _ => Err(format!("expected NAME=PATH, got {s:?}")),
    }
}

pub fn run(gallery_images: &[(String, PathBuf)], probe: &Path, config: &Config) -> Result<()> {
    if gallery_images.is_empty() {
        bail!("nothing to compare against: pass at least one --enroll NAME=PATH");
    }

    let model_path = config.arcface_model_path();
    let embedder = FaceEmbedder::shared(&model_path)
        .with_context(|| format!("failed to load model {model_path}"))?;

    let mut gallery = Gallery::new();
    for (name, path) in gallery_images {
        let embedding = embedder
            .extract_from_path(path)
            .with_context(|| format!("failed to embed {}", path.display()))?;
        gallery.enroll(name, &embedding);
    }

    let probe_embedding = embedder
        .extract_from_path(probe)
        .with_context(|| format!("failed to embed {}", probe.display()))?;
    let result = gallery.recognize(&probe_embedding, config.similarity_threshold);

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_name_and_path() {
        assert_eq!(
            parse_enrollment("alice=/tmp/a.jpg"),
            Ok(("alice".to_string(), PathBuf::from("/tmp/a.jpg")))
        );
        assert!(parse_enrollment("alice").is_err());
        assert!(parse_enrollment("=/tmp/a.jpg").is_err());
    }
}
