//! `checkface setup`: puts a verified ArcFace model into the model cache.
//!
//! With `--bundled-dir` the model is copied from a local bundle; otherwise it
//! is downloaded.

use anyhow::{bail, Context, Result};
use checkface_models::{sha256_file_hex, ModelFile, ARCFACE};
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

/// Determine the model directory.
///
/// When running as root (UID 0), defaults to `/var/lib/checkface/models`.
/// Otherwise uses the configured per-user cache directory.
fn default_model_dir(configured: &Path) -> PathBuf {
    if is_root() {
        PathBuf::from("/var/lib/checkface/models")
    } else {
        configured.to_path_buf()
    }
}

fn is_root() -> bool {
    // SAFETY: geteuid is always safe to call.
    unsafe { libc::geteuid() == 0 }
}

/// Download a single model file with progress output.
fn download_model(model: &ModelFile, dest: &Path) -> Result<()> {
    let tmp_path = dest.with_extension("onnx.part");

    println!("  downloading {} ({})...", model.name, model.size_display);

    let resp = ureq::get(model.url)
        .call()
        .with_context(|| format!("failed to download {}", model.url))?;

    let content_length = resp
        .headers()
        .get("Content-Length")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());

    let mut reader = resp.into_body().into_reader();
    let mut file = fs::File::create(&tmp_path)
        .with_context(|| format!("failed to create {}", tmp_path.display()))?;

    let mut buf = [0u8; 65536];
    let mut total: u64 = 0;
    let mut last_pct: u64 = 0;

    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        file.write_all(&buf[..n])?;
        total += n as u64;

        if let Some(len) = content_length.filter(|&len| len > 0) {
            let pct = (total * 100) / len;
            if pct / 10 > last_pct / 10 {
                print!("  {pct}%\r");
                io::stdout().flush().ok();
                last_pct = pct;
            }
        }
    }

    file.flush()?;
    drop(file);

    print!("  verifying checksum... ");
    io::stdout().flush().ok();
    let digest = sha256_file_hex(&tmp_path)?;
    if digest != model.sha256 {
        fs::remove_file(&tmp_path).ok();
        bail!(
            "checksum mismatch for {}:\n  expected: {}\n  got:      {}",
            model.name,
            model.sha256,
            digest
        );
    }
    println!("ok");

    fs::rename(&tmp_path, dest).with_context(|| {
        format!(
            "failed to rename {} -> {}",
            tmp_path.display(),
            dest.display()
        )
    })?;

    Ok(())
}

/// Run the setup command.
pub fn run(model_dir: Option<PathBuf>, bundled_dir: Option<PathBuf>, configured: &Path) -> Result<()> {
    let dir = model_dir.unwrap_or_else(|| default_model_dir(configured));
    println!("Model directory: {}", dir.display());

    if let Some(bundled) = bundled_dir {
        let path = checkface_models::ensure_model_cached(&bundled, &dir)
            .with_context(|| format!("failed to cache model from {}", bundled.display()))?;
        println!("  {} ready (checksum ok)", path.display());
        return Ok(());
    }

    fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create directory {}", dir.display()))?;

    let dest = dir.join(ARCFACE.name);
    if dest.exists() {
        match sha256_file_hex(&dest) {
            Ok(digest) if digest == ARCFACE.sha256 => {
                println!("  {} already present (checksum ok)", ARCFACE.name);
                return Ok(());
            }
            Ok(_) => println!("  {} exists but checksum differs, re-downloading", ARCFACE.name),
            Err(_) => println!("  {} exists but unreadable, re-downloading", ARCFACE.name),
        }
    }

    download_model(&ARCFACE, &dest)?;
    println!();
    println!("Setup complete: {} downloaded.", ARCFACE.name);

    Ok(())
}
