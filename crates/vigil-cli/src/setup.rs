//! `vigil setup`: installs the ONNX models and pins their checksums.

use anyhow::{Context, Result};
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use vigil_models::{ModelFile, EMBEDDING_MODEL, LANDMARK_MODEL, LOCKFILE, MODELS};

fn is_url(source: &str) -> bool {
    source.starts_with("https://") || source.starts_with("http://")
}

/// Download a single model file with progress output.
fn download(url: &str, tmp_path: &Path) -> Result<()> {
    let resp = ureq::get(url)
        .call()
        .with_context(|| format!("failed to download {url}"))?;

    let content_length = resp
        .headers()
        .get("Content-Length")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());

    let mut reader = resp.into_body().into_reader();
    let mut file = fs::File::create(tmp_path)
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

        // Print progress every 10%
        if let Some(len) = content_length.filter(|len| *len > 0) {
            let pct = (total * 100) / len;
            if pct / 10 > last_pct / 10 {
                print!("  {pct}%\r");
                io::stdout().flush().ok();
                last_pct = pct;
            }
        }
    }

    file.flush()?;
    Ok(())
}

/// Fetch `source` (URL or local path) into `dest` via a `.part` file and an atomic rename.
fn install_model(model: &ModelFile, source: &str, dest: &Path) -> Result<()> {
    let tmp_path = dest.with_extension("onnx.part");

    if is_url(source) {
        println!("  downloading {} ({})...", model.name, model.role);
        download(source, &tmp_path)?;
    } else {
        println!("  copying {} ({}) from {source}...", model.name, model.role);
        fs::copy(source, &tmp_path)
            .with_context(|| format!("failed to copy {source} -> {}", tmp_path.display()))?;
    }

    fs::rename(&tmp_path, dest).with_context(|| {
        format!(
            "failed to rename {} -> {}",
            tmp_path.display(),
            dest.display()
        )
    })?;

    Ok(())
}

/// Run the setup command: install both models and write the checksum lockfile.
pub fn run(landmark: &str, embedding: &str, model_dir: Option<PathBuf>) -> Result<()> {
    let dir = model_dir.unwrap_or_else(vigil_models::default_model_dir);

    println!("Model directory: {}", dir.display());

    fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create directory {}", dir.display()))?;

    for model in MODELS {
        let source = match model.name {
            LANDMARK_MODEL => landmark,
            EMBEDDING_MODEL => embedding,
            other => anyhow::bail!("no source given for model {other}"),
        };
        install_model(model, source, &dir.join(model.name))?;
    }

    let entries = vigil_models::write_lockfile(&dir)?;
    println!();
    for (name, digest) in &entries {
        println!("  {digest}  {name}");
    }
    println!(
        "Setup complete: {} model(s) installed, checksums pinned in {}.",
        entries.len(),
        dir.join(LOCKFILE).display()
    );

    Ok(())
}

/// Run the verify-models command.
pub fn verify(model_dir: Option<PathBuf>) -> Result<()> {
    let dir = model_dir.unwrap_or_else(vigil_models::default_model_dir);
    vigil_models::verify_models_dir(&dir)?;
    println!("All models in {} match {LOCKFILE}.", dir.display());
    Ok(())
}
