pub mod build;
pub mod inspect;
pub mod qa;
pub mod stats;
pub mod turn;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::Write;
use std::path::Path;

use tame::config::{expand_tilde, EmbeddingConfig};
use tame::embedding::local::{TEXT_MODEL_FILE, TOKENIZER_FILE, VISION_MODEL_FILE};

const MODEL_BASE_URL: &str = "https://huggingface.co/Xenova/clip-vit-base-patch32/resolve/main";

/// Download the CLIP ONNX towers and tokenizer to the cache directory.
pub fn model_download(config: &EmbeddingConfig) -> Result<()> {
    let cache_dir = expand_tilde(&config.cache_dir);
    std::fs::create_dir_all(&cache_dir)
        .with_context(|| format!("failed to create cache dir: {}", cache_dir.display()))?;

    let files = [
        (VISION_MODEL_FILE, format!("{MODEL_BASE_URL}/onnx/{VISION_MODEL_FILE}"), "~350MB"),
        (TEXT_MODEL_FILE, format!("{MODEL_BASE_URL}/onnx/{TEXT_MODEL_FILE}"), "~250MB"),
        (TOKENIZER_FILE, format!("{MODEL_BASE_URL}/{TOKENIZER_FILE}"), "~2MB"),
    ];

    for (name, url, size) in &files {
        let dest = cache_dir.join(name);
        if dest.exists() {
            println!("{name} already exists at {}", dest.display());
            continue;
        }
        println!("Downloading {name} ({size})...");
        download_file(url, &dest)?;
        println!("{name} saved to {}", dest.display());
    }

    println!("Model download complete. Ready for use.");
    Ok(())
}

/// Download a file from a URL with progress bar. Uses atomic write (tmp + rename).
fn download_file(url: &str, dest: &Path) -> Result<()> {
    let mut response = reqwest::blocking::get(url)
        .with_context(|| format!("HTTP request failed for {url}"))?;

    anyhow::ensure!(
        response.status().is_success(),
        "download failed with HTTP {}",
        response.status()
    );

    let pb = match response.content_length() {
        Some(size) => {
            let pb = ProgressBar::new(size);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("  {bar:40.cyan/blue} {bytes}/{total_bytes} ({eta})")
                    .expect("valid template")
                    .progress_chars("##-"),
            );
            pb
        }
        None => ProgressBar::new_spinner(),
    };

    let tmp_path = dest.with_extension("tmp");
    let file = std::fs::File::create(&tmp_path)
        .with_context(|| format!("failed to create temp file: {}", tmp_path.display()))?;
    let mut writer = pb.wrap_write(std::io::BufWriter::new(file));

    response
        .copy_to(&mut writer)
        .context("error writing to file")?;
    writer.flush().context("error writing to file")?;
    drop(writer);

    std::fs::rename(&tmp_path, dest).context("failed to rename temp file")?;

    pb.finish_and_clear();
    Ok(())
}

/// Progress bar over `len` items, in the same style as the download bar.
pub(crate) fn item_progress(len: usize) -> ProgressBar {
    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("  {bar:40.cyan/blue} {pos}/{len} {msg} ({eta})")
            .expect("valid template")
            .progress_chars("##-"),
    );
    pb
}
