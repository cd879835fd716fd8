use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use tokio::fs;

use crate::metadata::AssetMetadata;

const AUDIO_EXTENSION: &str = "mp3";

static RE_FORBIDDEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[<>:"/\\|?*]"#).expect("forbidden chars pattern"));
static RE_WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace pattern"));

/// Drops characters that are not allowed in file names on common
/// filesystems and squashes runs of whitespace.
pub fn sanitize_filename(name: &str) -> String {
    let stripped = RE_FORBIDDEN.replace_all(name, "");
    RE_WHITESPACE.replace_all(&stripped, " ").trim().to_string()
}

/// `Artist - Title.mp3`, sanitised.
pub fn track_filename(meta: &AssetMetadata) -> String {
    sanitize_filename(&format!(
        "{} - {}.{}",
        meta.artist(),
        meta.title(),
        AUDIO_EXTENSION
    ))
}

pub fn output_path(out_dir: &Path, meta: &AssetMetadata) -> PathBuf {
    out_dir.join(track_filename(meta))
}

pub async fn ensure_directory(path: &Path) -> std::io::Result<()> {
    if !path.exists() {
        fs::create_dir_all(path).await?;
    }
    Ok(())
}
