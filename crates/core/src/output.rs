//! Translated files handed to whoever packages or stores them.

use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, trace};

/// One translated subtitle file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TranslatedFile {
    pub language: String,
    pub file_name: String,
    pub content: String,
}

/// Write every file into `dir`, creating the directory if needed.
pub fn write_all(dir: &Path, files: &[TranslatedFile]) -> Result<Vec<PathBuf>> {
    trace!("write_all dir={} files={}", dir.display(), files.len());
    fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    let mut written = Vec::with_capacity(files.len());
    for file in files {
        let path = dir.join(&file.file_name);
        fs::write(&path, &file.content).with_context(|| format!("writing {}", path.display()))?;
        info!("wrote {}", path.display());
        written.push(path);
    }
    Ok(written)
}
