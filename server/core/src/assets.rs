//! Frame Assets
//!
//! Ten parrot frames are compiled into the binary. A directory of `*.txt`
//! files can replace them at startup; files are taken in lexical order of
//! their names, without recursing into subdirectories.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::catalog::{CatalogError, Frame, FrameCatalog};

const BUILTIN_FRAMES: [&str; 10] = [
    include_str!("../assets/frames/frame-00.txt"),
    include_str!("../assets/frames/frame-01.txt"),
    include_str!("../assets/frames/frame-02.txt"),
    include_str!("../assets/frames/frame-03.txt"),
    include_str!("../assets/frames/frame-04.txt"),
    include_str!("../assets/frames/frame-05.txt"),
    include_str!("../assets/frames/frame-06.txt"),
    include_str!("../assets/frames/frame-07.txt"),
    include_str!("../assets/frames/frame-08.txt"),
    include_str!("../assets/frames/frame-09.txt"),
];

/// Errors raised while loading frames from disk
#[derive(Debug, Error)]
pub enum AssetError {
    /// The frames directory could not be listed
    #[error("failed to read frames directory {path}: {source}")]
    ReadDir {
        /// Directory
        path: PathBuf,
        /// Cause
        #[source]
        source: std::io::Error,
    },

    /// A frame file could not be read
    #[error("failed to read frame {path}: {source}")]
    ReadFrame {
        /// File
        path: PathBuf,
        /// Cause
        #[source]
        source: std::io::Error,
    },

    /// The directory holds no usable frames
    #[error("no .txt frames found in {0}")]
    NoFrames(PathBuf),

    /// The frames did not form a valid catalog
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

/// The frames compiled into the binary
#[must_use]
pub fn builtin_frames() -> Vec<Frame> {
    BUILTIN_FRAMES.iter().map(|text| Frame::from(*text)).collect()
}

/// Catalog of the bundled frames
///
/// # Errors
///
/// Only fails if the bundled set is empty, which the build prevents.
pub fn builtin_catalog() -> Result<FrameCatalog, CatalogError> {
    FrameCatalog::new(builtin_frames())
}

/// Read every `*.txt` file directly inside `dir`, ordered by file name
///
/// Frame text is kept exactly as stored. Empty files are skipped.
///
/// # Errors
///
/// Returns an [`AssetError`] if the directory or a file cannot be read, or
/// if no frames remain.
pub async fn load_frames_from_dir(dir: &Path) -> Result<Vec<Frame>, AssetError> {
    let read_dir_err = |source| AssetError::ReadDir {
        path: dir.to_path_buf(),
        source,
    };

    let mut entries = tokio::fs::read_dir(dir).await.map_err(read_dir_err)?;
    let mut paths = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(read_dir_err)? {
        let path = entry.path();
        let is_file = entry
            .file_type()
            .await
            .map(|t| t.is_file())
            .unwrap_or(false);
        if is_file && path.extension().and_then(|e| e.to_str()) == Some("txt") {
            paths.push(path);
        }
    }
    paths.sort();

    let mut frames = Vec::with_capacity(paths.len());
    for path in paths {
        let text = tokio::fs::read_to_string(&path)
            .await
            .map_err(|source| AssetError::ReadFrame {
                path: path.clone(),
                source,
            })?;
        if text.trim().is_empty() {
            warn!(path = %path.display(), "Skipping empty frame file");
            continue;
        }
        debug!(path = %path.display(), "Loaded frame");
        frames.push(Frame::from(text));
    }

    if frames.is_empty() {
        return Err(AssetError::NoFrames(dir.to_path_buf()));
    }
    Ok(frames)
}

/// Build the frame catalog, from `dir` if given, otherwise the bundled set
///
/// # Errors
///
/// See [`load_frames_from_dir`].
pub async fn load_catalog(dir: Option<&Path>) -> Result<FrameCatalog, AssetError> {
    let catalog = match dir {
        Some(dir) => {
            let frames = load_frames_from_dir(dir).await?;
            info!(dir = %dir.display(), frames = frames.len(), "Loaded frames from disk");
            FrameCatalog::new(frames)?
        }
        None => builtin_catalog()?,
    };
    Ok(catalog)
}
