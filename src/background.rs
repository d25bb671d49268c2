use std::path::{Path, PathBuf};

use async_trait::async_trait;
use rand::seq::SliceRandom;
use tracing::debug;

use crate::error::{ReelError, Result};

const CLIP_EXTENSIONS: &[&str] = &["mp4", "mov", "mkv"];

/// Source of background footage.
#[async_trait]
pub trait ClipProvider: Send + Sync {
    async fn pick_random_clip(&self) -> Result<PathBuf>;
}

/// Picks clips from a local directory.
#[derive(Debug, Clone)]
pub struct LocalClipProvider {
    dir: PathBuf,
}

impl LocalClipProvider {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Video files directly inside the directory, sorted by name.
    pub fn list_clips(&self) -> Result<Vec<PathBuf>> {
        let entries = std::fs::read_dir(&self.dir).map_err(|e| {
            ReelError::InvalidInput(format!(
                "cannot read clip directory {}: {e}",
                self.dir.display()
            ))
        })?;

        let mut clips: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && is_clip(path))
            .collect();
        clips.sort();
        Ok(clips)
    }
}

fn is_clip(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| CLIP_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

#[async_trait]
impl ClipProvider for LocalClipProvider {
    async fn pick_random_clip(&self) -> Result<PathBuf> {
        let clips = self.list_clips()?;
        let clip = clips.choose(&mut rand::thread_rng()).cloned().ok_or_else(|| {
            ReelError::InvalidInput(format!(
                "no background clips (.mp4/.mov/.mkv) in {}",
                self.dir.display()
            ))
        })?;

        debug!("Picked background clip {:?} of {}", clip, clips.len());
        Ok(clip)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_picks_only_video_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.mp4"), b"x").unwrap();
        std::fs::write(dir.path().join("b.MOV"), b"x").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"x").unwrap();
        std::fs::create_dir(dir.path().join("sub.mkv")).unwrap();

        let provider = LocalClipProvider::new(dir.path());
        let clips = provider.list_clips().unwrap();
        assert_eq!(clips.len(), 2);

        for _ in 0..10 {
            let clip = provider.pick_random_clip().await.unwrap();
            assert!(clips.contains(&clip));
        }
    }

    #[tokio::test]
    async fn test_empty_directory() {
        let dir = tempfile::tempdir().unwrap();
        let provider = LocalClipProvider::new(dir.path());
        assert!(matches!(
            provider.pick_random_clip().await,
            Err(ReelError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_directory() {
        let provider = LocalClipProvider::new("/definitely/not/a/dir");
        assert!(provider.pick_random_clip().await.is_err());
    }
}
