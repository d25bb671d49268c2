use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{ReelError, Result};
use crate::search::MediaSearcher;
use crate::timing::{speaker_segment_end, WordTiming};

use super::{locate_keyword_from, validate_media, ImageOverlay, MediaKind, VisualCue, VisualsConfig};

/// Shortest time an overlay stays on screen, in seconds.
pub const MIN_ON_SCREEN: f64 = 0.5;

/// Candidates requested from the searcher for each cue.
const CANDIDATES_PER_CUE: usize = 5;

/// Anchors visual cues to the narration and downloads media for them.
pub struct VisualFetcher {
    config: VisualsConfig,
    image_searcher: Option<Arc<dyn MediaSearcher>>,
    animated_searcher: Option<Arc<dyn MediaSearcher>>,
}

impl VisualFetcher {
    pub fn new(config: VisualsConfig) -> Self {
        Self {
            config,
            image_searcher: None,
            animated_searcher: None,
        }
    }

    pub fn with_image_searcher(mut self, searcher: Arc<dyn MediaSearcher>) -> Self {
        self.image_searcher = Some(searcher);
        self
    }

    pub fn with_animated_searcher(mut self, searcher: Arc<dyn MediaSearcher>) -> Self {
        self.animated_searcher = Some(searcher);
        self
    }

    pub fn config(&self) -> &VisualsConfig {
        &self.config
    }

    /// Whether any searcher is configured.
    pub fn has_searchers(&self) -> bool {
        self.image_searcher.is_some() || self.animated_searcher.is_some()
    }

    /// The searcher for `kind` and the media kind its results are checked as.
    ///
    /// Animated cues use the animated searcher when there is one and fall
    /// back to still images otherwise. Still cues never go to the animated
    /// backend.
    fn searcher_for(&self, kind: MediaKind) -> Option<(&Arc<dyn MediaSearcher>, MediaKind)> {
        match (kind, &self.animated_searcher) {
            (MediaKind::Animated, Some(searcher)) => Some((searcher, MediaKind::Animated)),
            _ => self.image_searcher.as_ref().map(|s| (s, MediaKind::Image)),
        }
    }

    /// Place one overlay per cue whose keyword is spoken and whose media
    /// could be fetched.
    ///
    /// Cues are handled in order. Each search resumes after the previous
    /// anchor so a repeated keyword lands on its next occurrence. Cues that
    /// miss or whose candidates all fail are skipped; cancellation aborts.
    /// The result is sorted and passed through [`enforce_constraints`].
    pub async fn fetch(
        &self,
        cues: &[VisualCue],
        timings: &[WordTiming],
        dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<Vec<ImageOverlay>> {
        if !self.has_searchers() {
            debug!("No media searchers configured, skipping {} cues", cues.len());
            return Ok(Vec::new());
        }

        let mut overlays = Vec::new();
        let mut start_from = 0;

        for (index, cue) in cues.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(ReelError::Cancelled);
            }

            let Some(anchor) = locate_keyword_from(timings, &cue.keyword, start_from) else {
                warn!("{}", ReelError::KeywordMiss(cue.keyword.clone()));
                continue;
            };
            start_from = anchor + 1;

            let Some((searcher, kind)) = self.searcher_for(cue.media_type) else {
                debug!("No {} searcher for '{}'", cue.media_type, cue.keyword);
                continue;
            };

            let path = match self
                .fetch_media(searcher.as_ref(), cue, kind, index, dir, cancel)
                .await
            {
                Ok(Some(path)) => path,
                Ok(None) => {
                    warn!(
                        "No usable {} for '{}' (query '{}')",
                        kind, cue.keyword, cue.search_query
                    );
                    continue;
                }
                Err(ReelError::Cancelled) => return Err(ReelError::Cancelled),
                Err(e) => {
                    warn!("Search for '{}' failed: {}", cue.search_query, e);
                    continue;
                }
            };

            let (start, end) = display_window(timings, anchor, self.config.max_display_time);
            debug!(
                "Overlay '{}' at word {} ({:.2}s - {:.2}s)",
                cue.keyword, anchor, start, end
            );

            overlays.push(ImageOverlay {
                path,
                start,
                end,
                width: self.config.image_width,
                height: self.config.image_height,
                animated: kind == MediaKind::Animated,
            });
        }

        enforce_constraints(&mut overlays, self.config.min_gap);
        info!("Placed {} of {} visual cues", overlays.len(), cues.len());

        Ok(overlays)
    }

    /// Search for a cue and save the first candidate that validates.
    ///
    /// Per-candidate failures are logged and skipped. `Ok(None)` means every
    /// candidate was rejected.
    async fn fetch_media(
        &self,
        searcher: &dyn MediaSearcher,
        cue: &VisualCue,
        kind: MediaKind,
        index: usize,
        dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<Option<PathBuf>> {
        let results = cancellable(cancel, searcher.search(&cue.search_query, CANDIDATES_PER_CUE)).await?;
        debug!(
            "{} returned {} candidates for '{}'",
            searcher.name(),
            results.len(),
            cue.search_query
        );

        for result in results {
            let bytes = match cancellable(cancel, searcher.download(&result.url)).await {
                Ok(bytes) => bytes,
                Err(ReelError::Cancelled) => return Err(ReelError::Cancelled),
                Err(e) => {
                    debug!("Download of {} failed: {}", result.url, e);
                    continue;
                }
            };

            let ext = match validate_media(&bytes, kind) {
                Ok(ext) => ext,
                Err(e) => {
                    debug!("Rejected {}: {}", result.url, e);
                    continue;
                }
            };

            let path = dir.join(format!("image_{index}{ext}"));
            if let Err(e) = tokio::fs::write(&path, &bytes).await {
                debug!("Could not save {:?}: {}", path, e);
                continue;
            }
            return Ok(Some(path));
        }

        Ok(None)
    }
}

async fn cancellable<T, F>(cancel: &CancellationToken, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ReelError::Cancelled),
        result = fut => result,
    }
}

/// On-screen window for an overlay anchored at `timings[anchor]`.
///
/// Runs from the anchor word to the end of its speaker turn, capped at
/// `max_display_time` when that is positive, and never shorter than
/// [`MIN_ON_SCREEN`] when the turn would give it no time at all.
pub fn display_window(timings: &[WordTiming], anchor: usize, max_display_time: f64) -> (f64, f64) {
    let start = timings.get(anchor).map(|t| t.start).unwrap_or(0.0);
    let mut end = speaker_segment_end(timings, anchor);

    if max_display_time > 0.0 && end - start > max_display_time {
        end = start + max_display_time;
    }
    if end <= start {
        end = start + MIN_ON_SCREEN;
    }

    (start, end)
}

/// Sort overlays by start time and truncate any that crowd the next one.
///
/// An overlay ending less than `min_gap` before its successor starts is cut
/// back to `next.start - min_gap`, but never below [`MIN_ON_SCREEN`] after
/// its own start. Overlays are never dropped.
pub fn enforce_constraints(overlays: &mut Vec<ImageOverlay>, min_gap: f64) {
    if overlays.len() <= 1 {
        return;
    }

    overlays.sort_by(|a, b| a.start.total_cmp(&b.start));

    for i in 0..overlays.len() - 1 {
        let next_start = overlays[i + 1].start;
        let prev = &mut overlays[i];
        if next_start < prev.end + min_gap {
            let new_end = (next_start - min_gap).max(prev.start + MIN_ON_SCREEN);
            debug!(
                "Truncating overlay {:?}: {:.2}s -> {:.2}s",
                prev.path, prev.end, new_end
            );
            prev.end = new_end;
        }
    }
}
