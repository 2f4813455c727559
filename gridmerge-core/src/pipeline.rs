//! Grid Compositor Service - Single Entry Point
//!
//! Planning -> Fetching -> Compositing -> Encoding -> Done, or Failed from
//! any of them. Fetching is the only concurrent stage. The working area is
//! released only after every fetch task has settled.

use std::sync::Arc;

use image::DynamicImage;
use serde::{Deserialize, Serialize};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use uuid::Uuid;

use crate::compositor::Compositor;
use crate::config::MergeConfig;
use crate::error::MergeError;
use crate::fetch::{CancelFlag, FetchError, HttpSource, ImageFetcher, ImageSource};
use crate::layout::{plan, Layout};
use crate::request::GridSpec;
use crate::resources::{ResourceManager, WorkingArea};
use crate::validation::Validator;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeState {
    Planning,
    Fetching,
    Compositing,
    Encoding,
    Done,
    Failed,
}

impl MergeState {
    pub fn is_terminal(self) -> bool {
        matches!(self, MergeState::Done | MergeState::Failed)
    }

    pub fn can_advance_to(self, next: MergeState) -> bool {
        use MergeState::*;
        match (self, next) {
            (Planning, Fetching)
            | (Fetching, Compositing)
            | (Compositing, Encoding)
            | (Encoding, Done) => true,
            (from, Failed) => !from.is_terminal(),
            _ => false,
        }
    }
}

/// Tracks and logs one call's progress through `MergeState`
struct MergeRun {
    id: Uuid,
    state: MergeState,
}

impl MergeRun {
    fn start() -> Self {
        let run = Self { id: Uuid::new_v4(), state: MergeState::Planning };
        log::debug!("merge {}: {:?}", run.id, run.state);
        run
    }

    fn advance(&mut self, next: MergeState) {
        debug_assert!(
            self.state.can_advance_to(next),
            "illegal transition {:?} -> {:?}",
            self.state,
            next
        );
        log::debug!("merge {}: {:?} -> {:?}", self.id, self.state, next);
        self.state = next;
    }
}

/// Encoded result of a successful merge
#[derive(Debug, Clone)]
pub struct MergedImage {
    pub png: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub layout: Layout,
}

/// The compositor service - single entry point for merging
pub struct GridCompositorService<S = HttpSource> {
    fetcher: Arc<ImageFetcher<S>>,
    resources: ResourceManager,
    validator: Validator,
    config: MergeConfig,
}

impl GridCompositorService<HttpSource> {
    pub fn new(config: MergeConfig) -> Result<Self, FetchError> {
        let source = HttpSource::new(&config)?;
        Ok(Self::with_source(source, config))
    }
}

impl<S: ImageSource> GridCompositorService<S> {
    pub fn with_source(source: S, config: MergeConfig) -> Self {
        Self {
            fetcher: Arc::new(ImageFetcher::new(source)),
            resources: ResourceManager::new(),
            validator: Validator::new(),
            config,
        }
    }

    pub fn config(&self) -> &MergeConfig {
        &self.config
    }

    pub fn resources(&self) -> &ResourceManager {
        &self.resources
    }

    /// Tile `spec.images` into one `spec.width` x `spec.height` PNG.
    ///
    /// Either every image lands in its cell or the call fails with the
    /// first fetch/decode error observed. No partial canvas is returned.
    pub async fn merge_images(&self, spec: &GridSpec) -> Result<MergedImage, MergeError> {
        let mut run = MergeRun::start();
        let result = self.execute(spec, &mut run).await;
        match &result {
            Ok(merged) => {
                run.advance(MergeState::Done);
                log::info!(
                    "merged {} image(s) into {}x{} png ({} bytes)",
                    spec.image_count(),
                    merged.width,
                    merged.height,
                    merged.png.len()
                );
            }
            Err(err) => {
                run.advance(MergeState::Failed);
                log::warn!("merge {} failed: {}", run.id, err);
            }
        }
        result
    }

    async fn execute(&self, spec: &GridSpec, run: &mut MergeRun) -> Result<MergedImage, MergeError> {
        // Planning: nothing below here runs for invalid input
        let validation = self.validator.validate(spec);
        for warning in validation.warnings() {
            log::warn!("{}: {}", warning.rule, warning.message);
        }
        if !validation.valid {
            return Err(MergeError::InvalidParameters(validation.error_summary()));
        }
        let layout = plan(spec.image_count(), spec.width, spec.height)?;
        let mut compositor = Compositor::new(
            spec.width,
            spec.height,
            self.config.resize_filter.into(),
            self.config.max_canvas_pixels,
        )?;
        log::debug!(
            "merge {}: {}x{} grid, {}x{} px cells",
            run.id,
            layout.cols,
            layout.rows,
            layout.cell_width,
            layout.cell_height
        );

        run.advance(MergeState::Fetching);
        let bitmaps = {
            let area = self.resources.acquire_working_area();
            self.fetch_all(spec, area.area()).await
        }?;

        run.advance(MergeState::Compositing);
        let compositor = tokio::task::spawn_blocking(move || {
            for (index, bitmap) in bitmaps.iter().enumerate() {
                compositor.draw(bitmap, layout.cell(index))?;
            }
            Ok::<_, MergeError>(compositor)
        })
        .await
        .map_err(|e| MergeError::CompositeFailure(format!("compositing task aborted: {}", e)))??;

        run.advance(MergeState::Encoding);
        let png = tokio::task::spawn_blocking(move || compositor.encode())
            .await
            .map_err(|e| MergeError::CompositeFailure(format!("encoding task aborted: {}", e)))??;

        Ok(MergedImage {
            png,
            width: spec.width,
            height: spec.height,
            layout,
        })
    }

    /// Fetch and decode every image concurrently, fail-fast.
    ///
    /// Always joins every task before returning, so the caller may release
    /// `area` as soon as this resolves.
    async fn fetch_all(
        &self,
        spec: &GridSpec,
        area: &WorkingArea,
    ) -> Result<Vec<DynamicImage>, MergeError> {
        let cancel = CancelFlag::new();
        let permits = Arc::new(Semaphore::new(permit_count(self.config.max_concurrency)));
        let mut tasks = JoinSet::new();

        for (index, uri) in spec.images.iter().enumerate() {
            let fetcher = Arc::clone(&self.fetcher);
            let permits = Arc::clone(&permits);
            let area = area.clone();
            let cancel = cancel.clone();
            let uri = uri.clone();

            tasks.spawn(async move {
                let _permit = match acquire_permit(permits, index).await {
                    Ok(permit) => permit,
                    Err(err) => {
                        cancel.cancel();
                        return (index, Err(err));
                    }
                };
                if cancel.is_cancelled() {
                    return (index, Ok(None));
                }
                let result = match area.acquire_slot(index) {
                    Ok(slot) => fetcher.fetch_and_decode(index, &uri, slot, &cancel).await,
                    Err(e) => Err(e.into()),
                };
                if result.is_err() {
                    cancel.cancel();
                }
                (index, result)
            });
        }

        let mut bitmaps: Vec<Option<DynamicImage>> = spec.images.iter().map(|_| None).collect();
        let mut failure: Option<MergeError> = None;

        while let Some(joined) = tasks.join_next().await {
            let outcome = joined.map_err(|e| {
                cancel.cancel();
                MergeError::CompositeFailure(format!("fetch task aborted: {}", e))
            });
            match outcome {
                Ok((index, Ok(Some(bitmap)))) => bitmaps[index] = Some(bitmap),
                Ok((_, Ok(None))) => {}
                Ok((_, Err(err))) | Err(err) => {
                    if failure.is_none() {
                        log::warn!("first failure, cancelling remaining fetches: {}", err);
                        failure = Some(err);
                    } else {
                        log::debug!("discarding later failure: {}", err);
                    }
                }
            }
        }

        if let Some(err) = failure {
            return Err(err);
        }
        bitmaps
            .into_iter()
            .enumerate()
            .map(|(index, bitmap)| {
                bitmap.ok_or_else(|| {
                    MergeError::CompositeFailure(format!("image {} produced no bitmap", index))
                })
            })
            .collect()
    }
}

/// Task-group width: at least one, never above what tokio's semaphore accepts
fn permit_count(max_concurrency: usize) -> usize {
    max_concurrency.clamp(1, Semaphore::MAX_PERMITS)
}

async fn acquire_permit(
    permits: Arc<Semaphore>,
    index: usize,
) -> Result<OwnedSemaphorePermit, MergeError> {
    permits.acquire_owned().await.map_err(|e| {
        MergeError::CompositeFailure(format!("no fetch permit for image {}: {}", index, e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permit_count_clamped() {
        assert_eq!(permit_count(0), 1);
        assert_eq!(permit_count(8), 8);
        assert_eq!(permit_count(usize::MAX), Semaphore::MAX_PERMITS);
        // Must not panic at the upper bound
        let _ = Semaphore::new(permit_count(usize::MAX));
    }

    #[tokio::test]
    async fn test_closed_semaphore_names_image() {
        let permits = Arc::new(Semaphore::new(1));
        permits.close();
        let err = acquire_permit(permits, 5).await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::CompositeFailure);
        assert!(err.to_string().contains("image 5"));
    }

    #[test]
    fn test_happy_path_transitions() {
        use MergeState::*;
        let path = [Planning, Fetching, Compositing, Encoding, Done];
        for pair in path.windows(2) {
            assert!(pair[0].can_advance_to(pair[1]), "{:?} -> {:?}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_failed_reachable_from_non_terminal() {
        use MergeState::*;
        for state in [Planning, Fetching, Compositing, Encoding] {
            assert!(state.can_advance_to(Failed));
        }
        assert!(!Done.can_advance_to(Failed));
        assert!(!Failed.can_advance_to(Failed));
    }

    #[test]
    fn test_no_skipping_stages() {
        use MergeState::*;
        assert!(!Planning.can_advance_to(Compositing));
        assert!(!Fetching.can_advance_to(Encoding));
        assert!(!Compositing.can_advance_to(Done));
        assert!(!Done.can_advance_to(Planning));
    }
}
