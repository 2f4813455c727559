//! Image Fetcher
//!
//! Retrieves one image, parks its bytes in a temp slot, decodes it.
//! No retries here; retry policy belongs to whoever calls the service.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use image::DynamicImage;
use thiserror::Error;

use crate::config::MergeConfig;
use crate::error::MergeError;
use crate::resources::TempSlot;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Failed to fetch image: status {0}")]
    Status(u16),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Where image bytes come from
pub trait ImageSource: Send + Sync + 'static {
    fn fetch(&self, uri: &str) -> impl Future<Output = Result<Vec<u8>, FetchError>> + Send;
}

/// Production source: plain HTTP(S) GET
#[derive(Debug, Clone)]
pub struct HttpSource {
    client: reqwest::Client,
}

impl HttpSource {
    pub fn new(config: &MergeConfig) -> Result<Self, FetchError> {
        let mut builder = reqwest::Client::builder().user_agent(config.user_agent.clone());
        if let Some(secs) = config.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        Ok(Self { client: builder.build()? })
    }

    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl ImageSource for HttpSource {
    fn fetch(&self, uri: &str) -> impl Future<Output = Result<Vec<u8>, FetchError>> + Send {
        let request = self.client.get(uri);
        async move {
            let response = request.send().await?;
            let status = response.status();
            if !status.is_success() {
                return Err(FetchError::Status(status.as_u16()));
            }
            Ok(response.bytes().await?.to_vec())
        }
    }
}

/// Shared fail-fast flag for one merge's task group
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct ImageFetcher<S> {
    source: S,
}

impl<S: ImageSource> ImageFetcher<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }

    /// Fetch `uri`, write it to `slot`, decode it.
    ///
    /// The slot is consumed and released before this returns, whatever the
    /// outcome. `Ok(None)` means a sibling failed first and decoding was skipped.
    pub async fn fetch_and_decode(
        &self,
        index: usize,
        uri: &str,
        mut slot: TempSlot,
        cancel: &CancelFlag,
    ) -> Result<Option<DynamicImage>, MergeError> {
        log::debug!("fetching image {} from {}", index, uri);
        let bytes = self
            .source
            .fetch(uri)
            .await
            .map_err(|cause| MergeError::FetchFailure {
                index,
                uri: uri.to_string(),
                cause,
            })?;

        slot.write(bytes)?;
        if cancel.is_cancelled() {
            log::debug!("skipping decode of image {}, merge already failed", index);
            return Ok(None);
        }

        let data = slot.read()?;
        let decoded = tokio::task::spawn_blocking(move || image::load_from_memory(&data))
            .await
            .map_err(|e| {
                MergeError::CompositeFailure(format!("decode task for image {} aborted: {}", index, e))
            })?;
        slot.release();

        let bitmap = decoded.map_err(|cause| MergeError::DecodeFailure {
            index,
            uri: uri.to_string(),
            cause,
        })?;
        log::debug!(
            "decoded image {} ({}x{})",
            index,
            bitmap.width(),
            bitmap.height()
        );
        Ok(Some(bitmap))
    }
}
