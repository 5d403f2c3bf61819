//! Region extraction: layout then describe, for every page at once.
//!
//! ```text
//!   page 0 ──layout──▶ [r0, r1, r2] ──describe──▶ r0 ✓  r1 ✓  r2 ✗
//!   page 1 ──layout──▶ [r0]         ──describe──▶ r0 ✓
//!   page 2 ──layout──✗
//!            ▲                          ▲
//!       page pool (layout)        region pool (describe, shared by all pages)
//! ```
//!
//! ## Why two pools?
//!
//! Layout calls send a whole page and are slow; describe calls send a small
//! crop and are many. Bounding them separately keeps a long document from
//! flooding the vendor with page uploads while still letting region calls of
//! already-analysed pages proceed. Both pools belong to one request, so
//! concurrent requests never share limits.
//!
//! ## Failure isolation
//!
//! A failed layout call marks its page; a failed describe call marks its
//! region. Neither aborts the request. Results are keyed by detection index,
//! so completion order never leaks into the output.
//!
//! ## Cancellation
//!
//! Region crops run on the blocking pool; nothing else spawns tasks.
//! Dropping the future returned by [`RegionExtractor::extract`] drops every
//! pending call and backoff timer, and no further provider calls start.

use crate::config::ParseConfig;
use crate::error::CallFailure;
use crate::pipeline::encode::{crop_region, EncodedImage};
use crate::pipeline::render::RenderedPage;
use crate::pipeline::retry::{call_with_retry, RetryPolicy};
use crate::progress::{NoopProgressCallback, ProgressCallback};
use crate::providers::{Credential, ProviderPair, RegionRequest, TokenUsage};
use crate::region::{DetectedRegion, RegionContent};
use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{OnceCell, Semaphore};
use tracing::{debug, info, warn};

/// Models and key for one request.
#[derive(Debug, Clone, Copy)]
pub struct ExtractRequest<'a> {
    pub layout_model: &'a str,
    pub description_model: &'a str,
    pub credential: &'a Credential,
}

/// One detected region and what became of its describe call.
#[derive(Debug, Clone)]
pub struct ExtractedRegion {
    /// Position in the model's layout answer.
    pub detection_index: usize,
    pub detected: DetectedRegion,
    pub outcome: Result<RegionContent, CallFailure>,
}

/// Everything extracted from one page.
#[derive(Debug, Clone)]
pub struct PageExtraction {
    pub page_index: usize,
    pub width_px: u32,
    pub height_px: u32,
    /// Regions in detection order, or the layout failure.
    pub regions: Result<Vec<ExtractedRegion>, CallFailure>,
    /// Tokens reported by every successful call on this page.
    pub usage: TokenUsage,
    /// Provider attempts made for this page, retries included.
    pub attempts: u32,
    pub duration: Duration,
}

/// Runs the layout and describe stages for one request.
pub struct RegionExtractor {
    providers: ProviderPair,
    policy: RetryPolicy,
    page_pool: Semaphore,
    region_pool: Semaphore,
    padding: u32,
    progress: ProgressCallback,
}

impl RegionExtractor {
    /// Create an extractor with fresh pools sized from `config`.
    pub fn new(providers: ProviderPair, config: &ParseConfig) -> Self {
        Self {
            providers,
            policy: RetryPolicy::from(config),
            page_pool: Semaphore::new(config.page_concurrency.max(1)),
            region_pool: Semaphore::new(config.region_concurrency.max(1)),
            padding: config.region_padding_px,
            progress: config
                .progress_callback
                .clone()
                .unwrap_or_else(|| Arc::new(NoopProgressCallback)),
        }
    }

    /// Replace the retry policy (tests, custom retryability).
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Extract every page concurrently. Output is in input order.
    pub async fn extract(
        &self,
        pages: &[RenderedPage],
        request: ExtractRequest<'_>,
    ) -> Vec<PageExtraction> {
        info!(
            "Extracting regions from {} pages (layout pool {}, region pool {})",
            pages.len(),
            self.page_pool.available_permits(),
            self.region_pool.available_permits()
        );
        futures::future::join_all(pages.iter().map(|page| self.extract_page(page, request))).await
    }

    async fn extract_page(&self, page: &RenderedPage, request: ExtractRequest<'_>) -> PageExtraction {
        let start = Instant::now();
        let page_num = page.index + 1;
        let layout = self.providers.layout.as_ref();

        let laid_out = call_with_retry(
            &self.policy,
            &self.page_pool,
            request.layout_model,
            &format!("Page {page_num} layout"),
            |_| layout.layout(&page.encoded, request.layout_model, request.credential),
        )
        .await;

        let mut usage = TokenUsage::default();
        let mut attempts;

        let detected = match laid_out {
            Ok(reply) => {
                usage += reply.value.usage;
                attempts = reply.attempts;
                reply.value.value
            }
            Err(failure) => {
                warn!("Page {}: layout failed: {}", page_num, failure);
                self.progress.on_layout_error(page.index, &failure.to_string());
                return PageExtraction {
                    page_index: page.index,
                    width_px: page.encoded.width,
                    height_px: page.encoded.height,
                    attempts: failure.attempts,
                    regions: Err(failure),
                    usage,
                    duration: start.elapsed(),
                };
            }
        };

        debug!("Page {}: {} regions detected", page_num, detected.len());
        self.progress.on_layout_complete(page.index, detected.len());

        let mut pending: FuturesUnordered<_> = detected
            .iter()
            .enumerate()
            .map(|(i, region)| self.describe_region(page, i, region, request))
            .collect();

        let mut slots: Vec<Option<ExtractedRegion>> = vec![None; detected.len()];
        while let Some((i, outcome, region_usage, region_attempts)) = pending.next().await {
            usage += region_usage;
            attempts += region_attempts;
            slots[i] = Some(ExtractedRegion {
                detection_index: i,
                detected: detected[i],
                outcome,
            });
        }

        PageExtraction {
            page_index: page.index,
            width_px: page.encoded.width,
            height_px: page.encoded.height,
            regions: Ok(slots.into_iter().flatten().collect()),
            usage,
            attempts,
            duration: start.elapsed(),
        }
    }

    async fn describe_region(
        &self,
        page: &RenderedPage,
        detection_index: usize,
        region: &DetectedRegion,
        request: ExtractRequest<'_>,
    ) -> (usize, Result<RegionContent, CallFailure>, TokenUsage, u32) {
        let page_num = page.index + 1;

        // The crop is made on the first attempt, inside its region permit,
        // and reused by retries.
        let crop: OnceCell<Option<EncodedImage>> = OnceCell::new();
        let content = self.providers.content.as_ref();
        let model = request.description_model;
        let credential = request.credential;

        let described = call_with_retry(
            &self.policy,
            &self.region_pool,
            model,
            &format!("Page {page_num} region {detection_index}"),
            |_| {
                let crop = &crop;
                async move {
                    let image: &EncodedImage = crop
                        .get_or_init(|| self.crop_off_executor(page, detection_index, region))
                        .await
                        .as_ref()
                        .unwrap_or(&page.encoded);
                    content
                        .describe(
                            RegionRequest {
                                image,
                                region_type: region.region_type,
                                bbox: &region.bbox,
                            },
                            model,
                            credential,
                        )
                        .await
                }
            },
        )
        .await;

        match described {
            Ok(reply) => {
                self.progress.on_region_complete(page.index, detection_index);
                let usage = reply.value.usage;
                let content = RegionContent {
                    content: reply.value.value,
                    model: request.description_model.to_string(),
                };
                (detection_index, Ok(content), usage, reply.attempts)
            }
            Err(failure) => {
                warn!(
                    "Page {} region {}: describe failed: {}",
                    page_num, detection_index, failure
                );
                self.progress
                    .on_region_error(page.index, detection_index, &failure.to_string());
                let attempts = failure.attempts;
                (detection_index, Err(failure), TokenUsage::default(), attempts)
            }
        }
    }

    /// Crop and encode one region on the blocking pool.
    ///
    /// Returns `None` when the crop cannot be produced; the caller then sends
    /// the whole page, and the prompt still carries the box.
    async fn crop_off_executor(
        &self,
        page: &RenderedPage,
        detection_index: usize,
        region: &DetectedRegion,
    ) -> Option<EncodedImage> {
        let image = Arc::clone(&page.image);
        let bbox = region.bbox;
        let padding = self.padding;
        match tokio::task::spawn_blocking(move || crop_region(&image, &bbox, padding)).await {
            Ok(Ok(crop)) => Some(crop),
            Ok(Err(e)) => {
                warn!(
                    "Page {} region {}: crop failed, sending full page: {}",
                    page.index + 1,
                    detection_index,
                    e
                );
                None
            }
            Err(e) => {
                warn!(
                    "Page {} region {}: crop task panicked, sending full page: {}",
                    page.index + 1,
                    detection_index,
                    e
                );
                None
            }
        }
    }
}
