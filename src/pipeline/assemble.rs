//! Document assembly: per-page extractions → one ordered result.
//!
//! ## Reading order
//!
//! Regions are sorted by top edge, then left edge, then the position the
//! layout model reported them in. The last key makes the order total: two
//! regions sharing an origin still come out the same way on every run,
//! whatever order their describe calls completed in. `region_index` is the
//! position after sorting; `detection_index` keeps the model's order.

use crate::output::{ParseStats, ParsedPage, RegionEntry, RegionOutcome};
use crate::pipeline::extract::{ExtractedRegion, PageExtraction};
use crate::region::Region;

/// Merge page extractions into pages in document order plus their counters.
///
/// Durations in the returned stats are left at zero for the caller to fill.
pub fn assemble(mut extractions: Vec<PageExtraction>) -> (Vec<ParsedPage>, ParseStats) {
    extractions.sort_by_key(|p| p.page_index);

    let mut stats = ParseStats {
        total_pages: extractions.len(),
        ..ParseStats::default()
    };

    let pages = extractions
        .into_iter()
        .map(|page| {
            stats.api_calls += u64::from(page.attempts);
            stats.total_input_tokens += page.usage.input_tokens;
            stats.total_output_tokens += page.usage.output_tokens;

            let (regions, error) = match page.regions {
                Ok(regions) => {
                    stats.parsed_pages += 1;
                    (order_regions(page.page_index, regions), None)
                }
                Err(failure) => {
                    stats.failed_pages += 1;
                    (Vec::new(), Some(failure))
                }
            };

            stats.total_regions += regions.len();
            let failed = regions.iter().filter(|r| r.is_failed()).count();
            stats.failed_regions += failed;
            stats.described_regions += regions.len() - failed;

            ParsedPage {
                page_index: page.page_index,
                width_px: page.width_px,
                height_px: page.height_px,
                regions,
                error,
            }
        })
        .collect();

    (pages, stats)
}

/// Sort one page's regions into reading order and assign `region_index`.
pub fn order_regions(page_index: usize, mut regions: Vec<ExtractedRegion>) -> Vec<RegionEntry> {
    regions.sort_by(|a, b| {
        a.detected
            .bbox
            .reading_cmp(&b.detected.bbox)
            .then(a.detection_index.cmp(&b.detection_index))
    });

    regions
        .into_iter()
        .enumerate()
        .map(|(region_index, r)| RegionEntry {
            region: Region {
                page_index,
                region_index,
                detection_index: r.detection_index,
                bounding_box: r.detected.bbox,
                region_type: r.detected.region_type,
            },
            outcome: match r.outcome {
                Ok(content) => RegionOutcome::Described(content),
                Err(failure) => RegionOutcome::Failed(failure),
            },
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CallError, CallFailure};
    use crate::providers::TokenUsage;
    use crate::region::{BoundingBox, DetectedRegion, RegionContent, RegionType};
    use std::time::Duration;

    fn extracted(i: usize, x0: f64, y0: f64, ok: bool) -> ExtractedRegion {
        ExtractedRegion {
            detection_index: i,
            detected: DetectedRegion {
                region_type: RegionType::Text,
                bbox: BoundingBox::from_corners(x0, y0, x0 + 0.1, y0 + 0.1).unwrap(),
            },
            outcome: if ok {
                Ok(RegionContent {
                    content: format!("r{i}"),
                    model: "m".into(),
                })
            } else {
                Err(CallFailure {
                    error: CallError::malformed("empty description"),
                    attempts: 3,
                    model: "m".into(),
                })
            },
        }
    }

    fn page(page_index: usize, regions: Result<Vec<ExtractedRegion>, CallFailure>) -> PageExtraction {
        PageExtraction {
            page_index,
            width_px: 100,
            height_px: 130,
            regions,
            usage: TokenUsage {
                input_tokens: 10,
                output_tokens: 5,
            },
            attempts: 2,
            duration: Duration::from_millis(1),
        }
    }

    #[test]
    fn regions_sorted_top_to_bottom_then_left_to_right() {
        let entries = order_regions(
            0,
            vec![
                extracted(0, 0.5, 0.5, true),
                extracted(1, 0.1, 0.5, true),
                extracted(2, 0.3, 0.1, true),
            ],
        );
        let order: Vec<usize> = entries.iter().map(|e| e.region.detection_index).collect();
        assert_eq!(order, vec![2, 1, 0]);
        let idx: Vec<usize> = entries.iter().map(|e| e.region.region_index).collect();
        assert_eq!(idx, vec![0, 1, 2]);
    }

    #[test]
    fn identical_origins_fall_back_to_detection_order() {
        let forward = order_regions(0, vec![extracted(0, 0.2, 0.2, true), extracted(1, 0.2, 0.2, true)]);
        let reverse = order_regions(0, vec![extracted(1, 0.2, 0.2, true), extracted(0, 0.2, 0.2, true)]);
        assert_eq!(forward, reverse);
        assert_eq!(forward[0].region.detection_index, 0);
    }

    #[test]
    fn failed_regions_are_kept_in_place() {
        let entries = order_regions(
            3,
            vec![extracted(0, 0.0, 0.0, true), extracted(1, 0.0, 0.4, false)],
        );
        assert_eq!(entries.len(), 2);
        assert!(entries[1].is_failed());
        assert_eq!(entries[1].region.page_index, 3);
    }

    #[test]
    fn pages_sorted_and_counted() {
        let layout_failure = CallFailure {
            error: CallError::Provider {
                status: 400,
                message: "bad".into(),
                retry_after_secs: None,
            },
            attempts: 1,
            model: "m".into(),
        };
        let (pages, stats) = assemble(vec![
            page(2, Ok(vec![extracted(0, 0.0, 0.0, true)])),
            page(0, Ok(vec![extracted(0, 0.0, 0.0, true), extracted(1, 0.0, 0.5, false)])),
            page(1, Err(layout_failure.clone())),
        ]);

        let order: Vec<usize> = pages.iter().map(|p| p.page_index).collect();
        assert_eq!(order, vec![0, 1, 2]);
        assert_eq!(pages[1].error, Some(layout_failure));
        assert!(pages[1].regions.is_empty());

        assert_eq!(stats.total_pages, 3);
        assert_eq!(stats.parsed_pages, 2);
        assert_eq!(stats.failed_pages, 1);
        assert_eq!(stats.total_regions, 3);
        assert_eq!(stats.described_regions, 2);
        assert_eq!(stats.failed_regions, 1);
        assert_eq!(stats.api_calls, 6);
        assert_eq!(stats.total_input_tokens, 30);
        assert_eq!(stats.total_output_tokens, 15);
    }
}
