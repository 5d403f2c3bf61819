//! Parse results: the structured document returned to the caller.
//!
//! Failed pages and regions stay in the result with their [`CallFailure`]
//! attached, so "no table on this page" and "table description failed" are
//! never confused.

use crate::config::PageSeparator;
use crate::error::CallFailure;
use crate::providers::ProviderKind;
use crate::region::{Region, RegionContent, RegionType};
use serde::{Deserialize, Serialize};

/// The structured document produced by one parse request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedPdfResult {
    pub provider: ProviderKind,
    pub layout_model: String,
    pub description_model: String,
    /// Pages in ascending document order.
    pub pages: Vec<ParsedPage>,
    pub stats: ParseStats,
}

/// One page of the result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedPage {
    /// 0-based page index within the document.
    pub page_index: usize,
    /// Size of the rendered image the models saw.
    pub width_px: u32,
    pub height_px: u32,
    /// Regions in reading order. Empty when `error` is set.
    pub regions: Vec<RegionEntry>,
    /// Set when the layout call failed terminally.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<CallFailure>,
}

/// A region and its content, or the reason it has none.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionEntry {
    pub region: Region,
    #[serde(flatten)]
    pub outcome: RegionOutcome,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RegionOutcome {
    Described(RegionContent),
    Failed(CallFailure),
}

impl RegionOutcome {
    pub fn content(&self) -> Option<&RegionContent> {
        match self {
            RegionOutcome::Described(c) => Some(c),
            RegionOutcome::Failed(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&CallFailure> {
        match self {
            RegionOutcome::Described(_) => None,
            RegionOutcome::Failed(f) => Some(f),
        }
    }
}

impl RegionEntry {
    pub fn content(&self) -> Option<&RegionContent> {
        self.outcome.content()
    }

    pub fn failure(&self) -> Option<&CallFailure> {
        self.outcome.failure()
    }

    pub fn is_failed(&self) -> bool {
        self.failure().is_some()
    }
}

/// Counters and timings for one parse request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParseStats {
    /// Pages in the result (the selected pages).
    pub total_pages: usize,
    /// Pages whose layout call succeeded.
    pub parsed_pages: usize,
    /// Pages whose layout call failed terminally.
    pub failed_pages: usize,
    pub total_regions: usize,
    pub described_regions: usize,
    pub failed_regions: usize,
    /// Provider attempts across the request, retries included.
    pub api_calls: u64,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub render_duration_ms: u64,
    pub extract_duration_ms: u64,
    pub total_duration_ms: u64,
}

impl ParsedPdfResult {
    /// True when every page and every region succeeded.
    pub fn is_complete(&self) -> bool {
        self.stats.failed_pages == 0 && self.stats.failed_regions == 0
    }

    /// Every region entry with its page, in document order.
    pub fn regions(&self) -> impl Iterator<Item = &RegionEntry> {
        self.pages.iter().flat_map(|p| p.regions.iter())
    }

    /// Render the document as Markdown in reading order.
    ///
    /// Headings become `##` lines. Failed pages and regions appear as HTML
    /// comments so they stay visible without polluting the text.
    pub fn to_markdown(&self, separator: &PageSeparator) -> String {
        let mut out = String::new();
        for (i, page) in self.pages.iter().enumerate() {
            if i > 0 {
                out.push_str(&separator.render(page.page_index + 1));
            }
            out.push_str(&page.to_markdown());
        }
        out
    }

    /// Plain concatenation of every described region, blank-line separated.
    pub fn all_content(&self) -> String {
        self.regions()
            .filter_map(RegionEntry::content)
            .map(|c| c.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

impl ParsedPage {
    /// Markdown for this page alone.
    pub fn to_markdown(&self) -> String {
        if let Some(err) = &self.error {
            return format!(
                "<!-- page {}: layout failed: {} -->",
                self.page_index + 1,
                comment_safe(&err.to_string())
            );
        }
        self.regions
            .iter()
            .map(|entry| match &entry.outcome {
                RegionOutcome::Described(c) => match entry.region.region_type {
                    RegionType::Heading => format!("## {}", c.content),
                    _ => c.content.clone(),
                },
                RegionOutcome::Failed(f) => format!(
                    "<!-- region {} ({}) failed: {} -->",
                    entry.region.region_index,
                    entry.region.region_type,
                    comment_safe(&f.to_string())
                ),
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// `--` may not appear inside an HTML comment.
fn comment_safe(s: &str) -> String {
    s.replace("--", "- -")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CallError;
    use crate::region::BoundingBox;

    fn region(page_index: usize, region_index: usize, region_type: RegionType) -> Region {
        Region {
            page_index,
            region_index,
            detection_index: region_index,
            bounding_box: BoundingBox::from_corners(0.0, 0.1 * region_index as f64, 1.0, 0.9)
                .unwrap(),
            region_type,
        }
    }

    fn described(page: usize, idx: usize, kind: RegionType, text: &str) -> RegionEntry {
        RegionEntry {
            region: region(page, idx, kind),
            outcome: RegionOutcome::Described(RegionContent {
                content: text.into(),
                model: "m".into(),
            }),
        }
    }

    fn failure() -> CallFailure {
        CallFailure {
            error: CallError::Provider {
                status: 400,
                message: "bad image".into(),
                retry_after_secs: None,
            },
            attempts: 1,
            model: "m".into(),
        }
    }

    fn result(pages: Vec<ParsedPage>) -> ParsedPdfResult {
        ParsedPdfResult {
            provider: ProviderKind::OpenAi,
            layout_model: "m".into(),
            description_model: "m".into(),
            pages,
            stats: ParseStats::default(),
        }
    }

    fn page(page_index: usize, regions: Vec<RegionEntry>) -> ParsedPage {
        ParsedPage {
            page_index,
            width_px: 100,
            height_px: 100,
            regions,
            error: None,
        }
    }

    #[test]
    fn markdown_keeps_failures_visible() {
        let r = result(vec![
            page(
                0,
                vec![
                    described(0, 0, RegionType::Heading, "Intro"),
                    RegionEntry {
                        region: region(0, 1, RegionType::Table),
                        outcome: RegionOutcome::Failed(failure()),
                    },
                ],
            ),
            ParsedPage {
                error: Some(failure()),
                ..page(1, vec![])
            },
        ]);
        let md = r.to_markdown(&PageSeparator::HorizontalRule);
        assert!(md.starts_with("## Intro\n\n<!-- region 1 (table) failed:"), "{md}");
        assert!(md.contains("\n\n---\n\n<!-- page 2: layout failed:"), "{md}");
    }

    #[test]
    fn all_content_skips_failures() {
        let r = result(vec![
            page(0, vec![described(0, 0, RegionType::Text, "one")]),
            page(
                1,
                vec![
                    RegionEntry {
                        region: region(1, 0, RegionType::Figure),
                        outcome: RegionOutcome::Failed(failure()),
                    },
                    described(1, 1, RegionType::Text, "two"),
                ],
            ),
        ]);
        assert_eq!(r.all_content(), "one\n\ntwo");
        assert_eq!(r.regions().filter(|e| e.is_failed()).count(), 1);
    }

    #[test]
    fn outcome_accessors_match_variant() {
        let ok = described(0, 0, RegionType::Text, "one").outcome;
        assert_eq!(ok.content().map(|c| c.content.as_str()), Some("one"));
        assert!(ok.failure().is_none());

        let failed = RegionOutcome::Failed(failure());
        assert!(failed.content().is_none());
        assert_eq!(failed.failure(), Some(&failure()));
    }

    #[test]
    fn comments_never_contain_double_dash() {
        assert_eq!(comment_safe("a -- b"), "a - - b");
    }

    #[test]
    fn entry_serialises_with_status_tag() {
        let v = serde_json::to_value(described(0, 0, RegionType::Text, "hi")).unwrap();
        assert_eq!(v["status"], "described");
        assert_eq!(v["content"], "hi");
        assert_eq!(v["region"]["region_type"], "text");

        let failed = RegionEntry {
            region: region(0, 0, RegionType::Table),
            outcome: RegionOutcome::Failed(failure()),
        };
        let v = serde_json::to_value(&failed).unwrap();
        assert_eq!(v["status"], "failed");
        assert_eq!(v["attempts"], 1);
        assert_eq!(v["error"]["kind"], "provider");
        assert_eq!(v["error"]["status"], 400);
    }
}
