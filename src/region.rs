//! Layout regions: what a layout call finds on a page.
//!
//! Boxes are kept normalised to the page (`0.0..=1.0`, origin top-left) so
//! they stay meaningful regardless of the DPI the page was rendered at or the
//! coordinate convention a given vendor prefers.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Axis-aligned rectangle in normalised page coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

impl BoundingBox {
    /// Build a box from two corners, reordering swapped corners and clamping
    /// into the unit square.
    ///
    /// Returns `None` for non-finite input or a box with no area left after
    /// clamping.
    pub fn from_corners(x0: f64, y0: f64, x1: f64, y1: f64) -> Option<Self> {
        if ![x0, y0, x1, y1].iter().all(|v| v.is_finite()) {
            return None;
        }
        let (left, right) = if x0 <= x1 { (x0, x1) } else { (x1, x0) };
        let (top, bottom) = if y0 <= y1 { (y0, y1) } else { (y1, y0) };
        let bbox = Self {
            x0: left.clamp(0.0, 1.0),
            y0: top.clamp(0.0, 1.0),
            x1: right.clamp(0.0, 1.0),
            y1: bottom.clamp(0.0, 1.0),
        };
        (bbox.width() > 0.0 && bbox.height() > 0.0).then_some(bbox)
    }

    pub fn width(&self) -> f64 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f64 {
        self.y1 - self.y0
    }

    /// Pixel rectangle `(x, y, w, h)` on an image of the given size, grown by
    /// `padding` pixels on each side and kept inside the image.
    pub fn to_pixels(&self, width: u32, height: u32, padding: u32) -> (u32, u32, u32, u32) {
        let px = |v: f64, max: u32| ((v * max as f64).round() as i64).clamp(0, max as i64) as u32;
        let left = px(self.x0, width).saturating_sub(padding);
        let top = px(self.y0, height).saturating_sub(padding);
        let right = (px(self.x1, width) + padding).min(width);
        let bottom = (px(self.y1, height) + padding).min(height);
        (
            left,
            top,
            right.saturating_sub(left).max(1),
            bottom.saturating_sub(top).max(1),
        )
    }

    /// Reading-order comparison: top edge first, then left edge.
    pub fn reading_cmp(&self, other: &Self) -> Ordering {
        self.y0
            .total_cmp(&other.y0)
            .then_with(|| self.x0.total_cmp(&other.x0))
    }
}

/// Kind of layout element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionType {
    Text,
    Table,
    Figure,
    Heading,
    Other,
}

impl RegionType {
    /// Map the many labels vision models use onto the five kinds.
    pub fn from_label(label: &str) -> Self {
        let label = label.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        match label.as_str() {
            "text" | "paragraph" | "text_block" | "list" | "list_item" | "caption"
            | "footnote" | "formula" | "equation" | "code" | "quote" => RegionType::Text,
            "table" | "tabular" => RegionType::Table,
            "figure" | "image" | "picture" | "chart" | "graph" | "diagram" | "photo"
            | "illustration" | "logo" => RegionType::Figure,
            "heading" | "title" | "header" | "section_header" | "section_heading"
            | "subtitle" | "subheading" => RegionType::Heading,
            _ => RegionType::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RegionType::Text => "text",
            RegionType::Table => "table",
            RegionType::Figure => "figure",
            RegionType::Heading => "heading",
            RegionType::Other => "other",
        }
    }
}

impl fmt::Display for RegionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A region as reported by a layout call, before the page is known.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectedRegion {
    pub region_type: RegionType,
    pub bbox: BoundingBox,
}

/// A detected layout element on a page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    /// 0-based page index within the document.
    pub page_index: usize,
    /// 0-based position in reading order within the page.
    pub region_index: usize,
    /// 0-based position in the layout model's reply.
    pub detection_index: usize,
    pub bounding_box: BoundingBox,
    pub region_type: RegionType,
}

/// Transcription or description of one region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionContent {
    pub content: String,
    /// Model that produced `content`.
    pub model: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corners_are_reordered_and_clamped() {
        let b = BoundingBox::from_corners(0.8, 1.2, -0.1, 0.5).unwrap();
        assert_eq!(b.x0, 0.0);
        assert_eq!(b.x1, 0.8);
        assert_eq!(b.y0, 0.5);
        assert_eq!(b.y1, 1.0);
    }

    #[test]
    fn degenerate_boxes_are_rejected() {
        assert!(BoundingBox::from_corners(0.2, 0.2, 0.2, 0.6).is_none());
        assert!(BoundingBox::from_corners(1.5, 0.0, 2.0, 1.0).is_none());
        assert!(BoundingBox::from_corners(f64::NAN, 0.0, 1.0, 1.0).is_none());
    }

    #[test]
    fn to_pixels_applies_padding_inside_image() {
        let b = BoundingBox::from_corners(0.0, 0.5, 0.5, 1.0).unwrap();
        assert_eq!(b.to_pixels(200, 100, 10), (0, 40, 110, 60));
    }

    #[test]
    fn reading_order_is_top_then_left() {
        let top_right = BoundingBox::from_corners(0.6, 0.1, 0.9, 0.2).unwrap();
        let top_left = BoundingBox::from_corners(0.1, 0.1, 0.4, 0.2).unwrap();
        let below = BoundingBox::from_corners(0.0, 0.3, 0.4, 0.4).unwrap();
        assert_eq!(top_left.reading_cmp(&top_right), Ordering::Less);
        assert_eq!(top_right.reading_cmp(&below), Ordering::Less);
        assert_eq!(top_left.reading_cmp(&top_left), Ordering::Equal);
    }

    #[test]
    fn labels_map_to_region_types() {
        assert_eq!(RegionType::from_label("Paragraph"), RegionType::Text);
        assert_eq!(RegionType::from_label("section-header"), RegionType::Heading);
        assert_eq!(RegionType::from_label("Picture"), RegionType::Figure);
        assert_eq!(RegionType::from_label("table"), RegionType::Table);
        assert_eq!(RegionType::from_label("page_number"), RegionType::Other);
    }

    #[test]
    fn region_type_serialises_snake_case() {
        assert_eq!(
            serde_json::to_string(&RegionType::Heading).unwrap(),
            "\"heading\""
        );
    }
}
