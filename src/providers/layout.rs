//! Vendor-neutral parsing of layout replies.
//!
//! Models are asked for strict JSON but answer in many dialects: fenced or
//! bare, top-level array or `{"regions": [...]}`, `bbox` arrays or
//! `{x, y, width, height}` objects, unit fractions, Gemini's 0–1000
//! `box_2d`, or plain pixels. Everything is normalised here into
//! [`DetectedRegion`]s with unit-square boxes.

use crate::error::CallError;
use crate::pipeline::postprocess::strip_outer_fences;
use crate::region::{BoundingBox, DetectedRegion, RegionType};
use serde_json::{Map, Value};

/// Axis order of four-element box arrays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxisOrder {
    /// `[x0, y0, x1, y1]`
    Xyxy,
    /// `[ymin, xmin, ymax, xmax]`, Gemini's native `box_2d`.
    Yxyx,
}

const LIST_KEYS: [&str; 4] = ["regions", "elements", "blocks", "layout"];
const TYPE_KEYS: [&str; 5] = ["type", "region_type", "label", "category", "kind"];
const BOX_KEYS: [&str; 5] = ["bbox", "bounding_box", "box", "box_2d", "coordinates"];

/// Parse a layout reply into regions, in the order the model listed them.
///
/// `page_width`/`page_height` are the pixel size of the image the model saw,
/// used when a model answers in pixels. The coordinate unit is decided once
/// for the whole reply, from its largest coordinate.
pub fn parse_layout_reply(
    text: &str,
    order: AxisOrder,
    page_width: u32,
    page_height: u32,
) -> Result<Vec<DetectedRegion>, CallError> {
    let json = extract_json(text)?;
    let items = region_items(&json)?;

    let raw = items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let obj = item
                .as_object()
                .ok_or_else(|| CallError::malformed(format!("region {i} is not an object")))?;
            let region_type = TYPE_KEYS
                .iter()
                .find_map(|k| obj.get(*k).and_then(Value::as_str))
                .map(RegionType::from_label)
                .unwrap_or(RegionType::Other);
            let raw = raw_box(obj, order)
                .map_err(|detail| CallError::malformed(format!("region {i}: {detail}")))?;
            Ok((region_type, raw))
        })
        .collect::<Result<Vec<_>, CallError>>()?;

    let max = raw
        .iter()
        .filter(|(_, b)| !b.per_mille)
        .flat_map(|(_, b)| b.coords)
        .fold(0.0, f64::max);
    let scale = Scale::detect(max, page_width, page_height).map_err(CallError::malformed)?;

    raw.into_iter()
        .enumerate()
        .map(|(i, (region_type, b))| {
            let s = if b.per_mille { Scale::PerMille } else { scale };
            let [x0, y0, x1, y1] = s.apply(b.coords, page_width, page_height);
            let bbox = BoundingBox::from_corners(x0, y0, x1, y1).ok_or_else(|| {
                CallError::malformed(format!("region {i}: degenerate bounding box"))
            })?;
            Ok(DetectedRegion { region_type, bbox })
        })
        .collect()
}

/// Find the JSON document inside a reply, tolerating fences and chatter.
fn extract_json(text: &str) -> Result<Value, CallError> {
    let stripped = strip_outer_fences(text);
    if let Ok(v) = serde_json::from_str::<Value>(&stripped) {
        return Ok(v);
    }
    let start = stripped.find(['{', '[']);
    let end = stripped.rfind(['}', ']']);
    match (start, end) {
        (Some(s), Some(e)) if e > s => serde_json::from_str::<Value>(&stripped[s..=e])
            .map_err(|err| CallError::malformed(format!("layout reply is not valid JSON: {err}"))),
        _ => Err(CallError::malformed("layout reply contains no JSON")),
    }
}

fn region_items(json: &Value) -> Result<&Vec<Value>, CallError> {
    match json {
        Value::Array(items) => Ok(items),
        Value::Object(obj) => LIST_KEYS
            .iter()
            .find_map(|k| obj.get(*k).and_then(Value::as_array))
            .ok_or_else(|| CallError::malformed("layout reply has no region list")),
        _ => Err(CallError::malformed("layout reply is neither an array nor an object")),
    }
}

/// Box corners as the model wrote them, reordered to `[x0, y0, x1, y1]`.
struct RawBox {
    coords: [f64; 4],
    /// `box_2d` is always on Gemini's 0–1000 grid.
    per_mille: bool,
}

fn raw_box(obj: &Map<String, Value>, order: AxisOrder) -> Result<RawBox, String> {
    let (key, value) = BOX_KEYS
        .iter()
        .find_map(|k| obj.get(*k).map(|v| (*k, v)))
        .ok_or_else(|| "missing bounding box".to_string())?;
    let per_mille = key == "box_2d";

    let coords = match value {
        Value::Array(coords) => {
            let nums = numbers(coords)?;
            // box_2d is always yxyx, whatever was asked for.
            if per_mille || order == AxisOrder::Yxyx {
                [nums[1], nums[0], nums[3], nums[2]]
            } else {
                nums
            }
        }
        Value::Object(b) => object_corners(b)?,
        _ => return Err(format!("'{key}' is not an array or object")),
    };

    if coords.iter().any(|v| !v.is_finite()) {
        return Err("non-finite coordinate".to_string());
    }
    Ok(RawBox { coords, per_mille })
}

fn numbers(coords: &[Value]) -> Result<[f64; 4], String> {
    if coords.len() != 4 {
        return Err(format!("expected 4 coordinates, got {}", coords.len()));
    }
    let mut out = [0.0; 4];
    for (slot, v) in out.iter_mut().zip(coords) {
        *slot = v
            .as_f64()
            .ok_or_else(|| format!("coordinate {v} is not a number"))?;
    }
    Ok(out)
}

fn object_corners(b: &Map<String, Value>) -> Result<[f64; 4], String> {
    let get = |k: &str| b.get(k).and_then(Value::as_f64);
    let corner_sets = [
        ["x0", "y0", "x1", "y1"],
        ["xmin", "ymin", "xmax", "ymax"],
        ["left", "top", "right", "bottom"],
        ["x1", "y1", "x2", "y2"],
    ];
    for [kx0, ky0, kx1, ky1] in corner_sets {
        if let (Some(x0), Some(y0), Some(x1), Some(y1)) = (get(kx0), get(ky0), get(kx1), get(ky1)) {
            return Ok([x0, y0, x1, y1]);
        }
    }
    if let (Some(x), Some(y), Some(w), Some(h)) = (get("x"), get("y"), get("width"), get("height")) {
        return Ok([x, y, x + w, y + h]);
    }
    Err("bounding box object has no recognised coordinate keys".to_string())
}

/// Values up to this are unit fractions that overshoot the page edge a
/// little; they are clamped rather than read as per-mille.
const UNIT_TOLERANCE: f64 = 1.05;

/// Coordinate unit shared by every box of one reply.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Scale {
    Unit,
    PerMille,
    Pixels,
}

impl Scale {
    /// Pick the unit from the largest coordinate anywhere in the reply.
    ///
    /// Up to [`UNIT_TOLERANCE`] means fractions, up to 1000 means per-mille,
    /// anything larger means pixels of the page image. A reply whose boxes
    /// are all per-mille yet never exceed 1 (every box within the top-left
    /// thousandth of the page) is read as fractions.
    fn detect(max: f64, page_width: u32, page_height: u32) -> Result<Self, String> {
        if max <= UNIT_TOLERANCE {
            Ok(Scale::Unit)
        } else if max <= 1000.0 {
            Ok(Scale::PerMille)
        } else if page_width > 0 && page_height > 0 {
            Ok(Scale::Pixels)
        } else {
            Err(format!("coordinates out of range (max {max})"))
        }
    }

    fn apply(self, c: [f64; 4], page_width: u32, page_height: u32) -> [f64; 4] {
        match self {
            Scale::Unit => c,
            Scale::PerMille => c.map(|v| v / 1000.0),
            Scale::Pixels => {
                let (w, h) = (page_width as f64, page_height as f64);
                [c[0] / w, c[1] / h, c[2] / w, c[3] / h]
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Result<Vec<DetectedRegion>, CallError> {
        parse_layout_reply(text, AxisOrder::Xyxy, 1275, 1650)
    }

    #[test]
    fn parses_regions_object_with_unit_boxes() {
        let regions = parse(
            r#"{"regions": [
                {"type": "heading", "bbox": [0.1, 0.05, 0.9, 0.1]},
                {"type": "table", "bbox": [0.1, 0.2, 0.9, 0.5]}
            ]}"#,
        )
        .unwrap();
        assert_eq!(regions.len(), 2);
        assert_eq!(regions[0].region_type, RegionType::Heading);
        assert_eq!(regions[1].region_type, RegionType::Table);
        assert_eq!(regions[1].bbox.y1, 0.5);
    }

    #[test]
    fn tolerates_fences_and_chatter() {
        let fenced = "```json\n[{\"type\": \"text\", \"bbox\": [0, 0, 0.5, 0.5]}]\n```";
        assert_eq!(parse(fenced).unwrap().len(), 1);

        let chatty = "Here are the regions:\n{\"regions\": [{\"type\": \"figure\", \"bbox\": [0.2, 0.2, 0.4, 0.4]}]}\nLet me know!";
        assert_eq!(parse(chatty).unwrap()[0].region_type, RegionType::Figure);
    }

    #[test]
    fn gemini_box_2d_is_yxyx_per_mille() {
        let regions = parse_layout_reply(
            r#"[{"label": "paragraph", "box_2d": [100, 200, 300, 800]}]"#,
            AxisOrder::Yxyx,
            1000,
            1000,
        )
        .unwrap();
        let b = regions[0].bbox;
        assert_eq!((b.x0, b.y0, b.x1, b.y1), (0.2, 0.1, 0.8, 0.3));
        assert_eq!(regions[0].region_type, RegionType::Text);
    }

    #[test]
    fn box_2d_key_wins_over_requested_order() {
        let regions = parse(r#"[{"type": "text", "box_2d": [0, 500, 250, 1000]}]"#).unwrap();
        assert_eq!(regions[0].bbox.x0, 0.5);
        assert_eq!(regions[0].bbox.y1, 0.25);
    }

    #[test]
    fn object_boxes_and_pixels() {
        let regions = parse(
            r#"{"elements": [
                {"type": "text", "bounding_box": {"x": 127.5, "y": 1650, "width": 1147.5, "height": 0}},
                {"type": "text", "bbox": {"left": 0, "top": 0, "right": 1275, "bottom": 1650}}
            ]}"#,
        );
        // First box has zero height after conversion.
        assert!(matches!(regions, Err(CallError::MalformedResponse { .. })));

        let regions = parse(
            r#"[{"type": "text", "bbox": {"left": 0, "top": 825, "right": 1275, "bottom": 1650}}]"#,
        )
        .unwrap();
        assert_eq!(regions[0].bbox.y0, 0.5);
        assert_eq!(regions[0].bbox.x1, 1.0);
    }

    #[test]
    fn one_scale_for_the_whole_reply() {
        // Pixel reply: the first box alone would look like per-mille.
        let regions = parse(
            r#"[{"type": "text", "bbox": [100, 100, 900, 300]},
                {"type": "table", "bbox": [100, 1200, 900, 1500]}]"#,
        )
        .unwrap();
        let (a, b) = (regions[0].bbox, regions[1].bbox);
        assert!((a.x0 - 100.0 / 1275.0).abs() < 1e-9);
        assert!((a.y0 - 100.0 / 1650.0).abs() < 1e-9);
        assert!((b.y0 - 1200.0 / 1650.0).abs() < 1e-9);
        assert!(a.reading_cmp(&b).is_lt());
    }

    #[test]
    fn slight_overshoot_is_clamped_not_rescaled() {
        let regions = parse(r#"[{"type": "text", "bbox": [0.05, 0.6, 1.01, 0.95]}]"#).unwrap();
        let b = regions[0].bbox;
        assert_eq!((b.x0, b.y0, b.x1, b.y1), (0.05, 0.6, 1.0, 0.95));
    }

    #[test]
    fn tiny_per_mille_box_follows_the_reply_scale() {
        // Alone, [0, 0, 1, 1] reads as the whole page.
        let alone = parse(r#"[{"type": "figure", "bbox": [0, 0, 1, 1]}]"#).unwrap();
        assert_eq!(alone[0].bbox.x1, 1.0);

        // Next to per-mille boxes it is a per-mille speck.
        let mixed = parse(
            r#"[{"type": "figure", "bbox": [0, 0, 1, 1]},
                {"type": "text", "bbox": [100, 100, 900, 500]}]"#,
        )
        .unwrap();
        assert_eq!(mixed[0].bbox.x1, 0.001);
        assert_eq!(mixed[1].bbox.y1, 0.5);
    }

    #[test]
    fn box_2d_stays_per_mille_beside_unit_boxes() {
        let regions = parse(
            r#"[{"type": "text", "bbox": [0.1, 0.1, 0.5, 0.2]},
                {"type": "text", "box_2d": [500, 0, 1000, 1000]}]"#,
        )
        .unwrap();
        assert_eq!(regions[0].bbox.x1, 0.5);
        assert_eq!(regions[1].bbox.y0, 0.5);
    }

    #[test]
    fn missing_type_defaults_to_other() {
        let regions = parse(r#"[{"bbox": [0.1, 0.1, 0.2, 0.2]}]"#).unwrap();
        assert_eq!(regions[0].region_type, RegionType::Other);
    }

    #[test]
    fn empty_region_list_is_valid() {
        assert!(parse(r#"{"regions": []}"#).unwrap().is_empty());
        assert!(parse("[]").unwrap().is_empty());
    }

    #[test]
    fn malformed_replies() {
        for bad in [
            "I cannot see any regions.",
            r#"{"regions": [{"type": "text"}]}"#,
            r#"{"regions": [{"type": "text", "bbox": [0.1, 0.2, 0.3]}]}"#,
            r#"{"regions": [{"type": "text", "bbox": ["a", 0.2, 0.3, 0.4]}]}"#,
            r#"{"pages": []}"#,
            r#"[1, 2]"#,
            r#""just a string""#,
        ] {
            let err = parse(bad).unwrap_err();
            assert!(
                matches!(err, CallError::MalformedResponse { .. }),
                "{bad}: {err:?}"
            );
        }
    }

    #[test]
    fn missing_bbox_error_names_the_region() {
        let err = parse(r#"[{"type": "text", "bbox": [0, 0, 1, 1]}, {"type": "table"}]"#)
            .unwrap_err();
        assert!(err.to_string().contains("region 1"), "got: {err}");
        assert!(err.to_string().contains("missing bounding box"));
    }
}
