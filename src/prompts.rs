//! Instructions sent to the vision models.
//!
//! Every prompt lives here so the adapters stay about wire formats only and
//! prompt changes never touch retry or parsing code. Callers can replace the
//! layout prompt via [`crate::config::ParseConfig::layout_prompt`].

use crate::region::{BoundingBox, RegionType};

/// Layout instruction for providers that take normalised `[x0, y0, x1, y1]` boxes.
pub const LAYOUT_PROMPT: &str = r#"You are a document layout analyser. The image is one page of a PDF document.

Identify every distinct layout region on the page and classify each one as exactly one of:
- "heading": titles, section and subsection headings
- "text": paragraphs, lists, captions, footnotes, formulas
- "table": tabular data, including its header row
- "figure": images, charts, diagrams, photos
- "other": anything else that carries content

Rules:
- Report regions in natural reading order.
- Regions must not overlap; a table or figure is ONE region, not one per cell.
- Ignore page numbers, running headers and footers, and decorative lines.
- Coordinates are fractions of the page size between 0 and 1, origin at the top-left corner.

Respond with ONLY a JSON object, no commentary, in this exact shape:
{"regions": [{"type": "text", "bbox": [x0, y0, x1, y1]}]}

If the page is blank, respond with {"regions": []}."#;

/// Layout instruction for Gemini, which is trained on `box_2d` in 0–1000 space.
pub const GEMINI_LAYOUT_PROMPT: &str = r#"You are a document layout analyser. The image is one page of a PDF document.

Identify every distinct layout region on the page and classify each one as exactly one of:
- "heading": titles, section and subsection headings
- "text": paragraphs, lists, captions, footnotes, formulas
- "table": tabular data, including its header row
- "figure": images, charts, diagrams, photos
- "other": anything else that carries content

Rules:
- Report regions in natural reading order.
- Regions must not overlap; a table or figure is ONE region, not one per cell.
- Ignore page numbers, running headers and footers, and decorative lines.

Respond with ONLY a JSON array, no commentary, where each element has the shape:
{"type": "text", "box_2d": [ymin, xmin, ymax, xmax]}
with coordinates normalised to 0-1000.

If the page is blank, respond with []."#;

/// System instruction shared by every describe call.
pub const DESCRIBE_SYSTEM_PROMPT: &str = r#"You are an expert document transcriber. You receive an image cropped from one page of a PDF document around a single layout region.

Output ONLY the content of that region:
- Do NOT wrap the output in ``` fences
- Do NOT add commentary, explanations or prefixes such as "Here is"
- Ignore fragments of neighbouring regions visible at the crop edges"#;

/// Build the per-region instruction, tailored to the region kind.
pub fn describe_prompt(region_type: RegionType, bbox: &BoundingBox) -> String {
    let task = match region_type {
        RegionType::Text => {
            "This region is a block of text. Transcribe it verbatim, preserving paragraphs, \
             list markers and emphasis as Markdown. Render formulas as LaTeX ($...$)."
        }
        RegionType::Heading => {
            "This region is a heading. Transcribe the heading text exactly, without any \
             leading '#' characters."
        }
        RegionType::Table => {
            "This region is a table. Reproduce it as a GitHub-flavoured Markdown pipe table \
             with a header row. Keep every row and column; leave empty cells empty."
        }
        RegionType::Figure => {
            "This region is a figure. Describe what it shows in 2-5 sentences: its kind \
             (chart, diagram, photo...), axes, labels, trends or key elements. Then transcribe \
             any text visible inside the figure."
        }
        RegionType::Other => {
            "Transcribe any text in this region verbatim. If it contains no text, describe it \
             in one sentence."
        }
    };
    format!(
        "{task}\n\nThe region occupies x {:.3}–{:.3}, y {:.3}–{:.3} of the page (fractions of page size).",
        bbox.x0, bbox.x1, bbox.y0, bbox.y1
    )
}
