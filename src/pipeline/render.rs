//! PDF rasterisation: PDF bytes → one encoded image per selected page.
//!
//! ## Why spawn_blocking?
//!
//! The `pdfium-render` crate wraps the pdfium C++ library, which is CPU-bound
//! and not async-aware. [`render_pages`] moves rasterisation and PNG encoding
//! onto Tokio's blocking pool so the executor keeps serving provider calls of
//! concurrent requests.
//!
//! ## Why cap pixels as well as DPI?
//!
//! Page sizes vary wildly: an A0 poster at 150 DPI would produce a
//! 7,000 × 10,000 px image. `max_rendered_pixels` caps the longest edge
//! regardless of physical size, keeping memory bounded and images inside the
//! upload limits of every vendor.

use crate::config::{PageSelection, ParseConfig};
use crate::error::ParseError;
use crate::pipeline::encode::{encode_png, EncodedImage};
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::sync::Arc;
use tracing::{debug, info};

/// Rendering knobs taken from [`ParseConfig`].
#[derive(Debug, Clone)]
pub struct RenderOptions {
    pub dpi: u32,
    pub max_rendered_pixels: u32,
    pub password: Option<String>,
    pub pages: PageSelection,
}

impl From<&ParseConfig> for RenderOptions {
    fn from(config: &ParseConfig) -> Self {
        Self {
            dpi: config.dpi,
            max_rendered_pixels: config.max_rendered_pixels,
            password: config.password.clone(),
            pages: config.pages.clone(),
        }
    }
}

/// One rendered page, ready for the provider calls.
#[derive(Debug, Clone)]
pub struct RenderedPage {
    /// 0-based page index within the document.
    pub index: usize,
    /// Decoded raster, kept for cropping regions. Shared so crops can run
    /// on the blocking pool.
    pub image: Arc<DynamicImage>,
    /// The full page as sent to layout calls.
    pub encoded: EncodedImage,
}

/// Turns PDF bytes into page rasters.
///
/// Implementations are synchronous; [`render_pages`] runs them on the
/// blocking pool.
pub trait PageRenderer: Send + Sync {
    /// Rasterise the selected pages, returning `(page_index_0based, image)`
    /// pairs in ascending page order.
    fn render(
        &self,
        pdf_bytes: &[u8],
        options: &RenderOptions,
    ) -> Result<Vec<(usize, DynamicImage)>, ParseError>;
}

/// Check the `%PDF-` header, which may be preceded by up to 1 KiB of junk.
pub fn check_pdf_header(pdf_bytes: &[u8]) -> Result<(), ParseError> {
    if pdf_bytes.is_empty() {
        return Err(ParseError::CorruptDocument {
            detail: "input is empty".into(),
        });
    }
    let head = &pdf_bytes[..pdf_bytes.len().min(1024)];
    if head.windows(5).any(|w| w == b"%PDF-") {
        Ok(())
    } else {
        let magic: Vec<u8> = pdf_bytes.iter().take(4).copied().collect();
        Err(ParseError::CorruptDocument {
            detail: format!("missing %PDF header (first bytes: {magic:?})"),
        })
    }
}

/// Render and encode the selected pages of a PDF.
///
/// Fails with [`ParseError::CorruptDocument`] for bytes that are not a PDF
/// and [`ParseError::EmptyDocument`] when no page is produced.
pub async fn render_pages(
    renderer: Arc<dyn PageRenderer>,
    pdf_bytes: Arc<[u8]>,
    options: RenderOptions,
) -> Result<Vec<RenderedPage>, ParseError> {
    check_pdf_header(&pdf_bytes)?;

    tokio::task::spawn_blocking(move || {
        let rasters = renderer.render(&pdf_bytes, &options)?;
        if rasters.is_empty() {
            return Err(ParseError::EmptyDocument);
        }
        rasters
            .into_iter()
            .map(|(index, image)| {
                let encoded =
                    encode_png(&image).map_err(|e| ParseError::RasterisationFailed {
                        page: index + 1,
                        detail: format!("PNG encoding failed: {e}"),
                    })?;
                Ok(RenderedPage {
                    index,
                    image: Arc::new(image),
                    encoded,
                })
            })
            .collect()
    })
    .await
    .map_err(|e| ParseError::Internal(format!("Render task panicked: {}", e)))?
}

/// The pdfium-backed renderer.
///
/// Binds to `PDFIUM_LIB_PATH` when set, then to a library next to the
/// working directory, then to the system library.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfiumRenderer;

impl PdfiumRenderer {
    fn bind() -> Result<Pdfium, ParseError> {
        let bindings = match std::env::var("PDFIUM_LIB_PATH") {
            Ok(path) if !path.is_empty() => Pdfium::bind_to_library(&path),
            _ => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
                .or_else(|_| Pdfium::bind_to_system_library()),
        }
        .map_err(|e| ParseError::PdfiumBindingFailed(format!("{:?}", e)))?;
        Ok(Pdfium::new(bindings))
    }
}

impl PageRenderer for PdfiumRenderer {
    fn render(
        &self,
        pdf_bytes: &[u8],
        options: &RenderOptions,
    ) -> Result<Vec<(usize, DynamicImage)>, ParseError> {
        let pdfium = Self::bind()?;
        let password = options.password.as_deref();

        let document = pdfium
            .load_pdf_from_byte_slice(pdf_bytes, password)
            .map_err(|e| {
                let err_str = format!("{:?}", e);
                if err_str.contains("Password") || err_str.contains("password") {
                    if password.is_some() {
                        ParseError::WrongPassword
                    } else {
                        ParseError::PasswordRequired
                    }
                } else {
                    ParseError::CorruptDocument { detail: err_str }
                }
            })?;

        let pages = document.pages();
        let total_pages = pages.len() as usize;
        info!("PDF loaded: {} pages", total_pages);
        if total_pages == 0 {
            return Err(ParseError::EmptyDocument);
        }

        // Scale from PDF points (1/72 in) to the target DPI, then cap both edges.
        let render_config = PdfRenderConfig::new()
            .scale_page_by_factor(options.dpi as f32 / 72.0)
            .set_maximum_width(options.max_rendered_pixels as i32)
            .set_maximum_height(options.max_rendered_pixels as i32);

        let indices = options.pages.to_indices(total_pages);
        let mut results = Vec::with_capacity(indices.len());

        for idx in indices {
            let page = pages
                .get(idx as u16)
                .map_err(|e| ParseError::RasterisationFailed {
                    page: idx + 1,
                    detail: format!("{:?}", e),
                })?;

            let bitmap = page.render_with_config(&render_config).map_err(|e| {
                ParseError::RasterisationFailed {
                    page: idx + 1,
                    detail: format!("{:?}", e),
                }
            })?;

            let image = bitmap.as_image();
            debug!(
                "Rendered page {} → {}x{} px",
                idx + 1,
                image.width(),
                image.height()
            );

            results.push((idx, image));
        }

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    struct Blank(usize);

    impl PageRenderer for Blank {
        fn render(
            &self,
            _pdf_bytes: &[u8],
            options: &RenderOptions,
        ) -> Result<Vec<(usize, DynamicImage)>, ParseError> {
            Ok(options
                .pages
                .to_indices(self.0)
                .into_iter()
                .map(|i| {
                    (
                        i,
                        DynamicImage::ImageRgba8(RgbaImage::from_pixel(
                            8,
                            11,
                            Rgba([255, 255, 255, 255]),
                        )),
                    )
                })
                .collect())
        }
    }

    fn options(pages: PageSelection) -> RenderOptions {
        RenderOptions {
            dpi: 150,
            max_rendered_pixels: 2000,
            password: None,
            pages,
        }
    }

    #[test]
    fn header_check() {
        assert!(check_pdf_header(b"%PDF-1.7\n...").is_ok());
        assert!(check_pdf_header(b"\xef\xbb\xbf%PDF-1.4").is_ok());
        assert!(matches!(
            check_pdf_header(b"PK\x03\x04 zip file"),
            Err(ParseError::CorruptDocument { .. })
        ));
        assert!(matches!(
            check_pdf_header(b""),
            Err(ParseError::CorruptDocument { .. })
        ));
    }

    #[tokio::test]
    async fn renders_and_encodes_selected_pages() {
        let pages = render_pages(
            Arc::new(Blank(3)),
            Arc::from(&b"%PDF-1.7"[..]),
            options(PageSelection::All),
        )
        .await
        .unwrap();
        assert_eq!(pages.len(), 3);
        assert_eq!(pages[2].index, 2);
        assert_eq!((pages[0].encoded.width, pages[0].encoded.height), (8, 11));
    }

    #[tokio::test]
    async fn zero_pages_is_empty_document() {
        let err = render_pages(
            Arc::new(Blank(0)),
            Arc::from(&b"%PDF-1.7"[..]),
            options(PageSelection::All),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ParseError::EmptyDocument));
    }

    #[tokio::test]
    async fn corrupt_bytes_never_reach_the_renderer() {
        let err = render_pages(
            Arc::new(Blank(2)),
            Arc::from(&b"not a pdf"[..]),
            options(PageSelection::All),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ParseError::CorruptDocument { .. }));
    }
}
