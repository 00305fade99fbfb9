//! Rasterisation: normalise any accepted [`Document`] into a [`RasterPage`].
//!
//! Raster images are decoded at their natural size. Paginated documents are
//! rendered through pdfium, first page only, at a fixed magnification
//! (`AnalysisConfig::pdf_scale`, 6× by default) so fine print survives into
//! the OCR and diff stages. Later pages are never touched.
//!
//! ## Why a `PageRenderer` trait?
//!
//! pdfium is a native library bound at runtime. Keeping it behind a small
//! trait lets the rest of the pipeline (and its tests) run without it, and
//! lets callers plug in a different PDF backend.
//!
//! ## Why spawn_blocking?
//!
//! pdfium rendering and image decoding are CPU-bound and proportional to page
//! area. [`rasterize_async`] moves the work onto tokio's blocking pool so the
//! cooperative executor keeps serving other requests meanwhile.

use crate::config::AnalysisConfig;
use crate::document::{Document, DocumentFormat};
use crate::error::LabelScanError;
use image::{DynamicImage, ImageError, RgbaImage};
use pdfium_render::prelude::*;
use std::sync::Arc;
use tracing::{debug, info};

/// A rasterised page: an RGBA pixel buffer plus a reference to its source.
///
/// Immutable once produced. Slots in [`crate::session::Session`] hold these
/// behind `Arc`, so replacing a slot never mutates a page someone else is
/// still reading.
#[derive(Debug, Clone)]
pub struct RasterPage {
    image: RgbaImage,
    source: SourceRef,
}

/// Where a [`RasterPage`] came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRef {
    pub name: String,
    pub mime_type: String,
    pub format: DocumentFormat,
}

impl RasterPage {
    /// Wrap an already-decoded image.
    pub fn new(image: RgbaImage, source: SourceRef) -> Self {
        Self { image, source }
    }

    /// Build a page from raw RGBA bytes.
    ///
    /// Fails unless `pixels.len() == width * height * 4`.
    pub fn from_rgba(
        width: u32,
        height: u32,
        pixels: Vec<u8>,
        source: SourceRef,
    ) -> Result<Self, LabelScanError> {
        let expected = width as usize * height as usize * 4;
        let actual = pixels.len();
        let image = RgbaImage::from_raw(width, height, pixels).ok_or_else(|| {
            LabelScanError::Internal(format!(
                "pixel buffer holds {actual} bytes, {width}x{height} RGBA needs {expected}"
            ))
        })?;
        Ok(Self { image, source })
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Raw RGBA bytes, row-major, 4 bytes per pixel.
    pub fn pixels(&self) -> &[u8] {
        self.image.as_raw()
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn source(&self) -> &SourceRef {
        &self.source
    }
}

/// Renders one page of a paginated document to pixels.
pub trait PageRenderer: Send + Sync {
    /// Render page `page_index` (0-based) magnified by `scale`.
    fn render_page(
        &self,
        bytes: &[u8],
        page_index: usize,
        scale: f32,
    ) -> Result<DynamicImage, LabelScanError>;

    /// Extract the text layer of every page, pages joined by a space.
    fn extract_text(&self, bytes: &[u8]) -> Result<String, LabelScanError>;
}

/// [`PageRenderer`] backed by pdfium-render.
#[derive(Debug, Clone)]
pub struct PdfiumRenderer {
    password: Option<String>,
    max_pixels: u32,
}

impl PdfiumRenderer {
    pub fn new(password: Option<String>, max_pixels: u32) -> Self {
        Self {
            password,
            max_pixels,
        }
    }

    pub fn from_config(config: &AnalysisConfig) -> Self {
        Self::new(config.password.clone(), config.max_rendered_pixels)
    }

    fn load<'a>(&self, pdfium: &'a Pdfium, bytes: &'a [u8]) -> Result<PdfDocument<'a>, LabelScanError> {
        let password = self.password.as_deref();
        pdfium.load_pdf_from_byte_slice(bytes, password).map_err(|e| {
            let err_str = format!("{:?}", e);
            if err_str.contains("Password") || err_str.contains("password") {
                if password.is_some() {
                    LabelScanError::WrongPassword
                } else {
                    LabelScanError::PasswordRequired
                }
            } else {
                LabelScanError::CorruptDocument { detail: err_str }
            }
        })
    }
}

impl PageRenderer for PdfiumRenderer {
    fn render_page(
        &self,
        bytes: &[u8],
        page_index: usize,
        scale: f32,
    ) -> Result<DynamicImage, LabelScanError> {
        let pdfium = bind_pdfium()?;
        let document = self.load(&pdfium, bytes)?;

        let pages = document.pages();
        let total_pages = pages.len() as usize;
        debug!("PDF loaded: {} pages", total_pages);
        if page_index >= total_pages {
            return Err(LabelScanError::RasterisationFailed {
                detail: format!(
                    "page {} requested, document has {} pages",
                    page_index + 1,
                    total_pages
                ),
            });
        }

        let page = pages
            .get(page_index as u16)
            .map_err(|e| LabelScanError::RasterisationFailed {
                detail: format!("{:?}", e),
            })?;

        let render_config = PdfRenderConfig::new()
            .scale_page_by_factor(scale)
            .set_maximum_width(self.max_pixels as i32)
            .set_maximum_height(self.max_pixels as i32);

        let bitmap = page
            .render_with_config(&render_config)
            .map_err(|e| LabelScanError::RasterisationFailed {
                detail: format!("{:?}", e),
            })?;

        Ok(bitmap.as_image())
    }

    fn extract_text(&self, bytes: &[u8]) -> Result<String, LabelScanError> {
        let pdfium = bind_pdfium()?;
        let document = self.load(&pdfium, bytes)?;

        let mut parts = Vec::new();
        for page in document.pages().iter() {
            let text = page
                .text()
                .map_err(|e| LabelScanError::CorruptDocument {
                    detail: format!("text layer unreadable: {:?}", e),
                })?;
            parts.push(text.all());
        }
        Ok(parts.join(" ").trim().to_string())
    }
}

/// Bind pdfium from `PDFIUM_LIB_PATH`, the working directory, or the system.
fn bind_pdfium() -> Result<Pdfium, LabelScanError> {
    let bindings = match std::env::var("PDFIUM_LIB_PATH") {
        Ok(dir) if !dir.is_empty() => {
            Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(&dir))
        }
        _ => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library()),
    }
    .map_err(|e| LabelScanError::PdfiumBindingFailed(format!("{:?}", e)))?;

    Ok(Pdfium::new(bindings))
}

/// Turns documents into raster pages.
#[derive(Clone)]
pub struct Rasterizer {
    renderer: Arc<dyn PageRenderer>,
    pdf_scale: f32,
}

impl Rasterizer {
    pub fn new(renderer: Arc<dyn PageRenderer>, pdf_scale: f32) -> Self {
        Self {
            renderer,
            pdf_scale,
        }
    }

    /// A rasteriser using pdfium and the config's scale, password and pixel cap.
    pub fn from_config(config: &AnalysisConfig) -> Self {
        Self::new(
            Arc::new(PdfiumRenderer::from_config(config)),
            config.pdf_scale,
        )
    }

    pub fn renderer(&self) -> &Arc<dyn PageRenderer> {
        &self.renderer
    }

    /// Rasterise a document. Pure: the document is not modified.
    pub fn rasterize(&self, document: &Document) -> Result<RasterPage, LabelScanError> {
        let source = SourceRef {
            name: document.name().to_string(),
            mime_type: document.mime_type().to_string(),
            format: document.format(),
        };

        let image = match document.format() {
            DocumentFormat::RasterImage => decode_image(document)?,
            DocumentFormat::PaginatedDocument => self
                .renderer
                .render_page(document.bytes(), 0, self.pdf_scale)?
                .to_rgba8(),
        };

        info!(
            "Rasterised '{}' → {}x{} px",
            source.name,
            image.width(),
            image.height()
        );
        Ok(RasterPage::new(image, source))
    }
}

fn decode_image(document: &Document) -> Result<RgbaImage, LabelScanError> {
    image::load_from_memory(document.bytes())
        .map(|img| img.to_rgba8())
        .map_err(|e| match e {
            ImageError::Unsupported(u) => LabelScanError::UnsupportedFormat {
                mime_type: document.mime_type().to_string(),
                detail: u.to_string(),
            },
            other => LabelScanError::CorruptDocument {
                detail: format!("'{}': {}", document.name(), other),
            },
        })
}

/// Rasterise with the pdfium backend configured from `config`.
pub fn rasterize(document: &Document, config: &AnalysisConfig) -> Result<RasterPage, LabelScanError> {
    Rasterizer::from_config(config).rasterize(document)
}

/// Rasterise on tokio's blocking pool.
pub async fn rasterize_async(
    rasterizer: &Rasterizer,
    document: &Document,
) -> Result<RasterPage, LabelScanError> {
    let rasterizer = rasterizer.clone();
    let document = document.clone();
    tokio::task::spawn_blocking(move || rasterizer.rasterize(&document))
        .await
        .map_err(|e| LabelScanError::Internal(format!("Render task panicked: {}", e)))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgba};
    use std::io::Cursor;
    use std::sync::Mutex;

    /// A fake three-page document: page N is filled with gray level N * 60.
    struct FakeRenderer {
        requested: Mutex<Vec<(usize, f32)>>,
    }

    impl PageRenderer for FakeRenderer {
        fn render_page(
            &self,
            _bytes: &[u8],
            page_index: usize,
            scale: f32,
        ) -> Result<DynamicImage, LabelScanError> {
            self.requested.lock().unwrap().push((page_index, scale));
            let level = ((page_index + 1) * 60) as u8;
            Ok(DynamicImage::ImageRgba8(RgbaImage::from_pixel(
                (10.0 * scale) as u32,
                (14.0 * scale) as u32,
                Rgba([level, level, level, 255]),
            )))
        }

        fn extract_text(&self, _bytes: &[u8]) -> Result<String, LabelScanError> {
            Ok("page one page two page three".into())
        }
    }

    fn png_doc(w: u32, h: u32) -> Document {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(w, h, Rgba([9, 8, 7, 255])));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        Document::new("label.png", buf, "image/png").unwrap()
    }

    #[test]
    fn raster_image_keeps_natural_size() {
        let fake = Arc::new(FakeRenderer {
            requested: Mutex::new(Vec::new()),
        });
        let r = Rasterizer::new(fake.clone(), 6.0);
        let page = r.rasterize(&png_doc(37, 21)).unwrap();

        assert_eq!((page.width(), page.height()), (37, 21));
        assert_eq!(page.pixels().len(), 37 * 21 * 4);
        assert_eq!(page.source().format, DocumentFormat::RasterImage);
        assert!(fake.requested.lock().unwrap().is_empty());
    }

    #[test]
    fn paginated_document_renders_first_page_only() {
        let fake = Arc::new(FakeRenderer {
            requested: Mutex::new(Vec::new()),
        });
        let r = Rasterizer::new(fake.clone(), 6.0);
        let doc = Document::new("three.pdf", b"%PDF-1.7".to_vec(), "application/pdf").unwrap();

        let page = r.rasterize(&doc).unwrap();

        assert_eq!(*fake.requested.lock().unwrap(), vec![(0, 6.0)]);
        assert_eq!((page.width(), page.height()), (60, 84));
        assert!(page.image().pixels().all(|p| p.0 == [60, 60, 60, 255]));
    }

    #[test]
    fn corrupt_png_is_reported() {
        let fake = Arc::new(FakeRenderer {
            requested: Mutex::new(Vec::new()),
        });
        let r = Rasterizer::new(fake, 6.0);
        let mut bytes = b"\x89PNG\r\n\x1a\n".to_vec();
        bytes.extend_from_slice(b"garbage");
        let doc = Document::new("bad.png", bytes, "image/png").unwrap();

        let err = r.rasterize(&doc).unwrap_err();
        assert!(
            matches!(
                err,
                LabelScanError::CorruptDocument { .. } | LabelScanError::UnsupportedFormat { .. }
            ),
            "got {err:?}"
        );
    }

    #[test]
    fn from_rgba_validates_length() {
        let source = SourceRef {
            name: "raw".into(),
            mime_type: "image/png".into(),
            format: DocumentFormat::RasterImage,
        };
        assert!(RasterPage::from_rgba(2, 2, vec![0; 16], source.clone()).is_ok());
        assert!(RasterPage::from_rgba(2, 2, vec![0; 15], source).is_err());
    }

    #[tokio::test]
    async fn async_rasterize_matches_sync() {
        let fake = Arc::new(FakeRenderer {
            requested: Mutex::new(Vec::new()),
        });
        let r = Rasterizer::new(fake, 2.0);
        let doc = png_doc(5, 5);
        let a = rasterize_async(&r, &doc).await.unwrap();
        let b = r.rasterize(&doc).unwrap();
        assert_eq!(a.pixels(), b.pixels());
    }
}
