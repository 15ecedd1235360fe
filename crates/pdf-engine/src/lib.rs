use image::imageops::{self, FilterType};
use image::{ImageBuffer, Rgb};
use lopdf::{Document, Object, ObjectId};
use std::fs;
use std::path::Path;

#[cfg(any(test, feature = "test-support"))]
pub mod fixtures;
pub mod merge;

pub use merge::{merge_pages, MergeSummary};

pub type RgbImage = ImageBuffer<Rgb<u8>, Vec<u8>>;

/// Oversampling used for list thumbnails.
pub const THUMBNAIL_SCALE: f32 = 0.7;
/// Oversampling used for the full-size page preview.
pub const PREVIEW_SCALE: f32 = 2.0;

const DEFAULT_PAGE_SIZE: PageSize = PageSize { width_pt: 612.0, height_pt: 792.0 };
const MAX_PAGE_TREE_DEPTH: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSize {
    pub width_pt: f32,
    pub height_pt: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderRequest {
    pub page_index: u32,
    pub scale: f32,
}

impl Default for RenderRequest {
    fn default() -> Self {
        Self { page_index: 0, scale: 1.0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThumbnailSize {
    pub width_px: u32,
    pub height_px: u32,
}

impl Default for ThumbnailSize {
    fn default() -> Self {
        Self { width_px: 180, height_px: 240 }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PdfEngineError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("PDF parse error: {0}")]
    Parse(#[from] lopdf::Error),
    #[error("failed to open document: {0}")]
    Open(String),
    #[error("page {page} out of range (page_count={page_count})")]
    PageOutOfRange { page: u32, page_count: u32 },
    #[error("encrypted PDFs are not supported in the default backend")]
    EncryptedUnsupported,
    #[error("no pages to merge")]
    NothingToMerge,
    #[error("backend error: {0}")]
    Backend(String),
}

impl PdfEngineError {
    /// `true` when the document itself could not be opened or the page does
    /// not exist, as opposed to a failure while rasterizing a valid page.
    pub fn is_open_failure(&self) -> bool {
        matches!(
            self,
            Self::Io(_)
                | Self::Parse(_)
                | Self::Open(_)
                | Self::PageOutOfRange { .. }
                | Self::EncryptedUnsupported
        )
    }
}

/// PDF access used by the page picker.
///
/// Every call opens the document by path, so an engine can be shared by all
/// worker threads without holding per-document state.
pub trait PdfEngine: Send + Sync {
    fn page_count(&self, path: &Path) -> Result<u32, PdfEngineError>;

    fn page_size(&self, path: &Path, page_index: u32) -> Result<PageSize, PdfEngineError>;

    /// Rasterizes one page to packed RGB at `request.scale` points-to-pixels.
    fn render_page(&self, path: &Path, request: RenderRequest) -> Result<RgbImage, PdfEngineError>;

    fn render_thumbnail(
        &self,
        path: &Path,
        page_index: u32,
        scale: f32,
        target: ThumbnailSize,
    ) -> Result<RgbImage, PdfEngineError> {
        let page = self.render_page(path, RenderRequest { page_index, scale })?;
        Ok(fit_within(&page, target))
    }
}

/// Largest size with the source aspect ratio that fits inside `target`.
pub fn fit_dimensions(width: u32, height: u32, target: ThumbnailSize) -> (u32, u32) {
    if width == 0 || height == 0 {
        return (target.width_px.max(1), target.height_px.max(1));
    }

    let scale = (target.width_px as f32 / width as f32).min(target.height_px as f32 / height as f32);
    let fitted_width = (width as f32 * scale).round().max(1.0) as u32;
    let fitted_height = (height as f32 * scale).round().max(1.0) as u32;
    (fitted_width.min(target.width_px.max(1)), fitted_height.min(target.height_px.max(1)))
}

pub fn fit_within(image: &RgbImage, target: ThumbnailSize) -> RgbImage {
    let (width, height) = fit_dimensions(image.width(), image.height(), target);
    if (width, height) == image.dimensions() {
        return image.clone();
    }
    imageops::resize(image, width, height, FilterType::Triangle)
}

pub(crate) fn reject_encrypted(bytes: &[u8]) -> Result<(), PdfEngineError> {
    if bytes.windows("/Encrypt".len()).any(|window| window == b"/Encrypt") {
        return Err(PdfEngineError::EncryptedUnsupported);
    }
    Ok(())
}

pub(crate) fn load_document(path: &Path) -> Result<Document, PdfEngineError> {
    let bytes = fs::read(path)?;
    reject_encrypted(&bytes)?;
    Ok(Document::load_mem(&bytes)?)
}

/// Looks `key` up on the page dictionary, then on its ancestors in the page tree.
pub(crate) fn inherited_attribute<'a>(
    doc: &'a Document,
    page_id: ObjectId,
    key: &[u8],
) -> Option<&'a Object> {
    let mut current = page_id;
    for _ in 0..MAX_PAGE_TREE_DEPTH {
        let dict = doc.get_dictionary(current).ok()?;
        if let Ok(value) = dict.get(key) {
            return Some(value);
        }
        current = dict.get(b"Parent").and_then(Object::as_reference).ok()?;
    }
    None
}

fn media_box_size(doc: &Document, page_id: ObjectId) -> Option<PageSize> {
    let object = inherited_attribute(doc, page_id, b"MediaBox")?;
    let (_, object) = doc.dereference(object).ok()?;
    let array = object.as_array().ok()?;
    if array.len() != 4 {
        return None;
    }
    let x0 = array[0].as_float().ok()?;
    let y0 = array[1].as_float().ok()?;
    let x1 = array[2].as_float().ok()?;
    let y1 = array[3].as_float().ok()?;
    Some(PageSize { width_pt: (x1 - x0).abs(), height_pt: (y1 - y0).abs() })
}

/// Engine built on `lopdf`.
///
/// It reads the page tree and page geometry but does not interpret content
/// streams: rendered pages are blank sheets of the right size with a hairline
/// border. Enable the `pdfium` feature for real rasterization.
#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfEngine;

impl LopdfEngine {
    pub fn new() -> Self {
        Self
    }

    fn page_sizes(path: &Path) -> Result<Vec<PageSize>, PdfEngineError> {
        let doc = load_document(path)?;
        Ok(doc
            .get_pages()
            .into_values()
            .map(|page_id| media_box_size(&doc, page_id).unwrap_or(DEFAULT_PAGE_SIZE))
            .collect())
    }
}

impl PdfEngine for LopdfEngine {
    fn page_count(&self, path: &Path) -> Result<u32, PdfEngineError> {
        Ok(load_document(path)?.get_pages().len() as u32)
    }

    fn page_size(&self, path: &Path, page_index: u32) -> Result<PageSize, PdfEngineError> {
        let sizes = Self::page_sizes(path)?;
        sizes.get(page_index as usize).copied().ok_or(PdfEngineError::PageOutOfRange {
            page: page_index,
            page_count: sizes.len() as u32,
        })
    }

    fn render_page(&self, path: &Path, request: RenderRequest) -> Result<RgbImage, PdfEngineError> {
        let page_size = self.page_size(path, request.page_index)?;
        let scale = if request.scale.is_finite() && request.scale > 0.0 { request.scale } else { 1.0 };

        let width = (page_size.width_pt * scale).round().max(1.0) as u32;
        let height = (page_size.height_pt * scale).round().max(1.0) as u32;

        let mut image = RgbImage::from_pixel(width, height, Rgb([255, 255, 255]));

        if width >= 4 && height >= 4 {
            for x in 0..width {
                image.put_pixel(x, 0, Rgb([220, 220, 220]));
                image.put_pixel(x, height - 1, Rgb([220, 220, 220]));
            }
            for y in 0..height {
                image.put_pixel(0, y, Rgb([220, 220, 220]));
                image.put_pixel(width - 1, y, Rgb([220, 220, 220]));
            }
        }

        Ok(image)
    }
}

#[cfg(feature = "pdfium")]
pub mod pdfium_backend {
    use super::*;
    use pdfium_render::prelude::*;

    /// Engine backed by the PDFium shared library.
    pub struct PdfiumEngine {
        pdfium: Pdfium,
    }

    impl PdfiumEngine {
        /// Binds PDFium from the working directory, falling back to the system library.
        pub fn from_system_library() -> Result<Self, PdfEngineError> {
            let bindings =
                Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
                    .or_else(|_| Pdfium::bind_to_system_library())
                    .map_err(|err| {
                        PdfEngineError::Backend(format!("failed to bind pdfium library: {err}"))
                    })?;

            Ok(Self { pdfium: Pdfium::new(bindings) })
        }

        fn open(&self, path: &Path) -> Result<PdfDocument<'_>, PdfEngineError> {
            if !path.exists() {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("{} does not exist", path.display()),
                )
                .into());
            }
            self.pdfium
                .load_pdf_from_file(path, None)
                .map_err(|err| PdfEngineError::Open(err.to_string()))
        }

        fn page<'a>(
            document: &'a PdfDocument<'a>,
            page_index: u32,
        ) -> Result<PdfPage<'a>, PdfEngineError> {
            let page_count = document.pages().len() as u32;
            let out_of_range = PdfEngineError::PageOutOfRange { page: page_index, page_count };
            let index = u16::try_from(page_index).map_err(|_| {
                PdfEngineError::PageOutOfRange { page: page_index, page_count }
            })?;
            document.pages().get(index).map_err(|_| out_of_range)
        }
    }

    impl PdfEngine for PdfiumEngine {
        fn page_count(&self, path: &Path) -> Result<u32, PdfEngineError> {
            Ok(self.open(path)?.pages().len() as u32)
        }

        fn page_size(&self, path: &Path, page_index: u32) -> Result<PageSize, PdfEngineError> {
            let document = self.open(path)?;
            let page = Self::page(&document, page_index)?;
            Ok(PageSize { width_pt: page.width().value, height_pt: page.height().value })
        }

        fn render_page(
            &self,
            path: &Path,
            request: RenderRequest,
        ) -> Result<RgbImage, PdfEngineError> {
            let document = self.open(path)?;
            let page = Self::page(&document, request.page_index)?;
            let scale =
                if request.scale.is_finite() && request.scale > 0.0 { request.scale } else { 1.0 };

            let width = (page.width().value * scale).round().max(1.0) as i32;
            let height = (page.height().value * scale).round().max(1.0) as i32;

            let config =
                PdfRenderConfig::new().set_target_width(width).set_target_height(height);
            let bitmap = page
                .render_with_config(&config)
                .map_err(|err| PdfEngineError::Backend(err.to_string()))?;

            let bitmap_width = bitmap.width() as u32;
            let bitmap_height = bitmap.height() as u32;
            let rgb: Vec<u8> = bitmap
                .as_rgba_bytes()
                .chunks_exact(4)
                .flat_map(|pixel| [pixel[0], pixel[1], pixel[2]])
                .collect();

            RgbImage::from_raw(bitmap_width, bitmap_height, rgb).ok_or_else(|| {
                PdfEngineError::Backend("bitmap size does not match its dimensions".to_owned())
            })
        }
    }
}

pub fn default_engine() -> LopdfEngine {
    LopdfEngine::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{write_sample_pdf, write_sized_pdf};

    #[test]
    fn reads_page_count() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let path = write_sample_pdf(temp.path(), "three.pdf", 3).expect("fixture");

        assert_eq!(LopdfEngine::new().page_count(&path).expect("count should succeed"), 3);
    }

    #[test]
    fn page_size_is_inherited_from_page_tree() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let path = write_sample_pdf(temp.path(), "letter.pdf", 1).expect("fixture");

        let size = LopdfEngine::new().page_size(&path, 0).expect("size");
        assert_eq!(size, PageSize { width_pt: 612.0, height_pt: 792.0 });
    }

    #[test]
    fn render_thumbnail_keeps_aspect_ratio() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let path = write_sized_pdf(temp.path(), "wide.pdf", &[(400.0, 200.0)]).expect("fixture");

        let image = LopdfEngine::new()
            .render_thumbnail(&path, 0, THUMBNAIL_SCALE, ThumbnailSize { width_px: 180, height_px: 240 })
            .expect("thumbnail should render");

        assert_eq!(image.dimensions(), (180, 90));
    }

    #[test]
    fn render_page_applies_scale() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let path = write_sized_pdf(temp.path(), "a.pdf", &[(100.0, 50.0)]).expect("fixture");

        let image = LopdfEngine::new()
            .render_page(&path, RenderRequest { page_index: 0, scale: PREVIEW_SCALE })
            .expect("render");
        assert_eq!(image.dimensions(), (200, 100));
        assert_eq!(image.get_pixel(100, 50), &Rgb([255, 255, 255]));
    }

    #[test]
    fn out_of_range_page_is_an_open_failure() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let path = write_sample_pdf(temp.path(), "one.pdf", 1).expect("fixture");

        let err = LopdfEngine::new()
            .render_page(&path, RenderRequest { page_index: 5, scale: 1.0 })
            .expect_err("page 5 does not exist");

        assert!(matches!(err, PdfEngineError::PageOutOfRange { page: 5, page_count: 1 }));
        assert!(err.is_open_failure());
    }

    #[test]
    fn corrupt_file_fails_to_open() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let path = temp.path().join("broken.pdf");
        fs::write(&path, b"not a pdf at all").expect("write");

        let err = LopdfEngine::new().page_count(&path).expect_err("should not parse");
        assert!(err.is_open_failure());
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = LopdfEngine::new()
            .page_count(Path::new("/definitely/not/here.pdf"))
            .expect_err("missing file");
        assert!(matches!(err, PdfEngineError::Io(_)));
    }

    #[test]
    fn encrypted_marker_is_rejected() {
        assert!(matches!(
            reject_encrypted(b"%PDF-1.7 trailer << /Encrypt 5 0 R >>"),
            Err(PdfEngineError::EncryptedUnsupported)
        ));
    }

    #[test]
    fn fit_dimensions_handles_tall_and_wide_pages() {
        let target = ThumbnailSize { width_px: 180, height_px: 240 };
        assert_eq!(fit_dimensions(428, 554, target), (180, 233));
        assert_eq!(fit_dimensions(554, 428, target), (180, 139));
        assert_eq!(fit_dimensions(90, 120, target), (180, 240));
    }
}
