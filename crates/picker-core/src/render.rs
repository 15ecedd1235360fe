use doc_model::PageRef;
use pdf_engine::{PdfEngine, PdfEngineError, RenderRequest, RgbImage, ThumbnailSize};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use crate::error::{FailureKind, RenderFailure};

pub use page_merger_cache::CachedThumbnail as RenderedThumbnail;

/// Renders `page` at `scale` and fits it into `target`, keeping the aspect ratio.
///
/// Every failure, including a panic inside the PDF backend, comes back as a
/// [`RenderFailure`] for this page.
pub fn render_thumbnail(
    engine: &dyn PdfEngine,
    page: &PageRef,
    target: ThumbnailSize,
    scale: f32,
) -> Result<RenderedThumbnail, RenderFailure> {
    guarded(page, || engine.render_thumbnail(page.document_path(), page.page_index, scale, target))
}

/// Renders `page` at `scale` without fitting it to a thumbnail box.
pub fn render_preview(
    engine: &dyn PdfEngine,
    page: &PageRef,
    scale: f32,
) -> Result<RenderedThumbnail, RenderFailure> {
    guarded(page, || {
        engine.render_page(page.document_path(), RenderRequest { page_index: page.page_index, scale })
    })
}

fn guarded(
    page: &PageRef,
    render: impl FnOnce() -> Result<RgbImage, PdfEngineError>,
) -> Result<RenderedThumbnail, RenderFailure> {
    match panic::catch_unwind(AssertUnwindSafe(render)) {
        Ok(Ok(image)) => {
            let (width, height) = image.dimensions();
            Ok(RenderedThumbnail::new(page.clone(), image.into_raw(), width, height))
        }
        Ok(Err(err)) => Err(RenderFailure {
            page: page.clone(),
            kind: FailureKind::classify(&err),
            reason: err.to_string(),
        }),
        Err(payload) => Err(RenderFailure {
            page: page.clone(),
            kind: FailureKind::Render,
            reason: format!("renderer panicked: {}", panic_message(payload.as_ref())),
        }),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        *message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic"
    }
}
