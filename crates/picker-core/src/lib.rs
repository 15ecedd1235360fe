//! Headless core of the page picker: enumerates source PDFs into rows,
//! renders thumbnails on a worker pool as rows scroll into view, and merges
//! the chosen rows into a new document.

pub mod config;
pub mod enumerate;
pub mod error;
pub mod export;
pub mod ocr;
pub mod pending;
pub mod pipeline;
pub mod populate;
pub mod render;
pub mod viewport;

pub use config::PipelineConfig;
pub use enumerate::{
    discover_pdfs, enumerate_all, expand_inputs, DocumentSource, Enumeration, PageEnumerator,
    PageSelection,
};
pub use error::{EnumerationFailure, FailureKind, PickerError, RenderFailure};
pub use export::{merge_rows, merge_selection};
pub use ocr::{ocr_page, CommandOcrService, OcrError, OcrService};
pub use pending::PendingRequestSet;
pub use pipeline::{LoadMode, PipelineEvent, ThumbnailPipeline, ThumbnailRequest, ThumbnailState};
pub use populate::{BatchReport, IncrementalListPopulator, ListStatus, EMPTY_LIST_MESSAGE};
pub use render::{render_preview, render_thumbnail, RenderedThumbnail};
pub use viewport::{rows_per_viewport, LoadWindow, ListViewport, RowMetrics};
