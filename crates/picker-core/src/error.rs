use doc_model::{PageRef, SettingsError};
use pdf_engine::PdfEngineError;
use std::path::PathBuf;

use crate::ocr::OcrError;

/// Which stage a page failed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The document could not be opened or the page does not exist.
    DocumentOpen,
    /// The page exists but rasterizing it failed.
    Render,
}

impl FailureKind {
    pub fn classify(err: &PdfEngineError) -> Self {
        if err.is_open_failure() {
            Self::DocumentOpen
        } else {
            Self::Render
        }
    }
}

/// A thumbnail that could not be produced. The row stays blank.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{page}: {reason}")]
pub struct RenderFailure {
    pub page: PageRef,
    pub kind: FailureKind,
    pub reason: String,
}

/// A source document (or an explicit page of it) that contributed no rows.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{}: {reason}", path.display())]
pub struct EnumerationFailure {
    pub path: PathBuf,
    pub page_index: Option<u32>,
    pub reason: String,
}

#[derive(Debug, thiserror::Error)]
pub enum PickerError {
    #[error("no pages selected to merge")]
    EmptySelection,
    #[error("row {0} does not exist")]
    NoSuchRow(usize),
    #[error(transparent)]
    Engine(#[from] PdfEngineError),
    #[error(transparent)]
    Render(#[from] RenderFailure),
    #[error("invalid settings: {0}")]
    Settings(#[from] SettingsError),
    #[error("failed to start worker pool: {0}")]
    WorkerPool(#[source] std::io::Error),
    #[error(transparent)]
    Ocr(#[from] OcrError),
}
