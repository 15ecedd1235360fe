use doc_model::{OcrDocument, PageRef};
use pdf_engine::{merge_pages, PdfEngineError};
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};

#[derive(Debug, thiserror::Error)]
pub enum OcrError {
    #[error("failed to launch OCR command {}: {source}", program.display())]
    Launch {
        program: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("OCR command exited with {status}: {stderr}")]
    Failed { status: ExitStatus, stderr: String },
    #[error("OCR output is not valid JSON: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("OCR output has {count} bounding boxes outside the page")]
    Unusable { count: usize },
    #[error("failed to extract page for OCR: {0}")]
    Prepare(#[source] PdfEngineError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Recognizes text on a single-page document.
pub trait OcrService: Send + Sync {
    fn recognize(&self, document: &Path) -> Result<OcrDocument, OcrError>;
}

/// Runs an external program with the document path as its last argument and
/// reads an [`OcrDocument`] from its stdout as JSON.
#[derive(Debug, Clone)]
pub struct CommandOcrService {
    program: PathBuf,
    args: Vec<OsString>,
}

impl CommandOcrService {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self { program: program.into(), args: Vec::new() }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }
}

impl OcrService for CommandOcrService {
    fn recognize(&self, document: &Path) -> Result<OcrDocument, OcrError> {
        tracing::debug!(program = %self.program.display(), document = %document.display(), "running OCR");

        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(document)
            .output()
            .map_err(|source| OcrError::Launch { program: self.program.clone(), source })?;

        if !output.status.success() {
            return Err(OcrError::Failed {
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
            });
        }

        parse_output(&output.stdout)
    }
}

/// Parses service output, rejecting boxes that fall outside `0.0..=1.0`.
pub fn parse_output(stdout: &[u8]) -> Result<OcrDocument, OcrError> {
    let document: OcrDocument = serde_json::from_slice(stdout)?;
    match document.invalid_boxes() {
        0 => Ok(document),
        count => Err(OcrError::Unusable { count }),
    }
}

/// Extracts `page` into a temporary single-page document and runs `service`
/// on it. The temporary file is removed afterwards.
pub fn ocr_page(service: &dyn OcrService, page: &PageRef) -> Result<OcrDocument, OcrError> {
    let scratch = tempfile::Builder::new().prefix("page-merger-ocr").tempdir()?;
    let single = scratch.path().join("page.pdf");

    merge_pages([(page.document_path(), page.page_index)], &single).map_err(OcrError::Prepare)?;

    let document = service.recognize(&single)?;
    tracing::info!(%page, pages = document.pages.len(), "OCR finished");
    Ok(document)
}
