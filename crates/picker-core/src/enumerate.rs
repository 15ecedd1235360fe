use doc_model::PageRef;
use pdf_engine::PdfEngine;
use std::fs;
use std::io;
use std::ops::Range;
use std::path::{Path, PathBuf};

use crate::error::EnumerationFailure;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageSelection {
    All,
    /// One pre-resolved zero-based page.
    Single(u32),
}

/// A document to expand into rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentSource {
    pub path: PathBuf,
    pub pages: PageSelection,
}

impl DocumentSource {
    pub fn all(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), pages: PageSelection::All }
    }

    pub fn single(path: impl Into<PathBuf>, page_index: u32) -> Self {
        Self { path: path.into(), pages: PageSelection::Single(page_index) }
    }
}

impl From<PathBuf> for DocumentSource {
    fn from(path: PathBuf) -> Self {
        Self::all(path)
    }
}

/// Lazily expands documents into pages, in input order then page order.
///
/// A document is opened only when the iterator reaches it. Documents that
/// fail to open contribute no pages and are collected in
/// [`PageEnumerator::failures`].
pub struct PageEnumerator<'a> {
    engine: &'a dyn PdfEngine,
    sources: std::vec::IntoIter<DocumentSource>,
    current: Option<(PathBuf, Range<u32>)>,
    failures: Vec<EnumerationFailure>,
}

impl<'a> PageEnumerator<'a> {
    pub fn new(engine: &'a dyn PdfEngine, sources: impl IntoIterator<Item = DocumentSource>) -> Self {
        Self {
            engine,
            sources: sources.into_iter().collect::<Vec<_>>().into_iter(),
            current: None,
            failures: Vec::new(),
        }
    }

    pub fn failures(&self) -> &[EnumerationFailure] {
        &self.failures
    }

    pub fn into_failures(self) -> Vec<EnumerationFailure> {
        self.failures
    }

    fn open(&self, source: &DocumentSource) -> Result<Range<u32>, EnumerationFailure> {
        let failure = |page_index: Option<u32>, reason: String| EnumerationFailure {
            path: source.path.clone(),
            page_index,
            reason,
        };

        let page_count = self
            .engine
            .page_count(&source.path)
            .map_err(|err| failure(None, err.to_string()))?;

        match source.pages {
            PageSelection::All => Ok(0..page_count),
            PageSelection::Single(page) if page < page_count => Ok(page..page + 1),
            PageSelection::Single(page) => Err(failure(
                Some(page),
                format!("page {page} out of range (page_count={page_count})"),
            )),
        }
    }
}

impl Iterator for PageEnumerator<'_> {
    type Item = PageRef;

    fn next(&mut self) -> Option<PageRef> {
        loop {
            if let Some((path, pages)) = &mut self.current {
                if let Some(page_index) = pages.next() {
                    return Some(PageRef::new(path.clone(), page_index));
                }
                self.current = None;
            }

            let source = self.sources.next()?;
            match self.open(&source) {
                Ok(pages) => self.current = Some((source.path, pages)),
                Err(failure) => {
                    tracing::warn!(path = %failure.path.display(), reason = %failure.reason, "skipping document");
                    self.failures.push(failure);
                }
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Enumeration {
    pub pages: Vec<PageRef>,
    pub failures: Vec<EnumerationFailure>,
}

/// Runs a [`PageEnumerator`] to completion.
pub fn enumerate_all(
    engine: &dyn PdfEngine,
    sources: impl IntoIterator<Item = DocumentSource>,
) -> Enumeration {
    let mut enumerator = PageEnumerator::new(engine, sources);
    let pages: Vec<PageRef> = enumerator.by_ref().collect();
    Enumeration { pages, failures: enumerator.into_failures() }
}

/// PDF files directly inside `dir`, sorted by file name. The extension match
/// ignores case.
pub fn discover_pdfs(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let is_pdf = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));
        if is_pdf && entry.file_type()?.is_file() {
            found.push(path);
        }
    }
    found.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(found)
}

/// Expands command-line style inputs: directories become their PDFs, files
/// are taken as given.
pub fn expand_inputs(paths: &[PathBuf]) -> io::Result<Vec<DocumentSource>> {
    let mut sources = Vec::new();
    for path in paths {
        if path.is_dir() {
            sources.extend(discover_pdfs(path)?.into_iter().map(DocumentSource::all));
        } else {
            sources.push(DocumentSource::all(path.clone()));
        }
    }
    Ok(sources)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pdf_engine::fixtures::{write_corrupt_pdf, write_sample_pdf};
    use pdf_engine::LopdfEngine;

    #[test]
    fn pages_follow_document_then_page_order() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let a = write_sample_pdf(temp.path(), "a.pdf", 3).expect("fixture");
        let b = write_sample_pdf(temp.path(), "b.pdf", 2).expect("fixture");

        let pages: Vec<PageRef> =
            PageEnumerator::new(&LopdfEngine::new(), [DocumentSource::all(&a), DocumentSource::all(&b)])
                .collect();

        assert_eq!(
            pages,
            vec![
                PageRef::new(&a, 0),
                PageRef::new(&a, 1),
                PageRef::new(&a, 2),
                PageRef::new(&b, 0),
                PageRef::new(&b, 1),
            ]
        );
    }

    #[test]
    fn duplicate_documents_are_enumerated_twice() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let a = write_sample_pdf(temp.path(), "a.pdf", 2).expect("fixture");

        let result = enumerate_all(&LopdfEngine::new(), [DocumentSource::all(&a), DocumentSource::all(&a)]);

        assert_eq!(result.pages.len(), 4);
        assert_eq!(result.pages[2], PageRef::new(&a, 0));
    }

    #[test]
    fn broken_document_is_skipped() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let a = write_sample_pdf(temp.path(), "a.pdf", 1).expect("fixture");
        let bad = write_corrupt_pdf(temp.path(), "bad.pdf").expect("fixture");
        let b = write_sample_pdf(temp.path(), "b.pdf", 1).expect("fixture");

        let result = enumerate_all(
            &LopdfEngine::new(),
            [DocumentSource::all(&a), DocumentSource::all(&bad), DocumentSource::all(&b)],
        );

        assert_eq!(result.pages, vec![PageRef::new(&a, 0), PageRef::new(&b, 0)]);
        assert_eq!(result.failures.len(), 1);
        assert_eq!(result.failures[0].path, bad);
        assert_eq!(result.failures[0].page_index, None);
    }

    #[test]
    fn explicit_page_is_checked_against_page_count() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let a = write_sample_pdf(temp.path(), "a.pdf", 2).expect("fixture");

        let result = enumerate_all(
            &LopdfEngine::new(),
            [DocumentSource::single(&a, 1), DocumentSource::single(&a, 9)],
        );

        assert_eq!(result.pages, vec![PageRef::new(&a, 1)]);
        assert_eq!(result.failures.len(), 1);
        assert_eq!(result.failures[0].page_index, Some(9));
    }

    #[test]
    fn enumeration_is_lazy() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let a = write_sample_pdf(temp.path(), "a.pdf", 2).expect("fixture");
        let missing = temp.path().join("missing.pdf");

        let engine = LopdfEngine::new();
        let mut enumerator =
            PageEnumerator::new(&engine, [DocumentSource::all(&a), DocumentSource::all(&missing)]);

        assert_eq!(enumerator.next(), Some(PageRef::new(&a, 0)));
        assert!(enumerator.failures().is_empty(), "second document not opened yet");

        assert_eq!(enumerator.next(), Some(PageRef::new(&a, 1)));
        assert_eq!(enumerator.next(), None);
        assert_eq!(enumerator.failures().len(), 1);
    }

    #[test]
    fn discover_sorts_and_ignores_extension_case() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        for name in ["b.pdf", "A.PDF", "c.txt", "d.Pdf"] {
            fs::write(temp.path().join(name), b"x").expect("write");
        }
        fs::create_dir(temp.path().join("nested.pdf")).expect("mkdir");

        let names: Vec<String> = discover_pdfs(temp.path())
            .expect("listing")
            .iter()
            .map(|path| path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();

        assert_eq!(names, vec!["A.PDF", "b.pdf", "d.Pdf"]);
    }

    #[test]
    fn expand_inputs_mixes_files_and_folders() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let folder = temp.path().join("scans");
        fs::create_dir(&folder).expect("mkdir");
        let inner = write_sample_pdf(&folder, "x.pdf", 1).expect("fixture");
        let outer = write_sample_pdf(temp.path(), "y.pdf", 1).expect("fixture");

        let sources = expand_inputs(&[outer.clone(), folder]).expect("expand");

        assert_eq!(sources, vec![DocumentSource::all(outer), DocumentSource::all(inner)]);
    }
}
