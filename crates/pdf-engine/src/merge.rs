use crate::{inherited_attribute, load_document, PdfEngineError};
use lopdf::{dictionary, Document, Object, ObjectId};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

const INHERITABLE_KEYS: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeSummary {
    pub page_count: u32,
    pub source_documents: usize,
}

/// Writes a new PDF at `output` containing the given `(document, zero-based page)`
/// pairs in order. A page may appear more than once.
///
/// Each source document is parsed once. Nothing is written when the list is
/// empty or any page cannot be resolved.
pub fn merge_pages<I, P>(pages: I, output: &Path) -> Result<MergeSummary, PdfEngineError>
where
    I: IntoIterator<Item = (P, u32)>,
    P: AsRef<Path>,
{
    let pages: Vec<(PathBuf, u32)> =
        pages.into_iter().map(|(path, page)| (path.as_ref().to_path_buf(), page)).collect();
    if pages.is_empty() {
        return Err(PdfEngineError::NothingToMerge);
    }

    let mut merged = Document::with_version("1.5");
    let pages_id = merged.new_object_id();

    let mut sources: HashMap<PathBuf, BTreeMap<u32, ObjectId>> = HashMap::new();
    let mut placed: HashSet<ObjectId> = HashSet::new();
    let mut kids: Vec<Object> = Vec::with_capacity(pages.len());

    for (path, page_index) in &pages {
        if !sources.contains_key(path) {
            let page_ids = import_document(&mut merged, path)?;
            sources.insert(path.clone(), page_ids);
        }
        let page_ids = &sources[path];
        let source_id = *page_ids.get(page_index).ok_or(PdfEngineError::PageOutOfRange {
            page: *page_index,
            page_count: page_ids.len() as u32,
        })?;

        let page_id = if placed.insert(source_id) {
            source_id
        } else {
            let copy = merged.get_object(source_id)?.clone();
            merged.add_object(copy)
        };
        merged.get_dictionary_mut(page_id)?.set("Parent", pages_id);
        kids.push(page_id.into());
    }

    let page_count = kids.len() as u32;
    merged.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => page_count as i64,
        }),
    );
    let catalog_id = merged.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    merged.trailer.set("Root", catalog_id);

    merged.prune_objects();
    merged.renumber_objects();
    merged.compress();

    if let Some(parent) = output.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    merged.save(output)?;

    tracing::debug!(
        output = %output.display(),
        pages = page_count,
        sources = sources.len(),
        "merged pages"
    );

    Ok(MergeSummary { page_count, source_documents: sources.len() })
}

/// Moves every object of the document at `path` into `merged` and returns its
/// pages keyed by zero-based index.
fn import_document(
    merged: &mut Document,
    path: &Path,
) -> Result<BTreeMap<u32, ObjectId>, PdfEngineError> {
    let mut doc = load_document(path)?;
    doc.renumber_objects_with(merged.max_id + 1);

    let pages = doc.get_pages();
    for page_id in pages.values() {
        flatten_inherited(&mut doc, *page_id);
    }

    merged.max_id = merged.max_id.max(doc.max_id);
    merged.objects.extend(doc.objects);

    Ok(pages.into_iter().map(|(number, id)| (number - 1, id)).collect())
}

/// Copies attributes a page inherits from its ancestors onto the page itself so
/// it keeps them once re-parented.
fn flatten_inherited(doc: &mut Document, page_id: ObjectId) {
    for key in INHERITABLE_KEYS {
        let Ok(page) = doc.get_dictionary(page_id) else {
            return;
        };
        if page.has(key) {
            continue;
        }
        let Some(value) = inherited_attribute(doc, page_id, key).cloned() else {
            continue;
        };
        if let Ok(page) = doc.get_dictionary_mut(page_id) {
            page.set(key, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{write_corrupt_pdf, write_sample_pdf, write_sized_pdf};
    use crate::{LopdfEngine, PageSize, PdfEngine};

    fn widths(path: &Path) -> Vec<f32> {
        let engine = LopdfEngine::new();
        let count = engine.page_count(path).expect("merged output should parse");
        (0..count)
            .map(|index| engine.page_size(path, index).expect("page size").width_pt)
            .collect()
    }

    #[test]
    fn merges_pages_in_row_order_across_documents() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let a = write_sized_pdf(temp.path(), "a.pdf", &[(100.0, 100.0), (200.0, 100.0), (300.0, 100.0)])
            .expect("fixture");
        let b = write_sized_pdf(temp.path(), "b.pdf", &[(111.0, 100.0), (222.0, 100.0)]).expect("fixture");
        let output = temp.path().join("out").join("merged.pdf");

        let summary = merge_pages([(&a, 2), (&b, 0), (&a, 0), (&b, 1)], &output).expect("merge");

        assert_eq!(summary, MergeSummary { page_count: 4, source_documents: 2 });
        assert_eq!(widths(&output), vec![300.0, 111.0, 100.0, 222.0]);
    }

    #[test]
    fn duplicate_pages_are_copied() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let a = write_sized_pdf(temp.path(), "a.pdf", &[(150.0, 100.0), (250.0, 100.0)]).expect("fixture");
        let output = temp.path().join("dup.pdf");

        merge_pages([(&a, 1), (&a, 1), (&a, 0)], &output).expect("merge");

        assert_eq!(widths(&output), vec![250.0, 250.0, 150.0]);
    }

    #[test]
    fn inherited_media_box_survives_merge() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let a = write_sample_pdf(temp.path(), "letter.pdf", 2).expect("fixture");
        let output = temp.path().join("letter-out.pdf");

        merge_pages([(&a, 1)], &output).expect("merge");

        let size = LopdfEngine::new().page_size(&output, 0).expect("size");
        assert_eq!(size, PageSize { width_pt: 612.0, height_pt: 792.0 });
    }

    #[test]
    fn empty_selection_writes_nothing() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let output = temp.path().join("empty.pdf");

        let err = merge_pages(Vec::<(PathBuf, u32)>::new(), &output).expect_err("nothing to merge");

        assert!(matches!(err, PdfEngineError::NothingToMerge));
        assert!(!output.exists());
    }

    #[test]
    fn unreadable_source_aborts_merge() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let good = write_sample_pdf(temp.path(), "good.pdf", 1).expect("fixture");
        let bad = write_corrupt_pdf(temp.path(), "bad.pdf").expect("fixture");
        let output = temp.path().join("partial.pdf");

        let err = merge_pages([(&good, 0), (&bad, 0)], &output).expect_err("corrupt source");

        assert!(err.is_open_failure());
        assert!(!output.exists());
    }

    #[test]
    fn missing_page_is_reported() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let a = write_sample_pdf(temp.path(), "one.pdf", 1).expect("fixture");

        let err = merge_pages([(&a, 3)], &temp.path().join("x.pdf")).expect_err("no page 3");

        assert!(matches!(err, PdfEngineError::PageOutOfRange { page: 3, page_count: 1 }));
    }
}
