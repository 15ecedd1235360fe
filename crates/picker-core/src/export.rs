use doc_model::{PageRef, RowModel};
use pdf_engine::{merge_pages, MergeSummary};
use std::path::Path;

use crate::error::PickerError;

/// Merges every row, top to bottom, into `output`.
pub fn merge_rows(rows: &RowModel, output: &Path) -> Result<MergeSummary, PickerError> {
    merge_list(rows.rows(), output)
}

/// Merges the rows at `indices` into `output`, in row order regardless of
/// the order the indices were given in.
pub fn merge_selection(
    rows: &RowModel,
    indices: &[usize],
    output: &Path,
) -> Result<MergeSummary, PickerError> {
    merge_list(&rows.selected(indices), output)
}

fn merge_list(pages: &[PageRef], output: &Path) -> Result<MergeSummary, PickerError> {
    if pages.is_empty() {
        return Err(PickerError::EmptySelection);
    }

    let summary = merge_pages(
        pages.iter().map(|page| (page.document_path(), page.page_index)),
        output,
    )?;

    tracing::info!(
        output = %output.display(),
        pages = summary.page_count,
        documents = summary.source_documents,
        "merged pages"
    );
    Ok(summary)
}
