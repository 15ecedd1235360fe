use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// One page of one source document.
///
/// Serialized as `{"pdf_path": ..., "page_num": ...}` so the session file
/// stays readable by hand.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PageRef {
    #[serde(rename = "pdf_path")]
    pub document_path: PathBuf,
    #[serde(rename = "page_num")]
    pub page_index: u32,
}

impl PageRef {
    pub fn new(document_path: impl Into<PathBuf>, page_index: u32) -> Self {
        Self { document_path: document_path.into(), page_index }
    }

    pub fn document_path(&self) -> &Path {
        &self.document_path
    }

    /// File name plus 1-based page number, as shown next to a thumbnail.
    pub fn label(&self) -> String {
        let name = self
            .document_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.document_path.display().to_string());
        format!("{name} p.{}", self.page_index + 1)
    }
}

impl fmt::Display for PageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.document_path.display(), self.page_index)
    }
}

/// Persisted picker state. `pages` order is the authoritative row order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    #[serde(default)]
    pub pages: Vec<PageRef>,
    #[serde(default)]
    pub excluded: Vec<PageRef>,
    /// Selected row indices into `pages`.
    #[serde(default)]
    pub selected: Vec<usize>,
}

impl SessionState {
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty() && self.excluded.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertPosition {
    Above,
    Below,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowAction {
    MoveUp { index: usize },
    MoveDown { index: usize },
    Insert { index: usize, position: InsertPosition, pages: Vec<PageRef> },
    Replace { index: usize, page: PageRef },
    Exclude { indices: Vec<usize> },
    Clear,
}

/// Ordered rows of the picker list plus the pages the user deleted.
///
/// The selection is kept sorted and follows its rows through moves,
/// inserts and exclusions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowModel {
    rows: Vec<PageRef>,
    excluded: Vec<PageRef>,
    selection: Vec<usize>,
}

impl RowModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Out-of-range selected indices are dropped.
    pub fn from_session(session: SessionState) -> Self {
        let mut model = Self { rows: session.pages, excluded: session.excluded, selection: Vec::new() };
        model.set_selection(&session.selected);
        model
    }

    pub fn to_session(&self) -> SessionState {
        SessionState {
            pages: self.rows.clone(),
            excluded: self.excluded.clone(),
            selected: self.selection.clone(),
        }
    }

    pub fn selection(&self) -> &[usize] {
        &self.selection
    }

    /// Replaces the selection, ignoring indices past the last row.
    pub fn set_selection(&mut self, indices: &[usize]) {
        let len = self.rows.len();
        self.selection = indices.iter().copied().filter(|index| *index < len).collect();
        self.selection.sort_unstable();
        self.selection.dedup();
    }

    /// Pages of the selected rows, in row order.
    pub fn selected_pages(&self) -> Vec<PageRef> {
        self.selected(&self.selection)
    }

    pub fn rows(&self) -> &[PageRef] {
        &self.rows
    }

    pub fn excluded(&self) -> &[PageRef] {
        &self.excluded
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&PageRef> {
        self.rows.get(index)
    }

    pub fn contains(&self, page: &PageRef) -> bool {
        self.rows.iter().any(|row| row == page)
    }

    /// Every row index currently holding `page`; the same page may be listed twice.
    pub fn rows_of(&self, page: &PageRef) -> Vec<usize> {
        self.rows
            .iter()
            .enumerate()
            .filter(|(_, row)| *row == page)
            .map(|(index, _)| index)
            .collect()
    }

    pub fn push(&mut self, page: PageRef) {
        self.rows.push(page);
    }

    pub fn extend(&mut self, pages: impl IntoIterator<Item = PageRef>) {
        self.rows.extend(pages);
    }

    /// Moves one row by `delta` places. Returns `false` when the target is out of range.
    pub fn move_row(&mut self, index: usize, delta: isize) -> bool {
        let Some(target) = index.checked_add_signed(delta) else {
            return false;
        };
        if index >= self.rows.len() || target >= self.rows.len() || target == index {
            return false;
        }

        let page = self.rows.remove(index);
        self.rows.insert(target, page);

        for selected in &mut self.selection {
            if *selected == index {
                *selected = target;
            } else if index < target && (index + 1..=target).contains(&*selected) {
                *selected -= 1;
            } else if target < index && (target..index).contains(&*selected) {
                *selected += 1;
            }
        }
        self.selection.sort_unstable();
        true
    }

    /// Inserts `pages` before row `index`; `index == len()` appends.
    pub fn insert_pages(&mut self, index: usize, pages: Vec<PageRef>) -> bool {
        if index > self.rows.len() {
            return false;
        }
        let count = pages.len();
        self.rows.splice(index..index, pages);
        for selected in &mut self.selection {
            if *selected >= index {
                *selected += count;
            }
        }
        true
    }

    pub fn insert(&mut self, index: usize, page: PageRef) -> bool {
        self.insert_pages(index, vec![page])
    }

    pub fn replace(&mut self, index: usize, page: PageRef) -> Option<PageRef> {
        let slot = self.rows.get_mut(index)?;
        Some(std::mem::replace(slot, page))
    }

    /// Removes the selected rows, recording them as excluded in selection order.
    pub fn exclude(&mut self, indices: &[usize]) -> Vec<PageRef> {
        let mut removed = Vec::new();
        for &index in indices {
            if let Some(page) = self.rows.get(index) {
                if !removed.iter().any(|(i, _)| *i == index) {
                    removed.push((index, page.clone()));
                }
            }
        }

        let mut doomed: Vec<usize> = removed.iter().map(|(index, _)| *index).collect();
        doomed.sort_unstable_by(|a, b| b.cmp(a));
        for &index in &doomed {
            self.rows.remove(index);
        }
        self.selection.retain(|selected| !doomed.contains(selected));
        for selected in &mut self.selection {
            let shift = doomed.iter().filter(|index| **index < *selected).count();
            *selected -= shift;
        }

        let pages: Vec<PageRef> = removed.into_iter().map(|(_, page)| page).collect();
        self.excluded.extend(pages.iter().cloned());
        pages
    }

    /// Pages at the given indices, in row order. Out-of-range indices are ignored.
    pub fn selected(&self, indices: &[usize]) -> Vec<PageRef> {
        let mut sorted: Vec<usize> = indices.iter().copied().filter(|i| *i < self.rows.len()).collect();
        sorted.sort_unstable();
        sorted.dedup();
        sorted.into_iter().map(|index| self.rows[index].clone()).collect()
    }

    pub fn clear(&mut self) {
        self.rows.clear();
        self.excluded.clear();
        self.selection.clear();
    }
}

/// Applies one editing action. Returns `true` when the row model changed.
pub fn apply_row_action(model: &mut RowModel, action: RowAction) -> bool {
    match action {
        RowAction::MoveUp { index } => model.move_row(index, -1),
        RowAction::MoveDown { index } => model.move_row(index, 1),
        RowAction::Insert { index, position, pages } => {
            if pages.is_empty() || (index >= model.len() && !model.is_empty()) {
                return false;
            }
            let at = match position {
                InsertPosition::Above => index.min(model.len()),
                InsertPosition::Below => (index + 1).min(model.len()),
            };
            model.insert_pages(at, pages)
        }
        RowAction::Replace { index, page } => model.replace(index, page).is_some(),
        RowAction::Exclude { indices } => !model.exclude(&indices).is_empty(),
        RowAction::Clear => {
            let changed = !model.rows.is_empty() || !model.excluded.is_empty();
            model.clear();
            changed
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SettingsError {
    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },
    #[error("{field} must be a positive finite number")]
    InvalidScale { field: &'static str },
}

/// User-tunable pipeline settings, persisted as `settings.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub thumb_width: u32,
    pub thumb_height: u32,
    pub batch_size: usize,
    pub prefetch_multiplier: usize,
    pub thumbnail_scale: f32,
    pub preview_scale: f32,
    /// `0` picks half of the available cores.
    pub worker_threads: usize,
    /// `0` disables the cache budget.
    pub cache_budget_mb: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            thumb_width: 180,
            thumb_height: 240,
            batch_size: 10,
            prefetch_multiplier: 2,
            thumbnail_scale: 0.7,
            preview_scale: 2.0,
            worker_threads: 0,
            cache_budget_mb: 256,
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.thumb_width == 0 {
            return Err(SettingsError::Zero { field: "thumb_width" });
        }
        if self.thumb_height == 0 {
            return Err(SettingsError::Zero { field: "thumb_height" });
        }
        if self.batch_size == 0 {
            return Err(SettingsError::Zero { field: "batch_size" });
        }
        if !(self.thumbnail_scale.is_finite() && self.thumbnail_scale > 0.0) {
            return Err(SettingsError::InvalidScale { field: "thumbnail_scale" });
        }
        if !(self.preview_scale.is_finite() && self.preview_scale > 0.0) {
            return Err(SettingsError::InvalidScale { field: "preview_scale" });
        }
        Ok(())
    }
}

/// Bounding box in page-relative coordinates, each edge within `0.0..=1.0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizedBox {
    pub x_min: f32,
    pub y_min: f32,
    pub x_max: f32,
    pub y_max: f32,
}

impl NormalizedBox {
    pub fn is_valid(&self) -> bool {
        let edges = [self.x_min, self.y_min, self.x_max, self.y_max];
        edges.iter().all(|v| v.is_finite() && (0.0..=1.0).contains(v))
            && self.x_min <= self.x_max
            && self.y_min <= self.y_max
    }

    /// Converts to pixel space for a page rendered at `width` x `height`.
    pub fn to_pixels(&self, width: u32, height: u32) -> (u32, u32, u32, u32) {
        let x = (self.x_min * width as f32).round() as u32;
        let y = (self.y_min * height as f32).round() as u32;
        let w = ((self.x_max - self.x_min) * width as f32).round() as u32;
        let h = ((self.y_max - self.y_min) * height as f32).round() as u32;
        (x, y, w, h)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrElement {
    pub text: String,
    pub bounding_box: NormalizedBox,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OcrPage {
    pub text: String,
    #[serde(default)]
    pub elements: Vec<OcrElement>,
}

/// OCR output keyed by the service's page key (usually `"1"`, `"2"`, ...).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OcrDocument {
    pub pages: BTreeMap<String, OcrPage>,
}

impl OcrDocument {
    pub fn invalid_boxes(&self) -> usize {
        self.pages
            .values()
            .flat_map(|page| page.elements.iter())
            .filter(|element| !element.bounding_box.is_valid())
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(doc: &str, index: u32) -> PageRef {
        PageRef::new(doc, index)
    }

    fn model(pages: &[(&str, u32)]) -> RowModel {
        let mut model = RowModel::new();
        model.extend(pages.iter().map(|(doc, index)| page(doc, *index)));
        model
    }

    #[test]
    fn page_ref_serializes_with_session_field_names() {
        let json = serde_json::to_value(page("/tmp/a.pdf", 3)).expect("serialize");
        assert_eq!(json, serde_json::json!({"pdf_path": "/tmp/a.pdf", "page_num": 3}));
    }

    #[test]
    fn page_ref_label_is_one_based() {
        assert_eq!(page("/docs/report.pdf", 0).label(), "report.pdf p.1");
    }

    #[test]
    fn move_up_and_down_respect_bounds() {
        let mut rows = model(&[("a", 0), ("a", 1), ("b", 0)]);

        assert!(!apply_row_action(&mut rows, RowAction::MoveUp { index: 0 }));
        assert!(!apply_row_action(&mut rows, RowAction::MoveDown { index: 2 }));
        assert!(apply_row_action(&mut rows, RowAction::MoveDown { index: 0 }));
        assert_eq!(rows.rows(), &[page("a", 1), page("a", 0), page("b", 0)]);

        assert!(apply_row_action(&mut rows, RowAction::MoveUp { index: 2 }));
        assert_eq!(rows.rows(), &[page("a", 1), page("b", 0), page("a", 0)]);
    }

    #[test]
    fn insert_above_and_below() {
        let mut rows = model(&[("a", 0), ("a", 1)]);

        apply_row_action(
            &mut rows,
            RowAction::Insert { index: 1, position: InsertPosition::Above, pages: vec![page("x", 0)] },
        );
        apply_row_action(
            &mut rows,
            RowAction::Insert { index: 2, position: InsertPosition::Below, pages: vec![page("y", 0)] },
        );

        assert_eq!(rows.rows(), &[page("a", 0), page("x", 0), page("a", 1), page("y", 0)]);
    }

    #[test]
    fn insert_into_empty_model_appends() {
        let mut rows = RowModel::new();
        assert!(apply_row_action(
            &mut rows,
            RowAction::Insert { index: 0, position: InsertPosition::Below, pages: vec![page("x", 0)] },
        ));
        assert_eq!(rows.rows(), &[page("x", 0)]);
    }

    #[test]
    fn exclude_records_removed_pages_in_selection_order() {
        let mut rows = model(&[("a", 0), ("a", 1), ("a", 2), ("b", 0)]);

        let removed = rows.exclude(&[3, 1, 1, 9]);

        assert_eq!(removed, vec![page("b", 0), page("a", 1)]);
        assert_eq!(rows.rows(), &[page("a", 0), page("a", 2)]);
        assert_eq!(rows.excluded(), &[page("b", 0), page("a", 1)]);
    }

    #[test]
    fn selected_follows_row_order() {
        let rows = model(&[("a", 0), ("b", 0), ("c", 0)]);
        assert_eq!(rows.selected(&[2, 0, 7]), vec![page("a", 0), page("c", 0)]);
    }

    #[test]
    fn replace_returns_previous_page() {
        let mut rows = model(&[("a", 0)]);
        assert_eq!(rows.replace(0, page("z", 0)), Some(page("a", 0)));
        assert_eq!(rows.replace(4, page("z", 0)), None);
    }

    #[test]
    fn rows_of_reports_duplicates() {
        let rows = model(&[("a", 0), ("b", 0), ("a", 0)]);
        assert_eq!(rows.rows_of(&page("a", 0)), vec![0, 2]);
        assert!(rows.rows_of(&page("c", 0)).is_empty());
    }

    #[test]
    fn session_round_trip_preserves_order() {
        let rows = model(&[("docA", 0), ("docB", 1)]);
        let json = serde_json::to_string(&rows.to_session()).expect("serialize");
        let restored: SessionState = serde_json::from_str(&json).expect("deserialize");

        assert_eq!(RowModel::from_session(restored).rows(), &[page("docA", 0), page("docB", 1)]);
    }

    #[test]
    fn session_tolerates_missing_excluded() {
        let restored: SessionState =
            serde_json::from_str(r#"{"pages":[{"pdf_path":"a.pdf","page_num":2}]}"#)
                .expect("deserialize");
        assert_eq!(restored.pages, vec![page("a.pdf", 2)]);
        assert!(restored.excluded.is_empty());
        assert!(restored.selected.is_empty());
    }

    #[test]
    fn selection_follows_moves_inserts_and_exclusions() {
        let mut rows = model(&[("a", 0), ("a", 1), ("a", 2), ("a", 3)]);
        rows.set_selection(&[3, 1, 1]);
        assert_eq!(rows.selection(), &[1, 3]);

        assert!(rows.move_row(1, -1));
        assert_eq!(rows.selection(), &[0, 3]);
        assert!(rows.move_row(0, 1));
        assert_eq!(rows.selection(), &[1, 3]);

        assert!(rows.insert_pages(2, vec![page("x", 0), page("y", 0)]));
        assert_eq!(rows.selection(), &[1, 5]);
        assert_eq!(rows.selected_pages(), vec![page("a", 1), page("a", 3)]);

        rows.exclude(&[0, 1]);
        assert_eq!(rows.selection(), &[3]);
        assert_eq!(rows.selected_pages(), vec![page("a", 3)]);

        apply_row_action(&mut rows, RowAction::Clear);
        assert!(rows.selection().is_empty());
    }

    #[test]
    fn session_selection_drops_out_of_range_rows() {
        let session = SessionState {
            pages: vec![page("a", 0), page("a", 1)],
            excluded: Vec::new(),
            selected: vec![5, 1, 2],
        };

        let rows = RowModel::from_session(session);

        assert_eq!(rows.selection(), &[1]);
        assert_eq!(rows.to_session().selected, vec![1]);
    }

    #[test]
    fn settings_validation_rejects_zero_batch() {
        let settings = Settings { batch_size: 0, ..Settings::default() };
        assert_eq!(settings.validate(), Err(SettingsError::Zero { field: "batch_size" }));
        assert!(Settings::default().validate().is_ok());
    }

    #[test]
    fn normalized_box_validation() {
        let ok = NormalizedBox { x_min: 0.1, y_min: 0.2, x_max: 0.5, y_max: 0.9 };
        let bad = NormalizedBox { x_min: 0.1, y_min: 0.2, x_max: 1.5, y_max: 0.9 };
        assert!(ok.is_valid());
        assert!(!bad.is_valid());
        assert_eq!(ok.to_pixels(100, 100), (10, 20, 40, 70));
    }
}
