use std::ops::RangeInclusive;

pub const ROW_PADDING_PX: u32 = 16;
pub const ROW_SPACING_PX: u32 = 8;

/// Vertical layout of one list row: thumbnail plus label padding plus the gap
/// to the next row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowMetrics {
    pub thumb_height_px: u32,
    pub padding_px: u32,
    pub spacing_px: u32,
}

impl RowMetrics {
    pub fn new(thumb_height_px: u32) -> Self {
        Self { thumb_height_px, padding_px: ROW_PADDING_PX, spacing_px: ROW_SPACING_PX }
    }

    pub fn row_height(&self) -> u32 {
        (self.thumb_height_px + self.padding_px + self.spacing_px).max(1)
    }
}

impl Default for RowMetrics {
    fn default() -> Self {
        Self::new(240)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ListViewport {
    pub scroll_offset_px: f32,
    pub height_px: f32,
}

impl ListViewport {
    pub fn new(scroll_offset_px: f32, height_px: f32) -> Self {
        Self { scroll_offset_px, height_px }
    }
}

/// Rows to render around the viewport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadWindow {
    pub visible: RangeInclusive<usize>,
    /// `visible` widened by one viewport of rows on each side.
    pub expanded: RangeInclusive<usize>,
}

impl LoadWindow {
    /// Computes the window for a list of `row_count` rows. `None` when the list is empty.
    pub fn compute(viewport: ListViewport, metrics: RowMetrics, row_count: usize) -> Option<Self> {
        let last_row = row_count.checked_sub(1)?;
        let row_height = metrics.row_height() as f32;

        let top = viewport.scroll_offset_px.max(0.0);
        let bottom = (top + viewport.height_px.max(1.0) - 1.0).max(top);

        let first = ((top / row_height).floor() as usize).min(last_row);
        let last = ((bottom / row_height).floor() as usize).clamp(first, last_row);

        let margin = rows_per_viewport(viewport.height_px, metrics);
        let expanded = first.saturating_sub(margin)..=last.saturating_add(margin).min(last_row);

        Some(Self { visible: first..=last, expanded })
    }
}

/// Whole rows that fit in the viewport, at least one.
pub fn rows_per_viewport(height_px: f32, metrics: RowMetrics) -> usize {
    let rows = (height_px.max(0.0) / metrics.row_height() as f32).floor() as usize;
    rows.max(1)
}
