use doc_model::PageRef;
use std::collections::VecDeque;

pub const EMPTY_LIST_MESSAGE: &str = "No pages loaded. Open a PDF or a folder of PDFs.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListStatus {
    Idle,
    /// Rows are being appended batch by batch.
    Loading,
    Ready,
    /// Loading finished without a single row.
    Empty { message: String },
}

/// One batch of rows appended to the list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReport {
    /// Row index of `pages[0]`.
    pub first_row: usize,
    pub pages: Vec<PageRef>,
    /// Rows of this batch that fall in the eager window and should be
    /// rendered right away.
    pub eager_rows: Vec<usize>,
    /// `true` when this was the last batch.
    pub finished: bool,
}

/// Turns a page sequence into list rows a fixed number at a time.
///
/// Pages may arrive in several chunks while documents are still being
/// enumerated; [`IncrementalListPopulator::close_input`] marks the end.
#[derive(Debug)]
pub struct IncrementalListPopulator {
    queue: VecDeque<PageRef>,
    batch_size: usize,
    eager_rows: usize,
    next_row: usize,
    input_closed: bool,
    status: ListStatus,
}

impl IncrementalListPopulator {
    pub fn new(batch_size: usize, eager_rows: usize) -> Self {
        Self {
            queue: VecDeque::new(),
            batch_size: batch_size.max(1),
            eager_rows,
            next_row: 0,
            input_closed: true,
            status: ListStatus::Idle,
        }
    }

    /// Starts a new population whose first row will be `first_row`.
    pub fn begin(&mut self, first_row: usize) {
        self.queue.clear();
        self.next_row = first_row;
        self.input_closed = false;
        self.status = ListStatus::Idle;
    }

    /// Accepts more input for the population in progress. Queued pages and
    /// row numbering carry on where they are.
    pub fn reopen_input(&mut self) {
        self.input_closed = false;
    }

    pub fn feed(&mut self, pages: impl IntoIterator<Item = PageRef>) {
        let before = self.queue.len();
        self.queue.extend(pages);
        if self.queue.len() > before {
            self.status = ListStatus::Loading;
        }
    }

    /// No more pages will be fed for this population.
    pub fn close_input(&mut self) {
        self.input_closed = true;
        if self.queue.is_empty() {
            self.finish();
        }
    }

    /// Stops population and drops queued pages.
    pub fn reset(&mut self) {
        self.queue.clear();
        self.input_closed = true;
        self.status = ListStatus::Idle;
    }

    /// Takes up to `batch_size` queued pages. Returns `None` when nothing is queued.
    pub fn next_batch(&mut self) -> Option<BatchReport> {
        if self.queue.is_empty() {
            return None;
        }

        let count = self.batch_size.min(self.queue.len());
        let pages: Vec<PageRef> = self.queue.drain(..count).collect();
        let first_row = self.next_row;
        self.next_row += pages.len();

        let eager_rows = (first_row..self.next_row).filter(|row| *row < self.eager_rows).collect();

        let finished = self.input_closed && self.queue.is_empty();
        if finished {
            self.finish();
        }

        Some(BatchReport { first_row, pages, eager_rows, finished })
    }

    /// An empty list ends `Empty`; otherwise `Ready`, including an append that added nothing.
    fn finish(&mut self) {
        self.status = if self.next_row == 0 {
            ListStatus::Empty { message: EMPTY_LIST_MESSAGE.to_owned() }
        } else {
            ListStatus::Ready
        };
    }

    pub fn set_eager_rows(&mut self, eager_rows: usize) {
        self.eager_rows = eager_rows;
    }

    pub fn eager_rows(&self) -> usize {
        self.eager_rows
    }

    pub fn status(&self) -> &ListStatus {
        &self.status
    }

    pub fn set_status(&mut self, status: ListStatus) {
        self.status = status;
    }

    pub fn has_queued_pages(&self) -> bool {
        !self.queue.is_empty()
    }

    /// `true` until the input is closed and every queued page has been emitted.
    pub fn is_active(&self) -> bool {
        !self.input_closed || !self.queue.is_empty()
    }
}
