use doc_model::{apply_row_action, PageRef, RowAction, RowModel, SessionState};
use page_merger_cache::{CacheStats, RamThumbnailCache};
use page_merger_scheduler::{
    Job, JobExecutor, JobPriority, JobScheduler, SchedulerStats, WorkerPool, WorkerPoolConfig,
};
use pdf_engine::PdfEngine;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::path::Path;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::config::PipelineConfig;
use crate::enumerate::{enumerate_all, DocumentSource};
use crate::error::{EnumerationFailure, PickerError, RenderFailure};
use crate::export;
use crate::pending::PendingRequestSet;
use crate::populate::{IncrementalListPopulator, ListStatus, EMPTY_LIST_MESSAGE};
use crate::render::{render_preview, render_thumbnail, RenderedThumbnail};
use crate::viewport::{rows_per_viewport, ListViewport, LoadWindow};

const RESULT_WAIT_SLICE: Duration = Duration::from_millis(25);

/// Something the host should reflect in its list.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    LoadingStarted,
    RowsAppended { first_row: usize, count: usize },
    LoadingFinished { rows: usize },
    Empty { message: String },
    /// Repaint these rows with the cached thumbnail of `page`.
    ThumbnailReady { page: PageRef, rows: Vec<usize> },
    /// Leave these rows blank.
    ThumbnailFailed { failure: RenderFailure, rows: Vec<usize> },
    EnumerationFailed(EnumerationFailure),
    /// Rows were reordered, inserted, replaced, excluded or cleared.
    RowsChanged,
    Notice(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ThumbnailRequest {
    Cached(Arc<RenderedThumbnail>),
    /// Already in flight; the completion will satisfy this request too.
    Pending,
    Dispatched,
    /// Rendering failed earlier; not retried until the row is re-added.
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThumbnailState {
    Unrequested,
    Pending,
    Cached,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadMode {
    /// Start a new session with these documents.
    Replace,
    /// Add the documents' pages after the existing rows.
    Append,
}

#[derive(Debug, Clone)]
enum Work {
    Enumerate { generation: u64, sequence: usize, source: DocumentSource },
    Render { generation: u64, page: PageRef },
}

enum WorkResult {
    Enumerated {
        generation: u64,
        sequence: usize,
        pages: Vec<PageRef>,
        failures: Vec<EnumerationFailure>,
    },
    Rendered {
        generation: u64,
        page: PageRef,
        result: Result<RenderedThumbnail, RenderFailure>,
    },
}

/// Document enumeration jobs complete in any order; their pages are released
/// to the populator strictly in input order.
#[derive(Debug, Default)]
struct EnumerationProgress {
    total: usize,
    next_sequence: usize,
    buffered: BTreeMap<usize, Vec<PageRef>>,
    pages: usize,
    failures: usize,
}

impl EnumerationProgress {
    fn is_complete(&self) -> bool {
        self.next_sequence >= self.total
    }
}

/// Owns the rows, the thumbnail cache and the in-flight request set, and is
/// the only place that dispatches renders.
///
/// The host drives it by calling [`ThumbnailPipeline::tick`] from its event
/// loop and draining [`ThumbnailPipeline::drain_events`]. Workers never touch
/// pipeline state; their results arrive over a channel and are applied during
/// `tick`. Dropping the pipeline stops and joins the workers.
pub struct ThumbnailPipeline {
    engine: Arc<dyn PdfEngine>,
    config: PipelineConfig,
    pool: WorkerPool<Work>,
    results: Receiver<WorkResult>,
    cache: RamThumbnailCache,
    pending: PendingRequestSet,
    failed: HashMap<PageRef, RenderFailure>,
    rows: RowModel,
    populator: IncrementalListPopulator,
    enumeration: EnumerationProgress,
    viewport: ListViewport,
    /// Selection of a restored session, applied once its rows are listed.
    restored_selection: Vec<usize>,
    generation: u64,
    events: VecDeque<PipelineEvent>,
}

impl ThumbnailPipeline {
    pub fn new(engine: Arc<dyn PdfEngine>, config: PipelineConfig) -> Result<Self, PickerError> {
        let (sender, results) = mpsc::channel();
        let scheduler = Arc::new(JobScheduler::new());
        let executor = worker_executor(Arc::clone(&engine), &config, sender);
        let pool = WorkerPool::new(
            scheduler,
            executor,
            WorkerPoolConfig::new(config.worker_threads).with_thread_name("thumbnail-worker"),
        )
        .map_err(PickerError::WorkerPool)?;

        let viewport = ListViewport::default();
        let eager_rows =
            rows_per_viewport(viewport.height_px, config.row_metrics) * config.prefetch_multiplier;

        tracing::debug!(workers = pool.num_workers(), "thumbnail pipeline started");

        Ok(Self {
            cache: RamThumbnailCache::new(config.cache),
            populator: IncrementalListPopulator::new(config.batch_size, eager_rows),
            engine,
            config,
            pool,
            results,
            pending: PendingRequestSet::new(),
            failed: HashMap::new(),
            rows: RowModel::new(),
            enumeration: EnumerationProgress::default(),
            viewport,
            restored_selection: Vec::new(),
            generation: 0,
            events: VecDeque::new(),
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn rows(&self) -> &RowModel {
        &self.rows
    }

    pub fn status(&self) -> &ListStatus {
        self.populator.status()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn scheduler_stats(&self) -> SchedulerStats {
        self.pool.scheduler().stats()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn num_workers(&self) -> usize {
        self.pool.num_workers()
    }

    pub fn session(&self) -> SessionState {
        self.rows.to_session()
    }

    /// Enumerates `sources` on the worker pool and feeds the pages into the
    /// list in input order.
    pub fn load_documents(&mut self, sources: Vec<DocumentSource>, mode: LoadMode) {
        if mode == LoadMode::Replace {
            self.start_generation();
            self.rows.clear();
            self.events.push_back(PipelineEvent::RowsChanged);
            self.populator.begin(0);
        } else if self.populator.is_active() {
            // Queue behind the rows still being listed.
            self.populator.reopen_input();
        } else {
            self.populator.begin(self.rows.len());
        }

        // Appended documents queue behind any enumeration still in flight.
        let first_sequence = self.enumeration.total;
        self.enumeration.total += sources.len();

        tracing::info!(documents = sources.len(), ?mode, "loading documents");

        let scheduler = Arc::clone(self.pool.scheduler());
        for (offset, source) in sources.into_iter().enumerate() {
            scheduler.submit(
                JobPriority::Enumeration,
                Work::Enumerate { generation: self.generation, sequence: first_sequence + offset, source },
            );
        }

        if self.enumeration.is_complete() {
            self.close_population();
        }
    }

    /// Rebuilds the list from a saved session without re-enumerating.
    pub fn restore_session(&mut self, session: SessionState) {
        self.start_generation();
        self.rows = RowModel::from_session(SessionState {
            excluded: session.excluded,
            ..SessionState::default()
        });
        self.restored_selection = session.selected;
        self.events.push_back(PipelineEvent::RowsChanged);

        tracing::info!(rows = session.pages.len(), "restoring session");

        self.populator.begin(0);
        self.populator.feed(session.pages);
        if self.populator.has_queued_pages() {
            self.events.push_back(PipelineEvent::LoadingStarted);
        }
        self.close_population();
    }

    /// Applies finished work and appends at most one batch of rows.
    ///
    /// Returns `true` while enumeration, population or renders are outstanding.
    pub fn tick(&mut self) -> bool {
        self.drain_results();
        self.process_batch();
        self.is_busy()
    }

    pub fn is_busy(&self) -> bool {
        self.populator.is_active() || !self.enumeration.is_complete() || !self.pending.is_empty()
    }

    /// Calls [`ThumbnailPipeline::tick`] until nothing is outstanding or
    /// `timeout` passes. Returns `true` if the pipeline went idle.
    pub fn wait_idle(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if !self.tick() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            if self.populator.has_queued_pages() {
                continue;
            }
            match self.results.recv_timeout((deadline - now).min(RESULT_WAIT_SLICE)) {
                Ok(result) => self.handle_result(result),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => return false,
            }
        }
    }

    pub fn viewport(&self) -> ListViewport {
        self.viewport
    }

    /// Records a scroll or resize and requests thumbnails for the rows around it.
    pub fn set_viewport(&mut self, viewport: ListViewport) {
        self.viewport = viewport;
        self.populator.set_eager_rows(
            rows_per_viewport(viewport.height_px, self.config.row_metrics)
                * self.config.prefetch_multiplier,
        );
        self.reconcile_viewport();
    }

    /// The rows that would be requested for the current viewport.
    pub fn load_window(&self) -> Option<LoadWindow> {
        LoadWindow::compute(self.viewport, self.config.row_metrics, self.rows.len())
    }

    /// Requests the thumbnail of one row at `Visible` priority.
    pub fn request_thumbnail(&mut self, row: usize) -> Option<ThumbnailRequest> {
        let page = self.rows.get(row)?.clone();
        if let Some(thumbnail) = self.cache.get(&page) {
            return Some(ThumbnailRequest::Cached(thumbnail));
        }
        Some(match self.ensure_requested(page, JobPriority::Visible) {
            ThumbnailState::Pending => ThumbnailRequest::Pending,
            ThumbnailState::Failed => ThumbnailRequest::Failed,
            ThumbnailState::Unrequested | ThumbnailState::Cached => ThumbnailRequest::Dispatched,
        })
    }

    pub fn thumbnail_state(&self, page: &PageRef) -> ThumbnailState {
        if self.pending.contains(page) {
            ThumbnailState::Pending
        } else if self.cache.contains(page) {
            ThumbnailState::Cached
        } else if self.failed.contains_key(page) {
            ThumbnailState::Failed
        } else {
            ThumbnailState::Unrequested
        }
    }

    pub fn thumbnail(&self, page: &PageRef) -> Option<Arc<RenderedThumbnail>> {
        self.cache.get(page)
    }

    pub fn failure(&self, page: &PageRef) -> Option<&RenderFailure> {
        self.failed.get(page)
    }

    /// Cached thumbnails in row order. Does not count as cache access.
    pub fn cached_rows(&self) -> Vec<(usize, Arc<RenderedThumbnail>)> {
        self.rows
            .rows()
            .iter()
            .enumerate()
            .filter_map(|(row, page)| self.cache.peek(page).map(|thumbnail| (row, thumbnail)))
            .collect()
    }

    /// Replaces the row selection; out-of-range indices are ignored.
    pub fn set_selection(&mut self, indices: &[usize]) {
        self.rows.set_selection(indices);
    }

    /// Renders one row at preview scale on the calling thread.
    pub fn render_preview(&self, row: usize) -> Result<RenderedThumbnail, PickerError> {
        let page = self.rows.get(row).ok_or(PickerError::NoSuchRow(row))?;
        Ok(render_preview(self.engine.as_ref(), page, self.config.preview_scale)?)
    }

    /// Applies a row edit. Inserting or replacing a page clears an earlier
    /// render failure for it so it gets another attempt.
    pub fn apply(&mut self, action: RowAction) -> bool {
        match &action {
            RowAction::Clear => {
                let changed = !self.rows.is_empty() || !self.rows.excluded().is_empty();
                self.clear_session();
                return changed;
            }
            RowAction::Insert { pages, .. } => {
                for page in pages {
                    self.failed.remove(page);
                }
            }
            RowAction::Replace { page, .. } => {
                self.failed.remove(page);
            }
            _ => {}
        }

        let changed = apply_row_action(&mut self.rows, action);
        if changed {
            self.events.push_back(PipelineEvent::RowsChanged);
            self.reconcile_viewport();
        }
        changed
    }

    /// Empties the list, the cache and every in-flight request. Results of
    /// renders already running are dropped when they arrive.
    ///
    /// Returns the (empty) session for the caller to persist.
    pub fn clear_session(&mut self) -> SessionState {
        self.start_generation();
        self.rows.clear();
        self.cache.clear();
        self.populator
            .set_status(ListStatus::Empty { message: EMPTY_LIST_MESSAGE.to_owned() });

        tracing::info!(generation = self.generation, "session cleared");

        self.events.push_back(PipelineEvent::RowsChanged);
        self.events.push_back(PipelineEvent::Empty { message: EMPTY_LIST_MESSAGE.to_owned() });
        self.rows.to_session()
    }

    pub fn merge_rows(&self, output: &Path) -> Result<pdf_engine::MergeSummary, PickerError> {
        export::merge_rows(&self.rows, output)
    }

    pub fn merge_selection(
        &self,
        indices: &[usize],
        output: &Path,
    ) -> Result<pdf_engine::MergeSummary, PickerError> {
        export::merge_selection(&self.rows, indices, output)
    }

    /// Queues a host-facing notice, e.g. a failed session save.
    pub fn notify(&mut self, message: impl Into<String>) {
        self.events.push_back(PipelineEvent::Notice(message.into()));
    }

    pub fn drain_events(&mut self) -> Vec<PipelineEvent> {
        self.events.drain(..).collect()
    }

    fn start_generation(&mut self) {
        self.generation += 1;
        let cancelled = self.pool.scheduler().clear();
        self.pending.clear();
        self.failed.clear();
        self.populator.reset();
        self.enumeration = EnumerationProgress::default();
        self.restored_selection.clear();

        tracing::debug!(generation = self.generation, cancelled, "new session generation");
    }

    fn close_population(&mut self) {
        self.populator.close_input();
        if let ListStatus::Empty { message } = self.populator.status() {
            self.events.push_back(PipelineEvent::Empty { message: message.clone() });
        } else if !self.populator.has_queued_pages() {
            self.apply_restored_selection();
            self.events.push_back(PipelineEvent::LoadingFinished { rows: self.rows.len() });
        }
    }

    fn apply_restored_selection(&mut self) {
        if !self.restored_selection.is_empty() {
            let selection = std::mem::take(&mut self.restored_selection);
            self.rows.set_selection(&selection);
        }
    }

    fn process_batch(&mut self) {
        let Some(batch) = self.populator.next_batch() else {
            return;
        };

        let count = batch.pages.len();
        let eager: Vec<PageRef> =
            batch.eager_rows.iter().map(|row| batch.pages[row - batch.first_row].clone()).collect();
        self.rows.extend(batch.pages);
        self.events.push_back(PipelineEvent::RowsAppended { first_row: batch.first_row, count });

        for page in eager {
            self.ensure_requested(page, JobPriority::Eager);
        }
        self.reconcile_viewport();

        if batch.finished {
            self.apply_restored_selection();
            tracing::info!(rows = self.rows.len(), "list populated");
            self.events.push_back(PipelineEvent::LoadingFinished { rows: self.rows.len() });
        }
    }

    fn reconcile_viewport(&mut self) {
        let Some(window) = self.load_window() else {
            return;
        };

        for row in window.expanded.clone() {
            let Some(page) = self.rows.get(row).cloned() else {
                break;
            };
            let priority = if window.visible.contains(&row) {
                JobPriority::Visible
            } else {
                JobPriority::Prefetch
            };
            self.ensure_requested(page, priority);
        }
    }

    /// Dispatches a render unless the page is cached, in flight or failed.
    /// An in-flight request is promoted to `priority` if that is higher.
    fn ensure_requested(&mut self, page: PageRef, priority: JobPriority) -> ThumbnailState {
        match self.thumbnail_state(&page) {
            ThumbnailState::Cached => ThumbnailState::Cached,
            ThumbnailState::Failed => ThumbnailState::Failed,
            ThumbnailState::Pending => {
                self.pool.scheduler().promote_jobs_if(priority, |job| {
                    matches!(&job.payload, Work::Render { page: queued, .. } if *queued == page)
                });
                ThumbnailState::Pending
            }
            ThumbnailState::Unrequested => {
                self.pending.insert(page.clone());
                tracing::debug!(%page, ?priority, "dispatching render");
                self.pool
                    .scheduler()
                    .submit(priority, Work::Render { generation: self.generation, page });
                ThumbnailState::Unrequested
            }
        }
    }

    fn drain_results(&mut self) {
        while let Ok(result) = self.results.try_recv() {
            self.handle_result(result);
        }
    }

    fn handle_result(&mut self, result: WorkResult) {
        match result {
            WorkResult::Enumerated { generation, sequence, pages, failures } => {
                if generation != self.generation {
                    tracing::debug!(generation, "dropping stale enumeration");
                    return;
                }
                self.enumeration.failures += failures.len();
                self.events.extend(failures.into_iter().map(PipelineEvent::EnumerationFailed));
                self.enumeration.buffered.insert(sequence, pages);
                self.release_enumerated_pages();
            }
            WorkResult::Rendered { generation, page, result } => {
                if generation != self.generation {
                    tracing::debug!(%page, generation, "dropping stale render");
                    return;
                }
                self.pending.remove(&page);

                let rows = self.rows.rows_of(&page);
                if rows.is_empty() {
                    tracing::debug!(%page, "dropping render for removed row");
                    return;
                }

                match result {
                    Ok(thumbnail) => {
                        self.cache.put(thumbnail);
                        self.events.push_back(PipelineEvent::ThumbnailReady { page, rows });
                    }
                    Err(failure) => {
                        tracing::warn!(page = %failure.page, kind = ?failure.kind, reason = %failure.reason, "thumbnail render failed");
                        self.failed.insert(page, failure.clone());
                        self.events.push_back(PipelineEvent::ThumbnailFailed { failure, rows });
                    }
                }
            }
        }
    }

    fn release_enumerated_pages(&mut self) {
        let was_loading = self.populator.status() == &ListStatus::Loading;

        while let Some(pages) = self.enumeration.buffered.remove(&self.enumeration.next_sequence) {
            self.enumeration.pages += pages.len();
            self.enumeration.next_sequence += 1;
            self.populator.feed(pages);
        }

        if !was_loading && self.populator.status() == &ListStatus::Loading {
            self.events.push_back(PipelineEvent::LoadingStarted);
        }

        if self.enumeration.is_complete() {
            tracing::info!(
                documents = self.enumeration.total,
                pages = self.enumeration.pages,
                failures = self.enumeration.failures,
                "enumeration finished"
            );
            self.close_population();
        }
    }
}

fn worker_executor(
    engine: Arc<dyn PdfEngine>,
    config: &PipelineConfig,
    sender: Sender<WorkResult>,
) -> JobExecutor<Work> {
    let target = config.thumbnail_size;
    let scale = config.thumbnail_scale;
    let sender = Mutex::new(sender);

    Arc::new(move |job: Job<Work>| {
        let result = match job.payload {
            Work::Enumerate { generation, sequence, source } => {
                let enumeration = enumerate_all(engine.as_ref(), [source]);
                WorkResult::Enumerated {
                    generation,
                    sequence,
                    pages: enumeration.pages,
                    failures: enumeration.failures,
                }
            }
            Work::Render { generation, page } => {
                let result = render_thumbnail(engine.as_ref(), &page, target, scale);
                WorkResult::Rendered { generation, page, result }
            }
        };

        // The receiver is gone only while the pipeline is being dropped.
        let _ = sender.lock().unwrap_or_else(PoisonError::into_inner).send(result);
    })
}
