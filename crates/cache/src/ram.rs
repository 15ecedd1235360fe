//! In-memory thumbnail cache with LRU eviction
//!
//! Rendered page thumbnails are keyed by [`PageRef`]. When a memory limit is
//! configured, the least recently used thumbnails are evicted to stay under it.

use doc_model::PageRef;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::config::CacheConfig;

/// A rendered page raster, packed RGB with three bytes per pixel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedThumbnail {
    /// Page this raster was produced from
    pub page: PageRef,

    /// Raw pixel data (RGB format)
    pub pixels: Vec<u8>,

    /// Width in pixels
    pub width: u32,

    /// Height in pixels
    pub height: u32,
}

impl CachedThumbnail {
    pub fn new(page: PageRef, pixels: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            page,
            pixels,
            width,
            height,
        }
    }

    /// Get the memory size of this thumbnail in bytes
    pub fn memory_size(&self) -> usize {
        self.pixels.len()
    }
}

/// Statistics about cache usage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of thumbnails currently in cache
    pub entry_count: usize,

    /// Total memory used by cached thumbnails (bytes)
    pub memory_used: usize,

    /// Maximum memory allowed (bytes), `None` when unbounded
    pub memory_limit: Option<usize>,

    /// Number of cache hits
    pub hits: u64,

    /// Number of cache misses
    pub misses: u64,

    /// Number of thumbnails evicted due to memory pressure
    pub evictions: u64,
}

impl CacheStats {
    /// Calculate the cache hit rate (0.0 to 1.0)
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

struct CacheState {
    entries: HashMap<PageRef, Arc<CachedThumbnail>>,

    /// Most recently used at the back
    lru_queue: VecDeque<PageRef>,

    memory_used: usize,
    memory_limit: Option<usize>,
    stats: CacheStats,
}

impl CacheState {
    fn new(memory_limit: Option<usize>) -> Self {
        Self {
            entries: HashMap::new(),
            lru_queue: VecDeque::new(),
            memory_used: 0,
            memory_limit,
            stats: CacheStats {
                memory_limit,
                ..Default::default()
            },
        }
    }

    fn touch(&mut self, page: &PageRef) {
        self.lru_queue.retain(|queued| queued != page);
        self.lru_queue.push_back(page.clone());
    }

    fn detach(&mut self, page: &PageRef) -> Option<Arc<CachedThumbnail>> {
        let entry = self.entries.remove(page)?;
        self.memory_used = self.memory_used.saturating_sub(entry.memory_size());
        self.lru_queue.retain(|queued| queued != page);
        self.sync_stats();
        Some(entry)
    }

    fn evict_lru(&mut self) -> Option<Arc<CachedThumbnail>> {
        let page = self.lru_queue.pop_front()?;
        let entry = self.entries.remove(&page)?;
        self.memory_used = self.memory_used.saturating_sub(entry.memory_size());
        self.stats.evictions += 1;
        self.sync_stats();
        Some(entry)
    }

    /// Evict until `required_size` more bytes fit under the limit
    fn evict_to_fit(&mut self, required_size: usize) {
        let Some(limit) = self.memory_limit else {
            return;
        };
        while self.memory_used + required_size > limit && !self.entries.is_empty() {
            if self.evict_lru().is_none() {
                break;
            }
        }
    }

    fn sync_stats(&mut self) {
        self.stats.entry_count = self.entries.len();
        self.stats.memory_used = self.memory_used;
    }
}

/// Thread-safe thumbnail cache.
///
/// # Example
///
/// ```
/// use doc_model::PageRef;
/// use page_merger_cache::{CacheConfig, CachedThumbnail, RamThumbnailCache};
///
/// let cache = RamThumbnailCache::new(CacheConfig::from_megabytes(16));
/// let page = PageRef::new("report.pdf", 0);
///
/// cache.put(CachedThumbnail::new(page.clone(), vec![255; 180 * 240 * 3], 180, 240));
///
/// let thumbnail = cache.get(&page).expect("thumbnail was just stored");
/// assert_eq!((thumbnail.width, thumbnail.height), (180, 240));
/// ```
pub struct RamThumbnailCache {
    state: Arc<Mutex<CacheState>>,
}

impl RamThumbnailCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            state: Arc::new(Mutex::new(CacheState::new(config.memory_limit))),
        }
    }

    pub fn unbounded() -> Self {
        Self::new(CacheConfig::unbounded())
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store a thumbnail, replacing any previous raster for the same page.
    ///
    /// Least recently used entries are evicted first if the new one would
    /// exceed the memory limit. An entry larger than the whole limit is still
    /// stored once everything else has been evicted.
    pub fn put(&self, thumbnail: CachedThumbnail) -> Arc<CachedThumbnail> {
        let mut state = self.lock();
        let page = thumbnail.page.clone();
        let entry = Arc::new(thumbnail);
        let size = entry.memory_size();

        state.detach(&page);
        state.evict_to_fit(size);

        state.memory_used += size;
        state.entries.insert(page.clone(), Arc::clone(&entry));
        state.touch(&page);
        state.sync_stats();

        entry
    }

    /// Retrieve a thumbnail, marking it most recently used.
    pub fn get(&self, page: &PageRef) -> Option<Arc<CachedThumbnail>> {
        let mut state = self.lock();

        if let Some(entry) = state.entries.get(page).cloned() {
            state.touch(page);
            state.stats.hits += 1;
            Some(entry)
        } else {
            state.stats.misses += 1;
            None
        }
    }

    /// Retrieve a thumbnail without touching LRU order or statistics
    pub fn peek(&self, page: &PageRef) -> Option<Arc<CachedThumbnail>> {
        self.lock().entries.get(page).cloned()
    }

    /// Check membership without touching LRU order or statistics
    pub fn contains(&self, page: &PageRef) -> bool {
        self.lock().entries.contains_key(page)
    }

    pub fn remove(&self, page: &PageRef) -> Option<Arc<CachedThumbnail>> {
        self.lock().detach(page)
    }

    pub fn clear(&self) {
        let mut state = self.lock();
        state.entries.clear();
        state.lru_queue.clear();
        state.memory_used = 0;
        state.sync_stats();
    }

    pub fn stats(&self) -> CacheStats {
        self.lock().stats
    }

    /// Update the memory limit, evicting immediately if usage is now above it.
    pub fn set_memory_limit(&self, memory_limit: Option<usize>) {
        let mut state = self.lock();
        state.memory_limit = memory_limit;
        state.stats.memory_limit = memory_limit;
        state.evict_to_fit(0);
    }

    pub fn memory_used(&self) -> usize {
        self.lock().memory_used
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for RamThumbnailCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}
