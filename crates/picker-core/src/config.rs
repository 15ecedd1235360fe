use doc_model::{Settings, SettingsError};
use page_merger_cache::CacheConfig;
use pdf_engine::ThumbnailSize;

use crate::viewport::RowMetrics;

/// Everything the pipeline needs, derived from user [`Settings`].
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub thumbnail_size: ThumbnailSize,
    pub thumbnail_scale: f32,
    pub preview_scale: f32,
    pub batch_size: usize,
    /// Screens of rows rendered eagerly while the list fills.
    pub prefetch_multiplier: usize,
    /// `0` picks half of the available cores.
    pub worker_threads: usize,
    pub cache: CacheConfig,
    pub row_metrics: RowMetrics,
}

impl PipelineConfig {
    pub fn from_settings(settings: &Settings) -> Result<Self, SettingsError> {
        settings.validate()?;

        Ok(Self {
            thumbnail_size: ThumbnailSize {
                width_px: settings.thumb_width,
                height_px: settings.thumb_height,
            },
            thumbnail_scale: settings.thumbnail_scale,
            preview_scale: settings.preview_scale,
            batch_size: settings.batch_size,
            prefetch_multiplier: settings.prefetch_multiplier,
            worker_threads: settings.worker_threads,
            cache: CacheConfig::from_megabytes(settings.cache_budget_mb),
            row_metrics: RowMetrics::new(settings.thumb_height),
        })
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            thumbnail_size: ThumbnailSize::default(),
            thumbnail_scale: pdf_engine::THUMBNAIL_SCALE,
            preview_scale: pdf_engine::PREVIEW_SCALE,
            batch_size: 10,
            prefetch_multiplier: 2,
            worker_threads: 0,
            cache: CacheConfig::default(),
            row_metrics: RowMetrics::default(),
        }
    }
}
