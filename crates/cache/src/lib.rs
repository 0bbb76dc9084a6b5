//! Render cache for rasterized pages
//!
//! Two bounded LRU tiers (fast low-resolution previews, final
//! high-resolution images) keyed by page and zoom, plus the pending-render
//! set that prevents duplicate scheduling.

mod page_cache;

pub use page_cache::{CacheStats, Lookup, PageImageCache, RenderKey, HIGH_TIER_CAP, LOW_TIER_CAP};
