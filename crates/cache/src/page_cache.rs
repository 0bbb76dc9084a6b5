//! Two-tier LRU page-image cache
//!
//! High tier: final renders, slow to produce, capacity 30. Low tier:
//! fast preview renders, capacity 150. Keys combine the page index with
//! the zoom rounded to three decimals, so every committed zoom level has
//! its own entries. Strict LRU per tier; a high-resolution insert
//! supersedes the low-resolution entry for the same key.
//!
//! The pending set lives here too: a key is marked in flight before a
//! render task is scheduled, so no two tasks for the same (page, zoom)
//! run concurrently.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use image::RgbaImage;

/// High tier capacity (entries).
pub const HIGH_TIER_CAP: usize = 30;

/// Low tier capacity (entries).
pub const LOW_TIER_CAP: usize = 150;

/// Cache key: page index plus zoom rounded to three decimals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderKey {
    pub page: u16,
    /// Zoom × 1000, rounded. Keeps the key hashable and the rounding in
    /// one place.
    pub zoom_millis: u32,
}

impl RenderKey {
    pub fn new(page: u16, zoom: f32) -> Self {
        Self { page, zoom_millis: (zoom * 1000.0).round() as u32 }
    }

    pub fn zoom(&self) -> f32 {
        self.zoom_millis as f32 / 1000.0
    }
}

/// Outcome of a cache lookup.
///
/// `Preview` and `Fallback` images are rendered at a different resolution
/// than requested; the paint path stretches them to the target size.
#[derive(Debug, Clone)]
pub enum Lookup {
    /// Exact high-resolution entry.
    Exact(Arc<RgbaImage>),
    /// Low-resolution preview for the same key.
    Preview(Arc<RgbaImage>),
    /// Nearest previously rendered zoom for the page (interactive zoom
    /// only, to avoid flashing blank pages mid-gesture).
    Fallback(Arc<RgbaImage>),
    Miss,
}

impl Lookup {
    pub fn image(&self) -> Option<&Arc<RgbaImage>> {
        match self {
            Lookup::Exact(img) | Lookup::Preview(img) | Lookup::Fallback(img) => Some(img),
            Lookup::Miss => None,
        }
    }

    pub fn is_exact(&self) -> bool {
        matches!(self, Lookup::Exact(_))
    }
}

/// Cache usage counters.
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub high_len: usize,
    pub low_len: usize,
}

/// A single LRU tier.
///
/// Most recently used keys sit at the back of the order queue; eviction
/// pops from the front.
struct Tier {
    entries: HashMap<RenderKey, Arc<RgbaImage>>,
    order: VecDeque<RenderKey>,
    capacity: usize,
}

impl Tier {
    fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    fn get(&mut self, key: &RenderKey) -> Option<Arc<RgbaImage>> {
        let image = self.entries.get(key).cloned()?;
        self.touch(key);
        Some(image)
    }

    fn insert(&mut self, key: RenderKey, image: Arc<RgbaImage>) -> u64 {
        if self.entries.insert(key, image).is_some() {
            self.touch(&key);
            return 0;
        }
        self.order.push_back(key);

        let mut evicted = 0;
        while self.entries.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
                evicted += 1;
            } else {
                break;
            }
        }
        evicted
    }

    fn remove(&mut self, key: &RenderKey) -> bool {
        if self.entries.remove(key).is_some() {
            self.order.retain(|k| k != key);
            true
        } else {
            false
        }
    }

    fn touch(&mut self, key: &RenderKey) {
        if let Some(index) = self.order.iter().position(|k| k == key) {
            if let Some(found) = self.order.remove(index) {
                self.order.push_back(found);
            }
        }
    }

    fn retain_pages(&mut self, keep: impl Fn(u16) -> bool) {
        self.entries.retain(|k, _| keep(k.page));
        let entries = &self.entries;
        self.order.retain(|k| entries.contains_key(k));
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }
}

/// Two-tier render cache with a pending-render set.
pub struct PageImageCache {
    high: Tier,
    low: Tier,
    pending: HashSet<RenderKey>,
    stats: CacheStats,
}

impl Default for PageImageCache {
    fn default() -> Self {
        Self::new()
    }
}

impl PageImageCache {
    pub fn new() -> Self {
        Self::with_capacities(HIGH_TIER_CAP, LOW_TIER_CAP)
    }

    pub fn with_capacities(high: usize, low: usize) -> Self {
        Self {
            high: Tier::new(high),
            low: Tier::new(low),
            pending: HashSet::new(),
            stats: CacheStats::default(),
        }
    }

    /// Best-effort lookup for a key.
    ///
    /// The low tier is consulted only on a high-tier miss. The
    /// nearest-zoom fallback is offered only while `interactive` (an
    /// active zoom gesture or its settle window), so a steady-state
    /// miss paints a clean placeholder instead of a stretched stale page.
    pub fn lookup(&mut self, key: RenderKey, interactive: bool) -> Lookup {
        if let Some(image) = self.high.get(&key) {
            self.stats.hits += 1;
            return Lookup::Exact(image);
        }
        self.stats.misses += 1;

        if let Some(image) = self.low.get(&key) {
            return Lookup::Preview(image);
        }

        if interactive {
            if let Some(image) = self.nearest_for_page(key) {
                return Lookup::Fallback(image);
            }
        }
        Lookup::Miss
    }

    /// Most recently used entry for the page at any zoom, preferring the
    /// high tier.
    fn nearest_for_page(&self, key: RenderKey) -> Option<Arc<RgbaImage>> {
        for tier in [&self.high, &self.low] {
            if let Some(found) = tier
                .order
                .iter()
                .rev()
                .find(|k| k.page == key.page)
                .and_then(|k| tier.entries.get(k))
            {
                return Some(found.clone());
            }
        }
        None
    }

    /// Insert a final render. Removes the preview for the same key and
    /// retires its pending entry.
    pub fn insert_high(&mut self, key: RenderKey, image: Arc<RgbaImage>) {
        self.stats.evictions += self.high.insert(key, image);
        self.low.remove(&key);
        self.pending.remove(&key);
        self.refresh_lens();
    }

    /// Insert a preview render.
    ///
    /// A late preview never evicts the final image for its key: it only
    /// ever lands in the low tier, which is consulted on high-tier miss.
    pub fn insert_low(&mut self, key: RenderKey, image: Arc<RgbaImage>) {
        self.stats.evictions += self.low.insert(key, image);
        self.refresh_lens();
    }

    /// Drop every entry for a page, both tiers.
    pub fn invalidate_page(&mut self, page: u16) {
        self.high.retain_pages(|p| p != page);
        self.low.retain_pages(|p| p != page);
        self.refresh_lens();
    }

    /// Drop everything (structural document changes).
    pub fn clear(&mut self) {
        self.high.clear();
        self.low.clear();
        self.refresh_lens();
    }

    /// Whether the key holds a final render.
    pub fn contains_high(&self, key: &RenderKey) -> bool {
        self.high.entries.contains_key(key)
    }

    // ── Pending set ──────────────────────────────────────────────────

    /// Mark a key as in flight. Returns false when a task for the key is
    /// already pending, in which case the caller must not schedule.
    pub fn begin_pending(&mut self, key: RenderKey) -> bool {
        self.pending.insert(key)
    }

    pub fn is_pending(&self, key: &RenderKey) -> bool {
        self.pending.contains(key)
    }

    pub fn finish_pending(&mut self, key: &RenderKey) {
        self.pending.remove(key);
    }

    /// Abandon all in-flight bookkeeping (zoom commit invalidates every
    /// outstanding key at once; stale results are rejected on arrival).
    pub fn clear_pending(&mut self) {
        self.pending.clear();
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    fn refresh_lens(&mut self) {
        self.stats.high_len = self.high.entries.len();
        self.stats.low_len = self.low.entries.len();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn img() -> Arc<RgbaImage> {
        Arc::new(RgbaImage::new(4, 4))
    }

    #[test]
    fn exact_hit_comes_from_high_tier() {
        let mut cache = PageImageCache::new();
        let key = RenderKey::new(0, 1.0);
        cache.insert_high(key, img());
        assert!(cache.lookup(key, false).is_exact());
        assert_eq!(cache.stats().hits, 1);
    }

    #[test]
    fn preview_served_on_high_miss() {
        let mut cache = PageImageCache::new();
        let key = RenderKey::new(0, 1.0);
        cache.insert_low(key, img());
        assert!(matches!(cache.lookup(key, false), Lookup::Preview(_)));
    }

    #[test]
    fn high_insert_supersedes_preview() {
        let mut cache = PageImageCache::new();
        let key = RenderKey::new(2, 1.5);
        cache.insert_low(key, img());
        cache.insert_high(key, img());
        assert_eq!(cache.stats().low_len, 0);
        assert_eq!(cache.stats().high_len, 1);
    }

    #[test]
    fn late_preview_does_not_evict_final_render() {
        let mut cache = PageImageCache::new();
        let key = RenderKey::new(0, 2.0);
        cache.insert_high(key, img());
        cache.insert_low(key, img());
        assert!(cache.lookup(key, false).is_exact());
    }

    #[test]
    fn fallback_only_while_interactive() {
        let mut cache = PageImageCache::new();
        cache.insert_high(RenderKey::new(3, 1.0), img());
        let other_zoom = RenderKey::new(3, 2.0);
        assert!(matches!(cache.lookup(other_zoom, false), Lookup::Miss));
        assert!(matches!(cache.lookup(other_zoom, true), Lookup::Fallback(_)));
    }

    #[test]
    fn high_tier_never_exceeds_capacity() {
        let mut cache = PageImageCache::new();
        for page in 0..100u16 {
            cache.insert_high(RenderKey::new(page, 1.0), img());
        }
        assert_eq!(cache.stats().high_len, HIGH_TIER_CAP);
        assert!(cache.stats().evictions > 0);
    }

    #[test]
    fn low_tier_never_exceeds_capacity() {
        let mut cache = PageImageCache::new();
        for page in 0..400u16 {
            cache.insert_low(RenderKey::new(page, 1.0), img());
        }
        assert_eq!(cache.stats().low_len, LOW_TIER_CAP);
    }

    #[test]
    fn eviction_removes_least_recently_used() {
        let mut cache = PageImageCache::with_capacities(2, 2);
        let a = RenderKey::new(0, 1.0);
        let b = RenderKey::new(1, 1.0);
        let c = RenderKey::new(2, 1.0);
        cache.insert_high(a, img());
        cache.insert_high(b, img());
        // Touch `a` so `b` becomes the eviction candidate.
        assert!(cache.lookup(a, false).is_exact());
        cache.insert_high(c, img());
        assert!(cache.contains_high(&a));
        assert!(!cache.contains_high(&b));
        assert!(cache.contains_high(&c));
    }

    #[test]
    fn invalidate_page_clears_both_tiers() {
        let mut cache = PageImageCache::new();
        cache.insert_high(RenderKey::new(5, 1.0), img());
        cache.insert_high(RenderKey::new(5, 2.0), img());
        cache.insert_low(RenderKey::new(5, 3.0), img());
        cache.insert_high(RenderKey::new(6, 1.0), img());

        cache.invalidate_page(5);
        assert_eq!(cache.stats().high_len, 1);
        assert_eq!(cache.stats().low_len, 0);
        assert!(cache.contains_high(&RenderKey::new(6, 1.0)));
    }

    #[test]
    fn clear_empties_everything() {
        let mut cache = PageImageCache::new();
        cache.insert_high(RenderKey::new(0, 1.0), img());
        cache.insert_low(RenderKey::new(1, 1.0), img());
        cache.clear();
        assert_eq!(cache.stats().high_len, 0);
        assert_eq!(cache.stats().low_len, 0);
    }

    #[test]
    fn pending_set_rejects_duplicate_scheduling() {
        let mut cache = PageImageCache::new();
        let key = RenderKey::new(0, 1.0);
        assert!(cache.begin_pending(key));
        assert!(!cache.begin_pending(key));
        assert!(cache.is_pending(&key));

        // A delivered final render retires the pending entry.
        cache.insert_high(key, img());
        assert!(!cache.is_pending(&key));
        assert!(cache.begin_pending(key));
    }

    #[test]
    fn zoom_rounds_to_three_decimals() {
        assert_eq!(RenderKey::new(0, 1.0004), RenderKey::new(0, 1.0));
        assert_ne!(RenderKey::new(0, 1.001), RenderKey::new(0, 1.0));
        assert!((RenderKey::new(0, 1.403).zoom() - 1.403).abs() < 1e-6);
    }
}
