//! Asynchronous two-pass render pipeline
//!
//! Each scheduled (page, zoom) task opens its own read-only document
//! handle from a copied [`RenderSource`], never the live document, and
//! produces a fast low-resolution pass followed by a full-resolution
//! pass. Staleness is detected, not cancelled: a shared zoom gate is
//! checked before each pass and again by the consumer before caching, so
//! a completed-late render of an old zoom can never overwrite newer
//! state. Wasted render work is tolerated; it is bounded by the pool
//! size.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender, TryRecvError};
use std::sync::Arc;

use vellum_cache::RenderKey;
use vellum_engine::{RenderDocument, RenderSource, RgbaImage};
use vellum_scheduler::{WorkerPool, WorkerPoolConfig};

/// Scale of the fast first pass relative to the final render.
const PREVIEW_SCALE: f32 = 0.2;

/// A finished render pass, marshaled back to the owning thread.
#[derive(Debug)]
pub struct RenderDelivery {
    pub key: RenderKey,
    pub image: RgbaImage,
    pub high_res: bool,
}

struct RenderJob {
    source: RenderSource,
    key: RenderKey,
    dpr: f32,
    gate: Arc<AtomicU32>,
    out: Sender<RenderDelivery>,
}

/// Owns the worker pool and the delivery channel.
pub struct RenderPipeline {
    pool: WorkerPool<RenderJob>,
    out: Sender<RenderDelivery>,
    deliveries: Receiver<RenderDelivery>,
    /// Committed zoom in millis; the validity predicate for every
    /// outstanding task.
    zoom_gate: Arc<AtomicU32>,
    device_pixel_ratio: f32,
}

impl RenderPipeline {
    pub fn new(device_pixel_ratio: f32, config: WorkerPoolConfig) -> Self {
        let (out, deliveries) = channel();
        let executor: vellum_scheduler::JobExecutor<RenderJob> = Arc::new(run_render_job);
        let pool = WorkerPool::new(executor, config);
        Self {
            pool,
            out,
            deliveries,
            zoom_gate: Arc::new(AtomicU32::new(1000)),
            device_pixel_ratio,
        }
    }

    /// Update the gate after a zoom commit; outstanding tasks for other
    /// zoom levels become stale.
    pub fn set_current_zoom(&self, zoom: f32) {
        self.zoom_gate
            .store((zoom * 1000.0).round() as u32, Ordering::Release);
    }

    /// Schedule a two-pass render. The caller is responsible for the
    /// pending-set check; duplicate keys must not be submitted.
    pub fn schedule(&self, source: RenderSource, key: RenderKey) {
        self.pool.submit(RenderJob {
            source,
            key,
            dpr: self.device_pixel_ratio,
            gate: self.zoom_gate.clone(),
            out: self.out.clone(),
        });
    }

    /// Drain finished passes without blocking.
    pub fn drain(&self) -> Vec<RenderDelivery> {
        let mut out = Vec::new();
        loop {
            match self.deliveries.try_recv() {
                Ok(delivery) => out.push(delivery),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        out
    }

    pub fn queued(&self) -> usize {
        self.pool.queued()
    }
}

/// Worker-side body: open, render low, render high, with gate checks
/// before each pass. The handle closes on drop whatever happens.
fn run_render_job(job: RenderJob) {
    let still_current = |gate: &AtomicU32| gate.load(Ordering::Acquire) == job.key.zoom_millis;

    if !still_current(&job.gate) {
        tracing::debug!(page = job.key.page, "render task stale before open, skipping");
        return;
    }

    let doc = match RenderDocument::open(&job.source) {
        Ok(doc) => doc,
        Err(err) => {
            tracing::warn!(page = job.key.page, %err, "failed to open render document");
            return;
        }
    };
    let zoom = job.key.zoom();

    // Fast pass for immediate visual feedback.
    match doc.render_page(job.key.page, zoom * job.dpr * PREVIEW_SCALE, None) {
        Ok(image) => {
            let _ = job.out.send(RenderDelivery { key: job.key, image, high_res: false });
        }
        Err(err) => {
            tracing::warn!(page = job.key.page, %err, "preview render failed");
        }
    }

    if !still_current(&job.gate) {
        tracing::debug!(page = job.key.page, "render task stale before final pass");
        return;
    }

    match doc.render_page(job.key.page, zoom * job.dpr, None) {
        Ok(image) => {
            let _ = job.out.send(RenderDelivery { key: job.key, image, high_res: true });
        }
        Err(err) => {
            tracing::warn!(page = job.key.page, %err, "final render failed");
        }
    }
}
