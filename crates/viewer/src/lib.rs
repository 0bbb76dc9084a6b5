//! Continuous-scroll PDF view core
//!
//! The interactive page-rendering and annotation-manipulation engine:
//! virtualized page layout, a committed/visual/target zoom controller,
//! an asynchronous two-pass render pipeline over immutable document
//! snapshots, hit-testing and drag/resize interaction, and the
//! [`PdfView`] facade the host application drives with input events and
//! a periodic tick.
//!
//! The host owns the window, scrollbars and actual painting; this crate
//! produces a [`Scene`] paint plan per frame and a queue of
//! [`ViewerEvent`] notifications.

pub mod interaction;
pub mod layout;
pub mod pipeline;
pub mod scene;
pub mod view;
pub mod zoom;

pub use interaction::{Corner, CursorHint, HitResult, HitTarget, Mode, HANDLE_SIZE};
pub use layout::{PageLayout, PAGE_GAP, VISIBLE_BUFFER};
pub use pipeline::{RenderDelivery, RenderPipeline};
pub use scene::{PageImagery, PageQuad, Scene};
pub use view::{CropCallback, MouseButton, PdfView, Viewport, ViewerEvent, WheelDelta};
pub use zoom::{ZoomController, ZoomPhase, MAX_ZOOM, MIN_ZOOM};
