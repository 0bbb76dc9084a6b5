//! Document mutation engines
//!
//! Everything that changes a document or derives editable structure from
//! it: coordinate transforms, typed style configuration, character-level
//! wrapping, font resolution, FreeText annotation mutation, overlay
//! stamps, and in-place editing of native page text.

pub mod annotation;
pub mod fonts;
pub mod geometry;
pub mod stamp;
pub mod style;
pub mod text_edit;
pub mod wrap;

pub use annotation::{AnnotationEngine, MutationError};
pub use fonts::{FontCatalog, ResolvedFont};
pub use geometry::{point_to_document, rect_to_document, to_screen, ScreenPoint, ScreenRect};
pub use stamp::{OverlayStamp, StampId, StampStore};
pub use style::FreeTextStyle;
pub use text_edit::{CommitOutcome, TextEditEngine, TextEditError, TextLine};
pub use wrap::char_wrap;
