//! Typed style configuration for FreeText annotations.

use serde::{Deserialize, Serialize};
use vellum_engine::RgbColor;

/// Style for creating or updating a FreeText annotation.
///
/// Replaces the ad-hoc per-call dictionaries of older revisions with a
/// validated struct: the font size is clamped to a sane range at
/// construction and the text is stored verbatim (unwrapped).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FreeTextStyle {
    pub text: String,
    pub font_name: String,
    pub font_size: f32,
    /// RGB in 0.0..=1.0.
    pub color: [f32; 3],
}

impl FreeTextStyle {
    pub const MIN_FONT_SIZE: f32 = 4.0;
    pub const MAX_FONT_SIZE: f32 = 144.0;

    pub fn new(text: impl Into<String>, font_name: impl Into<String>, font_size: f32) -> Self {
        Self {
            text: text.into(),
            font_name: font_name.into(),
            font_size: font_size.clamp(Self::MIN_FONT_SIZE, Self::MAX_FONT_SIZE),
            color: [0.0, 0.0, 0.0],
        }
    }

    pub fn with_color(mut self, r: f32, g: f32, b: f32) -> Self {
        self.color = [r.clamp(0.0, 1.0), g.clamp(0.0, 1.0), b.clamp(0.0, 1.0)];
        self
    }

    pub fn rgb(&self) -> RgbColor {
        RgbColor::new(self.color[0], self.color[1], self.color[2])
    }
}

impl Default for FreeTextStyle {
    fn default() -> Self {
        Self::new("", "helv", 14.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn font_size_is_clamped() {
        assert_eq!(FreeTextStyle::new("x", "helv", 0.5).font_size, 4.0);
        assert_eq!(FreeTextStyle::new("x", "helv", 500.0).font_size, 144.0);
        assert_eq!(FreeTextStyle::new("x", "helv", 14.0).font_size, 14.0);
    }

    #[test]
    fn color_components_are_clamped() {
        let style = FreeTextStyle::new("x", "helv", 14.0).with_color(2.0, -1.0, 0.5);
        assert_eq!(style.color, [1.0, 0.0, 0.5]);
    }
}
