//! Built-in glyph metrics
//!
//! Width table used for text measurement wherever the engine needs glyph
//! advances: content-stream text insertion, character-layout extraction
//! and annotation sizing. Widths are the Helvetica AFM advances for
//! printable ASCII; CJK and other fullwidth codepoints use 1.0 em and
//! everything else falls back to 0.6 em. Keeping one table shared across
//! write and read paths makes measurements self-consistent.

/// Helvetica advance widths for U+0020..=U+007E, in 1/1000 em.
const ASCII_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, // ' '..'/'
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, // '0'..'9'
    278, 278, 584, 584, 584, 556, 1015, // ':'..'@'
    667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778, 667, // 'A'..'P'
    778, 722, 667, 611, 722, 667, 944, 667, 667, 611, // 'Q'..'Z'
    278, 278, 278, 469, 556, 333, // '['..'`'
    556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556, 556, // 'a'..'p'
    556, 333, 500, 278, 556, 500, 722, 500, 500, 500, // 'q'..'z'
    334, 260, 334, 584, // '{'..'~'
];

/// Default advance for codepoints without a table entry, in em.
const DEFAULT_ADVANCE_EM: f32 = 0.6;

/// Advance for fullwidth (CJK) codepoints, in em.
const FULLWIDTH_ADVANCE_EM: f32 = 1.0;

fn is_fullwidth(ch: char) -> bool {
    // CJK ideographs, Hangul, kana and fullwidth forms.
    matches!(ch as u32,
        0x1100..=0x115F
        | 0x2E80..=0x9FFF
        | 0xAC00..=0xD7AF
        | 0xF900..=0xFAFF
        | 0xFF00..=0xFF60)
}

/// Advance width of a single glyph at the given font size, in points.
pub fn glyph_advance(ch: char, font_size: f32) -> f32 {
    let code = ch as u32;
    let em = if (0x20..=0x7E).contains(&code) {
        ASCII_WIDTHS[(code - 0x20) as usize] as f32 / 1000.0
    } else if is_fullwidth(ch) {
        FULLWIDTH_ADVANCE_EM
    } else {
        DEFAULT_ADVANCE_EM
    };
    em * font_size
}

/// Total advance width of a string at the given font size, in points.
pub fn text_width(text: &str, font_size: f32) -> f32 {
    text.chars().map(|ch| glyph_advance(ch, font_size)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_widths_match_table() {
        assert!((glyph_advance(' ', 1000.0) - 278.0).abs() < f32::EPSILON);
        assert!((glyph_advance('W', 1000.0) - 944.0).abs() < f32::EPSILON);
        assert!((glyph_advance('i', 1000.0) - 222.0).abs() < f32::EPSILON);
    }

    #[test]
    fn fullwidth_chars_use_full_em() {
        assert_eq!(glyph_advance('한', 10.0), 10.0);
        assert_eq!(glyph_advance('漢', 12.0), 12.0);
    }

    #[test]
    fn text_width_sums_advances() {
        let expected = glyph_advance('H', 14.0) + glyph_advance('i', 14.0);
        assert!((text_width("Hi", 14.0) - expected).abs() < 1e-4);
    }

    #[test]
    fn unknown_codepoints_fall_back() {
        assert_eq!(glyph_advance('\u{0394}', 10.0), 6.0);
    }
}
