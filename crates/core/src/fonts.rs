//! Font catalog and replacement-font resolution
//!
//! Editing native text needs a font whose metrics match the original as
//! closely as possible. Resolution cascades through three tiers:
//!
//! 1. the exact font program embedded in the document (skipping subset
//!    fonts, which may be missing glyphs the replacement text needs),
//! 2. an installed system font file mapped from the original font's
//!    family name and weight/style keywords,
//! 3. a built-in generic face: a CJK-capable one for CJK text,
//!    otherwise a sans/serif/mono pick by name keyword.
//!
//! Insertion never fails for lack of a font: tier 3 always resolves.
//! A mismatched face is considered better than a blank line.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use vellum_engine::Document;

/// Built-in generic faces (tier 3).
pub const BUILTIN_SANS: &str = "helv";
pub const BUILTIN_SERIF: &str = "tiro";
pub const BUILTIN_MONO: &str = "cour";
pub const BUILTIN_CJK: &str = "korea";

/// A font chosen for text insertion.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedFont {
    pub name: String,
    /// Raw font program bytes when a file-backed font was found.
    pub file: Option<Vec<u8>>,
}

impl ResolvedFont {
    fn builtin(name: &str) -> Self {
        Self { name: name.to_string(), file: None }
    }
}

/// Does the text contain characters beyond the Latin-1 supplement range
/// the base fonts cover?
pub fn has_cjk(text: &str) -> bool {
    text.chars().any(|c| c as u32 > 0x2E7F)
}

fn has_korean(text: &str) -> bool {
    text.chars().any(|c| {
        let cp = c as u32;
        (0xAC00..=0xD7AF).contains(&cp) || (0x3131..=0x318E).contains(&cp)
    })
}

/// Font name for a new FreeText annotation.
///
/// CJK text forces the built-in CJK-capable face; otherwise common
/// aliases collapse onto the base-font names the engine writes.
pub fn free_text_font(text: &str, requested: &str) -> String {
    if has_cjk(text) {
        return BUILTIN_CJK.to_string();
    }
    let name = if requested.is_empty() { BUILTIN_SANS } else { requested };
    match name.to_ascii_lowercase().as_str() {
        "helvetica" | "arial" => BUILTIN_SANS.to_string(),
        "courier" => BUILTIN_MONO.to_string(),
        "times" | "times-roman" => BUILTIN_SERIF.to_string(),
        _ => name.to_string(),
    }
}

fn squash(name: &str) -> String {
    name.to_ascii_lowercase()
        .chars()
        .filter(|c| !matches!(c, '-' | '_' | ' '))
        .collect()
}

fn is_bold(squashed: &str) -> bool {
    squashed.contains("bold") || squashed.contains("heavy") || squashed.contains("black")
}

fn is_italic(squashed: &str) -> bool {
    squashed.contains("italic") || squashed.contains("oblique")
}

fn is_light(squashed: &str) -> bool {
    squashed.contains("light") || squashed.contains("thin")
}

/// CJK families: (keyword, regular, bold, light).
const CJK_FONT_MAP: &[(&str, &str, &str, &str)] = &[
    ("malgun", "malgun.ttf", "malgunbd.ttf", "malgunsl.ttf"),
    ("gothic", "malgun.ttf", "malgunbd.ttf", "malgunsl.ttf"),
    ("gulim", "gulim.ttc", "gulim.ttc", "gulim.ttc"),
    ("dotum", "gulim.ttc", "gulim.ttc", "gulim.ttc"),
    ("batang", "batang.ttc", "batang.ttc", "batang.ttc"),
    ("myeongjo", "batang.ttc", "batang.ttc", "batang.ttc"),
    ("nanum", "NanumGothic.ttf", "NanumGothicBold.ttf", "NanumGothicLight.ttf"),
    ("noto", "NotoSansCJK-Regular.ttc", "NotoSansCJK-Bold.ttc", "NotoSansCJK-Light.ttc"),
];

/// Latin families: (keyword, regular, bold, italic, bolditalic).
const LATIN_FONT_MAP: &[(&str, &str, &str, &str, &str)] = &[
    ("arial", "arial.ttf", "arialbd.ttf", "ariali.ttf", "arialbi.ttf"),
    ("helvetica", "arial.ttf", "arialbd.ttf", "ariali.ttf", "arialbi.ttf"),
    ("calibri", "calibri.ttf", "calibrib.ttf", "calibrii.ttf", "calibriz.ttf"),
    ("cambria", "cambria.ttc", "cambriab.ttf", "cambriai.ttf", "cambriaz.ttf"),
    ("times", "times.ttf", "timesbd.ttf", "timesi.ttf", "timesbi.ttf"),
    ("georgia", "georgia.ttf", "georgiab.ttf", "georgiai.ttf", "georgiaz.ttf"),
    ("verdana", "verdana.ttf", "verdanab.ttf", "verdanai.ttf", "verdanaz.ttf"),
    ("tahoma", "tahoma.ttf", "tahomabd.ttf", "tahoma.ttf", "tahomabd.ttf"),
    ("segoe", "segoeui.ttf", "segoeuib.ttf", "segoeuii.ttf", "segoeuiz.ttf"),
    ("consola", "consola.ttf", "consolab.ttf", "consolai.ttf", "consolaz.ttf"),
    ("courier", "cour.ttf", "courbd.ttf", "couri.ttf", "courbi.ttf"),
    ("mono", "consola.ttf", "consolab.ttf", "consolai.ttf", "consolaz.ttf"),
    ("dejavu", "DejaVuSans.ttf", "DejaVuSans-Bold.ttf", "DejaVuSans-Oblique.ttf", "DejaVuSans-BoldOblique.ttf"),
    ("liberation", "LiberationSans-Regular.ttf", "LiberationSans-Bold.ttf", "LiberationSans-Italic.ttf", "LiberationSans-BoldItalic.ttf"),
];

/// Process-wide, lazily populated index of installed font files.
///
/// Consumers must not assume synchronous availability: population is an
/// explicit `warm_up`/`ensure_loaded` call, and `is_loaded` reports
/// readiness. Until loaded, lookups miss and resolution falls through to
/// the built-in tier. Injected by `Arc` into whoever needs it rather
/// than accessed as ambient global state.
pub struct FontCatalog {
    roots: Vec<PathBuf>,
    /// lowercase file name → full path
    files: Mutex<HashMap<String, PathBuf>>,
    loaded: AtomicBool,
}

impl FontCatalog {
    pub fn new(roots: Vec<PathBuf>) -> Self {
        Self { roots, files: Mutex::new(HashMap::new()), loaded: AtomicBool::new(false) }
    }

    /// Catalog over the platform's standard font directories.
    pub fn with_system_roots() -> Self {
        let mut roots = Vec::new();
        #[cfg(target_os = "windows")]
        {
            let windir = std::env::var("WINDIR").unwrap_or_else(|_| "C:\\Windows".to_string());
            roots.push(PathBuf::from(windir).join("Fonts"));
        }
        #[cfg(target_os = "macos")]
        {
            roots.push(PathBuf::from("/System/Library/Fonts"));
            roots.push(PathBuf::from("/Library/Fonts"));
        }
        #[cfg(not(any(target_os = "windows", target_os = "macos")))]
        {
            roots.push(PathBuf::from("/usr/share/fonts"));
            roots.push(PathBuf::from("/usr/local/share/fonts"));
        }
        if let Ok(home) = std::env::var("HOME") {
            roots.push(PathBuf::from(home).join(".fonts"));
        }
        Self::new(roots)
    }

    /// Populate the index on a background thread.
    pub fn warm_up(self: std::sync::Arc<Self>) {
        if self.loaded.load(Ordering::Acquire) {
            return;
        }
        std::thread::Builder::new()
            .name("vellum-font-scan".into())
            .spawn(move || self.ensure_loaded())
            .ok();
    }

    /// Populate the index, blocking. Idempotent.
    pub fn ensure_loaded(&self) {
        if self.loaded.swap(true, Ordering::AcqRel) {
            return;
        }
        let mut found = HashMap::new();
        for root in &self.roots {
            scan_dir(root, 0, &mut found);
        }
        tracing::debug!(files = found.len(), "font catalog populated");
        *self.files.lock().unwrap() = found;
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::Acquire)
    }

    /// Look up a font file by its file name (case-insensitive).
    pub fn find_file(&self, file_name: &str) -> Option<PathBuf> {
        self.files
            .lock()
            .unwrap()
            .get(&file_name.to_ascii_lowercase())
            .cloned()
    }
}

fn scan_dir(dir: &Path, depth: usize, out: &mut HashMap<String, PathBuf>) {
    if depth > 4 {
        return;
    }
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            scan_dir(&path, depth + 1, out);
            continue;
        }
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            continue;
        };
        if matches!(ext.to_ascii_lowercase().as_str(), "ttf" | "ttc" | "otf") {
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                out.entry(name.to_ascii_lowercase()).or_insert(path.clone());
            }
        }
    }
}

/// Resolve a replacement font for editing native text.
///
/// `extracted_cache` memoizes embedded-font extraction per base name so
/// repeated edits against the same font do not re-walk the font
/// dictionaries.
pub fn resolve_replacement_font(
    doc: &Document,
    original_font: &str,
    text: &str,
    catalog: &FontCatalog,
    extracted_cache: &mut HashMap<String, Vec<u8>>,
) -> ResolvedFont {
    // Tier 1: reuse the embedded font program. Subset fonts (marked by
    // the `ABCDEF+` name prefix) may be missing glyphs and are skipped.
    let is_subset = original_font.contains('+');
    if !is_subset && !original_font.is_empty() {
        if let Some(bytes) = extracted_cache.get(original_font) {
            return ResolvedFont { name: original_font.to_string(), file: Some(bytes.clone()) };
        }
        if let Some(bytes) = doc.extract_font(original_font) {
            if bytes.len() >= 100 {
                extracted_cache.insert(original_font.to_string(), bytes.clone());
                return ResolvedFont { name: original_font.to_string(), file: Some(bytes) };
            }
        }
    }

    // Tier 2: map the family name onto an installed font file.
    if let Some(found) = map_system_font(original_font, text, catalog) {
        return found;
    }
    tracing::debug!(font = original_font, "no system font match, using built-in fallback");

    // Tier 3: built-in generic faces.
    let squashed = squash(original_font);
    if has_cjk(text) {
        return ResolvedFont::builtin(BUILTIN_CJK);
    }
    if squashed.contains("courier") || squashed.contains("mono") || squashed.contains("consol") {
        return ResolvedFont::builtin(BUILTIN_MONO);
    }
    if squashed.contains("times") || (squashed.contains("serif") && !squashed.contains("sans")) {
        return ResolvedFont::builtin(BUILTIN_SERIF);
    }
    ResolvedFont::builtin(BUILTIN_SANS)
}

fn map_system_font(original_font: &str, text: &str, catalog: &FontCatalog) -> Option<ResolvedFont> {
    let squashed = squash(original_font);
    let bold = is_bold(&squashed);
    let italic = is_italic(&squashed);
    let light = is_light(&squashed);

    let candidates: Vec<&str> = if has_cjk(text) {
        let mut files = Vec::new();
        for (keyword, regular, bold_file, light_file) in CJK_FONT_MAP {
            if squashed.contains(keyword) {
                files.push(if bold {
                    *bold_file
                } else if light {
                    *light_file
                } else {
                    *regular
                });
                files.push(*regular);
                break;
            }
        }
        // Unrecognized CJK family: try the common defaults by weight.
        if files.is_empty() {
            if bold {
                files.push("malgunbd.ttf");
            } else if light {
                files.push("malgunsl.ttf");
            }
            files.push("malgun.ttf");
            files.push("NotoSansCJK-Regular.ttc");
        }
        files
    } else {
        let mut files = Vec::new();
        for (keyword, regular, bold_file, italic_file, bold_italic) in LATIN_FONT_MAP {
            if squashed.contains(keyword) {
                files.push(if bold && italic {
                    *bold_italic
                } else if bold {
                    *bold_file
                } else if italic {
                    *italic_file
                } else {
                    *regular
                });
                files.push(*regular);
                break;
            }
        }
        if files.is_empty() {
            files.push(if bold { "arialbd.ttf" } else { "arial.ttf" });
            files.push("DejaVuSans.ttf");
        }
        files
    };

    for file_name in candidates {
        let Some(path) = catalog.find_file(file_name) else {
            continue;
        };
        match std::fs::read(&path) {
            Ok(bytes) => {
                let stem = Path::new(file_name)
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .unwrap_or(file_name)
                    .to_string();
                return Some(ResolvedFont { name: stem, file: Some(bytes) });
            }
            Err(err) => {
                tracing::warn!(path = %path.display(), %err, "failed to read font file");
            }
        }
    }
    None
}
