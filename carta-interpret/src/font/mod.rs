//! Font resolution: deduplication of font dictionaries, repair of embedded
//! programs and derivation of the char-code tables text showing needs.
//!
//! Resolution never fails. A dictionary that cannot be translated yields an
//! error font that maps every code to a zero-width missing glyph, and the
//! degradation is surfaced through the warning sink.

use crate::{DocumentContext, UnsupportedFeature};
use bitflags::bitflags;
use carta_syntax::{Dict, Object, ObjRef, Stream};
use rustc_hash::{FxHashMap, FxHashSet};
use siphasher::sip::SipHasher13;
use std::hash::Hasher;
use std::sync::{Arc, Mutex, OnceLock};

pub(crate) mod encoding;
mod to_unicode;
mod translate;

pub use to_unicode::ToUnicodeMap;

use translate::{Translation, translate};

bitflags! {
    /// The FontDescriptor flag bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FontFlags: u32 {
        const FIXED_PITCH = 1 << 0;
        const SERIF = 1 << 1;
        const SYMBOLIC = 1 << 2;
        const SCRIPT = 1 << 3;
        const NONSYMBOLIC = 1 << 5;
        const ITALIC = 1 << 6;
        const ALL_CAP = 1 << 16;
        const SMALL_CAP = 1 << 17;
        const FORCE_BOLD = 1 << 18;
    }
}

/// A composed-glyph (seac) pair, stored by the char code that triggers it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeacPair {
    pub base_font_char: u32,
    pub accent_font_char: u32,
    pub accent_offset: (f64, f64),
}

/// The accent half of a composed glyph, positioned relative to the base.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Accent {
    pub font_char: u32,
    pub offset: (f64, f64),
}

/// One mapped glyph, as carried on the operator-list tape.
#[derive(Debug, Clone, PartialEq)]
pub struct Glyph {
    /// The char code in the rebuilt font's cmap.
    pub font_char: u32,
    pub unicode: String,
    pub width: f64,
    pub vmetric: Option<[f64; 3]>,
    pub accent: Option<Accent>,
    pub is_space: bool,
    /// Whether the code resolves to a live glyph in the font program.
    pub is_in_font: bool,
}

/// A resolved font: the immutable translation result plus a lazily filled
/// glyph cache.
pub struct Font {
    /// Document-unique id, used as the tape dependency key.
    pub load_id: String,
    pub name: String,
    pub is_composite: bool,
    pub is_type3: bool,
    pub is_error: bool,
    pub flags: FontFlags,
    pub font_matrix: [f64; 6],
    pub bbox: [f64; 4],
    pub ascent: f64,
    pub descent: f64,
    /// The repaired, OpenType-wrapped program, ready for a rasterizer.
    pub data: Option<Arc<[u8]>>,
    first_char: u32,
    last_char: u32,
    widths: FxHashMap<u32, f64>,
    default_width: f64,
    vmetrics: FxHashMap<u32, [f64; 3]>,
    default_vmetric: Option<[f64; 3]>,
    to_unicode: ToUnicodeMap,
    to_font_char: FxHashMap<u32, u32>,
    present: FxHashSet<u32>,
    seacs: FxHashMap<u32, SeacPair>,
    type3_procs: FxHashMap<u32, Stream>,
    glyphs: Mutex<FxHashMap<u32, Glyph>>,
    space_width: OnceLock<f64>,
}

impl Font {
    fn from_translation(load_id: String, t: Translation) -> Self {
        Self {
            load_id,
            name: t.name,
            is_composite: t.is_composite,
            is_type3: t.is_type3,
            is_error: false,
            flags: t.flags,
            font_matrix: t.font_matrix,
            bbox: t.bbox,
            ascent: t.ascent,
            descent: t.descent,
            data: t.data,
            first_char: t.first_char,
            last_char: t.last_char,
            widths: t.widths,
            default_width: t.default_width,
            vmetrics: t.vmetrics,
            default_vmetric: t.default_vmetric,
            to_unicode: t.to_unicode,
            to_font_char: t.to_font_char,
            present: t.present,
            seacs: t.seacs,
            type3_procs: t.type3_procs,
            glyphs: Mutex::new(FxHashMap::default()),
            space_width: OnceLock::new(),
        }
    }

    /// A font that draws nothing but keeps text showing structurally valid.
    fn error(load_id: String) -> Self {
        Self {
            load_id,
            name: String::new(),
            is_composite: false,
            is_type3: false,
            is_error: true,
            flags: FontFlags::empty(),
            font_matrix: [0.001, 0.0, 0.0, 0.001, 0.0, 0.0],
            bbox: [0.0; 4],
            ascent: 0.0,
            descent: 0.0,
            data: None,
            first_char: 0,
            last_char: 255,
            widths: FxHashMap::default(),
            default_width: 0.0,
            vmetrics: FxHashMap::default(),
            default_vmetric: None,
            to_unicode: ToUnicodeMap::identity(0, 255),
            to_font_char: FxHashMap::default(),
            present: FxHashSet::default(),
            seacs: FxHashMap::default(),
            type3_procs: FxHashMap::default(),
            glyphs: Mutex::new(FxHashMap::default()),
            space_width: OnceLock::new(),
        }
    }

    /// Split a string operand into char codes. Composite fonts consume
    /// two-byte big-endian codes; simple fonts one byte per code.
    pub fn char_codes(&self, bytes: &[u8]) -> Vec<u32> {
        if self.is_composite {
            bytes
                .chunks(2)
                .map(|c| match c {
                    [hi, lo] => (*hi as u32) << 8 | *lo as u32,
                    [hi] => (*hi as u32) << 8,
                    _ => 0,
                })
                .collect()
        } else {
            bytes.iter().map(|b| *b as u32).collect()
        }
    }

    /// The mapped glyph for a char code, cached after the first lookup.
    pub fn glyph(&self, code: u32) -> Glyph {
        if let Ok(cache) = self.glyphs.lock() {
            if let Some(g) = cache.get(&code) {
                return g.clone();
            }
        }

        let glyph = self.build_glyph(code);

        if let Ok(mut cache) = self.glyphs.lock() {
            cache.insert(code, glyph.clone());
        }

        glyph
    }

    pub fn glyphs_for(&self, bytes: &[u8]) -> Vec<Glyph> {
        self.char_codes(bytes)
            .into_iter()
            .map(|c| self.glyph(c))
            .collect()
    }

    fn build_glyph(&self, code: u32) -> Glyph {
        let width = self.width_of(code);
        let unicode = self
            .to_unicode
            .get(code)
            .or_else(|| char::from_u32(code).map(String::from))
            .unwrap_or_default();

        let mut font_char = self.to_font_char.get(&code).copied().unwrap_or(code);
        let mut accent = None;

        // A seac glyph is shown as its base with the accent overlaid.
        if let Some(seac) = self.seacs.get(&code) {
            let resolve = |c: u32| self.to_font_char.get(&c).copied().unwrap_or(c);
            font_char = resolve(seac.base_font_char);
            accent = Some(Accent {
                font_char: resolve(seac.accent_font_char),
                offset: seac.accent_offset,
            });
        }

        let vmetric = if self.is_composite {
            self.vmetrics
                .get(&code)
                .copied()
                .or(self.default_vmetric)
        } else {
            None
        };

        Glyph {
            font_char,
            is_space: unicode == " ",
            unicode,
            width,
            vmetric,
            accent,
            is_in_font: self.present.contains(&code),
        }
    }

    pub fn width_of(&self, code: u32) -> f64 {
        self.widths.get(&code).copied().unwrap_or(self.default_width)
    }

    pub fn to_unicode(&self, code: u32) -> Option<String> {
        self.to_unicode.get(code)
    }

    /// The glyph procedure for a Type3 char code.
    pub fn type3_proc(&self, code: u32) -> Option<&Stream> {
        self.type3_procs.get(&code)
    }

    /// The advance of the font's space glyph, in glyph-space units.
    ///
    /// Zero when the font has no identifiable space.
    pub fn space_width(&self) -> f64 {
        *self.space_width.get_or_init(|| {
            // Code 32 is space in every standard encoding; otherwise scan
            // the mapped codes for one that reads as a space.
            if self.to_unicode.get(32).as_deref() == Some(" ") {
                return self.width_of(32);
            }

            (self.first_char..=self.last_char.min(self.first_char + 0xFFFF))
                .find(|c| self.to_unicode.get(*c).as_deref() == Some(" "))
                .map(|c| self.width_of(c))
                .unwrap_or(0.0)
        })
    }
}

impl std::fmt::Debug for Font {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Font")
            .field("load_id", &self.load_id)
            .field("name", &self.name)
            .field("is_composite", &self.is_composite)
            .field("is_type3", &self.is_type3)
            .field("is_error", &self.is_error)
            .finish_non_exhaustive()
    }
}

/// The document-level font cache.
///
/// Fonts are cached twice: by the indirect reference of their dictionary,
/// and by a structural hash of the dictionary's contents. The second level
/// aliases fonts that producers duplicated under distinct objects, so equal
/// dictionaries always resolve to the same [`Font`].
#[derive(Default)]
pub(crate) struct FontCache {
    by_ref: Mutex<FxHashMap<ObjRef, Arc<Font>>>,
    by_hash: Mutex<FxHashMap<u64, Arc<Font>>>,
}

impl FontCache {
    pub(crate) fn resolve(
        &self,
        ctx: &DocumentContext,
        dict: &Dict,
        reference: Option<ObjRef>,
    ) -> Arc<Font> {
        if let Some(r) = reference {
            if let Ok(by_ref) = self.by_ref.lock() {
                if let Some(font) = by_ref.get(&r) {
                    return font.clone();
                }
            }
        }

        let hash = structural_hash(dict);

        let font = if let Some(existing) = self
            .by_hash
            .lock()
            .ok()
            .and_then(|m| m.get(&hash).cloned())
        {
            existing
        } else {
            let font = match translate(dict) {
                Some(t) => Font::from_translation(ctx.next_id("f"), t),
                None => {
                    ctx.warn_unsupported(UnsupportedFeature::Font);
                    Font::error(ctx.next_id("f"))
                }
            };
            let font = Arc::new(font);

            if let Ok(mut by_hash) = self.by_hash.lock() {
                by_hash.insert(hash, font.clone());
            }

            font
        };

        if let Some(r) = reference {
            if let Ok(mut by_ref) = self.by_ref.lock() {
                by_ref.insert(r, font.clone());
            }
        }

        font
    }
}

/// A content hash over the resolved dictionary, insensitive to object
/// numbering and key order.
fn structural_hash(dict: &Dict) -> u64 {
    let mut hasher = SipHasher13::new();
    hash_dict(&mut hasher, dict, 0);

    hasher.finish()
}

const MAX_HASH_DEPTH: usize = 8;

fn hash_dict(h: &mut SipHasher13, dict: &Dict, depth: usize) {
    if depth > MAX_HASH_DEPTH {
        return;
    }

    h.write_u8(b'd');

    let mut keys: Vec<_> = dict.keys().collect();
    keys.sort();

    for key in keys {
        h.write(key.as_bytes());

        if let Some(raw) = dict.get_raw(key.as_str()) {
            hash_object(h, &dict.store().resolve(raw), depth + 1);
        }
    }
}

fn hash_object(h: &mut SipHasher13, obj: &Object, depth: usize) {
    if depth > MAX_HASH_DEPTH {
        return;
    }

    match obj {
        Object::Null => h.write_u8(b'0'),
        Object::Bool(b) => {
            h.write_u8(b'b');
            h.write_u8(*b as u8);
        }
        Object::Number(n) => {
            h.write_u8(b'n');
            h.write_u64(n.as_f64().to_bits());
        }
        Object::String(s) => {
            h.write_u8(b's');
            h.write(s);
        }
        Object::Name(n) => {
            h.write_u8(b'/');
            h.write(n.as_bytes());
        }
        Object::Array(a) => {
            h.write_u8(b'a');
            h.write_u64(a.len() as u64);

            for item in a.iter_raw() {
                hash_object(h, &item, depth + 1);
            }
        }
        Object::Dict(d) => hash_dict(h, d, depth),
        Object::Stream(s) => {
            hash_dict(h, s.dict(), depth);
            h.write(&s.decoded());
        }
        // Resolution happens before hashing; a surviving reference is
        // dangling.
        Object::Ref(_) => h.write_u8(b'r'),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use carta_syntax::{Name, Store};

    fn simple_font_dict(store: &Arc<Store>) -> Dict {
        Dict::from_pairs(
            store.clone(),
            vec![
                (Name::new("Subtype"), Object::name("Type1")),
                (Name::new("BaseFont"), Object::name("Helvetica")),
                (Name::new("FirstChar"), Object::int(32)),
                (Name::new("LastChar"), Object::int(126)),
            ],
        )
    }

    #[test]
    fn identical_dicts_alias_to_one_font() {
        let ctx = DocumentContext::default();
        let store = Arc::new(Store::new());

        let a = simple_font_dict(&store);
        let b = simple_font_dict(&store);

        let fa = ctx.fonts.resolve(&ctx, &a, Some(ObjRef::new(10, 0)));
        let fb = ctx.fonts.resolve(&ctx, &b, Some(ObjRef::new(20, 0)));

        assert!(Arc::ptr_eq(&fa, &fb));
        assert_eq!(fa.load_id, fb.load_id);
    }

    #[test]
    fn reference_cache_short_circuits() {
        let ctx = DocumentContext::default();
        let store = Arc::new(Store::new());
        let dict = simple_font_dict(&store);
        let r = ObjRef::new(3, 0);

        let first = ctx.fonts.resolve(&ctx, &dict, Some(r));
        let second = ctx.fonts.resolve(&ctx, &dict, Some(r));

        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn differing_dicts_stay_distinct() {
        let ctx = DocumentContext::default();
        let store = Arc::new(Store::new());

        let a = simple_font_dict(&store);
        let b = Dict::from_pairs(
            store,
            vec![
                (Name::new("Subtype"), Object::name("Type1")),
                (Name::new("BaseFont"), Object::name("Courier")),
            ],
        );

        let fa = ctx.fonts.resolve(&ctx, &a, None);
        let fb = ctx.fonts.resolve(&ctx, &b, None);

        assert!(!Arc::ptr_eq(&fa, &fb));
    }

    #[test]
    fn untranslatable_dict_degrades_to_error_font() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let warnings = Arc::new(AtomicUsize::new(0));
        let sink = warnings.clone();

        let mut settings = crate::EvalSettings::default();
        settings.warning_sink = Arc::new(move |kind| {
            if kind == UnsupportedFeature::Font {
                sink.fetch_add(1, Ordering::Relaxed);
            }
        });

        let ctx = DocumentContext::new(settings);
        let dict = Dict::from_pairs(Arc::new(Store::new()), vec![]);

        let font = ctx.fonts.resolve(&ctx, &dict, None);

        assert!(font.is_error);
        assert_eq!(warnings.load(Ordering::Relaxed), 1);

        // The error font still produces usable glyphs.
        let glyph = font.glyph(65);
        assert_eq!(glyph.width, 0.0);
        assert!(!glyph.is_in_font);
        assert_eq!(glyph.unicode, "A");
    }

    #[test]
    fn char_code_splitting() {
        let ctx = DocumentContext::default();
        let store = Arc::new(Store::new());

        let simple = ctx
            .fonts
            .resolve(&ctx, &simple_font_dict(&store), None);
        assert_eq!(simple.char_codes(&[0x41, 0x42]), vec![0x41, 0x42]);

        // An error font is simple; composite splitting is exercised through
        // its code path directly.
        let mut composite = Font::error("f9".to_string());
        composite.is_composite = true;
        assert_eq!(composite.char_codes(&[0x04, 0x1C, 0x00, 0x2F]), vec![
            0x041C, 0x002F
        ]);
        // A trailing odd byte is padded, not dropped.
        assert_eq!(composite.char_codes(&[0x04, 0x1C, 0x12]), vec![
            0x041C, 0x1200
        ]);
    }

    #[test]
    fn glyph_lookup_is_cached_and_stable() {
        let ctx = DocumentContext::default();
        let store = Arc::new(Store::new());
        let font = ctx.fonts.resolve(&ctx, &simple_font_dict(&store), None);

        let a = font.glyph(65);
        let b = font.glyph(65);

        assert_eq!(a, b);
        assert_eq!(a.unicode, "A");
    }

    #[test]
    fn space_width_detection() {
        let ctx = DocumentContext::default();
        let store = Arc::new(Store::new());

        let widths = Object::Array(carta_syntax::Array::from_objects(
            store.clone(),
            (32..=126).map(|c| Object::int(if c == 32 { 250 } else { 500 })).collect(),
        ));
        let dict = Dict::from_pairs(
            store,
            vec![
                (Name::new("Subtype"), Object::name("Type1")),
                (Name::new("BaseFont"), Object::name("Helvetica")),
                (Name::new("FirstChar"), Object::int(32)),
                (Name::new("LastChar"), Object::int(126)),
                (Name::new("Widths"), widths),
            ],
        );

        let font = ctx.fonts.resolve(&ctx, &dict, None);
        assert_eq!(font.space_width(), 250.0);
    }
}
