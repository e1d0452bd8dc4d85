//! Translation of a font dictionary plus its embedded program into the
//! immutable [`Font`](super::Font) record.
//!
//! Embedded programs are repaired through `carta-font` and re-wrapped into
//! OpenType containers with a cmap synthesized from the char-code mapping
//! derived here. Fonts without a program fall back to standard-font metrics
//! chosen by name heuristics.

use super::encoding::{BaseEncoding, glyph_index_from_name, glyph_to_unicode};
use super::to_unicode::{self, ToUnicodeMap};
use super::{FontFlags, SeacPair};
use crate::util::OptionLog;
use carta_font::charstring::{Seac, transcode};
use carta_font::cff::{Cff, compile_type1};
use carta_font::truetype::TrueTypeFont;
use carta_font::type1::Type1Font;
use carta_font::{FontKind, opentype, sniff};
use carta_syntax::{Array, Dict, Name, Object, Stream};
use log::warn;
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// The private-use area used for char codes without real semantics.
const PUA_START: u32 = 0xE000;
const PUA_END: u32 = 0xF8FF;

/// Everything a [`Font`](super::Font) is constructed from.
pub(crate) struct Translation {
    pub name: String,
    pub is_composite: bool,
    pub is_type3: bool,
    pub flags: FontFlags,
    pub font_matrix: [f64; 6],
    pub bbox: [f64; 4],
    pub ascent: f64,
    pub descent: f64,
    pub first_char: u32,
    pub last_char: u32,
    pub widths: FxHashMap<u32, f64>,
    pub default_width: f64,
    pub vmetrics: FxHashMap<u32, [f64; 3]>,
    pub default_vmetric: Option<[f64; 3]>,
    pub to_unicode: ToUnicodeMap,
    /// Char code to the char code used in the rebuilt font's cmap.
    pub to_font_char: FxHashMap<u32, u32>,
    /// Char codes that resolve to a live glyph in the program.
    pub present: rustc_hash::FxHashSet<u32>,
    pub seacs: FxHashMap<u32, SeacPair>,
    /// Repaired, re-wrapped font program.
    pub data: Option<Arc<[u8]>>,
    /// Type3 glyph procedure streams by char code.
    pub type3_procs: FxHashMap<u32, Stream>,
}

/// A repaired embedded program, behind one glyph-lookup surface.
enum Program {
    TrueType(TrueTypeFont),
    /// A compiled CFF blob with its charset in glyph-id order.
    Cff {
        blob: Vec<u8>,
        names: Vec<String>,
        cff: Option<Cff>,
        seacs: FxHashMap<u16, Seac>,
        num_glyphs: u16,
    },
}

impl Program {
    fn num_glyphs(&self) -> u16 {
        match self {
            Self::TrueType(tt) => tt.num_glyphs(),
            Self::Cff { num_glyphs, .. } => *num_glyphs,
        }
    }

    fn gid_by_name(&self, name: &str) -> Option<u16> {
        match self {
            Self::TrueType(tt) => tt.glyph_index_by_name(name),
            Self::Cff { names, cff, .. } => {
                if let Some(i) = names.iter().position(|n| n == name) {
                    return Some(i as u16);
                }

                cff.as_ref().and_then(|c| c.glyph_id_by_name(name))
            }
        }
    }

    fn gid_by_unicode(&self, c: char) -> Option<u16> {
        match self {
            Self::TrueType(tt) => tt
                .mappings()
                .iter()
                .find(|(code, _)| *code == c as u32)
                .map(|(_, gid)| *gid),
            Self::Cff { .. } => None,
        }
    }

    /// Direct char-code lookup in the program's own cmap, with the
    /// symbolic-font 0xF0xx convention tried as well.
    fn gid_by_code(&self, code: u32) -> Option<u16> {
        match self {
            Self::TrueType(tt) => tt
                .mappings()
                .iter()
                .find(|(c, _)| *c == code || *c == 0xF000 | code)
                .map(|(_, gid)| *gid),
            Self::Cff { .. } => None,
        }
    }

    fn glyph_exists(&self, gid: u16) -> bool {
        if gid >= self.num_glyphs() {
            return false;
        }

        match self {
            Self::TrueType(tt) => tt.glyph_present(gid),
            Self::Cff { .. } => true,
        }
    }
}

pub(crate) fn translate(dict: &Dict) -> Option<Translation> {
    let subtype = dict.get::<Name>("Subtype")?;

    if subtype.as_str() == "Type3" {
        return translate_type3(dict);
    }

    let is_composite = subtype.as_str() == "Type0";

    // For composite fonts the descriptor, widths and program live on the
    // descendant.
    let descendant = if is_composite {
        Some(
            dict.get::<Array>("DescendantFonts")
                .warn_none("Type0 font without descendants")?
                .get::<Dict>(0)?,
        )
    } else {
        None
    };
    let base = descendant.as_ref().unwrap_or(dict);

    let name = base
        .get::<Name>("BaseFont")
        .or_else(|| dict.get::<Name>("BaseFont"))
        .map(|n| strip_subset_prefix(n.as_str()).to_string())
        .unwrap_or_default();

    let descriptor = base.get::<Dict>("FontDescriptor");
    let flags = descriptor
        .as_ref()
        .and_then(|d| d.get::<i64>("Flags"))
        .map(|bits| FontFlags::from_bits_truncate(bits as u32))
        .unwrap_or(FontFlags::empty());

    let mut t = Translation {
        name: name.clone(),
        is_composite,
        is_type3: false,
        flags,
        font_matrix: [0.001, 0.0, 0.0, 0.001, 0.0, 0.0],
        bbox: descriptor
            .as_ref()
            .and_then(|d| rect(d, "FontBBox"))
            .unwrap_or([0.0, 0.0, 0.0, 0.0]),
        ascent: 0.0,
        descent: 0.0,
        first_char: dict.get::<u32>("FirstChar").unwrap_or(0),
        last_char: dict.get::<u32>("LastChar").unwrap_or(255),
        widths: FxHashMap::default(),
        default_width: 0.0,
        vmetrics: FxHashMap::default(),
        default_vmetric: None,
        to_unicode: ToUnicodeMap::identity(0, 0),
        to_font_char: FxHashMap::default(),
        present: rustc_hash::FxHashSet::default(),
        seacs: FxHashMap::default(),
        data: None,
        type3_procs: FxHashMap::default(),
    };

    apply_metrics(&mut t, descriptor.as_ref());

    // Repair the embedded program, if any.
    let program_bytes = descriptor.as_ref().and_then(embedded_program);
    let (program, builtin_names) = match &program_bytes {
        Some(bytes) => repair_program(bytes, &name),
        None => (None, None),
    };

    if program_bytes.is_some() && program.is_none() {
        warn!("embedded program of font `{name}` could not be repaired");
    }

    let explicit_to_unicode = dict
        .get::<Stream>("ToUnicode")
        .and_then(|s| to_unicode::parse_cmap(&s.decoded()));

    if is_composite {
        translate_composite(
            &mut t,
            base,
            program,
            explicit_to_unicode,
        )?;
    } else {
        translate_simple(
            &mut t,
            dict,
            program,
            builtin_names,
            explicit_to_unicode,
        );
    }

    Some(t)
}

/// Subset tags are six uppercase letters and a plus sign.
fn strip_subset_prefix(name: &str) -> &str {
    match name.split_once('+') {
        Some((tag, rest))
            if tag.len() == 6 && tag.bytes().all(|b| b.is_ascii_uppercase()) =>
        {
            rest
        }
        _ => name,
    }
}

fn rect(dict: &Dict, key: &str) -> Option<[f64; 4]> {
    let arr = dict.get::<Array>(key)?;
    let v: Vec<f64> = arr.iter::<f64>().collect();

    (v.len() == 4).then(|| [v[0], v[1], v[2], v[3]])
}

fn apply_metrics(t: &mut Translation, descriptor: Option<&Dict>) {
    if let Some(d) = descriptor {
        t.ascent = d.get::<f64>("Ascent").unwrap_or(0.0);
        t.descent = d.get::<f64>("Descent").unwrap_or(0.0);
        t.default_width = d.get::<f64>("MissingWidth").unwrap_or(0.0);
    }

    if t.ascent == 0.0 {
        let (ascent, descent, width) = standard_metrics(&t.name, t.flags);
        t.ascent = ascent;

        if t.descent == 0.0 {
            t.descent = descent;
        }

        if t.default_width == 0.0 {
            t.default_width = width;
        }
    }
}

/// Metrics fallback chosen by serif / fixed-pitch heuristics on the name.
fn standard_metrics(name: &str, flags: FontFlags) -> (f64, f64, f64) {
    let fixed = flags.contains(FontFlags::FIXED_PITCH)
        || name.contains("Courier")
        || name.contains("Mono");
    let serif = flags.contains(FontFlags::SERIF)
        || name.contains("Times")
        || name.contains("Georgia")
        || name.contains("Roman");

    if fixed {
        // Courier family.
        (629.0, -157.0, 600.0)
    } else if serif {
        // Times family.
        (683.0, -217.0, 500.0)
    } else {
        // Helvetica family.
        (718.0, -207.0, 500.0)
    }
}

fn embedded_program(descriptor: &Dict) -> Option<Arc<[u8]>> {
    for key in ["FontFile2", "FontFile3", "FontFile"] {
        if let Some(stream) = descriptor.get::<Stream>(key) {
            return Some(stream.decoded());
        }
    }

    None
}

/// Sniff and repair an embedded program. Returns the repaired program and,
/// for Type1, the program's built-in encoding.
fn repair_program(
    data: &[u8],
    ps_name: &str,
) -> (Option<Program>, Option<Vec<Option<String>>>) {
    let Some(kind) = sniff(data) else {
        return (None, None);
    };

    match kind {
        FontKind::TrueType | FontKind::OpenTypeCff | FontKind::TrueTypeCollection => {
            match TrueTypeFont::parse(data, Some(ps_name)) {
                Ok(tt) => (Some(Program::TrueType(tt)), None),
                Err(e) => {
                    warn!("TrueType sanitizer rejected `{ps_name}`: {e}");
                    (None, None)
                }
            }
        }
        FontKind::Type1 | FontKind::Type1Pfb => match Type1Font::parse(data) {
            Ok(t1) => {
                let builtin = t1.encoding.clone();
                (repair_type1(t1), builtin)
            }
            Err(e) => {
                warn!("Type1 parse of `{ps_name}` failed: {e}");
                (None, None)
            }
        },
        FontKind::Cff => match Cff::parse(data) {
            Ok(cff) => {
                let num_glyphs = cff.num_glyphs();
                let blob = cff.compile();
                let names = (0..num_glyphs)
                    .map(|gid| cff.glyph_name(gid).unwrap_or_default())
                    .collect();

                (
                    Some(Program::Cff {
                        blob,
                        names,
                        cff: Some(cff),
                        seacs: FxHashMap::default(),
                        num_glyphs,
                    }),
                    None,
                )
            }
            Err(e) => {
                warn!("CFF parse of `{ps_name}` failed: {e}");
                (None, None)
            }
        },
    }
}

/// Transcode every Type1 charstring to Type2 and compile a fresh CFF.
fn repair_type1(t1: Type1Font) -> Option<Program> {
    let mut glyphs = Vec::with_capacity(t1.glyphs.len());
    let mut seac_raw = Vec::new();

    for (name, charstring) in &t1.glyphs {
        match transcode(charstring, &t1.subrs) {
            Ok(glyph) => {
                if let Some(seac) = glyph.seac {
                    seac_raw.push((glyphs.len(), seac));
                }

                glyphs.push((name.clone(), glyph));
            }
            Err(e) => {
                warn!("dropping unparseable glyph `{name}`: {e}");
            }
        }
    }

    if glyphs.is_empty() {
        return None;
    }

    let (blob, names) = compile_type1(&t1.font_name, t1.font_matrix, &glyphs);

    // Transcoding indexes shift once `.notdef` is reordered to glyph id 0;
    // re-locate each seac carrier by name.
    let mut seacs = FxHashMap::default();

    for (old_index, seac) in seac_raw {
        let glyph_name = &glyphs[old_index].0;

        if let Some(gid) = names.iter().position(|n| n == glyph_name) {
            seacs.insert(gid as u16, seac);
        }
    }

    let num_glyphs = names.len() as u16;

    Some(Program::Cff {
        blob,
        names,
        cff: None,
        seacs,
        num_glyphs,
    })
}

/// Wrap a compiled CFF into an `OTTO` container with synthesized tables.
fn wrap_cff(
    blob: Vec<u8>,
    ps_name: &str,
    num_glyphs: u16,
    widths: &[u16],
    ascent: i16,
    descent: i16,
    mappings: &[(u32, u16)],
) -> Vec<u8> {
    let mut builder = opentype::Builder::new();

    builder.add_table(*b"CFF ", blob);
    builder.add_table(*b"head", opentype::synthesize_head(1000, 0));
    builder.add_table(
        *b"hhea",
        opentype::synthesize_hhea(ascent, descent, widths.len() as u16),
    );
    builder.add_table(*b"hmtx", opentype::synthesize_hmtx(widths));
    builder.add_table(*b"maxp", opentype::synthesize_maxp(num_glyphs));
    builder.add_table(*b"cmap", opentype::encode_cmap(mappings));
    builder.add_table(*b"name", opentype::synthesize_name(ps_name));
    builder.add_table(
        *b"OS/2",
        opentype::synthesize_os2(
            1000,
            ascent,
            descent,
            mappings.first().map(|(c, _)| *c as u16).unwrap_or(0),
            mappings.last().map(|(c, _)| *c as u16).unwrap_or(0),
        ),
    );
    builder.add_table(*b"post", opentype::synthesize_post());

    builder.build(*b"OTTO")
}

/// Allocator for private-use font chars, skipping codes already taken.
struct PuaAllocator {
    next: u32,
}

impl PuaAllocator {
    fn new() -> Self {
        Self { next: PUA_START }
    }

    fn take(&mut self, used: &rustc_hash::FxHashSet<u32>) -> u32 {
        while self.next <= PUA_END && used.contains(&self.next) {
            self.next += 1;
        }

        let v = self.next;
        self.next += 1;

        v
    }
}

fn translate_simple(
    t: &mut Translation,
    dict: &Dict,
    program: Option<Program>,
    builtin_names: Option<Vec<Option<String>>>,
    explicit_to_unicode: Option<ToUnicodeMap>,
) {
    // Widths indexed from FirstChar.
    if let Some(widths) = dict.get::<Array>("Widths") {
        for (i, w) in widths.iter::<f64>().enumerate() {
            t.widths.insert(t.first_char + i as u32, w);
        }
    }

    let (base_encoding, differences) = read_encoding(dict, &t.name, t.flags);

    let mut used: rustc_hash::FxHashSet<u32> = rustc_hash::FxHashSet::default();
    let mut pua = PuaAllocator::new();
    let mut mappings: Vec<(u32, u16)> = Vec::new();
    let mut unicode_entries: Vec<(u32, String)> = Vec::new();

    for code in 0u32..=255 {
        let name = differences
            .get(&code)
            .cloned()
            .or_else(|| {
                builtin_names
                    .as_ref()
                    .and_then(|names| names.get(code as usize).cloned().flatten())
            })
            .or_else(|| {
                base_encoding
                    .and_then(|e| e.get(code as u8))
                    .map(str::to_string)
            });

        let gid = resolve_gid(program.as_ref(), name.as_deref(), code);

        let in_font = match (&program, gid) {
            (Some(p), Some(gid)) => p.glyph_exists(gid),
            (None, _) => name.is_some(),
            _ => false,
        };

        if name.is_none() && gid.is_none() {
            continue;
        }

        let unicode = name.as_deref().and_then(glyph_to_unicode);

        if let Some(u) = unicode {
            unicode_entries.push((code, u.to_string()));
        }

        // Missing glyphs and unicode collisions go to the private-use area
        // so they never collide with real character semantics.
        let font_char = match unicode {
            Some(u) if in_font && !used.contains(&(u as u32)) => u as u32,
            _ => pua.take(&used),
        };

        used.insert(font_char);
        t.to_font_char.insert(code, font_char);

        if in_font {
            t.present.insert(code);
        }

        if let (Some(p), Some(gid)) = (&program, gid) {
            if p.glyph_exists(gid) {
                mappings.push((font_char, gid));

                if let Program::Cff { seacs, .. } = p {
                    if let Some(seac) = seacs.get(&gid) {
                        record_seac(t, code, *seac, &differences, base_encoding);
                    }
                }
            }
        }
    }

    t.to_unicode = explicit_to_unicode.unwrap_or_else(|| {
        if unicode_entries.is_empty() {
            ToUnicodeMap::identity(t.first_char, t.last_char)
        } else {
            let mut map = ToUnicodeMap::Sparse(FxHashMap::default());
            map.amend(unicode_entries);
            map
        }
    });

    // Re-wrap the repaired program with the synthesized cmap.
    t.data = program.map(|p| finish_program(t, p, &mappings));
}

/// Resolve a char code to a glyph id through the program.
fn resolve_gid(program: Option<&Program>, name: Option<&str>, code: u32) -> Option<u16> {
    let p = program?;

    if let Some(name) = name {
        if let Some(gid) = p.gid_by_name(name) {
            return Some(gid);
        }

        if let Some(u) = glyph_to_unicode(name) {
            if let Some(gid) = p.gid_by_unicode(u) {
                return Some(gid);
            }
        }

        // Subset-style synthetic names carry the index directly.
        if let Some(index) = glyph_index_from_name(name) {
            if index < p.num_glyphs() as u32 {
                return Some(index as u16);
            }
        }
    }

    p.gid_by_code(code)
}

/// Surface a SEAC pair as explicit base and accent font chars.
fn record_seac(
    t: &mut Translation,
    code: u32,
    seac: Seac,
    differences: &FxHashMap<u32, String>,
    base_encoding: Option<BaseEncoding>,
) {
    // SEAC operands are StandardEncoding codes; map them back through the
    // font's own encoding to char codes.
    let char_for = |std_code: u8| -> Option<u32> {
        let glyph_name = BaseEncoding::Standard.get(std_code)?;

        let found = differences
            .iter()
            .find(|(_, n)| n.as_str() == glyph_name)
            .map(|(c, _)| *c);

        found.or_else(|| {
            (0u32..=255).find(|c| {
                base_encoding.and_then(|e| e.get(*c as u8)) == Some(glyph_name)
            })
        })
    };

    let (Some(base), Some(accent)) = (char_for(seac.base), char_for(seac.accent)) else {
        return;
    };

    t.seacs.insert(
        code,
        SeacPair {
            base_font_char: base,
            accent_font_char: accent,
            accent_offset: (seac.adx - seac.asb, seac.ady),
        },
    );
}

fn finish_program(t: &Translation, program: Program, mappings: &[(u32, u16)]) -> Arc<[u8]> {
    match program {
        Program::TrueType(tt) => Arc::from(tt.rebuild(mappings, &t.name)),
        Program::Cff {
            blob, num_glyphs, ..
        } => {
            // hmtx wants per-gid advances; invert the char-code tables.
            let mut advances = vec![t.default_width.max(0.0) as u16; num_glyphs as usize];

            for (code, font_char) in &t.to_font_char {
                if let Some((_, gid)) = mappings.iter().find(|(fc, _)| fc == font_char) {
                    if let Some(w) = t.widths.get(code) {
                        advances[*gid as usize] = w.max(0.0) as u16;
                    }
                }
            }

            Arc::from(wrap_cff(
                blob,
                &t.name,
                num_glyphs,
                &advances,
                t.ascent as i16,
                t.descent as i16,
                mappings,
            ))
        }
    }
}

/// The declared encoding: a name, or a dictionary with a base encoding and
/// a Differences array.
fn read_encoding(
    dict: &Dict,
    name: &str,
    flags: FontFlags,
) -> (Option<BaseEncoding>, FxHashMap<u32, String>) {
    let mut base = None;
    let mut differences = FxHashMap::default();

    match dict.get::<Object>("Encoding") {
        Some(Object::Name(n)) => base = BaseEncoding::from_name(n.as_str()),
        Some(Object::Dict(enc)) => {
            base = enc
                .get::<Name>("BaseEncoding")
                .and_then(|n| BaseEncoding::from_name(n.as_str()));

            if let Some(diffs) = enc.get::<Array>("Differences") {
                let mut code = 0u32;

                for obj in diffs.iter_raw() {
                    match obj {
                        Object::Number(n) => code = n.as_i64().max(0) as u32,
                        Object::Name(n) => {
                            differences.insert(code, n.as_str().to_string());
                            code += 1;
                        }
                        _ => {}
                    }
                }
            }
        }
        _ => {}
    }

    if base.is_none() {
        base = if name.contains("Symbol") {
            Some(BaseEncoding::Symbol)
        } else if name.contains("Dingbat") || name.contains("ZapfD") {
            Some(BaseEncoding::ZapfDingbats)
        } else if flags.contains(FontFlags::SYMBOLIC) {
            // Symbolic fonts are mapped through their built-in tables.
            None
        } else {
            Some(BaseEncoding::Standard)
        };
    }

    (base, differences)
}

fn translate_composite(
    t: &mut Translation,
    descendant: &Dict,
    program: Option<Program>,
    explicit_to_unicode: Option<ToUnicodeMap>,
) -> Option<()> {
    t.default_width = descendant.get::<f64>("DW").unwrap_or(1000.0);

    if let Some(w) = descendant.get::<Array>("W") {
        parse_cid_widths(&w, &mut t.widths);
    }

    if let Some(dw2) = descendant.get::<Array>("DW2") {
        let v: Vec<f64> = dw2.iter::<f64>().collect();

        if v.len() == 2 {
            t.default_vmetric = Some([v[1], t.default_width / 2.0, v[0]]);
        }
    }

    // CID to glyph id: an explicit stream of big-endian u16s, or identity.
    let cid_to_gid: Option<Vec<u16>> = match descendant.get::<Object>("CIDToGIDMap") {
        Some(Object::Stream(s)) => {
            let data = s.decoded();

            Some(
                data.chunks_exact(2)
                    .map(|c| u16::from_be_bytes([c[0], c[1]]))
                    .collect(),
            )
        }
        _ => None,
    };

    let gid_of = |cid: u32| -> u16 {
        if let Some(map) = &cid_to_gid {
            return map.get(cid as usize).copied().unwrap_or(0);
        }

        // CID-keyed CFF carries its own charset; everything else is
        // identity-mapped.
        if let Some(Program::Cff { cff: Some(c), .. }) = &program {
            if c.is_cid() {
                return c
                    .glyph_id_by_cid(cid.min(u16::MAX as u32) as u16)
                    .unwrap_or(0);
            }
        }

        cid.min(u16::MAX as u32) as u16
    };

    t.first_char = 0;
    t.last_char = 0xFFFF;
    t.to_unicode = explicit_to_unicode
        .unwrap_or_else(|| ToUnicodeMap::identity(t.first_char, t.last_char));

    let mut used: rustc_hash::FxHashSet<u32> = rustc_hash::FxHashSet::default();
    let mut pua = PuaAllocator::new();
    let mut mappings: Vec<(u32, u16)> = Vec::new();

    // Only materialize codes the font can actually draw.
    if let Some(p) = &program {
        let num = p.num_glyphs() as u32;
        let limit = match &cid_to_gid {
            Some(map) => map.len() as u32,
            None => num,
        };

        for cid in 0..limit.min(0x1_0000) {
            let gid = gid_of(cid);

            if !p.glyph_exists(gid) {
                continue;
            }

            let unicode = t.to_unicode.get(cid).and_then(|s| s.chars().next());
            let font_char = match unicode {
                Some(u) if !used.contains(&(u as u32)) && u as u32 > 0x1F => u as u32,
                _ => pua.take(&used),
            };

            used.insert(font_char);
            t.to_font_char.insert(cid, font_char);
            t.present.insert(cid);
            mappings.push((font_char, gid));
        }
    }

    t.data = program.map(|p| finish_program(t, p, &mappings));

    Some(())
}

/// The composite `W` array: `c [w1 w2 ...]` runs and `c1 c2 w` ranges.
fn parse_cid_widths(w: &Array, out: &mut FxHashMap<u32, f64>) {
    let items: Vec<Object> = w.iter_raw().collect();
    let mut i = 0;

    while i < items.len() {
        let Object::Number(start) = &items[i] else {
            break;
        };
        let start = start.as_i64().max(0) as u32;

        match items.get(i + 1) {
            Some(Object::Array(run)) => {
                for (j, width) in run.iter::<f64>().enumerate() {
                    out.insert(start + j as u32, width);
                }

                i += 2;
            }
            Some(Object::Number(end)) => {
                let end = end.as_i64().max(0) as u32;

                let Some(Object::Number(width)) = items.get(i + 2) else {
                    break;
                };
                let width = width.as_f64();

                // Degenerate ranges are ignored rather than trusted.
                if end >= start && end - start <= 0xFFFF {
                    for cid in start..=end {
                        out.insert(cid, width);
                    }
                }

                i += 3;
            }
            _ => break,
        }
    }
}

fn translate_type3(dict: &Dict) -> Option<Translation> {
    let font_matrix = dict
        .get::<Array>("FontMatrix")
        .map(|a| {
            let v: Vec<f64> = a.iter::<f64>().collect();

            if v.len() == 6 {
                [v[0], v[1], v[2], v[3], v[4], v[5]]
            } else {
                [0.001, 0.0, 0.0, 0.001, 0.0, 0.0]
            }
        })
        .unwrap_or([0.001, 0.0, 0.0, 0.001, 0.0, 0.0]);

    let char_procs = dict
        .get::<Dict>("CharProcs")
        .warn_none("Type3 font without CharProcs")?;

    let first_char = dict.get::<u32>("FirstChar").unwrap_or(0);
    let last_char = dict.get::<u32>("LastChar").unwrap_or(255);

    let mut t = Translation {
        name: dict
            .get::<Name>("Name")
            .map(|n| n.as_str().to_string())
            .unwrap_or_default(),
        is_composite: false,
        is_type3: true,
        flags: FontFlags::empty(),
        font_matrix,
        bbox: rect(dict, "FontBBox").unwrap_or([0.0; 4]),
        ascent: 0.0,
        descent: 0.0,
        first_char,
        last_char,
        widths: FxHashMap::default(),
        default_width: 0.0,
        vmetrics: FxHashMap::default(),
        default_vmetric: None,
        to_unicode: ToUnicodeMap::identity(first_char, last_char),
        to_font_char: FxHashMap::default(),
        present: rustc_hash::FxHashSet::default(),
        seacs: FxHashMap::default(),
        data: None,
        type3_procs: FxHashMap::default(),
    };

    if let Some(widths) = dict.get::<Array>("Widths") {
        for (i, w) in widths.iter::<f64>().enumerate() {
            t.widths.insert(first_char + i as u32, w);
        }
    }

    let (_, differences) = read_encoding(dict, &t.name, FontFlags::empty());
    let mut unicode_entries = Vec::new();

    for (code, glyph_name) in &differences {
        if let Some(proc_stream) = char_procs.get::<Stream>(glyph_name) {
            t.type3_procs.insert(*code, proc_stream);
            t.present.insert(*code);
            t.to_font_char.insert(*code, *code);
        }

        if let Some(u) = glyph_to_unicode(glyph_name) {
            unicode_entries.push((*code, u.to_string()));
        }
    }

    if let Some(tu) = dict
        .get::<Stream>("ToUnicode")
        .and_then(|s| to_unicode::parse_cmap(&s.decoded()))
    {
        t.to_unicode = tu;
    } else if !unicode_entries.is_empty() {
        let mut map = ToUnicodeMap::Sparse(FxHashMap::default());
        map.amend(unicode_entries);
        t.to_unicode = map;
    }

    Some(t)
}

#[cfg(test)]
mod tests {
    use super::*;
    use carta_syntax::{Number, Store};

    fn store() -> Arc<Store> {
        Arc::new(Store::new())
    }

    fn name_obj(s: &str) -> Object {
        Object::name(s)
    }

    #[test]
    fn subset_prefix_stripping() {
        assert_eq!(strip_subset_prefix("ABCDEF+Times-Roman"), "Times-Roman");
        assert_eq!(strip_subset_prefix("Times-Roman"), "Times-Roman");
        // A non-conforming tag is left alone.
        assert_eq!(strip_subset_prefix("Abc+Times"), "Abc+Times");
    }

    #[test]
    fn standard_metrics_heuristics() {
        let (_, _, w) = standard_metrics("Courier-Bold", FontFlags::empty());
        assert_eq!(w, 600.0);

        let (a, _, _) = standard_metrics("Times-Italic", FontFlags::empty());
        assert_eq!(a, 683.0);

        let (a, _, _) = standard_metrics("Arial", FontFlags::empty());
        assert_eq!(a, 718.0);
    }

    #[test]
    fn encoding_differences() {
        let s = store();
        let diffs = Object::Array(Array::from_objects(
            s.clone(),
            vec![
                Object::Number(Number::Int(65)),
                name_obj("alpha"),
                name_obj("beta"),
                Object::Number(Number::Int(100)),
                name_obj("gamma"),
            ],
        ));
        let enc = Object::Dict(Dict::from_pairs(
            s.clone(),
            vec![
                (Name::new("BaseEncoding"), name_obj("WinAnsiEncoding")),
                (Name::new("Differences"), diffs),
            ],
        ));
        let dict = Dict::from_pairs(s, vec![(Name::new("Encoding"), enc)]);

        let (base, differences) = read_encoding(&dict, "Foo", FontFlags::empty());

        assert_eq!(base, Some(BaseEncoding::WinAnsi));
        assert_eq!(differences.get(&65).map(String::as_str), Some("alpha"));
        assert_eq!(differences.get(&66).map(String::as_str), Some("beta"));
        assert_eq!(differences.get(&100).map(String::as_str), Some("gamma"));
        assert!(!differences.contains_key(&67));
    }

    #[test]
    fn symbolic_fonts_default_to_builtin_tables() {
        let dict = Dict::from_pairs(store(), vec![]);
        let (base, _) = read_encoding(&dict, "Foo", FontFlags::SYMBOLIC);

        assert_eq!(base, None);

        let (base, _) = read_encoding(&dict, "Foo", FontFlags::empty());
        assert_eq!(base, Some(BaseEncoding::Standard));
    }

    #[test]
    fn cid_width_formats() {
        let s = store();
        let inner = Object::Array(Array::from_objects(
            s.clone(),
            vec![
                Object::Number(Number::Real(500.0)),
                Object::Number(Number::Real(600.0)),
            ],
        ));
        let w = Array::from_objects(
            s,
            vec![
                Object::Number(Number::Int(10)),
                inner,
                Object::Number(Number::Int(20)),
                Object::Number(Number::Int(22)),
                Object::Number(Number::Real(750.0)),
            ],
        );

        let mut out = FxHashMap::default();
        parse_cid_widths(&w, &mut out);

        assert_eq!(out.get(&10), Some(&500.0));
        assert_eq!(out.get(&11), Some(&600.0));
        assert_eq!(out.get(&20), Some(&750.0));
        assert_eq!(out.get(&22), Some(&750.0));
        assert!(!out.contains_key(&12));
    }

    #[test]
    fn no_program_fallback_still_translates() {
        let s = store();
        let dict = Dict::from_pairs(
            s,
            vec![
                (Name::new("Subtype"), name_obj("Type1")),
                (Name::new("BaseFont"), name_obj("Helvetica")),
                (Name::new("FirstChar"), Object::int(32)),
                (Name::new("LastChar"), Object::int(126)),
            ],
        );

        let t = translate(&dict).unwrap();

        assert!(!t.is_composite);
        assert!(t.data.is_none());
        // Encoded codes are mapped and marked present from the table.
        assert!(t.present.contains(&65));
        assert_eq!(t.to_unicode.get(65), Some("A".to_string()));
    }
}
