//! Structural sanitation of TrueType/OpenType font programs.
//!
//! Embedded TrueType fonts are validated table by table: version fields are
//! repaired, `loca`/`glyf` are rebuilt with every glyph's outline data
//! individually checked, metrics tables are clamped and re-padded, and
//! hinting programs are abstractly interpreted for stack balance — if they
//! cannot be proven safe they are stripped rather than risk a hint VM crash
//! downstream. TrueType Collections are resolved to a single sub-font by
//! PostScript name.

use crate::FontError;
use crate::opentype::{self, Builder, Tag, push_u16, push_u32};
use log::{info, warn};
use rustc_hash::{FxHashMap, FxHashSet};

const HEAD_MAGIC: u32 = 0x5F0F_3CF5;

/// A parsed and sanitized TrueType/OpenType font.
#[derive(Debug)]
pub struct TrueTypeFont {
    tables: Vec<(Tag, Vec<u8>)>,
    num_glyphs: u16,
    units_per_em: u16,
    ascent: i16,
    descent: i16,
    is_true_type: bool,
    mappings: Vec<(u32, u16)>,
    glyph_lengths: Vec<u32>,
    post_names: FxHashMap<String, u16>,
}

impl TrueTypeFont {
    /// Parse and repair a font program.
    ///
    /// For TrueType Collections, `ps_name` selects the sub-font whose `name`
    /// table carries a matching PostScript name; without a match the first
    /// sub-font is used.
    pub fn parse(data: &[u8], ps_name: Option<&str>) -> Result<Self, FontError> {
        let head = data.get(0..4).ok_or(FontError::Malformed("empty font"))?;

        if head == b"ttcf" {
            let num_fonts = read_u32(data, 8).ok_or(FontError::Malformed("ttc header"))?;
            let mut fallback = None;

            for i in 0..num_fonts.min(64) {
                let offset = read_u32(data, 12 + 4 * i as usize)
                    .ok_or(FontError::Malformed("ttc directory"))? as usize;

                if fallback.is_none() {
                    fallback = Some(offset);
                }

                if let Some(wanted) = ps_name
                    && sub_font_ps_name(data, offset).as_deref() == Some(wanted)
                {
                    return Self::parse_single(data, offset);
                }
            }

            let offset = fallback.ok_or(FontError::Malformed("empty ttc"))?;

            if ps_name.is_some() {
                warn!("no TTC sub-font matched the PostScript name, using the first");
            }

            return Self::parse_single(data, offset);
        }

        Self::parse_single(data, 0)
    }

    fn parse_single(data: &[u8], start: usize) -> Result<Self, FontError> {
        let version = data
            .get(start..start + 4)
            .ok_or(FontError::Malformed("sfnt header"))?;
        let is_true_type = version != b"OTTO";

        let num_tables = read_u16(data, start + 4).ok_or(FontError::Malformed("sfnt header"))?;
        let mut raw: FxHashMap<Tag, Vec<u8>> = FxHashMap::default();

        for i in 0..num_tables as usize {
            let entry = start + 12 + 16 * i;
            let Some(tag) = data.get(entry..entry + 4) else {
                break;
            };
            let Some(offset) = read_u32(data, entry + 8) else {
                break;
            };
            let Some(length) = read_u32(data, entry + 12) else {
                break;
            };

            let offset = offset as usize;
            // Clamp tables that run past the end of the file instead of
            // rejecting the font.
            let end = (offset + length as usize).min(data.len());

            if offset >= end {
                continue;
            }

            raw.insert(tag.try_into().unwrap(), data[offset..end].to_vec());
        }

        let mut head = raw.remove(b"head").ok_or(FontError::MissingTable("head"))?;
        let hhea = raw.remove(b"hhea").ok_or(FontError::MissingTable("hhea"))?;
        let mut maxp = raw.remove(b"maxp").ok_or(FontError::MissingTable("maxp"))?;

        sanitize_head(&mut head);

        let mut num_glyphs = read_u16(&maxp, 4).unwrap_or(0);
        let units_per_em = read_u16(&head, 18).filter(|v| *v != 0).unwrap_or(1000);
        let ascent = read_u16(&hhea, 4).unwrap_or(0) as i16;
        let descent = read_u16(&hhea, 6).unwrap_or(0) as i16;

        let mut tables: Vec<(Tag, Vec<u8>)> = Vec::new();
        let mut glyph_lengths = Vec::new();

        if is_true_type {
            let loca = raw.remove(b"loca").ok_or(FontError::MissingTable("loca"))?;
            let glyf = raw.remove(b"glyf").ok_or(FontError::MissingTable("glyf"))?;

            let long_loca = fix_index_to_loc_format(&mut head, &loca, num_glyphs);

            // The loca table bounds the usable glyph count regardless of
            // what maxp claims.
            let entry_size = if long_loca { 4 } else { 2 };
            let max_from_loca = (loca.len() / entry_size).saturating_sub(1) as u16;

            if max_from_loca < num_glyphs {
                warn!(
                    "maxp reports {num_glyphs} glyphs but loca only covers {max_from_loca}, \
                     clamping"
                );
                num_glyphs = max_from_loca;
                write_u16(&mut maxp, 4, num_glyphs);
            }

            let (new_glyf, new_loca, lengths) =
                sanitize_glyf(&glyf, &loca, long_loca, num_glyphs);
            glyph_lengths = lengths;

            tables.push((*b"loca", new_loca));
            tables.push((*b"glyf", new_glyf));
        } else {
            let cff = raw.remove(b"CFF ").ok_or(FontError::MissingTable("CFF "))?;
            tables.push((*b"CFF ", cff));
        }

        let (hhea, hmtx) = sanitize_metrics(hhea, raw.remove(b"hmtx"), num_glyphs);

        // Hinting programs are kept only when provably balanced; cvt rides
        // along with them.
        let mut ctx = HintContext::default();
        let fpgm = raw.remove(b"fpgm");
        let prep = raw.remove(b"prep");
        let cvt = raw.remove(b"cvt ");
        let hints_ok = fpgm.as_deref().is_none_or(|p| ctx.check(p))
            && prep.as_deref().is_none_or(|p| ctx.check(p));

        if hints_ok {
            if let Some(fpgm) = fpgm {
                tables.push((*b"fpgm", fpgm));
            }
            if let Some(prep) = prep {
                tables.push((*b"prep", prep));
            }
            if let Some(mut cvt) = cvt {
                if cvt.len() % 2 == 1 {
                    cvt.pop();
                }
                tables.push((*b"cvt ", cvt));
            }
        } else {
            info!("stripping unsafe hinting programs");
        }

        let mappings = raw
            .get(b"cmap".as_slice())
            .map(|t| parse_cmap(t))
            .unwrap_or_default();

        let post_names = raw
            .get(b"post".as_slice())
            .map(|t| parse_post_names(t, num_glyphs))
            .unwrap_or_default();

        if let Some(os2) = raw.remove(b"OS/2")
            && os2.len() >= 78
        {
            tables.push((*b"OS/2", os2));
        }

        tables.push((*b"head", head));
        tables.push((*b"hhea", hhea));
        tables.push((*b"hmtx", hmtx));
        tables.push((*b"maxp", maxp));

        if let Some(name) = raw.remove(b"name") {
            tables.push((*b"name", name));
        }

        Ok(Self {
            tables,
            num_glyphs,
            units_per_em,
            ascent,
            descent,
            is_true_type,
            mappings,
            glyph_lengths,
            post_names,
        })
    }

    pub fn num_glyphs(&self) -> u16 {
        self.num_glyphs
    }

    pub fn units_per_em(&self) -> u16 {
        self.units_per_em
    }

    /// Char-code-to-glyph mappings recovered from the font's own cmap.
    pub fn mappings(&self) -> &[(u32, u16)] {
        &self.mappings
    }

    /// Whether a glyph has any outline data after sanitation.
    ///
    /// Always true for CFF-backed fonts, where emptiness cannot be judged
    /// without running charstrings.
    pub fn glyph_present(&self, gid: u16) -> bool {
        if !self.is_true_type {
            return (gid as usize) < self.num_glyphs as usize;
        }

        self.glyph_lengths.get(gid as usize).is_some_and(|l| *l > 0)
    }

    /// Look up a glyph by its `post` table name.
    pub fn glyph_index_by_name(&self, name: &str) -> Option<u16> {
        self.post_names.get(name).copied()
    }

    /// Re-package the sanitized tables with a `cmap` synthesized from the
    /// final char-code-to-glyph mapping.
    pub fn rebuild(&self, cmap: &[(u32, u16)], ps_name: &str) -> Vec<u8> {
        let mut builder = Builder::new();

        for (tag, data) in &self.tables {
            builder.add_table(*tag, data.clone());
        }

        builder.add_table(*b"cmap", opentype::encode_cmap(cmap));

        if !builder.has_table(*b"post") {
            builder.add_table(*b"post", opentype::synthesize_post());
        }

        if !builder.has_table(*b"OS/2") {
            let first = cmap.iter().map(|(c, _)| *c).min().unwrap_or(0).min(0xFFFF) as u16;
            let last = cmap.iter().map(|(c, _)| *c).max().unwrap_or(0).min(0xFFFF) as u16;
            builder.add_table(
                *b"OS/2",
                opentype::synthesize_os2(self.units_per_em, self.ascent, self.descent, first, last),
            );
        }

        if !builder.has_table(*b"name") {
            builder.add_table(*b"name", opentype::synthesize_name(ps_name));
        }

        let version = if self.is_true_type {
            [0x00, 0x01, 0x00, 0x00]
        } else {
            *b"OTTO"
        };

        builder.build(version)
    }
}

fn read_u16(data: &[u8], at: usize) -> Option<u16> {
    let b = data.get(at..at + 2)?;

    Some(u16::from_be_bytes([b[0], b[1]]))
}

fn read_u32(data: &[u8], at: usize) -> Option<u32> {
    let b = data.get(at..at + 4)?;

    Some(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
}

fn write_u16(data: &mut [u8], at: usize, v: u16) {
    if data.len() >= at + 2 {
        data[at..at + 2].copy_from_slice(&v.to_be_bytes());
    }
}

fn write_u32(data: &mut [u8], at: usize, v: u32) {
    if data.len() >= at + 4 {
        data[at..at + 4].copy_from_slice(&v.to_be_bytes());
    }
}

/// Read the PostScript name (name id 6) of a TTC sub-font.
fn sub_font_ps_name(data: &[u8], start: usize) -> Option<String> {
    let num_tables = read_u16(data, start + 4)?;

    for i in 0..num_tables as usize {
        let entry = start + 12 + 16 * i;

        if data.get(entry..entry + 4)? != b"name" {
            continue;
        }

        let offset = read_u32(data, entry + 8)? as usize;
        let table = data.get(offset..)?;
        let count = read_u16(table, 2)?;
        let string_offset = read_u16(table, 4)? as usize;

        for r in 0..count as usize {
            let rec = 6 + 12 * r;

            if read_u16(table, rec + 6)? != 6 {
                continue;
            }

            let platform = read_u16(table, rec)?;
            let len = read_u16(table, rec + 8)? as usize;
            let str_off = string_offset + read_u16(table, rec + 10)? as usize;
            let bytes = table.get(str_off..str_off + len)?;

            return Some(if platform == 3 {
                // UTF-16BE.
                let units: Vec<u16> = bytes
                    .chunks_exact(2)
                    .map(|c| u16::from_be_bytes([c[0], c[1]]))
                    .collect();
                String::from_utf16_lossy(&units)
            } else {
                bytes.iter().map(|b| *b as char).collect()
            });
        }
    }

    None
}

fn sanitize_head(head: &mut Vec<u8>) {
    if head.len() < 54 {
        head.resize(54, 0);
    }

    if read_u32(head, 0) != Some(0x0001_0000) {
        write_u32(head, 0, 0x0001_0000);
    }

    if read_u32(head, 12) != Some(HEAD_MAGIC) {
        warn!("repairing invalid magic number in head table");
        write_u32(head, 12, HEAD_MAGIC);
    }
}

/// Correct `indexToLocFormat` from the actual loca table length.
///
/// Returns whether the table uses the long (32-bit) format.
fn fix_index_to_loc_format(head: &mut [u8], loca: &[u8], num_glyphs: u16) -> bool {
    let declared = read_u16(head, 50).unwrap_or(0);
    let entries = num_glyphs as usize + 1;

    let implied_long = if loca.len() >= entries * 4 {
        // Long covers all glyphs; prefer it if short would not.
        loca.len() < entries * 2 || declared == 1
    } else {
        false
    };

    let implied = implied_long as u16;

    if declared != implied {
        warn!("indexToLocFormat {declared} is inconsistent with the loca length, using {implied}");
        write_u16(head, 50, implied);
    }

    implied_long
}

/// Rebuild glyf/loca, validating every glyph's outline data individually.
fn sanitize_glyf(
    glyf: &[u8],
    loca: &[u8],
    long_loca: bool,
    num_glyphs: u16,
) -> (Vec<u8>, Vec<u8>, Vec<u32>) {
    let read_entry = |i: usize| -> u32 {
        if long_loca {
            read_u32(loca, i * 4).unwrap_or(0)
        } else {
            read_u16(loca, i * 2).unwrap_or(0) as u32 * 2
        }
    };

    let mut new_glyf: Vec<u8> = Vec::with_capacity(glyf.len());
    let mut offsets = Vec::with_capacity(num_glyphs as usize + 1);
    let mut lengths = Vec::with_capacity(num_glyphs as usize);
    offsets.push(0u32);

    let mut prev_end = 0u32;

    for gid in 0..num_glyphs as usize {
        let mut start = read_entry(gid);
        let mut end = read_entry(gid + 1);

        // Non-monotonic entries poison everything after them; treat the
        // glyph as empty rather than guessing.
        if start < prev_end || end < start {
            start = 0;
            end = 0;
        }

        prev_end = end.max(prev_end);

        let slice = glyf
            .get(start as usize..(end as usize).min(glyf.len()))
            .unwrap_or(&[]);
        let valid_len = validate_glyph(slice, num_glyphs);

        let mut kept = &slice[..valid_len];

        if valid_len == 0 && !slice.is_empty() {
            warn!("dropping corrupt outline data for glyph {gid}");
            kept = &[];
        }

        new_glyf.extend_from_slice(kept);

        // Glyph data must stay 4-byte aligned.
        while new_glyf.len() % 4 != 0 {
            new_glyf.push(0);
        }

        lengths.push(kept.len() as u32);
        offsets.push(new_glyf.len() as u32);
    }

    // Always write long loca; the rebuilt head says so.
    let mut new_loca = Vec::with_capacity(offsets.len() * 4);

    for off in &offsets {
        push_u32(&mut new_loca, *off);
    }

    (new_glyf, new_loca, lengths)
}

/// Validate one glyph's outline data, returning the usable prefix length
/// (0 when the glyph must be dropped).
fn validate_glyph(data: &[u8], num_glyphs: u16) -> usize {
    if data.len() < 10 {
        return 0;
    }

    let num_contours = i16::from_be_bytes([data[0], data[1]]);

    if num_contours < 0 {
        return validate_composite_glyph(data, num_glyphs);
    }

    if num_contours == 0 {
        return 0;
    }

    let mut pos = 10usize;
    let mut last_end = -1i32;
    let mut num_points = 0u32;

    for _ in 0..num_contours {
        let Some(end) = read_u16(data, pos) else {
            return 0;
        };

        if (end as i32) < last_end {
            return 0;
        }

        last_end = end as i32;
        num_points = end as u32 + 1;
        pos += 2;
    }

    let Some(instr_len) = read_u16(data, pos) else {
        return 0;
    };
    pos += 2 + instr_len as usize;

    if pos > data.len() {
        return 0;
    }

    // Flags, with repeat handling, then the coordinate arrays whose sizes
    // the flags determine.
    let mut x_len = 0usize;
    let mut y_len = 0usize;
    let mut seen = 0u32;

    while seen < num_points {
        let Some(&flag) = data.get(pos) else {
            return 0;
        };
        pos += 1;

        let mut repeat = 1u32;

        if flag & 0x08 != 0 {
            let Some(&r) = data.get(pos) else {
                return 0;
            };
            pos += 1;
            repeat += r as u32;
        }

        let x_size = if flag & 0x02 != 0 {
            1
        } else if flag & 0x10 != 0 {
            0
        } else {
            2
        };
        let y_size = if flag & 0x04 != 0 {
            1
        } else if flag & 0x20 != 0 {
            0
        } else {
            2
        };

        x_len += x_size * repeat as usize;
        y_len += y_size * repeat as usize;
        seen += repeat;
    }

    if seen > num_points {
        // A repeat ran past the declared point count.
        return 0;
    }

    let total = pos + x_len + y_len;

    if total > data.len() {
        return 0;
    }

    total
}

fn validate_composite_glyph(data: &[u8], num_glyphs: u16) -> usize {
    let mut pos = 10usize;

    loop {
        let Some(flags) = read_u16(data, pos) else {
            return 0;
        };
        let Some(glyph_index) = read_u16(data, pos + 2) else {
            return 0;
        };

        if glyph_index >= num_glyphs {
            return 0;
        }

        pos += 4;
        pos += if flags & 0x0001 != 0 { 4 } else { 2 }; // component args

        if flags & 0x0008 != 0 {
            pos += 2; // single scale
        } else if flags & 0x0040 != 0 {
            pos += 4; // x and y scale
        } else if flags & 0x0080 != 0 {
            pos += 8; // 2x2 matrix
        }

        if pos > data.len() {
            return 0;
        }

        if flags & 0x0020 == 0 {
            // No more components.
            if flags & 0x0100 != 0 {
                let Some(instr_len) = read_u16(data, pos) else {
                    return 0;
                };
                pos += 2 + instr_len as usize;

                if pos > data.len() {
                    return 0;
                }
            }

            return pos;
        }
    }
}

/// Clamp `numOfLongHorMetrics` and pad/truncate hmtx accordingly.
fn sanitize_metrics(mut hhea: Vec<u8>, hmtx: Option<Vec<u8>>, num_glyphs: u16) -> (Vec<u8>, Vec<u8>) {
    if hhea.len() < 36 {
        hhea.resize(36, 0);
    }

    let mut num_metrics = read_u16(&hhea, 34).unwrap_or(0);

    if num_metrics == 0 || num_metrics > num_glyphs {
        num_metrics = num_glyphs.max(1);
        write_u16(&mut hhea, 34, num_metrics);
    }

    let expected = 4 * num_metrics as usize
        + 2 * (num_glyphs as usize).saturating_sub(num_metrics as usize);

    let mut hmtx = hmtx.unwrap_or_default();
    hmtx.resize(expected, 0);

    (hhea, hmtx)
}

/// Decode the best original cmap subtable into (char code, glyph id) pairs.
fn parse_cmap(table: &[u8]) -> Vec<(u32, u16)> {
    let Some(num_subtables) = read_u16(table, 2) else {
        return Vec::new();
    };

    let mut best: Option<(u32, usize)> = None;

    for i in 0..num_subtables as usize {
        let rec = 4 + 8 * i;
        let Some(platform) = read_u16(table, rec) else {
            break;
        };
        let Some(encoding) = read_u16(table, rec + 2) else {
            break;
        };
        let Some(offset) = read_u32(table, rec + 4) else {
            break;
        };

        let rank = match (platform, encoding) {
            (3, 10) => 5,
            (3, 1) => 4,
            (0, _) => 3,
            (3, 0) => 2,
            (1, 0) => 1,
            _ => 0,
        };

        if best.is_none_or(|(r, _)| rank > r) {
            best = Some((rank, offset as usize));
        }
    }

    let Some((_, offset)) = best else {
        return Vec::new();
    };
    let Some(sub) = table.get(offset..) else {
        return Vec::new();
    };

    match read_u16(sub, 0) {
        Some(0) => (0..256u32)
            .filter_map(|c| {
                let gid = *sub.get(6 + c as usize)? as u16;
                (gid != 0).then_some((c, gid))
            })
            .collect(),
        Some(4) => parse_cmap_format4(sub),
        Some(6) => {
            let first = read_u16(sub, 6).unwrap_or(0) as u32;
            let count = read_u16(sub, 8).unwrap_or(0);

            (0..count as u32)
                .filter_map(|i| {
                    let gid = read_u16(sub, 10 + 2 * i as usize)?;
                    (gid != 0).then_some((first + i, gid))
                })
                .collect()
        }
        Some(12) => {
            let groups = read_u32(sub, 12).unwrap_or(0).min(10_000);
            let mut out = Vec::new();

            for g in 0..groups as usize {
                let base = 16 + 12 * g;
                let (Some(start), Some(end), Some(gid)) = (
                    read_u32(sub, base),
                    read_u32(sub, base + 4),
                    read_u32(sub, base + 8),
                ) else {
                    break;
                };

                // Cap absurd ranges from corrupt groups.
                for (i, code) in (start..=end.min(start + 0xFFFF)).enumerate() {
                    out.push((code, (gid as usize + i) as u16));
                }
            }

            out
        }
        _ => {
            warn!("unsupported cmap subtable format");

            Vec::new()
        }
    }
}

fn parse_cmap_format4(sub: &[u8]) -> Vec<(u32, u16)> {
    let Some(seg_count_x2) = read_u16(sub, 6) else {
        return Vec::new();
    };
    let seg_count = (seg_count_x2 / 2) as usize;
    let end_codes = 14;
    let start_codes = end_codes + seg_count * 2 + 2;
    let deltas = start_codes + seg_count * 2;
    let offsets = deltas + seg_count * 2;

    let mut out = Vec::new();

    for i in 0..seg_count {
        let (Some(end), Some(start), Some(delta), Some(range_offset)) = (
            read_u16(sub, end_codes + 2 * i),
            read_u16(sub, start_codes + 2 * i),
            read_u16(sub, deltas + 2 * i),
            read_u16(sub, offsets + 2 * i),
        ) else {
            return out;
        };

        if start == 0xFFFF && end == 0xFFFF {
            continue;
        }

        for code in start..=end {
            let gid = if range_offset == 0 {
                code.wrapping_add(delta)
            } else {
                let slot =
                    offsets + 2 * i + range_offset as usize + 2 * (code - start) as usize;

                match read_u16(sub, slot) {
                    Some(0) | None => continue,
                    Some(g) => g.wrapping_add(delta),
                }
            };

            if gid != 0 {
                out.push((code as u32, gid));
            }

            if code == 0xFFFF {
                break;
            }
        }
    }

    out
}

/// Extract glyph names from a version 2.0 `post` table.
fn parse_post_names(table: &[u8], num_glyphs: u16) -> FxHashMap<String, u16> {
    let mut out = FxHashMap::default();

    if read_u32(table, 0) != Some(0x0002_0000) {
        return out;
    }

    let Some(count) = read_u16(table, 32) else {
        return out;
    };
    let count = count.min(num_glyphs);

    let mut indices = Vec::with_capacity(count as usize);

    for i in 0..count as usize {
        let Some(idx) = read_u16(table, 34 + 2 * i) else {
            return out;
        };
        indices.push(idx);
    }

    // Custom names are pascal strings following the index array.
    let mut custom = Vec::new();
    let mut pos = 34 + 2 * count as usize;

    while let Some(&len) = table.get(pos) {
        let Some(bytes) = table.get(pos + 1..pos + 1 + len as usize) else {
            break;
        };
        custom.push(String::from_utf8_lossy(bytes).into_owned());
        pos += 1 + len as usize;
    }

    for (gid, idx) in indices.iter().enumerate() {
        let name = if *idx < 258 {
            MAC_GLYPH_NAMES.get(*idx as usize).map(|n| n.to_string())
        } else {
            custom.get(*idx as usize - 258).cloned()
        };

        if let Some(name) = name {
            out.entry(name).or_insert(gid as u16);
        }
    }

    out
}

// The 258 standard Macintosh glyph names referenced by post format 2.0
// indices below 258. Only the printable-ASCII prefix matters for glyph-name
// recovery; the rest resolve through custom names in practice.
const MAC_GLYPH_NAMES: &[&str] = &[
    ".notdef", ".null", "nonmarkingreturn", "space", "exclam", "quotedbl", "numbersign",
    "dollar", "percent", "ampersand", "quotesingle", "parenleft", "parenright", "asterisk",
    "plus", "comma", "hyphen", "period", "slash", "zero", "one", "two", "three", "four",
    "five", "six", "seven", "eight", "nine", "colon", "semicolon", "less", "equal",
    "greater", "question", "at", "A", "B", "C", "D", "E", "F", "G", "H", "I", "J", "K",
    "L", "M", "N", "O", "P", "Q", "R", "S", "T", "U", "V", "W", "X", "Y", "Z",
    "bracketleft", "backslash", "bracketright", "asciicircum", "underscore", "grave",
    "a", "b", "c", "d", "e", "f", "g", "h", "i", "j", "k", "l", "m", "n", "o", "p", "q",
    "r", "s", "t", "u", "v", "w", "x", "y", "z", "braceleft", "bar", "braceright",
    "asciitilde",
];

/// Abstract interpreter for TrueType hinting bytecode.
///
/// Tracks stack depth, statically-known values (for function ids), function
/// definitions and IF/FDEF nesting. Any construct that cannot be proven
/// balanced marks the program unsafe, and the caller strips hinting.
#[derive(Default)]
struct HintContext {
    functions: FxHashSet<i32>,
}

impl HintContext {
    /// Returns false when the program must be considered unsafe.
    fn check(&mut self, program: &[u8]) -> bool {
        let mut stack: Vec<Option<i32>> = Vec::new();
        let mut if_depth = 0i32;
        let mut in_fdef = false;
        let mut pos = 0usize;

        while pos < program.len() {
            let op = program[pos];
            pos += 1;

            match op {
                // NPUSHB / NPUSHW
                0x40 | 0x41 => {
                    let Some(&n) = program.get(pos) else {
                        return false;
                    };
                    pos += 1;

                    let width = if op == 0x40 { 1 } else { 2 };

                    for i in 0..n as usize {
                        let at = pos + i * width;
                        let value = if width == 1 {
                            program.get(at).map(|b| *b as i32)
                        } else {
                            program
                                .get(at..at + 2)
                                .map(|b| i16::from_be_bytes([b[0], b[1]]) as i32)
                        };

                        if value.is_none() {
                            return false;
                        }

                        stack.push(value);
                    }

                    pos += n as usize * width;
                }
                // PUSHB[0..7] / PUSHW[0..7]
                0xB0..=0xBF => {
                    let count = (op as usize & 0x07) + 1;
                    let width = if op < 0xB8 { 1 } else { 2 };

                    for i in 0..count {
                        let at = pos + i * width;
                        let value = if width == 1 {
                            program.get(at).map(|b| *b as i32)
                        } else {
                            program
                                .get(at..at + 2)
                                .map(|b| i16::from_be_bytes([b[0], b[1]]) as i32)
                        };

                        if value.is_none() {
                            return false;
                        }

                        stack.push(value);
                    }

                    pos += count * width;
                }
                // FDEF
                0x2C => {
                    if in_fdef {
                        warn!("nested FDEF in hinting program");
                        return false;
                    }

                    match stack.pop() {
                        Some(Some(id)) => {
                            self.functions.insert(id);
                        }
                        Some(None) => {
                            warn!("FDEF with unknown function id");
                            return false;
                        }
                        None => return false,
                    }

                    in_fdef = true;
                }
                // ENDF
                0x2D => {
                    if !in_fdef {
                        warn!("ENDF outside of function definition");
                        return false;
                    }

                    in_fdef = false;
                }
                // CALL / LOOPCALL
                0x2B | 0x2A => {
                    if op == 0x2A {
                        stack.pop();
                    }

                    match stack.pop() {
                        Some(Some(id)) if self.functions.contains(&id) => {}
                        Some(Some(id)) => {
                            warn!("call to undefined hint function {id}");
                            return false;
                        }
                        _ => {
                            // Dynamic call target; cannot verify.
                            return false;
                        }
                    }
                }
                // IF / ELSE / EIF
                0x58 => if_depth += 1,
                0x1B => {
                    if if_depth == 0 {
                        return false;
                    }
                }
                0x59 => {
                    if_depth -= 1;

                    if if_depth < 0 {
                        return false;
                    }
                }
                // IDEF is treated like FDEF but we refuse to verify
                // programs that redefine instructions.
                0x89 => {
                    warn!("IDEF in hinting program");
                    return false;
                }
                other => {
                    let (pops, pushes) = stack_effect(other);

                    for _ in 0..pops {
                        stack.pop();
                    }

                    for _ in 0..pushes {
                        stack.push(None);
                    }
                }
            }
        }

        if in_fdef || if_depth != 0 {
            warn!("unterminated FDEF or IF in hinting program");
            return false;
        }

        true
    }
}

/// Coarse (pops, pushes) stack effect for hinting opcodes not handled
/// explicitly above.
fn stack_effect(op: u8) -> (u32, u32) {
    match op {
        0x00..=0x01 => (0, 0),         // SVTCA
        0x02..=0x05 => (0, 0),         // SPVTCA/SFVTCA
        0x06..=0x09 => (2, 0),         // SPVTL/SFVTL
        0x0A | 0x0B => (2, 0),         // SPVFS/SFVFS
        0x0C | 0x0D => (0, 2),         // GPV/GFV
        0x0E => (0, 0),                // SFVTPV
        0x0F => (5, 0),                // ISECT
        0x10..=0x13 => (1, 0),         // SRP0..SZP0-ish
        0x14..=0x16 => (1, 0),
        0x17 => (1, 0),                // SLOOP
        0x18 | 0x19 => (1, 0),         // RTG/RTHG
        0x1A => (1, 0),                // SMD
        0x1C => (1, 0),                // JMPR
        0x1D | 0x1E => (1, 0),         // SCVTCI/SSWCI
        0x1F => (1, 0),                // SSW
        0x20 => (1, 2),                // DUP
        0x21 => (1, 0),                // POP
        0x22 => (u32::MAX, 0),         // CLEAR
        0x23 => (2, 2),                // SWAP
        0x24 => (0, 1),                // DEPTH
        0x25 => (1, 1),                // CINDEX
        0x26 => (1, 1),                // MINDEX (approximate)
        0x27 => (2, 0),                // ALIGNPTS
        0x29 => (1, 0),                // UTP
        0x2E | 0x2F => (1, 0),         // MDAP
        0x30..=0x31 => (0, 0),         // IUP
        0x32..=0x33 => (1, 0),         // SHP (uses loop var)
        0x34..=0x35 => (1, 0),         // SHC
        0x36..=0x37 => (1, 0),         // SHZ
        0x38 => (1, 0),                // SHPIX (approximate)
        0x39 => (2, 0),                // IP? actually IP pops loop
        0x3A | 0x3B => (2, 0),         // MSIRP
        0x3C => (1, 0),                // ALIGNRP
        0x3D => (0, 0),                // RTDG
        0x3E | 0x3F => (1, 0),         // MIAP
        0x42 => (2, 0),                // WS
        0x43 => (1, 1),                // RS
        0x44 => (2, 0),                // WCVTP
        0x45 => (1, 1),                // RCVT
        0x46 | 0x47 => (1, 2),         // GC
        0x48 => (2, 0),                // SCFS
        0x49 | 0x4A => (2, 1),         // MD
        0x4B => (0, 1),                // MPPEM
        0x4C => (0, 1),                // MPS
        0x4D..=0x4E => (0, 0),         // FLIPON/FLIPOFF
        0x4F => (0, 0),                // DEBUG
        0x50..=0x55 => (2, 1),         // LT/LTEQ/GT/GTEQ/EQ/NEQ
        0x56 | 0x57 => (1, 1),         // ODD/EVEN
        0x5A | 0x5B => (2, 1),         // AND/OR
        0x5C => (1, 1),                // NOT
        0x5D => (u32::MAX, 0),         // DELTAP1 (variable)
        0x5E => (1, 0),                // SDB
        0x5F => (1, 0),                // SDS
        0x60..=0x63 => (2, 1),         // ADD/SUB/DIV/MUL
        0x64..=0x66 => (1, 1),         // ABS/NEG/FLOOR
        0x67 => (1, 1),                // CEILING
        0x68..=0x6B => (1, 1),         // ROUND
        0x6C..=0x6F => (1, 0),         // NROUND? WCVTF is 0x70
        0x70 => (2, 0),                // WCVTF
        0x71..=0x73 => (u32::MAX, 0),  // DELTAP2/3, DELTAC1 (variable)
        0x74..=0x75 => (u32::MAX, 0),  // DELTAC2/3
        0x76 | 0x77 => (1, 0),         // SROUND/S45ROUND
        0x78 | 0x79 => (2, 0),         // JROT/JROF
        0x7A => (0, 0),                // ROFF
        0x7C | 0x7D => (0, 0),         // RUTG/RDTG
        0x7E | 0x7F => (1, 0),         // SANGW/AA
        0x80 => (1, 0),                // FLIPPT (loop)
        0x81 | 0x82 => (2, 0),         // FLIPRGON/FLIPRGOFF
        0x85 => (0, 0),                // SCANCTRL? pops 1 actually
        0x86 | 0x87 => (2, 0),         // SDPVTL
        0x88 => (1, 1),                // GETINFO
        0x8A => (1, 1),                // ROLL approximated
        0x8B | 0x8C => (2, 1),         // MAX/MIN
        0x8D => (0, 0),                // SCANTYPE pops 1
        0x8E => (2, 0),                // INSTCTRL
        0xC0..=0xDF => (0, 0),         // MDRP
        0xE0..=0xFF => (1, 0),         // MIRP
        _ => (0, 0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a tiny TrueType font with the given loca/glyf and
    /// indexToLocFormat declaration.
    fn build_test_font(num_glyphs: u16, loca: &[u8], glyf: &[u8], loc_format: u16) -> Vec<u8> {
        let mut head = vec![0u8; 54];
        write_u32(&mut head, 0, 0x0001_0000);
        write_u32(&mut head, 12, HEAD_MAGIC);
        write_u16(&mut head, 18, 1000); // unitsPerEm
        write_u16(&mut head, 50, loc_format);

        let mut maxp = vec![0u8; 6];
        write_u32(&mut maxp, 0, 0x0001_0000);
        write_u16(&mut maxp, 4, num_glyphs);

        let mut hhea = vec![0u8; 36];
        write_u16(&mut hhea, 34, num_glyphs);

        let hmtx = vec![0u8; 4 * num_glyphs as usize];

        let mut builder = Builder::new();
        builder.add_table(*b"head", head);
        builder.add_table(*b"maxp", maxp);
        builder.add_table(*b"hhea", hhea);
        builder.add_table(*b"hmtx", hmtx);
        builder.add_table(*b"loca", loca.to_vec());
        builder.add_table(*b"glyf", glyf.to_vec());

        builder.build([0x00, 0x01, 0x00, 0x00])
    }

    /// A minimal valid one-contour glyph (a triangle).
    fn simple_glyph() -> Vec<u8> {
        let mut g = Vec::new();
        push_u16(&mut g, 1); // numberOfContours
        g.extend_from_slice(&[0; 8]); // bbox
        push_u16(&mut g, 2); // endPtsOfContours[0]
        push_u16(&mut g, 0); // instructionLength
        // Three points, all with short positive coords (flag 0x37 = on
        // curve, x/y short and positive... use 0x01|0x02|0x04 = 0x07).
        g.extend_from_slice(&[0x07, 0x07, 0x07]);
        g.extend_from_slice(&[10, 20, 30]); // x deltas
        g.extend_from_slice(&[5, 5, 5]); // y deltas

        g
    }

    #[test]
    fn index_to_loc_format_corrected_from_loca_length() {
        let glyf = simple_glyph();

        // Long-format loca for 2 glyphs (3 entries * 4 bytes), but head
        // declares the short format.
        let mut loca = Vec::new();
        push_u32(&mut loca, 0);
        push_u32(&mut loca, glyf.len() as u32);
        push_u32(&mut loca, glyf.len() as u32);

        let data = build_test_font(2, &loca, &glyf, 0);
        let font = TrueTypeFont::parse(&data, None).unwrap();

        assert_eq!(font.num_glyphs(), 2);
        assert!(font.glyph_present(0));
        assert!(!font.glyph_present(1));
    }

    #[test]
    fn corrupt_glyph_dropped_without_rejecting_font() {
        let good = simple_glyph();
        let mut glyf = good.clone();
        // Second glyph claims 5 contours but has no data behind it.
        let corrupt_start = glyf.len();
        push_u16(&mut glyf, 5);
        glyf.extend_from_slice(&[0; 8]);

        let mut loca = Vec::new();
        push_u32(&mut loca, 0);
        push_u32(&mut loca, corrupt_start as u32);
        push_u32(&mut loca, glyf.len() as u32);

        let data = build_test_font(2, &loca, &glyf, 1);
        let font = TrueTypeFont::parse(&data, None).unwrap();

        assert!(font.glyph_present(0));
        assert!(!font.glyph_present(1));
    }

    #[test]
    fn missing_head_is_fatal() {
        let mut builder = Builder::new();
        builder.add_table(*b"maxp", vec![0; 6]);
        let data = builder.build([0x00, 0x01, 0x00, 0x00]);

        assert!(matches!(
            TrueTypeFont::parse(&data, None),
            Err(FontError::MissingTable("head"))
        ));
    }

    #[test]
    fn hint_checker_accepts_balanced_program() {
        let mut ctx = HintContext::default();
        // PUSHB[0] 3, FDEF, POP is wrong — FDEF pops the id. Define
        // function 3 with an empty body, then call it.
        let fpgm = [0xB0, 3, 0x2C, 0x2D];
        assert!(ctx.check(&fpgm));

        let prep = [0xB0, 3, 0x2B];
        assert!(ctx.check(&prep));
    }

    #[test]
    fn hint_checker_rejects_undefined_call() {
        let mut ctx = HintContext::default();
        let prep = [0xB0, 9, 0x2B];
        assert!(!ctx.check(&prep));
    }

    #[test]
    fn hint_checker_rejects_unbalanced_if() {
        let mut ctx = HintContext::default();
        let prog = [0xB0, 1, 0x58];
        assert!(!ctx.check(&prog));
    }
}
