//! Writing OpenType containers.
//!
//! Repaired font programs are re-packaged into a minimal sfnt container so
//! downstream rasterizers only ever see well-formed fonts. The builder takes
//! care of directory layout, 4-byte padding, per-table checksums and the
//! `head` checksum adjustment, and can synthesize the `cmap`, `name`,
//! `OS/2` and `post` tables that subsetted programs usually lack.

/// A four-byte table tag.
pub type Tag = [u8; 4];

pub(crate) fn push_u16(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_be_bytes());
}

pub(crate) fn push_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_be_bytes());
}

pub(crate) fn push_i16(out: &mut Vec<u8>, v: i16) {
    out.extend_from_slice(&v.to_be_bytes());
}

/// Assembles an sfnt container from finished tables.
pub struct Builder {
    tables: Vec<(Tag, Vec<u8>)>,
}

const HEAD_CHECKSUM_MAGIC: u32 = 0xB1B0_AFBA;

impl Builder {
    pub fn new() -> Self {
        Self { tables: Vec::new() }
    }

    pub fn add_table(&mut self, tag: Tag, data: Vec<u8>) {
        // Later additions of the same tag win; the sanitizer may replace a
        // table it first kept.
        self.tables.retain(|(t, _)| *t != tag);
        self.tables.push((tag, data));
    }

    pub fn has_table(&self, tag: Tag) -> bool {
        self.tables.iter().any(|(t, _)| *t == tag)
    }

    /// Serialize the container with the given sfnt version tag
    /// (`\x00\x01\x00\x00` for TrueType outlines, `OTTO` for CFF).
    pub fn build(mut self, version: Tag) -> Vec<u8> {
        self.tables.sort_by_key(|(tag, _)| *tag);

        let num_tables = self.tables.len() as u16;
        let entry_selector = (u16::BITS - 1 - num_tables.leading_zeros().min(15)) as u16;
        let search_range = (1u16 << entry_selector) * 16;
        let range_shift = num_tables * 16 - search_range;

        let mut out = Vec::new();
        out.extend_from_slice(&version);
        push_u16(&mut out, num_tables);
        push_u16(&mut out, search_range);
        push_u16(&mut out, entry_selector);
        push_u16(&mut out, range_shift);

        let mut offset = 12 + 16 * self.tables.len();
        let mut head_offset = None;

        for (tag, data) in &mut self.tables {
            while data.len() % 4 != 0 {
                data.push(0);
            }

            if tag == b"head" {
                head_offset = Some(offset);

                // Zero the adjustment before checksumming.
                if data.len() >= 12 {
                    data[8..12].fill(0);
                }
            }

            out.extend_from_slice(tag);
            push_u32(&mut out, checksum(data));
            push_u32(&mut out, offset as u32);
            push_u32(&mut out, data.len() as u32);

            offset += data.len();
        }

        for (_, data) in &self.tables {
            out.extend_from_slice(data);
        }

        if let Some(head) = head_offset {
            let adjustment = HEAD_CHECKSUM_MAGIC.wrapping_sub(checksum(&out));
            out[head + 8..head + 12].copy_from_slice(&adjustment.to_be_bytes());
        }

        out
    }
}

impl Default for Builder {
    fn default() -> Self {
        Self::new()
    }
}

fn checksum(data: &[u8]) -> u32 {
    let mut sum = 0u32;

    for chunk in data.chunks(4) {
        let mut word = [0u8; 4];
        word[..chunk.len()].copy_from_slice(chunk);
        sum = sum.wrapping_add(u32::from_be_bytes(word));
    }

    sum
}

/// Synthesize a `cmap` table from sorted (char code, glyph id) mappings.
///
/// Codes within the BMP go into a format 4 subtable; if any mapping lies in
/// a supplementary plane a format 12 subtable is emitted alongside it.
pub fn encode_cmap(mappings: &[(u32, u16)]) -> Vec<u8> {
    let mut mappings = mappings.to_vec();
    mappings.sort_by_key(|(code, _)| *code);
    mappings.dedup_by_key(|(code, _)| *code);

    let bmp: Vec<(u16, u16)> = mappings
        .iter()
        .filter(|(code, _)| *code <= 0xFFFF)
        .map(|(code, gid)| (*code as u16, *gid))
        .collect();
    let needs_format12 = mappings.iter().any(|(code, _)| *code > 0xFFFF);

    let format4 = encode_format4(&bmp);
    let format12 = needs_format12.then(|| encode_format12(&mappings));

    let num_subtables = 1 + format12.is_some() as u16;
    let mut out = Vec::new();
    push_u16(&mut out, 0); // version
    push_u16(&mut out, num_subtables);

    let mut offset = 4 + 8 * num_subtables as u32;

    // Windows, Unicode BMP.
    push_u16(&mut out, 3);
    push_u16(&mut out, 1);
    push_u32(&mut out, offset);
    offset += format4.len() as u32;

    if format12.is_some() {
        // Windows, Unicode full repertoire.
        push_u16(&mut out, 3);
        push_u16(&mut out, 10);
        push_u32(&mut out, offset);
    }

    out.extend_from_slice(&format4);

    if let Some(f12) = format12 {
        out.extend_from_slice(&f12);
    }

    out
}

struct Segment {
    start: u16,
    end: u16,
    gids: Vec<u16>,
}

fn encode_format4(mappings: &[(u16, u16)]) -> Vec<u8> {
    let mut segments: Vec<Segment> = Vec::new();

    for &(code, gid) in mappings {
        match segments.last_mut() {
            Some(seg) if code == seg.end.wrapping_add(1) && seg.end != 0xFFFE => {
                seg.end = code;
                seg.gids.push(gid);
            }
            _ => segments.push(Segment {
                start: code,
                end: code,
                gids: vec![gid],
            }),
        }
    }

    // Format 4 requires a terminating 0xFFFF segment.
    segments.push(Segment {
        start: 0xFFFF,
        end: 0xFFFF,
        gids: vec![0],
    });

    let seg_count = segments.len() as u16;
    let floor_log = 31 - (seg_count as u32).leading_zeros();
    let search_range = 2u16 * (1 << floor_log);
    let entry_selector = floor_log as u16;

    let mut end_codes = Vec::new();
    let mut start_codes = Vec::new();
    let mut id_deltas = Vec::new();
    let mut id_range_offsets = Vec::new();
    let mut glyph_ids: Vec<u16> = Vec::new();

    // First decide per segment whether a constant delta suffices.
    let uses_array: Vec<bool> = segments
        .iter()
        .map(|seg| {
            !seg.gids
                .iter()
                .enumerate()
                .all(|(i, gid)| *gid == seg.gids[0].wrapping_add(i as u16))
        })
        .collect();

    for (i, seg) in segments.iter().enumerate() {
        push_u16(&mut end_codes, seg.end);
        push_u16(&mut start_codes, seg.start);

        if uses_array[i] {
            push_u16(&mut id_deltas, 0);

            // Offset from this idRangeOffset slot to the segment's entries
            // in the glyph-id array.
            let remaining_slots = seg_count as usize - i;
            let offset = 2 * (remaining_slots + glyph_ids.len());
            push_u16(&mut id_range_offsets, offset as u16);
            glyph_ids.extend_from_slice(&seg.gids);
        } else {
            push_u16(&mut id_deltas, seg.gids[0].wrapping_sub(seg.start));
            push_u16(&mut id_range_offsets, 0);
        }
    }

    let length = 16 + 8 * seg_count as usize + 2 * glyph_ids.len();

    let mut out = Vec::new();
    push_u16(&mut out, 4);
    push_u16(&mut out, length as u16);
    push_u16(&mut out, 0); // language
    push_u16(&mut out, seg_count * 2);
    push_u16(&mut out, search_range);
    push_u16(&mut out, entry_selector);
    push_u16(&mut out, (seg_count * 2).saturating_sub(search_range));
    out.extend_from_slice(&end_codes);
    push_u16(&mut out, 0); // reservedPad
    out.extend_from_slice(&start_codes);
    out.extend_from_slice(&id_deltas);
    out.extend_from_slice(&id_range_offsets);

    for gid in glyph_ids {
        push_u16(&mut out, gid);
    }

    out
}

fn encode_format12(mappings: &[(u32, u16)]) -> Vec<u8> {
    struct Group {
        start: u32,
        end: u32,
        gid: u16,
    }

    let mut groups: Vec<Group> = Vec::new();

    for &(code, gid) in mappings {
        match groups.last_mut() {
            Some(g)
                if code == g.end + 1 && gid as u32 == g.gid as u32 + (code - g.start) =>
            {
                g.end = code;
            }
            _ => groups.push(Group {
                start: code,
                end: code,
                gid,
            }),
        }
    }

    let mut out = Vec::new();
    push_u16(&mut out, 12);
    push_u16(&mut out, 0); // reserved
    push_u32(&mut out, 16 + 12 * groups.len() as u32);
    push_u32(&mut out, 0); // language
    push_u32(&mut out, groups.len() as u32);

    for g in &groups {
        push_u32(&mut out, g.start);
        push_u32(&mut out, g.end);
        push_u32(&mut out, g.gid as u32);
    }

    out
}

/// Synthesize a `head` table.
///
/// The checksum adjustment is left zero; [`Builder::build`] fills it in.
pub fn synthesize_head(units_per_em: u16, index_to_loc_format: i16) -> Vec<u8> {
    let mut out = Vec::new();
    push_u32(&mut out, 0x0001_0000); // version
    push_u32(&mut out, 0); // fontRevision
    push_u32(&mut out, 0); // checkSumAdjustment
    push_u32(&mut out, 0x5F0F_3CF5); // magicNumber
    push_u16(&mut out, 0); // flags
    push_u16(&mut out, units_per_em);
    out.extend_from_slice(&[0; 16]); // created, modified
    push_i16(&mut out, 0); // xMin
    push_i16(&mut out, -(units_per_em as i32 / 5) as i16); // yMin
    push_i16(&mut out, units_per_em as i16); // xMax
    push_i16(&mut out, units_per_em as i16); // yMax
    push_u16(&mut out, 0); // macStyle
    push_u16(&mut out, 8); // lowestRecPPEM
    push_i16(&mut out, 2); // fontDirectionHint
    push_i16(&mut out, index_to_loc_format);
    push_i16(&mut out, 0); // glyphDataFormat

    out
}

/// Synthesize an `hhea` table.
pub fn synthesize_hhea(ascent: i16, descent: i16, num_h_metrics: u16) -> Vec<u8> {
    let mut out = Vec::new();
    push_u32(&mut out, 0x0001_0000); // version
    push_i16(&mut out, ascent);
    push_i16(&mut out, descent);
    push_i16(&mut out, 0); // lineGap
    push_u16(&mut out, 0); // advanceWidthMax
    push_i16(&mut out, 0); // minLeftSideBearing
    push_i16(&mut out, 0); // minRightSideBearing
    push_i16(&mut out, 0); // xMaxExtent
    push_i16(&mut out, 1); // caretSlopeRise
    push_i16(&mut out, 0); // caretSlopeRun
    push_i16(&mut out, 0); // caretOffset
    out.extend_from_slice(&[0; 8]); // reserved
    push_i16(&mut out, 0); // metricDataFormat
    push_u16(&mut out, num_h_metrics);

    out
}

/// Synthesize an `hmtx` table from advance widths, with zero side bearings.
pub fn synthesize_hmtx(advances: &[u16]) -> Vec<u8> {
    let mut out = Vec::new();

    for advance in advances {
        push_u16(&mut out, *advance);
        push_i16(&mut out, 0);
    }

    out
}

/// Synthesize a version-0.5 `maxp` table, the form used with CFF outlines.
pub fn synthesize_maxp(num_glyphs: u16) -> Vec<u8> {
    let mut out = Vec::new();
    push_u32(&mut out, 0x0000_5000);
    push_u16(&mut out, num_glyphs);

    out
}

/// Synthesize a version-3 `post` table (no glyph names).
pub fn synthesize_post() -> Vec<u8> {
    let mut out = Vec::new();
    push_u32(&mut out, 0x0003_0000);
    push_u32(&mut out, 0); // italicAngle
    push_u16(&mut out, 0); // underlinePosition
    push_u16(&mut out, 0); // underlineThickness
    push_u32(&mut out, 0); // isFixedPitch
    out.extend_from_slice(&[0; 16]); // memory fields

    out
}

/// Synthesize a minimal `OS/2` table.
pub fn synthesize_os2(
    units_per_em: u16,
    ascent: i16,
    descent: i16,
    first_char: u16,
    last_char: u16,
) -> Vec<u8> {
    let mut out = Vec::new();
    push_u16(&mut out, 1); // version
    push_u16(&mut out, units_per_em / 2); // xAvgCharWidth
    push_u16(&mut out, 400); // usWeightClass
    push_u16(&mut out, 5); // usWidthClass
    push_u16(&mut out, 0); // fsType
    for _ in 0..12 {
        push_u16(&mut out, 0); // subscript/superscript/strikeout metrics
    }
    push_u16(&mut out, 0); // sFamilyClass
    out.extend_from_slice(&[0; 10]); // panose
    push_u32(&mut out, 0); // ulUnicodeRange1
    push_u32(&mut out, 0);
    push_u32(&mut out, 0);
    push_u32(&mut out, 0);
    out.extend_from_slice(b"CRTA"); // achVendID
    push_u16(&mut out, 0x0040); // fsSelection: REGULAR
    push_u16(&mut out, first_char);
    push_u16(&mut out, last_char);
    push_u16(&mut out, ascent as u16); // sTypoAscender
    push_u16(&mut out, descent as u16); // sTypoDescender
    push_u16(&mut out, 0); // sTypoLineGap
    push_u16(&mut out, ascent.max(0) as u16); // usWinAscent
    push_u16(&mut out, descent.unsigned_abs()); // usWinDescent
    push_u32(&mut out, 0); // ulCodePageRange1
    push_u32(&mut out, 0); // ulCodePageRange2

    out
}

/// Synthesize a `name` table carrying a single PostScript name.
pub fn synthesize_name(ps_name: &str) -> Vec<u8> {
    // Name ids 1 (family), 4 (full) and 6 (PostScript), Windows platform.
    let ids = [1u16, 4, 6];
    let utf16: Vec<u8> = ps_name.encode_utf16().flat_map(|u| u.to_be_bytes()).collect();

    let mut out = Vec::new();
    push_u16(&mut out, 0); // format
    push_u16(&mut out, ids.len() as u16);
    push_u16(&mut out, 6 + 12 * ids.len() as u16); // stringOffset

    for id in ids {
        push_u16(&mut out, 3); // platform: Windows
        push_u16(&mut out, 1); // encoding: Unicode BMP
        push_u16(&mut out, 0x409); // language: en-US
        push_u16(&mut out, id);
        push_u16(&mut out, utf16.len() as u16);
        push_u16(&mut out, 0); // all records share the one string
    }

    out.extend_from_slice(&utf16);

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_u16(data: &[u8], at: usize) -> u16 {
        u16::from_be_bytes([data[at], data[at + 1]])
    }

    /// Resolve a char code through an encoded format 4 subtable.
    fn lookup_format4(table: &[u8], code: u16) -> u16 {
        let seg_count = (read_u16(table, 6) / 2) as usize;
        let end_codes = 14;
        let start_codes = end_codes + 2 * seg_count + 2;
        let deltas = start_codes + 2 * seg_count;
        let offsets = deltas + 2 * seg_count;

        for i in 0..seg_count {
            let end = read_u16(table, end_codes + 2 * i);
            let start = read_u16(table, start_codes + 2 * i);

            if code >= start && code <= end {
                let offset = read_u16(table, offsets + 2 * i);

                if offset == 0 {
                    let delta = read_u16(table, deltas + 2 * i);
                    return code.wrapping_add(delta);
                }

                let slot = offsets + 2 * i + offset as usize + 2 * (code - start) as usize;
                return read_u16(table, slot);
            }
        }

        0
    }

    #[test]
    fn format4_constant_delta_and_array() {
        // 0x41..0x43 map to consecutive gids, 0x61 to a lone one, and
        // 0x70..0x71 to a non-arithmetic pair forcing the glyph-id array.
        let mappings = [
            (0x41u32, 5u16),
            (0x42, 6),
            (0x43, 7),
            (0x61, 40),
            (0x70, 9),
            (0x71, 3),
        ];
        let cmap = encode_cmap(&mappings);

        // Skip the cmap header and one encoding record.
        let subtable = &cmap[12..];
        assert_eq!(read_u16(subtable, 0), 4);

        for (code, gid) in mappings {
            assert_eq!(lookup_format4(subtable, code as u16), gid, "code {code:#x}");
        }
        assert_eq!(lookup_format4(subtable, 0x44), 0);
    }

    #[test]
    fn format12_emitted_for_supplementary_planes() {
        let mappings = [(0x41u32, 1u16), (0x1F600, 2)];
        let cmap = encode_cmap(&mappings);

        assert_eq!(read_u16(&cmap, 2), 2);
        // Second encoding record is (3, 10).
        assert_eq!(read_u16(&cmap, 12), 3);
        assert_eq!(read_u16(&cmap, 14), 10);
    }

    #[test]
    fn container_roundtrip_shape() {
        let mut builder = Builder::new();
        builder.add_table(*b"cmap", encode_cmap(&[(0x41, 1)]));
        builder.add_table(*b"post", synthesize_post());

        let font = builder.build(*b"OTTO");

        assert_eq!(&font[0..4], b"OTTO");
        assert_eq!(read_u16(&font, 4), 2);
        // Directory entries are sorted by tag.
        assert_eq!(&font[12..16], b"cmap");
        assert_eq!(&font[28..32], b"post");
    }
}
