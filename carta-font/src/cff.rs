//! Structural parsing and recompilation of CFF font programs.
//!
//! Embedded CFF data is parsed into its components (indexes, dicts,
//! charset, private data) and re-serialized from scratch, which fixes the
//! malformed offsets, padding and stale counts PDF producers leave behind.
//! The same serializer builds a fresh CFF around charstrings transcoded
//! from Type1 programs.

use crate::FontError;
use crate::charstring::{self, TranscodedGlyph};
use log::warn;
use rustc_hash::FxHashMap;

/// A private dict and its local subroutines.
#[derive(Debug, Default, Clone)]
pub struct PrivateData {
    pub default_width: f64,
    pub nominal_width: f64,
    pub subrs: Vec<Vec<u8>>,
}

/// A structurally parsed CFF font.
#[derive(Debug)]
pub struct Cff {
    pub font_name: String,
    pub font_matrix: [f64; 6],
    /// Registry, ordering and supplement for CID-keyed fonts.
    pub ros: Option<(String, String, i32)>,
    charstrings: Vec<Vec<u8>>,
    global_subrs: Vec<Vec<u8>>,
    /// Per-glyph SID (name-keyed) or CID (CID-keyed).
    charset: Vec<u16>,
    strings: Vec<Vec<u8>>,
    /// Per-glyph font dict index for CID-keyed fonts.
    fd_select: Vec<u8>,
    /// One entry for name-keyed fonts, one per font dict otherwise.
    privates: Vec<PrivateData>,
}

impl Cff {
    pub fn parse(data: &[u8]) -> Result<Self, FontError> {
        let hdr_size = *data.get(2).ok_or(FontError::Malformed("cff header"))? as usize;
        let mut pos = hdr_size.max(4);

        let (names, after_names) = parse_index(data, pos)?;
        pos = after_names;
        let (top_dicts, after_tops) = parse_index(data, pos)?;
        pos = after_tops;
        let (strings, after_strings) = parse_index(data, pos)?;
        pos = after_strings;
        let (global_subrs, _) = parse_index(data, pos)?;

        let font_name = names
            .first()
            .map(|n| String::from_utf8_lossy(n).into_owned())
            .unwrap_or_else(|| "Unknown".to_string());

        let top = top_dicts
            .first()
            .ok_or(FontError::Malformed("no top dict"))?;
        let top = parse_dict(top);

        let charstrings_offset = dict_int(&top, &[17])
            .ok_or(FontError::Malformed("no CharStrings operator"))?;
        let (charstrings, _) = parse_index(data, charstrings_offset)?;
        let num_glyphs = charstrings.len();

        if num_glyphs == 0 {
            return Err(FontError::Malformed("empty CharStrings index"));
        }

        let font_matrix = top
            .get(&DictKey::from([12, 7].as_slice()))
            .filter(|v| v.len() == 6)
            .map(|v| [v[0], v[1], v[2], v[3], v[4], v[5]])
            .unwrap_or([0.001, 0.0, 0.0, 0.001, 0.0, 0.0]);

        let ros = top.get(&DictKey::from([12, 30].as_slice())).map(|v| {
            let registry = sid_string(&strings, v.first().copied().unwrap_or(0.0) as u16);
            let ordering = sid_string(&strings, v.get(1).copied().unwrap_or(0.0) as u16);

            (registry, ordering, v.get(2).copied().unwrap_or(0.0) as i32)
        });

        let charset = match dict_int(&top, &[15]) {
            Some(offset) if offset > 2 => parse_charset(data, offset, num_glyphs)?,
            // Predefined charsets map gid to sid directly.
            _ => (0..num_glyphs as u16).collect(),
        };

        let (fd_select, privates) = if ros.is_some() {
            let fd_array_offset = dict_int(&top, &[12, 36])
                .ok_or(FontError::Malformed("CID font without FDArray"))?;
            let (fd_dicts, _) = parse_index(data, fd_array_offset)?;

            let mut privates = Vec::with_capacity(fd_dicts.len());

            for fd in &fd_dicts {
                privates.push(parse_private(data, &parse_dict(fd))?);
            }

            if privates.is_empty() {
                return Err(FontError::Malformed("empty FDArray"));
            }

            let fd_select = match dict_int(&top, &[12, 37]) {
                Some(offset) => parse_fd_select(data, offset, num_glyphs, privates.len())?,
                None => vec![0; num_glyphs],
            };

            (fd_select, privates)
        } else {
            let private = parse_private(data, &top)?;

            (Vec::new(), vec![private])
        };

        Ok(Self {
            font_name,
            font_matrix,
            ros,
            charstrings,
            global_subrs,
            charset,
            strings,
            fd_select,
            privates,
        })
    }

    pub fn num_glyphs(&self) -> u16 {
        self.charstrings.len() as u16
    }

    pub fn is_cid(&self) -> bool {
        self.ros.is_some()
    }

    /// Map a CID to a glyph through the charset of a CID-keyed font.
    pub fn glyph_id_by_cid(&self, cid: u16) -> Option<u16> {
        self.charset.iter().position(|c| *c == cid).map(|i| i as u16)
    }

    /// The glyph's name for name-keyed fonts.
    pub fn glyph_name(&self, gid: u16) -> Option<String> {
        if self.is_cid() {
            return None;
        }

        let sid = *self.charset.get(gid as usize)?;

        Some(sid_string(&self.strings, sid))
    }

    pub fn glyph_id_by_name(&self, name: &str) -> Option<u16> {
        if self.is_cid() {
            return None;
        }

        (0..self.num_glyphs()).find(|gid| self.glyph_name(*gid).as_deref() == Some(name))
    }

    /// Re-serialize the font into a fresh, well-formed CFF blob.
    pub fn compile(&self) -> Vec<u8> {
        let mut w = Writer::new(&self.font_name, self.font_matrix);

        w.strings = self.strings.clone();
        w.charstrings = self.charstrings.clone();
        w.global_subrs = self.global_subrs.clone();
        w.charset = self.charset.clone();
        w.privates = self.privates.clone();

        if let Some((registry, ordering, supplement)) = &self.ros {
            let r = w.intern(registry.as_bytes());
            let o = w.intern(ordering.as_bytes());
            w.ros = Some((r, o, *supplement));
            w.fd_select = if self.fd_select.is_empty() {
                vec![0; self.charstrings.len()]
            } else {
                self.fd_select.clone()
            };
        }

        w.compile()
    }
}

/// Build a CFF font from Type1 charstrings transcoded to Type2.
///
/// Subroutines were inlined during transcoding, so the output carries none.
/// Glyph order is preserved except that `.notdef` is moved (or synthesized)
/// at glyph id 0.
pub fn compile_type1(
    font_name: &str,
    font_matrix: [f64; 6],
    glyphs: &[(String, TranscodedGlyph)],
) -> (Vec<u8>, Vec<String>) {
    let mut w = Writer::new(font_name, font_matrix);
    let mut order = Vec::with_capacity(glyphs.len() + 1);

    let notdef = glyphs.iter().position(|(n, _)| n == ".notdef");

    match notdef {
        Some(i) => {
            w.charstrings.push(glyphs[i].1.charstring.clone());
        }
        None => {
            let mut cs = Vec::new();
            let _ = charstring::encode_number(&mut cs, 0.0);
            cs.push(14);
            w.charstrings.push(cs);
        }
    }

    w.charset.push(0);
    order.push(".notdef".to_string());

    for (i, (name, glyph)) in glyphs.iter().enumerate() {
        if Some(i) == notdef {
            continue;
        }

        let sid = w.intern(name.as_bytes());
        w.charset.push(sid);
        w.charstrings.push(glyph.charstring.clone());
        order.push(name.clone());
    }

    w.privates.push(PrivateData::default());

    (w.compile(), order)
}

// ---------------------------------------------------------------- parsing

fn parse_index(data: &[u8], pos: usize) -> Result<(Vec<Vec<u8>>, usize), FontError> {
    let count_bytes = data
        .get(pos..pos + 2)
        .ok_or(FontError::Malformed("truncated index"))?;
    let count = u16::from_be_bytes(count_bytes.try_into().unwrap()) as usize;

    if count == 0 {
        return Ok((Vec::new(), pos + 2));
    }

    let off_size = *data
        .get(pos + 2)
        .ok_or(FontError::Malformed("truncated index"))? as usize;

    if !(1..=4).contains(&off_size) {
        return Err(FontError::Malformed("bad index offset size"));
    }

    let offsets_at = pos + 3;
    let read_offset = |i: usize| -> Option<usize> {
        let bytes = data.get(offsets_at + i * off_size..offsets_at + (i + 1) * off_size)?;

        Some(bytes.iter().fold(0usize, |acc, b| (acc << 8) | *b as usize))
    };

    let data_at = offsets_at + (count + 1) * off_size - 1;
    let mut items = Vec::with_capacity(count);
    let mut end = data_at + 1;

    for i in 0..count {
        let start = read_offset(i).ok_or(FontError::Malformed("truncated index offsets"))?;
        let stop = read_offset(i + 1).ok_or(FontError::Malformed("truncated index offsets"))?;

        if stop < start {
            return Err(FontError::Malformed("non-monotonic index offsets"));
        }

        let item = data
            .get(data_at + start..data_at + stop)
            .ok_or(FontError::Malformed("index item out of bounds"))?;
        items.push(item.to_vec());
        end = data_at + stop;
    }

    Ok((items, end))
}

type DictKey = Box<[u8]>;

fn parse_dict(data: &[u8]) -> FxHashMap<DictKey, Vec<f64>> {
    let mut out = FxHashMap::default();
    let mut operands: Vec<f64> = Vec::new();
    let mut pos = 0usize;

    while pos < data.len() {
        let b = data[pos];
        pos += 1;

        match b {
            0..=21 => {
                let key: DictKey = if b == 12 {
                    let Some(&b1) = data.get(pos) else { break };
                    pos += 1;
                    Box::new([12, b1])
                } else {
                    Box::new([b])
                };

                out.insert(key, std::mem::take(&mut operands));
            }
            28 => {
                let Some(v) = data.get(pos..pos + 2) else { break };
                pos += 2;
                operands.push(i16::from_be_bytes(v.try_into().unwrap()) as f64);
            }
            29 => {
                let Some(v) = data.get(pos..pos + 4) else { break };
                pos += 4;
                operands.push(i32::from_be_bytes(v.try_into().unwrap()) as f64);
            }
            30 => {
                let (v, next) = parse_real(data, pos);
                pos = next;
                operands.push(v);
            }
            32..=246 => operands.push(b as f64 - 139.0),
            247..=250 => {
                let Some(&b1) = data.get(pos) else { break };
                pos += 1;
                operands.push((b as f64 - 247.0) * 256.0 + b1 as f64 + 108.0);
            }
            251..=254 => {
                let Some(&b1) = data.get(pos) else { break };
                pos += 1;
                operands.push(-(b as f64 - 251.0) * 256.0 - b1 as f64 - 108.0);
            }
            _ => {
                warn!("reserved byte {b} in dict data");
                break;
            }
        }
    }

    out
}

/// Nibble-encoded real number.
fn parse_real(data: &[u8], mut pos: usize) -> (f64, usize) {
    let mut s = String::new();

    'outer: while let Some(&b) = data.get(pos) {
        pos += 1;

        for nibble in [b >> 4, b & 0x0F] {
            match nibble {
                0..=9 => s.push((b'0' + nibble) as char),
                0x0A => s.push('.'),
                0x0B => s.push('E'),
                0x0C => s.push_str("E-"),
                0x0E => s.push('-'),
                0x0F => break 'outer,
                _ => {}
            }
        }
    }

    (s.parse().unwrap_or(0.0), pos)
}

fn dict_int(dict: &FxHashMap<DictKey, Vec<f64>>, key: &[u8]) -> Option<usize> {
    let v = dict.get(&DictKey::from(key))?.first().copied()?;

    usize::try_from(v as i64).ok()
}

fn parse_charset(data: &[u8], offset: usize, num_glyphs: usize) -> Result<Vec<u16>, FontError> {
    let format = *data
        .get(offset)
        .ok_or(FontError::Malformed("truncated charset"))?;

    let mut charset = Vec::with_capacity(num_glyphs);
    charset.push(0u16);

    let mut pos = offset + 1;

    match format {
        0 => {
            while charset.len() < num_glyphs {
                let sid = data
                    .get(pos..pos + 2)
                    .ok_or(FontError::Malformed("truncated charset"))?;
                charset.push(u16::from_be_bytes(sid.try_into().unwrap()));
                pos += 2;
            }
        }
        1 | 2 => {
            while charset.len() < num_glyphs {
                let first = data
                    .get(pos..pos + 2)
                    .ok_or(FontError::Malformed("truncated charset"))?;
                let first = u16::from_be_bytes(first.try_into().unwrap());
                pos += 2;

                let n_left = if format == 1 {
                    let n = *data
                        .get(pos)
                        .ok_or(FontError::Malformed("truncated charset"))?
                        as u16;
                    pos += 1;
                    n
                } else {
                    let n = data
                        .get(pos..pos + 2)
                        .ok_or(FontError::Malformed("truncated charset"))?;
                    pos += 2;
                    u16::from_be_bytes(n.try_into().unwrap())
                };

                for i in 0..=n_left {
                    if charset.len() == num_glyphs {
                        break;
                    }

                    charset.push(first.wrapping_add(i));
                }
            }
        }
        _ => return Err(FontError::Malformed("unknown charset format")),
    }

    Ok(charset)
}

fn parse_fd_select(
    data: &[u8],
    offset: usize,
    num_glyphs: usize,
    num_fds: usize,
) -> Result<Vec<u8>, FontError> {
    let format = *data
        .get(offset)
        .ok_or(FontError::Malformed("truncated FDSelect"))?;

    let clamp = |fd: u8| -> u8 {
        if (fd as usize) < num_fds {
            fd
        } else {
            0
        }
    };

    match format {
        0 => {
            let fds = data
                .get(offset + 1..offset + 1 + num_glyphs)
                .ok_or(FontError::Malformed("truncated FDSelect"))?;

            Ok(fds.iter().map(|fd| clamp(*fd)).collect())
        }
        3 => {
            let n_ranges = data
                .get(offset + 1..offset + 3)
                .ok_or(FontError::Malformed("truncated FDSelect"))?;
            let n_ranges = u16::from_be_bytes(n_ranges.try_into().unwrap()) as usize;

            let mut out = vec![0u8; num_glyphs];
            let mut pos = offset + 3;

            for _ in 0..n_ranges {
                let first = data
                    .get(pos..pos + 2)
                    .ok_or(FontError::Malformed("truncated FDSelect"))?;
                let first = u16::from_be_bytes(first.try_into().unwrap()) as usize;
                let fd = *data
                    .get(pos + 2)
                    .ok_or(FontError::Malformed("truncated FDSelect"))?;
                pos += 3;

                let next = data
                    .get(pos..pos + 2)
                    .ok_or(FontError::Malformed("truncated FDSelect"))?;
                let next = u16::from_be_bytes(next.try_into().unwrap()) as usize;

                for slot in out
                    .iter_mut()
                    .take(next.min(num_glyphs))
                    .skip(first.min(num_glyphs))
                {
                    *slot = clamp(fd);
                }
            }

            Ok(out)
        }
        _ => Err(FontError::Malformed("unknown FDSelect format")),
    }
}

fn parse_private(
    data: &[u8],
    dict: &FxHashMap<DictKey, Vec<f64>>,
) -> Result<PrivateData, FontError> {
    let Some(entry) = dict.get(&DictKey::from([18].as_slice())) else {
        return Ok(PrivateData::default());
    };

    let (Some(size), Some(offset)) = (entry.first(), entry.get(1)) else {
        return Ok(PrivateData::default());
    };

    let (size, offset) = (*size as usize, *offset as usize);
    let body = data
        .get(offset..offset + size)
        .ok_or(FontError::Malformed("private dict out of bounds"))?;
    let private = parse_dict(body);

    let default_width = private
        .get(&DictKey::from([20].as_slice()))
        .and_then(|v| v.first().copied())
        .unwrap_or(0.0);
    let nominal_width = private
        .get(&DictKey::from([21].as_slice()))
        .and_then(|v| v.first().copied())
        .unwrap_or(0.0);

    // Subrs offset is relative to the private dict.
    let subrs = match dict_int(&private, &[19]) {
        Some(rel) => parse_index(data, offset + rel)?.0,
        None => Vec::new(),
    };

    Ok(PrivateData {
        default_width,
        nominal_width,
        subrs,
    })
}

fn sid_string(strings: &[Vec<u8>], sid: u16) -> String {
    if let Some(std) = STANDARD_STRINGS.get(sid as usize) {
        return std.to_string();
    }

    strings
        .get(sid as usize - STANDARD_STRINGS.len())
        .map(|s| String::from_utf8_lossy(s).into_owned())
        .unwrap_or_else(|| format!("sid{sid}"))
}

// ------------------------------------------------------------- compiling

struct Writer {
    font_name: String,
    font_matrix: [f64; 6],
    strings: Vec<Vec<u8>>,
    charstrings: Vec<Vec<u8>>,
    global_subrs: Vec<Vec<u8>>,
    charset: Vec<u16>,
    privates: Vec<PrivateData>,
    fd_select: Vec<u8>,
    ros: Option<(u16, u16, i32)>,
}

impl Writer {
    fn new(font_name: &str, font_matrix: [f64; 6]) -> Self {
        Self {
            font_name: font_name.to_string(),
            font_matrix,
            strings: Vec::new(),
            charstrings: Vec::new(),
            global_subrs: Vec::new(),
            charset: Vec::new(),
            privates: Vec::new(),
            fd_select: Vec::new(),
            ros: None,
        }
    }

    /// The SID for a string, adding it to the string index when new.
    fn intern(&mut self, s: &[u8]) -> u16 {
        if let Some(sid) = STANDARD_STRINGS
            .iter()
            .position(|std| std.as_bytes() == s)
        {
            return sid as u16;
        }

        let custom = match self.strings.iter().position(|e| e == s) {
            Some(i) => i,
            None => {
                self.strings.push(s.to_vec());
                self.strings.len() - 1
            }
        };

        (STANDARD_STRINGS.len() + custom) as u16
    }

    fn compile(&self) -> Vec<u8> {
        // Offsets in the top dict are always encoded as 5-byte integers so
        // the dict's size does not depend on their values; serialize once
        // with zeros to learn the layout, then with the real offsets.
        let head = self.fixed_sections();
        let top_size = self.top_dict(&Offsets::default()).len();

        // The top dict index wraps a single dict; its framing is 2 (count)
        // + 1 (offSize) + 2 offsets of the narrowest sufficient width.
        let tail_start = head.len() + 2 + 1 + 2 * offset_size(top_size + 1) + top_size;
        let (offsets, tail) = self.tail_sections(tail_start);

        let mut out = head;
        write_index(&mut out, &[self.top_dict(&offsets)]);
        debug_assert_eq!(out.len(), tail_start);
        out.extend_from_slice(&tail);

        out
    }

    /// Header, name index. These precede the top dict and have
    /// value-independent sizes.
    fn fixed_sections(&self) -> Vec<u8> {
        let mut out = vec![1, 0, 4, 4];
        write_index(&mut out, &[self.font_name.as_bytes().to_vec()]);

        out
    }

    /// Everything after the top dict, and the offsets the top dict needs.
    fn tail_sections(&self, start: usize) -> (Offsets, Vec<u8>) {
        let mut out = Vec::new();
        let mut offsets = Offsets::default();

        write_index(&mut out, &self.strings);
        write_index(&mut out, &self.global_subrs);

        offsets.charset = start + out.len();
        out.push(0); // format 0

        for sid in self.charset.iter().skip(1) {
            out.extend_from_slice(&sid.to_be_bytes());
        }

        if self.ros.is_some() {
            offsets.fd_select = start + out.len();
            out.push(0); // format 0

            for fd in &self.fd_select {
                out.push(*fd);
            }
        }

        offsets.charstrings = start + out.len();
        write_index(&mut out, &self.charstrings);

        // Private dicts, each followed by its subrs. The subrs offset
        // inside a private dict is relative to the dict, and the dict's
        // size is value-independent thanks to 5-byte integers.
        let mut private_spans = Vec::with_capacity(self.privates.len());

        for private in &self.privates {
            let size = private_dict(private, private_dict(private, 0).len()).len();
            let at = start + out.len();
            out.extend_from_slice(&private_dict(private, size));

            if !private.subrs.is_empty() {
                write_index(&mut out, &private.subrs);
            }

            private_spans.push((size, at));
        }

        if self.ros.is_some() {
            offsets.fd_array = start + out.len();

            let fd_dicts: Vec<Vec<u8>> = private_spans
                .iter()
                .map(|(size, at)| {
                    let mut d = Vec::new();
                    dict_operand_int(&mut d, *size as i32);
                    dict_operand_int(&mut d, *at as i32);
                    d.push(18);
                    d
                })
                .collect();

            write_index(&mut out, &fd_dicts);
        } else {
            offsets.private = private_spans.first().copied();
        }

        (offsets, out)
    }

    fn top_dict(&self, offsets: &Offsets) -> Vec<u8> {
        let mut d = Vec::new();

        if let Some((registry, ordering, supplement)) = self.ros {
            dict_operand_int(&mut d, registry as i32);
            dict_operand_int(&mut d, ordering as i32);
            dict_operand_int(&mut d, supplement);
            d.extend_from_slice(&[12, 30]);
        }

        for v in self.font_matrix {
            dict_operand_real(&mut d, v);
        }
        d.extend_from_slice(&[12, 7]);

        dict_operand_int(&mut d, offsets.charset as i32);
        d.push(15);
        dict_operand_int(&mut d, offsets.charstrings as i32);
        d.push(17);

        if self.ros.is_some() {
            dict_operand_int(&mut d, self.charstrings.len() as i32);
            d.extend_from_slice(&[12, 34]); // CIDCount
            dict_operand_int(&mut d, offsets.fd_array as i32);
            d.extend_from_slice(&[12, 36]);
            dict_operand_int(&mut d, offsets.fd_select as i32);
            d.extend_from_slice(&[12, 37]);
        } else {
            let (size, at) = offsets.private.unwrap_or((0, 0));
            dict_operand_int(&mut d, size as i32);
            dict_operand_int(&mut d, at as i32);
            d.push(18);
        }

        d
    }
}

#[derive(Default)]
struct Offsets {
    charset: usize,
    charstrings: usize,
    fd_select: usize,
    fd_array: usize,
    private: Option<(usize, usize)>,
}

/// Serialize a private dict whose subrs index (if any) starts `size` bytes
/// after the dict itself.
fn private_dict(private: &PrivateData, size: usize) -> Vec<u8> {
    let mut d = Vec::new();

    dict_operand_real(&mut d, private.default_width);
    d.push(20);
    dict_operand_real(&mut d, private.nominal_width);
    d.push(21);

    if !private.subrs.is_empty() {
        dict_operand_int(&mut d, size as i32);
        d.push(19);
    }

    d
}

/// Always 5 bytes, so dict sizes stay stable while offsets are resolved.
fn dict_operand_int(out: &mut Vec<u8>, v: i32) {
    out.push(29);
    out.extend_from_slice(&v.to_be_bytes());
}

fn dict_operand_real(out: &mut Vec<u8>, v: f64) {
    if v.fract() == 0.0 && (i32::MIN as f64..=i32::MAX as f64).contains(&v) {
        dict_operand_int(out, v as i32);
        return;
    }

    let s = format!("{v}");
    let mut nibbles: Vec<u8> = Vec::new();

    for c in s.chars() {
        match c {
            '0'..='9' => nibbles.push(c as u8 - b'0'),
            '.' => nibbles.push(0x0A),
            '-' => nibbles.push(0x0E),
            'e' | 'E' => nibbles.push(0x0B),
            _ => {}
        }
    }

    nibbles.push(0x0F);

    if nibbles.len() % 2 == 1 {
        nibbles.push(0x0F);
    }

    out.push(30);

    for pair in nibbles.chunks_exact(2) {
        out.push((pair[0] << 4) | pair[1]);
    }
}

/// The narrowest offset size able to represent `max_offset`.
fn offset_size(max_offset: usize) -> usize {
    match max_offset {
        0..=0xFF => 1,
        0x100..=0xFFFF => 2,
        0x1_0000..=0xFF_FFFF => 3,
        _ => 4,
    }
}

/// Serialize an INDEX with the narrowest sufficient offset size.
fn write_index(out: &mut Vec<u8>, items: &[Vec<u8>]) {
    out.extend_from_slice(&(items.len() as u16).to_be_bytes());

    if items.is_empty() {
        return;
    }

    let total: usize = items.iter().map(Vec::len).sum();
    let off_size = offset_size(total + 1) as u8;

    out.push(off_size);

    let mut offset = 1usize;
    let mut push_offset = |out: &mut Vec<u8>, v: usize| {
        let bytes = (v as u32).to_be_bytes();
        out.extend_from_slice(&bytes[4 - off_size as usize..]);
    };

    push_offset(out, offset);

    for item in items {
        offset += item.len();
        push_offset(out, offset);
    }

    for item in items {
        out.extend_from_slice(item);
    }
}

/// The 391 predefined CFF strings.
pub const STANDARD_STRINGS: &[&str] = &[
    ".notdef", "space", "exclam", "quotedbl", "numbersign", "dollar", "percent", "ampersand",
    "quoteright", "parenleft", "parenright", "asterisk", "plus", "comma", "hyphen", "period",
    "slash", "zero", "one", "two", "three", "four", "five", "six", "seven", "eight", "nine",
    "colon", "semicolon", "less", "equal", "greater", "question", "at", "A", "B", "C", "D",
    "E", "F", "G", "H", "I", "J", "K", "L", "M", "N", "O", "P", "Q", "R", "S", "T", "U", "V",
    "W", "X", "Y", "Z", "bracketleft", "backslash", "bracketright", "asciicircum",
    "underscore", "quoteleft", "a", "b", "c", "d", "e", "f", "g", "h", "i", "j", "k", "l",
    "m", "n", "o", "p", "q", "r", "s", "t", "u", "v", "w", "x", "y", "z", "braceleft", "bar",
    "braceright", "asciitilde", "exclamdown", "cent", "sterling", "fraction", "yen",
    "florin", "section", "currency", "quotesingle", "quotedblleft", "guillemotleft",
    "guilsinglleft", "guilsinglright", "fi", "fl", "endash", "dagger", "daggerdbl",
    "periodcentered", "paragraph", "bullet", "quotesinglbase", "quotedblbase",
    "quotedblright", "guillemotright", "ellipsis", "perthousand", "questiondown", "grave",
    "acute", "circumflex", "tilde", "macron", "breve", "dotaccent", "dieresis", "ring",
    "cedilla", "hungarumlaut", "ogonek", "caron", "emdash", "AE", "ordfeminine", "Lslash",
    "Oslash", "OE", "ordmasculine", "ae", "dotlessi", "lslash", "oslash", "oe",
    "germandbls", "onesuperior", "logicalnot", "mu", "trademark", "Eth", "onehalf",
    "plusminus", "Thorn", "onequarter", "divide", "brokenbar", "degree", "thorn",
    "threequarters", "twosuperior", "registered", "minus", "eth", "multiply",
    "threesuperior", "copyright", "Aacute", "Acircumflex", "Adieresis", "Agrave", "Aring",
    "Atilde", "Ccedilla", "Eacute", "Ecircumflex", "Edieresis", "Egrave", "Iacute",
    "Icircumflex", "Idieresis", "Igrave", "Ntilde", "Oacute", "Ocircumflex", "Odieresis",
    "Ograve", "Otilde", "Scaron", "Uacute", "Ucircumflex", "Udieresis", "Ugrave", "Yacute",
    "Ydieresis", "Zcaron", "aacute", "acircumflex", "adieresis", "agrave", "aring",
    "atilde", "ccedilla", "eacute", "ecircumflex", "edieresis", "egrave", "iacute",
    "icircumflex", "idieresis", "igrave", "ntilde", "oacute", "ocircumflex", "odieresis",
    "ograve", "otilde", "scaron", "uacute", "ucircumflex", "udieresis", "ugrave", "yacute",
    "ydieresis", "zcaron", "exclamsmall", "Hungarumlautsmall", "dollaroldstyle",
    "dollarsuperior", "ampersandsmall", "Acutesmall", "parenleftsuperior",
    "parenrightsuperior", "twodotenleader", "onedotenleader", "zerooldstyle",
    "oneoldstyle", "twooldstyle", "threeoldstyle", "fouroldstyle", "fiveoldstyle",
    "sixoldstyle", "sevenoldstyle", "eightoldstyle", "nineoldstyle",
    "commasuperior", "threequartersemdash", "periodsuperior", "questionsmall",
    "asuperior", "bsuperior", "centsuperior", "dsuperior", "esuperior", "isuperior",
    "lsuperior", "msuperior", "nsuperior", "osuperior", "rsuperior", "ssuperior",
    "tsuperior", "ff", "ffi", "ffl", "parenleftinferior", "parenrightinferior",
    "Circumflexsmall", "hyphensuperior", "Gravesmall", "Asmall", "Bsmall", "Csmall",
    "Dsmall", "Esmall", "Fsmall", "Gsmall", "Hsmall", "Ismall", "Jsmall", "Ksmall",
    "Lsmall", "Msmall", "Nsmall", "Osmall", "Psmall", "Qsmall", "Rsmall", "Ssmall",
    "Tsmall", "Usmall", "Vsmall", "Wsmall", "Xsmall", "Ysmall", "Zsmall", "colonmonetary",
    "onefitted", "rupiah", "Tildesmall", "exclamdownsmall", "centoldstyle",
    "Lslashsmall", "Scaronsmall", "Zcaronsmall", "Dieresissmall", "Brevesmall",
    "Caronsmall", "Dotaccentsmall", "Macronsmall", "figuredash", "hypheninferior",
    "Ogoneksmall", "Ringsmall", "Cedillasmall", "questiondownsmall", "oneeighth",
    "threeeighths", "fiveeighths", "seveneighths", "onethird", "twothirds", "zerosuperior",
    "foursuperior", "fivesuperior", "sixsuperior", "sevensuperior", "eightsuperior",
    "ninesuperior", "zeroinferior", "oneinferior", "twoinferior", "threeinferior",
    "fourinferior", "fiveinferior", "sixinferior", "seveninferior", "eightinferior",
    "nineinferior", "centinferior", "dollarinferior", "periodinferior", "commainferior",
    "Agravesmall", "Aacutesmall", "Acircumflexsmall", "Atildesmall", "Adieresissmall",
    "Aringsmall", "AEsmall", "Ccedillasmall", "Egravesmall", "Eacutesmall",
    "Ecircumflexsmall", "Edieresissmall", "Igravesmall", "Iacutesmall",
    "Icircumflexsmall", "Idieresissmall", "Ethsmall", "Ntildesmall", "Ogravesmall",
    "Oacutesmall", "Ocircumflexsmall", "Otildesmall", "Odieresissmall", "OEsmall",
    "Oslashsmall", "Ugravesmall", "Uacutesmall", "Ucircumflexsmall", "Udieresissmall",
    "Yacutesmall", "Thornsmall", "Ydieresissmall", "001.000", "001.001", "001.002",
    "001.003", "Black", "Bold", "Book", "Light", "Medium", "Regular", "Roman",
    "Semibold",
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::charstring::transcode;

    fn type1_fixture() -> (Vec<u8>, Vec<String>) {
        // A one-contour "A" and a "B": 0 600 hsbw, moveto, lineto, endchar.
        let raw = |w: u8| {
            vec![
                139,
                247,
                w,
                13, // 0 (108 + w) hsbw
                139,
                149,
                21, // 0 10 rmoveto
                239,
                139,
                5, // 100 0 rlineto
                14,
            ]
        };

        let glyphs = vec![
            ("A".to_string(), transcode(&raw(0), &[]).unwrap()),
            ("Zebra".to_string(), transcode(&raw(10), &[]).unwrap()),
        ];

        compile_type1("TestFont", [0.001, 0.0, 0.0, 0.001, 0.0, 0.0], &glyphs)
    }

    #[test]
    fn compile_then_parse_round_trips_structure() {
        let (blob, order) = type1_fixture();
        let cff = Cff::parse(&blob).unwrap();

        assert_eq!(cff.font_name, "TestFont");
        assert!(!cff.is_cid());
        assert_eq!(cff.num_glyphs(), 3);
        assert_eq!(order, vec![".notdef", "A", "Zebra"]);

        assert_eq!(cff.glyph_name(0).as_deref(), Some(".notdef"));
        assert_eq!(cff.glyph_name(1).as_deref(), Some("A"));
        // "Zebra" is not a standard string and lands in the string index.
        assert_eq!(cff.glyph_name(2).as_deref(), Some("Zebra"));
        assert_eq!(cff.glyph_id_by_name("Zebra"), Some(2));
    }

    #[test]
    fn recompile_is_stable() {
        let (blob, _) = type1_fixture();
        let cff = Cff::parse(&blob).unwrap();
        let again = cff.compile();
        let cff2 = Cff::parse(&again).unwrap();

        assert_eq!(cff2.num_glyphs(), cff.num_glyphs());
        assert_eq!(cff2.glyph_name(2), cff.glyph_name(2));
        assert_eq!(cff2.charstrings, cff.charstrings);
    }

    #[test]
    fn missing_charstrings_is_fatal() {
        // Header plus empty indexes only.
        let mut blob = vec![1, 0, 4, 4];
        write_index(&mut blob, &[b"X".to_vec()]);
        // Top dict with nothing in it.
        write_index(&mut blob, &[vec![]]);
        write_index(&mut blob, &[]);
        write_index(&mut blob, &[]);

        assert!(matches!(
            Cff::parse(&blob),
            Err(FontError::Malformed(_))
        ));
    }

    #[test]
    fn dict_real_round_trip() {
        let mut d = Vec::new();
        dict_operand_real(&mut d, 0.001);
        d.extend_from_slice(&[12, 7]);

        let parsed = parse_dict(&d);
        let v = parsed.get(&DictKey::from([12u8, 7].as_slice())).unwrap();
        assert!((v[0] - 0.001).abs() < 1e-12);
    }

    #[test]
    fn index_offsets() {
        let mut out = Vec::new();
        write_index(&mut out, &[vec![1, 2, 3], vec![], vec![4]]);

        let (items, end) = parse_index(&out, 0).unwrap();
        assert_eq!(items, vec![vec![1, 2, 3], vec![], vec![4]]);
        assert_eq!(end, out.len());
    }

    #[test]
    fn standard_strings_table_is_complete() {
        assert_eq!(STANDARD_STRINGS.len(), 391);
        assert_eq!(STANDARD_STRINGS[0], ".notdef");
        assert_eq!(STANDARD_STRINGS[390], "Semibold");
    }
}
