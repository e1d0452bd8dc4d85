//! Parsing of Type1 font programs.
//!
//! A Type1 program has a cleartext PostScript header (encoding, font matrix,
//! font name) followed by an eexec-encrypted private section holding the
//! subroutines and charstrings, each of which is additionally encrypted on
//! its own. Programs may arrive bare, PFB-segmented or with the encrypted
//! section hex-encoded.

use crate::FontError;
use log::warn;

const EEXEC_KEY: u16 = 55665;
const CHARSTRING_KEY: u16 = 4330;
const C1: u16 = 52845;
const C2: u16 = 22719;

/// Decrypt Type1 eexec/charstring data, discarding the first `skip` bytes.
pub fn decrypt(data: &[u8], key: u16, skip: usize) -> Vec<u8> {
    let mut r = key;
    let mut out = Vec::with_capacity(data.len().saturating_sub(skip));

    for (i, &c) in data.iter().enumerate() {
        let p = c ^ (r >> 8) as u8;
        r = (c as u16).wrapping_add(r).wrapping_mul(C1).wrapping_add(C2);

        if i >= skip {
            out.push(p);
        }
    }

    out
}

/// A parsed Type1 font program.
#[derive(Debug)]
pub struct Type1Font {
    pub font_name: String,
    pub font_matrix: [f64; 6],
    /// Built-in encoding, `None` when the program declares
    /// `StandardEncoding`.
    pub encoding: Option<Vec<Option<String>>>,
    /// Decrypted charstrings keyed by glyph name, in program order.
    pub glyphs: Vec<(String, Vec<u8>)>,
    /// Decrypted local subroutines.
    pub subrs: Vec<Vec<u8>>,
}

impl Type1Font {
    pub fn parse(data: &[u8]) -> Result<Self, FontError> {
        let (clear, encrypted) = split_program(data)?;
        let private = decrypt(&encrypted, EEXEC_KEY, 4);

        let font_name = scan_font_name(&clear).unwrap_or_else(|| "Unknown".to_string());
        let font_matrix =
            scan_font_matrix(&clear).unwrap_or([0.001, 0.0, 0.0, 0.001, 0.0, 0.0]);
        let encoding = scan_encoding(&clear);

        let len_iv = scan_len_iv(&private);
        let subrs = scan_subrs(&private, len_iv);
        let glyphs = scan_charstrings(&private, len_iv)?;

        Ok(Self {
            font_name,
            font_matrix,
            encoding,
            glyphs,
            subrs,
        })
    }
}

/// Split a program into its cleartext and (binary) encrypted sections,
/// unwrapping PFB segments and hex-encoded eexec data along the way.
fn split_program(data: &[u8]) -> Result<(Vec<u8>, Vec<u8>), FontError> {
    if data.starts_with(&[0x80]) {
        return split_pfb(data);
    }

    let eexec = find(data, b"eexec").ok_or(FontError::Malformed("no eexec section"))?;
    let clear = data[..eexec].to_vec();

    let mut rest = &data[eexec + 5..];

    while let [b, tail @ ..] = rest
        && matches!(b, b'\r' | b'\n' | b' ' | b'\t')
    {
        rest = tail;
    }

    // The encrypted section may be hex-encoded; the first four bytes of
    // binary eexec data are never all hex digits in practice.
    let is_hex = rest.len() >= 4 && rest[..4].iter().all(|b| b.is_ascii_hexdigit());

    let encrypted = if is_hex {
        let digits: Vec<u8> = rest
            .iter()
            .copied()
            .filter(u8::is_ascii_hexdigit)
            .collect();

        digits
            .chunks_exact(2)
            .map(|c| {
                let hi = (c[0] as char).to_digit(16).unwrap_or(0) as u8;
                let lo = (c[1] as char).to_digit(16).unwrap_or(0) as u8;
                (hi << 4) | lo
            })
            .collect()
    } else {
        rest.to_vec()
    };

    Ok((clear, encrypted))
}

fn split_pfb(data: &[u8]) -> Result<(Vec<u8>, Vec<u8>), FontError> {
    let mut clear = Vec::new();
    let mut encrypted = Vec::new();
    let mut pos = 0usize;

    while pos + 2 <= data.len() {
        if data[pos] != 0x80 {
            return Err(FontError::Malformed("bad pfb segment marker"));
        }

        let kind = data[pos + 1];

        if kind == 0x03 {
            break;
        }

        let len_bytes = data
            .get(pos + 2..pos + 6)
            .ok_or(FontError::Malformed("truncated pfb header"))?;
        let len = u32::from_le_bytes(len_bytes.try_into().unwrap()) as usize;
        let body = data
            .get(pos + 6..pos + 6 + len)
            .ok_or(FontError::Malformed("truncated pfb segment"))?;

        match kind {
            0x01 => clear.extend_from_slice(body),
            0x02 => encrypted.extend_from_slice(body),
            _ => return Err(FontError::Malformed("unknown pfb segment type")),
        }

        pos += 6 + len;
    }

    if encrypted.is_empty() {
        return Err(FontError::Malformed("pfb has no binary segment"));
    }

    Ok((clear, encrypted))
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// A minimal token scanner over PostScript-flavored bytes.
struct Scanner<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Scanner<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn at(data: &'a [u8], pos: usize) -> Self {
        Self { data, pos }
    }

    fn skip_white(&mut self) {
        while let Some(&b) = self.data.get(self.pos) {
            if b.is_ascii_whitespace() {
                self.pos += 1;
            } else if b == b'%' {
                while let Some(&b) = self.data.get(self.pos) {
                    self.pos += 1;

                    if b == b'\n' || b == b'\r' {
                        break;
                    }
                }
            } else {
                break;
            }
        }
    }

    fn token(&mut self) -> Option<&'a [u8]> {
        self.skip_white();

        let start = self.pos;
        let &first = self.data.get(self.pos)?;

        if matches!(first, b'{' | b'}' | b'[' | b']' | b'/') {
            self.pos += 1;

            if first != b'/' {
                return Some(&self.data[start..self.pos]);
            }
        }

        while let Some(&b) = self.data.get(self.pos) {
            if b.is_ascii_whitespace() || matches!(b, b'{' | b'}' | b'[' | b']' | b'/' | b'%') {
                break;
            }

            self.pos += 1;
        }

        (self.pos > start).then(|| &self.data[start..self.pos])
    }

    fn int(&mut self) -> Option<i64> {
        let tok = self.token()?;

        std::str::from_utf8(tok).ok()?.parse().ok()
    }

    fn real(&mut self) -> Option<f64> {
        let tok = self.token()?;

        std::str::from_utf8(tok).ok()?.parse().ok()
    }

    /// Binary data following an `RD`-style token and one whitespace byte.
    fn binary(&mut self, len: usize) -> Option<&'a [u8]> {
        self.pos += 1;

        let out = self.data.get(self.pos..self.pos + len)?;
        self.pos += len;

        Some(out)
    }
}

fn scan_font_name(clear: &[u8]) -> Option<String> {
    let at = find(clear, b"/FontName")?;
    let mut s = Scanner::at(clear, at + 9);
    let tok = s.token()?;
    let name = tok.strip_prefix(b"/")?;

    Some(String::from_utf8_lossy(name).into_owned())
}

fn scan_font_matrix(clear: &[u8]) -> Option<[f64; 6]> {
    let at = find(clear, b"/FontMatrix")?;
    let mut s = Scanner::at(clear, at + 11);

    if s.token()? != b"[" {
        return None;
    }

    let mut m = [0.0; 6];

    for v in &mut m {
        *v = s.real()?;
    }

    Some(m)
}

/// Parse a custom `/Encoding` array built from `dup code /name put` entries.
///
/// Returns `None` for `StandardEncoding` (or anything unparseable), which
/// callers treat as the standard table.
fn scan_encoding(clear: &[u8]) -> Option<Vec<Option<String>>> {
    let at = find(clear, b"/Encoding")?;
    let mut s = Scanner::at(clear, at + 9);

    match s.token()? {
        b"StandardEncoding" => return None,
        _ => {}
    }

    let mut table: Vec<Option<String>> = vec![None; 256];
    let mut any = false;

    // Entries run until `readonly def` or `def` closes the array.
    loop {
        let tok = s.token()?;

        match tok {
            b"dup" => {
                let Some(code) = s.int() else { continue };
                let Some(name) = s.token() else { break };
                let Some(name) = name.strip_prefix(b"/") else {
                    continue;
                };

                if s.token() != Some(b"put".as_slice()) {
                    continue;
                }

                if (0..256).contains(&code) {
                    table[code as usize] = Some(String::from_utf8_lossy(name).into_owned());
                    any = true;
                }
            }
            b"def" | b"ND" | b"|-" => break,
            _ => {}
        }
    }

    any.then_some(table)
}

fn scan_len_iv(private: &[u8]) -> usize {
    find(private, b"/lenIV")
        .and_then(|at| Scanner::at(private, at + 6).int())
        .map(|v| v.clamp(0, 16) as usize)
        .unwrap_or(4)
}

fn scan_subrs(private: &[u8], len_iv: usize) -> Vec<Vec<u8>> {
    let Some(at) = find(private, b"/Subrs") else {
        return Vec::new();
    };

    let mut s = Scanner::at(private, at + 6);
    let Some(count) = s.int() else {
        return Vec::new();
    };
    let count = count.clamp(0, 65_536) as usize;

    let mut subrs = vec![Vec::new(); count];
    let mut seen = 0usize;

    while seen < count {
        let Some(tok) = s.token() else { break };

        match tok {
            b"dup" => {
                let (Some(index), Some(len)) = (s.int(), s.int()) else {
                    break;
                };

                // The RD-style token name varies by producer.
                if s.token().is_none() {
                    break;
                }

                let Some(data) = s.binary(len.clamp(0, 65_536) as usize) else {
                    break;
                };

                if let Some(slot) = subrs.get_mut(index.max(0) as usize) {
                    *slot = decrypt(data, CHARSTRING_KEY, len_iv);
                }

                seen += 1;
            }
            b"ND" | b"|-" | b"noaccess" | b"def" => break,
            _ => {}
        }
    }

    subrs
}

fn scan_charstrings(private: &[u8], len_iv: usize) -> Result<Vec<(String, Vec<u8>)>, FontError> {
    let at = find(private, b"/CharStrings")
        .ok_or(FontError::Malformed("no CharStrings section"))?;

    let mut s = Scanner::at(private, at + 12);
    // Skip past "N dict dup begin".
    let declared = s.int().unwrap_or(0).clamp(0, 65_536) as usize;

    let mut glyphs = Vec::with_capacity(declared);

    loop {
        let Some(tok) = s.token() else { break };

        if tok == b"end" {
            break;
        }

        let Some(name) = tok.strip_prefix(b"/") else {
            continue;
        };

        let Some(len) = s.int() else {
            warn!("charstring entry without a length, stopping");
            break;
        };

        if s.token().is_none() {
            break;
        }

        let Some(data) = s.binary(len.clamp(0, 65_536) as usize) else {
            warn!("truncated charstring data, stopping");
            break;
        };

        glyphs.push((
            String::from_utf8_lossy(name).into_owned(),
            decrypt(data, CHARSTRING_KEY, len_iv),
        ));
    }

    if glyphs.is_empty() {
        return Err(FontError::Malformed("no charstrings"));
    }

    Ok(glyphs)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Invert `decrypt` for building fixtures.
    fn encrypt(data: &[u8], key: u16, lead: usize) -> Vec<u8> {
        let mut r = key;
        let mut out = Vec::new();

        for &p in std::iter::repeat_n(&0u8, lead).chain(data.iter()) {
            let c = p ^ (r >> 8) as u8;
            r = (c as u16).wrapping_add(r).wrapping_mul(C1).wrapping_add(C2);
            out.push(c);
        }

        out
    }

    fn build_program() -> Vec<u8> {
        let charstring_a = encrypt(&[13, 139, 239, 14], CHARSTRING_KEY, 4);
        let subr = encrypt(&[11], CHARSTRING_KEY, 4);

        let mut private = Vec::new();
        private.extend_from_slice(b"dup /Private 9 dict dup begin\n");
        private.extend_from_slice(b"/lenIV 4 def\n");
        private.extend_from_slice(b"/Subrs 1 array\n");
        private.extend_from_slice(format!("dup 0 {} RD ", subr.len()).as_bytes());
        private.extend_from_slice(&subr);
        private.extend_from_slice(b" NP ND\n");
        private.extend_from_slice(b"/CharStrings 1 dict dup begin\n");
        private.extend_from_slice(format!("/A {} RD ", charstring_a.len()).as_bytes());
        private.extend_from_slice(&charstring_a);
        private.extend_from_slice(b" ND\nend\n");

        let mut program = Vec::new();
        program.extend_from_slice(b"%!FontType1-1.0: Test\n");
        program.extend_from_slice(b"/FontName /TestFont def\n");
        program.extend_from_slice(b"/FontMatrix [0.001 0 0 0.001 0 0] readonly def\n");
        program.extend_from_slice(b"/Encoding 256 array\n");
        program.extend_from_slice(b"0 1 255 {1 index exch /.notdef put} for\n");
        program.extend_from_slice(b"dup 65 /A put\nreadonly def\n");
        program.extend_from_slice(b"eexec\n");
        program.extend_from_slice(&encrypt(&private, EEXEC_KEY, 4));

        program
    }

    #[test]
    fn decrypt_round_trip() {
        let plain = b"some charstring bytes";
        let enc = encrypt(plain, CHARSTRING_KEY, 4);

        assert_eq!(decrypt(&enc, CHARSTRING_KEY, 4), plain);
    }

    #[test]
    fn parses_bare_program() {
        let font = Type1Font::parse(&build_program()).unwrap();

        assert_eq!(font.font_name, "TestFont");
        assert_eq!(font.font_matrix[0], 0.001);
        assert_eq!(font.glyphs.len(), 1);
        assert_eq!(font.glyphs[0].0, "A");
        assert_eq!(font.glyphs[0].1, [13, 139, 239, 14]);
        assert_eq!(font.subrs.len(), 1);
        assert_eq!(font.subrs[0], [11]);

        let encoding = font.encoding.unwrap();
        assert_eq!(encoding[65].as_deref(), Some("A"));
        assert!(encoding[66].is_none());
    }

    #[test]
    fn parses_pfb_wrapped_program() {
        let bare = build_program();
        let eexec_at = find(&bare, b"eexec").unwrap() + 6;
        let (clear, binary) = bare.split_at(eexec_at);

        let mut pfb = Vec::new();
        pfb.extend_from_slice(&[0x80, 0x01]);
        pfb.extend_from_slice(&(clear.len() as u32).to_le_bytes());
        pfb.extend_from_slice(clear);
        pfb.extend_from_slice(&[0x80, 0x02]);
        pfb.extend_from_slice(&(binary.len() as u32).to_le_bytes());
        pfb.extend_from_slice(binary);
        pfb.extend_from_slice(&[0x80, 0x03]);

        let font = Type1Font::parse(&pfb).unwrap();
        assert_eq!(font.font_name, "TestFont");
        assert_eq!(font.glyphs.len(), 1);
    }

    #[test]
    fn hex_eexec_section() {
        let bare = build_program();
        let eexec_at = find(&bare, b"eexec").unwrap() + 6;
        let (clear, binary) = bare.split_at(eexec_at);

        let mut hexed = clear.to_vec();

        for b in binary {
            hexed.extend_from_slice(format!("{b:02x}").as_bytes());
        }

        let font = Type1Font::parse(&hexed).unwrap();
        assert_eq!(font.glyphs[0].1, [13, 139, 239, 14]);
    }

    #[test]
    fn missing_eexec_is_fatal() {
        assert!(matches!(
            Type1Font::parse(b"%!FontType1 /FontName /X def"),
            Err(FontError::Malformed(_))
        ));
    }
}
