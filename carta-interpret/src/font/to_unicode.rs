//! Char-code to Unicode mapping, from an embedded ToUnicode CMap or
//! synthesized from encoding tables.

use carta_syntax::{Lexer, Object, Store, Token};
use log::warn;
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// A sparse or identity-range char-code to Unicode mapping.
///
/// The identity form exists so a pure-identity mapping over a wide code
/// range never materializes tens of thousands of entries.
#[derive(Debug, Clone)]
pub enum ToUnicodeMap {
    Sparse(FxHashMap<u32, String>),
    Identity { first: u32, last: u32 },
}

impl ToUnicodeMap {
    pub fn identity(first: u32, last: u32) -> Self {
        Self::Identity { first, last }
    }

    pub fn has(&self, code: u32) -> bool {
        match self {
            Self::Sparse(map) => map.contains_key(&code),
            Self::Identity { first, last } => (*first..=*last).contains(&code),
        }
    }

    pub fn get(&self, code: u32) -> Option<String> {
        match self {
            Self::Sparse(map) => map.get(&code).cloned(),
            Self::Identity { first, last } => {
                if !(*first..=*last).contains(&code) {
                    return None;
                }

                char::from_u32(code).map(String::from)
            }
        }
    }

    /// Add entries to the sparse form.
    ///
    /// The identity form is immutable by construction; amending it is a
    /// caller bug, not a data condition.
    pub fn amend(&mut self, entries: impl IntoIterator<Item = (u32, String)>) {
        match self {
            Self::Sparse(map) => map.extend(entries),
            Self::Identity { .. } => {
                panic!("amend() called on an identity-range ToUnicodeMap")
            }
        }
    }
}

/// Parse the `bfchar`/`bfrange` sections of an embedded ToUnicode CMap.
pub(crate) fn parse_cmap(data: &[u8]) -> Option<ToUnicodeMap> {
    let mut lexer = Lexer::new(data, Arc::new(Store::new()));
    let mut map = FxHashMap::default();

    loop {
        match lexer.next_obj() {
            Token::Eof => break,
            Token::Obj(_) => {}
            Token::Operator(op) => match op.as_str() {
                "beginbfchar" => read_bfchars(&mut lexer, &mut map),
                "beginbfrange" => read_bfranges(&mut lexer, &mut map),
                _ => {}
            },
        }
    }

    if map.is_empty() {
        return None;
    }

    Some(ToUnicodeMap::Sparse(map))
}

fn code_of(bytes: &[u8]) -> Option<u32> {
    if bytes.is_empty() || bytes.len() > 4 {
        return None;
    }

    Some(bytes.iter().fold(0u32, |acc, b| (acc << 8) | *b as u32))
}

/// A CMap destination string is UTF-16BE.
fn unicode_of(bytes: &[u8]) -> String {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|c| u16::from_be_bytes([c[0], c[1]]))
        .collect();

    char::decode_utf16(units)
        .map(|r| r.unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect()
}

fn read_bfchars(lexer: &mut Lexer<'_>, map: &mut FxHashMap<u32, String>) {
    loop {
        let src = match lexer.next_obj() {
            Token::Obj(Object::String(s)) => s,
            Token::Operator(op) if op == "endbfchar" => return,
            Token::Eof => return,
            _ => {
                warn!("unexpected token in bfchar section");
                continue;
            }
        };

        let Token::Obj(Object::String(dst)) = lexer.next_obj() else {
            warn!("bfchar entry without a destination");
            return;
        };

        if let Some(code) = code_of(&src) {
            map.insert(code, unicode_of(&dst));
        }
    }
}

fn read_bfranges(lexer: &mut Lexer<'_>, map: &mut FxHashMap<u32, String>) {
    loop {
        let lo = match lexer.next_obj() {
            Token::Obj(Object::String(s)) => s,
            Token::Operator(op) if op == "endbfrange" => return,
            Token::Eof => return,
            _ => {
                warn!("unexpected token in bfrange section");
                continue;
            }
        };

        let Token::Obj(Object::String(hi)) = lexer.next_obj() else {
            return;
        };

        let (Some(lo), Some(hi)) = (code_of(&lo), code_of(&hi)) else {
            return;
        };

        // Guards against ranges that would materialize the whole code
        // space from a corrupt entry.
        if hi < lo || hi - lo > 0xFFFF {
            warn!("ignoring degenerate bfrange {lo:#x}..{hi:#x}");
            return;
        }

        match lexer.next_obj() {
            // A single destination string mapped incrementally.
            Token::Obj(Object::String(dst)) => {
                for (i, code) in (lo..=hi).enumerate() {
                    let mut bytes = dst.to_vec();

                    // The increment applies to the last UTF-16 unit.
                    if bytes.len() >= 2 {
                        let at = bytes.len() - 2;
                        let unit = u16::from_be_bytes([bytes[at], bytes[at + 1]])
                            .wrapping_add(i as u16);
                        bytes[at..].copy_from_slice(&unit.to_be_bytes());
                    }

                    map.insert(code, unicode_of(&bytes));
                }
            }
            // An array of per-code destination strings.
            Token::Obj(Object::Array(arr)) => {
                for (i, code) in (lo..=hi).enumerate() {
                    if let Some(dst) = arr.get::<Arc<[u8]>>(i) {
                        map.insert(code, unicode_of(&dst));
                    }
                }
            }
            _ => {
                warn!("bfrange entry without a destination");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_range_bounds() {
        let map = ToUnicodeMap::identity(32, 126);

        assert!(map.has(32));
        assert!(map.has(126));
        assert!(!map.has(31));
        assert!(!map.has(127));

        assert_eq!(map.get(65), Some("A".to_string()));
        // Out of range is absent, not an error.
        assert_eq!(map.get(0xFFFF), None);
    }

    #[test]
    #[should_panic(expected = "identity-range")]
    fn amend_on_identity_panics() {
        let mut map = ToUnicodeMap::identity(0, 255);
        map.amend([(1, "x".to_string())]);
    }

    #[test]
    fn amend_on_sparse() {
        let mut map = ToUnicodeMap::Sparse(FxHashMap::default());
        map.amend([(65, "A".to_string())]);

        assert_eq!(map.get(65), Some("A".to_string()));
        assert!(!map.has(66));
    }

    #[test]
    fn bfchar_parsing() {
        let cmap = b"
            /CIDInit /ProcSet findresource begin
            begincmap
            2 beginbfchar
            <01> <0041>
            <02> <00480069>
            endbfchar
            endcmap
        ";

        let map = parse_cmap(cmap).unwrap();
        assert_eq!(map.get(1), Some("A".to_string()));
        assert_eq!(map.get(2), Some("Hi".to_string()));
    }

    #[test]
    fn bfrange_incremental_and_array() {
        let cmap = b"
            2 beginbfrange
            <10> <12> <0061>
            <20> <21> [<0058> <0059>]
            endbfrange
        ";

        let map = parse_cmap(cmap).unwrap();
        assert_eq!(map.get(0x10), Some("a".to_string()));
        assert_eq!(map.get(0x11), Some("b".to_string()));
        assert_eq!(map.get(0x12), Some("c".to_string()));
        assert_eq!(map.get(0x20), Some("X".to_string()));
        assert_eq!(map.get(0x21), Some("Y".to_string()));
        assert!(!map.has(0x13));
    }

    #[test]
    fn surrogate_pair_destination() {
        let cmap = b"
            1 beginbfchar
            <03> <D83DDE00>
            endbfchar
        ";

        let map = parse_cmap(cmap).unwrap();
        assert_eq!(map.get(3), Some("\u{1F600}".to_string()));
    }
}
