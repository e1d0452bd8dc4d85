use crate::object::{Array, Dict, Name, Number, Object, Store};
use crate::reader::{Reader, is_delimiter, is_white_space};
use log::warn;
use std::sync::Arc;

/// One item pulled from a content stream.
#[derive(Clone, Debug)]
pub enum Token {
    /// An operand.
    Obj(Object),
    /// An operator mnemonic.
    Operator(String),
    /// End of the stream.
    Eof,
}

/// A pull-based lexer over content-stream bytes.
///
/// Calling [`Lexer::next_obj`] yields operands and operator mnemonics in
/// source order, ending with [`Token::Eof`]. Malformed constructs are
/// skipped with a warning so a single bad token cannot wedge the stream.
pub struct Lexer<'a> {
    r: Reader<'a>,
    store: Arc<Store>,
}

impl<'a> Lexer<'a> {
    pub fn new(data: &'a [u8], store: Arc<Store>) -> Self {
        Self {
            r: Reader::new(data),
            store,
        }
    }

    pub fn next_obj(&mut self) -> Token {
        loop {
            self.r.skip_white_spaces_and_comments();

            let Some(b) = self.r.peek_byte() else {
                return Token::Eof;
            };

            match b {
                b'/' | b'.' | b'+' | b'-' | b'0'..=b'9' | b'[' | b'(' => {
                    match self.read_object() {
                        Some(obj) => return Token::Obj(obj),
                        None => {
                            warn!("skipping malformed operand in content stream");
                            self.r.forward();
                        }
                    }
                }
                b'<' => match self.read_object() {
                    Some(obj) => return Token::Obj(obj),
                    None => {
                        warn!("skipping malformed string or dictionary");
                        self.r.forward();
                    }
                },
                b']' | b'>' | b')' | b'{' | b'}' => {
                    // Stray closing delimiters are dropped.
                    self.r.forward();
                }
                _ => {
                    let run = self.r.read_regular_run();

                    if run.is_empty() {
                        self.r.forward();
                        continue;
                    }

                    match run {
                        b"true" => return Token::Obj(Object::Bool(true)),
                        b"false" => return Token::Obj(Object::Bool(false)),
                        b"null" => return Token::Obj(Object::Null),
                        _ => match std::str::from_utf8(run) {
                            Ok(s) => return Token::Operator(s.to_string()),
                            Err(_) => {
                                warn!("operator is not valid ASCII, skipping");
                            }
                        },
                    }
                }
            }
        }
    }

    /// After an `ID` operator, the raw image bytes up to the closing `EI`.
    ///
    /// The byte directly after `ID` is the single separating whitespace and
    /// is not part of the data.
    pub fn inline_image_bytes(&mut self) -> Option<&'a [u8]> {
        self.r.read_byte()?;

        let start = self.r.offset();

        loop {
            let here = self.r.offset();
            let bytes = self.r.peek_bytes(2)?;

            if bytes == b"EI" {
                let at_boundary = self
                    .r
                    .range(here.wrapping_sub(1), here)
                    .is_none_or(|p| is_white_space(p[0]));
                let followed_ok = self
                    .r
                    .range(here + 2, here + 3)
                    .is_none_or(|n| is_white_space(n[0]) || is_delimiter(n[0]));

                if at_boundary && followed_ok {
                    let data = self.r.range(start, here)?;
                    self.r.jump(here + 2);

                    return Some(data);
                }
            }

            self.r.forward();
        }
    }

    fn read_object(&mut self) -> Option<Object> {
        self.r.skip_white_spaces_and_comments();

        match self.r.peek_byte()? {
            b'/' => self.read_name().map(Object::Name),
            b'(' => self.read_literal_string(),
            b'<' => {
                if self.r.peek_bytes(2) == Some(b"<<") {
                    self.read_dict().map(Object::Dict)
                } else {
                    self.read_hex_string()
                }
            }
            b'[' => self.read_array().map(Object::Array),
            b'.' | b'+' | b'-' | b'0'..=b'9' => {
                let run = self.r.read_regular_run();
                Number::parse(run).map(Object::Number)
            }
            _ => {
                let run = self.r.read_regular_run();

                match run {
                    b"true" => Some(Object::Bool(true)),
                    b"false" => Some(Object::Bool(false)),
                    b"null" => Some(Object::Null),
                    _ => None,
                }
            }
        }
    }

    fn read_name(&mut self) -> Option<Name> {
        self.r.read_byte()?;

        let run = self.r.read_regular_run();
        let mut out = String::with_capacity(run.len());
        let mut i = 0;

        while i < run.len() {
            let b = run[i];

            if b == b'#' && i + 2 < run.len() {
                let hex = std::str::from_utf8(&run[i + 1..i + 3]).ok()?;

                if let Ok(v) = u8::from_str_radix(hex, 16) {
                    out.push(v as char);
                    i += 3;
                    continue;
                }
            }

            out.push(b as char);
            i += 1;
        }

        Some(Name::new(&out))
    }

    fn read_literal_string(&mut self) -> Option<Object> {
        self.r.read_byte()?;

        let mut out = Vec::new();
        let mut depth = 1usize;

        loop {
            let b = self.r.read_byte()?;

            match b {
                b'(' => {
                    depth += 1;
                    out.push(b);
                }
                b')' => {
                    depth -= 1;

                    if depth == 0 {
                        break;
                    }

                    out.push(b);
                }
                b'\\' => {
                    let esc = self.r.read_byte()?;

                    match esc {
                        b'n' => out.push(b'\n'),
                        b'r' => out.push(b'\r'),
                        b't' => out.push(b'\t'),
                        b'b' => out.push(8),
                        b'f' => out.push(12),
                        b'(' | b')' | b'\\' => out.push(esc),
                        b'\r' => {
                            // Line continuation; swallow an optional \n.
                            if self.r.peek_byte() == Some(b'\n') {
                                self.r.forward();
                            }
                        }
                        b'\n' => {}
                        b'0'..=b'7' => {
                            let mut v = (esc - b'0') as u16;

                            for _ in 0..2 {
                                match self.r.peek_byte() {
                                    Some(d @ b'0'..=b'7') => {
                                        v = v * 8 + (d - b'0') as u16;
                                        self.r.forward();
                                    }
                                    _ => break,
                                }
                            }

                            out.push(v as u8);
                        }
                        other => out.push(other),
                    }
                }
                other => out.push(other),
            }
        }

        Some(Object::string(&out))
    }

    fn read_hex_string(&mut self) -> Option<Object> {
        self.r.read_byte()?;

        let mut digits = Vec::new();

        loop {
            let b = self.r.read_byte()?;

            if b == b'>' {
                break;
            }

            if b.is_ascii_hexdigit() {
                digits.push(b);
            } else if !is_white_space(b) {
                warn!("invalid byte {b:#x} in hex string");
            }
        }

        // An odd trailing digit is padded with zero.
        if digits.len() % 2 == 1 {
            digits.push(b'0');
        }

        let out = digits
            .chunks_exact(2)
            .map(|c| {
                let hi = (c[0] as char).to_digit(16).unwrap_or(0) as u8;
                let lo = (c[1] as char).to_digit(16).unwrap_or(0) as u8;
                (hi << 4) | lo
            })
            .collect::<Vec<_>>();

        Some(Object::string(&out))
    }

    fn read_array(&mut self) -> Option<Array> {
        self.r.read_byte()?;

        let mut items = Vec::new();

        loop {
            self.r.skip_white_spaces_and_comments();

            match self.r.peek_byte()? {
                b']' => {
                    self.r.forward();
                    break;
                }
                _ => items.push(self.read_object()?),
            }
        }

        Some(Array::from_objects(self.store.clone(), items))
    }

    fn read_dict(&mut self) -> Option<Dict> {
        self.r.read_bytes(2)?;

        let mut pairs = Vec::new();

        loop {
            self.r.skip_white_spaces_and_comments();

            if self.r.peek_bytes(2) == Some(b">>") {
                self.r.read_bytes(2)?;
                break;
            }

            if self.r.peek_byte()? != b'/' {
                warn!("expected name as dictionary key");

                return None;
            }

            let key = self.read_name()?;
            let value = self.read_object()?;
            pairs.push((key, value));
        }

        Some(Dict::from_pairs(self.store.clone(), pairs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex_all(data: &[u8]) -> Vec<Token> {
        let mut lexer = Lexer::new(data, Arc::new(Store::new()));
        let mut out = Vec::new();

        loop {
            let tok = lexer.next_obj();

            if matches!(tok, Token::Eof) {
                break;
            }

            out.push(tok);
        }

        out
    }

    #[test]
    fn numbers_and_operator() {
        let toks = lex_all(b"1 0 0 1 50 -7.5 cm");

        assert_eq!(toks.len(), 7);
        assert!(matches!(&toks[6], Token::Operator(op) if op == "cm"));
        assert!(
            matches!(&toks[5], Token::Obj(Object::Number(n)) if (n.as_f32() + 7.5).abs() < 1e-6)
        );
    }

    #[test]
    fn strings() {
        let toks = lex_all(b"(a\\)b) <48656C6C6F> (nest(ed)) Tj");

        let Token::Obj(Object::String(s0)) = &toks[0] else {
            panic!("expected string");
        };
        assert_eq!(s0.as_ref(), b"a)b");

        let Token::Obj(Object::String(s1)) = &toks[1] else {
            panic!("expected string");
        };
        assert_eq!(s1.as_ref(), b"Hello");

        let Token::Obj(Object::String(s2)) = &toks[2] else {
            panic!("expected string");
        };
        assert_eq!(s2.as_ref(), b"nest(ed)");
    }

    #[test]
    fn octal_escape() {
        let toks = lex_all(b"(\\101\\12) Tj");

        let Token::Obj(Object::String(s)) = &toks[0] else {
            panic!("expected string");
        };
        assert_eq!(s.as_ref(), &[b'A', b'\n']);
    }

    #[test]
    fn names_with_hex_escape() {
        let toks = lex_all(b"/Im#321 Do");

        assert!(matches!(&toks[0], Token::Obj(Object::Name(n)) if n.as_str() == "Im21"));
    }

    #[test]
    fn nested_containers() {
        let toks = lex_all(b"[/A 1 [(x)]] <</K 2 /D <</N null>>>> BDC");

        assert!(matches!(&toks[0], Token::Obj(Object::Array(a)) if a.len() == 3));
        assert!(matches!(&toks[1], Token::Obj(Object::Dict(d)) if d.len() == 2));
        assert!(matches!(&toks[2], Token::Operator(op) if op == "BDC"));
    }

    #[test]
    fn inline_image_scan() {
        let data = b"BI /W 2 /H 2 ID \x00\x01EI\x02 EI Q";
        let mut lexer = Lexer::new(data, Arc::new(Store::new()));

        // Consume up to and including the ID operator.
        loop {
            match lexer.next_obj() {
                Token::Operator(op) if op == "ID" => break,
                Token::Eof => panic!("ID not found"),
                _ => {}
            }
        }

        // The embedded "EI" without a whitespace boundary is data, not the
        // terminator.
        let bytes = lexer.inline_image_bytes().unwrap();
        assert_eq!(bytes, b"\x00\x01EI\x02 ");

        assert!(matches!(lexer.next_obj(), Token::Operator(op) if op == "Q"));
    }
}
