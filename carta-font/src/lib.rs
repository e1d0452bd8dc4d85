/*!
Repair and re-packaging of embedded PDF font programs.

Font programs found inside PDFs are frequently subsetted, truncated or
outright corrupt, and font rasterizers are far less forgiving than PDF
viewers need to be. This crate takes raw embedded font bytes and produces
sanitized, renderable font data:

- Type1 programs (bare or PFB-wrapped, eexec-encrypted) are parsed and their
  charstrings transcoded to CFF Type2, then compiled into a fresh CFF blob.
- Bare CFF programs are structurally parsed and re-serialized.
- TrueType/OpenType programs (including TrueType Collections) go through a
  structural sanitizer that validates every table it keeps and strips what
  it cannot prove safe.

The output of each path is meant to be wrapped into an OpenType container
(see [`opentype`]) together with a `cmap` synthesized from the
char-code-to-glyph mapping that the PDF dictionary side derives.
*/

use thiserror::Error;

pub mod cff;
pub mod charstring;
pub mod opentype;
pub mod truetype;
pub mod type1;

/// Errors produced while parsing or repairing a font program.
#[derive(Debug, Error)]
pub enum FontError {
    #[error("font program is truncated or malformed: {0}")]
    Malformed(&'static str),
    #[error("font program has an unrecognized format")]
    UnknownFormat,
    #[error("required table `{0}` is missing")]
    MissingTable(&'static str),
}

/// The sniffed format of an embedded font program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontKind {
    Type1,
    Type1Pfb,
    Cff,
    TrueType,
    OpenTypeCff,
    TrueTypeCollection,
}

/// Sniff the format of a font program from its leading bytes.
///
/// PDF producers routinely mislabel `FontFile` subtypes, so consumers should
/// trust this over the dictionary.
pub fn sniff(data: &[u8]) -> Option<FontKind> {
    let head = data.get(0..4)?;

    match head {
        [0x00, 0x01, 0x00, 0x00] | b"true" => Some(FontKind::TrueType),
        b"OTTO" => Some(FontKind::OpenTypeCff),
        b"ttcf" => Some(FontKind::TrueTypeCollection),
        [0x80, 0x01, ..] => Some(FontKind::Type1Pfb),
        [b'%', b'!', ..] => Some(FontKind::Type1),
        [1, 0, ..] => Some(FontKind::Cff),
        _ => {
            // A Type1 program may start directly with the font dictionary.
            if data.starts_with(b"%PDF") {
                None
            } else if data.windows(5).take(64).any(|w| w == b"%!PS-") {
                Some(FontKind::Type1)
            } else {
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sniffing() {
        assert_eq!(sniff(b"OTTO\x00\x01"), Some(FontKind::OpenTypeCff));
        assert_eq!(
            sniff(&[0x00, 0x01, 0x00, 0x00, 0x00]),
            Some(FontKind::TrueType)
        );
        assert_eq!(sniff(b"ttcf\x00\x01"), Some(FontKind::TrueTypeCollection));
        assert_eq!(sniff(b"%!FontType1-1.0"), Some(FontKind::Type1));
        assert_eq!(sniff(&[0x80, 0x01, 0x20, 0x00]), Some(FontKind::Type1Pfb));
        assert_eq!(sniff(&[1, 0, 4, 4]), Some(FontKind::Cff));
        assert_eq!(sniff(b"\xff\xff\xff\xff"), None);
    }
}
