//! Base encoding tables and glyph-name heuristics.
//!
//! The five named base encodings map char codes to glyph names; glyph names
//! map onwards to Unicode for text extraction and to glyph ids through the
//! font program's charset. Synthetic subset names (`C48`, `G12`, `g0042`,
//! `uni0041`) are recovered numerically when no table matches.

use phf::phf_map;

/// A named base encoding from a font dictionary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BaseEncoding {
    Standard,
    WinAnsi,
    MacRoman,
    Symbol,
    ZapfDingbats,
}

impl BaseEncoding {
    pub(crate) fn from_name(name: &str) -> Option<Self> {
        match name {
            "StandardEncoding" => Some(Self::Standard),
            "WinAnsiEncoding" => Some(Self::WinAnsi),
            "MacRomanEncoding" => Some(Self::MacRoman),
            "Symbol" | "SymbolSetEncoding" => Some(Self::Symbol),
            "ZapfDingbats" | "ZapfDingbatsEncoding" => Some(Self::ZapfDingbats),
            _ => None,
        }
    }

    /// The glyph name for a char code, or `None` for an unencoded slot.
    pub(crate) fn get(&self, code: u8) -> Option<&'static str> {
        match self {
            Self::Standard => match code {
                39 => Some("quoteright"),
                96 => Some("quoteleft"),
                32..=126 => latin(code),
                _ => STANDARD_HIGH.get(&code).copied(),
            },
            Self::WinAnsi => match code {
                32..=126 => latin(code),
                160 => Some("space"),
                _ => WIN_ANSI_HIGH.get(&code).copied(),
            },
            Self::MacRoman => match code {
                32..=126 => latin(code),
                _ => MAC_ROMAN_HIGH.get(&code).copied(),
            },
            Self::Symbol => SYMBOL.get(&code).copied(),
            Self::ZapfDingbats => match code {
                32 => Some("space"),
                33..=126 => Some(DINGBAT_NAMES[code as usize - 33]),
                _ => None,
            },
        }
    }
}

/// Names for the shared Latin range 32..=126. Codes 39 and 96 hold the
/// WinAnsi/MacRoman variants; Standard overrides them.
#[rustfmt::skip]
const LATIN: [&str; 95] = [
    "space", "exclam", "quotedbl", "numbersign", "dollar", "percent",
    "ampersand", "quotesingle", "parenleft", "parenright", "asterisk",
    "plus", "comma", "hyphen", "period", "slash",
    "zero", "one", "two", "three", "four", "five", "six", "seven", "eight",
    "nine", "colon", "semicolon", "less", "equal", "greater", "question",
    "at",
    "A", "B", "C", "D", "E", "F", "G", "H", "I", "J", "K", "L", "M",
    "N", "O", "P", "Q", "R", "S", "T", "U", "V", "W", "X", "Y", "Z",
    "bracketleft", "backslash", "bracketright", "asciicircum", "underscore",
    "grave",
    "a", "b", "c", "d", "e", "f", "g", "h", "i", "j", "k", "l", "m",
    "n", "o", "p", "q", "r", "s", "t", "u", "v", "w", "x", "y", "z",
    "braceleft", "bar", "braceright", "asciitilde",
];

fn latin(code: u8) -> Option<&'static str> {
    LATIN.get(code as usize - 32).copied()
}

static STANDARD_HIGH: phf::Map<u8, &'static str> = phf_map! {
    161u8 => "exclamdown", 162u8 => "cent", 163u8 => "sterling",
    164u8 => "fraction", 165u8 => "yen", 166u8 => "florin",
    167u8 => "section", 168u8 => "currency", 169u8 => "quotesingle",
    170u8 => "quotedblleft", 171u8 => "guillemotleft",
    172u8 => "guilsinglleft", 173u8 => "guilsinglright", 174u8 => "fi",
    175u8 => "fl", 177u8 => "endash", 178u8 => "dagger",
    179u8 => "daggerdbl", 180u8 => "periodcentered", 182u8 => "paragraph",
    183u8 => "bullet", 184u8 => "quotesinglbase", 185u8 => "quotedblbase",
    186u8 => "quotedblright", 187u8 => "guillemotright", 188u8 => "ellipsis",
    189u8 => "perthousand", 191u8 => "questiondown", 193u8 => "grave",
    194u8 => "acute", 195u8 => "circumflex", 196u8 => "tilde",
    197u8 => "macron", 198u8 => "breve", 199u8 => "dotaccent",
    200u8 => "dieresis", 202u8 => "ring", 203u8 => "cedilla",
    205u8 => "hungarumlaut", 206u8 => "ogonek", 207u8 => "caron",
    208u8 => "emdash", 225u8 => "AE", 227u8 => "ordfeminine",
    232u8 => "Lslash", 233u8 => "Oslash", 234u8 => "OE",
    235u8 => "ordmasculine", 241u8 => "ae", 245u8 => "dotlessi",
    248u8 => "lslash", 249u8 => "oslash", 250u8 => "oe",
    251u8 => "germandbls",
};

static WIN_ANSI_HIGH: phf::Map<u8, &'static str> = phf_map! {
    128u8 => "Euro", 130u8 => "quotesinglbase", 131u8 => "florin",
    132u8 => "quotedblbase", 133u8 => "ellipsis", 134u8 => "dagger",
    135u8 => "daggerdbl", 136u8 => "circumflex", 137u8 => "perthousand",
    138u8 => "Scaron", 139u8 => "guilsinglleft", 140u8 => "OE",
    142u8 => "Zcaron", 145u8 => "quoteleft", 146u8 => "quoteright",
    147u8 => "quotedblleft", 148u8 => "quotedblright", 149u8 => "bullet",
    150u8 => "endash", 151u8 => "emdash", 152u8 => "tilde",
    153u8 => "trademark", 154u8 => "scaron", 155u8 => "guilsinglright",
    156u8 => "oe", 158u8 => "zcaron", 159u8 => "Ydieresis",
    161u8 => "exclamdown", 162u8 => "cent", 163u8 => "sterling",
    164u8 => "currency", 165u8 => "yen", 166u8 => "brokenbar",
    167u8 => "section", 168u8 => "dieresis", 169u8 => "copyright",
    170u8 => "ordfeminine", 171u8 => "guillemotleft", 172u8 => "logicalnot",
    173u8 => "hyphen", 174u8 => "registered", 175u8 => "macron",
    176u8 => "degree", 177u8 => "plusminus", 178u8 => "twosuperior",
    179u8 => "threesuperior", 180u8 => "acute", 181u8 => "mu",
    182u8 => "paragraph", 183u8 => "periodcentered", 184u8 => "cedilla",
    185u8 => "onesuperior", 186u8 => "ordmasculine",
    187u8 => "guillemotright", 188u8 => "onequarter", 189u8 => "onehalf",
    190u8 => "threequarters", 191u8 => "questiondown", 192u8 => "Agrave",
    193u8 => "Aacute", 194u8 => "Acircumflex", 195u8 => "Atilde",
    196u8 => "Adieresis", 197u8 => "Aring", 198u8 => "AE",
    199u8 => "Ccedilla", 200u8 => "Egrave", 201u8 => "Eacute",
    202u8 => "Ecircumflex", 203u8 => "Edieresis", 204u8 => "Igrave",
    205u8 => "Iacute", 206u8 => "Icircumflex", 207u8 => "Idieresis",
    208u8 => "Eth", 209u8 => "Ntilde", 210u8 => "Ograve",
    211u8 => "Oacute", 212u8 => "Ocircumflex", 213u8 => "Otilde",
    214u8 => "Odieresis", 215u8 => "multiply", 216u8 => "Oslash",
    217u8 => "Ugrave", 218u8 => "Uacute", 219u8 => "Ucircumflex",
    220u8 => "Udieresis", 221u8 => "Yacute", 222u8 => "Thorn",
    223u8 => "germandbls", 224u8 => "agrave", 225u8 => "aacute",
    226u8 => "acircumflex", 227u8 => "atilde", 228u8 => "adieresis",
    229u8 => "aring", 230u8 => "ae", 231u8 => "ccedilla",
    232u8 => "egrave", 233u8 => "eacute", 234u8 => "ecircumflex",
    235u8 => "edieresis", 236u8 => "igrave", 237u8 => "iacute",
    238u8 => "icircumflex", 239u8 => "idieresis", 240u8 => "eth",
    241u8 => "ntilde", 242u8 => "ograve", 243u8 => "oacute",
    244u8 => "ocircumflex", 245u8 => "otilde", 246u8 => "odieresis",
    247u8 => "divide", 248u8 => "oslash", 249u8 => "ugrave",
    250u8 => "uacute", 251u8 => "ucircumflex", 252u8 => "udieresis",
    253u8 => "yacute", 254u8 => "thorn", 255u8 => "ydieresis",
};

static MAC_ROMAN_HIGH: phf::Map<u8, &'static str> = phf_map! {
    128u8 => "Adieresis", 129u8 => "Aring", 130u8 => "Ccedilla",
    131u8 => "Eacute", 132u8 => "Ntilde", 133u8 => "Odieresis",
    134u8 => "Udieresis", 135u8 => "aacute", 136u8 => "agrave",
    137u8 => "acircumflex", 138u8 => "adieresis", 139u8 => "atilde",
    140u8 => "aring", 141u8 => "ccedilla", 142u8 => "eacute",
    143u8 => "egrave", 144u8 => "ecircumflex", 145u8 => "edieresis",
    146u8 => "iacute", 147u8 => "igrave", 148u8 => "icircumflex",
    149u8 => "idieresis", 150u8 => "ntilde", 151u8 => "oacute",
    152u8 => "ograve", 153u8 => "ocircumflex", 154u8 => "odieresis",
    155u8 => "otilde", 156u8 => "uacute", 157u8 => "ugrave",
    158u8 => "ucircumflex", 159u8 => "udieresis", 160u8 => "dagger",
    161u8 => "degree", 162u8 => "cent", 163u8 => "sterling",
    164u8 => "section", 165u8 => "bullet", 166u8 => "paragraph",
    167u8 => "germandbls", 168u8 => "registered", 169u8 => "copyright",
    170u8 => "trademark", 171u8 => "acute", 172u8 => "dieresis",
    173u8 => "notequal", 174u8 => "AE", 175u8 => "Oslash",
    176u8 => "infinity", 177u8 => "plusminus", 178u8 => "lessequal",
    179u8 => "greaterequal", 180u8 => "yen", 181u8 => "mu",
    182u8 => "partialdiff", 183u8 => "summation", 184u8 => "product",
    185u8 => "pi", 186u8 => "integral", 187u8 => "ordfeminine",
    188u8 => "ordmasculine", 189u8 => "Omega", 190u8 => "ae",
    191u8 => "oslash", 192u8 => "questiondown", 193u8 => "exclamdown",
    194u8 => "logicalnot", 195u8 => "radical", 196u8 => "florin",
    197u8 => "approxequal", 198u8 => "Delta", 199u8 => "guillemotleft",
    200u8 => "guillemotright", 201u8 => "ellipsis", 202u8 => "space",
    203u8 => "Agrave", 204u8 => "Atilde", 205u8 => "Otilde",
    206u8 => "OE", 207u8 => "oe", 208u8 => "endash", 209u8 => "emdash",
    210u8 => "quotedblleft", 211u8 => "quotedblright", 212u8 => "quoteleft",
    213u8 => "quoteright", 214u8 => "divide", 215u8 => "lozenge",
    216u8 => "ydieresis", 217u8 => "Ydieresis", 218u8 => "fraction",
    219u8 => "currency", 220u8 => "guilsinglleft", 221u8 => "guilsinglright",
    222u8 => "fi", 223u8 => "fl", 224u8 => "daggerdbl",
    225u8 => "periodcentered", 226u8 => "quotesinglbase",
    227u8 => "quotedblbase", 228u8 => "perthousand", 229u8 => "Acircumflex",
    230u8 => "Ecircumflex", 231u8 => "Aacute", 232u8 => "Edieresis",
    233u8 => "Egrave", 234u8 => "Iacute", 235u8 => "Icircumflex",
    236u8 => "Idieresis", 237u8 => "Igrave", 238u8 => "Oacute",
    239u8 => "Ocircumflex", 240u8 => "apple", 241u8 => "Ograve",
    242u8 => "Uacute", 243u8 => "Ucircumflex", 244u8 => "Ugrave",
    245u8 => "dotlessi", 246u8 => "circumflex", 247u8 => "tilde",
    248u8 => "macron", 249u8 => "breve", 250u8 => "dotaccent",
    251u8 => "ring", 252u8 => "cedilla", 253u8 => "hungarumlaut",
    254u8 => "ogonek", 255u8 => "caron",
};

static SYMBOL: phf::Map<u8, &'static str> = phf_map! {
    32u8 => "space", 33u8 => "exclam", 34u8 => "universal",
    35u8 => "numbersign", 36u8 => "existential", 37u8 => "percent",
    38u8 => "ampersand", 39u8 => "suchthat", 40u8 => "parenleft",
    41u8 => "parenright", 42u8 => "asteriskmath", 43u8 => "plus",
    44u8 => "comma", 45u8 => "minus", 46u8 => "period", 47u8 => "slash",
    48u8 => "zero", 49u8 => "one", 50u8 => "two", 51u8 => "three",
    52u8 => "four", 53u8 => "five", 54u8 => "six", 55u8 => "seven",
    56u8 => "eight", 57u8 => "nine", 58u8 => "colon", 59u8 => "semicolon",
    60u8 => "less", 61u8 => "equal", 62u8 => "greater", 63u8 => "question",
    64u8 => "congruent",
    65u8 => "Alpha", 66u8 => "Beta", 67u8 => "Chi", 68u8 => "Delta",
    69u8 => "Epsilon", 70u8 => "Phi", 71u8 => "Gamma", 72u8 => "Eta",
    73u8 => "Iota", 74u8 => "theta1", 75u8 => "Kappa", 76u8 => "Lambda",
    77u8 => "Mu", 78u8 => "Nu", 79u8 => "Omicron", 80u8 => "Pi",
    81u8 => "Theta", 82u8 => "Rho", 83u8 => "Sigma", 84u8 => "Tau",
    85u8 => "Upsilon", 86u8 => "sigma1", 87u8 => "Omega", 88u8 => "Xi",
    89u8 => "Psi", 90u8 => "Zeta", 91u8 => "bracketleft",
    92u8 => "therefore", 93u8 => "bracketright", 94u8 => "perpendicular",
    95u8 => "underscore", 96u8 => "radicalex",
    97u8 => "alpha", 98u8 => "beta", 99u8 => "chi", 100u8 => "delta",
    101u8 => "epsilon", 102u8 => "phi", 103u8 => "gamma", 104u8 => "eta",
    105u8 => "iota", 106u8 => "phi1", 107u8 => "kappa", 108u8 => "lambda",
    109u8 => "mu", 110u8 => "nu", 111u8 => "omicron", 112u8 => "pi",
    113u8 => "theta", 114u8 => "rho", 115u8 => "sigma", 116u8 => "tau",
    117u8 => "upsilon", 118u8 => "omega1", 119u8 => "omega", 120u8 => "xi",
    121u8 => "psi", 122u8 => "zeta", 123u8 => "braceleft", 124u8 => "bar",
    125u8 => "braceright", 126u8 => "similar",
    165u8 => "infinity", 166u8 => "florin", 171u8 => "arrowboth",
    172u8 => "arrowleft", 173u8 => "arrowup", 174u8 => "arrowright",
    175u8 => "arrowdown", 176u8 => "degree", 177u8 => "plusminus",
    179u8 => "greaterequal", 180u8 => "multiply", 182u8 => "partialdiff",
    183u8 => "bullet", 184u8 => "divide", 185u8 => "notequal",
    186u8 => "equivalence", 187u8 => "approxequal", 188u8 => "ellipsis",
    163u8 => "lessequal", 214u8 => "radical", 206u8 => "element",
    207u8 => "notelement", 217u8 => "logicaland", 218u8 => "logicalor",
    229u8 => "summation", 242u8 => "integral",
};

/// ZapfDingbats glyph names for codes 33..=126 (`a1` onwards).
#[rustfmt::skip]
const DINGBAT_NAMES: [&str; 95] = [
    "a1", "a2", "a3", "a4", "a5", "a6", "a7", "a8", "a9", "a10", "a11",
    "a12", "a13", "a14", "a15", "a16", "a17", "a18", "a19", "a20", "a21",
    "a22", "a23", "a24", "a25", "a26", "a27", "a28", "a29", "a30", "a31",
    "a32", "a33", "a34", "a35", "a36", "a37", "a38", "a39", "a40", "a41",
    "a42", "a43", "a44", "a45", "a46", "a47", "a48", "a49", "a50", "a51",
    "a52", "a53", "a54", "a55", "a56", "a57", "a58", "a59", "a60", "a61",
    "a62", "a63", "a64", "a65", "a66", "a67", "a68", "a69", "a70", "a71",
    "a72", "a73", "a74", "a75", "a76", "a77", "a78", "a79", "a81", "a82",
    "a83", "a84", "a97", "a98", "a99", "a100", "a89", "a90", "a93", "a94",
    "a91", "a92", "a205", "a85",
];

/// Non-Latin glyph names with well-known Unicode values.
static GLYPH_UNICODE: phf::Map<&'static str, char> = phf_map! {
    "quoteright" => '\u{2019}', "quoteleft" => '\u{2018}',
    "quotedblleft" => '\u{201C}', "quotedblright" => '\u{201D}',
    "quotesinglbase" => '\u{201A}', "quotedblbase" => '\u{201E}',
    "guillemotleft" => '\u{AB}', "guillemotright" => '\u{BB}',
    "guilsinglleft" => '\u{2039}', "guilsinglright" => '\u{203A}',
    "endash" => '\u{2013}', "emdash" => '\u{2014}', "bullet" => '\u{2022}',
    "dagger" => '\u{2020}', "daggerdbl" => '\u{2021}',
    "ellipsis" => '\u{2026}', "perthousand" => '\u{2030}',
    "florin" => '\u{192}', "fraction" => '\u{2044}',
    "exclamdown" => '\u{A1}', "questiondown" => '\u{BF}',
    "cent" => '\u{A2}', "sterling" => '\u{A3}', "currency" => '\u{A4}',
    "yen" => '\u{A5}', "brokenbar" => '\u{A6}', "section" => '\u{A7}',
    "dieresis" => '\u{A8}', "copyright" => '\u{A9}',
    "ordfeminine" => '\u{AA}', "logicalnot" => '\u{AC}',
    "registered" => '\u{AE}', "macron" => '\u{AF}', "degree" => '\u{B0}',
    "plusminus" => '\u{B1}', "twosuperior" => '\u{B2}',
    "threesuperior" => '\u{B3}', "acute" => '\u{B4}', "mu" => '\u{B5}',
    "paragraph" => '\u{B6}', "periodcentered" => '\u{B7}',
    "cedilla" => '\u{B8}', "onesuperior" => '\u{B9}',
    "ordmasculine" => '\u{BA}', "onequarter" => '\u{BC}',
    "onehalf" => '\u{BD}', "threequarters" => '\u{BE}',
    "circumflex" => '\u{2C6}', "tilde" => '\u{2DC}', "breve" => '\u{2D8}',
    "dotaccent" => '\u{2D9}', "ring" => '\u{2DA}',
    "hungarumlaut" => '\u{2DD}', "ogonek" => '\u{2DB}',
    "caron" => '\u{2C7}', "fi" => '\u{FB01}', "fl" => '\u{FB02}',
    "AE" => '\u{C6}', "ae" => '\u{E6}', "OE" => '\u{152}',
    "oe" => '\u{153}', "Oslash" => '\u{D8}', "oslash" => '\u{F8}',
    "Lslash" => '\u{141}', "lslash" => '\u{142}',
    "germandbls" => '\u{DF}', "dotlessi" => '\u{131}',
    "Euro" => '\u{20AC}', "trademark" => '\u{2122}',
    "Scaron" => '\u{160}', "scaron" => '\u{161}', "Zcaron" => '\u{17D}',
    "zcaron" => '\u{17E}', "Ydieresis" => '\u{178}',
    "ydieresis" => '\u{FF}', "multiply" => '\u{D7}', "divide" => '\u{F7}',
    "Agrave" => '\u{C0}', "Aacute" => '\u{C1}', "Acircumflex" => '\u{C2}',
    "Atilde" => '\u{C3}', "Adieresis" => '\u{C4}', "Aring" => '\u{C5}',
    "Ccedilla" => '\u{C7}', "Egrave" => '\u{C8}', "Eacute" => '\u{C9}',
    "Ecircumflex" => '\u{CA}', "Edieresis" => '\u{CB}',
    "Igrave" => '\u{CC}', "Iacute" => '\u{CD}', "Icircumflex" => '\u{CE}',
    "Idieresis" => '\u{CF}', "Eth" => '\u{D0}', "Ntilde" => '\u{D1}',
    "Ograve" => '\u{D2}', "Oacute" => '\u{D3}', "Ocircumflex" => '\u{D4}',
    "Otilde" => '\u{D5}', "Odieresis" => '\u{D6}', "Ugrave" => '\u{D9}',
    "Uacute" => '\u{DA}', "Ucircumflex" => '\u{DB}',
    "Udieresis" => '\u{DC}', "Yacute" => '\u{DD}', "Thorn" => '\u{DE}',
    "agrave" => '\u{E0}', "aacute" => '\u{E1}', "acircumflex" => '\u{E2}',
    "atilde" => '\u{E3}', "adieresis" => '\u{E4}', "aring" => '\u{E5}',
    "ccedilla" => '\u{E7}', "egrave" => '\u{E8}', "eacute" => '\u{E9}',
    "ecircumflex" => '\u{EA}', "edieresis" => '\u{EB}',
    "igrave" => '\u{EC}', "iacute" => '\u{ED}', "icircumflex" => '\u{EE}',
    "idieresis" => '\u{EF}', "eth" => '\u{F0}', "ntilde" => '\u{F1}',
    "ograve" => '\u{F2}', "oacute" => '\u{F3}', "ocircumflex" => '\u{F4}',
    "otilde" => '\u{F5}', "odieresis" => '\u{F6}', "ugrave" => '\u{F9}',
    "uacute" => '\u{FA}', "ucircumflex" => '\u{FB}',
    "udieresis" => '\u{FC}', "yacute" => '\u{FD}', "thorn" => '\u{FE}',
    "hyphen" => '\u{2D}', "grave" => '\u{60}',
    "notequal" => '\u{2260}', "infinity" => '\u{221E}',
    "lessequal" => '\u{2264}', "greaterequal" => '\u{2265}',
    "partialdiff" => '\u{2202}', "summation" => '\u{2211}',
    "product" => '\u{220F}', "integral" => '\u{222B}',
    "radical" => '\u{221A}', "approxequal" => '\u{2248}',
    "lozenge" => '\u{25CA}', "apple" => '\u{F8FF}',
    "Alpha" => '\u{391}', "Beta" => '\u{392}', "Gamma" => '\u{393}',
    "Delta" => '\u{394}', "Epsilon" => '\u{395}', "Zeta" => '\u{396}',
    "Eta" => '\u{397}', "Theta" => '\u{398}', "Iota" => '\u{399}',
    "Kappa" => '\u{39A}', "Lambda" => '\u{39B}', "Mu" => '\u{39C}',
    "Nu" => '\u{39D}', "Xi" => '\u{39E}', "Omicron" => '\u{39F}',
    "Pi" => '\u{3A0}', "Rho" => '\u{3A1}', "Sigma" => '\u{3A3}',
    "Tau" => '\u{3A4}', "Upsilon" => '\u{3A5}', "Phi" => '\u{3A6}',
    "Chi" => '\u{3A7}', "Psi" => '\u{3A8}', "Omega" => '\u{3A9}',
    "alpha" => '\u{3B1}', "beta" => '\u{3B2}', "gamma" => '\u{3B3}',
    "delta" => '\u{3B4}', "epsilon" => '\u{3B5}', "zeta" => '\u{3B6}',
    "eta" => '\u{3B7}', "theta" => '\u{3B8}', "iota" => '\u{3B9}',
    "kappa" => '\u{3BA}', "lambda" => '\u{3BB}', "nu" => '\u{3BD}',
    "omicron" => '\u{3BF}', "pi" => '\u{3C0}', "rho" => '\u{3C1}',
    "sigma" => '\u{3C3}', "sigma1" => '\u{3C2}', "tau" => '\u{3C4}',
    "upsilon" => '\u{3C5}', "phi" => '\u{3C6}', "phi1" => '\u{3D5}',
    "chi" => '\u{3C7}', "psi" => '\u{3C8}', "omega" => '\u{3C9}',
    "omega1" => '\u{3D6}', "theta1" => '\u{3D1}',
    "minus" => '\u{2212}', "asteriskmath" => '\u{2217}',
    "element" => '\u{2208}', "notelement" => '\u{2209}',
    "logicaland" => '\u{2227}', "logicalor" => '\u{2228}',
    "equivalence" => '\u{2261}', "similar" => '\u{223C}',
    "congruent" => '\u{2245}', "universal" => '\u{2200}',
    "existential" => '\u{2203}', "suchthat" => '\u{220B}',
    "therefore" => '\u{2234}', "perpendicular" => '\u{22A5}',
    "arrowleft" => '\u{2190}', "arrowup" => '\u{2191}',
    "arrowright" => '\u{2192}', "arrowdown" => '\u{2193}',
    "arrowboth" => '\u{2194}', "radicalex" => '\u{203E}',
};

/// The Unicode value a glyph name stands for.
pub(crate) fn glyph_to_unicode(name: &str) -> Option<char> {
    if let Some(c) = GLYPH_UNICODE.get(name) {
        return Some(*c);
    }

    // Latin-range names map back to their ASCII character.
    if let Some(i) = LATIN.iter().position(|n| *n == name) {
        return char::from_u32(32 + i as u32);
    }

    // uniXXXX / uXXXX / uXXXXXX synthetic names.
    if let Some(hex) = name.strip_prefix("uni") {
        if hex.len() == 4 {
            return u32::from_str_radix(hex, 16).ok().and_then(char::from_u32);
        }
    }

    if let Some(hex) = name.strip_prefix('u') {
        if (4..=6).contains(&hex.len()) {
            return u32::from_str_radix(hex, 16).ok().and_then(char::from_u32);
        }
    }

    // Dingbat names in the sequential part of the 0x2700 block.
    if let Some(n) = name.strip_prefix('a') {
        if let Ok(n) = n.parse::<u32>() {
            if (1..=100).contains(&n) {
                return char::from_u32(0x2700 + n);
            }
        }
    }

    let mut chars = name.chars();

    match (chars.next(), chars.next()) {
        (Some(c), None) => Some(c),
        _ => None,
    }
}

/// Recover a numeric glyph index from a subset-style synthetic name
/// (`C48`, `c123`, `G12`, `g0042`, `cid0007`).
///
/// For `Cxx`/`Gxx` names the digits are parsed as decimal first; hex is
/// attempted only when decimal parsing fails outright.
pub(crate) fn glyph_index_from_name(name: &str) -> Option<u32> {
    let digits = name
        .strip_prefix("cid")
        .or_else(|| name.strip_prefix(['C', 'c', 'G', 'g']))?;

    if digits.is_empty() || digits.len() > 5 {
        return None;
    }

    if let Ok(v) = digits.parse::<u32>() {
        return Some(v);
    }

    u32::from_str_radix(digits, 16).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_encoding_slots() {
        let std = BaseEncoding::Standard;
        assert_eq!(std.get(65), Some("A"));
        assert_eq!(std.get(39), Some("quoteright"));
        assert_eq!(std.get(96), Some("quoteleft"));
        assert_eq!(std.get(0o341), Some("AE"));
        assert_eq!(std.get(0), None);

        let win = BaseEncoding::WinAnsi;
        assert_eq!(win.get(39), Some("quotesingle"));
        assert_eq!(win.get(0x80), Some("Euro"));
        assert_eq!(win.get(0xE9), Some("eacute"));

        let mac = BaseEncoding::MacRoman;
        assert_eq!(mac.get(0x8E), Some("eacute"));
        assert_eq!(mac.get(0xF0), Some("apple"));
    }

    #[test]
    fn encoding_names_resolve() {
        assert_eq!(
            BaseEncoding::from_name("WinAnsiEncoding"),
            Some(BaseEncoding::WinAnsi)
        );
        assert_eq!(BaseEncoding::from_name("Bogus"), None);
    }

    #[test]
    fn glyph_unicode_lookup() {
        assert_eq!(glyph_to_unicode("A"), Some('A'));
        assert_eq!(glyph_to_unicode("eacute"), Some('\u{E9}'));
        assert_eq!(glyph_to_unicode("uni0041"), Some('A'));
        assert_eq!(glyph_to_unicode("u1F600"), Some('\u{1F600}'));
        assert_eq!(glyph_to_unicode("alpha"), Some('\u{3B1}'));
        assert_eq!(glyph_to_unicode("nonsenseglyph"), None);
    }

    #[test]
    fn synthetic_name_recovery_prefers_decimal() {
        // All-decimal digits parse as decimal even when they would also be
        // valid hex.
        assert_eq!(glyph_index_from_name("C30"), Some(30));
        assert_eq!(glyph_index_from_name("C4A"), Some(0x4A));
        assert_eq!(glyph_index_from_name("g0042"), Some(42));
        assert_eq!(glyph_index_from_name("cid0007"), Some(7));
        assert_eq!(glyph_index_from_name("Gxyz"), None);
        assert_eq!(glyph_index_from_name("notasubset"), None);
    }
}
