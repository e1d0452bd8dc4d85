//! Transcoding of Type1 charstrings into CFF Type2 charstrings.
//!
//! Most path operators share their numbering between the two formats, so
//! transcoding is mostly a matter of resolving the Type1-only constructs:
//! `hsbw`/`sbw` become the Type2 width prefix with the side bearing folded
//! into the first moveto, subroutine calls are inlined, flex sequences built
//! from `callothersubr` become the Type2 `flex` operator, and `seac`
//! accents are extracted for the caller to resolve.

use crate::FontError;
use log::warn;

const MAX_SUBR_DEPTH: usize = 10;
const MAX_OPS: usize = 20_000;

/// An accent composition extracted from a `seac` operator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Seac {
    pub asb: f64,
    pub adx: f64,
    pub ady: f64,
    /// Standard-encoding code of the base character.
    pub base: u8,
    /// Standard-encoding code of the accent character.
    pub accent: u8,
}

/// The result of transcoding one glyph.
#[derive(Debug)]
pub struct TranscodedGlyph {
    /// The Type2 charstring, width prefix included.
    pub charstring: Vec<u8>,
    pub width: f64,
    pub lsb: f64,
    pub seac: Option<Seac>,
}

/// Compute the subroutine index bias CFF mandates for a given count.
pub fn subr_bias(count: usize) -> i32 {
    if count < 1240 {
        107
    } else if count < 33_900 {
        1131
    } else {
        32_768
    }
}

/// Transcode a decrypted Type1 charstring, inlining `subrs`.
pub fn transcode(charstring: &[u8], subrs: &[Vec<u8>]) -> Result<TranscodedGlyph, FontError> {
    let mut t = Transcoder {
        subrs,
        stack: Vec::new(),
        output: Vec::new(),
        width: 0.0,
        lsb: 0.0,
        pending_lsb: None,
        width_emitted: false,
        seac: None,
        flexing: false,
        flex_points: Vec::new(),
        othersubr_results: Vec::new(),
        ops: 0,
        ended: false,
    };

    t.run(charstring, 0)?;

    if !t.ended {
        // Some charstrings fall off the end without endchar.
        t.emit(&[], Op::EndChar)?;
    }

    Ok(TranscodedGlyph {
        charstring: t.output,
        width: t.width,
        lsb: t.lsb,
        seac: t.seac,
    })
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Op {
    HStem,
    VStem,
    VMoveTo,
    RLineTo,
    HLineTo,
    VLineTo,
    RRCurveTo,
    EndChar,
    RMoveTo,
    HMoveTo,
    VHCurveTo,
    HVCurveTo,
    Flex,
}

impl Op {
    fn code(self) -> &'static [u8] {
        match self {
            Op::HStem => &[1],
            Op::VStem => &[3],
            Op::VMoveTo => &[4],
            Op::RLineTo => &[5],
            Op::HLineTo => &[6],
            Op::VLineTo => &[7],
            Op::RRCurveTo => &[8],
            Op::EndChar => &[14],
            Op::RMoveTo => &[21],
            Op::HMoveTo => &[22],
            Op::VHCurveTo => &[30],
            Op::HVCurveTo => &[31],
            Op::Flex => &[12, 35],
        }
    }
}

struct Transcoder<'a> {
    subrs: &'a [Vec<u8>],
    stack: Vec<f64>,
    output: Vec<u8>,
    width: f64,
    lsb: f64,
    pending_lsb: Option<f64>,
    width_emitted: bool,
    seac: Option<Seac>,
    flexing: bool,
    flex_points: Vec<f64>,
    othersubr_results: Vec<f64>,
    ops: usize,
    ended: bool,
}

impl Transcoder<'_> {
    fn run(&mut self, code: &[u8], depth: usize) -> Result<(), FontError> {
        if depth > MAX_SUBR_DEPTH {
            return Err(FontError::Malformed("subroutine recursion too deep"));
        }

        let mut pos = 0usize;

        while pos < code.len() && !self.ended {
            self.ops += 1;

            if self.ops > MAX_OPS {
                return Err(FontError::Malformed("charstring too long"));
            }

            let b = code[pos];
            pos += 1;

            match b {
                32..=246 => self.stack.push(b as f64 - 139.0),
                247..=250 => {
                    let b1 = *code.get(pos).ok_or(truncated())? as f64;
                    pos += 1;
                    self.stack.push((b as f64 - 247.0) * 256.0 + b1 + 108.0);
                }
                251..=254 => {
                    let b1 = *code.get(pos).ok_or(truncated())? as f64;
                    pos += 1;
                    self.stack.push(-(b as f64 - 251.0) * 256.0 - b1 - 108.0);
                }
                255 => {
                    let bytes = code.get(pos..pos + 4).ok_or(truncated())?;
                    pos += 4;
                    self.stack
                        .push(i32::from_be_bytes(bytes.try_into().unwrap()) as f64);
                }
                1 => self.flush(Op::HStem)?,
                3 => self.flush(Op::VStem)?,
                4 => self.moveto(Op::VMoveTo)?,
                5 => self.flush(Op::RLineTo)?,
                6 => self.flush(Op::HLineTo)?,
                7 => self.flush(Op::VLineTo)?,
                8 => self.flush(Op::RRCurveTo)?,
                9 => self.stack.clear(), // closepath
                10 => {
                    let index = self.stack.pop().ok_or(underflow())? as i64;
                    let subr = self
                        .subrs
                        .get(usize::try_from(index).map_err(|_| underflow())?)
                        .ok_or(FontError::Malformed("subroutine index out of range"))?
                        .clone();

                    self.run(&subr, depth + 1)?;
                }
                11 => return Ok(()),
                13 => {
                    // hsbw: sbx wx
                    let wx = self.stack.pop().ok_or(underflow())?;
                    let sbx = self.stack.pop().ok_or(underflow())?;
                    self.width = wx;
                    self.lsb = sbx;
                    self.pending_lsb = Some(sbx);
                    self.stack.clear();
                }
                14 => {
                    self.emit(&[], Op::EndChar)?;
                    self.ended = true;
                }
                21 => self.moveto(Op::RMoveTo)?,
                22 => self.moveto(Op::HMoveTo)?,
                30 => self.flush(Op::VHCurveTo)?,
                31 => self.flush(Op::HVCurveTo)?,
                12 => {
                    let b1 = *code.get(pos).ok_or(truncated())?;
                    pos += 1;

                    match b1 {
                        0 => self.stack.clear(), // dotsection
                        1 => self.flush(Op::VStem)?, // vstem3
                        2 => self.flush(Op::HStem)?, // hstem3
                        6 => {
                            // seac: asb adx ady bchar achar
                            if self.stack.len() < 5 {
                                return Err(underflow());
                            }

                            let accent = self.stack.pop().ok_or(underflow())?;
                            let base = self.stack.pop().ok_or(underflow())?;
                            let ady = self.stack.pop().ok_or(underflow())?;
                            let adx = self.stack.pop().ok_or(underflow())?;
                            let asb = self.stack.pop().ok_or(underflow())?;

                            self.seac = Some(Seac {
                                asb,
                                adx,
                                ady,
                                base: base as u8,
                                accent: accent as u8,
                            });
                            self.emit(&[], Op::EndChar)?;
                            self.ended = true;
                        }
                        7 => {
                            // sbw: sbx sby wx wy
                            if self.stack.len() < 4 {
                                return Err(underflow());
                            }

                            let _wy = self.stack.pop();
                            let wx = self.stack.pop().ok_or(underflow())?;
                            let _sby = self.stack.pop();
                            let sbx = self.stack.pop().ok_or(underflow())?;
                            self.width = wx;
                            self.lsb = sbx;
                            self.pending_lsb = Some(sbx);
                            self.stack.clear();
                        }
                        12 => {
                            // div
                            let num2 = self.stack.pop().ok_or(underflow())?;
                            let num1 = self.stack.pop().ok_or(underflow())?;

                            if num2 == 0.0 {
                                return Err(FontError::Malformed("division by zero"));
                            }

                            self.stack.push(num1 / num2);
                        }
                        16 => self.callothersubr()?,
                        17 => {
                            // pop: retrieve an othersubr result
                            let v = self.othersubr_results.pop().unwrap_or(0.0);
                            self.stack.push(v);
                        }
                        33 => self.stack.clear(), // setcurrentpoint
                        other => {
                            warn!("unknown two-byte charstring operator 12 {other}");
                            self.stack.clear();
                        }
                    }
                }
                other => {
                    warn!("unknown charstring operator {other}");
                    self.stack.clear();
                }
            }
        }

        Ok(())
    }

    fn callothersubr(&mut self) -> Result<(), FontError> {
        let index = self.stack.pop().ok_or(underflow())? as i64;
        let n = self.stack.pop().ok_or(underflow())? as i64;
        let n = usize::try_from(n).map_err(|_| underflow())?;

        if self.stack.len() < n {
            return Err(underflow());
        }

        match index {
            0 => {
                // End of a flex sequence. The stack holds the flex height
                // and the final point; the curve points were gathered from
                // the rmovetos executed while flexing.
                let _y = self.stack.pop().ok_or(underflow())?;
                let _x = self.stack.pop().ok_or(underflow())?;
                let fd = self.stack.pop().unwrap_or(50.0);

                self.flexing = false;
                self.emit_flex(fd)?;

                // The program pops the final coordinates back afterwards;
                // they are consumed by setcurrentpoint.
                self.othersubr_results.push(0.0);
                self.othersubr_results.push(0.0);
            }
            1 => {
                // Start of a flex sequence.
                self.flexing = true;
                self.flex_points.clear();
                self.stack.clear();
            }
            2 => {
                // Flex midpoint marker.
                self.stack.clear();
            }
            3 => {
                // Hint replacement; the following pop/callsubr pair expects
                // a subroutine number, conventionally 3.
                self.stack.truncate(self.stack.len() - n);
                self.othersubr_results.push(3.0);
            }
            other => {
                warn!("unknown othersubr {other}, dropping {n} arguments");

                for _ in 0..n {
                    if let Some(v) = self.stack.pop() {
                        self.othersubr_results.push(v);
                    }
                }
            }
        }

        Ok(())
    }

    /// While flexing, movetos accumulate curve points instead of emitting.
    fn moveto(&mut self, op: Op) -> Result<(), FontError> {
        if self.flexing {
            let (dx, dy) = match op {
                Op::RMoveTo => {
                    let dy = self.stack.pop().ok_or(underflow())?;
                    let dx = self.stack.pop().ok_or(underflow())?;
                    (dx, dy)
                }
                Op::HMoveTo => (self.stack.pop().ok_or(underflow())?, 0.0),
                Op::VMoveTo => (0.0, self.stack.pop().ok_or(underflow())?),
                _ => unreachable!(),
            };

            self.flex_points.push(dx);
            self.flex_points.push(dy);
            self.stack.clear();

            return Ok(());
        }

        // Fold the side bearing into the first moveto.
        if let Some(lsb) = self.pending_lsb.take()
            && lsb != 0.0
        {
            match op {
                Op::RMoveTo => {
                    let len = self.stack.len();

                    if len >= 2 {
                        self.stack[len - 2] += lsb;
                    }

                    return self.flush(Op::RMoveTo);
                }
                Op::HMoveTo => {
                    let len = self.stack.len();

                    if len >= 1 {
                        self.stack[len - 1] += lsb;
                    }

                    return self.flush(Op::HMoveTo);
                }
                Op::VMoveTo => {
                    let dy = self.stack.pop().ok_or(underflow())?;
                    self.stack.push(lsb);
                    self.stack.push(dy);

                    return self.flush(Op::RMoveTo);
                }
                _ => unreachable!(),
            }
        }

        self.flush(op)
    }

    /// Emit the first flex curve pair as a Type2 `flex`.
    ///
    /// Seven points were gathered; the first is the reference point, which
    /// folds into the first control point's delta.
    fn emit_flex(&mut self, fd: f64) -> Result<(), FontError> {
        if self.flex_points.len() != 14 {
            return Err(FontError::Malformed("flex with wrong point count"));
        }

        let p = std::mem::take(&mut self.flex_points);
        let mut args = [0.0f64; 13];
        args[0] = p[0] + p[2];
        args[1] = p[1] + p[3];
        args[2..12].copy_from_slice(&p[4..14]);
        args[12] = fd;

        self.stack.clear();
        self.stack.extend_from_slice(&args);
        self.flush(Op::Flex)
    }

    fn flush(&mut self, op: Op) -> Result<(), FontError> {
        let args = std::mem::take(&mut self.stack);
        self.emit(&args, op)
    }

    fn emit(&mut self, args: &[f64], op: Op) -> Result<(), FontError> {
        // Type2 encodes the advance width as an extra leading operand of
        // the first stem, moveto or endchar.
        if !self.width_emitted
            && matches!(
                op,
                Op::HStem | Op::VStem | Op::VMoveTo | Op::RMoveTo | Op::HMoveTo | Op::EndChar
            )
        {
            encode_number(&mut self.output, self.width)?;
            self.width_emitted = true;
        }

        for &v in args {
            encode_number(&mut self.output, v)?;
        }

        self.output.extend_from_slice(op.code());

        Ok(())
    }
}

fn truncated() -> FontError {
    FontError::Malformed("truncated charstring")
}

fn underflow() -> FontError {
    FontError::Malformed("charstring stack underflow")
}

/// Encode a Type2 charstring operand.
pub fn encode_number(out: &mut Vec<u8>, v: f64) -> Result<(), FontError> {
    if v.fract() == 0.0 && (-32768.0..=32767.0).contains(&v) {
        let i = v as i32;

        if (-107..=107).contains(&i) {
            out.push((i + 139) as u8);
        } else if (108..=1131).contains(&i) {
            let d = i - 108;
            out.push((d / 256 + 247) as u8);
            out.push((d % 256) as u8);
        } else if (-1131..=-108).contains(&i) {
            let d = -i - 108;
            out.push((d / 256 + 251) as u8);
            out.push((d % 256) as u8);
        } else {
            out.push(28);
            out.extend_from_slice(&(i as i16).to_be_bytes());
        }

        return Ok(());
    }

    if !v.is_finite() || v.abs() >= 32768.0 {
        return Err(FontError::Malformed("charstring operand out of range"));
    }

    // 16.16 fixed point.
    let fixed = (v * 65536.0).round() as i32;
    out.push(255);
    out.extend_from_slice(&fixed.to_be_bytes());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Decode a Type2 charstring back into (operands, operator) pairs.
    fn decode_type2(code: &[u8]) -> Vec<(Vec<f64>, Vec<u8>)> {
        let mut out = Vec::new();
        let mut stack = Vec::new();
        let mut pos = 0;

        while pos < code.len() {
            let b = code[pos];
            pos += 1;

            match b {
                32..=246 => stack.push(b as f64 - 139.0),
                247..=250 => {
                    let b1 = code[pos] as f64;
                    pos += 1;
                    stack.push((b as f64 - 247.0) * 256.0 + b1 + 108.0);
                }
                251..=254 => {
                    let b1 = code[pos] as f64;
                    pos += 1;
                    stack.push(-(b as f64 - 251.0) * 256.0 - b1 - 108.0);
                }
                28 => {
                    let v = i16::from_be_bytes([code[pos], code[pos + 1]]);
                    pos += 2;
                    stack.push(v as f64);
                }
                255 => {
                    let v = i32::from_be_bytes(code[pos..pos + 4].try_into().unwrap());
                    pos += 4;
                    stack.push(v as f64 / 65536.0);
                }
                12 => {
                    let b1 = code[pos];
                    pos += 1;
                    out.push((std::mem::take(&mut stack), vec![12, b1]));
                }
                op => out.push((std::mem::take(&mut stack), vec![op])),
            }
        }

        out
    }

    /// Encode Type1 operands+op into raw charstring bytes for fixtures.
    fn t1(parts: &[&[i32]]) -> Vec<u8> {
        let mut out = Vec::new();

        for part in parts {
            let (args, ops) = part.split_at(part.len() - 1);

            for &a in args {
                if (-107..=107).contains(&a) {
                    out.push((a + 139) as u8);
                } else {
                    out.push(255);
                    out.extend_from_slice(&a.to_be_bytes());
                }
            }

            let op = ops[0];

            if op >= 3072 {
                out.push(12);
                out.push((op - 3072) as u8);
            } else {
                out.push(op as u8);
            }
        }

        out
    }

    #[test]
    fn width_and_lsb() {
        // 40 600 hsbw, 0 50 rmoveto, 100 0 rlineto, endchar
        let code = t1(&[&[40, 600, 13], &[0, 50, 21], &[100, 0, 5], &[14]]);
        let glyph = transcode(&code, &[]).unwrap();

        assert_eq!(glyph.width, 600.0);
        assert_eq!(glyph.lsb, 40.0);

        let ops = decode_type2(&glyph.charstring);
        // Width prefixed, lsb folded into the first moveto.
        assert_eq!(ops[0], (vec![600.0, 40.0, 50.0], vec![21]));
        assert_eq!(ops[1], (vec![100.0, 0.0], vec![5]));
        assert_eq!(ops[2], (vec![], vec![14]));
    }

    #[test]
    fn hmoveto_with_lsb_stays_horizontal() {
        let code = t1(&[&[25, 500, 13], &[10, 22], &[14]]);
        let glyph = transcode(&code, &[]).unwrap();

        let ops = decode_type2(&glyph.charstring);
        assert_eq!(ops[0], (vec![500.0, 35.0], vec![22]));
    }

    #[test]
    fn vmoveto_with_lsb_becomes_rmoveto() {
        let code = t1(&[&[25, 500, 13], &[10, 4], &[14]]);
        let glyph = transcode(&code, &[]).unwrap();

        let ops = decode_type2(&glyph.charstring);
        assert_eq!(ops[0], (vec![500.0, 25.0, 10.0], vec![21]));
    }

    #[test]
    fn seac_is_extracted() {
        // 0 600 hsbw, 10 20 30 65 193 seac
        let code = t1(&[&[0, 600, 13], &[10, 20, 30, 65, 193, 3072 + 6]]);
        let glyph = transcode(&code, &[]).unwrap();

        let seac = glyph.seac.unwrap();
        assert_eq!(seac.asb, 10.0);
        assert_eq!(seac.adx, 20.0);
        assert_eq!(seac.ady, 30.0);
        assert_eq!(seac.base, 65);
        assert_eq!(seac.accent, 193);

        let ops = decode_type2(&glyph.charstring);
        assert_eq!(ops.last().unwrap().1, vec![14]);
    }

    #[test]
    fn subr_inlining() {
        let subr = t1(&[&[100, 0, 5], &[11]]);
        let code = t1(&[&[0, 400, 13], &[0, 0, 21], &[0, 10], &[14]]);
        let glyph = transcode(&code, &[subr]).unwrap();

        let ops = decode_type2(&glyph.charstring);
        assert_eq!(ops[1], (vec![100.0, 0.0], vec![5]));
    }

    #[test]
    fn div_arithmetic() {
        // 0 500 hsbw, 100 4 div 0 rmoveto -> 25 0 rmoveto
        let mut raw = t1(&[&[0, 500, 13], &[100, 4, 3072 + 12]]);
        raw.push(139); // 0
        raw.push(21); // rmoveto
        raw.push(14); // endchar

        let glyph = transcode(&raw, &[]).unwrap();
        let ops = decode_type2(&glyph.charstring);
        assert_eq!(ops[0], (vec![500.0, 25.0, 0.0], vec![21]));
    }

    #[test]
    fn flex_becomes_type2_flex() {
        let mut raw = t1(&[&[0, 500, 13], &[0, 0, 21]]);
        // 1 callothersubr starts the flex.
        raw.extend(t1(&[&[0, 1, 3072 + 16]]));
        // Seven rmovetos: reference point then six curve points.
        for (dx, dy) in [(5, 0), (10, 10), (20, 0), (30, -10), (40, 0), (50, 10), (60, 0)] {
            raw.extend(t1(&[&[dx, dy, 21]]));
            raw.extend(t1(&[&[0, 2, 3072 + 16]]));
        }
        // 50 x y, 3 args to othersubr 0, then two pops and setcurrentpoint.
        raw.extend(t1(&[&[50, 100, 0, 3, 0, 3072 + 16]]));
        raw.extend(t1(&[&[3072 + 17]]));
        raw.extend(t1(&[&[3072 + 17]]));
        raw.extend(t1(&[&[3072 + 33]]));
        raw.push(14);

        let glyph = transcode(&raw, &[]).unwrap();
        let ops = decode_type2(&glyph.charstring);

        let flex = ops.iter().find(|(_, op)| op == &vec![12, 35]).unwrap();
        assert_eq!(flex.0.len(), 13);
        // Reference point folded into the first control point.
        assert_eq!(flex.0[0], 15.0);
        assert_eq!(flex.0[1], 10.0);
        assert_eq!(flex.0[12], 50.0);
    }

    #[test]
    fn number_encoding_boundaries() {
        let mut out = Vec::new();
        encode_number(&mut out, 107.0).unwrap();
        encode_number(&mut out, 108.0).unwrap();
        encode_number(&mut out, -1131.0).unwrap();
        encode_number(&mut out, 2000.0).unwrap();
        encode_number(&mut out, 0.5).unwrap();

        let decoded = {
            let mut with_op = out.clone();
            with_op.push(14);
            decode_type2(&with_op)
        };

        assert_eq!(decoded[0].0, vec![107.0, 108.0, -1131.0, 2000.0, 0.5]);
    }

    #[test]
    fn bias_tiers() {
        assert_eq!(subr_bias(0), 107);
        assert_eq!(subr_bias(1239), 107);
        assert_eq!(subr_bias(1240), 1131);
        assert_eq!(subr_bias(33_899), 1131);
        assert_eq!(subr_bias(33_900), 32_768);
    }
}
