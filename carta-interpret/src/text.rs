//! The text content extractor: a sibling interpreter that walks the same
//! content streams as the evaluator but accumulates positioned text runs
//! instead of paint instructions.
//!
//! PDF encodes word breaks positionally, not as characters. The extractor
//! reconstructs them by comparing glyph advances against the font's own
//! space width: a gap wide enough reads as one space, a much wider one as a
//! run of spaces.

use crate::error::EvalError;
use crate::evaluator::EvalStatus;
use crate::font::Font;
use crate::ops::OpCode;
use crate::preprocessor::{Preprocessor, affine_from_args, num};
use crate::state::StateManager;
use crate::{CancellationToken, DocumentContext};
use carta_syntax::{Dict, Object, Stream};
use kurbo::{Affine, Point};
use log::warn;
use std::sync::Arc;
use std::time::{Duration, Instant};
use unicode_bidi::BidiInfo;

const TIME_SLICE: Duration = Duration::from_millis(20);
const OPS_PER_TIME_CHECK: usize = 100;

/// Reading direction of a run, from its bidi paragraph level.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Direction {
    Ltr,
    Rtl,
}

/// One positioned run of extracted text.
#[derive(Clone, Debug)]
pub struct TextRun {
    pub text: String,
    /// Device-space origin of the run's first glyph.
    pub x: f64,
    pub y: f64,
    /// Accumulated advance in device-space units.
    pub width: f64,
    pub height: f64,
    pub font_name: String,
    pub font_size: f64,
    pub direction: Direction,
}

/// A run still being accumulated.
struct RunBuilder {
    text: String,
    x: f64,
    y: f64,
    width: f64,
    height: f64,
    font_name: String,
    font_size: f64,
}

impl RunBuilder {
    fn finish(self) -> Option<TextRun> {
        if self.text.is_empty() {
            return None;
        }

        let direction = direction_of(&self.text);

        Some(TextRun {
            text: self.text,
            x: self.x,
            y: self.y,
            width: self.width,
            height: self.height,
            font_name: self.font_name,
            font_size: self.font_size,
            direction,
        })
    }
}

fn direction_of(text: &str) -> Direction {
    let bidi = BidiInfo::new(text, None);

    let rtl = bidi
        .paragraphs
        .first()
        .map(|p| p.level.is_rtl())
        .unwrap_or(false);

    if rtl { Direction::Rtl } else { Direction::Ltr }
}

/// How many space characters a positioning gap of `amount` text-space units
/// stands for, given the font's space advance.
fn fake_space_count(amount: f64, space_width: f64) -> usize {
    if space_width <= 0.0 || amount <= 0.0 {
        return 0;
    }

    let ratio = amount / space_width;

    if ratio < 0.5 {
        0
    } else if ratio < 1.5 {
        1
    } else {
        ratio.round() as usize
    }
}

/// Extracts text runs from one content stream.
///
/// Shares the preprocessor and state machinery with the evaluator,
/// including the suspend/resume discipline and form recursion, but carries
/// no operator list.
pub struct TextExtractor<'a> {
    ctx: &'a DocumentContext,
    resources: Dict,
    pre: Preprocessor<'a>,
    state: StateManager,
    cancel: CancellationToken,
    run: Option<RunBuilder>,
}

impl<'a> TextExtractor<'a> {
    pub fn new(
        ctx: &'a DocumentContext,
        data: &'a [u8],
        resources: Dict,
        cancel: CancellationToken,
    ) -> Self {
        let store = resources.store().clone();

        Self {
            ctx,
            resources,
            pre: Preprocessor::new(data, store),
            state: StateManager::default(),
            cancel,
            run: None,
        }
    }

    /// Run until done, out of budget or cancelled, appending finished runs.
    pub fn process(&mut self, out: &mut Vec<TextRun>) -> Result<EvalStatus, EvalError> {
        if self.cancel.is_cancelled() {
            return Ok(EvalStatus::Cancelled);
        }

        let slice_start = Instant::now();
        let mut since_check = 0usize;

        loop {
            since_check += 1;

            if since_check >= OPS_PER_TIME_CHECK {
                since_check = 0;

                if slice_start.elapsed() >= TIME_SLICE {
                    return Ok(EvalStatus::TimeBudget);
                }
            }

            let operation = match self.pre.read(&mut self.state) {
                Ok(op) => op,
                Err(e) => {
                    if !self.ctx.settings.ignore_errors {
                        return Err(e);
                    }

                    warn!("abandoning damaged stream during extraction: {e}");

                    None
                }
            };

            let Some(operation) = operation else {
                self.flush_run(out);

                return Ok(EvalStatus::Done);
            };

            if let Err(e) = self.dispatch(operation.op, &operation.args, out) {
                if matches!(e, EvalError::MissingData(_)) || !self.ctx.settings.ignore_errors {
                    return Err(e);
                }

                warn!("skipping malformed construct during extraction: {e}");
            }
        }
    }

    fn dispatch(
        &mut self,
        op: OpCode,
        args: &[Object],
        out: &mut Vec<TextRun>,
    ) -> Result<(), EvalError> {
        match op {
            OpCode::BeginText => {
                self.flush_run(out);
                let text = &mut self.state.state_mut().text;
                text.text_matrix = Affine::IDENTITY;
                text.line_matrix = Affine::IDENTITY;
            }
            OpCode::EndText => self.flush_run(out),

            OpCode::SetCharSpacing => self.state.state_mut().text.char_spacing = num(args, 0),
            OpCode::SetWordSpacing => self.state.state_mut().text.word_spacing = num(args, 0),
            OpCode::SetHScale => self.state.state_mut().text.h_scale = num(args, 0) / 100.0,
            OpCode::SetLeading => self.state.state_mut().text.leading = num(args, 0),
            OpCode::SetTextRise => self.state.state_mut().text.rise = num(args, 0),
            OpCode::SetTextRenderingMode => {
                self.state.state_mut().text.render_mode = num(args, 0) as i64;
            }

            OpCode::SetFont => {
                self.flush_run(out);
                self.set_font(args);
            }

            // Explicit positioning breaks the run; the next show starts a
            // fresh one at the new origin.
            OpCode::MoveText => {
                self.flush_run(out);
                self.state.state_mut().text.translate(num(args, 0), num(args, 1));
            }
            OpCode::SetLeadingMoveText => {
                self.flush_run(out);
                let (tx, ty) = (num(args, 0), num(args, 1));
                let text = &mut self.state.state_mut().text;
                text.leading = -ty;
                text.translate(tx, ty);
            }
            OpCode::SetTextMatrix => {
                self.flush_run(out);

                if let Some(m) = affine_from_args(args) {
                    let text = &mut self.state.state_mut().text;
                    text.text_matrix = m;
                    text.line_matrix = m;
                }
            }
            OpCode::NextLine => {
                self.flush_run(out);
                self.state.state_mut().text.next_line();
            }

            OpCode::ShowText => self.show_args(args, 0, out),
            OpCode::NextLineShowText => {
                self.flush_run(out);
                self.state.state_mut().text.next_line();
                self.show_args(args, 0, out);
            }
            OpCode::NextLineSetSpacingShowText => {
                self.flush_run(out);

                {
                    let text = &mut self.state.state_mut().text;
                    text.word_spacing = num(args, 0);
                    text.char_spacing = num(args, 1);
                    text.next_line();
                }

                self.show_args(args, 2, out);
            }
            OpCode::ShowSpacedText => self.show_spaced(args, out),

            OpCode::PaintXObject => self.recurse_form(args, out)?,

            // Everything else carries no text semantics.
            _ => {}
        }

        Ok(())
    }

    fn set_font(&mut self, args: &[Object]) {
        let Some(Object::Name(name)) = args.first() else {
            return;
        };
        let size = num(args, 1);

        let entry = self.resources.get::<Dict>("Font").and_then(|fonts| {
            let r = fonts.get_ref(name.as_str());

            fonts.get::<Dict>(name.as_str()).map(|d| (d, r))
        });

        let Some((dict, r)) = entry else {
            warn!("font resource `{}` not found", name.as_str());

            return;
        };

        let font = self.ctx.fonts.resolve(self.ctx, &dict, r);
        let text = &mut self.state.state_mut().text;
        text.font = Some(font);
        text.font_size = size;
    }

    fn show_args(&mut self, args: &[Object], index: usize, out: &mut Vec<TextRun>) {
        if let Some(Object::String(bytes)) = args.get(index) {
            self.show(&bytes.clone(), out);
        }
    }

    fn show_spaced(&mut self, args: &[Object], out: &mut Vec<TextRun>) {
        let Some(Object::Array(items)) = args.first() else {
            return;
        };

        for item in items.clone().iter_raw() {
            match item {
                Object::String(s) => self.show(&s, out),
                Object::Number(n) => {
                    // A negative adjustment widens the gap; wide enough gaps
                    // read as spaces.
                    let text = &self.state.state().text;
                    let amount = -n.as_f64() / 1000.0 * text.font_size;
                    let spaces = fake_space_count(amount, self.space_advance());

                    self.advance(amount * text.h_scale);

                    if spaces > 0 {
                        if let Some(run) = &mut self.run {
                            for _ in 0..spaces {
                                run.text.push(' ');
                            }
                        }
                    }
                }
                _ => {}
            }
        }
    }

    /// The current font's space advance in text-space units.
    fn space_advance(&self) -> f64 {
        let text = &self.state.state().text;

        let glyph_space = text
            .font
            .as_ref()
            .map(|f| f.space_width())
            .filter(|w| *w > 0.0)
            // A typical space advance when the font has no space glyph.
            .unwrap_or(250.0);

        glyph_space / 1000.0 * text.font_size
    }

    fn show(&mut self, bytes: &[u8], out: &mut Vec<TextRun>) {
        let Some(font) = self.state.state().text.font.clone() else {
            warn!("text shown before any font was set");

            return;
        };

        self.ensure_run(&font, out);

        let (font_size, char_spacing, word_spacing, h_scale) = {
            let t = &self.state.state().text;

            (t.font_size, t.char_spacing, t.word_spacing, t.h_scale)
        };

        for glyph in font.glyphs_for(bytes) {
            let mut advance = glyph.width / 1000.0 * font_size + char_spacing;

            if glyph.is_space {
                advance += word_spacing;
            }

            if let Some(run) = &mut self.run {
                run.text.push_str(&glyph.unicode);
            }

            self.advance(advance * h_scale);
        }
    }

    /// Advance the text matrix and widen the current run.
    fn advance(&mut self, tx: f64) {
        let ctm = self.state.state().ctm;
        let text = &mut self.state.state_mut().text;
        text.text_matrix *= Affine::translate((tx, 0.0));

        if let Some(run) = &mut self.run {
            let scale = (ctm * Point::new(1.0, 0.0)).distance(ctm * Point::new(0.0, 0.0));
            run.width += tx * scale;
        }
    }

    fn ensure_run(&mut self, font: &Arc<Font>, out: &mut Vec<TextRun>) {
        let (font_size, rise) = {
            let t = &self.state.state().text;

            (t.font_size, t.rise)
        };

        // A font swap mid-run starts a new run.
        let stale = self
            .run
            .as_ref()
            .is_some_and(|r| r.font_name != font.name || r.font_size != font_size);

        if stale {
            self.flush_run(out);
        }

        if self.run.is_some() {
            return;
        }

        let state = self.state.state();
        let origin = state.ctm * state.text.text_matrix * Point::new(0.0, rise);

        self.run = Some(RunBuilder {
            text: String::new(),
            x: origin.x,
            y: origin.y,
            width: 0.0,
            height: font_size,
            font_name: font.name.clone(),
            font_size,
        });
    }

    fn flush_run(&mut self, out: &mut Vec<TextRun>) {
        if let Some(run) = self.run.take().and_then(RunBuilder::finish) {
            out.push(run);
        }
    }

    fn recurse_form(&mut self, args: &[Object], out: &mut Vec<TextRun>) -> Result<(), EvalError> {
        let Some(Object::Name(name)) = args.first() else {
            return Ok(());
        };

        let Some(stream) = self
            .resources
            .get::<Dict>("XObject")
            .and_then(|x| x.get::<Stream>(name.as_str()))
        else {
            return Ok(());
        };

        if stream.dict().get::<carta_syntax::Name>("Subtype").map(|n| n.as_str() == "Form")
            != Some(true)
        {
            return Ok(());
        }

        self.flush_run(out);

        let resources = stream
            .dict()
            .get::<Dict>("Resources")
            .unwrap_or_else(|| self.resources.clone());
        let data = stream.decoded();

        let mut sub = TextExtractor::new(self.ctx, &data, resources, self.cancel.clone());
        sub.state = StateManager::new(self.state.state().clone());

        loop {
            match sub.process(out)? {
                EvalStatus::Done | EvalStatus::Cancelled => return Ok(()),
                EvalStatus::TimeBudget => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use carta_syntax::{Name, Store};

    fn font_resources() -> Dict {
        let store = Arc::new(Store::new());
        let font = Dict::from_pairs(
            store.clone(),
            [
                (Name::new("Subtype"), Object::name("Type1")),
                (Name::new("BaseFont"), Object::name("Helvetica")),
                (Name::new("FirstChar"), Object::int(32)),
                (Name::new("LastChar"), Object::int(126)),
            ],
        );
        let fonts = Dict::from_pairs(store.clone(), [(Name::new("F1"), Object::Dict(font))]);

        Dict::from_pairs(store, [(Name::new("Font"), Object::Dict(fonts))])
    }

    fn extract(content: &[u8], resources: Dict) -> Vec<TextRun> {
        let ctx = DocumentContext::default();
        let mut out = Vec::new();
        let mut extractor =
            TextExtractor::new(&ctx, content, resources, CancellationToken::new());

        loop {
            match extractor.process(&mut out).unwrap() {
                EvalStatus::Done | EvalStatus::Cancelled => break,
                EvalStatus::TimeBudget => {}
            }
        }

        out
    }

    #[test]
    fn simple_run() {
        let runs = extract(b"BT /F1 12 Tf 100 700 Td (Hello) Tj ET", font_resources());

        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].text, "Hello");
        assert_eq!(runs[0].x, 100.0);
        assert_eq!(runs[0].y, 700.0);
        assert!(runs[0].width > 0.0);
        assert_eq!(runs[0].direction, Direction::Ltr);
        assert_eq!(runs[0].font_size, 12.0);
    }

    #[test]
    fn positioning_splits_runs() {
        let runs = extract(
            b"BT /F1 12 Tf (one) Tj 0 -20 Td (two) Tj ET",
            font_resources(),
        );

        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].text, "one");
        assert_eq!(runs[1].text, "two");
        assert_eq!(runs[1].y, runs[0].y - 20.0);
    }

    #[test]
    fn wide_adjustment_becomes_a_space() {
        // Helvetica's fallback space advance is 500/1000 units; -600 is a
        // bit over one space, -2500 is five.
        let runs = extract(
            b"BT /F1 12 Tf [(A) -600 (B) -2500 (C)] TJ ET",
            font_resources(),
        );

        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].text, "A B     C");
    }

    #[test]
    fn narrow_adjustment_is_kerning_not_a_space() {
        let runs = extract(b"BT /F1 12 Tf [(A) -100 (B)] TJ ET", font_resources());

        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].text, "AB");
    }

    #[test]
    fn fake_space_tiers() {
        let space = 6.0;

        assert_eq!(fake_space_count(1.0, space), 0);
        assert_eq!(fake_space_count(6.0, space), 1);
        assert_eq!(fake_space_count(8.0, space), 1);
        assert_eq!(fake_space_count(30.0, space), 5);
        // Positive adjustments only; overlaps never produce spaces.
        assert_eq!(fake_space_count(-12.0, space), 0);
    }

    #[test]
    fn direction_tagging() {
        assert_eq!(direction_of("hello"), Direction::Ltr);
        assert_eq!(direction_of("\u{5E9}\u{5DC}\u{5D5}\u{5DD}"), Direction::Rtl);
        assert_eq!(direction_of("123"), Direction::Ltr);
    }

    #[test]
    fn form_recursion_collects_text() {
        let store = Arc::new(Store::new());
        let inner_font = Dict::from_pairs(
            store.clone(),
            [
                (Name::new("Subtype"), Object::name("Type1")),
                (Name::new("BaseFont"), Object::name("Helvetica")),
            ],
        );
        let inner_fonts =
            Dict::from_pairs(store.clone(), [(Name::new("F1"), Object::Dict(inner_font))]);
        let inner_resources = Dict::from_pairs(
            store.clone(),
            [(Name::new("Font"), Object::Dict(inner_fonts))],
        );

        let form_dict = Dict::from_pairs(
            store.clone(),
            [
                (Name::new("Subtype"), Object::name("Form")),
                (Name::new("Resources"), Object::Dict(inner_resources)),
            ],
        );
        let form = Stream::new(
            form_dict,
            Arc::from(b"BT /F1 10 Tf (inside) Tj ET".as_slice()),
        );
        let xobjects =
            Dict::from_pairs(store.clone(), [(Name::new("Fm1"), Object::Stream(form))]);
        let resources =
            Dict::from_pairs(store, [(Name::new("XObject"), Object::Dict(xobjects))]);

        let runs = extract(b"/Fm1 Do", resources);

        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].text, "inside");
        assert_eq!(runs[0].font_size, 10.0);
    }

    #[test]
    fn word_spacing_applies_to_space_glyphs() {
        let a = extract(b"BT /F1 12 Tf (a b) Tj ET", font_resources());
        let b = extract(b"BT /F1 12 Tf 10 Tw (a b) Tj ET", font_resources());

        assert_eq!(a[0].text, b[0].text);
        assert!(b[0].width > a[0].width);
    }
}
