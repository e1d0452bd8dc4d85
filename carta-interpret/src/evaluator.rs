//! The content-stream evaluator: a resumable state machine that drives the
//! preprocessor operator by operator and appends drawing instructions to an
//! operator list.
//!
//! Evaluation is cooperatively scheduled. [`Evaluator::process`] runs until
//! the stream ends, the wall-clock slice expires or the cancellation token
//! fires, and is called again to resume. Nested sub-evaluations (forms,
//! Type3 glyph procedures, soft-mask groups) run synchronously to completion
//! inside the parent's slice.

use crate::error::EvalError;
use crate::font::Font;
use crate::function::Function;
use crate::operator_list::{Operand, Operands, OperatorList};
use crate::ops::OpCode;
use crate::preprocessor::{Operation, Preprocessor, affine_from_args, num};
use crate::state::{ColorSpaceKind, GraphicsState, StateManager};
use crate::{CancellationToken, DocumentContext, UnsupportedFeature};
use carta_syntax::{Array, Dict, Name, Object, Stream};
use kurbo::Affine;
use log::{info, warn};
use rustc_hash::FxHashMap;
use smallvec::{SmallVec, smallvec};
use std::time::{Duration, Instant};

/// Wall-clock budget of one scheduling slice.
const TIME_SLICE: Duration = Duration::from_millis(20);

/// Operators processed between elapsed-time checks.
const OPS_PER_TIME_CHECK: usize = 100;

/// How one call to [`Evaluator::process`] ended.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum EvalStatus {
    /// The stream is exhausted and the operator list is ready.
    Done,
    /// The time slice expired; call `process` again to resume.
    TimeBudget,
    /// The cancellation token fired. Not an error.
    Cancelled,
}

/// Numeric codes for path sub-operators inside a `ConstructPath` operand.
mod path_ir {
    pub const MOVE_TO: f64 = 0.0;
    pub const LINE_TO: f64 = 1.0;
    pub const CURVE_TO: f64 = 2.0;
    pub const CURVE_TO2: f64 = 3.0;
    pub const CURVE_TO3: f64 = 4.0;
    pub const CLOSE_PATH: f64 = 5.0;
    pub const RECTANGLE: f64 = 6.0;
}

/// Consecutive path operators, coalesced into one instruction.
#[derive(Default)]
struct PathBuilder {
    ops: Vec<f64>,
    coords: Vec<f64>,
}

impl PathBuilder {
    fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    fn push(&mut self, op: OpCode, args: &[Object]) {
        let (code, arity) = match op {
            OpCode::MoveTo => (path_ir::MOVE_TO, 2),
            OpCode::LineTo => (path_ir::LINE_TO, 2),
            OpCode::CurveTo => (path_ir::CURVE_TO, 6),
            OpCode::CurveTo2 => (path_ir::CURVE_TO2, 4),
            OpCode::CurveTo3 => (path_ir::CURVE_TO3, 4),
            OpCode::ClosePath => (path_ir::CLOSE_PATH, 0),
            OpCode::Rectangle => (path_ir::RECTANGLE, 4),
            _ => return,
        };

        self.ops.push(code);

        for i in 0..arity {
            self.coords.push(num(args, i));
        }
    }

    fn take(&mut self) -> (Vec<f64>, Vec<f64>) {
        (std::mem::take(&mut self.ops), std::mem::take(&mut self.coords))
    }
}

/// Evaluates one content stream against one resource dictionary.
pub struct Evaluator<'a> {
    ctx: &'a DocumentContext,
    resources: Dict,
    pre: Preprocessor<'a>,
    state: StateManager,
    cancel: CancellationToken,
    path: PathBuilder,
    pending_clip: Option<OpCode>,
    in_text: bool,
    /// Paint instructions keyed by XObject name; repeated `Do` of the same
    /// image re-emits the cached instruction instead of rebuilding it.
    image_cache: FxHashMap<String, (OpCode, Operands)>,
    nested: bool,
}

impl<'a> Evaluator<'a> {
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
            path: PathBuilder::default(),
            pending_clip: None,
            in_text: false,
            image_cache: FxHashMap::default(),
            nested: false,
        }
    }

    /// Run until done, out of budget or cancelled.
    ///
    /// Emission order is source order, including across suspensions; the
    /// operator list passed on resumption must be the same one.
    pub fn process(&mut self, list: &mut OperatorList) -> Result<EvalStatus, EvalError> {
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

                    warn!("abandoning damaged stream: {e}");
                    self.ctx.warn_unsupported(UnsupportedFeature::General);

                    None
                }
            };

            let Some(operation) = operation else {
                self.finish(list);

                return Ok(EvalStatus::Done);
            };

            if let Err(e) = self.dispatch(operation, list) {
                match e {
                    // Control flow to the host, never swallowed.
                    EvalError::MissingData(_) => return Err(e),
                    EvalError::Format(ref msg) => {
                        if !self.ctx.settings.ignore_errors {
                            return Err(e);
                        }

                        warn!("skipping malformed construct: {msg}");
                        self.ctx.warn_unsupported(UnsupportedFeature::General);
                    }
                }
            }
        }
    }

    /// Auto-close unbalanced saves so the tape is balanced for any input.
    fn finish(&mut self, list: &mut OperatorList) {
        self.flush_path(list);

        while self.state.saved_states_depth() > 0 {
            self.state.restore();
            list.add_op(OpCode::Restore, smallvec![]);
        }

        if !self.nested {
            list.mark_ready();
        }
    }

    fn dispatch(&mut self, operation: Operation, list: &mut OperatorList) -> Result<(), EvalError> {
        let Operation { op, args, .. } = operation;

        if op.is_path_op() {
            self.path.push(op, &args);

            return Ok(());
        }

        // Any non-path operator seals the current path run.
        if !op.is_path_paint_op() && !matches!(op, OpCode::Clip | OpCode::EoClip) {
            self.flush_path(list);
        }

        match op {
            OpCode::Clip | OpCode::EoClip => self.pending_clip = Some(op),
            op if op.is_path_paint_op() => {
                self.flush_path(list);
                list.add_op(op, smallvec![]);
            }

            OpCode::Save | OpCode::Restore => list.add_op(op, smallvec![]),
            OpCode::Transform => self.emit_nums(op, &args, list),

            OpCode::SetLineWidth
            | OpCode::SetLineCap
            | OpCode::SetLineJoin
            | OpCode::SetMiterLimit
            | OpCode::SetDash
            | OpCode::SetRenderingIntent
            | OpCode::SetFlatness => self.emit_nums(op, &args, list),

            OpCode::SetGState => self.set_gstate(&args, list)?,

            OpCode::BeginText => {
                self.in_text = true;
                let text = &mut self.state.state_mut().text;
                text.text_matrix = Affine::IDENTITY;
                text.line_matrix = Affine::IDENTITY;
                list.add_op(op, smallvec![]);
            }
            OpCode::EndText => {
                self.in_text = false;
                list.add_op(op, smallvec![]);
            }

            OpCode::SetCharSpacing => {
                self.state.state_mut().text.char_spacing = num(&args, 0);
                self.emit_nums(op, &args, list);
            }
            OpCode::SetWordSpacing => {
                self.state.state_mut().text.word_spacing = num(&args, 0);
                self.emit_nums(op, &args, list);
            }
            OpCode::SetHScale => {
                self.state.state_mut().text.h_scale = num(&args, 0) / 100.0;
                self.emit_nums(op, &args, list);
            }
            OpCode::SetLeading => {
                self.state.state_mut().text.leading = num(&args, 0);
                self.emit_nums(op, &args, list);
            }
            OpCode::SetTextRenderingMode => {
                self.state.state_mut().text.render_mode = num(&args, 0) as i64;
                self.emit_nums(op, &args, list);
            }
            OpCode::SetTextRise => {
                self.state.state_mut().text.rise = num(&args, 0);
                self.emit_nums(op, &args, list);
            }
            OpCode::MoveText => {
                self.state.state_mut().text.translate(num(&args, 0), num(&args, 1));
                self.emit_nums(op, &args, list);
            }
            OpCode::SetLeadingMoveText => {
                let (tx, ty) = (num(&args, 0), num(&args, 1));
                let text = &mut self.state.state_mut().text;
                text.leading = -ty;
                text.translate(tx, ty);
                self.emit_nums(op, &args, list);
            }
            OpCode::SetTextMatrix => {
                if let Some(m) = affine_from_args(&args) {
                    let text = &mut self.state.state_mut().text;
                    text.text_matrix = m;
                    text.line_matrix = m;
                }

                self.emit_nums(op, &args, list);
            }
            OpCode::NextLine => {
                self.state.state_mut().text.next_line();
                list.add_op(op, smallvec![]);
            }

            OpCode::SetFont => self.set_font(&args, list)?,

            OpCode::ShowText => {
                let Some(glyphs) = self.map_string(&args, 0, list)? else {
                    return Ok(());
                };

                list.add_op(op, smallvec![glyphs]);
            }
            OpCode::NextLineShowText => {
                self.state.state_mut().text.next_line();

                let Some(glyphs) = self.map_string(&args, 0, list)? else {
                    return Ok(());
                };

                list.add_op(op, smallvec![glyphs]);
            }
            OpCode::NextLineSetSpacingShowText => {
                {
                    let text = &mut self.state.state_mut().text;
                    text.word_spacing = num(&args, 0);
                    text.char_spacing = num(&args, 1);
                    text.next_line();
                }

                let Some(glyphs) = self.map_string(&args, 2, list)? else {
                    return Ok(());
                };

                list.add_op(
                    op,
                    smallvec![
                        Operand::Num(num(&args, 0)),
                        Operand::Num(num(&args, 1)),
                        glyphs
                    ],
                );
            }
            OpCode::ShowSpacedText => self.show_spaced_text(&args, list)?,

            OpCode::SetCharWidth | OpCode::SetCharWidthAndBounds => {
                self.emit_nums(op, &args, list);
            }

            OpCode::SetFillColorSpace => {
                self.state.state_mut().fill_space = space_kind(&args);
            }
            OpCode::SetStrokeColorSpace => {
                self.state.state_mut().stroke_space = space_kind(&args);
            }
            OpCode::SetFillGray => self.emit_rgb(true, gray_to_rgb(num(&args, 0)), list),
            OpCode::SetStrokeGray => self.emit_rgb(false, gray_to_rgb(num(&args, 0)), list),
            OpCode::SetFillRgbColor => self.emit_rgb(
                true,
                (num(&args, 0) * 255.0, num(&args, 1) * 255.0, num(&args, 2) * 255.0),
                list,
            ),
            OpCode::SetStrokeRgbColor => self.emit_rgb(
                false,
                (num(&args, 0) * 255.0, num(&args, 1) * 255.0, num(&args, 2) * 255.0),
                list,
            ),
            OpCode::SetFillCmykColor => self.emit_rgb(
                true,
                cmyk_to_rgb(num(&args, 0), num(&args, 1), num(&args, 2), num(&args, 3)),
                list,
            ),
            OpCode::SetStrokeCmykColor => self.emit_rgb(
                false,
                cmyk_to_rgb(num(&args, 0), num(&args, 1), num(&args, 2), num(&args, 3)),
                list,
            ),
            OpCode::SetFillColor | OpCode::SetFillColorN => {
                self.set_components(true, &args, list)?;
            }
            OpCode::SetStrokeColor | OpCode::SetStrokeColorN => {
                self.set_components(false, &args, list)?;
            }

            OpCode::ShadingFill => self.shading_fill(&args, list)?,
            OpCode::PaintXObject => self.paint_xobject(&args, list)?,
            OpCode::BeginInlineImage => self.inline_image(list)?,
            // A stray EI with no preceding BI.
            OpCode::EndInlineImage => {}

            // Marked-content and compatibility sections carry no paint
            // semantics; dropped outright.
            OpCode::MarkPoint
            | OpCode::MarkPointProps
            | OpCode::BeginMarkedContent
            | OpCode::BeginMarkedContentProps
            | OpCode::EndMarkedContent
            | OpCode::BeginCompat
            | OpCode::EndCompat => {}

            other => {
                warn!("operator {other:?} reached the evaluator unhandled");
            }
        }

        Ok(())
    }

    /// Emit the coalesced path, the pending clip and reset the builder.
    fn flush_path(&mut self, list: &mut OperatorList) {
        if self.path.is_empty() {
            if let Some(clip) = self.pending_clip.take() {
                list.add_op(clip, smallvec![]);
            }

            return;
        }

        let (ops, coords) = self.path.take();

        // Paths inside a text object are malformed input; wrapping them in
        // save/restore keeps them from corrupting the text state.
        let wrap = self.in_text;

        if wrap {
            warn!("path construction inside a text object");
            list.add_op(OpCode::Save, smallvec![]);
        }

        list.add_op(
            OpCode::ConstructPath,
            smallvec![
                Operand::Array(ops.into_iter().map(Operand::Num).collect()),
                Operand::Array(coords.into_iter().map(Operand::Num).collect())
            ],
        );

        if let Some(clip) = self.pending_clip.take() {
            list.add_op(clip, smallvec![]);
        }

        if wrap {
            list.add_op(OpCode::Restore, smallvec![]);
        }
    }

    /// Pass numeric (and numeric-array) operands through unchanged.
    ///
    /// Operators carrying raw dictionaries the evaluator does not understand
    /// are dropped, not forwarded.
    fn emit_nums(&mut self, op: OpCode, args: &[Object], list: &mut OperatorList) {
        if args.iter().any(Object::is_dict_like) {
            warn!("dropping {op:?} with a dictionary operand");

            return;
        }

        let operands: Operands = args
            .iter()
            .map(|obj| match obj {
                Object::Number(n) => Operand::Num(n.as_f64()),
                Object::Array(a) => {
                    Operand::Array(a.iter::<f64>().map(Operand::Num).collect())
                }
                Object::Bool(b) => Operand::Bool(*b),
                Object::Name(n) => Operand::Str(n.as_str().to_string()),
                _ => Operand::Null,
            })
            .collect();

        list.add_op(op, operands);
    }

    fn emit_rgb(&mut self, fill: bool, rgb: (f64, f64, f64), list: &mut OperatorList) {
        let op = if fill {
            OpCode::SetFillRgbColor
        } else {
            OpCode::SetStrokeRgbColor
        };

        list.add_op(
            op,
            smallvec![
                Operand::Num(rgb.0.clamp(0.0, 255.0)),
                Operand::Num(rgb.1.clamp(0.0, 255.0)),
                Operand::Num(rgb.2.clamp(0.0, 255.0))
            ],
        );
    }

    /// `sc`/`scn` and stroke equivalents: interpret the component list by
    /// the active color space and normalize to RGB, or resolve a pattern.
    fn set_components(
        &mut self,
        fill: bool,
        args: &[Object],
        list: &mut OperatorList,
    ) -> Result<(), EvalError> {
        let space = if fill {
            &self.state.state().fill_space
        } else {
            &self.state.state().stroke_space
        };

        if *space == ColorSpaceKind::Pattern {
            return self.set_pattern(fill, args, list);
        }

        let comps: SmallVec<[f64; 4]> = args
            .iter()
            .filter_map(|o| match o {
                Object::Number(n) => Some(n.as_f64()),
                _ => None,
            })
            .collect();

        // The component count determines the family; the declared space
        // only matters for patterns, handled above.
        let rgb = match comps.as_slice() {
            [v] => gray_to_rgb(*v),
            [r, g, b] => (r * 255.0, g * 255.0, b * 255.0),
            [c, m, y, k] => cmyk_to_rgb(*c, *m, *y, *k),
            other => {
                return Err(EvalError::format(format!(
                    "color operator with {} components",
                    other.len()
                )));
            }
        };

        self.emit_rgb(fill, rgb, list);

        Ok(())
    }

    /// A pattern color: a shading pattern becomes an IR operand, anything
    /// else degrades to mid-gray.
    fn set_pattern(
        &mut self,
        fill: bool,
        args: &[Object],
        list: &mut OperatorList,
    ) -> Result<(), EvalError> {
        let name = match args.last() {
            Some(Object::Name(n)) => n.clone(),
            _ => return Err(EvalError::format("pattern color without a pattern name")),
        };

        let pattern = self
            .resources
            .get::<Dict>("Pattern")
            .and_then(|p| p.get::<Dict>(name.as_str()))
            .ok_or_else(|| EvalError::format(format!("unknown pattern `{}`", name.as_str())))?;

        if pattern.get::<i64>("PatternType") == Some(2) {
            if let Some(shading) = pattern.get::<Object>("Shading") {
                if let Some(ir) = shading_ir(&shading) {
                    let op = if fill {
                        OpCode::SetFillColorN
                    } else {
                        OpCode::SetStrokeColorN
                    };

                    list.add_op(op, smallvec![ir]);

                    return Ok(());
                }
            }
        }

        // Tiling patterns are out of reach here; paint something visible.
        warn!("degrading pattern `{}` to a flat color", name.as_str());
        self.ctx.warn_unsupported(UnsupportedFeature::General);
        self.emit_rgb(fill, (128.0, 128.0, 128.0), list);

        Ok(())
    }

    fn shading_fill(&mut self, args: &[Object], list: &mut OperatorList) -> Result<(), EvalError> {
        let name = match args.first() {
            Some(Object::Name(n)) => n.clone(),
            _ => return Err(EvalError::format("sh without a shading name")),
        };

        let shading = self
            .resources
            .get::<Dict>("Shading")
            .and_then(|s| s.get::<Object>(name.as_str()))
            .ok_or_else(|| EvalError::format(format!("unknown shading `{}`", name.as_str())))?;

        let ir = shading_ir(&shading)
            .ok_or_else(|| EvalError::format(format!("unusable shading `{}`", name.as_str())))?;

        list.add_op(OpCode::ShadingFill, smallvec![ir]);

        Ok(())
    }

    fn set_font(&mut self, args: &[Object], list: &mut OperatorList) -> Result<(), EvalError> {
        let name = match args.first() {
            Some(Object::Name(n)) => n.clone(),
            _ => return Err(EvalError::format("Tf without a font name")),
        };
        let size = num(args, 1);

        let font = self.resolve_font_resource(name.as_str());

        list.add_dependency(&font.load_id);
        list.add_op(
            OpCode::SetFont,
            smallvec![Operand::Str(font.load_id.clone()), Operand::Num(size)],
        );

        let text = &mut self.state.state_mut().text;
        text.font = Some(font);
        text.font_size = size;

        Ok(())
    }

    /// Look up a font in the resource dictionary; a missing entry degrades
    /// to the error font.
    fn resolve_font_resource(&self, name: &str) -> std::sync::Arc<Font> {
        let entry = self.resources.get::<Dict>("Font").and_then(|fonts| {
            let r = fonts.get_ref(name);

            fonts.get::<Dict>(name).map(|d| (d, r))
        });

        match entry {
            Some((dict, r)) => self.ctx.fonts.resolve(self.ctx, &dict, r),
            None => {
                warn!("font resource `{name}` not found");

                let empty = Dict::from_pairs(self.resources.store().clone(), []);

                self.ctx.fonts.resolve(self.ctx, &empty, None)
            }
        }
    }

    /// Map a string operand through the current font.
    ///
    /// Returns `None` when the glyphs cannot be produced but evaluation
    /// should continue (degraded text showing).
    fn map_string(
        &mut self,
        args: &[Object],
        index: usize,
        list: &mut OperatorList,
    ) -> Result<Option<Operand>, EvalError> {
        let Some(font) = self.state.state().text.font.clone() else {
            if self.ctx.settings.ignore_errors {
                warn!("text shown before any font was set");
                self.ctx.warn_unsupported(UnsupportedFeature::Font);

                return Ok(None);
            }

            return Err(EvalError::format("text shown before any font was set"));
        };

        let bytes = match args.get(index) {
            Some(Object::String(s)) => s.clone(),
            _ => return Err(EvalError::format("text operator without a string operand")),
        };

        if font.is_type3 {
            self.show_type3(&font, &bytes, list)?;
        }

        Ok(Some(Operand::Glyphs(font.glyphs_for(&bytes))))
    }

    /// Sub-evaluate each Type3 glyph procedure under the font matrix.
    fn show_type3(
        &mut self,
        font: &Font,
        bytes: &[u8],
        list: &mut OperatorList,
    ) -> Result<(), EvalError> {
        for code in font.char_codes(bytes) {
            let Some(proc_stream) = font.type3_proc(code) else {
                continue;
            };
            let data = proc_stream.decoded();
            let resources = proc_stream
                .dict()
                .get::<Dict>("Resources")
                .unwrap_or_else(|| self.resources.clone());

            list.add_op(OpCode::Save, smallvec![]);
            list.add_op(
                OpCode::Transform,
                font.font_matrix.iter().map(|v| Operand::Num(*v)).collect(),
            );

            self.run_nested(&data, resources, list)?;

            list.add_op(OpCode::Restore, smallvec![]);
        }

        Ok(())
    }

    fn show_spaced_text(
        &mut self,
        args: &[Object],
        list: &mut OperatorList,
    ) -> Result<(), EvalError> {
        let Some(font) = self.state.state().text.font.clone() else {
            if self.ctx.settings.ignore_errors {
                warn!("text shown before any font was set");
                self.ctx.warn_unsupported(UnsupportedFeature::Font);

                return Ok(());
            }

            return Err(EvalError::format("text shown before any font was set"));
        };

        let items = match args.first() {
            Some(Object::Array(a)) => a.clone(),
            _ => return Err(EvalError::format("TJ without an array operand")),
        };

        let mut out = Vec::with_capacity(items.len());

        for item in items.iter_raw() {
            match item {
                Object::Number(n) => out.push(Operand::Num(n.as_f64())),
                Object::String(s) => {
                    if font.is_type3 {
                        self.show_type3(&font, &s, list)?;
                    }

                    out.push(Operand::Glyphs(font.glyphs_for(&s)));
                }
                other => {
                    warn!("ignoring {other:?} inside a TJ array");
                }
            }
        }

        list.add_op(OpCode::ShowSpacedText, smallvec![Operand::Array(out)]);

        Ok(())
    }

    fn paint_xobject(&mut self, args: &[Object], list: &mut OperatorList) -> Result<(), EvalError> {
        let name = match args.first() {
            Some(Object::Name(n)) => n.clone(),
            _ => return Err(EvalError::format("Do without an XObject name")),
        };

        // Cached images skip resource lookup entirely.
        if let Some((op, operands)) = self.image_cache.get(name.as_str()) {
            if let Some(Operand::Str(id)) = operands.first() {
                list.add_dependency(id);
            }

            list.add_op(*op, operands.clone());

            return Ok(());
        }

        let stream = self
            .resources
            .get::<Dict>("XObject")
            .and_then(|x| x.get::<Stream>(name.as_str()))
            .ok_or_else(|| EvalError::format(format!("unknown XObject `{}`", name.as_str())))?;

        match stream.dict().get::<Name>("Subtype").as_ref().map(Name::as_str) {
            Some("Form") => self.paint_form(&stream, list),
            Some("Image") => self.paint_image(name.as_str(), &stream, list),
            other => {
                warn!("XObject `{}` has unsupported subtype {other:?}", name.as_str());
                self.ctx.warn_unsupported(UnsupportedFeature::General);

                Ok(())
            }
        }
    }

    fn paint_form(&mut self, stream: &Stream, list: &mut OperatorList) -> Result<(), EvalError> {
        let dict = stream.dict();

        let matrix: Vec<Operand> = dict
            .get::<Array>("Matrix")
            .map(|a| a.iter::<f64>().map(Operand::Num).collect())
            .unwrap_or_else(|| {
                [1.0, 0.0, 0.0, 1.0, 0.0, 0.0].iter().map(|v| Operand::Num(*v)).collect()
            });
        let bbox: Vec<Operand> = dict
            .get::<Array>("BBox")
            .map(|a| a.iter::<f64>().map(Operand::Num).collect())
            .unwrap_or_default();

        list.add_op(
            OpCode::PaintFormXObjectBegin,
            smallvec![Operand::Array(matrix), Operand::Array(bbox)],
        );

        let resources = dict
            .get::<Dict>("Resources")
            .unwrap_or_else(|| self.resources.clone());
        let data = stream.decoded();

        self.state.save();
        let result = self.run_nested(&data, resources, list);
        self.state.restore();
        result?;

        list.add_op(OpCode::PaintFormXObjectEnd, smallvec![]);

        Ok(())
    }

    fn paint_image(
        &mut self,
        name: &str,
        stream: &Stream,
        list: &mut OperatorList,
    ) -> Result<(), EvalError> {
        let dict = stream.dict();
        let width = dict.get::<f64>("Width").or_else(|| dict.get::<f64>("W")).unwrap_or(0.0);
        let height = dict.get::<f64>("Height").or_else(|| dict.get::<f64>("H")).unwrap_or(0.0);

        let max = self.ctx.settings.max_image_size;

        if max >= 0 && width * height > max as f64 {
            warn!("image `{name}` exceeds the size limit ({width}x{height})");
            self.ctx.warn_unsupported(UnsupportedFeature::Image);

            return Ok(());
        }

        let is_mask = dict.get::<bool>("ImageMask").unwrap_or(false);
        let op = if is_mask {
            OpCode::PaintImageMaskXObject
        } else {
            OpCode::PaintImageXObject
        };

        // Decode and deliver out of band exactly once per image.
        let id = self.ctx.next_id("img");
        self.ctx.claim_delivery(&id);

        let operands: Operands = smallvec![
            Operand::Str(id.clone()),
            Operand::Num(width),
            Operand::Num(height)
        ];

        self.image_cache
            .insert(name.to_string(), (op, operands.clone()));

        list.add_dependency(&id);
        list.add_op(op, operands);

        Ok(())
    }

    /// `BI ... ID <bytes> EI`: the key/value operands arrive as the `ID`
    /// operation's argument buffer, the payload through the lexer.
    fn inline_image(&mut self, list: &mut OperatorList) -> Result<(), EvalError> {
        let operation = self
            .pre
            .read(&mut self.state)?
            .ok_or_else(|| EvalError::format("inline image without ID"))?;

        if operation.op != OpCode::EndInlineImage {
            return Err(EvalError::format("inline image without ID"));
        }

        let dict = Dict::from_pairs(
            self.resources.store().clone(),
            operation.args.chunks_exact(2).filter_map(|pair| match pair {
                [Object::Name(key), value] => Some((key.clone(), value.clone())),
                _ => None,
            }),
        );

        let bytes = self
            .pre
            .inline_image_bytes()
            .ok_or_else(|| EvalError::format("inline image data is truncated"))?;

        let width = dict.get::<f64>("W").or_else(|| dict.get::<f64>("Width")).unwrap_or(0.0);
        let height = dict.get::<f64>("H").or_else(|| dict.get::<f64>("Height")).unwrap_or(0.0);

        let max = self.ctx.settings.max_image_size;

        if max >= 0 && width * height > max as f64 {
            warn!("inline image exceeds the size limit ({} bytes)", bytes.len());
            self.ctx.warn_unsupported(UnsupportedFeature::Image);

            return Ok(());
        }

        let id = self.ctx.next_id("img");
        self.ctx.claim_delivery(&id);

        list.add_dependency(&id);
        list.add_op(
            OpCode::PaintInlineImageXObject,
            smallvec![
                Operand::Str(id),
                Operand::Num(width),
                Operand::Num(height)
            ],
        );

        Ok(())
    }

    fn set_gstate(&mut self, args: &[Object], list: &mut OperatorList) -> Result<(), EvalError> {
        let name = match args.first() {
            Some(Object::Name(n)) => n.clone(),
            _ => return Err(EvalError::format("gs without a state name")),
        };

        let ext = self
            .resources
            .get::<Dict>("ExtGState")
            .and_then(|e| e.get::<Dict>(name.as_str()))
            .ok_or_else(|| {
                EvalError::format(format!("unknown graphics state `{}`", name.as_str()))
            })?;

        let mut keys: Vec<Name> = ext.keys().cloned().collect();
        keys.sort();

        let mut entries: Vec<Operand> = Vec::new();

        for key in keys {
            let key = key.as_str();

            match key {
                "LW" | "LC" | "LJ" | "ML" | "CA" | "ca" => {
                    if let Some(v) = ext.get::<f64>(key) {
                        entries.push(pair(key, Operand::Num(v)));
                    }
                }
                "D" => {
                    if let Some(dash) = ext.get::<Array>(key) {
                        let array = dash
                            .get::<Array>(0)
                            .map(|a| a.iter::<f64>().map(Operand::Num).collect())
                            .unwrap_or_default();
                        let phase = dash.get::<f64>(1).unwrap_or(0.0);

                        entries.push(pair(
                            key,
                            Operand::Array(vec![Operand::Array(array), Operand::Num(phase)]),
                        ));
                    }
                }
                "BM" => {
                    let mode = ext
                        .get::<Name>(key)
                        .or_else(|| ext.get::<Array>(key).and_then(|a| a.get::<Name>(0)));
                    let normalized = mode.as_ref().and_then(|m| normalize_blend_mode(m.as_str()));

                    // Unknown blend modes degrade to source-over.
                    let value = match normalized {
                        Some(v) => v,
                        None => {
                            warn!("unsupported blend mode {mode:?}");
                            self.ctx.warn_unsupported(UnsupportedFeature::General);

                            "Normal"
                        }
                    };

                    entries.push(pair(key, Operand::Str(value.to_string())));
                }
                "Font" => {
                    if let Some(spec) = ext.get::<Array>(key) {
                        let r = match spec.raw(0) {
                            Some(Object::Ref(r)) => Some(*r),
                            _ => None,
                        };
                        let size = spec.get::<f64>(1).unwrap_or(0.0);

                        if let Some(dict) = spec.get::<Dict>(0) {
                            let font = self.ctx.fonts.resolve(self.ctx, &dict, r);

                            list.add_dependency(&font.load_id);
                            entries.push(pair(
                                key,
                                Operand::Array(vec![
                                    Operand::Str(font.load_id.clone()),
                                    Operand::Num(size),
                                ]),
                            ));

                            let text = &mut self.state.state_mut().text;
                            text.font = Some(font);
                            text.font_size = size;
                        }
                    }
                }
                "SMask" => {
                    let value = match ext.get::<Object>(key) {
                        Some(Object::Dict(smask)) => self.build_smask(&smask, list)?,
                        // /SMask /None clears the mask.
                        _ => Operand::Null,
                    };

                    entries.push(pair(key, value));
                }
                other => {
                    info!("ignoring ExtGState entry `{other}`");
                }
            }
        }

        list.add_op(OpCode::SetGState, smallvec![Operand::Array(entries)]);

        Ok(())
    }

    /// Build a soft-mask group: a nested form evaluation bracketed by group
    /// markers, described by an operand the backend can interpret.
    fn build_smask(&mut self, smask: &Dict, list: &mut OperatorList) -> Result<Operand, EvalError> {
        let subtype = smask
            .get::<Name>("S")
            .map(|n| n.as_str().to_string())
            .unwrap_or_else(|| "Alpha".to_string());
        let backdrop: Vec<Operand> = smask
            .get::<Array>("BC")
            .map(|a| a.iter::<f64>().map(Operand::Num).collect())
            .unwrap_or_default();

        // An attached transfer function becomes a 256-entry lookup table.
        let lut = match smask.get::<Object>("TR") {
            Some(Object::Name(n)) if n.as_str() == "Identity" => Operand::Null,
            Some(obj) => match Function::parse(&obj) {
                Some(f) => transfer_lut(&f)?,
                None => Operand::Null,
            },
            None => Operand::Null,
        };

        let descriptor = Operand::Array(vec![
            Operand::Str(subtype),
            Operand::Array(backdrop),
            lut,
        ]);

        let group = smask
            .get::<Stream>("G")
            .ok_or_else(|| EvalError::format("soft mask without a group stream"))?;

        list.add_op(OpCode::BeginGroup, smallvec![descriptor.clone()]);

        let resources = group
            .dict()
            .get::<Dict>("Resources")
            .unwrap_or_else(|| self.resources.clone());
        let data = group.decoded();

        self.state.save();
        let result = self.run_nested(&data, resources, list);
        self.state.restore();
        result?;

        list.add_op(OpCode::EndGroup, smallvec![]);

        Ok(descriptor)
    }

    /// Run a nested stream to completion inside the current slice.
    ///
    /// Sub-evaluations are strictly nested: the parent does not process
    /// another operator until the child is done.
    fn run_nested(
        &mut self,
        data: &[u8],
        resources: Dict,
        list: &mut OperatorList,
    ) -> Result<(), EvalError> {
        let mut sub = Evaluator::new(self.ctx, data, resources, self.cancel.clone());
        sub.nested = true;
        sub.state = StateManager::new(GraphicsState {
            ctm: self.state.state().ctm,
            ..GraphicsState::default()
        });

        loop {
            match sub.process(list)? {
                EvalStatus::Done | EvalStatus::Cancelled => return Ok(()),
                // Nested runs ignore the slice budget; fairness is the
                // outermost loop's concern.
                EvalStatus::TimeBudget => {}
            }
        }
    }
}

fn pair(key: &str, value: Operand) -> Operand {
    Operand::Array(vec![Operand::Str(key.to_string()), value])
}

fn gray_to_rgb(v: f64) -> (f64, f64, f64) {
    let c = v * 255.0;

    (c, c, c)
}

fn cmyk_to_rgb(c: f64, m: f64, y: f64, k: f64) -> (f64, f64, f64) {
    (
        255.0 * (1.0 - (c + k).min(1.0)),
        255.0 * (1.0 - (m + k).min(1.0)),
        255.0 * (1.0 - (y + k).min(1.0)),
    )
}

/// The color space family selected by a `cs`/`CS` operand.
fn space_kind(args: &[Object]) -> ColorSpaceKind {
    match args.first() {
        Some(Object::Name(n)) => match n.as_str() {
            "DeviceGray" | "G" | "CalGray" => ColorSpaceKind::Gray,
            "DeviceRGB" | "RGB" | "CalRGB" => ColorSpaceKind::Rgb,
            "DeviceCMYK" | "CMYK" => ColorSpaceKind::Cmyk,
            "Pattern" => ColorSpaceKind::Pattern,
            _ => ColorSpaceKind::Other,
        },
        _ => ColorSpaceKind::Other,
    }
}

fn normalize_blend_mode(name: &str) -> Option<&'static str> {
    Some(match name {
        "Normal" | "Compatible" => "Normal",
        "Multiply" => "Multiply",
        "Screen" => "Screen",
        "Overlay" => "Overlay",
        "Darken" => "Darken",
        "Lighten" => "Lighten",
        "ColorDodge" => "ColorDodge",
        "ColorBurn" => "ColorBurn",
        "HardLight" => "HardLight",
        "SoftLight" => "SoftLight",
        "Difference" => "Difference",
        "Exclusion" => "Exclusion",
        "Hue" => "Hue",
        "Saturation" => "Saturation",
        "Color" => "Color",
        "Luminosity" => "Luminosity",
        _ => return None,
    })
}

/// Sample a transfer function into a 256-entry byte table.
fn transfer_lut(f: &Function) -> Result<Operand, EvalError> {
    let mut lut = Vec::with_capacity(256);

    for i in 0..256u32 {
        let out = f.eval(&[i as f32 / 255.0])?;
        let v = out.first().copied().unwrap_or(0.0);

        lut.push(Operand::Num(((v * 255.0).clamp(0.0, 255.0)) as f64));
    }

    Ok(Operand::Array(lut))
}

/// The positional-array encoding of a shading dictionary: type, coords,
/// extension flags and function IRs.
fn shading_ir(obj: &Object) -> Option<Operand> {
    let dict = match obj {
        Object::Dict(d) => d.clone(),
        Object::Stream(s) => s.dict().clone(),
        _ => return None,
    };

    let shading_type = dict.get::<i64>("ShadingType")?;
    let coords: Vec<Operand> = dict
        .get::<Array>("Coords")
        .map(|a| a.iter::<f64>().map(Operand::Num).collect())
        .unwrap_or_default();
    let extend: Vec<Operand> = dict
        .get::<Array>("Extend")
        .map(|a| a.iter::<bool>().map(Operand::Bool).collect())
        .unwrap_or_default();

    let mut functions = Vec::new();

    match dict.get::<Object>("Function") {
        Some(Object::Array(fns)) => {
            for f in fns.iter_raw() {
                functions.push(Function::parse(&f)?.to_ir());
            }
        }
        Some(obj) => functions.push(Function::parse(&obj)?.to_ir()),
        None => {}
    }

    Some(Operand::Array(vec![
        Operand::Num(shading_type as f64),
        Operand::Array(coords),
        Operand::Array(extend),
        Operand::Array(functions),
    ]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EvalSettings;
    use carta_syntax::Store;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn run(
        ctx: &DocumentContext,
        content: &[u8],
        resources: Dict,
    ) -> Result<OperatorList, EvalError> {
        let mut list = OperatorList::new();
        let mut evaluator =
            Evaluator::new(ctx, content, resources, CancellationToken::new());

        loop {
            match evaluator.process(&mut list)? {
                EvalStatus::Done | EvalStatus::Cancelled => break,
                EvalStatus::TimeBudget => {}
            }
        }

        Ok(list)
    }

    fn empty_resources() -> Dict {
        Dict::from_pairs(Arc::new(Store::new()), [])
    }

    fn counting_ctx(kind: UnsupportedFeature) -> (DocumentContext, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let sink = count.clone();

        let mut settings = EvalSettings::default();
        settings.warning_sink = Arc::new(move |k| {
            if k == kind {
                sink.fetch_add(1, Ordering::Relaxed);
            }
        });

        (DocumentContext::new(settings), count)
    }

    fn ops_of(list: &OperatorList) -> Vec<OpCode> {
        list.ops().to_vec()
    }

    #[test]
    fn unbalanced_saves_are_auto_closed() {
        let ctx = DocumentContext::default();
        let list = run(&ctx, b"q q 0.5 w", empty_resources()).unwrap();

        let ops = ops_of(&list);
        let saves = ops.iter().filter(|o| **o == OpCode::Save).count();
        let restores = ops.iter().filter(|o| **o == OpCode::Restore).count();

        assert_eq!(saves, 2);
        assert_eq!(restores, 2);
        assert!(list.is_ready());
    }

    #[test]
    fn stroked_rectangle_normalizes_color_and_coalesces_path() {
        let ctx = DocumentContext::default();
        let list = run(&ctx, b"1 0 0 RG 10 10 100 100 re S", empty_resources()).unwrap();

        let ops = ops_of(&list);
        assert_eq!(ops, vec![
            OpCode::SetStrokeRgbColor,
            OpCode::ConstructPath,
            OpCode::Stroke
        ]);

        let rgb: Vec<f64> = list.args()[0].iter().filter_map(Operand::as_f64).collect();
        assert_eq!(rgb, vec![255.0, 0.0, 0.0]);

        let Operand::Array(coords) = &list.args()[1][1] else {
            panic!("expected a coordinate array");
        };
        let coords: Vec<f64> = coords.iter().filter_map(Operand::as_f64).collect();
        assert_eq!(coords, vec![10.0, 10.0, 100.0, 100.0]);
    }

    #[test]
    fn consecutive_path_ops_merge_into_one_instruction() {
        let ctx = DocumentContext::default();
        let list = run(&ctx, b"0 0 m 5 5 l 9 9 l h f", empty_resources()).unwrap();

        let ops = ops_of(&list);
        assert_eq!(ops, vec![OpCode::ConstructPath, OpCode::Fill]);

        let Operand::Array(sub_ops) = &list.args()[0][0] else {
            panic!("expected a path op array");
        };
        assert_eq!(sub_ops.len(), 4);
    }

    #[test]
    fn clip_is_emitted_after_the_path() {
        let ctx = DocumentContext::default();
        let list = run(&ctx, b"0 0 10 10 re W n", empty_resources()).unwrap();

        assert_eq!(ops_of(&list), vec![
            OpCode::ConstructPath,
            OpCode::Clip,
            OpCode::EndPath
        ]);
    }

    #[test]
    fn text_before_font_is_fatal_when_strict() {
        let mut settings = EvalSettings::default();
        settings.ignore_errors = false;

        let ctx = DocumentContext::new(settings);
        let result = run(&ctx, b"BT (hi) Tj ET", empty_resources());

        assert!(matches!(result, Err(EvalError::Format(_))));
    }

    #[test]
    fn text_before_font_degrades_with_one_font_notice() {
        let (ctx, font_notices) = counting_ctx(UnsupportedFeature::Font);
        let list = run(&ctx, b"BT (hi) Tj ET", empty_resources()).unwrap();

        assert_eq!(font_notices.load(Ordering::Relaxed), 1);
        assert!(list.is_ready());
        assert!(!ops_of(&list).contains(&OpCode::ShowText));
    }

    #[test]
    fn cancellation_is_silent() {
        let ctx = DocumentContext::default();
        let token = CancellationToken::new();
        token.cancel();

        let mut list = OperatorList::new();
        let mut evaluator = Evaluator::new(&ctx, b"q Q", empty_resources(), token);

        let status = evaluator.process(&mut list).unwrap();
        assert_eq!(status, EvalStatus::Cancelled);
        assert!(!list.is_ready());
        assert!(list.is_empty());
    }

    fn image_resources(name: &str) -> Dict {
        let store = Arc::new(Store::new());
        let image_dict = Dict::from_pairs(
            store.clone(),
            [
                (Name::new("Subtype"), Object::name("Image")),
                (Name::new("Width"), Object::int(2)),
                (Name::new("Height"), Object::int(2)),
            ],
        );
        let image = Stream::new(image_dict, Arc::from(vec![0u8; 4].as_slice()));
        let xobjects = Dict::from_pairs(
            store.clone(),
            [(Name::new(name), Object::Stream(image))],
        );

        Dict::from_pairs(store, [(Name::new("XObject"), Object::Dict(xobjects))])
    }

    #[test]
    fn repeated_image_reuses_the_cached_instruction() {
        let ctx = DocumentContext::default();
        let list = run(&ctx, b"/Im1 Do /Im1 Do", image_resources("Im1")).unwrap();

        let paints: Vec<&Operands> = list
            .iter()
            .filter(|(op, _)| *op == OpCode::PaintImageXObject)
            .map(|(_, args)| args)
            .collect();

        assert_eq!(paints.len(), 2);
        // Same id operand both times; a single decode and a single
        // dependency entry.
        assert_eq!(paints[0], paints[1]);
        assert_eq!(list.dependencies().len(), 1);

        let Some(Operand::Str(id)) = paints[0].first() else {
            panic!("expected an image id");
        };
        assert!(!ctx.claim_delivery(id));
    }

    #[test]
    fn oversized_image_is_skipped_with_an_image_notice() {
        let (mut ctx, image_notices) = counting_ctx(UnsupportedFeature::Image);
        ctx.settings.max_image_size = 1;

        let list = run(&ctx, b"/Im1 Do", image_resources("Im1")).unwrap();

        assert_eq!(image_notices.load(Ordering::Relaxed), 1);
        assert!(!ops_of(&list).contains(&OpCode::PaintImageXObject));
    }

    #[test]
    fn inline_image() {
        let ctx = DocumentContext::default();
        let list = run(
            &ctx,
            b"BI /W 2 /H 2 ID \x00\x01\x02\x03 EI q Q",
            empty_resources(),
        )
        .unwrap();

        let ops = ops_of(&list);
        assert!(ops.contains(&OpCode::PaintInlineImageXObject));
        // The evaluator resumes cleanly after the binary payload.
        assert!(ops.contains(&OpCode::Save));

        let (_, args) = list
            .iter()
            .find(|(op, _)| *op == OpCode::PaintInlineImageXObject)
            .unwrap();
        assert_eq!(args[1], Operand::Num(2.0));
    }

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

    #[test]
    fn text_showing_maps_glyphs() {
        let ctx = DocumentContext::default();
        let list = run(&ctx, b"BT /F1 12 Tf (Hi) Tj ET", font_resources()).unwrap();

        let (_, args) = list
            .iter()
            .find(|(op, _)| *op == OpCode::ShowText)
            .expect("a ShowText instruction");

        let Some(Operand::Glyphs(glyphs)) = args.first() else {
            panic!("expected glyphs");
        };
        assert_eq!(glyphs.len(), 2);
        assert_eq!(glyphs[0].unicode, "H");
        assert_eq!(glyphs[1].unicode, "i");

        // The font dependency precedes its first use.
        assert_eq!(list.dependencies().len(), 1);
    }

    #[test]
    fn spaced_text_keeps_adjustments() {
        let ctx = DocumentContext::default();
        let list = run(
            &ctx,
            b"BT /F1 12 Tf [(A) -120 (B)] TJ ET",
            font_resources(),
        )
        .unwrap();

        let (_, args) = list
            .iter()
            .find(|(op, _)| *op == OpCode::ShowSpacedText)
            .unwrap();

        let Some(Operand::Array(items)) = args.first() else {
            panic!("expected an item array");
        };
        assert_eq!(items.len(), 3);
        assert_eq!(items[1], Operand::Num(-120.0));
        assert!(matches!(&items[0], Operand::Glyphs(g) if g.len() == 1));
    }

    #[test]
    fn form_xobject_recurses_and_restores_state() {
        let store = Arc::new(Store::new());
        let form_dict = Dict::from_pairs(
            store.clone(),
            [
                (Name::new("Subtype"), Object::name("Form")),
                (
                    Name::new("BBox"),
                    Object::Array(Array::from_objects(
                        store.clone(),
                        vec![
                            Object::int(0),
                            Object::int(0),
                            Object::int(10),
                            Object::int(10),
                        ],
                    )),
                ),
            ],
        );
        let form = Stream::new(form_dict, Arc::from(b"q 0.5 w".as_slice()));
        let xobjects =
            Dict::from_pairs(store.clone(), [(Name::new("Fm1"), Object::Stream(form))]);
        let resources =
            Dict::from_pairs(store, [(Name::new("XObject"), Object::Dict(xobjects))]);

        let ctx = DocumentContext::default();
        let list = run(&ctx, b"/Fm1 Do", resources).unwrap();

        let ops = ops_of(&list);
        assert_eq!(ops, vec![
            OpCode::PaintFormXObjectBegin,
            OpCode::Save,
            OpCode::SetLineWidth,
            // The form's dangling save is closed inside the form.
            OpCode::Restore,
            OpCode::PaintFormXObjectEnd
        ]);
        assert!(list.is_ready());
    }

    #[test]
    fn unknown_blend_mode_falls_back_to_source_over() {
        let (ctx, general_notices) = counting_ctx(UnsupportedFeature::General);

        let store = Arc::new(Store::new());
        let gs = Dict::from_pairs(
            store.clone(),
            [
                (Name::new("BM"), Object::name("Bogus")),
                (Name::new("LW"), Object::int(3)),
            ],
        );
        let ext =
            Dict::from_pairs(store.clone(), [(Name::new("GS1"), Object::Dict(gs))]);
        let resources =
            Dict::from_pairs(store, [(Name::new("ExtGState"), Object::Dict(ext))]);

        let list = run(&ctx, b"/GS1 gs", resources).unwrap();

        assert_eq!(general_notices.load(Ordering::Relaxed), 1);

        let (_, args) = list
            .iter()
            .find(|(op, _)| *op == OpCode::SetGState)
            .unwrap();
        let Some(Operand::Array(entries)) = args.first() else {
            panic!("expected gstate entries");
        };

        let bm = entries
            .iter()
            .find_map(|e| match e {
                Operand::Array(p) if p.first() == Some(&Operand::Str("BM".to_string())) => {
                    p.get(1)
                }
                _ => None,
            })
            .unwrap();
        assert_eq!(*bm, Operand::Str("Normal".to_string()));
    }

    #[test]
    fn cmyk_and_gray_normalize_to_rgb() {
        let ctx = DocumentContext::default();
        let list = run(&ctx, b"0 0 0 1 k 0.5 g", empty_resources()).unwrap();

        assert_eq!(ops_of(&list), vec![
            OpCode::SetFillRgbColor,
            OpCode::SetFillRgbColor
        ]);

        let black: Vec<f64> = list.args()[0].iter().filter_map(Operand::as_f64).collect();
        assert_eq!(black, vec![0.0, 0.0, 0.0]);

        let gray: Vec<f64> = list.args()[1].iter().filter_map(Operand::as_f64).collect();
        assert_eq!(gray, vec![127.5, 127.5, 127.5]);
    }

    #[test]
    fn marked_content_is_dropped() {
        let ctx = DocumentContext::default();
        let list = run(
            &ctx,
            b"/Span BMC 0.5 w EMC BX nonsense EX",
            empty_resources(),
        )
        .unwrap();

        assert_eq!(ops_of(&list), vec![OpCode::SetLineWidth]);
    }

    #[test]
    fn missing_xobject_is_fatal_only_when_strict() {
        let mut settings = EvalSettings::default();
        settings.ignore_errors = false;
        let ctx = DocumentContext::new(settings);

        assert!(matches!(
            run(&ctx, b"/Nope Do", empty_resources()),
            Err(EvalError::Format(_))
        ));

        let ctx = DocumentContext::default();
        let list = run(&ctx, b"/Nope Do 0.5 w", empty_resources()).unwrap();
        assert_eq!(ops_of(&list), vec![OpCode::SetLineWidth]);
    }
}
