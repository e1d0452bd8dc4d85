//! Graphics and text state, and the save/restore stack that owns them.

use crate::font::Font;
use kurbo::Affine;
use log::warn;
use std::sync::Arc;

/// The color space family currently selected for fill or stroke.
///
/// Color math is a collaborator concern; the evaluator only needs to know
/// how many components to expect and how to normalize them to RGB.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub enum ColorSpaceKind {
    Gray,
    #[default]
    Rgb,
    Cmyk,
    Pattern,
    /// Anything else; components are interpreted by count.
    Other,
}

/// Text-specific parameters, updated by the `T*` operator family.
#[derive(Clone, Debug)]
pub struct TextState {
    pub char_spacing: f64,
    pub word_spacing: f64,
    /// Horizontal scale as a fraction (the `Tz` operand divided by 100).
    pub h_scale: f64,
    pub leading: f64,
    pub rise: f64,
    pub render_mode: i64,
    pub font_size: f64,
    pub font: Option<Arc<Font>>,
    pub text_matrix: Affine,
    pub line_matrix: Affine,
}

impl Default for TextState {
    fn default() -> Self {
        Self {
            char_spacing: 0.0,
            word_spacing: 0.0,
            h_scale: 1.0,
            leading: 0.0,
            rise: 0.0,
            render_mode: 0,
            font_size: 0.0,
            font: None,
            text_matrix: Affine::IDENTITY,
            line_matrix: Affine::IDENTITY,
        }
    }
}

impl TextState {
    /// Advance the text matrix by (tx, ty) in unscaled text space.
    pub fn translate(&mut self, tx: f64, ty: f64) {
        self.line_matrix *= Affine::translate((tx, ty));
        self.text_matrix = self.line_matrix;
    }

    pub fn next_line(&mut self) {
        self.translate(0.0, -self.leading);
    }
}

/// A full graphics-state snapshot.
///
/// `save`/`restore` clone and pop whole values, so everything in here must
/// stay cheap to clone; bulky shared pieces (fonts) are reference counted.
#[derive(Clone, Debug)]
pub struct GraphicsState {
    pub ctm: Affine,
    pub fill_space: ColorSpaceKind,
    pub stroke_space: ColorSpaceKind,
    pub text: TextState,
}

impl Default for GraphicsState {
    fn default() -> Self {
        Self {
            ctm: Affine::IDENTITY,
            fill_space: ColorSpaceKind::default(),
            stroke_space: ColorSpaceKind::default(),
            text: TextState::default(),
        }
    }
}

/// Owns the current state and the stack of saved ones.
#[derive(Default, Debug)]
pub struct StateManager {
    current: GraphicsState,
    stack: Vec<GraphicsState>,
}

impl StateManager {
    pub fn new(initial: GraphicsState) -> Self {
        Self {
            current: initial,
            stack: Vec::new(),
        }
    }

    pub fn state(&self) -> &GraphicsState {
        &self.current
    }

    pub fn state_mut(&mut self) -> &mut GraphicsState {
        &mut self.current
    }

    pub fn save(&mut self) {
        self.stack.push(self.current.clone());
    }

    /// Restoring past the bottom of the stack is a no-op, not an error.
    pub fn restore(&mut self) {
        match self.stack.pop() {
            Some(prev) => self.current = prev,
            None => warn!("restore with an empty state stack"),
        }
    }

    /// Visible so the evaluator can auto-close unbalanced saves at stream
    /// end.
    pub fn saved_states_depth(&self) -> usize {
        self.stack.len()
    }

    pub fn transform(&mut self, m: Affine) {
        self.current.ctm *= m;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_restore_round_trip() {
        let mut mgr = StateManager::default();
        mgr.state_mut().text.char_spacing = 2.0;
        mgr.save();
        mgr.state_mut().text.char_spacing = 7.0;

        assert_eq!(mgr.saved_states_depth(), 1);
        mgr.restore();
        assert_eq!(mgr.state().text.char_spacing, 2.0);
        assert_eq!(mgr.saved_states_depth(), 0);
    }

    #[test]
    fn restore_on_empty_stack_is_noop() {
        let mut mgr = StateManager::default();
        mgr.state_mut().text.leading = 12.0;
        mgr.restore();

        assert_eq!(mgr.state().text.leading, 12.0);
    }

    #[test]
    fn transform_concatenates() {
        let mut mgr = StateManager::default();
        mgr.transform(Affine::scale(2.0));
        mgr.transform(Affine::translate((5.0, 0.0)));

        let p = mgr.state().ctm * kurbo::Point::new(1.0, 1.0);
        assert_eq!(p, kurbo::Point::new(12.0, 2.0));
    }
}
