//! The operator list: a flat, append-only instruction tape.

use crate::font::Glyph;
use crate::ops::OpCode;
use rustc_hash::FxHashSet;
use smallvec::SmallVec;

/// One operand on the tape.
///
/// Function and pattern payloads cross the tape as positional arrays
/// (`[kind, params...]`), so `Array` doubles as the IR carrier.
#[derive(Clone, Debug, PartialEq)]
pub enum Operand {
    Null,
    Num(f64),
    Bool(bool),
    Str(String),
    Array(Vec<Operand>),
    /// Mapped glyphs for text-showing instructions.
    Glyphs(Vec<Glyph>),
}

impl Operand {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Operand::Num(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Operand::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl From<f64> for Operand {
    fn from(v: f64) -> Self {
        Operand::Num(v)
    }
}

impl From<f32> for Operand {
    fn from(v: f32) -> Self {
        Operand::Num(v as f64)
    }
}

impl From<&str> for Operand {
    fn from(v: &str) -> Self {
        Operand::Str(v.to_string())
    }
}

pub type Operands = SmallVec<[Operand; 4]>;

/// A flat tape of (opcode, operands) pairs plus the ids of out-of-band
/// resources it depends on.
///
/// Owned by the call that created it; nested sub-evaluations append into the
/// same list, and their dependency ids are merged rather than nested.
#[derive(Default, Debug)]
pub struct OperatorList {
    ops: Vec<OpCode>,
    args: Vec<Operands>,
    dependencies: FxHashSet<String>,
    ready: bool,
}

impl OperatorList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_op(&mut self, op: OpCode, args: Operands) {
        self.ops.push(op);
        self.args.push(args);
    }

    /// Record a dependency and emit the matching tape marker.
    pub fn add_dependency(&mut self, id: &str) {
        if self.dependencies.insert(id.to_string()) {
            self.add_op(OpCode::Dependency, smallvec::smallvec![Operand::from(id)]);
        }
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn ops(&self) -> &[OpCode] {
        &self.ops
    }

    pub fn args(&self) -> &[Operands] {
        &self.args
    }

    pub fn dependencies(&self) -> &FxHashSet<String> {
        &self.dependencies
    }

    /// Fulfilled once the evaluation that owns this list has completed,
    /// including all nested sub-evaluations.
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub(crate) fn mark_ready(&mut self) {
        self.ready = true;
    }

    pub fn iter(&self) -> impl Iterator<Item = (OpCode, &Operands)> {
        self.ops.iter().copied().zip(self.args.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::smallvec;

    #[test]
    fn dependency_dedup() {
        let mut list = OperatorList::new();
        list.add_dependency("f1");
        list.add_dependency("f1");
        list.add_dependency("img2");

        assert_eq!(list.dependencies().len(), 2);
        // Only two Dependency markers on the tape.
        let markers = list
            .ops()
            .iter()
            .filter(|op| **op == OpCode::Dependency)
            .count();
        assert_eq!(markers, 2);
    }

    #[test]
    fn tape_order() {
        let mut list = OperatorList::new();
        list.add_op(OpCode::Save, smallvec![]);
        list.add_op(OpCode::SetFillRgbColor, smallvec![
            Operand::Num(255.0),
            Operand::Num(0.0),
            Operand::Num(0.0)
        ]);
        list.add_op(OpCode::Restore, smallvec![]);

        let ops: Vec<_> = list.iter().map(|(op, _)| op).collect();
        assert_eq!(
            ops,
            vec![OpCode::Save, OpCode::SetFillRgbColor, OpCode::Restore]
        );
        assert!(!list.is_ready());
    }
}
