//! The preprocessor: turns raw tokens into well-formed (opcode, operands)
//! pairs and keeps the state manager's save/restore depth in sync.

use crate::error::EvalError;
use crate::ops::{self, OpCode, OpInfo};
use crate::state::StateManager;
use carta_syntax::{Lexer, Number, Object, Store, Token};
use kurbo::Affine;
use log::warn;
use smallvec::SmallVec;
use std::sync::Arc;

/// Unparseable path-construction operators past this count make the stream
/// unrecoverably malformed.
const MAX_INVALID_PATH_OPS: usize = 20;

/// Operand buffers past this size are damage, not data.
const MAX_ARGS: usize = 33;

pub type RawArgs = SmallVec<[Object; 8]>;

/// One well-formed operation pulled from the stream.
#[derive(Debug)]
pub struct Operation {
    pub op: OpCode,
    pub info: OpInfo,
    pub args: RawArgs,
}

/// Wraps the lexer; repairs operand arities with a carry-over buffer and
/// folds `q`/`Q`/`cm` into the state manager as they pass through.
pub struct Preprocessor<'a> {
    lexer: Lexer<'a>,
    /// Excess operands from preceding malformed operators, available to
    /// patch up later ones that come short.
    non_processed: Vec<Object>,
    invalid_path_ops: usize,
}

impl<'a> Preprocessor<'a> {
    pub fn new(data: &'a [u8], store: Arc<Store>) -> Self {
        Self {
            lexer: Lexer::new(data, store),
            non_processed: Vec::new(),
            invalid_path_ops: 0,
        }
    }

    /// The next well-formed operation, or `None` at end of stream.
    pub fn read(&mut self, state: &mut StateManager) -> Result<Option<Operation>, EvalError> {
        let mut args: RawArgs = SmallVec::new();

        loop {
            match self.lexer.next_obj() {
                Token::Eof => return Ok(None),
                Token::Obj(obj) => {
                    if args.len() < MAX_ARGS {
                        args.push(obj);
                    } else {
                        warn!("dropping operand beyond the sanity bound");
                    }
                }
                Token::Operator(mnemonic) => {
                    let Some(info) = ops::lookup(&mnemonic) else {
                        warn!("unknown operator `{mnemonic}`, skipping");
                        args.clear();
                        continue;
                    };

                    if !info.variable {
                        // Shuffle operands through the carry-over buffer
                        // until the arity matches.
                        while args.len() > info.num_args {
                            self.non_processed.push(args.remove(0));
                        }

                        while args.len() < info.num_args {
                            let Some(carried) = self.non_processed.pop() else {
                                break;
                            };

                            args.insert(0, carried);
                        }

                        if args.len() < info.num_args {
                            if info.op.is_path_op() {
                                self.invalid_path_ops += 1;

                                if self.invalid_path_ops > MAX_INVALID_PATH_OPS {
                                    return Err(EvalError::format(format!(
                                        "too many malformed path operators (last: `{mnemonic}`)"
                                    )));
                                }
                            }

                            warn!(
                                "skipping `{mnemonic}`: expected {} operands, found {}",
                                info.num_args,
                                args.len()
                            );
                            args.clear();
                            continue;
                        }
                    }

                    self.apply_state_side_effects(info.op, &args, state);

                    return Ok(Some(Operation {
                        op: info.op,
                        info,
                        args,
                    }));
                }
            }
        }
    }

    /// Raw bytes of an inline image, after its `ID` operator.
    pub fn inline_image_bytes(&mut self) -> Option<&'a [u8]> {
        self.lexer.inline_image_bytes()
    }

    fn apply_state_side_effects(&self, op: OpCode, args: &RawArgs, state: &mut StateManager) {
        match op {
            OpCode::Save => state.save(),
            OpCode::Restore => state.restore(),
            OpCode::Transform => {
                if let Some(m) = affine_from_args(args) {
                    state.transform(m);
                }
            }
            _ => {}
        }
    }
}

/// Interpret six numeric operands as a transformation matrix.
pub fn affine_from_args(args: &[Object]) -> Option<Affine> {
    if args.len() != 6 {
        return None;
    }

    let mut m = [0.0f64; 6];

    for (slot, obj) in m.iter_mut().zip(args) {
        let Object::Number(n) = obj else {
            return None;
        };

        *slot = n.as_f64();
    }

    Some(Affine::new(m))
}

/// Numeric operand helper for evaluator dispatch.
pub fn num(args: &[Object], i: usize) -> f64 {
    args.get(i)
        .and_then(|o| match o {
            Object::Number(n) => Some(n.as_f64()),
            _ => None,
        })
        .unwrap_or_default()
}

pub fn int(args: &[Object], i: usize) -> i64 {
    args.get(i)
        .and_then(|o| match o {
            Object::Number(Number::Int(v)) => Some(*v),
            Object::Number(Number::Real(v)) => Some(*v as i64),
            _ => None,
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_all(data: &[u8]) -> Vec<Operation> {
        let mut pre = Preprocessor::new(data, Arc::new(Store::new()));
        let mut state = StateManager::default();
        let mut out = Vec::new();

        while let Some(op) = pre.read(&mut state).unwrap() {
            out.push(op);
        }

        out
    }

    #[test]
    fn well_formed_stream() {
        let ops = read_all(b"q 1 0 0 1 10 20 cm 0.5 w Q");

        let codes: Vec<_> = ops.iter().map(|o| o.op).collect();
        assert_eq!(
            codes,
            vec![
                OpCode::Save,
                OpCode::Transform,
                OpCode::SetLineWidth,
                OpCode::Restore
            ]
        );
    }

    #[test]
    fn cm_folds_into_state() {
        let mut pre = Preprocessor::new(b"q 2 0 0 2 0 0 cm", Arc::new(Store::new()));
        let mut state = StateManager::default();

        while pre.read(&mut state).unwrap().is_some() {}

        assert_eq!(state.saved_states_depth(), 1);
        let p = state.state().ctm * kurbo::Point::new(1.0, 1.0);
        assert_eq!(p, kurbo::Point::new(2.0, 2.0));
    }

    #[test]
    fn excess_operands_repair_following_short_operator() {
        // `w` takes one operand but gets three; the extras carry over and
        // complete the operand-less `m` that follows.
        let ops = read_all(b"1 2 3 w 4 m");

        assert_eq!(ops[0].op, OpCode::SetLineWidth);
        assert_eq!(ops[0].args.len(), 1);
        assert_eq!(ops[1].op, OpCode::MoveTo);
        assert_eq!(ops[1].args.len(), 2);
        assert_eq!(num(&ops[1].args, 0), 2.0);
        assert_eq!(num(&ops[1].args, 1), 4.0);
    }

    #[test]
    fn short_non_path_operator_is_skipped() {
        let ops = read_all(b"1 2 c 3 4 m");

        // `c` needs six operands and is dropped; `m` still comes through.
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].op, OpCode::MoveTo);
    }

    #[test]
    fn unknown_operator_skipped() {
        let ops = read_all(b"1 2 xyzzy 3 w");

        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].op, OpCode::SetLineWidth);
        assert_eq!(num(&ops[0].args, 0), 3.0);
    }

    #[test]
    fn repeated_malformed_path_ops_are_fatal() {
        let mut stream = Vec::new();

        for _ in 0..30 {
            stream.extend_from_slice(b"1 m ");
        }

        let mut pre = Preprocessor::new(&stream, Arc::new(Store::new()));
        let mut state = StateManager::default();
        let mut err = None;

        loop {
            match pre.read(&mut state) {
                Ok(Some(_)) => {}
                Ok(None) => break,
                Err(e) => {
                    err = Some(e);
                    break;
                }
            }
        }

        assert!(matches!(err, Some(EvalError::Format(_))));
    }
}
