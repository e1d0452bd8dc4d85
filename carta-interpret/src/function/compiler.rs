//! Ahead-of-time compilation of calculator programs.
//!
//! Programs made of straight-line arithmetic compile into expression trees
//! evaluated without a stack machine. The one conditional form that occurs
//! in real transfer and tint functions, the clamp idiom
//! `dup c gt { pop c } if`, is folded into min/max nodes. Anything outside
//! this subset stays on the interpreted VM.

use super::Values;
use super::type4::PsOp;
use std::rc::Rc;

#[derive(Debug, PartialEq)]
enum Expr {
    Const(f32),
    Input(usize),
    Add(Rc<Expr>, Rc<Expr>),
    Sub(Rc<Expr>, Rc<Expr>),
    Mul(Rc<Expr>, Rc<Expr>),
    Div(Rc<Expr>, Rc<Expr>),
    Neg(Rc<Expr>),
    Abs(Rc<Expr>),
    Sqrt(Rc<Expr>),
    Min(Rc<Expr>, f32),
    Max(Rc<Expr>, f32),
}

impl Expr {
    fn eval(&self, inputs: &[f32]) -> f32 {
        match self {
            Expr::Const(v) => *v,
            Expr::Input(i) => inputs.get(*i).copied().unwrap_or(0.0),
            Expr::Add(a, b) => a.eval(inputs) + b.eval(inputs),
            Expr::Sub(a, b) => a.eval(inputs) - b.eval(inputs),
            Expr::Mul(a, b) => a.eval(inputs) * b.eval(inputs),
            Expr::Div(a, b) => a.eval(inputs) / b.eval(inputs),
            Expr::Neg(a) => -a.eval(inputs),
            Expr::Abs(a) => a.eval(inputs).abs(),
            Expr::Sqrt(a) => a.eval(inputs).sqrt(),
            Expr::Min(a, c) => a.eval(inputs).min(*c),
            Expr::Max(a, c) => a.eval(inputs).max(*c),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum CmpOp {
    Gt,
    Ge,
    Lt,
    Le,
}

/// Symbolic stack slots during compilation. Comparisons only exist as the
/// immediate guard of a clamp `if`.
enum Slot {
    Value(Rc<Expr>),
    Cmp(CmpOp, Rc<Expr>, f32),
}

#[derive(Debug)]
pub(crate) struct Compiled {
    outputs: Vec<Rc<Expr>>,
}

impl Compiled {
    /// Try to compile. Returns `None` when the program uses anything
    /// outside the supported subset.
    pub(crate) fn try_compile(
        program: &[PsOp],
        num_inputs: usize,
        num_outputs: usize,
    ) -> Option<Self> {
        let mut stack: Vec<Slot> = (0..num_inputs)
            .map(|i| Slot::Value(Rc::new(Expr::Input(i))))
            .collect();

        compile_ops(program, &mut stack)?;

        if stack.len() < num_outputs {
            return None;
        }

        let outputs = stack
            .drain(stack.len() - num_outputs..)
            .map(|slot| match slot {
                Slot::Value(e) => Some(e),
                Slot::Cmp(..) => None,
            })
            .collect::<Option<Vec<_>>>()?;

        Some(Self { outputs })
    }

    pub(crate) fn eval(&self, inputs: &[f32]) -> Values {
        self.outputs.iter().map(|e| e.eval(inputs)).collect()
    }
}

fn pop_value(stack: &mut Vec<Slot>) -> Option<Rc<Expr>> {
    match stack.pop()? {
        Slot::Value(e) => Some(e),
        Slot::Cmp(..) => None,
    }
}

fn compile_ops(ops: &[PsOp], stack: &mut Vec<Slot>) -> Option<()> {
    for op in ops {
        match op {
            PsOp::Num(v) => stack.push(Slot::Value(Rc::new(Expr::Const(*v)))),
            PsOp::Add => {
                let b = pop_value(stack)?;
                let a = pop_value(stack)?;
                stack.push(Slot::Value(Rc::new(Expr::Add(a, b))));
            }
            PsOp::Sub => {
                let b = pop_value(stack)?;
                let a = pop_value(stack)?;
                stack.push(Slot::Value(Rc::new(Expr::Sub(a, b))));
            }
            PsOp::Mul => {
                let b = pop_value(stack)?;
                let a = pop_value(stack)?;
                stack.push(Slot::Value(Rc::new(Expr::Mul(a, b))));
            }
            PsOp::Div => {
                let b = pop_value(stack)?;
                let a = pop_value(stack)?;
                stack.push(Slot::Value(Rc::new(Expr::Div(a, b))));
            }
            PsOp::Neg => {
                let a = pop_value(stack)?;
                stack.push(Slot::Value(Rc::new(Expr::Neg(a))));
            }
            PsOp::Abs => {
                let a = pop_value(stack)?;
                stack.push(Slot::Value(Rc::new(Expr::Abs(a))));
            }
            PsOp::Sqrt => {
                let a = pop_value(stack)?;
                stack.push(Slot::Value(Rc::new(Expr::Sqrt(a))));
            }
            // cvr is the identity on an all-real stack.
            PsOp::Cvr => {}
            PsOp::Dup => {
                let top = match stack.last()? {
                    Slot::Value(e) => e.clone(),
                    Slot::Cmp(..) => return None,
                };
                stack.push(Slot::Value(top));
            }
            PsOp::Exch => {
                let b = pop_value(stack)?;
                let a = pop_value(stack)?;
                stack.push(Slot::Value(b));
                stack.push(Slot::Value(a));
            }
            PsOp::Pop => {
                pop_value(stack)?;
            }
            PsOp::Index => {
                let n = match pop_value(stack)?.as_ref() {
                    Expr::Const(v) => (*v).max(0.0) as usize,
                    _ => return None,
                };
                let slot = stack.len().checked_sub(1 + n)?;
                let e = match &stack[slot] {
                    Slot::Value(e) => e.clone(),
                    Slot::Cmp(..) => return None,
                };
                stack.push(Slot::Value(e));
            }
            PsOp::Gt | PsOp::Ge | PsOp::Lt | PsOp::Le => {
                let rhs = match pop_value(stack)?.as_ref() {
                    Expr::Const(v) => *v,
                    _ => return None,
                };
                let lhs = pop_value(stack)?;
                let cmp = match op {
                    PsOp::Gt => CmpOp::Gt,
                    PsOp::Ge => CmpOp::Ge,
                    PsOp::Lt => CmpOp::Lt,
                    _ => CmpOp::Le,
                };
                stack.push(Slot::Cmp(cmp, lhs, rhs));
            }
            PsOp::If(body) => {
                // Clamp idiom only: `dup c gt { pop k } if` with k == c.
                let Some(Slot::Cmp(cmp, lhs, bound)) = stack.pop() else {
                    return None;
                };

                let [PsOp::Pop, PsOp::Num(replacement)] = body.as_slice() else {
                    return None;
                };

                if *replacement != bound {
                    return None;
                }

                // The guarded value must be the dup of the comparison
                // operand.
                let dup = pop_value(stack)?;

                if !Rc::ptr_eq(&dup, &lhs) {
                    return None;
                }

                let folded = match cmp {
                    CmpOp::Gt | CmpOp::Ge => Expr::Min(lhs, bound),
                    CmpOp::Lt | CmpOp::Le => Expr::Max(lhs, bound),
                };

                stack.push(Slot::Value(Rc::new(folded)));
            }
            _ => return None,
        }
    }

    Some(())
}

#[cfg(test)]
mod tests {
    use super::super::type4::tests::function;

    #[test]
    fn straight_line_arithmetic_compiles() {
        let f = function("{ dup mul 0.5 add }", 1, 1, true);

        assert!(f.is_compiled());
        assert_eq!(f.eval(&[2.0]).unwrap()[0], 4.5);
    }

    #[test]
    fn clamp_idiom_compiles_to_min_max() {
        let upper = function("{ dup 10 gt { pop 10 } if }", 1, 1, true);
        assert!(upper.is_compiled());
        assert_eq!(upper.eval(&[40.0]).unwrap()[0], 10.0);
        assert_eq!(upper.eval(&[4.0]).unwrap()[0], 4.0);

        let lower = function("{ dup 0 lt { pop 0 } if }", 1, 1, true);
        assert!(lower.is_compiled());
        assert_eq!(lower.eval(&[-3.0]).unwrap()[0], 0.0);
        assert_eq!(lower.eval(&[3.0]).unwrap()[0], 3.0);
    }

    #[test]
    fn general_conditionals_stay_on_the_vm() {
        let f = function("{ 0 lt { 1 } { 2 } ifelse }", 1, 1, true);

        assert!(!f.is_compiled());
        assert_eq!(f.eval(&[-1.0]).unwrap()[0], 1.0);
    }

    #[test]
    fn mismatched_clamp_replacement_bails() {
        // `pop 9` after comparing against 10 is not a clamp.
        let f = function("{ dup 10 gt { pop 9 } if }", 1, 1, true);

        assert!(!f.is_compiled());
        assert_eq!(f.eval(&[40.0]).unwrap()[0], 9.0);
    }

    #[test]
    fn compiled_matches_vm_over_a_corpus() {
        let programs = [
            "{ dup mul }",
            "{ 1 exch sub }",
            "{ dup 0.8 gt { pop 0.8 } if 1.25 mul }",
            "{ dup 0.2 lt { pop 0.2 } if sqrt }",
            "{ neg abs 2 div 3 add }",
            "{ dup dup mul mul }",
        ];

        for src in programs {
            let f = function(src, 1, 1, true);
            assert!(f.is_compiled(), "{src} should compile");

            for i in 0..=20 {
                let x = -1.0 + i as f32 * 0.1;
                let compiled = f.eval(&[x]).unwrap();
                let vm = f.eval_vm(&[x]).unwrap();

                assert!(
                    (compiled[0] - vm[0]).abs() < 1e-5
                        || (compiled[0].is_nan() && vm[0].is_nan()),
                    "{src} diverges at {x}: compiled {} vm {}",
                    compiled[0],
                    vm[0],
                );
            }
        }
    }
}
