//! PostScript calculator (type 4) functions.
//!
//! The program is parsed into a structured operation tree (procedures
//! instead of jump offsets) and executed on a bounded stack VM. When the
//! program fits the compiler's conservative subset it is compiled once into
//! a straight-line expression form; otherwise the VM runs with a bounded
//! memoization cache, since evaluation is a per-sample hot path.

use super::compiler::Compiled;
use super::{Clamper, Values};
use crate::error::EvalError;
use crate::operator_list::Operand;
use crate::util::OptionLog;
use carta_syntax::{Array, Stream};
use log::warn;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use std::cell::RefCell;

/// Stack capacity mandated for calculator functions. Exceeding it is fatal
/// content corruption.
pub(crate) const STACK_CAPACITY: usize = 100;

/// The memo cache stops growing at this size and never evicts.
const MAX_CACHE_SIZE: usize = 8192;

/// One structured operation of a calculator program.
#[derive(Debug, Clone, PartialEq)]
pub enum PsOp {
    Num(f32),
    Abs,
    Add,
    Atan,
    Ceiling,
    Cos,
    Cvi,
    Cvr,
    Div,
    Exp,
    Floor,
    Idiv,
    Ln,
    Log,
    Mod,
    Mul,
    Neg,
    Round,
    Sin,
    Sqrt,
    Sub,
    Truncate,
    And,
    Bitshift,
    Eq,
    False,
    Ge,
    Gt,
    Le,
    Lt,
    Ne,
    Not,
    Or,
    True,
    Xor,
    Copy,
    Dup,
    Exch,
    Index,
    Pop,
    Roll,
    If(Vec<PsOp>),
    IfElse(Vec<PsOp>, Vec<PsOp>),
}

#[derive(Debug)]
pub struct PostScriptFunction {
    pub(crate) domain: Clamper,
    range: Clamper,
    program: Vec<PsOp>,
    compiled: Option<Compiled>,
    cache: RefCell<FxHashMap<SmallVec<[u32; 4]>, Values>>,
}

impl PostScriptFunction {
    pub fn parse(stream: &Stream, allow_compile: bool) -> Option<Self> {
        let dict = stream.dict();
        let domain = Clamper::from_array(&dict.get::<Array>("Domain")?)?;
        let range = Clamper::from_array(&dict.get::<Array>("Range")?)?;

        let data = stream.decoded();
        let program = parse_program(&data).warn_none("unparseable calculator program")?;

        Some(Self::new(domain, range, program, allow_compile))
    }

    pub(crate) fn new(
        domain: Clamper,
        range: Clamper,
        program: Vec<PsOp>,
        allow_compile: bool,
    ) -> Self {
        let compiled = if allow_compile {
            Compiled::try_compile(&program, domain.len(), range.len())
        } else {
            None
        };

        Self {
            domain,
            range,
            program,
            compiled,
            cache: RefCell::new(FxHashMap::default()),
        }
    }

    pub fn num_outputs(&self) -> usize {
        self.range.len()
    }

    pub fn is_compiled(&self) -> bool {
        self.compiled.is_some()
    }

    pub fn eval(&self, inputs: &[f32]) -> Result<Values, EvalError> {
        let mut clamped: Values = inputs.iter().copied().collect();
        clamped.resize(self.domain.len(), 0.0);
        self.domain.clamp_all(&mut clamped);

        if let Some(compiled) = &self.compiled {
            let mut out = compiled.eval(&clamped);
            self.range.clamp_all(&mut out);

            return Ok(out);
        }

        let key: SmallVec<[u32; 4]> = clamped.iter().map(|v| v.to_bits()).collect();

        if let Some(hit) = self.cache.borrow().get(&key) {
            return Ok(hit.clone());
        }

        let mut stack = PsStack::new();

        for v in &clamped {
            stack.push(*v)?;
        }

        run(&self.program, &mut stack)?;

        let n = self.range.len();
        let mut out: Values = stack.take_top(n)?;
        self.range.clamp_all(&mut out);

        let mut cache = self.cache.borrow_mut();

        // Deliberately bounded: once full, stop caching rather than evict.
        if cache.len() < MAX_CACHE_SIZE {
            cache.insert(key, out.clone());
        }

        Ok(out)
    }

    /// Run the interpreted VM regardless of compilation, for differential
    /// testing.
    #[cfg(test)]
    pub(crate) fn eval_vm(&self, inputs: &[f32]) -> Result<Values, EvalError> {
        let mut clamped: Values = inputs.iter().copied().collect();
        clamped.resize(self.domain.len(), 0.0);
        self.domain.clamp_all(&mut clamped);

        let mut stack = PsStack::new();

        for v in &clamped {
            stack.push(*v)?;
        }

        run(&self.program, &mut stack)?;

        let mut out: Values = stack.take_top(self.range.len())?;
        self.range.clamp_all(&mut out);

        Ok(out)
    }

    pub fn to_ir(&self) -> Operand {
        let mut items = vec![Operand::Num(4.0)];

        super::push_flat(&mut items, &self.domain);
        super::push_flat(&mut items, &self.range);
        items.push(ops_to_ir(&self.program));

        Operand::Array(items)
    }

    pub fn from_ir(items: &[Operand]) -> Option<Self> {
        let mut at = 1usize;
        let domain = super::read_flat(items, &mut at)?;
        let range = super::read_flat(items, &mut at)?;
        let program = ops_from_ir(items.get(at)?)?;

        Some(Self::new(domain, range, program, true))
    }
}

fn ops_to_ir(ops: &[PsOp]) -> Operand {
    let items = ops
        .iter()
        .map(|op| match op {
            PsOp::Num(v) => Operand::Num(*v as f64),
            PsOp::If(body) => Operand::Array(vec![Operand::Str("if".into()), ops_to_ir(body)]),
            PsOp::IfElse(then, otherwise) => Operand::Array(vec![
                Operand::Str("ifelse".into()),
                ops_to_ir(then),
                ops_to_ir(otherwise),
            ]),
            other => Operand::Str(mnemonic(other).into()),
        })
        .collect();

    Operand::Array(items)
}

fn ops_from_ir(ir: &Operand) -> Option<Vec<PsOp>> {
    let Operand::Array(items) = ir else {
        return None;
    };

    let mut out = Vec::with_capacity(items.len());

    for item in items {
        out.push(match item {
            Operand::Num(v) => PsOp::Num(*v as f32),
            Operand::Str(s) => op_for(s)?,
            Operand::Array(parts) => match parts.first()?.as_str()? {
                "if" => PsOp::If(ops_from_ir(parts.get(1)?)?),
                "ifelse" => PsOp::IfElse(ops_from_ir(parts.get(1)?)?, ops_from_ir(parts.get(2)?)?),
                _ => return None,
            },
            _ => return None,
        });
    }

    Some(out)
}

/// Parse the stream text (`{ ... }` with nested procedures) into ops.
pub(crate) fn parse_program(data: &[u8]) -> Option<Vec<PsOp>> {
    let mut pos = 0usize;

    skip_white(data, &mut pos);

    if data.get(pos) != Some(&b'{') {
        return None;
    }

    pos += 1;
    let block = parse_block(data, &mut pos)?;

    Some(block)
}

fn skip_white(data: &[u8], pos: &mut usize) {
    while let Some(&b) = data.get(*pos) {
        if b.is_ascii_whitespace() {
            *pos += 1;
        } else if b == b'%' {
            while let Some(&b) = data.get(*pos) {
                *pos += 1;

                if b == b'\n' || b == b'\r' {
                    break;
                }
            }
        } else {
            break;
        }
    }
}

/// Parse operations until the closing brace.
fn parse_block(data: &[u8], pos: &mut usize) -> Option<Vec<PsOp>> {
    let mut out = Vec::new();
    // Completed procedures waiting for their `if`/`ifelse`.
    let mut pending: Vec<Vec<PsOp>> = Vec::new();

    loop {
        skip_white(data, pos);

        let b = *data.get(*pos)?;

        match b {
            b'}' => {
                *pos += 1;

                if !pending.is_empty() {
                    warn!("calculator procedure without a matching if/ifelse");
                    return None;
                }

                return Some(out);
            }
            b'{' => {
                *pos += 1;
                pending.push(parse_block(data, pos)?);
            }
            _ => {
                let start = *pos;

                while let Some(&b) = data.get(*pos) {
                    if b.is_ascii_whitespace() || b == b'{' || b == b'}' || b == b'%' {
                        break;
                    }

                    *pos += 1;
                }

                let token = std::str::from_utf8(&data[start..*pos]).ok()?;

                if let Ok(v) = token.parse::<f32>() {
                    out.push(PsOp::Num(v));
                } else if token == "if" {
                    if pending.len() != 1 {
                        return None;
                    }

                    out.push(PsOp::If(pending.pop()?));
                } else if token == "ifelse" {
                    if pending.len() != 2 {
                        return None;
                    }

                    let otherwise = pending.pop()?;
                    let then = pending.pop()?;
                    out.push(PsOp::IfElse(then, otherwise));
                } else {
                    out.push(op_for(token)?);
                }
            }
        }
    }
}

fn op_for(token: &str) -> Option<PsOp> {
    Some(match token {
        "abs" => PsOp::Abs,
        "add" => PsOp::Add,
        "atan" => PsOp::Atan,
        "ceiling" => PsOp::Ceiling,
        "cos" => PsOp::Cos,
        "cvi" => PsOp::Cvi,
        "cvr" => PsOp::Cvr,
        "div" => PsOp::Div,
        "exp" => PsOp::Exp,
        "floor" => PsOp::Floor,
        "idiv" => PsOp::Idiv,
        "ln" => PsOp::Ln,
        "log" => PsOp::Log,
        "mod" => PsOp::Mod,
        "mul" => PsOp::Mul,
        "neg" => PsOp::Neg,
        "round" => PsOp::Round,
        "sin" => PsOp::Sin,
        "sqrt" => PsOp::Sqrt,
        "sub" => PsOp::Sub,
        "truncate" => PsOp::Truncate,
        "and" => PsOp::And,
        "bitshift" => PsOp::Bitshift,
        "eq" => PsOp::Eq,
        "false" => PsOp::False,
        "ge" => PsOp::Ge,
        "gt" => PsOp::Gt,
        "le" => PsOp::Le,
        "lt" => PsOp::Lt,
        "ne" => PsOp::Ne,
        "not" => PsOp::Not,
        "or" => PsOp::Or,
        "true" => PsOp::True,
        "xor" => PsOp::Xor,
        "copy" => PsOp::Copy,
        "dup" => PsOp::Dup,
        "exch" => PsOp::Exch,
        "index" => PsOp::Index,
        "pop" => PsOp::Pop,
        "roll" => PsOp::Roll,
        other => {
            warn!("unknown calculator operator `{other}`");

            return None;
        }
    })
}

fn mnemonic(op: &PsOp) -> &'static str {
    match op {
        PsOp::Abs => "abs",
        PsOp::Add => "add",
        PsOp::Atan => "atan",
        PsOp::Ceiling => "ceiling",
        PsOp::Cos => "cos",
        PsOp::Cvi => "cvi",
        PsOp::Cvr => "cvr",
        PsOp::Div => "div",
        PsOp::Exp => "exp",
        PsOp::Floor => "floor",
        PsOp::Idiv => "idiv",
        PsOp::Ln => "ln",
        PsOp::Log => "log",
        PsOp::Mod => "mod",
        PsOp::Mul => "mul",
        PsOp::Neg => "neg",
        PsOp::Round => "round",
        PsOp::Sin => "sin",
        PsOp::Sqrt => "sqrt",
        PsOp::Sub => "sub",
        PsOp::Truncate => "truncate",
        PsOp::And => "and",
        PsOp::Bitshift => "bitshift",
        PsOp::Eq => "eq",
        PsOp::False => "false",
        PsOp::Ge => "ge",
        PsOp::Gt => "gt",
        PsOp::Le => "le",
        PsOp::Lt => "lt",
        PsOp::Ne => "ne",
        PsOp::Not => "not",
        PsOp::Or => "or",
        PsOp::True => "true",
        PsOp::Xor => "xor",
        PsOp::Copy => "copy",
        PsOp::Dup => "dup",
        PsOp::Exch => "exch",
        PsOp::Index => "index",
        PsOp::Pop => "pop",
        PsOp::Roll => "roll",
        PsOp::Num(_) | PsOp::If(_) | PsOp::IfElse(..) => unreachable!(),
    }
}

/// The VM stack. Overflow and underflow are terminal errors.
pub(crate) struct PsStack {
    values: SmallVec<[f32; 16]>,
}

impl PsStack {
    pub(crate) fn new() -> Self {
        Self {
            values: SmallVec::new(),
        }
    }

    fn overflow() -> EvalError {
        EvalError::format("calculator stack overflow")
    }

    fn underflow() -> EvalError {
        EvalError::format("calculator stack underflow")
    }

    pub(crate) fn push(&mut self, v: f32) -> Result<(), EvalError> {
        if self.values.len() >= STACK_CAPACITY {
            return Err(Self::overflow());
        }

        self.values.push(v);

        Ok(())
    }

    fn pop(&mut self) -> Result<f32, EvalError> {
        self.values.pop().ok_or_else(Self::underflow)
    }

    fn pop2(&mut self) -> Result<(f32, f32), EvalError> {
        let b = self.pop()?;
        let a = self.pop()?;

        Ok((a, b))
    }

    fn take_top(&mut self, n: usize) -> Result<Values, EvalError> {
        if self.values.len() < n {
            return Err(Self::underflow());
        }

        Ok(self.values.drain(self.values.len() - n..).collect())
    }

    fn copy(&mut self, n: usize) -> Result<(), EvalError> {
        let len = self.values.len();

        if n > len {
            return Err(Self::underflow());
        }

        if len + n > STACK_CAPACITY {
            return Err(Self::overflow());
        }

        for i in len - n..len {
            self.values.push(self.values[i]);
        }

        Ok(())
    }

    fn index(&mut self, n: usize) -> Result<(), EvalError> {
        let len = self.values.len();

        if n >= len {
            return Err(Self::underflow());
        }

        self.push(self.values[len - 1 - n])
    }

    fn roll(&mut self, n: usize, j: i64) -> Result<(), EvalError> {
        let len = self.values.len();

        if n > len {
            return Err(Self::underflow());
        }

        if n == 0 {
            return Ok(());
        }

        let window = &mut self.values[len - n..];
        let shift = j.rem_euclid(n as i64) as usize;
        window.rotate_right(shift);

        Ok(())
    }
}

fn bool_f(v: bool) -> f32 {
    if v { 1.0 } else { 0.0 }
}

/// Execute a structured program against the stack.
pub(crate) fn run(program: &[PsOp], stack: &mut PsStack) -> Result<(), EvalError> {
    for op in program {
        match op {
            PsOp::Num(v) => stack.push(*v)?,
            PsOp::Abs => {
                let a = stack.pop()?;
                stack.push(a.abs())?;
            }
            PsOp::Add => {
                let (a, b) = stack.pop2()?;
                stack.push(a + b)?;
            }
            PsOp::Atan => {
                let (num, den) = stack.pop2()?;
                let mut deg = num.atan2(den).to_degrees();

                if deg < 0.0 {
                    deg += 360.0;
                }

                stack.push(deg)?;
            }
            PsOp::Ceiling => {
                let a = stack.pop()?;
                stack.push(a.ceil())?;
            }
            PsOp::Cos => {
                let a = stack.pop()?;
                stack.push(a.to_radians().cos())?;
            }
            PsOp::Cvi | PsOp::Truncate => {
                let a = stack.pop()?;
                stack.push(a.trunc())?;
            }
            PsOp::Cvr => {}
            PsOp::Div => {
                let (a, b) = stack.pop2()?;
                stack.push(a / b)?;
            }
            PsOp::Exp => {
                let (a, b) = stack.pop2()?;
                stack.push(a.powf(b))?;
            }
            PsOp::Floor => {
                let a = stack.pop()?;
                stack.push(a.floor())?;
            }
            PsOp::Idiv => {
                let (a, b) = stack.pop2()?;
                stack.push((a as i32).checked_div(b as i32).unwrap_or(0) as f32)?;
            }
            PsOp::Ln => {
                let a = stack.pop()?;
                stack.push(a.ln())?;
            }
            PsOp::Log => {
                let a = stack.pop()?;
                stack.push(a.log10())?;
            }
            PsOp::Mod => {
                let (a, b) = stack.pop2()?;
                stack.push((a as i32).checked_rem(b as i32).unwrap_or(0) as f32)?;
            }
            PsOp::Mul => {
                let (a, b) = stack.pop2()?;
                stack.push(a * b)?;
            }
            PsOp::Neg => {
                let a = stack.pop()?;
                stack.push(-a)?;
            }
            PsOp::Round => {
                let a = stack.pop()?;
                stack.push(a.round())?;
            }
            PsOp::Sin => {
                let a = stack.pop()?;
                stack.push(a.to_radians().sin())?;
            }
            PsOp::Sqrt => {
                let a = stack.pop()?;
                stack.push(a.sqrt())?;
            }
            PsOp::Sub => {
                let (a, b) = stack.pop2()?;
                stack.push(a - b)?;
            }
            PsOp::And => {
                let (a, b) = stack.pop2()?;
                stack.push((a as i32 & b as i32) as f32)?;
            }
            PsOp::Or => {
                let (a, b) = stack.pop2()?;
                stack.push((a as i32 | b as i32) as f32)?;
            }
            PsOp::Xor => {
                let (a, b) = stack.pop2()?;
                stack.push((a as i32 ^ b as i32) as f32)?;
            }
            PsOp::Not => {
                let a = stack.pop()?;
                // Logical on booleans, bitwise complement otherwise.
                let v = if a == 0.0 || a == 1.0 {
                    bool_f(a == 0.0)
                } else {
                    !(a as i32) as f32
                };
                stack.push(v)?;
            }
            PsOp::Bitshift => {
                let (a, shift) = stack.pop2()?;
                let a = a as i32;
                let v = if shift >= 0.0 {
                    a.wrapping_shl(shift as u32)
                } else {
                    a.wrapping_shr(-shift as u32)
                };
                stack.push(v as f32)?;
            }
            PsOp::Eq => {
                let (a, b) = stack.pop2()?;
                stack.push(bool_f(a == b))?;
            }
            PsOp::Ne => {
                let (a, b) = stack.pop2()?;
                stack.push(bool_f(a != b))?;
            }
            PsOp::Gt => {
                let (a, b) = stack.pop2()?;
                stack.push(bool_f(a > b))?;
            }
            PsOp::Ge => {
                let (a, b) = stack.pop2()?;
                stack.push(bool_f(a >= b))?;
            }
            PsOp::Lt => {
                let (a, b) = stack.pop2()?;
                stack.push(bool_f(a < b))?;
            }
            PsOp::Le => {
                let (a, b) = stack.pop2()?;
                stack.push(bool_f(a <= b))?;
            }
            PsOp::True => stack.push(1.0)?,
            PsOp::False => stack.push(0.0)?,
            PsOp::Copy => {
                let n = stack.pop()?;
                stack.copy(n.max(0.0) as usize)?;
            }
            PsOp::Dup => {
                stack.index(0)?;
            }
            PsOp::Exch => {
                let (a, b) = stack.pop2()?;
                stack.push(b)?;
                stack.push(a)?;
            }
            PsOp::Index => {
                let n = stack.pop()?;
                stack.index(n.max(0.0) as usize)?;
            }
            PsOp::Pop => {
                stack.pop()?;
            }
            PsOp::Roll => {
                let j = stack.pop()?;
                let n = stack.pop()?;
                stack.roll(n.max(0.0) as usize, j as i64)?;
            }
            PsOp::If(body) => {
                if stack.pop()? != 0.0 {
                    run(body, stack)?;
                }
            }
            PsOp::IfElse(then, otherwise) => {
                if stack.pop()? != 0.0 {
                    run(then, stack)?;
                } else {
                    run(otherwise, stack)?;
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn function(src: &str, m: usize, n: usize, compile: bool) -> PostScriptFunction {
        let program = parse_program(src.as_bytes()).unwrap();
        let domain = Clamper(vec![(-100.0, 100.0); m]);
        let range = Clamper(vec![(-100.0, 100.0); n]);

        PostScriptFunction::new(domain, range, program, compile)
    }

    fn eval1(src: &str, inputs: &[f32]) -> f32 {
        function(src, inputs.len(), 1, false).eval(inputs).unwrap()[0]
    }

    #[test]
    fn arithmetic() {
        assert_eq!(eval1("{ 2 add }", &[3.0]), 5.0);
        assert_eq!(eval1("{ 3 sub }", &[10.0]), 7.0);
        assert_eq!(eval1("{ dup mul }", &[4.0]), 16.0);
        assert_eq!(eval1("{ 2 div }", &[9.0]), 4.5);
        assert_eq!(eval1("{ neg abs }", &[-3.0]), 3.0);
        assert_eq!(eval1("{ pop 7 3 idiv }", &[0.0]), 2.0);
        assert_eq!(eval1("{ pop 7 3 mod }", &[0.0]), 1.0);
    }

    #[test]
    fn stack_manipulation() {
        // exch leaves 1 2 -> 2 1; sub gives 1.
        assert_eq!(eval1("{ exch sub }", &[1.0, 2.0]), 1.0);
        // 3-element right roll by one: 1 2 3 -> 3 1 2; drop the top two.
        assert_eq!(eval1("{ 3 1 roll pop pop }", &[1.0, 2.0, 3.0]), 3.0);
        assert_eq!(eval1("{ 1 index add }", &[5.0, 7.0]), 12.0);
        assert_eq!(eval1("{ 2 copy add add add }", &[1.0, 2.0]), 6.0);
    }

    #[test]
    fn conditionals() {
        let clamp = "{ dup 10 gt { pop 10 } if }";

        assert_eq!(eval1(clamp, &[4.0]), 4.0);
        assert_eq!(eval1(clamp, &[40.0]), 10.0);

        let sel = "{ 0 lt { 1 } { 2 } ifelse }";
        assert_eq!(eval1(sel, &[-3.0]), 1.0);
        assert_eq!(eval1(sel, &[3.0]), 2.0);
    }

    #[test]
    fn comparison_and_logic() {
        assert_eq!(eval1("{ 3 ge { 1 } { 0 } ifelse }", &[3.0]), 1.0);
        assert_eq!(eval1("{ 5 eq not { 1 } { 0 } ifelse }", &[4.0]), 1.0);
        assert_eq!(eval1("{ 12 and }", &[10.0]), 8.0);
        assert_eq!(eval1("{ 1 bitshift }", &[3.0]), 6.0);
    }

    #[test]
    fn stack_overflow_is_fatal() {
        let mut src = String::from("{");

        for _ in 0..STACK_CAPACITY + 1 {
            src.push_str(" 1");
        }

        src.push_str(" }");

        let f = function(&src, 0, 1, false);
        assert!(matches!(f.eval(&[]), Err(EvalError::Format(_))));
    }

    #[test]
    fn underflow_is_fatal() {
        let f = function("{ add }", 1, 1, false);
        assert!(matches!(f.eval(&[1.0]), Err(EvalError::Format(_))));
    }

    #[test]
    fn memoization_returns_same_values() {
        let f = function("{ dup mul }", 1, 1, false);

        let a = f.eval(&[3.0]).unwrap();
        let b = f.eval(&[3.0]).unwrap();
        assert_eq!(a, b);
        assert_eq!(a[0], 9.0);
    }

    #[test]
    fn ir_round_trip_preserves_behavior() {
        let f = function("{ dup 0 lt { pop 0 } if 2 mul }", 1, 1, false);
        let Operand::Array(items) = f.to_ir() else {
            panic!("expected array IR");
        };
        let back = PostScriptFunction::from_ir(&items).unwrap();

        assert_eq!(back.eval(&[-5.0]).unwrap()[0], 0.0);
        assert_eq!(back.eval(&[5.0]).unwrap()[0], 10.0);
    }

    #[test]
    fn range_clamps_output() {
        let program = parse_program(b"{ 1000 mul }").unwrap();
        let f = PostScriptFunction::new(
            Clamper(vec![(0.0, 1.0)]),
            Clamper(vec![(0.0, 1.0)]),
            program,
            false,
        );

        assert_eq!(f.eval(&[1.0]).unwrap()[0], 1.0);
    }
}
