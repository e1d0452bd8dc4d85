//! PDF function objects: sampled, exponential, stitching and PostScript
//! calculator functions, reduced to one contract of domain-clamped inputs
//! to range-clamped outputs.

use crate::error::EvalError;
use crate::operator_list::Operand;
use crate::util::OptionLog;
use carta_syntax::{Array, Dict, Object};
use smallvec::SmallVec;

mod compiler;
mod type0;
mod type2;
mod type3;
mod type4;

pub use type0::SampledFunction;
pub use type2::ExponentialFunction;
pub use type3::StitchingFunction;
pub use type4::PostScriptFunction;

pub type Values = SmallVec<[f32; 4]>;

/// Pairs of (min, max) used for domain and range clamping.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Clamper(pub Vec<(f32, f32)>);

impl Clamper {
    pub fn from_array(arr: &Array) -> Option<Self> {
        let nums: Vec<f32> = arr.iter::<f32>().collect();

        if nums.len() % 2 != 0 || nums.is_empty() {
            return None;
        }

        Some(Self(nums.chunks_exact(2).map(|c| (c[0], c[1])).collect()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn clamp(&self, i: usize, v: f32) -> f32 {
        match self.0.get(i) {
            Some((lo, hi)) => v.clamp(*lo, *hi),
            None => v,
        }
    }

    pub fn clamp_all(&self, values: &mut [f32]) {
        for (i, v) in values.iter_mut().enumerate() {
            *v = self.clamp(i, *v);
        }
    }

    fn flatten(&self) -> impl Iterator<Item = f32> {
        self.0.iter().flat_map(|(lo, hi)| [*lo, *hi])
    }

    fn from_flat(values: &[f64]) -> Self {
        Self(
            values
                .chunks_exact(2)
                .map(|c| (c[0] as f32, c[1] as f32))
                .collect(),
        )
    }
}

/// Linear interpolation of `x` from `[xmin, xmax]` into `[ymin, ymax]`.
pub(crate) fn interpolate(x: f32, xmin: f32, xmax: f32, ymin: f32, ymax: f32) -> f32 {
    if xmax == xmin {
        return ymin;
    }

    ymin + (x - xmin) * (ymax - ymin) / (xmax - xmin)
}

/// A parsed PDF function.
#[derive(Debug)]
pub enum Function {
    Sampled(SampledFunction),
    Exponential(ExponentialFunction),
    Stitching(StitchingFunction),
    PostScript(PostScriptFunction),
}

impl Function {
    /// Parse a function object (a dict or a stream, depending on the type).
    pub fn parse(obj: &Object) -> Option<Self> {
        let dict = match obj {
            Object::Stream(s) => s.dict().clone(),
            Object::Dict(d) => d.clone(),
            _ => return None,
        };

        let ty = dict
            .get::<i64>("FunctionType")
            .warn_none("function without a FunctionType")?;

        match ty {
            0 => {
                let Object::Stream(stream) = obj else {
                    return None;
                };

                SampledFunction::parse(stream).map(Function::Sampled)
            }
            2 => ExponentialFunction::parse(&dict).map(Function::Exponential),
            3 => StitchingFunction::parse(&dict).map(Function::Stitching),
            4 => {
                let Object::Stream(stream) = obj else {
                    return None;
                };

                PostScriptFunction::parse(stream, true).map(Function::PostScript)
            }
            other => {
                log::warn!("unknown function type {other}");

                None
            }
        }
    }

    pub fn num_inputs(&self) -> usize {
        match self {
            Function::Sampled(f) => f.domain.len(),
            Function::Exponential(f) => f.domain.len(),
            Function::Stitching(f) => f.domain.len(),
            Function::PostScript(f) => f.domain.len(),
        }
    }

    pub fn num_outputs(&self) -> usize {
        match self {
            Function::Sampled(f) => f.num_outputs(),
            Function::Exponential(f) => f.num_outputs(),
            Function::Stitching(f) => f.num_outputs(),
            Function::PostScript(f) => f.num_outputs(),
        }
    }

    /// Evaluate with domain clamping applied to the inputs and range
    /// clamping to the outputs.
    pub fn eval(&self, inputs: &[f32]) -> Result<Values, EvalError> {
        match self {
            Function::Sampled(f) => Ok(f.eval(inputs)),
            Function::Exponential(f) => Ok(f.eval(inputs)),
            Function::Stitching(f) => f.eval(inputs),
            Function::PostScript(f) => f.eval(inputs),
        }
    }

    /// The positional-array encoding that crosses the operator-list
    /// boundary.
    pub fn to_ir(&self) -> Operand {
        match self {
            Function::Sampled(f) => f.to_ir(),
            Function::Exponential(f) => f.to_ir(),
            Function::Stitching(f) => f.to_ir(),
            Function::PostScript(f) => f.to_ir(),
        }
    }

    /// Reconstruct a function from its IR form.
    pub fn from_ir(ir: &Operand) -> Option<Self> {
        let Operand::Array(items) = ir else {
            return None;
        };

        match items.first()?.as_f64()? as i64 {
            0 => SampledFunction::from_ir(items).map(Function::Sampled),
            2 => ExponentialFunction::from_ir(items).map(Function::Exponential),
            3 => StitchingFunction::from_ir(items).map(Function::Stitching),
            4 => PostScriptFunction::from_ir(items).map(Function::PostScript),
            _ => None,
        }
    }
}

/// Shared IR helpers.
pub(crate) fn push_flat(out: &mut Vec<Operand>, clamper: &Clamper) {
    out.push(Operand::Num(clamper.len() as f64));

    for v in clamper.flatten() {
        out.push(Operand::Num(v as f64));
    }
}

/// Read a counted flat (min, max) list starting at `*at`, advancing it.
pub(crate) fn read_flat(items: &[Operand], at: &mut usize) -> Option<Clamper> {
    let count = items.get(*at)?.as_f64()? as usize;
    *at += 1;

    let mut flat = Vec::with_capacity(count * 2);

    for _ in 0..count * 2 {
        flat.push(items.get(*at)?.as_f64()?);
        *at += 1;
    }

    Some(Clamper::from_flat(&flat))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamper() {
        let c = Clamper(vec![(0.0, 1.0), (-1.0, 1.0)]);

        assert_eq!(c.clamp(0, 2.0), 1.0);
        assert_eq!(c.clamp(0, -0.5), 0.0);
        assert_eq!(c.clamp(1, -2.0), -1.0);
        // Out of declared bounds passes through.
        assert_eq!(c.clamp(5, 7.0), 7.0);
    }

    #[test]
    fn interpolation() {
        assert_eq!(interpolate(5.0, 0.0, 10.0, 0.0, 1.0), 0.5);
        assert_eq!(interpolate(0.0, 0.0, 0.0, 3.0, 9.0), 3.0);
    }
}
