//! Exponential interpolation (type 2) functions.

use super::{Clamper, Values};
use crate::operator_list::Operand;
use carta_syntax::{Array, Dict};
use smallvec::smallvec;

#[derive(Debug)]
pub struct ExponentialFunction {
    pub(crate) domain: Clamper,
    range: Option<Clamper>,
    c0: Vec<f32>,
    c1: Vec<f32>,
    n: f32,
}

impl ExponentialFunction {
    pub fn parse(dict: &Dict) -> Option<Self> {
        let domain = Clamper::from_array(&dict.get::<Array>("Domain")?)?;
        let range = dict.get::<Array>("Range").and_then(|a| Clamper::from_array(&a));
        let n = dict.get::<f32>("N")?;

        let c0 = dict
            .get::<Array>("C0")
            .map(|a| a.iter::<f32>().collect())
            .unwrap_or_else(|| vec![0.0]);
        let c1 = dict
            .get::<Array>("C1")
            .map(|a| a.iter::<f32>().collect())
            .unwrap_or_else(|| vec![1.0]);

        if c0.len() != c1.len() || c0.is_empty() {
            return None;
        }

        Some(Self {
            domain,
            range,
            c0,
            c1,
            n,
        })
    }

    pub fn num_outputs(&self) -> usize {
        self.c0.len()
    }

    pub fn eval(&self, inputs: &[f32]) -> Values {
        let x = self.domain.clamp(0, inputs.first().copied().unwrap_or(0.0));
        let xn = x.powf(self.n);

        let mut out: Values = smallvec![];

        for (j, (c0, c1)) in self.c0.iter().zip(&self.c1).enumerate() {
            let mut v = c0 + xn * (c1 - c0);

            if let Some(range) = &self.range {
                v = range.clamp(j, v);
            }

            out.push(v);
        }

        out
    }

    pub fn to_ir(&self) -> Operand {
        let mut items = vec![Operand::Num(2.0)];

        super::push_flat(&mut items, &self.domain);
        super::push_flat(
            &mut items,
            self.range.as_ref().unwrap_or(&Clamper(Vec::new())),
        );
        items.push(Operand::Num(self.n as f64));
        items.push(Operand::Num(self.c0.len() as f64));

        for v in self.c0.iter().chain(&self.c1) {
            items.push(Operand::Num(*v as f64));
        }

        Operand::Array(items)
    }

    pub fn from_ir(items: &[Operand]) -> Option<Self> {
        let mut at = 1usize;
        let domain = super::read_flat(items, &mut at)?;
        let range = super::read_flat(items, &mut at)?;
        let range = (!range.is_empty()).then_some(range);

        let n = items.get(at)?.as_f64()? as f32;
        at += 1;

        let count = items.get(at)?.as_f64()? as usize;
        at += 1;

        let mut coeffs = Vec::with_capacity(count * 2);

        for _ in 0..count * 2 {
            coeffs.push(items.get(at)?.as_f64()? as f32);
            at += 1;
        }

        let (c0, c1) = coeffs.split_at(count);

        Some(Self {
            domain,
            range,
            c0: c0.to_vec(),
            c1: c1.to_vec(),
            n,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use carta_syntax::{Name, Number, Object, Store};
    use std::sync::Arc;

    fn make(n: f64, c0: &[f64], c1: &[f64], range: Option<&[f64]>) -> ExponentialFunction {
        let store = Arc::new(Store::new());
        let arr = |vals: &[f64]| {
            Object::Array(Array::from_objects(
                store.clone(),
                vals.iter()
                    .map(|v| Object::Number(Number::Real(*v)))
                    .collect(),
            ))
        };

        let mut pairs = vec![
            (Name::new("Domain"), arr(&[0.0, 1.0])),
            (Name::new("N"), Object::Number(Number::Real(n))),
            (Name::new("C0"), arr(c0)),
            (Name::new("C1"), arr(c1)),
        ];

        if let Some(r) = range {
            pairs.push((Name::new("Range"), arr(r)));
        }

        let dict = Dict::from_pairs(store.clone(), pairs);

        ExponentialFunction::parse(&dict).unwrap()
    }

    #[test]
    fn linear_blend() {
        let f = make(1.0, &[0.0, 1.0], &[1.0, 0.0], None);
        let out = f.eval(&[0.25]);

        assert_eq!(out.as_slice(), &[0.25, 0.75]);
    }

    #[test]
    fn exponent_applies() {
        let f = make(2.0, &[0.0], &[1.0], None);

        assert_eq!(f.eval(&[0.5])[0], 0.25);
    }

    #[test]
    fn range_clamps_overshoot() {
        // C1 above the range maximum forces post-hoc clamping.
        let f = make(1.0, &[0.0], &[2.0], Some(&[0.0, 1.0]));

        assert_eq!(f.eval(&[1.0])[0], 1.0);
        assert_eq!(f.eval(&[0.25])[0], 0.5);
    }

    #[test]
    fn ir_round_trip() {
        let f = make(2.0, &[0.1], &[0.9], Some(&[0.0, 1.0]));
        let Operand::Array(items) = f.to_ir() else {
            panic!("expected array IR");
        };
        let back = ExponentialFunction::from_ir(&items).unwrap();

        assert_eq!(back.eval(&[0.3])[0], f.eval(&[0.3])[0]);
    }
}
