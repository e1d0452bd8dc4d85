//! Stitching (type 3) functions: a 1-D domain partitioned by sorted bounds
//! into sub-functions.

use super::{Clamper, Function, Values, interpolate};
use crate::error::EvalError;
use crate::operator_list::Operand;
use crate::util::OptionLog;
use carta_syntax::{Array, Dict, Object};

#[derive(Debug)]
pub struct StitchingFunction {
    pub(crate) domain: Clamper,
    range: Option<Clamper>,
    functions: Vec<Function>,
    bounds: Vec<f32>,
    encode: Vec<(f32, f32)>,
}

impl StitchingFunction {
    pub fn parse(dict: &Dict) -> Option<Self> {
        let domain = Clamper::from_array(&dict.get::<Array>("Domain")?)?;

        if domain.len() != 1 {
            return None;
        }

        let range = dict.get::<Array>("Range").and_then(|a| Clamper::from_array(&a));

        let functions: Vec<Function> = dict
            .get::<Array>("Functions")?
            .iter_raw()
            .filter_map(|obj| {
                let resolved: Object = dict.store().resolve(&obj);

                Function::parse(&resolved)
            })
            .collect();

        if functions.is_empty() {
            return None;
        }

        let bounds: Vec<f32> = dict
            .get::<Array>("Bounds")
            .map(|a| a.iter::<f32>().collect())
            .unwrap_or_default();

        if bounds.len() + 1 != functions.len() {
            return None;
        }

        let encode = Clamper::from_array(
            &dict
                .get::<Array>("Encode")
                .warn_none("stitching function without Encode")?,
        )?
        .0;

        if encode.len() != functions.len() {
            return None;
        }

        Some(Self {
            domain,
            range,
            functions,
            bounds,
            encode,
        })
    }

    pub fn num_outputs(&self) -> usize {
        self.range
            .as_ref()
            .map(Clamper::len)
            .unwrap_or_else(|| self.functions[0].num_outputs())
    }

    pub fn eval(&self, inputs: &[f32]) -> Result<Values, EvalError> {
        let v = self.domain.clamp(0, inputs.first().copied().unwrap_or(0.0));

        // Ties break toward the lower sub-domain: the first bound strictly
        // greater than v selects its sub-function.
        let i = self
            .bounds
            .iter()
            .position(|b| v < *b)
            .unwrap_or(self.bounds.len());

        let (dmin, dmax) = self.domain.0[0];
        let low = if i == 0 { dmin } else { self.bounds[i - 1] };
        let high = if i == self.bounds.len() {
            dmax
        } else {
            self.bounds[i]
        };

        let (e0, e1) = self.encode[i];
        let remapped = interpolate(v, low, high, e0, e1);

        let mut out = self.functions[i].eval(&[remapped])?;

        if let Some(range) = &self.range {
            range.clamp_all(&mut out);
        }

        Ok(out)
    }

    pub fn to_ir(&self) -> Operand {
        let mut items = vec![Operand::Num(3.0)];

        super::push_flat(&mut items, &self.domain);
        super::push_flat(
            &mut items,
            self.range.as_ref().unwrap_or(&Clamper(Vec::new())),
        );

        items.push(Operand::Num(self.bounds.len() as f64));

        for b in &self.bounds {
            items.push(Operand::Num(*b as f64));
        }

        super::push_flat(&mut items, &Clamper(self.encode.clone()));

        items.push(Operand::Num(self.functions.len() as f64));

        for f in &self.functions {
            items.push(f.to_ir());
        }

        Operand::Array(items)
    }

    pub fn from_ir(items: &[Operand]) -> Option<Self> {
        let mut at = 1usize;
        let domain = super::read_flat(items, &mut at)?;
        let range = super::read_flat(items, &mut at)?;
        let range = (!range.is_empty()).then_some(range);

        let bound_count = items.get(at)?.as_f64()? as usize;
        at += 1;

        let mut bounds = Vec::with_capacity(bound_count);

        for _ in 0..bound_count {
            bounds.push(items.get(at)?.as_f64()? as f32);
            at += 1;
        }

        let encode = super::read_flat(items, &mut at)?.0;

        let count = items.get(at)?.as_f64()? as usize;
        at += 1;

        let mut functions = Vec::with_capacity(count);

        for _ in 0..count {
            functions.push(Function::from_ir(items.get(at)?)?);
            at += 1;
        }

        if bounds.len() + 1 != functions.len() || encode.len() != functions.len() {
            return None;
        }

        Some(Self {
            domain,
            range,
            functions,
            bounds,
            encode,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use carta_syntax::{Name, Number, Store};
    use std::sync::Arc;

    /// Two linear segments: [0, 0.5) maps to 0..1, [0.5, 1] maps to 10..11.
    fn two_segment() -> StitchingFunction {
        let store = Arc::new(Store::new());
        let arr = |vals: &[f64]| {
            Object::Array(Array::from_objects(
                store.clone(),
                vals.iter()
                    .map(|v| Object::Number(Number::Real(*v)))
                    .collect(),
            ))
        };

        let exp = |c0: f64, c1: f64| {
            Object::Dict(Dict::from_pairs(
                store.clone(),
                vec![
                    (Name::new("FunctionType"), Object::Number(Number::Int(2))),
                    (Name::new("Domain"), arr(&[0.0, 1.0])),
                    (Name::new("N"), Object::Number(Number::Real(1.0))),
                    (Name::new("C0"), arr(&[c0])),
                    (Name::new("C1"), arr(&[c1])),
                ],
            ))
        };

        let dict = Dict::from_pairs(
            store.clone(),
            vec![
                (Name::new("FunctionType"), Object::Number(Number::Int(3))),
                (Name::new("Domain"), arr(&[0.0, 1.0])),
                (
                    Name::new("Functions"),
                    Object::Array(Array::from_objects(
                        store.clone(),
                        vec![exp(0.0, 1.0), exp(10.0, 11.0)],
                    )),
                ),
                (Name::new("Bounds"), arr(&[0.5])),
                (Name::new("Encode"), arr(&[0.0, 1.0, 0.0, 1.0])),
            ],
        );

        StitchingFunction::parse(&dict).unwrap()
    }

    #[test]
    fn selects_segment_and_remaps() {
        let f = two_segment();

        assert_eq!(f.eval(&[0.25]).unwrap()[0], 0.5);
        assert_eq!(f.eval(&[0.75]).unwrap()[0], 10.5);
    }

    #[test]
    fn tie_breaks_toward_lower_subdomain() {
        let f = two_segment();

        // Exactly at the bound, `v < bounds[i]` is false for the first
        // segment, so the upper one is selected with its sub-domain start.
        assert_eq!(f.eval(&[0.5]).unwrap()[0], 10.0);
        // Just below the bound stays in the lower segment.
        assert!((f.eval(&[0.4999]).unwrap()[0] - 0.9998).abs() < 1e-3);
    }

    #[test]
    fn clamps_domain_and_range() {
        let mut f = two_segment();
        f.range = Some(Clamper(vec![(0.0, 5.0)]));

        // Out-of-domain input clamps to the domain edge first.
        assert_eq!(f.eval(&[-2.0]).unwrap()[0], 0.0);
        // The upper segment produces 10.5, clamped to the range maximum.
        assert_eq!(f.eval(&[0.75]).unwrap()[0], 5.0);
    }

    #[test]
    fn ir_round_trip() {
        let f = two_segment();
        let ir = f.to_ir();
        let back = Function::from_ir(&ir).unwrap();

        assert_eq!(back.eval(&[0.75]).unwrap()[0], 10.5);
    }
}
