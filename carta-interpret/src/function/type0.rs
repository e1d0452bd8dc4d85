//! Sampled (type 0) functions: multilinear interpolation over an
//! N-dimensional grid of packed integer samples.

use super::{Clamper, Values, interpolate};
use crate::operator_list::Operand;
use crate::util::OptionLog;
use carta_syntax::{Array, Stream};
use smallvec::smallvec;

/// Inputs beyond this make the 2^m corner walk unreasonable.
const MAX_INPUTS: usize = 10;

#[derive(Debug)]
pub struct SampledFunction {
    pub(crate) domain: Clamper,
    range: Clamper,
    size: Vec<usize>,
    bits_per_sample: u32,
    encode: Vec<(f32, f32)>,
    decode: Vec<(f32, f32)>,
    /// Raw integer sample values, decoded from the packed stream once at
    /// construction.
    samples: Vec<f32>,
}

impl SampledFunction {
    pub fn parse(stream: &Stream) -> Option<Self> {
        let dict = stream.dict();
        let domain = Clamper::from_array(&dict.get::<Array>("Domain")?)?;
        let range = Clamper::from_array(&dict.get::<Array>("Range")?)?;

        let size: Vec<usize> = dict
            .get::<Array>("Size")?
            .iter::<i64>()
            .map(|v| v.max(1) as usize)
            .collect();

        if size.len() != domain.len() || size.is_empty() || size.len() > MAX_INPUTS {
            return None;
        }

        let bits_per_sample = dict.get::<u32>("BitsPerSample")?;

        if !matches!(bits_per_sample, 1 | 2 | 4 | 8 | 12 | 16 | 24 | 32) {
            return None;
        }

        let encode = match dict.get::<Array>("Encode") {
            Some(arr) => Clamper::from_array(&arr)?.0,
            None => size.iter().map(|s| (0.0, (*s - 1) as f32)).collect(),
        };

        let decode = match dict.get::<Array>("Decode") {
            Some(arr) => Clamper::from_array(&arr)?.0,
            None => range.0.clone(),
        };

        let total: usize = size.iter().product::<usize>() * range.len();
        let data = stream.decoded();
        let samples = unpack_samples(&data, bits_per_sample, total)
            .warn_none("sampled function stream is shorter than its declared grid")?;

        Some(Self {
            domain,
            range,
            size,
            bits_per_sample,
            encode,
            decode,
            samples,
        })
    }

    pub fn num_outputs(&self) -> usize {
        self.range.len()
    }

    pub fn eval(&self, inputs: &[f32]) -> Values {
        let m = self.domain.len();
        let n = self.range.len();

        // Map each clamped input onto the sample grid.
        let mut base = Vec::with_capacity(m);

        for i in 0..m {
            let v = self.domain.clamp(i, inputs.get(i).copied().unwrap_or(0.0));
            let (dmin, dmax) = self.domain.0[i];
            let (emin, emax) = self.encode.get(i).copied().unwrap_or((0.0, 0.0));

            let e = interpolate(v, dmin, dmax, emin, emax).clamp(0.0, (self.size[i] - 1) as f32);
            let k0 = e.floor() as usize;
            let k1 = (k0 + 1).min(self.size[i] - 1);

            base.push((k0, k1, e - k0 as f32));
        }

        let max_sample = if self.bits_per_sample == 32 {
            u32::MAX as f32
        } else {
            ((1u64 << self.bits_per_sample) - 1) as f32
        };

        let mut out: Values = smallvec![0.0; n];

        // Multilinear interpolation over the 2^m surrounding corners.
        for corner in 0..(1usize << m) {
            let mut weight = 1.0f32;
            let mut index = 0usize;
            let mut stride = 1usize;

            for (i, (k0, k1, frac)) in base.iter().enumerate() {
                let (k, w) = if corner & (1 << i) != 0 {
                    (*k1, *frac)
                } else {
                    (*k0, 1.0 - *frac)
                };

                weight *= w;
                index += k * stride;
                stride *= self.size[i];
            }

            if weight == 0.0 {
                continue;
            }

            for (j, slot) in out.iter_mut().enumerate() {
                let sample = self
                    .samples
                    .get(index * n + j)
                    .copied()
                    .unwrap_or_default();
                *slot += weight * sample;
            }
        }

        for (j, slot) in out.iter_mut().enumerate() {
            let (dmin, dmax) = self.decode.get(j).copied().unwrap_or((0.0, 1.0));
            *slot = interpolate(*slot, 0.0, max_sample, dmin, dmax);
            *slot = self.range.clamp(j, *slot);
        }

        out
    }

    pub fn to_ir(&self) -> Operand {
        let mut items = vec![Operand::Num(0.0)];

        super::push_flat(&mut items, &self.domain);
        super::push_flat(&mut items, &self.range);
        items.push(Operand::Num(self.bits_per_sample as f64));
        items.push(Operand::Num(self.size.len() as f64));

        for s in &self.size {
            items.push(Operand::Num(*s as f64));
        }

        super::push_flat(&mut items, &Clamper(self.encode.clone()));
        super::push_flat(&mut items, &Clamper(self.decode.clone()));
        items.push(Operand::Num(self.samples.len() as f64));

        for s in &self.samples {
            items.push(Operand::Num(*s as f64));
        }

        Operand::Array(items)
    }

    pub fn from_ir(items: &[Operand]) -> Option<Self> {
        let mut at = 1usize;
        let domain = super::read_flat(items, &mut at)?;
        let range = super::read_flat(items, &mut at)?;

        let bits_per_sample = items.get(at)?.as_f64()? as u32;
        at += 1;

        let dims = items.get(at)?.as_f64()? as usize;
        at += 1;

        let mut size = Vec::with_capacity(dims);

        for _ in 0..dims {
            size.push(items.get(at)?.as_f64()? as usize);
            at += 1;
        }

        let encode = super::read_flat(items, &mut at)?.0;
        let decode = super::read_flat(items, &mut at)?.0;

        let count = items.get(at)?.as_f64()? as usize;
        at += 1;

        let mut samples = Vec::with_capacity(count);

        for _ in 0..count {
            samples.push(items.get(at)?.as_f64()? as f32);
            at += 1;
        }

        Some(Self {
            domain,
            range,
            size,
            bits_per_sample,
            encode,
            decode,
            samples,
        })
    }
}

/// Read `count` big-endian integers of `bits` width from a packed stream.
fn unpack_samples(data: &[u8], bits: u32, count: usize) -> Option<Vec<f32>> {
    let needed_bits = count.checked_mul(bits as usize)?;

    if data.len() * 8 < needed_bits {
        return None;
    }

    let mut out = Vec::with_capacity(count);
    let mut acc = 0u64;
    let mut acc_bits = 0u32;
    let mut pos = 0usize;

    for _ in 0..count {
        while acc_bits < bits {
            acc = (acc << 8) | data[pos] as u64;
            pos += 1;
            acc_bits += 8;
        }

        let mask = (1u64 << bits) - 1;
        let v = (acc >> (acc_bits - bits)) & mask;
        acc_bits -= bits;
        acc &= (1u64 << acc_bits).wrapping_sub(1);

        out.push(v as f32);
    }

    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use carta_syntax::{Dict, Name, Number, Object, Store};
    use std::sync::Arc;

    fn nums(values: &[f64], store: &Arc<carta_syntax::Store>) -> Object {
        Object::Array(carta_syntax::Array::from_objects(
            store.clone(),
            values
                .iter()
                .map(|v| Object::Number(Number::Real(*v)))
                .collect(),
        ))
    }

    fn make_stream(
        pairs: Vec<(&str, Object)>,
        data: &[u8],
    ) -> carta_syntax::Stream {
        let store = Arc::new(Store::new());
        let dict = Dict::from_pairs(
            store,
            pairs
                .into_iter()
                .map(|(k, v)| (Name::new(k), v))
                .collect::<Vec<_>>(),
        );

        carta_syntax::Stream::new(dict, data.into())
    }

    fn linear_ramp() -> SampledFunction {
        // One input, one output, 2 samples of 8 bits: 0 and 255.
        let store = Arc::new(Store::new());
        let stream = make_stream(
            vec![
                ("FunctionType", Object::Number(Number::Int(0))),
                ("Domain", nums(&[0.0, 1.0], &store)),
                ("Range", nums(&[0.0, 1.0], &store)),
                ("Size", nums(&[2.0], &store)),
                ("BitsPerSample", Object::Number(Number::Int(8))),
            ],
            &[0x00, 0xFF],
        );

        SampledFunction::parse(&stream).unwrap()
    }

    #[test]
    fn interpolates_between_samples() {
        let f = linear_ramp();

        assert_eq!(f.eval(&[0.0])[0], 0.0);
        assert_eq!(f.eval(&[1.0])[0], 1.0);
        assert!((f.eval(&[0.5])[0] - 0.5).abs() < 1e-3);
    }

    #[test]
    fn clamps_domain_and_range() {
        let f = linear_ramp();

        // Out-of-domain inputs clamp to the edges.
        assert_eq!(f.eval(&[5.0])[0], 1.0);
        assert_eq!(f.eval(&[-5.0])[0], 0.0);
    }

    #[test]
    fn unpacks_sub_byte_samples() {
        // Four 4-bit samples: 0x1, 0x8, 0xF, 0x0.
        let samples = unpack_samples(&[0x18, 0xF0], 4, 4).unwrap();
        assert_eq!(samples, vec![1.0, 8.0, 15.0, 0.0]);

        // Two 12-bit samples from three bytes.
        let samples = unpack_samples(&[0xAB, 0xCD, 0xEF], 12, 2).unwrap();
        assert_eq!(samples, vec![0xABC as f32, 0xDEF as f32]);
    }

    #[test]
    fn ir_round_trip() {
        let f = linear_ramp();
        let ir = f.to_ir();

        let Operand::Array(items) = &ir else {
            panic!("expected array IR");
        };
        let back = SampledFunction::from_ir(items).unwrap();

        assert_eq!(back.eval(&[0.25])[0], f.eval(&[0.25])[0]);
    }
}
