//! Mutation strategy roster

use drillfuzz_core::types::{MIN_DATE_TIME, NIL_GUID};
use drillfuzz_core::{InputSeed, Value};
use rand::Rng;

/// Offsets tried by [`MutationStrategy::Arith`].
pub const ARITH_OPERANDS: [i32; 9] = [0, 1, -1, 2, -2, 10, -10, 100, -100];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationStrategy {
    /// Invert bits, negate, or XOR characters/bytes
    BitFlip,
    /// Add a small signed offset
    Arith,
    /// Substitute a type-specific extreme
    Boundary,
    /// Replace with null
    Null,
    /// Exchange two parameter values
    Swap,
    /// Replace with the empty value of the same shape
    Empty,
}

impl MutationStrategy {
    pub const ALL: [Self; 6] = [
        Self::BitFlip,
        Self::Arith,
        Self::Boundary,
        Self::Null,
        Self::Swap,
        Self::Empty,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BitFlip => "bit_flip",
            Self::Arith => "arith",
            Self::Boundary => "boundary",
            Self::Null => "null",
            Self::Swap => "swap",
            Self::Empty => "empty",
        }
    }

    /// Uniformly random roster member.
    pub fn random(rng: &mut impl Rng) -> Self {
        Self::ALL[rng.gen_range(0..Self::ALL.len())]
    }

    /// Copy of `seed` with one randomly chosen value mutated.
    ///
    /// Seeds without values come back unchanged; `Swap` needs two values.
    pub fn mutate(self, seed: &InputSeed, rng: &mut impl Rng) -> InputSeed {
        let mut mutated = seed.clone_fresh();
        let keys: Vec<String> = mutated.values.keys().cloned().collect();
        if keys.is_empty() {
            return mutated;
        }

        if self == Self::Swap {
            if keys.len() < 2 {
                return mutated;
            }
            let a = rng.gen_range(0..keys.len());
            let mut b = rng.gen_range(0..keys.len() - 1);
            if b >= a {
                b += 1;
            }
            let first = mutated.values.get(&keys[a]).cloned().unwrap_or(Value::Null);
            let second = mutated.values.get(&keys[b]).cloned().unwrap_or(Value::Null);
            mutated.values.insert(keys[a].clone(), second);
            mutated.values.insert(keys[b].clone(), first);
            return mutated;
        }

        let key = &keys[rng.gen_range(0..keys.len())];
        if let Some(value) = mutated.values.get_mut(key) {
            *value = self.directed(value, rng);
        }
        if matches!(self, Self::BitFlip | Self::Null) {
            mutated.is_interesting = true;
        }
        mutated
    }

    /// Mutated replacement for a single value, used when a gap names a target.
    pub fn directed(self, original: &Value, rng: &mut impl Rng) -> Value {
        match self {
            Self::BitFlip => flip_bits(original),
            Self::Arith => apply_arith(original, rng),
            Self::Boundary => boundary_value(original, rng),
            Self::Null => Value::Null,
            Self::Swap => original.clone(),
            Self::Empty => empty_value(original),
        }
    }
}

impl std::fmt::Display for MutationStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[must_use]
pub fn flip_bits(value: &Value) -> Value {
    match value {
        Value::Int(i) => Value::Int(!i),
        Value::Long(l) => Value::Long(!l),
        Value::Bool(b) => Value::Bool(!b),
        Value::Double(d) => Value::Double(-d),
        Value::Duration(s) => Value::Duration(s.saturating_neg()),
        // Only the low byte changes, so the result stays a valid scalar
        Value::String(s) => Value::String(
            s.chars()
                .map(|c| char::from_u32(u32::from(c) ^ 0xFF).unwrap_or(c))
                .collect(),
        ),
        Value::Bytes(b) => Value::Bytes(b.iter().map(|x| x ^ 0xFF).collect()),
        other => other.clone(),
    }
}

pub fn apply_arith(value: &Value, rng: &mut impl Rng) -> Value {
    let op = ARITH_OPERANDS[rng.gen_range(0..ARITH_OPERANDS.len())];
    match value {
        Value::Int(i) => Value::Int(i.wrapping_add(op)),
        Value::Long(l) => Value::Long(l.wrapping_add(i64::from(op))),
        Value::Double(d) => Value::Double(d + f64::from(op)),
        Value::Duration(s) => Value::Duration(s.saturating_add(i64::from(op))),
        other => other.clone(),
    }
}

fn pick<T: Clone>(candidates: &[T], rng: &mut impl Rng) -> T {
    candidates[rng.gen_range(0..candidates.len())].clone()
}

pub fn boundary_value(value: &Value, rng: &mut impl Rng) -> Value {
    match value {
        Value::Int(i) => Value::Int(pick(
            &[i32::MIN, i32::MAX, 0, 1, -1, i.wrapping_sub(1), i.wrapping_add(1)],
            rng,
        )),
        Value::Long(_) => Value::Long(pick(&[i64::MIN, i64::MAX, 0, 1, -1], rng)),
        Value::Double(_) => Value::Double(pick(
            &[f64::from_bits(1), f64::MAX, f64::MIN, 0.0, 1.0, -1.0],
            rng,
        )),
        Value::String(_) => Value::String(pick(
            &[String::new(), "a".into(), "a".repeat(1000), "a".repeat(10_000)],
            rng,
        )),
        other => other.clone(),
    }
}

#[must_use]
pub fn empty_value(value: &Value) -> Value {
    match value {
        Value::Int(_) => Value::Int(0),
        Value::Long(_) => Value::Long(0),
        Value::Double(_) => Value::Double(0.0),
        Value::Bool(_) => Value::Bool(false),
        Value::Duration(_) => Value::Duration(0),
        Value::DateTime(_) => Value::DateTime(MIN_DATE_TIME.into()),
        Value::Guid(_) => Value::Guid(NIL_GUID.into()),
        Value::Bytes(_) => Value::Bytes(Vec::new()),
        Value::Uri(_) => Value::Uri(String::new()),
        Value::Sequence(_) => Value::Sequence(Vec::new()),
        Value::Map(_) => Value::Map(Vec::new()),
        Value::Record(_) => Value::Record(Default::default()),
        Value::String(_) | Value::Null => Value::String(String::new()),
    }
}
