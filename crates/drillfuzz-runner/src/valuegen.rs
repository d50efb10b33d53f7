//! TypeDescriptor → random `Value` generator
//!
//! Deterministic for a given seed and call order. A [`RecursionGuard`] bounds
//! construction depth and breaks reference cycles by substituting the type's
//! default value.

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use drillfuzz_core::{
    Field, FuzzError, Operation, ParameterValue, PrimitiveKind, TypeDescriptor, TypeRegistry,
    Value,
};
use rand::rngs::SmallRng;
use rand::{Rng, RngCore, SeedableRng};
use tracing::debug;

/// Maximum number of types under construction at once.
pub const MAX_RECURSION_DEPTH: usize = 5;

/// Elements generated for every sequence; attempts made for every map.
pub const COLLECTION_SIZE: usize = 3;

/// Stack of type keys currently under construction.
#[derive(Debug, Default)]
pub struct RecursionGuard {
    stack: Vec<String>,
}

impl RecursionGuard {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Refuses when the depth limit is reached or `key` is already on the stack.
    pub fn try_enter(&mut self, key: &str) -> bool {
        if self.stack.len() >= MAX_RECURSION_DEPTH || self.stack.iter().any(|k| k == key) {
            return false;
        }
        self.stack.push(key.to_string());
        true
    }

    pub fn exit(&mut self, key: &str) {
        if let Some(pos) = self.stack.iter().rposition(|k| k == key) {
            self.stack.remove(pos);
        }
    }
}

/// Seeded value generator.
#[derive(Debug)]
pub struct ValueGenerator {
    rng: SmallRng,
    guard: RecursionGuard,
    reference_time: DateTime<Utc>,
}

impl ValueGenerator {
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            rng: SmallRng::seed_from_u64(seed),
            guard: RecursionGuard::new(),
            reference_time: Utc::now(),
        }
    }

    /// Anchor for generated timestamps (defaults to now).
    #[must_use]
    pub fn with_reference_time(mut self, reference_time: DateTime<Utc>) -> Self {
        self.reference_time = reference_time;
        self
    }

    /// One value per declared parameter, in declaration order.
    ///
    /// # Errors
    ///
    /// Returns [`FuzzError::UnsupportedType`] if any parameter type cannot be built.
    pub fn create_parameters(
        &mut self,
        operation: &Operation,
        registry: &TypeRegistry,
        permutation_size: usize,
    ) -> Result<Vec<ParameterValue>, FuzzError> {
        operation
            .parameters
            .iter()
            .map(|p| {
                let value = self.create_value(&p.ty, registry, permutation_size)?;
                Ok(ParameterValue::new(p.name.clone(), p.ty.clone(), value))
            })
            .collect()
    }

    /// Build a value for `ty`.
    ///
    /// `permutation_size` scales the integer range to `1..permutation_size`.
    ///
    /// # Errors
    ///
    /// Returns [`FuzzError::UnsupportedType`] for opaque types, empty enums and
    /// unresolvable named references.
    pub fn create_value(
        &mut self,
        ty: &TypeDescriptor,
        registry: &TypeRegistry,
        permutation_size: usize,
    ) -> Result<Value, FuzzError> {
        let key = ty.type_key();
        if !self.guard.try_enter(&key) {
            let refused = FuzzError::RecursionLimitReached(key);
            debug!(depth = self.guard.depth(), "{refused}; using default");
            return Ok(ty.default_value());
        }
        let result = self.build(ty, registry, permutation_size);
        self.guard.exit(&key);
        result
    }

    fn build(
        &mut self,
        ty: &TypeDescriptor,
        registry: &TypeRegistry,
        n: usize,
    ) -> Result<Value, FuzzError> {
        match ty {
            TypeDescriptor::Primitive { primitive } => Ok(self.primitive(*primitive, n)),
            TypeDescriptor::Optional { inner } => {
                if self.rng.gen_bool(0.5) {
                    Ok(Value::Null)
                } else {
                    self.create_value(inner, registry, n)
                }
            }
            TypeDescriptor::Enum { values } => {
                if values.is_empty() {
                    return Err(FuzzError::UnsupportedType(ty.type_key()));
                }
                let i = self.rng.gen_range(0..values.len());
                Ok(Value::String(values[i].clone()))
            }
            TypeDescriptor::Sequence { element } => (0..COLLECTION_SIZE)
                .map(|_| self.create_value(element, registry, n))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Sequence),
            TypeDescriptor::Map { key, value } => {
                let mut entries: Vec<(Value, Value)> = Vec::with_capacity(COLLECTION_SIZE);
                for _ in 0..COLLECTION_SIZE {
                    let k = self.create_value(key, registry, n)?;
                    let v = self.create_value(value, registry, n)?;
                    if !entries.iter().any(|(existing, _)| *existing == k) {
                        entries.push((k, v));
                    }
                }
                Ok(Value::Map(entries))
            }
            TypeDescriptor::Record { fields, .. } => self.record(fields, registry, n),
            TypeDescriptor::Named { name } => match registry.resolve(name) {
                // Already guarded under the shared name
                Some(resolved)
                    if matches!(resolved, TypeDescriptor::Record { .. })
                        && resolved.type_key() == *name =>
                {
                    self.build(resolved, registry, n)
                }
                Some(resolved) => self.create_value(resolved, registry, n),
                None => Err(FuzzError::UnsupportedType(name.clone())),
            },
            TypeDescriptor::Opaque { name } => Err(FuzzError::UnsupportedType(name.clone())),
        }
    }

    fn record(
        &mut self,
        fields: &[Field],
        registry: &TypeRegistry,
        n: usize,
    ) -> Result<Value, FuzzError> {
        let mut out = std::collections::BTreeMap::new();
        for field in fields.iter().filter(|f| !f.read_only) {
            let value = self.create_value(&field.ty, registry, n)?;
            out.insert(field.name.clone(), value);
        }
        Ok(Value::Record(out))
    }

    fn primitive(&mut self, kind: PrimitiveKind, n: usize) -> Value {
        match kind {
            PrimitiveKind::Int => {
                let upper = i32::try_from(n).unwrap_or(i32::MAX).max(2);
                Value::Int(self.rng.gen_range(1..upper))
            }
            PrimitiveKind::Long => Value::Long(self.rng.gen_range(1..10_000)),
            PrimitiveKind::Double => Value::Double(self.rng.r#gen::<f64>() * 100.0),
            PrimitiveKind::Bool => Value::Bool(self.rng.gen_bool(0.5)),
            PrimitiveKind::String => {
                Value::String(format!("RandomString{}", self.rng.gen_range(1..1000)))
            }
            PrimitiveKind::DateTime => {
                let offset = Duration::days(self.rng.gen_range(-100..100));
                let at = self.reference_time + offset;
                Value::DateTime(at.to_rfc3339_opts(SecondsFormat::Secs, true))
            }
            PrimitiveKind::Duration => Value::Duration(self.rng.gen_range(1..100) * 3600),
            PrimitiveKind::Guid => {
                let mut bytes = [0u8; 16];
                self.rng.fill_bytes(&mut bytes);
                Value::Guid(uuid::Builder::from_random_bytes(bytes).into_uuid().to_string())
            }
            PrimitiveKind::Bytes => {
                let mut bytes = vec![0u8; 16];
                self.rng.fill_bytes(&mut bytes);
                Value::Bytes(bytes)
            }
            PrimitiveKind::Uri => {
                Value::Uri(format!("https://RandomString{}.com", self.rng.gen_range(1..1000)))
            }
            PrimitiveKind::Email => {
                Value::String(format!("user{}@example.com", self.rng.gen_range(1..10_000)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use drillfuzz_core::{HttpMethod, Parameter};
    use proptest::prelude::*;

    fn generator() -> ValueGenerator {
        let anchor = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        ValueGenerator::new(42).with_reference_time(anchor)
    }

    fn registry() -> TypeRegistry {
        TypeRegistry::new().with(
            "Node",
            TypeDescriptor::record(
                "Node",
                vec![
                    Field::new("value", TypeDescriptor::int()),
                    Field::new("next", TypeDescriptor::optional(TypeDescriptor::named("Node"))),
                    Field::new("children", TypeDescriptor::sequence(TypeDescriptor::named("Node"))),
                ],
            ),
        )
    }

    fn all_kinds() -> Vec<TypeDescriptor> {
        let mut kinds: Vec<_> = [
            PrimitiveKind::Int,
            PrimitiveKind::Long,
            PrimitiveKind::Double,
            PrimitiveKind::Bool,
            PrimitiveKind::String,
            PrimitiveKind::DateTime,
            PrimitiveKind::Duration,
            PrimitiveKind::Guid,
            PrimitiveKind::Bytes,
            PrimitiveKind::Uri,
            PrimitiveKind::Email,
        ]
        .into_iter()
        .map(TypeDescriptor::primitive)
        .collect();
        kinds.extend([
            TypeDescriptor::optional(TypeDescriptor::long()),
            TypeDescriptor::enumeration(["red", "green"]),
            TypeDescriptor::sequence(TypeDescriptor::string()),
            TypeDescriptor::map(TypeDescriptor::string(), TypeDescriptor::double()),
            TypeDescriptor::record(
                "User",
                vec![
                    Field::new("id", TypeDescriptor::long()).read_only(),
                    Field::new("name", TypeDescriptor::string()),
                ],
            ),
            TypeDescriptor::named("Node"),
        ]);
        kinds
    }

    fn depth(value: &Value) -> usize {
        match value {
            Value::Sequence(items) => 1 + items.iter().map(depth).max().unwrap_or(0),
            Value::Map(entries) => 1 + entries.iter().map(|(_, v)| depth(v)).max().unwrap_or(0),
            Value::Record(fields) => 1 + fields.values().map(depth).max().unwrap_or(0),
            _ => 1,
        }
    }

    // ── recursion guard ──

    #[test]
    fn guard_refuses_reentry_and_depth() {
        let mut guard = RecursionGuard::new();
        assert!(guard.try_enter("A"));
        assert!(!guard.try_enter("A"));
        for k in ["B", "C", "D", "E"] {
            assert!(guard.try_enter(k));
        }
        assert!(!guard.try_enter("F"), "sixth level must be refused");
        guard.exit("E");
        assert!(guard.try_enter("F"));
    }

    // ── determinism ──

    #[test]
    fn same_seed_same_values() {
        let reg = registry();
        let mut a = generator();
        let mut b = generator();
        for ty in all_kinds() {
            assert_eq!(
                a.create_value(&ty, &reg, 10).unwrap(),
                b.create_value(&ty, &reg, 10).unwrap(),
                "{ty}"
            );
        }
    }

    // ── shapes ──

    #[test]
    fn int_range_scales_with_permutation_size() {
        let mut g = generator();
        for _ in 0..100 {
            match g.create_value(&TypeDescriptor::int(), &TypeRegistry::new(), 3).unwrap() {
                Value::Int(i) => assert!((1..3).contains(&i), "{i}"),
                other => panic!("expected int, got {other:?}"),
            }
        }
        // Degenerate sizes still yield 1
        let v = g.create_value(&TypeDescriptor::int(), &TypeRegistry::new(), 0).unwrap();
        assert_eq!(v, Value::Int(1));
    }

    #[test]
    fn strings_and_uris_follow_naming() {
        let mut g = generator();
        let reg = TypeRegistry::new();
        let Value::String(s) = g.create_value(&TypeDescriptor::string(), &reg, 5).unwrap() else {
            panic!("expected string");
        };
        assert!(s.starts_with("RandomString"));
        let Value::Uri(u) = g
            .create_value(&TypeDescriptor::primitive(PrimitiveKind::Uri), &reg, 5)
            .unwrap()
        else {
            panic!("expected uri");
        };
        assert!(u.starts_with("https://RandomString") && u.ends_with(".com"));
    }

    #[test]
    fn guid_is_version_four() {
        let mut g = generator();
        let v = g
            .create_value(&TypeDescriptor::primitive(PrimitiveKind::Guid), &TypeRegistry::new(), 5)
            .unwrap();
        let Value::Guid(text) = v else {
            panic!("expected guid");
        };
        let parsed = uuid::Uuid::parse_str(&text).unwrap();
        assert_eq!(parsed.get_version_num(), 4);
    }

    #[test]
    fn datetime_within_hundred_days_of_anchor() {
        let anchor = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let mut g = generator();
        for _ in 0..50 {
            let Value::DateTime(text) = g
                .create_value(&TypeDescriptor::primitive(PrimitiveKind::DateTime), &TypeRegistry::new(), 5)
                .unwrap()
            else {
                panic!("expected datetime");
            };
            let at = DateTime::parse_from_rfc3339(&text).unwrap().with_timezone(&Utc);
            assert!((at - anchor).num_days().abs() <= 100);
        }
    }

    #[test]
    fn sequences_have_three_elements() {
        let mut g = generator();
        let v = g
            .create_value(&TypeDescriptor::sequence(TypeDescriptor::long()), &TypeRegistry::new(), 5)
            .unwrap();
        assert!(matches!(v, Value::Sequence(ref items) if items.len() == COLLECTION_SIZE));
    }

    #[test]
    fn map_keys_never_collide() {
        let mut g = generator();
        for _ in 0..20 {
            let v = g
                .create_value(
                    &TypeDescriptor::map(TypeDescriptor::bool(), TypeDescriptor::int()),
                    &TypeRegistry::new(),
                    5,
                )
                .unwrap();
            let Value::Map(entries) = v else {
                panic!("expected map");
            };
            assert!(!entries.is_empty() && entries.len() <= 2);
            if entries.len() == 2 {
                assert_ne!(entries[0].0, entries[1].0);
            }
        }
    }

    #[test]
    fn read_only_fields_are_skipped() {
        let ty = TypeDescriptor::record(
            "User",
            vec![
                Field::new("id", TypeDescriptor::long()).read_only(),
                Field::new("name", TypeDescriptor::string()),
            ],
        );
        let v = generator().create_value(&ty, &TypeRegistry::new(), 5).unwrap();
        let Value::Record(fields) = v else {
            panic!("expected record");
        };
        assert!(!fields.contains_key("id"));
        assert!(fields.contains_key("name"));
    }

    #[test]
    fn self_referential_record_is_bounded() {
        let reg = registry();
        let mut g = generator();
        for _ in 0..20 {
            let v = g.create_value(&TypeDescriptor::named("Node"), &reg, 5).unwrap();
            assert!(matches!(v, Value::Record(_)));
            assert!(depth(&v) <= MAX_RECURSION_DEPTH, "depth {}", depth(&v));
        }
    }

    // ── failures ──

    #[test]
    fn unsupported_types_fail_and_leave_guard_balanced() {
        let mut g = generator();
        let reg = TypeRegistry::new();
        let ty = TypeDescriptor::record(
            "Upload",
            vec![Field::new("stream", TypeDescriptor::opaque("Stream"))],
        );
        let err = g.create_value(&ty, &reg, 5).unwrap_err();
        assert!(matches!(err, FuzzError::UnsupportedType(ref n) if n == "Stream"));
        assert_eq!(g.guard.depth(), 0);

        assert!(g.create_value(&TypeDescriptor::enumeration(Vec::<String>::new()), &reg, 5).is_err());
        assert!(g.create_value(&TypeDescriptor::named("Missing"), &reg, 5).is_err());
    }

    #[test]
    fn parameters_follow_declaration_order() {
        let op = Operation::new("Search", HttpMethod::Get)
            .with_parameter(Parameter::new("q", TypeDescriptor::string()))
            .with_parameter(Parameter::new("limit", TypeDescriptor::int()));
        let params = generator()
            .create_parameters(&op, &TypeRegistry::new(), 10)
            .unwrap();
        let names: Vec<_> = params.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["q", "limit"]);
    }

    proptest! {
        #[test]
        fn generated_values_match_their_type(seed in any::<u64>(), n in 0usize..200) {
            let reg = registry();
            let mut g = ValueGenerator::new(seed);
            for ty in all_kinds() {
                let v = g.create_value(&ty, &reg, n).unwrap();
                prop_assert!(ty.accepts(&v, &reg), "{} rejected {:?}", ty, v);
            }
        }
    }
}
