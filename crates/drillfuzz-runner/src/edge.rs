//! Schema-aware boundary and invalid values, independent of random draws
//!
//! Each edge value produces one derived call with every other parameter held
//! at its original value.

use drillfuzz_core::{ApiCall, ParameterValue, PrimitiveKind, TypeDescriptor, Value};

/// Order-id offset keeping derived calls clear of the base suite.
pub const EDGE_ORDER_OFFSET: u32 = 1000;

/// Placeholder sent for enum parameters; never a declared member.
pub const INVALID_ENUM_VALUE: &str = "__invalid_enum_value__";

/// Deterministic edge values for `ty`, duplicates removed.
#[must_use]
pub fn edge_values(ty: &TypeDescriptor) -> Vec<Value> {
    let values = match ty {
        TypeDescriptor::Primitive { primitive } => primitive_edges(*primitive),
        TypeDescriptor::Optional { inner } => {
            let mut v = edge_values(inner);
            v.push(Value::Null);
            v
        }
        TypeDescriptor::Enum { .. } => vec![Value::String(INVALID_ENUM_VALUE.into())],
        TypeDescriptor::Sequence { .. } => {
            vec![Value::Sequence(vec![]), Value::Sequence(vec![Value::Null])]
        }
        TypeDescriptor::Map { .. }
        | TypeDescriptor::Record { .. }
        | TypeDescriptor::Named { .. }
        | TypeDescriptor::Opaque { .. } => vec![Value::Null],
    };
    dedup(values)
}

fn primitive_edges(kind: PrimitiveKind) -> Vec<Value> {
    match kind {
        PrimitiveKind::Int => [0, -1, 1, i32::MIN, i32::MAX, 999_999_999]
            .into_iter()
            .map(Value::Int)
            .collect(),
        // 32-bit limits, as for int
        PrimitiveKind::Long => [0, -1, 1, i64::from(i32::MIN), i64::from(i32::MAX), 999_999_999]
            .into_iter()
            .map(Value::Long)
            .collect(),
        PrimitiveKind::Double => [
            0.0,
            -1.0,
            1.0,
            f64::MIN,
            f64::MAX,
            f64::NAN,
            f64::INFINITY,
            f64::NEG_INFINITY,
        ]
        .into_iter()
        .map(Value::Double)
        .collect(),
        PrimitiveKind::Bool => vec![Value::Bool(true), Value::Bool(false)],
        PrimitiveKind::String => string_edges().into_iter().map(Value::String).collect(),
        PrimitiveKind::Email => string_edges()
            .into_iter()
            .chain(["notanemail", "@missinglocal.com", "missing@domain.com"].map(String::from))
            .map(Value::String)
            .collect(),
        PrimitiveKind::DateTime => ["not a date", "2024-02-30", ""]
            .into_iter()
            .map(|s| Value::DateTime(s.into()))
            .collect(),
        PrimitiveKind::Uri => ["not a uri", "javascript:alert('xss')"]
            .into_iter()
            .map(|s| Value::Uri(s.into()))
            .collect(),
        PrimitiveKind::Guid => ["not-a-guid", ""]
            .into_iter()
            .map(|s| Value::Guid(s.into()))
            .collect(),
        PrimitiveKind::Duration => vec![Value::Duration(0), Value::Duration(-1)],
        PrimitiveKind::Bytes => vec![Value::Bytes(vec![])],
    }
}

fn string_edges() -> Vec<String> {
    vec![
        String::new(),
        "a".into(),
        "a".repeat(100),
        "a".repeat(1000),
        "!@#$%^&*()".into(),
        "UPPERCASE".into(),
        "lowercase".into(),
        "MiXeD CaSe".into(),
        " ".repeat(100),
        "ñ".repeat(50),
        "中文テスト".into(),
        "\"quotes\"".into(),
    ]
}

// NaN never equals itself, so compare by kind and rendered text.
fn dedup(values: Vec<Value>) -> Vec<Value> {
    let mut seen = std::collections::HashSet::new();
    values
        .into_iter()
        .filter(|v| seen.insert(format!("{}:{v}", v.kind_name())))
        .collect()
}

/// One derived call per edge value per parameter.
///
/// Order ids are `base + 1000 + n` where `n` counts derived calls so far.
#[must_use]
pub fn edge_case_calls(call: &ApiCall) -> Vec<ApiCall> {
    let mut out = Vec::new();
    for (index, param) in call.parameters.iter().enumerate() {
        for value in edge_values(&param.ty) {
            let parameters: Vec<ParameterValue> = call
                .parameters
                .iter()
                .enumerate()
                .map(|(i, p)| {
                    if i == index {
                        ParameterValue::new(p.name.clone(), p.ty.clone(), value.clone())
                    } else {
                        p.clone()
                    }
                })
                .collect();
            let offset = u32::try_from(out.len()).unwrap_or(u32::MAX);
            let order_id = call
                .order_id
                .saturating_add(EDGE_ORDER_OFFSET)
                .saturating_add(offset);
            out.push(call.derive(order_id, parameters));
        }
    }
    out
}

/// Each call followed by its edge-case derivatives.
#[must_use]
pub fn enrich_with_edge_cases(calls: Vec<ApiCall>) -> Vec<ApiCall> {
    let mut out = Vec::with_capacity(calls.len());
    for call in calls {
        let derived = edge_case_calls(&call);
        out.push(call);
        out.extend(derived);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use drillfuzz_core::{HttpMethod, TestSuite};

    fn call(params: Vec<ParameterValue>) -> ApiCall {
        ApiCall::new(2, "Search", HttpMethod::Get, params)
    }

    #[test]
    fn int_edges() {
        assert_eq!(
            edge_values(&TypeDescriptor::int()),
            vec![
                Value::Int(0),
                Value::Int(-1),
                Value::Int(1),
                Value::Int(i32::MIN),
                Value::Int(i32::MAX),
                Value::Int(999_999_999),
            ]
        );
    }

    #[test]
    fn double_edges_include_non_finite() {
        let values = edge_values(&TypeDescriptor::double());
        assert_eq!(values.len(), 8);
        assert!(values.iter().any(|v| matches!(v, Value::Double(d) if d.is_nan())));
        assert!(values.contains(&Value::Double(f64::NEG_INFINITY)));
    }

    #[test]
    fn string_edges_cover_length_and_encoding() {
        let values = edge_values(&TypeDescriptor::string());
        assert_eq!(values.len(), 12);
        assert!(values.contains(&Value::String(String::new())));
        assert!(values.contains(&Value::String("a".repeat(1000))));
        assert!(values.contains(&Value::String("中文テスト".into())));
    }

    #[test]
    fn optional_adds_null_once() {
        let values = edge_values(&TypeDescriptor::optional(TypeDescriptor::bool()));
        assert_eq!(values, vec![Value::Bool(true), Value::Bool(false), Value::Null]);
        let nested = edge_values(&TypeDescriptor::optional(TypeDescriptor::optional(
            TypeDescriptor::bool(),
        )));
        assert_eq!(nested.iter().filter(|v| v.is_null()).count(), 1);
    }

    #[test]
    fn reference_shapes_get_null_and_sequences_get_empty() {
        assert_eq!(edge_values(&TypeDescriptor::named("User")), vec![Value::Null]);
        assert_eq!(
            edge_values(&TypeDescriptor::sequence(TypeDescriptor::int())),
            vec![Value::Sequence(vec![]), Value::Sequence(vec![Value::Null])]
        );
    }

    #[test]
    fn derived_calls_vary_one_parameter() {
        let base = call(vec![
            ParameterValue::new("flag", TypeDescriptor::bool(), Value::Bool(true)),
            ParameterValue::new("id", TypeDescriptor::int(), Value::Int(5)),
        ]);
        let derived = edge_case_calls(&base);
        assert_eq!(derived.len(), 2 + 6);

        // Flag edges keep id, id edges keep flag
        assert!(derived[..2].iter().all(|c| c.param("id").unwrap().value == Value::Int(5)));
        assert!(derived[2..].iter().all(|c| c.param("flag").unwrap().value == Value::Bool(true)));
        assert!(derived.iter().all(|c| c.result.is_none()));
    }

    #[test]
    fn derived_order_ids_clear_base() {
        let base = call(vec![ParameterValue::new("id", TypeDescriptor::int(), Value::Int(5))]);
        let ids: Vec<_> = edge_case_calls(&base).iter().map(|c| c.order_id).collect();
        assert_eq!(ids, vec![1002, 1003, 1004, 1005, 1006, 1007]);
    }

    #[test]
    fn enrich_keeps_base_first() {
        let calls = vec![
            call(vec![]),
            call(vec![ParameterValue::new("b", TypeDescriptor::bool(), Value::Bool(false))]),
        ];
        let enriched = enrich_with_edge_cases(calls);
        assert_eq!(enriched.len(), 1 + 1 + 2);
        assert_eq!(enriched[0].order_id, 2);
        assert_eq!(enriched[1].order_id, 2);
        assert_eq!(enriched[2].order_id, 1002);
    }

    #[test]
    fn adjacent_enrichments_sort_the_same_either_way() {
        let at = |order_id, id| {
            ApiCall::new(
                order_id,
                "GetUser",
                HttpMethod::Get,
                vec![ParameterValue::new("id", TypeDescriptor::int(), Value::Int(id))],
            )
        };
        let sorted = |calls| {
            let mut suite = TestSuite::new(0, enrich_with_edge_cases(calls));
            suite.sort_calls();
            suite
        };
        let forward = sorted(vec![at(0, 5), at(1, 6)]);
        let backward = sorted(vec![at(1, 6), at(0, 5)]);

        assert_eq!(forward, backward);
        assert_eq!(forward.api_calls.len(), 14);
        assert!(forward.api_calls.windows(2).all(|w| w[0].order_id <= w[1].order_id));
    }
}
