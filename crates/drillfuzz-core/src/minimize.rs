//! Corpus minimization: one representative call per observed behavior

use std::collections::HashSet;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use tracing::{debug, info};

use crate::coverage::reduction_percent;
use crate::model::ApiCall;

/// Canonical behavior signature of an executed call.
///
/// `{exception type or None}:{serialized result length}:{parameter hash}`. The
/// parameter hash covers the method name and every `name=value` pair in order.
#[must_use]
pub fn signature(call: &ApiCall) -> String {
    let exception = call
        .exception()
        .map_or("None", |e| e.type_name.as_str());
    let result_len = call.result.as_ref().map_or(4, |r| r.serialized_len());

    let mut hasher = DefaultHasher::new();
    call.method_name.hash(&mut hasher);
    let params = call
        .parameters
        .iter()
        .map(|p| format!("{}={}", p.name, p.value))
        .collect::<Vec<_>>()
        .join("|");
    params.hash(&mut hasher);

    format!("{exception}:{result_len}:{:016x}", hasher.finish())
}

/// Outcome of a minimization pass
#[derive(Debug, Clone, PartialEq)]
pub struct Minimized {
    /// Indices into the input, in first-seen order
    pub kept: Vec<usize>,
    pub before: usize,
    pub after: usize,
    pub reduction_percent: f64,
}

/// Keeps the first call seen per distinct [`signature`].
#[derive(Debug, Default)]
pub struct CorpusMinimizer;

impl CorpusMinimizer {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    #[must_use]
    pub fn minimize_indices(&self, calls: &[ApiCall]) -> Minimized {
        let mut seen = HashSet::new();
        let mut kept = Vec::new();
        for (i, call) in calls.iter().enumerate() {
            if seen.insert(signature(call)) {
                debug!(method = %call.method_name, "kept (new behavior)");
                kept.push(i);
            } else {
                debug!(method = %call.method_name, "skipped (duplicate behavior)");
            }
        }
        let before = calls.len();
        let after = kept.len();
        let reduction = reduction_percent(before, after);
        info!(before, after, reduction, "corpus minimized");
        Minimized {
            kept,
            before,
            after,
            reduction_percent: reduction,
        }
    }

    /// Minimized copy of `calls`, first-seen order preserved.
    #[must_use]
    pub fn minimize(&self, calls: &[ApiCall]) -> Vec<ApiCall> {
        self.minimize_indices(calls)
            .kept
            .into_iter()
            .map(|i| calls[i].clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CallResult, HttpMethod, ParameterValue, SimplifiedException};
    use crate::types::TypeDescriptor;
    use crate::value::Value;
    use proptest::prelude::*;
    use serde_json::json;

    fn call(order: u32, id: i32, result: CallResult) -> ApiCall {
        let mut c = ApiCall::new(
            order,
            "GetUser",
            HttpMethod::Get,
            vec![ParameterValue::new("id", TypeDescriptor::int(), Value::Int(id))],
        );
        c.result = Some(result);
        c
    }

    fn ok(body: serde_json::Value) -> CallResult {
        CallResult::Response(body)
    }

    fn err(status: u16) -> CallResult {
        CallResult::Exception(SimplifiedException::new(status, "bad", "ApiException"))
    }

    #[test]
    fn drops_later_duplicates() {
        let calls = vec![
            call(0, 1, ok(json!({"id": 1}))),
            call(1, 1, ok(json!({"id": 1}))),
            call(2, 2, ok(json!({"id": 2}))),
            call(3, 1, err(404)),
        ];
        let out = CorpusMinimizer::new().minimize_indices(&calls);
        assert_eq!(out.kept, vec![0, 2, 3]);
        assert_eq!(out.before, 4);
        assert_eq!(out.after, 3);
        assert_eq!(out.reduction_percent, 25.0);
    }

    #[test]
    fn signature_names_exception_type() {
        let s = signature(&call(0, 1, err(500)));
        assert!(s.starts_with("ApiException:"), "{s}");
        let s = signature(&call(0, 1, ok(json!(null))));
        assert!(s.starts_with("None:"), "{s}");
    }

    #[test]
    fn empty_input_is_empty_output() {
        let out = CorpusMinimizer::new().minimize_indices(&[]);
        assert!(out.kept.is_empty());
        assert_eq!(out.reduction_percent, 0.0);
    }

    proptest! {
        #[test]
        fn output_has_one_call_per_distinct_signature(ids in proptest::collection::vec(0i32..6, 0..40)) {
            let calls: Vec<_> = ids
                .iter()
                .enumerate()
                .map(|(i, id)| call(i as u32, *id, ok(json!({"id": id}))))
                .collect();
            let distinct: HashSet<_> = calls.iter().map(signature).collect();
            let minimizer = CorpusMinimizer::new();

            let once = minimizer.minimize(&calls);
            prop_assert_eq!(once.len(), distinct.len());
            prop_assert!(once.len() <= calls.len());

            let twice = minimizer.minimize(&once);
            prop_assert_eq!(&twice, &once);

            let orders: Vec<_> = once.iter().map(|c| c.order_id).collect();
            let mut sorted = orders.clone();
            sorted.sort_unstable();
            prop_assert_eq!(orders, sorted);
        }
    }
}
