//! Type inference for native data.
//!
//! Observe a native value and compute the most specific type that describes
//! it; fold many observations together with `unify`, the least upper bound
//! over the type lattice (`dynamic` is the top). Used by `validate` when the
//! target is `dynamic`, and by the CLI to infer a schema from many documents.
//!
//! - Join is order-independent: `unify` deduplicates before it looks.
//! - Nothing is cached; inference is a pure walk bounded by a depth limit.
pub mod unify;

use indexmap::IndexMap;
use unicode_normalization::UnicodeNormalization;

use crate::config::DEFAULT_MAX_DEPTH;
use crate::native::Native;
use crate::types::Type;

pub use unify::unify;

// ------------------------------ Observe ---------------------------------- //

/// Most specific type for `native`. Absent values carry no evidence and infer
/// `dynamic`.
pub fn infer_type(native: &Native) -> Type {
    infer_bounded(native, DEFAULT_MAX_DEPTH)
}

/// Inference that stops descending past `max_depth`; anything deeper is
/// `dynamic`.
pub(crate) fn infer_bounded(native: &Native, max_depth: usize) -> Type {
    observe(native, 0, max_depth)
}

fn observe(native: &Native, depth: usize, limit: usize) -> Type {
    if depth > limit {
        return Type::Dynamic;
    }
    let child = |n: &Native| observe(n, depth + 1, limit);
    match native {
        Native::Absent => Type::Dynamic,
        Native::Value(v) => v.ty().clone(),
        Native::Bool(_) => Type::Bool,
        Native::Int(_) | Native::Float(_) | Native::Number(_) => Type::Number,
        Native::String(_) | Native::Bytes(_) => Type::String,
        Native::Capsule(h) => Type::Capsule(h.capsule_type().clone()),
        Native::List(xs) => Type::list(unify(&xs.iter().map(child).collect::<Vec<_>>())),
        Native::Set(xs) => Type::set(unify(&xs.iter().map(child).collect::<Vec<_>>())),
        Native::Tuple(xs) => Type::tuple(xs.iter().map(child)),
        Native::Map(entries) => observe_map(entries, child),
    }
}

/// String-keyed maps are objects (one attribute per key); anything else is a
/// map over the unified value types.
fn observe_map<F>(entries: &[(Native, Native)], child: F) -> Type
where
    F: Fn(&Native) -> Type,
{
    if entries.is_empty() {
        return Type::empty_object();
    }
    let string_keyed = entries.iter().all(|(k, _)| k.as_key().is_some());
    if !string_keyed {
        let values: Vec<Type> = entries.iter().map(|(_, v)| child(v)).collect();
        return Type::map(unify(&values));
    }
    let mut attrs: IndexMap<String, Type> = IndexMap::with_capacity(entries.len());
    for (k, v) in entries {
        let name: String = k.as_key().unwrap_or_default().nfc().collect();
        attrs.insert(name, child(v));
    }
    Type::object(attrs)
}

// ------------------------------- Front API -------------------------------- //

/// Accumulates observations and solves for one type covering all of them.
#[derive(Debug, Default)]
pub struct Inference {
    seen: Vec<Type>,
    samples: u64,
}

impl Inference {
    pub fn new() -> Self { Self::default() }

    pub fn observe(&mut self, native: &Native) {
        let ty = infer_type(native);
        self.samples += 1;
        if !self.seen.contains(&ty) {
            self.seen.push(ty);
        }
    }

    pub fn observe_json(&mut self, v: &serde_json::Value) {
        self.observe(&Native::from(v.clone()));
    }

    pub fn samples(&self) -> u64 { self.samples }

    pub fn solve(&self) -> Type {
        unify(&self.seen)
    }
}

pub fn infer_from_json<'a, I>(values: I) -> Type
where
    I: IntoIterator<Item = &'a serde_json::Value>,
{
    let mut inf = Inference::new();
    for v in values {
        inf.observe_json(v);
    }
    inf.solve()
}

// ------------------------------- Tests ------------------------------------ //

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;
    use serde_json::json;

    fn infer(v: serde_json::Value) -> Type {
        infer_type(&Native::from(v))
    }

    #[test]
    fn primitives() {
        assert_eq!(infer(json!(true)), Type::Bool);
        assert_eq!(infer(json!(1.5)), Type::Number);
        assert_eq!(infer(json!("s")), Type::String);
        assert_eq!(infer(json!(null)), Type::Dynamic);
        assert_eq!(infer_type(&Native::Bytes(b"x".to_vec())), Type::String);
    }

    #[test]
    fn lists_unify_their_elements() {
        assert_eq!(infer(json!([1, 2])), Type::list(Type::Number));
        assert_eq!(infer(json!([1, "a"])), Type::list(Type::Dynamic));
        assert_eq!(infer(json!([])), Type::list(Type::Dynamic));
        assert_eq!(infer(json!([1, null])), Type::list(Type::Dynamic));
    }

    #[test]
    fn string_keyed_maps_are_objects() {
        assert_eq!(
            infer(json!({"a": 1, "b": ["x"]})),
            Type::object([("a", Type::Number), ("b", Type::list(Type::String))])
        );
        assert_eq!(infer(json!({})), Type::empty_object());
    }

    #[test]
    fn non_string_keys_make_a_map() {
        let n = Native::Map(vec![(Native::Int(1), Native::from("v")), (Native::Int(2), Native::from("w"))]);
        assert_eq!(infer_type(&n), Type::map(Type::String));
    }

    #[test]
    fn tuples_and_sets_keep_their_kind() {
        let t = Native::Tuple(vec![Native::from("a"), Native::Int(1)]);
        assert_eq!(infer_type(&t), Type::tuple([Type::String, Type::Number]));
        let s = Native::Set(vec![Native::from(true)]);
        assert_eq!(infer_type(&s), Type::set(Type::Bool));
    }

    #[test]
    fn nested_values_contribute_their_type() {
        let n = Native::list([Native::Value(Value::unknown(Type::String)), Native::from("x")]);
        assert_eq!(infer_type(&n), Type::list(Type::String));
    }

    #[test]
    fn depth_limit_degrades_to_dynamic() {
        let deep = json!([[[[1]]]]);
        let ty = infer_bounded(&Native::from(deep), 2);
        assert_eq!(ty, Type::list(Type::list(Type::list(Type::Dynamic))));
    }

    #[test]
    fn front_api_unifies_documents() {
        let a = json!({"x": 1, "y": "a"});
        let b = json!({"x": 2, "z": true});
        let ty = infer_from_json([&a, &b]);
        assert_eq!(ty, Type::object([("x", Type::Number)]));

        let mut inf = Inference::new();
        inf.observe_json(&a);
        inf.observe_json(&a);
        assert_eq!(inf.samples(), 2);
        assert_eq!(inf.solve(), Type::object([("x", Type::Number), ("y", Type::String)]));
    }
}
