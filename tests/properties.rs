use cty::{Native, Type, Value};
use proptest::prelude::*;
use serde_json::{Value as Json, json};

/// Concrete types (no dynamic, no capsules) up to three levels deep.
fn arb_type() -> impl Strategy<Value = Type> {
    let leaf = prop_oneof![Just(Type::String), Just(Type::Number), Just(Type::Bool)];
    leaf.prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            inner.clone().prop_map(Type::list),
            inner.clone().prop_map(Type::set),
            inner.clone().prop_map(Type::map),
            prop::collection::vec(inner.clone(), 0..4).prop_map(Type::tuple),
            prop::collection::btree_map("[a-z]{1,6}", inner, 0..4).prop_map(Type::object),
        ]
    })
}

/// JSON documents that validate against `ty`.
fn arb_json(ty: &Type) -> BoxedStrategy<Json> {
    match ty {
        Type::String => "[a-zA-Z0-9 _\u{e9}]{0,12}".prop_map(Json::String).boxed(),
        Type::Number => any::<i64>().prop_map(|n| json!(n)).boxed(),
        Type::Bool => any::<bool>().prop_map(Json::Bool).boxed(),
        Type::List(elem) | Type::Set(elem) => prop::collection::vec(arb_json(elem), 0..4).prop_map(Json::Array).boxed(),
        Type::Map(elem) => prop::collection::btree_map("[a-z]{1,6}", arb_json(elem), 0..4)
            .prop_map(|m| Json::Object(m.into_iter().collect()))
            .boxed(),
        Type::Tuple(elems) => elems.iter().map(arb_json).collect::<Vec<_>>().prop_map(Json::Array).boxed(),
        Type::Object(object) => object
            .attributes()
            .iter()
            .map(|(name, attr)| (Just(name.clone()), arb_json(attr)))
            .collect::<Vec<_>>()
            .prop_map(|pairs| Json::Object(pairs.into_iter().collect()))
            .boxed(),
        Type::Dynamic | Type::Capsule(_) => Just(Json::Null).boxed(),
    }
}

fn arb_typed_json() -> impl Strategy<Value = (Type, Json)> {
    arb_type().prop_flat_map(|ty| {
        let json = arb_json(&ty);
        (Just(ty), json)
    })
}

fn validated(ty: &Type, json: &Json) -> Value {
    cty::validate(&Native::from(json.clone()), ty).unwrap()
}

proptest! {
    #[test]
    fn msgpack_round_trip((ty, json) in arb_typed_json()) {
        let value = validated(&ty, &json);
        let bytes = cty::encode_msgpack(&value).unwrap();
        let back = cty::decode_msgpack(&bytes, &ty).unwrap();
        prop_assert_eq!(back, value);
    }

    #[test]
    fn json_round_trip((ty, json) in arb_typed_json()) {
        let value = validated(&ty, &json);
        let bytes = cty::encode_json(&value).unwrap();
        let back = cty::decode_json(&bytes, &ty).unwrap();
        prop_assert_eq!(back, value);
    }

    #[test]
    fn msgpack_encoding_is_deterministic((ty, json) in arb_typed_json()) {
        let a = cty::encode_msgpack(&validated(&ty, &json)).unwrap();
        let b = cty::encode_msgpack(&validated(&ty, &json)).unwrap();
        prop_assert_eq!(a, b);
    }

    #[test]
    fn type_relations_are_reflexive(ty in arb_type()) {
        prop_assert!(ty.equal(&ty));
        prop_assert!(ty.usable_as(&ty));
        prop_assert!(ty.usable_as(&Type::Dynamic));
        prop_assert!(Type::list(ty.clone()).usable_as(&Type::list(Type::Dynamic)));
    }

    #[test]
    fn unify_is_idempotent(ty in arb_type(), n in 1usize..4) {
        let unified = cty::unify(&vec![ty.clone(); n]);
        prop_assert_eq!(&unified, &ty);
        prop_assert_eq!(cty::unify(&[unified.clone(), unified.clone()]), unified);
    }

    #[test]
    fn decomposed_and_composed_keys_validate_alike(suffix in "[a-z]{0,5}", n in any::<i64>()) {
        let ty = Type::map(Type::Number);
        let composed = validated(&ty, &json!({ format!("\u{e9}{suffix}"): n }));
        let decomposed = validated(&ty, &json!({ format!("e\u{301}{suffix}"): n }));
        prop_assert_eq!(&composed, &decomposed);
        let recomposed = validated(&ty, &json!({ format!("\u{e9}{suffix}"): n }));
        prop_assert!(composed.raw_equal(&recomposed));
    }

    #[test]
    fn one_unknown_element_makes_the_list_unknown(
        (elem, items) in arb_type().prop_flat_map(|ty| {
            let items = prop::collection::vec(arb_json(&ty), 0..4);
            (Just(ty), items)
        }),
        at in 0usize..5,
    ) {
        let mut natives: Vec<Native> = items.into_iter().map(Native::from).collect();
        let at = at.min(natives.len());
        natives.insert(at, Native::Value(Value::unknown(elem.clone())));
        let out = cty::validate(&Native::List(natives), &Type::list(elem.clone())).unwrap();
        prop_assert!(out.is_unknown());
        prop_assert_eq!(out.ty(), &Type::list(elem));
    }
}
