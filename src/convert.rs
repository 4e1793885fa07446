//! Conversion between types.
//!
//! Goes beyond `usable_as`: numbers and bools render as strings and parse
//! back, lists, sets and tuples interchange, and maps and objects
//! interchange. Marks survive every conversion.
use std::collections::BTreeMap;

use crate::error::{ConversionError, ConversionFailure};
use crate::path::{IndexKey, Path, Step};
use crate::types::{ObjectType, Type};
use crate::validate::Engine;
use crate::value::{Number, Payload, Value};

/// Convert with the default configuration.
pub fn convert(value: &Value, ty: &Type) -> Result<Value, ConversionError> {
    Engine::default().convert(value, ty)
}

type Converted = Result<Value, ConversionError>;

fn fail(path: &Path, from: &Type, to: &Type, reason: ConversionFailure) -> ConversionError {
    ConversionError { path: path.clone(), from: from.clone(), to: to.clone(), reason }
}

// ------------------------------ Type level -------------------------------- //

/// Whether some value of `from` could convert to `to`. Decides conversions
/// of null and unknown values, which have no payload to try.
pub fn conversion_possible(from: &Type, to: &Type) -> bool {
    if from == to || to.is_dynamic() || from.is_dynamic() {
        return true;
    }
    match (from, to) {
        (Type::Number, Type::Bool) | (Type::Bool, Type::Number) => false,
        (a, b) if a.is_primitive() && b.is_primitive() => true,
        (Type::List(e) | Type::Set(e), Type::List(t) | Type::Set(t)) => conversion_possible(e, t),
        (Type::Tuple(es), Type::List(t) | Type::Set(t)) => es.iter().all(|e| conversion_possible(e, t)),
        (Type::List(e) | Type::Set(e), Type::Tuple(ts)) => ts.iter().all(|t| conversion_possible(e, t)),
        (Type::Tuple(es), Type::Tuple(ts)) => {
            es.len() == ts.len() && es.iter().zip(ts.iter()).all(|(e, t)| conversion_possible(e, t))
        }
        (Type::Map(e), Type::Map(t)) => conversion_possible(e, t),
        (Type::Object(o), Type::Map(t)) => o.attributes().values().all(|a| conversion_possible(a, t)),
        (Type::Map(e), Type::Object(o)) => o.attributes().values().all(|a| conversion_possible(e, a)),
        (Type::Object(src), Type::Object(dst)) => dst.attributes().iter().all(|(name, t)| {
            match src.attribute_type(name) {
                Some(s) => conversion_possible(s, t),
                None => dst.is_optional(name),
            }
        }),
        _ => false,
    }
}

// ------------------------------ Value level ------------------------------- //

impl Engine {
    pub fn convert(&self, value: &Value, ty: &Type) -> Converted {
        let mut path = Path::empty();
        self.convert_at(value, ty, &mut path, 0)
    }

    fn convert_at(&self, value: &Value, ty: &Type, path: &mut Path, depth: usize) -> Converted {
        let from = value.ty();
        if from == ty || ty.is_dynamic() {
            return Ok(value.clone());
        }
        let limit = self.config().max_depth;
        if depth > limit {
            return Err(fail(path, from, ty, ConversionFailure::DepthExceeded { limit }));
        }
        if let Some(placeholder) = value.retyped_placeholder(ty) {
            return if conversion_possible(from, ty) {
                Ok(placeholder)
            } else {
                Err(fail(path, from, ty, ConversionFailure::Unsupported))
            };
        }
        let Some(payload) = value.payload() else {
            return Err(fail(path, from, ty, ConversionFailure::Unsupported));
        };

        let converted = match (payload, ty) {
            (Payload::Number(n), Type::String) => Value::string(n.to_plain_string()),
            (Payload::Bool(b), Type::String) => Value::string(if *b { "true" } else { "false" }),
            (Payload::String(s), Type::Number) => match Number::parse_bounded(s, self.config().max_number_exponent) {
                Ok(n) => Value::number(n),
                Err(_) => return Err(fail(path, from, ty, ConversionFailure::InvalidNumber(s.clone()))),
            },
            (Payload::String(s), Type::Bool) => match parse_bool(s) {
                Some(b) => Value::bool(b),
                None => return Err(fail(path, from, ty, ConversionFailure::InvalidBool(s.clone()))),
            },

            (Payload::Seq(xs), Type::List(elem) | Type::Set(elem)) if is_sequence(from) => {
                let elems = self.convert_elements(xs, |_| &**elem, path, depth)?;
                Value::sequence(ty.clone(), elems)
            }
            (Payload::Seq(xs), Type::Tuple(types)) if is_sequence(from) => {
                if xs.len() != types.len() {
                    return Err(fail(path, from, ty, ConversionFailure::LengthMismatch {
                        expected: types.len(),
                        found: xs.len(),
                    }));
                }
                let elems = self.convert_elements(xs, |i| &types[i], path, depth)?;
                Value::sequence(ty.clone(), elems)
            }

            (Payload::Map(entries), Type::Map(elem)) => {
                let mut out = BTreeMap::new();
                for (k, v) in entries {
                    path.push(Step::Index(IndexKey::String(k.clone())));
                    out.insert(k.clone(), self.convert_at(v, elem, path, depth + 1)?);
                    path.pop();
                }
                Value::mapping(ty.clone(), out)
            }
            (Payload::Map(entries), Type::Object(obj)) => {
                // objects may shed attributes the target lacks; maps may not
                if let Type::Map(_) = from {
                    if let Some(extra) = entries.keys().find(|k| !obj.has_attribute(k)) {
                        return Err(fail(
                            &path.get_attr(extra.as_str()),
                            from,
                            ty,
                            ConversionFailure::ExtraneousAttribute(extra.clone()),
                        ));
                    }
                }
                let attrs = self.convert_attributes(entries, from, ty, obj, path, depth)?;
                Value::mapping(ty.clone(), attrs)
            }
            _ => return Err(fail(path, from, ty, ConversionFailure::Unsupported)),
        };
        Ok(converted.with_marks(value.marks().iter().cloned()))
    }

    fn convert_elements<'t, F>(&self, xs: &[Value], elem_ty: F, path: &mut Path, depth: usize) -> Result<Vec<Value>, ConversionError>
    where
        F: Fn(usize) -> &'t Type,
    {
        let mut out = Vec::with_capacity(xs.len());
        for (i, x) in xs.iter().enumerate() {
            path.push(Step::Index(IndexKey::from(i)));
            out.push(self.convert_at(x, elem_ty(i), path, depth + 1)?);
            path.pop();
        }
        Ok(out)
    }

    fn convert_attributes(
        &self,
        entries: &BTreeMap<String, Value>,
        from: &Type,
        ty: &Type,
        obj: &ObjectType,
        path: &mut Path,
        depth: usize,
    ) -> Result<BTreeMap<String, Value>, ConversionError> {
        let mut out = BTreeMap::new();
        for (name, attr_ty) in obj.attributes() {
            let value = match entries.get(name) {
                Some(v) => {
                    path.push(Step::GetAttr(name.clone()));
                    let converted = self.convert_at(v, attr_ty, path, depth + 1)?;
                    path.pop();
                    converted
                }
                None if obj.is_optional(name) => Value::null(attr_ty.clone()),
                None => {
                    return Err(fail(
                        &path.get_attr(name.as_str()),
                        from,
                        ty,
                        ConversionFailure::MissingAttribute(name.clone()),
                    ));
                }
            };
            out.insert(name.clone(), value);
        }
        Ok(out)
    }
}

fn is_sequence(ty: &Type) -> bool {
    matches!(ty, Type::List(_) | Type::Set(_) | Type::Tuple(_))
}

fn parse_bool(s: &str) -> Option<bool> {
    match s {
        "1" => Some(true),
        "0" => Some(false),
        s if s.eq_ignore_ascii_case("true") => Some(true),
        s if s.eq_ignore_ascii_case("false") => Some(false),
        _ => None,
    }
}

// ------------------------------- Tests ------------------------------------ //

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::Native;
    use crate::validate::validate;
    use crate::value::{Mark, Refinement};
    use serde_json::json;

    fn val(raw: serde_json::Value, ty: &Type) -> Value {
        validate(&Native::from(raw), ty).unwrap()
    }

    #[test]
    fn primitives_to_string() {
        assert_eq!(convert(&Value::number(123i64), &Type::String).unwrap(), Value::string("123"));
        let n = val(json!(123.45), &Type::Number);
        assert_eq!(convert(&n, &Type::String).unwrap(), Value::string("123.45"));
        assert_eq!(convert(&Value::bool(false), &Type::String).unwrap(), Value::string("false"));
    }

    #[test]
    fn strings_to_primitives() {
        assert_eq!(convert(&Value::string("-1.5e2"), &Type::Number).unwrap(), Value::number(-150i64));
        assert_eq!(convert(&Value::string("TRUE"), &Type::Bool).unwrap(), Value::bool(true));
        assert_eq!(convert(&Value::string("0"), &Type::Bool).unwrap(), Value::bool(false));

        let err = convert(&Value::string("not-a-number"), &Type::Number).unwrap_err();
        assert_eq!(err.reason, ConversionFailure::InvalidNumber("not-a-number".into()));
        assert!(convert(&Value::string("yes"), &Type::Bool).is_err());
    }

    #[test]
    fn number_and_bool_do_not_mix() {
        assert_eq!(
            convert(&Value::number(1i64), &Type::Bool).unwrap_err().reason,
            ConversionFailure::Unsupported
        );
        assert!(convert(&Value::bool(true), &Type::Number).is_err());
    }

    #[test]
    fn collections_interchange() {
        let list = val(json!(["b", "a", "b"]), &Type::list(Type::String));
        let set = convert(&list, &Type::set(Type::String)).unwrap();
        assert_eq!(set.len(), Some(2));
        let back = convert(&set, &Type::list(Type::String)).unwrap();
        assert_eq!(back, val(json!(["a", "b"]), &Type::list(Type::String)));

        let tuple = val(json!(["a", 1]), &Type::tuple([Type::String, Type::Number]));
        let as_list = convert(&tuple, &Type::list(Type::Dynamic)).unwrap();
        assert_eq!(as_list.ty(), &Type::list(Type::Dynamic));
        let strings = convert(&tuple, &Type::list(Type::String)).unwrap();
        assert_eq!(strings, val(json!(["a", "1"]), &Type::list(Type::String)));

        let err = convert(&list, &Type::tuple([Type::String])).unwrap_err();
        assert_eq!(err.reason, ConversionFailure::LengthMismatch { expected: 1, found: 3 });
    }

    #[test]
    fn element_failures_carry_a_path() {
        let list = val(json!(["1", "x"]), &Type::list(Type::String));
        let err = convert(&list, &Type::list(Type::Number)).unwrap_err();
        assert_eq!(err.path, Path::empty().index(1));
    }

    #[test]
    fn objects_and_maps() {
        let obj_ty = Type::object([("a", Type::String), ("b", Type::Number)]);
        let obj = val(json!({"a": "x", "b": 2}), &obj_ty);

        let map = convert(&obj, &Type::map(Type::String)).unwrap();
        assert_eq!(map.index("b").unwrap(), Value::string("2"));

        let narrower = convert(&obj, &Type::object([("a", Type::String)])).unwrap();
        assert_eq!(narrower.len(), Some(1));

        let wider = Type::object_with_optional([("a", Type::String), ("c", Type::Bool)], ["c"]).unwrap();
        let widened = convert(&obj, &wider).unwrap();
        assert!(widened.get_attr("c").unwrap().is_null());

        let m = val(json!({"a": "x", "zz": "y"}), &Type::map(Type::String));
        let err = convert(&m, &Type::object([("a", Type::String)])).unwrap_err();
        assert_eq!(err.reason, ConversionFailure::ExtraneousAttribute("zz".into()));

        let empty = val(json!({}), &Type::empty_object());
        assert!(convert(&empty, &Type::list(Type::Dynamic)).is_err());
    }

    #[test]
    fn dynamic_keeps_the_concrete_type() {
        let obj = val(json!({"a": "x"}), &Type::object([("a", Type::String)]));
        let out = convert(&obj, &Type::Dynamic).unwrap();
        assert_eq!(out.ty(), &Type::object([("a", Type::String)]));
    }

    #[test]
    fn null_and_unknown_retype() {
        let n = convert(&Value::null(Type::String), &Type::Number).unwrap();
        assert!(n.is_null() && n.ty() == &Type::Number);

        let u = Value::unknown_refined(Type::String, Refinement::new().not_null().string_prefix("ab"));
        let out = convert(&u, &Type::Number).unwrap();
        assert!(out.is_unknown());
        assert_eq!(out.refinement(), Some(&Refinement::new().not_null()));

        assert!(convert(&Value::null(Type::Number), &Type::Bool).is_err());
    }

    #[test]
    fn marks_survive() {
        let marked = Value::number(123i64).mark(Mark::sensitive());
        let out = convert(&marked, &Type::String).unwrap();
        assert!(out.has_mark(&Mark::sensitive()));
        assert_eq!(out.as_str(), Some("123"));
    }

    #[test]
    fn type_level_possibility() {
        assert!(conversion_possible(&Type::list(Type::Number), &Type::set(Type::String)));
        assert!(!conversion_possible(&Type::list(Type::Number), &Type::map(Type::Number)));
        assert!(!conversion_possible(&Type::Number, &Type::Bool));
    }

    #[test]
    fn unknown_list_to_set_loosens_the_minimum_length() {
        let raw = Native::list([Native::from("a"), Native::from("a"), Native::Value(Value::unknown(Type::String))]);
        let list = validate(&raw, &Type::list(Type::String)).unwrap();
        let r = list.refinement().unwrap();
        assert_eq!((r.length_lower(), r.length_upper()), (Some(3), Some(3)));

        let set = convert(&list, &Type::set(Type::String)).unwrap();
        let r = set.refinement().unwrap();
        assert_eq!((r.length_lower(), r.length_upper()), (Some(1), Some(3)));

        let empty = Value::unknown_refined(Type::list(Type::String), Refinement::new().exact_length(0));
        let r = convert(&empty, &Type::set(Type::String)).unwrap().refinement().cloned().unwrap();
        assert_eq!((r.length_lower(), r.length_upper()), (Some(0), Some(0)));

        let back = convert(&set, &Type::list(Type::String)).unwrap();
        assert_eq!(back.refinement().unwrap().length_lower(), Some(1));
    }
}
