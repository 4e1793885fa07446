//! Validation: native data in, typed `Value` out.
//!
//! Dispatch is on the target type. The walk keeps one scratch path and
//! stops at the first failure, reporting the path to it.
use std::collections::BTreeMap;

use unicode_normalization::UnicodeNormalization;

use crate::config::Config;
use crate::error::{
    Found, MapValidationKind, ObjectValidationKind, ValidationError, ValidationErrorKind,
};
use crate::inference::infer_bounded;
use crate::native::Native;
use crate::path::{IndexKey, Path, Step};
use crate::types::{ObjectType, Type};
use crate::value::{Number, Value};

/// Validation, conversion and decoding under one configuration.
#[derive(Debug, Clone, Default)]
pub struct Engine {
    config: Config,
}

/// Validate with the default configuration.
pub fn validate(raw: &Native, ty: &Type) -> Result<Value, ValidationError> {
    Engine::default().validate(raw, ty)
}

type Validated = Result<Value, ValidationError>;

fn fail(path: &Path, kind: ValidationErrorKind) -> ValidationError {
    ValidationError::new(path.clone(), kind)
}

fn mismatch(path: &Path, expected: &Type, raw: &Native) -> ValidationError {
    fail(path, ValidationErrorKind::TypeMismatch { expected: expected.clone(), found: Found::Native(raw.kind_name()) })
}

impl Engine {
    pub fn new(config: Config) -> Self {
        Engine { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn validate(&self, raw: &Native, ty: &Type) -> Validated {
        let mut path = Path::empty();
        self.validate_at(raw, ty, &mut path, 0)
    }

    fn validate_at(&self, raw: &Native, ty: &Type, path: &mut Path, depth: usize) -> Validated {
        if depth > self.config.max_depth {
            return Err(fail(path, ValidationErrorKind::DepthExceeded { limit: self.config.max_depth }));
        }
        match raw {
            Native::Absent => return Ok(Value::null(ty.clone())),
            Native::Value(v) => return self.accept_value(v, ty, path),
            _ => {}
        }

        match ty {
            Type::Dynamic => {
                let remaining = self.config.max_depth.saturating_sub(depth);
                let inferred = infer_bounded(raw, remaining);
                if inferred.is_dynamic() {
                    return Err(mismatch(path, ty, raw));
                }
                self.validate_at(raw, &inferred, path, depth)
            }
            Type::Bool => match raw {
                Native::Bool(b) => Ok(Value::bool(*b)),
                _ => Err(mismatch(path, ty, raw)),
            },
            Type::Number => self.number(raw, path).map(Value::number),
            Type::String => match raw {
                Native::String(s) => Ok(Value::string(s.clone())),
                Native::Bytes(b) => match std::str::from_utf8(b) {
                    Ok(s) => Ok(Value::string(s)),
                    Err(_) => Err(mismatch(path, ty, raw)),
                },
                _ => Err(mismatch(path, ty, raw)),
            },
            Type::List(elem) => match raw {
                Native::List(xs) | Native::Tuple(xs) => {
                    let elems = self.elements(xs, |_| &**elem, path, depth)?;
                    Ok(Value::sequence(ty.clone(), elems))
                }
                _ => Err(mismatch(path, ty, raw)),
            },
            Type::Set(elem) => match raw {
                Native::List(xs) | Native::Tuple(xs) | Native::Set(xs) => {
                    let elems = self.elements(xs, |_| &**elem, path, depth)?;
                    Ok(Value::sequence(ty.clone(), elems))
                }
                _ => Err(mismatch(path, ty, raw)),
            },
            Type::Tuple(types) => match raw {
                Native::List(xs) | Native::Tuple(xs) => {
                    if xs.len() != types.len() {
                        return Err(fail(path, ValidationErrorKind::TupleLength {
                            expected: types.len(),
                            found: xs.len(),
                        }));
                    }
                    let elems = self.elements(xs, |i| &types[i], path, depth)?;
                    Ok(Value::sequence(ty.clone(), elems))
                }
                _ => Err(mismatch(path, ty, raw)),
            },
            Type::Map(elem) => match raw {
                Native::Map(entries) => self.map(entries, ty, elem, path, depth),
                _ => Err(mismatch(path, ty, raw)),
            },
            Type::Object(obj) => match raw {
                Native::Map(entries) => self.object(entries, ty, obj, path, depth),
                _ => Err(mismatch(path, ty, raw)),
            },
            Type::Capsule(expected) => match raw {
                Native::Capsule(h) if h.capsule_type() == expected => Ok(Value::capsule(h.clone())),
                Native::Capsule(h) => Err(fail(path, ValidationErrorKind::CapsuleMismatch {
                    expected: expected.name().to_string(),
                    found: Found::Value(Type::Capsule(h.capsule_type().clone())),
                })),
                _ => Err(fail(path, ValidationErrorKind::CapsuleMismatch {
                    expected: expected.name().to_string(),
                    found: Found::Native(raw.kind_name()),
                })),
            },
        }
    }

    /// Input that already is a `Value`.
    fn accept_value(&self, v: &Value, ty: &Type, path: &Path) -> Validated {
        // dynamic slots keep the value's own concrete type
        if v.ty() == ty || ty.is_dynamic() {
            return Ok(v.clone());
        }
        if !v.ty().usable_as(ty) {
            return Err(fail(path, ValidationErrorKind::TypeMismatch {
                expected: ty.clone(),
                found: Found::Value(v.ty().clone()),
            }));
        }
        if let Some(placeholder) = v.retyped_placeholder(ty) {
            return Ok(placeholder);
        }
        self.convert(v, ty).map_err(|err| {
            let mut at = path.clone();
            for step in err.path.steps() {
                at.push(step.clone());
            }
            fail(&at, ValidationErrorKind::TypeMismatch { expected: err.to, found: Found::Value(err.from) })
        })
    }

    fn number(&self, raw: &Native, path: &Path) -> Result<Number, ValidationError> {
        let limit = self.config.max_number_exponent;
        match raw {
            Native::Int(i) => Ok(Number::from(*i)),
            Native::Number(n) if n.within_exponent(limit) => Ok(n.clone()),
            Native::Number(n) => Err(fail(path, ValidationErrorKind::InvalidNumber(n.to_scientific_string()))),
            Native::Float(f) => Number::from_f64(*f)
                .filter(|n| n.within_exponent(limit))
                .ok_or_else(|| fail(path, ValidationErrorKind::NumberNotRepresentable(f.to_string()))),
            Native::String(s) => Number::parse_bounded(s, limit)
                .map_err(|_| fail(path, ValidationErrorKind::InvalidNumber(s.clone()))),
            _ => Err(mismatch(path, &Type::Number, raw)),
        }
    }

    fn elements<'t, F>(&self, xs: &[Native], elem_ty: F, path: &mut Path, depth: usize) -> Result<Vec<Value>, ValidationError>
    where
        F: Fn(usize) -> &'t Type,
    {
        let mut out = Vec::with_capacity(xs.len());
        for (i, x) in xs.iter().enumerate() {
            path.push(Step::Index(IndexKey::from(i)));
            out.push(self.validate_at(x, elem_ty(i), path, depth + 1)?);
            path.pop();
        }
        Ok(out)
    }

    fn map(&self, entries: &[(Native, Native)], ty: &Type, elem: &Type, path: &mut Path, depth: usize) -> Validated {
        let mut out = BTreeMap::new();
        for (k, v) in entries {
            let Some(key) = k.as_key() else {
                return Err(fail(path, ValidationErrorKind::Map(MapValidationKind::NonStringKey {
                    key_type: k.kind_name().to_string(),
                })));
            };
            let key: String = key.nfc().collect();
            if out.contains_key(&key) {
                return Err(fail(path, ValidationErrorKind::Map(MapValidationKind::DuplicateKey(key))));
            }
            path.push(Step::Index(IndexKey::String(key.clone())));
            let value = self.validate_at(v, elem, path, depth + 1)?;
            path.pop();
            out.insert(key, value);
        }
        Ok(Value::mapping(ty.clone(), out))
    }

    fn object(&self, entries: &[(Native, Native)], ty: &Type, obj: &ObjectType, path: &mut Path, depth: usize) -> Validated {
        let mut given: BTreeMap<String, &Native> = BTreeMap::new();
        for (k, v) in entries {
            let Some(key) = k.as_key() else {
                return Err(fail(path, ValidationErrorKind::Object(ObjectValidationKind::NonStringKey {
                    key_type: k.kind_name().to_string(),
                })));
            };
            let key: String = key.nfc().collect();
            if given.insert(key.clone(), v).is_some() {
                return Err(fail(path, ValidationErrorKind::Object(ObjectValidationKind::DuplicateKey(key))));
            }
        }
        if let Some(extra) = given.keys().find(|k| !obj.has_attribute(k)) {
            return Err(fail(
                &path.get_attr(extra.as_str()),
                ValidationErrorKind::Object(ObjectValidationKind::ExtraneousAttribute(extra.clone())),
            ));
        }

        let mut attrs = BTreeMap::new();
        for (name, attr_ty) in obj.attributes() {
            let value = match given.get(name.as_str()) {
                Some(raw) => {
                    path.push(Step::GetAttr(name.clone()));
                    let value = self.validate_at(raw, attr_ty, path, depth + 1)?;
                    path.pop();
                    value
                }
                None if obj.is_optional(name) => Value::null(attr_ty.clone()),
                None => {
                    return Err(fail(
                        &path.get_attr(name.as_str()),
                        ValidationErrorKind::Object(ObjectValidationKind::MissingAttribute(name.clone())),
                    ));
                }
            };
            attrs.insert(name.clone(), value);
        }
        Ok(Value::mapping(ty.clone(), attrs))
    }
}

// ------------------------------- Tests ------------------------------------ //

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CapsuleType;
    use crate::value::{Mark, Refinement};
    use serde_json::json;

    fn v(raw: serde_json::Value, ty: &Type) -> Validated {
        validate(&Native::from(raw), ty)
    }

    #[test]
    fn primitives() {
        assert_eq!(v(json!(true), &Type::Bool).unwrap(), Value::bool(true));
        assert_eq!(v(json!(12.5), &Type::Number).unwrap(), Value::number("12.5".parse::<Number>().unwrap()));
        assert_eq!(v(json!("-1.5e2"), &Type::Number).unwrap(), Value::number(-150i64));
        assert_eq!(v(json!("x"), &Type::String).unwrap(), Value::string("x"));
        assert!(v(json!(null), &Type::String).unwrap().is_null());
    }

    #[test]
    fn bool_takes_no_strings() {
        let err = v(json!("true"), &Type::Bool).unwrap_err();
        assert_eq!(
            err.kind,
            ValidationErrorKind::TypeMismatch { expected: Type::Bool, found: Found::Native("str") }
        );
    }

    #[test]
    fn non_finite_floats_are_rejected() {
        let err = validate(&Native::Float(f64::NAN), &Type::Number).unwrap_err();
        assert!(matches!(err.kind, ValidationErrorKind::NumberNotRepresentable(_)));
        let err = v(json!("1e"), &Type::Number).unwrap_err();
        assert_eq!(err.kind, ValidationErrorKind::InvalidNumber("1e".into()));
    }

    #[test]
    fn string_values_are_not_normalized() {
        let decomposed = "e\u{301}";
        let s = v(json!(decomposed), &Type::String).unwrap();
        assert_eq!(s.as_str(), Some(decomposed));
        let bad = validate(&Native::Bytes(vec![0xff, 0xfe]), &Type::String);
        assert!(bad.is_err());
    }

    #[test]
    fn list_errors_carry_index() {
        let err = v(json!(["a", 1]), &Type::list(Type::String)).unwrap_err();
        assert_eq!(err.path, Path::empty().index(1));
    }

    #[test]
    fn set_deduplicates() {
        let s = v(json!(["b", "a", "b"]), &Type::set(Type::String)).unwrap();
        let elems: Vec<&str> = s.elements().unwrap().iter().filter_map(Value::as_str).collect();
        assert_eq!(elems, vec!["a", "b"]);
    }

    #[test]
    fn list_with_unknown_element_is_unknown() {
        let raw = Native::list([Native::from("a"), Native::Value(Value::unknown(Type::String))]);
        let out = validate(&raw, &Type::list(Type::String)).unwrap();
        assert!(out.is_unknown());
        assert_eq!(out.ty(), &Type::list(Type::String));
    }

    #[test]
    fn map_keys_are_nfc_normalized() {
        let ty = Type::map(Type::Number);
        let a = v(json!({"e\u{301}": 1}), &ty).unwrap();
        let b = v(json!({"\u{e9}": 1}), &ty).unwrap();
        assert_eq!(a, b);
        assert!(a.entries().unwrap().contains_key("\u{e9}"));

        let both = v(json!({"e\u{301}": 1, "\u{e9}": 2}), &ty).unwrap_err();
        assert_eq!(both.kind, ValidationErrorKind::Map(MapValidationKind::DuplicateKey("\u{e9}".into())));
    }

    #[test]
    fn map_rejects_non_string_keys_by_type_name() {
        let raw = Native::Map(vec![(Native::Int(123), Native::from("v"))]);
        let err = validate(&raw, &Type::map(Type::String)).unwrap_err();
        assert_eq!(
            err.kind,
            ValidationErrorKind::Map(MapValidationKind::NonStringKey { key_type: "int".into() })
        );
    }

    #[test]
    fn objects() {
        let ty = Type::object_with_optional(
            [("name", Type::String), ("port", Type::Number), ("tags", Type::list(Type::String))],
            ["tags"],
        )
        .unwrap();

        let ok = v(json!({"name": "web", "port": 80}), &ty).unwrap();
        assert!(ok.get_attr("tags").unwrap().is_null());

        let missing = v(json!({"name": "web"}), &ty).unwrap_err();
        assert_eq!(missing.path, Path::empty().get_attr("port"));
        assert_eq!(missing.kind, ValidationErrorKind::Object(ObjectValidationKind::MissingAttribute("port".into())));

        let extra = v(json!({"name": "web", "port": 80, "zzz": 1, "aaa": 2}), &ty).unwrap_err();
        assert_eq!(extra.kind, ValidationErrorKind::Object(ObjectValidationKind::ExtraneousAttribute("aaa".into())));

        let nested = v(json!({"name": "web", "port": 80, "tags": ["a", false]}), &ty).unwrap_err();
        assert_eq!(nested.path.to_string(), ".tags[1]");
    }

    #[test]
    fn tuples_check_length() {
        let ty = Type::tuple([Type::String, Type::Number]);
        assert!(v(json!(["a", 1]), &ty).is_ok());
        let err = v(json!(["a"]), &ty).unwrap_err();
        assert_eq!(err.kind, ValidationErrorKind::TupleLength { expected: 2, found: 1 });
    }

    #[test]
    fn dynamic_infers_a_concrete_type() {
        let out = v(json!({"a": [1, 2]}), &Type::Dynamic).unwrap();
        assert_eq!(out.ty(), &Type::object([("a", Type::list(Type::Number))]));
        let nested = v(json!([1, "x"]), &Type::list(Type::Dynamic)).unwrap();
        let elems = nested.elements().unwrap();
        assert_eq!(elems[0].ty(), &Type::Number);
        assert_eq!(elems[1].ty(), &Type::String);
    }

    #[test]
    fn existing_values() {
        let ty = Type::map(Type::Number);
        let unknown = Value::unknown_refined(ty.clone(), Refinement::new().not_null());
        let out = validate(&Native::Value(unknown.clone()), &ty).unwrap();
        assert!(out.raw_equal(&unknown));

        let null = Value::null(Type::list(Type::String)).mark("m");
        let out = validate(&Native::Value(null), &Type::list(Type::Dynamic)).unwrap();
        assert!(out.is_null() && out.has_mark(&Mark::new("m")));
        assert_eq!(out.ty(), &Type::list(Type::Dynamic));

        let err = validate(&Native::Value(Value::string("x")), &Type::Number).unwrap_err();
        assert_eq!(
            err.kind,
            ValidationErrorKind::TypeMismatch { expected: Type::Number, found: Found::Value(Type::String) }
        );
    }

    #[test]
    fn capsules_check_identity() {
        let cap = CapsuleType::new("conn");
        let other = CapsuleType::new("conn");
        let ty = Type::Capsule(cap.clone());
        assert!(validate(&Native::Capsule(cap.wrap(1u32)), &ty).is_ok());
        let err = validate(&Native::Capsule(other.wrap(1u32)), &ty).unwrap_err();
        assert!(matches!(err.kind, ValidationErrorKind::CapsuleMismatch { .. }));
        assert!(validate(&Native::from("x"), &ty).is_err());
    }

    #[test]
    fn depth_is_bounded() {
        let engine = Engine::new(Config { max_depth: 3, ..Config::default() });
        let ty = Type::list(Type::list(Type::list(Type::list(Type::list(Type::Number)))));
        let err = engine.validate(&Native::from(json!([[[[[1]]]]])), &ty).unwrap_err();
        assert_eq!(err.kind, ValidationErrorKind::DepthExceeded { limit: 3 });
        assert!(engine.validate(&Native::from(json!([[1]])), &Type::list(Type::list(Type::Number))).is_ok());
    }

    #[test]
    fn decomposed_attribute_names_match_either_key_form() {
        let ty = Type::object([("e\u{301}", Type::String)]);
        for key in ["e\u{301}", "\u{e9}"] {
            let out = validate(&Native::map([(key, "v")]), &ty).unwrap();
            assert_eq!(out.get_attr("\u{e9}").unwrap(), Value::string("v"));
            assert_eq!(out.get_attr("e\u{301}").unwrap(), Value::string("v"));
        }
    }

    #[test]
    fn number_exponents_follow_the_config() {
        let err = v(json!("1e2000000"), &Type::Number).unwrap_err();
        assert_eq!(err.kind, ValidationErrorKind::InvalidNumber("1e2000000".into()));
        let literal: serde_json::Value = serde_json::from_str("1e2000000").unwrap();
        let err = v(literal, &Type::Number).unwrap_err();
        assert_eq!(err.kind, ValidationErrorKind::InvalidNumber("1e2000000".into()));

        let tight = Engine::new(Config { max_number_exponent: 2, ..Config::default() });
        assert!(tight.validate(&Native::from("1.25"), &Type::Number).is_ok());
        assert!(tight.validate(&Native::from("1.125"), &Type::Number).is_err());
        assert!(tight.validate(&Native::Float(0.125), &Type::Number).is_err());
        let huge = Number::parse_bounded("1e50", u32::MAX).unwrap();
        assert!(matches!(
            tight.validate(&Native::Number(huge), &Type::Number).unwrap_err().kind,
            ValidationErrorKind::InvalidNumber(_)
        ));
    }
}
