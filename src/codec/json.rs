//! JSON value codec.
//!
//! Numbers keep every digit (the `arbitrary_precision` serde_json feature).
//! JSON has no unknown, so an unknown travels as a reserved sentinel object;
//! a known map or object that could be read back as that sentinel is refused
//! at encode time.
//!
//! Decoding parses the whole document with serde_json first, whose recursion
//! limit caps JSON input at `JSON_NESTING_LIMIT` levels whatever the
//! configured `max_depth`; deeper documents fail as malformed.
use std::collections::BTreeMap;

use serde_json::{Map, Value as Json, json};

use crate::codec::{normalize_key, type_json};
use crate::config::Config;
use crate::error::{DeserializationError, SerializationError, WireFormat, WireShape};
use crate::path::{IndexKey, Path, Step};
use crate::types::{ObjectType, Type};
use crate::value::{Number, Payload, Refinement, Value};

/// Key of the object standing in for an unknown value.
pub const UNKNOWN_SENTINEL_KEY: &str = "$pyvider-cty-special-value";
const UNKNOWN_SENTINEL_VALUE: &str = "unknown";
const REFINEMENTS_KEY: &str = "refinements";

const IS_KNOWN_NULL: &str = "is_known_null";
const STRING_PREFIX: &str = "string_prefix";
const NUMBER_LOWER: &str = "number_lower_bound";
const NUMBER_UPPER: &str = "number_upper_bound";
const LENGTH_LOWER: &str = "collection_length_lower_bound";
const LENGTH_UPPER: &str = "collection_length_upper_bound";

/// serde_json's built-in recursion limit.
pub const JSON_NESTING_LIMIT: usize = 128;

// -------------------------------- Encode ---------------------------------- //

pub fn encode(value: &Value, ty: &Type) -> Result<Vec<u8>, SerializationError> {
    let json = to_json(value, ty)?;
    serde_json::to_vec(&json).map_err(|err| ser_fail(&Path::empty(), err.to_string()))
}

/// The JSON tree `encode` would write.
pub fn to_json(value: &Value, ty: &Type) -> Result<Json, SerializationError> {
    encode_at(value, ty, &mut Path::empty())
}

fn ser_fail(path: &Path, reason: impl Into<String>) -> SerializationError {
    SerializationError { format: WireFormat::Json, path: path.clone(), reason: reason.into() }
}

fn encode_at(value: &Value, ty: &Type, path: &mut Path) -> Result<Json, SerializationError> {
    if value.is_null() {
        return Ok(Json::Null);
    }
    if let Some(refinement) = value.refinement() {
        return Ok(unknown_sentinel(refinement));
    }
    if ty.is_dynamic() {
        let inner = encode_at(value, value.ty(), path)?;
        let concrete = type_json::to_json(value.ty()).map_err(|err| ser_fail(path, err.to_string()))?;
        return Ok(json!({ "value": inner, "type": concrete }));
    }
    let Some(payload) = value.payload() else {
        return Err(ser_fail(path, "value has no payload"));
    };

    Ok(match (payload, ty) {
        (Payload::Bool(b), Type::Bool) => Json::Bool(*b),
        (Payload::Number(n), Type::Number) => number_to_json(n),
        (Payload::String(s), Type::String) => Json::String(s.clone()),
        (Payload::Seq(xs), Type::List(elem) | Type::Set(elem)) => {
            Json::Array(encode_elements(xs, |_| &**elem, path)?)
        }
        (Payload::Seq(xs), Type::Tuple(types)) if xs.len() == types.len() => {
            Json::Array(encode_elements(xs, |i| &types[i], path)?)
        }
        (Payload::Map(entries), Type::Map(elem)) => encode_entries(entries, |_| Some(&**elem), path)?,
        (Payload::Map(entries), Type::Object(obj)) => {
            encode_entries(entries, |name| obj.attribute_type(name), path)?
        }
        (Payload::Capsule(_), _) => return Err(ser_fail(path, "capsule values cannot be serialized")),
        _ => return Err(ser_fail(path, format!("value of type {} does not fit {ty}", value.ty()))),
    })
}

fn encode_elements<'t, F>(xs: &[Value], elem_ty: F, path: &mut Path) -> Result<Vec<Json>, SerializationError>
where
    F: Fn(usize) -> &'t Type,
{
    let mut out = Vec::with_capacity(xs.len());
    for (i, x) in xs.iter().enumerate() {
        path.push(Step::Index(IndexKey::from(i)));
        out.push(encode_at(x, elem_ty(i), path)?);
        path.pop();
    }
    Ok(out)
}

fn encode_entries<'t, F>(entries: &BTreeMap<String, Value>, attr_ty: F, path: &mut Path) -> Result<Json, SerializationError>
where
    F: Fn(&str) -> Option<&'t Type>,
{
    if entries.contains_key(UNKNOWN_SENTINEL_KEY) {
        return Err(ser_fail(path, format!("key {UNKNOWN_SENTINEL_KEY:?} is reserved for unknown values")));
    }
    let mut out = Map::new();
    for (key, v) in entries {
        let Some(ty) = attr_ty(key) else {
            return Err(ser_fail(path, format!("unsupported attribute {key:?}")));
        };
        path.push(Step::Index(IndexKey::String(key.clone())));
        out.insert(key.clone(), encode_at(v, ty, path)?);
        path.pop();
    }
    Ok(Json::Object(out))
}

fn number_to_json(n: &Number) -> Json {
    let plain = n.to_plain_string();
    match plain.parse::<serde_json::Number>() {
        Ok(num) => Json::Number(num),
        Err(_) => Json::String(plain),
    }
}

fn unknown_sentinel(refinement: &Refinement) -> Json {
    let mut out = Map::new();
    out.insert(UNKNOWN_SENTINEL_KEY.to_string(), json!(UNKNOWN_SENTINEL_VALUE));
    if refinement.is_empty() {
        return Json::Object(out);
    }
    let mut refs = Map::new();
    if refinement.is_not_null() {
        refs.insert(IS_KNOWN_NULL.to_string(), json!(false));
    }
    if let Some(prefix) = refinement.prefix() {
        refs.insert(STRING_PREFIX.to_string(), json!(prefix));
    }
    if let Some(b) = refinement.lower_bound() {
        refs.insert(NUMBER_LOWER.to_string(), json!([b.value.to_plain_string(), b.inclusive]));
    }
    if let Some(b) = refinement.upper_bound() {
        refs.insert(NUMBER_UPPER.to_string(), json!([b.value.to_plain_string(), b.inclusive]));
    }
    if let Some(n) = refinement.length_lower() {
        refs.insert(LENGTH_LOWER.to_string(), json!(n));
    }
    if let Some(n) = refinement.length_upper() {
        refs.insert(LENGTH_UPPER.to_string(), json!(n));
    }
    out.insert(REFINEMENTS_KEY.to_string(), Json::Object(refs));
    Json::Object(out)
}

// -------------------------------- Decode ---------------------------------- //

pub fn decode(bytes: &[u8], ty: &Type, config: &Config) -> Result<Value, DeserializationError> {
    let decoder = Decoder {
        byte_len: bytes.len(),
        max_depth: config.max_depth,
        max_exponent: config.max_number_exponent,
    };
    let json: Json = serde_json::from_slice(bytes).map_err(|err| DeserializationError {
        format: WireFormat::Json,
        byte_len: bytes.len(),
        expected: ty.clone(),
        shape: WireShape::Malformed,
        path: Path::empty(),
        reason: err.to_string(),
    })?;
    decoder.value(&json, ty, &mut Path::empty(), 0)
}

fn shape(json: &Json) -> WireShape {
    match json {
        Json::Null => WireShape::Null,
        Json::Bool(_) | Json::Number(_) | Json::String(_) => WireShape::Scalar,
        Json::Array(_) => WireShape::List,
        Json::Object(_) => WireShape::Dict,
    }
}

struct Decoder {
    byte_len: usize,
    max_depth: usize,
    max_exponent: u32,
}

type Decoded = Result<Value, DeserializationError>;

impl Decoder {
    fn fail(&self, path: &Path, ty: &Type, json: &Json, reason: impl Into<String>) -> DeserializationError {
        DeserializationError {
            format: WireFormat::Json,
            byte_len: self.byte_len,
            expected: ty.clone(),
            shape: shape(json),
            path: path.clone(),
            reason: reason.into(),
        }
    }

    fn mismatch(&self, path: &Path, ty: &Type, json: &Json) -> DeserializationError {
        self.fail(path, ty, json, format!("cannot decode {} as {ty}", shape(json)))
    }

    fn value(&self, json: &Json, ty: &Type, path: &mut Path, depth: usize) -> Decoded {
        if depth > self.max_depth {
            let reason = format!("nesting exceeds the maximum depth of {}", self.max_depth);
            return Err(self.fail(path, ty, json, reason));
        }
        if json.is_null() {
            return Ok(Value::null(ty.clone()));
        }
        if let Some(refinement) = self.sentinel(json, ty, path)? {
            return Ok(Value::unknown_refined(ty.clone(), refinement));
        }

        match ty {
            Type::Dynamic => {
                let wrapper = json.as_object().filter(|o| o.len() == 2);
                let Some((Some(inner), Some(spec))) = wrapper.map(|o| (o.get("value"), o.get("type"))) else {
                    return Err(self.fail(path, ty, json, "expected a {\"value\", \"type\"} wrapper"));
                };
                let concrete = type_json::from_json(spec).map_err(|err| self.fail(path, ty, json, err.to_string()))?;
                if concrete.is_dynamic() {
                    return Err(self.fail(path, ty, json, "wrapped type must be concrete"));
                }
                self.value(inner, &concrete, path, depth + 1)
            }
            Type::Bool => match json {
                Json::Bool(b) => Ok(Value::bool(*b)),
                Json::String(s) if s == "true" => Ok(Value::bool(true)),
                Json::String(s) if s == "false" => Ok(Value::bool(false)),
                _ => Err(self.mismatch(path, ty, json)),
            },
            Type::Number => {
                let text = match json {
                    Json::Number(n) => n.to_string(),
                    Json::String(s) => s.clone(),
                    _ => return Err(self.mismatch(path, ty, json)),
                };
                Number::parse_bounded(&text, self.max_exponent)
                    .map(Value::number)
                    .map_err(|err| self.fail(path, ty, json, err.to_string()))
            }
            Type::String => match json {
                Json::String(s) => Ok(Value::string(s.clone())),
                Json::Number(n) => Ok(Value::string(n.to_string())),
                Json::Bool(b) => Ok(Value::string(b.to_string())),
                _ => Err(self.mismatch(path, ty, json)),
            },
            Type::List(elem) | Type::Set(elem) => match json {
                Json::Array(xs) => {
                    let elems = self.elements(xs, |_| &**elem, path, depth)?;
                    Ok(Value::sequence(ty.clone(), elems))
                }
                _ => Err(self.mismatch(path, ty, json)),
            },
            Type::Tuple(types) => match json {
                Json::Array(xs) if xs.len() == types.len() => {
                    let elems = self.elements(xs, |i| &types[i], path, depth)?;
                    Ok(Value::sequence(ty.clone(), elems))
                }
                Json::Array(xs) => {
                    let reason = format!("expected {} elements, found {}", types.len(), xs.len());
                    Err(self.fail(path, ty, json, reason))
                }
                _ => Err(self.mismatch(path, ty, json)),
            },
            Type::Map(elem) => match json {
                Json::Object(o) => {
                    let mut out = BTreeMap::new();
                    for (key, raw) in self.normalized(o, ty, json, path)? {
                        path.push(Step::Index(IndexKey::String(key.clone())));
                        out.insert(key, self.value(raw, elem, path, depth + 1)?);
                        path.pop();
                    }
                    Ok(Value::mapping(ty.clone(), out))
                }
                _ => Err(self.mismatch(path, ty, json)),
            },
            Type::Object(obj) => match json {
                Json::Object(o) => self.object(o, ty, obj, json, path, depth),
                _ => Err(self.mismatch(path, ty, json)),
            },
            Type::Capsule(_) => Err(self.fail(path, ty, json, "capsule values cannot be decoded")),
        }
    }

    fn elements<'t, F>(&self, xs: &[Json], elem_ty: F, path: &mut Path, depth: usize) -> Result<Vec<Value>, DeserializationError>
    where
        F: Fn(usize) -> &'t Type,
    {
        let mut out = Vec::with_capacity(xs.len());
        for (i, x) in xs.iter().enumerate() {
            path.push(Step::Index(IndexKey::from(i)));
            out.push(self.value(x, elem_ty(i), path, depth + 1)?);
            path.pop();
        }
        Ok(out)
    }

    /// Keys in NFC, refusing two that collide once normalized.
    fn normalized<'j>(
        &self,
        o: &'j Map<String, Json>,
        ty: &Type,
        json: &Json,
        path: &Path,
    ) -> Result<BTreeMap<String, &'j Json>, DeserializationError> {
        let mut out = BTreeMap::new();
        for (key, raw) in o {
            let key = normalize_key(key);
            if out.contains_key(&key) {
                return Err(self.fail(path, ty, json, format!("duplicate key {key:?} after normalization")));
            }
            out.insert(key, raw);
        }
        Ok(out)
    }

    fn object(
        &self,
        o: &Map<String, Json>,
        ty: &Type,
        obj: &ObjectType,
        json: &Json,
        path: &mut Path,
        depth: usize,
    ) -> Decoded {
        let given = self.normalized(o, ty, json, path)?;
        if let Some(extra) = given.keys().find(|k| !obj.has_attribute(k)) {
            return Err(self.fail(path, ty, json, format!("unsupported attribute {extra:?}")));
        }
        let mut attrs = BTreeMap::new();
        for (name, attr_ty) in obj.attributes() {
            let value = match given.get(name) {
                Some(raw) => {
                    path.push(Step::GetAttr(name.clone()));
                    let value = self.value(raw, attr_ty, path, depth + 1)?;
                    path.pop();
                    value
                }
                None => Value::null(attr_ty.clone()),
            };
            attrs.insert(name.clone(), value);
        }
        Ok(Value::mapping(ty.clone(), attrs))
    }

    /// `Some` when `json` is the unknown sentinel.
    fn sentinel(&self, json: &Json, ty: &Type, path: &Path) -> Result<Option<Refinement>, DeserializationError> {
        let Some(o) = json.as_object() else { return Ok(None) };
        if o.get(UNKNOWN_SENTINEL_KEY).and_then(Json::as_str) != Some(UNKNOWN_SENTINEL_VALUE) {
            return Ok(None);
        }
        let Some(refs) = o.get(REFINEMENTS_KEY) else {
            return Ok(Some(Refinement::new()));
        };
        let bad = |what: &str| self.fail(path, ty, json, format!("malformed refinement {what}"));
        let Some(refs) = refs.as_object() else { return Err(bad(REFINEMENTS_KEY)) };

        let mut out = Refinement::new();
        if let Some(v) = refs.get(IS_KNOWN_NULL) {
            match v.as_bool() {
                Some(false) => out = out.not_null(),
                Some(true) => {}
                None => return Err(bad(IS_KNOWN_NULL)),
            }
        }
        if let Some(v) = refs.get(STRING_PREFIX) {
            out = out.string_prefix(v.as_str().ok_or_else(|| bad(STRING_PREFIX))?);
        }
        if let Some(v) = refs.get(NUMBER_LOWER) {
            let (n, inclusive) = bound(v, self.max_exponent).ok_or_else(|| bad(NUMBER_LOWER))?;
            out = out.number_lower_bound(n, inclusive);
        }
        if let Some(v) = refs.get(NUMBER_UPPER) {
            let (n, inclusive) = bound(v, self.max_exponent).ok_or_else(|| bad(NUMBER_UPPER))?;
            out = out.number_upper_bound(n, inclusive);
        }
        if let Some(v) = refs.get(LENGTH_LOWER) {
            out = out.length_lower_bound(v.as_u64().ok_or_else(|| bad(LENGTH_LOWER))?);
        }
        if let Some(v) = refs.get(LENGTH_UPPER) {
            out = out.length_upper_bound(v.as_u64().ok_or_else(|| bad(LENGTH_UPPER))?);
        }
        Ok(Some(out))
    }
}

/// `[number, inclusive]`, the number as a JSON number or numeric string.
fn bound(json: &Json, max_exponent: u32) -> Option<(Number, bool)> {
    let [n, inclusive] = json.as_array()?.as_slice() else { return None };
    let n = match n {
        Json::Number(n) => Number::parse_bounded(&n.to_string(), max_exponent).ok()?,
        Json::String(s) => Number::parse_bounded(s, max_exponent).ok()?,
        _ => return None,
    };
    Some((n, inclusive.as_bool()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::Native;
    use crate::validate::validate;

    fn val(raw: Json, ty: &Type) -> Value {
        validate(&Native::from(raw), ty).unwrap()
    }

    fn text(value: &Value, ty: &Type) -> String {
        String::from_utf8(encode(value, ty).unwrap()).unwrap()
    }

    fn dec(src: &str, ty: &Type) -> Result<Value, DeserializationError> {
        decode(src.as_bytes(), ty, &Config::default())
    }

    #[test]
    fn tuple_round_trip() {
        let ty = Type::tuple([Type::String, Type::Number]);
        let v = val(json!(["a", 1]), &ty);
        assert_eq!(text(&v, &ty), r#"["a",1]"#);
        assert_eq!(dec(r#"["a",1]"#, &ty).unwrap(), v);
    }

    #[test]
    fn numbers_keep_every_digit() {
        let src = "123456789012345678901234567890.125";
        let v = dec(src, &Type::Number).unwrap();
        assert_eq!(text(&v, &Type::Number), src);
        assert_eq!(dec(r#""1e3""#, &Type::Number).unwrap(), Value::number(1000i64));
    }

    #[test]
    fn lenient_scalars() {
        assert_eq!(dec("5", &Type::String).unwrap(), Value::string("5"));
        assert_eq!(dec(r#""false""#, &Type::Bool).unwrap(), Value::bool(false));
        assert!(dec(r#""yes""#, &Type::Bool).is_err());
    }

    #[test]
    fn dynamic_slots_carry_their_type() {
        let v = Value::string("hello");
        assert_eq!(text(&v, &Type::Dynamic), r#"{"value":"hello","type":"string"}"#);
        let back = dec(r#"{"value":"hello","type":"string"}"#, &Type::Dynamic).unwrap();
        assert_eq!(back, v);
        let err = dec(r#""hello""#, &Type::Dynamic).unwrap_err();
        assert_eq!(err.shape, WireShape::Scalar);
    }

    #[test]
    fn unknowns_use_the_sentinel() {
        let bare = Value::unknown(Type::String);
        assert_eq!(text(&bare, &Type::String), r#"{"$pyvider-cty-special-value":"unknown"}"#);

        let refined = Value::unknown_refined(
            Type::Number,
            Refinement::new().not_null().number_lower_bound(Number::from(10i64), true),
        );
        let encoded = text(&refined, &Type::Number);
        let back = dec(&encoded, &Type::Number).unwrap();
        assert!(back.raw_equal(&refined), "{encoded}");
    }

    #[test]
    fn reserved_key_is_refused() {
        let ty = Type::map(Type::String);
        let v = val(json!({ UNKNOWN_SENTINEL_KEY: "unknown" }), &ty);
        let err = encode(&v, &ty).unwrap_err();
        assert_eq!(err.format, WireFormat::Json);
    }

    #[test]
    fn objects_fill_missing_and_refuse_extra() {
        let ty = Type::object_with_optional([("name", Type::String), ("age", Type::Number)], ["age"]).unwrap();
        let v = dec(r#"{"name":"Alice"}"#, &ty).unwrap();
        assert!(v.get_attr("age").unwrap().is_null());
        let err = dec(r#"{"name":"Alice","zz":1}"#, &ty).unwrap_err();
        assert!(err.reason.contains("zz"));
    }

    #[test]
    fn nested_errors_carry_a_path() {
        let ty = Type::object([("ports", Type::list(Type::Number))]);
        let err = dec(r#"{"ports":[80,"http"]}"#, &ty).unwrap_err();
        assert_eq!(err.path.to_string(), ".ports[1]");
        assert_eq!(err.expected, Type::Number);
    }

    #[test]
    fn malformed_input() {
        let err = dec("[1,2", &Type::list(Type::Number)).unwrap_err();
        assert_eq!(err.shape, WireShape::Malformed);
        assert_eq!(err.byte_len, 4);
        assert!(dec("1 2", &Type::Number).is_err());
    }

    #[test]
    fn depth_is_bounded() {
        let ty = Type::list(Type::list(Type::list(Type::Number)));
        let shallow = Config { max_depth: 1, ..Config::default() };
        let err = decode(b"[[[1]]]", &ty, &shallow).unwrap_err();
        assert!(err.reason.contains("maximum depth"));
    }

    #[test]
    fn nesting_past_the_parser_limit_is_malformed() {
        let deep = |levels: usize| format!("{}1{}", "[".repeat(levels), "]".repeat(levels));
        let ty = (0..JSON_NESTING_LIMIT + 1).fold(Type::Number, |t, _| Type::list(t));
        let err = decode(deep(JSON_NESTING_LIMIT + 1).as_bytes(), &ty, &Config::default()).unwrap_err();
        assert_eq!(err.shape, WireShape::Malformed);
        assert!(err.reason.contains("recursion limit"), "{}", err.reason);

        let ty = (0..JSON_NESTING_LIMIT - 1).fold(Type::Number, |t, _| Type::list(t));
        assert!(decode(deep(JSON_NESTING_LIMIT - 1).as_bytes(), &ty, &Config::default()).is_ok());
    }

    #[test]
    fn oversized_exponents_are_rejected() {
        let err = dec("1e2000000", &Type::Number).unwrap_err();
        assert_eq!(err.shape, WireShape::Scalar);
        assert!(err.reason.contains("exponent"), "{}", err.reason);
        assert!(dec(r#""-1e-2000000""#, &Type::Number).is_err());

        let tight = Config { max_number_exponent: 3, ..Config::default() };
        assert!(decode(b"1e3", &Type::Number, &tight).is_ok());
        assert!(decode(b"1e4", &Type::Number, &tight).is_err());

        let sentinel = r#"{"$pyvider-cty-special-value":"unknown","refinements":{"number_lower_bound":["1e9999",true]}}"#;
        assert!(dec(sentinel, &Type::Number).is_err());
    }

    #[test]
    fn capsules_do_not_serialize() {
        let cap = crate::types::CapsuleType::new("conn");
        let v = validate(&Native::Capsule(cap.wrap(1u8)), &Type::Capsule(cap.clone())).unwrap();
        assert!(encode(&v, v.ty()).is_err());
    }

    #[test]
    fn decomposed_attribute_names_decode() {
        let ty = Type::object([("e\u{301}", Type::String)]);
        for src in ["{\"e\u{301}\":\"v\"}", "{\"\u{e9}\":\"v\"}"] {
            let v = dec(src, &ty).unwrap();
            assert_eq!(v.get_attr("e\u{301}").unwrap(), Value::string("v"));
        }
        let v = val(json!({"e\u{301}": "v"}), &ty);
        assert_eq!(dec(&text(&v, &ty), &ty).unwrap(), v);
    }
}
