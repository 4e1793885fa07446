//! MessagePack value codec, byte-compatible with go-cty.
//!
//! Unknowns are extension values: type 0 for a plain unknown, type 12 for a
//! refined one whose payload is a msgpack map keyed by small integers.
//! Numbers take the most compact exact form: an integer, else a float64,
//! else the decimal text.
use std::collections::BTreeMap;

use rmpv::Value as Wire;

use crate::codec::{normalize_key, type_json};
use crate::config::Config;
use crate::error::{DeserializationError, SerializationError, WireFormat, WireShape};
use crate::path::{IndexKey, Path, Step};
use crate::types::{ObjectType, Type};
use crate::value::{Number, Payload, Refinement, Value};

const UNKNOWN_EXT: i8 = 0;
const REFINED_UNKNOWN_EXT: i8 = 12;

// refinement payload keys
const NULLNESS: u64 = 1;
const STRING_PREFIX: u64 = 2;
const NUMBER_LOWER: u64 = 3;
const NUMBER_UPPER: u64 = 4;
const LENGTH_LOWER: u64 = 5;
const LENGTH_UPPER: u64 = 6;

// -------------------------------- Encode ---------------------------------- //

/// Encode under the value's own type.
pub fn encode(value: &Value) -> Result<Vec<u8>, SerializationError> {
    encode_as(value, value.ty())
}

pub fn encode_as(value: &Value, ty: &Type) -> Result<Vec<u8>, SerializationError> {
    let mut path = Path::empty();
    let wire = encode_at(value, ty, &mut path)?;
    write(&wire, &path)
}

fn ser_fail(path: &Path, reason: impl Into<String>) -> SerializationError {
    SerializationError { format: WireFormat::MsgPack, path: path.clone(), reason: reason.into() }
}

fn write(wire: &Wire, path: &Path) -> Result<Vec<u8>, SerializationError> {
    let mut buf = Vec::new();
    rmpv::encode::write_value(&mut buf, wire).map_err(|err| ser_fail(path, err.to_string()))?;
    Ok(buf)
}

fn encode_at(value: &Value, ty: &Type, path: &mut Path) -> Result<Wire, SerializationError> {
    if value.is_null() {
        return Ok(Wire::Nil);
    }
    if let Some(refinement) = value.refinement() {
        return unknown_ext(refinement, path);
    }
    if ty.is_dynamic() {
        let spec = type_json::to_string(value.ty()).map_err(|err| ser_fail(path, err.to_string()))?;
        let inner = encode_at(value, value.ty(), path)?;
        return Ok(Wire::Array(vec![Wire::Binary(spec.into_bytes()), inner]));
    }
    let Some(payload) = value.payload() else {
        return Err(ser_fail(path, "value has no payload"));
    };

    Ok(match (payload, ty) {
        (Payload::Bool(b), Type::Bool) => Wire::Boolean(*b),
        (Payload::Number(n), Type::Number) => number_to_wire(n),
        (Payload::String(s), Type::String) => Wire::from(s.as_str()),
        (Payload::Seq(xs), Type::List(elem) | Type::Set(elem)) => {
            Wire::Array(encode_elements(xs, |_| &**elem, path)?)
        }
        (Payload::Seq(xs), Type::Tuple(types)) if xs.len() == types.len() => {
            Wire::Array(encode_elements(xs, |i| &types[i], path)?)
        }
        (Payload::Map(entries), Type::Map(elem)) => encode_entries(entries, |_| Some(&**elem), path)?,
        (Payload::Map(entries), Type::Object(obj)) => {
            encode_entries(entries, |name| obj.attribute_type(name), path)?
        }
        (Payload::Capsule(_), _) => return Err(ser_fail(path, "capsule values cannot be serialized")),
        _ => return Err(ser_fail(path, format!("value of type {} does not fit {ty}", value.ty()))),
    })
}

fn encode_elements<'t, F>(xs: &[Value], elem_ty: F, path: &mut Path) -> Result<Vec<Wire>, SerializationError>
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

/// Entries come out of the `BTreeMap` already in key order.
fn encode_entries<'t, F>(entries: &BTreeMap<String, Value>, attr_ty: F, path: &mut Path) -> Result<Wire, SerializationError>
where
    F: Fn(&str) -> Option<&'t Type>,
{
    let mut out = Vec::with_capacity(entries.len());
    for (key, v) in entries {
        let Some(ty) = attr_ty(key) else {
            return Err(ser_fail(path, format!("unsupported attribute {key:?}")));
        };
        path.push(Step::Index(IndexKey::String(key.clone())));
        out.push((Wire::from(key.as_str()), encode_at(v, ty, path)?));
        path.pop();
    }
    Ok(Wire::Map(out))
}

fn number_to_wire(n: &Number) -> Wire {
    if let Some(i) = n.to_i64_exact() {
        Wire::from(i)
    } else if let Some(f) = n.to_f64_exact() {
        Wire::F64(f)
    } else {
        Wire::from(n.to_plain_string())
    }
}

fn unknown_ext(refinement: &Refinement, path: &Path) -> Result<Wire, SerializationError> {
    let mut entries: Vec<(Wire, Wire)> = Vec::new();
    if refinement.is_not_null() {
        entries.push((Wire::from(NULLNESS), Wire::Boolean(false)));
    }
    if let Some(prefix) = refinement.prefix() {
        entries.push((Wire::from(STRING_PREFIX), Wire::from(prefix)));
    }
    for (key, bound) in [(NUMBER_LOWER, refinement.lower_bound()), (NUMBER_UPPER, refinement.upper_bound())] {
        if let Some(b) = bound {
            let n = Wire::Binary(b.value.to_plain_string().into_bytes());
            entries.push((Wire::from(key), Wire::Array(vec![n, Wire::Boolean(b.inclusive)])));
        }
    }
    for (key, len) in [(LENGTH_LOWER, refinement.length_lower()), (LENGTH_UPPER, refinement.length_upper())] {
        if let Some(n) = len {
            entries.push((Wire::from(key), Wire::from(n)));
        }
    }
    if entries.is_empty() {
        return Ok(Wire::Ext(UNKNOWN_EXT, vec![0]));
    }
    Ok(Wire::Ext(REFINED_UNKNOWN_EXT, write(&Wire::Map(entries), path)?))
}

// -------------------------------- Decode ---------------------------------- //

/// Decode one value of type `ty`. Empty input is a null.
pub fn decode(bytes: &[u8], ty: &Type, config: &Config) -> Result<Value, DeserializationError> {
    if bytes.is_empty() {
        return Ok(Value::null(ty.clone()));
    }
    let max_depth = config.max_depth;
    let decoder = Decoder { byte_len: bytes.len(), max_depth, max_exponent: config.max_number_exponent };
    let malformed = |reason: String| DeserializationError {
        format: WireFormat::MsgPack,
        byte_len: bytes.len(),
        expected: ty.clone(),
        shape: WireShape::Malformed,
        path: Path::empty(),
        reason,
    };

    let mut rest = bytes;
    // dynamic wrappers add one array level per nesting step
    let wire_depth = max_depth.saturating_mul(2).saturating_add(1);
    let wire = rmpv::decode::read_value_with_max_depth(&mut rest, wire_depth)
        .map_err(|err| malformed(err.to_string()))?;
    if !rest.is_empty() {
        return Err(malformed(format!("{} trailing bytes", rest.len())));
    }
    decoder.value(&wire, ty, &mut Path::empty(), 0)
}

fn shape(wire: &Wire) -> WireShape {
    match wire {
        Wire::Nil => WireShape::Null,
        Wire::Array(_) => WireShape::List,
        Wire::Map(_) => WireShape::Dict,
        Wire::Ext(..) => WireShape::Extension,
        _ => WireShape::Scalar,
    }
}

fn wire_str(wire: &Wire) -> Option<&str> {
    match wire {
        Wire::String(s) => s.as_str(),
        Wire::Binary(b) => std::str::from_utf8(b).ok(),
        _ => None,
    }
}

fn wire_number(wire: &Wire, max_exponent: u32) -> Option<Number> {
    let n = match wire {
        Wire::Integer(i) => i.as_i64().map(Number::from).or_else(|| i.as_u64().map(Number::from))?,
        Wire::F64(f) => Number::from_f64_exact(*f)?,
        Wire::F32(f) => Number::from_f64_exact(f64::from(*f))?,
        other => return Number::parse_bounded(wire_str(other)?, max_exponent).ok(),
    };
    n.within_exponent(max_exponent).then_some(n)
}

struct Decoder {
    byte_len: usize,
    max_depth: usize,
    max_exponent: u32,
}

type Decoded = Result<Value, DeserializationError>;

impl Decoder {
    fn fail(&self, path: &Path, ty: &Type, wire: &Wire, reason: impl Into<String>) -> DeserializationError {
        DeserializationError {
            format: WireFormat::MsgPack,
            byte_len: self.byte_len,
            expected: ty.clone(),
            shape: shape(wire),
            path: path.clone(),
            reason: reason.into(),
        }
    }

    fn mismatch(&self, path: &Path, ty: &Type, wire: &Wire) -> DeserializationError {
        self.fail(path, ty, wire, format!("cannot decode {} as {ty}", shape(wire)))
    }

    fn value(&self, wire: &Wire, ty: &Type, path: &mut Path, depth: usize) -> Decoded {
        if depth > self.max_depth {
            let reason = format!("nesting exceeds the maximum depth of {}", self.max_depth);
            return Err(self.fail(path, ty, wire, reason));
        }
        match wire {
            Wire::Nil => return Ok(Value::null(ty.clone())),
            Wire::Ext(REFINED_UNKNOWN_EXT, data) => {
                let refinement = self.refinement(data, ty, wire, path)?;
                return Ok(Value::unknown_refined(ty.clone(), refinement));
            }
            // any other extension is an unrefined unknown
            Wire::Ext(..) => return Ok(Value::unknown(ty.clone())),
            _ => {}
        }

        match ty {
            Type::Dynamic => {
                let Wire::Array(parts) = wire else {
                    return Err(self.fail(path, ty, wire, "expected a [type, value] wrapper"));
                };
                let [spec, inner] = parts.as_slice() else {
                    return Err(self.fail(path, ty, wire, "expected a [type, value] wrapper"));
                };
                let Some(spec) = wire_str(spec) else {
                    return Err(self.fail(path, ty, wire, "wrapper type must be JSON bytes"));
                };
                let concrete = type_json::parse_bytes(spec.as_bytes())
                    .map_err(|err| self.fail(path, ty, wire, format!("bad dynamic type: {err}")))?;
                if concrete.is_dynamic() {
                    return Err(self.fail(path, ty, wire, "wrapped type must be concrete"));
                }
                self.value(inner, &concrete, path, depth + 1)
            }
            Type::Bool => match wire {
                Wire::Boolean(b) => Ok(Value::bool(*b)),
                _ => Err(self.mismatch(path, ty, wire)),
            },
            Type::Number => match wire {
                Wire::Integer(_) | Wire::F32(_) | Wire::F64(_) | Wire::String(_) | Wire::Binary(_) => {
                    wire_number(wire, self.max_exponent)
                        .map(Value::number)
                        .ok_or_else(|| self.fail(path, ty, wire, "not a valid number within the exponent bound"))
                }
                _ => Err(self.mismatch(path, ty, wire)),
            },
            Type::String => match wire {
                Wire::String(_) | Wire::Binary(_) => wire_str(wire)
                    .map(Value::string)
                    .ok_or_else(|| self.fail(path, ty, wire, "string is not valid UTF-8")),
                _ => Err(self.mismatch(path, ty, wire)),
            },
            Type::List(elem) | Type::Set(elem) => match wire {
                Wire::Array(xs) => {
                    let elems = self.elements(xs, |_| &**elem, path, depth)?;
                    Ok(Value::sequence(ty.clone(), elems))
                }
                _ => Err(self.mismatch(path, ty, wire)),
            },
            Type::Tuple(types) => match wire {
                Wire::Array(xs) if xs.len() == types.len() => {
                    let elems = self.elements(xs, |i| &types[i], path, depth)?;
                    Ok(Value::sequence(ty.clone(), elems))
                }
                Wire::Array(xs) => {
                    let reason = format!("expected {} elements, found {}", types.len(), xs.len());
                    Err(self.fail(path, ty, wire, reason))
                }
                _ => Err(self.mismatch(path, ty, wire)),
            },
            Type::Map(elem) => match wire {
                Wire::Map(entries) => {
                    let mut out = BTreeMap::new();
                    for (key, raw) in self.normalized(entries, ty, wire, path)? {
                        path.push(Step::Index(IndexKey::String(key.clone())));
                        out.insert(key, self.value(raw, elem, path, depth + 1)?);
                        path.pop();
                    }
                    Ok(Value::mapping(ty.clone(), out))
                }
                _ => Err(self.mismatch(path, ty, wire)),
            },
            Type::Object(obj) => match wire {
                Wire::Map(entries) => self.object(entries, ty, obj, wire, path, depth),
                _ => Err(self.mismatch(path, ty, wire)),
            },
            Type::Capsule(_) => Err(self.fail(path, ty, wire, "capsule values cannot be decoded")),
        }
    }

    fn elements<'t, F>(&self, xs: &[Wire], elem_ty: F, path: &mut Path, depth: usize) -> Result<Vec<Value>, DeserializationError>
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

    fn normalized<'w>(
        &self,
        entries: &'w [(Wire, Wire)],
        ty: &Type,
        wire: &Wire,
        path: &Path,
    ) -> Result<BTreeMap<String, &'w Wire>, DeserializationError> {
        let mut out = BTreeMap::new();
        for (key, raw) in entries {
            let Some(key) = wire_str(key) else {
                return Err(self.fail(path, ty, wire, format!("map keys must be strings, found {}", shape(key))));
            };
            let key = normalize_key(key);
            if out.contains_key(&key) {
                return Err(self.fail(path, ty, wire, format!("duplicate key {key:?} after normalization")));
            }
            out.insert(key, raw);
        }
        Ok(out)
    }

    fn object(
        &self,
        entries: &[(Wire, Wire)],
        ty: &Type,
        obj: &ObjectType,
        wire: &Wire,
        path: &mut Path,
        depth: usize,
    ) -> Decoded {
        let given = self.normalized(entries, ty, wire, path)?;
        if let Some(extra) = given.keys().find(|k| !obj.has_attribute(k)) {
            return Err(self.fail(path, ty, wire, format!("unsupported attribute {extra:?}")));
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
                // go-cty leaves out null optional attributes
                None => Value::null(attr_ty.clone()),
            };
            attrs.insert(name.clone(), value);
        }
        Ok(Value::mapping(ty.clone(), attrs))
    }

    fn refinement(&self, data: &[u8], ty: &Type, wire: &Wire, path: &Path) -> Result<Refinement, DeserializationError> {
        let bad = |what: String| self.fail(path, ty, wire, format!("malformed refinement: {what}"));
        let mut rest = data;
        let payload = rmpv::decode::read_value(&mut rest).map_err(|err| bad(err.to_string()))?;
        let Wire::Map(entries) = payload else {
            return Err(bad("payload is not a map".into()));
        };

        let mut out = Refinement::new();
        for (key, v) in &entries {
            let Some(key) = key.as_u64() else {
                return Err(bad("keys must be integers".into()));
            };
            out = match key {
                NULLNESS => match v.as_bool() {
                    Some(false) => out.not_null(),
                    Some(true) => out,
                    None => return Err(bad("nullness must be a bool".into())),
                },
                STRING_PREFIX => out.string_prefix(wire_str(v).ok_or_else(|| bad("string prefix".into()))?),
                NUMBER_LOWER | NUMBER_UPPER => {
                    let Some((n, inclusive)) = bound(v, self.max_exponent) else {
                        return Err(bad("number bound must be [number, bool]".into()));
                    };
                    if key == NUMBER_LOWER {
                        out.number_lower_bound(n, inclusive)
                    } else {
                        out.number_upper_bound(n, inclusive)
                    }
                }
                LENGTH_LOWER => out.length_lower_bound(v.as_u64().ok_or_else(|| bad("length bound".into()))?),
                LENGTH_UPPER => out.length_upper_bound(v.as_u64().ok_or_else(|| bad("length bound".into()))?),
                _ => out,
            };
        }
        Ok(out)
    }
}

fn bound(wire: &Wire, max_exponent: u32) -> Option<(Number, bool)> {
    let Wire::Array(parts) = wire else { return None };
    let [n, inclusive] = parts.as_slice() else { return None };
    Some((wire_number(n, max_exponent)?, inclusive.as_bool()?))
}
