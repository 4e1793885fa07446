//! Wire JSON for types.
//!
//! ```text
//! "string" | "number" | "bool" | "dynamic"
//! ["list", T] | ["set", T] | ["map", T]
//! ["object", {"name": T, ...}] | ["object", {...}, ["optional", ...]]
//! ["tuple", [T, ...]]
//! ```
//!
//! Object attributes and optional names are emitted sorted, so equal types
//! always produce equal bytes.
use serde::de::Error as _;
use serde::ser::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value as Json, json};

use crate::error::InvalidTypeKind;
use crate::types::Type;

pub fn to_json(ty: &Type) -> Result<Json, InvalidTypeKind> {
    Ok(match ty {
        Type::Bool => json!("bool"),
        Type::Number => json!("number"),
        Type::String => json!("string"),
        Type::Dynamic => json!("dynamic"),
        Type::List(e) => Json::Array(vec![json!("list"), to_json(e)?]),
        Type::Set(e) => Json::Array(vec![json!("set"), to_json(e)?]),
        Type::Map(e) => Json::Array(vec![json!("map"), to_json(e)?]),
        Type::Tuple(elems) => {
            let elems = elems.iter().map(to_json).collect::<Result<Vec<_>, _>>()?;
            json!(["tuple", elems])
        }
        Type::Object(obj) => {
            let mut attrs = Map::new();
            for name in obj.sorted_names() {
                if let Some(attr) = obj.attribute_type(name) {
                    attrs.insert(name.to_string(), to_json(attr)?);
                }
            }
            if obj.optional_attributes().is_empty() {
                json!(["object", attrs])
            } else {
                let optional: Vec<&String> = obj.optional_attributes().iter().collect();
                json!(["object", attrs, optional])
            }
        }
        Type::Capsule(cap) => {
            return Err(InvalidTypeKind::Malformed(format!("capsule({}) has no wire representation", cap.name())));
        }
    })
}

/// Compact wire text, e.g. `["list","string"]`.
pub fn to_string(ty: &Type) -> Result<String, InvalidTypeKind> {
    Ok(to_json(ty)?.to_string())
}

pub fn from_json(json: &Json) -> Result<Type, InvalidTypeKind> {
    match json {
        Json::String(token) => match token.as_str() {
            "bool" => Ok(Type::Bool),
            "number" => Ok(Type::Number),
            "string" => Ok(Type::String),
            "dynamic" => Ok(Type::Dynamic),
            other => Err(malformed(format!("unknown primitive type {other:?}"))),
        },
        Json::Array(parts) => {
            let Some(kind) = parts.first().and_then(Json::as_str) else {
                return Err(malformed("type array must start with a kind name"));
            };
            match (kind, &parts[1..]) {
                ("list", [elem]) => Ok(Type::list(from_json(elem)?)),
                ("set", [elem]) => Ok(Type::set(from_json(elem)?)),
                ("map", [elem]) => Ok(Type::map(from_json(elem)?)),
                ("tuple", [Json::Array(elems)]) => {
                    Ok(Type::tuple(elems.iter().map(from_json).collect::<Result<Vec<_>, _>>()?))
                }
                ("object", [Json::Object(attrs)]) => object(attrs, &[]),
                ("object", [Json::Object(attrs), Json::Array(optional)]) => object(attrs, optional),
                (kind, _) => Err(malformed(format!("invalid {kind:?} type specification"))),
            }
        }
        other => Err(malformed(format!("expected a string or array, found {other}"))),
    }
}

fn object(attrs: &Map<String, Json>, optional: &[Json]) -> Result<Type, InvalidTypeKind> {
    let attrs = attrs
        .iter()
        .map(|(name, spec)| Ok((name.clone(), from_json(spec)?)))
        .collect::<Result<Vec<(String, Type)>, InvalidTypeKind>>()?;
    let optional = optional
        .iter()
        .map(|name| name.as_str().ok_or_else(|| malformed("optional attribute names must be strings")))
        .collect::<Result<Vec<&str>, _>>()?;
    Type::object_with_optional(attrs, optional)
}

/// Parse wire text.
pub fn parse(src: &str) -> Result<Type, InvalidTypeKind> {
    let json: Json = serde_json::from_str(src).map_err(|err| malformed(err.to_string()))?;
    from_json(&json)
}

pub(crate) fn parse_bytes(src: &[u8]) -> Result<Type, InvalidTypeKind> {
    let json: Json = serde_json::from_slice(src).map_err(|err| malformed(err.to_string()))?;
    from_json(&json)
}

fn malformed(msg: impl Into<String>) -> InvalidTypeKind {
    InvalidTypeKind::Malformed(msg.into())
}

// --------------------------------- serde ---------------------------------- //

impl Serialize for Type {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        to_json(self).map_err(S::Error::custom)?.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Type {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let json = Json::deserialize(deserializer)?;
        from_json(&json).map_err(D::Error::custom)
    }
}
