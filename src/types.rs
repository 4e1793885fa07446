//! Type descriptors.
//!
//! A closed algebra of shapes: primitives, collections (list/set/map),
//! structural types (object/tuple), the `dynamic` pseudo-type and opaque
//! capsules. Descriptors are immutable and cheap to clone: every child is
//! behind an `Arc`, so cloning a deeply nested type is a refcount bump.
pub mod capsule;
pub mod object;

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::error::InvalidTypeKind;

pub use capsule::{CapsuleHandle, CapsuleRegistry, CapsuleType};
pub use object::ObjectType;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Type {
    Bool,
    Number,
    String,
    List(Arc<Type>),
    Set(Arc<Type>),
    Map(Arc<Type>),
    Object(Arc<ObjectType>),
    Tuple(Arc<[Type]>),
    /// "Any type, decided at runtime". Only ever the type of a null or
    /// unknown value, or a slot inside a container schema.
    Dynamic,
    Capsule(CapsuleType),
}

// ------------------------------ Construction ------------------------------ //

impl Type {
    pub fn list(elem: Type) -> Self { Type::List(Arc::new(elem)) }
    pub fn set(elem: Type) -> Self { Type::Set(Arc::new(elem)) }
    pub fn map(elem: Type) -> Self { Type::Map(Arc::new(elem)) }

    pub fn tuple<I>(elems: I) -> Self
    where
        I: IntoIterator<Item = Type>,
    {
        Type::Tuple(elems.into_iter().collect::<Vec<_>>().into())
    }

    /// Object with every attribute required. Attribute order is kept as given;
    /// it only matters for `friendly_name`.
    pub fn object<I, K>(attrs: I) -> Self
    where
        I: IntoIterator<Item = (K, Type)>,
        K: Into<String>,
    {
        Type::Object(Arc::new(ObjectType::new(attrs)))
    }

    /// Object with some attributes optional. Every optional name must also be
    /// a declared attribute.
    pub fn object_with_optional<I, K, O, S>(attrs: I, optional: O) -> Result<Self, InvalidTypeKind>
    where
        I: IntoIterator<Item = (K, Type)>,
        K: Into<String>,
        O: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ObjectType::with_optional(attrs, optional).map(|o| Type::Object(Arc::new(o)))
    }

    pub fn empty_object() -> Self {
        Type::object(IndexMap::<String, Type>::new())
    }
}

// ------------------------------ Inspection -------------------------------- //

impl Type {
    pub fn is_primitive(&self) -> bool {
        matches!(self, Type::Bool | Type::Number | Type::String)
    }

    pub fn is_collection(&self) -> bool {
        matches!(self, Type::List(_) | Type::Set(_) | Type::Map(_))
    }

    pub fn is_structural(&self) -> bool {
        matches!(self, Type::Object(_) | Type::Tuple(_))
    }

    pub fn is_dynamic(&self) -> bool {
        matches!(self, Type::Dynamic)
    }

    pub fn is_capsule(&self) -> bool {
        matches!(self, Type::Capsule(_))
    }

    /// Element type of a list, set or map.
    pub fn element_type(&self) -> Option<&Type> {
        match self {
            Type::List(e) | Type::Set(e) | Type::Map(e) => Some(e),
            _ => None,
        }
    }

    pub fn object_type(&self) -> Option<&ObjectType> {
        match self {
            Type::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn tuple_elements(&self) -> Option<&[Type]> {
        match self {
            Type::Tuple(elems) => Some(elems),
            _ => None,
        }
    }

    /// True when `dynamic` appears anywhere in the descriptor.
    pub fn has_dynamic(&self) -> bool {
        match self {
            Type::Dynamic => true,
            Type::List(e) | Type::Set(e) | Type::Map(e) => e.has_dynamic(),
            Type::Object(o) => o.attributes().values().any(Type::has_dynamic),
            Type::Tuple(elems) => elems.iter().any(Type::has_dynamic),
            Type::Bool | Type::Number | Type::String | Type::Capsule(_) => false,
        }
    }

    /// Structural equality.
    pub fn equal(&self, other: &Type) -> bool {
        self == other
    }
}

// ------------------------------ Usable-as --------------------------------- //

impl Type {
    /// Assignability: can a value of `self` stand in where `target` is
    /// required without changing its payload?
    pub fn usable_as(&self, target: &Type) -> bool {
        match (self, target) {
            (_, Type::Dynamic) => true,
            (Type::Dynamic, _) => false,
            (Type::List(a), Type::List(b))
            | (Type::Set(a), Type::Set(b))
            | (Type::Map(a), Type::Map(b)) => a.usable_as(b),
            (Type::Tuple(a), Type::Tuple(b)) => {
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.usable_as(y))
            }
            (Type::Object(a), Type::Object(b)) => object_usable_as(a, b),
            (a, b) => a == b,
        }
    }
}

fn object_usable_as(source: &ObjectType, target: &ObjectType) -> bool {
    target.attributes().iter().all(|(name, target_ty)| {
        match source.attribute_type(name) {
            Some(source_ty) => source_ty.usable_as(target_ty),
            None => target.is_optional(name),
        }
    })
}

// ------------------------------ Rendering --------------------------------- //

impl Type {
    /// Stable human-readable rendering for diagnostics, e.g. `list of string`
    /// or `object({"a":string})`. Object attributes render in declaration order.
    pub fn friendly_name(&self) -> String {
        let mut out = String::new();
        write_friendly(self, &mut out);
        out
    }
}

fn write_friendly(ty: &Type, out: &mut String) {
    match ty {
        Type::Bool => out.push_str("bool"),
        Type::Number => out.push_str("number"),
        Type::String => out.push_str("string"),
        Type::Dynamic => out.push_str("dynamic"),
        Type::List(e) => { out.push_str("list of "); write_friendly(e, out); }
        Type::Set(e) => { out.push_str("set of "); write_friendly(e, out); }
        Type::Map(e) => { out.push_str("map of "); write_friendly(e, out); }
        Type::Object(o) => {
            out.push_str("object({");
            for (i, (name, aty)) in o.attributes().iter().enumerate() {
                if i > 0 { out.push(','); }
                // JSON string escaping keeps odd attribute names unambiguous
                out.push_str(&serde_json::Value::from(name.as_str()).to_string());
                out.push(':');
                if o.is_optional(name) {
                    out.push_str("optional(");
                    write_friendly(aty, out);
                    out.push(')');
                } else {
                    write_friendly(aty, out);
                }
            }
            out.push_str("})");
        }
        Type::Tuple(elems) => {
            out.push_str("tuple([");
            for (i, e) in elems.iter().enumerate() {
                if i > 0 { out.push(','); }
                write_friendly(e, out);
            }
            out.push_str("])");
        }
        Type::Capsule(c) => {
            out.push_str("capsule(");
            out.push_str(c.name());
            out.push(')');
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.friendly_name())
    }
}

// ------------------------------- Tests ------------------------------------ //
