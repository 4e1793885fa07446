use std::collections::BTreeSet;

use indexmap::IndexMap;

use crate::codec::{nfc_key, normalize_key};
use crate::error::InvalidTypeKind;
use crate::types::Type;

/// Attribute table of an object type.
///
/// Equality ignores declaration order (`IndexMap` compares as a map);
/// declaration order survives only for rendering and validation order.
/// Attribute names are stored in NFC and looked up in either form.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct ObjectType {
    attrs: IndexMap<String, Type>,
    optional: BTreeSet<String>,
}

impl ObjectType {
    pub fn new<I, K>(attrs: I) -> Self
    where
        I: IntoIterator<Item = (K, Type)>,
        K: Into<String>,
    {
        let attrs = attrs.into_iter().map(|(k, t)| (normalize_key(&k.into()), t)).collect();
        ObjectType { attrs, optional: BTreeSet::new() }
    }

    pub fn with_optional<I, K, O, S>(attrs: I, optional: O) -> Result<Self, InvalidTypeKind>
    where
        I: IntoIterator<Item = (K, Type)>,
        K: Into<String>,
        O: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut obj = ObjectType::new(attrs);
        for name in optional {
            let name = normalize_key(&name.into());
            if !obj.attrs.contains_key(&name) {
                return Err(InvalidTypeKind::UnknownOptionalAttribute(name));
            }
            obj.optional.insert(name);
        }
        Ok(obj)
    }

    pub fn attributes(&self) -> &IndexMap<String, Type> {
        &self.attrs
    }

    pub fn attribute_type(&self, name: &str) -> Option<&Type> {
        self.attrs.get(&*nfc_key(name))
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.attrs.contains_key(&*nfc_key(name))
    }

    pub fn is_optional(&self, name: &str) -> bool {
        self.optional.contains(&*nfc_key(name))
    }

    pub fn optional_attributes(&self) -> &BTreeSet<String> {
        &self.optional
    }

    /// Attribute names in sorted order, the order every wire format uses.
    pub fn sorted_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.attrs.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.attrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn optional_must_name_a_declared_attribute() {
        let err = ObjectType::with_optional([("a", Type::String)], ["b"]).unwrap_err();
        assert_eq!(err, InvalidTypeKind::UnknownOptionalAttribute("b".into()));
    }

    #[test]
    fn sorted_names_ignore_declaration_order() {
        let obj = ObjectType::new([("zeta", Type::Bool), ("alpha", Type::Bool), ("mid", Type::Bool)]);
        assert_eq!(obj.sorted_names(), vec!["alpha", "mid", "zeta"]);
        assert_eq!(obj.attributes().keys().next().map(String::as_str), Some("zeta"));
    }

    #[test]
    fn names_are_stored_in_nfc() {
        let obj = ObjectType::with_optional([("cafe\u{301}", Type::String)], ["cafe\u{301}"]).unwrap();
        assert_eq!(obj.sorted_names(), vec!["caf\u{e9}"]);
        assert!(obj.has_attribute("caf\u{e9}") && obj.has_attribute("cafe\u{301}"));
        assert_eq!(obj.attribute_type("cafe\u{301}"), Some(&Type::String));
        assert!(obj.is_optional("caf\u{e9}"));
        assert_eq!(obj, ObjectType::with_optional([("caf\u{e9}", Type::String)], ["caf\u{e9}"]).unwrap());
    }
}
