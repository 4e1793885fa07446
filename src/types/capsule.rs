//! Capsules: opaque host payloads carried through the value model.
//!
//! Capsule types compare by identity, never by name. Two calls to
//! [`CapsuleType::new`] with the same name yield two unrelated types.
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::InvalidTypeKind;
use crate::types::Type;

#[derive(Debug)]
struct CapsuleInner {
    name: String,
}

#[derive(Clone)]
pub struct CapsuleType(Arc<CapsuleInner>);

impl CapsuleType {
    pub fn new(name: impl Into<String>) -> Self {
        CapsuleType(Arc::new(CapsuleInner { name: name.into() }))
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// Wrap a payload as an instance of this capsule type.
    pub fn wrap<T>(&self, payload: T) -> CapsuleHandle
    where
        T: Any + Send + Sync,
    {
        CapsuleHandle { ty: self.clone(), payload: Arc::new(payload) }
    }
}

impl PartialEq for CapsuleType {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for CapsuleType {}

impl fmt::Debug for CapsuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CapsuleType({:?} @ {:p})", self.0.name, Arc::as_ptr(&self.0))
    }
}

// ------------------------------ Handles ----------------------------------- //

/// A capsule instance: the type it belongs to plus a shared opaque payload.
#[derive(Clone)]
pub struct CapsuleHandle {
    ty: CapsuleType,
    payload: Arc<dyn Any + Send + Sync>,
}

impl CapsuleHandle {
    pub fn capsule_type(&self) -> &CapsuleType {
        &self.ty
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.payload.downcast_ref::<T>()
    }

    /// Same type and the very same payload allocation.
    pub fn same_as(&self, other: &CapsuleHandle) -> bool {
        self.ty == other.ty && Arc::ptr_eq(&self.payload, &other.payload)
    }

    /// Payload address; only stable for the life of the process.
    pub(crate) fn address(&self) -> usize {
        Arc::as_ptr(&self.payload) as *const () as usize
    }
}

impl fmt::Debug for CapsuleHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapsuleHandle").field("type", &self.ty.name()).finish_non_exhaustive()
    }
}

// ------------------------------ Registry ---------------------------------- //

/// Name-keyed table of capsule types so hosts can refer to them by name.
#[derive(Debug, Default)]
pub struct CapsuleRegistry {
    types: HashMap<String, CapsuleType>,
}

impl CapsuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Define a new capsule type. Names are unique within one registry.
    pub fn define(&mut self, name: &str) -> Result<Type, InvalidTypeKind> {
        if self.types.contains_key(name) {
            return Err(InvalidTypeKind::DuplicateCapsule(name.to_string()));
        }
        let ty = CapsuleType::new(name);
        self.types.insert(name.to_string(), ty.clone());
        Ok(Type::Capsule(ty))
    }

    pub fn get(&self, name: &str) -> Option<Type> {
        self.types.get(name).cloned().map(Type::Capsule)
    }

    pub fn wrap<T>(&self, name: &str, payload: T) -> Result<CapsuleHandle, InvalidTypeKind>
    where
        T: Any + Send + Sync,
    {
        self.types
            .get(name)
            .map(|ty| ty.wrap(payload))
            .ok_or_else(|| InvalidTypeKind::UnknownCapsule(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_not_name() {
        let a = CapsuleType::new("handle");
        let b = CapsuleType::new("handle");
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
    }

    #[test]
    fn registry_rejects_duplicates() {
        let mut reg = CapsuleRegistry::new();
        let ty = reg.define("file").unwrap();
        assert_eq!(reg.get("file"), Some(ty));
        assert_eq!(reg.define("file").unwrap_err(), InvalidTypeKind::DuplicateCapsule("file".into()));
    }

    #[test]
    fn handles_downcast() {
        let mut reg = CapsuleRegistry::new();
        reg.define("port").unwrap();
        let h = reg.wrap("port", 8080u16).unwrap();
        assert_eq!(h.downcast_ref::<u16>(), Some(&8080));
        assert!(h.downcast_ref::<String>().is_none());
        assert!(h.same_as(&h.clone()));
        assert!(reg.wrap("missing", 1u8).is_err());
    }
}
