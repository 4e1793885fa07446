//! Attribute paths: where in a value tree something happened.
//!
//! A path is an ordered list of steps. Rendering follows the usual
//! `.attr[0]["key"]` notation, so error messages line up across
//! implementations.
use std::fmt;

use crate::codec::nfc_key;
use crate::error::{AttributePathError, PathFailure};
use crate::types::Type;
use crate::value::Value;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum IndexKey {
    Int(i64),
    String(String),
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Step {
    GetAttr(String),
    Index(IndexKey),
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Path(Vec<Step>);

// ------------------------------ Conversions ------------------------------- //

impl From<i64> for IndexKey {
    fn from(i: i64) -> Self { IndexKey::Int(i) }
}

impl From<i32> for IndexKey {
    fn from(i: i32) -> Self { IndexKey::Int(i64::from(i)) }
}

impl From<usize> for IndexKey {
    fn from(i: usize) -> Self { IndexKey::Int(i64::try_from(i).unwrap_or(i64::MAX)) }
}

impl From<&str> for IndexKey {
    fn from(k: &str) -> Self { IndexKey::String(k.to_string()) }
}

impl From<String> for IndexKey {
    fn from(k: String) -> Self { IndexKey::String(k) }
}

impl FromIterator<Step> for Path {
    fn from_iter<I: IntoIterator<Item = Step>>(iter: I) -> Self {
        Path(iter.into_iter().collect())
    }
}

// ------------------------------- Building --------------------------------- //

impl Path {
    pub fn empty() -> Self {
        Path(Vec::new())
    }

    pub fn steps(&self) -> &[Step] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn last(&self) -> Option<&Step> {
        self.0.last()
    }

    /// New path with `step` appended; `self` is untouched.
    pub fn append(&self, step: Step) -> Path {
        let mut steps = self.0.clone();
        steps.push(step);
        Path(steps)
    }

    pub fn get_attr(&self, name: impl Into<String>) -> Path {
        self.append(Step::GetAttr(name.into()))
    }

    pub fn index(&self, key: impl Into<IndexKey>) -> Path {
        self.append(Step::Index(key.into()))
    }

    /// The first `n` steps.
    pub fn prefix(&self, n: usize) -> Path {
        Path(self.0[..n.min(self.0.len())].to_vec())
    }

    // Engines walk trees with one scratch path instead of allocating per level.
    pub(crate) fn push(&mut self, step: Step) {
        self.0.push(step);
    }

    pub(crate) fn pop(&mut self) {
        self.0.pop();
    }
}

// ------------------------------- Applying --------------------------------- //

impl Path {
    /// Walk `value` step by step. Marks of every container passed through
    /// accumulate on the result.
    pub fn apply(&self, value: &Value) -> Result<Value, AttributePathError> {
        let mut current = value.clone();
        for (i, step) in self.0.iter().enumerate() {
            current = step_into(&current, step).map_err(|reason| AttributePathError {
                step: step.clone(),
                consumed: self.prefix(i),
                reason,
            })?;
        }
        Ok(current)
    }

    /// The type reached by walking `ty`. `dynamic` absorbs any further steps.
    pub fn apply_type(&self, ty: &Type) -> Result<Type, AttributePathError> {
        let mut current = ty.clone();
        for (i, step) in self.0.iter().enumerate() {
            current = step_type(&current, step).map_err(|reason| AttributePathError {
                step: step.clone(),
                consumed: self.prefix(i),
                reason,
            })?;
        }
        Ok(current)
    }
}

pub fn apply_step(value: &Value, step: &Step) -> Result<Value, AttributePathError> {
    step_into(value, step).map_err(|reason| AttributePathError {
        step: step.clone(),
        consumed: Path::empty(),
        reason,
    })
}

pub fn apply_path(value: &Value, path: &Path) -> Result<Value, AttributePathError> {
    path.apply(value)
}

fn step_into(value: &Value, step: &Step) -> Result<Value, PathFailure> {
    if value.is_null() {
        return Err(PathFailure::Null);
    }
    if value.is_unknown() {
        return Err(PathFailure::Unknown);
    }
    let not_traversable = || PathFailure::NotTraversable(value.ty().clone());

    let child = match (step, value.ty()) {
        (Step::GetAttr(name), Type::Object(_))
        | (Step::Index(IndexKey::String(name)), Type::Object(_)) => value
            .entries()
            .and_then(|m| m.get(&*nfc_key(name)))
            .ok_or_else(|| PathFailure::NoSuchAttribute(name.clone()))?,
        (Step::Index(IndexKey::String(key)), Type::Map(_)) => value
            .entries()
            .and_then(|m| m.get(&*nfc_key(key)))
            .ok_or_else(|| PathFailure::NoSuchKey(key.clone()))?,
        (Step::Index(IndexKey::Int(i)), Type::List(_) | Type::Tuple(_)) => {
            let elems = value.elements().ok_or_else(not_traversable)?;
            usize::try_from(*i)
                .ok()
                .and_then(|i| elems.get(i))
                .ok_or(PathFailure::IndexOutOfRange { index: *i, len: elems.len() })?
        }
        _ => return Err(not_traversable()),
    };
    Ok(child.clone().with_marks(value.marks().iter().cloned()))
}

fn step_type(ty: &Type, step: &Step) -> Result<Type, PathFailure> {
    match (step, ty) {
        (_, Type::Dynamic) => Ok(Type::Dynamic),
        (Step::GetAttr(name), Type::Object(o)) | (Step::Index(IndexKey::String(name)), Type::Object(o)) => o
            .attribute_type(name)
            .cloned()
            .ok_or_else(|| PathFailure::NoSuchAttribute(name.clone())),
        (Step::Index(IndexKey::String(_)), Type::Map(e)) => Ok((**e).clone()),
        (Step::Index(IndexKey::Int(_)), Type::List(e)) => Ok((**e).clone()),
        (Step::Index(IndexKey::Int(i)), Type::Tuple(elems)) => usize::try_from(*i)
            .ok()
            .and_then(|i| elems.get(i))
            .cloned()
            .ok_or(PathFailure::IndexOutOfRange { index: *i, len: elems.len() }),
        _ => Err(PathFailure::NotTraversable(ty.clone())),
    }
}

// ------------------------------- Rendering -------------------------------- //

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::GetAttr(name) => write!(f, ".{name}"),
            Step::Index(IndexKey::Int(i)) => write!(f, "[{i}]"),
            Step::Index(IndexKey::String(k)) => {
                write!(f, "[{}]", serde_json::Value::from(k.as_str()))
            }
        }
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for step in &self.0 {
            write!(f, "{step}")?;
        }
        Ok(())
    }
}
