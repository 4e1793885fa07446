//! The value model.
//!
//! A `Value` is a type plus one of three states: null, unknown (optionally
//! refined) or known with a payload. Marks ride alongside any state.
//! Collections are canonical on construction: set elements are deduplicated
//! and sorted, and a list/set/map that would contain an unknown element is
//! itself unknown.
pub mod marks;
pub mod number;
pub mod refinement;

use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::error::AttributePathError;
use crate::path::{IndexKey, Path, Step};
use crate::types::{CapsuleHandle, Type};

pub use marks::{Mark, Marks};
pub use number::{Number, ParseNumberError};
pub use refinement::{NumberBound, Refinement, MAX_STRING_PREFIX};

#[derive(Clone, Debug)]
pub struct Value {
    ty: Type,
    state: State,
    marks: Marks,
}

#[derive(Clone, Debug)]
enum State {
    Null,
    Unknown(Refinement),
    Known(Payload),
}

#[derive(Clone, Debug)]
pub(crate) enum Payload {
    Bool(bool),
    Number(Number),
    String(String),
    /// Elements of a list, set or tuple.
    Seq(Vec<Value>),
    /// Entries of a map or attributes of an object, keyed in sorted order.
    Map(BTreeMap<String, Value>),
    Capsule(CapsuleHandle),
}

// ------------------------------ Construction ------------------------------ //

impl Value {
    pub fn null(ty: Type) -> Self {
        Value { ty, state: State::Null, marks: Marks::new() }
    }

    pub fn unknown(ty: Type) -> Self {
        Value { ty, state: State::Unknown(Refinement::default()), marks: Marks::new() }
    }

    /// Unknown with a refinement; fields that make no sense for `ty` are dropped.
    pub fn unknown_refined(ty: Type, refinement: Refinement) -> Self {
        let refinement = refinement.retain_for(&ty);
        Value { ty, state: State::Unknown(refinement), marks: Marks::new() }
    }

    pub fn bool(b: bool) -> Self {
        Value::known(Type::Bool, Payload::Bool(b))
    }

    pub fn number(n: impl Into<Number>) -> Self {
        Value::known(Type::Number, Payload::Number(n.into()))
    }

    pub fn string(s: impl Into<String>) -> Self {
        Value::known(Type::String, Payload::String(s.into()))
    }

    pub(crate) fn known(ty: Type, payload: Payload) -> Self {
        Value { ty, state: State::Known(payload), marks: Marks::new() }
    }

    pub(crate) fn capsule(handle: CapsuleHandle) -> Self {
        let ty = Type::Capsule(handle.capsule_type().clone());
        Value::known(ty, Payload::Capsule(handle))
    }

    /// Build a list, set or tuple value from already-typed elements.
    pub(crate) fn sequence(ty: Type, elems: Vec<Value>) -> Self {
        match &ty {
            Type::List(_) => collapse_unknown(&ty, &elems)
                .unwrap_or_else(|| Value::known(ty, Payload::Seq(elems))),
            Type::Set(_) => collapse_unknown(&ty, &elems)
                .unwrap_or_else(|| Value::known(ty, Payload::Seq(canonical_set(elems)))),
            _ => Value::known(ty, Payload::Seq(elems)),
        }
    }

    /// Build a map or object value from already-typed entries.
    pub(crate) fn mapping(ty: Type, entries: BTreeMap<String, Value>) -> Self {
        if ty.is_collection() {
            if let Some(unknown) = collapse_unknown(&ty, entries.values()) {
                return unknown;
            }
        }
        Value::known(ty, Payload::Map(entries))
    }

    /// Null or unknown carried over to another type, keeping marks and
    /// whatever refinement still applies.
    pub(crate) fn retyped_placeholder(&self, ty: &Type) -> Option<Value> {
        let state = match &self.state {
            State::Null => State::Null,
            // elements that turn out equal merge, so only one is certain
            State::Unknown(r) if matches!(ty, Type::Set(_)) && !matches!(self.ty, Type::Set(_)) => {
                State::Unknown(r.retain_for(ty).cap_length_lower(1))
            }
            State::Unknown(r) => State::Unknown(r.retain_for(ty)),
            State::Known(_) => return None,
        };
        Some(Value { ty: ty.clone(), state, marks: self.marks.clone() })
    }
}

/// A list/set/map with any unknown element is wholly unknown. The result
/// keeps the element count as a length refinement and every element mark.
fn collapse_unknown<'a, I>(ty: &Type, elems: I) -> Option<Value>
where
    I: IntoIterator<Item = &'a Value>,
{
    let mut any_unknown = false;
    let mut marks = Marks::new();
    let mut len = 0u64;
    for e in elems {
        any_unknown |= e.is_unknown();
        marks.extend(e.deep_marks());
        len += 1;
    }
    if !any_unknown {
        return None;
    }
    let refinement = match ty {
        // duplicates may still collapse once the unknowns resolve
        Type::Set(_) => Refinement::new().not_null().length_upper_bound(len),
        _ => Refinement::new().not_null().exact_length(len),
    };
    Some(Value::unknown_refined(ty.clone(), refinement).with_marks(marks))
}

fn canonical_set(elems: Vec<Value>) -> Vec<Value> {
    let mut elems = elems;
    // stable: the first of several equal elements stays in front
    elems.sort_by(canonical_cmp);
    elems.dedup_by(|later, kept| {
        if *later == *kept {
            kept.marks.extend(std::mem::take(&mut later.marks));
            true
        } else {
            false
        }
    });
    elems
}

/// Total order over set elements: bools, then numbers, then strings, then
/// everything else by canonical msgpack bytes. Nulls sort first. Containers
/// that cannot be encoded (capsules inside) sort after the rest, ordered
/// element by element.
pub(crate) fn canonical_cmp(a: &Value, b: &Value) -> Ordering {
    fn rank(p: &Payload) -> u8 {
        match p {
            Payload::Bool(_) => 0,
            Payload::Number(_) => 1,
            Payload::String(_) => 2,
            Payload::Seq(_) | Payload::Map(_) => 3,
            Payload::Capsule(_) => 4,
        }
    }

    match (&a.state, &b.state) {
        (State::Null, State::Null) => a.ty.friendly_name().cmp(&b.ty.friendly_name()),
        (State::Null, _) => Ordering::Less,
        (_, State::Null) => Ordering::Greater,
        (State::Unknown(_), State::Unknown(_)) => Ordering::Equal,
        (State::Unknown(_), _) => Ordering::Greater,
        (_, State::Unknown(_)) => Ordering::Less,
        (State::Known(x), State::Known(y)) => match (x, y) {
            (Payload::Bool(p), Payload::Bool(q)) => p.cmp(q),
            (Payload::Number(p), Payload::Number(q)) => p.cmp(q),
            (Payload::String(p), Payload::String(q)) => p.cmp(q),
            (Payload::Capsule(p), Payload::Capsule(q)) => p.address().cmp(&q.address()),
            (Payload::Seq(_) | Payload::Map(_), Payload::Seq(_) | Payload::Map(_)) => {
                let by_bytes = match (crate::codec::msgpack::encode(a), crate::codec::msgpack::encode(b)) {
                    (Ok(p), Ok(q)) => p.cmp(&q),
                    (Ok(_), Err(_)) => Ordering::Less,
                    (Err(_), Ok(_)) => Ordering::Greater,
                    (Err(_), Err(_)) => structural_cmp(x, y),
                };
                by_bytes.then_with(|| a.ty.friendly_name().cmp(&b.ty.friendly_name()))
            }
            (p, q) => rank(p).cmp(&rank(q)),
        },
    }
}

/// Element-wise order for containers with no wire form: sequences compare
/// like slices, mappings like sorted `(key, value)` lists.
fn structural_cmp(x: &Payload, y: &Payload) -> Ordering {
    match (x, y) {
        (Payload::Seq(xs), Payload::Seq(ys)) => xs
            .iter()
            .zip(ys)
            .map(|(p, q)| canonical_cmp(p, q))
            .find(|o| o.is_ne())
            .unwrap_or(xs.len().cmp(&ys.len())),
        (Payload::Map(xs), Payload::Map(ys)) => xs
            .iter()
            .zip(ys)
            .map(|((kp, p), (kq, q))| kp.cmp(kq).then_with(|| canonical_cmp(p, q)))
            .find(|o| o.is_ne())
            .unwrap_or(xs.len().cmp(&ys.len())),
        (Payload::Seq(_), _) => Ordering::Less,
        (_, Payload::Seq(_)) => Ordering::Greater,
        _ => Ordering::Equal,
    }
}

// ------------------------------- State ------------------------------------ //

impl Value {
    pub fn ty(&self) -> &Type {
        &self.ty
    }

    pub fn is_null(&self) -> bool {
        matches!(self.state, State::Null)
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self.state, State::Unknown(_))
    }

    pub fn is_known(&self) -> bool {
        matches!(self.state, State::Known(_))
    }

    /// Refinement of an unknown value; `None` for null and known values.
    pub fn refinement(&self) -> Option<&Refinement> {
        match &self.state {
            State::Unknown(r) => Some(r),
            _ => None,
        }
    }

    /// False when the value or anything inside it is unknown.
    pub fn is_wholly_known(&self) -> bool {
        match &self.state {
            State::Null => true,
            State::Unknown(_) => false,
            State::Known(Payload::Seq(xs)) => xs.iter().all(Value::is_wholly_known),
            State::Known(Payload::Map(m)) => m.values().all(Value::is_wholly_known),
            State::Known(_) => true,
        }
    }

    pub(crate) fn payload(&self) -> Option<&Payload> {
        match &self.state {
            State::Known(p) => Some(p),
            _ => None,
        }
    }
}

// ------------------------------ Accessors --------------------------------- //

impl Value {
    pub fn as_bool(&self) -> Option<bool> {
        match self.payload()? {
            Payload::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<&Number> {
        match self.payload()? {
            Payload::Number(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self.payload()? {
            Payload::String(s) => Some(s),
            _ => None,
        }
    }

    /// Elements of a known list, set or tuple, in stored order.
    pub fn elements(&self) -> Option<&[Value]> {
        match self.payload()? {
            Payload::Seq(xs) => Some(xs),
            _ => None,
        }
    }

    /// Entries of a known map or attributes of a known object.
    pub fn entries(&self) -> Option<&BTreeMap<String, Value>> {
        match self.payload()? {
            Payload::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_capsule(&self) -> Option<&CapsuleHandle> {
        match self.payload()? {
            Payload::Capsule(h) => Some(h),
            _ => None,
        }
    }

    pub fn len(&self) -> Option<usize> {
        match self.payload()? {
            Payload::Seq(xs) => Some(xs.len()),
            Payload::Map(m) => Some(m.len()),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> Option<bool> {
        self.len().map(|n| n == 0)
    }

    /// Single `GetAttr` step.
    pub fn get_attr(&self, name: &str) -> Result<Value, AttributePathError> {
        crate::path::apply_step(self, &Step::GetAttr(name.to_string()))
    }

    /// Single `Index` step.
    pub fn index(&self, key: impl Into<IndexKey>) -> Result<Value, AttributePathError> {
        crate::path::apply_step(self, &Step::Index(key.into()))
    }

    pub fn apply_path(&self, path: &Path) -> Result<Value, AttributePathError> {
        path.apply(self)
    }
}

// -------------------------------- Marks ----------------------------------- //

impl Value {
    pub fn marks(&self) -> &Marks {
        &self.marks
    }

    pub fn is_marked(&self) -> bool {
        !self.marks.is_empty()
    }

    pub fn has_mark(&self, mark: &Mark) -> bool {
        self.marks.contains(mark)
    }

    pub fn mark(mut self, mark: impl Into<Mark>) -> Self {
        self.marks.insert(mark.into());
        self
    }

    pub fn with_marks<I>(mut self, marks: I) -> Self
    where
        I: IntoIterator<Item = Mark>,
    {
        self.marks.extend(marks);
        self
    }

    /// Strip the top-level marks, handing them back.
    pub fn unmark(mut self) -> (Value, Marks) {
        let marks = std::mem::take(&mut self.marks);
        (self, marks)
    }

    /// Marks on this value and everything nested in it.
    pub fn deep_marks(&self) -> Marks {
        let mut out = self.marks.clone();
        self.collect_nested_marks(&mut out);
        out
    }

    fn collect_nested_marks(&self, out: &mut Marks) {
        let children: Box<dyn Iterator<Item = &Value>> = match self.payload() {
            Some(Payload::Seq(xs)) => Box::new(xs.iter()),
            Some(Payload::Map(m)) => Box::new(m.values()),
            _ => return,
        };
        for child in children {
            out.extend(child.marks.iter().cloned());
            child.collect_nested_marks(out);
        }
    }

    /// Strip marks at every depth, handing back their union.
    pub fn unmark_deep(&self) -> (Value, Marks) {
        let marks = self.deep_marks();
        (self.strip_marks_deep(), marks)
    }

    fn strip_marks_deep(&self) -> Value {
        let state = match &self.state {
            State::Known(Payload::Seq(xs)) => {
                State::Known(Payload::Seq(xs.iter().map(Value::strip_marks_deep).collect()))
            }
            State::Known(Payload::Map(m)) => State::Known(Payload::Map(
                m.iter().map(|(k, v)| (k.clone(), v.strip_marks_deep())).collect(),
            )),
            other => other.clone(),
        };
        Value { ty: self.ty.clone(), state, marks: Marks::new() }
    }
}

// ------------------------------ Equality ---------------------------------- //

/// Structural equality with marks ignored. Unknown equals nothing, not even
/// itself; null equals null of the same type.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        if self.ty != other.ty {
            return false;
        }
        match (&self.state, &other.state) {
            (State::Null, State::Null) => true,
            (State::Known(a), State::Known(b)) => payload_eq(a, b, |x, y| x == y),
            _ => false,
        }
    }
}

impl Value {
    /// Identity comparison: same type, same state, same refinement and the
    /// same marks at every depth.
    pub fn raw_equal(&self, other: &Value) -> bool {
        if self.ty != other.ty || self.marks != other.marks {
            return false;
        }
        match (&self.state, &other.state) {
            (State::Null, State::Null) => true,
            (State::Unknown(a), State::Unknown(b)) => a == b,
            (State::Known(a), State::Known(b)) => payload_eq(a, b, Value::raw_equal),
            _ => false,
        }
    }
}

fn payload_eq(a: &Payload, b: &Payload, elem_eq: fn(&Value, &Value) -> bool) -> bool {
    match (a, b) {
        (Payload::Bool(x), Payload::Bool(y)) => x == y,
        (Payload::Number(x), Payload::Number(y)) => x == y,
        (Payload::String(x), Payload::String(y)) => x == y,
        (Payload::Seq(xs), Payload::Seq(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| elem_eq(x, y))
        }
        (Payload::Map(xs), Payload::Map(ys)) => {
            xs.len() == ys.len()
                && xs.iter().zip(ys).all(|((kx, x), (ky, y))| kx == ky && elem_eq(x, y))
        }
        (Payload::Capsule(x), Payload::Capsule(y)) => x.same_as(y),
        _ => false,
    }
}

// ------------------------------- Tests ------------------------------------ //
