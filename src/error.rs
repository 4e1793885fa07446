//! Error kinds.
//!
//! Every failure the core can produce is one of the types below. Each carries
//! structured context (path, expected type, native type name, wire format)
//! so a caller can build its own diagnostic; `Display` is intentionally terse.
use std::fmt;

use thiserror::Error;

use crate::path::{Path, Step};
use crate::types::Type;

/// Top-level error, for callers that do not care which stage failed.
#[derive(Debug, Clone, Error)]
pub enum Error {
    #[error(transparent)]
    InvalidType(#[from] InvalidTypeKind),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Conversion(#[from] ConversionError),
    #[error(transparent)]
    AttributePath(#[from] AttributePathError),
    #[error(transparent)]
    Serialization(#[from] SerializationError),
    #[error(transparent)]
    Deserialization(#[from] DeserializationError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

fn rendered(path: &Path) -> String {
    path.to_string()
}

fn at(path: &Path) -> String {
    if path.is_empty() { String::new() } else { format!("at {path}: ") }
}

// ---------------------------- Type construction --------------------------- //

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidTypeKind {
    /// An optional attribute name that the object does not declare.
    #[error("optional attribute {0:?} is not an attribute of the object type")]
    UnknownOptionalAttribute(String),
    #[error("capsule type {0:?} is already defined")]
    DuplicateCapsule(String),
    #[error("no capsule type named {0:?}")]
    UnknownCapsule(String),
    /// A type description (wire JSON) that does not denote any type.
    #[error("malformed type description: {0}")]
    Malformed(String),
}

// ------------------------------- Validation ------------------------------- //

#[derive(Debug, Clone, PartialEq, Error)]
#[error("{}{}", at(.path), .kind)]
pub struct ValidationError {
    pub path: Path,
    pub kind: ValidationErrorKind,
}

impl ValidationError {
    pub fn new(path: Path, kind: ValidationErrorKind) -> Self {
        ValidationError { path, kind }
    }

    pub fn path(&self) -> &Path { &self.path }
    pub fn kind(&self) -> &ValidationErrorKind { &self.kind }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationErrorKind {
    /// The input's shape cannot match the target type.
    #[error("expected {expected}, found {found}")]
    TypeMismatch { expected: Type, found: Found },
    /// A numeric string that is not a number literal.
    #[error("{0:?} is not a valid number")]
    InvalidNumber(String),
    /// NaN and the infinities have no CTY number.
    #[error("{0} cannot be represented as a number")]
    NumberNotRepresentable(String),
    #[error(transparent)]
    Map(MapValidationKind),
    #[error(transparent)]
    Object(ObjectValidationKind),
    #[error("tuple requires {expected} elements, found {found}")]
    TupleLength { expected: usize, found: usize },
    #[error("expected capsule {expected}, found {found}")]
    CapsuleMismatch { expected: String, found: Found },
    #[error("nesting exceeds the maximum depth of {limit}")]
    DepthExceeded { limit: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MapValidationKind {
    /// Names the runtime type of the key, never the key itself.
    #[error("map keys must be strings, found key of type {key_type}")]
    NonStringKey { key_type: String },
    #[error("duplicate map key {0:?} after normalization")]
    DuplicateKey(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ObjectValidationKind {
    #[error("object keys must be strings, found key of type {key_type}")]
    NonStringKey { key_type: String },
    #[error("missing required attribute {0:?}")]
    MissingAttribute(String),
    #[error("unsupported attribute {0:?}")]
    ExtraneousAttribute(String),
    #[error("duplicate attribute {0:?} after normalization")]
    DuplicateKey(String),
}

/// What validation actually found where it expected a given type.
#[derive(Debug, Clone, PartialEq)]
pub enum Found {
    /// Native input, named by its host type (`int`, `str`, `dict`, ...).
    Native(&'static str),
    /// An already-typed value.
    Value(Type),
}

impl fmt::Display for Found {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Found::Native(name) => write!(f, "{name}"),
            Found::Value(ty) => write!(f, "value of type {ty}"),
        }
    }
}

// ------------------------------- Conversion ------------------------------- //

#[derive(Debug, Clone, PartialEq, Error)]
#[error("{}cannot convert {} to {}: {}", at(.path), .from, .to, .reason)]
pub struct ConversionError {
    pub path: Path,
    pub from: Type,
    pub to: Type,
    pub reason: ConversionFailure,
}

impl ConversionError {
    pub fn path(&self) -> &Path { &self.path }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConversionFailure {
    #[error("no conversion exists between these types")]
    Unsupported,
    #[error("{0:?} is not a valid number")]
    InvalidNumber(String),
    #[error("{0:?} is not a valid bool")]
    InvalidBool(String),
    #[error("expected {expected} elements, found {found}")]
    LengthMismatch { expected: usize, found: usize },
    #[error("missing required attribute {0:?}")]
    MissingAttribute(String),
    #[error("unsupported attribute {0:?}")]
    ExtraneousAttribute(String),
    #[error("nesting exceeds the maximum depth of {limit}")]
    DepthExceeded { limit: usize },
}

// ---------------------------- Path traversal ------------------------------ //

#[derive(Debug, Clone, PartialEq, Error)]
#[error("cannot apply {} after {:?}: {}", .step, rendered(.consumed), .reason)]
pub struct AttributePathError {
    /// The first step that could not be resolved.
    pub step: Step,
    /// Steps successfully applied before `step`.
    pub consumed: Path,
    pub reason: PathFailure,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PathFailure {
    #[error("value is null")]
    Null,
    #[error("value is unknown")]
    Unknown,
    #[error("no attribute {0:?}")]
    NoSuchAttribute(String),
    #[error("index {index} out of range for length {len}")]
    IndexOutOfRange { index: i64, len: usize },
    #[error("no element with key {0:?}")]
    NoSuchKey(String),
    #[error("{0} cannot be traversed with this step")]
    NotTraversable(Type),
}

// ------------------------------- Wire codecs ------------------------------ //

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireFormat {
    Json,
    MsgPack,
}

impl fmt::Display for WireFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            WireFormat::Json => "json",
            WireFormat::MsgPack => "msgpack",
        })
    }
}

/// Coarse shape of a wire value, reported instead of raw bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireShape {
    Null,
    Scalar,
    List,
    Dict,
    Extension,
    /// The bytes did not parse at all.
    Malformed,
}

impl fmt::Display for WireShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            WireShape::Null => "null",
            WireShape::Scalar => "scalar",
            WireShape::List => "list",
            WireShape::Dict => "dict",
            WireShape::Extension => "ext",
            WireShape::Malformed => "malformed",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("{format} encode failed {}{}", at(.path), .reason)]
pub struct SerializationError {
    pub format: WireFormat,
    pub path: Path,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("{format} decode of {byte_len} bytes failed {}{} (found {shape}, expected {expected})", at(.path), .reason)]
pub struct DeserializationError {
    pub format: WireFormat,
    pub byte_len: usize,
    pub expected: Type,
    pub shape: WireShape,
    pub path: Path,
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_mention_the_path() {
        let err = ValidationError::new(
            Path::empty().get_attr("a").index(0),
            ValidationErrorKind::TypeMismatch { expected: Type::Number, found: Found::Native("str") },
        );
        assert_eq!(err.to_string(), "at .a[0]: expected number, found str");

        let root = ValidationError::new(
            Path::empty(),
            ValidationErrorKind::Map(MapValidationKind::NonStringKey { key_type: "int".into() }),
        );
        assert_eq!(root.to_string(), "map keys must be strings, found key of type int");
    }

    #[test]
    fn top_level_error_wraps_every_kind() {
        let e: Error = InvalidTypeKind::Malformed("x".into()).into();
        assert!(matches!(e, Error::InvalidType(_)));
        let e: Error = SerializationError {
            format: WireFormat::Json,
            path: Path::empty(),
            reason: "capsule".into(),
        }
        .into();
        assert_eq!(e.to_string(), "json encode failed capsule");
    }
}
