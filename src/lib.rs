//! CTY: a structural type system and value model with go-cty compatible
//! wire codecs.
//!
//! The flow is native data in (`Native`), typed values out (`Value`):
//!
//! 1. `validate` checks native data against a `Type`, inferring concrete
//!    types for `dynamic` slots.
//! 2. `convert` moves a value to another type (number to string, list to
//!    set, object to map, ...).
//! 3. `Path` walks into values; `codec` writes and reads JSON and MessagePack.
//!
//! `Engine` runs all of these under one `Config`; the free functions use the
//! defaults.
pub mod codec;
pub mod config;
pub mod convert;
pub mod error;
pub mod inference;
pub mod native;
pub mod path;
pub mod path_de;
pub mod types;
pub mod validate;
pub mod value;

pub use codec::{decode_json, decode_msgpack, encode_json, encode_json_as, encode_msgpack, encode_msgpack_as};
pub use config::Config;
pub use convert::{conversion_possible, convert};
pub use error::{
    AttributePathError, ConversionError, DeserializationError, Error, InvalidTypeKind, Result,
    SerializationError, ValidationError,
};
pub use inference::{infer_type, unify, Inference};
pub use native::Native;
pub use path::{IndexKey, Path, Step};
pub use types::{CapsuleHandle, CapsuleRegistry, CapsuleType, ObjectType, Type};
pub use validate::{validate, Engine};
pub use value::{Mark, Marks, Number, Refinement, Value};
