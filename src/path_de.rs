//! Deserialization with document-path context in error messages.
//!
//! Wraps `serde_path_to_error` so a bad config key or a malformed type file
//! reports where in the document it went wrong, e.g. `at max_depth: invalid
//! type: string "x", expected usize`.
use serde::de::DeserializeOwned;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("at {path}: {message}")]
pub struct PathError {
    /// Dotted path into the document, `.` for the root.
    pub path: String,
    pub message: String,
}

impl PathError {
    fn from_json(err: serde_path_to_error::Error<serde_json::Error>) -> Self {
        PathError { path: err.path().to_string(), message: err.into_inner().to_string() }
    }
}

/// Deserialize JSON text.
pub fn from_str_with_path<T: DeserializeOwned>(src: &str) -> Result<T, PathError> {
    let de = &mut serde_json::Deserializer::from_str(src);
    serde_path_to_error::deserialize::<_, T>(de).map_err(PathError::from_json)
}

/// Deserialize JSON bytes.
pub fn from_slice_with_path<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, PathError> {
    let de = &mut serde_json::Deserializer::from_slice(bytes);
    serde_path_to_error::deserialize::<_, T>(de).map_err(PathError::from_json)
}

/// Deserialize TOML text.
pub fn from_toml_with_path<T: DeserializeOwned>(src: &str) -> Result<T, PathError> {
    let de = toml::Deserializer::new(src);
    serde_path_to_error::deserialize::<_, T>(de).map_err(|err| PathError {
        path: err.path().to_string(),
        message: err.into_inner().message().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    #[allow(dead_code)]
    struct Outer {
        inner: Inner,
    }

    #[derive(Debug, Deserialize)]
    #[allow(dead_code)]
    struct Inner {
        depth: usize,
    }

    #[test]
    fn json_errors_carry_the_path() {
        let err = from_str_with_path::<Outer>(r#"{"inner": {"depth": "deep"}}"#).unwrap_err();
        assert_eq!(err.path, "inner.depth");
    }

    #[test]
    fn toml_errors_carry_the_path() {
        let err = from_toml_with_path::<Outer>("[inner]\ndepth = \"deep\"\n").unwrap_err();
        assert_eq!(err.path, "inner.depth");
    }
}
