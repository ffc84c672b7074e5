//! Errors reported by the generator.

use std::{error::Error, fmt::Display};

pub(crate) type GeneratorResult<R> = std::result::Result<R, GeneratorError>;

/// Possible errors during mock generation.
///
/// Every error aborts the whole generation run; no partial output is produced.
#[derive(Debug)]
pub enum GeneratorError {
    /// Unknown mock strategy.
    ///
    /// The requested strategy name is not registered. Holds the requested name
    /// and every registered name.
    UnknownStrategy {
        /// Name that was asked for.
        requested: String,
        /// Registered names, sorted.
        available: Vec<String>,
    },

    /// Invalid plugin parameter.
    ///
    /// This error occurs when the parameter string passed by protoc contains an
    /// unknown key or a value that cannot be interpreted.
    InvalidParameter(String),

    /// Missing file.
    ///
    /// A file listed for generation has no descriptor in the request.
    MissingFile(String),

    /// Missing Go package.
    ///
    /// The file has no `go_package` option, so the Go import path of its types
    /// cannot be determined.
    MissingGoPackage(String),

    /// Unresolved type reference.
    ///
    /// A method refers to a message that is not defined in any file of the
    /// request.
    UnresolvedType(String),

    /// Malformed method descriptor.
    ///
    /// The method is missing its name, input or output type.
    MalformedMethod(String),

    /// Two distinct types would produce the same matcher helper.
    MatcherCollision {
        /// Name of the helper.
        helper: String,
        /// Type registered first.
        first: String,
        /// Type that collided with it.
        second: String,
    },

    /// The external mock generator failed.
    Delegate(String),

    /// I/O error.
    ///
    /// This wraps any I/O error that occurs while talking to external processes
    /// or the protoc pipe.
    IoError(std::io::Error),

    /// Decode error.
    ///
    /// This wraps an error decoding the protobuf request sent by protoc.
    DecodeError(prost::DecodeError),

    /// JSON error.
    ///
    /// This wraps an error exchanging interface descriptions with the external
    /// mock generator.
    JsonError(serde_json::Error),
}

#[doc(hidden)]
#[cfg_attr(coverage_nightly, coverage(off))]
impl From<std::io::Error> for GeneratorError {
    fn from(err: std::io::Error) -> Self {
        GeneratorError::IoError(err)
    }
}

#[doc(hidden)]
#[cfg_attr(coverage_nightly, coverage(off))]
impl From<prost::DecodeError> for GeneratorError {
    fn from(err: prost::DecodeError) -> Self {
        GeneratorError::DecodeError(err)
    }
}

#[doc(hidden)]
#[cfg_attr(coverage_nightly, coverage(off))]
impl From<serde_json::Error> for GeneratorError {
    fn from(err: serde_json::Error) -> Self {
        GeneratorError::JsonError(err)
    }
}

impl GeneratorError {
    pub(crate) fn invalid_parameter(message: impl Into<String>) -> Self {
        GeneratorError::InvalidParameter(message.into())
    }
}

impl Display for GeneratorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GeneratorError::UnknownStrategy {
                requested,
                available,
            } => {
                let available = available
                    .iter()
                    .map(|name| format!("{name:?}"))
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(
                    f,
                    "unknown test framework {requested:?}. Please use one of the following: [{available}]"
                )
            }
            GeneratorError::InvalidParameter(message) => {
                write!(f, "invalid parameter: {message}")
            }
            GeneratorError::MissingFile(file) => {
                write!(f, "no descriptor for requested file {file:?}")
            }
            GeneratorError::MissingGoPackage(file) => write!(
                f,
                "unable to determine Go import path for {file:?}: missing go_package option"
            ),
            GeneratorError::UnresolvedType(name) => write!(f, "unresolved type: {name}"),
            GeneratorError::MalformedMethod(message) => {
                write!(f, "malformed method: {message}")
            }
            GeneratorError::MatcherCollision {
                helper,
                first,
                second,
            } => write!(
                f,
                "matcher {helper} would be generated for both {first} and {second}"
            ),
            GeneratorError::Delegate(message) => {
                write!(f, "external mock generator failed: {message}")
            }
            GeneratorError::IoError(err) => write!(f, "I/O error: {err}"),
            GeneratorError::DecodeError(err) => write!(f, "decode error: {err}"),
            GeneratorError::JsonError(err) => write!(f, "JSON error: {err}"),
        }
    }
}

impl Error for GeneratorError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            GeneratorError::IoError(err) => Some(err),
            GeneratorError::DecodeError(err) => Some(err),
            GeneratorError::JsonError(err) => Some(err),
            _ => None,
        }
    }
}
