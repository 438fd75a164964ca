//! Error types for the tachibk-core library.
//!
//! This module provides error handling using the `thiserror` crate, with
//! variants for each failure mode of extraction, compilation and conversion.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for tachibk operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for all tachibk operations
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// A backup, schema or source file could not be read
    #[error("cannot read '{path}': {source}")]
    FileRead {
        /// File being read
        path: PathBuf,
        /// I/O failure
        #[source]
        source: std::io::Error,
    },

    /// An output or cache file could not be written
    #[error("cannot write '{path}': {source}")]
    FileWrite {
        /// File being written
        path: PathBuf,
        /// I/O failure
        #[source]
        source: std::io::Error,
    },

    /// An output or working directory could not be created
    #[error("cannot create directory '{path}': {source}")]
    DirectoryCreate {
        /// Directory being created
        path: PathBuf,
        /// I/O failure
        #[source]
        source: std::io::Error,
    },

    /// A preference payload does not have the expected single-field layout
    #[error("malformed payload at byte {offset}: {details}")]
    InvalidWireFormat {
        /// Offset into the payload
        offset: usize,
        /// What was expected
        details: String,
    },

    /// Varint ran past the end of its buffer or past ten bytes
    #[error("malformed varint at offset {offset}: missing terminating byte")]
    VarintDecode {
        /// Offset into the payload
        offset: usize,
    },

    /// Failed to decode a backup message
    #[error("failed to decode backup message: {0}")]
    MessageDecode(#[from] prost::DecodeError),

    /// Failed to build a descriptor pool from compiled schema output
    #[error("failed to build descriptor pool: {0}")]
    DescriptorBuild(String),

    /// The compiled schema lacks a required message
    #[error("message '{name}' not found in compiled schema")]
    MessageNotFound {
        /// Fully qualified message name
        name: String,
    },

    /// The schema compiler executable could not be started
    #[error("schema compiler '{program}' not found; install protoc from https://github.com/protocolbuffers/protobuf/releases/latest")]
    CompilerNotFound {
        /// Program that was invoked
        program: String,
    },

    /// The schema compiler rejected the emitted schema text
    #[error("schema compiler failed: {details}")]
    Compiler {
        /// Compiler diagnostics
        details: String,
    },

    /// HTTP retrieval of a source file failed
    #[error("failed to fetch '{url}': {source}")]
    Fetch {
        /// Requested URL
        url: String,
        /// Underlying HTTP error
        #[source]
        source: reqwest::Error,
    },

    /// A directory walk failed
    #[error("failed to walk directory: {0}")]
    Walk(#[from] walkdir::Error),

    /// JSON document could not be parsed or mapped onto the schema
    #[error("invalid JSON document: {0}")]
    Json(#[from] serde_json::Error),

    /// Preference payload is not valid base64
    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),

    /// A readable preference value does not fit its declared kind
    #[error("invalid {kind} preference value: {details}")]
    InvalidPreference {
        /// Preference kind name
        kind: String,
        /// What was wrong with the value
        details: String,
    },

    /// Anything else, e.g. a bad fork name
    #[error("{0}")]
    Internal(String),
}

impl Error {
    /// Creates a new file read error
    pub fn file_read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileRead {
            path: path.into(),
            source,
        }
    }

    /// Creates a new file write error
    pub fn file_write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileWrite {
            path: path.into(),
            source,
        }
    }

    /// Creates a new directory creation error
    pub fn directory_create(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::DirectoryCreate {
            path: path.into(),
            source,
        }
    }

    /// Creates a new wire format error
    pub fn invalid_wire_format(offset: usize, details: impl Into<String>) -> Self {
        Self::InvalidWireFormat {
            offset,
            details: details.into(),
        }
    }

    /// Creates a new varint decode error
    pub fn varint_decode(offset: usize) -> Self {
        Self::VarintDecode { offset }
    }

    /// Creates a new descriptor build error
    pub fn descriptor_build(msg: impl Into<String>) -> Self {
        Self::DescriptorBuild(msg.into())
    }

    /// Creates a new fetch error
    pub fn fetch(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Fetch {
            url: url.into(),
            source,
        }
    }

    /// Creates a new compiler error
    pub fn compiler(details: impl Into<String>) -> Self {
        Self::Compiler {
            details: details.into(),
        }
    }

    /// Creates a new invalid preference error
    pub fn invalid_preference(kind: impl Into<String>, details: impl Into<String>) -> Self {
        Self::InvalidPreference {
            kind: kind.into(),
            details: details.into(),
        }
    }

    /// Creates a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns true if the error only affects a single value and the run can continue
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::VarintDecode { .. }
                | Self::InvalidWireFormat { .. }
                | Self::Base64(_)
                | Self::InvalidPreference { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::varint_decode(3);
        assert!(err.to_string().contains("malformed varint"));
        assert!(err.to_string().contains('3'));
    }

    #[test]
    fn test_is_recoverable() {
        assert!(Error::varint_decode(0).is_recoverable());
        assert!(Error::invalid_preference("Int", "not a number").is_recoverable());
        assert!(!Error::compiler("syntax error").is_recoverable());
        assert!(!Error::MessageNotFound {
            name: "Backup".into()
        }
        .is_recoverable());
    }
}
