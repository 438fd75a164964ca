//! # tachibk-core
//!
//! A library for converting manga reader backups (`.tachibk`) between their
//! protobuf encoding and JSON, with the schema derived from the application's
//! Kotlin model sources.
//!
//! This crate provides the core functionality for:
//! - Extracting a proto2 schema from `@ProtoNumber`-annotated data classes
//! - Compiling that schema into a descriptor pool
//! - Converting backup bytes to JSON and back
//! - Translating the opaque preference payloads into readable values
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`wire`]: Varint and tag primitives of the protobuf wire format
//! - [`preference`]: Preference payload codec
//! - [`schema`]: Declaration parsing, field extraction and schema emission
//! - [`source`]: Retrieval of model sources from GitHub or a local directory
//! - [`extractor`]: The source-to-schema pipeline
//! - [`compiler`]: Schema compilation through `protoc`
//! - [`backup`]: Backup containers and JSON conversion
//! - [`error`]: Error types and handling
//!
//! ## Example
//!
//! ```no_run
//! use tachibk_core::{
//!     BackupConverter, ConverterConfig, Fork, GitHubSource, ProtocCompiler, SchemaCompiler,
//!     SchemaExtractor,
//! };
//!
//! // Derive the schema from the fork's sources
//! let document = SchemaExtractor::new(GitHubSource::new(Fork::Mihon)?).extract()?;
//! let pool = ProtocCompiler::default().compile(&document.to_text())?;
//!
//! // Decode a backup into readable JSON
//! let converter = BackupConverter::new(&pool, ConverterConfig::new().convert_preferences(true))?;
//! let data = tachibk_core::backup::read_backup("backup.tachibk")?;
//! println!("{}", converter.to_json(&data)?);
//! # Ok::<(), tachibk_core::Error>(())
//! ```
//!
//! ## Extensibility
//!
//! The library provides several traits for customization:
//!
//! - [`SourceProvider`]: Supply model sources from elsewhere
//! - [`SchemaCompiler`]: Replace `protoc`
//! - [`SchemaWriter`]: Customize how schema elements are written
//!

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unreachable_pub)]

pub mod backup;
pub mod compiler;
pub mod error;
pub mod extractor;
pub mod preference;
pub mod schema;
pub mod source;
pub mod wire;

#[cfg(test)]
mod test_support;

// Re-export primary types for convenience
pub use backup::{BackupConverter, ConverterConfig};
pub use compiler::{ProtocCompiler, SchemaCompiler};
pub use error::{Error, Result};
pub use extractor::{ExtractorConfig, SchemaExtractor};
pub use preference::{PreferenceData, PreferenceKind};
pub use schema::{EmitterConfig, SchemaDocument, SchemaWriter, StatsWriter};
pub use source::{DirectorySource, Fork, GitHubSource, SourceProvider, StaticSource};

/// Crate version for programmatic access
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
