//! Turning schema text into a descriptor pool.
//!
//! Parsing proto text is left to `protoc`. The [`SchemaCompiler`] trait keeps
//! the rest of the pipeline independent of it; closures returning a
//! [`DescriptorPool`] implement the trait too.

use crate::error::{Error, Result};
use prost::Message;
use prost_reflect::DescriptorPool;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::process::Command;
use tracing::{debug, trace};

/// Default program name of the protobuf compiler
pub const DEFAULT_PROTOC: &str = "protoc";

/// File name the schema is compiled under
const SCHEMA_FILE: &str = "schema.proto";

/// File name of the compiled descriptor set
const DESCRIPTOR_FILE: &str = "schema.binpb";

/// Trait for compiling schema text
pub trait SchemaCompiler {
    /// Compiles proto text into a descriptor pool
    fn compile(&self, schema: &str) -> Result<DescriptorPool>;
}

impl<F> SchemaCompiler for F
where
    F: Fn(&str) -> Result<DescriptorPool>,
{
    fn compile(&self, schema: &str) -> Result<DescriptorPool> {
        self(schema)
    }
}

/// Compiles schemas by running `protoc` in a temporary directory
#[derive(Debug, Clone)]
pub struct ProtocCompiler {
    program: PathBuf,
}

impl Default for ProtocCompiler {
    fn default() -> Self {
        Self::new(DEFAULT_PROTOC)
    }
}

impl ProtocCompiler {
    /// Creates a compiler running `program`
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Program that gets run
    pub fn program(&self) -> &std::path::Path {
        &self.program
    }
}

impl SchemaCompiler for ProtocCompiler {
    fn compile(&self, schema: &str) -> Result<DescriptorPool> {
        let work_dir = tempfile::tempdir().map_err(|e| Error::directory_create(std::env::temp_dir(), e))?;
        let schema_path = work_dir.path().join(SCHEMA_FILE);
        let descriptor_path = work_dir.path().join(DESCRIPTOR_FILE);

        std::fs::write(&schema_path, schema).map_err(|e| Error::file_write(&schema_path, e))?;

        debug!("Running {} on {}", self.program.display(), schema_path.display());
        let output = Command::new(&self.program)
            .arg(format!("--proto_path={}", work_dir.path().display()))
            .arg(format!("--descriptor_set_out={}", descriptor_path.display()))
            .arg("--include_imports")
            .arg(SCHEMA_FILE)
            .output()
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => Error::CompilerNotFound {
                    program: self.program.display().to_string(),
                },
                _ => Error::compiler(e.to_string()),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::compiler(format!("{} ({})", stderr.trim(), output.status)));
        }

        let bytes =
            std::fs::read(&descriptor_path).map_err(|e| Error::file_read(&descriptor_path, e))?;
        trace!("protoc produced {} descriptor bytes", bytes.len());
        load_descriptor_set(&bytes)
    }
}

/// Decodes a serialized `FileDescriptorSet` into a pool
pub fn load_descriptor_set(bytes: &[u8]) -> Result<DescriptorPool> {
    DescriptorPool::decode(bytes).map_err(|e| {
        Error::descriptor_build(format!("failed to decode descriptor pool: {}", e))
    })
}

/// Serializes the files of a pool as a `FileDescriptorSet`
pub fn encode_descriptor_set(pool: &DescriptorPool) -> Vec<u8> {
    let fds = prost_types::FileDescriptorSet {
        file: pool.file_descriptor_protos().cloned().collect(),
    };
    fds.encode_to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{SchemaDocument, SchemaSection};
    use crate::test_support::pool_from_document;

    #[test]
    fn test_closure_compiler() {
        let compiler = |schema: &str| -> Result<DescriptorPool> {
            assert!(schema.starts_with("syntax"));
            Ok(DescriptorPool::new())
        };
        let pool = compiler.compile("syntax = \"proto2\";").unwrap();
        assert_eq!(pool.all_messages().count(), 0);
    }

    #[test]
    fn test_descriptor_set_round_trip() {
        let mut document = SchemaDocument::new();
        document.push_section(SchemaSection::parse(
            "Backup.kt",
            "data class Backup(@ProtoNumber(1) val name: String)",
        ));
        let pool = pool_from_document(&document);

        let reloaded = load_descriptor_set(&encode_descriptor_set(&pool)).unwrap();
        let backup = reloaded.get_message_by_name("Backup").unwrap();
        assert_eq!(backup.fields().count(), 1);
        assert!(reloaded.get_message_by_name("PreferenceValue").is_some());
    }

    #[test]
    fn test_invalid_descriptor_set() {
        let err = load_descriptor_set(&[0xFF, 0xFF]).unwrap_err();
        assert!(matches!(err, Error::DescriptorBuild(_)));
    }

    #[test]
    fn test_missing_protoc() {
        let compiler = ProtocCompiler::new("/nonexistent/bin/protoc");
        let err = compiler.compile("syntax = \"proto2\";").unwrap_err();
        assert!(matches!(err, Error::CompilerNotFound { .. }));
    }
}
