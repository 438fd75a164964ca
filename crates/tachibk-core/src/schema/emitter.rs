//! Schema writers.
//!
//! [`SchemaDocument::walk`](super::SchemaDocument::walk) drives a
//! [`SchemaWriter`] over the document. [`TextWriter`] renders proto2 text;
//! [`StatsWriter`] only counts what it sees.

use super::{EnumDescriptor, FieldDescriptor, MessageDescriptor};
use std::fmt::{Result, Write as FmtWrite};

/// Trait for writing schema elements to output.
///
/// Every method defaults to a no-op, so implementations only override what
/// they need.
pub trait SchemaWriter {
    /// Write the syntax declaration
    fn write_syntax(&mut self, syntax: &str) -> Result {
        let _ = syntax;
        Ok(())
    }

    /// Write an enum definition
    fn write_enum(&mut self, enum_type: &EnumDescriptor) -> Result {
        let _ = enum_type;
        Ok(())
    }

    /// Start the messages extracted from one source file
    fn begin_section(&mut self, source: &str) -> Result {
        let _ = source;
        Ok(())
    }

    /// Open a message definition
    fn begin_message(&mut self, message: &MessageDescriptor) -> Result {
        let _ = message;
        Ok(())
    }

    /// Write a field definition
    fn write_field(&mut self, field: &FieldDescriptor) -> Result {
        let _ = field;
        Ok(())
    }

    /// Close a message definition
    fn end_message(&mut self, message: &MessageDescriptor) -> Result {
        let _ = message;
        Ok(())
    }
}

/// Configuration for schema text output
#[derive(Debug, Clone)]
pub struct EmitterConfig {
    /// Indentation string (default: 2 spaces)
    pub indent_str: String,
    /// Emit a `// <file>` comment before each source section
    pub source_comments: bool,
}

impl Default for EmitterConfig {
    fn default() -> Self {
        Self {
            indent_str: "  ".to_string(),
            source_comments: true,
        }
    }
}

impl EmitterConfig {
    /// Creates a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the indentation string
    pub fn indent_str(mut self, s: impl Into<String>) -> Self {
        self.indent_str = s.into();
        self
    }

    /// Sets whether to emit source file comments
    pub fn source_comments(mut self, include: bool) -> Self {
        self.source_comments = include;
        self
    }
}

/// Writes proto2 schema text
pub struct TextWriter<'a, W: FmtWrite> {
    writer: &'a mut W,
    config: &'a EmitterConfig,
}

impl<'a, W: FmtWrite> TextWriter<'a, W> {
    /// Creates a text writer over `writer`
    pub fn new(writer: &'a mut W, config: &'a EmitterConfig) -> Self {
        Self { writer, config }
    }
}

impl<W: FmtWrite> SchemaWriter for TextWriter<'_, W> {
    fn write_syntax(&mut self, syntax: &str) -> Result {
        writeln!(self.writer, "syntax = \"{}\";", syntax)?;
        writeln!(self.writer)
    }

    fn write_enum(&mut self, enum_type: &EnumDescriptor) -> Result {
        writeln!(self.writer, "enum {} {{", enum_type.name)?;
        for (name, number) in &enum_type.values {
            writeln!(self.writer, "{}{} = {};", self.config.indent_str, name, number)?;
        }
        writeln!(self.writer, "}}")?;
        writeln!(self.writer)
    }

    fn begin_section(&mut self, source: &str) -> Result {
        if self.config.source_comments {
            writeln!(self.writer, "// {}", source)?;
        }
        Ok(())
    }

    fn begin_message(&mut self, message: &MessageDescriptor) -> Result {
        writeln!(self.writer, "message {} {{", message.name)
    }

    fn write_field(&mut self, field: &FieldDescriptor) -> Result {
        writeln!(
            self.writer,
            "{}{} {} {} = {};",
            self.config.indent_str,
            field.cardinality.as_str(),
            field.kind,
            field.name,
            field.number
        )
    }

    fn end_message(&mut self, _message: &MessageDescriptor) -> Result {
        writeln!(self.writer, "}}")?;
        writeln!(self.writer)
    }
}

/// A writer that collects statistics about the schema
#[derive(Debug, Default)]
pub struct StatsWriter {
    /// Number of source sections
    pub section_count: usize,
    /// Number of messages, preamble included
    pub message_count: usize,
    /// Number of fields
    pub field_count: usize,
    /// Number of enums
    pub enum_count: usize,
}

impl SchemaWriter for StatsWriter {
    fn write_enum(&mut self, _enum_type: &EnumDescriptor) -> Result {
        self.enum_count += 1;
        Ok(())
    }

    fn begin_section(&mut self, _source: &str) -> Result {
        self.section_count += 1;
        Ok(())
    }

    fn begin_message(&mut self, _message: &MessageDescriptor) -> Result {
        self.message_count += 1;
        Ok(())
    }

    fn write_field(&mut self, _field: &FieldDescriptor) -> Result {
        self.field_count += 1;
        Ok(())
    }
}
