//! Backup schema model and extraction from Kotlin model sources.
//!
//! The backup format is defined by `@Serializable` Kotlin data classes whose
//! constructor parameters carry `@ProtoNumber(n)` annotations. This module
//! turns those declarations into a [`SchemaDocument`] that renders as proto2
//! text for the schema compiler.
//!
//! ## Pipeline
//!
//! 1. [`declarations`] finds `[data] class Name( ... )` blocks with balanced
//!    parentheses
//! 2. [`extract_fields`] turns each parameter list into [`FieldDescriptor`]s
//! 3. [`SchemaDocument`] collects the messages per source file and renders
//!    them through a [`SchemaWriter`]
//!
//! ```
//! use tachibk_core::schema::{Cardinality, SchemaDocument, SchemaSection};
//!
//! let section = SchemaSection::parse(
//!     "Foo.kt",
//!     "data class Foo(@ProtoNumber(3) val bar: String, val baz: List<Int>)",
//! );
//! let fields = &section.messages[0].fields;
//! assert_eq!(fields[0].number, 3);
//! assert_eq!(fields[1].cardinality, Cardinality::Repeated);
//!
//! let mut document = SchemaDocument::new();
//! document.push_section(section);
//! assert!(document.to_text().contains("repeated int32 baz = 1;"));
//! ```

mod declaration;
mod emitter;
mod field;

use std::collections::HashSet;
use std::fmt;

pub use declaration::{declarations, Declaration, Declarations};
pub use emitter::{EmitterConfig, SchemaWriter, StatsWriter, TextWriter};
pub use field::{extract_fields, BROKEN_PREFIX};

/// Proto syntax of the emitted schema
pub const SYNTAX: &str = "proto2";

/// Name of the message wrapping every stored preference
pub const PREFERENCE_VALUE_MESSAGE: &str = "PreferenceValue";

/// Primitive protobuf types the extractor knows about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarType {
    /// `string`
    String,
    /// `int32`
    Int32,
    /// `int64`
    Int64,
    /// `bool`
    Bool,
    /// `float`
    Float,
    /// `bytes`
    Bytes,
}

impl ScalarType {
    /// Maps a Kotlin type name onto a protobuf scalar.
    pub fn from_kotlin(name: &str) -> Option<Self> {
        match name {
            "String" | "Char" => Some(Self::String),
            "Int" => Some(Self::Int32),
            "Long" => Some(Self::Int64),
            "Boolean" => Some(Self::Bool),
            "Float" => Some(Self::Float),
            _ => None,
        }
    }

    /// Protobuf keyword for the type
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Int32 => "int32",
            Self::Int64 => "int64",
            Self::Bool => "bool",
            Self::Float => "float",
            Self::Bytes => "bytes",
        }
    }
}

/// Type of a field: a scalar or a reference to another message or enum by name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldKind {
    /// Known primitive type
    Scalar(ScalarType),
    /// Forward reference, resolved by name only
    Named(String),
}

impl FieldKind {
    /// Maps a Kotlin type name, falling back to a named reference.
    pub fn from_kotlin(name: &str) -> Self {
        ScalarType::from_kotlin(name)
            .map(Self::Scalar)
            .unwrap_or_else(|| Self::Named(name.to_string()))
    }

    /// Protobuf spelling of the type
    pub fn type_name(&self) -> &str {
        match self {
            Self::Scalar(scalar) => scalar.as_str(),
            Self::Named(name) => name,
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}

/// Field label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cardinality {
    /// Always present
    Required,
    /// Nullable or defaulted
    Optional,
    /// Collection-typed
    Repeated,
}

impl Cardinality {
    /// Label keyword
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Required => "required",
            Self::Optional => "optional",
            Self::Repeated => "repeated",
        }
    }
}

/// One field of a message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    /// Field name, as declared
    pub name: String,
    /// Field type
    pub kind: FieldKind,
    /// Field label
    pub cardinality: Cardinality,
    /// Field number, at least 1
    pub number: u32,
}

impl FieldDescriptor {
    /// Creates a field descriptor
    pub fn new(
        name: impl Into<String>,
        kind: FieldKind,
        cardinality: Cardinality,
        number: u32,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            cardinality,
            number,
        }
    }
}

/// A message and its fields in declaration order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageDescriptor {
    /// Message name
    pub name: String,
    /// Fields in declaration order
    pub fields: Vec<FieldDescriptor>,
}

impl MessageDescriptor {
    /// Creates a message descriptor
    pub fn new(name: impl Into<String>, fields: Vec<FieldDescriptor>) -> Self {
        Self {
            name: name.into(),
            fields,
        }
    }
}

/// An enumeration with its constants
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumDescriptor {
    /// Enum name
    pub name: String,
    /// `(constant, value)` pairs
    pub values: Vec<(String, i32)>,
}

/// Messages extracted from one source file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaSection {
    /// Source file name, emitted as a comment
    pub source: String,
    /// Messages in encounter order
    pub messages: Vec<MessageDescriptor>,
}

impl SchemaSection {
    /// Extracts every declaration in `text` into a section named `source`.
    pub fn parse(source: impl Into<String>, text: &str) -> Self {
        let messages = declarations(text)
            .map(|decl| MessageDescriptor::new(decl.name, extract_fields(decl.name, decl.parameters)))
            .collect();
        Self {
            source: source.into(),
            messages,
        }
    }
}

/// A field whose named type matches no message or enum in the document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnresolvedReference {
    /// Message containing the field
    pub message: String,
    /// Field name
    pub field: String,
    /// Referenced type name
    pub type_name: String,
}

impl fmt::Display for UnresolvedReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{} references unknown type {}", self.message, self.field, self.type_name)
    }
}

/// A complete schema: fixed preamble followed by extracted sections
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaDocument {
    enums: Vec<EnumDescriptor>,
    preamble: Vec<MessageDescriptor>,
    sections: Vec<SchemaSection>,
}

impl Default for SchemaDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaDocument {
    /// Creates a document holding only the preamble.
    ///
    /// The preamble declares the `UpdateStrategy` enum, which the model
    /// sources define as a Kotlin enum class, and the `PreferenceValue`
    /// wrapper, which they define as a sealed class.
    pub fn new() -> Self {
        let update_strategy = EnumDescriptor {
            name: "UpdateStrategy".to_string(),
            values: vec![
                ("ALWAYS_UPDATE".to_string(), 0),
                ("ONLY_FETCH_ONCE".to_string(), 1),
            ],
        };
        let preference_value = MessageDescriptor::new(
            PREFERENCE_VALUE_MESSAGE,
            vec![
                FieldDescriptor::new(
                    "type",
                    FieldKind::Scalar(ScalarType::String),
                    Cardinality::Required,
                    1,
                ),
                FieldDescriptor::new(
                    "payload",
                    FieldKind::Scalar(ScalarType::Bytes),
                    Cardinality::Required,
                    2,
                ),
            ],
        );

        Self {
            enums: vec![update_strategy],
            preamble: vec![preference_value],
            sections: Vec::new(),
        }
    }

    /// Appends the messages of one source file
    pub fn push_section(&mut self, section: SchemaSection) {
        self.sections.push(section);
    }

    /// Preamble enums
    pub fn enums(&self) -> &[EnumDescriptor] {
        &self.enums
    }

    /// Preamble messages
    pub fn preamble(&self) -> &[MessageDescriptor] {
        &self.preamble
    }

    /// Extracted sections in discovery order
    pub fn sections(&self) -> &[SchemaSection] {
        &self.sections
    }

    /// Extracted messages in discovery order, preamble excluded
    pub fn messages(&self) -> impl Iterator<Item = &MessageDescriptor> {
        self.sections.iter().flat_map(|section| section.messages.iter())
    }

    /// Named field types that match no message or enum.
    ///
    /// Nothing else validates references before the schema compiler runs.
    pub fn unresolved_references(&self) -> Vec<UnresolvedReference> {
        let known: HashSet<&str> = self
            .enums
            .iter()
            .map(|e| e.name.as_str())
            .chain(self.preamble.iter().map(|m| m.name.as_str()))
            .chain(self.messages().map(|m| m.name.as_str()))
            .collect();

        self.messages()
            .flat_map(|message| {
                message.fields.iter().filter_map(|field| match &field.kind {
                    FieldKind::Named(name) if !known.contains(name.as_str()) => {
                        Some(UnresolvedReference {
                            message: message.name.clone(),
                            field: field.name.clone(),
                            type_name: name.clone(),
                        })
                    }
                    _ => None,
                })
            })
            .collect()
    }

    /// Drives a writer over the whole document
    pub fn walk(&self, writer: &mut impl SchemaWriter) -> fmt::Result {
        writer.write_syntax(SYNTAX)?;
        for enum_type in &self.enums {
            writer.write_enum(enum_type)?;
        }
        for message in &self.preamble {
            write_message(writer, message)?;
        }
        for section in &self.sections {
            writer.begin_section(&section.source)?;
            for message in &section.messages {
                write_message(writer, message)?;
            }
        }
        Ok(())
    }

    /// Renders the document as schema text with the default configuration
    pub fn to_text(&self) -> String {
        self.render(&EmitterConfig::default())
    }

    /// Renders the document as schema text
    pub fn render(&self, config: &EmitterConfig) -> String {
        let mut output = String::new();
        let mut writer = TextWriter::new(&mut output, config);
        self.walk(&mut writer).expect("String write cannot fail");
        output
    }
}

fn write_message(writer: &mut impl SchemaWriter, message: &MessageDescriptor) -> fmt::Result {
    writer.begin_message(message)?;
    for field in &message.fields {
        writer.write_field(field)?;
    }
    writer.end_message(message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kotlin_type_mapping() {
        assert_eq!(FieldKind::from_kotlin("String"), FieldKind::Scalar(ScalarType::String));
        assert_eq!(FieldKind::from_kotlin("Char"), FieldKind::Scalar(ScalarType::String));
        assert_eq!(FieldKind::from_kotlin("Int"), FieldKind::Scalar(ScalarType::Int32));
        assert_eq!(FieldKind::from_kotlin("Long"), FieldKind::Scalar(ScalarType::Int64));
        assert_eq!(FieldKind::from_kotlin("Boolean"), FieldKind::Scalar(ScalarType::Bool));
        assert_eq!(FieldKind::from_kotlin("Float"), FieldKind::Scalar(ScalarType::Float));
        assert_eq!(
            FieldKind::from_kotlin("BackupManga"),
            FieldKind::Named("BackupManga".to_string())
        );
    }

    #[test]
    fn test_section_parse() {
        let section = SchemaSection::parse(
            "Foo.kt",
            "data class Foo(@Num(3) val bar: String, val baz: List<Int>)",
        );
        assert_eq!(section.messages.len(), 1);
        assert_eq!(
            section.messages[0].fields,
            vec![
                FieldDescriptor::new(
                    "bar",
                    FieldKind::Scalar(ScalarType::String),
                    Cardinality::Required,
                    3
                ),
                FieldDescriptor::new(
                    "baz",
                    FieldKind::Scalar(ScalarType::Int32),
                    Cardinality::Repeated,
                    1
                ),
            ]
        );
    }

    #[test]
    fn test_unresolved_references() {
        let mut document = SchemaDocument::new();
        document.push_section(SchemaSection::parse(
            "Backup.kt",
            "data class Backup(\n    @ProtoNumber(1) val manga: List<BackupManga>,\n    @ProtoNumber(2) val strategy: UpdateStrategy,\n    @ProtoNumber(3) val value: PreferenceValue,\n    @ProtoNumber(4) val history: List<BackupHistory>,\n)\ndata class BackupManga(@ProtoNumber(1) val url: String)\n",
        ));

        let unresolved = document.unresolved_references();
        assert_eq!(unresolved.len(), 1);
        assert_eq!(unresolved[0].field, "history");
        assert_eq!(
            unresolved[0].to_string(),
            "Backup.history references unknown type BackupHistory"
        );
    }

    #[test]
    fn test_messages_exclude_preamble() {
        let mut document = SchemaDocument::new();
        assert_eq!(document.messages().count(), 0);
        document.push_section(SchemaSection::parse("A.kt", "class A(val a: Int)\nclass B(val b: Int)"));
        document.push_section(SchemaSection::parse("C.kt", "data class C(val c: Int)"));
        let names: Vec<_> = document.messages().map(|m| m.name.as_str()).collect();
        assert_eq!(names, ["A", "B", "C"]);
    }
}
