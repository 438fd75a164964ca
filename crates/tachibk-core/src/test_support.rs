//! Descriptor pools built straight from a [`SchemaDocument`], so tests do not
//! need `protoc`.

use crate::schema::{Cardinality, FieldDescriptor, FieldKind, MessageDescriptor, ScalarType, SchemaDocument};
use prost_reflect::DescriptorPool;
use prost_types::field_descriptor_proto::{Label, Type};
use prost_types::{
    DescriptorProto, EnumDescriptorProto, EnumValueDescriptorProto, FieldDescriptorProto,
    FileDescriptorProto, FileDescriptorSet,
};

/// Model sources shaped like the real backup classes
pub(crate) const BACKUP_SOURCES: &[(&str, &str)] = &[
    (
        "Backup.kt",
        r#"
@Serializable
data class Backup(
    @ProtoNumber(1) val backupManga: List<BackupManga>,
    @ProtoNumber(2) var backupCategories: List<BackupCategory> = emptyList(),
    @ProtoNumber(104) var backupPreferences: List<BackupPreference> = emptyList(),
    @ProtoNumber(105) var backupSourcePreferences: List<BackupSourcePreferences> = emptyList(),
)
"#,
    ),
    (
        "BackupCategory.kt",
        r#"
@Serializable
class BackupCategory(
    @ProtoNumber(1) var name: String,
    @ProtoNumber(2) var order: Long = 0,
    // @ProtoNumber(3) val updateInterval: Int = 0,
    @ProtoNumber(100) var flags: Long = 0,
)
"#,
    ),
    (
        "BackupManga.kt",
        r#"
@Serializable
data class BackupManga(
    @ProtoNumber(1) var source: Long,
    @ProtoNumber(2) var url: String,
    @ProtoNumber(3) var title: String = "",
    @ProtoNumber(17) var categories: List<Long> = emptyList(),
    @ProtoNumber(103) var updateStrategy: UpdateStrategy = UpdateStrategy.ALWAYS_UPDATE,
)
"#,
    ),
    (
        "BackupPreference.kt",
        r#"
@Serializable
data class BackupPreference(
    @ProtoNumber(1) val key: String,
    @ProtoNumber(2) val value: PreferenceValue,
)

@Serializable
data class BackupSourcePreferences(
    @ProtoNumber(1) val sourceKey: String,
    @ProtoNumber(2) val prefs: List<BackupPreference>,
)

@Serializable
sealed class PreferenceValue

@Serializable
data class IntPreferenceValue(val value: Int) : PreferenceValue()
"#,
    ),
];

/// Builds the document for [`BACKUP_SOURCES`]
pub(crate) fn backup_document() -> SchemaDocument {
    let mut document = SchemaDocument::new();
    for (name, text) in BACKUP_SOURCES {
        document.push_section(crate::schema::SchemaSection::parse(*name, text));
    }
    document
}

/// Compiles a document the way `protoc` would, for the subset it emits
pub(crate) fn pool_from_document(document: &SchemaDocument) -> DescriptorPool {
    let enum_names: Vec<&str> = document.enums().iter().map(|e| e.name.as_str()).collect();

    let file = FileDescriptorProto {
        name: Some("schema.proto".to_string()),
        syntax: Some("proto2".to_string()),
        enum_type: document
            .enums()
            .iter()
            .map(|e| EnumDescriptorProto {
                name: Some(e.name.clone()),
                value: e
                    .values
                    .iter()
                    .map(|(name, number)| EnumValueDescriptorProto {
                        name: Some(name.clone()),
                        number: Some(*number),
                        ..Default::default()
                    })
                    .collect(),
                ..Default::default()
            })
            .collect(),
        message_type: document
            .preamble()
            .iter()
            .chain(document.messages())
            .map(|message| message_proto(message, &enum_names))
            .collect(),
        ..Default::default()
    };

    DescriptorPool::from_file_descriptor_set(FileDescriptorSet { file: vec![file] })
        .expect("document should compile")
}

fn message_proto(message: &MessageDescriptor, enum_names: &[&str]) -> DescriptorProto {
    DescriptorProto {
        name: Some(message.name.clone()),
        field: message
            .fields
            .iter()
            .map(|field| field_proto(field, enum_names))
            .collect(),
        ..Default::default()
    }
}

fn field_proto(field: &FieldDescriptor, enum_names: &[&str]) -> FieldDescriptorProto {
    let label = match field.cardinality {
        Cardinality::Required => Label::Required,
        Cardinality::Optional => Label::Optional,
        Cardinality::Repeated => Label::Repeated,
    };
    let (field_type, type_name) = match &field.kind {
        FieldKind::Scalar(scalar) => (scalar_type(*scalar), None),
        FieldKind::Named(name) if enum_names.contains(&name.as_str()) => {
            (Type::Enum, Some(format!(".{}", name)))
        }
        FieldKind::Named(name) => (Type::Message, Some(format!(".{}", name))),
    };

    FieldDescriptorProto {
        name: Some(field.name.clone()),
        number: Some(field.number as i32),
        label: Some(label as i32),
        r#type: Some(field_type as i32),
        type_name,
        json_name: Some(field.name.clone()),
        ..Default::default()
    }
}

fn scalar_type(scalar: ScalarType) -> Type {
    match scalar {
        ScalarType::String => Type::String,
        ScalarType::Int32 => Type::Int32,
        ScalarType::Int64 => Type::Int64,
        ScalarType::Bool => Type::Bool,
        ScalarType::Float => Type::Float,
        ScalarType::Bytes => Type::Bytes,
    }
}
