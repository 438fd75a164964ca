//! Backup containers and conversion between backup bytes and JSON.
//!
//! A backup file is a gzip stream around one serialized `Backup` message.
//! Decoding and encoding the message itself is done by `prost-reflect`
//! against a compiled schema; the only part handled by hand is the opaque
//! `PreferenceValue.payload`, translated through [`crate::preference`] when
//! [`ConverterConfig::convert_preferences`] is set.

use crate::error::{Error, Result};
use crate::preference::{make_encoded, make_readable};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use prost::Message;
use prost_reflect::{DescriptorPool, DynamicMessage, MessageDescriptor};
use serde_json::Value;
use std::io::{Read, Write};
use std::path::Path;
use tracing::{debug, trace, warn};

/// First two bytes of every gzip stream
pub const GZIP_MAGIC: [u8; 2] = [0x1F, 0x8B];

/// Output name suffixes that get gzip compressed
const COMPRESSED_SUFFIXES: [&str; 2] = [".tachibk", ".proto.gz"];

/// Name of the top-level backup message
pub const ROOT_MESSAGE: &str = "Backup";

/// Reads a backup file, decompressing it when it is a gzip stream.
pub fn read_backup(path: impl AsRef<Path>) -> Result<Vec<u8>> {
    let path = path.as_ref();
    let data = std::fs::read(path).map_err(|e| Error::file_read(path, e))?;

    if !data.starts_with(&GZIP_MAGIC) {
        debug!("{} is not gzip compressed", path.display());
        return Ok(data);
    }

    let mut decompressed = Vec::new();
    GzDecoder::new(data.as_slice())
        .read_to_end(&mut decompressed)
        .map_err(|e| Error::file_read(path, e))?;
    debug!(
        "Decompressed {} ({} -> {} bytes)",
        path.display(),
        data.len(),
        decompressed.len()
    );
    Ok(decompressed)
}

/// Whether a file name asks for a gzip container
pub fn is_compressed_name(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
    COMPRESSED_SUFFIXES.iter().any(|suffix| name.ends_with(suffix))
}

/// Writes backup bytes, creating parent directories as needed.
///
/// The data is gzip compressed when the file name ends in `.tachibk` or
/// `.proto.gz`. Returns whether compression was applied.
pub fn write_backup(path: impl AsRef<Path>, data: &[u8]) -> Result<bool> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| Error::directory_create(parent, e))?;
    }

    let compress = is_compressed_name(path);
    let bytes = if compress {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(data)
            .and_then(|_| encoder.finish())
            .map_err(|e| Error::file_write(path, e))?
    } else {
        data.to_vec()
    };

    std::fs::write(path, bytes).map_err(|e| Error::file_write(path, e))?;
    Ok(compress)
}

/// Configuration for backup conversion
#[derive(Debug, Clone)]
pub struct ConverterConfig {
    /// Translate preference payloads to and from readable values
    pub convert_preferences: bool,
    /// Fully qualified name of the root message
    pub root_message: String,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            convert_preferences: false,
            root_message: ROOT_MESSAGE.to_string(),
        }
    }
}

impl ConverterConfig {
    /// Creates a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether preference payloads are translated
    pub fn convert_preferences(mut self, convert: bool) -> Self {
        self.convert_preferences = convert;
        self
    }

    /// Sets the root message name
    pub fn root_message(mut self, name: impl Into<String>) -> Self {
        self.root_message = name.into();
        self
    }
}

/// Converts between backup message bytes and JSON
#[derive(Debug, Clone)]
pub struct BackupConverter {
    descriptor: MessageDescriptor,
    config: ConverterConfig,
}

impl BackupConverter {
    /// Creates a converter for the root message of `pool`
    pub fn new(pool: &DescriptorPool, config: ConverterConfig) -> Result<Self> {
        let descriptor = pool
            .get_message_by_name(&config.root_message)
            .ok_or_else(|| Error::MessageNotFound {
                name: config.root_message.clone(),
            })?;
        Ok(Self { descriptor, config })
    }

    /// Returns a reference to the configuration
    pub fn config(&self) -> &ConverterConfig {
        &self.config
    }

    /// Decodes backup bytes into their JSON mapping
    pub fn to_json(&self, data: &[u8]) -> Result<Value> {
        let message = DynamicMessage::decode(self.descriptor.clone(), data)?;
        let mut value = serde_json::to_value(&message)?;

        if self.config.convert_preferences {
            let converted = translate_preferences(&mut value, make_readable)?;
            debug!("Decoded {} preference payloads", converted);
        }
        Ok(value)
    }

    /// Encodes a JSON document into backup bytes
    pub fn from_json(&self, mut value: Value) -> Result<Vec<u8>> {
        if self.config.convert_preferences {
            let converted = translate_preferences(&mut value, make_encoded)?;
            debug!("Encoded {} preference payloads", converted);
        }

        let message = DynamicMessage::deserialize(self.descriptor.clone(), value)?;
        Ok(message.encode_to_vec())
    }
}

/// Applies `convert` to every preference record of a backup document.
///
/// Recoverable failures leave the record as it was. Returns the number of
/// records converted.
fn translate_preferences(
    backup: &mut Value,
    convert: fn(&mut Value) -> Result<bool>,
) -> Result<usize> {
    let mut converted = 0;

    for preference in preference_entries(backup) {
        let key = preference
            .get("key")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let Some(record) = preference.get_mut("value") else {
            continue;
        };

        match convert(record) {
            Ok(true) => converted += 1,
            Ok(false) => trace!("Leaving preference {} unconverted", key),
            Err(e) if e.is_recoverable() => warn!("Preference {}: {}", key, e),
            Err(e) => return Err(e),
        }
    }

    Ok(converted)
}

/// `backupPreferences[*]` and `backupSourcePreferences[*].prefs[*]`
fn preference_entries(backup: &mut Value) -> Vec<&mut Value> {
    let mut entries = Vec::new();
    let Some(object) = backup.as_object_mut() else {
        return entries;
    };

    for (name, field) in object.iter_mut() {
        let Some(items) = field.as_array_mut() else {
            continue;
        };
        match name.as_str() {
            "backupPreferences" => entries.extend(items.iter_mut()),
            "backupSourcePreferences" => entries.extend(
                items
                    .iter_mut()
                    .filter_map(|source| source.get_mut("prefs").and_then(Value::as_array_mut))
                    .flatten(),
            ),
            _ => {}
        }
    }
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{backup_document, pool_from_document};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tempfile::TempDir;

    fn converter(convert_preferences: bool) -> BackupConverter {
        let pool = pool_from_document(&backup_document());
        let config = ConverterConfig::new().convert_preferences(convert_preferences);
        BackupConverter::new(&pool, config).unwrap()
    }

    fn readable_backup() -> Value {
        json!({
            "backupManga": [{
                "source": "2499283573021220255",
                "url": "/manga/1",
                "title": "Title",
                "categories": ["1", "2"],
                "updateStrategy": "ONLY_FETCH_ONCE",
            }],
            "backupCategories": [{ "name": "Reading", "order": "1" }],
            "backupPreferences": [
                { "key": "pref_a", "value": { "type": "eu.kanade.tachiyomi.data.backup.models.IntPreferenceValue", "payload": 42 } },
                { "key": "pref_b", "value": { "type": "StringSetPreferenceValue", "payload": ["a", "b"] } },
            ],
            "backupSourcePreferences": [{
                "sourceKey": "source_1",
                "prefs": [
                    { "key": "pref_c", "value": { "type": "BooleanPreferenceValue", "payload": true } },
                ],
            }],
        })
    }

    #[test]
    fn test_json_round_trip_with_preferences() {
        let converter = converter(true);
        let bytes = converter.from_json(readable_backup()).unwrap();
        assert_eq!(converter.to_json(&bytes).unwrap(), readable_backup());
    }

    #[test]
    fn test_payloads_stay_encoded_without_conversion() {
        let bytes = converter(true).from_json(readable_backup()).unwrap();
        let raw = converter(false).to_json(&bytes).unwrap();

        assert_eq!(raw["backupPreferences"][0]["value"]["payload"], json!("CCo="));
        assert_eq!(
            raw["backupSourcePreferences"][0]["prefs"][0]["value"]["payload"],
            json!("CAE=")
        );

        // Re-encoding the raw form gives the same bytes
        assert_eq!(converter(false).from_json(raw).unwrap(), bytes);
    }

    #[test]
    fn test_malformed_payload_is_left_as_is() {
        let document = json!({
            "backupManga": [],
            "backupPreferences": [
                { "key": "broken", "value": { "type": "IntPreferenceValue", "payload": "CIA=" } },
                { "key": "custom", "value": { "type": "CustomPreferenceValue", "payload": "AQI=" } },
                { "key": "ok", "value": { "type": "BooleanPreferenceValue", "payload": "CAE=" } },
            ],
        });
        let bytes = converter(false).from_json(document).unwrap();
        let value = converter(true).to_json(&bytes).unwrap();

        let preferences = &value["backupPreferences"];
        assert_eq!(preferences[0]["value"]["payload"], json!("CIA="));
        assert_eq!(preferences[1]["value"]["payload"], json!("AQI="));
        assert_eq!(preferences[2]["value"]["payload"], json!(true));
    }

    #[test]
    fn test_missing_root_message() {
        let pool = pool_from_document(&backup_document());
        let err = BackupConverter::new(&pool, ConverterConfig::new().root_message("Missing"))
            .unwrap_err();
        assert!(matches!(err, Error::MessageNotFound { .. }));
    }

    #[test]
    fn test_invalid_bytes_and_json() {
        let converter = converter(false);
        assert!(matches!(
            converter.to_json(&[0x0A, 0x05]),
            Err(Error::MessageDecode(_))
        ));
        assert!(matches!(
            converter.from_json(json!({ "backupManga": "nope" })),
            Err(Error::Json(_))
        ));
    }

    #[test]
    fn test_gzip_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let compressed = temp_dir.path().join("out/backup.tachibk");
        let plain = temp_dir.path().join("backup.bin");
        let data = b"\x0a\x03abc".to_vec();

        assert!(write_backup(&compressed, &data).unwrap());
        assert!(!write_backup(&plain, &data).unwrap());

        let raw = std::fs::read(&compressed).unwrap();
        assert!(raw.starts_with(&GZIP_MAGIC));
        assert_eq!(read_backup(&compressed).unwrap(), data);
        assert_eq!(read_backup(&plain).unwrap(), data);
    }

    #[test]
    fn test_compressed_names() {
        assert!(is_compressed_name(Path::new("a/b.tachibk")));
        assert!(is_compressed_name(Path::new("b.proto.gz")));
        assert!(!is_compressed_name(Path::new("b.json")));
        assert!(!is_compressed_name(Path::new("b.gz")));
    }
}
