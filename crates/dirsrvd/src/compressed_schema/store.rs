//! On-disk image of the compressed schema tables.
//!
//! File layout, every string and token length-prefixed:
//!
//! ```text
//! "DSCS" version
//! count { token count { name } }          object class sets
//! object-class-counter
//! count { token type count { option } }   attribute descriptions
//! attribute-counter
//! ```
//!
//! Writes go to a temporary sibling; the live file is renamed to `.save`
//! and the temporary file renamed into place, so a readable copy exists at
//! every instant.

use std::fs;
use std::io::{self, Write as IoWrite};

use camino::{Utf8Path, Utf8PathBuf};
use tracing::warn;

use dirsrv_types::AttributeDescription;

use super::codec::{
    ByteReader, token_bytes, token_value, write_length, write_length_prefixed,
};
use super::{CompressedSchemaError, SCHEMA_TARGET};

const MAGIC: &[u8; 4] = b"DSCS";
const FORMAT_VERSION: u8 = 1;

/// Persisted object-class-set record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct ObjectClassRecord {
    pub(super) token: u32,
    pub(super) names: Vec<String>,
}

/// Persisted attribute-description record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct AttributeRecord {
    pub(super) token: u32,
    pub(super) description: AttributeDescription,
}

/// Full table state mirrored to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct SchemaImage {
    pub(super) object_classes: Vec<ObjectClassRecord>,
    pub(super) object_class_counter: u32,
    pub(super) attributes: Vec<AttributeRecord>,
    pub(super) attribute_counter: u32,
}

impl Default for SchemaImage {
    fn default() -> Self {
        Self {
            object_classes: Vec::new(),
            object_class_counter: 1,
            attributes: Vec::new(),
            attribute_counter: 1,
        }
    }
}

impl SchemaImage {
    pub(super) fn encode(&self) -> Vec<u8> {
        let mut buffer = Vec::new();
        buffer.extend_from_slice(MAGIC);
        buffer.push(FORMAT_VERSION);

        write_length(&mut buffer, self.object_classes.len());
        for record in &self.object_classes {
            write_length_prefixed(&mut buffer, &token_bytes(record.token));
            write_length(&mut buffer, record.names.len());
            for name in &record.names {
                write_length_prefixed(&mut buffer, name.as_bytes());
            }
        }
        write_length(&mut buffer, counter_len(self.object_class_counter));

        write_length(&mut buffer, self.attributes.len());
        for record in &self.attributes {
            write_length_prefixed(&mut buffer, &token_bytes(record.token));
            write_length_prefixed(&mut buffer, record.description.attr_type().as_bytes());
            let options = record.description.options();
            write_length(&mut buffer, options.len());
            for option in options {
                write_length_prefixed(&mut buffer, option.as_bytes());
            }
        }
        write_length(&mut buffer, counter_len(self.attribute_counter));
        buffer
    }

    pub(super) fn decode(bytes: &[u8]) -> Result<Self, String> {
        let mut reader = ByteReader::new(bytes);
        let magic = reader.read_slice(MAGIC.len()).map_err(|e| e.to_string())?;
        if magic != MAGIC {
            return Err("missing DSCS header".to_owned());
        }
        let version = reader.read_byte().map_err(|e| e.to_string())?;
        if version != FORMAT_VERSION {
            return Err(format!("unsupported format version {version}"));
        }
        Self::decode_body(&mut reader).map_err(|e| e.to_string())
    }

    fn decode_body(reader: &mut ByteReader<'_>) -> Result<Self, CompressedSchemaError> {
        let object_class_count = reader.read_length()?;
        let mut object_classes = Vec::with_capacity(object_class_count.min(1024));
        for _ in 0..object_class_count {
            let token = read_token(reader)?;
            let name_count = reader.read_length()?;
            let mut names = Vec::with_capacity(name_count.min(64));
            for _ in 0..name_count {
                names.push(reader.read_string()?.to_owned());
            }
            object_classes.push(ObjectClassRecord { token, names });
        }
        let object_class_counter = read_counter(reader)?;

        let attribute_count = reader.read_length()?;
        let mut attributes = Vec::with_capacity(attribute_count.min(1024));
        for _ in 0..attribute_count {
            let token = read_token(reader)?;
            let attr_type = reader.read_string()?.to_owned();
            let option_count = reader.read_length()?;
            let mut options = Vec::with_capacity(option_count.min(64));
            for _ in 0..option_count {
                options.push(reader.read_string()?.to_owned());
            }
            attributes.push(AttributeRecord {
                token,
                description: AttributeDescription::new(attr_type, options),
            });
        }
        let attribute_counter = read_counter(reader)?;

        Ok(Self {
            object_classes,
            object_class_counter,
            attributes,
            attribute_counter,
        })
    }
}

fn counter_len(counter: u32) -> usize {
    usize::try_from(counter).unwrap_or(usize::MAX)
}

fn read_token(reader: &mut ByteReader<'_>) -> Result<u32, CompressedSchemaError> {
    let offset = reader.offset();
    let bytes = reader.read_length_prefixed()?;
    token_value(bytes).ok_or(CompressedSchemaError::InvalidLength { offset })
}

fn read_counter(reader: &mut ByteReader<'_>) -> Result<u32, CompressedSchemaError> {
    let offset = reader.offset();
    let value = reader.read_length()?;
    u32::try_from(value).map_err(|_| CompressedSchemaError::InvalidLength { offset })
}

/// Live file plus its `.save` backup.
#[derive(Debug, Clone)]
pub(super) struct SchemaFile {
    live: Utf8PathBuf,
    backup: Utf8PathBuf,
}

impl SchemaFile {
    pub(super) fn new(live: Utf8PathBuf) -> Self {
        let mut backup = live.clone().into_string();
        backup.push_str(".save");
        Self {
            backup: Utf8PathBuf::from(backup),
            live,
        }
    }

    pub(super) fn live(&self) -> &Utf8Path {
        &self.live
    }

    /// Reads the persisted image.
    ///
    /// A missing live file falls back to the `.save` backup left by an
    /// interrupted write; when neither exists the tables start empty.
    pub(super) fn load(&self) -> Result<SchemaImage, CompressedSchemaError> {
        match read_image(&self.live)? {
            Some(image) => Ok(image),
            None => match read_image(&self.backup)? {
                Some(image) => {
                    warn!(
                        target: SCHEMA_TARGET,
                        live = %self.live,
                        backup = %self.backup,
                        "compressed schema recovered from backup"
                    );
                    Ok(image)
                }
                None => Ok(SchemaImage::default()),
            },
        }
    }

    /// Atomically replaces the live file with `image`.
    pub(super) fn save(&self, image: &SchemaImage) -> Result<(), CompressedSchemaError> {
        let persist_error = |source: io::Error| CompressedSchemaError::Persist {
            path: self.live.clone(),
            source,
        };
        let parent = self
            .live
            .parent()
            .filter(|parent| !parent.as_str().is_empty())
            .unwrap_or_else(|| Utf8Path::new("."));
        fs::create_dir_all(parent).map_err(persist_error)?;

        let mut temp_file = tempfile::NamedTempFile::new_in(parent).map_err(persist_error)?;
        temp_file.write_all(&image.encode()).map_err(persist_error)?;
        temp_file.as_file().sync_all().map_err(persist_error)?;

        if self.live.exists() {
            fs::rename(&self.live, &self.backup).map_err(persist_error)?;
        }
        temp_file
            .persist(&self.live)
            .map_err(|error| persist_error(error.error))?;
        Ok(())
    }
}

fn read_image(path: &Utf8Path) -> Result<Option<SchemaImage>, CompressedSchemaError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(CompressedSchemaError::Load {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    SchemaImage::decode(&bytes)
        .map(Some)
        .map_err(|reason| CompressedSchemaError::Corrupt {
            path: path.to_path_buf(),
            reason,
        })
}
