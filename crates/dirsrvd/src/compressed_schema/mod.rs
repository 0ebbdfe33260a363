//! Compressed schema tokens for stored entries.
//!
//! Object class sets and attribute descriptions repeat across nearly every
//! stored entry, so each distinct key is replaced by a short token issued
//! from a per-key-space counter. Tables are mirrored to a single file and
//! every newly issued token is flushed before it becomes visible, so a token
//! handed out once decodes identically after a restart.

mod codec;
mod store;

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use camino::Utf8PathBuf;
use strum::Display;
use thiserror::Error;
use tracing::{debug, info};

use dirsrv_config::InstancePaths;
use dirsrv_types::{Attribute, AttributeDescription};

pub use codec::{ByteReader, minimal_big_endian, write_length, write_length_prefixed};

use codec::{token_bytes, token_value};
use store::{AttributeRecord, ObjectClassRecord, SchemaFile, SchemaImage};

pub(crate) const SCHEMA_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::schema");

/// Identifies one of the two independent token spaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "kebab-case")]
pub enum KeySpace {
    /// Object class sets.
    ObjectClass,
    /// Attribute type plus option set.
    AttributeDescription,
}

/// Errors raised while encoding, decoding, or persisting tokens.
#[derive(Debug, Error)]
pub enum CompressedSchemaError {
    /// Decoded a token that no table entry was ever issued for.
    #[error("unknown {space} token {}", hex(.token))]
    UnknownToken {
        /// Key space the token was read for.
        space: KeySpace,
        /// Raw token bytes.
        token: Vec<u8>,
    },
    /// Input ended before a complete field was read.
    #[error("truncated input at offset {offset}: needed {needed} more bytes")]
    Truncated {
        /// Offset of the field that could not be read.
        offset: usize,
        /// Bytes required by the field.
        needed: usize,
    },
    /// A length or token field was malformed.
    #[error("invalid length encoding at offset {offset}")]
    InvalidLength {
        /// Offset of the malformed field.
        offset: usize,
    },
    /// A name was not valid UTF-8.
    #[error("invalid UTF-8 string at offset {offset}")]
    InvalidUtf8 {
        /// Offset of the length prefix preceding the string.
        offset: usize,
    },
    /// Every four-byte token in the key space has been issued.
    #[error("{space} token space exhausted")]
    Exhausted {
        /// Key space with no tokens left.
        space: KeySpace,
    },
    /// Flushing the tables to disk failed.
    #[error("failed to persist compressed schema to '{path}': {source}")]
    Persist {
        /// Live file that could not be replaced.
        path: Utf8PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
    /// Reading the tables from disk failed.
    #[error("failed to read compressed schema from '{path}': {source}")]
    Load {
        /// File that could not be read.
        path: Utf8PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
    /// The persisted file could not be parsed.
    #[error("compressed schema file '{path}' is corrupt: {reason}")]
    Corrupt {
        /// File that failed to parse.
        path: Utf8PathBuf,
        /// Parser diagnostic.
        reason: String,
    },
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|byte| format!("{byte:02x}")).collect()
}

#[derive(Debug, Default)]
struct ObjectClassSpace {
    by_key: HashMap<Vec<String>, u32>,
    by_token: HashMap<u32, Vec<String>>,
    next: u32,
}

#[derive(Debug, Default)]
struct AttributeSpace {
    by_key: HashMap<AttributeDescription, u32>,
    by_token: HashMap<u32, AttributeDescription>,
    next: u32,
}

#[derive(Debug)]
struct SchemaStore {
    file: SchemaFile,
    image: SchemaImage,
}

impl SchemaStore {
    /// Applies `update` to the image and flushes it, rolling the image back
    /// when the write fails.
    fn commit(
        &mut self,
        update: impl FnOnce(&mut SchemaImage),
    ) -> Result<(), CompressedSchemaError> {
        let previous = self.image.clone();
        update(&mut self.image);
        if let Err(error) = self.file.save(&self.image) {
            self.image = previous;
            return Err(error);
        }
        Ok(())
    }
}

/// Token dictionary shared by every thread encoding or decoding entries.
///
/// Each key space has its own lock held across the whole
/// check-allocate-persist-publish sequence, so racing encoders of the same
/// novel key observe a single token. Disk writes are serialised through the
/// store lock, which is always taken after a key-space lock.
#[derive(Debug)]
pub struct CompressedSchema {
    object_classes: Mutex<ObjectClassSpace>,
    attributes: Mutex<AttributeSpace>,
    store: Mutex<SchemaStore>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn object_class_key(names: &[String]) -> Vec<String> {
    let mut key: Vec<String> = names.iter().map(|name| name.to_ascii_lowercase()).collect();
    key.sort();
    key.dedup();
    key
}

impl CompressedSchema {
    /// Opens the dictionary stored in the instance config directory.
    ///
    /// # Errors
    ///
    /// Fails when an existing file cannot be read or parsed.
    pub fn open_instance(paths: &InstancePaths) -> Result<Self, CompressedSchemaError> {
        Self::open(paths.compressed_schema_path().to_path_buf())
    }

    /// Opens the dictionary persisted at `path`, starting empty when neither
    /// the file nor its backup exists.
    ///
    /// # Errors
    ///
    /// Fails when an existing file cannot be read or parsed.
    pub fn open(path: impl Into<Utf8PathBuf>) -> Result<Self, CompressedSchemaError> {
        let file = SchemaFile::new(path.into());
        let image = file.load()?;

        let mut object_classes = ObjectClassSpace {
            next: image.object_class_counter.max(1),
            ..ObjectClassSpace::default()
        };
        for record in &image.object_classes {
            object_classes
                .by_key
                .insert(object_class_key(&record.names), record.token);
            object_classes
                .by_token
                .insert(record.token, record.names.clone());
            object_classes.next = object_classes.next.max(record.token.saturating_add(1));
        }

        let mut attributes = AttributeSpace {
            next: image.attribute_counter.max(1),
            ..AttributeSpace::default()
        };
        for record in &image.attributes {
            attributes
                .by_key
                .insert(record.description.clone(), record.token);
            attributes
                .by_token
                .insert(record.token, record.description.clone());
            attributes.next = attributes.next.max(record.token.saturating_add(1));
        }

        info!(
            target: SCHEMA_TARGET,
            path = %file.live(),
            object_classes = object_classes.by_token.len(),
            attributes = attributes.by_token.len(),
            "compressed schema loaded"
        );

        Ok(Self {
            object_classes: Mutex::new(object_classes),
            attributes: Mutex::new(attributes),
            store: Mutex::new(SchemaStore { file, image }),
        })
    }

    /// Number of object class set tokens issued so far.
    #[must_use]
    pub fn object_class_token_count(&self) -> usize {
        lock(&self.object_classes).by_token.len()
    }

    /// Number of attribute description tokens issued so far.
    #[must_use]
    pub fn attribute_token_count(&self) -> usize {
        lock(&self.attributes).by_token.len()
    }

    /// Writes the token for `names`, issuing and persisting a new one when
    /// the set has not been seen before.
    ///
    /// # Errors
    ///
    /// Fails when a new token cannot be issued or persisted.
    pub fn encode_object_classes(
        &self,
        buffer: &mut Vec<u8>,
        names: &[String],
    ) -> Result<(), CompressedSchemaError> {
        let token = self.object_class_token(names)?;
        write_length_prefixed(buffer, &token_bytes(token));
        Ok(())
    }

    /// Reads an object class set token.
    ///
    /// # Errors
    ///
    /// Fails on malformed framing or an unknown token.
    pub fn decode_object_classes(
        &self,
        reader: &mut ByteReader<'_>,
    ) -> Result<Vec<String>, CompressedSchemaError> {
        let raw = reader.read_length_prefixed()?;
        let space = lock(&self.object_classes);
        token_value(raw)
            .and_then(|token| space.by_token.get(&token))
            .cloned()
            .ok_or_else(|| CompressedSchemaError::UnknownToken {
                space: KeySpace::ObjectClass,
                token: raw.to_vec(),
            })
    }

    /// Writes the description token followed by the value count and each
    /// length-prefixed value.
    ///
    /// # Errors
    ///
    /// Fails when a new token cannot be issued or persisted.
    pub fn encode_attribute(
        &self,
        buffer: &mut Vec<u8>,
        attribute: &Attribute,
    ) -> Result<(), CompressedSchemaError> {
        let token = self.attribute_token(attribute.description())?;
        write_length_prefixed(buffer, &token_bytes(token));
        write_length(buffer, attribute.values().len());
        for value in attribute.values() {
            write_length_prefixed(buffer, value);
        }
        Ok(())
    }

    /// Reads an attribute written by [`Self::encode_attribute`].
    ///
    /// # Errors
    ///
    /// Fails on malformed framing or an unknown token.
    pub fn decode_attribute(
        &self,
        reader: &mut ByteReader<'_>,
    ) -> Result<Attribute, CompressedSchemaError> {
        let raw = reader.read_length_prefixed()?;
        let description = {
            let space = lock(&self.attributes);
            token_value(raw)
                .and_then(|token| space.by_token.get(&token))
                .cloned()
                .ok_or_else(|| CompressedSchemaError::UnknownToken {
                    space: KeySpace::AttributeDescription,
                    token: raw.to_vec(),
                })?
        };

        let count = reader.read_length()?;
        if count == 1 && !description.has_options() {
            let value = reader.read_length_prefixed()?.to_vec();
            return Ok(Attribute::new(description, vec![value]));
        }
        let mut values = Vec::with_capacity(count.min(64));
        for _ in 0..count {
            values.push(reader.read_length_prefixed()?.to_vec());
        }
        Ok(Attribute::new(description, values))
    }

    fn object_class_token(&self, names: &[String]) -> Result<u32, CompressedSchemaError> {
        let key = object_class_key(names);
        let mut space = lock(&self.object_classes);
        if let Some(token) = space.by_key.get(&key) {
            return Ok(*token);
        }

        let token = space.next;
        let next = token.checked_add(1).ok_or(CompressedSchemaError::Exhausted {
            space: KeySpace::ObjectClass,
        })?;
        lock(&self.store).commit(|image| {
            image.object_classes.push(ObjectClassRecord {
                token,
                names: names.to_vec(),
            });
            image.object_class_counter = next;
        })?;

        space.by_key.insert(key, token);
        space.by_token.insert(token, names.to_vec());
        space.next = next;
        debug!(
            target: SCHEMA_TARGET,
            token,
            classes = ?names,
            "issued object class set token"
        );
        Ok(token)
    }

    fn attribute_token(
        &self,
        description: &AttributeDescription,
    ) -> Result<u32, CompressedSchemaError> {
        let mut space = lock(&self.attributes);
        if let Some(token) = space.by_key.get(description) {
            return Ok(*token);
        }

        let token = space.next;
        let next = token.checked_add(1).ok_or(CompressedSchemaError::Exhausted {
            space: KeySpace::AttributeDescription,
        })?;
        lock(&self.store).commit(|image| {
            image.attributes.push(AttributeRecord {
                token,
                description: description.clone(),
            });
            image.attribute_counter = next;
        })?;

        space.by_key.insert(description.clone(), token);
        space.by_token.insert(token, description.clone());
        space.next = next;
        debug!(
            target: SCHEMA_TARGET,
            token,
            description = %description,
            "issued attribute description token"
        );
        Ok(token)
    }
}

#[cfg(test)]
mod tests;
