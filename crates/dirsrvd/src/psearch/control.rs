//! Wire forms of the persistent search request control and the
//! entry-change-notification response control.
//!
//! ```text
//! PersistentSearch ::= SEQUENCE {
//!     changeTypes INTEGER,
//!     changesOnly BOOLEAN,
//!     returnECs   BOOLEAN }
//!
//! EntryChangeNotification ::= SEQUENCE {
//!     changeType   ENUMERATED,
//!     previousDN   LDAPDN OPTIONAL,
//!     changeNumber INTEGER OPTIONAL }
//! ```

use std::fmt;

use strum::{Display, EnumIter, IntoEnumIterator};

use dirsrv_types::{Control, Dn};

use crate::compressed_schema::{ByteReader, minimal_big_endian, write_length_prefixed};

use super::PersistentSearchError;

/// OID of the persistent search request control.
pub const PERSISTENT_SEARCH_OID: &str = "2.16.840.1.113730.3.4.3";

/// OID of the entry-change-notification response control.
pub const ENTRY_CHANGE_NOTIFICATION_OID: &str = "2.16.840.1.113730.3.4.7";

const TAG_BOOLEAN: u8 = 0x01;
const TAG_INTEGER: u8 = 0x02;
const TAG_OCTET_STRING: u8 = 0x04;
const TAG_ENUMERATED: u8 = 0x0a;
const TAG_SEQUENCE: u8 = 0x30;

/// Kind of change a persistent search can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum ChangeType {
    /// An entry was added.
    Add,
    /// An entry was deleted.
    Delete,
    /// An entry was modified.
    Modify,
    /// An entry was renamed or moved.
    ModifyDn,
}

impl ChangeType {
    /// Bit used for this change type in the control's change-type mask.
    #[must_use]
    pub const fn bit(self) -> u8 {
        match self {
            Self::Add => 1,
            Self::Delete => 2,
            Self::Modify => 4,
            Self::ModifyDn => 8,
        }
    }

    fn from_bit(value: i64) -> Option<Self> {
        Self::iter().find(|change| i64::from(change.bit()) == value)
    }
}

/// Set of change types, stored as the wire bitmask.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ChangeTypes(u8);

impl ChangeTypes {
    const ALL_BITS: u8 = 0x0f;

    /// Every change type.
    #[must_use]
    pub const fn all() -> Self {
        Self(Self::ALL_BITS)
    }

    /// Parses a wire bitmask.
    ///
    /// # Errors
    ///
    /// Rejects an empty mask and bits outside the four known change types.
    pub fn from_bits(bits: i64) -> Result<Self, PersistentSearchError> {
        match u8::try_from(bits) {
            Ok(mask) if mask != 0 && mask & !Self::ALL_BITS == 0 => Ok(Self(mask)),
            _ => Err(PersistentSearchError::InvalidControl {
                reason: format!("change type mask {bits} is outside 1..=15"),
            }),
        }
    }

    /// Wire bitmask.
    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Returns `true` when `change` is in the set.
    #[must_use]
    pub const fn contains(self, change: ChangeType) -> bool {
        self.0 & change.bit() != 0
    }

    /// Adds `change` to the set.
    #[must_use]
    pub const fn with(self, change: ChangeType) -> Self {
        Self(self.0 | change.bit())
    }
}

impl From<ChangeType> for ChangeTypes {
    fn from(change: ChangeType) -> Self {
        Self(change.bit())
    }
}

impl FromIterator<ChangeType> for ChangeTypes {
    fn from_iter<I: IntoIterator<Item = ChangeType>>(iter: I) -> Self {
        iter.into_iter().fold(Self::default(), Self::with)
    }
}

impl fmt::Debug for ChangeTypes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set()
            .entries(ChangeType::iter().filter(|change| self.contains(*change)))
            .finish()
    }
}

/// Decoded persistent search request control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PersistentSearchControl {
    change_types: ChangeTypes,
    changes_only: bool,
    return_ecs: bool,
}

impl PersistentSearchControl {
    /// Builds a control value.
    #[must_use]
    pub const fn new(change_types: ChangeTypes, changes_only: bool, return_ecs: bool) -> Self {
        Self {
            change_types,
            changes_only,
            return_ecs,
        }
    }

    /// Change types the search subscribes to.
    #[must_use]
    pub const fn change_types(&self) -> ChangeTypes {
        self.change_types
    }

    /// When `true` the initial search is skipped and only changes are sent.
    #[must_use]
    pub const fn changes_only(&self) -> bool {
        self.changes_only
    }

    /// When `true` each notification carries an entry-change-notification
    /// control.
    #[must_use]
    pub const fn return_ecs(&self) -> bool {
        self.return_ecs
    }

    /// Decodes the control value.
    ///
    /// # Errors
    ///
    /// Returns [`PersistentSearchError::InvalidControl`] for malformed BER or
    /// an invalid change-type mask.
    pub fn decode(value: &[u8]) -> Result<Self, PersistentSearchError> {
        let mut outer = ByteReader::new(value);
        let mut sequence = ByteReader::new(read_element(&mut outer, TAG_SEQUENCE)?);
        let change_types = ChangeTypes::from_bits(read_integer(&mut sequence, TAG_INTEGER)?)?;
        let changes_only = read_boolean(&mut sequence)?;
        let return_ecs = read_boolean(&mut sequence)?;
        Ok(Self::new(change_types, changes_only, return_ecs))
    }

    /// Encodes the control value.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut body = Vec::new();
        write_integer(&mut body, TAG_INTEGER, u64::from(self.change_types.bits()));
        write_boolean(&mut body, self.changes_only);
        write_boolean(&mut body, self.return_ecs);
        wrap(TAG_SEQUENCE, &body)
    }

    /// Wraps the value in a request control.
    #[must_use]
    pub fn to_control(&self, critical: bool) -> Control {
        Control::new(PERSISTENT_SEARCH_OID, critical, Some(self.encode()))
    }
}

/// Entry-change-notification control attached to persistent search
/// notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryChangeNotification {
    change_type: ChangeType,
    previous_dn: Option<Dn>,
}

impl EntryChangeNotification {
    /// Builds a notification; `previous_dn` is only meaningful for
    /// [`ChangeType::ModifyDn`].
    #[must_use]
    pub const fn new(change_type: ChangeType, previous_dn: Option<Dn>) -> Self {
        Self {
            change_type,
            previous_dn,
        }
    }

    /// Kind of change reported.
    #[must_use]
    pub const fn change_type(&self) -> ChangeType {
        self.change_type
    }

    /// Former DN of a renamed entry.
    #[must_use]
    pub const fn previous_dn(&self) -> Option<&Dn> {
        self.previous_dn.as_ref()
    }

    /// Encodes the notification as a non-critical response control.
    #[must_use]
    pub fn to_control(&self) -> Control {
        let mut body = Vec::new();
        write_integer(&mut body, TAG_ENUMERATED, u64::from(self.change_type.bit()));
        if let Some(previous) = &self.previous_dn {
            body.push(TAG_OCTET_STRING);
            write_length_prefixed(&mut body, previous.to_string().as_bytes());
        }
        Control::new(
            ENTRY_CHANGE_NOTIFICATION_OID,
            false,
            Some(wrap(TAG_SEQUENCE, &body)),
        )
    }

    /// Decodes a notification control value.
    ///
    /// # Errors
    ///
    /// Returns [`PersistentSearchError::InvalidControl`] for malformed BER,
    /// an unknown change type, or an unparseable previous DN.
    pub fn decode(value: &[u8]) -> Result<Self, PersistentSearchError> {
        let mut outer = ByteReader::new(value);
        let mut sequence = ByteReader::new(read_element(&mut outer, TAG_SEQUENCE)?);
        let raw_type = read_integer(&mut sequence, TAG_ENUMERATED)?;
        let change_type = ChangeType::from_bit(raw_type).ok_or_else(|| {
            PersistentSearchError::InvalidControl {
                reason: format!("unknown change type {raw_type}"),
            }
        })?;
        let mut previous_dn = None;
        if !sequence.is_empty() {
            let raw = read_element(&mut sequence, TAG_OCTET_STRING)?;
            let text = std::str::from_utf8(raw).map_err(|error| invalid(&error))?;
            previous_dn = Some(Dn::parse(text).map_err(|error| invalid(&error))?);
        }
        Ok(Self::new(change_type, previous_dn))
    }
}

fn invalid(error: &dyn fmt::Display) -> PersistentSearchError {
    PersistentSearchError::InvalidControl {
        reason: error.to_string(),
    }
}

fn read_element<'a>(
    reader: &mut ByteReader<'a>,
    expected: u8,
) -> Result<&'a [u8], PersistentSearchError> {
    let tag = reader.read_byte().map_err(|error| invalid(&error))?;
    if tag != expected {
        return Err(PersistentSearchError::InvalidControl {
            reason: format!("expected tag {expected:#04x}, found {tag:#04x}"),
        });
    }
    reader.read_length_prefixed().map_err(|error| invalid(&error))
}

fn read_integer(reader: &mut ByteReader<'_>, tag: u8) -> Result<i64, PersistentSearchError> {
    let bytes = read_element(reader, tag)?;
    if bytes.is_empty() || bytes.len() > size_of::<i64>() {
        return Err(PersistentSearchError::InvalidControl {
            reason: format!("integer of {} bytes is out of range", bytes.len()),
        });
    }
    let negative = bytes.first().is_some_and(|byte| byte & 0x80 != 0);
    let seed = if negative { -1i64 } else { 0 };
    Ok(bytes
        .iter()
        .fold(seed, |acc, byte| (acc << 8) | i64::from(*byte)))
}

fn read_boolean(reader: &mut ByteReader<'_>) -> Result<bool, PersistentSearchError> {
    match read_element(reader, TAG_BOOLEAN)? {
        [byte] => Ok(*byte != 0),
        other => Err(PersistentSearchError::InvalidControl {
            reason: format!("boolean of {} bytes", other.len()),
        }),
    }
}

fn write_integer(buffer: &mut Vec<u8>, tag: u8, value: u64) {
    let mut bytes = minimal_big_endian(value);
    if bytes.first().is_some_and(|byte| byte & 0x80 != 0) {
        bytes.insert(0, 0);
    }
    buffer.push(tag);
    write_length_prefixed(buffer, &bytes);
}

fn write_boolean(buffer: &mut Vec<u8>, value: bool) {
    buffer.extend_from_slice(&[TAG_BOOLEAN, 1, if value { 0xff } else { 0x00 }]);
}

fn wrap(tag: u8, body: &[u8]) -> Vec<u8> {
    let mut element = vec![tag];
    write_length_prefixed(&mut element, body);
    element
}
