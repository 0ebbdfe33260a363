//! Distinguished names.
//!
//! A [`Dn`] is stored leaf first: `cn=x,ou=people,dc=example` holds the RDNs
//! `cn=x`, `ou=people`, `dc=example` in that order. Equality and hashing use
//! the normalised form of every attribute value assertion so that
//! `CN=Bob , DC=Example` and `cn=bob,dc=example` name the same entry.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use thiserror::Error;

/// Errors raised while decoding the string form of a DN.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DnError {
    /// A comma-separated component was empty.
    #[error("DN '{dn}' contains an empty RDN component")]
    EmptyComponent {
        /// The DN being decoded.
        dn: String,
    },
    /// An attribute value assertion lacked the `=` separator.
    #[error("RDN component '{component}' is missing the '=' separator")]
    MissingEquals {
        /// The offending component.
        component: String,
    },
    /// The attribute type was empty or contained illegal characters.
    #[error("'{name}' is not a valid attribute type name")]
    InvalidAttributeType {
        /// The offending attribute type.
        name: String,
    },
    /// A backslash escape was malformed or produced invalid UTF-8.
    #[error("invalid escape sequence in '{value}'")]
    InvalidEscape {
        /// The value containing the bad escape.
        value: String,
    },
}

/// A single `type=value` assertion inside an RDN.
#[derive(Debug, Clone)]
pub struct Ava {
    attr_type: String,
    value: String,
    normalized_type: String,
    normalized_value: String,
}

impl Ava {
    /// Builds an assertion from an attribute type and an unescaped value.
    ///
    /// # Errors
    ///
    /// Returns [`DnError::InvalidAttributeType`] when the type name is empty
    /// or contains characters outside `[A-Za-z0-9.-]`.
    pub fn new(attr_type: impl Into<String>, value: impl Into<String>) -> Result<Self, DnError> {
        let attr_type = attr_type.into();
        validate_attribute_type(&attr_type)?;
        let value = value.into();
        Ok(Self {
            normalized_type: attr_type.to_ascii_lowercase(),
            normalized_value: normalize_value(&value),
            attr_type,
            value,
        })
    }

    /// Attribute type as supplied by the client.
    #[must_use]
    pub fn attr_type(&self) -> &str {
        &self.attr_type
    }

    /// Unescaped attribute value as supplied by the client.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Lower-cased attribute type.
    #[must_use]
    pub fn normalized_type(&self) -> &str {
        &self.normalized_type
    }

    /// Case-folded, whitespace-collapsed attribute value.
    #[must_use]
    pub fn normalized_value(&self) -> &str {
        &self.normalized_value
    }

    fn parse(component: &str) -> Result<Self, DnError> {
        let Some((raw_type, raw_value)) = component.split_once('=') else {
            return Err(DnError::MissingEquals {
                component: component.trim().to_owned(),
            });
        };
        let value = unescape(trim_unescaped(raw_value))?;
        Self::new(raw_type.trim(), value)
    }

    fn sort_key(&self) -> (&str, &str) {
        (&self.normalized_type, &self.normalized_value)
    }
}

impl PartialEq for Ava {
    fn eq(&self, other: &Self) -> bool {
        self.sort_key() == other.sort_key()
    }
}

impl Eq for Ava {}

impl Hash for Ava {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.normalized_type.hash(state);
        self.normalized_value.hash(state);
    }
}

impl fmt::Display for Ava {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}={}", self.attr_type, escape(&self.value))
    }
}

/// A relative distinguished name: one or more assertions joined by `+`.
///
/// Assertions are kept sorted by their normalised form so that multi-valued
/// RDNs compare equal regardless of the order the client used.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Rdn {
    avas: Vec<Ava>,
}

impl Rdn {
    /// Builds a single-valued RDN.
    ///
    /// # Errors
    ///
    /// Propagates [`DnError::InvalidAttributeType`] from [`Ava::new`].
    pub fn new(attr_type: impl Into<String>, value: impl Into<String>) -> Result<Self, DnError> {
        Ok(Self {
            avas: vec![Ava::new(attr_type, value)?],
        })
    }

    /// Parses the string form of an RDN such as `cn=Bob+uid=bob`.
    ///
    /// # Errors
    ///
    /// Returns a [`DnError`] describing the first malformed assertion.
    pub fn parse(input: &str) -> Result<Self, DnError> {
        let mut avas = split_unescaped(input, '+')
            .into_iter()
            .map(Ava::parse)
            .collect::<Result<Vec<_>, _>>()?;
        avas.sort_by(|left, right| left.sort_key().cmp(&right.sort_key()));
        Ok(Self { avas })
    }

    /// Assertions making up this RDN.
    #[must_use]
    pub fn avas(&self) -> &[Ava] {
        &self.avas
    }
}

impl fmt::Display for Rdn {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, ava) in self.avas.iter().enumerate() {
            if index > 0 {
                formatter.write_str("+")?;
            }
            write!(formatter, "{ava}")?;
        }
        Ok(())
    }
}

/// A distinguished name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Dn {
    rdns: Vec<Rdn>,
}

impl Dn {
    /// The zero-length DN naming the root DSE.
    #[must_use]
    pub const fn root() -> Self {
        Self { rdns: Vec::new() }
    }

    /// Decodes the string form of a DN.
    ///
    /// # Errors
    ///
    /// Returns a [`DnError`] when a component is empty, lacks an `=`, names an
    /// invalid attribute type, or carries a malformed escape.
    pub fn parse(input: &str) -> Result<Self, DnError> {
        if input.trim().is_empty() {
            return Ok(Self::root());
        }
        let mut rdns = Vec::new();
        for component in split_unescaped(input, ',') {
            if component.trim().is_empty() {
                return Err(DnError::EmptyComponent {
                    dn: input.to_owned(),
                });
            }
            rdns.push(Rdn::parse(component)?);
        }
        Ok(Self { rdns })
    }

    /// Returns `true` for the root DSE.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.rdns.is_empty()
    }

    /// Number of RDNs in this DN.
    #[must_use]
    pub fn size(&self) -> usize {
        self.rdns.len()
    }

    /// The leaf RDN, absent for the root DSE.
    #[must_use]
    pub fn rdn(&self) -> Option<&Rdn> {
        self.rdns.first()
    }

    /// All RDNs, leaf first.
    #[must_use]
    pub fn rdns(&self) -> &[Rdn] {
        &self.rdns
    }

    /// The immediate parent, absent for the root DSE.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }
        Some(Self {
            rdns: self.rdns.iter().skip(1).cloned().collect(),
        })
    }

    /// Builds the DN of an immediate child of this DN.
    #[must_use]
    pub fn child(&self, rdn: Rdn) -> Self {
        let mut rdns = Vec::with_capacity(self.rdns.len() + 1);
        rdns.push(rdn);
        rdns.extend(self.rdns.iter().cloned());
        Self { rdns }
    }

    /// Returns `true` when `other` is this DN or lies beneath it.
    #[must_use]
    pub fn is_ancestor_of(&self, other: &Self) -> bool {
        let Some(offset) = other.size().checked_sub(self.size()) else {
            return false;
        };
        other.rdns.iter().skip(offset).eq(self.rdns.iter())
    }

    /// Returns `true` when `other` lies strictly beneath this DN.
    #[must_use]
    pub fn is_strict_ancestor_of(&self, other: &Self) -> bool {
        other.size() > self.size() && self.is_ancestor_of(other)
    }

    /// Returns `true` when this DN is `other` or lies beneath it.
    #[must_use]
    pub fn is_descendant_of(&self, other: &Self) -> bool {
        other.is_ancestor_of(self)
    }

    /// Returns `true` when `other` is the immediate parent of this DN.
    #[must_use]
    pub fn is_child_of(&self, other: &Self) -> bool {
        self.size() == other.size() + 1 && other.is_ancestor_of(self)
    }

    /// Moves this DN from beneath `old_base` to beneath `new_base`.
    ///
    /// Returns `None` when this DN does not lie under `old_base`.
    #[must_use]
    pub fn rename(&self, old_base: &Self, new_base: &Self) -> Option<Self> {
        if !old_base.is_ancestor_of(self) {
            return None;
        }
        let keep = self.size() - old_base.size();
        let mut rdns: Vec<Rdn> = self.rdns.iter().take(keep).cloned().collect();
        rdns.extend(new_base.rdns.iter().cloned());
        Some(Self { rdns })
    }
}

impl FromStr for Dn {
    type Err = DnError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        Self::parse(input)
    }
}

impl fmt::Display for Dn {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, rdn) in self.rdns.iter().enumerate() {
            if index > 0 {
                formatter.write_str(",")?;
            }
            write!(formatter, "{rdn}")?;
        }
        Ok(())
    }
}

fn validate_attribute_type(name: &str) -> Result<(), DnError> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '.');
    if valid {
        Ok(())
    } else {
        Err(DnError::InvalidAttributeType {
            name: name.to_owned(),
        })
    }
}

fn normalize_value(value: &str) -> String {
    value
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Splits on `separator` wherever it is not preceded by a backslash escape.
fn split_unescaped(input: &str, separator: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut escaped = false;
    for (index, ch) in input.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        if ch == '\\' {
            escaped = true;
        } else if ch == separator {
            parts.push(input.get(start..index).unwrap_or_default());
            start = index + ch.len_utf8();
        }
    }
    parts.push(input.get(start..).unwrap_or_default());
    parts
}

/// Trims surrounding whitespace, keeping a trailing space that was escaped.
fn trim_unescaped(raw: &str) -> &str {
    let leading = raw.trim_start();
    let trimmed = leading.trim_end();
    if trimmed.ends_with('\\') && trimmed.len() < leading.len() {
        leading.get(..=trimmed.len()).unwrap_or(trimmed)
    } else {
        trimmed
    }
}

fn unescape(raw: &str) -> Result<String, DnError> {
    let invalid = || DnError::InvalidEscape {
        value: raw.to_owned(),
    };
    let mut bytes = Vec::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            let mut buffer = [0_u8; 4];
            bytes.extend_from_slice(ch.encode_utf8(&mut buffer).as_bytes());
            continue;
        }
        let first = chars.next().ok_or_else(invalid)?;
        match (first.to_digit(16), chars.peek().and_then(|next| next.to_digit(16))) {
            (Some(high), Some(low)) => {
                chars.next();
                let byte = u8::try_from(high * 16 + low).map_err(|_| invalid())?;
                bytes.push(byte);
            }
            _ => {
                let mut buffer = [0_u8; 4];
                bytes.extend_from_slice(first.encode_utf8(&mut buffer).as_bytes());
            }
        }
    }
    String::from_utf8(bytes).map_err(|_| invalid())
}

fn escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    let last = value.chars().count().saturating_sub(1);
    for (index, ch) in value.chars().enumerate() {
        let needs_escape = matches!(ch, ',' | '+' | '"' | '\\' | '<' | '>' | ';' | '=')
            || (index == 0 && (ch == '#' || ch == ' '))
            || (index == last && ch == ' ');
        if needs_escape {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}
