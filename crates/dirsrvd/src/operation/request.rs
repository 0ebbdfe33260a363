//! Raw request payloads as handed over by the protocol layer.

use std::sync::Arc;

use strum::Display;

use dirsrv_types::{Attribute, AttributeDescription, Dn, Entry, SearchScope};

use super::connection::SearchResultSink;

/// Kind of client operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum OperationType {
    /// Add a new entry.
    Add,
    /// Remove an entry.
    Delete,
    /// Change attribute values of an entry.
    Modify,
    /// Rename or move an entry.
    #[strum(serialize = "ModifyDN")]
    ModifyDn,
    /// Search for entries.
    Search,
    /// Assert an attribute value.
    Compare,
    /// Authenticate.
    Bind,
    /// Protocol extension identified by OID.
    Extended,
    /// Abandon another in-flight operation.
    Abandon,
}

impl OperationType {
    /// Returns `true` for operation types gated by the access-control handler.
    #[must_use]
    pub const fn requires_access_check(self) -> bool {
        matches!(
            self,
            Self::Add | Self::Delete | Self::Modify | Self::ModifyDn | Self::Search | Self::Compare
        )
    }
}

/// Kind of change carried by a modification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum ModificationKind {
    /// Add values.
    Add,
    /// Remove values, or the whole attribute when none are listed.
    Delete,
    /// Replace all values.
    Replace,
    /// Increment an integer value.
    Increment,
}

/// Modification as received, with the attribute description still unparsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawModification {
    /// Change kind.
    pub kind: ModificationKind,
    /// Attribute description string, e.g. `cn;lang-fr`.
    pub attribute: String,
    /// Values supplied with the change.
    pub values: Vec<Vec<u8>>,
}

impl RawModification {
    /// Builds a modification with string values.
    #[must_use]
    pub fn new<I, S>(kind: ModificationKind, attribute: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            kind,
            attribute: attribute.into(),
            values: values
                .into_iter()
                .map(|value| value.as_ref().as_bytes().to_vec())
                .collect(),
        }
    }
}

/// Decoded modification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Modification {
    /// Change kind.
    pub kind: ModificationKind,
    /// Target attribute with the supplied values.
    pub attribute: Attribute,
}

impl Modification {
    pub(crate) fn decode(raw: &RawModification) -> Result<Self, String> {
        let description = AttributeDescription::parse(raw.attribute.trim());
        if description.attr_type().is_empty() {
            return Err(format!(
                "the modification attribute description '{}' is empty",
                raw.attribute
            ));
        }
        if raw.kind == ModificationKind::Increment && raw.values.len() != 1 {
            return Err(format!(
                "an increment modification of {} must supply exactly one value",
                description
            ));
        }
        Ok(Self {
            kind: raw.kind,
            attribute: Attribute::new(description, raw.values.clone()),
        })
    }
}

/// Add request payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddRequest {
    /// DN of the entry to create.
    pub raw_dn: String,
    /// Object classes of the new entry.
    pub object_classes: Vec<String>,
    /// User attributes of the new entry.
    pub attributes: Vec<Attribute>,
}

impl AddRequest {
    /// Assembles the entry to be added under a decoded DN.
    #[must_use]
    pub fn to_entry(&self, dn: Dn) -> Entry {
        let mut entry = Entry::new(dn);
        for class in &self.object_classes {
            entry.add_object_class(class.clone());
        }
        for attribute in &self.attributes {
            entry.add_attribute(attribute.clone());
        }
        entry
    }
}

/// Modify-DN request payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModifyDnRequest {
    /// DN of the entry to rename.
    pub raw_dn: String,
    /// New leftmost RDN.
    pub raw_new_rdn: String,
    /// Whether the old RDN values are removed from the entry.
    pub delete_old_rdn: bool,
    /// Optional new parent.
    pub raw_new_superior: Option<String>,
}

/// Search request payload.
#[derive(Clone)]
pub struct SearchRequest {
    /// Search base DN.
    pub raw_base: String,
    /// Requested scope.
    pub scope: SearchScope,
    /// Filter in string form; empty means `(objectClass=*)`.
    pub raw_filter: String,
    /// Requested attribute types; empty or `*` returns all user attributes.
    pub attributes: Vec<String>,
    /// Maximum number of entries returned; zero means unlimited.
    pub size_limit: usize,
    /// Destination for returned entries.
    pub sink: Arc<dyn SearchResultSink>,
}

impl std::fmt::Debug for SearchRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchRequest")
            .field("raw_base", &self.raw_base)
            .field("scope", &self.scope)
            .field("raw_filter", &self.raw_filter)
            .field("attributes", &self.attributes)
            .field("size_limit", &self.size_limit)
            .finish_non_exhaustive()
    }
}

/// Request payload for every supported operation type.
#[derive(Debug, Clone)]
pub enum Request {
    /// Add an entry.
    Add(AddRequest),
    /// Delete an entry.
    Delete {
        /// DN of the entry to delete.
        raw_dn: String,
    },
    /// Modify an entry.
    Modify {
        /// DN of the entry to modify.
        raw_dn: String,
        /// Changes to apply, in order.
        changes: Vec<RawModification>,
    },
    /// Rename an entry.
    ModifyDn(ModifyDnRequest),
    /// Search.
    Search(SearchRequest),
    /// Compare an attribute value.
    Compare {
        /// DN of the target entry.
        raw_dn: String,
        /// Attribute description to compare.
        attribute: String,
        /// Asserted value.
        assertion_value: Vec<u8>,
    },
    /// Simple bind.
    Bind {
        /// Bind DN; empty for anonymous binds.
        raw_dn: String,
    },
    /// Extended operation.
    Extended {
        /// Request OID.
        oid: String,
        /// Optional request value.
        value: Option<Vec<u8>>,
    },
    /// Abandon another operation on the same connection.
    Abandon {
        /// Message ID of the operation to abandon.
        message_id: i32,
    },
}

impl Request {
    /// Operation type implied by the payload.
    #[must_use]
    pub const fn operation_type(&self) -> OperationType {
        match self {
            Self::Add(_) => OperationType::Add,
            Self::Delete { .. } => OperationType::Delete,
            Self::Modify { .. } => OperationType::Modify,
            Self::ModifyDn(_) => OperationType::ModifyDn,
            Self::Search(_) => OperationType::Search,
            Self::Compare { .. } => OperationType::Compare,
            Self::Bind { .. } => OperationType::Bind,
            Self::Extended { .. } => OperationType::Extended,
            Self::Abandon { .. } => OperationType::Abandon,
        }
    }

    /// Raw target DN (the search base for searches), when the type has one.
    #[must_use]
    pub fn raw_dn(&self) -> Option<&str> {
        match self {
            Self::Add(add) => Some(&add.raw_dn),
            Self::Delete { raw_dn }
            | Self::Modify { raw_dn, .. }
            | Self::Compare { raw_dn, .. }
            | Self::Bind { raw_dn } => Some(raw_dn),
            Self::ModifyDn(request) => Some(&request.raw_dn),
            Self::Search(search) => Some(&search.raw_base),
            Self::Extended { .. } | Self::Abandon { .. } => None,
        }
    }
}
