use crate::attribute::{Attribute, AttributeDescription};
use crate::dn::Dn;

/// A directory entry: a DN, its object classes, and user attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    dn: Dn,
    object_classes: Vec<String>,
    attributes: Vec<Attribute>,
}

impl Entry {
    /// Builds an entry with no object classes or attributes.
    #[must_use]
    pub fn new(dn: Dn) -> Self {
        Self {
            dn,
            object_classes: Vec::new(),
            attributes: Vec::new(),
        }
    }

    /// Adds an object class, ignoring case-insensitive duplicates.
    #[must_use]
    pub fn with_object_class(mut self, name: impl Into<String>) -> Self {
        self.add_object_class(name);
        self
    }

    /// Adds string values for an option-less attribute.
    #[must_use]
    pub fn with_attribute<I, S>(mut self, attr_type: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.add_attribute(Attribute::from_strings(attr_type, values));
        self
    }

    /// Adds an object class, ignoring case-insensitive duplicates.
    pub fn add_object_class(&mut self, name: impl Into<String>) {
        let name = name.into();
        if !self
            .object_classes
            .iter()
            .any(|existing| existing.eq_ignore_ascii_case(&name))
        {
            self.object_classes.push(name);
        }
    }

    /// Merges an attribute into the entry, appending values when an attribute
    /// with the same description already exists.
    pub fn add_attribute(&mut self, attribute: Attribute) {
        match self
            .attributes
            .iter_mut()
            .find(|existing| existing.description() == attribute.description())
        {
            Some(existing) => {
                for value in attribute.values() {
                    existing.push_value(value.clone());
                }
            }
            None => self.attributes.push(attribute),
        }
    }

    /// The entry DN.
    #[must_use]
    pub fn dn(&self) -> &Dn {
        &self.dn
    }

    /// Replaces the entry DN.
    pub fn set_dn(&mut self, dn: Dn) {
        self.dn = dn;
    }

    /// Object class names in insertion order.
    #[must_use]
    pub fn object_classes(&self) -> &[String] {
        &self.object_classes
    }

    /// User attributes in insertion order.
    #[must_use]
    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    /// Looks up an attribute by exact description.
    #[must_use]
    pub fn attribute(&self, description: &AttributeDescription) -> Option<&Attribute> {
        self.attributes
            .iter()
            .find(|attribute| attribute.description() == description)
    }

    /// Collects every value held for `attr_type`, across all option sets.
    ///
    /// `objectClass` resolves to the object class names.
    #[must_use]
    pub fn values_for(&self, attr_type: &str) -> Vec<&[u8]> {
        if attr_type.eq_ignore_ascii_case("objectclass") {
            return self
                .object_classes
                .iter()
                .map(String::as_bytes)
                .collect();
        }
        self.attributes
            .iter()
            .filter(|attribute| attribute.description().is_type(attr_type))
            .flat_map(|attribute| attribute.values().iter().map(Vec::as_slice))
            .collect()
    }

    /// Returns `true` when the entry holds at least one value for `attr_type`.
    #[must_use]
    pub fn has_attribute(&self, attr_type: &str) -> bool {
        !self.values_for(attr_type).is_empty()
    }
}
