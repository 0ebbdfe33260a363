use std::fmt;
use std::hash::{Hash, Hasher};

/// Attribute type plus its option set, e.g. `cn;lang-fr`.
///
/// Type and options compare case-insensitively and options compare as a set,
/// so `CN;Lang-FR;binary` equals `cn;binary;lang-fr`.
#[derive(Debug, Clone)]
pub struct AttributeDescription {
    attr_type: String,
    options: Vec<String>,
    normalized: (String, Vec<String>),
}

impl AttributeDescription {
    /// Builds a description from a type name and options.
    #[must_use]
    pub fn new<I, S>(attr_type: impl Into<String>, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let attr_type = attr_type.into();
        let options: Vec<String> = options.into_iter().map(Into::into).collect();
        let mut normalized_options: Vec<String> =
            options.iter().map(|option| option.to_ascii_lowercase()).collect();
        normalized_options.sort();
        normalized_options.dedup();
        Self {
            normalized: (attr_type.to_ascii_lowercase(), normalized_options),
            attr_type,
            options,
        }
    }

    /// Builds a description without options.
    #[must_use]
    pub fn plain(attr_type: impl Into<String>) -> Self {
        Self::new(attr_type, Vec::<String>::new())
    }

    /// Parses the `type;option;option` form.
    #[must_use]
    pub fn parse(input: &str) -> Self {
        let mut parts = input.split(';').map(str::trim);
        let attr_type = parts.next().unwrap_or_default().to_owned();
        Self::new(attr_type, parts.filter(|option| !option.is_empty()))
    }

    /// Attribute type name as supplied.
    #[must_use]
    pub fn attr_type(&self) -> &str {
        &self.attr_type
    }

    /// Options as supplied.
    #[must_use]
    pub fn options(&self) -> &[String] {
        &self.options
    }

    /// Returns `true` when the description carries at least one option.
    #[must_use]
    pub fn has_options(&self) -> bool {
        !self.options.is_empty()
    }

    /// Lower-cased attribute type name.
    #[must_use]
    pub fn normalized_type(&self) -> &str {
        &self.normalized.0
    }

    /// Returns `true` when this description names `attr_type`, whatever its
    /// options.
    #[must_use]
    pub fn is_type(&self, attr_type: &str) -> bool {
        self.attr_type.eq_ignore_ascii_case(attr_type)
    }
}

impl PartialEq for AttributeDescription {
    fn eq(&self, other: &Self) -> bool {
        self.normalized == other.normalized
    }
}

impl Eq for AttributeDescription {}

impl Hash for AttributeDescription {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.normalized.hash(state);
    }
}

impl fmt::Display for AttributeDescription {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.attr_type)?;
        for option in &self.options {
            write!(formatter, ";{option}")?;
        }
        Ok(())
    }
}

/// An attribute: a description and its ordered values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    description: AttributeDescription,
    values: Vec<Vec<u8>>,
}

impl Attribute {
    /// Builds an attribute from a description and raw values.
    #[must_use]
    pub fn new(description: AttributeDescription, values: Vec<Vec<u8>>) -> Self {
        Self {
            description,
            values,
        }
    }

    /// Builds an option-less attribute from string values.
    #[must_use]
    pub fn from_strings<I, S>(attr_type: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::new(
            AttributeDescription::plain(attr_type),
            values
                .into_iter()
                .map(|value| value.as_ref().as_bytes().to_vec())
                .collect(),
        )
    }

    /// The attribute description.
    #[must_use]
    pub fn description(&self) -> &AttributeDescription {
        &self.description
    }

    /// Raw values in insertion order.
    #[must_use]
    pub fn values(&self) -> &[Vec<u8>] {
        &self.values
    }

    /// Appends a value.
    pub fn push_value(&mut self, value: impl Into<Vec<u8>>) {
        self.values.push(value.into());
    }

    /// Returns `true` when the attribute holds no values.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_compare_as_case_insensitive_set() {
        let left = AttributeDescription::parse("CN;Lang-FR;binary");
        let right = AttributeDescription::parse("cn;binary;lang-fr");
        assert_eq!(left, right);
        assert_eq!(left.to_string(), "CN;Lang-FR;binary");
    }

    #[test]
    fn different_options_are_distinct() {
        assert_ne!(
            AttributeDescription::parse("cn;lang-fr"),
            AttributeDescription::parse("cn;lang-de")
        );
        assert_ne!(
            AttributeDescription::parse("cn"),
            AttributeDescription::parse("cn;lang-de")
        );
    }
}
