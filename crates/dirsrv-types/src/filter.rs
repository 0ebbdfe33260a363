//! Search filters in their RFC 4515 string form.
//!
//! Matching is deliberately simple: attribute names compare
//! case-insensitively, values compare as case-folded strings, and ordering
//! comparisons fall back to numeric comparison when both sides are integers.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::entry::Entry;

/// Errors raised while decoding a filter string.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FilterError {
    /// The filter string was empty.
    #[error("filter string is empty")]
    Empty,
    /// A parenthesis was missing or unexpected.
    #[error("unbalanced parentheses at position {position}")]
    Unbalanced {
        /// Character offset where the problem was detected.
        position: usize,
    },
    /// An item had no attribute description.
    #[error("filter item at position {position} has no attribute")]
    MissingAttribute {
        /// Character offset of the item.
        position: usize,
    },
    /// The comparison operator was not one of `=`, `~=`, `>=`, `<=`.
    #[error("invalid comparison operator at position {position}")]
    InvalidOperator {
        /// Character offset of the operator.
        position: usize,
    },
    /// A `\` escape was not followed by two hex digits.
    #[error("invalid escape sequence at position {position}")]
    InvalidEscape {
        /// Character offset of the escape.
        position: usize,
    },
    /// Characters remained after the outermost filter.
    #[error("unexpected trailing characters at position {position}")]
    TrailingCharacters {
        /// Character offset of the first trailing character.
        position: usize,
    },
}

/// A decoded search filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchFilter {
    /// All components must match; an empty list is absolute true.
    And(Vec<SearchFilter>),
    /// At least one component must match; an empty list is absolute false.
    Or(Vec<SearchFilter>),
    /// The component must not match.
    Not(Box<SearchFilter>),
    /// `attr=value`.
    Equality {
        /// Attribute type.
        attr: String,
        /// Asserted value.
        value: String,
    },
    /// `attr=initial*any*final`.
    Substring {
        /// Attribute type.
        attr: String,
        /// Leading fragment.
        initial: Option<String>,
        /// Middle fragments, matched in order.
        any: Vec<String>,
        /// Trailing fragment.
        final_: Option<String>,
    },
    /// `attr>=value`.
    GreaterOrEqual {
        /// Attribute type.
        attr: String,
        /// Asserted value.
        value: String,
    },
    /// `attr<=value`.
    LessOrEqual {
        /// Attribute type.
        attr: String,
        /// Asserted value.
        value: String,
    },
    /// `attr=*`.
    Present {
        /// Attribute type.
        attr: String,
    },
    /// `attr~=value`.
    Approximate {
        /// Attribute type.
        attr: String,
        /// Asserted value.
        value: String,
    },
}

impl SearchFilter {
    /// The conventional match-everything filter, `(objectClass=*)`.
    #[must_use]
    pub fn match_all() -> Self {
        Self::Present {
            attr: "objectClass".to_owned(),
        }
    }

    /// Decodes a filter string. A filter without outer parentheses is
    /// accepted and treated as a single item.
    ///
    /// # Errors
    ///
    /// Returns a [`FilterError`] describing the first syntax problem.
    pub fn parse(input: &str) -> Result<Self, FilterError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(FilterError::Empty);
        }
        let text = if trimmed.starts_with('(') {
            trimmed.to_owned()
        } else {
            format!("({trimmed})")
        };
        let mut parser = Parser {
            chars: text.chars().collect(),
            position: 0,
        };
        let filter = parser.filter()?;
        if parser.position < parser.chars.len() {
            return Err(FilterError::TrailingCharacters {
                position: parser.position,
            });
        }
        Ok(filter)
    }

    /// Evaluates the filter against an entry.
    #[must_use]
    pub fn matches(&self, entry: &Entry) -> bool {
        match self {
            Self::And(components) => components.iter().all(|component| component.matches(entry)),
            Self::Or(components) => components.iter().any(|component| component.matches(entry)),
            Self::Not(component) => !component.matches(entry),
            Self::Present { attr } => entry.has_attribute(base_type(attr)),
            Self::Equality { attr, value } => {
                any_value(entry, attr, |candidate| candidate == fold(value))
            }
            Self::Approximate { attr, value } => {
                let wanted = squash(value);
                any_value(entry, attr, |candidate| squash(&candidate) == wanted)
            }
            Self::GreaterOrEqual { attr, value } => any_value(entry, attr, |candidate| {
                compare(&candidate, &fold(value)) != Ordering::Less
            }),
            Self::LessOrEqual { attr, value } => any_value(entry, attr, |candidate| {
                compare(&candidate, &fold(value)) != Ordering::Greater
            }),
            Self::Substring {
                attr,
                initial,
                any,
                final_,
            } => any_value(entry, attr, |candidate| {
                substring_matches(&candidate, initial.as_deref(), any, final_.as_deref())
            }),
        }
    }
}

impl FromStr for SearchFilter {
    type Err = FilterError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        Self::parse(input)
    }
}

impl fmt::Display for SearchFilter {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::And(components) => write_list(formatter, '&', components),
            Self::Or(components) => write_list(formatter, '|', components),
            Self::Not(component) => write!(formatter, "(!{component})"),
            Self::Equality { attr, value } => write!(formatter, "({attr}={})", escape(value)),
            Self::Approximate { attr, value } => write!(formatter, "({attr}~={})", escape(value)),
            Self::GreaterOrEqual { attr, value } => {
                write!(formatter, "({attr}>={})", escape(value))
            }
            Self::LessOrEqual { attr, value } => write!(formatter, "({attr}<={})", escape(value)),
            Self::Present { attr } => write!(formatter, "({attr}=*)"),
            Self::Substring {
                attr,
                initial,
                any,
                final_,
            } => {
                write!(formatter, "({attr}=")?;
                if let Some(initial) = initial {
                    formatter.write_str(&escape(initial))?;
                }
                formatter.write_str("*")?;
                for fragment in any {
                    write!(formatter, "{}*", escape(fragment))?;
                }
                if let Some(final_) = final_ {
                    formatter.write_str(&escape(final_))?;
                }
                formatter.write_str(")")
            }
        }
    }
}

fn write_list(
    formatter: &mut fmt::Formatter<'_>,
    operator: char,
    components: &[SearchFilter],
) -> fmt::Result {
    write!(formatter, "({operator}")?;
    for component in components {
        write!(formatter, "{component}")?;
    }
    formatter.write_str(")")
}

struct Parser {
    chars: Vec<char>,
    position: usize,
}

impl Parser {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.position).copied()
    }

    fn expect(&mut self, wanted: char) -> Result<(), FilterError> {
        if self.peek() == Some(wanted) {
            self.position += 1;
            Ok(())
        } else {
            Err(FilterError::Unbalanced {
                position: self.position,
            })
        }
    }

    fn filter(&mut self) -> Result<SearchFilter, FilterError> {
        self.expect('(')?;
        let filter = match self.peek() {
            Some('&') => {
                self.position += 1;
                SearchFilter::And(self.list()?)
            }
            Some('|') => {
                self.position += 1;
                SearchFilter::Or(self.list()?)
            }
            Some('!') => {
                self.position += 1;
                SearchFilter::Not(Box::new(self.filter()?))
            }
            Some(_) => self.item()?,
            None => {
                return Err(FilterError::Unbalanced {
                    position: self.position,
                });
            }
        };
        self.expect(')')?;
        Ok(filter)
    }

    fn list(&mut self) -> Result<Vec<SearchFilter>, FilterError> {
        let mut components = Vec::new();
        while self.peek() == Some('(') {
            components.push(self.filter()?);
        }
        Ok(components)
    }

    fn item(&mut self) -> Result<SearchFilter, FilterError> {
        let start = self.position;
        let mut attr = String::new();
        while let Some(ch) = self.peek() {
            if matches!(ch, '=' | '~' | '>' | '<' | '(' | ')') {
                break;
            }
            attr.push(ch);
            self.position += 1;
        }
        let attr = attr.trim().to_owned();
        if attr.is_empty() {
            return Err(FilterError::MissingAttribute { position: start });
        }

        let operator_position = self.position;
        let operator = match self.peek() {
            Some('=') => {
                self.position += 1;
                '='
            }
            Some(prefix @ ('~' | '>' | '<')) => {
                self.position += 1;
                self.expect('=')
                    .map_err(|_| FilterError::InvalidOperator {
                        position: operator_position,
                    })?;
                prefix
            }
            _ => {
                return Err(FilterError::InvalidOperator {
                    position: operator_position,
                });
            }
        };

        let segments = self.value_segments()?;
        match operator {
            '~' => Ok(SearchFilter::Approximate {
                attr,
                value: segments.concat(),
            }),
            '>' => Ok(SearchFilter::GreaterOrEqual {
                attr,
                value: segments.concat(),
            }),
            '<' => Ok(SearchFilter::LessOrEqual {
                attr,
                value: segments.concat(),
            }),
            _ => Ok(equality_or_substring(attr, segments)),
        }
    }

    /// Reads an assertion value, splitting on unescaped `*`.
    fn value_segments(&mut self) -> Result<Vec<String>, FilterError> {
        let mut segments = vec![Vec::<u8>::new()];
        while let Some(ch) = self.peek() {
            match ch {
                ')' => break,
                '(' => {
                    return Err(FilterError::Unbalanced {
                        position: self.position,
                    });
                }
                '*' => {
                    segments.push(Vec::new());
                    self.position += 1;
                }
                '\\' => {
                    let escape_position = self.position;
                    let byte = self.hex_byte().ok_or(FilterError::InvalidEscape {
                        position: escape_position,
                    })?;
                    if let Some(segment) = segments.last_mut() {
                        segment.push(byte);
                    }
                }
                other => {
                    let mut buffer = [0_u8; 4];
                    if let Some(segment) = segments.last_mut() {
                        segment.extend_from_slice(other.encode_utf8(&mut buffer).as_bytes());
                    }
                    self.position += 1;
                }
            }
        }
        Ok(segments
            .into_iter()
            .map(|segment| String::from_utf8_lossy(&segment).into_owned())
            .collect())
    }

    fn hex_byte(&mut self) -> Option<u8> {
        let high = self.chars.get(self.position + 1)?.to_digit(16)?;
        let low = self.chars.get(self.position + 2)?.to_digit(16)?;
        self.position += 3;
        u8::try_from(high * 16 + low).ok()
    }
}

fn equality_or_substring(attr: String, mut segments: Vec<String>) -> SearchFilter {
    if segments.len() == 1 {
        return SearchFilter::Equality {
            attr,
            value: segments.concat(),
        };
    }
    if segments.len() == 2 && segments.iter().all(String::is_empty) {
        return SearchFilter::Present { attr };
    }
    let final_ = segments.pop().filter(|fragment| !fragment.is_empty());
    let mut remaining = segments.into_iter();
    let initial = remaining.next().filter(|fragment| !fragment.is_empty());
    let any = remaining.filter(|fragment| !fragment.is_empty()).collect();
    SearchFilter::Substring {
        attr,
        initial,
        any,
        final_,
    }
}

fn base_type(attr: &str) -> &str {
    attr.split(';').next().unwrap_or(attr)
}

fn any_value(entry: &Entry, attr: &str, mut predicate: impl FnMut(String) -> bool) -> bool {
    entry
        .values_for(base_type(attr))
        .into_iter()
        .any(|value| predicate(fold(&String::from_utf8_lossy(value))))
}

fn fold(value: &str) -> String {
    value.trim().to_lowercase()
}

fn squash(value: &str) -> String {
    value
        .chars()
        .filter(|ch| !ch.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

fn compare(candidate: &str, asserted: &str) -> Ordering {
    match (candidate.parse::<i64>(), asserted.parse::<i64>()) {
        (Ok(left), Ok(right)) => left.cmp(&right),
        _ => candidate.cmp(asserted),
    }
}

fn substring_matches(
    candidate: &str,
    initial: Option<&str>,
    any: &[String],
    final_: Option<&str>,
) -> bool {
    let mut rest = candidate;
    if let Some(initial) = initial {
        match rest.strip_prefix(fold(initial).as_str()) {
            Some(tail) => rest = tail,
            None => return false,
        }
    }
    for fragment in any {
        let fragment = fold(fragment);
        match rest.find(fragment.as_str()) {
            Some(index) => rest = rest.get(index + fragment.len()..).unwrap_or_default(),
            None => return false,
        }
    }
    match final_ {
        Some(final_) => rest.ends_with(fold(final_).as_str()),
        None => true,
    }
}

fn escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '*' => escaped.push_str("\\2a"),
            '(' => escaped.push_str("\\28"),
            ')' => escaped.push_str("\\29"),
            '\\' => escaped.push_str("\\5c"),
            '\0' => escaped.push_str("\\00"),
            other => escaped.push(other),
        }
    }
    escaped
}
