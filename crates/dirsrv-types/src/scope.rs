use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::dn::Dn;

/// Search scope relative to a search base DN.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize, EnumString, Display,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case", ascii_case_insensitive)]
pub enum SearchScope {
    /// Only the base entry itself.
    BaseObject,
    /// Immediate children of the base entry.
    SingleLevel,
    /// The base entry and everything beneath it.
    WholeSubtree,
    /// Everything beneath the base entry, excluding the base itself.
    SubordinateSubtree,
}

impl SearchScope {
    /// Returns `true` when `candidate` falls inside this scope under `base`.
    ///
    /// ```
    /// use dirsrv_types::{Dn, SearchScope};
    ///
    /// let base = Dn::parse("ou=people,dc=example").unwrap();
    /// let child = Dn::parse("cn=x,ou=people,dc=example").unwrap();
    /// assert!(SearchScope::SingleLevel.matches(&base, &child));
    /// assert!(!SearchScope::BaseObject.matches(&base, &child));
    /// ```
    #[must_use]
    pub fn matches(self, base: &Dn, candidate: &Dn) -> bool {
        match self {
            Self::BaseObject => base == candidate,
            Self::SingleLevel => candidate.is_child_of(base),
            Self::WholeSubtree => base.is_ancestor_of(candidate),
            Self::SubordinateSubtree => base.is_strict_ancestor_of(candidate),
        }
    }

    /// LDAP enumeration value carried in search requests.
    #[must_use]
    pub const fn as_int(self) -> u8 {
        match self {
            Self::BaseObject => 0,
            Self::SingleLevel => 1,
            Self::WholeSubtree => 2,
            Self::SubordinateSubtree => 3,
        }
    }
}
