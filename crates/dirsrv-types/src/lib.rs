//! Shared directory data model for the dirsrv workspace.
//!
//! The request-processing core, its configuration layer, and any protocol
//! front-end exchange the same vocabulary: distinguished names, search scopes
//! and filters, entries and their attributes, result codes, and request or
//! response controls. Keeping these types in a dependency-light crate lets the
//! codec, router, and notification layers agree on normalisation rules without
//! depending on one another.

mod attribute;
mod control;
mod dn;
mod entry;
mod filter;
mod result_code;
mod scope;

pub use attribute::{Attribute, AttributeDescription};
pub use control::Control;
pub use dn::{Ava, Dn, DnError, Rdn};
pub use entry::Entry;
pub use filter::{FilterError, SearchFilter};
pub use result_code::ResultCode;
pub use scope::SearchScope;
