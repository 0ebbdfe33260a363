use std::fmt;

use serde::{Deserialize, Serialize};

/// LDAP result codes surfaced by the request-processing core.
///
/// `Undefined` is the value every operation starts with; the lifecycle
/// guarantees it is replaced before a response is sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResultCode {
    /// No result has been assigned yet.
    Undefined,
    /// The operation completed successfully.
    Success,
    /// An internal ordering or sequencing error.
    OperationsError,
    /// The request violated the protocol.
    ProtocolError,
    /// A time limit was exceeded.
    TimeLimitExceeded,
    /// A size limit was exceeded.
    SizeLimitExceeded,
    /// A compare assertion evaluated to false.
    CompareFalse,
    /// A compare assertion evaluated to true.
    CompareTrue,
    /// The client should retry elsewhere.
    Referral,
    /// An administrative limit was exceeded.
    AdminLimitExceeded,
    /// A critical control was not recognised.
    UnavailableCriticalExtension,
    /// The request would violate a constraint.
    ConstraintViolation,
    /// The target entry does not exist.
    NoSuchObject,
    /// A DN could not be decoded.
    InvalidDnSyntax,
    /// The requester lacks the necessary access rights.
    InsufficientAccessRights,
    /// The server is too busy.
    Busy,
    /// The server is unavailable.
    Unavailable,
    /// The server refuses to perform the operation.
    UnwillingToPerform,
    /// The target entry already exists.
    EntryAlreadyExists,
    /// A catch-all error.
    Other,
    /// The operation was canceled.
    Canceled,
    /// The operation to cancel could not be found.
    NoSuchOperation,
    /// The operation progressed too far to be canceled.
    TooLate,
    /// The operation could not be canceled.
    CannotCancel,
}

impl ResultCode {
    const TABLE: &'static [(Self, i32, &'static str)] = &[
        (Self::Undefined, -1, "Undefined"),
        (Self::Success, 0, "Success"),
        (Self::OperationsError, 1, "Operations Error"),
        (Self::ProtocolError, 2, "Protocol Error"),
        (Self::TimeLimitExceeded, 3, "Time Limit Exceeded"),
        (Self::SizeLimitExceeded, 4, "Size Limit Exceeded"),
        (Self::CompareFalse, 5, "Compare False"),
        (Self::CompareTrue, 6, "Compare True"),
        (Self::Referral, 10, "Referral"),
        (Self::AdminLimitExceeded, 11, "Administrative Limit Exceeded"),
        (Self::UnavailableCriticalExtension, 12, "Unavailable Critical Extension"),
        (Self::ConstraintViolation, 19, "Constraint Violation"),
        (Self::NoSuchObject, 32, "No Such Entry"),
        (Self::InvalidDnSyntax, 34, "Invalid DN Syntax"),
        (Self::InsufficientAccessRights, 50, "Insufficient Access Rights"),
        (Self::Busy, 51, "Busy"),
        (Self::Unavailable, 52, "Unavailable"),
        (Self::UnwillingToPerform, 53, "Unwilling To Perform"),
        (Self::EntryAlreadyExists, 68, "Entry Already Exists"),
        (Self::Other, 80, "Other"),
        (Self::Canceled, 118, "Canceled"),
        (Self::NoSuchOperation, 119, "No Such Operation"),
        (Self::TooLate, 120, "Too Late"),
        (Self::CannotCancel, 121, "Cannot Cancel"),
    ];

    /// Numeric value carried on the wire.
    #[must_use]
    pub fn as_int(self) -> i32 {
        Self::TABLE
            .iter()
            .find(|(code, _, _)| *code == self)
            .map_or(-1, |(_, value, _)| *value)
    }

    /// Maps a wire value back to a known result code.
    #[must_use]
    pub fn from_int(value: i32) -> Option<Self> {
        Self::TABLE
            .iter()
            .find(|(_, candidate, _)| *candidate == value)
            .map(|(code, _, _)| *code)
    }

    /// Human-readable name used in access logs.
    #[must_use]
    pub fn name(self) -> &'static str {
        Self::TABLE
            .iter()
            .find(|(code, _, _)| *code == self)
            .map_or("Undefined", |(_, _, name)| *name)
    }

    /// Returns `true` for [`ResultCode::Success`].
    #[must_use]
    pub fn is_success(self) -> bool {
        self == Self::Success
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{} ({})", self.as_int(), self.name())
    }
}
