/// A request or response control.
///
/// The value is kept opaque; decoders for specific controls live next to the
/// component that interprets them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Control {
    oid: String,
    critical: bool,
    value: Option<Vec<u8>>,
}

impl Control {
    /// Builds a control.
    #[must_use]
    pub fn new(oid: impl Into<String>, critical: bool, value: Option<Vec<u8>>) -> Self {
        Self {
            oid: oid.into(),
            critical,
            value,
        }
    }

    /// Object identifier naming the control.
    #[must_use]
    pub fn oid(&self) -> &str {
        &self.oid
    }

    /// Whether the server must reject the request when it cannot honour the
    /// control.
    #[must_use]
    pub const fn is_critical(&self) -> bool {
        self.critical
    }

    /// Encoded control value, if any.
    #[must_use]
    pub fn value(&self) -> Option<&[u8]> {
        self.value.as_deref()
    }
}
