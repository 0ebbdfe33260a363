//! Per-request operation state and its processing lifecycle.
//!
//! An [`Operation`] is created by the protocol layer for every decoded
//! request and driven to completion by [`Operation::run`] on a single worker
//! thread. Only the cancellation slot is shared with other threads.

mod access;
mod access_log;
mod cancel;
mod connection;
mod extended;
mod lifecycle;
mod local;
mod plugins;
mod registry;
mod request;

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dirsrv_types::{Control, Dn, Entry, Rdn, ResultCode, SearchFilter, SearchScope};

use crate::psearch::PersistentSearchControl;

pub use access::{AccessControlHandler, AllowAllAccessControl};
pub use access_log::{AccessLogger, TracingAccessLogger};
pub use cancel::{CancelHandle, CancelRequest, CancelResult};
pub use connection::{ClientConnection, DeliveryError, SearchResultSink};
pub use extended::ExtendedOperationHandler;
pub use local::LocalOperation;
pub use plugins::{NoopPluginManager, PluginManager, PostOperationResult, PreParseResult};
pub use registry::OperationRegistry;
pub use request::{
    AddRequest, Modification, ModificationKind, ModifyDnRequest, OperationType, RawModification,
    Request, SearchRequest,
};

pub(crate) const OPERATION_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::operation");

/// Identity of an operation within the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OperationKey {
    /// Client connection the request arrived on.
    pub connection_id: u64,
    /// Server-assigned sequence number within the connection.
    pub operation_id: u64,
    /// Client-assigned message ID.
    pub message_id: i32,
}

impl OperationKey {
    /// Builds a key.
    #[must_use]
    pub const fn new(connection_id: u64, operation_id: u64, message_id: i32) -> Self {
        Self {
            connection_id,
            operation_id,
            message_id,
        }
    }
}

#[derive(Debug, Default)]
struct Resolved {
    dn: Option<Dn>,
    new_rdn: Option<Rdn>,
    new_superior: Option<Dn>,
    filter: Option<SearchFilter>,
    modifications: Option<Vec<request::Modification>>,
}

#[derive(Debug, Default, Clone, Copy)]
struct Progress {
    request_logged: bool,
    response_logged: bool,
    response_sent: bool,
    executed_workflow: bool,
    persistent_search_registered: bool,
}

/// One client request and everything learned while processing it.
pub struct Operation {
    key: OperationKey,
    request: Request,
    connection: Arc<dyn ClientConnection>,
    request_controls: Vec<Control>,
    response_controls: Vec<Control>,
    resolved: Resolved,
    scope: SearchScope,
    persistent_search: Option<PersistentSearchControl>,
    result_code: ResultCode,
    error_message: String,
    matched_dn: Option<Dn>,
    referral_urls: Vec<String>,
    cancel: CancelHandle,
    started: Option<Instant>,
    stopped: Option<Instant>,
    progress: Progress,
    local_operations: Vec<LocalOperation>,
    entries_sent: usize,
}

impl Operation {
    /// Creates an operation for a freshly decoded request.
    #[must_use]
    pub fn new(key: OperationKey, request: Request, connection: Arc<dyn ClientConnection>) -> Self {
        let scope = match &request {
            Request::Search(search) => search.scope,
            _ => SearchScope::BaseObject,
        };
        Self {
            key,
            request,
            connection,
            request_controls: Vec::new(),
            response_controls: Vec::new(),
            resolved: Resolved::default(),
            scope,
            persistent_search: None,
            result_code: ResultCode::Undefined,
            error_message: String::new(),
            matched_dn: None,
            referral_urls: Vec::new(),
            cancel: CancelHandle::new(),
            started: None,
            stopped: None,
            progress: Progress::default(),
            local_operations: Vec::new(),
            entries_sent: 0,
        }
    }

    /// Attaches the request controls sent by the client.
    #[must_use]
    pub fn with_request_controls(mut self, controls: Vec<Control>) -> Self {
        self.request_controls = controls;
        self
    }

    /// Operation identity.
    #[must_use]
    pub const fn key(&self) -> OperationKey {
        self.key
    }

    /// Kind of operation.
    #[must_use]
    pub const fn operation_type(&self) -> OperationType {
        self.request.operation_type()
    }

    /// Raw request payload.
    #[must_use]
    pub const fn request(&self) -> &Request {
        &self.request
    }

    /// Request controls in the order supplied.
    #[must_use]
    pub fn request_controls(&self) -> &[Control] {
        &self.request_controls
    }

    /// Response controls in insertion order.
    #[must_use]
    pub fn response_controls(&self) -> &[Control] {
        &self.response_controls
    }

    /// Appends a response control.
    pub fn add_response_control(&mut self, control: Control) {
        self.response_controls.push(control);
    }

    /// Removes the first response control with `oid`.
    pub fn remove_response_control(&mut self, oid: &str) -> Option<Control> {
        let index = self
            .response_controls
            .iter()
            .position(|control| control.oid() == oid)?;
        Some(self.response_controls.remove(index))
    }

    /// Decoded target DN, or the current search base during fan-out.
    #[must_use]
    pub fn dn(&self) -> Option<&Dn> {
        self.resolved.dn.as_ref()
    }

    /// Decoded new RDN of a modify-DN request.
    #[must_use]
    pub fn new_rdn(&self) -> Option<&Rdn> {
        self.resolved.new_rdn.as_ref()
    }

    /// Decoded new superior of a modify-DN request.
    #[must_use]
    pub fn new_superior(&self) -> Option<&Dn> {
        self.resolved.new_superior.as_ref()
    }

    /// DN the entry will have after a modify-DN request.
    #[must_use]
    pub fn new_dn(&self) -> Option<Dn> {
        let dn = self.dn()?;
        let rdn = self.new_rdn()?.clone();
        let parent = match self.new_superior() {
            Some(superior) => superior.clone(),
            None => dn.parent().unwrap_or_default(),
        };
        Some(parent.child(rdn))
    }

    /// Decoded search filter.
    #[must_use]
    pub fn filter(&self) -> Option<&SearchFilter> {
        self.resolved.filter.as_ref()
    }

    /// Decoded modifications of a modify request.
    #[must_use]
    pub fn modifications(&self) -> Option<&[Modification]> {
        self.resolved.modifications.as_deref()
    }

    /// Current search scope; `BaseObject` for other operation types.
    #[must_use]
    pub const fn scope(&self) -> SearchScope {
        self.scope
    }

    pub(crate) fn set_scope(&mut self, scope: SearchScope) {
        self.scope = scope;
    }

    pub(crate) fn set_dn(&mut self, dn: Dn) {
        self.resolved.dn = Some(dn);
    }

    /// Persistent search control carried by a search request.
    #[must_use]
    pub const fn persistent_search_control(&self) -> Option<&PersistentSearchControl> {
        self.persistent_search.as_ref()
    }

    /// Returns `true` when the search stayed registered as a persistent
    /// search after core processing.
    #[must_use]
    pub const fn is_persistent_search_registered(&self) -> bool {
        self.progress.persistent_search_registered
    }

    /// Current result code.
    #[must_use]
    pub const fn result_code(&self) -> ResultCode {
        self.result_code
    }

    /// Sets the result code.
    pub fn set_result_code(&mut self, code: ResultCode) {
        self.result_code = code;
    }

    /// Diagnostic message accumulated so far.
    #[must_use]
    pub fn error_message(&self) -> &str {
        &self.error_message
    }

    /// Replaces the diagnostic message.
    pub fn set_error_message(&mut self, message: impl Into<String>) {
        self.error_message = message.into();
    }

    /// Appends to the diagnostic message, separating entries with `"; "`.
    pub fn append_error_message(&mut self, message: &str) {
        if message.is_empty() {
            return;
        }
        if !self.error_message.is_empty() {
            self.error_message.push_str("; ");
        }
        self.error_message.push_str(message);
    }

    /// Sets the result code and replaces the diagnostic message.
    pub fn set_result(&mut self, code: ResultCode, message: impl Into<String>) {
        self.result_code = code;
        self.error_message = message.into();
    }

    /// Closest existing ancestor reported with `NoSuchObject`.
    #[must_use]
    pub fn matched_dn(&self) -> Option<&Dn> {
        self.matched_dn.as_ref()
    }

    /// Sets the matched DN.
    pub fn set_matched_dn(&mut self, dn: Dn) {
        self.matched_dn = Some(dn);
    }

    /// Referral URLs returned with `Referral`.
    #[must_use]
    pub fn referral_urls(&self) -> &[String] {
        &self.referral_urls
    }

    /// Adds a referral URL.
    pub fn add_referral_url(&mut self, url: impl Into<String>) {
        self.referral_urls.push(url.into());
    }

    /// Handle through which other threads may cancel this operation.
    #[must_use]
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Time spent in [`Operation::run`], once processing has stopped.
    #[must_use]
    pub fn processing_time(&self) -> Option<Duration> {
        match (self.started, self.stopped) {
            (Some(started), Some(stopped)) => Some(stopped.saturating_duration_since(started)),
            (Some(started), None) => Some(started.elapsed()),
            _ => None,
        }
    }

    /// Returns `true` once a response has been written.
    #[must_use]
    pub const fn response_sent(&self) -> bool {
        self.progress.response_sent
    }

    /// Writes the response unless one was already sent.
    ///
    /// Handlers that must answer before they return (for example when a
    /// transport upgrade follows the response) call this directly; the
    /// lifecycle then skips its own send.
    pub fn send_response(&mut self) -> bool {
        if self.progress.response_sent {
            return false;
        }
        self.progress.response_sent = true;
        let connection = Arc::clone(&self.connection);
        connection.send_response(self);
        true
    }

    /// Side-effect records attached by the handler.
    #[must_use]
    pub fn local_operations(&self) -> &[LocalOperation] {
        &self.local_operations
    }

    /// Attaches a side-effect record for post-response replay.
    pub fn add_local_operation(&mut self, record: LocalOperation) {
        self.local_operations.push(record);
    }

    /// Number of search entries returned so far.
    #[must_use]
    pub const fn entries_sent(&self) -> usize {
        self.entries_sent
    }

    /// Streams a search result entry to the client, honouring the size limit
    /// and the requested attribute list.
    ///
    /// Returns `Ok(false)` when no further entries should be sent.
    ///
    /// # Errors
    ///
    /// Propagates delivery failures from the result sink.
    pub fn return_entry(
        &mut self,
        entry: &Entry,
        controls: &[Control],
    ) -> Result<bool, DeliveryError> {
        let Request::Search(search) = &self.request else {
            return Ok(false);
        };
        if search.size_limit > 0 && self.entries_sent >= search.size_limit {
            self.set_result(
                ResultCode::SizeLimitExceeded,
                format!("the size limit of {} entries was reached", search.size_limit),
            );
            return Ok(false);
        }
        let projected = project_entry(entry, &search.attributes);
        let sink = Arc::clone(&search.sink);
        let keep_going = sink.return_entry(&projected, controls)?;
        self.entries_sent += 1;
        Ok(keep_going)
    }
}

impl fmt::Debug for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation")
            .field("key", &self.key)
            .field("request", &self.request)
            .field("scope", &self.scope)
            .field("result_code", &self.result_code)
            .field("error_message", &self.error_message)
            .field("response_sent", &self.progress.response_sent)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}Operation(connID={}, opID={}, msgID={}",
            self.operation_type(),
            self.key.connection_id,
            self.key.operation_id,
            self.key.message_id
        )?;
        if let Some(dn) = self.request.raw_dn() {
            write!(f, ", dn={dn}")?;
        }
        f.write_str(")")
    }
}

/// Restricts `entry` to the requested attribute types.
///
/// An empty list or `*` keeps every user attribute; `objectClass` must be
/// requested explicitly otherwise.
pub(crate) fn project_entry(entry: &Entry, attributes: &[String]) -> Entry {
    if attributes.is_empty() || attributes.iter().any(|name| name == "*") {
        return entry.clone();
    }
    let wants = |attr_type: &str| {
        attributes
            .iter()
            .any(|name| name.eq_ignore_ascii_case(attr_type))
    };
    let mut projected = Entry::new(entry.dn().clone());
    if wants("objectClass") {
        for class in entry.object_classes() {
            projected.add_object_class(class.clone());
        }
    }
    for attribute in entry.attributes() {
        if wants(attribute.description().attr_type()) {
            projected.add_attribute(attribute.clone());
        }
    }
    projected
}
