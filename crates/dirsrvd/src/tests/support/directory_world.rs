//! BDD test world for request processing: a server context with recording
//! workflows, one client connection, and persistent search sinks.

use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use dirsrv_types::{Control, Entry, ResultCode, SearchScope};

use crate::context::{ServerContext, ServerSettings};
use crate::operation::{
    CancelRequest, CancelResult, LocalOperation, Modification, ModificationKind, Operation,
    RawModification, Request,
};
use crate::psearch::{ChangeTypes, PersistentSearchControl};

use super::doubles::{RecordingConnection, RecordingHandler, RecordingSink};
use super::requests::{add_request, dn, operation, person, search_request};

/// Scenario world shared across request-processing steps.
pub struct DirectoryWorld {
    pub context: ServerContext,
    pub connection: Arc<RecordingConnection>,
    handlers: HashMap<String, Arc<RecordingHandler>>,
    pub search_sink: Arc<RecordingSink>,
    last: Option<Operation>,
    last_cancel: Option<CancelResult>,
    next_message_id: i32,
}

impl DirectoryWorld {
    #[must_use]
    pub fn new() -> Self {
        let settings = ServerSettings::new(Duration::from_millis(200), ResultCode::Other, None);
        Self {
            context: ServerContext::builder(settings).build(),
            connection: RecordingConnection::new(1),
            handlers: HashMap::new(),
            search_sink: RecordingSink::new(),
            last: None,
            last_cancel: None,
            next_message_id: 1,
        }
    }

    /// Registers a succeeding workflow for `base`.
    pub fn register_workflow(&mut self, base: &str) -> Arc<RecordingHandler> {
        let handler = RecordingHandler::succeeding();
        self.context
            .workflows()
            .insert(dn(base), handler.clone())
            .expect("workflow registration should succeed");
        self.handlers.insert(base.to_owned(), handler.clone());
        handler
    }

    #[must_use]
    pub fn handler(&self, base: &str) -> Arc<RecordingHandler> {
        self.handlers
            .get(base)
            .cloned()
            .unwrap_or_else(|| panic!("no workflow registered for {base}"))
    }

    fn next_operation(&mut self, request: Request) -> Operation {
        let message_id = self.next_message_id;
        self.next_message_id += 1;
        operation(self.connection.clone(), message_id, request)
    }

    /// Runs `request` to completion and keeps the operation for assertions.
    pub fn run(&mut self, request: Request, controls: Vec<Control>) {
        let mut op = self.next_operation(request).with_request_controls(controls);
        op.run(&self.context);
        self.last = Some(op);
    }

    /// Runs `request` after a cancellation request has already arrived.
    pub fn run_cancelled_before_routing(&mut self, request: Request) {
        let mut op = self.next_operation(request);
        op.cancel_handle()
            .request(CancelRequest::new("canceled by client"));
        op.run(&self.context);
        self.last = Some(op);
    }

    /// Cancels the last operation after it completed.
    pub fn cancel_last(&mut self) {
        let handle = self.last_operation().cancel_handle();
        self.last_cancel =
            Some(handle.cancel(CancelRequest::new("late"), Duration::from_millis(200)));
    }

    #[must_use]
    pub fn last_cancel(&self) -> Option<CancelResult> {
        self.last_cancel
    }

    #[must_use]
    pub fn last_operation(&self) -> &Operation {
        self.last.as_ref().expect("no operation has run")
    }

    /// Starts a search against `base`.
    pub fn search(&mut self, base: &str, scope: SearchScope) {
        let sink = RecordingSink::new();
        self.search_sink = sink.clone();
        self.run(search_request(base, scope, "", sink), Vec::new());
    }

    /// Starts a changes-only persistent search.
    pub fn start_persistent_search(
        &mut self,
        base: &str,
        scope: SearchScope,
        change_types: ChangeTypes,
    ) {
        let sink = RecordingSink::new();
        self.search_sink = sink.clone();
        let control = PersistentSearchControl::new(change_types, true, true).to_control(true);
        self.run(search_request(base, scope, "", sink), vec![control]);
    }

    /// Adds `entry_dn` through the workflow serving `base`.
    pub fn add_entry(&mut self, base: &str, entry_dn: &str) {
        self.handler(base).attach_record(LocalOperation::Add {
            entry: person(entry_dn),
        });
        self.run(add_request(entry_dn), Vec::new());
    }

    /// Modifies `entry_dn` through the workflow serving `base`.
    pub fn modify_entry(&mut self, base: &str, entry_dn: &str) {
        let old = person(entry_dn);
        let new = old.clone().with_attribute("description", ["changed"]);
        let raw = RawModification::new(ModificationKind::Replace, "description", ["changed"]);
        let modification = Modification::decode(&raw)
            .expect("modification should decode");
        self.handler(base).attach_record(LocalOperation::Modify {
            old,
            new,
            modifications: vec![modification],
        });
        self.run(
            Request::Modify {
                raw_dn: entry_dn.to_owned(),
                changes: vec![raw],
            },
            Vec::new(),
        );
    }

    /// Entries delivered to the most recent search sink.
    #[must_use]
    pub fn delivered(&self) -> Vec<Entry> {
        self.search_sink
            .entries()
            .into_iter()
            .map(|(entry, _)| entry)
            .collect()
    }
}

impl Default for DirectoryWorld {
    fn default() -> Self {
        Self::new()
    }
}

/// Default directory world fixture.
#[must_use]
pub fn directory_world() -> RefCell<DirectoryWorld> {
    RefCell::new(DirectoryWorld::new())
}
