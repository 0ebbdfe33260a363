//! The phase sequence every operation runs through.
//!
//! ```text
//! pre-parse -> log request -> decode -> validate -> access check -> route
//!   -> execute -> post-operation -> send response -> log response
//!   -> post-response (persistent search replay)
//! ```
//!
//! Pending cancellation is honoured at each phase boundary up to handler
//! execution; once the handler returns the operation is too late to cancel.
//! A persistent search is the exception: a cancellation that arrives during
//! its initial phase still ends the search.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, warn};

use dirsrv_types::{Dn, Rdn, ResultCode, SearchFilter};

use crate::context::ServerContext;
use crate::psearch::{PERSISTENT_SEARCH_OID, PersistentSearch, PersistentSearchControl};

use super::plugins::{PostOperationResult, PreParseResult};
use super::request::{Modification, OperationType, Request};
use super::{CancelResult, OPERATION_TARGET, Operation, Resolved};

/// How processing ended.
enum Completion {
    /// Send the response and run post-response hooks.
    Respond,
    /// The connection is being dropped; only the response log remains.
    Terminate,
}

/// Outcome of core processing.
enum Core {
    Completed,
    Cancelled,
}

type DecodeFailure = (ResultCode, String);

impl Operation {
    /// Processes the operation to completion on the calling thread.
    ///
    /// Every outcome is recorded on the operation itself; exactly one request
    /// and one response record reach the access log.
    pub fn run(&mut self, context: &ServerContext) {
        self.started = Some(Instant::now());
        let _registration = context.operations().register(self.key, self.cancel.clone());
        debug!(target: OPERATION_TARGET, operation = %self, "processing started");

        match self.process(context) {
            Completion::Terminate => {
                self.stopped = Some(Instant::now());
                self.log_response_once(context);
            }
            Completion::Respond => {
                self.ensure_result_code(context);
                self.stopped = Some(Instant::now());
                if !self.progress.persistent_search_registered {
                    self.send_response();
                }
                self.log_response_once(context);
                self.post_response(context);
            }
        }

        self.cancel.mark_too_late();
        debug!(
            target: OPERATION_TARGET,
            operation = %self,
            result = %self.result_code,
            "processing finished"
        );
    }

    fn process(&mut self, context: &ServerContext) -> Completion {
        if self.check_cancelled() {
            self.log_request_once(context);
            return Completion::Respond;
        }

        match context.plugins().pre_parse(self) {
            PreParseResult::Continue => {}
            PreParseResult::TerminateConnection { reason } => {
                self.log_request_once(context);
                self.terminate(format!("canceled by pre-parse plugin: {reason}"));
                return Completion::Terminate;
            }
            PreParseResult::SendResponseImmediately => {
                self.log_request_once(context);
                return Completion::Respond;
            }
            PreParseResult::SkipCoreProcessing => {
                self.log_request_once(context);
                return self.post_operation(context);
            }
        }

        self.log_request_once(context);
        if self.check_cancelled() {
            return Completion::Respond;
        }

        match self.core_processing(context) {
            Core::Cancelled => Completion::Respond,
            Core::Completed => self.post_operation(context),
        }
    }

    fn core_processing(&mut self, context: &ServerContext) -> Core {
        if !self.resolve_request() || !self.validate_controls(context) {
            return Core::Completed;
        }

        let kind = self.operation_type();
        if kind.requires_access_check() && !context.access_control().is_allowed(self) {
            self.set_result(
                ResultCode::InsufficientAccessRights,
                format!(
                    "the requester has insufficient access rights for the {kind} operation"
                ),
            );
            return Core::Completed;
        }

        if self.check_cancelled() {
            return Core::Cancelled;
        }

        match kind {
            OperationType::Abandon => self.process_abandon(context),
            OperationType::Extended => self.process_extended(context),
            _ => self.route(context),
        }
        self.cancel.mark_too_late();
        Core::Completed
    }

    fn post_operation(&mut self, context: &ServerContext) -> Completion {
        match context.plugins().post_operation(self) {
            PostOperationResult::Continue => Completion::Respond,
            PostOperationResult::TerminateConnection { reason } => {
                self.terminate(format!("canceled by post-operation plugin: {reason}"));
                Completion::Terminate
            }
        }
    }

    fn terminate(&mut self, message: String) {
        warn!(
            target: OPERATION_TARGET,
            operation = %self,
            reason = %message,
            "plugin terminated the client connection"
        );
        self.connection.disconnect(ResultCode::Other, &message);
        self.set_result(ResultCode::Canceled, message);
    }

    /// Stops the operation when a cancellation request is pending and the
    /// too-late point has not been passed.
    fn check_cancelled(&mut self) -> bool {
        let Some(request) = self.cancel.pending() else {
            return false;
        };
        if self.cancel.publish(CancelResult::Canceled) != CancelResult::Canceled {
            return false;
        }
        debug!(
            target: OPERATION_TARGET,
            operation = %self,
            reason = request.reason(),
            "operation canceled"
        );
        self.set_result(ResultCode::Canceled, request.reason());
        true
    }

    fn resolve_request(&mut self) -> bool {
        match decode_request(&self.request) {
            Ok(resolved) => {
                self.resolved = resolved;
                true
            }
            Err((code, message)) => {
                self.set_result(code, message);
                false
            }
        }
    }

    fn validate_controls(&mut self, context: &ServerContext) -> bool {
        let is_search = self.operation_type() == OperationType::Search;
        let mut persistent_search = None;
        for control in &self.request_controls {
            if is_search && control.oid() == PERSISTENT_SEARCH_OID {
                match PersistentSearchControl::decode(control.value().unwrap_or_default()) {
                    Ok(decoded) => persistent_search = Some(decoded),
                    Err(error) => {
                        self.set_result(ResultCode::ProtocolError, error.to_string());
                        return false;
                    }
                }
            } else if control.is_critical() && !context.supports_control(control.oid()) {
                let message = format!(
                    "the critical control {} is not supported for the {} operation",
                    control.oid(),
                    self.operation_type()
                );
                self.set_result(ResultCode::UnavailableCriticalExtension, message);
                return false;
            }
        }

        if persistent_search.is_some() && !context.persistent_searches().has_capacity() {
            self.set_result(
                ResultCode::AdminLimitExceeded,
                "the maximum number of concurrent persistent searches has been reached",
            );
            return false;
        }
        self.persistent_search = persistent_search;
        true
    }

    fn route(&mut self, context: &ServerContext) {
        let Some(dn) = self.dn().cloned() else {
            return;
        };
        let kind = self.operation_type();
        if kind == OperationType::Bind && dn.is_root() {
            self.set_result(ResultCode::Success, "");
            return;
        }

        let Some(workflow) = context.workflows().candidate(&dn) else {
            self.set_result(ResultCode::NoSuchObject, no_naming_context_message(kind, &dn));
            return;
        };

        let Some(control) = self.persistent_search else {
            self.progress.executed_workflow = true;
            context.workflows().execute(&workflow, self);
            return;
        };

        let Some(search) = self.register_persistent_search(context, control) else {
            return;
        };
        if control.changes_only() {
            self.set_result(ResultCode::Success, "");
        } else {
            self.progress.executed_workflow = true;
            context.workflows().execute(&workflow, self);
        }
        self.settle_persistent_search(context, &search);
    }

    /// Keeps a freshly registered search only when its initial phase
    /// succeeded and no cancellation arrived in the meantime.
    ///
    /// Whoever removes the search from the registry answers it: when a
    /// concurrent abandon, disconnect or shutdown already removed it, the
    /// operation's own response stays suppressed.
    fn settle_persistent_search(
        &mut self,
        context: &ServerContext,
        search: &Arc<PersistentSearch>,
    ) {
        let cancelled = self.cancel.pending().is_some();
        if !cancelled && self.result_code.is_success() {
            return;
        }
        if context.persistent_searches().deregister(search) {
            self.progress.persistent_search_registered = false;
        }
        if cancelled {
            self.check_cancelled();
        }
    }

    fn register_persistent_search(
        &mut self,
        context: &ServerContext,
        control: PersistentSearchControl,
    ) -> Option<Arc<PersistentSearch>> {
        let search = Arc::new(PersistentSearch::from_operation(self, control)?);
        match context.persistent_searches().register(Arc::clone(&search)) {
            Ok(()) => {
                self.progress.persistent_search_registered = true;
                Some(search)
            }
            Err(error) => {
                self.set_result(ResultCode::AdminLimitExceeded, error.to_string());
                None
            }
        }
    }

    fn process_abandon(&mut self, context: &ServerContext) {
        let Request::Abandon { message_id } = self.request else {
            return;
        };
        if context.abandon(self.key.connection_id, message_id) {
            self.set_result(ResultCode::Success, "");
        } else {
            self.set_result(
                ResultCode::NoSuchOperation,
                format!("no operation with message ID {message_id} is in progress"),
            );
        }
    }

    fn process_extended(&mut self, context: &ServerContext) {
        let Request::Extended { oid, .. } = &self.request else {
            return;
        };
        let oid = oid.clone();
        match context.extended_handler(&oid) {
            Some(handler) => handler.process(self),
            None => {
                let message = format!("the extended operation {oid} is not supported");
                self.set_result(ResultCode::UnwillingToPerform, message);
            }
        }
    }

    fn ensure_result_code(&mut self, context: &ServerContext) {
        if self.result_code != ResultCode::Undefined {
            return;
        }
        self.result_code = context.settings().server_error_result_code();
        if self.error_message.is_empty() {
            self.error_message = "the operation completed without setting a result".to_owned();
        }
    }

    fn post_response(&mut self, context: &ServerContext) {
        let replay = self.progress.executed_workflow
            && self.result_code.is_success()
            && !self.local_operations.is_empty();
        if !replay {
            context.plugins().post_response(self, None);
            return;
        }

        let records = std::mem::take(&mut self.local_operations);
        for record in &records {
            context.persistent_searches().process_local(record);
            context.plugins().post_response(self, Some(record));
        }
        self.local_operations = records;
    }

    fn log_request_once(&mut self, context: &ServerContext) {
        if !self.progress.request_logged {
            self.progress.request_logged = true;
            context.access_logger().log_request(self);
        }
    }

    fn log_response_once(&mut self, context: &ServerContext) {
        if !self.progress.response_logged {
            self.progress.response_logged = true;
            context.access_logger().log_response(self);
        }
    }
}

fn decode_request(request: &Request) -> Result<Resolved, DecodeFailure> {
    let mut resolved = Resolved::default();
    match request {
        Request::Extended { .. } | Request::Abandon { .. } => {}
        Request::Search(search) => {
            resolved.dn = Some(decode_dn(&search.raw_base)?);
            resolved.filter = Some(decode_filter(&search.raw_filter)?);
        }
        Request::Modify { raw_dn, changes } => {
            resolved.dn = Some(decode_dn(raw_dn)?);
            let modifications = changes
                .iter()
                .map(Modification::decode)
                .collect::<Result<Vec<_>, _>>()
                .map_err(|message| (ResultCode::ProtocolError, message))?;
            resolved.modifications = Some(modifications);
        }
        Request::ModifyDn(rename) => {
            resolved.dn = Some(decode_dn(&rename.raw_dn)?);
            resolved.new_rdn = Some(Rdn::parse(&rename.raw_new_rdn).map_err(|error| {
                (
                    ResultCode::InvalidDnSyntax,
                    format!("the new RDN '{}' is invalid: {error}", rename.raw_new_rdn),
                )
            })?);
            resolved.new_superior = rename
                .raw_new_superior
                .as_deref()
                .map(decode_dn)
                .transpose()?;
        }
        Request::Add(add) => resolved.dn = Some(decode_dn(&add.raw_dn)?),
        Request::Delete { raw_dn }
        | Request::Compare { raw_dn, .. }
        | Request::Bind { raw_dn } => resolved.dn = Some(decode_dn(raw_dn)?),
    }
    Ok(resolved)
}

fn decode_dn(raw: &str) -> Result<Dn, DecodeFailure> {
    Dn::parse(raw).map_err(|error| {
        (
            ResultCode::InvalidDnSyntax,
            format!("the DN '{raw}' is invalid: {error}"),
        )
    })
}

fn decode_filter(raw: &str) -> Result<SearchFilter, DecodeFailure> {
    if raw.trim().is_empty() {
        return Ok(SearchFilter::match_all());
    }
    SearchFilter::parse(raw).map_err(|error| {
        (
            ResultCode::ProtocolError,
            format!("the search filter '{raw}' is invalid: {error}"),
        )
    })
}

fn no_naming_context_message(kind: OperationType, dn: &Dn) -> String {
    let action = match kind {
        OperationType::Add => "added",
        OperationType::Delete => "deleted",
        OperationType::Modify => "modified",
        OperationType::ModifyDn => "renamed",
        OperationType::Search => "used as a search base",
        OperationType::Compare => "compared",
        OperationType::Bind => "used to bind",
        OperationType::Extended | OperationType::Abandon => "processed",
    };
    format!("the entry {dn} cannot be {action} because no naming context is registered for it")
}
