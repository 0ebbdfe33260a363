//! Recording doubles for the protocol-layer and backend seams.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use dirsrv_types::{Control, Dn, Entry, ResultCode, SearchScope};

use crate::operation::{
    ClientConnection, DeliveryError, LocalOperation, Operation, SearchResultSink,
};
use crate::workflow::WorkflowHandler;

/// Response observed by a [`RecordingConnection`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentResponse {
    pub message_id: i32,
    pub result_code: ResultCode,
    pub message: String,
}

/// Connection that records responses and disconnects.
#[derive(Debug, Default)]
pub struct RecordingConnection {
    id: u64,
    responses: Mutex<Vec<SentResponse>>,
    disconnects: Mutex<Vec<(ResultCode, String)>>,
}

impl RecordingConnection {
    #[must_use]
    pub fn new(id: u64) -> Arc<Self> {
        Arc::new(Self {
            id,
            ..Self::default()
        })
    }

    #[must_use]
    pub fn responses(&self) -> Vec<SentResponse> {
        self.responses.lock().expect("responses mutex poisoned").clone()
    }

    #[must_use]
    pub fn disconnects(&self) -> Vec<(ResultCode, String)> {
        self.disconnects
            .lock()
            .expect("disconnects mutex poisoned")
            .clone()
    }
}

impl ClientConnection for RecordingConnection {
    fn connection_id(&self) -> u64 {
        self.id
    }

    fn send_response(&self, operation: &Operation) {
        self.responses
            .lock()
            .expect("responses mutex poisoned")
            .push(SentResponse {
                message_id: operation.key().message_id,
                result_code: operation.result_code(),
                message: operation.error_message().to_owned(),
            });
    }

    fn disconnect(&self, result: ResultCode, message: &str) {
        self.disconnects
            .lock()
            .expect("disconnects mutex poisoned")
            .push((result, message.to_owned()));
    }
}

/// How a [`RecordingSink`] answers entry deliveries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SinkBehaviour {
    #[default]
    Accept,
    Refuse,
    Fail,
}

/// Search result sink that records entries and completions.
#[derive(Debug, Default)]
pub struct RecordingSink {
    behaviour: Mutex<SinkBehaviour>,
    entries: Mutex<Vec<(Entry, Vec<Control>)>>,
    done: Mutex<Vec<(ResultCode, String)>>,
}

impl RecordingSink {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    #[must_use]
    pub fn with_behaviour(behaviour: SinkBehaviour) -> Arc<Self> {
        let sink = Self::new();
        sink.set_behaviour(behaviour);
        sink
    }

    pub fn set_behaviour(&self, behaviour: SinkBehaviour) {
        *self.behaviour.lock().expect("behaviour mutex poisoned") = behaviour;
    }

    #[must_use]
    pub fn entries(&self) -> Vec<(Entry, Vec<Control>)> {
        self.entries.lock().expect("entries mutex poisoned").clone()
    }

    #[must_use]
    pub fn entry_count(&self) -> usize {
        self.entries.lock().expect("entries mutex poisoned").len()
    }

    #[must_use]
    pub fn done(&self) -> Vec<(ResultCode, String)> {
        self.done.lock().expect("done mutex poisoned").clone()
    }
}

impl SearchResultSink for RecordingSink {
    fn return_entry(&self, entry: &Entry, controls: &[Control]) -> Result<bool, DeliveryError> {
        match *self.behaviour.lock().expect("behaviour mutex poisoned") {
            SinkBehaviour::Fail => Err(DeliveryError::new("client went away")),
            SinkBehaviour::Refuse => Ok(false),
            SinkBehaviour::Accept => {
                self.entries
                    .lock()
                    .expect("entries mutex poisoned")
                    .push((entry.clone(), controls.to_vec()));
                Ok(true)
            }
        }
    }

    fn send_search_result_done(
        &self,
        result: ResultCode,
        message: &str,
    ) -> Result<(), DeliveryError> {
        self.done
            .lock()
            .expect("done mutex poisoned")
            .push((result, message.to_owned()));
        Ok(())
    }
}

/// Workflow handler that records every invocation and answers with a fixed
/// result code.
#[derive(Debug)]
pub struct RecordingHandler {
    result: Mutex<ResultCode>,
    invocations: AtomicUsize,
    calls: Mutex<Vec<(Dn, SearchScope)>>,
    records: Mutex<Vec<LocalOperation>>,
    entries: Mutex<Vec<Entry>>,
}

impl RecordingHandler {
    #[must_use]
    pub fn new(result: ResultCode) -> Arc<Self> {
        Arc::new(Self {
            result: Mutex::new(result),
            invocations: AtomicUsize::new(0),
            calls: Mutex::new(Vec::new()),
            records: Mutex::new(Vec::new()),
            entries: Mutex::new(Vec::new()),
        })
    }

    #[must_use]
    pub fn succeeding() -> Arc<Self> {
        Self::new(ResultCode::Success)
    }

    pub fn set_result(&self, result: ResultCode) {
        *self.result.lock().expect("result mutex poisoned") = result;
    }

    /// Side-effect record attached on the next successful execution.
    pub fn attach_record(&self, record: LocalOperation) {
        self.records
            .lock()
            .expect("records mutex poisoned")
            .push(record);
    }

    /// Entry streamed back to search operations.
    pub fn serve_entry(&self, entry: Entry) {
        self.entries
            .lock()
            .expect("entries mutex poisoned")
            .push(entry);
    }

    #[must_use]
    pub fn invocations(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn calls(&self) -> Vec<(Dn, SearchScope)> {
        self.calls.lock().expect("calls mutex poisoned").clone()
    }
}

impl WorkflowHandler for RecordingHandler {
    fn execute(&self, operation: &mut Operation) {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        if let Some(dn) = operation.dn() {
            self.calls
                .lock()
                .expect("calls mutex poisoned")
                .push((dn.clone(), operation.scope()));
        }
        let entries = self.entries.lock().expect("entries mutex poisoned").clone();
        for entry in &entries {
            if operation.return_entry(entry, &[]).is_err() {
                break;
            }
        }
        let result = *self.result.lock().expect("result mutex poisoned");
        if operation.result_code() == ResultCode::Undefined {
            operation.set_result_code(result);
        }
        if result.is_success() {
            let records = std::mem::take(&mut *self.records.lock().expect("records mutex poisoned"));
            for record in records {
                operation.add_local_operation(record);
            }
        }
    }
}
