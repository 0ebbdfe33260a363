//! Builders for requests, entries, and operations used across suites.

use std::sync::Arc;

use dirsrv_types::{Dn, Entry, SearchScope};

use crate::operation::{
    AddRequest, ClientConnection, Operation, OperationKey, Request, SearchRequest,
    SearchResultSink,
};

#[must_use]
pub fn dn(raw: &str) -> Dn {
    Dn::parse(raw).expect("test DN should parse")
}

#[must_use]
pub fn person(raw_dn: &str) -> Entry {
    let dn = dn(raw_dn);
    let cn = dn
        .rdn()
        .and_then(|rdn| rdn.avas().first())
        .map(|ava| ava.value().to_owned())
        .unwrap_or_default();
    Entry::new(dn)
        .with_object_class("top")
        .with_object_class("person")
        .with_attribute("cn", [cn.as_str()])
        .with_attribute("sn", ["Test"])
}

#[must_use]
pub fn add_request(raw_dn: &str) -> Request {
    Request::Add(AddRequest {
        raw_dn: raw_dn.to_owned(),
        object_classes: vec!["top".to_owned(), "person".to_owned()],
        attributes: Vec::new(),
    })
}

#[must_use]
pub fn search_request(
    raw_base: &str,
    scope: SearchScope,
    raw_filter: &str,
    sink: Arc<dyn SearchResultSink>,
) -> Request {
    Request::Search(SearchRequest {
        raw_base: raw_base.to_owned(),
        scope,
        raw_filter: raw_filter.to_owned(),
        attributes: Vec::new(),
        size_limit: 0,
        sink,
    })
}

#[must_use]
pub fn operation(
    connection: Arc<dyn ClientConnection>,
    message_id: i32,
    request: Request,
) -> Operation {
    let key = OperationKey::new(
        connection.connection_id(),
        u64::try_from(message_id).unwrap_or_default(),
        message_id,
    );
    Operation::new(key, request, connection)
}
