//! Test suites for the directory server core.

pub(crate) mod support;
mod unit;
