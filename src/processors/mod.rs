//! Processors wire a source of requests, the transaction service and a report sink together.

pub mod simple;
