// src/core/mod.rs

/// Wire events, per-target results and technique payloads.
pub mod models;

/// One engine per reconnaissance technique plus their shared helpers.
pub mod scanner;

pub mod bus;
pub mod dispatcher;
pub mod handlers;
