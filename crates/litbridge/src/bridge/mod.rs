//! Request bridge between in-process callers and the worker.
//!
//! # Architecture
//!
//! - **client**: `RequestBridge`, the single "POST JSON, get a JSON object back" primitive
//! - **protocol**: endpoint paths and typed request/response records

pub mod client;
pub mod protocol;

pub use client::{BridgeError, JsonObject, RequestBridge};
