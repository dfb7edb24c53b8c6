//! API schema types for request/response definitions.
//!
//! Graph payloads reuse the transfer shapes from `audion-transfer`; the
//! types here cover the debugger and panel endpoints.

pub mod debugger;
pub mod panels;
