//! HTTP handler modules for the audion devtools API.
//!
//! Handlers are thin: they read shared state, delegate to the hub, the
//! attach controller or a panel session, and return JSON responses.

pub mod debugger;
pub mod graphs;
pub mod panels;
