//! Devtools server for the audion Web Audio graph inspector.
//!
//! Attaches to a page over the Chrome DevTools Protocol, folds its
//! `WebAudio` events into per-context graphs and streams the serialized
//! graphs to render surfaces over WebSocket.
//!
//! # Modules
//!
//! - [`error`]: DevtoolsError (stream level) and ApiError (HTTP responses)
//! - [`config`]: environment configuration
//! - [`debugger`]: the Debugger trait, a CDP client and an in-memory double
//! - [`attach`]: reference-counted attachment and domain enablement
//! - [`events`]: protocol and typed WebAudio event streams
//! - [`partition`]: per-key sub-streams with completion
//! - [`throttle`]: leading-and-trailing rate limiting
//! - [`realtime`]: `getRealtimeData` polling per realtime context
//! - [`pipeline`]: events to throttled serialized graph updates
//! - [`hub`]: the shared all-graphs scan
//! - [`layout`]: the layout worker
//! - [`panel`]: render surface sessions and registry
//! - [`state`], [`router`], [`handlers`], [`schema`]: the HTTP server

pub mod attach;
pub mod config;
pub mod debugger;
pub mod error;
pub mod events;
pub mod handlers;
pub mod hub;
pub mod layout;
pub mod panel;
pub mod partition;
pub mod pipeline;
pub mod realtime;
pub mod router;
pub mod schema;
pub mod state;
pub mod throttle;

pub use attach::{AttachController, AttachState, AttachStatus, Interest, Permission};
pub use config::{ConfigError, DevtoolsConfig, PipelineConfig};
pub use debugger::{CdpDebugger, Debugger, InMemoryDebugger};
pub use error::{ApiError, DevtoolsError};
pub use hub::{GraphHub, HubSubscription};
pub use state::AppState;
