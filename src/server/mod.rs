//! HTTP server integration built on `may_minihttp`.
//!
//! Wire parsing, keep-alive and connection handling belong to the transport
//! layer; this module only adapts one parsed exchange into the engine's
//! [`crate::transport::Transport`] boundary and flushes the buffered
//! response once the controller finishes.

mod http_server;
mod service;
mod transport;

pub use http_server::{HttpServer, ServerHandle};
pub use service::EngineService;
pub use transport::HttpTransport;
