//! # webstrand
//!
//! **webstrand** is an asynchronous per-request processing engine for a
//! non-blocking HTTP server, built on the [`may`] coroutine runtime. It
//! dispatches an inbound request to a controller, lets that controller
//! suspend (timers, file reads, cross-request events) without blocking the
//! server, and finally serializes a response.
//!
//! ## Overview
//!
//! The engine governs exactly one connection's handler lifecycle plus two
//! derived behaviors with real concurrency and resource-lifetime complexity:
//! chunked streaming of a finite byte source with cooperative backpressure,
//! and broadcast fan-out of one data source to a dynamically changing set of
//! connected listeners. Routing, template language semantics, and the HTTP
//! wire protocol are external collaborators reached through trait
//! boundaries.
//!
//! ## Architecture
//!
//! - **[`reactor`]** - Single task-queue event loop with cancellable
//!   scheduled tasks
//! - **[`controller`]** - Per-request lifecycle engine (init, suspend/resume
//!   steps, finish, disconnect)
//! - **[`dispatcher`]** - Route resolution boundary and controller
//!   instantiation
//! - **[`templates`]** - Preloaded template sources with a
//!   compile-on-first-use artifact cache (`minijinja`)
//! - **[`streamer`]** - Chunked static streaming, one deferred step per chunk
//! - **[`broadcast`]** - One-producer fan-out with independent per-listener
//!   drain rates
//! - **[`transport`]** - Connection boundary trait
//! - **[`server`]** - `may_minihttp` integration
//! - **[`controllers`]** - Demo controllers used by the binary and tests
//! - **[`runtime_config`]** - `STRAND_*` environment configuration
//!
//! ## Lifecycle
//!
//! A request moves through
//! `Created → Initializing → {Active, Suspended}* → Finishing → Finished`,
//! with a terminal `Disconnected` reachable from any non-finished state.
//! Exactly one of normal finish, error finish, or disconnect terminates each
//! request, and finish effects run at most once no matter how many times it
//! is invoked.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use http::Method;
//! use webstrand::controllers::{Index, NotFound};
//! use webstrand::dispatcher::{RequestDispatcher, RouteTable};
//! use webstrand::reactor::EventLoop;
//! use webstrand::server::{EngineService, HttpServer};
//! use webstrand::templates::TemplateCache;
//!
//! let (event_loop, scheduler) = EventLoop::new();
//! event_loop.spawn();
//!
//! let mut table = RouteTable::new();
//! table.route(Method::GET, "/", "index", |_| Box::new(Index));
//!
//! let dispatcher = Arc::new(RequestDispatcher::new(
//!     Arc::new(table),
//!     |_| Box::new(NotFound),
//!     Arc::new(TemplateCache::from_dir("templates")?),
//!     scheduler,
//! ));
//! HttpServer(EngineService::new(dispatcher)).start("127.0.0.1:8070")?.join();
//! ```

pub mod broadcast;
pub mod cli;
pub mod controller;
pub mod controllers;
pub mod dispatcher;
pub mod reactor;
pub mod runtime_config;
pub mod server;
pub mod streamer;
pub mod templates;
pub mod transport;

pub use broadcast::{BroadcastChannel, ListenerId};
pub use controller::{redirect, spawn_controller, Controller, RequestCx};
pub use dispatcher::{RequestDispatcher, RequestId, RouteTable, Router};
pub use reactor::{EventLoop, Scheduler, TaskHandle};
pub use templates::{TemplateCache, ViewContext};
pub use transport::Transport;
