//! # Dispatcher Module
//!
//! Entry point of a request's lifecycle: resolve a controller through the
//! external router, instantiate it, and hand it to the lifecycle engine.
//!
//! Routing itself is a collaborator, not a concern of this crate: anything
//! implementing [`Router`] can resolve a `(method, path)` pair to a
//! controller factory. The bundled [`RouteTable`] is a flat exact-match
//! table — enough to wire an application or a test without pulling in a
//! pattern matcher. A miss is not an error; it falls back to the configured
//! not-found controller, which is expected to set its own 404.

use crate::controller::{spawn_controller, Controller, RequestCx};
use crate::reactor::Scheduler;
use crate::templates::TemplateCache;
use crate::transport::Transport;
use http::Method;
use smallvec::SmallVec;
use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use tracing::{debug, info};

/// Strongly typed request identifier backed by ULID, used to correlate log
/// lines across lifecycle steps.
#[derive(Clone, Copy, Eq, PartialEq, Hash, Debug)]
pub struct RequestId(ulid::Ulid);

impl RequestId {
    #[must_use]
    pub fn new() -> Self {
        Self(ulid::Ulid::new())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for RequestId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

/// Stack-allocated path parameters; most routes carry at most a few.
pub type ParamVec = SmallVec<[(Arc<str>, String); 4]>;

/// Constructs a fresh controller for one request.
pub type ControllerFactory = Arc<dyn Fn(&ParamVec) -> Box<dyn Controller> + Send + Sync>;

/// A resolved route: who handles the request, and with which parameters.
#[derive(Clone)]
pub struct RouteMatch {
    pub handler_name: Arc<str>,
    pub factory: ControllerFactory,
    pub path_params: ParamVec,
}

/// External routing boundary.
pub trait Router: Send + Sync {
    fn resolve(&self, method: &Method, path: &str) -> Option<RouteMatch>;
}

/// Flat exact-match route table.
#[derive(Default)]
pub struct RouteTable {
    routes: HashMap<(Method, String), (Arc<str>, ControllerFactory)>,
}

impl RouteTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `factory` for an exact `(method, path)` pair. Registering
    /// the same pair again replaces the previous entry.
    pub fn route<F>(&mut self, method: Method, path: &str, handler_name: &str, factory: F)
    where
        F: Fn(&ParamVec) -> Box<dyn Controller> + Send + Sync + 'static,
    {
        self.routes.insert(
            (method, path.to_string()),
            (Arc::from(handler_name), Arc::new(factory)),
        );
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl Router for RouteTable {
    fn resolve(&self, method: &Method, path: &str) -> Option<RouteMatch> {
        self.routes
            .get(&(method.clone(), path.to_string()))
            .map(|(name, factory)| RouteMatch {
                handler_name: Arc::clone(name),
                factory: Arc::clone(factory),
                path_params: ParamVec::new(),
            })
    }
}

/// Wires one inbound request to a controller lifecycle.
pub struct RequestDispatcher {
    router: Arc<dyn Router>,
    not_found_name: Arc<str>,
    not_found: ControllerFactory,
    templates: Arc<TemplateCache>,
    scheduler: Scheduler,
}

impl RequestDispatcher {
    /// Build a dispatcher around an external router and a not-found
    /// fallback factory.
    pub fn new<F>(
        router: Arc<dyn Router>,
        not_found: F,
        templates: Arc<TemplateCache>,
        scheduler: Scheduler,
    ) -> Self
    where
        F: Fn(&ParamVec) -> Box<dyn Controller> + Send + Sync + 'static,
    {
        RequestDispatcher {
            router,
            not_found_name: Arc::from("not_found"),
            not_found: Arc::new(not_found),
            templates,
            scheduler,
        }
    }

    /// Dispatch a parsed request delivered by the transport.
    ///
    /// Sets the default status and content type, resolves a controller
    /// (falling back to the not-found factory on a miss), wires the
    /// disconnect hook, and schedules the controller's `init` as a deferred
    /// step. Returns the request id assigned for log correlation.
    pub fn dispatch(&self, transport: Arc<dyn Transport>) -> RequestId {
        let request_id = RequestId::new();
        transport.set_status(200);
        transport.set_header("Content-Type", "text/html; charset=UTF-8");

        let method = transport.method();
        let path = transport.path();

        let (handler_name, factory, path_params) = match self.router.resolve(&method, &path) {
            Some(m) => (m.handler_name, m.factory, m.path_params),
            None => {
                debug!(
                    request_id = %request_id,
                    method = %method,
                    path = %path,
                    "no route matched, using not-found handler"
                );
                (
                    Arc::clone(&self.not_found_name),
                    Arc::clone(&self.not_found),
                    ParamVec::new(),
                )
            }
        };

        info!(
            request_id = %request_id,
            method = %method,
            path = %path,
            handler_name = %handler_name,
            "request dispatched"
        );

        let controller = factory(&path_params);
        let cx = RequestCx::new(
            request_id,
            handler_name,
            transport,
            Arc::clone(&self.templates),
            self.scheduler.clone(),
        );
        spawn_controller(controller, cx);
        request_id
    }
}
