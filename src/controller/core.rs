//! # Controller Lifecycle Engine
//!
//! Drives one request's handler through
//! `Created → Initializing → {Active, Suspended}* → Finishing → Finished`,
//! with a terminal `Disconnected` reachable from any non-finished state.
//!
//! ## Overview
//!
//! A [`Controller`] is ephemeral: one is instantiated per request by the
//! dispatcher and becomes eligible for reclamation once `finish` completes or
//! the connection is lost. Its `init` entry point is never called
//! synchronously during construction — the engine schedules it as a deferred
//! step, so constructing many controllers never re-enters the caller's stack
//! and the disconnect hook is always wired before any handler logic runs.
//!
//! ## Suspension
//!
//! A handler suspends by scheduling further steps through
//! [`RequestCx::defer`] and [`RequestCx::call_later`]. The engine does not
//! track those steps beyond their cancel handles; it trusts the handler to
//! eventually call [`RequestCx::finish`] or to be cancelled by a disconnect.
//!
//! ## Failure containment
//!
//! An `Err` returned from `init` or from any deferred step is caught at the
//! deferral boundary and routed to [`RequestCx::server_error`]: logged with
//! the handler's name, surfaced to the client as a 500 (plus the configured
//! error template, if any), and finished. A panic inside a step is caught at
//! the same boundary and converted to the same 500 path. Every request
//! therefore reaches finished or disconnected; nothing escapes to crash the
//! loop.

use crate::dispatcher::RequestId;
use crate::reactor::{Scheduler, TaskHandle};
use crate::templates::{TemplateCache, ViewContext};
use crate::transport::Transport;
use anyhow::Result;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, error};

/// Per-request processing contract.
///
/// Implemented by independent handler variants selected by the router;
/// shared behaviors (static serving, redirect) are free functions over
/// [`RequestCx`], not inherited base-class logic.
pub trait Controller: Send + 'static {
    /// Main entry point. Runs as a deferred step on the event loop.
    ///
    /// May register timers or chained steps instead of finishing directly;
    /// an `Err` is routed to [`RequestCx::server_error`].
    fn init(&mut self, cx: &RequestCx) -> Result<()>;

    /// Called once on any lost connection. Override point for cleanup such
    /// as deregistering from a broadcast channel.
    fn on_disconnect(&mut self, _cx: &RequestCx) {}

    /// Template rendered instead of the configured one when a step fails.
    fn error_template(&self) -> Option<&str> {
        None
    }
}

struct CxInner {
    request_id: RequestId,
    handler_name: Arc<str>,
    transport: Arc<dyn Transport>,
    templates: Arc<TemplateCache>,
    scheduler: Scheduler,
    // Idempotence guard: set to false exactly once, by finish or disconnect.
    resumable: AtomicBool,
    view: Mutex<ViewContext>,
    template: Mutex<Option<String>>,
    error_template: Mutex<Option<String>>,
    pending: Mutex<Vec<TaskHandle>>,
}

/// Shared per-request context handed to every lifecycle step.
///
/// Cheap to clone; all clones refer to the same request.
#[derive(Clone)]
pub struct RequestCx {
    inner: Arc<CxInner>,
}

impl RequestCx {
    pub(crate) fn new(
        request_id: RequestId,
        handler_name: Arc<str>,
        transport: Arc<dyn Transport>,
        templates: Arc<TemplateCache>,
        scheduler: Scheduler,
    ) -> Self {
        RequestCx {
            inner: Arc::new(CxInner {
                request_id,
                handler_name,
                transport,
                templates,
                scheduler,
                resumable: AtomicBool::new(true),
                view: Mutex::new(ViewContext::new()),
                template: Mutex::new(None),
                error_template: Mutex::new(None),
                pending: Mutex::new(Vec::new()),
            }),
        }
    }

    #[must_use]
    pub fn request_id(&self) -> RequestId {
        self.inner.request_id
    }

    #[must_use]
    pub fn handler_name(&self) -> &str {
        &self.inner.handler_name
    }

    #[must_use]
    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.inner.transport
    }

    #[must_use]
    pub fn scheduler(&self) -> &Scheduler {
        &self.inner.scheduler
    }

    /// Whether lifecycle callbacks still execute effects. Flipped to false
    /// by the first of `finish` or disconnect.
    #[must_use]
    pub fn is_resumable(&self) -> bool {
        self.inner.resumable.load(Ordering::SeqCst)
    }

    /// Append body bytes. Dropped silently once the request is no longer
    /// resumable, so no write ever reaches a dead transport.
    pub fn write(&self, bytes: &[u8]) {
        if self.is_resumable() {
            self.inner.transport.write(bytes);
        }
    }

    /// Set the response status. Like [`RequestCx::write`], a no-op once the
    /// request is no longer resumable.
    pub fn set_status(&self, status: u16) {
        if self.is_resumable() {
            self.inner.transport.set_status(status);
        }
    }

    /// Set or replace a response header. Same resumable guard as
    /// [`RequestCx::write`].
    pub fn set_header(&self, name: &str, value: &str) {
        if self.is_resumable() {
            self.inner.transport.set_header(name, value);
        }
    }

    /// Put a value into the request's view model.
    pub fn set_view(&self, key: impl Into<String>, value: Value) {
        self.inner.view.lock().unwrap().insert(key, value);
    }

    /// Select the template `finish` will render.
    pub fn set_template(&self, name: impl Into<String>) {
        *self.inner.template.lock().unwrap() = Some(name.into());
    }

    pub(crate) fn set_error_template(&self, name: &str) {
        *self.inner.error_template.lock().unwrap() = Some(name.to_string());
    }

    /// Schedule a lifecycle step for the next loop turn.
    ///
    /// The step is skipped once the request is no longer resumable, its
    /// `Err` return is routed to [`RequestCx::server_error`], and its cancel
    /// handle is kept so a disconnect can drop it while still pending.
    pub fn defer<F>(&self, f: F) -> TaskHandle
    where
        F: FnOnce(&RequestCx) -> Result<()> + Send + 'static,
    {
        self.schedule_step(None, f)
    }

    /// Schedule a lifecycle step to run no earlier than `delay` from now.
    pub fn call_later<F>(&self, delay: Duration, f: F) -> TaskHandle
    where
        F: FnOnce(&RequestCx) -> Result<()> + Send + 'static,
    {
        self.schedule_step(Some(delay), f)
    }

    fn schedule_step<F>(&self, delay: Option<Duration>, f: F) -> TaskHandle
    where
        F: FnOnce(&RequestCx) -> Result<()> + Send + 'static,
    {
        let cx = self.clone();
        let step = move || {
            if !cx.is_resumable() {
                return;
            }
            // A panicking handler must not unwind the shared loop; it is
            // caught here and converted to the same 500 path as an Err.
            match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| f(&cx))) {
                Ok(Ok(())) => {}
                Ok(Err(err)) => cx.server_error(&err),
                Err(panic) => {
                    let panic_message = panic_payload_message(panic.as_ref());
                    cx.server_error(&anyhow::anyhow!("handler panicked: {panic_message}"));
                }
            }
        };
        let handle = match delay {
            Some(d) => self.inner.scheduler.call_later(d, step),
            None => self.inner.scheduler.call_soon(step),
        };
        let mut pending = self.inner.pending.lock().unwrap();
        pending.retain(TaskHandle::is_live);
        pending.push(handle.clone());
        handle
    }

    /// Close up the request. Idempotent: only the first call performs
    /// effects.
    ///
    /// If a template was selected, its artifact is looked up (compiling and
    /// caching on first use), rendered against the owned view, and written;
    /// otherwise the handler is assumed to have written its own bytes.
    /// Either way the transport's response stream is closed.
    pub fn finish(&self) {
        if !self.inner.resumable.swap(false, Ordering::SeqCst) {
            return;
        }
        let template = self.inner.template.lock().unwrap().clone();
        if let Some(name) = template {
            let view = self.inner.view.lock().unwrap();
            match self.inner.templates.render(&name, &view) {
                Ok(bytes) => self.inner.transport.write(&bytes),
                Err(err) => {
                    // Too late for the errback path; close with a 500 and an
                    // empty body.
                    error!(
                        request_id = %self.inner.request_id,
                        handler_name = %self.inner.handler_name,
                        template = %name,
                        error = %err,
                        "template render failed during finish"
                    );
                    self.inner.transport.set_status(500);
                }
            }
        }
        self.inner.transport.finish();
        debug!(
            request_id = %self.inner.request_id,
            handler_name = %self.inner.handler_name,
            "request finished"
        );
    }

    /// Recovery point for a failed `init` or deferred step.
    ///
    /// Logs the failure, switches to the configured error template if one is
    /// set, marks the response as an internal error, and finishes.
    pub fn server_error(&self, err: &anyhow::Error) {
        error!(
            request_id = %self.inner.request_id,
            handler_name = %self.inner.handler_name,
            error = %err,
            "controller step failed"
        );
        let error_template = self.inner.error_template.lock().unwrap().clone();
        if let Some(name) = error_template {
            *self.inner.template.lock().unwrap() = Some(name);
        }
        self.inner.transport.set_status(500);
        self.finish();
    }

    /// Lost-connection transition. Delivered at most once by the transport;
    /// the swap makes any second delivery a no-op.
    fn handle_disconnect(&self, ctrl: &Arc<Mutex<Box<dyn Controller>>>) {
        if !self.inner.resumable.swap(false, Ordering::SeqCst) {
            return;
        }
        let pending = std::mem::take(&mut *self.inner.pending.lock().unwrap());
        for handle in pending {
            handle.cancel();
        }
        debug!(
            request_id = %self.inner.request_id,
            handler_name = %self.inner.handler_name,
            "connection lost, controller disabled"
        );
        // Cleanup still runs on the loop so it stays ordered with other
        // scheduled steps. Not routed through defer: resumable is already
        // false and this callback must run regardless.
        let cx = self.clone();
        let ctrl = Arc::clone(ctrl);
        self.inner.scheduler.call_soon(move || {
            ctrl.lock().unwrap().on_disconnect(&cx);
        });
    }
}

fn panic_payload_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Wire a freshly constructed controller into the engine.
///
/// Registers the disconnect hook first, then schedules `init` as a deferred
/// step on the event loop.
pub fn spawn_controller(ctrl: Box<dyn Controller>, cx: RequestCx) {
    if let Some(name) = ctrl.error_template() {
        cx.set_error_template(name);
    }
    let ctrl = Arc::new(Mutex::new(ctrl));

    let hook_cx = cx.clone();
    let hook_ctrl = Arc::clone(&ctrl);
    cx.inner
        .transport
        .on_disconnect(Box::new(move || hook_cx.handle_disconnect(&hook_ctrl)));

    cx.defer(move |cx| ctrl.lock().unwrap().init(cx));
}

/// Redirect helper: 307 + `Location`, then finish.
pub fn redirect(cx: &RequestCx, location: &str) {
    cx.set_status(307);
    cx.set_header("Location", location);
    cx.finish();
}
