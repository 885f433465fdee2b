//! `may_minihttp` service adapter.

use super::transport::HttpTransport;
use crate::dispatcher::RequestDispatcher;
use crate::transport::status_reason;
use http::Method;
use may_minihttp::{HttpService, Request, Response};
use std::io;
use std::sync::Arc;
use tracing::warn;

/// Adapts the engine to `may_minihttp`'s request/response service model.
///
/// Each exchange builds an [`HttpTransport`], dispatches it into the engine,
/// and parks the service coroutine until the controller's `finish` fires.
/// Parking a coroutine yields its worker thread, so suspended controllers
/// (timers, broadcast listeners) cost no OS thread while they wait.
#[derive(Clone)]
pub struct EngineService {
    dispatcher: Arc<RequestDispatcher>,
}

impl EngineService {
    #[must_use]
    pub fn new(dispatcher: Arc<RequestDispatcher>) -> Self {
        EngineService { dispatcher }
    }
}

impl HttpService for EngineService {
    fn call(&mut self, req: Request, res: &mut Response) -> io::Result<()> {
        let method = match req.method().parse::<Method>() {
            Ok(m) => m,
            Err(_) => {
                res.status_code(400, status_reason(400));
                res.header("Content-Type: application/json");
                res.body_vec(br#"{"error":"unsupported method"}"#.to_vec());
                return Ok(());
            }
        };

        let (transport, done_rx) = HttpTransport::new(method, req.path());
        let transport = Arc::new(transport);
        let request_id = self.dispatcher.dispatch(Arc::clone(&transport) as Arc<_>);

        // Parked until the controller reaches finish. A closed channel means
        // the engine's loop shut down under us; flush whatever was buffered.
        if done_rx.recv().is_err() {
            warn!(request_id = %request_id, "engine stopped before finish");
        }

        let (status, headers, body) = transport.take_parts();
        res.status_code(status as usize, status_reason(status));
        for (name, value) in headers {
            // may_minihttp takes 'static header lines only.
            let line = format!("{name}: {value}").into_boxed_str();
            res.header(Box::leak(line));
        }
        res.body_vec(body);
        Ok(())
    }
}
