//! Buffered [`Transport`] implementation for `may_minihttp` exchanges.

use crate::transport::{DisconnectHook, Transport};
use http::Method;
use may::sync::mpsc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use url::form_urlencoded;

struct ResponseState {
    status: u16,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

/// One HTTP exchange, buffered.
///
/// Writes append to an in-memory body; `finish` signals the parked service
/// coroutine, which then flushes status, headers and body in one go.
/// `may_minihttp` gives no mid-request notification of a dropped peer, so
/// [`HttpTransport::fire_disconnect`] exists for embedders (and tests) that
/// can observe the loss themselves.
pub struct HttpTransport {
    method: Method,
    path: String,
    query: HashMap<String, String>,
    state: Mutex<ResponseState>,
    finished: AtomicBool,
    done_tx: mpsc::Sender<()>,
    hook: Mutex<Option<DisconnectHook>>,
}

impl HttpTransport {
    /// Build a transport from a raw request line path (query string
    /// included). Returns the receiver signalled when `finish` runs.
    #[must_use]
    pub fn new(method: Method, raw_path: &str) -> (Self, mpsc::Receiver<()>) {
        let (path, query) = match raw_path.split_once('?') {
            Some((p, q)) => (
                p.to_string(),
                form_urlencoded::parse(q.as_bytes())
                    .map(|(k, v)| (k.into_owned(), v.into_owned()))
                    .collect(),
            ),
            None => (raw_path.to_string(), HashMap::new()),
        };
        let (done_tx, done_rx) = mpsc::channel();
        let transport = HttpTransport {
            method,
            path,
            query,
            state: Mutex::new(ResponseState {
                status: 200,
                headers: Vec::new(),
                body: Vec::new(),
            }),
            finished: AtomicBool::new(false),
            done_tx,
            hook: Mutex::new(None),
        };
        (transport, done_rx)
    }

    /// Deliver the lost-connection notification. At most the first call
    /// fires the registered hook.
    pub fn fire_disconnect(&self) {
        if let Some(hook) = self.hook.lock().unwrap().take() {
            hook();
        }
    }

    /// Consume the buffered response parts for flushing.
    #[must_use]
    pub fn take_parts(&self) -> (u16, Vec<(String, String)>, Vec<u8>) {
        let mut state = self.state.lock().unwrap();
        let headers = std::mem::take(&mut state.headers);
        let body = std::mem::take(&mut state.body);
        (state.status, headers, body)
    }
}

impl Transport for HttpTransport {
    fn method(&self) -> Method {
        self.method.clone()
    }

    fn path(&self) -> String {
        self.path.clone()
    }

    fn query_args(&self) -> HashMap<String, String> {
        self.query.clone()
    }

    fn write(&self, bytes: &[u8]) {
        if !self.finished.load(Ordering::SeqCst) {
            self.state.lock().unwrap().body.extend_from_slice(bytes);
        }
    }

    fn set_status(&self, status: u16) {
        if !self.finished.load(Ordering::SeqCst) {
            self.state.lock().unwrap().status = status;
        }
    }

    fn set_header(&self, name: &str, value: &str) {
        if self.finished.load(Ordering::SeqCst) {
            return;
        }
        let mut state = self.state.lock().unwrap();
        state.headers.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
        state.headers.push((name.to_string(), value.to_string()));
    }

    fn finish(&self) {
        if !self.finished.swap(true, Ordering::SeqCst) {
            let _ = self.done_tx.send(());
        }
    }

    fn on_disconnect(&self, hook: DisconnectHook) {
        *self.hook.lock().unwrap() = Some(hook);
    }
}
