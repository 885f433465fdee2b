//! Shared test scaffolding: an in-memory transport and an engine harness.

// Not every test binary uses every helper.
#![allow(dead_code)]

use http::Method;
use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};
use webstrand::reactor::{EventLoop, Scheduler};
use webstrand::transport::{DisconnectHook, Transport};

/// Initializes tracing once per test binary, mirroring the production
/// subscriber setup.
pub struct TestTracing;

impl TestTracing {
    pub fn init() -> Self {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("debug")
            .with_test_writer()
            .try_init();
        TestTracing
    }
}

/// Collects formatted log output so tests can assert on emitted events.
///
/// Use with a thread-scoped subscriber and an unspawned event loop driven on
/// the test thread, so every engine log lands in the capture.
#[derive(Clone, Default)]
pub struct LogCapture {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl LogCapture {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.buf.lock().unwrap()).into_owned()
    }

    pub fn error_count(&self) -> usize {
        self.contents()
            .lines()
            .filter(|line| line.contains("ERROR"))
            .count()
    }
}

impl std::io::Write for LogCapture {
    fn write(&mut self, bytes: &[u8]) -> std::io::Result<usize> {
        self.buf.lock().unwrap().extend_from_slice(bytes);
        Ok(bytes.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for LogCapture {
    type Writer = LogCapture;

    fn make_writer(&'a self) -> LogCapture {
        self.clone()
    }
}

/// Start a fresh event loop on a background coroutine.
pub fn start_engine() -> Scheduler {
    may::config().set_stack_size(0x8000);
    let (event_loop, scheduler) = EventLoop::new();
    event_loop.spawn();
    scheduler
}

/// Poll `cond` until it holds or `timeout` elapses.
pub fn wait_until(timeout: Duration, cond: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    cond()
}

#[derive(Default)]
struct MockState {
    status: u16,
    headers: Vec<(String, String)>,
    writes: Vec<Vec<u8>>,
    finish_calls: usize,
    hook: Option<DisconnectHook>,
}

/// Records everything the engine does to one exchange.
pub struct MockTransport {
    method: Method,
    path: String,
    query: HashMap<String, String>,
    state: Mutex<MockState>,
    finished: Condvar,
}

impl MockTransport {
    pub fn get(path: &str) -> Arc<Self> {
        let (path, query) = match path.split_once('?') {
            Some((p, q)) => (
                p.to_string(),
                q.split('&')
                    .filter_map(|pair| {
                        let (k, v) = pair.split_once('=')?;
                        Some((k.to_string(), v.to_string()))
                    })
                    .collect(),
            ),
            None => (path.to_string(), HashMap::new()),
        };
        Arc::new(MockTransport {
            method: Method::GET,
            path,
            query,
            state: Mutex::new(MockState::default()),
            finished: Condvar::new(),
        })
    }

    pub fn status(&self) -> u16 {
        self.state.lock().unwrap().status
    }

    pub fn header(&self, name: &str) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.clone())
    }

    pub fn write_sizes(&self) -> Vec<usize> {
        self.state
            .lock()
            .unwrap()
            .writes
            .iter()
            .map(Vec::len)
            .collect()
    }

    pub fn write_count(&self) -> usize {
        self.state.lock().unwrap().writes.len()
    }

    pub fn body(&self) -> Vec<u8> {
        self.state.lock().unwrap().writes.concat()
    }

    pub fn finish_calls(&self) -> usize {
        self.state.lock().unwrap().finish_calls
    }

    pub fn is_finished(&self) -> bool {
        self.finish_calls() > 0
    }

    /// Deliver the lost-connection notification, like a transport would.
    pub fn fire_disconnect(&self) {
        let hook = self.state.lock().unwrap().hook.take();
        if let Some(hook) = hook {
            hook();
        }
    }

    /// Block until `finish` has been called or `timeout` elapses.
    pub fn wait_finished(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock().unwrap();
        while state.finish_calls == 0 {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (next, _) = self
                .finished
                .wait_timeout(state, deadline - now)
                .unwrap();
            state = next;
        }
        true
    }
}

impl Transport for MockTransport {
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
        self.state.lock().unwrap().writes.push(bytes.to_vec());
    }

    fn set_status(&self, status: u16) {
        self.state.lock().unwrap().status = status;
    }

    fn set_header(&self, name: &str, value: &str) {
        let mut state = self.state.lock().unwrap();
        state.headers.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
        state.headers.push((name.to_string(), value.to_string()));
    }

    fn finish(&self) {
        self.state.lock().unwrap().finish_calls += 1;
        self.finished.notify_all();
    }

    fn on_disconnect(&self, hook: DisconnectHook) {
        self.state.lock().unwrap().hook = Some(hook);
    }
}
