//! Demo controllers wired by the `webstrand` binary.
//!
//! Each one is an independent [`Controller`] variant selected by the router;
//! shared behaviors (static serving, redirect) come from free functions, not
//! a base class.

use crate::broadcast::{BroadcastChannel, ListenerId};
use crate::controller::{redirect, Controller, RequestCx};
use crate::dispatcher::ParamVec;
use crate::streamer;
use anyhow::{anyhow, Context, Result};
use serde_json::json;
use std::path::PathBuf;
use std::time::Duration;

/// Fallback for unmatched routes.
pub struct NotFound;

impl Controller for NotFound {
    fn init(&mut self, cx: &RequestCx) -> Result<()> {
        cx.set_status(404);
        cx.write(b"page not found. [404]");
        cx.finish();
        Ok(())
    }
}

/// Renders the index template.
pub struct Index;

impl Controller for Index {
    fn init(&mut self, cx: &RequestCx) -> Result<()> {
        cx.set_template("index.html");
        cx.finish();
        Ok(())
    }
}

/// Suspends for `num_seconds` (query argument), then renders a report.
///
/// Demonstrates the suspend/resume path: `init` returns without finishing
/// and a timer step completes the request later.
pub struct Report;

impl Controller for Report {
    fn init(&mut self, cx: &RequestCx) -> Result<()> {
        let args = cx.transport().query_args();
        let seconds: u64 = args
            .get("num_seconds")
            .map(|s| s.parse())
            .transpose()
            .context("num_seconds must be an integer")?
            .unwrap_or(1);
        cx.set_view("path", json!(cx.transport().path()));
        cx.set_view("seconds", json!(seconds));
        cx.call_later(Duration::from_secs(seconds), |cx| {
            cx.set_template("report.html");
            cx.finish();
            Ok(())
        });
        Ok(())
    }
}

/// Like [`Report`], but the delay comes from a `num_seconds` path parameter
/// supplied by the router.
///
/// The raw value is kept as resolved and parsed in `init`, so a bad
/// parameter takes the errback path instead of failing construction.
pub struct ParamReport {
    raw_seconds: Option<String>,
}

impl ParamReport {
    #[must_use]
    pub fn from_params(params: &ParamVec) -> Self {
        ParamReport {
            raw_seconds: params
                .iter()
                .find(|(name, _)| &**name == "num_seconds")
                .map(|(_, value)| value.clone()),
        }
    }
}

impl Controller for ParamReport {
    fn init(&mut self, cx: &RequestCx) -> Result<()> {
        let seconds: u64 = self
            .raw_seconds
            .as_deref()
            .context("missing num_seconds path parameter")?
            .parse()
            .context("num_seconds must be an integer")?;
        cx.set_view("path", json!(cx.transport().path()));
        cx.set_view("seconds", json!(seconds));
        cx.call_later(Duration::from_secs(seconds), |cx| {
            cx.set_template("report.html");
            cx.finish();
            Ok(())
        });
        Ok(())
    }
}

/// Temporary redirect back to the index.
pub struct RedirectHome;

impl Controller for RedirectHome {
    fn init(&mut self, cx: &RequestCx) -> Result<()> {
        redirect(cx, "/");
        Ok(())
    }
}

/// Streams one file from disk in chunks.
pub struct StaticAsset {
    path: PathBuf,
}

impl StaticAsset {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        StaticAsset { path: path.into() }
    }
}

impl Controller for StaticAsset {
    fn init(&mut self, cx: &RequestCx) -> Result<()> {
        streamer::serve_file(cx, self.path.clone());
        Ok(())
    }
}

/// Attaches the request to a live broadcast until the producer completes or
/// the client goes away.
pub struct LiveStream {
    channel: BroadcastChannel,
    listener: Option<ListenerId>,
}

impl LiveStream {
    #[must_use]
    pub fn new(channel: BroadcastChannel) -> Self {
        LiveStream {
            channel,
            listener: None,
        }
    }
}

impl Controller for LiveStream {
    fn init(&mut self, cx: &RequestCx) -> Result<()> {
        cx.set_header("Content-Type", "application/octet-stream");
        cx.set_header("Cache-Control", "no-cache");
        self.listener = Some(self.channel.subscribe(cx));
        Ok(())
    }

    fn on_disconnect(&mut self, _cx: &RequestCx) {
        if let Some(id) = self.listener.take() {
            self.channel.unsubscribe(id);
        }
    }
}

/// Fails on purpose; exercises the internal-error recovery path.
pub struct Faulty;

impl Controller for Faulty {
    fn init(&mut self, _cx: &RequestCx) -> Result<()> {
        Err(anyhow!("some error happened here"))
    }
}
