//! # Static Streamer Module
//!
//! Chunked draining of a finite byte source to one response.
//!
//! The loop never blocks the event loop on I/O: each chunk is read and
//! written inside its own deferred step, and the next step is rescheduled
//! with zero delay. That cooperative yield between chunks is the
//! backpressure mechanism — no single request can monopolize the loop while
//! streaming a large file.
//!
//! Failure handling follows the split in the engine's error taxonomy: a
//! source that cannot be opened surfaces as a 404 (headers are not out yet),
//! while a read error mid-stream only truncates the body and logs the path,
//! because the status line has already been sent.

use crate::controller::RequestCx;
use crate::runtime_config::RuntimeConfig;
use anyhow::Result;
use std::fs::File;
use std::io::Read;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, error};

struct StreamSession {
    file: File,
    path: PathBuf,
    chunk_size: usize,
}

/// Stream the file at `path` to the response using the configured
/// (`STRAND_CHUNK_SIZE`) chunk size.
pub fn serve_file(cx: &RequestCx, path: impl Into<PathBuf>) {
    serve_file_chunked(cx, path, RuntimeConfig::from_env().chunk_size);
}

/// Stream the file at `path` to the response in `chunk_size` reads.
///
/// For a source of length `L` this produces exactly `ceil(L / chunk_size)`
/// writes whose concatenation is the source, then finishes the request. On
/// disconnect the pending step is cancelled and the source handle dropped.
pub fn serve_file_chunked(cx: &RequestCx, path: impl Into<PathBuf>, chunk_size: usize) {
    let path = path.into();
    match File::open(&path) {
        Ok(file) => {
            cx.set_header("Content-Type", content_type(&path));
            debug!(path = %path.display(), chunk_size, "static stream started");
            let session = StreamSession {
                file,
                path,
                chunk_size,
            };
            cx.defer(move |cx| stream_chunk(cx, session));
        }
        Err(err) => {
            error!(
                path = %path.display(),
                error = %err,
                "failed to open static source"
            );
            cx.set_status(404);
            cx.finish();
        }
    }
}

fn stream_chunk(cx: &RequestCx, mut session: StreamSession) -> Result<()> {
    let mut buf = vec![0u8; session.chunk_size];
    let n = match read_chunk(&mut session.file, &mut buf) {
        Ok(n) => n,
        Err(err) => {
            // Headers are already out; all we can do is truncate and log.
            error!(
                path = %session.path.display(),
                error = %err,
                "read failed mid-stream, response truncated"
            );
            cx.finish();
            return Ok(());
        }
    };
    if n > 0 {
        cx.write(&buf[..n]);
    }
    if n < session.chunk_size {
        // Source exhausted; the handle closes on drop.
        cx.finish();
    } else {
        cx.defer(move |cx| stream_chunk(cx, session));
    }
    Ok(())
}

/// Fill `buf` from `src`, stopping early only at end of file.
fn read_chunk(src: &mut impl Read, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match src.read(&mut buf[filled..])? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(filled)
}

/// Map a URL path to a file under `base`, rejecting traversal components.
#[must_use]
pub fn resolve_under(base: &Path, url_path: &str) -> Option<PathBuf> {
    let mut resolved = base.to_path_buf();
    for comp in Path::new(url_path.trim_start_matches('/')).components() {
        match comp {
            Component::Normal(s) => resolved.push(s),
            Component::CurDir => {}
            _ => return None,
        }
    }
    Some(resolved)
}

fn content_type(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or("")
        .to_lowercase()
        .as_str()
    {
        "html" => "text/html",
        "css" => "text/css",
        "js" => "application/javascript",
        "json" => "application/json",
        "txt" => "text/plain",
        "mp3" => "audio/mpeg",
        _ => "application/octet-stream",
    }
}
