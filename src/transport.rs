//! Transport boundary.
//!
//! The engine never owns the connection; it talks to it through the
//! [`Transport`] trait. The real implementation lives in
//! [`crate::server::HttpTransport`]; tests use an in-memory mock. Writes are
//! assumed to append to an outbound buffer that the transport flushes on its
//! own schedule.

use http::Method;
use std::collections::HashMap;

/// One-shot callback fired when the peer drops the connection.
pub type DisconnectHook = Box<dyn FnOnce() + Send + 'static>;

/// Non-owning handle to one HTTP exchange.
///
/// The engine holds a reference for the lifetime of the request. Disconnect
/// notification is delivered at most once; registering a second hook
/// replaces any unfired one.
pub trait Transport: Send + Sync + 'static {
    /// Request method.
    fn method(&self) -> Method;

    /// Request path without the query string.
    fn path(&self) -> String;

    /// Parsed query string arguments.
    fn query_args(&self) -> HashMap<String, String>;

    /// Append bytes to the outbound response body.
    fn write(&self, bytes: &[u8]);

    /// Set the response status code. Has no effect once the response is
    /// finished.
    fn set_status(&self, status: u16);

    /// Set or replace a response header.
    fn set_header(&self, name: &str, value: &str);

    /// Close the response stream. Further writes are discarded.
    fn finish(&self);

    /// Register the lost-connection callback.
    fn on_disconnect(&self, hook: DisconnectHook);
}

/// Reason phrase for the status codes the engine emits itself.
#[must_use]
pub fn status_reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        307 => "Temporary Redirect",
        400 => "Bad Request",
        401 => "Unauthorized",
        404 => "Not Found",
        500 => "Internal Server Error",
        _ => "OK",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_reason() {
        assert_eq!(status_reason(200), "OK");
        assert_eq!(status_reason(404), "Not Found");
        assert_eq!(status_reason(500), "Internal Server Error");
        assert_eq!(status_reason(599), "OK");
    }
}
