//! Message inspectors and the diagnostic sinks they write to.
//!
//! An inspector sees every request after it is received and every reply
//! before it is sent. It only gets shared references, so it can observe a
//! message but never change it.

use std::io::Write;
use std::sync::Arc;

use tracing::debug;

use crate::config::SinkKind;
use crate::message::Message;

/// Hooks invoked by a dispatch runtime around each operation call.
pub trait MessageInspector: Send + Sync {
    /// Called with the request before the operation runs.
    fn after_receive_request(&self, request: &Message);

    /// Called with the reply before it is written to the client.
    fn before_send_reply(&self, reply: &Message);
}

/// Destination for diagnostic text.
///
/// Writes are synchronous and best-effort: a sink never reports failure.
pub trait DiagnosticSink: Send + Sync {
    fn write(&self, text: &str);
}

/// Writes to the process's standard error.
#[derive(Debug, Default, Clone, Copy)]
pub struct StderrSink;

impl DiagnosticSink for StderrSink {
    fn write(&self, text: &str) {
        let mut stderr = std::io::stderr().lock();
        let _ = stderr.write_all(text.as_bytes());
        let _ = stderr.flush();
    }
}

/// Emits each write as a DEBUG event on the `hello_host::messages` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn write(&self, text: &str) {
        debug!(target: "hello_host::messages", "{text}");
    }
}

/// Build the sink selected in configuration.
pub fn sink_for(kind: SinkKind) -> Arc<dyn DiagnosticSink> {
    match kind {
        SinkKind::Stderr => Arc::new(StderrSink),
        SinkKind::Tracing => Arc::new(TracingSink),
    }
}

/// Dumps the raw text of every request and reply to a diagnostic sink.
///
/// A request is followed by two line terminators; a reply is written bare.
pub struct MessageLogger {
    sink: Arc<dyn DiagnosticSink>,
}

impl MessageLogger {
    pub fn new(sink: Arc<dyn DiagnosticSink>) -> Self {
        Self { sink }
    }
}

impl MessageInspector for MessageLogger {
    fn after_receive_request(&self, request: &Message) {
        self.sink.write(&format!("{request}\n\n"));
    }

    fn before_send_reply(&self, reply: &Message) {
        self.sink.write(&reply.to_string());
    }
}

/// Collects everything written to it. Test helper.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MemorySink {
    buffer: std::sync::Mutex<String>,
}

#[cfg(test)]
impl MemorySink {
    pub fn contents(&self) -> String {
        self.buffer.lock().unwrap().clone()
    }
}

#[cfg(test)]
impl DiagnosticSink for MemorySink {
    fn write(&self, text: &str) {
        self.buffer.lock().unwrap().push_str(text);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn logger() -> (Arc<MemorySink>, MessageLogger) {
        let sink = Arc::new(MemorySink::default());
        let logger = MessageLogger::new(sink.clone());
        (sink, logger)
    }

    #[test]
    fn test_request_followed_by_blank_lines() {
        let (sink, logger) = logger();
        // The raw text of a message is its wire line, verb included
        let request = Message::request("Hello", Some("REQ1".to_string()));
        let before = request.clone();

        logger.after_receive_request(&request);

        assert_eq!(sink.contents(), "HELLO REQ1\n\n");
        assert_eq!(request, before);
    }

    #[test]
    fn test_reply_has_no_trailing_separator() {
        let (sink, logger) = logger();
        // Raw reply text carries the REPLY verb in front of the greeting
        let reply = Message::reply("Hello", "RESP1".to_string());
        let before = reply.clone();

        logger.before_send_reply(&reply);

        assert_eq!(sink.contents(), "REPLY RESP1");
        assert_eq!(reply, before);
    }

    #[test]
    fn test_exchange_order() {
        let (sink, logger) = logger();
        logger.after_receive_request(&Message::request("Hello", None));
        logger.before_send_reply(&Message::reply("Hello", "Hello, World!".to_string()));

        assert_eq!(sink.contents(), "HELLO\n\nREPLY Hello, World!");
    }

    #[test]
    fn test_logger_is_stateless() {
        let (sink, logger) = logger();
        let request = Message::request("Hello", Some("a".to_string()));
        logger.after_receive_request(&request);
        logger.after_receive_request(&request);

        assert_eq!(sink.contents(), "HELLO a\n\nHELLO a\n\n");
    }

    #[test]
    fn test_configured_sinks_accept_writes() {
        // Neither sink can fail; make sure both are constructible and callable.
        sink_for(SinkKind::Stderr).write("");
        sink_for(SinkKind::Tracing).write("diagnostic");
    }
}
