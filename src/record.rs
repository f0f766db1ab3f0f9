//! Line encoding for accepted call events
//!
//! One event becomes one newline-terminated line of eight comma-separated
//! fields. String fields are double-quoted with embedded quotes doubled;
//! the line number stays bare. Embedded newlines pass through verbatim,
//! a known limitation of the format.

use crate::event::{CallEvent, MethodLevel};

/// Column header, written once per session before any records.
pub const HEADER: &str =
    "entity,caller_entity,filepath,lineno,method_name,method_level,caller_method_name,caller_method_level";

/// Rendering of caller fields the interception source could not resolve.
pub const UNKNOWN: &str = "<unknown>";

/// Quote a field into `buf`, doubling embedded quotes.
fn escape_into(buf: &mut String, field: &str) {
    buf.push('"');
    for ch in field.chars() {
        if ch == '"' {
            buf.push('"');
        }
        buf.push(ch);
    }
    buf.push('"');
}

/// Encodes call events into log lines.
///
/// This sits on the hot path, invoked once per matched call. The scratch
/// buffer is reused across invocations so encoding stays allocation-free
/// once the buffer has grown to line size; the contract is still pure
/// (same event, same line).
#[derive(Debug, Default)]
pub struct RecordEncoder {
    buf: String,
}

impl RecordEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Encode one event. The returned line borrows the internal buffer and
    /// is valid until the next call.
    pub fn encode(&mut self, event: &CallEvent) -> &str {
        self.buf.clear();
        escape_into(&mut self.buf, &event.receiver_class_name);
        self.buf.push(',');
        escape_into(
            &mut self.buf,
            event.caller_class_name.as_deref().unwrap_or(UNKNOWN),
        );
        self.buf.push(',');
        escape_into(&mut self.buf, event.caller_path.as_deref().unwrap_or(""));
        self.buf.push(',');
        self.buf.push_str(&event.caller_lineno.to_string());
        self.buf.push(',');
        escape_into(&mut self.buf, &event.method_name);
        self.buf.push(',');
        escape_into(&mut self.buf, event.method_level().as_str());
        self.buf.push(',');
        escape_into(
            &mut self.buf,
            event.caller_method_name.as_deref().unwrap_or(UNKNOWN),
        );
        self.buf.push(',');
        escape_into(
            &mut self.buf,
            event
                .caller_method_level()
                .map(MethodLevel::as_str)
                .unwrap_or(UNKNOWN),
        );
        self.buf.push('\n');
        &self.buf
    }
}
