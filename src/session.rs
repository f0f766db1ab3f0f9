//! Trace session: lifecycle, event pipeline, and sink mediation
//!
//! A session wires the pattern filter and record encoder into an observer,
//! injects it into the interception source, and guards every sink-mutating
//! operation with the process/thread affinity captured at construction.

use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::affinity::ProcessAffinity;
use crate::error::Result;
use crate::event::{CallEvent, ObjectId};
use crate::filter::{CallFilter, FilterRules};
use crate::record::{RecordEncoder, HEADER};
use crate::sink::TraceSink;
use crate::source::{CallObserver, CallSource};

/// Lifecycle state of a session. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Constructed, sink open, not tracing
    Open,
    /// Interception active
    Tracing,
    /// Sink released
    Closed,
}

/// The per-event pipeline injected into the interception source:
/// filter, encode, write.
struct TraceObserver {
    filter: CallFilter,
    encoder: RecordEncoder,
    sink: Arc<Mutex<TraceSink>>,
}

impl CallObserver for TraceObserver {
    fn on_call(&mut self, event: &CallEvent) {
        if !self.filter.accepts(event) {
            return;
        }
        let line = self.encoder.encode(event);
        // Write failures cannot propagate through the interception
        // callback; log and drop the record.
        if let Err(err) = lock_sink(&self.sink).write_line(line) {
            tracing::warn!(error = %err, "dropping trace record after sink write failure");
        }
    }
}

fn lock_sink(sink: &Mutex<TraceSink>) -> MutexGuard<'_, TraceSink> {
    sink.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A tracing session over one sink and one interception source.
pub struct TraceSession<S: CallSource> {
    source: S,
    sink: Arc<Mutex<TraceSink>>,
    affinity: ProcessAffinity,
    identity: ObjectId,
    closed: bool,
}

impl<S: CallSource> TraceSession<S> {
    /// Open a log file at `path` and return a session over it. The session
    /// owns the file. Fails on unopenable paths and invalid patterns.
    pub fn to_path(path: impl AsRef<Path>, rules: &FilterRules, source: S) -> Result<Self> {
        Self::over_sink(TraceSink::create(path.as_ref())?, rules, source)
    }

    /// Return a session over a caller-supplied writer. The caller retains
    /// ownership of the underlying resource; the session flushes but never
    /// closes it.
    pub fn to_writer<W>(writer: W, rules: &FilterRules, source: S) -> Result<Self>
    where
        W: Write + Send + 'static,
    {
        Self::over_sink(TraceSink::from_writer(Box::new(writer)), rules, source)
    }

    fn over_sink(mut sink: TraceSink, rules: &FilterRules, mut source: S) -> Result<Self> {
        let identity = ObjectId::next();
        let filter = CallFilter::new(rules, identity)?;
        sink.write_line(&format!("{HEADER}\n"))?;
        let affinity = *sink.affinity();
        let sink = Arc::new(Mutex::new(sink));
        source.install(Box::new(TraceObserver {
            filter,
            encoder: RecordEncoder::new(),
            sink: Arc::clone(&sink),
        }));
        tracing::debug!("trace session opened");
        Ok(Self {
            source,
            sink,
            affinity,
            identity,
            closed: false,
        })
    }

    /// Identity token this session rejects as a receiver, so interception
    /// hooks can stamp events dispatched on the session itself.
    pub fn identity(&self) -> ObjectId {
        self.identity
    }

    /// Begin tracing. Idempotent; ignored on a closed session.
    pub fn start(&mut self) {
        if self.closed {
            tracing::warn!("start ignored: session is closed");
            return;
        }
        self.source.start();
        tracing::debug!("tracing started");
    }

    /// Stop tracing. Idempotent; no-op on a closed session.
    pub fn stop(&mut self) {
        if self.closed {
            return;
        }
        self.source.stop();
        tracing::debug!("tracing stopped");
    }

    /// Run `work` with tracing active. Tracing is stopped on every exit
    /// path; panics and error returns propagate unchanged.
    pub fn trace<T>(&mut self, work: impl FnOnce() -> T) -> T {
        self.start();
        let _guard = StopGuard { session: self };
        work()
    }

    /// Write an out-of-band comment line (`--- <message>`). Owner-only:
    /// from any other process or thread this is a silent no-op. Tracing is
    /// suspended around the write so the write itself is never recorded.
    pub fn mark(&mut self, message: &str) -> Result<()> {
        if self.closed {
            tracing::debug!("mark ignored: session is closed");
            return Ok(());
        }
        if !self.affinity.owns_here() {
            tracing::debug!("mark suppressed outside owning process/thread");
            return Ok(());
        }
        let was_active = self.source.is_active();
        if was_active {
            self.source.stop();
        }
        let result = lock_sink(&self.sink).write_line(&format!("--- {message}\n"));
        if was_active {
            self.source.start();
        }
        result?;
        Ok(())
    }

    /// Stop tracing and release the sink. Owner-only for the sink release:
    /// a forked process or foreign thread only stops tracing and leaves
    /// teardown to the sink's drop guard. Idempotent.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.source.stop();
        if !self.affinity.owns_here() {
            tracing::debug!("close suppressed outside owning process/thread");
            return Ok(());
        }
        lock_sink(&self.sink).close()?;
        self.closed = true;
        tracing::debug!("trace session closed");
        Ok(())
    }

    pub fn state(&self) -> SessionState {
        if self.closed {
            SessionState::Closed
        } else if self.source.is_active() {
            SessionState::Tracing
        } else {
            SessionState::Open
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

/// Stops tracing when dropped, including during unwinding out of `trace`.
struct StopGuard<'a, S: CallSource> {
    session: &'a mut TraceSession<S>,
}

impl<S: CallSource> Drop for StopGuard<'_, S> {
    fn drop(&mut self) {
        self.session.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::ManualSource;
    use std::io;
    use std::panic::{catch_unwind, AssertUnwindSafe};

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl SharedBuf {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn event(receiver: &str, caller: Option<&str>) -> CallEvent {
        CallEvent {
            receiver_class_name: receiver.to_string(),
            caller_class_name: caller.map(str::to_string),
            caller_path: Some("app/models/dog.rb".to_string()),
            caller_lineno: 12,
            method_name: "speak".to_string(),
            caller_method_name: Some("bark".to_string()),
            is_singleton_call: true,
            is_singleton_caller: false,
            receiver_identity: ObjectId::from_raw(9999),
        }
    }

    fn session(
        rules: FilterRules,
    ) -> (TraceSession<ManualSource>, ManualSource, SharedBuf) {
        let buf = SharedBuf::default();
        let source = ManualSource::new();
        let session =
            TraceSession::to_writer(buf.clone(), &rules, source.clone()).unwrap();
        (session, source, buf)
    }

    #[test]
    fn test_new_session_writes_header_and_is_open() {
        let (session, _, buf) = session(FilterRules::default());
        assert_eq!(session.state(), SessionState::Open);
        assert_eq!(buf.contents(), format!("{HEADER}\n"));
    }

    #[test]
    fn test_events_recorded_only_while_tracing() {
        let (mut session, source, buf) = session(FilterRules::default());
        source.emit(&event("Noisemaker", Some("Dog")));

        session.start();
        assert_eq!(session.state(), SessionState::Tracing);
        source.emit(&event("Noisemaker", Some("Dog")));
        session.stop();
        assert_eq!(session.state(), SessionState::Open);

        source.emit(&event("Noisemaker", Some("Dog")));
        let contents = buf.contents();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2); // header + one record
        assert!(lines[1].starts_with("\"Noisemaker\",\"Dog\""));
    }

    #[test]
    fn test_trace_runs_work_and_restores_open() {
        let (mut session, source, buf) = session(FilterRules::default());
        let out = session.trace(|| {
            source.emit(&event("Noisemaker", Some("Dog")));
            17
        });
        assert_eq!(out, 17);
        assert_eq!(session.state(), SessionState::Open);
        assert!(buf.contents().contains("\"Noisemaker\""));
    }

    #[test]
    fn test_trace_stops_on_panic() {
        let (mut session, _, _) = session(FilterRules::default());
        let result = catch_unwind(AssertUnwindSafe(|| {
            session.trace(|| panic!("work failed"));
        }));
        assert!(result.is_err());
        assert_eq!(session.state(), SessionState::Open);
    }

    #[test]
    fn test_filtered_events_are_not_written() {
        let (mut session, source, buf) = session(FilterRules {
            class_whitelist: vec!["^Dog$".to_string()],
            ..Default::default()
        });
        session.trace(|| {
            source.emit(&event("Noisemaker", Some("Dog")));
            source.emit(&event("Noisemaker", Some("Cat")));
        });
        let contents = buf.contents();
        assert_eq!(contents.matches("\"Noisemaker\"").count(), 1);
    }

    #[test]
    fn test_session_rejects_events_on_itself() {
        let (mut session, source, buf) = session(FilterRules::default());
        let mut own = event("TraceSession", Some("Dog"));
        own.receiver_identity = session.identity();
        session.trace(|| source.emit(&own));
        assert_eq!(buf.contents(), format!("{HEADER}\n"));
    }

    #[test]
    fn test_mark_writes_comment_and_restores_tracing() {
        let (mut session, _, buf) = session(FilterRules::default());
        session.start();
        session.mark("checkpoint").unwrap();
        assert_eq!(session.state(), SessionState::Tracing);
        assert!(buf.contents().ends_with("--- checkpoint\n"));
        assert_eq!(buf.contents().matches("---").count(), 1);
    }

    #[test]
    fn test_mark_while_open_stays_open() {
        let (mut session, _, buf) = session(FilterRules::default());
        session.mark("before any tracing").unwrap();
        assert_eq!(session.state(), SessionState::Open);
        assert!(buf.contents().contains("--- before any tracing\n"));
    }

    #[test]
    fn test_close_is_terminal_and_idempotent() {
        let (mut session, source, buf) = session(FilterRules::default());
        session.start();
        session.close().unwrap();
        session.close().unwrap();
        assert_eq!(session.state(), SessionState::Closed);
        assert!(session.is_closed());

        session.start();
        assert_eq!(session.state(), SessionState::Closed);
        source.emit(&event("Noisemaker", Some("Dog")));
        session.mark("late").unwrap();
        assert_eq!(buf.contents(), format!("{HEADER}\n"));
    }

    #[test]
    fn test_invalid_pattern_fails_construction() {
        let result = TraceSession::to_writer(
            SharedBuf::default(),
            &FilterRules {
                class_blacklist: vec!["(bad".to_string()],
                ..Default::default()
            },
            ManualSource::new(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_to_path_fails_for_unopenable_destination() {
        let result = TraceSession::to_path(
            "/nonexistent-dir/trace.log",
            &FilterRules::default(),
            ManualSource::new(),
        );
        assert!(result.is_err());
    }
}
