//! Process and thread affinity for shared sinks
//!
//! A tracing session may be live when the host process forks. The child
//! inherits the sink handle together with any buffered-but-unflushed
//! bytes; if both processes flush, the log corrupts. Sink-mutating
//! operations therefore carry the identity of the process (and, for
//! out-of-band writes and close, the thread) that opened the sink.

use std::thread::{self, ThreadId};

use nix::unistd::{getpid, Pid};

/// Identity of the process and thread that acquired a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessAffinity {
    pid: Pid,
    thread: ThreadId,
}

impl ProcessAffinity {
    /// Capture the calling process and thread.
    pub fn current() -> Self {
        Self {
            pid: getpid(),
            thread: thread::current().id(),
        }
    }

    /// True when called from the recorded process image. False in a fork
    /// child, which must treat the inherited handle as inert.
    pub fn same_process(&self) -> bool {
        getpid() == self.pid
    }

    /// True when called from the recorded process AND thread. Required for
    /// `mark` and `close`.
    pub fn owns_here(&self) -> bool {
        self.same_process() && thread::current().id() == self.thread
    }
}
