//! Affinity-guarded destination for trace output
//!
//! A sink either owns a buffered file it opened from a path, or wraps a
//! writer supplied by the caller. Owned files are closed by the sink;
//! borrowed writers are only ever flushed. All mutation is suppressed
//! outside the process that opened the sink.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::affinity::ProcessAffinity;

enum SinkDest {
    File {
        writer: BufWriter<File>,
        path: PathBuf,
    },
    Stream(Box<dyn Write + Send>),
}

/// Destination stream for serialized trace records.
pub struct TraceSink {
    dest: Option<SinkDest>,
    affinity: ProcessAffinity,
}

impl TraceSink {
    /// Open (create or truncate) a log file. The sink owns the file and
    /// will close it.
    pub fn create(path: &Path) -> io::Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            dest: Some(SinkDest::File {
                writer: BufWriter::new(file),
                path: path.to_path_buf(),
            }),
            affinity: ProcessAffinity::current(),
        })
    }

    /// Wrap a caller-supplied writer. The caller retains ownership of the
    /// underlying resource; the sink flushes but never closes it.
    pub fn from_writer(writer: Box<dyn Write + Send>) -> Self {
        Self {
            dest: Some(SinkDest::Stream(writer)),
            affinity: ProcessAffinity::current(),
        }
    }

    pub fn affinity(&self) -> &ProcessAffinity {
        &self.affinity
    }

    pub fn is_closed(&self) -> bool {
        self.dest.is_none()
    }

    /// Write one pre-terminated line. A silent no-op from any process other
    /// than the one that opened the sink, and after close.
    pub fn write_line(&mut self, line: &str) -> io::Result<()> {
        if !self.affinity.same_process() {
            tracing::debug!("suppressing trace write from forked process");
            return Ok(());
        }
        let Some(dest) = self.dest.as_mut() else {
            return Ok(());
        };
        match dest {
            SinkDest::File { writer, .. } => writer.write_all(line.as_bytes()),
            SinkDest::Stream(writer) => writer.write_all(line.as_bytes()),
        }
    }

    /// Flush and release the destination. Owner-only: from a forked process
    /// or a non-owning thread this is a silent no-op and teardown is left
    /// to `Drop`. Idempotent.
    pub fn close(&mut self) -> io::Result<()> {
        if !self.affinity.owns_here() {
            tracing::debug!("suppressing sink close outside the owning process/thread");
            return Ok(());
        }
        match self.dest.take() {
            Some(SinkDest::File { mut writer, path }) => {
                tracing::debug!(path = %path.display(), "closing trace log");
                writer.flush()
                // File handle drops here, closing the descriptor
            }
            Some(SinkDest::Stream(mut writer)) => writer.flush(),
            None => Ok(()),
        }
    }
}

impl Drop for TraceSink {
    fn drop(&mut self) {
        let Some(dest) = self.dest.take() else {
            return;
        };
        if self.affinity.same_process() {
            match dest {
                SinkDest::File { mut writer, .. } => {
                    let _ = writer.flush();
                }
                SinkDest::Stream(mut writer) => {
                    let _ = writer.flush();
                }
            }
            return;
        }
        // Fork child: the buffer holds bytes duplicated from the parent.
        // Close only the raw file handle, never flushing, so the shared
        // file cannot receive the same partial lines twice.
        match dest {
            SinkDest::File { writer, .. } => {
                let (file, _pending) = writer.into_parts();
                drop(file);
            }
            // An inherited writer may flush in its own drop; leak it to the
            // child's exit instead.
            SinkDest::Stream(writer) => std::mem::forget(writer),
        }
    }
}
