//! Call event model shared by the filter, encoder, and session
//!
//! One `CallEvent` is produced by the interception source per observed
//! method invocation. The caller-side fields may be absent when the source
//! cannot resolve the call site (top-level invocations, eval'd code).

use std::sync::atomic::{AtomicU64, Ordering};

/// Opaque identity token for a receiving object.
///
/// Used only for self-exclusion: a session allocates its own token at
/// construction and rejects events whose receiver carries it, so the
/// session never traces its own bookkeeping calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectId(u64);

static NEXT_OBJECT_ID: AtomicU64 = AtomicU64::new(1);

impl ObjectId {
    /// Allocate a process-unique identity token.
    pub fn next() -> Self {
        Self(NEXT_OBJECT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Wrap an identity value supplied by an external interception hook.
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

/// Dispatch level of a method: defined on the class itself or shared by
/// instances.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodLevel {
    /// Class-level (singleton) method
    Class,
    /// Instance method
    Instance,
}

impl MethodLevel {
    /// Wire rendering used by the record encoder.
    pub fn as_str(self) -> &'static str {
        match self {
            MethodLevel::Class => "class",
            MethodLevel::Instance => "instance",
        }
    }
}

/// One observed method invocation plus its caller's source location.
///
/// Every field except the three `Option` caller fields is always populated
/// by the interception source.
#[derive(Debug, Clone)]
pub struct CallEvent {
    /// Class of the object whose method was invoked
    pub receiver_class_name: String,
    /// Class of the code that performed the call, when resolvable
    pub caller_class_name: Option<String>,
    /// Source location of the call site, when resolvable
    pub caller_path: Option<String>,
    /// Line number of the call site
    pub caller_lineno: u32,
    /// Invoked method's name
    pub method_name: String,
    /// Enclosing method's name at the call site, when resolvable
    pub caller_method_name: Option<String>,
    /// True if the invoked method is class-level
    pub is_singleton_call: bool,
    /// True if the enclosing caller method is class-level
    pub is_singleton_caller: bool,
    /// Identity token of the receiving object
    pub receiver_identity: ObjectId,
}

impl CallEvent {
    /// Dispatch level of the invoked method.
    pub fn method_level(&self) -> MethodLevel {
        if self.is_singleton_call {
            MethodLevel::Class
        } else {
            MethodLevel::Instance
        }
    }

    /// Dispatch level of the caller's enclosing method, known only when
    /// the caller method itself is known.
    pub fn caller_method_level(&self) -> Option<MethodLevel> {
        self.caller_method_name.as_ref().map(|_| {
            if self.is_singleton_caller {
                MethodLevel::Class
            } else {
                MethodLevel::Instance
            }
        })
    }
}
