//! Call filtering via whitelist/blacklist pattern rules
//!
//! Supports:
//! - Class whitelist: record only calls touching matching classes
//! - Class blacklist: drop calls touching matching classes
//! - Path blacklist: drop calls originating from matching source paths

use regex::RegexSet;

use crate::error::Result;
use crate::event::{CallEvent, ObjectId};

/// A compiled match rule over candidate strings.
///
/// Either matches everything (the empty-whitelist default) or matches the
/// union of a compiled pattern set (empty set = matches nothing, the
/// blacklist default). Callers only see `matches`; the representation never
/// leaks into rule evaluation.
#[derive(Debug, Clone)]
pub enum MatchRule {
    /// Matches every candidate
    Any,
    /// Matches candidates hitting any pattern in the set
    Patterns(RegexSet),
}

impl MatchRule {
    /// Rule that matches every candidate.
    pub fn any() -> Self {
        MatchRule::Any
    }

    /// Rule that matches no candidate.
    pub fn none() -> Self {
        // An empty RegexSet never matches
        MatchRule::Patterns(RegexSet::empty())
    }

    /// Compile a pattern list. Invalid patterns fail here, never at match
    /// time.
    pub fn compile<S: AsRef<str>>(patterns: &[S]) -> Result<Self> {
        Ok(MatchRule::Patterns(RegexSet::new(
            patterns.iter().map(AsRef::as_ref),
        )?))
    }

    /// Check a candidate against the rule.
    pub fn matches(&self, candidate: &str) -> bool {
        match self {
            MatchRule::Any => true,
            MatchRule::Patterns(set) => set.is_match(candidate),
        }
    }
}

/// User-facing filter configuration: raw pattern lists, compiled once at
/// session construction.
#[derive(Debug, Clone, Default)]
pub struct FilterRules {
    /// Record only calls whose receiver or caller class matches
    /// (empty = record everything)
    pub class_whitelist: Vec<String>,
    /// Drop calls whose receiver or caller class matches
    pub class_blacklist: Vec<String>,
    /// Drop calls originating from a matching source path
    pub path_blacklist: Vec<String>,
}

/// Compiled filter deciding whether a call event is recorded.
#[derive(Debug, Clone)]
pub struct CallFilter {
    class_whitelist: MatchRule,
    class_blacklist: MatchRule,
    path_blacklist: MatchRule,
    own_receiver: ObjectId,
}

impl CallFilter {
    /// Compile the rules. `own_receiver` is the session's identity token;
    /// events dispatched on the session itself are never recorded.
    pub fn new(rules: &FilterRules, own_receiver: ObjectId) -> Result<Self> {
        let class_whitelist = if rules.class_whitelist.is_empty() {
            MatchRule::any()
        } else {
            MatchRule::compile(&rules.class_whitelist)?
        };
        let class_blacklist = if rules.class_blacklist.is_empty() {
            MatchRule::none()
        } else {
            MatchRule::compile(&rules.class_blacklist)?
        };
        let path_blacklist = if rules.path_blacklist.is_empty() {
            MatchRule::none()
        } else {
            MatchRule::compile(&rules.path_blacklist)?
        };
        Ok(Self {
            class_whitelist,
            class_blacklist,
            path_blacklist,
            own_receiver,
        })
    }

    /// Decide whether an event is recorded. Rules short-circuit in order:
    /// self-receiver, same-class call, class blacklist, class whitelist,
    /// path blacklist. An absent caller class contributes no candidate to
    /// the class rules; an absent path matches as the empty string.
    pub fn accepts(&self, event: &CallEvent) -> bool {
        if event.receiver_identity == self.own_receiver {
            return false;
        }
        let caller = event.caller_class_name.as_deref();
        if caller == Some(event.receiver_class_name.as_str()) {
            return false;
        }
        if self.class_blacklist.matches(&event.receiver_class_name)
            || caller.is_some_and(|c| self.class_blacklist.matches(c))
        {
            return false;
        }
        if !(self.class_whitelist.matches(&event.receiver_class_name)
            || caller.is_some_and(|c| self.class_whitelist.matches(c)))
        {
            return false;
        }
        if self
            .path_blacklist
            .matches(event.caller_path.as_deref().unwrap_or(""))
        {
            return false;
        }
        true
    }
}
