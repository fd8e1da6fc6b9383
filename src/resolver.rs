//! Target process resolution.
//!
//! The target set is recomputed on every call; callers must not keep it past
//! the operation that needed it since processes come and go between cycles.

use ahash::AHashSet as HashSet;
use std::sync::Arc;

use crate::probe::{Pid, ProcessProbe};

/// Identifiers of the processes currently in scope.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetSet {
    pids: HashSet<Pid>,
}

impl TargetSet {
    pub fn contains(&self, pid: Pid) -> bool {
        self.pids.contains(&pid)
    }

    pub fn len(&self) -> usize {
        self.pids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pids.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Pid> + '_ {
        self.pids.iter().copied()
    }

    /// Sorted copy of the identifiers, for stable output and parallel iteration.
    pub fn to_sorted_vec(&self) -> Vec<Pid> {
        let mut v: Vec<Pid> = self.pids.iter().copied().collect();
        v.sort_unstable();
        v
    }
}

impl FromIterator<Pid> for TargetSet {
    fn from_iter<I: IntoIterator<Item = Pid>>(iter: I) -> Self {
        Self {
            pids: iter.into_iter().collect(),
        }
    }
}

/// Produces the current target set.
pub trait ProcessResolver: Send + Sync {
    fn resolve(&self) -> TargetSet;
}

/// Resolves targets by process name (or PID) against a [`ProcessProbe`].
///
/// An empty name list selects every running process. A purely numeric entry
/// also matches the process with that PID.
pub struct NameResolver {
    names: Vec<String>,
    probe: Arc<dyn ProcessProbe>,
}

impl NameResolver {
    pub fn new(names: Vec<String>, probe: Arc<dyn ProcessProbe>) -> Self {
        Self { names, probe }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Determines whether a process is a target.
    pub fn matches(&self, pid: Pid, name: &str) -> bool {
        if self.names.is_empty() {
            return true;
        }
        self.names
            .iter()
            .any(|n| n == name || n.parse::<Pid>().is_ok_and(|p| p == pid))
    }
}

impl ProcessResolver for NameResolver {
    fn resolve(&self) -> TargetSet {
        self.probe
            .list_processes()
            .into_iter()
            .filter(|p| self.matches(p.pid, &p.name))
            .map(|p| p.pid)
            .collect()
    }
}

/// Fixed target set, for embedding callers that track processes themselves.
#[derive(Debug, Clone, Default)]
pub struct StaticResolver(pub TargetSet);

impl ProcessResolver for StaticResolver {
    fn resolve(&self) -> TargetSet {
        self.0.clone()
    }
}
