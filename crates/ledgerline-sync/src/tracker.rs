//! In-flight request bookkeeping.
//!
//! Reads are keyed by `(scope, resource)`: starting a read cancels the one it
//! supersedes, and a response is applied only while its ticket is still the
//! current one for that key. Mutations are never superseded; each gets its own
//! token so [`RequestTracker::cancel_all`] can abort them together.

use ledgerline_core::model::Scope;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::debug;

use crate::api::{RequestOptions, Resource};
use crate::cancel::CancelToken;

/// Handle for one tracked read.
#[derive(Debug, Clone)]
pub struct Ticket {
    scope: Scope,
    resource: Resource,
    seq: u64,
    token: CancelToken,
}

impl Ticket {
    #[must_use]
    pub const fn resource(&self) -> Resource {
        self.resource
    }

    #[must_use]
    pub fn options(&self, timeout: Option<Duration>) -> RequestOptions {
        RequestOptions::new(self.token.clone(), timeout)
    }
}

/// Handle for one tracked mutation; deregisters itself on drop.
#[derive(Debug)]
pub struct MutationGuard<'a> {
    tracker: &'a RequestTracker,
    seq: u64,
    token: CancelToken,
}

impl MutationGuard<'_> {
    #[must_use]
    pub fn options(&self, timeout: Option<Duration>) -> RequestOptions {
        RequestOptions::new(self.token.clone(), timeout)
    }
}

impl Drop for MutationGuard<'_> {
    fn drop(&mut self) {
        lock(&self.tracker.mutations).remove(&self.seq);
    }
}

#[derive(Debug, Default)]
pub struct RequestTracker {
    reads: Mutex<Reads>,
    mutations: Mutex<BTreeMap<u64, CancelToken>>,
    next: AtomicU64,
}

type Reads = HashMap<(Scope, Resource), (u64, CancelToken)>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn forget(reads: &mut Reads, ticket: &Ticket) {
    let key = (ticket.scope, ticket.resource);
    if reads.get(&key).is_some_and(|(seq, _)| *seq == ticket.seq) {
        reads.remove(&key);
    }
}

impl RequestTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn next_seq(&self) -> u64 {
        self.next.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Start a read, cancelling any read it supersedes.
    #[must_use]
    pub fn begin_read(&self, scope: Scope, resource: Resource) -> Ticket {
        let seq = self.next_seq();
        let token = CancelToken::new();
        let previous = lock(&self.reads).insert((scope, resource), (seq, token.clone()));
        if let Some((old, old_token)) = previous {
            debug!(%scope, %resource, superseded = old, by = seq, "cancelling superseded read");
            old_token.cancel();
        }
        Ticket {
            scope,
            resource,
            seq,
            token,
        }
    }

    /// True while no newer read for the same key has started.
    #[must_use]
    pub fn is_current(&self, ticket: &Ticket) -> bool {
        !ticket.token.is_cancelled()
            && lock(&self.reads)
                .get(&(ticket.scope, ticket.resource))
                .is_some_and(|(seq, _)| *seq == ticket.seq)
    }

    /// Forget a finished read if it is still the current one.
    pub fn finish_read(&self, ticket: &Ticket) {
        forget(&mut lock(&self.reads), ticket);
    }

    /// Run `commit` if every ticket is still current, then forget the reads.
    ///
    /// The read table stays locked while `commit` runs, so a read that
    /// starts afterwards cannot commit ahead of this one.
    #[must_use]
    pub fn settle<T>(&self, tickets: &[Ticket], commit: impl FnOnce() -> T) -> Option<T> {
        let mut reads = lock(&self.reads);
        let current = tickets.iter().all(|ticket| {
            !ticket.token.is_cancelled()
                && reads
                    .get(&(ticket.scope, ticket.resource))
                    .is_some_and(|(seq, _)| *seq == ticket.seq)
        });
        let committed = current.then(commit);
        for ticket in tickets {
            forget(&mut reads, ticket);
        }
        committed
    }

    #[must_use]
    pub fn begin_mutation(&self) -> MutationGuard<'_> {
        let seq = self.next_seq();
        let token = CancelToken::new();
        lock(&self.mutations).insert(seq, token.clone());
        MutationGuard {
            tracker: self,
            seq,
            token,
        }
    }

    /// Cancel every in-flight read and mutation.
    pub fn cancel_all(&self) {
        let reads: Vec<CancelToken> = lock(&self.reads).drain().map(|(_, (_, t))| t).collect();
        let mutations: Vec<CancelToken> = lock(&self.mutations).values().cloned().collect();
        debug!(reads = reads.len(), mutations = mutations.len(), "cancelling all requests");
        for token in reads.iter().chain(&mutations) {
            token.cancel();
        }
    }

    #[must_use]
    pub fn in_flight(&self) -> usize {
        lock(&self.reads).len() + lock(&self.mutations).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledgerline_core::model::ScopeKind;

    const SCOPE: Scope = Scope::new(ScopeKind::Account, 4);

    #[test]
    fn newer_read_supersedes_older() {
        let tracker = RequestTracker::new();
        let first = tracker.begin_read(SCOPE, Resource::Children);
        let second = tracker.begin_read(SCOPE, Resource::Children);

        assert!(!tracker.is_current(&first));
        assert!(first.options(None).check().is_err());
        assert!(tracker.is_current(&second));

        tracker.finish_read(&first);
        assert!(tracker.is_current(&second), "stale finish must not clear the newer read");
        tracker.finish_read(&second);
        assert_eq!(tracker.in_flight(), 0);
    }

    #[test]
    fn reads_on_other_keys_are_independent() {
        let tracker = RequestTracker::new();
        let children = tracker.begin_read(SCOPE, Resource::Children);
        let groups = tracker.begin_read(SCOPE, Resource::Groups);
        let other = tracker.begin_read(Scope::new(ScopeKind::Account, 5), Resource::Children);
        assert!(tracker.is_current(&children));
        assert!(tracker.is_current(&groups));
        assert!(tracker.is_current(&other));
    }

    #[test]
    fn mutations_are_not_superseded_but_cancel_all_reaches_them() {
        let tracker = RequestTracker::new();
        let a = tracker.begin_mutation();
        let b = tracker.begin_mutation();
        let read = tracker.begin_read(SCOPE, Resource::Markups);
        assert!(a.options(None).check().is_ok());
        assert_eq!(tracker.in_flight(), 3);

        tracker.cancel_all();
        assert!(a.options(None).check().is_err());
        assert!(b.options(None).check().is_err());
        assert!(!tracker.is_current(&read));
    }

    #[test]
    fn superseded_reads_do_not_commit() {
        let tracker = RequestTracker::new();
        let first = tracker.begin_read(SCOPE, Resource::Children);
        let second = tracker.begin_read(SCOPE, Resource::Children);
        assert_eq!(tracker.settle(&[first], || "first"), None);
        assert_eq!(tracker.settle(&[second], || "second"), Some("second"));
        assert_eq!(tracker.in_flight(), 0);
    }

    #[test]
    fn read_started_during_commit_commits_after_it() {
        let tracker = RequestTracker::new();
        let order = Mutex::new(Vec::new());
        let older = tracker.begin_read(SCOPE, Resource::Children);

        std::thread::scope(|s| {
            let committed = tracker.settle(&[older], || {
                s.spawn(|| {
                    let newer = tracker.begin_read(SCOPE, Resource::Children);
                    tracker
                        .settle(&[newer], || lock(&order).push("newer"))
                        .expect("newer read is current");
                });
                std::thread::sleep(Duration::from_millis(50));
                lock(&order).push("older");
            });
            assert!(committed.is_some());
        });

        assert_eq!(*lock(&order), ["older", "newer"]);
        assert_eq!(tracker.in_flight(), 0);
    }

    #[test]
    fn cancelled_reads_do_not_commit() {
        let tracker = RequestTracker::new();
        let read = tracker.begin_read(SCOPE, Resource::Groups);
        tracker.cancel_all();
        assert_eq!(tracker.settle(&[read], || ()), None);
    }

    #[test]
    fn finished_mutation_deregisters() {
        let tracker = RequestTracker::new();
        {
            let _guard = tracker.begin_mutation();
            assert_eq!(tracker.in_flight(), 1);
        }
        assert_eq!(tracker.in_flight(), 0);
    }
}
