//! Transform scheduling primitives.
//!
//! Result and status types returned by transform calls, the cooperative
//! [`CancellationToken`], and the per-GUID in-flight table that guarantees at
//! most one running transform per asset.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bitflags::bitflags;
use curator_common::{AssetGuid, ContentHash, LogEntry};
use parking_lot::{Condvar, Mutex};

bitflags! {
    /// Options of a transform request.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct TransformFlags: u8 {
        /// User-initiated; also transforms types marked "only transform manually".
        const TRIGGERED_MANUALLY = 1 << 0;
        /// Retransform the requested assets even if they are up to date.
        /// Dependencies are still only transformed when stale.
        const FORCE_TRANSFORM = 1 << 1;
    }
}

/// Why a transform did not succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// The source document is gone.
    SourceMissing,
    /// The asset is part of, or depends on, a dependency cycle.
    CyclicDependency,
    /// A dependency does not resolve.
    DanglingDependency,
    /// The type's transform reported an error.
    TransformFailed,
    /// A dependency failed to transform in the same call, or was skipped
    /// while out of date because it only transforms manually.
    DependencyFailed,
    /// Reading inputs or writing the stamp failed.
    Io,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::SourceMissing => "source missing",
            FailureKind::CyclicDependency => "cyclic dependency",
            FailureKind::DanglingDependency => "dangling dependency",
            FailureKind::TransformFailed => "transform failed",
            FailureKind::DependencyFailed => "dependency failed",
            FailureKind::Io => "I/O error",
        };
        f.write_str(name)
    }
}

/// Outcome of one transform invocation. Immutable once produced and shared
/// through `Arc` with every caller that joined the same transform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformResult {
    /// `None` on success.
    pub failure: Option<FailureKind>,
    /// Error message, empty on success.
    pub message: String,
    /// Output files, relative to the project root.
    pub outputs: Vec<String>,
    /// Content hash the transform was evaluated against, if it could be computed.
    pub content_hash: Option<ContentHash>,
    /// Lines logged by the type's transform. Empty when it did not run.
    pub log: Vec<LogEntry>,
}

impl TransformResult {
    /// A successful result.
    pub fn success(outputs: Vec<String>, content_hash: ContentHash) -> Self {
        Self {
            failure: None,
            message: String::new(),
            outputs,
            content_hash: Some(content_hash),
            log: Vec::new(),
        }
    }

    /// A failed result.
    pub fn failed(
        kind: FailureKind,
        message: impl Into<String>,
        content_hash: Option<ContentHash>,
    ) -> Self {
        Self {
            failure: Some(kind),
            message: message.into(),
            outputs: Vec::new(),
            content_hash,
            log: Vec::new(),
        }
    }

    /// Attaches the captured transform log.
    pub fn with_log(mut self, log: Vec<LogEntry>) -> Self {
        self.log = log;
        self
    }

    /// Returns `true` if the transform succeeded.
    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }
}

/// Cumulative status of a transform call.
#[derive(Debug, Clone, Default)]
pub struct TransformStatus {
    /// Result of every visited asset, in visiting order.
    pub results: Vec<(AssetGuid, Arc<TransformResult>)>,
    /// Number of assets whose transform callback ran.
    pub transformed: usize,
    /// Number of assets that were already up to date.
    pub up_to_date: usize,
    /// Number of assets skipped because their type only transforms manually.
    pub skipped: usize,
    /// The call was cancelled before every asset was visited.
    pub cancelled: bool,
}

impl TransformStatus {
    /// Returns `true` if every visited asset succeeded and nothing was cancelled.
    pub fn is_success(&self) -> bool {
        !self.cancelled && self.results.iter().all(|(_, r)| r.is_success())
    }

    /// Returns the first failure, if any.
    pub fn first_failure(&self) -> Option<(AssetGuid, &TransformResult)> {
        self.results
            .iter()
            .find(|(_, r)| !r.is_success())
            .map(|(guid, r)| (*guid, r.as_ref()))
    }

    /// Returns the number of failed assets.
    pub fn failed(&self) -> usize {
        self.results.iter().filter(|(_, r)| !r.is_success()).count()
    }

    /// Returns the result recorded for `guid`.
    pub fn result_for(&self, guid: AssetGuid) -> Option<&Arc<TransformResult>> {
        self.results
            .iter()
            .find(|(g, _)| *g == guid)
            .map(|(_, r)| r)
    }
}

/// Shared flag for cooperative cancellation.
///
/// Checked before each scheduled asset; a transform that already started
/// always runs to completion.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    /// Creates a token that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Returns `true` once cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

struct InFlight {
    result: Mutex<Option<Arc<TransformResult>>>,
    done: Condvar,
}

/// Registry of running transforms, one entry per GUID.
#[derive(Default)]
pub(crate) struct InFlightTable {
    slots: Mutex<HashMap<AssetGuid, Arc<InFlight>>>,
}

/// Role of a caller in the in-flight table.
pub(crate) enum Slot<'a> {
    /// The caller runs the transform and must complete the guard.
    Leader(LeaderGuard<'a>),
    /// Another caller ran the transform; this is its result.
    Follower(Arc<TransformResult>),
}

impl InFlightTable {
    /// Claims `guid`, or blocks until the transform already running for it
    /// finishes and returns that result.
    pub(crate) fn acquire(&self, guid: AssetGuid) -> Slot<'_> {
        let entry = {
            let mut slots = self.slots.lock();
            match slots.get(&guid) {
                Some(entry) => Arc::clone(entry),
                None => {
                    let entry = Arc::new(InFlight {
                        result: Mutex::new(None),
                        done: Condvar::new(),
                    });
                    slots.insert(guid, Arc::clone(&entry));
                    return Slot::Leader(LeaderGuard {
                        table: self,
                        guid,
                        entry,
                        completed: false,
                    });
                }
            }
        };

        let mut result = entry.result.lock();
        loop {
            if let Some(result) = result.as_ref() {
                return Slot::Follower(Arc::clone(result));
            }
            entry.done.wait(&mut result);
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.slots.lock().len()
    }

    /// Number of callers blocked on the transform running for `guid`.
    #[cfg(test)]
    pub(crate) fn followers(&self, guid: AssetGuid) -> usize {
        // The table and the leader hold one reference each.
        self.slots
            .lock()
            .get(&guid)
            .map_or(0, |entry| Arc::strong_count(entry).saturating_sub(2))
    }
}

/// Exclusive claim on one GUID. Dropping it without completing publishes a
/// failure so joined callers never wait forever.
pub(crate) struct LeaderGuard<'a> {
    table: &'a InFlightTable,
    guid: AssetGuid,
    entry: Arc<InFlight>,
    completed: bool,
}

impl LeaderGuard<'_> {
    /// Publishes the result to every joined caller and releases the GUID.
    pub(crate) fn complete(mut self, result: Arc<TransformResult>) {
        self.publish(result);
    }

    fn publish(&mut self, result: Arc<TransformResult>) {
        self.table.slots.lock().remove(&self.guid);
        *self.entry.result.lock() = Some(result);
        self.entry.done.notify_all();
        self.completed = true;
    }
}

impl Drop for LeaderGuard<'_> {
    fn drop(&mut self) {
        if !self.completed {
            self.publish(Arc::new(TransformResult::failed(
                FailureKind::TransformFailed,
                "transform was abandoned",
                None,
            )));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    /// Spins until a second caller holds the in-flight entry for `guid`.
    fn wait_for_follower(table: &InFlightTable, guid: AssetGuid) {
        while table.followers(guid) != 1 {
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    fn ok_result() -> Arc<TransformResult> {
        Arc::new(TransformResult::success(
            vec!["out.bin".into()],
            ContentHash::from_bytes(b"x"),
        ))
    }

    #[test]
    fn status_aggregates_failures() {
        let mut status = TransformStatus::default();
        status.results.push((AssetGuid::from_u128(1), ok_result()));
        assert!(status.is_success());
        status.results.push((
            AssetGuid::from_u128(2),
            Arc::new(TransformResult::failed(FailureKind::TransformFailed, "boom", None)),
        ));
        assert!(!status.is_success());
        assert_eq!(status.failed(), 1);
        let (guid, failure) = status.first_failure().unwrap();
        assert_eq!(guid, AssetGuid::from_u128(2));
        assert_eq!(failure.message, "boom");
        assert!(status.result_for(AssetGuid::from_u128(1)).unwrap().is_success());
    }

    #[test]
    fn cancelled_status_is_not_success() {
        let status = TransformStatus {
            cancelled: true,
            ..Default::default()
        };
        assert!(!status.is_success());
    }

    #[test]
    fn cancellation_token_is_shared() {
        let token = CancellationToken::new();
        let clone = token.clone();
        assert!(!token.is_cancelled());
        clone.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn leader_then_new_leader() {
        let table = InFlightTable::default();
        let g = AssetGuid::from_u128(1);
        let Slot::Leader(guard) = table.acquire(g) else {
            panic!("first caller must lead");
        };
        assert_eq!(table.len(), 1);
        guard.complete(ok_result());
        assert_eq!(table.len(), 0);
        assert!(matches!(table.acquire(g), Slot::Leader(_)));
    }

    #[test]
    fn follower_receives_leader_result() {
        let table = Arc::new(InFlightTable::default());
        let g = AssetGuid::from_u128(1);
        let Slot::Leader(guard) = table.acquire(g) else {
            panic!("first caller must lead");
        };

        let waiter = {
            let table = Arc::clone(&table);
            std::thread::spawn(move || match table.acquire(g) {
                Slot::Follower(result) => result,
                Slot::Leader(_) => panic!("second caller must join"),
            })
        };
        wait_for_follower(&table, g);
        let result = ok_result();
        guard.complete(Arc::clone(&result));
        let joined = waiter.join().unwrap();
        assert!(Arc::ptr_eq(&joined, &result));
    }

    #[test]
    fn abandoned_leader_publishes_failure() {
        let table = Arc::new(InFlightTable::default());
        let g = AssetGuid::from_u128(1);
        let Slot::Leader(guard) = table.acquire(g) else {
            panic!("first caller must lead");
        };
        let waiter = {
            let table = Arc::clone(&table);
            std::thread::spawn(move || match table.acquire(g) {
                Slot::Follower(result) => result,
                Slot::Leader(_) => panic!("second caller must join"),
            })
        };
        wait_for_follower(&table, g);
        drop(guard);
        let joined = waiter.join().unwrap();
        assert_eq!(joined.failure, Some(FailureKind::TransformFailed));
    }
}
