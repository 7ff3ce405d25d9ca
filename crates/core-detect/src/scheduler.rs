//! Commit scheduling: immediate, deferred, or on an explicit commit key.

use std::fmt;
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::lookup::CommandLookup;
use crate::oracle::{MatchKind, assess};
use crate::state::DetectionState;

pub const DEFAULT_COMMIT_DELAY: Duration = Duration::from_millis(1850);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommitMode {
    /// Commit as soon as a trigger is unambiguous, defer when it is not.
    #[default]
    Automatic,
    /// Commit only on Space/Enter while the buffer is an exact match.
    Manual,
}

impl CommitMode {
    pub fn from_commit_keys(use_commit_keys: bool) -> Self {
        if use_commit_keys {
            CommitMode::Manual
        } else {
            CommitMode::Automatic
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitDecision {
    /// Replace now, suppressing the keystroke's default insertion.
    Immediate,
    /// Exact but ambiguous: arm the deferred commit.
    Defer,
    /// Keep accumulating.
    Wait,
}

/// Decide what the scheduler does after a buffer-mutating keystroke.
pub fn decide<L: CommandLookup + ?Sized>(
    state: &DetectionState,
    macros: &L,
    mode: CommitMode,
) -> CommitDecision {
    if !state.active || mode == CommitMode::Manual {
        return CommitDecision::Wait;
    }
    match assess(&state.buffer, macros) {
        MatchKind::Exact => CommitDecision::Immediate,
        MatchKind::Ambiguous => CommitDecision::Defer,
        MatchKind::Partial | MatchKind::None => CommitDecision::Wait,
    }
}

/// Why a deferred commit refused to fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StaleCommit {
    Cancelled,
    /// Session buffer differs from the one captured at arm time.
    BufferChanged,
    /// The macro list no longer has an exact match for the buffer.
    NoLongerExact,
    /// Caret or selection moved since arm time.
    SelectionMoved,
    /// Target element detached or no longer focused.
    TargetLost,
}

impl fmt::Display for StaleCommit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StaleCommit::Cancelled => "cancelled",
            StaleCommit::BufferChanged => "buffer_changed",
            StaleCommit::NoLongerExact => "no_longer_exact",
            StaleCommit::SelectionMoved => "selection_moved",
            StaleCommit::TargetLost => "target_lost",
        };
        f.write_str(s)
    }
}

/// A single-shot commit armed for an ambiguous exact match.
///
/// `S` is whatever the host captures about the selection at arm time; it is
/// compared for equality when the task fires.
#[derive(Debug, Clone)]
pub struct DeferredCommit<S> {
    id: u64,
    deadline: Instant,
    buffer: String,
    snapshot: S,
    cancelled: bool,
}

impl<S> DeferredCommit<S> {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    pub fn snapshot(&self) -> &S {
        &self.snapshot
    }

    pub fn cancel(&mut self) {
        self.cancelled = true;
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    pub fn is_due(&self, now: Instant) -> bool {
        now >= self.deadline
    }

    /// Re-check every assumption captured at arm time. `observed` is the
    /// host's current view of the selection, `None` when the target is gone.
    pub fn revalidate<L: CommandLookup + ?Sized>(
        &self,
        current: &DetectionState,
        macros: &L,
        observed: Option<&S>,
    ) -> Result<(), StaleCommit>
    where
        S: PartialEq,
    {
        if self.cancelled {
            return Err(StaleCommit::Cancelled);
        }
        if !current.active || current.buffer != self.buffer {
            return Err(StaleCommit::BufferChanged);
        }
        if macros.exact(&self.buffer).is_none() {
            return Err(StaleCommit::NoLongerExact);
        }
        let Some(observed) = observed else {
            return Err(StaleCommit::TargetLost);
        };
        if *observed != self.snapshot {
            return Err(StaleCommit::SelectionMoved);
        }
        Ok(())
    }
}

/// Owns at most one pending [`DeferredCommit`].
#[derive(Debug)]
pub struct CommitScheduler<S> {
    pending: Option<DeferredCommit<S>>,
    next_id: u64,
    delay: Duration,
}

impl<S> Default for CommitScheduler<S> {
    fn default() -> Self {
        Self::new(DEFAULT_COMMIT_DELAY)
    }
}

impl<S> CommitScheduler<S> {
    pub fn new(delay: Duration) -> Self {
        Self {
            pending: None,
            next_id: 1,
            delay,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn set_delay(&mut self, delay: Duration) {
        self.delay = delay;
    }

    /// Arm a new task, replacing any pending one. Returns the task id.
    pub fn arm(&mut self, now: Instant, buffer: impl Into<String>, snapshot: S) -> u64 {
        self.cancel();
        let id = self.next_id;
        self.next_id += 1;
        let deadline = now + self.delay;
        self.pending = Some(DeferredCommit {
            id,
            deadline,
            buffer: buffer.into(),
            snapshot,
            cancelled: false,
        });
        debug!(target: "detect.scheduler", id, delay_ms = self.delay.as_millis() as u64, "armed");
        id
    }

    /// Drop the pending task. Returns whether one existed.
    pub fn cancel(&mut self) -> bool {
        match self.pending.take() {
            Some(mut task) => {
                task.cancel();
                trace!(target: "detect.scheduler", id = task.id, "cancelled");
                true
            }
            None => false,
        }
    }

    pub fn pending(&self) -> Option<&DeferredCommit<S>> {
        self.pending.as_ref()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|t| t.deadline)
    }

    /// Hand out the pending task once its deadline has passed. A task is
    /// yielded at most once; cancelled tasks are discarded.
    pub fn poll(&mut self, now: Instant) -> Option<DeferredCommit<S>> {
        let task = self.pending.as_ref()?;
        if task.cancelled {
            self.pending = None;
            return None;
        }
        if !task.is_due(now) {
            return None;
        }
        let task = self.pending.take()?;
        trace!(target: "detect.scheduler", id = task.id, "fired");
        Some(task)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lookup::CommandTrie;
    use core_model::{Macro, MacroSet};
    use pretty_assertions::assert_eq;

    fn trie() -> CommandTrie {
        CommandTrie::build(&MacroSet::new(
            vec![
                Macro::plain("1", "/sig", "My Signature"),
                Macro::plain("2", "/brb", "Be right back"),
                Macro::plain("3", "/signature", "My Full Signature"),
            ],
            "/",
        ))
    }

    #[test]
    fn decisions_follow_ambiguity() {
        let t = trie();
        let auto = CommitMode::Automatic;
        assert_eq!(decide(&DetectionState::resumed("/brb"), &t, auto), CommitDecision::Immediate);
        assert_eq!(decide(&DetectionState::resumed("/sig"), &t, auto), CommitDecision::Defer);
        assert_eq!(decide(&DetectionState::resumed("/signature"), &t, auto), CommitDecision::Immediate);
        assert_eq!(decide(&DetectionState::resumed("/si"), &t, auto), CommitDecision::Wait);
        assert_eq!(decide(&DetectionState::inactive(), &t, auto), CommitDecision::Wait);
        assert_eq!(
            decide(&DetectionState::resumed("/brb"), &t, CommitMode::Manual),
            CommitDecision::Wait
        );
    }

    #[test]
    fn poll_fires_once_after_deadline() {
        let mut sched: CommitScheduler<usize> = CommitScheduler::new(Duration::from_millis(100));
        let t0 = Instant::now();
        let id = sched.arm(t0, "/sig", 7);
        assert!(sched.poll(t0 + Duration::from_millis(99)).is_none());
        let task = sched.poll(t0 + Duration::from_millis(100)).expect("due");
        assert_eq!(task.id(), id);
        assert_eq!(task.buffer(), "/sig");
        assert_eq!(*task.snapshot(), 7);
        assert!(sched.poll(t0 + Duration::from_secs(10)).is_none());
    }

    #[test]
    fn rearm_replaces_and_cancel_clears() {
        let mut sched: CommitScheduler<()> = CommitScheduler::new(Duration::from_millis(10));
        let t0 = Instant::now();
        let first = sched.arm(t0, "/sig", ());
        let second = sched.arm(t0, "/sig", ());
        assert_ne!(first, second);
        assert_eq!(sched.pending().map(DeferredCommit::id), Some(second));
        assert!(sched.cancel());
        assert!(!sched.cancel());
        assert!(sched.poll(t0 + Duration::from_secs(1)).is_none());
    }

    #[test]
    fn revalidation_reports_the_first_stale_reason() {
        let t = trie();
        let mut sched: CommitScheduler<usize> = CommitScheduler::new(Duration::ZERO);
        let now = Instant::now();
        sched.arm(now, "/sig", 4);
        let task = sched.poll(now).expect("due");
        let live = DetectionState::resumed("/sig");

        assert_eq!(task.revalidate(&live, &t, Some(&4)), Ok(()));
        assert_eq!(
            task.revalidate(&DetectionState::resumed("/sign"), &t, Some(&4)),
            Err(StaleCommit::BufferChanged)
        );
        assert_eq!(task.revalidate(&live, &t, Some(&5)), Err(StaleCommit::SelectionMoved));
        assert_eq!(task.revalidate(&live, &t, None), Err(StaleCommit::TargetLost));

        let shrunk = CommandTrie::build(&MacroSet::new(Vec::new(), "/"));
        assert_eq!(task.revalidate(&live, &shrunk, Some(&4)), Err(StaleCommit::NoLongerExact));

        let mut cancelled = task.clone();
        cancelled.cancel();
        assert_eq!(cancelled.revalidate(&live, &t, Some(&4)), Err(StaleCommit::Cancelled));
    }
}
