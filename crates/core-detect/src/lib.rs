//! core-detect: trigger detection for live macro expansion.
//!
//! Design principles:
//! - Pure and deterministic: every transition depends only on the previous
//!   state, the key, the macro snapshot and the prefixes.
//! - Commands are indexed in a character trie so "is this buffer still a
//!   prefix of some command" and "is there a longer command" are single walks.
//! - Ambiguity (an exact match that is also a strict prefix of a longer
//!   command) is surfaced to the scheduler, which defers instead of committing.
//! - No side effects beyond TRACE logging.

pub mod classify;
pub mod lookup;
pub mod oracle;
pub mod scheduler;
pub mod state;

pub use classify::{
    KeyClass, Navigation, classify, is_cancelling_key, is_commit_key, is_printable_key, navigation,
};
pub use lookup::{CommandLookup, CommandTrie};
pub use oracle::{MatchKind, assess, exact_match, has_longer_prefix_match, is_command_prefix, is_exact};
pub use scheduler::{
    CommitDecision, CommitMode, CommitScheduler, DEFAULT_COMMIT_DELAY, DeferredCommit, StaleCommit,
    decide,
};
pub use state::{DetectionState, update_state_on_key};
