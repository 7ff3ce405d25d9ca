//! Detection sessions: key handling, commit timing and undo for one document.
//!
//! A [`Session`] is an explicit value; any number can coexist. Time is always
//! passed in, so deferred commits and blur debouncing are driven by whatever
//! clock the host uses.

pub mod driver;
pub mod observer;
pub mod session;
mod system;

pub use driver::{apply_default, press, type_text};
pub use observer::{DetectionContext, DetectionObserver};
pub use session::{KeyOutcome, RECONSTRUCT_WINDOW, Session, Snapshot};
