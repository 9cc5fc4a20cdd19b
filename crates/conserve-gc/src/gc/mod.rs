//! Mark-sweep collection.
//!
//! A cycle runs three phases against the allocation registry:
//! - clear: reset every `reachable` flag
//! - mark: scan the roots and, transitively, the contents of every
//!   allocation found reachable
//! - sweep: release every allocation left unmarked

pub mod mark;
pub mod sweep;
pub mod worklist;

pub use mark::{MarkStats, Marker};
pub use sweep::{sweep, SweepStats};
pub use worklist::{PendingScan, Worklist};
