//! Fragment store backends.
//!
//! [`MokaStore`] is the production store: bounded, with per-entry expiry.
//! [`MemoryStore`] is an unbounded map with a pluggable [`Clock`] so expiry
//! can be driven deterministically.

mod clock;
mod memory_store;
mod moka_store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use memory_store::MemoryStore;
pub use moka_store::MokaStore;
