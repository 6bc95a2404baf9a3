//! The Distributed Lock Manager and its Deadlock Detector.
//!
//! "Distributed" describes the resource model (many concurrent agents,
//! each addressing resources by name), not a networked deployment — see
//! the in-process Non-goal in `spec.md` §1.

#![cfg_attr(not(feature = "enabled"), allow(unused))]

#[cfg(feature = "enabled")]
pub mod deadlock;
#[cfg(feature = "enabled")]
pub mod lock;

#[cfg(feature = "enabled")]
pub use deadlock::{ DeadlockDetector, DeadlockStatus };
#[cfg(feature = "enabled")]
pub use lock::{ Lock, LockConfig, LockManager };
