//! Cost estimation and the Budget Manager ledger for the coordination core.
//!
//! `estimator` is the pure, stateless cost-estimation function (`spec.md`
//! §4.2); `budget` is the stateful, mutex-guarded ledger that owns
//! validate-and-reserve (`spec.md` §4.3). `pricing` and `converter` are the
//! model rate table and microdollar arithmetic both of those depend on.
//!
//! ## Known Pitfalls
//!
//! ### DashMap Lock-Iteration Incompatibility
//!
//! DashMap is NOT a drop-in replacement for Mutex-wrapped HashMap. Never hold DashMap entry
//! locks while calling methods that iterate the same map, as this causes deadlock.
//!
//! **Why:** DashMap uses internal sharding with RwLocks. An exclusive write lock on one
//! shard prevents global iteration operations (like `iter()`, which powers `total_spent()`),
//! even for entries in other shards.
//!
//! **Correct pattern:**
//! ```rust,ignore
//! {
//!   let mut entry = map.entry(key).or_insert(default);
//!   *entry += value;
//! } // Explicit scope drops lock here
//! let total = map.iter().map(|e| *e.value()).sum(); // Safe now
//! ```
//!
//! **Incorrect pattern:**
//! ```rust,ignore
//! let mut entry = map.entry(key).or_insert(default);
//! *entry += value;
//! let total = map.iter().map(|e| *e.value()).sum(); // DEADLOCK!
//! ```
//!
//! This is precisely why the Budget Manager's ledger (`budget` module) is a
//! single mutex-guarded struct rather than a sharded map: its invariants
//! (`total + reserved <= max_budget`, reserved-sum-equals-`reserved`) span
//! multiple keys at once and cannot be checked atomically under sharded
//! locking.

#![cfg_attr(not(feature = "enabled"), allow(unused))]

#[cfg(feature = "enabled")]
pub mod converter;
#[cfg(feature = "enabled")]
pub mod pricing;
#[cfg(feature = "enabled")]
pub mod estimator;
#[cfg(feature = "enabled")]
pub mod budget;

#[cfg(feature = "enabled")]
pub use budget::{ AllocationReport, AllocationRequest, BudgetConfig, BudgetManager, LedgerSnapshot, Operation, OperationStatus, ReservationApproval, UsageVariance };
#[cfg(feature = "enabled")]
pub use estimator::{ estimate_message_cost, estimate_task_cost, estimate_tokens, ChatMessage, CostEstimate, Task, TaskComplexity, TaskType };
