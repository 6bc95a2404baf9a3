//! Shared types and traits for the coordination core
//!
//! This crate provides the foundational types used across all subsystem
//! crates: entity IDs ([`ids`]), the shared [`Priority`] enum, and the full
//! error taxonomy for the Budget Manager, Lock Manager, Deadlock Detector,
//! Communication Hub, and Task Executor. All types are feature-gated behind
//! the `enabled` feature.

#![cfg_attr(not(feature = "enabled"), allow(unused))]

#[cfg(feature = "enabled")]
pub mod ids;

#[cfg(feature = "enabled")]
mod types
{
  use serde::{Deserialize, Serialize};
  use thiserror::Error;

  /// Relative priority of a budget operation or hub message.
  ///
  /// Ordered `HIGH < MEDIUM < LOW` so that `Ord` sorts the highest priority
  /// first, matching the Hub's ascending-priority dispatch order where a
  /// smaller numeric value is serviced first.
  #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
  pub enum Priority
  {
    High,
    Medium,
    Low,
  }

  impl Priority
  {
    /// Numeric rank used for explicit ordering comparisons (lower = more urgent).
    pub fn rank(&self) -> u8
    {
      match self
      {
        Priority::High => 0,
        Priority::Medium => 1,
        Priority::Low => 2,
      }
    }
  }

  /// Budget-related failures: the base kind from `spec.md`'s BudgetError.
  #[derive(Debug, Error)]
  pub enum BudgetError
  {
    #[error("circuit breaker is open, rejecting operation")]
    CircuitOpen,

    #[error("reserving {requested} would leave less than the minimum reserve {min_reserve}")]
    ReserveViolation { requested: u64, min_reserve: u64 },

    #[error("operation {0} is not tracked in the ledger")]
    Untracked(String),

    #[error("operation {0} is not in a reserved state and cannot be released")]
    NotReserved(String),

    #[error("budget manager failed to initialize: {0}")]
    InitFailure(String),
  }

  /// Projected spend exceeds `maxBudget`.
  #[derive(Debug, Error)]
  #[error("cost overrun: projected {projected} exceeds max budget {max_budget}")]
  pub struct CostOverrunError
  {
    pub projected: u64,
    pub max_budget: u64,
  }

  /// Wraps an unexpected validation failure in the Budget Manager.
  #[derive(Debug, Error)]
  #[error("budget validation failed: {0}")]
  pub struct BudgetValidationError(pub String);

  /// Lock Manager failures.
  #[derive(Debug, Error)]
  pub enum LockError
  {
    #[error("unknown lock id: {0}")]
    UnknownLock(String),

    #[error("lock manager is shutting down")]
    ShuttingDown,
  }

  /// A deadlock cycle was detected before a lock grant.
  #[derive(Debug, Error)]
  #[error("granting lock on {resource} to {agent} would create a wait-for cycle")]
  pub struct DeadlockError
  {
    pub agent: String,
    pub resource: String,
  }

  /// A bounded wait (lock, message, bridged I/O) was exceeded.
  #[derive(Debug, Error)]
  #[error("timed out waiting for {0}")]
  pub struct TimeoutError(pub String);

  /// Communication Hub failures.
  #[derive(Debug, Error)]
  pub enum CommunicationError
  {
    #[error("message queue is full (max {max_queue_size})")]
    QueueFull { max_queue_size: usize },

    #[error("no route for message type {0}")]
    NoRoute(String),

    #[error("handler failed: {0}")]
    HandlerFailed(String),

    /// A permanent authorization failure (e.g. an unverified lock on a
    /// WRITE). Never retried: retrying the same caller against the same
    /// lock would fail identically every time.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
  }

  /// Task Executor execution or checkpoint failures.
  #[derive(Debug, Error)]
  pub enum TaskError
  {
    #[error("task {0} failed: {1}")]
    ExecutionFailed(String, String),

    #[error("checkpoint operation failed: {0}")]
    CheckpointFailed(String),

    #[error("plan validation failed: {0}")]
    InvalidPlan(String),
  }

  /// Top-level error composing every subsystem's typed errors.
  ///
  /// Each subsystem surfaces its own error kind; this enum wraps rather than
  /// discards it, so callers that only care about one subsystem can still
  /// match through with `matches!` / `if let`.
  #[derive(Debug, Error)]
  pub enum Error
  {
    #[error(transparent)]
    Budget(#[from] BudgetError),

    #[error(transparent)]
    CostOverrun(#[from] CostOverrunError),

    #[error(transparent)]
    BudgetValidation(#[from] BudgetValidationError),

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error(transparent)]
    Deadlock(#[from] DeadlockError),

    #[error(transparent)]
    Timeout(#[from] TimeoutError),

    #[error(transparent)]
    Communication(#[from] CommunicationError),

    #[error(transparent)]
    Task(#[from] TaskError),

    #[error("configuration error: {0}")]
    Config(String),
  }

  pub type Result< T > = std::result::Result< T, Error >;
}

#[cfg(feature = "enabled")]
pub use types::*;

#[cfg(feature = "enabled")]
pub use ids::{
  AgentId, ApiTokenId, BudgetRequestId, CheckpointId, IcTokenId, IdError, LeaseId, LockId,
  MessageId, OperationId, PlanId, ProjectId, ProviderId, RequestId, SubscriptionId, TaskId,
};
