//! The Hub's message envelope and its typed payload.
//!
//! `MessageKind` folds the spec's `type` tag and per-type fields into one
//! enum rather than a string tag plus a loosely typed payload blob, so
//! dispatch is an exhaustive match instead of a lookup table that can
//! silently miss a type at compile time.

use iron_runtime_state::Consistency;
use iron_types::{ AgentId, LockId, MessageId, Priority, SubscriptionId, TaskId };
use std::time::Instant;

/// Every routable message type, carrying the fields its handler needs.
#[derive(Debug, Clone)]
pub enum MessageKind
{
  Read { key: String, consistency: Consistency },
  Write { key: String, value: serde_json::Value, lock_id: Option<LockId>, expected_version: Option<u64> },
  Lock { resource_id: String, timeout: std::time::Duration },
  Unlock { lock_id: LockId },
  Subscribe { pattern: String },
  Unsubscribe { subscription_id: SubscriptionId },
  TaskAssign { task_id: TaskId },
  TaskComplete { task_id: TaskId, actual_cost_usd: Option<f64>, operation_id: Option<iron_types::OperationId> },
  TaskFailed { task_id: TaskId, reason: String },
  Handoff { to_agent: AgentId, task_id: TaskId },
  ClaudeRequest { prompt: serde_json::Value },
  FileRead { path: String },
  FileWrite { path: String, contents: Vec<u8> },
  BudgetCheck { estimated_cost_usd: f64, operation_id: iron_types::OperationId, priority: Priority },
  BudgetStatus,
  Heartbeat,
  StatusRequest,
  StatusResponse { status: serde_json::Value },
  Shutdown,
}

impl MessageKind
{
  /// A short, stable label for logging and error messages.
  #[must_use]
  pub fn label( &self ) -> &'static str
  {
    match self
    {
      MessageKind::Read { .. } => "READ",
      MessageKind::Write { .. } => "WRITE",
      MessageKind::Lock { .. } => "LOCK",
      MessageKind::Unlock { .. } => "UNLOCK",
      MessageKind::Subscribe { .. } => "SUBSCRIBE",
      MessageKind::Unsubscribe { .. } => "UNSUBSCRIBE",
      MessageKind::TaskAssign { .. } => "TASK_ASSIGN",
      MessageKind::TaskComplete { .. } => "TASK_COMPLETE",
      MessageKind::TaskFailed { .. } => "TASK_FAILED",
      MessageKind::Handoff { .. } => "HANDOFF",
      MessageKind::ClaudeRequest { .. } => "CLAUDE_REQUEST",
      MessageKind::FileRead { .. } => "FILE_READ",
      MessageKind::FileWrite { .. } => "FILE_WRITE",
      MessageKind::BudgetCheck { .. } => "BUDGET_CHECK",
      MessageKind::BudgetStatus => "BUDGET_STATUS",
      MessageKind::Heartbeat => "HEARTBEAT",
      MessageKind::StatusRequest => "STATUS_REQUEST",
      MessageKind::StatusResponse { .. } => "STATUS_RESPONSE",
      MessageKind::Shutdown => "SHUTDOWN",
    }
  }

  /// Bridged requests (CLAUDE/FILE) get a long collaborator-specific
  /// timeout instead of the caller-supplied one, per spec.md §4.6.
  #[must_use]
  pub fn bridged_timeout( &self ) -> Option<std::time::Duration>
  {
    match self
    {
      MessageKind::ClaudeRequest { .. } => Some( std::time::Duration::from_secs( 600 ) ),
      MessageKind::FileRead { .. } | MessageKind::FileWrite { .. } => Some( std::time::Duration::from_secs( 30 ) ),
      _ => None,
    }
  }
}

/// A single routable message, as accepted by `Hub::route_message`.
#[derive(Debug, Clone)]
pub struct Message
{
  pub id: MessageId,
  pub agent_id: AgentId,
  pub priority: u32,
  pub timestamp: Instant,
  pub timeout: Instant,
  pub retry_count: u32,
  pub kind: MessageKind,
}

impl Message
{
  /// Construct a fresh, first-attempt message with a zero retry count.
  #[must_use]
  pub fn new( agent_id: AgentId, priority: u32, timeout: std::time::Duration, kind: MessageKind ) -> Self
  {
    let now = Instant::now();
    Self { id: MessageId::generate(), agent_id, priority, timestamp: now, timeout: now + timeout, retry_count: 0, kind }
  }

  /// True iff `now` is past this message's absolute timeout.
  #[must_use]
  pub fn is_expired( &self, now: Instant ) -> bool
  {
    now > self.timeout
  }

  /// Clone this message under a fresh id with an incremented retry count,
  /// for the Hub's retry-with-rebinding policy.
  #[must_use]
  pub fn retried( &self ) -> Self
  {
    let mut next = self.clone();
    next.id = MessageId::generate();
    next.retry_count += 1;
    next
  }
}
