//! Checkpoint durability: the executor's own invariant. A checkpoint is
//! written at every task boundary (completion, failure), on acceptance
//! of the initial plan, on the final result, and on pause — so a crashed
//! or paused run can always resume from the last recorded state rather
//! than from scratch.

use crate::plan::Plan;
use async_trait::async_trait;
use iron_types::{ CheckpointId, TaskError, TaskId };
use serde::{ Deserialize, Serialize };

/// Where execution of a plan currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionStatus
{
  Running,
  Paused,
  Completed,
  Failed,
}

/// A point-in-time snapshot of a plan's execution, durable enough to
/// resume from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointSnapshot
{
  pub plan: Plan,
  pub status: ExecutionStatus,
  pub completed_task_ids: Vec<TaskId>,
  pub failed_task_ids: Vec<TaskId>,
  pub files_created: Vec<String>,
  pub files_modified: Vec<String>,
  pub recorded_at: chrono::DateTime<chrono::Utc>,
}

/// Collaborator the executor writes checkpoints through. A real
/// implementation persists to durable storage; the in-memory reference
/// implementation below is what the test suite runs against.
#[async_trait]
pub trait CheckpointStore: Send + Sync
{
  async fn create_checkpoint( &self, snapshot: CheckpointSnapshot ) -> Result<CheckpointId, TaskError>;
  async fn list_checkpoints( &self ) -> Result<Vec<CheckpointId>, TaskError>;
  async fn load_checkpoint( &self, id: &CheckpointId ) -> Result<CheckpointSnapshot, TaskError>;
}
