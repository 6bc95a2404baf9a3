//! The seam between a plan's tasks and whatever actually performs the
//! work. The coordinator only knows how to sequence tasks, checkpoint,
//! and account for budget; a `TaskRunner` is the injected collaborator
//! that does the task itself (bridging to the Hub's CLAUDE_REQUEST /
//! FILE_* messages, or anything else, is the runner's business).

use crate::plan::Task;
use async_trait::async_trait;
use iron_types::TaskError;

/// What a task produced, reported back to the coordinator for budget
/// accounting and checkpoint bookkeeping.
#[derive(Debug, Clone, Default)]
pub struct TaskOutcome
{
  pub actual_cost_usd: f64,
  pub files_created: Vec<String>,
  pub files_modified: Vec<String>,
}

#[async_trait]
pub trait TaskRunner: Send + Sync
{
  async fn run_task( &self, task: &Task ) -> Result<TaskOutcome, TaskError>;
}
