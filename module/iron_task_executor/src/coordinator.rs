//! Drives a validated plan to completion: assigns ready tasks in
//! dependency order, runs each through the injected `TaskRunner`,
//! reserves and settles budget for it via the Hub, and checkpoints at
//! every task boundary plus on acceptance, pause, and the final result.

use crate::checkpoint::{ CheckpointSnapshot, CheckpointStore, ExecutionStatus };
use crate::plan::{ validate_plan, Plan, Task };
use crate::runner::TaskRunner;
use iron_coordination_hub::{ Hub, MessageKind };
use iron_cost::BudgetManager;
use iron_types::{ AgentId, CheckpointId, OperationId, Priority, TaskError, TaskId };
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Debug, Default)]
struct ExecutionState
{
  completed: HashSet<TaskId>,
  failed: HashSet<TaskId>,
  files_created: Vec<String>,
  files_modified: Vec<String>,
}

/// Coordinates execution of one plan. Collaborators (Hub, Budget
/// Manager, checkpoint store, task runner) are injected at construction
/// rather than looked up, per spec.md §9.
pub struct Coordinator<R: TaskRunner, C: CheckpointStore>
{
  hub: Arc<Hub>,
  budget: Arc<BudgetManager>,
  checkpoints: Arc<C>,
  runner: Arc<R>,
  agent_id: AgentId,
  plan: Plan,
  state: Mutex<ExecutionState>,
}

impl<R: TaskRunner, C: CheckpointStore> Coordinator<R, C>
{
  /// Validate the plan and checkpoint it as the initial accepted state.
  pub async fn new(
    plan: Plan,
    agent_id: AgentId,
    hub: Arc<Hub>,
    budget: Arc<BudgetManager>,
    checkpoints: Arc<C>,
    runner: Arc<R>,
  ) -> Result<Self, TaskError>
  {
    validate_plan( &plan )?;

    let coordinator = Self { hub, budget, checkpoints, runner, agent_id, plan, state: Mutex::new( ExecutionState::default() ) };
    coordinator.checkpoint( ExecutionStatus::Running ).await?;
    Ok( coordinator )
  }

  /// Rebuild a coordinator from a previously recorded checkpoint,
  /// resuming with whatever tasks were already completed or failed.
  pub async fn resume_from(
    snapshot: CheckpointSnapshot,
    agent_id: AgentId,
    hub: Arc<Hub>,
    budget: Arc<BudgetManager>,
    checkpoints: Arc<C>,
    runner: Arc<R>,
  ) -> Result<Self, TaskError>
  {
    validate_plan( &snapshot.plan )?;

    let state = ExecutionState
    {
      completed: snapshot.completed_task_ids.into_iter().collect(),
      failed: snapshot.failed_task_ids.into_iter().collect(),
      files_created: snapshot.files_created,
      files_modified: snapshot.files_modified,
    };

    Ok( Self { hub, budget, checkpoints, runner, agent_id, plan: snapshot.plan, state: Mutex::new( state ) } )
  }

  /// Run every task to completion or failure, in dependency order.
  /// Returns the plan's terminal status; a task's own failure does not
  /// abort the run, it cascades to dependents and is reflected in the
  /// final `Failed` status.
  pub async fn run( &self ) -> Result<ExecutionStatus, TaskError>
  {
    let total = self.plan.tasks().count();

    loop
    {
      {
        let mut state = self.state.lock().await;
        if state.completed.len() + state.failed.len() >= total
        {
          break;
        }

        let mut progressed = true;
        while progressed
        {
          progressed = false;
          let already_failed = state.failed.clone();
          for task in self.plan.tasks()
          {
            if state.completed.contains( &task.id ) || state.failed.contains( &task.id )
            {
              continue;
            }
            if task.dependencies.iter().any( | d | already_failed.contains( d ) )
            {
              state.failed.insert( task.id.clone() );
              progressed = true;
            }
          }
        }
      }

      let next = {
        let state = self.state.lock().await;
        self.plan.tasks().find( | t |
          !state.completed.contains( &t.id )
            && !state.failed.contains( &t.id )
            && t.dependencies.iter().all( | d | state.completed.contains( d ) )
        ).cloned()
      };

      let Some( task ) = next else { break };

      self.execute_one( &task ).await?;
      self.checkpoint( ExecutionStatus::Running ).await?;
    }

    let final_status = {
      let state = self.state.lock().await;
      if state.failed.is_empty() { ExecutionStatus::Completed } else { ExecutionStatus::Failed }
    };
    self.checkpoint( final_status ).await?;
    Ok( final_status )
  }

  /// Record a checkpoint for the current state without stopping
  /// execution, for external callers (e.g. a signal handler) that want
  /// a durable pause point.
  pub async fn pause( &self ) -> Result<CheckpointId, TaskError>
  {
    self.checkpoint( ExecutionStatus::Paused ).await
  }

  async fn execute_one( &self, task: &Task ) -> Result<(), TaskError>
  {
    let operation_id = OperationId::generate();

    self.hub.route_message( self.agent_id.clone(), 1, MessageKind::BudgetCheck
    {
      estimated_cost_usd: task.estimated_cost_usd,
      operation_id: operation_id.clone(),
      priority: Priority::Medium,
    } ).await.map_err( | e | TaskError::ExecutionFailed( task.id.to_string(), e.to_string() ) )?;

    self.hub.route_message( self.agent_id.clone(), 1, MessageKind::TaskAssign { task_id: task.id.clone() } )
      .await.map_err( | e | TaskError::ExecutionFailed( task.id.to_string(), e.to_string() ) )?;
    iron_telemetry::log_task_event( &task.id.to_string(), "assigned" );

    match self.runner.run_task( task ).await
    {
      Ok( outcome ) =>
      {
        {
          let mut state = self.state.lock().await;
          state.completed.insert( task.id.clone() );
          state.files_created.extend( outcome.files_created.clone() );
          state.files_modified.extend( outcome.files_modified.clone() );
        }

        self.hub.route_message( self.agent_id.clone(), 1, MessageKind::TaskComplete
        {
          task_id: task.id.clone(),
          actual_cost_usd: Some( outcome.actual_cost_usd ),
          operation_id: Some( operation_id ),
        } ).await.map_err( | e | TaskError::ExecutionFailed( task.id.to_string(), e.to_string() ) )?;
        iron_telemetry::log_task_event( &task.id.to_string(), "completed" );
      }
      Err( err ) =>
      {
        self.state.lock().await.failed.insert( task.id.clone() );
        let _ = self.budget.release_reservation( &operation_id ).await;
        let _ = self.hub.route_message( self.agent_id.clone(), 1, MessageKind::TaskFailed { task_id: task.id.clone(), reason: err.to_string() } ).await;
        iron_telemetry::log_task_event( &task.id.to_string(), "failed" );
      }
    }

    Ok( () )
  }

  async fn checkpoint( &self, status: ExecutionStatus ) -> Result<CheckpointId, TaskError>
  {
    let snapshot = {
      let state = self.state.lock().await;
      CheckpointSnapshot
      {
        plan: self.plan.clone(),
        status,
        completed_task_ids: state.completed.iter().cloned().collect(),
        failed_task_ids: state.failed.iter().cloned().collect(),
        files_created: state.files_created.clone(),
        files_modified: state.files_modified.clone(),
        recorded_at: chrono::Utc::now(),
      }
    };

    let id = self.checkpoints.create_checkpoint( snapshot ).await?;
    iron_telemetry::log_task_event( &id.to_string(), "checkpointed" );
    Ok( id )
  }
}

#[cfg(test)]
mod tests
{
  use super::*;
  use crate::memory::InMemoryCheckpointStore;
  use crate::plan::Feature;
  use crate::runner::TaskOutcome;
  use async_trait::async_trait;
  use iron_circuit_breaker::{ CircuitBreaker, CircuitBreakerConfig };
  use iron_coordination_hub::{ Filesystem, HubConfig, LanguageModelClient };
  use iron_cost::BudgetConfig;
  use iron_lock_manager::{ LockConfig, LockManager };
  use iron_runtime_state::InMemoryStateStore;
  use iron_types::CommunicationError;
  use std::sync::atomic::{ AtomicUsize, Ordering };
  use std::time::Duration;

  struct DeadLanguageModel;

  #[async_trait]
  impl LanguageModelClient for DeadLanguageModel
  {
    async fn complete( &self, _prompt: serde_json::Value ) -> core::result::Result<serde_json::Value, CommunicationError>
    {
      Err( CommunicationError::HandlerFailed( "no model wired for this test".into() ) )
    }
  }

  struct DeadFilesystem;

  #[async_trait]
  impl Filesystem for DeadFilesystem
  {
    async fn read_file( &self, _path: &str ) -> core::result::Result<Vec<u8>, CommunicationError>
    {
      Err( CommunicationError::HandlerFailed( "no filesystem wired for this test".into() ) )
    }
    async fn write_file( &self, _path: &str, _contents: &[u8] ) -> core::result::Result<(), CommunicationError>
    {
      Err( CommunicationError::HandlerFailed( "no filesystem wired for this test".into() ) )
    }
  }

  struct AlwaysSucceedsRunner;

  #[async_trait]
  impl TaskRunner for AlwaysSucceedsRunner
  {
    async fn run_task( &self, task: &Task ) -> Result<TaskOutcome, TaskError>
    {
      Ok( TaskOutcome { actual_cost_usd: task.estimated_cost_usd, files_created: task.output_file.clone().into_iter().collect(), files_modified: Vec::new() } )
    }
  }

  struct FailsOneRunner
  {
    fails: TaskId,
  }

  #[async_trait]
  impl TaskRunner for FailsOneRunner
  {
    async fn run_task( &self, task: &Task ) -> Result<TaskOutcome, TaskError>
    {
      if task.id == self.fails
      {
        return Err( TaskError::ExecutionFailed( task.id.to_string(), "simulated failure".into() ) );
      }
      Ok( TaskOutcome { actual_cost_usd: task.estimated_cost_usd, ..Default::default() } )
    }
  }

  struct CountingRunner
  {
    calls: AtomicUsize,
  }

  #[async_trait]
  impl TaskRunner for CountingRunner
  {
    async fn run_task( &self, task: &Task ) -> Result<TaskOutcome, TaskError>
    {
      self.calls.fetch_add( 1, Ordering::SeqCst );
      Ok( TaskOutcome { actual_cost_usd: task.estimated_cost_usd, ..Default::default() } )
    }
  }

  fn test_hub( budget: Arc<BudgetManager> ) -> Arc<Hub>
  {
    let locks = Arc::new( LockManager::new( LockConfig::default() ) );
    let state = Arc::new( InMemoryStateStore::new() );
    Arc::new( Hub::new( HubConfig::default(), budget, locks, state, Arc::new( DeadLanguageModel ), Arc::new( DeadFilesystem ) ) )
  }

  fn test_budget() -> Arc<BudgetManager>
  {
    let breaker = Arc::new( CircuitBreaker::new( CircuitBreakerConfig::default() ) );
    Arc::new( BudgetManager::new( BudgetConfig::new( 100.0, 0.0, 0.9, Duration::from_secs( 60 ), "gpt-4" ), breaker ) )
  }

  fn linear_plan() -> Plan
  {
    let a = Task::new( "a" ).costing( 1.0 ).producing( "a.rs" );
    let b = Task::new( "b" ).costing( 1.0 ).depends_on( a.id.clone() ).producing( "b.rs" );
    let mut plan = Plan::new( "linear", 10.0 );
    let mut feature = Feature::new( "f" );
    feature.tasks.push( a );
    feature.tasks.push( b );
    plan.features.push( feature );
    plan
  }

  #[tokio::test]
  async fn every_task_completes_and_checkpoints_accordingly()
  {
    let budget = test_budget();
    let hub = test_hub( Arc::clone( &budget ) );
    hub.spawn_scheduler();
    let checkpoints = Arc::new( InMemoryCheckpointStore::new() );
    let runner = Arc::new( AlwaysSucceedsRunner );

    let coordinator = Coordinator::new( linear_plan(), AgentId::generate(), hub, budget, Arc::clone( &checkpoints ), runner ).await.unwrap();
    let status = coordinator.run().await.unwrap();

    assert_eq!( status, ExecutionStatus::Completed );
    // initial + 2 task boundaries + final = 4 checkpoints.
    assert_eq!( checkpoints.list_checkpoints().await.unwrap().len(), 4 );
  }

  #[tokio::test]
  async fn a_failed_task_cascades_to_its_dependent()
  {
    let budget = test_budget();
    let hub = test_hub( Arc::clone( &budget ) );
    hub.spawn_scheduler();
    let checkpoints = Arc::new( InMemoryCheckpointStore::new() );
    let plan = linear_plan();
    let first_task_id = plan.features[ 0 ].tasks[ 0 ].id.clone();
    let runner = Arc::new( FailsOneRunner { fails: first_task_id.clone() } );

    let coordinator = Coordinator::new( plan, AgentId::generate(), hub, budget, checkpoints, runner ).await.unwrap();
    let status = coordinator.run().await.unwrap();

    assert_eq!( status, ExecutionStatus::Failed );
  }

  #[tokio::test]
  async fn resuming_from_a_checkpoint_skips_completed_tasks()
  {
    let budget = test_budget();
    let hub = test_hub( Arc::clone( &budget ) );
    hub.spawn_scheduler();
    let checkpoints = Arc::new( InMemoryCheckpointStore::new() );
    let runner = Arc::new( CountingRunner { calls: AtomicUsize::new( 0 ) } );
    let agent = AgentId::generate();

    let plan = linear_plan();
    let first_task_id = plan.features[ 0 ].tasks[ 0 ].id.clone();

    let snapshot = CheckpointSnapshot
    {
      plan: plan.clone(),
      status: ExecutionStatus::Paused,
      completed_task_ids: vec![ first_task_id ],
      failed_task_ids: Vec::new(),
      files_created: vec![ "a.rs".into() ],
      files_modified: Vec::new(),
      recorded_at: chrono::Utc::now(),
    };

    let coordinator = Coordinator::resume_from( snapshot, agent, hub, budget, checkpoints, Arc::clone( &runner ) ).await.unwrap();
    let status = coordinator.run().await.unwrap();

    assert_eq!( status, ExecutionStatus::Completed );
    assert_eq!( runner.calls.load( Ordering::SeqCst ), 1, "only the still-pending task should run" );
  }
}
