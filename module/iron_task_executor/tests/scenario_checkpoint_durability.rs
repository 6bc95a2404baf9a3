//! Checkpoint durability: a checkpoint is written for the initial plan,
//! for every task boundary (completion or failure), for an explicit
//! pause, and for the final result — so a crashed or paused run can
//! always resume from the last recorded state.

use async_trait::async_trait;
use iron_circuit_breaker::{ CircuitBreaker, CircuitBreakerConfig };
use iron_coordination_hub::{ Filesystem, Hub, HubConfig, LanguageModelClient };
use iron_cost::{ BudgetConfig, BudgetManager };
use iron_lock_manager::{ LockConfig, LockManager };
use iron_runtime_state::InMemoryStateStore;
use iron_task_executor::{ Coordinator, ExecutionStatus, Feature, InMemoryCheckpointStore, Plan, Task, TaskOutcome, TaskRunner };
use iron_types::{ AgentId, CommunicationError, TaskError };
use std::sync::Arc;
use std::time::Duration;

struct DeadLanguageModel;

#[async_trait]
impl LanguageModelClient for DeadLanguageModel
{
  async fn complete( &self, _prompt: serde_json::Value ) -> Result<serde_json::Value, CommunicationError>
  {
    Err( CommunicationError::HandlerFailed( "no model wired for this test".into() ) )
  }
}

struct DeadFilesystem;

#[async_trait]
impl Filesystem for DeadFilesystem
{
  async fn read_file( &self, _path: &str ) -> Result<Vec<u8>, CommunicationError>
  {
    Err( CommunicationError::HandlerFailed( "no filesystem wired for this test".into() ) )
  }
  async fn write_file( &self, _path: &str, _contents: &[u8] ) -> Result<(), CommunicationError>
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

fn three_task_plan() -> Plan
{
  let a = Task::new( "a" ).costing( 1.0 ).producing( "a.rs" );
  let b = Task::new( "b" ).costing( 1.0 ).depends_on( a.id.clone() ).producing( "b.rs" );
  let c = Task::new( "c" ).costing( 1.0 ).depends_on( b.id.clone() ).producing( "c.rs" );
  let mut plan = Plan::new( "three steps", 10.0 );
  let mut feature = Feature::new( "f" );
  feature.tasks.push( a );
  feature.tasks.push( b );
  feature.tasks.push( c );
  plan.features.push( feature );
  plan
}

fn wire_hub( budget: Arc<BudgetManager> ) -> Arc<Hub>
{
  let locks = Arc::new( LockManager::new( LockConfig::default() ) );
  let state = Arc::new( InMemoryStateStore::new() );
  Arc::new( Hub::new( HubConfig::default(), budget, locks, state, Arc::new( DeadLanguageModel ), Arc::new( DeadFilesystem ) ) )
}

fn fresh_budget() -> Arc<BudgetManager>
{
  let breaker = Arc::new( CircuitBreaker::new( CircuitBreakerConfig::default() ) );
  Arc::new( BudgetManager::new( BudgetConfig::new( 100.0, 0.0, 0.9, Duration::from_secs( 60 ), "gpt-4" ), breaker ) )
}

#[tokio::test]
async fn scenario_checkpoint_durability_at_every_task_boundary()
{
  let budget = fresh_budget();
  let hub = wire_hub( Arc::clone( &budget ) );
  hub.spawn_scheduler();
  let checkpoints = Arc::new( InMemoryCheckpointStore::new() );
  let runner = Arc::new( AlwaysSucceedsRunner );

  let coordinator = Coordinator::new( three_task_plan(), AgentId::generate(), hub, budget, Arc::clone( &checkpoints ), runner ).await.unwrap();

  // Initial plan checkpoint, written before a single task has run.
  let after_accept = checkpoints.list_checkpoints().await.unwrap();
  assert_eq!( after_accept.len(), 1 );

  let pause_id = coordinator.pause().await.unwrap();
  let paused = checkpoints.load_checkpoint( &pause_id ).await.unwrap();
  assert_eq!( paused.status, ExecutionStatus::Paused );
  assert!( paused.completed_task_ids.is_empty() );

  let status = coordinator.run().await.unwrap();
  assert_eq!( status, ExecutionStatus::Completed );

  // initial accept + 1 pause + 3 task boundaries + final result.
  let all = checkpoints.list_checkpoints().await.unwrap();
  assert_eq!( all.len(), 6 );

  let final_id = all.last().unwrap();
  let final_snapshot = checkpoints.load_checkpoint( final_id ).await.unwrap();
  assert_eq!( final_snapshot.status, ExecutionStatus::Completed );
  assert_eq!( final_snapshot.completed_task_ids.len(), 3 );
  assert_eq!( final_snapshot.files_created.len(), 3 );
}

#[tokio::test]
async fn scenario_resume_from_a_mid_run_checkpoint_continues_from_the_task_queue()
{
  let budget = fresh_budget();
  let hub = wire_hub( Arc::clone( &budget ) );
  hub.spawn_scheduler();
  let checkpoints = Arc::new( InMemoryCheckpointStore::new() );
  let runner = Arc::new( AlwaysSucceedsRunner );
  let agent = AgentId::generate();

  let plan = three_task_plan();
  let coordinator = Coordinator::new( plan.clone(), agent.clone(), Arc::clone( &hub ), Arc::clone( &budget ), Arc::clone( &checkpoints ), Arc::clone( &runner ) ).await.unwrap();

  // Simulate a crash after the first task: take over a fresh coordinator
  // from the last checkpoint and let it finish the remaining two.
  let first_task_id = plan.features[ 0 ].tasks[ 0 ].id.clone();
  let mid_run = iron_task_executor::CheckpointSnapshot
  {
    plan: plan.clone(),
    status: ExecutionStatus::Running,
    completed_task_ids: vec![ first_task_id ],
    failed_task_ids: Vec::new(),
    files_created: vec![ "a.rs".into() ],
    files_modified: Vec::new(),
    recorded_at: chrono::Utc::now(),
  };
  drop( coordinator );

  let resumed = Coordinator::resume_from( mid_run, agent, hub, budget, checkpoints, runner ).await.unwrap();
  let status = resumed.run().await.unwrap();
  assert_eq!( status, ExecutionStatus::Completed );
}
