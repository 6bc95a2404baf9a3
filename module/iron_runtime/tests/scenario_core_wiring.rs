//! Exercises the wired coordination core end to end: a plan is accepted,
//! run to completion through the shared Hub and Budget Manager, and its
//! checkpoint trail reflects the run.

use async_trait::async_trait;
use iron_runtime::{ CoordinationCore, LocalFilesystem, NullLanguageModelClient, RuntimeConfig };
use iron_runtime_state::InMemoryStateStore;
use iron_task_executor::{ CheckpointStore, ExecutionStatus, Feature, Plan, Task, TaskOutcome, TaskRunner };
use iron_types::{ AgentId, TaskError };
use std::sync::Arc;

struct RecordingRunner;

#[async_trait]
impl TaskRunner for RecordingRunner
{
  async fn run_task( &self, task: &Task ) -> Result<TaskOutcome, TaskError>
  {
    Ok( TaskOutcome { actual_cost_usd: task.estimated_cost_usd, files_created: task.output_file.clone().into_iter().collect(), files_modified: Vec::new() } )
  }
}

fn two_task_plan() -> Plan
{
  let first = Task::new( "write module" ).costing( 2.0 ).producing( "src/module.rs" );
  let second = Task::new( "write tests" ).costing( 1.0 ).depends_on( first.id.clone() ).producing( "tests/module_test.rs" );

  let mut plan = Plan::new( "ship the module", 10.0 );
  let mut feature = Feature::new( "module" );
  feature.tasks.push( first );
  feature.tasks.push( second );
  plan.features.push( feature );
  plan
}

#[tokio::test]
async fn a_plan_submitted_to_the_wired_core_runs_to_completion_and_checkpoints()
{
  let config = RuntimeConfig::default();
  let core = CoordinationCore::start(
    &config,
    Arc::new( InMemoryStateStore::new() ),
    Arc::new( NullLanguageModelClient ),
    Arc::new( LocalFilesystem ),
  );

  let coordinator = core
    .plan_coordinator( two_task_plan(), AgentId::generate(), Arc::new( RecordingRunner ) )
    .await
    .expect( "plan passes validation" );

  let status = coordinator.run().await.unwrap();
  assert_eq!( status, ExecutionStatus::Completed );

  let checkpoints = core.checkpoints.list_checkpoints().await.unwrap();
  assert_eq!( checkpoints.len(), 4 );

  let last = core.checkpoints.load_checkpoint( checkpoints.last().unwrap() ).await.unwrap();
  assert_eq!( last.status, ExecutionStatus::Completed );
  assert_eq!( last.completed_task_ids.len(), 2 );
  assert_eq!( last.files_created.len(), 2 );

  core.shutdown().await;
}

#[tokio::test]
async fn an_invalid_plan_is_rejected_before_any_task_runs()
{
  let config = RuntimeConfig::default();
  let core = CoordinationCore::start(
    &config,
    Arc::new( InMemoryStateStore::new() ),
    Arc::new( NullLanguageModelClient ),
    Arc::new( LocalFilesystem ),
  );

  let empty_plan = Plan::new( "nothing to do", 1.0 );
  let result = core.plan_coordinator( empty_plan, AgentId::generate(), Arc::new( RecordingRunner ) ).await;
  assert!( matches!( result, Err( TaskError::InvalidPlan( _ ) ) ) );

  core.shutdown().await;
}
