//! Wires the four coordination subsystems into a single handle: builds
//! the Circuit Breaker, Budget Manager, Lock Manager, and Communication
//! Hub from one config, spawns their background sweeps, and exposes a
//! helper for starting a Task Executor coordinator over the same Hub.

use iron_circuit_breaker::CircuitBreaker;
use iron_coordination_hub::{ Filesystem, Hub, LanguageModelClient };
use iron_cost::BudgetManager;
use iron_lock_manager::LockManager;
use iron_runtime_state::StateStore;
use iron_task_executor::{ Coordinator, InMemoryCheckpointStore, Plan, TaskRunner };
use iron_types::{ AgentId, TaskError };
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::config::RuntimeConfig;

/// A running coordination core: the shared Budget Manager, Lock
/// Manager, and Communication Hub, plus an in-memory checkpoint store
/// ready to back a Task Executor coordinator. Background cleanup tasks
/// are owned by this handle and aborted on drop.
pub struct CoordinationCore
{
  pub budget: Arc<BudgetManager>,
  pub locks: Arc<LockManager>,
  pub hub: Arc<Hub>,
  pub checkpoints: Arc<InMemoryCheckpointStore>,
  budget_cleanup: JoinHandle<()>,
  lock_cleanup: JoinHandle<()>,
  hub_scheduler: JoinHandle<()>,
}

impl CoordinationCore
{
  /// Build and start a coordination core over the given State Store and
  /// bridged collaborators.
  #[must_use]
  pub fn start(
    config: &RuntimeConfig,
    state: Arc<dyn StateStore>,
    llm: Arc<dyn LanguageModelClient>,
    fs: Arc<dyn Filesystem>,
  ) -> Self
  {
    let breaker = Arc::new( CircuitBreaker::new( config.circuit_breaker ) );
    let budget = Arc::new( BudgetManager::new( config.budget_config(), breaker ) );
    let locks = Arc::new( LockManager::new( config.lock_config() ) );
    let hub = Arc::new( Hub::new( config.hub_config(), Arc::clone( &budget ), Arc::clone( &locks ), state, llm, fs ) );

    let budget_cleanup = Arc::clone( &budget ).spawn_cleanup_loop( Duration::from_secs( config.budget_cleanup_interval_secs ) );
    let lock_cleanup = Arc::clone( &locks ).spawn_cleanup_loop();
    let hub_scheduler = hub.spawn_scheduler();

    Self { budget, locks, hub, checkpoints: Arc::new( InMemoryCheckpointStore::new() ), budget_cleanup, lock_cleanup, hub_scheduler }
  }

  /// Build a Task Executor coordinator for `plan`, sharing this core's
  /// Hub, Budget Manager, and checkpoint store.
  pub async fn plan_coordinator<R: TaskRunner>(
    &self,
    plan: Plan,
    agent_id: AgentId,
    runner: Arc<R>,
  ) -> Result<Coordinator<R, InMemoryCheckpointStore>, TaskError>
  {
    Coordinator::new( plan, agent_id, Arc::clone( &self.hub ), Arc::clone( &self.budget ), Arc::clone( &self.checkpoints ), runner ).await
  }

  /// Stop accepting new Hub traffic, drain in-flight work, and tear down
  /// the background sweeps.
  pub async fn shutdown( &self )
  {
    self.hub.shutdown().await;
    self.budget_cleanup.abort();
    self.lock_cleanup.abort();
    self.hub_scheduler.abort();
  }
}
