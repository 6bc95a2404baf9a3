//! The Plan/Feature/Task data model the executor decomposes a proposal
//! into, plus the validation pass run before a plan is accepted.

use iron_types::{ TaskError, TaskId };
use serde::{ Deserialize, Serialize };
use std::collections::{ HashMap, HashSet };

/// A single unit of work within a feature. Dependencies are other tasks
/// in the same plan that must complete first; `output_file`, when set,
/// marks the file this task is expected to produce or modify.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task
{
  pub id: TaskId,
  pub description: String,
  pub dependencies: Vec<TaskId>,
  pub output_file: Option<String>,
  pub estimated_cost_usd: f64,
}

impl Task
{
  #[must_use]
  pub fn new( description: impl Into<String> ) -> Self
  {
    Self { id: TaskId::generate(), description: description.into(), dependencies: Vec::new(), output_file: None, estimated_cost_usd: 0.0 }
  }

  #[must_use]
  pub fn depends_on( mut self, task_id: TaskId ) -> Self
  {
    self.dependencies.push( task_id );
    self
  }

  #[must_use]
  pub fn producing( mut self, output_file: impl Into<String> ) -> Self
  {
    self.output_file = Some( output_file.into() );
    self
  }

  #[must_use]
  pub fn costing( mut self, estimated_cost_usd: f64 ) -> Self
  {
    self.estimated_cost_usd = estimated_cost_usd;
    self
  }
}

/// A named grouping of tasks within a plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feature
{
  pub name: String,
  pub tasks: Vec<Task>,
}

impl Feature
{
  #[must_use]
  pub fn new( name: impl Into<String> ) -> Self
  {
    Self { name: name.into(), tasks: Vec::new() }
  }
}

/// The decomposition of a proposal into features and tasks, with an
/// overall budget estimate. Phases (runtime batches of mutually-ready
/// tasks) are not stored on the plan; the coordinator computes them from
/// the dependency graph as execution proceeds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan
{
  pub proposal: String,
  pub features: Vec<Feature>,
  pub budget_estimate_usd: f64,
}

impl Plan
{
  #[must_use]
  pub fn new( proposal: impl Into<String>, budget_estimate_usd: f64 ) -> Self
  {
    Self { proposal: proposal.into(), features: Vec::new(), budget_estimate_usd }
  }

  /// All tasks across every feature, in declaration order.
  pub fn tasks( &self ) -> impl Iterator<Item = &Task>
  {
    self.features.iter().flat_map( | f | f.tasks.iter() )
  }

  pub fn task( &self, id: &TaskId ) -> Option<&Task>
  {
    self.tasks().find( | t | &t.id == id )
  }
}

/// Validate a plan against the invariants the executor requires before
/// accepting it: non-empty features and tasks, an acyclic dependency
/// graph, a positive budget estimate, and no two tasks racing to own the
/// same output file.
pub fn validate_plan( plan: &Plan ) -> Result<(), TaskError>
{
  if plan.features.is_empty()
  {
    return Err( TaskError::InvalidPlan( "plan has no features".into() ) );
  }

  for feature in &plan.features
  {
    if feature.tasks.is_empty()
    {
      return Err( TaskError::InvalidPlan( format!( "feature '{}' has no tasks", feature.name ) ) );
    }
  }

  if plan.budget_estimate_usd <= 0.0
  {
    return Err( TaskError::InvalidPlan( "budget estimate must be positive".into() ) );
  }

  let known: HashSet<&TaskId> = plan.tasks().map( | t | &t.id ).collect();
  for task in plan.tasks()
  {
    for dep in &task.dependencies
    {
      if !known.contains( dep )
      {
        return Err( TaskError::InvalidPlan( format!( "task {} depends on unknown task {dep}", task.id ) ) );
      }
    }
  }

  if let Some( cycle ) = find_cycle( plan )
  {
    return Err( TaskError::InvalidPlan( format!( "circular task dependency: {}", cycle.iter().map( ToString::to_string ).collect::<Vec<_>>().join( " -> " ) ) ) );
  }

  let mut owners: HashMap<&str, &TaskId> = HashMap::new();
  for task in plan.tasks()
  {
    let Some( output_file ) = task.output_file.as_deref() else { continue };
    if let Some( existing ) = owners.insert( output_file, &task.id )
    {
      return Err( TaskError::InvalidPlan( format!( "tasks {existing} and {} both own output file '{output_file}'", task.id ) ) );
    }
  }

  Ok( () )
}

/// DFS cycle detection over the task dependency graph, mirroring the
/// Lock Manager's wait-for-graph reachability search. Returns the first
/// cycle found, as a path of task ids, or `None` if the graph is acyclic.
fn find_cycle( plan: &Plan ) -> Option<Vec<TaskId>>
{
  let by_id: HashMap<&TaskId, &Task> = plan.tasks().map( | t | ( &t.id, t ) ).collect();

  let mut visited = HashSet::new();
  for task in plan.tasks()
  {
    if visited.contains( &task.id )
    {
      continue;
    }

    let mut path = Vec::new();
    let mut on_path = HashSet::new();
    if let Some( cycle ) = walk( &task.id, &by_id, &mut path, &mut on_path, &mut visited )
    {
      return Some( cycle );
    }
  }

  None
}

fn walk<'a>(
  current: &'a TaskId,
  by_id: &HashMap<&'a TaskId, &'a Task>,
  path: &mut Vec<TaskId>,
  on_path: &mut HashSet<TaskId>,
  visited: &mut HashSet<TaskId>,
) -> Option<Vec<TaskId>>
{
  if on_path.contains( current )
  {
    let start = path.iter().position( | t | t == current ).unwrap_or( 0 );
    let mut cycle = path[ start.. ].to_vec();
    cycle.push( current.clone() );
    return Some( cycle );
  }

  if visited.contains( current )
  {
    return None;
  }

  path.push( current.clone() );
  on_path.insert( current.clone() );

  if let Some( task ) = by_id.get( current )
  {
    for dep in &task.dependencies
    {
      if let Some( cycle ) = walk( dep, by_id, path, on_path, visited )
      {
        return Some( cycle );
      }
    }
  }

  on_path.remove( current );
  path.pop();
  visited.insert( current.clone() );
  None
}

#[cfg(test)]
mod tests
{
  use super::*;

  #[test]
  fn empty_plan_is_rejected()
  {
    let plan = Plan::new( "do nothing", 1.0 );
    assert!( matches!( validate_plan( &plan ), Err( TaskError::InvalidPlan( _ ) ) ) );
  }

  #[test]
  fn feature_with_no_tasks_is_rejected()
  {
    let mut plan = Plan::new( "partial", 1.0 );
    plan.features.push( Feature::new( "empty" ) );
    assert!( matches!( validate_plan( &plan ), Err( TaskError::InvalidPlan( _ ) ) ) );
  }

  #[test]
  fn non_positive_budget_is_rejected()
  {
    let mut plan = Plan::new( "cheap", 0.0 );
    let mut feature = Feature::new( "f" );
    feature.tasks.push( Task::new( "t" ) );
    plan.features.push( feature );
    assert!( matches!( validate_plan( &plan ), Err( TaskError::InvalidPlan( _ ) ) ) );
  }

  #[test]
  fn linear_dependency_chain_is_accepted()
  {
    let a = Task::new( "a" ).costing( 1.0 );
    let b = Task::new( "b" ).costing( 1.0 ).depends_on( a.id.clone() );
    let mut plan = Plan::new( "chain", 5.0 );
    let mut feature = Feature::new( "f" );
    feature.tasks.push( a );
    feature.tasks.push( b );
    plan.features.push( feature );
    assert!( validate_plan( &plan ).is_ok() );
  }

  #[test]
  fn circular_dependency_is_rejected()
  {
    let a = Task::new( "a" ).costing( 1.0 );
    let mut b = Task::new( "b" ).costing( 1.0 ).depends_on( a.id.clone() );
    let mut a = a;
    a.dependencies.push( b.id.clone() );
    b.dependencies.push( a.id.clone() );

    let mut plan = Plan::new( "cycle", 5.0 );
    let mut feature = Feature::new( "f" );
    feature.tasks.push( a );
    feature.tasks.push( b );
    plan.features.push( feature );

    assert!( matches!( validate_plan( &plan ), Err( TaskError::InvalidPlan( _ ) ) ) );
  }

  #[test]
  fn two_tasks_owning_the_same_output_file_is_rejected()
  {
    let a = Task::new( "a" ).costing( 1.0 ).producing( "out.rs" );
    let b = Task::new( "b" ).costing( 1.0 ).producing( "out.rs" );
    let mut plan = Plan::new( "conflict", 5.0 );
    let mut feature = Feature::new( "f" );
    feature.tasks.push( a );
    feature.tasks.push( b );
    plan.features.push( feature );

    assert!( matches!( validate_plan( &plan ), Err( TaskError::InvalidPlan( _ ) ) ) );
  }

  #[test]
  fn unknown_dependency_is_rejected()
  {
    let bogus = TaskId::generate();
    let a = Task::new( "a" ).costing( 1.0 ).depends_on( bogus );
    let mut plan = Plan::new( "dangling", 5.0 );
    let mut feature = Feature::new( "f" );
    feature.tasks.push( a );
    plan.features.push( feature );

    assert!( matches!( validate_plan( &plan ), Err( TaskError::InvalidPlan( _ ) ) ) );
  }
}
