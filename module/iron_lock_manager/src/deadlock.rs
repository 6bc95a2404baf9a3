//! Wait-for-graph deadlock detection.
//!
//! Maintains two maps that mirror the lock registry: which resources each
//! agent is currently waiting on, and which agent currently owns each
//! resource. `would_cause_deadlock` is a pure reachability query; the
//! mutating methods are called only from inside the Lock Manager's own
//! critical section, so this type owns no locking of its own.

#![cfg_attr(not(feature = "enabled"), allow(unused))]

#[cfg(feature = "enabled")]
mod implementation
{
  use iron_types::AgentId;
  use std::collections::{ HashMap, HashSet };

  /// Directed wait-for graph: `agent -> resources it awaits` plus the
  /// reverse index of current resource ownership.
  #[ derive( Debug, Default ) ]
  pub struct DeadlockDetector
  {
    wait_for: HashMap< AgentId, HashSet< String > >,
    owners: HashMap< String, AgentId >,
  }

  /// Diagnostic snapshot of the wait-for graph.
  #[ derive( Debug, Clone ) ]
  pub struct DeadlockStatus
  {
    /// Cycles currently present in the agent-to-agent wait-for graph.
    /// Should always be empty in a correctly operating system, since
    /// `would_cause_deadlock` rejects the edge that would create one.
    pub cycles: Vec< Vec< AgentId > >,
  }

  impl DeadlockDetector
  {
    /// Construct an empty detector.
    pub fn new() -> Self
    {
      Self::default()
    }

    /// True iff granting `resource` to `agent` (i.e. adding the wait edge
    /// `agent -> resource`) would close a cycle: a path from `resource`'s
    /// current owner back to `agent` via existing wait-for edges.
    ///
    /// Implemented as DFS reachability from the owner, since the new edge
    /// only matters if the owner can already (transitively) reach the
    /// requester.
    pub fn would_cause_deadlock( &self, agent: &AgentId, resource: &str ) -> bool
    {
      let Some( owner ) = self.owners.get( resource ) else { return false };

      if owner == agent
      {
        return false;
      }

      let mut visited = HashSet::new();
      self.reaches( owner, agent, &mut visited )
    }

    fn reaches( &self, from: &AgentId, target: &AgentId, visited: &mut HashSet< AgentId > ) -> bool
    {
      if from == target
      {
        return true;
      }

      if !visited.insert( from.clone() )
      {
        return false;
      }

      let Some( awaited ) = self.wait_for.get( from ) else { return false };

      for resource in awaited
      {
        if let Some( owner ) = self.owners.get( resource )
        {
          if self.reaches( owner, target, visited )
          {
            return true;
          }
        }
      }

      false
    }

    /// Record that `agent` is now waiting on `resource`.
    pub fn add_wait_edge( &mut self, agent: AgentId, resource: impl Into< String > )
    {
      self.wait_for.entry( agent ).or_default().insert( resource.into() );
    }

    /// Remove the wait edge `agent -> resource`, if present.
    pub fn remove_wait_edge( &mut self, agent: &AgentId, resource: &str )
    {
      if let Some( set ) = self.wait_for.get_mut( agent )
      {
        set.remove( resource );
        if set.is_empty()
        {
          self.wait_for.remove( agent );
        }
      }
    }

    /// Record that `agent` now owns `resource`, clearing any wait edge it
    /// held on that same resource.
    pub fn acquire_resource( &mut self, agent: AgentId, resource: impl Into< String > )
    {
      let resource = resource.into();
      self.remove_wait_edge( &agent, &resource );
      self.owners.insert( resource, agent );
    }

    /// Record that `resource` is no longer owned by anyone.
    pub fn release_resource( &mut self, resource: &str )
    {
      self.owners.remove( resource );
    }

    /// Enumerate cycles currently present in the agent-to-agent projection
    /// of the wait-for graph, for diagnostics.
    pub fn status( &self ) -> DeadlockStatus
    {
      let mut cycles = Vec::new();
      let mut globally_visited = HashSet::new();

      for agent in self.wait_for.keys()
      {
        if globally_visited.contains( agent )
        {
          continue;
        }

        let mut path = Vec::new();
        let mut on_path = HashSet::new();
        self.find_cycle( agent, &mut path, &mut on_path, &mut globally_visited, &mut cycles );
      }

      DeadlockStatus { cycles }
    }

    fn find_cycle( &self, current: &AgentId, path: &mut Vec< AgentId >, on_path: &mut HashSet< AgentId >, globally_visited: &mut HashSet< AgentId >, cycles: &mut Vec< Vec< AgentId > > )
    {
      if on_path.contains( current )
      {
        let start = path.iter().position( | a | a == current ).unwrap_or( 0 );
        cycles.push( path[ start.. ].to_vec() );
        return;
      }

      if globally_visited.contains( current )
      {
        return;
      }

      path.push( current.clone() );
      on_path.insert( current.clone() );

      if let Some( awaited ) = self.wait_for.get( current )
      {
        for resource in awaited
        {
          if let Some( owner ) = self.owners.get( resource )
          {
            self.find_cycle( owner, path, on_path, globally_visited, cycles );
          }
        }
      }

      path.pop();
      on_path.remove( current );
      globally_visited.insert( current.clone() );
    }
  }

  #[ cfg( test ) ]
  mod tests
  {
    use super::*;

    #[ test ]
    fn no_owner_means_no_deadlock()
    {
      let d = DeadlockDetector::new();
      assert!( !d.would_cause_deadlock( &AgentId::generate(), "R" ) );
    }

    // Scenario S4: A owns X, B owns Y; A requests Y, B requests X.
    #[ test ]
    fn scenario_s4_cross_wait_is_detected()
    {
      let mut d = DeadlockDetector::new();
      let a = AgentId::generate();
      let b = AgentId::generate();

      d.acquire_resource( a.clone(), "X" );
      d.acquire_resource( b.clone(), "Y" );

      // A requests Y: owner(Y) = B, B awaits nothing yet -> no cycle.
      assert!( !d.would_cause_deadlock( &a, "Y" ) );
      d.add_wait_edge( a.clone(), "Y" );

      // B requests X: owner(X) = A, A awaits Y whose owner is B -> cycle.
      assert!( d.would_cause_deadlock( &b, "X" ) );
    }

    #[ test ]
    fn acquiring_clears_own_wait_edge()
    {
      let mut d = DeadlockDetector::new();
      let a = AgentId::generate();
      d.add_wait_edge( a.clone(), "R" );
      d.acquire_resource( a.clone(), "R" );
      assert!( !d.would_cause_deadlock( &AgentId::generate(), "R" ) );
    }

    #[ test ]
    fn status_reports_no_cycles_when_graph_is_acyclic()
    {
      let mut d = DeadlockDetector::new();
      let a = AgentId::generate();
      let b = AgentId::generate();
      d.acquire_resource( b.clone(), "Y" );
      d.add_wait_edge( a, "Y" );
      assert!( d.status().cycles.is_empty() );
    }
  }
}

#[cfg(feature = "enabled")]
pub use implementation::*;
