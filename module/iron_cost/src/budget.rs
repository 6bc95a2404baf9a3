//! The Budget Manager: single source of truth for remaining spend and the
//! serializer of validate-and-reserve.
//!
//! The ledger (`total`, `reserved`, the reserved-operations map, and the
//! completed-operations history) is owned exclusively by [`BudgetManager`]
//! and mutated only while holding its internal mutex. Readers outside the
//! critical section only ever observe quiescent snapshots via
//! [`BudgetManager::snapshot`].

#![cfg_attr(not(feature = "enabled"), allow(unused))]

#[cfg(feature = "enabled")]
mod implementation
{
  use crate::converter::{ micros_to_usd, usd_to_micros };
  use iron_circuit_breaker::CircuitBreaker;
  use iron_types::{ AgentId, BudgetError, CostOverrunError, Error, OperationId, Priority, Result };
  use std::collections::HashMap;
  use std::sync::Arc;
  use std::time::{ Duration, Instant };
  use tokio::sync::Mutex;

  /// Immutable configuration for a [`BudgetManager`].
  ///
  /// `min_reserve_micros` and `max_budget_micros` are fixed at construction;
  /// nothing in this crate mutates them afterward.
  #[ derive( Debug, Clone ) ]
  pub struct BudgetConfig
  {
    /// Hard ceiling on `total + reserved`, in microdollars.
    pub max_budget_micros: u64,
    /// Floor that must remain unreserved after any new reservation.
    pub min_reserve_micros: u64,
    /// Fraction of `max_budget` at which `validate_operation` emits a warning.
    pub warning_threshold: f64,
    /// How long a reservation may sit before the cleanup sweep expires it.
    pub step_timeout: Duration,
    /// Model identifier this budget is scoped to (diagnostics only).
    pub model: String,
  }

  impl BudgetConfig
  {
    /// Construct a config from USD amounts, converting to the ledger's
    /// internal microdollar unit.
    ///
    /// Panics if `min_reserve_usd > max_budget_usd`: that configuration can
    /// never approve a single operation, so it is treated as a
    /// misconfiguration rather than a valid (if useless) state.
    pub fn new( max_budget_usd: f64, min_reserve_usd: f64, warning_threshold: f64, step_timeout: Duration, model: impl Into< String > ) -> Self
    {
      let max_budget_micros = usd_to_micros( max_budget_usd );
      let min_reserve_micros = usd_to_micros( min_reserve_usd );
      assert!( max_budget_micros >= min_reserve_micros, "max_budget must be >= min_reserve" );

      Self { max_budget_micros, min_reserve_micros, warning_threshold, step_timeout, model: model.into() }
    }
  }

  /// Terminal or in-flight state of a single tracked [`Operation`].
  #[ derive( Debug, Clone, Copy, PartialEq, Eq ) ]
  pub enum OperationStatus
  {
    Reserved,
    Completed,
    Expired,
    Released,
  }

  /// A single unit of billable work tracked by the ledger.
  #[ derive( Debug, Clone ) ]
  pub struct Operation
  {
    pub operation_id: OperationId,
    pub estimated_cost_micros: u64,
    pub actual_cost_micros: u64,
    pub agent_id: AgentId,
    pub priority: Priority,
    pub timestamp: Instant,
    pub status: OperationStatus,
    pub completed_at: Option< Instant >,
  }

  /// Outcome of a successful `validate_operation` call.
  #[ derive( Debug, Clone, Copy ) ]
  pub struct ReservationApproval
  {
    pub approved: bool,
    pub remaining_micros: u64,
    pub utilization_percent: f64,
  }

  /// Outcome of a `record_usage` call: the actual-vs-estimated variance.
  #[ derive( Debug, Clone, Copy ) ]
  pub struct UsageVariance
  {
    pub estimated_micros: u64,
    pub actual_micros: u64,
    pub variance_micros: i64,
  }

  /// Point-in-time view of the ledger, safe to hand to external observers.
  #[ derive( Debug, Clone, Copy ) ]
  pub struct LedgerSnapshot
  {
    pub total_micros: u64,
    pub reserved_micros: u64,
    pub max_budget_micros: u64,
  }

  struct Ledger
  {
    total_micros: u64,
    reserved_micros: u64,
    operations: HashMap< OperationId, Operation >,
    history: Vec< Operation >,
  }

  /// Per-priority-bucket allocation from [`BudgetManager::allocate_budget`].
  #[ derive( Debug, Clone ) ]
  pub struct AllocationReport
  {
    pub high_micros: u64,
    pub medium_micros: u64,
    pub low_micros: u64,
  }

  /// A task tagged with priority and estimated cost, as consumed by
  /// `allocate_budget`. Planning-only: it never touches the ledger.
  #[ derive( Debug, Clone ) ]
  pub struct AllocationRequest
  {
    pub priority: Priority,
    pub estimated_cost_micros: u64,
  }

  /// The Budget Manager: validate-and-reserve, usage recording, release, and
  /// expiry cleanup over a single mutex-guarded ledger.
  pub struct BudgetManager
  {
    config: BudgetConfig,
    breaker: Arc< CircuitBreaker >,
    ledger: Mutex< Ledger >,
  }

  impl BudgetManager
  {
    /// Construct a manager with an empty ledger, guarded by `breaker`.
    pub fn new( config: BudgetConfig, breaker: Arc< CircuitBreaker > ) -> Self
    {
      Self
      {
        config,
        breaker,
        ledger: Mutex::new( Ledger
        {
          total_micros: 0,
          reserved_micros: 0,
          operations: HashMap::new(),
          history: Vec::new(),
        } ),
      }
    }

    /// Read-only view of the config this manager was constructed with.
    pub fn config( &self ) -> &BudgetConfig
    {
      &self.config
    }

    /// Validate and reserve `estimated_cost_usd` against the ledger for
    /// `operation_id`.
    ///
    /// Circuit-breaker success is *not* recorded here; only the paired
    /// `record_usage` at completion counts as a successful operation, per
    /// the resolved Open Question on breaker semantics. Every failure path
    /// below records a breaker failure instead.
    pub async fn validate_operation( &self, operation_id: OperationId, estimated_cost_usd: f64, agent_id: AgentId, priority: Priority ) -> Result< ReservationApproval >
    {
      if !self.breaker.can_execute()
      {
        self.breaker.record_failure();
        return Err( Error::Budget( BudgetError::CircuitOpen ) );
      }

      let estimated_cost_micros = usd_to_micros( estimated_cost_usd );
      let mut ledger = self.ledger.lock().await;

      let projected = ledger.total_micros + ledger.reserved_micros + estimated_cost_micros;

      if projected > self.config.max_budget_micros
      {
        drop( ledger );
        self.breaker.record_failure();
        return Err( Error::CostOverrun( CostOverrunError { projected, max_budget: self.config.max_budget_micros } ) );
      }

      if self.config.max_budget_micros - projected < self.config.min_reserve_micros
      {
        drop( ledger );
        self.breaker.record_failure();
        return Err( Error::Budget( BudgetError::ReserveViolation { requested: estimated_cost_micros, min_reserve: self.config.min_reserve_micros } ) );
      }

      ledger.reserved_micros += estimated_cost_micros;
      ledger.operations.insert( operation_id.clone(), Operation
      {
        operation_id: operation_id.clone(),
        estimated_cost_micros,
        actual_cost_micros: 0,
        agent_id: agent_id.clone(),
        priority,
        timestamp: Instant::now(),
        status: OperationStatus::Reserved,
        completed_at: None,
      } );

      let utilization_percent = projected as f64 / self.config.max_budget_micros as f64;
      let remaining_micros = self.config.max_budget_micros - projected;

      drop( ledger );

      if utilization_percent >= self.config.warning_threshold
      {
        iron_telemetry::log_budget_warning( &agent_id.to_string(), micros_to_usd( projected ), micros_to_usd( self.config.max_budget_micros ) );
      }

      Ok( ReservationApproval { approved: true, remaining_micros, utilization_percent } )
    }

    /// Record the actual cost of a previously reserved operation, moving it
    /// from `reserved` into `history` and recording the one circuit-breaker
    /// success this manager ever emits.
    pub async fn record_usage( &self, operation_id: &OperationId, actual_cost_usd: f64 ) -> Result< UsageVariance >
    {
      let actual_cost_micros = usd_to_micros( actual_cost_usd );
      let mut ledger = self.ledger.lock().await;

      let mut operation = ledger
        .operations
        .remove( operation_id )
        .ok_or_else( || Error::Budget( BudgetError::Untracked( operation_id.to_string() ) ) )?;

      ledger.reserved_micros = ledger.reserved_micros.saturating_sub( operation.estimated_cost_micros );
      ledger.total_micros += actual_cost_micros;

      operation.actual_cost_micros = actual_cost_micros;
      operation.status = OperationStatus::Completed;
      operation.completed_at = Some( Instant::now() );

      let variance = UsageVariance
      {
        estimated_micros: operation.estimated_cost_micros,
        actual_micros: actual_cost_micros,
        variance_micros: actual_cost_micros as i64 - operation.estimated_cost_micros as i64,
      };

      let agent_id = operation.agent_id.clone();
      ledger.history.push( operation );

      drop( ledger );

      self.breaker.record_success();
      iron_telemetry::log_budget_operation( &operation_id.to_string(), &agent_id.to_string(), "completed" );

      Ok( variance )
    }

    /// Release a reservation without recording usage: the canonical cleanup
    /// path when a reserved operation fails before completion.
    pub async fn release_reservation( &self, operation_id: &OperationId ) -> Result< () >
    {
      let mut ledger = self.ledger.lock().await;

      let operation = ledger
        .operations
        .get( operation_id )
        .ok_or_else( || Error::Budget( BudgetError::Untracked( operation_id.to_string() ) ) )?;

      if operation.status != OperationStatus::Reserved
      {
        return Err( Error::Budget( BudgetError::NotReserved( operation_id.to_string() ) ) );
      }

      let estimated = operation.estimated_cost_micros;
      let agent_id = operation.agent_id.clone();
      ledger.reserved_micros = ledger.reserved_micros.saturating_sub( estimated );
      ledger.operations.remove( operation_id );

      drop( ledger );

      iron_telemetry::log_budget_operation( &operation_id.to_string(), &agent_id.to_string(), "released" );

      Ok( () )
    }

    /// Produce a planning-only allocation report across priority buckets.
    ///
    /// HIGH is funded first; if HIGH alone exceeds the available budget the
    /// whole allocation fails. MEDIUM and LOW share whatever remains,
    /// scaled proportionally if their combined request exceeds it. This
    /// never mutates the ledger: callers must separately call
    /// `validate_operation` per task, since a plan may be discarded before
    /// any task actually runs.
    pub async fn allocate_budget( &self, requests: &[ AllocationRequest ] ) -> Result< AllocationReport >
    {
      let ledger = self.ledger.lock().await;
      let available = self.config.max_budget_micros.saturating_sub( ledger.total_micros + ledger.reserved_micros );
      drop( ledger );

      let high_total: u64 = requests.iter().filter( | r | r.priority == Priority::High ).map( | r | r.estimated_cost_micros ).sum();
      let medium_total: u64 = requests.iter().filter( | r | r.priority == Priority::Medium ).map( | r | r.estimated_cost_micros ).sum();
      let low_total: u64 = requests.iter().filter( | r | r.priority == Priority::Low ).map( | r | r.estimated_cost_micros ).sum();

      if high_total > available
      {
        return Err( Error::CostOverrun( CostOverrunError { projected: high_total, max_budget: available } ) );
      }

      let remainder = available - high_total;
      let mid_low_total = medium_total + low_total;

      let ( medium_micros, low_micros ) = if mid_low_total == 0 || mid_low_total <= remainder
      {
        ( medium_total, low_total )
      }
      else
      {
        let scale = remainder as f64 / mid_low_total as f64;
        ( ( medium_total as f64 * scale ) as u64, ( low_total as f64 * scale ) as u64 )
      };

      Ok( AllocationReport { high_micros: high_total, medium_micros, low_micros } )
    }

    /// Sweep the ledger once, force-releasing any reservation older than
    /// `step_timeout`. Returns the ids expired so the caller can emit
    /// `operationExpired` per id.
    pub async fn cleanup( &self ) -> Vec< OperationId >
    {
      let mut ledger = self.ledger.lock().await;
      let now = Instant::now();
      let step_timeout = self.config.step_timeout;

      let expired_ids: Vec< OperationId > = ledger
        .operations
        .values()
        .filter( | op | now.duration_since( op.timestamp ) > step_timeout )
        .map( | op | op.operation_id.clone() )
        .collect();

      for id in &expired_ids
      {
        if let Some( op ) = ledger.operations.remove( id )
        {
          ledger.reserved_micros = ledger.reserved_micros.saturating_sub( op.estimated_cost_micros );
          iron_telemetry::log_budget_operation( &id.to_string(), &op.agent_id.to_string(), "expired" );
        }
      }

      expired_ids
    }

    /// Run `cleanup` on a fixed interval until the returned handle is
    /// aborted or dropped.
    pub fn spawn_cleanup_loop( self: Arc< Self >, interval: Duration ) -> tokio::task::JoinHandle< () >
    {
      tokio::spawn( async move
      {
        let mut ticker = tokio::time::interval( interval );
        loop
        {
          ticker.tick().await;
          let expired = self.cleanup().await;
          if !expired.is_empty()
          {
            tracing::debug!( count = expired.len(), "budget cleanup expired reservations" );
          }
        }
      } )
    }

    /// A quiescent, read-only view of the ledger's totals.
    pub async fn snapshot( &self ) -> LedgerSnapshot
    {
      let ledger = self.ledger.lock().await;
      LedgerSnapshot
      {
        total_micros: ledger.total_micros,
        reserved_micros: ledger.reserved_micros,
        max_budget_micros: self.config.max_budget_micros,
      }
    }
  }

  #[ cfg( test ) ]
  mod tests
  {
    use super::*;
    use iron_circuit_breaker::CircuitBreakerConfig;
    fn manager( max_budget_usd: f64, min_reserve_usd: f64 ) -> BudgetManager
    {
      let breaker = Arc::new( CircuitBreaker::new( CircuitBreakerConfig::default() ) );
      let config = BudgetConfig::new( max_budget_usd, min_reserve_usd, 0.8, Duration::from_millis( 50 ), "gpt-4" );
      BudgetManager::new( config, breaker )
    }

    #[ tokio::test ]
    async fn reserve_and_complete_round_trip()
    {
      let m = manager( 10.0, 0.0 );
      let id = OperationId::generate();
      let approval = m.validate_operation( id.clone(), 3.0, AgentId::generate(), Priority::Medium ).await.unwrap();
      assert!( approval.approved );

      let snap = m.snapshot().await;
      assert_eq!( snap.reserved_micros, usd_to_micros( 3.0 ) );

      let variance = m.record_usage( &id, 2.5 ).await.unwrap();
      assert_eq!( variance.actual_micros, usd_to_micros( 2.5 ) );

      let snap = m.snapshot().await;
      assert_eq!( snap.reserved_micros, 0 );
      assert_eq!( snap.total_micros, usd_to_micros( 2.5 ) );
    }

    #[ tokio::test ]
    async fn cost_overrun_is_rejected()
    {
      let m = manager( 1.0, 0.0 );
      let err = m.validate_operation( OperationId::generate(), 2.0, AgentId::generate(), Priority::High ).await.unwrap_err();
      assert!( matches!( err, Error::CostOverrun( _ ) ) );
    }

    #[ tokio::test ]
    async fn reserve_violation_when_below_min_reserve()
    {
      let m = manager( 10.0, 8.0 );
      let err = m.validate_operation( OperationId::generate(), 5.0, AgentId::generate(), Priority::Low ).await.unwrap_err();
      assert!( matches!( err, Error::Budget( BudgetError::ReserveViolation { .. } ) ) );
    }

    // Scenario S2: reservation release on failure.
    #[ tokio::test ]
    async fn scenario_s2_release_then_untracked_usage()
    {
      let m = manager( 10.0, 0.0 );
      let id = OperationId::generate();
      m.validate_operation( id.clone(), 3.0, AgentId::generate(), Priority::Medium ).await.unwrap();

      m.release_reservation( &id ).await.unwrap();
      assert_eq!( m.snapshot().await.reserved_micros, 0 );

      let err = m.record_usage( &id, 1.0 ).await.unwrap_err();
      assert!( matches!( err, Error::Budget( BudgetError::Untracked( _ ) ) ) );
    }

    #[ tokio::test ]
    async fn release_of_unknown_operation_fails()
    {
      let m = manager( 10.0, 0.0 );
      let err = m.release_reservation( &OperationId::generate() ).await.unwrap_err();
      assert!( matches!( err, Error::Budget( BudgetError::Untracked( _ ) ) ) );
    }

    #[ tokio::test ]
    async fn cleanup_expires_stale_reservations()
    {
      let m = manager( 10.0, 0.0 );
      let id = OperationId::generate();
      m.validate_operation( id.clone(), 1.0, AgentId::generate(), Priority::Low ).await.unwrap();

      tokio::time::sleep( Duration::from_millis( 80 ) ).await;

      let expired = m.cleanup().await;
      assert_eq!( expired, vec![ id ] );
      assert_eq!( m.snapshot().await.reserved_micros, 0 );
    }

    #[ tokio::test ]
    async fn allocate_budget_does_not_mutate_ledger()
    {
      let m = manager( 10.0, 0.0 );
      let requests = vec!
      [
        AllocationRequest { priority: Priority::High, estimated_cost_micros: usd_to_micros( 4.0 ) },
        AllocationRequest { priority: Priority::Medium, estimated_cost_micros: usd_to_micros( 4.0 ) },
        AllocationRequest { priority: Priority::Low, estimated_cost_micros: usd_to_micros( 4.0 ) },
      ];

      let report = m.allocate_budget( &requests ).await.unwrap();
      assert_eq!( report.high_micros, usd_to_micros( 4.0 ) );
      assert!( report.medium_micros + report.low_micros <= usd_to_micros( 6.0 ) + 1 );

      // Reports never reserve.
      assert_eq!( m.snapshot().await.reserved_micros, 0 );
    }

    #[ tokio::test ]
    async fn allocate_budget_fails_when_high_alone_overflows()
    {
      let m = manager( 1.0, 0.0 );
      let requests = vec![ AllocationRequest { priority: Priority::High, estimated_cost_micros: usd_to_micros( 2.0 ) } ];
      assert!( m.allocate_budget( &requests ).await.is_err() );
    }

    // Scenario S1: concurrent validate_operation calls must never double-spend.
    #[ tokio::test ]
    async fn scenario_s1_budget_race_no_double_spend()
    {
      let m = Arc::new( manager( 10.0, 0.0 ) );
      let mut handles = Vec::new();

      for _ in 0..100u32
      {
        let m = Arc::clone( &m );
        handles.push( tokio::spawn( async move
        {
          m.validate_operation( OperationId::generate(), 0.20, AgentId::generate(), Priority::Medium ).await
        } ) );
      }

      let mut approved = 0;
      let mut rejected = 0;
      for h in handles
      {
        match h.await.unwrap()
        {
          Ok( _ ) => approved += 1,
          Err( _ ) => rejected += 1,
        }
      }

      assert_eq!( approved, 50 );
      assert_eq!( rejected, 50 );
      assert_eq!( m.snapshot().await.reserved_micros, usd_to_micros( 10.0 ) );
      assert_eq!( m.snapshot().await.total_micros, 0 );
    }
  }
}

#[cfg(feature = "enabled")]
pub use implementation::*;
