//! Three-state circuit breaker protecting the budget subsystem from
//! cascading failures against an unreliable dependency.
//!
//! States: `CLOSED` (requests pass, failures counted), `OPEN` (requests
//! rejected until the reset timeout elapses), `HALF_OPEN` (probe requests
//! pass; enough successes close the breaker, any failure reopens it).

#![cfg_attr(not(feature = "enabled"), allow(unused))]

#[cfg(feature = "enabled")]
mod implementation
{
  use serde::{ Deserialize, Serialize };
  use std::sync::Mutex;
  use std::time::{ Duration, Instant };

  /// Circuit breaker configuration.
  #[ derive( Debug, Clone, Copy, Serialize, Deserialize ) ]
  #[ serde( default ) ]
  pub struct CircuitBreakerConfig
  {
    /// Consecutive failures in CLOSED before transitioning to OPEN.
    pub failure_threshold: u32,
    /// How long OPEN is held before a probe is allowed through.
    pub reset_timeout: Duration,
    /// Consecutive successes in HALF_OPEN required to transition to CLOSED.
    pub success_threshold: u32,
  }

  impl Default for CircuitBreakerConfig
  {
    fn default() -> Self
    {
      Self
      {
        failure_threshold: 5,
        reset_timeout: Duration::from_secs(30),
        success_threshold: 2,
      }
    }
  }

  /// Circuit breaker state.
  #[ derive( Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize ) ]
  pub enum CircuitState
  {
    Closed,
    Open,
    HalfOpen,
  }

  #[ derive( Debug ) ]
  struct Inner
  {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    last_failure_time: Option< Instant >,
    next_attempt_time: Option< Instant >,
  }

  /// Snapshot of breaker state for diagnostics.
  #[ derive( Debug, Clone, Copy, PartialEq, Eq ) ]
  pub struct CircuitSnapshot
  {
    pub state: CircuitState,
    pub failure_count: u32,
    pub success_count: u32,
  }

  fn state_label( state: CircuitState ) -> &'static str
  {
    match state
    {
      CircuitState::Closed => "closed",
      CircuitState::Open => "open",
      CircuitState::HalfOpen => "half_open",
    }
  }

  /// A single circuit breaker instance.
  ///
  /// `can_execute` is a pure read of state and the clock. `record_success`
  /// and `record_failure` mutate state and are serialized by a single
  /// mutex, so two concurrent failures cannot both half-transition and a
  /// success arriving after the reset timeout deterministically moves
  /// OPEN -> HALF_OPEN rather than staying OPEN.
  #[ derive( Debug ) ]
  pub struct CircuitBreaker
  {
    config: CircuitBreakerConfig,
    inner: Mutex< Inner >,
  }

  impl CircuitBreaker
  {
    /// Create a new breaker in the CLOSED state.
    pub fn new( config: CircuitBreakerConfig ) -> Self
    {
      Self
      {
        config,
        inner: Mutex::new( Inner
        {
          state: CircuitState::Closed,
          failure_count: 0,
          success_count: 0,
          last_failure_time: None,
          next_attempt_time: None,
        } ),
      }
    }

    /// Returns true if a request may proceed.
    ///
    /// OPEN transitions to HALF_OPEN as a side effect once the reset
    /// timeout has elapsed, so the next probe is allowed through; this is
    /// the "next attempt passes" behavior required by the spec, kept
    /// inside the same serialized section as the other mutations so a
    /// concurrent failure cannot race the transition.
    pub fn can_execute( &self ) -> bool
    {
      let mut inner = self.inner.lock().unwrap_or_else( | e | e.into_inner() );

      match inner.state
      {
        CircuitState::Closed => true,
        CircuitState::HalfOpen => true,
        CircuitState::Open =>
        {
          let ready = inner
            .next_attempt_time
            .is_some_and( | t | Instant::now() >= t );

          if ready
          {
            inner.state = CircuitState::HalfOpen;
            inner.success_count = 0;
            iron_telemetry::log_circuit_transition( state_label( CircuitState::Open ), state_label( CircuitState::HalfOpen ) );
            true
          }
          else
          {
            false
          }
        }
      }
    }

    /// Record a successful operation outcome.
    pub fn record_success( &self )
    {
      let mut inner = self.inner.lock().unwrap_or_else( | e | e.into_inner() );

      match inner.state
      {
        CircuitState::Closed =>
        {
          inner.failure_count = 0;
        }
        CircuitState::HalfOpen =>
        {
          inner.success_count += 1;
          if inner.success_count >= self.config.success_threshold
          {
            inner.state = CircuitState::Closed;
            inner.failure_count = 0;
            inner.success_count = 0;
            inner.next_attempt_time = None;
            iron_telemetry::log_circuit_transition( state_label( CircuitState::HalfOpen ), state_label( CircuitState::Closed ) );
          }
        }
        CircuitState::Open =>
        {
          // A success cannot be observed while rejecting; ignore defensively.
        }
      }
    }

    /// Record a failed operation outcome.
    pub fn record_failure( &self )
    {
      let mut inner = self.inner.lock().unwrap_or_else( | e | e.into_inner() );
      let now = Instant::now();
      inner.last_failure_time = Some( now );

      match inner.state
      {
        CircuitState::Closed =>
        {
          inner.failure_count += 1;
          if inner.failure_count >= self.config.failure_threshold
          {
            inner.state = CircuitState::Open;
            inner.next_attempt_time = Some( now + self.config.reset_timeout );
            iron_telemetry::log_circuit_transition( state_label( CircuitState::Closed ), state_label( CircuitState::Open ) );
          }
        }
        CircuitState::HalfOpen =>
        {
          inner.state = CircuitState::Open;
          inner.success_count = 0;
          inner.next_attempt_time = Some( now + self.config.reset_timeout );
          iron_telemetry::log_circuit_transition( state_label( CircuitState::HalfOpen ), state_label( CircuitState::Open ) );
        }
        CircuitState::Open =>
        {
          inner.next_attempt_time = Some( now + self.config.reset_timeout );
        }
      }
    }

    /// Force the breaker back to CLOSED, clearing counters.
    pub fn reset( &self )
    {
      let mut inner = self.inner.lock().unwrap_or_else( | e | e.into_inner() );
      inner.state = CircuitState::Closed;
      inner.failure_count = 0;
      inner.success_count = 0;
      inner.last_failure_time = None;
      inner.next_attempt_time = None;
    }

    /// Current state, for diagnostics and tests.
    pub fn snapshot( &self ) -> CircuitSnapshot
    {
      let inner = self.inner.lock().unwrap_or_else( | e | e.into_inner() );
      CircuitSnapshot
      {
        state: inner.state,
        failure_count: inner.failure_count,
        success_count: inner.success_count,
      }
    }
  }

  #[ cfg( test ) ]
  mod tests
  {
    use super::*;

    fn breaker() -> CircuitBreaker
    {
      CircuitBreaker::new( CircuitBreakerConfig
      {
        failure_threshold: 3,
        reset_timeout: Duration::from_millis( 100 ),
        success_threshold: 2,
      } )
    }

    #[ test ]
    fn starts_closed_and_allows_requests()
    {
      let b = breaker();
      assert!( b.can_execute() );
      assert_eq!( b.snapshot().state, CircuitState::Closed );
    }

    #[ test ]
    fn opens_after_failure_threshold()
    {
      let b = breaker();
      b.record_failure();
      b.record_failure();
      assert_eq!( b.snapshot().state, CircuitState::Closed );
      b.record_failure();
      assert_eq!( b.snapshot().state, CircuitState::Open );
      assert!( !b.can_execute() );
    }

    #[ test ]
    fn success_in_closed_resets_failure_count()
    {
      let b = breaker();
      b.record_failure();
      b.record_failure();
      b.record_success();
      assert_eq!( b.snapshot().failure_count, 0 );
      b.record_failure();
      b.record_failure();
      assert_eq!( b.snapshot().state, CircuitState::Closed );
    }

    #[ test ]
    fn scenario_s6_probe_sequence()
    {
      let b = breaker();
      b.record_failure();
      b.record_failure();
      b.record_failure();
      assert_eq!( b.snapshot().state, CircuitState::Open );
      assert!( !b.can_execute() );

      std::thread::sleep( Duration::from_millis( 120 ) );

      // Next probe moves OPEN -> HALF_OPEN and is allowed through.
      assert!( b.can_execute() );
      assert_eq!( b.snapshot().state, CircuitState::HalfOpen );

      b.record_success();
      assert_eq!( b.snapshot().state, CircuitState::HalfOpen );
      assert_eq!( b.snapshot().success_count, 1 );

      b.record_success();
      assert_eq!( b.snapshot().state, CircuitState::Closed );
    }

    #[ test ]
    fn failure_in_half_open_reopens_and_resets_timer()
    {
      let b = breaker();
      b.record_failure();
      b.record_failure();
      b.record_failure();
      std::thread::sleep( Duration::from_millis( 120 ) );
      assert!( b.can_execute() );
      assert_eq!( b.snapshot().state, CircuitState::HalfOpen );

      b.record_failure();
      assert_eq!( b.snapshot().state, CircuitState::Open );
      assert!( !b.can_execute() );
    }

    #[ test ]
    fn reset_clears_all_state()
    {
      let b = breaker();
      b.record_failure();
      b.record_failure();
      b.record_failure();
      assert_eq!( b.snapshot().state, CircuitState::Open );
      b.reset();
      assert_eq!( b.snapshot().state, CircuitState::Closed );
      assert!( b.can_execute() );
    }
  }
}

#[cfg(feature = "enabled")]
pub use implementation::*;
