//! Scenario: circuit breaker probe sequence (failureThreshold=3,
//! resetTimeout=100ms, successThreshold=2).

use iron_circuit_breaker::{ CircuitBreaker, CircuitBreakerConfig, CircuitState };
use std::time::Duration;

#[test]
fn breaker_lattice_has_no_skipped_transitions()
{
  let breaker = CircuitBreaker::new( CircuitBreakerConfig
  {
    failure_threshold: 3,
    reset_timeout: Duration::from_millis( 100 ),
    success_threshold: 2,
  } );

  assert_eq!( breaker.snapshot().state, CircuitState::Closed );

  for _ in 0..3
  {
    breaker.record_failure();
  }
  assert_eq!( breaker.snapshot().state, CircuitState::Open );
  assert!( !breaker.can_execute(), "OPEN must reject before reset_timeout elapses" );

  std::thread::sleep( Duration::from_millis( 120 ) );
  assert!( breaker.can_execute(), "OPEN must allow a probe after reset_timeout elapses" );
  assert_eq!( breaker.snapshot().state, CircuitState::HalfOpen );

  breaker.record_success();
  assert_eq!( breaker.snapshot().state, CircuitState::HalfOpen, "one success is not enough to close" );

  breaker.record_success();
  assert_eq!( breaker.snapshot().state, CircuitState::Closed, "success_threshold successes close the breaker" );
}

#[test]
fn half_open_failure_reopens_breaker()
{
  let breaker = CircuitBreaker::new( CircuitBreakerConfig
  {
    failure_threshold: 1,
    reset_timeout: Duration::from_millis( 50 ),
    success_threshold: 1,
  } );

  breaker.record_failure();
  assert_eq!( breaker.snapshot().state, CircuitState::Open );

  std::thread::sleep( Duration::from_millis( 60 ) );
  assert!( breaker.can_execute() );
  assert_eq!( breaker.snapshot().state, CircuitState::HalfOpen );

  breaker.record_failure();
  assert_eq!( breaker.snapshot().state, CircuitState::Open );
  assert!( !breaker.can_execute() );
}
