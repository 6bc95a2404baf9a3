//! The Distributed Lock Manager: exclusive, bounded-wait access to a named
//! resource across concurrent agents within one process.
//!
//! "Distributed" here means across concurrent in-process callers, not
//! across machines — see the Non-goals in `spec.md` §1. Waiters resolve via
//! a `tokio::sync::oneshot` channel rather than a hand-rolled promise queue,
//! so a waiter's future is just a channel receive with a timeout race.

#![cfg_attr(not(feature = "enabled"), allow(unused))]

#[cfg(feature = "enabled")]
mod implementation
{
  use crate::deadlock::DeadlockDetector;
  use iron_types::{ AgentId, DeadlockError, Error, LockError, LockId, Result, TimeoutError };
  use std::collections::{ HashMap, VecDeque };
  use std::sync::atomic::{ AtomicBool, Ordering };
  use std::sync::Arc;
  use std::time::{ Duration, Instant };
  use tokio::sync::{ oneshot, Mutex };

  /// Lock manager configuration.
  #[ derive( Debug, Clone, Copy ) ]
  pub struct LockConfig
  {
    /// Used when a caller does not specify an explicit wait timeout.
    pub default_timeout: Duration,
    /// How often the expiry sweep runs.
    pub cleanup_interval: Duration,
  }

  impl Default for LockConfig
  {
    fn default() -> Self
    {
      Self { default_timeout: Duration::from_secs( 30 ), cleanup_interval: Duration::from_secs( 5 ) }
    }
  }

  /// A granted exclusive lock on `resource_id`.
  #[ derive( Debug, Clone ) ]
  pub struct Lock
  {
    pub resource_id: String,
    pub lock_id: LockId,
    pub agent_id: AgentId,
    pub acquired_at: Instant,
    pub expires_at: Instant,
  }

  impl Lock
  {
    fn is_expired( &self, now: Instant ) -> bool
    {
      now >= self.expires_at
    }
  }

  enum WaitOutcome
  {
    Granted( LockId ),
    TimedOut,
  }

  struct Waiter
  {
    lock_id: LockId,
    agent_id: AgentId,
    expires_at: Instant,
    cancelled: Arc< AtomicBool >,
    sender: Option< oneshot::Sender< WaitOutcome > >,
  }

  struct Inner
  {
    locks: HashMap< String, Lock >,
    lock_index: HashMap< LockId, String >,
    queues: HashMap< String, VecDeque< Waiter > >,
    graph: DeadlockDetector,
  }

  /// The Distributed Lock Manager.
  pub struct LockManager
  {
    config: LockConfig,
    inner: Mutex< Inner >,
  }

  impl LockManager
  {
    /// Construct a manager with an empty registry.
    pub fn new( config: LockConfig ) -> Self
    {
      Self
      {
        config,
        inner: Mutex::new( Inner
        {
          locks: HashMap::new(),
          lock_index: HashMap::new(),
          queues: HashMap::new(),
          graph: DeadlockDetector::new(),
        } ),
      }
    }

    /// Acquire an exclusive lock on `resource_id` for `agent_id`, waiting up
    /// to `timeout` if it is currently held.
    ///
    /// Fails immediately with [`Error::Deadlock`] if granting (or queueing
    /// for) this resource would close a cycle in the wait-for graph — the
    /// caller never waits for a lock that can only be released by something
    /// waiting on it.
    pub async fn acquire_lock( &self, resource_id: impl Into< String >, agent_id: AgentId, timeout: Duration ) -> Result< LockId >
    {
      let resource_id = resource_id.into();
      let mut inner = self.inner.lock().await;

      reap_expired( &mut inner, &resource_id );

      if inner.graph.would_cause_deadlock( &agent_id, &resource_id )
      {
        return Err( Error::Deadlock( DeadlockError { agent: agent_id.to_string(), resource: resource_id } ) );
      }

      if !inner.locks.contains_key( &resource_id )
      {
        let lock_id = LockId::generate();
        grant( &mut inner, &resource_id, agent_id.clone(), lock_id.clone(), timeout );
        iron_telemetry::log_lock_event( &resource_id, &agent_id.to_string(), "acquired" );
        return Ok( lock_id );
      }

      let lock_id = LockId::generate();
      let ( tx, rx ) = oneshot::channel();
      let cancelled = Arc::new( AtomicBool::new( false ) );
      let expires_at = Instant::now() + timeout;

      inner.graph.add_wait_edge( agent_id.clone(), resource_id.clone() );
      inner.queues.entry( resource_id.clone() ).or_default().push_back( Waiter
      {
        lock_id: lock_id.clone(),
        agent_id: agent_id.clone(),
        expires_at,
        cancelled: Arc::clone( &cancelled ),
        sender: Some( tx ),
      } );

      drop( inner );
      let mut rx = rx;

      tokio::select!
      {
        outcome = &mut rx =>
        {
          match outcome
          {
            Ok( WaitOutcome::Granted( id ) ) =>
            {
              iron_telemetry::log_lock_event( &resource_id, &agent_id.to_string(), "acquired" );
              Ok( id )
            }
            Ok( WaitOutcome::TimedOut ) | Err( _ ) =>
            {
              Err( Error::Timeout( TimeoutError( format!( "lock on {resource_id}" ) ) ) )
            }
          }
        }
        () = tokio::time::sleep_until( expires_at.into() ) =>
        {
          // Sticky: mark cancelled before this waiter can be observed as
          // grantable by a concurrent release/drain.
          cancelled.store( true, Ordering::SeqCst );
          let mut inner = self.inner.lock().await;

          // A concurrent drain may have already popped and granted this
          // waiter (under `inner`'s lock) before our `cancelled` store
          // became visible to it; `select!` only borrowed `rx` above, so
          // it is still ours to read here. Honor a grant that already
          // landed rather than discarding a lock nobody else will release.
          match rx.try_recv()
          {
            Ok( WaitOutcome::Granted( id ) ) =>
            {
              drop( inner );
              iron_telemetry::log_lock_event( &resource_id, &agent_id.to_string(), "acquired" );
              Ok( id )
            }
            _ =>
            {
              inner.graph.remove_wait_edge( &agent_id, &resource_id );
              iron_telemetry::log_lock_event( &resource_id, &agent_id.to_string(), "wait_timed_out" );
              Err( Error::Timeout( TimeoutError( format!( "lock on {resource_id}" ) ) ) )
            }
          }
        }
      }
    }

    /// Release `lock_id`, then grant the resource to at most one waiting
    /// agent (the first non-cancelled, non-expired entry in FIFO order).
    pub async fn release_lock( &self, lock_id: &LockId ) -> Result< () >
    {
      let mut inner = self.inner.lock().await;

      let resource_id = inner
        .lock_index
        .remove( lock_id )
        .ok_or_else( || Error::Lock( LockError::UnknownLock( lock_id.to_string() ) ) )?;

      if let Some( lock ) = inner.locks.remove( &resource_id )
      {
        inner.graph.release_resource( &resource_id );
        iron_telemetry::log_lock_event( &resource_id, &lock.agent_id.to_string(), "released" );
      }

      drain_queue( &mut inner, &resource_id );

      Ok( () )
    }

    /// True iff `lock_id` names a non-expired lock owned by `agent_id`.
    pub async fn verify_lock( &self, lock_id: &LockId, agent_id: &AgentId ) -> bool
    {
      let inner = self.inner.lock().await;
      let Some( resource_id ) = inner.lock_index.get( lock_id ) else { return false };
      let Some( lock ) = inner.locks.get( resource_id ) else { return false };

      &lock.agent_id == agent_id && !lock.is_expired( Instant::now() )
    }

    /// Revoke every expired lock, draining each affected resource's queue.
    /// Returns the resource ids that had an expired lock revoked.
    pub async fn cleanup( &self ) -> Vec< String >
    {
      let mut inner = self.inner.lock().await;
      let now = Instant::now();

      let expired_resources: Vec< String > = inner
        .locks
        .iter()
        .filter( | ( _, lock ) | lock.is_expired( now ) )
        .map( | ( resource, _ ) | resource.clone() )
        .collect();

      for resource_id in &expired_resources
      {
        if let Some( lock ) = inner.locks.remove( resource_id )
        {
          inner.lock_index.remove( &lock.lock_id );
          inner.graph.release_resource( resource_id );
          iron_telemetry::log_lock_event( resource_id, &lock.agent_id.to_string(), "expired" );
        }

        drain_queue( &mut inner, resource_id );
      }

      expired_resources
    }

    /// Run `cleanup` on `config.cleanup_interval` until the returned handle
    /// is aborted or dropped.
    pub fn spawn_cleanup_loop( self: Arc< Self > ) -> tokio::task::JoinHandle< () >
    {
      let interval = self.config.cleanup_interval;
      tokio::spawn( async move
      {
        let mut ticker = tokio::time::interval( interval );
        loop
        {
          ticker.tick().await;
          self.cleanup().await;
        }
      } )
    }

    /// The configured default wait timeout, for callers that don't specify
    /// their own.
    pub fn default_timeout( &self ) -> Duration
    {
      self.config.default_timeout
    }
  }

  fn reap_expired( inner: &mut Inner, resource_id: &str )
  {
    let now = Instant::now();
    let expired = inner.locks.get( resource_id ).is_some_and( | l | l.is_expired( now ) );

    if expired
    {
      if let Some( lock ) = inner.locks.remove( resource_id )
      {
        inner.lock_index.remove( &lock.lock_id );
        inner.graph.release_resource( resource_id );
      }
    }
  }

  fn grant( inner: &mut Inner, resource_id: &str, agent_id: AgentId, lock_id: LockId, timeout: Duration )
  {
    let now = Instant::now();
    inner.graph.acquire_resource( agent_id.clone(), resource_id.to_string() );
    inner.lock_index.insert( lock_id.clone(), resource_id.to_string() );
    inner.locks.insert( resource_id.to_string(), Lock
    {
      resource_id: resource_id.to_string(),
      lock_id,
      agent_id,
      acquired_at: now,
      expires_at: now + timeout,
    } );
  }

  /// Pop waiters for `resource_id` until one is granted the (now free)
  /// resource, or the queue runs dry. Only ever grants to a single waiter.
  fn drain_queue( inner: &mut Inner, resource_id: &str )
  {
    loop
    {
      let Some( queue ) = inner.queues.get_mut( resource_id ) else { return };
      let Some( mut waiter ) = queue.pop_front() else { return };

      if waiter.cancelled.load( Ordering::SeqCst )
      {
        continue;
      }

      if Instant::now() >= waiter.expires_at
      {
        waiter.cancelled.store( true, Ordering::SeqCst );
        if let Some( sender ) = waiter.sender.take()
        {
          let _ = sender.send( WaitOutcome::TimedOut );
        }
        continue;
      }

      let timeout_remaining = waiter.expires_at.saturating_duration_since( Instant::now() );
      grant( inner, resource_id, waiter.agent_id.clone(), waiter.lock_id.clone(), timeout_remaining );

      if let Some( sender ) = waiter.sender.take()
      {
        let _ = sender.send( WaitOutcome::Granted( waiter.lock_id ) );
      }

      return;
    }
  }

  #[ cfg( test ) ]
  mod tests
  {
    use super::*;

    fn manager() -> LockManager
    {
      LockManager::new( LockConfig { default_timeout: Duration::from_secs( 5 ), cleanup_interval: Duration::from_secs( 5 ) } )
    }

    #[ tokio::test ]
    async fn acquire_and_release_round_trip()
    {
      let lm = manager();
      let agent = AgentId::generate();
      let lock_id = lm.acquire_lock( "R", agent.clone(), Duration::from_secs( 1 ) ).await.unwrap();
      assert!( lm.verify_lock( &lock_id, &agent ).await );
      lm.release_lock( &lock_id ).await.unwrap();
      assert!( !lm.verify_lock( &lock_id, &agent ).await );
    }

    #[ tokio::test ]
    async fn second_acquirer_waits_and_is_granted_on_release()
    {
      let lm = Arc::new( manager() );
      let a = AgentId::generate();
      let b = AgentId::generate();

      let a_lock = lm.acquire_lock( "R", a, Duration::from_secs( 5 ) ).await.unwrap();

      let lm2 = Arc::clone( &lm );
      let b2 = b.clone();
      let waiting = tokio::spawn( async move { lm2.acquire_lock( "R", b2, Duration::from_secs( 5 ) ).await } );

      tokio::time::sleep( Duration::from_millis( 20 ) ).await;
      lm.release_lock( &a_lock ).await.unwrap();

      let b_lock = waiting.await.unwrap().unwrap();
      assert!( lm.verify_lock( &b_lock, &b ).await );
    }

    // Scenario S3: FIFO with cancellation. B times out, C gets the lock.
    #[ tokio::test ]
    async fn scenario_s3_fifo_with_cancellation()
    {
      let lm = Arc::new( manager() );
      let a = AgentId::generate();
      let b = AgentId::generate();
      let c = AgentId::generate();

      let a_lock = lm.acquire_lock( "R", a, Duration::from_millis( 300 ) ).await.unwrap();

      let lm_b = Arc::clone( &lm );
      let b2 = b.clone();
      let b_wait = tokio::spawn( async move { lm_b.acquire_lock( "R", b2, Duration::from_millis( 200 ) ).await } );

      tokio::time::sleep( Duration::from_millis( 20 ) ).await;

      let lm_c = Arc::clone( &lm );
      let c2 = c.clone();
      let c_wait = tokio::spawn( async move { lm_c.acquire_lock( "R", c2, Duration::from_secs( 2 ) ).await } );

      // B times out at t=220ms.
      let b_result = b_wait.await.unwrap();
      assert!( matches!( b_result, Err( Error::Timeout( _ ) ) ) );

      // A releases at t=300ms; C should receive the lock.
      tokio::time::sleep( Duration::from_millis( 290 ) ).await;
      lm.release_lock( &a_lock ).await.unwrap();

      let c_lock = c_wait.await.unwrap().unwrap();
      assert!( lm.verify_lock( &c_lock, &c ).await );
    }

    // Scenario S4: cross-wait must fail with DeadlockError, not hang.
    #[ tokio::test ]
    async fn scenario_s4_deadlock_avoidance()
    {
      let lm = Arc::new( manager() );
      let a = AgentId::generate();
      let b = AgentId::generate();

      let _x = lm.acquire_lock( "X", a.clone(), Duration::from_secs( 5 ) ).await.unwrap();
      let _y = lm.acquire_lock( "Y", b.clone(), Duration::from_secs( 5 ) ).await.unwrap();

      // A requests Y: no existing wait edges yet, so this just queues.
      let lm_a = Arc::clone( &lm );
      let a2 = a.clone();
      let a_req = tokio::spawn( async move { lm_a.acquire_lock( "Y", a2, Duration::from_millis( 500 ) ).await } );
      tokio::time::sleep( Duration::from_millis( 20 ) ).await;

      // B requests X: owner(X)=A, A awaits Y owned by B -> cycle.
      let b_result = lm.acquire_lock( "X", b, Duration::from_millis( 500 ) ).await;
      assert!( matches!( b_result, Err( Error::Deadlock( _ ) ) ) );

      a_req.abort();
    }

    #[ tokio::test ]
    async fn unknown_lock_id_fails_on_release()
    {
      let lm = manager();
      let err = lm.release_lock( &LockId::generate() ).await.unwrap_err();
      assert!( matches!( err, Error::Lock( LockError::UnknownLock( _ ) ) ) );
    }

    #[ tokio::test ]
    async fn cleanup_revokes_expired_locks()
    {
      let lm = manager();
      let agent = AgentId::generate();
      let lock_id = lm.acquire_lock( "R", agent.clone(), Duration::from_millis( 10 ) ).await.unwrap();

      tokio::time::sleep( Duration::from_millis( 30 ) ).await;
      let expired = lm.cleanup().await;

      assert_eq!( expired, vec![ "R".to_string() ] );
      assert!( !lm.verify_lock( &lock_id, &agent ).await );
    }
  }
}

#[cfg(feature = "enabled")]
pub use implementation::*;
