//! The Communication Hub: single routing point for inter-agent and
//! agent-to-services messages, composing the Budget Manager, Lock
//! Manager, and State Store.
//!
//! A caller's `route_message` call registers a `tokio::sync::oneshot`
//! pair and awaits the receiver directly — there is no string-keyed
//! listener table to leak, and retries rebind by moving the existing
//! sender to a new queue entry rather than creating a new promise the
//! caller has to be told about (spec.md §9).

use crate::collaborators::{ Filesystem, LanguageModelClient };
use crate::message::{ Message, MessageKind };
use iron_cost::{ BudgetManager, LedgerSnapshot, ReservationApproval };
use iron_lock_manager::LockManager;
use iron_runtime_state::{ StateStore, VersionedValue, WriteAck };
use iron_types::{ AgentId, CommunicationError, Error, MessageId, Result, SubscriptionId, TaskId };
use std::collections::{ HashMap, HashSet, VecDeque };
use std::sync::atomic::{ AtomicBool, Ordering };
use std::sync::Arc;
use std::time::{ Duration, Instant };
use tokio::sync::{ broadcast, oneshot, Mutex, Notify, Semaphore };

/// Hub tuning knobs, per spec.md §6.
#[derive(Debug, Clone, Copy)]
pub struct HubConfig
{
  pub max_concurrent_operations: usize,
  pub message_timeout: Duration,
  pub retry_attempts: u32,
  pub max_queue_size: usize,
  /// The "small periodic tick" backstop alongside event-driven wake.
  pub tick_interval: Duration,
}

impl Default for HubConfig
{
  fn default() -> Self
  {
    Self
    {
      max_concurrent_operations: 8,
      message_timeout: Duration::from_secs( 30 ),
      retry_attempts: 3,
      max_queue_size: 1024,
      tick_interval: Duration::from_millis( 50 ),
    }
  }
}

/// A terminal outcome handed back to whoever called `route_message`.
#[derive(Debug)]
pub enum HubResponse
{
  Read( Option< VersionedValue > ),
  Write( WriteAck ),
  Lock( iron_types::LockId ),
  Unlock,
  Subscribed( SubscriptionId ),
  Unsubscribed,
  TaskAssigned,
  TaskCompleted,
  TaskFailed,
  HandoffRequested,
  ClaudeResponse( serde_json::Value ),
  FileRead( Vec< u8 > ),
  FileWritten,
  BudgetCheck( ReservationApproval ),
  BudgetStatus( LedgerSnapshot ),
  Heartbeat,
  StatusRequest,
  StatusResponse,
  ShuttingDown,
}

/// Observable events, consumed by whoever calls `subscribe_events`.
#[derive(Debug, Clone)]
pub enum HubEvent
{
  MessageProcessed { id: MessageId },
  MessageError { id: MessageId, error: String },
  TaskAssigned { task_id: TaskId, agent_id: AgentId },
  TaskCompleted { task_id: TaskId },
  TaskFailed { task_id: TaskId, reason: String },
  HandoffRequested { from: AgentId, to: AgentId, task_id: TaskId },
  Heartbeat { agent_id: AgentId },
  StatusRequest { agent_id: AgentId },
  StatusResponse { agent_id: AgentId, status: serde_json::Value },
  AgentCleaned { agent_id: AgentId },
  ShuttingDown,
  Shutdown,
}

struct PendingEntry
{
  sender: Option< oneshot::Sender< Result< HubResponse > > >,
}

struct Inner
{
  queue: VecDeque< Message >,
  pending: HashMap< MessageId, PendingEntry >,
  subscriptions: HashMap< SubscriptionId, AgentId >,
  by_agent: HashMap< AgentId, HashSet< SubscriptionId > >,
}

/// The Communication Hub.
pub struct Hub
{
  config: HubConfig,
  budget: Arc< BudgetManager >,
  locks: Arc< LockManager >,
  state: Arc< dyn StateStore >,
  llm: Arc< dyn LanguageModelClient >,
  fs: Arc< dyn Filesystem >,
  inner: Mutex< Inner >,
  subscription_receivers: Mutex< HashMap< SubscriptionId, broadcast::Receiver< iron_runtime_state::StateChangeEvent > > >,
  active: Arc< Semaphore >,
  notify: Notify,
  shutting_down: AtomicBool,
  events_tx: broadcast::Sender< HubEvent >,
}

const EVENT_CHANNEL_CAPACITY: usize = 256;

impl Hub
{
  /// Wire a new Hub over already-constructed collaborators. Collaborator
  /// handles are injected at construction, not back-referenced by the
  /// leaf subsystems (spec.md §9).
  #[must_use]
  pub fn new(
    config: HubConfig,
    budget: Arc< BudgetManager >,
    locks: Arc< LockManager >,
    state: Arc< dyn StateStore >,
    llm: Arc< dyn LanguageModelClient >,
    fs: Arc< dyn Filesystem >,
  ) -> Self
  {
    let ( events_tx, _ ) = broadcast::channel( EVENT_CHANNEL_CAPACITY );
    Self
    {
      active: Arc::new( Semaphore::new( config.max_concurrent_operations ) ),
      config,
      budget,
      locks,
      state,
      llm,
      fs,
      inner: Mutex::new( Inner
      {
        queue: VecDeque::new(),
        pending: HashMap::new(),
        subscriptions: HashMap::new(),
        by_agent: HashMap::new(),
      } ),
      subscription_receivers: Mutex::new( HashMap::new() ),
      notify: Notify::new(),
      shutting_down: AtomicBool::new( false ),
      events_tx,
    }
  }

  /// Subscribe to Hub-level lifecycle events.
  #[must_use]
  pub fn subscribe_events( &self ) -> broadcast::Receiver< HubEvent >
  {
    self.events_tx.subscribe()
  }

  /// Run the scheduler: a periodic tick plus event-driven wake, until the
  /// returned handle is aborted or dropped.
  pub fn spawn_scheduler( self: &Arc< Self > ) -> tokio::task::JoinHandle< () >
  {
    let hub = Arc::clone( self );
    tokio::spawn( async move
    {
      let mut ticker = tokio::time::interval( hub.config.tick_interval );
      loop
      {
        tokio::select!
        {
          _ = ticker.tick() => {}
          () = hub.notify.notified() => {}
        }
        hub.drain_once().await;
      }
    } )
  }

  /// Accept a message for routing. Rejects with `queueFull` backpressure
  /// if the queue is saturated; otherwise registers a pending response,
  /// enqueues, wakes the scheduler, and awaits the terminal resolution.
  pub async fn route_message( self: &Arc< Self >, agent_id: AgentId, priority: u32, kind: MessageKind ) -> Result< HubResponse >
  {
    if self.shutting_down.load( Ordering::SeqCst )
    {
      return Err( Error::Communication( CommunicationError::HandlerFailed( "hub is shutting down".into() ) ) );
    }

    let timeout = kind.bridged_timeout().unwrap_or( self.config.message_timeout );
    let message = Message::new( agent_id, priority, timeout, kind );
    let ( tx, rx ) = oneshot::channel();

    {
      let mut inner = self.inner.lock().await;
      if inner.queue.len() >= self.config.max_queue_size
      {
        return Err( Error::Communication( CommunicationError::QueueFull { max_queue_size: self.config.max_queue_size } ) );
      }
      inner.pending.insert( message.id.clone(), PendingEntry { sender: Some( tx ) } );
      inner.queue.push_back( message );
    }

    self.notify.notify_one();

    match rx.await
    {
      Ok( result ) => result,
      Err( _ ) => Err( Error::Communication( CommunicationError::HandlerFailed( "pending response dropped without resolution".into() ) ) ),
    }
  }

  async fn resolve( &self, id: &MessageId, result: Result< HubResponse > )
  {
    let entry = { self.inner.lock().await.pending.remove( id ) };
    let Some( mut entry ) = entry else { return };

    match &result
    {
      Ok( _ ) => { let _ = self.events_tx.send( HubEvent::MessageProcessed { id: id.clone() } ); }
      Err( e ) => { let _ = self.events_tx.send( HubEvent::MessageError { id: id.clone(), error: e.to_string() } ); }
    }

    if let Some( sender ) = entry.sender.take()
    {
      let _ = sender.send( result );
    }
  }

  /// One scheduling pass: sweep expired queue entries, then pop/dispatch
  /// head-of-queue messages until the concurrency cap is hit or the
  /// queue runs dry.
  async fn drain_once( self: &Arc< Self > )
  {
    {
      let mut inner = self.inner.lock().await;
      let now = Instant::now();
      let mut expired = Vec::new();
      inner.queue.retain( | m |
      {
        if m.is_expired( now ) { expired.push( ( m.id.clone(), m.kind.label() ) ); false } else { true }
      } );
      for ( id, label ) in expired
      {
        if let Some( mut entry ) = inner.pending.remove( &id )
        {
          if let Some( sender ) = entry.sender.take()
          {
            let _ = sender.send( Err( Error::Timeout( iron_types::TimeoutError( format!( "message {id}" ) ) ) ) );
          }
        }
        iron_telemetry::log_hub_event( &id.to_string(), label, "timed_out" );
      }
    }

    loop
    {
      let message = {
        let mut inner = self.inner.lock().await;
        if inner.queue.is_empty()
        {
          return;
        }
        let mut items: Vec< Message > = inner.queue.drain( .. ).collect();
        items.sort_by( | a, b | a.priority.cmp( &b.priority ).then( a.timestamp.cmp( &b.timestamp ) ) );
        let mut items: VecDeque< Message > = items.into();
        let head = items.pop_front();
        inner.queue = items;
        head
      };

      let Some( message ) = message else { return };

      if message.is_expired( Instant::now() )
      {
        self.resolve( &message.id, Err( Error::Timeout( iron_types::TimeoutError( format!( "message {}", message.id ) ) ) ) ).await;
        continue;
      }

      match Arc::clone( &self.active ).try_acquire_owned()
      {
        Ok( permit ) =>
        {
          let hub = Arc::clone( self );
          tokio::spawn( async move { hub.process_message( message, permit ).await } );
        }
        Err( _ ) =>
        {
          let mut inner = self.inner.lock().await;
          inner.queue.push_front( message );
          return;
        }
      }
    }
  }

  async fn process_message( self: Arc< Self >, message: Message, _permit: tokio::sync::OwnedSemaphorePermit )
  {
    let id = message.id.clone();
    let label = message.kind.label();
    let remaining = message.timeout.saturating_duration_since( Instant::now() );

    let outcome = match tokio::time::timeout( remaining, self.dispatch( &message ) ).await
    {
      Ok( result ) => result,
      Err( _elapsed ) => Err( Error::Timeout( iron_types::TimeoutError( format!( "message {id}" ) ) ) ),
    };

    match outcome
    {
      Ok( response ) =>
      {
        iron_telemetry::log_hub_event( &id.to_string(), label, "dispatched" );
        self.resolve( &id, Ok( response ) ).await;
      }
      Err( err ) if is_retryable( &err ) && message.retry_count < self.config.retry_attempts =>
      {
        let retried = message.retried();
        iron_telemetry::log_hub_event( &id.to_string(), label, "retried" );
        let mut inner = self.inner.lock().await;
        if let Some( entry ) = inner.pending.remove( &id )
        {
          inner.pending.insert( retried.id.clone(), entry );
          inner.queue.push_front( retried );
        }
        drop( inner );
        self.notify.notify_one();
      }
      Err( err ) =>
      {
        iron_telemetry::log_hub_event( &id.to_string(), label, "errored" );
        self.resolve( &id, Err( err ) ).await;
      }
    }
  }

  async fn dispatch( &self, message: &Message ) -> Result< HubResponse >
  {
    match &message.kind
    {
      MessageKind::Read { key, consistency } =>
      {
        let value = self.state.read( key, &message.agent_id, *consistency ).await.map_err( state_err )?;
        Ok( HubResponse::Read( value ) )
      }

      MessageKind::Write { key, value, lock_id, expected_version } =>
      {
        if let Some( lock_id ) = lock_id
        {
          if !self.locks.verify_lock( lock_id, &message.agent_id ).await
          {
            return Err( Error::Communication( CommunicationError::Unauthorized( format!( "lock {lock_id} not verified for agent {}", message.agent_id ) ) ) );
          }
        }
        let ack = self.state.write( key, value.clone(), &message.agent_id, *expected_version ).await.map_err( state_err )?;
        Ok( HubResponse::Write( ack ) )
      }

      MessageKind::Lock { resource_id, timeout } =>
      {
        let lock_id = self.locks.acquire_lock( resource_id.clone(), message.agent_id.clone(), *timeout ).await?;
        Ok( HubResponse::Lock( lock_id ) )
      }

      MessageKind::Unlock { lock_id } =>
      {
        self.locks.release_lock( lock_id ).await?;
        Ok( HubResponse::Unlock )
      }

      MessageKind::Subscribe { pattern } =>
      {
        let handle = self.state.subscribe( pattern, &message.agent_id ).await.map_err( state_err )?;
        let subscription_id = handle.subscription_id.clone();

        {
          let mut inner = self.inner.lock().await;
          inner.subscriptions.insert( subscription_id.clone(), message.agent_id.clone() );
          inner.by_agent.entry( message.agent_id.clone() ).or_default().insert( subscription_id.clone() );
        }
        self.subscription_receivers.lock().await.insert( subscription_id.clone(), handle.receiver );

        Ok( HubResponse::Subscribed( subscription_id ) )
      }

      MessageKind::Unsubscribe { subscription_id } =>
      {
        self.state.unsubscribe( subscription_id ).await.map_err( state_err )?;
        let mut inner = self.inner.lock().await;
        if let Some( owner ) = inner.subscriptions.remove( subscription_id )
        {
          if let Some( set ) = inner.by_agent.get_mut( &owner )
          {
            set.remove( subscription_id );
            if set.is_empty() { inner.by_agent.remove( &owner ); }
          }
        }
        drop( inner );
        self.subscription_receivers.lock().await.remove( subscription_id );
        Ok( HubResponse::Unsubscribed )
      }

      MessageKind::TaskAssign { task_id } =>
      {
        let _ = self.events_tx.send( HubEvent::TaskAssigned { task_id: task_id.clone(), agent_id: message.agent_id.clone() } );
        Ok( HubResponse::TaskAssigned )
      }

      MessageKind::TaskComplete { task_id, actual_cost_usd, operation_id } =>
      {
        if let ( Some( cost ), Some( op_id ) ) = ( actual_cost_usd, operation_id )
        {
          self.budget.record_usage( op_id, *cost ).await?;
        }
        let _ = self.events_tx.send( HubEvent::TaskCompleted { task_id: task_id.clone() } );
        Ok( HubResponse::TaskCompleted )
      }

      MessageKind::TaskFailed { task_id, reason } =>
      {
        let _ = self.events_tx.send( HubEvent::TaskFailed { task_id: task_id.clone(), reason: reason.clone() } );
        Ok( HubResponse::TaskFailed )
      }

      MessageKind::Handoff { to_agent, task_id } =>
      {
        let _ = self.events_tx.send( HubEvent::HandoffRequested { from: message.agent_id.clone(), to: to_agent.clone(), task_id: task_id.clone() } );
        Ok( HubResponse::HandoffRequested )
      }

      MessageKind::ClaudeRequest { prompt } =>
      {
        let response = self.llm.complete( prompt.clone() ).await.map_err( Error::Communication )?;
        Ok( HubResponse::ClaudeResponse( response ) )
      }

      MessageKind::FileRead { path } =>
      {
        let bytes = self.fs.read_file( path ).await.map_err( Error::Communication )?;
        Ok( HubResponse::FileRead( bytes ) )
      }

      MessageKind::FileWrite { path, contents } =>
      {
        self.fs.write_file( path, contents ).await.map_err( Error::Communication )?;
        Ok( HubResponse::FileWritten )
      }

      MessageKind::BudgetCheck { estimated_cost_usd, operation_id, priority } =>
      {
        let approval = self.budget.validate_operation( operation_id.clone(), *estimated_cost_usd, message.agent_id.clone(), *priority ).await?;
        Ok( HubResponse::BudgetCheck( approval ) )
      }

      MessageKind::BudgetStatus =>
      {
        Ok( HubResponse::BudgetStatus( self.budget.snapshot().await ) )
      }

      MessageKind::Heartbeat =>
      {
        let _ = self.events_tx.send( HubEvent::Heartbeat { agent_id: message.agent_id.clone() } );
        Ok( HubResponse::Heartbeat )
      }

      MessageKind::StatusRequest =>
      {
        let _ = self.events_tx.send( HubEvent::StatusRequest { agent_id: message.agent_id.clone() } );
        Ok( HubResponse::StatusRequest )
      }

      MessageKind::StatusResponse { status } =>
      {
        let _ = self.events_tx.send( HubEvent::StatusResponse { agent_id: message.agent_id.clone(), status: status.clone() } );
        Ok( HubResponse::StatusResponse )
      }

      MessageKind::Shutdown =>
      {
        Ok( HubResponse::ShuttingDown )
      }
    }
  }

  /// Unsubscribe every subscription owned by `agent_id`, one at a time so
  /// an individual failure doesn't abort the sweep; returns the failures
  /// as display strings (`cleanupError`, per spec.md §4.6).
  pub async fn cleanup_agent( &self, agent_id: &AgentId ) -> Vec< String >
  {
    let ids: Vec< SubscriptionId > = {
      let mut inner = self.inner.lock().await;
      inner.by_agent.remove( agent_id ).map( | set | set.into_iter().collect() ).unwrap_or_default()
    };

    let mut cleanup_errors = Vec::new();
    for id in &ids
    {
      if let Err( e ) = self.state.unsubscribe( id ).await
      {
        cleanup_errors.push( format!( "{id}: {e}" ) );
      }
      self.inner.lock().await.subscriptions.remove( id );
      self.subscription_receivers.lock().await.remove( id );
    }

    let _ = self.events_tx.send( HubEvent::AgentCleaned { agent_id: agent_id.clone() } );
    iron_telemetry::log_agent_event( &agent_id.to_string(), "cleaned_up" );
    cleanup_errors
  }

  /// Stop accepting new messages, wait up to 30 s for in-flight work to
  /// drain, then clean up every agent with a live subscription.
  pub async fn shutdown( self: &Arc< Self > )
  {
    self.shutting_down.store( true, Ordering::SeqCst );
    let _ = self.events_tx.send( HubEvent::ShuttingDown );

    let deadline = Instant::now() + Duration::from_secs( 30 );
    while Instant::now() < deadline
    {
      let idle = self.active.available_permits() == self.config.max_concurrent_operations;
      let queue_empty = self.inner.lock().await.queue.is_empty();
      if idle && queue_empty
      {
        break;
      }
      tokio::time::sleep( Duration::from_millis( 50 ) ).await;
    }

    let agents: Vec< AgentId > = self.inner.lock().await.by_agent.keys().cloned().collect();
    for agent in agents
    {
      self.cleanup_agent( &agent ).await;
    }

    let _ = self.events_tx.send( HubEvent::Shutdown );
  }
}

fn state_err( e: iron_runtime_state::StateError ) -> Error
{
  Error::Communication( CommunicationError::HandlerFailed( e.to_string() ) )
}

/// Only transient handler failures are retried; budget, lock, and
/// deadlock failures are surfaced to the caller (spec.md §7).
fn is_retryable( err: &Error ) -> bool
{
  matches!( err, Error::Communication( CommunicationError::HandlerFailed( _ ) ) )
}
