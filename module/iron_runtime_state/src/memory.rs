//! In-memory reference implementation of `StateStore`.
//!
//! Suitable for tests and single-process deployments (spec.md §6 calls
//! this out explicitly: the State Store's durability and replication are
//! Non-goals of the coordination core itself). A single mutex guards the
//! whole key space, the same call the Budget Manager's ledger makes
//! (`iron_cost::budget`) rather than a sharded map: writes need to read
//! the current version and conditionally replace it in one atomic step,
//! which a concurrent map's per-key locking can't express without races.

use crate::error::{ Result, StateError };
use crate::state_store::{ Consistency, StateChangeEvent, StateStore, SubscriptionHandle, VersionedValue, WriteAck, pattern_matches };
use async_trait::async_trait;
use iron_types::{ AgentId, SubscriptionId };
use std::collections::{ HashMap, HashSet };
use tokio::sync::{ broadcast, Mutex };

const SUBSCRIPTION_CHANNEL_CAPACITY : usize = 256;

struct Subscription
{
  pattern : String,
  agent_id : AgentId,
  sender : broadcast::Sender< StateChangeEvent >,
}

struct Inner
{
  data : HashMap< String, VersionedValue >,
  subscriptions : HashMap< SubscriptionId, Subscription >,
  by_agent : HashMap< AgentId, HashSet< SubscriptionId > >,
}

/// Single-process `StateStore` backed by a `HashMap` behind one mutex.
#[derive(Debug)]
pub struct InMemoryStateStore
{
  inner : Mutex< Inner >,
}

impl InMemoryStateStore
{
  /// Create an empty store.
  #[must_use]
  pub fn new() -> Self
  {
    Self
    {
      inner : Mutex::new( Inner
      {
        data : HashMap::new(),
        subscriptions : HashMap::new(),
        by_agent : HashMap::new(),
      } ),
    }
  }
}

impl Default for InMemoryStateStore
{
  fn default() -> Self
  {
    Self::new()
  }
}

impl core::fmt::Debug for Inner
{
  fn fmt( &self, f : &mut core::fmt::Formatter< '_ > ) -> core::fmt::Result
  {
    f.debug_struct( "Inner" )
      .field( "keys", &self.data.len() )
      .field( "subscriptions", &self.subscriptions.len() )
      .finish()
  }
}

#[async_trait]
impl StateStore for InMemoryStateStore
{
  async fn read( &self, key : &str, _agent_id : &AgentId, _consistency : Consistency ) -> Result< Option< VersionedValue > >
  {
    let inner = self.inner.lock().await;
    Ok( inner.data.get( key ).cloned() )
  }

  async fn write(
    &self,
    key : &str,
    value : serde_json::Value,
    agent_id : &AgentId,
    expected_version : Option< u64 >,
  ) -> Result< WriteAck >
  {
    let mut inner = self.inner.lock().await;

    let next_version = match ( expected_version, inner.data.get( key ) )
    {
      ( Some( expected ), Some( current ) ) if current.version != expected =>
      {
        return Err( StateError::VersionConflict { key : key.to_string(), expected, actual : current.version } );
      }
      ( Some( expected ), None ) =>
      {
        return Err( StateError::KeyNotFound { key : key.to_string(), expected } );
      }
      ( _, Some( current ) ) => current.version + 1,
      ( _, None ) => 1,
    };

    inner.data.insert( key.to_string(), VersionedValue { value : value.clone(), version : next_version } );

    let event = StateChangeEvent { key : key.to_string(), value, version : next_version, agent_id : agent_id.clone() };
    for subscription in inner.subscriptions.values()
    {
      if pattern_matches( &subscription.pattern, key )
      {
        // No receivers is not an error: the agent may have dropped its
        // handle without unsubscribing; cleanupAgent will reap it.
        let _ = subscription.sender.send( event.clone() );
      }
    }

    Ok( WriteAck { version : next_version } )
  }

  async fn subscribe( &self, pattern : &str, agent_id : &AgentId ) -> Result< SubscriptionHandle >
  {
    let mut inner = self.inner.lock().await;
    let subscription_id = SubscriptionId::generate();
    let ( sender, receiver ) = broadcast::channel( SUBSCRIPTION_CHANNEL_CAPACITY );

    inner.subscriptions.insert( subscription_id.clone(), Subscription
    {
      pattern : pattern.to_string(),
      agent_id : agent_id.clone(),
      sender,
    } );
    inner.by_agent.entry( agent_id.clone() ).or_default().insert( subscription_id.clone() );

    Ok( SubscriptionHandle { subscription_id, receiver } )
  }

  async fn unsubscribe( &self, subscription_id : &SubscriptionId ) -> Result< () >
  {
    let mut inner = self.inner.lock().await;
    let Some( subscription ) = inner.subscriptions.remove( subscription_id ) else
    {
      return Err( StateError::UnknownSubscription( subscription_id.to_string() ) );
    };
    if let Some( set ) = inner.by_agent.get_mut( &subscription.agent_id )
    {
      set.remove( subscription_id );
      if set.is_empty()
      {
        inner.by_agent.remove( &subscription.agent_id );
      }
    }
    Ok( () )
  }

  async fn unsubscribe_agent( &self, agent_id : &AgentId ) -> Vec< SubscriptionId >
  {
    let mut inner = self.inner.lock().await;
    let Some( ids ) = inner.by_agent.remove( agent_id ) else
    {
      return Vec::new();
    };
    for id in &ids
    {
      inner.subscriptions.remove( id );
    }
    ids.into_iter().collect()
  }
}

#[cfg(test)]
mod tests
{
  use super::*;

  #[tokio::test]
  async fn write_then_read_round_trip()
  {
    let store = InMemoryStateStore::new();
    let agent = AgentId::generate();

    let ack = store.write( "k", serde_json::json!( "v1" ), &agent, None ).await.unwrap();
    assert_eq!( ack.version, 1 );

    let read = store.read( "k", &agent, Consistency::Strong ).await.unwrap().unwrap();
    assert_eq!( read.value, serde_json::json!( "v1" ) );
    assert_eq!( read.version, 1 );
  }

  #[tokio::test]
  async fn conditional_write_rejects_stale_version()
  {
    let store = InMemoryStateStore::new();
    let agent = AgentId::generate();

    store.write( "k", serde_json::json!( 1 ), &agent, None ).await.unwrap();
    let err = store.write( "k", serde_json::json!( 2 ), &agent, Some( 99 ) ).await.unwrap_err();
    assert!( matches!( err, StateError::VersionConflict { .. } ) );
  }

  #[tokio::test]
  async fn conditional_write_against_missing_key_fails()
  {
    let store = InMemoryStateStore::new();
    let agent = AgentId::generate();

    let err = store.write( "missing", serde_json::json!( 1 ), &agent, Some( 1 ) ).await.unwrap_err();
    assert!( matches!( err, StateError::KeyNotFound { .. } ) );
  }

  #[tokio::test]
  async fn conditional_write_succeeds_when_version_matches()
  {
    let store = InMemoryStateStore::new();
    let agent = AgentId::generate();

    let ack = store.write( "k", serde_json::json!( 1 ), &agent, None ).await.unwrap();
    let ack2 = store.write( "k", serde_json::json!( 2 ), &agent, Some( ack.version ) ).await.unwrap();
    assert_eq!( ack2.version, 2 );
  }

  #[tokio::test]
  async fn subscriber_receives_matching_writes_only()
  {
    let store = InMemoryStateStore::new();
    let agent = AgentId::generate();
    let mut handle = store.subscribe( "task:*:status", &agent ).await.unwrap();

    store.write( "task:1:status", serde_json::json!( "running" ), &agent, None ).await.unwrap();
    store.write( "task:1:result", serde_json::json!( "ignored" ), &agent, None ).await.unwrap();

    let event = handle.receiver.recv().await.unwrap();
    assert_eq!( event.key, "task:1:status" );
    assert!( handle.receiver.try_recv().is_err(), "the unmatched write must not be delivered" );
  }

  #[tokio::test]
  async fn unsubscribe_unknown_id_fails()
  {
    let store = InMemoryStateStore::new();
    let err = store.unsubscribe( &SubscriptionId::generate() ).await.unwrap_err();
    assert!( matches!( err, StateError::UnknownSubscription( _ ) ) );
  }

  #[tokio::test]
  async fn cleanup_agent_removes_every_owned_subscription()
  {
    let store = InMemoryStateStore::new();
    let agent = AgentId::generate();
    let other = AgentId::generate();

    let h1 = store.subscribe( "a:*", &agent ).await.unwrap();
    let h2 = store.subscribe( "b:*", &agent ).await.unwrap();
    let h3 = store.subscribe( "c:*", &other ).await.unwrap();

    let removed = store.unsubscribe_agent( &agent ).await;
    assert_eq!( removed.len(), 2 );
    assert!( removed.contains( &h1.subscription_id ) );
    assert!( removed.contains( &h2.subscription_id ) );

    assert!( store.unsubscribe( &h1.subscription_id ).await.is_err() );
    assert!( store.unsubscribe( &h3.subscription_id ).await.is_ok() );
  }
}
