//! The `StateStore` collaborator trait and its supporting types.
//!
//! Every coordination subsystem that needs durable shared state — the
//! Communication Hub's READ/WRITE handlers, checkpoint metadata, task
//! outputs — goes through this trait rather than touching a storage
//! backend directly, the same way `iron_runtime`'s other collaborators
//! (language model, filesystem, checkpoint store) are abstracted behind
//! traits so the coordination core stays testable without real I/O.

use crate::error::Result;
use async_trait::async_trait;
use iron_types::{ AgentId, SubscriptionId };
use serde::{ Deserialize, Serialize };
use std::fmt;

/// Read consistency requested by a caller.
///
/// `Strong` reads observe every write that completed before the read was
/// issued. `Eventual` reads may observe a slightly stale value in
/// exchange for not contending with in-flight writes; the in-memory
/// reference implementation makes no distinction (it has nothing to relax)
/// but a replicated backend would.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Consistency
{
  Strong,
  Eventual,
}

/// A value paired with the monotonic version it was written at.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionedValue
{
  pub value : serde_json::Value,
  pub version : u64,
}

/// Acknowledgement returned by a successful `write`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteAck
{
  pub version : u64,
}

/// A change notification delivered to subscribers of a matching key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateChangeEvent
{
  pub key : String,
  pub value : serde_json::Value,
  pub version : u64,
  pub agent_id : AgentId,
}

/// A live subscription: the id callers unsubscribe with, and the channel
/// end new matching events arrive on.
pub struct SubscriptionHandle
{
  pub subscription_id : SubscriptionId,
  pub receiver : tokio::sync::broadcast::Receiver< StateChangeEvent >,
}

impl fmt::Debug for SubscriptionHandle
{
  fn fmt( &self, f : &mut fmt::Formatter< '_ > ) -> fmt::Result
  {
    f.debug_struct( "SubscriptionHandle" )
      .field( "subscription_id", &self.subscription_id )
      .finish_non_exhaustive()
  }
}

/// Versioned key-value store with glob-pattern subscriptions.
///
/// Implementations must support optimistic concurrency: a `write` that
/// supplies `expected_version` succeeds only if the stored version still
/// matches, mirroring the compare-and-swap discipline the Lock Manager
/// uses for lock ids and the Budget Manager uses for operation ids.
#[async_trait]
pub trait StateStore : Send + Sync
{
  /// Read the current value of `key`. Returns `Ok(None)` if the key has
  /// never been written. `agent_id` is carried for audit/telemetry, not
  /// for access control — the State Store has no ACL model (spec.md §1
  /// Non-goals).
  async fn read( &self, key : &str, agent_id : &AgentId, consistency : Consistency ) -> Result< Option< VersionedValue > >;

  /// Write `value` to `key`. If `expected_version` is `Some`, the write
  /// is conditional: it fails with `StateError::VersionConflict` (or
  /// `KeyNotFound` if the key doesn't exist yet) when the stored version
  /// doesn't match. If `expected_version` is `None`, the write is
  /// unconditional and always succeeds, incrementing the version.
  async fn write(
    &self,
    key : &str,
    value : serde_json::Value,
    agent_id : &AgentId,
    expected_version : Option< u64 >,
  ) -> Result< WriteAck >;

  /// Register interest in keys matching `pattern` (a `*`-glob, e.g.
  /// `"task:*:status"`). Returns a handle carrying a receiver for every
  /// subsequent matching write.
  async fn subscribe( &self, pattern : &str, agent_id : &AgentId ) -> Result< SubscriptionHandle >;

  /// Deregister a subscription. Idempotent failures (unknown id) are
  /// reported as `StateError::UnknownSubscription`, matching how
  /// `cleanupAgent` reports per-subscription failures without aborting
  /// the sweep (spec.md §4.6).
  async fn unsubscribe( &self, subscription_id : &SubscriptionId ) -> Result< () >;

  /// Remove every subscription owned by `agent_id`. Used by the
  /// Communication Hub's `cleanupAgent` sweep. Returns the ids that were
  /// removed; failures to remove an individual subscription are logged
  /// but do not abort the sweep.
  async fn unsubscribe_agent( &self, agent_id : &AgentId ) -> Vec< SubscriptionId >;
}

/// Matches `key` against a `*`-glob `pattern`. `*` matches any run of
/// characters (including none); every other character must match
/// literally. Sufficient for the Hub's key-space subscriptions without
/// pulling in a full glob crate for a single wildcard class.
#[must_use]
pub fn pattern_matches( pattern : &str, key : &str ) -> bool
{
  fn match_segments( segments : &[ &str ], key : &[ u8 ] ) -> bool
  {
    if segments.is_empty()
    {
      return key.is_empty();
    }
    let ( first, rest ) = ( segments[ 0 ], &segments[ 1.. ] );
    if rest.is_empty()
    {
      return key == first.as_bytes();
    }
    if key.len() < first.len() || &key[ ..first.len() ] != first.as_bytes()
    {
      return false;
    }
    let remaining = &key[ first.len().. ];
    for cut in 0..=remaining.len()
    {
      if match_segments( rest, &remaining[ cut.. ] )
      {
        return true;
      }
    }
    false
  }

  let segments : Vec< &str > = pattern.split( '*' ).collect();
  if segments.len() == 1
  {
    return pattern == key;
  }
  let first = segments[ 0 ];
  if !key.starts_with( first )
  {
    return false;
  }
  match_segments( &segments[ 1.. ], key[ first.len().. ].as_bytes() )
}
