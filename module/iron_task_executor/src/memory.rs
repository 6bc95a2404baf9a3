//! An in-memory `CheckpointStore`, for tests and for running without a
//! durable backend wired in.

use crate::checkpoint::{ CheckpointSnapshot, CheckpointStore };
use async_trait::async_trait;
use iron_types::{ CheckpointId, TaskError };
use std::collections::HashMap;
use tokio::sync::Mutex;

#[derive(Default)]
struct Inner
{
  by_id: HashMap<CheckpointId, CheckpointSnapshot>,
  order: Vec<CheckpointId>,
}

/// Keeps insertion order alongside the lookup map so `list_checkpoints`
/// reflects the sequence checkpoints were actually written in, not
/// hash-map iteration order.
#[derive(Default)]
pub struct InMemoryCheckpointStore
{
  inner: Mutex<Inner>,
}

impl InMemoryCheckpointStore
{
  #[must_use]
  pub fn new() -> Self
  {
    Self::default()
  }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore
{
  async fn create_checkpoint( &self, snapshot: CheckpointSnapshot ) -> Result<CheckpointId, TaskError>
  {
    let id = CheckpointId::generate();
    let mut inner = self.inner.lock().await;
    inner.by_id.insert( id.clone(), snapshot );
    inner.order.push( id.clone() );
    Ok( id )
  }

  async fn list_checkpoints( &self ) -> Result<Vec<CheckpointId>, TaskError>
  {
    Ok( self.inner.lock().await.order.clone() )
  }

  async fn load_checkpoint( &self, id: &CheckpointId ) -> Result<CheckpointSnapshot, TaskError>
  {
    self.inner.lock().await.by_id.get( id ).cloned().ok_or_else( || TaskError::CheckpointFailed( format!( "no checkpoint {id}" ) ) )
  }
}
