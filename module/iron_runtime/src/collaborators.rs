//! Default collaborator implementations the coordination core can be
//! wired against out of the box.
//!
//! The language model client is explicitly out of scope for the core
//! (spec.md §1): a real provider integration is injected by whatever
//! embeds this crate. `NullLanguageModelClient` exists only so the core
//! can be constructed and exercised without one.

use async_trait::async_trait;
use iron_coordination_hub::{ Filesystem, LanguageModelClient };
use iron_types::CommunicationError;

/// Bridges FILE_READ / FILE_WRITE to the local filesystem via
/// `tokio::fs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFilesystem;

#[async_trait]
impl Filesystem for LocalFilesystem
{
  async fn read_file( &self, path: &str ) -> Result<Vec<u8>, CommunicationError>
  {
    tokio::fs::read( path ).await.map_err( | e | CommunicationError::HandlerFailed( format!( "read {path}: {e}" ) ) )
  }

  async fn write_file( &self, path: &str, contents: &[u8] ) -> Result<(), CommunicationError>
  {
    tokio::fs::write( path, contents ).await.map_err( | e | CommunicationError::HandlerFailed( format!( "write {path}: {e}" ) ) )
  }
}

/// Placeholder language model collaborator: always fails. Real
/// deployments inject their own `LanguageModelClient` implementation at
/// construction time instead.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullLanguageModelClient;

#[async_trait]
impl LanguageModelClient for NullLanguageModelClient
{
  async fn complete( &self, _prompt: serde_json::Value ) -> Result<serde_json::Value, CommunicationError>
  {
    Err( CommunicationError::HandlerFailed( "no language model client configured".into() ) )
  }
}

#[cfg(test)]
mod tests
{
  use super::*;

  #[tokio::test]
  async fn local_filesystem_round_trips_through_a_temp_file()
  {
    let fs = LocalFilesystem;
    let path = std::env::temp_dir().join( format!( "iron_runtime_test_{}", iron_types::AgentId::generate() ) );
    let path = path.to_str().unwrap();

    fs.write_file( path, b"hello" ).await.unwrap();
    let read_back = fs.read_file( path ).await.unwrap();
    assert_eq!( read_back, b"hello" );

    tokio::fs::remove_file( path ).await.unwrap();
  }

  #[tokio::test]
  async fn null_language_model_always_fails()
  {
    let llm = NullLanguageModelClient;
    let result = llm.complete( serde_json::json!( "hi" ) ).await;
    assert!( result.is_err() );
  }
}
