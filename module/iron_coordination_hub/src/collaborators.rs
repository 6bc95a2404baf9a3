//! Collaborator traits the Hub bridges CLAUDE_REQUEST / FILE_* messages
//! to. Modeled as a correlated request/response call rather than a shared
//! event bus with string-keyed listeners (spec.md §9 Design Notes): the
//! Hub awaits the call directly, so cleanup of the "listener" is just
//! the call returning, with nothing left registered afterward.

use async_trait::async_trait;
use iron_types::CommunicationError;

/// External language-model collaborator. A real implementation lives in
/// the integration crate and talks to the actual provider; this trait is
/// the seam the Hub tests against.
#[async_trait]
pub trait LanguageModelClient: Send + Sync
{
  async fn complete( &self, prompt: serde_json::Value ) -> Result<serde_json::Value, CommunicationError>;
}

/// External filesystem collaborator bridged by FILE_READ / FILE_WRITE.
#[async_trait]
pub trait Filesystem: Send + Sync
{
  async fn read_file( &self, path: &str ) -> Result<Vec<u8>, CommunicationError>;
  async fn write_file( &self, path: &str, contents: &[u8] ) -> Result<(), CommunicationError>;
}
