//! Errors surfaced by the State Store collaborator.

use thiserror::Error;

/// Failure modes of a `StateStore` implementation.
///
/// This is deliberately separate from `iron_types::Error`: the State Store
/// is an external collaborator surface (spec.md §6), not one of the four
/// coordinated subsystems, so its errors don't belong in the shared
/// subsystem taxonomy.
#[derive(Debug, Error)]
pub enum StateError
{
  /// `write` supplied an `expected_version` that no longer matches the
  /// stored version.
  #[error("version conflict on key '{key}': expected {expected}, found {actual}")]
  VersionConflict
  {
    key : String,
    expected : u64,
    actual : u64,
  },

  /// `write` supplied an `expected_version` for a key that does not exist.
  #[error("key '{key}' not found for conditional write (expected version {expected})")]
  KeyNotFound
  {
    key : String,
    expected : u64,
  },

  /// `unsubscribe` referenced a subscription id that isn't registered.
  #[error("unknown subscription '{0}'")]
  UnknownSubscription( String ),

  /// The subscription pattern could not be compiled.
  #[error("invalid subscription pattern '{0}'")]
  InvalidPattern( String ),
}

/// Convenience alias for State Store results.
pub type Result< T > = core::result::Result< T, StateError >;
