//! Unified configuration management for Iron Runtime
//!
//! Implements layered configuration precedence (environment, project, user,
//! workspace defaults, crate defaults) via the [`ConfigLayer`] abstraction,
//! plus a generic loader that merges all layers into a typed struct.

#![cfg_attr(not(feature = "enabled"), allow(unused))]

#[cfg(feature = "enabled")]
pub mod error;
#[cfg(feature = "enabled")]
pub mod layer;

#[cfg(feature = "enabled")]
mod loader
{
  use crate::error::{ ConfigError, Result };
  use crate::layer::LayersBuilder;
  use std::collections::HashMap;

  /// Merge all configured layers (lowest priority first) into a single TOML
  /// table, then deserialize it into `T`.
  ///
  /// Layers are applied lowest-priority-first so that higher priority layers
  /// (environment variables) overwrite lower ones (crate defaults).
  pub fn load_config< T >( module: impl Into< String > ) -> Result< T >
  where
    T: serde::de::DeserializeOwned,
  {
    let module = module.into();
    let layers = LayersBuilder::new( module ).build()?;

    let mut merged: HashMap< String, toml::Value > = HashMap::new();

    // layers are sorted highest-priority-first; apply in reverse so that
    // later (higher priority) layers overwrite earlier ones.
    for layer in layers.iter().rev()
    {
      for ( key, value ) in layer.get_all()?
      {
        merged.insert( key, value.value );
      }
    }

    let mut table = toml::value::Table::new();
    for ( key, value ) in merged
    {
      insert_nested( &mut table, &key, value );
    }

    toml::Value::Table( table )
      .try_into::< T >()
      .map_err( | e | ConfigError::InvalidToml
      {
        path: std::path::PathBuf::from( "<merged>" ),
        error: e.to_string(),
      } )
  }

  fn insert_nested( table: &mut toml::value::Table, key: &str, value: toml::Value )
  {
    let mut parts = key.splitn( 2, '.' );
    let head = parts.next().unwrap_or( key );

    match parts.next()
    {
      Some( rest ) =>
      {
        let entry = table
          .entry( head.to_string() )
          .or_insert_with( || toml::Value::Table( toml::value::Table::new() ) );

        if let toml::Value::Table( nested ) = entry
        {
          insert_nested( nested, rest, value );
        }
      }
      None =>
      {
        table.insert( head.to_string(), value );
      }
    }
  }
}

#[cfg(feature = "enabled")]
pub use loader::load_config;
#[cfg(feature = "enabled")]
pub use error::{ ConfigError, Result };
#[cfg(feature = "enabled")]
pub use layer::{ ConfigLayer, ConfigValue, EnvLayer, FileLayer, LayersBuilder };

#[cfg(not(feature = "enabled"))]
mod stub
{
  /// Stub result type when the `enabled` feature is off.
  pub type Result< T > = std::result::Result< T, String >;
}

#[cfg(not(feature = "enabled"))]
pub use stub::*;
