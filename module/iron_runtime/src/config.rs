//! Layered runtime configuration, merged via `iron_config_loader` from
//! environment, project, user, and crate-default layers (in that
//! precedence order) into subsystem configs.

use iron_circuit_breaker::CircuitBreakerConfig;
use iron_coordination_hub::HubConfig;
use iron_cost::BudgetConfig;
use iron_lock_manager::LockConfig;
use serde::Deserialize;
use std::time::Duration;

/// The merged configuration for a coordination core instance. Plain
/// numeric fields rather than the subsystem `Duration`-bearing configs
/// directly, since those aren't meant to round-trip through TOML.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig
{
  pub max_budget_usd: f64,
  pub min_reserve_usd: f64,
  pub warning_threshold: f64,
  pub step_timeout_secs: u64,
  pub model: String,

  pub lock_default_timeout_secs: u64,
  pub lock_cleanup_interval_secs: u64,

  pub hub_max_concurrent_operations: usize,
  pub hub_message_timeout_secs: u64,
  pub hub_retry_attempts: u32,
  pub hub_max_queue_size: usize,
  pub hub_tick_interval_millis: u64,

  pub circuit_breaker: CircuitBreakerConfig,

  pub budget_cleanup_interval_secs: u64,
}

impl Default for RuntimeConfig
{
  fn default() -> Self
  {
    Self
    {
      max_budget_usd: 100.0,
      min_reserve_usd: 5.0,
      warning_threshold: 0.9,
      step_timeout_secs: 120,
      model: "gpt-4".to_string(),
      lock_default_timeout_secs: 30,
      lock_cleanup_interval_secs: 5,
      hub_max_concurrent_operations: 8,
      hub_message_timeout_secs: 30,
      hub_retry_attempts: 3,
      hub_max_queue_size: 1024,
      hub_tick_interval_millis: 50,
      circuit_breaker: CircuitBreakerConfig::default(),
      budget_cleanup_interval_secs: 60,
    }
  }
}

impl RuntimeConfig
{
  /// Load from the layered configuration stack, falling back to
  /// built-in defaults for anything unset.
  pub fn load() -> iron_config_loader::Result<Self>
  {
    iron_config_loader::load_config( "iron_runtime" )
  }

  #[must_use]
  pub fn budget_config( &self ) -> BudgetConfig
  {
    BudgetConfig::new( self.max_budget_usd, self.min_reserve_usd, self.warning_threshold, Duration::from_secs( self.step_timeout_secs ), self.model.clone() )
  }

  #[must_use]
  pub fn lock_config( &self ) -> LockConfig
  {
    LockConfig { default_timeout: Duration::from_secs( self.lock_default_timeout_secs ), cleanup_interval: Duration::from_secs( self.lock_cleanup_interval_secs ) }
  }

  #[must_use]
  pub fn hub_config( &self ) -> HubConfig
  {
    HubConfig
    {
      max_concurrent_operations: self.hub_max_concurrent_operations,
      message_timeout: Duration::from_secs( self.hub_message_timeout_secs ),
      retry_attempts: self.hub_retry_attempts,
      max_queue_size: self.hub_max_queue_size,
      tick_interval: Duration::from_millis( self.hub_tick_interval_millis ),
    }
  }
}

#[cfg(test)]
mod tests
{
  use super::*;

  #[test]
  fn defaults_produce_a_usable_budget_config()
  {
    let config = RuntimeConfig::default();
    let budget = config.budget_config();
    assert!( budget.max_budget_micros >= budget.min_reserve_micros );
  }
}
